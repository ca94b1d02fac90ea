use std::{
    ffi::OsString,
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use symphonia::core::{
    codecs::DecoderOptions, errors::Error as SymphoniaError, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, instrument};

use crate::{error::ProbeError, runner::run_command};

pub trait DurationProbe: Send + Sync {
    /// Length of the audio at `path` in seconds; always finite and `>= 0`.
    fn probe(&self, path: &Path) -> Result<f64, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
    timeout: Duration,
    diagnostic_limit: usize,
}

impl FfprobeProbe {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration, diagnostic_limit: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            diagnostic_limit,
        }
    }
}

impl DurationProbe for FfprobeProbe {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        let args: Vec<OsString> = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]
        .into_iter()
        .map(OsString::from)
        .chain(std::iter::once(path.as_os_str().to_owned()))
        .collect();

        let output =
            run_command(&self.binary, &args, self.timeout).map_err(|source| ProbeError::Run {
                path: path.to_path_buf(),
                source,
            })?;
        if !output.success() {
            return Err(ProbeError::Failed {
                path: path.to_path_buf(),
                diagnostic: output.diagnostic(self.diagnostic_limit),
            });
        }

        let seconds = parse_duration(path, output.stdout.lines().next().unwrap_or_default())?;
        debug!(seconds, "ffprobe duration");
        Ok(seconds)
    }
}

/// Reads the duration in-process from container metadata, decoding the stream
/// only when the container does not declare a frame count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaProbe;

impl DurationProbe for SymphoniaProbe {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        let unreadable = |message: String| ProbeError::Unreadable {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|error| unreadable(error.to_string()))?;
        let source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|error| unreadable(error.to_string()))?;
        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| unreadable("no default audio track".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        if let (Some(frames), Some(sample_rate)) = (codec_params.n_frames, codec_params.sample_rate) {
            if sample_rate > 0 {
                let seconds = frames as f64 / f64::from(sample_rate);
                debug!(frames, sample_rate, seconds, "duration from container metadata");
                return checked_seconds(path, seconds);
            }
        }

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|error| unreadable(error.to_string()))?;
        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut frames = 0_u64;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(error) => return Err(unreadable(error.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    sample_rate = decoded.spec().rate;
                    frames += decoded.frames() as u64;
                }
                Err(SymphoniaError::DecodeError(_)) => {}
                Err(error) => return Err(unreadable(error.to_string())),
            }
        }

        if sample_rate == 0 {
            return Err(unreadable("stream declares no sample rate".to_string()));
        }
        let seconds = frames as f64 / f64::from(sample_rate);
        debug!(frames, sample_rate, seconds, "duration from decoded frames");
        checked_seconds(path, seconds)
    }
}

pub fn parse_duration(path: &Path, raw: &str) -> Result<f64, ProbeError> {
    let raw = raw.trim();
    let seconds = raw
        .parse::<f64>()
        .map_err(|_| ProbeError::InvalidDuration {
            path: path.to_path_buf(),
            value: raw.to_string(),
        })?;
    checked_seconds(path, seconds)
}

fn checked_seconds(path: &Path, seconds: f64) -> Result<f64, ProbeError> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(ProbeError::InvalidDuration {
            path: path.to_path_buf(),
            value: seconds.to_string(),
        })
    }
}
