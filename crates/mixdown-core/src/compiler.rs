//! The only place that knows ffmpeg's filtergraph syntax.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    graph::{FadeDirection, GraphError, Input, MixDuration, Op, PlanGraph, StreamLabel},
    model::AssetRole,
};

const LOOP_FOREVER_SIZE: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct OutputEncoding {
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

impl OutputEncoding {
    pub const STANDARD: Self = Self {
        codec: "libmp3lame",
        sample_rate: 44_100,
        channels: 2,
        bitrate_kbps: 192,
    };
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid plan graph: {0}")]
    Graph(#[from] GraphError),
    #[error("no local file for {0} input")]
    MissingSource(AssetRole),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub inputs: Vec<(AssetRole, PathBuf)>,
    pub filter_graph: String,
    pub output_selector: String,
    pub encoding: OutputEncoding,
}

impl CompiledProgram {
    #[must_use]
    pub fn engine_args(&self, output_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(OsString::from)
            .collect();

        for (_, path) in &self.inputs {
            args.push("-i".into());
            args.push(path.clone().into_os_string());
        }

        args.extend(
            [
                "-filter_complex".to_string(),
                self.filter_graph.clone(),
                "-map".to_string(),
                self.output_selector.clone(),
                "-ar".to_string(),
                self.encoding.sample_rate.to_string(),
                "-ac".to_string(),
                self.encoding.channels.to_string(),
                "-codec:a".to_string(),
                self.encoding.codec.to_string(),
                "-b:a".to_string(),
                format!("{}k", self.encoding.bitrate_kbps),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output_path.as_os_str().to_owned());
        args
    }
}

#[instrument(skip(graph, sources), fields(nodes = graph.nodes().len()))]
pub fn compile(
    graph: &PlanGraph,
    sources: &BTreeMap<AssetRole, PathBuf>,
) -> Result<CompiledProgram, PlanError> {
    graph.validate()?;

    let roles = graph.sources();
    let mut inputs = Vec::with_capacity(roles.len());
    for role in &roles {
        let path = sources.get(role).ok_or(PlanError::MissingSource(*role))?;
        inputs.push((*role, path.clone()));
    }
    let input_index: BTreeMap<AssetRole, usize> = roles
        .iter()
        .enumerate()
        .map(|(index, role)| (*role, index))
        .collect();

    let mut statements: Vec<String> = Vec::new();
    let mut pending: Option<(String, StreamLabel)> = None;

    for node in graph.nodes() {
        let Some(expression) = filter_expression(&node.op) else {
            continue;
        };

        // A single-input node reading the chain built so far extends it with ','.
        let extended = match (pending.take(), node.inputs.as_slice()) {
            (Some((text, open)), [Input::Stream(label)]) if *label == open => Some(text),
            (Some((text, open)), _) => {
                statements.push(format!("{text}[{open}]"));
                None
            }
            (None, _) => None,
        };

        let mut chain = match extended {
            Some(mut text) => {
                text.push(',');
                text.push_str(&expression);
                text
            }
            None => {
                let mut text: String = node
                    .inputs
                    .iter()
                    .map(|input| input_pad(input, &input_index))
                    .collect();
                text.push_str(&expression);
                text
            }
        };

        if let [label] = node.outputs.as_slice() {
            pending = Some((chain, *label));
        } else {
            for label in &node.outputs {
                chain.push_str(&format!("[{label}]"));
            }
            statements.push(chain);
        }
    }

    if let Some((text, label)) = pending.take() {
        statements.push(format!("{text}[{label}]"));
    }

    let terminal = graph.terminal_stream().ok_or(GraphError::NoOutput)?;
    let program = CompiledProgram {
        inputs,
        filter_graph: statements.join(";"),
        output_selector: format!("[{terminal}]"),
        encoding: OutputEncoding::STANDARD,
    };

    debug!(
        inputs = program.inputs.len(),
        filter_graph = %program.filter_graph,
        output = %program.output_selector,
        "render plan compiled"
    );
    Ok(program)
}

/// ffmpeg filter text for one node; `None` for the output node, which becomes
/// the `-map` selector instead.
#[must_use]
pub fn filter_expression(op: &Op) -> Option<String> {
    let expression = match op {
        Op::ResetTimestamps => "asetpts=PTS-STARTPTS".to_string(),
        Op::Trim { start, end } => match end {
            Some(end) => format!(
                "atrim=start={}:end={}",
                format_number(*start),
                format_number(*end)
            ),
            None => format!("atrim=start={}", format_number(*start)),
        },
        Op::Loop => format!("aloop=loop=-1:size={LOOP_FOREVER_SIZE}"),
        Op::Volume { gain } => format!("volume={}", format_number(*gain)),
        Op::Fade {
            direction,
            start,
            duration,
        } => format!(
            "afade=t={}:st={}:d={}",
            match direction {
                FadeDirection::In => "in",
                FadeDirection::Out => "out",
            },
            format_number(*start),
            format_number(*duration)
        ),
        Op::SidechainDuck(policy) => format!(
            "sidechaincompress=threshold={}:ratio={}:attack={}:release={}",
            format_number(policy.threshold),
            format_number(policy.ratio),
            format_number(policy.attack_ms),
            format_number(policy.release_ms)
        ),
        Op::Mix {
            duration,
            dropout_transition,
            normalize,
        } => {
            let mut text = format!(
                "amix=inputs=2:duration={}:dropout_transition={}",
                match duration {
                    MixDuration::First => "first",
                    MixDuration::Shortest => "shortest",
                },
                format_number(*dropout_transition)
            );
            if !normalize {
                text.push_str(":normalize=0");
            }
            text
        }
        Op::Split { outputs } => format!("asplit={outputs}"),
        Op::Format {
            sample_rate,
            channels,
        } => format!(
            "aformat=sample_fmts=fltp:sample_rates={sample_rate}:channel_layouts={}",
            channel_layout(*channels)
        ),
        Op::Crossfade { duration } => format!("acrossfade=d={}", format_number(*duration)),
        Op::Concat { segments } => format!("concat=n={segments}:v=0:a=1"),
        Op::Normalize(target) => format!(
            "loudnorm=I={}:TP={}:LRA={}",
            format_number(target.integrated_lufs),
            format_number(target.true_peak_dbtp),
            format_number(target.loudness_range_lu)
        ),
        Op::Output => return None,
    };
    Some(expression)
}

/// Millisecond precision with trailing zeros dropped: `0.180` -> `0.18`,
/// `2000.000` -> `2000`.
#[must_use]
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" || text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn channel_layout(channels: u16) -> &'static str {
    if channels == 1 { "mono" } else { "stereo" }
}

fn input_pad(input: &Input, input_index: &BTreeMap<AssetRole, usize>) -> String {
    match input {
        Input::Source(role) => {
            // compile() resolved every source role before emitting statements.
            let index = input_index.get(role).copied().unwrap_or_default();
            format!("[{index}:a]")
        }
        Input::Stream(label) => format!("[{label}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_drop_trailing_zeros() {
        assert_eq!(format_number(0.18), "0.18");
        assert_eq!(format_number(2_000.0), "2000");
        assert_eq!(format_number(-1.5), "-1.5");
        assert_eq!(format_number(1.95), "1.95");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0001), "0");
    }

    #[test]
    fn output_node_has_no_filter_text() {
        assert_eq!(filter_expression(&Op::Output), None);
        assert_eq!(
            filter_expression(&Op::Concat { segments: 2 }).as_deref(),
            Some("concat=n=2:v=0:a=1")
        );
    }

    #[test]
    fn unnormalized_mix_keeps_input_gains() {
        let summed = Op::Mix {
            duration: MixDuration::Shortest,
            dropout_transition: 0.0,
            normalize: false,
        };
        let averaged = Op::Mix {
            duration: MixDuration::First,
            dropout_transition: 3.0,
            normalize: true,
        };
        assert_eq!(
            filter_expression(&summed).as_deref(),
            Some("amix=inputs=2:duration=shortest:dropout_transition=0:normalize=0")
        );
        assert_eq!(
            filter_expression(&averaged).as_deref(),
            Some("amix=inputs=2:duration=first:dropout_transition=3")
        );
    }

    #[test]
    fn missing_source_path_is_reported() {
        let mut graph = PlanGraph::new();
        let voice = graph.then(Op::ResetTimestamps, AssetRole::Voice);
        graph.terminate(voice);

        let error = compile(&graph, &BTreeMap::new()).expect_err("voice path is missing");
        assert_eq!(error, PlanError::MissingSource(AssetRole::Voice));
    }
}
