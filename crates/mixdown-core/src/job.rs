use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clamp::EffectiveParameters,
    compiler::{self, CompiledProgram},
    config::{ProbeBackend, ServiceConfig},
    error::{EngineError, JobError},
    model::{AssetRole, AudioAsset, MixRequest, SUPPORTED_OUTPUT_FORMAT, TimelineInputs},
    plan::{RenderPlan, build_plan},
    probe::{DurationProbe, FfprobeProbe, SymphoniaProbe},
    publish::{Publisher, StoragePublisher},
    render::{FfmpegEngine, RenderEngine},
    retrieval::{AssetFetcher, HttpFetcher},
    validate::{ValidationPolicy, validate_request},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub local_path: PathBuf,
    pub object_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderJob {
    pub job_id: Uuid,
    pub plan: RenderPlan,
    pub output_target: OutputTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub bucket: String,
    pub object_key: String,
    pub public_url: String,
    pub effective: EffectiveParameters,
    pub plan_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedMix {
    pub job_id: Uuid,
    pub output_path: PathBuf,
    pub effective: EffectiveParameters,
    pub plan_fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bucket: String,
    pub output_prefix: String,
    pub scratch_dir: Option<PathBuf>,
    pub validation: ValidationPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bucket: "audiofiles".to_string(),
            output_prefix: "final".to_string(),
            scratch_dir: None,
            validation: ValidationPolicy::default(),
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            output_prefix: config.storage.output_prefix.clone(),
            scratch_dir: config.paths.scratch_dir.clone(),
            validation: ValidationPolicy {
                max_volume: config.mix.max_volume,
                ..ValidationPolicy::default()
            },
        }
    }
}

/// Runs one request at a time through validate, fetch, probe, plan, render
/// and (for [`MixPipeline::run`]) publish. Jobs share nothing but the
/// collaborators, which are stateless.
pub struct MixPipeline {
    fetcher: Box<dyn AssetFetcher>,
    probe: Box<dyn DurationProbe>,
    engine: Box<dyn RenderEngine>,
    publisher: Box<dyn Publisher>,
    settings: PipelineSettings,
}

impl MixPipeline {
    #[must_use]
    pub fn new(
        fetcher: Box<dyn AssetFetcher>,
        probe: Box<dyn DurationProbe>,
        engine: Box<dyn RenderEngine>,
        publisher: Box<dyn Publisher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            probe,
            engine,
            publisher,
            settings,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(config.network.download_timeout())
            .context("failed to build download client")?;
        let publisher = StoragePublisher::new(&config.storage, config.network.upload_timeout())
            .context("failed to build upload client")?;
        let probe: Box<dyn DurationProbe> = match config.engine.probe_backend {
            ProbeBackend::Ffprobe => Box::new(FfprobeProbe::new(
                &config.engine.ffprobe_binary,
                config.engine.probe_timeout(),
                config.engine.diagnostic_limit,
            )),
            ProbeBackend::Symphonia => Box::new(SymphoniaProbe),
        };
        debug!(backend = ?config.engine.probe_backend, "duration probe selected");
        let engine = FfmpegEngine::new(
            &config.engine.ffmpeg_binary,
            config.engine.render_timeout(),
            config.engine.diagnostic_limit,
        );

        Ok(Self::new(
            Box::new(fetcher),
            probe,
            Box::new(engine),
            Box::new(publisher),
            PipelineSettings::from_config(config),
        ))
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn run(&self, request: &MixRequest) -> Result<JobOutcome, JobError> {
        let job_id = Uuid::new_v4();
        self.admit(job_id, request)?;
        let scratch = self.scratch()?;
        let target = OutputTarget {
            local_path: scratch
                .path()
                .join(format!("{job_id}.{SUPPORTED_OUTPUT_FORMAT}")),
            object_key: Some(object_key(&self.settings.output_prefix, job_id)),
        };

        let job = self.execute(job_id, request, scratch.path(), target)?;
        let object_key = job.output_target.object_key.clone().unwrap_or_default();
        let public_url = self
            .publisher
            .publish(&job.output_target.local_path, &object_key)?;

        info!(%job_id, %object_key, "job finished");
        Ok(JobOutcome {
            job_id,
            bucket: self.settings.bucket.clone(),
            object_key,
            public_url,
            plan_fingerprint: job.plan.fingerprint(),
            effective: job.plan.effective,
        })
    }

    pub fn render_to(
        &self,
        request: &MixRequest,
        output_path: &Path,
    ) -> Result<RenderedMix, JobError> {
        let job_id = Uuid::new_v4();
        self.admit(job_id, request)?;
        let scratch = self.scratch()?;
        let target = OutputTarget {
            local_path: output_path.to_path_buf(),
            object_key: None,
        };

        let job = self.execute(job_id, request, scratch.path(), target)?;
        info!(%job_id, output = %output_path.display(), "job finished");
        Ok(RenderedMix {
            job_id,
            output_path: job.output_target.local_path,
            plan_fingerprint: job.plan.fingerprint(),
            effective: job.plan.effective,
        })
    }

    /// Rejects invalid requests before any scratch storage or network use.
    fn admit(&self, job_id: Uuid, request: &MixRequest) -> Result<(), JobError> {
        validate_request(request, &self.settings.validation).map_err(|error| {
            warn!(%job_id, %error, "request rejected");
            JobError::from(error)
        })
    }

    #[instrument(skip_all, fields(job_id = %job_id))]
    fn execute(
        &self,
        job_id: Uuid,
        request: &MixRequest,
        scratch: &Path,
        target: OutputTarget,
    ) -> Result<RenderJob, JobError> {
        let assets = self.retrieve(request, scratch)?;
        let inputs = timeline_inputs(&assets);
        let plan = build_plan(&request.params, &inputs);
        debug!(
            expected_seconds = plan.expected_duration_seconds(),
            fingerprint = %plan.fingerprint(),
            "plan ready"
        );

        let sources: BTreeMap<AssetRole, PathBuf> = assets
            .iter()
            .map(|asset| (asset.role(), asset.local_path().to_path_buf()))
            .collect();
        let program: CompiledProgram =
            compiler::compile(&plan.graph, &sources).map_err(EngineError::from)?;
        self.engine.render(&program, &target.local_path)?;

        Ok(RenderJob {
            job_id,
            plan,
            output_target: target,
        })
    }

    /// Fetches every present role in input order and probes the ones the
    /// clamp engine needs. The bed is never probed.
    fn retrieve(&self, request: &MixRequest, scratch: &Path) -> Result<Vec<AudioAsset>, JobError> {
        let mut assets = Vec::new();
        for role in request.present_roles() {
            let Some(url) = request.source_url(role) else {
                continue;
            };
            let destination = scratch.join(asset_file_name(role, url));
            let local_path = self
                .fetcher
                .fetch(url, &destination)
                .map_err(|source| JobError::Retrieval { role, source })?;

            let mut asset = AudioAsset::new(role, local_path);
            if role != AssetRole::Bed {
                let seconds = self
                    .probe
                    .probe(asset.local_path())
                    .map_err(|source| JobError::Probe { role, source })?;
                asset = asset.with_duration(seconds);
            }
            debug!(%role, id = %asset.id(), duration = ?asset.probed_duration(), "asset ready");
            assets.push(asset);
        }
        Ok(assets)
    }

    fn scratch(&self) -> Result<TempDir, JobError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mixdown-");
        let dir = match &self.settings.scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|error| JobError::from(EngineError::Scratch(error)))
    }
}

fn timeline_inputs(assets: &[AudioAsset]) -> TimelineInputs {
    let duration = |role| {
        assets
            .iter()
            .find(|asset| asset.role() == role)
            .and_then(AudioAsset::probed_duration)
    };
    TimelineInputs {
        voice_seconds: duration(AssetRole::Voice).unwrap_or(0.0),
        has_bed: assets.iter().any(|asset| asset.role() == AssetRole::Bed),
        intro_seconds: duration(AssetRole::Intro),
        outro_seconds: duration(AssetRole::Outro),
    }
}

#[must_use]
pub fn object_key(prefix: &str, job_id: Uuid) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{job_id}.{SUPPORTED_OUTPUT_FORMAT}")
    } else {
        format!("{prefix}/{job_id}.{SUPPORTED_OUTPUT_FORMAT}")
    }
}

fn asset_file_name(role: AssetRole, url: &str) -> String {
    let extension = Url::parse(url).ok().and_then(|url| {
        Path::new(url.path())
            .extension()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty() && value.chars().all(char::is_alphanumeric))
            .map(str::to_ascii_lowercase)
    });
    match extension {
        Some(extension) => format!("{role}.{extension}"),
        None => role.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_trims_prefix_slashes() {
        let job_id = Uuid::nil();
        assert_eq!(
            object_key("/final/", job_id),
            "final/00000000-0000-0000-0000-000000000000.mp3"
        );
        assert_eq!(
            object_key("", job_id),
            "00000000-0000-0000-0000-000000000000.mp3"
        );
    }

    #[test]
    fn asset_names_keep_remote_extension() {
        assert_eq!(
            asset_file_name(AssetRole::Voice, "https://cdn.test/a/Take1.WAV?sig=1"),
            "voice.wav"
        );
        assert_eq!(
            asset_file_name(AssetRole::Bed, "https://cdn.test/stream"),
            "bed"
        );
    }

    #[test]
    fn pipeline_builds_with_in_process_duration_backend() {
        let mut config = ServiceConfig::default();
        config.engine.probe_backend = ProbeBackend::Symphonia;
        config.engine.ffprobe_binary = "/nonexistent/ffprobe".to_string();

        let pipeline = MixPipeline::from_config(&config).expect("pipeline should build");
        assert_eq!(pipeline.settings().bucket, "audiofiles");
    }

    #[test]
    fn bed_presence_does_not_need_a_duration() {
        let assets = vec![
            AudioAsset::new(AssetRole::Voice, "/tmp/voice.wav").with_duration(30.0),
            AudioAsset::new(AssetRole::Bed, "/tmp/bed.mp3"),
            AudioAsset::new(AssetRole::Outro, "/tmp/outro.mp3").with_duration(6.0),
        ];
        let inputs = timeline_inputs(&assets);

        assert!(inputs.has_bed);
        assert_eq!(inputs.intro_seconds, None);
        assert_eq!(inputs.outro_seconds, Some(6.0));
        assert!((inputs.voice_seconds - 30.0).abs() < f64::EPSILON);
    }
}
