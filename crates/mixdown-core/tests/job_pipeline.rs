use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use mixdown_core::{
    AssetFetcher, AssetRole, CompiledProgram, DurationProbe, EngineError, FaultClass, JobError,
    MixPipeline, PipelineSettings, ProbeError, PublicationError, Publisher, RenderEngine,
    RetrievalError,
    fixtures::{podcast_request, simple_request},
};

#[derive(Default)]
struct Calls {
    fetched: Vec<String>,
    probed: Vec<PathBuf>,
    rendered: Vec<CompiledProgram>,
    published: Vec<String>,
}

type Recorder = Arc<Mutex<Calls>>;

struct FakeFetcher {
    calls: Recorder,
    fail_status: Option<u16>,
}

impl AssetFetcher for FakeFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, RetrievalError> {
        self.calls
            .lock()
            .expect("recorder lock")
            .fetched
            .push(url.to_string());
        if let Some(status) = self.fail_status {
            return Err(RetrievalError::Status {
                url: url.to_string(),
                status,
            });
        }
        fs::write(destination, b"RIFF").expect("fake download should write");
        Ok(destination.to_path_buf())
    }
}

/// Durations keyed by the scratch file stem, which is the role name.
struct FakeProbe {
    calls: Recorder,
}

impl DurationProbe for FakeProbe {
    fn probe(&self, path: &Path) -> Result<f64, ProbeError> {
        self.calls
            .lock()
            .expect("recorder lock")
            .probed
            .push(path.to_path_buf());
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        match stem {
            "voice" => Ok(120.0),
            "intro" => Ok(15.0),
            "outro" => Ok(8.0),
            other => Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                message: format!("unexpected probe of {other}"),
            }),
        }
    }
}

struct FakeEngine {
    calls: Recorder,
    fail: bool,
}

impl RenderEngine for FakeEngine {
    fn render(&self, program: &CompiledProgram, output_path: &Path) -> Result<(), EngineError> {
        self.calls
            .lock()
            .expect("recorder lock")
            .rendered
            .push(program.clone());
        if self.fail {
            return Err(EngineError::Failed {
                status: Some(1),
                diagnostic: "Error initializing complex filters".to_string(),
            });
        }
        fs::write(output_path, b"ID3").expect("fake render should write");
        Ok(())
    }
}

struct FakePublisher {
    calls: Recorder,
}

impl Publisher for FakePublisher {
    fn publish(&self, path: &Path, object_key: &str) -> Result<String, PublicationError> {
        assert!(path.is_file(), "rendered file should exist at publish time");
        self.calls
            .lock()
            .expect("recorder lock")
            .published
            .push(object_key.to_string());
        Ok(format!(
            "https://storage.test/storage/v1/object/public/audiofiles/{object_key}"
        ))
    }
}

struct Harness {
    pipeline: MixPipeline,
    calls: Recorder,
    scratch_parent: tempfile::TempDir,
}

fn harness(fetch_status: Option<u16>, engine_fails: bool) -> Harness {
    let calls = Recorder::default();
    let scratch_parent = tempfile::tempdir().expect("tempdir should work");
    let settings = PipelineSettings {
        scratch_dir: Some(scratch_parent.path().to_path_buf()),
        ..PipelineSettings::default()
    };
    let pipeline = MixPipeline::new(
        Box::new(FakeFetcher {
            calls: Arc::clone(&calls),
            fail_status: fetch_status,
        }),
        Box::new(FakeProbe {
            calls: Arc::clone(&calls),
        }),
        Box::new(FakeEngine {
            calls: Arc::clone(&calls),
            fail: engine_fails,
        }),
        Box::new(FakePublisher {
            calls: Arc::clone(&calls),
        }),
        settings,
    );
    Harness {
        pipeline,
        calls,
        scratch_parent,
    }
}

fn scratch_is_empty(harness: &Harness) -> bool {
    fs::read_dir(harness.scratch_parent.path())
        .expect("scratch parent should be readable")
        .next()
        .is_none()
}

#[test]
fn out_of_range_volume_is_rejected_before_any_io() {
    let harness = harness(None, false);
    let mut request = simple_request();
    request.params.bed_volume = 1.5;

    let error = harness
        .pipeline
        .run(&request)
        .expect_err("volume is out of range");

    match &error {
        JobError::Validation(validation) => assert!(validation.has_field("bed_volume")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(error.fault(), FaultClass::Client);
    assert_eq!(error.status_code(), 400);

    let calls = harness.calls.lock().expect("recorder lock");
    assert!(calls.fetched.is_empty());
    assert!(calls.probed.is_empty());
    assert!(calls.rendered.is_empty());
    assert!(calls.published.is_empty());
}

#[test]
fn simple_job_renders_and_publishes_under_prefix() {
    let harness = harness(None, false);
    let outcome = harness
        .pipeline
        .run(&simple_request())
        .expect("simple job should succeed");

    assert!(outcome.object_key.starts_with("final/"));
    assert!(outcome.object_key.ends_with(&format!("{}.mp3", outcome.job_id)));
    assert!(outcome.public_url.ends_with(&outcome.object_key));
    assert_eq!(outcome.bucket, "audiofiles");
    assert!((outcome.effective.voice_seconds - 120.0).abs() < 1e-9);
    assert_eq!(outcome.plan_fingerprint.len(), 64);

    let calls = harness.calls.lock().expect("recorder lock");
    assert_eq!(calls.fetched.len(), 2);
    // The bed is fetched but never probed.
    assert_eq!(calls.probed.len(), 1);
    assert_eq!(calls.rendered.len(), 1);
    assert_eq!(calls.published, vec![outcome.object_key.clone()]);
    drop(calls);

    assert!(scratch_is_empty(&harness), "scratch should be released");
}

#[test]
fn podcast_job_probes_voice_intro_and_outro_in_input_order() {
    let harness = harness(None, false);
    let output_dir = tempfile::tempdir().expect("tempdir should work");
    let output_path = output_dir.path().join("episode.mp3");

    let rendered = harness
        .pipeline
        .render_to(&podcast_request(), &output_path)
        .expect("podcast job should render");

    assert_eq!(rendered.output_path, output_path);
    assert!(output_path.is_file());
    assert!(rendered.effective.carry_over_seconds > 0.0);

    let calls = harness.calls.lock().expect("recorder lock");
    let probed: Vec<String> = calls
        .probed
        .iter()
        .filter_map(|path| path.file_stem()?.to_str().map(ToString::to_string))
        .collect();
    assert_eq!(probed, vec!["voice", "intro", "outro"]);
    assert!(calls.published.is_empty());

    let program = &calls.rendered[0];
    let roles: Vec<AssetRole> = program.inputs.iter().map(|(role, _)| *role).collect();
    assert_eq!(
        roles,
        vec![
            AssetRole::Voice,
            AssetRole::Bed,
            AssetRole::Intro,
            AssetRole::Outro
        ]
    );
    drop(calls);

    assert!(scratch_is_empty(&harness));
}

#[test]
fn failed_download_is_a_client_fault() {
    let harness = harness(Some(404), false);
    let error = harness
        .pipeline
        .run(&simple_request())
        .expect_err("download should fail");

    assert!(matches!(
        error,
        JobError::Retrieval {
            role: AssetRole::Voice,
            ..
        }
    ));
    assert_eq!(error.kind(), "retrieval");
    assert_eq!(error.status_code(), 400);

    let calls = harness.calls.lock().expect("recorder lock");
    assert_eq!(calls.fetched.len(), 1, "retrieval stops at the first failure");
    assert!(calls.rendered.is_empty());
}

#[test]
fn engine_failure_keeps_diagnostic_and_cleans_scratch() {
    let harness = harness(None, true);
    let error = harness
        .pipeline
        .run(&simple_request())
        .expect_err("engine should fail");

    assert_eq!(error.kind(), "engine");
    assert_eq!(error.fault(), FaultClass::Server);
    assert!(error.detail().contains("complex filters"));
    assert!(
        harness
            .calls
            .lock()
            .expect("recorder lock")
            .published
            .is_empty()
    );
    assert!(scratch_is_empty(&harness));
}
