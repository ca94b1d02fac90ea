pub mod clamp;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fixtures;
pub mod graph;
pub mod job;
pub mod model;
pub mod plan;
pub mod probe;
pub mod publish;
pub mod render;
pub mod retrieval;
pub mod runner;
pub mod segments;
pub mod timeline;
pub mod validate;

pub use clamp::{EffectiveParameters, EffectiveSegment, clamp};
pub use compiler::{CompiledProgram, OutputEncoding, PlanError, compile};
pub use config::{ProbeBackend, ServiceConfig};
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use error::{
    EngineError, FaultClass, JobError, ProbeError, PublicationError, RetrievalError,
    ValidationError, Violation,
};
pub use graph::{GraphError, Input, Node, NodeId, Op, PlanGraph, StreamLabel};
pub use job::{JobOutcome, MixPipeline, OutputTarget, PipelineSettings, RenderJob, RenderedMix};
pub use model::{AssetRole, AudioAsset, MixParameters, MixRequest, TimelineInputs};
pub use plan::{RenderPlan, build_plan};
pub use probe::{DurationProbe, FfprobeProbe, SymphoniaProbe};
pub use publish::{Publisher, StoragePublisher};
pub use render::{FfmpegEngine, RenderEngine};
pub use retrieval::{AssetFetcher, HttpFetcher};
pub use runner::{CommandOutput, RunError, run_command};
pub use segments::{Segment, TrimWindow};
pub use timeline::{JunctionKind, TimelineShape};
pub use validate::{ValidationPolicy, validate_request};
