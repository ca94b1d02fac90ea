use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::{
    clamp::{self, EffectiveParameters},
    graph::PlanGraph,
    model::{MixParameters, TimelineInputs},
    segments::{self, Segment},
    timeline::{self, TimelineShape},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderPlan {
    pub effective: EffectiveParameters,
    pub shape: TimelineShape,
    pub segments: Vec<Segment>,
    pub graph: PlanGraph,
}

impl RenderPlan {
    #[must_use]
    pub fn expected_duration_seconds(&self) -> f64 {
        self.effective.expected_duration_seconds
    }

    /// Stable digest of the graph and the effective parameters. Equal inputs
    /// always give equal fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = format!("{:?}|{:?}", self.graph.nodes(), self.effective);
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{digest:x}")
    }
}

/// Pure: no I/O, no clock, no randomness.
#[instrument(skip(params))]
pub fn build_plan(params: &MixParameters, inputs: &TimelineInputs) -> RenderPlan {
    let effective = clamp::clamp(params, inputs);
    let shape = TimelineShape::of(&effective);
    let segments = segments::plan_segments(&effective);
    let graph = timeline::assemble(&effective);

    debug!(
        ?shape,
        segments = segments.len(),
        nodes = graph.nodes().len(),
        "render plan built"
    );

    RenderPlan {
        effective,
        shape,
        segments,
        graph,
    }
}
