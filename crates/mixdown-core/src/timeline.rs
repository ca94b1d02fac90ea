//! Orders intro, body and outro into one stream and optionally normalizes it.
//!
//! Every timeline variant (plain mix, ducked mix, intro/outro joins, carry-over)
//! is the same assembly driven by [`TimelineShape`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    clamp::{EffectiveParameters, EffectiveSegment},
    graph::{LoudnessTarget, MixDuration, Op, PlanGraph, StreamLabel},
    model::AssetRole,
    segments::{self, Segment},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineShape {
    pub has_bed: bool,
    pub has_intro: bool,
    pub has_outro: bool,
    pub duck_enabled: bool,
    pub carry_over: bool,
    pub loudnorm: bool,
}

impl TimelineShape {
    #[must_use]
    pub fn of(effective: &EffectiveParameters) -> Self {
        Self {
            has_bed: effective.has_bed,
            has_intro: effective.intro.is_some(),
            has_outro: effective.outro.is_some(),
            duck_enabled: effective.duck,
            carry_over: effective.carry_over_engaged(),
            loudnorm: effective.loudnorm,
        }
    }

    #[must_use]
    pub fn is_body_only(&self) -> bool {
        !self.has_intro && !self.has_outro
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JunctionKind {
    Crossfade,
    Concat,
}

impl JunctionKind {
    #[must_use]
    pub fn for_crossfade(seconds: f64) -> Self {
        if seconds > 0.0 {
            Self::Crossfade
        } else {
            Self::Concat
        }
    }
}

pub fn assemble(effective: &EffectiveParameters) -> PlanGraph {
    let shape = TimelineShape::of(effective);
    let mut graph = PlanGraph::new();

    let mut body = segments::build_body(&mut graph, effective);
    if !shape.is_body_only() {
        body = segments::conform(&mut graph, body);
    }

    let mut timeline = match &effective.intro {
        Some(intro) if shape.carry_over => {
            attach_intro_with_carry_over(&mut graph, effective, intro, body)
        }
        Some(intro) => {
            let intro = clip_stream(&mut graph, AssetRole::Intro, intro);
            join(&mut graph, intro, body, effective.intro_crossfade_seconds)
        }
        None => body,
    };

    if let Some(outro) = &effective.outro {
        let outro = clip_stream(&mut graph, AssetRole::Outro, outro);
        timeline = join(&mut graph, timeline, outro, effective.outro_crossfade_seconds);
    }

    if shape.loudnorm {
        timeline = graph.then(Op::Normalize(LoudnessTarget::STANDARD), timeline);
    }

    graph.terminate(timeline);
    debug!(?shape, nodes = graph.nodes().len(), "timeline assembled");
    graph
}

fn clip_stream(
    graph: &mut PlanGraph,
    role: AssetRole,
    effective: &EffectiveSegment,
) -> StreamLabel {
    let clip = segments::build_clip(graph, &Segment::clip(role, effective));
    segments::conform(graph, clip)
}

/// Lets the intro keep playing, quietly and fading, under the first seconds of
/// the voice. The tail is the last `carry_over` seconds of the intro window.
/// Head and tail are summed without rescaling.
fn attach_intro_with_carry_over(
    graph: &mut PlanGraph,
    effective: &EffectiveParameters,
    intro: &EffectiveSegment,
    body: StreamLabel,
) -> StreamLabel {
    let carry = effective.carry_over_seconds;

    let halves = graph.split(body, 2);
    let head = trimmed(graph, halves[0], 0.0, Some(carry));
    let remainder = trimmed(graph, halves[1], carry, None);

    let tail = segments::build_clip(
        graph,
        &Segment::carry_tail(intro, carry, effective.carry_over_volume),
    );
    let mixed_head = graph.join(
        Op::Mix {
            duration: MixDuration::Shortest,
            dropout_transition: 0.0,
            normalize: false,
        },
        vec![head.into(), tail.into()],
    );
    let mixed_head = segments::conform(graph, mixed_head);

    let intro = clip_stream(graph, AssetRole::Intro, intro);
    let opening = join(graph, intro, mixed_head, effective.intro_crossfade_seconds);
    join(graph, opening, remainder, 0.0)
}

fn trimmed(
    graph: &mut PlanGraph,
    stream: StreamLabel,
    start: f64,
    end: Option<f64>,
) -> StreamLabel {
    let trimmed = graph.then(Op::Trim { start, end }, stream);
    graph.then(Op::ResetTimestamps, trimmed)
}

fn join(
    graph: &mut PlanGraph,
    left: StreamLabel,
    right: StreamLabel,
    crossfade: f64,
) -> StreamLabel {
    let op = match JunctionKind::for_crossfade(crossfade) {
        JunctionKind::Crossfade => Op::Crossfade {
            duration: crossfade,
        },
        JunctionKind::Concat => Op::Concat { segments: 2 },
    };
    graph.join(op, vec![left.into(), right.into()])
}
