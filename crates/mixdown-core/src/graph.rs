//! Engine-agnostic render plan: an arena of primitive audio operations
//! connected by opaque stream labels.
//!
//! Asset sources may feed any number of nodes. Every intermediate stream is
//! produced by exactly one node and consumed by exactly one node; fan-out goes
//! through an explicit [`Op::Split`].

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::AssetRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamLabel(u32);

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    Source(AssetRole),
    Stream(StreamLabel),
}

impl From<StreamLabel> for Input {
    fn from(value: StreamLabel) -> Self {
        Self::Stream(value)
    }
}

impl From<AssetRole> for Input {
    fn from(value: AssetRole) -> Self {
        Self::Source(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FadeDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MixDuration {
    First,
    Shortest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DuckPolicy {
    pub threshold: f64,
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl DuckPolicy {
    pub const STANDARD: Self = Self {
        threshold: 0.02,
        ratio: 8.0,
        attack_ms: 5.0,
        release_ms: 2_000.0,
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LoudnessTarget {
    pub integrated_lufs: f64,
    pub true_peak_dbtp: f64,
    pub loudness_range_lu: f64,
}

impl LoudnessTarget {
    pub const STANDARD: Self = Self {
        integrated_lufs: -16.0,
        true_peak_dbtp: -1.5,
        loudness_range_lu: 11.0,
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Op {
    ResetTimestamps,
    Trim {
        start: f64,
        end: Option<f64>,
    },
    Loop,
    Volume {
        gain: f64,
    },
    Fade {
        direction: FadeDirection,
        start: f64,
        duration: f64,
    },
    /// Inputs: `[signal, key]`.
    SidechainDuck(DuckPolicy),
    /// `normalize: false` sums the inputs at their own gains instead of
    /// scaling each by 1/n.
    Mix {
        duration: MixDuration,
        dropout_transition: f64,
        normalize: bool,
    },
    Split {
        outputs: usize,
    },
    Format {
        sample_rate: u32,
        channels: u16,
    },
    Crossfade {
        duration: f64,
    },
    Concat {
        segments: usize,
    },
    Normalize(LoudnessTarget),
    Output,
}

impl Op {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResetTimestamps => "reset_timestamps",
            Self::Trim { .. } => "trim",
            Self::Loop => "loop",
            Self::Volume { .. } => "volume",
            Self::Fade { .. } => "fade",
            Self::SidechainDuck(_) => "sidechain_duck",
            Self::Mix { .. } => "mix",
            Self::Split { .. } => "split",
            Self::Format { .. } => "format",
            Self::Crossfade { .. } => "crossfade",
            Self::Concat { .. } => "concat",
            Self::Normalize(_) => "normalize",
            Self::Output => "output",
        }
    }

    fn accepts_inputs(&self, count: usize) -> bool {
        match self {
            Self::SidechainDuck(_) | Self::Mix { .. } | Self::Crossfade { .. } => count == 2,
            Self::Concat { segments } => count == *segments && count >= 2,
            _ => count == 1,
        }
    }

    fn output_count(&self) -> usize {
        match self {
            Self::Split { outputs } => *outputs,
            Self::Output => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub op: Op,
    pub inputs: Vec<Input>,
    pub outputs: Vec<StreamLabel>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("plan graph is empty")]
    Empty,
    #[error("plan graph has no output node")]
    NoOutput,
    #[error("plan graph has {0} output nodes")]
    MultipleOutputs(usize),
    #[error("node {node} ({op}) cannot take {inputs} inputs")]
    Arity {
        node: usize,
        op: &'static str,
        inputs: usize,
    },
    #[error("node {node} reads undefined stream {label}")]
    UndefinedStream { node: usize, label: StreamLabel },
    #[error("stream {0} is consumed more than once")]
    StreamReused(StreamLabel),
    #[error("stream {0} is produced more than once")]
    DuplicateStream(StreamLabel),
    #[error("stream {0} is never consumed")]
    DanglingStream(StreamLabel),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanGraph {
    nodes: Vec<Node>,
    next_label: u32,
}

impl PlanGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op, inputs: Vec<Input>) -> Vec<StreamLabel> {
        let outputs: Vec<StreamLabel> = (0..op.output_count())
            .map(|_| self.fresh_label())
            .collect();
        self.nodes.push(Node {
            id: NodeId(self.nodes.len()),
            op,
            inputs,
            outputs: outputs.clone(),
        });
        outputs
    }

    pub fn then(&mut self, op: Op, input: impl Into<Input>) -> StreamLabel {
        self.join(op, vec![input.into()])
    }

    pub fn join(&mut self, op: Op, inputs: Vec<Input>) -> StreamLabel {
        debug_assert_eq!(op.output_count(), 1, "{} is not single-output", op.name());
        let outputs = self.push(op, inputs);
        outputs[0]
    }

    pub fn split(&mut self, input: StreamLabel, outputs: usize) -> Vec<StreamLabel> {
        self.push(Op::Split { outputs }, vec![input.into()])
    }

    pub fn terminate(&mut self, input: StreamLabel) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.push(Op::Output, vec![input.into()]);
        id
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Asset roles read by the graph, in engine input order.
    #[must_use]
    pub fn sources(&self) -> Vec<AssetRole> {
        let used: BTreeSet<AssetRole> = self
            .nodes
            .iter()
            .flat_map(|node| node.inputs.iter())
            .filter_map(|input| match input {
                Input::Source(role) => Some(*role),
                Input::Stream(_) => None,
            })
            .collect();
        AssetRole::ALL
            .into_iter()
            .filter(|role| used.contains(role))
            .collect()
    }

    #[must_use]
    pub fn terminal_stream(&self) -> Option<StreamLabel> {
        self.nodes
            .iter()
            .find(|node| matches!(node.op, Op::Output))
            .and_then(|node| match node.inputs.first() {
                Some(Input::Stream(label)) => Some(*label),
                _ => None,
            })
    }

    #[must_use]
    pub fn count_ops(&self, name: &str) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.op.name() == name)
            .count()
    }

    #[must_use]
    pub fn producer(&self, label: StreamLabel) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| node.outputs.contains(&label))
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let outputs = self.count_ops("output");
        match outputs {
            0 => return Err(GraphError::NoOutput),
            1 => {}
            count => return Err(GraphError::MultipleOutputs(count)),
        }

        let mut produced: BTreeMap<StreamLabel, usize> = BTreeMap::new();
        let mut consumed: BTreeSet<StreamLabel> = BTreeSet::new();

        for node in &self.nodes {
            if !node.op.accepts_inputs(node.inputs.len()) {
                return Err(GraphError::Arity {
                    node: node.id.0,
                    op: node.op.name(),
                    inputs: node.inputs.len(),
                });
            }

            for input in &node.inputs {
                let Input::Stream(label) = input else {
                    continue;
                };
                // Arena order is the only order: reading a later stream would
                // be a forward edge and could close a cycle.
                if !produced.contains_key(label) {
                    return Err(GraphError::UndefinedStream {
                        node: node.id.0,
                        label: *label,
                    });
                }
                if !consumed.insert(*label) {
                    return Err(GraphError::StreamReused(*label));
                }
            }

            for label in &node.outputs {
                if produced.insert(*label, node.id.0).is_some() {
                    return Err(GraphError::DuplicateStream(*label));
                }
            }
        }

        if let Some(label) = produced.keys().find(|label| !consumed.contains(label)) {
            return Err(GraphError::DanglingStream(*label));
        }

        Ok(())
    }

    fn fresh_label(&mut self) -> StreamLabel {
        self.next_label += 1;
        StreamLabel(self.next_label)
    }
}
