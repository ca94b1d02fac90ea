use serde::{Deserialize, Serialize};

use crate::{
    clamp::{EffectiveParameters, EffectiveSegment},
    compiler::OutputEncoding,
    graph::{DuckPolicy, FadeDirection, Input, MixDuration, Op, PlanGraph, StreamLabel},
    model::AssetRole,
};

const BED_DROPOUT_TRANSITION_SECONDS: f64 = 3.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub role: AssetRole,
    /// `None` means the whole source is used (voice) or it is looped (bed).
    pub trim_window: Option<TrimWindow>,
    pub volume: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Segment {
    #[must_use]
    pub fn clip(role: AssetRole, effective: &EffectiveSegment) -> Self {
        Self {
            role,
            trim_window: Some(TrimWindow {
                start: 0.0,
                end: effective.window_seconds,
            }),
            volume: effective.volume,
            fade_in: effective.fade_in_seconds,
            fade_out: effective.fade_out_seconds,
        }
    }

    /// The last `seconds` of the intro window, fading out over its whole length.
    #[must_use]
    pub fn carry_tail(intro: &EffectiveSegment, seconds: f64, volume: f64) -> Self {
        Self {
            role: AssetRole::Intro,
            trim_window: Some(TrimWindow {
                start: (intro.window_seconds - seconds).max(0.0),
                end: intro.window_seconds,
            }),
            volume,
            fade_in: 0.0,
            fade_out: seconds,
        }
    }

    #[must_use]
    pub fn fade_out_start(&self) -> f64 {
        self.trim_window
            .map_or(0.0, |window| (window.length() - self.fade_out).max(0.0))
    }
}

#[must_use]
pub fn plan_segments(effective: &EffectiveParameters) -> Vec<Segment> {
    let mut segments = vec![Segment {
        role: AssetRole::Voice,
        trim_window: None,
        volume: 1.0,
        fade_in: 0.0,
        fade_out: 0.0,
    }];

    if effective.has_bed {
        segments.push(Segment {
            role: AssetRole::Bed,
            trim_window: None,
            volume: effective.bed_volume,
            fade_in: 0.0,
            fade_out: 0.0,
        });
    }
    if let Some(intro) = &effective.intro {
        segments.push(Segment::clip(AssetRole::Intro, intro));
    }
    if let Some(outro) = &effective.outro {
        segments.push(Segment::clip(AssetRole::Outro, outro));
    }

    segments
}

/// Voice plus the optional looped (and optionally ducked) bed. The result is
/// exactly as long as the voice.
pub fn build_body(graph: &mut PlanGraph, effective: &EffectiveParameters) -> StreamLabel {
    let voice = graph.then(Op::ResetTimestamps, AssetRole::Voice);
    if !effective.has_bed {
        return voice;
    }

    let looped = graph.then(Op::Loop, AssetRole::Bed);
    let bed = graph.then(
        Op::Volume {
            gain: effective.bed_volume,
        },
        looped,
    );

    let (voice, bed) = if effective.duck {
        let voice_branches = graph.split(voice, 2);
        let ducked = graph.join(
            Op::SidechainDuck(DuckPolicy::STANDARD),
            vec![bed.into(), voice_branches[1].into()],
        );
        (voice_branches[0], ducked)
    } else {
        (voice, bed)
    };

    graph.join(
        Op::Mix {
            duration: MixDuration::First,
            dropout_transition: BED_DROPOUT_TRANSITION_SECONDS,
            normalize: true,
        },
        vec![voice.into(), bed.into()],
    )
}

pub fn build_clip(graph: &mut PlanGraph, segment: &Segment) -> StreamLabel {
    let mut stream: Input = segment.role.into();

    if let Some(window) = segment.trim_window {
        let trimmed = graph.then(
            Op::Trim {
                start: window.start,
                end: Some(window.end),
            },
            stream,
        );
        stream = graph.then(Op::ResetTimestamps, trimmed).into();
    }

    let mut label = graph.then(
        Op::Volume {
            gain: segment.volume,
        },
        stream,
    );

    if segment.fade_in > 0.0 {
        label = graph.then(
            Op::Fade {
                direction: FadeDirection::In,
                start: 0.0,
                duration: segment.fade_in,
            },
            label,
        );
    }
    if segment.fade_out > 0.0 {
        label = graph.then(
            Op::Fade {
                direction: FadeDirection::Out,
                start: segment.fade_out_start(),
                duration: segment.fade_out,
            },
            label,
        );
    }

    label
}

pub fn conform(graph: &mut PlanGraph, stream: StreamLabel) -> StreamLabel {
    let encoding = OutputEncoding::STANDARD;
    graph.then(
        Op::Format {
            sample_rate: encoding.sample_rate,
            channels: encoding.channels,
        },
        stream,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intro(window_seconds: f64) -> EffectiveSegment {
        EffectiveSegment {
            window_seconds,
            volume: 0.8,
            fade_in_seconds: 1.0,
            fade_out_seconds: 2.0,
        }
    }

    #[test]
    fn clip_fade_out_ends_at_window_end() {
        let segment = Segment::clip(AssetRole::Intro, &intro(8.0));
        assert!((segment.fade_out_start() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn carry_tail_covers_last_seconds() {
        let tail = Segment::carry_tail(&intro(20.0), 1.95, 0.25);
        let window = tail.trim_window.expect("tail should be trimmed");
        assert!((window.start - 18.05).abs() < 1e-9);
        assert!((window.end - 20.0).abs() < 1e-9);
        assert_eq!(tail.fade_out_start(), 0.0);
        assert!((tail.fade_out - 1.95).abs() < 1e-9);
    }

    #[test]
    fn clip_without_fades_emits_no_fade_nodes() {
        let mut graph = PlanGraph::new();
        let segment = Segment {
            fade_in: 0.0,
            fade_out: 0.0,
            ..Segment::clip(AssetRole::Outro, &intro(5.0))
        };
        let label = build_clip(&mut graph, &segment);
        graph.terminate(label);

        assert_eq!(graph.count_ops("fade"), 0);
        assert_eq!(graph.count_ops("trim"), 1);
        assert_eq!(graph.validate(), Ok(()));
    }
}
