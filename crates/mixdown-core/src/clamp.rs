//! Derives engine-safe timing values from requested parameters and probed
//! durations. Nothing here fails: unsafe values are degraded, never rejected.
//!
//! Every effective value satisfies `0 <= effective <= requested`, and any
//! value below [`TIMING_RESOLUTION_SECONDS`] is exactly zero.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::model::{EDGE_MARGIN_SECONDS, MixParameters, TimelineInputs};

/// Shortest duration the compiled program can express; anything below it
/// would print as `0`.
pub const TIMING_RESOLUTION_SECONDS: f64 = 0.0005;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSegment {
    pub window_seconds: f64,
    pub volume: f64,
    pub fade_in_seconds: f64,
    pub fade_out_seconds: f64,
}

impl EffectiveSegment {
    #[must_use]
    pub fn fade_out_start(&self) -> f64 {
        (self.window_seconds - self.fade_out_seconds).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveParameters {
    pub voice_seconds: f64,
    pub has_bed: bool,
    pub bed_volume: f64,
    pub duck: bool,
    pub loudnorm: bool,
    pub intro: Option<EffectiveSegment>,
    pub outro: Option<EffectiveSegment>,
    pub intro_crossfade_seconds: f64,
    pub outro_crossfade_seconds: f64,
    pub carry_over_seconds: f64,
    pub carry_over_volume: f64,
    pub expected_duration_seconds: f64,
}

impl EffectiveParameters {
    #[must_use]
    pub fn carry_over_engaged(&self) -> bool {
        self.intro.is_some() && self.carry_over_seconds > 0.0
    }
}

#[instrument(skip(params), fields(voice_seconds = inputs.voice_seconds))]
pub fn clamp(params: &MixParameters, inputs: &TimelineInputs) -> EffectiveParameters {
    let voice_seconds = sanitize(inputs.voice_seconds);

    let intro = inputs.intro_seconds.and_then(|probed| {
        effective_segment(
            "intro",
            probed,
            params.intro_max_seconds,
            params.intro_volume,
            params.intro_fade_in_seconds,
            params.intro_fade_out_seconds,
        )
    });
    let outro = inputs.outro_seconds.and_then(|probed| {
        effective_segment(
            "outro",
            probed,
            params.outro_max_seconds,
            params.outro_volume,
            params.outro_fade_in_seconds,
            params.outro_fade_out_seconds,
        )
    });

    let carry_over_seconds = intro.map_or(0.0, |intro| {
        clamp_carry_over(params.carry_over_seconds, voice_seconds, intro.window_seconds)
    });

    // With carry-over the intro meets the mixed head window, not the full body.
    let intro_right_neighbor = if carry_over_seconds > 0.0 {
        carry_over_seconds
    } else {
        voice_seconds
    };
    let intro_crossfade_seconds = intro.map_or(0.0, |intro| {
        clamp_crossfade(
            params.crossfade_seconds,
            intro.window_seconds,
            intro_right_neighbor,
        )
    });
    let outro_crossfade_seconds = outro.map_or(0.0, |outro| {
        clamp_crossfade(
            params.crossfade_seconds,
            voice_seconds,
            outro.window_seconds,
        )
    });

    let expected_duration_seconds = voice_seconds
        + intro.map_or(0.0, |intro| intro.window_seconds - intro_crossfade_seconds)
        + outro.map_or(0.0, |outro| outro.window_seconds - outro_crossfade_seconds);

    let effective = EffectiveParameters {
        voice_seconds,
        has_bed: inputs.has_bed,
        bed_volume: params.bed_volume,
        duck: params.duck && inputs.has_bed,
        loudnorm: params.loudnorm,
        intro,
        outro,
        intro_crossfade_seconds,
        outro_crossfade_seconds,
        carry_over_seconds,
        carry_over_volume: params.carry_over_volume,
        expected_duration_seconds,
    };

    log_degraded(params, &effective);
    effective
}

#[must_use]
pub fn clamp_fade(requested: f64, segment_seconds: f64) -> f64 {
    let segment_seconds = sanitize(segment_seconds);
    if segment_seconds == 0.0 {
        return 0.0;
    }
    sanitize(requested).min(segment_seconds)
}

/// Crossfade-below-both-neighbors. A zero result means the junction is a
/// plain concatenation.
#[must_use]
pub fn clamp_crossfade(requested: f64, left_seconds: f64, right_seconds: f64) -> f64 {
    let left_seconds = sanitize(left_seconds);
    let right_seconds = sanitize(right_seconds);
    if left_seconds == 0.0 || right_seconds == 0.0 {
        return 0.0;
    }

    snap(
        sanitize(requested)
            .min(left_seconds - EDGE_MARGIN_SECONDS)
            .min(right_seconds - EDGE_MARGIN_SECONDS),
    )
}

#[must_use]
pub fn capped_length(probed_seconds: f64, cap_seconds: Option<f64>) -> f64 {
    let probed_seconds = sanitize(probed_seconds);
    match cap_seconds {
        Some(cap) => probed_seconds.min(sanitize(cap)),
        None => probed_seconds,
    }
}

/// Carry-over bound. When either bound degenerates the carry-over is zero and
/// the intro joins the body directly.
#[must_use]
pub fn clamp_carry_over(requested: f64, voice_seconds: f64, intro_seconds: f64) -> f64 {
    let voice_bound = sanitize(voice_seconds) - EDGE_MARGIN_SECONDS;
    let intro_bound = sanitize(intro_seconds) - EDGE_MARGIN_SECONDS;
    if voice_bound <= 0.0 || intro_bound <= 0.0 {
        return 0.0;
    }

    snap(sanitize(requested).min(voice_bound).min(intro_bound))
}

fn effective_segment(
    label: &'static str,
    probed_seconds: f64,
    cap_seconds: Option<f64>,
    volume: f64,
    fade_in_seconds: f64,
    fade_out_seconds: f64,
) -> Option<EffectiveSegment> {
    let window_seconds = capped_length(probed_seconds, cap_seconds);
    if window_seconds == 0.0 {
        warn!(
            segment = label,
            probed_seconds,
            ?cap_seconds,
            "segment has no usable audio, dropping it from the timeline"
        );
        return None;
    }

    Some(EffectiveSegment {
        window_seconds,
        volume,
        fade_in_seconds: clamp_fade(fade_in_seconds, window_seconds),
        fade_out_seconds: clamp_fade(fade_out_seconds, window_seconds),
    })
}

fn sanitize(seconds: f64) -> f64 {
    if seconds.is_finite() { snap(seconds) } else { 0.0 }
}

fn snap(seconds: f64) -> f64 {
    if seconds >= TIMING_RESOLUTION_SECONDS {
        seconds
    } else {
        0.0
    }
}

fn log_degraded(params: &MixParameters, effective: &EffectiveParameters) {
    let reduced = |requested: f64, actual: f64| actual + f64::EPSILON < requested;

    if effective.intro.is_some() && reduced(params.carry_over_seconds, effective.carry_over_seconds)
    {
        warn!(
            requested = params.carry_over_seconds,
            effective = effective.carry_over_seconds,
            "carry-over shortened to fit voice and intro"
        );
    }
    if effective.intro.is_some()
        && reduced(params.crossfade_seconds, effective.intro_crossfade_seconds)
    {
        warn!(
            requested = params.crossfade_seconds,
            effective = effective.intro_crossfade_seconds,
            "intro crossfade shortened"
        );
    }
    if effective.outro.is_some()
        && reduced(params.crossfade_seconds, effective.outro_crossfade_seconds)
    {
        warn!(
            requested = params.crossfade_seconds,
            effective = effective.outro_crossfade_seconds,
            "outro crossfade shortened"
        );
    }

    debug!(
        intro_window = effective.intro.map(|intro| intro.window_seconds),
        outro_window = effective.outro.map(|outro| outro.window_seconds),
        carry_over = effective.carry_over_seconds,
        expected_duration = effective.expected_duration_seconds,
        "parameters clamped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_is_bounded_by_segment() {
        assert!((clamp_fade(5.0, 3.0) - 3.0).abs() < 1e-9);
        assert!((clamp_fade(1.5, 3.0) - 1.5).abs() < 1e-9);
        assert_eq!(clamp_fade(2.0, 0.0), 0.0);
    }

    #[test]
    fn crossfade_with_empty_neighbor_is_zero() {
        assert_eq!(clamp_crossfade(1.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp_crossfade(1.0, 10.0, -3.0), 0.0);
        assert_eq!(clamp_crossfade(1.0, 0.04, 10.0), 0.0);
    }

    #[test]
    fn cap_applies_only_when_shorter() {
        assert!((capped_length(12.0, Some(8.0)) - 8.0).abs() < 1e-9);
        assert!((capped_length(5.0, Some(8.0)) - 5.0).abs() < 1e-9);
        assert!((capped_length(5.0, None) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_durations_degrade_to_zero() {
        assert_eq!(capped_length(f64::NAN, None), 0.0);
        assert_eq!(clamp_carry_over(3.0, f64::INFINITY, 10.0), 0.0);
    }

    #[test]
    fn carry_over_degenerates_to_zero() {
        assert_eq!(clamp_carry_over(4.0, 0.05, 20.0), 0.0);
        assert_eq!(clamp_carry_over(4.0, 10.0, 0.0), 0.0);
    }

    #[test]
    fn margin_leftovers_below_resolution_are_zero() {
        assert_eq!(clamp_carry_over(4.0, 0.0502, 20.0), 0.0);
        assert_eq!(clamp_crossfade(2.0, 10.0, 0.0503), 0.0);
        assert!((clamp_crossfade(2.0, 10.0, 0.051) - 0.001).abs() < 1e-9);
    }
}
