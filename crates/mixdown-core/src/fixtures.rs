use crate::model::{MixParameters, MixRequest, TimelineInputs};

pub const FIXTURE_VOICE_URL: &str = "https://cdn.mixdown.test/episodes/042/voice.wav";
pub const FIXTURE_BED_URL: &str = "https://cdn.mixdown.test/library/bed-lofi.mp3";
pub const FIXTURE_INTRO_URL: &str = "https://cdn.mixdown.test/library/intro-sting.mp3";
pub const FIXTURE_OUTRO_URL: &str = "https://cdn.mixdown.test/library/outro-sting.mp3";

#[must_use]
pub fn simple_request() -> MixRequest {
    MixRequest::simple(FIXTURE_VOICE_URL, FIXTURE_BED_URL)
}

#[must_use]
pub fn podcast_request() -> MixRequest {
    MixRequest {
        voice_url: FIXTURE_VOICE_URL.to_string(),
        bed_url: Some(FIXTURE_BED_URL.to_string()),
        intro_url: Some(FIXTURE_INTRO_URL.to_string()),
        outro_url: Some(FIXTURE_OUTRO_URL.to_string()),
        params: MixParameters {
            bed_volume: 0.2,
            intro_volume: 0.9,
            outro_volume: 0.9,
            intro_max_seconds: Some(12.0),
            outro_max_seconds: Some(10.0),
            crossfade_seconds: 1.5,
            intro_fade_in_seconds: 0.5,
            intro_fade_out_seconds: 2.0,
            outro_fade_in_seconds: 1.0,
            outro_fade_out_seconds: 3.0,
            carry_over_seconds: 4.0,
            carry_over_volume: 0.3,
            ..MixParameters::default()
        },
    }
}

/// Probed durations matching [`podcast_request`]: the intro exceeds its cap.
#[must_use]
pub fn podcast_inputs() -> TimelineInputs {
    TimelineInputs::voice_only(300.0)
        .with_bed()
        .with_intro(15.0)
        .with_outro(8.0)
}
