use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EDGE_MARGIN_SECONDS: f64 = 0.05;
pub const DEFAULT_BED_VOLUME: f64 = 0.18;
pub const DEFAULT_SEGMENT_VOLUME: f64 = 1.0;
pub const DEFAULT_CARRY_OVER_VOLUME: f64 = 0.25;
pub const SUPPORTED_OUTPUT_FORMAT: &str = "mp3";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Voice,
    Bed,
    Intro,
    Outro,
}

impl AssetRole {
    /// Engine input order: voice first, then the optional roles.
    pub const ALL: [Self; 4] = [Self::Voice, Self::Bed, Self::Intro, Self::Outro];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Bed => "bed",
            Self::Intro => "intro",
            Self::Outro => "outro",
        }
    }

    #[must_use]
    pub fn is_optional(self) -> bool {
        !matches!(self, Self::Voice)
    }
}

impl fmt::Display for AssetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetched input file. The duration stays `None` until a probe fills it in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioAsset {
    id: Uuid,
    role: AssetRole,
    local_path: PathBuf,
    probed_duration: Option<f64>,
}

impl AudioAsset {
    #[must_use]
    pub fn new(role: AssetRole, local_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            local_path: local_path.into(),
            probed_duration: None,
        }
    }

    #[must_use]
    pub fn with_duration(self, seconds: f64) -> Self {
        Self {
            probed_duration: Some(seconds),
            ..self
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> AssetRole {
        self.role
    }

    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    #[must_use]
    pub fn probed_duration(&self) -> Option<f64> {
        self.probed_duration
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixRequest {
    pub voice_url: String,
    #[serde(default, alias = "music_url", skip_serializing_if = "Option::is_none")]
    pub bed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro_url: Option<String>,
    #[serde(flatten)]
    pub params: MixParameters,
}

impl MixRequest {
    #[must_use]
    pub fn simple(voice_url: impl Into<String>, bed_url: impl Into<String>) -> Self {
        Self {
            voice_url: voice_url.into(),
            bed_url: Some(bed_url.into()),
            intro_url: None,
            outro_url: None,
            params: MixParameters::default(),
        }
    }

    #[must_use]
    pub fn source_url(&self, role: AssetRole) -> Option<&str> {
        match role {
            AssetRole::Voice => Some(self.voice_url.as_str()),
            AssetRole::Bed => self.bed_url.as_deref(),
            AssetRole::Intro => self.intro_url.as_deref(),
            AssetRole::Outro => self.outro_url.as_deref(),
        }
    }

    #[must_use]
    pub fn present_roles(&self) -> Vec<AssetRole> {
        AssetRole::ALL
            .into_iter()
            .filter(|role| self.source_url(*role).is_some())
            .collect()
    }

    #[must_use]
    pub fn is_simple_mode(&self) -> bool {
        self.intro_url.is_none() && self.outro_url.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixParameters {
    #[serde(alias = "music_volume")]
    pub bed_volume: f64,
    pub intro_volume: f64,
    pub outro_volume: f64,
    pub duck: bool,
    pub loudnorm: bool,
    pub output_format: String,
    pub intro_max_seconds: Option<f64>,
    pub outro_max_seconds: Option<f64>,
    pub crossfade_seconds: f64,
    pub intro_fade_in_seconds: f64,
    pub intro_fade_out_seconds: f64,
    pub outro_fade_in_seconds: f64,
    pub outro_fade_out_seconds: f64,
    pub carry_over_seconds: f64,
    pub carry_over_volume: f64,
}

impl Default for MixParameters {
    fn default() -> Self {
        Self {
            bed_volume: DEFAULT_BED_VOLUME,
            intro_volume: DEFAULT_SEGMENT_VOLUME,
            outro_volume: DEFAULT_SEGMENT_VOLUME,
            duck: true,
            loudnorm: true,
            output_format: SUPPORTED_OUTPUT_FORMAT.to_string(),
            intro_max_seconds: None,
            outro_max_seconds: None,
            crossfade_seconds: 0.0,
            intro_fade_in_seconds: 0.0,
            intro_fade_out_seconds: 0.0,
            outro_fade_in_seconds: 0.0,
            outro_fade_out_seconds: 0.0,
            carry_over_seconds: 0.0,
            carry_over_volume: DEFAULT_CARRY_OVER_VOLUME,
        }
    }
}

impl MixParameters {
    #[must_use]
    pub fn volume_fields(&self) -> [(&'static str, f64); 4] {
        [
            ("bed_volume", self.bed_volume),
            ("intro_volume", self.intro_volume),
            ("outro_volume", self.outro_volume),
            ("carry_over_volume", self.carry_over_volume),
        ]
    }

    /// Every duration, cap and transition field. Unset caps are skipped.
    #[must_use]
    pub fn timing_fields(&self) -> Vec<(&'static str, f64)> {
        let mut fields = vec![
            ("crossfade_seconds", self.crossfade_seconds),
            ("intro_fade_in_seconds", self.intro_fade_in_seconds),
            ("intro_fade_out_seconds", self.intro_fade_out_seconds),
            ("outro_fade_in_seconds", self.outro_fade_in_seconds),
            ("outro_fade_out_seconds", self.outro_fade_out_seconds),
            ("carry_over_seconds", self.carry_over_seconds),
        ];
        if let Some(cap) = self.intro_max_seconds {
            fields.push(("intro_max_seconds", cap));
        }
        if let Some(cap) = self.outro_max_seconds {
            fields.push(("outro_max_seconds", cap));
        }
        fields
    }
}

/// Probed facts the clamp engine needs. The bed is never probed; only its
/// presence matters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimelineInputs {
    pub voice_seconds: f64,
    pub has_bed: bool,
    pub intro_seconds: Option<f64>,
    pub outro_seconds: Option<f64>,
}

impl TimelineInputs {
    #[must_use]
    pub fn voice_only(voice_seconds: f64) -> Self {
        Self {
            voice_seconds,
            has_bed: false,
            intro_seconds: None,
            outro_seconds: None,
        }
    }

    #[must_use]
    pub fn with_bed(self) -> Self {
        Self {
            has_bed: true,
            ..self
        }
    }

    #[must_use]
    pub fn with_intro(self, seconds: f64) -> Self {
        Self {
            intro_seconds: Some(seconds),
            ..self
        }
    }

    #[must_use]
    pub fn with_outro(self, seconds: f64) -> Self {
        Self {
            outro_seconds: Some(seconds),
            ..self
        }
    }
}
