use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{ValidationError, Violation},
    model::{AssetRole, MixRequest, SUPPORTED_OUTPUT_FORMAT},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValidationPolicy {
    pub min_volume: f64,
    pub max_volume: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_volume: 0.0,
            max_volume: 1.0,
        }
    }
}

/// Checks every constraint and reports all violations at once.
#[instrument(skip_all, fields(voice_url = %request.voice_url))]
pub fn validate_request(
    request: &MixRequest,
    policy: &ValidationPolicy,
) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    let params = &request.params;

    for (field, value) in params.volume_fields() {
        if !value.is_finite() || value < policy.min_volume || value > policy.max_volume {
            violations.push(Violation::new(
                field,
                format!(
                    "must be within [{}, {}], got {value}",
                    policy.min_volume, policy.max_volume
                ),
            ));
        }
    }

    for (field, value) in params.timing_fields() {
        if !value.is_finite() || value < 0.0 {
            violations.push(Violation::new(
                field,
                format!("must be a finite number >= 0, got {value}"),
            ));
        }
    }

    for role in AssetRole::ALL {
        if let Some(url) = request.source_url(role) {
            if let Err(message) = check_url(url) {
                violations.push(Violation::new(url_field(role), message));
            }
        }
    }

    if request.is_simple_mode() && request.bed_url.is_none() {
        violations.push(Violation::new(
            "bed_url",
            "a bed is required when neither intro nor outro is given",
        ));
    }

    if !params
        .output_format
        .eq_ignore_ascii_case(SUPPORTED_OUTPUT_FORMAT)
    {
        violations.push(Violation::new(
            "output_format",
            format!(
                "only {SUPPORTED_OUTPUT_FORMAT} is supported, got {:?}",
                params.output_format
            ),
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        debug!(count = violations.len(), "request rejected");
        Err(ValidationError { violations })
    }
}

fn url_field(role: AssetRole) -> &'static str {
    match role {
        AssetRole::Voice => "voice_url",
        AssetRole::Bed => "bed_url",
        AssetRole::Intro => "intro_url",
        AssetRole::Outro => "outro_url",
    }
}

fn check_url(raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    let url = Url::parse(raw).map_err(|error| format!("not an absolute URL: {error}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme {other:?}")),
    }
}
