use std::{fmt, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{compiler::PlanError, model::AssetRole, runner::RunError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid mix request: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.field == field)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run duration probe for {path}")]
    Run {
        path: PathBuf,
        #[source]
        source: RunError,
    },
    #[error("duration probe failed for {path}: {diagnostic}")]
    Failed { path: PathBuf, diagnostic: String },
    #[error("duration probe returned an invalid value for {path}: {value:?}")]
    InvalidDuration { path: PathBuf, value: String },
    #[error("audio file is unreadable: {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("download of {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("failed to write downloaded asset to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("render plan could not be compiled")]
    Plan(#[from] PlanError),
    #[error("failed to run render engine")]
    Run(#[from] RunError),
    #[error("render engine exited with status {status:?}: {diagnostic}")]
    Failed {
        status: Option<i32>,
        diagnostic: String,
    },
    #[error("render engine produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("scratch storage error: {0}")]
    Scratch(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum PublicationError {
    #[error("object storage credentials are not configured")]
    MissingCredentials,
    #[error("upload returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upload failed: {0}")]
    Transport(String),
    #[error("failed to open rendered file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    Client,
    Server,
}

impl FaultClass {
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::Client => 400,
            Self::Server => 500,
        }
    }
}

/// Terminal failure of one job. Nothing here is retried.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not determine {role} duration")]
    Probe {
        role: AssetRole,
        #[source]
        source: ProbeError,
    },
    #[error("could not retrieve {role} asset")]
    Retrieval {
        role: AssetRole,
        #[source]
        source: RetrievalError,
    },
    #[error("render failed")]
    Engine(#[from] EngineError),
    #[error("publication failed")]
    Publication(#[from] PublicationError),
}

impl JobError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Probe { .. } => "probe",
            Self::Retrieval { .. } => "retrieval",
            Self::Engine(_) => "engine",
            Self::Publication(_) => "publication",
        }
    }

    #[must_use]
    pub fn fault(&self) -> FaultClass {
        match self {
            Self::Validation(_) | Self::Retrieval { .. } => FaultClass::Client,
            Self::Probe { .. } | Self::Engine(_) | Self::Publication(_) => FaultClass::Server,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.fault().status_code()
    }

    #[must_use]
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classes_split_client_and_server() {
        let validation = JobError::from(ValidationError {
            violations: vec![Violation::new("bed_volume", "out of range")],
        });
        let retrieval = JobError::Retrieval {
            role: AssetRole::Voice,
            source: RetrievalError::Status {
                url: "https://example.com/v.wav".to_string(),
                status: 404,
            },
        };
        let engine = JobError::from(EngineError::Failed {
            status: Some(1),
            diagnostic: "boom".to_string(),
        });
        let publication = JobError::from(PublicationError::MissingCredentials);

        assert_eq!(validation.status_code(), 400);
        assert_eq!(retrieval.status_code(), 400);
        assert_eq!(engine.status_code(), 500);
        assert_eq!(publication.status_code(), 500);
        assert_eq!(retrieval.kind(), "retrieval");
    }

    #[test]
    fn detail_includes_source_chain() {
        let error = JobError::Retrieval {
            role: AssetRole::Intro,
            source: RetrievalError::Status {
                url: "https://example.com/i.mp3".to_string(),
                status: 503,
            },
        };
        let detail = error.detail();
        assert!(detail.contains("intro"));
        assert!(detail.contains("HTTP 503"));
    }
}
