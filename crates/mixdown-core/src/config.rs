use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diagnostics::DEFAULT_LOG_FILTER;

const CONFIG_FILE_NAME: &str = "mixdown.config.toml";
const CONFIG_PATH_ENV: &str = "MIXDOWN_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub network: NetworkConfig,
    pub mix: MixConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: String,
    pub service_key: String,
    pub bucket: String,
    pub output_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
    pub render_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub diagnostic_limit: usize,
    pub probe_backend: ProbeBackend,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeBackend {
    #[default]
    Ffprobe,
    /// In-process decoding; no `ffprobe` binary needed.
    Symphonia,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub download_timeout_secs: u64,
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub max_volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Parent for per-job scratch directories; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            service_key: String::new(),
            bucket: "audiofiles".to_string(),
            output_prefix: "final".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            render_timeout_secs: 600,
            probe_timeout_secs: 30,
            diagnostic_limit: 2_000,
            probe_backend: ProbeBackend::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 120,
            upload_timeout_secs: 180,
        }
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self { max_volume: 1.0 }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: "mixdown".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl NetworkConfig {
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    #[must_use]
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl ServiceConfig {
    /// Reads the discovered config file (defaults when there is none) and
    /// applies process environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match discover_config_path()? {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("no {CONFIG_FILE_NAME} found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ServiceConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 4] = [
            ("SUPABASE_URL", &mut self.storage.base_url),
            ("SUPABASE_SERVICE_ROLE_KEY", &mut self.storage.service_key),
            ("SUPABASE_BUCKET", &mut self.storage.bucket),
            ("OUTPUT_PREFIX", &mut self.storage.output_prefix),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|value| !value.is_empty()) {
                *slot = value;
            }
        }
    }
}

fn discover_config_path() -> Result<Option<PathBuf>> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
        anyhow::bail!("{CONFIG_PATH_ENV} points at {}, which is not a file", path.display());
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    Ok(candidates.into_iter().find(|path| path.is_file()))
}
