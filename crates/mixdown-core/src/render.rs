use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{info, instrument, warn};

use crate::{compiler::CompiledProgram, error::EngineError, runner::run_command};

pub trait RenderEngine: Send + Sync {
    fn render(&self, program: &CompiledProgram, output_path: &Path) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: PathBuf,
    timeout: Duration,
    diagnostic_limit: usize,
}

impl FfmpegEngine {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration, diagnostic_limit: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            diagnostic_limit,
        }
    }
}

impl RenderEngine for FfmpegEngine {
    #[instrument(skip(self, program), fields(output = %output_path.display(), inputs = program.inputs.len()))]
    fn render(&self, program: &CompiledProgram, output_path: &Path) -> Result<(), EngineError> {
        let args = program.engine_args(output_path);
        let output = run_command(&self.binary, &args, self.timeout)?;

        if !output.success() {
            let diagnostic = output.diagnostic(self.diagnostic_limit);
            warn!(status = ?output.status.code(), %diagnostic, "render engine failed");
            return Err(EngineError::Failed {
                status: output.status.code(),
                diagnostic,
            });
        }
        if !output_path.is_file() {
            return Err(EngineError::MissingOutput(output_path.to_path_buf()));
        }

        info!("render completed");
        Ok(())
    }
}
