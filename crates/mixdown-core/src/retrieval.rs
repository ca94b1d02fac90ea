use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::blocking::Client;
use tracing::{debug, instrument};

use crate::error::RetrievalError;

pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, RetrievalError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RetrievalError::Transport {
                url: String::new(),
                message: error.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl AssetFetcher for HttpFetcher {
    #[instrument(skip(self), fields(destination = %destination.display()))]
    fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, RetrievalError> {
        let transport = |error: reqwest::Error| RetrievalError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        };
        let io_error = |source| RetrievalError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = File::create(destination).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        let bytes = response.copy_to(&mut writer).map_err(transport)?;
        writer.flush().map_err(io_error)?;

        debug!(bytes, "asset downloaded");
        Ok(destination.to_path_buf())
    }
}
