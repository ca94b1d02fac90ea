use std::{fs::File, path::Path, time::Duration};

use reqwest::{blocking::Client, header::CONTENT_TYPE};
use tracing::{info, instrument};

use crate::{config::StorageConfig, error::PublicationError, runner::truncate_tail};

const ERROR_BODY_LIMIT: usize = 500;
const OUTPUT_CONTENT_TYPE: &str = "audio/mpeg";

pub trait Publisher: Send + Sync {
    fn publish(&self, path: &Path, object_key: &str) -> Result<String, PublicationError>;
}

#[derive(Debug, Clone)]
pub struct StoragePublisher {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl StoragePublisher {
    pub fn new(storage: &StorageConfig, timeout: Duration) -> Result<Self, PublicationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| PublicationError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: storage.base_url.trim_end_matches('/').to_string(),
            service_key: storage.service_key.clone(),
            bucket: storage.bucket.clone(),
        })
    }

    #[must_use]
    pub fn upload_url(&self, object_key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{object_key}",
            self.base_url, self.bucket
        )
    }

    #[must_use]
    pub fn public_url(&self, object_key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{object_key}",
            self.base_url, self.bucket
        )
    }
}

impl Publisher for StoragePublisher {
    #[instrument(skip(self), fields(path = %path.display(), bucket = %self.bucket))]
    fn publish(&self, path: &Path, object_key: &str) -> Result<String, PublicationError> {
        if self.base_url.is_empty() || self.service_key.is_empty() {
            return Err(PublicationError::MissingCredentials);
        }

        let file = File::open(path).map_err(|source| PublicationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let response = self
            .client
            .post(self.upload_url(object_key))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(CONTENT_TYPE, OUTPUT_CONTENT_TYPE)
            .header("x-upsert", "true")
            .body(file)
            .send()
            .map_err(|error| PublicationError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        if !matches!(status, 200 | 201) {
            let body = response.text().unwrap_or_default();
            return Err(PublicationError::Status {
                status,
                body: truncate_tail(&body, ERROR_BODY_LIMIT),
            });
        }

        let public_url = self.public_url(object_key);
        info!(%public_url, "rendered mix published");
        Ok(public_url)
    }
}
