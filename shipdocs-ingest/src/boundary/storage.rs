//! HTTP client for the write-only storage boundary
//!
//! Request: `{ action, path: { entity_name, category, parent_category? }, file?, file_id?,
//! new_name?, target_path? }`. Response: `{ success, file_id?, web_link?, error? }`.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shipdocs_common::config::StorageBoundaryConfig;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ArtifactStore, BoundaryError, StorageCommand, StoragePath, StorageReceipt, WireFile};

const BOUNDARY: &str = "storage";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StorageRequest {
    pub action: &'static str,
    pub path: StoragePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<WireFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StorageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub web_link: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Flatten a command into its wire request
pub fn build_request(command: &StorageCommand) -> StorageRequest {
    let mut request = StorageRequest {
        action: command.action().as_wire(),
        path: command.path().clone(),
        file: None,
        file_id: None,
        new_name: None,
        target_path: None,
    };
    match command {
        StorageCommand::UploadFile { payload, .. } => request.file = Some(payload.to_wire()),
        StorageCommand::CreateSubfolder { .. } => {}
        StorageCommand::MoveFile {
            file_id,
            target_path,
            ..
        } => {
            request.file_id = Some(file_id.clone());
            request.target_path = Some(target_path.clone());
        }
        StorageCommand::DeleteFile { file_id, .. } => request.file_id = Some(file_id.clone()),
        StorageCommand::RenameFile {
            file_id, new_name, ..
        } => {
            request.file_id = Some(file_id.clone());
            request.new_name = Some(new_name.clone());
        }
    }
    request
}

pub fn interpret_response(response: StorageResponse) -> Result<StorageReceipt, BoundaryError> {
    if !response.success {
        return Err(BoundaryError::Rejected(
            response
                .error
                .unwrap_or_else(|| "storage reported failure without a message".to_string()),
        ));
    }
    Ok(StorageReceipt {
        file_id: response.file_id,
        web_link: response.web_link,
    })
}

/// Storage boundary over HTTP
pub struct HttpArtifactStore {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_secs: u64,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpArtifactStore {
    pub fn new(config: &StorageBoundaryConfig) -> Result<Self, BoundaryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BoundaryError::Transport(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn execute(&self, command: StorageCommand) -> Result<StorageReceipt, BoundaryError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(BoundaryError::NotConfigured(BOUNDARY))?;

        self.rate_limiter.until_ready().await;

        let action = command.action().as_wire();
        debug!(action, path = %command.path().display_path(), "Calling storage boundary");

        let mut request = self.client.post(endpoint).json(&build_request(&command));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BoundaryError::from_reqwest(BOUNDARY, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(action, status = status.as_u16(), "Storage boundary returned error status");
            return Err(BoundaryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: StorageResponse = response
            .json()
            .await
            .map_err(|e| BoundaryError::from_reqwest(BOUNDARY, self.timeout_secs, e))?;

        interpret_response(decoded)
    }
}
