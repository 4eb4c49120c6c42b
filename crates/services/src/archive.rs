//! Remote archival of exported CSV data.

use async_trait::async_trait;
use collect_core::model::ElementId;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

const UPLOAD_PATH: &str = "data-collection/upload";

/// One CSV payload destined for the archive.
///
/// `element_id` and `cycle_number` are set for per-phase uploads and absent
/// for a full-dataset upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRequest {
    pub participant_name: String,
    pub personality_code: String,
    pub csv_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_number: Option<u32>,
}

/// Where the archive stored an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_name: String,
}

#[async_trait]
pub trait ArchivalService: Send + Sync {
    /// Store `request.csv_content` remotely.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure or when the archive reports an error.
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, RemoteError>;
}

/// `ArchivalService` over the data-collection HTTP API.
#[derive(Clone)]
pub struct HttpArchivalService {
    client: Client,
    config: RemoteConfig,
}

impl HttpArchivalService {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be constructed.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }
}

#[async_trait]
impl ArchivalService for HttpArchivalService {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, RemoteError> {
        let mut builder = self
            .client
            .post(self.config.endpoint(UPLOAD_PATH))
            .json(request);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }
        parse_upload_response(builder.send().await?).await
    }
}

async fn parse_upload_response(response: Response) -> Result<UploadReceipt, RemoteError> {
    // the archive answers failures with 500 and a JSON body carrying the reason
    let status = response.status();
    let bytes = response.bytes().await?;
    let body: UploadResponse = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(_) if !status.is_success() => return Err(RemoteError::HttpStatus(status)),
        Err(err) => return Err(RemoteError::MalformedResponse(err.to_string())),
    };
    receipt_from(body)
}

fn receipt_from(body: UploadResponse) -> Result<UploadReceipt, RemoteError> {
    if body.status != "success" {
        return Err(RemoteError::Rejected(
            body.message.unwrap_or_else(|| "upload failed".into()),
        ));
    }
    Ok(UploadReceipt {
        file_name: body.file.unwrap_or_default(),
    })
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: String,
    message: Option<String>,
    file: Option<String>,
}
