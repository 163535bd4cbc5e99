//! Google Drive v3 client for the backup file.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::debug;

use crate::sync::{RemoteDocumentHandle, RemoteFile, RemoteStore, StoreError, SyncConfig, Token};

use super::types::*;

const JSON_MIME: &str = "application/json";

/// Client for the Drive files API (metadata + media upload endpoints).
pub struct DriveClient {
    client: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a client from sync configuration.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base: config.drive_api_base.trim_end_matches('/').to_string(),
            upload_base: config.drive_upload_base.trim_end_matches('/').to_string(),
        })
    }

    fn list_url(&self, name: &str) -> Result<Url, StoreError> {
        Url::parse_with_params(
            &format!("{}/files", self.api_base),
            &[
                ("q", name_query(name).as_str()),
                ("spaces", "drive"),
                ("fields", "files(id,name,modifiedTime)"),
            ],
        )
        .map_err(|e| StoreError::Transport(format!("invalid list url: {}", e)))
    }

    /// Map non-2xx responses; 401 becomes `Unauthorized`.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find_by_name(&self, token: &Token, name: &str) -> Result<Vec<RemoteFile>, StoreError> {
        let url = self.list_url(name)?;

        debug!(name = %name, "Looking up backup file");

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?;

        let list: FileListResponse = Self::check(response).await?.json().await?;

        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFile {
                handle: RemoteDocumentHandle::new(f.id),
                name: f.name,
                modified_time: f.modified_time,
            })
            .collect())
    }

    async fn read(
        &self,
        token: &Token,
        handle: &RemoteDocumentHandle,
    ) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/files/{}?alt=media", self.api_base, handle);

        debug!(handle = %handle, "Downloading backup");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn create(
        &self,
        token: &Token,
        name: &str,
        body: &[u8],
    ) -> Result<RemoteDocumentHandle, StoreError> {
        let url = format!("{}/files?uploadType=multipart&fields=id", self.upload_base);
        let boundary = format!("trademind-{}", uuid::Uuid::new_v4().simple());
        let payload = multipart_related(&boundary, name, body)
            .map_err(|e| StoreError::Transport(format!("encode metadata: {}", e)))?;

        debug!(name = %name, bytes = body.len(), "Creating backup file");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, token.bearer())
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(payload)
            .send()
            .await?;

        let created: DriveFile = Self::check(response).await?.json().await?;
        Ok(RemoteDocumentHandle::new(created.id))
    }

    async fn replace(
        &self,
        token: &Token,
        handle: &RemoteDocumentHandle,
        body: &[u8],
    ) -> Result<(), StoreError> {
        let url = format!("{}/files/{}?uploadType=media", self.upload_base, handle);

        debug!(handle = %handle, bytes = body.len(), "Replacing backup content");

        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, token.bearer())
            .header(CONTENT_TYPE, JSON_MIME)
            .body(body.to_vec())
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Drive search expression for a non-trashed file with exactly this name.
fn name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{}' and trashed = false", escaped)
}

/// `multipart/related` body: JSON metadata part, then the media part.
fn multipart_related(boundary: &str, name: &str, media: &[u8]) -> serde_json::Result<Vec<u8>> {
    let metadata = serde_json::to_vec(&CreateFileMetadata {
        name,
        mime_type: JSON_MIME,
    })?;

    let mut out = Vec::with_capacity(media.len() + metadata.len() + 256);
    out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    out.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    out.extend_from_slice(&metadata);
    out.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    out.extend_from_slice(format!("Content-Type: {}\r\n\r\n", JSON_MIME).as_bytes());
    out.extend_from_slice(media);
    out.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
    Ok(out)
}
