//! Drive v3 request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File resource (subset of fields requested via `fields=`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

/// Response from `GET /files`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// Metadata part of a multipart create.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileMetadata<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
}
