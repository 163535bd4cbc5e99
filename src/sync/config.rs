//! Sync configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::TEMPLATE_MARKER;

pub const DEFAULT_BACKUP_FILE: &str = "trademind_backup.json";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Configuration for the backup sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Well-known name of the single backup file
    pub backup_file_name: String,

    /// Drive metadata API base URL
    pub drive_api_base: String,

    /// Drive media upload API base URL
    pub drive_upload_base: String,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,

    /// Strategy name substring marking the untouched seed profile
    pub template_marker: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backup_file_name: DEFAULT_BACKUP_FILE.to_string(),
            drive_api_base: DRIVE_API_BASE.to_string(),
            drive_upload_base: DRIVE_UPLOAD_BASE.to_string(),
            request_timeout_secs: 30,
            template_marker: TEMPLATE_MARKER.to_string(),
        }
    }
}

impl SyncConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let request_timeout_secs = match std::env::var("TRADEMIND_HTTP_TIMEOUT_SECS") {
            Ok(v) => v
                .parse()
                .context("Invalid TRADEMIND_HTTP_TIMEOUT_SECS")?,
            Err(_) => defaults.request_timeout_secs,
        };

        Ok(Self {
            backup_file_name: std::env::var("TRADEMIND_BACKUP_FILE")
                .unwrap_or(defaults.backup_file_name),
            drive_api_base: std::env::var("TRADEMIND_DRIVE_API").unwrap_or(defaults.drive_api_base),
            drive_upload_base: std::env::var("TRADEMIND_DRIVE_UPLOAD_API")
                .unwrap_or(defaults.drive_upload_base),
            request_timeout_secs,
            template_marker: std::env::var("TRADEMIND_TEMPLATE_MARKER")
                .unwrap_or(defaults.template_marker),
        })
    }
}
