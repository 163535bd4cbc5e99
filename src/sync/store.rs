//! Remote document store seam.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{StoreError, Token};

/// Opaque identifier of the remote backup document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteDocumentHandle(String);

impl RemoteDocumentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteDocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A name-lookup hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub handle: RemoteDocumentHandle,
    pub name: String,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Key-less blob store addressed by file name.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Non-trashed documents named `name`.
    async fn find_by_name(&self, token: &Token, name: &str) -> Result<Vec<RemoteFile>, StoreError>;

    /// Raw document content.
    async fn read(&self, token: &Token, handle: &RemoteDocumentHandle)
        -> Result<Vec<u8>, StoreError>;

    /// Create a new document and return its handle.
    async fn create(
        &self,
        token: &Token,
        name: &str,
        body: &[u8],
    ) -> Result<RemoteDocumentHandle, StoreError>;

    /// Replace the full content of an existing document.
    async fn replace(
        &self,
        token: &Token,
        handle: &RemoteDocumentHandle,
        body: &[u8],
    ) -> Result<(), StoreError>;
}

/// Choose among several same-named documents: most recently modified,
/// then smallest id. Files without a modified time sort oldest.
pub fn pick_latest(files: Vec<RemoteFile>) -> Option<RemoteFile> {
    files.into_iter().max_by(|a, b| {
        a.modified_time
            .cmp(&b.modified_time)
            .then_with(|| b.handle.cmp(&a.handle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(id: &str, modified: Option<i64>) -> RemoteFile {
        RemoteFile {
            handle: RemoteDocumentHandle::new(id),
            name: "trademind_backup.json".to_string(),
            modified_time: modified.and_then(|s| Utc.timestamp_opt(s, 0).single()),
        }
    }

    #[test]
    fn test_pick_latest_prefers_most_recent() {
        let picked = pick_latest(vec![
            file("a", Some(100)),
            file("b", Some(300)),
            file("c", None),
        ])
        .unwrap();
        assert_eq!(picked.handle.as_str(), "b");
    }

    #[test]
    fn test_pick_latest_tie_breaks_on_id() {
        let picked = pick_latest(vec![file("z", Some(100)), file("m", Some(100))]).unwrap();
        assert_eq!(picked.handle.as_str(), "m");
    }

    #[test]
    fn test_pick_latest_empty() {
        assert!(pick_latest(vec![]).is_none());
    }
}
