//! Upload/download of the backup document, with one-shot credential refresh.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::{BackupDocument, JournalSnapshot};

use super::store::pick_latest;
use super::{RemoteDocumentHandle, RemoteStore, StoreError, SyncError, SyncSession, Token};

/// What a read of the backup produced.
#[derive(Debug)]
pub enum Fetched {
    Document(BackupDocument),
    /// Content exists but is not a journal document.
    Unreadable,
    /// The handle no longer names a document.
    Missing,
}

/// Translates snapshots to and from the remote backup file.
pub struct BackupAdapter {
    store: Arc<dyn RemoteStore>,
}

impl BackupAdapter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Find the backup by its well-known name. `None` means no backup yet.
    pub async fn locate(
        &self,
        session: &SyncSession,
    ) -> Result<Option<RemoteDocumentHandle>, SyncError> {
        let name = session.config().backup_file_name.as_str();
        let store = &self.store;

        let files = self
            .with_refresh(session, move |token: Token| async move {
                store.find_by_name(&token, name).await
            })
            .await?;

        if files.len() > 1 {
            warn!(
                name = %name,
                matches = files.len(),
                "Multiple backups share the same name, using the most recently modified"
            );
        }

        match pick_latest(files) {
            Some(file) => {
                debug!(name = %file.name, handle = %file.handle, modified = ?file.modified_time, "Found backup");
                Ok(Some(file.handle))
            }
            None => {
                debug!(name = %name, "No backup found");
                Ok(None)
            }
        }
    }

    /// Write `snapshot` to the backup.
    ///
    /// Without a handle a new document is created; with one, that exact
    /// document is replaced. `lastUpdated` is the snapshot's own stamp and the
    /// payload is serialized once, so repeated writes of one snapshot, and the
    /// single retry after a token refresh, send identical bytes.
    pub async fn upload(
        &self,
        session: &SyncSession,
        snapshot: &JournalSnapshot,
        handle: Option<&RemoteDocumentHandle>,
    ) -> Result<RemoteDocumentHandle, SyncError> {
        let bytes = BackupDocument::from_snapshot(snapshot)
            .to_bytes()
            .map_err(|e| SyncError::TransportFailure(format!("serialize backup: {}", e)))?;
        let body = bytes.as_slice();
        let store = &self.store;

        let handle = match handle {
            None => {
                let name = session.config().backup_file_name.as_str();
                let created = self
                    .with_refresh(session, move |token: Token| async move {
                        store.create(&token, name, body).await
                    })
                    .await?;
                info!(handle = %created, trades = snapshot.trade_count(), bytes = body.len(), "Created backup");
                created
            }
            Some(existing) => {
                self.with_refresh(session, move |token: Token| async move {
                    store.replace(&token, existing, body).await
                })
                .await?;
                info!(handle = %existing, trades = snapshot.trade_count(), bytes = body.len(), "Replaced backup");
                existing.clone()
            }
        };

        session.remember_handle(handle.clone()).await;
        Ok(handle)
    }

    /// Fetch and parse the backup. `Ok(None)` means the content is not a
    /// journal document. A 401 is reported as `AuthExpired` with no retry.
    pub async fn download(
        &self,
        session: &SyncSession,
        handle: &RemoteDocumentHandle,
    ) -> Result<Option<BackupDocument>, SyncError> {
        match self.fetch(session, handle).await? {
            Fetched::Document(doc) => Ok(Some(doc)),
            Fetched::Unreadable => Ok(None),
            Fetched::Missing => Err(StoreError::NotFound.into()),
        }
    }

    /// Like [`download`](Self::download), but reports a vanished document
    /// as [`Fetched::Missing`] instead of an error.
    pub async fn fetch(
        &self,
        session: &SyncSession,
        handle: &RemoteDocumentHandle,
    ) -> Result<Fetched, SyncError> {
        let token = session.token().await;
        let bytes = match self.store.read(&token, handle).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound) => {
                debug!(handle = %handle, "Backup handle no longer exists");
                return Ok(Fetched::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        debug!(handle = %handle, bytes = bytes.len(), "Downloaded backup");
        Ok(match BackupDocument::parse(&bytes) {
            Some(doc) => Fetched::Document(doc),
            None => Fetched::Unreadable,
        })
    }

    /// Run `op`; on 401 refresh the token silently and run it exactly once more.
    async fn with_refresh<T, F, Fut>(&self, session: &SyncSession, op: F) -> Result<T, SyncError>
    where
        F: Fn(Token) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match op(session.token().await).await {
            Err(StoreError::Unauthorized) => {
                warn!("Request unauthorized, refreshing token once");
                let fresh = session.refresh_silently().await.map_err(|e| {
                    warn!(error = %e, "Silent refresh failed");
                    SyncError::AuthExpired
                })?;
                op(fresh).await.map_err(SyncError::from)
            }
            other => other.map_err(SyncError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StrategyProfile, Trade, TradeDirection};
    use crate::sync::testing::{fixed_clock, MemoryStore, ScriptedSupplier};
    use crate::sync::{StaticTokenSupplier, SyncConfig};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn snapshot() -> JournalSnapshot {
        let entry = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut trade = Trade::new("ES", TradeDirection::Long, entry, dec!(5000), dec!(1));
        trade.id = "t-1".to_string();
        JournalSnapshot::new(vec![trade], StrategyProfile::default(), None, entry)
    }

    async fn session(tokens: Vec<Result<Token, SyncError>>) -> SyncSession {
        let supplier = Arc::new(ScriptedSupplier::new(tokens));
        SyncSession::login(supplier, SyncConfig::default(), true)
            .await
            .unwrap()
            .with_clock(fixed_clock())
    }

    #[tokio::test]
    async fn test_upload_without_handle_creates() {
        let store = Arc::new(MemoryStore::new());
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("t1"))]).await;

        let handle = assert_ok!(adapter.upload(&session, &snapshot(), None).await);

        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.replace_calls(), 0);
        assert_eq!(session.cached_handle().await, Some(handle.clone()));

        let doc = BackupDocument::parse(&store.content(&handle).unwrap()).unwrap();
        assert_eq!(doc.trades.len(), 1);
        assert_eq!(doc.last_updated, Some(snapshot().last_updated));
    }

    #[tokio::test]
    async fn test_replace_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let handle = store.seed("trademind_backup.json", b"{\"trades\": []}");
        let adapter = BackupAdapter::new(store.clone());
        // Wall clock: the write must not depend on when it happens
        let supplier = Arc::new(ScriptedSupplier::new(vec![Ok(Token::new("t1"))]));
        let session = SyncSession::login(supplier, SyncConfig::default(), true)
            .await
            .unwrap();
        let snap = snapshot();

        assert_ok!(adapter.upload(&session, &snap, Some(&handle)).await);
        let first = store.content(&handle).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let again = assert_ok!(adapter.upload(&session, &snap, Some(&handle)).await);
        let second = store.content(&handle).unwrap();

        assert_eq!(again, handle);
        assert_eq!(store.replace_calls(), 2);
        assert_eq!(store.create_calls(), 0);
        assert_eq!(first, second);
        assert_eq!(store.document_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_refreshes_once_on_401() {
        let store = Arc::new(MemoryStore::new());
        store.reject_token("stale");
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("stale")), Ok(Token::new("fresh"))]).await;

        let handle = assert_ok!(adapter.upload(&session, &snapshot(), None).await);

        // One rejected attempt, one effective write
        assert_eq!(store.create_calls(), 2);
        assert_eq!(store.document_count(), 1);
        assert!(store.content(&handle).is_some());
        assert_eq!(session.token().await.as_str(), "fresh");
    }

    #[tokio::test]
    async fn test_upload_second_401_is_auth_expired() {
        let store = Arc::new(MemoryStore::new());
        store.reject_token("stale");
        store.reject_token("also-stale");
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("stale")), Ok(Token::new("also-stale"))]).await;

        let err = assert_err!(adapter.upload(&session, &snapshot(), None).await);

        assert_eq!(err, SyncError::AuthExpired);
        assert_eq!(store.create_calls(), 2);
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failed_refresh_is_auth_expired() {
        let store = Arc::new(MemoryStore::new());
        let handle = store.seed("trademind_backup.json", b"{\"trades\": []}");
        store.reject_token("stale");
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("stale")), Err(SyncError::AuthExpired)]).await;

        let err = assert_err!(adapter.upload(&session, &snapshot(), Some(&handle)).await);

        assert_eq!(err, SyncError::AuthExpired);
        assert_eq!(store.replace_calls(), 1);
    }

    #[tokio::test]
    async fn test_static_token_is_not_replayed_after_401() {
        let store = Arc::new(MemoryStore::new());
        store.reject_token("abc");
        let adapter = BackupAdapter::new(store.clone());
        let supplier = Arc::new(StaticTokenSupplier::new("abc"));
        let session = SyncSession::login(supplier, SyncConfig::default(), true)
            .await
            .unwrap();

        let err = assert_err!(adapter.upload(&session, &snapshot(), None).await);

        assert_eq!(err, SyncError::AuthExpired);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn test_download_401_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let handle = store.seed("trademind_backup.json", b"{\"trades\": []}");
        store.reject_token("stale");
        let supplier = Arc::new(ScriptedSupplier::new(vec![Ok(Token::new("stale"))]));
        let session = SyncSession::login(supplier.clone(), SyncConfig::default(), true)
            .await
            .unwrap();
        let adapter = BackupAdapter::new(store.clone());

        let err = assert_err!(adapter.download(&session, &handle).await);

        assert_eq!(err, SyncError::AuthExpired);
        assert_eq!(supplier.calls(), vec![true]);
    }

    #[tokio::test]
    async fn test_download_garbage_is_none() {
        let store = Arc::new(MemoryStore::new());
        let handle = store.seed("trademind_backup.json", b"{corrupted");
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("t1"))]).await;

        let doc = assert_ok!(adapter.download(&session, &handle).await);
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_download_transport_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        let handle = store.seed("trademind_backup.json", b"{\"trades\": []}");
        store.fail_reads_with(StoreError::Status {
            status: 500,
            body: "backend error".to_string(),
        });
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("t1"))]).await;

        let err = assert_err!(adapter.download(&session, &handle).await);
        assert!(matches!(err, SyncError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn test_fetch_reports_missing_document() {
        let store = Arc::new(MemoryStore::new());
        let handle = store.seed("trademind_backup.json", b"{\"trades\": []}");
        store.remove(&handle);
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("t1"))]).await;

        let fetched = assert_ok!(adapter.fetch(&session, &handle).await);
        assert!(matches!(fetched, Fetched::Missing));

        let err = assert_err!(adapter.download(&session, &handle).await);
        assert!(matches!(err, SyncError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn test_locate_picks_latest_of_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let older = store.seed("trademind_backup.json", b"{\"trades\": []}");
        let newer = store.seed("trademind_backup.json", b"{\"trades\": []}");
        store.seed("other.json", b"{}");
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("t1"))]).await;

        let found = assert_ok!(adapter.locate(&session).await);
        assert_eq!(found, Some(newer));
        assert_ne!(found, Some(older));
    }

    #[tokio::test]
    async fn test_locate_nothing() {
        let store = Arc::new(MemoryStore::new());
        let adapter = BackupAdapter::new(store.clone());
        let session = session(vec![Ok(Token::new("t1"))]).await;

        assert_eq!(assert_ok!(adapter.locate(&session).await), None);
    }
}
