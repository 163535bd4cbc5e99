//! Reconciliation engine: two-replica sync of the journal with its backup.

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::JournalSnapshot;

use super::merge::merge_snapshots;
use super::{
    BackupAdapter, Fetched, RemoteDocumentHandle, RemoteStore, StoreError, SyncError, SyncSession,
};

/// Which path a reconcile took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    /// No backup existed; local state was uploaded as-is.
    Bootstrapped,
    /// Backup downloaded, merged, and written back.
    Merged,
    /// Backup exists but could not be read; nothing was written.
    RemoteUnreadable,
}

/// Result of a successful reconcile.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Authoritative journal to hand back to the local holder
    pub snapshot: JournalSnapshot,
    pub handle: RemoteDocumentHandle,
    pub kind: ReconcileKind,
}

impl ReconcileOutcome {
    /// Non-fatal problem worth telling the user about.
    pub fn soft_error(&self) -> Option<SyncError> {
        match self.kind {
            ReconcileKind::RemoteUnreadable => Some(SyncError::RemoteUnreadable),
            _ => None,
        }
    }
}

/// Keeps the local journal and the remote backup converged.
pub struct ReconcileEngine {
    adapter: BackupAdapter,
}

impl ReconcileEngine {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            adapter: BackupAdapter::new(store),
        }
    }

    pub fn adapter(&self) -> &BackupAdapter {
        &self.adapter
    }

    /// Produce the authoritative snapshot for this login/sync.
    ///
    /// Never writes when the remote payload could not be read, and never
    /// drops a trade that exists on only one side. `local` is not touched;
    /// the caller replaces its copy with the returned snapshot.
    pub async fn reconcile(
        &self,
        session: &SyncSession,
        local: &JournalSnapshot,
    ) -> Result<ReconcileOutcome, SyncError> {
        let Some((handle, fetched)) = self.resolve(session).await? else {
            info!(trades = local.trade_count(), "No backup found, uploading local journal");
            let mut stamped = local.clone();
            stamped.last_updated = session.now();
            let handle = self.adapter.upload(session, &stamped, None).await?;
            return Ok(ReconcileOutcome {
                snapshot: stamped,
                handle,
                kind: ReconcileKind::Bootstrapped,
            });
        };

        let Fetched::Document(remote) = fetched else {
            warn!(handle = %handle, "Backup unreadable, keeping local journal and skipping upload");
            return Ok(ReconcileOutcome {
                snapshot: local.clone(),
                handle,
                kind: ReconcileKind::RemoteUnreadable,
            });
        };

        let merged = merge_snapshots(
            local,
            &remote,
            session.now(),
            &session.config().template_marker,
        );

        info!(
            local_trades = local.trade_count(),
            remote_trades = remote.trades.len(),
            merged_trades = merged.trade_count(),
            "Merged journal with backup"
        );

        self.adapter.upload(session, &merged, Some(&handle)).await?;

        Ok(ReconcileOutcome {
            snapshot: merged,
            handle,
            kind: ReconcileKind::Merged,
        })
    }

    /// Find the backup and read it. `None` means there is no backup.
    ///
    /// A cached handle whose document has been deleted is dropped and the
    /// backup is looked up by name again.
    async fn resolve(
        &self,
        session: &SyncSession,
    ) -> Result<Option<(RemoteDocumentHandle, Fetched)>, SyncError> {
        if let Some(handle) = session.cached_handle().await {
            match self.adapter.fetch(session, &handle).await? {
                Fetched::Missing => {
                    warn!(handle = %handle, "Cached backup no longer exists, looking it up again");
                    session.forget_handle().await;
                }
                fetched => return Ok(Some((handle, fetched))),
            }
        }

        let Some(handle) = self.adapter.locate(session).await? else {
            return Ok(None);
        };
        session.remember_handle(handle.clone()).await;

        match self.adapter.fetch(session, &handle).await? {
            Fetched::Missing => Err(StoreError::NotFound.into()),
            fetched => Ok(Some((handle, fetched))),
        }
    }
}
