//! Sync session: per-login credential and handle state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{CredentialSupplier, RemoteDocumentHandle, SyncConfig, SyncError, Token};

/// Source of "now" for stamping writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// State that lives from login to logout.
///
/// Holds the current bearer token and the backup handle once it has been
/// resolved. Nothing here is process-global; drop the session (or call
/// [`SyncSession::logout`]) to forget it.
pub struct SyncSession {
    config: SyncConfig,
    supplier: Arc<dyn CredentialSupplier>,
    clock: Arc<dyn Clock>,
    token: RwLock<Token>,
    handle: RwLock<Option<RemoteDocumentHandle>>,
}

impl SyncSession {
    /// Start a session by acquiring the first token.
    pub async fn login(
        supplier: Arc<dyn CredentialSupplier>,
        config: SyncConfig,
        interactive: bool,
    ) -> Result<Self, SyncError> {
        let token = supplier.acquire(interactive).await?;
        info!(interactive = interactive, "Sync session started");

        Ok(Self {
            config,
            supplier,
            clock: Arc::new(SystemClock),
            token: RwLock::new(token),
            handle: RwLock::new(None),
        })
    }

    /// Replace the clock (used to pin write stamps).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn token(&self) -> Token {
        self.token.read().await.clone()
    }

    /// One silent re-acquire. The new token replaces the old one on success.
    pub async fn refresh_silently(&self) -> Result<Token, SyncError> {
        debug!("Attempting silent token refresh");
        let fresh = self.supplier.acquire(false).await?;
        *self.token.write().await = fresh.clone();
        Ok(fresh)
    }

    pub async fn cached_handle(&self) -> Option<RemoteDocumentHandle> {
        self.handle.read().await.clone()
    }

    pub async fn remember_handle(&self, handle: RemoteDocumentHandle) {
        *self.handle.write().await = Some(handle);
    }

    /// Drop a cached handle whose document no longer exists.
    pub async fn forget_handle(&self) {
        *self.handle.write().await = None;
    }

    /// End the session, discarding token and cached handle.
    pub fn logout(self) {
        info!("Sync session ended");
    }
}
