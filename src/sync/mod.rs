//! Backup sync: credentials, remote store seam, upload/download adapter,
//! merge rules, and the reconciliation engine.

mod adapter;
mod config;
mod credentials;
mod engine;
mod error;
mod merge;
mod session;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{BackupAdapter, Fetched};
pub use config::SyncConfig;
pub use credentials::{CredentialSupplier, RefreshTokenSupplier, StaticTokenSupplier, Token};
pub use engine::{ReconcileEngine, ReconcileKind, ReconcileOutcome};
pub use error::{StoreError, SyncError};
pub use session::{Clock, SyncSession};
pub use store::{RemoteDocumentHandle, RemoteFile, RemoteStore};
