//! Google Drive client backing the remote backup store.

mod drive_client;
mod types;

pub use drive_client::DriveClient;
