//! In-memory doubles for the store and credential seams.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{
    Clock, CredentialSupplier, RemoteDocumentHandle, RemoteFile, RemoteStore, StoreError,
    SyncError, Token,
};

struct StoredDoc {
    handle: RemoteDocumentHandle,
    name: String,
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct StoreState {
    docs: Vec<StoredDoc>,
    next_id: u64,
    rejected_tokens: HashSet<String>,
    read_failure: Option<StoreError>,
    find_calls: usize,
    read_calls: usize,
    create_calls: usize,
    replace_calls: usize,
}

impl StoreState {
    fn check(&self, token: &Token) -> Result<(), StoreError> {
        if self.rejected_tokens.contains(token.as_str()) {
            Err(StoreError::Unauthorized)
        } else {
            Ok(())
        }
    }

    fn insert(&mut self, name: &str, content: &[u8]) -> RemoteDocumentHandle {
        self.next_id += 1;
        let handle = RemoteDocumentHandle::new(format!("file-{:03}", self.next_id));
        let modified = base_time() + Duration::minutes(self.next_id as i64);
        self.docs.push(StoredDoc {
            handle: handle.clone(),
            name: name.to_string(),
            content: content.to_vec(),
            modified,
        });
        handle
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Remote store kept in memory, with call counters and failure knobs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document in place without counting it as a create.
    pub fn seed(&self, name: &str, content: &[u8]) -> RemoteDocumentHandle {
        self.state.lock().unwrap().insert(name, content)
    }

    /// Answer 401 whenever this token is presented.
    pub fn reject_token(&self, token: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_tokens
            .insert(token.to_string());
    }

    /// Delete a document behind the engine's back.
    pub fn remove(&self, handle: &RemoteDocumentHandle) {
        self.state.lock().unwrap().docs.retain(|d| &d.handle != handle);
    }

    pub fn fail_reads_with(&self, err: StoreError) {
        self.state.lock().unwrap().read_failure = Some(err);
    }

    pub fn content(&self, handle: &RemoteDocumentHandle) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .docs
            .iter()
            .find(|d| &d.handle == handle)
            .map(|d| d.content.clone())
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().unwrap().docs.len()
    }

    pub fn find_calls(&self) -> usize {
        self.state.lock().unwrap().find_calls
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().unwrap().read_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn replace_calls(&self) -> usize {
        self.state.lock().unwrap().replace_calls
    }

    pub fn write_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.create_calls + state.replace_calls
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn find_by_name(&self, token: &Token, name: &str) -> Result<Vec<RemoteFile>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.find_calls += 1;
        state.check(token)?;

        Ok(state
            .docs
            .iter()
            .filter(|d| d.name == name)
            .map(|d| RemoteFile {
                handle: d.handle.clone(),
                name: d.name.clone(),
                modified_time: Some(d.modified),
            })
            .collect())
    }

    async fn read(
        &self,
        token: &Token,
        handle: &RemoteDocumentHandle,
    ) -> Result<Vec<u8>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.read_calls += 1;
        state.check(token)?;
        if let Some(err) = state.read_failure.clone() {
            return Err(err);
        }

        state
            .docs
            .iter()
            .find(|d| &d.handle == handle)
            .map(|d| d.content.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn create(
        &self,
        token: &Token,
        name: &str,
        body: &[u8],
    ) -> Result<RemoteDocumentHandle, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        state.check(token)?;
        Ok(state.insert(name, body))
    }

    async fn replace(
        &self,
        token: &Token,
        handle: &RemoteDocumentHandle,
        body: &[u8],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.replace_calls += 1;
        state.check(token)?;

        let doc = state
            .docs
            .iter_mut()
            .find(|d| &d.handle == handle)
            .ok_or(StoreError::NotFound)?;
        doc.content = body.to_vec();
        Ok(())
    }
}

/// Credential supplier that replays a fixed script of results.
/// Once the script runs out every acquire fails with `AuthExpired`.
pub struct ScriptedSupplier {
    script: Mutex<VecDeque<Result<Token, SyncError>>>,
    calls: Mutex<Vec<bool>>,
}

impl ScriptedSupplier {
    pub fn new(script: Vec<Result<Token, SyncError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The `interactive` flag of every acquire, in order.
    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialSupplier for ScriptedSupplier {
    async fn acquire(&self, interactive: bool) -> Result<Token, SyncError> {
        self.calls.lock().unwrap().push(interactive);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SyncError::AuthExpired))
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Clock pinned to 2024-03-01T12:00:00Z.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()))
}
