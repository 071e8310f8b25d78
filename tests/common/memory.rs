//! In-memory replicable structures.
//!
//! - `MemoryLog`: append-only log, closes itself (`Closable`)
//! - `MemoryDrive`: files stored as a metadata feed and a content feed,
//!   closed feed by feed (`FeedGroup`)
//!
//! Both record close calls into a shared `Journal` so tests can assert
//! teardown order.

use super::wire::{open_session, Mux, RecordStore};
use rand::RngCore;
use replication_client::{
    BoxFuture, ClientError, CloseCapability, Closable, ReplicateOptions, Replicable,
    ReplicationSession, ReplicationStream, Result, StructureKey, KEY_LENGTH,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Ordered record of lifecycle calls across structures and collaborators.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

pub fn random_key() -> StructureKey {
    let mut bytes = [0u8; KEY_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    StructureKey::from_bytes(bytes)
}

/// Wait up to `limit` for a watch value to satisfy `f`.
async fn wait_until<T>(rx: &mut watch::Receiver<T>, limit: Duration, f: impl FnMut(&T) -> bool) -> bool {
    tokio::time::timeout(limit, rx.wait_for(f)).await.map(|r| r.is_ok()).unwrap_or(false)
}

// =============================================================================
// MemoryLog
// =============================================================================

struct LogInner {
    key: StructureKey,
    label: String,
    journal: Journal,
    records: Mutex<Vec<Vec<u8>>>,
    len_tx: watch::Sender<usize>,
    ready_calls: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    close_delay: Mutex<Option<Duration>>,
    replicate_options: Mutex<Vec<ReplicateOptions>>,
}

/// Append-only in-memory log.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

impl MemoryLog {
    pub fn new(key: StructureKey, label: impl Into<String>, journal: Journal) -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(LogInner {
                key,
                label: label.into(),
                journal,
                records: Mutex::new(Vec::new()),
                len_tx,
                ready_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                close_delay: Mutex::new(None),
                replicate_options: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A request log with a random key.
    pub fn request(journal: Journal) -> Self {
        Self::new(random_key(), "request", journal)
    }

    /// Make `close` take `delay` before it marks the log closed.
    pub fn with_close_delay(self, delay: Duration) -> Self {
        *self.inner.close_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Options passed to `replicate` and `replicate_into`, in call order.
    pub fn replicate_options(&self) -> Vec<ReplicateOptions> {
        self.inner.replicate_options.lock().unwrap().clone()
    }

    pub fn append(&self, data: impl Into<Vec<u8>>) {
        let len = {
            let mut records = self.inner.records.lock().unwrap();
            records.push(data.into());
            records.len()
        };
        self.inner.len_tx.send_replace(len);
    }

    pub fn get(&self, index: usize) -> Option<Vec<u8>> {
        self.inner.records.lock().unwrap().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().unwrap().len()
    }

    pub fn position(&self, data: &[u8]) -> Option<usize> {
        self.inner.records.lock().unwrap().iter().rposition(|r| r == data)
    }

    /// Wait until the log holds at least `len` records.
    pub async fn wait_for_len(&self, len: usize, limit: Duration) -> bool {
        let mut rx = self.inner.len_tx.subscribe();
        wait_until(&mut rx, limit, |n| *n >= len).await
    }

    pub fn ready_calls(&self) -> usize {
        self.inner.ready_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl RecordStore for MemoryLog {
    fn store_key(&self) -> StructureKey {
        self.inner.key
    }

    fn snapshot(&self) -> Vec<Vec<u8>> {
        self.inner.records.lock().unwrap().clone()
    }

    fn apply(&self, records: Vec<Vec<u8>>) {
        for record in records {
            self.append(record);
        }
    }
}

impl Closable for MemoryLog {
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let delay = *self.inner.close_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.journal.record(format!("{}.close", self.inner.label));
            self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn join_session(session: &ReplicationSession, store: Arc<dyn RecordStore>) -> Result<()> {
    let mux = session
        .protocol::<Mux>()
        .ok_or_else(|| ClientError::structure("replicate", "session uses a foreign protocol"))?;
    mux.attach(store);
    Ok(())
}

impl Replicable for MemoryLog {
    fn key(&self) -> StructureKey {
        self.inner.key
    }

    fn ready(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.inner.ready_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn replicate(&self, opts: ReplicateOptions) -> Result<ReplicationStream> {
        self.inner.replicate_options.lock().unwrap().push(opts);
        Ok(open_session(Arc::new(self.clone()), Vec::new()))
    }

    fn replicate_into(&self, session: &ReplicationSession, opts: ReplicateOptions) -> Result<()> {
        self.inner.replicate_options.lock().unwrap().push(opts);
        join_session(session, Arc::new(self.clone()))
    }

    fn close_capability(&self) -> CloseCapability<'_> {
        CloseCapability::Closable(self)
    }

    fn open_remote(&self, key: StructureKey) -> BoxFuture<'_, Self> {
        let journal = self.inner.journal.clone();
        Box::pin(async move { Ok(MemoryLog::new(key, "response", journal)) })
    }

    fn kind(&self) -> &'static str {
        "memory_log"
    }
}

// =============================================================================
// MemoryDrive
// =============================================================================

struct DriveInner {
    key: StructureKey,
    metadata: MemoryLog,
    content: MemoryLog,
}

/// Hierarchical in-memory structure: file names in `metadata`, bytes in `content`.
#[derive(Clone)]
pub struct MemoryDrive {
    inner: Arc<DriveInner>,
}

impl MemoryDrive {
    pub fn new(key: StructureKey, label: &str, journal: Journal) -> Self {
        let mut content_key = *key.as_bytes();
        content_key.iter_mut().for_each(|b| *b ^= 0x55);

        Self {
            inner: Arc::new(DriveInner {
                key,
                metadata: MemoryLog::new(key, format!("{}.metadata", label), journal.clone()),
                content: MemoryLog::new(
                    StructureKey::from_bytes(content_key),
                    format!("{}.content", label),
                    journal,
                ),
            }),
        }
    }

    pub fn request(journal: Journal) -> Self {
        Self::new(random_key(), "request", journal)
    }

    pub fn write_file(&self, name: &str, data: impl Into<Vec<u8>>) {
        // Content first so a visible name always has its bytes
        self.inner.content.append(data);
        self.inner.metadata.append(name.as_bytes().to_vec());
    }

    pub fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        let index = self.inner.metadata.position(name.as_bytes())?;
        self.inner.content.get(index)
    }

    /// Wait until `name` can be read.
    pub async fn wait_for_file(&self, name: &str, limit: Duration) -> Option<Vec<u8>> {
        let mut rx = self.inner.metadata.inner.len_tx.subscribe();
        let found = wait_until(&mut rx, limit, |_| self.read_file(name).is_some()).await;
        if found {
            self.read_file(name)
        } else {
            None
        }
    }

    pub fn metadata(&self) -> &MemoryLog {
        &self.inner.metadata
    }

    pub fn content(&self) -> &MemoryLog {
        &self.inner.content
    }

    /// Options the drive replicated with. Recorded on the metadata feed.
    pub fn replicate_options(&self) -> Vec<ReplicateOptions> {
        self.inner.metadata.replicate_options()
    }

    fn record_options(&self, opts: ReplicateOptions) {
        self.inner.metadata.inner.replicate_options.lock().unwrap().push(opts);
    }
}

impl RecordStore for MemoryDrive {
    fn store_key(&self) -> StructureKey {
        self.inner.key
    }

    fn snapshot(&self) -> Vec<Vec<u8>> {
        let names = self.inner.metadata.snapshot();
        let contents = self.inner.content.snapshot();
        names
            .into_iter()
            .zip(contents)
            .map(|(name, data)| serde_json::to_vec(&(name, data)).unwrap())
            .collect()
    }

    fn apply(&self, records: Vec<Vec<u8>>) {
        for record in records {
            if let Ok((name, data)) = serde_json::from_slice::<(Vec<u8>, Vec<u8>)>(&record) {
                self.inner.content.append(data);
                self.inner.metadata.append(name);
            }
        }
    }
}

impl Replicable for MemoryDrive {
    fn key(&self) -> StructureKey {
        self.inner.key
    }

    fn ready(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.inner.metadata.ready().await?;
            self.inner.content.ready().await
        })
    }

    fn replicate(&self, opts: ReplicateOptions) -> Result<ReplicationStream> {
        self.record_options(opts);
        Ok(open_session(Arc::new(self.clone()), Vec::new()))
    }

    fn replicate_into(&self, session: &ReplicationSession, opts: ReplicateOptions) -> Result<()> {
        self.record_options(opts);
        join_session(session, Arc::new(self.clone()))
    }

    fn close_capability(&self) -> CloseCapability<'_> {
        CloseCapability::FeedGroup(vec![&self.inner.metadata as &dyn Closable, &self.inner.content])
    }

    fn open_remote(&self, key: StructureKey) -> BoxFuture<'_, Self> {
        let journal = self.inner.metadata.inner.journal.clone();
        Box::pin(async move { Ok(MemoryDrive::new(key, "response", journal)) })
    }

    fn kind(&self) -> &'static str {
        "memory_drive"
    }
}
