//! # Umbra query history
//!
//! Every completed query produces one [`Record`] describing its
//! outcome. Records flow through a bounded channel into a dedicated
//! flusher task which writes them to storage in batches of at most 100,
//! triggered by batch size, a minute tick, or shutdown.
//!
//! The channel holds 100 records; when it is full, producers wait.
//! Dropping history silently would be worse than brief backpressure on
//! an overloaded box.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use umbra_proto::Question;
use umbra_store::{HistoryRecord, Store};

/// Queue capacity and maximum batch size.
const CHUNK_SIZE: usize = 100;

/// Deadline for one storage write.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval of the time-based flush.
const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a completed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Served from the answer cache.
    Cached,
    /// Answered with a synthetic loopback record.
    Blocked,
    /// Upstream resolution failed; client got SERVFAIL.
    Failed,
    /// Forwarded and answered by an upstream.
    Resolved,
}

impl Status {
    /// Returns the storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
            Self::Resolved => "resolved",
        }
    }
}

/// One per-query history entry.
#[derive(Debug, Clone)]
pub struct Record {
    /// Query type mnemonic.
    pub qtype: String,
    /// Queried name.
    pub name: String,
    /// Outcome.
    pub status: Status,
    /// Client host (no port).
    pub client_addr: String,
}

impl Record {
    /// Builds a record from the question and the client address.
    pub fn new(client: SocketAddr, question: &Question, status: Status) -> Self {
        Self {
            qtype: question.qtype.to_string(),
            name: question.qname.to_string(),
            status,
            client_addr: client.ip().to_string(),
        }
    }

    fn into_row(self) -> HistoryRecord {
        HistoryRecord {
            domain: self.name,
            qtype: self.qtype,
            status: self.status.as_str().to_string(),
            client_addr: self.client_addr,
        }
    }
}

/// Storage seam for the flusher; the real implementation is
/// [`umbra_store::Store`].
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    /// Persists one batch of records.
    async fn add_history_records(&self, records: Vec<HistoryRecord>) -> umbra_store::Result<()>;
}

#[async_trait]
impl HistoryStorage for Store {
    async fn add_history_records(&self, records: Vec<HistoryRecord>) -> umbra_store::Result<()> {
        Store::add_history_records(self, &records).await
    }
}

/// Handle used by the query pipeline to enqueue records.
#[derive(Clone)]
pub struct HistoryLogger {
    tx: mpsc::Sender<Record>,
}

impl HistoryLogger {
    /// Creates the logger and spawns its flusher task. The task runs
    /// until `shutdown` fires or every logger handle is dropped, then
    /// flushes the remainder.
    pub fn spawn(
        storage: Arc<dyn HistoryStorage>,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHUNK_SIZE);
        let handle = tokio::spawn(flusher(storage, rx, shutdown));
        (Self { tx }, handle)
    }

    /// Enqueues one record, waiting if the queue is full.
    pub async fn save(&self, record: Record) {
        if self.tx.send(record).await.is_err() {
            warn!("history flusher is gone; record dropped");
        }
    }
}

async fn flusher(
    storage: Arc<dyn HistoryStorage>,
    mut rx: mpsc::Receiver<Record>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut chunk: Vec<Record> = Vec::with_capacity(CHUNK_SIZE);
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush(storage.as_ref(), &mut chunk).await;
            }
            received = rx.recv() => {
                match received {
                    Some(record) => {
                        chunk.push(record);
                        if chunk.len() == CHUNK_SIZE {
                            flush(storage.as_ref(), &mut chunk).await;
                        }
                    }
                    None => {
                        flush(storage.as_ref(), &mut chunk).await;
                        return;
                    }
                }
            }
            _ = shutdown.recv() => {
                // Drain whatever producers managed to enqueue, then
                // flush the remainder.
                while let Ok(record) = rx.try_recv() {
                    chunk.push(record);
                    if chunk.len() == CHUNK_SIZE {
                        flush(storage.as_ref(), &mut chunk).await;
                    }
                }
                flush(storage.as_ref(), &mut chunk).await;
                debug!("history flusher stopping");
                return;
            }
        }
    }
}

/// Writes the chunk with a deadline. History is best-effort: a failed
/// or timed-out write is logged and the chunk discarded.
async fn flush(storage: &dyn HistoryStorage, chunk: &mut Vec<Record>) {
    if chunk.is_empty() {
        return;
    }

    let rows: Vec<HistoryRecord> = chunk.drain(..).map(Record::into_row).collect();

    match timeout(FLUSH_TIMEOUT, storage.add_history_records(rows)).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => error!(error = %error, "unable to save history chunk"),
        Err(_) => error!("history write timed out; chunk dropped"),
    }
}
