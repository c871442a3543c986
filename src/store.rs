use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::models::LogRecord;

/// Destination for structured occupancy records.
pub trait RecordStore: Send + Sync + 'static {
    fn record(
        &self,
        record: &LogRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Non-blocking hand-off from the log sink to the store writer task.
///
/// The queue is bounded. When it is full, or the writer is gone, the record is
/// dropped for the store and a warning is logged; the caller never waits.
#[derive(Clone)]
pub struct StoreForwarder {
    tx: mpsc::Sender<LogRecord>,
}

impl StoreForwarder {
    /// Returns `true` if the record was queued.
    pub fn forward(&self, record: &LogRecord) -> bool {
        match self.tx.try_send(record.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    device = %dropped.device_id,
                    kind = %dropped.kind,
                    "Store queue full, record not persisted"
                );
                false
            }
            Err(TrySendError::Closed(dropped)) => {
                tracing::warn!(
                    device = %dropped.device_id,
                    kind = %dropped.kind,
                    "Store writer stopped, record not persisted"
                );
                false
            }
        }
    }

    /// A forwarder whose queue is never drained. Useful when no store is wired.
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

/// Create a forwarder and the queue receiver feeding [`run_store_writer`].
pub fn store_channel(capacity: usize) -> (StoreForwarder, mpsc::Receiver<LogRecord>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (StoreForwarder { tx }, rx)
}

/// Drain queued records into the store until every forwarder is dropped.
pub async fn run_store_writer<S: RecordStore>(store: Arc<S>, mut rx: mpsc::Receiver<LogRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = store.record(&record).await {
            tracing::error!(
                device = %record.device_id,
                kind = %record.kind,
                "Failed to persist record: {}",
                e
            );
        }
    }
    tracing::info!("Store writer stopped");
}

pub fn spawn_store_writer<S: RecordStore>(
    store: Arc<S>,
    rx: mpsc::Receiver<LogRecord>,
) -> JoinHandle<()> {
    tokio::spawn(run_store_writer(store, rx))
}
