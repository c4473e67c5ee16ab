//! Ordered local persistence.
//!
//! Read/unread writes for the same id must land in the order they were
//! issued, so all local writes go through one task that applies them
//! sequentially and reports each outcome on the engine's event channel.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::SyncEvent;
use super::ports::LocalStore;
use crate::util::catch_task_panic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteOp {
    MarkRead(String),
    MarkReadMany(Vec<String>),
    ClearRead(String),
    SaveHideRead(bool),
}

impl WriteOp {
    fn label(&self) -> &'static str {
        match self {
            WriteOp::MarkRead(_) => "persist_read_id",
            WriteOp::MarkReadMany(_) => "persist_read_ids",
            WriteOp::ClearRead(_) => "clear_persisted_read_id",
            WriteOp::SaveHideRead(_) => "save_hide_read",
        }
    }

    async fn apply(&self, store: &dyn LocalStore) -> anyhow::Result<()> {
        match self {
            WriteOp::MarkRead(id) => store.persist_read_id(id).await,
            WriteOp::MarkReadMany(ids) => store.persist_read_ids(ids).await,
            WriteOp::ClearRead(id) => store.clear_persisted_read_id(id).await,
            WriteOp::SaveHideRead(enabled) => store.save_hide_read(*enabled).await,
        }
    }
}

pub(crate) struct LocalWriter {
    tx: Option<mpsc::UnboundedSender<WriteOp>>,
    handle: Option<JoinHandle<()>>,
}

impl LocalWriter {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub(crate) fn spawn(
        store: Arc<dyn LocalStore>,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        let handle = tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let label = op.label();
                let result = match catch_task_panic(op.apply(store.as_ref())).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(panic) => Err(format!("panicked: {}", panic)),
                };
                if let Err(e) = &result {
                    tracing::warn!(op = label, error = %e, "Local write failed");
                }
                let event = SyncEvent::LocalWriteFinished { op: label, result };
                if events.send(event).is_err() {
                    tracing::debug!(op = label, "Local write result dropped (engine gone)");
                }
            }
            tracing::debug!("Local writer stopped");
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queue a write. Returns false once the writer has been closed.
    pub(crate) fn submit(&self, op: WriteOp) -> bool {
        match &self.tx {
            Some(tx) => tx.send(op).is_ok(),
            None => false,
        }
    }

    /// Stop accepting writes and wait for the queued ones to finish.
    pub(crate) async fn close(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Local writer task ended abnormally");
            }
        }
    }
}

impl Drop for LocalWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
