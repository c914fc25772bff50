//! The in-flight transfer registry.
//!
//! Every active transfer (sending or receiving) registers a handle here
//! keyed by its id, so external cancel/pause/resume commands can reach the
//! task driving the stream. A single mutex covers the map and the
//! batch-active flag; contention is at human scale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;

/// Which way the bytes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// The registry-side handle for one transfer.
#[derive(Debug)]
pub struct TransferHandle {
    direction: Direction,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
}

impl TransferHandle {
    /// Creates a handle and the matching task-side [`FlowControl`].
    pub fn new(direction: Direction) -> (Self, FlowControl) {
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);
        (
            Self {
                direction,
                cancel: cancel.clone(),
                pause_tx,
            },
            FlowControl {
                cancel,
                pause: pause_rx,
            },
        )
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// The task-side ends of a handle: the cancel token and the pause gate.
///
/// Pause is socket-level back-pressure, not a protocol message: a paused
/// receiver stops reading and a paused sender stops writing, and TCP flow
/// control does the rest. Resume continues from the exact byte offset.
#[derive(Clone)]
pub struct FlowControl {
    pub cancel: CancellationToken,
    pause: watch::Receiver<bool>,
}

impl FlowControl {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    /// Blocks while paused. Errors if the transfer is cancelled meanwhile.
    pub async fn wait_if_paused(&mut self) -> Result<(), TransferError> {
        while *self.pause.borrow() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                changed = self.pause.changed() => {
                    if changed.is_err() {
                        // Handle dropped from the registry; nothing gates us.
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Default, Debug)]
struct RegistryInner {
    transfers: HashMap<String, TransferHandle>,
    batch_active: bool,
}

/// Tracks active transfers and gates batch concurrency.
#[derive(Default, Debug)]
pub struct TransferRegistry {
    inner: Mutex<RegistryInner>,
}

impl TransferRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a transfer. Fails if the id is already present.
    pub fn register(&self, id: &str, handle: TransferHandle) -> Result<(), TransferError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.transfers.contains_key(id) {
            return Err(TransferError::DuplicateTransfer(id.into()));
        }
        inner.transfers.insert(id.into(), handle);
        Ok(())
    }

    /// Moves a transfer to a new id (the wire metadata carried one).
    pub fn rekey(&self, old: &str, new: &str) -> Result<(), TransferError> {
        if old == new {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.transfers.contains_key(new) {
            return Err(TransferError::DuplicateTransfer(new.into()));
        }
        if let Some(handle) = inner.transfers.remove(old) {
            inner.transfers.insert(new.into(), handle);
        }
        Ok(())
    }

    /// Removes a transfer on terminal status. Returns `true` exactly once.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.lock().unwrap().transfers.remove(id).is_some()
    }

    /// Cancels a transfer. Idempotent; a no-op for unknown (already
    /// terminal) ids.
    pub fn cancel(&self, id: &str) {
        let inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.transfers.get(id) {
            debug!(transfer = id, "cancelling transfer");
            handle.cancel.cancel();
        }
    }

    /// Pauses the transfer's stream flow. Returns `false` for unknown ids.
    pub fn pause(&self, id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.transfers.get(id) {
            Some(handle) => {
                handle.pause_tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Resumes a paused transfer. Returns `false` for unknown ids.
    pub fn resume(&self, id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.transfers.get(id) {
            Some(handle) => {
                handle.pause_tx.send_replace(false);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().unwrap().transfers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims the batch slot. At most one batch runs at a time; the
    /// returned guard frees the slot when dropped, whatever path the batch
    /// exits through.
    pub fn try_begin_batch(self: &Arc<Self>) -> Result<BatchGuard, TransferError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.batch_active {
            return Err(TransferError::BatchActive);
        }
        inner.batch_active = true;
        Ok(BatchGuard {
            registry: Arc::clone(self),
        })
    }

    pub fn batch_active(&self) -> bool {
        self.inner.lock().unwrap().batch_active
    }
}

/// RAII claim on the single batch slot.
#[derive(Debug)]
pub struct BatchGuard {
    registry: Arc<TransferRegistry>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.registry.inner.lock().unwrap().batch_active = false;
    }
}
