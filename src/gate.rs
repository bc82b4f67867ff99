//! MutationGate - Single-permit async exclusion for multi-step collection operations.

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{CrudError, Result};

/// Serializes create, update and bulk reads on one collection.
///
/// Waiters are served in FIFO order. The permit is released when the
/// returned [`GateGuard`] drops, on every exit path.
#[derive(Debug, Default)]
pub struct MutationGate {
    permit: Mutex<()>,
}

/// Proof that the gate is held. Helpers that require the gate take
/// `&GateGuard` instead of acquiring it again.
#[derive(Debug)]
pub struct GateGuard<'a> {
    _permit: MutexGuard<'a, ()>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate. Fails with `Cancelled` if `cancel` fires first,
    /// including when it has already fired.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GateGuard<'_>> {
        if cancel.is_cancelled() {
            return Err(CrudError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CrudError::Cancelled),
            permit = self.permit.lock() => Ok(GateGuard { _permit: permit }),
        }
    }

    /// True while some caller holds the gate.
    pub fn is_held(&self) -> bool {
        self.permit.try_lock().is_err()
    }
}
