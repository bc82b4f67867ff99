use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::lock::expiry_after;
use super::{DistributedLock, Lock};
use crate::config::StoreOptions;
use crate::error::{contract, CrudError, Result};
use crate::model::{ConcurrentMap, ItemId, KeyedStore};

/// In-memory lease lock manager backed by a [`ConcurrentMap`] of lock records.
///
/// Claims never block. They insert, renew or take over a record with
/// compare-and-swap and retry from the top when another claimer wins the
/// race.
pub struct LeaseLockManager<Id: ItemId> {
    locks: ConcurrentMap<Id, Lock<Id>>,
    options: StoreOptions,
}

impl<Id: ItemId> Default for LeaseLockManager<Id> {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl<Id: ItemId> LeaseLockManager<Id> {
    pub fn new(options: StoreOptions) -> Self {
        LeaseLockManager {
            locks: ConcurrentMap::new(),
            options,
        }
    }

    pub async fn claim(
        &self,
        id: &Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Lock<Id>> {
        contract::require_id(id, "id")?;
        let span = self.options.lease_or_default(lease)?;

        loop {
            if cancel.is_cancelled() {
                return Err(CrudError::Cancelled);
            }

            let now = Utc::now();
            let fresh = Lock::new(id.clone(), Uuid::new_v4(), expiry_after(now, span)?);
            if self.locks.insert(id.clone(), fresh.clone()) {
                debug!(item = %id, lock_id = %fresh.lock_id, "lock claimed");
                return Ok(fresh);
            }

            let Some(existing) = self.locks.get(id) else {
                // Released between our insert and read.
                continue;
            };

            let owned = current_lock_id == Some(existing.lock_id);
            if existing.is_valid_at(now) && !owned {
                let retry_after = existing.remaining_at(now);
                warn!(item = %id, ?retry_after, "lock held by someone else");
                return Err(CrudError::Locked {
                    item: id.to_string(),
                    retry_after,
                });
            }

            let replacement = if owned {
                fresh.with_lock_id(existing.lock_id)
            } else {
                fresh
            };
            if self.locks.replace(id, &existing, replacement.clone()) {
                if owned {
                    debug!(item = %id, lock_id = %replacement.lock_id, "lock renewed");
                } else {
                    debug!(item = %id, lock_id = %replacement.lock_id, "expired lock taken over");
                }
                return Ok(replacement);
            }

            tokio::task::yield_now().await;
        }
    }

    pub async fn release(&self, id: &Id, lock_id: Uuid, cancel: &CancellationToken) -> Result<()> {
        contract::require_id(id, "id")?;
        if cancel.is_cancelled() {
            return Err(CrudError::Cancelled);
        }

        let Some(current) = self.locks.get(id) else {
            return Ok(());
        };
        if current.lock_id != lock_id {
            debug!(item = %id, %lock_id, "release ignored, lock not owned");
            return Ok(());
        }

        // Extend first so a claimer racing us sees a live lock, then remove
        // only the record we wrote.
        let extended = current.valid_to(expiry_after(Utc::now(), self.options.release_grace)?);
        if !self.locks.replace(id, &current, extended.clone()) {
            return Ok(());
        }
        self.locks.remove_if(id, &extended);
        debug!(item = %id, %lock_id, "lock released");
        Ok(())
    }

    /// The live lock on `id`, if any.
    pub fn current(&self, id: &Id) -> Option<Lock<Id>> {
        self.locks.get(id).filter(Lock::is_valid)
    }
}

#[async_trait]
impl<Id: ItemId> DistributedLock<Id> for LeaseLockManager<Id> {
    async fn claim_distributed_lock(
        &self,
        id: &Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Lock<Id>> {
        self.claim(id, lease, current_lock_id, cancel).await
    }

    async fn release_distributed_lock(
        &self,
        id: &Id,
        lock_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.release(id, lock_id, cancel).await
    }
}
