use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Lock;
use crate::error::Result;

/// Lease-based exclusive locks on item ids.
///
/// A claim either inserts a new lease, renews the caller's own lease (when
/// `current_lock_id` names it), or takes over an expired one. A live lease
/// held by someone else fails with `CrudError::Locked`, carrying the time
/// left on that lease. Nothing here blocks waiting for a lease; callers
/// retry using the hint.
#[async_trait]
pub trait DistributedLock<Id>: Send + Sync {
    async fn claim_distributed_lock(
        &self,
        id: &Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Lock<Id>>;

    /// Release a lease. Not an error if the lease is gone or belongs to
    /// someone else; in that case nothing changes.
    async fn release_distributed_lock(
        &self,
        id: &Id,
        lock_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// A lock scoped to the caller's ambient transaction.
///
/// Backends without transactions implement this as a no-op. Relational
/// backends take a row lock that is released when the transaction ends.
#[async_trait]
pub trait TransactionLock<Id>: Send + Sync {
    async fn claim_transaction_lock(&self, id: &Id, cancel: &CancellationToken) -> Result<()>;
}
