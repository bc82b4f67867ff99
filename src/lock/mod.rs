//! Locks - Lease locks on item ids and transaction-scoped row locks.
//!
//! [`LeaseLockManager`] is the in-process [`DistributedLock`]. The relational
//! backend keeps its leases in a table instead (`sql::DistributedLockTable`).

mod in_memory;
#[allow(clippy::module_inception)]
mod lock;
mod lock_manager;

pub use in_memory::LeaseLockManager;
pub use lock::{DependentLock, Lock};
pub(crate) use lock::expiry_after;
pub use lock_manager::{DistributedLock, TransactionLock};
