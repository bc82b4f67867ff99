//! Generic CRUD persistence with optimistic concurrency, lease locks and
//! master/dependent partitions.
//!
//! Stores implement the capability traits in [`repository`]; anything that
//! implements all of them is a [`Crud`] store. [`CrudMemory`] and
//! [`DependentToMasterMemory`] keep items in process, [`sql::CrudSql`] keeps
//! them in a relational table. [`ManyToOne`] scopes any searchable store to
//! the children of one parent.

pub mod concurrency;
mod config;
mod error;
pub mod gate;
mod hierarchy;
pub mod lock;
pub mod model;
pub mod repository;
pub mod search;
#[cfg(feature = "sql")]
pub mod sql;

pub use config::StoreOptions;
pub use error::{CrudError, Result};
pub use gate::{GateGuard, MutationGate};
pub use hierarchy::{DependentToMasterMemory, ManyToOne};
pub use lock::{DependentLock, DistributedLock, LeaseLockManager, Lock, TransactionLock};
pub use model::{
    Concurrency, ConcurrencyToken, ConcurrentMap, CrudMemory, Dependent, ItemId, KeyedStore, Model,
    OrderBy, PageEnvelope, PageInfo, SearchDetails, TokenKind, UniqueConstraint,
};
pub use repository::{ClaimAndRead, Create, Crud, Delete, Read, Search, Update};

// Re-export the cancellation token every operation takes
pub use tokio_util::sync::CancellationToken;
