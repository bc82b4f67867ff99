//! Relational backend.
//!
//! The stores here render parameterized statements and hand them to a
//! [`SqlExecutor`], which owns the connection and the driver. Driver errors
//! come back as [`SqlError`] and are translated to [`CrudError`](crate::CrudError)
//! before they reach the caller.

mod crud;
mod executor;
mod lock_table;
mod metadata;
pub mod statement;

pub use crud::CrudSql;
pub use executor::{Row, SqlError, SqlErrorKind, SqlExecutor, DEADLOCK_RETRY};
pub use lock_table::DistributedLockTable;
pub use metadata::TableMetadata;
pub use statement::Statement;
