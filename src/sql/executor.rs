use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::statement::Statement;
use crate::error::CrudError;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Classes of database failure the stores react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    Deadlock,
    UniqueViolation,
    CheckViolation,
    Other,
}

impl SqlErrorKind {
    /// Classify a SQL Server error number.
    pub fn from_error_number(number: i32) -> Self {
        match number {
            1205 => SqlErrorKind::Deadlock,
            2601 | 2627 => SqlErrorKind::UniqueViolation,
            547 => SqlErrorKind::CheckViolation,
            _ => SqlErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct SqlError {
    pub kind: SqlErrorKind,
    pub message: String,
}

impl SqlError {
    pub fn new(kind: SqlErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_error_number(number: i32, message: impl Into<String>) -> Self {
        Self::new(SqlErrorKind::from_error_number(number), message)
    }
}

/// Wait suggested after a deadlock.
pub const DEADLOCK_RETRY: Duration = Duration::from_secs(1);

impl From<SqlError> for CrudError {
    fn from(err: SqlError) -> Self {
        match err.kind {
            SqlErrorKind::Deadlock => CrudError::try_again(
                format!("database deadlock: {}", err.message),
                DEADLOCK_RETRY,
            ),
            SqlErrorKind::UniqueViolation => CrudError::conflict(err.message),
            SqlErrorKind::CheckViolation => CrudError::contract(err.message),
            SqlErrorKind::Other => CrudError::Backend(err.message),
        }
    }
}

/// Runs statements against a relational database.
///
/// Implementations bind `statement.params` to the `@Name` placeholders and
/// report failures as [`SqlError`]. Binary columns travel as base-64 text.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn query(
        &self,
        statement: &Statement,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, SqlError>;

    /// Number of rows affected.
    async fn execute(&self, statement: &Statement, cancel: &CancellationToken)
        -> Result<u64, SqlError>;
}
