use std::time::Duration;

use thiserror::Error;

/// Error taxonomy shared by every backend.
///
/// Backend-native failures are translated into one of these variants at the
/// backend boundary, so callers never match on driver or map errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrudError {
    /// A write lost against stored state: the id is taken, the token is stale
    /// or a uniqueness rule failed. Re-read before retrying.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The target of a read or update does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A live lease held by someone else blocks the claim.
    #[error("item {item} is locked by someone else (retry after {retry_after:?})")]
    Locked { item: String, retry_after: Duration },

    /// Transient contention; retrying after `retry_after` is expected to succeed.
    #[error("try again: {reason} (retry after {retry_after:?})")]
    TryAgain { reason: String, retry_after: Duration },

    /// The caller violated a precondition of the operation.
    #[error("contract violation: {0}")]
    Contract(String),

    /// The backend deliberately does not support the operation.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// An item could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl CrudError {
    pub fn conflict(message: impl Into<String>) -> Self {
        CrudError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CrudError::NotFound(message.into())
    }

    pub fn contract(message: impl Into<String>) -> Self {
        CrudError::Contract(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        CrudError::NotImplemented(message.into())
    }

    pub fn try_again(reason: impl Into<String>, retry_after: Duration) -> Self {
        CrudError::TryAgain {
            reason: reason.into(),
            retry_after,
        }
    }

    /// The recommended wait before retrying, for contention errors.
    pub fn recommended_wait(&self) -> Option<Duration> {
        match self {
            CrudError::Locked { retry_after, .. } | CrudError::TryAgain { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// True for errors a caller may resolve by simply retrying later.
    pub fn is_retryable(&self) -> bool {
        self.recommended_wait().is_some()
    }
}

impl From<serde_json::Error> for CrudError {
    fn from(err: serde_json::Error) -> Self {
        CrudError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CrudError>;

/// Precondition checks, raised before any I/O.
pub(crate) mod contract {
    use super::{CrudError, Result};
    use crate::model::ItemId;

    pub(crate) fn require(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(CrudError::Contract(message()))
        }
    }

    pub(crate) fn require_id<I: ItemId>(id: &I, name: &str) -> Result<()> {
        require(!id.is_default(), || {
            format!("parameter {} must not be the default value", name)
        })
    }

    pub(crate) fn require_limit(limit: usize) -> Result<()> {
        require(limit > 0, || "parameter limit must be greater than 0".to_string())
    }
}
