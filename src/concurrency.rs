//! Optimistic concurrency tokens: initial assignment, verification and renewal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use uuid::Uuid;

use crate::error::{CrudError, Result};
use crate::model::{Concurrency, ConcurrencyToken, Model, TokenKind};

/// Length of a binary row version.
pub const ROW_VERSION_LEN: usize = 8;

pub fn encode_row_version(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a row version from its base-64 text form.
///
/// Undecodable text can only come from a token the store never issued, so it
/// is reported as a conflict.
pub fn decode_row_version(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|_| CrudError::conflict(format!("stale or invalid row version {:?}", text)))
}

/// Reject a row version of the wrong length; it cannot match any stored row.
pub fn require_row_version(bytes: &[u8]) -> Result<()> {
    if bytes.len() == ROW_VERSION_LEN {
        Ok(())
    } else {
        Err(CrudError::conflict(format!(
            "row version must be {} bytes, got {}",
            ROW_VERSION_LEN,
            bytes.len()
        )))
    }
}

/// The placeholder token a new item starts with.
pub fn initial_token(kind: TokenKind) -> ConcurrencyToken {
    match kind {
        TokenKind::ETag => ConcurrencyToken::ETag(Uuid::new_v4().to_string()),
        TokenKind::RowVersion => ConcurrencyToken::RowVersion(vec![0; ROW_VERSION_LEN]),
    }
}

/// A fresh token of the same kind, guaranteed to differ from `previous`.
pub fn next_token(previous: &ConcurrencyToken) -> ConcurrencyToken {
    loop {
        let candidate = match previous.kind() {
            TokenKind::ETag => ConcurrencyToken::ETag(Uuid::new_v4().to_string()),
            TokenKind::RowVersion => {
                let random = Uuid::new_v4();
                ConcurrencyToken::RowVersion(random.as_bytes()[..ROW_VERSION_LEN].to_vec())
            }
        };
        if !tokens_match(&candidate, previous) {
            return candidate;
        }
    }
}

/// Token equality as callers see it. Text forms compare case-insensitively.
pub fn tokens_match(stored: &ConcurrencyToken, supplied: &ConcurrencyToken) -> bool {
    match (stored, supplied) {
        (ConcurrencyToken::RowVersion(a), ConcurrencyToken::RowVersion(b)) => a == b,
        _ => stored.as_etag().eq_ignore_ascii_case(&supplied.as_etag()),
    }
}

/// Give a new item its initial token, if the model carries one.
pub fn assign_initial<M: Model>(item: &mut M) {
    if let Some(kind) = item.concurrency().kind() {
        item.set_concurrency_token(initial_token(kind));
    }
}

/// Replace the item's token with a new value. Returns the new token.
pub fn stamp<M: Model>(item: &mut M) -> Option<ConcurrencyToken> {
    let current = match item.concurrency() {
        Concurrency::Plain => return None,
        Concurrency::WithToken(token) => token,
    };
    let next = next_token(&current);
    item.set_concurrency_token(next.clone());
    Some(next)
}

/// Reject an update whose token does not match the stored item's token.
pub fn verify_for_update<M: Model>(stored: &M, supplied: &M) -> Result<()> {
    let (Concurrency::WithToken(stored_token), Concurrency::WithToken(supplied_token)) =
        (stored.concurrency(), supplied.concurrency())
    else {
        return Ok(());
    };
    if tokens_match(&stored_token, &supplied_token) {
        Ok(())
    } else {
        Err(CrudError::conflict(format!(
            "{} item was updated by someone else: supplied token {} does not match stored token {}",
            M::COLLECTION,
            supplied_token.as_etag(),
            stored_token.as_etag()
        )))
    }
}
