use serde::{Deserialize, Serialize};

/// An optimistic-concurrency version stamp.
///
/// `ETag` is opaque text; `RowVersion` is a fixed-length byte sequence whose
/// text form is standard base-64. Both encode the same concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyToken {
    ETag(String),
    RowVersion(Vec<u8>),
}

/// Which encoding a model uses for its concurrency token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    ETag,
    RowVersion,
}

impl ConcurrencyToken {
    pub fn kind(&self) -> TokenKind {
        match self {
            ConcurrencyToken::ETag(_) => TokenKind::ETag,
            ConcurrencyToken::RowVersion(_) => TokenKind::RowVersion,
        }
    }

    /// The token as callers see it: ETags verbatim, row versions as base-64.
    pub fn as_etag(&self) -> String {
        match self {
            ConcurrencyToken::ETag(etag) => etag.clone(),
            ConcurrencyToken::RowVersion(bytes) => crate::concurrency::encode_row_version(bytes),
        }
    }
}

/// Whether a model participates in optimistic concurrency control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Concurrency {
    Plain,
    WithToken(ConcurrencyToken),
}

impl Concurrency {
    pub fn token(&self) -> Option<&ConcurrencyToken> {
        match self {
            Concurrency::Plain => None,
            Concurrency::WithToken(token) => Some(token),
        }
    }

    pub fn kind(&self) -> Option<TokenKind> {
        self.token().map(ConcurrencyToken::kind)
    }
}
