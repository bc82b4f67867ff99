//! StoreOptions - Tunables shared by the in-memory and relational stores.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{contract, Result};

const DEFAULT_PAGE_LIMIT: NonZeroUsize = match NonZeroUsize::new(50) {
    Some(limit) => limit,
    None => panic!("default page limit must be positive"),
};

/// Store configuration.
///
/// Every field has a default, so a partial JSON document (or `{}`) is valid.
/// Durations are given in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Lease span used when a claim does not name one.
    #[serde(rename = "default_lease_ms", with = "millis")]
    pub default_lease: Duration,
    /// How long a lock record is extended while it is being released.
    #[serde(rename = "release_grace_ms", with = "millis")]
    pub release_grace: Duration,
    /// Wait hint returned when a row-level transaction lock is taken.
    #[serde(rename = "transaction_lock_retry_ms", with = "millis")]
    pub transaction_lock_retry: Duration,
    /// Page size used by `read_all` and the page readers.
    pub default_page_limit: NonZeroUsize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_lease: Duration::from_secs(30),
            release_grace: Duration::from_secs(30),
            transaction_lock_retry: Duration::from_secs(1),
            default_page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON. A zero page limit is a serialization error;
    /// a zero lease is a contract error.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        contract::require(!self.default_lease.is_zero(), || {
            "default_lease must be longer than zero".to_string()
        })
    }

    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }

    pub fn with_release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    pub fn with_transaction_lock_retry(mut self, wait: Duration) -> Self {
        self.transaction_lock_retry = wait;
        self
    }

    pub fn with_default_page_limit(mut self, limit: NonZeroUsize) -> Self {
        self.default_page_limit = limit;
        self
    }

    /// The lease to use for a claim: the caller's, or the default. A zero
    /// lease is rejected.
    pub fn lease_or_default(&self, lease: Option<Duration>) -> Result<Duration> {
        let span = lease.unwrap_or(self.default_lease);
        contract::require(!span.is_zero(), || "lease must be longer than zero".to_string())?;
        Ok(span)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
