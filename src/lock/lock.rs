use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CrudError, Result};

/// A time-boxed exclusive lease on one item.
///
/// A lock whose `valid_until` has passed is logically absent and may be
/// replaced by any claimer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock<Id> {
    pub item_id: Id,
    pub lock_id: Uuid,
    pub valid_until: DateTime<Utc>,
}

/// A lease on a dependent item, scoped within its master's partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentLock<MasterId, DependentId> {
    pub master_id: MasterId,
    pub dependent_id: DependentId,
    pub lock_id: Uuid,
    pub valid_until: DateTime<Utc>,
}

impl<Id> Lock<Id> {
    pub fn new(item_id: Id, lock_id: Uuid, valid_until: DateTime<Utc>) -> Self {
        Self {
            item_id,
            lock_id,
            valid_until,
        }
    }

    pub fn with_lock_id(mut self, lock_id: Uuid) -> Self {
        self.lock_id = lock_id;
        self
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left on the lease, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.valid_until - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn into_dependent<MasterId>(self, master_id: MasterId) -> DependentLock<MasterId, Id> {
        DependentLock {
            master_id,
            dependent_id: self.item_id,
            lock_id: self.lock_id,
            valid_until: self.valid_until,
        }
    }
}

impl<Id: Clone> Lock<Id> {
    /// The same lock with a different expiry.
    pub fn valid_to(&self, valid_until: DateTime<Utc>) -> Self {
        Self {
            valid_until,
            ..self.clone()
        }
    }
}

impl<MasterId, DependentId> DependentLock<MasterId, DependentId> {
    pub fn is_valid(&self) -> bool {
        self.valid_until > Utc::now()
    }
}

/// `now + span`, rejecting spans chrono cannot represent.
pub(crate) fn expiry_after(now: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| CrudError::contract(format!("lease span {:?} is out of range", span)))
}
