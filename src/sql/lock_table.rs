use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::executor::{SqlErrorKind, SqlExecutor};
use super::metadata::require_identifier;
use super::statement::Statement;
use crate::config::StoreOptions;
use crate::error::{contract, CrudError, Result};
use crate::lock::{expiry_after, Lock};
use crate::model::ItemId;

/// Read-then-write rounds before a claim gives up with `TryAgain`.
const CLAIM_ATTEMPTS: usize = 2;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LockRow {
    lock_id: Uuid,
    valid_until: DateTime<Utc>,
}

/// Lease locks kept in a database table, one row per locked item.
///
/// The table has columns `TableName`, `ItemId`, `LockId` and `ValidUntil`,
/// with a unique key on `(TableName, ItemId)`. One table serves every
/// collection; `TableName` scopes the item ids.
pub struct DistributedLockTable<E> {
    executor: Arc<E>,
    table_name: String,
    options: StoreOptions,
}

impl<E: SqlExecutor> DistributedLockTable<E> {
    pub fn new(executor: Arc<E>, options: StoreOptions) -> Self {
        Self {
            executor,
            table_name: "DistributedLock".to_string(),
            options,
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Claim, renew or take over the lease on `(scope, id)`.
    ///
    /// A live lease held by someone else fails with `Locked`. Losing the
    /// race for the row twice in a row fails with `TryAgain`.
    pub async fn claim<Id: ItemId>(
        &self,
        scope: &str,
        id: &Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Lock<Id>> {
        contract::require_id(id, "id")?;
        require_identifier(&self.table_name)?;
        let span = self.options.lease_or_default(lease)?;

        for _ in 0..CLAIM_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(CrudError::Cancelled);
            }

            let existing = self.read(scope, id, cancel).await?;
            let now = Utc::now();
            let fresh = Lock::new(id.clone(), Uuid::new_v4(), expiry_after(now, span)?);

            let Some(existing) = existing else {
                match self.executor.execute(&self.insert(scope, &fresh)?, cancel).await {
                    Ok(_) => {
                        debug!(scope, item = %id, lock_id = %fresh.lock_id, "lock row inserted");
                        return Ok(fresh);
                    }
                    // Another claimer inserted first.
                    Err(err) if err.kind == SqlErrorKind::UniqueViolation => continue,
                    Err(err) => return Err(err.into()),
                }
            };

            let owned = current_lock_id == Some(existing.lock_id);
            if existing.valid_until > now && !owned {
                let retry_after = (existing.valid_until - now).to_std().unwrap_or(Duration::ZERO);
                warn!(scope, item = %id, ?retry_after, "lock row held by someone else");
                return Err(CrudError::Locked {
                    item: id.to_string(),
                    retry_after,
                });
            }

            let replacement = if owned {
                fresh.with_lock_id(existing.lock_id)
            } else {
                fresh
            };
            let updated = self
                .executor
                .execute(&self.replace(scope, &existing, &replacement)?, cancel)
                .await?;
            if updated > 0 {
                debug!(scope, item = %id, lock_id = %replacement.lock_id, "lock row replaced");
                return Ok(replacement);
            }
        }

        Err(CrudError::try_again(
            format!("lock on {} {} changed while claiming it", scope, id),
            self.options.transaction_lock_retry,
        ))
    }

    /// Delete the lease row if `lock_id` still owns it.
    pub async fn release<Id: ItemId>(
        &self,
        scope: &str,
        id: &Id,
        lock_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        contract::require_id(id, "id")?;
        require_identifier(&self.table_name)?;
        if cancel.is_cancelled() {
            return Err(CrudError::Cancelled);
        }
        let statement = Statement::new(format!(
            "DELETE FROM [{}] WHERE [TableName] = @TableName AND [ItemId] = @ItemId AND [LockId] = @LockId",
            self.table_name
        ))
        .param("TableName", scope)
        .param("ItemId", id.to_string())
        .param("LockId", lock_id.to_string());
        let deleted = self.executor.execute(&statement, cancel).await?;
        debug!(scope, item = %id, %lock_id, deleted, "lock row release");
        Ok(())
    }

    async fn read<Id: ItemId>(
        &self,
        scope: &str,
        id: &Id,
        cancel: &CancellationToken,
    ) -> Result<Option<LockRow>> {
        let statement = Statement::new(format!(
            "SELECT [LockId], [ValidUntil] FROM [{}] WHERE [TableName] = @TableName AND [ItemId] = @ItemId",
            self.table_name
        ))
        .param("TableName", scope)
        .param("ItemId", id.to_string());
        let rows = self.executor.query(&statement, cancel).await?;
        rows.into_iter()
            .next()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(CrudError::from))
            .transpose()
    }

    fn insert<Id: ItemId>(&self, scope: &str, lock: &Lock<Id>) -> Result<Statement> {
        Ok(Statement::new(format!(
            "INSERT INTO [{}] ([TableName], [ItemId], [LockId], [ValidUntil]) \
             VALUES (@TableName, @ItemId, @LockId, @ValidUntil)",
            self.table_name
        ))
        .param("TableName", scope)
        .param("ItemId", lock.item_id.to_string())
        .param("LockId", lock.lock_id.to_string())
        .param("ValidUntil", serde_json::to_value(lock.valid_until)?))
    }

    fn replace<Id: ItemId>(
        &self,
        scope: &str,
        existing: &LockRow,
        lock: &Lock<Id>,
    ) -> Result<Statement> {
        Ok(Statement::new(format!(
            "UPDATE [{}] SET [LockId] = @LockId, [ValidUntil] = @ValidUntil \
             WHERE [TableName] = @TableName AND [ItemId] = @ItemId \
             AND [LockId] = @OldLockId AND [ValidUntil] = @OldValidUntil",
            self.table_name
        ))
        .param("TableName", scope)
        .param("ItemId", lock.item_id.to_string())
        .param("LockId", lock.lock_id.to_string())
        .param("ValidUntil", serde_json::to_value(lock.valid_until)?)
        .param("OldLockId", existing.lock_id.to_string())
        .param("OldValidUntil", serde_json::to_value(existing.valid_until)?))
    }
}
