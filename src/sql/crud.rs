use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::executor::SqlExecutor;
use super::lock_table::DistributedLockTable;
use super::metadata::TableMetadata;
use super::statement;
use crate::concurrency;
use crate::config::StoreOptions;
use crate::error::{contract, CrudError, Result};
use crate::lock::{DistributedLock, Lock, TransactionLock};
use crate::model::{ConcurrencyToken, ItemId, Model, PageEnvelope, SearchDetails, TokenKind};
use crate::repository::{Create, Delete, Read, Search, Update};
use crate::search;

/// CRUD store over a relational table.
///
/// Optimistic concurrency is a conditional `UPDATE ... WHERE token = @old`;
/// transaction locks are lock-and-skip row reads. Distributed locks need a
/// [`DistributedLockTable`]; without one they are not implemented.
///
/// Generated integer ids come from an in-process counter that starts at 1
/// and skips ids the table already holds. Each taken id costs a failed
/// insert and a read, so against a table with N existing rows the first
/// `create` can make up to 2N + 1 round-trips. Use `create_with_specified_id`
/// or random ids for tables that are already populated.
pub struct CrudSql<M: Model, E: SqlExecutor> {
    executor: Arc<E>,
    metadata: TableMetadata,
    options: StoreOptions,
    lock_table: Option<DistributedLockTable<E>>,
    sequence: AtomicU64,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, E: SqlExecutor> CrudSql<M, E> {
    pub fn new(executor: Arc<E>, metadata: TableMetadata, options: StoreOptions) -> Result<Self> {
        metadata.validate()?;
        Ok(Self {
            executor,
            metadata,
            options,
            lock_table: None,
            sequence: AtomicU64::new(0),
            _model: PhantomData,
        })
    }

    pub fn with_lock_table(mut self, lock_table: DistributedLockTable<E>) -> Self {
        self.lock_table = Some(lock_table);
        self
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    fn id_value(id: &M::Id) -> Result<Value> {
        Ok(serde_json::to_value(id)?)
    }

    fn to_row(&self, item: &M, id: &M::Id, token_kind: Option<TokenKind>) -> Result<Map<String, Value>> {
        let mut row = match serde_json::to_value(item)? {
            Value::Object(row) => row,
            other => {
                return Err(CrudError::contract(format!(
                    "{} items must serialize to an object, got {}",
                    M::COLLECTION,
                    other
                )))
            }
        };
        row.insert(self.metadata.id_column.clone(), Self::id_value(id)?);
        if !self.metadata.writes_token(token_kind) {
            row.remove(&self.metadata.token_column);
        }
        Ok(row)
    }

    fn from_row(row: Map<String, Value>) -> Result<M> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }

    async fn read_row(&self, id: &M::Id, cancel: &CancellationToken) -> Result<Option<M>> {
        let statement = statement::select_by_id(&self.metadata, Self::id_value(id)?);
        let rows = self.executor.query(&statement, cancel).await?;
        rows.into_iter().next().map(Self::from_row).transpose()
    }

    async fn insert(&self, id: &M::Id, mut item: M, cancel: &CancellationToken) -> Result<()> {
        item.validate()?;
        item.assign_id(id);
        concurrency::assign_initial(&mut item);
        let now = chrono::Utc::now();
        item.set_created_at(now);
        item.set_updated_at(now);
        let row = self.to_row(&item, id, item.concurrency().kind())?;
        let statement = statement::insert(&self.metadata, &row)?;
        self.executor.execute(&statement, cancel).await?;
        Ok(())
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(CrudError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn lock_table(&self) -> Result<&DistributedLockTable<E>> {
        self.lock_table.as_ref().ok_or_else(|| {
            CrudError::not_implemented(format!(
                "{} has no distributed lock table configured",
                M::COLLECTION
            ))
        })
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> Create<M> for CrudSql<M, E> {
    /// Inserts under the next generated id, moving on to the following one
    /// while the insert reports a duplicate key.
    #[instrument(level = "debug", skip(self, item, cancel), fields(collection = M::COLLECTION))]
    async fn create(&self, item: M, cancel: &CancellationToken) -> Result<M::Id> {
        loop {
            Self::check_cancelled(cancel)?;
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let id = M::Id::generate(sequence).ok_or_else(|| {
                CrudError::Backend(format!("{} has run out of generated ids", M::COLLECTION))
            })?;
            // Integer ids come from a sequence that may already be in use.
            let copy = crate::model::deep_copy(&item)?;
            match self.insert(&id, copy, cancel).await {
                Ok(()) => return Ok(id),
                Err(CrudError::Conflict(message)) => {
                    if self.read_row(&id, cancel).await?.is_none() {
                        return Err(CrudError::Conflict(message));
                    }
                    debug!(item = %id, "generated id taken, trying the next one");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn create_and_return(&self, item: M, cancel: &CancellationToken) -> Result<M> {
        let id = self.create(item, cancel).await?;
        self.read_row(&id, cancel)
            .await?
            .ok_or_else(|| CrudError::not_found(format!("{} item {} vanished after create", M::COLLECTION, id)))
    }

    #[instrument(level = "debug", skip(self, item, cancel), fields(collection = M::COLLECTION, id = %id))]
    async fn create_with_specified_id(
        &self,
        id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        self.insert(id, item, cancel).await
    }

    async fn create_with_specified_id_and_return(
        &self,
        id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<M> {
        self.create_with_specified_id(id, item, cancel).await?;
        self.read_row(id, cancel)
            .await?
            .ok_or_else(|| CrudError::not_found(format!("{} item {} vanished after create", M::COLLECTION, id)))
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> Read<M> for CrudSql<M, E> {
    async fn read(&self, id: &M::Id, cancel: &CancellationToken) -> Result<Option<M>> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        self.read_row(id, cancel).await
    }

    async fn read_all_with_paging(
        &self,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        self.search(&SearchDetails::all(), offset, limit, cancel)
            .await
    }

    async fn read_all(&self, limit: usize, cancel: &CancellationToken) -> Result<Vec<M>> {
        contract::require_limit(limit)?;
        search::read_pages(
            |offset, page_limit| self.read_all_with_paging(offset, page_limit, cancel),
            self.options.default_page_limit.get(),
            limit,
        )
        .await
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> Update<M> for CrudSql<M, E> {
    async fn update(&self, id: &M::Id, item: M, cancel: &CancellationToken) -> Result<()> {
        self.update_and_return(id, item, cancel).await.map(|_| ())
    }

    #[instrument(level = "debug", skip(self, item, cancel), fields(collection = M::COLLECTION, id = %id))]
    async fn update_and_return(
        &self,
        id: &M::Id,
        mut item: M,
        cancel: &CancellationToken,
    ) -> Result<M> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        item.validate()?;
        item.assign_id(id);

        let supplied = item.concurrency();
        let old_token = match supplied.token() {
            None => None,
            Some(ConcurrencyToken::RowVersion(bytes)) => {
                concurrency::require_row_version(bytes)?;
                Some(concurrency::encode_row_version(bytes))
            }
            Some(token) => Some(token.as_etag()),
        };
        if supplied.kind() == Some(TokenKind::ETag) {
            concurrency::stamp(&mut item);
        }
        item.set_updated_at(chrono::Utc::now());

        let row = self.to_row(&item, id, supplied.kind())?;
        let statement = statement::update(&self.metadata, Self::id_value(id)?, &row, old_token)?;
        let updated = self.executor.execute(&statement, cancel).await?;

        if updated == 0 {
            let exists = self.read_row(id, cancel).await?.is_some();
            return Err(if exists && supplied.token().is_some() {
                warn!("stale concurrency token");
                CrudError::conflict(format!(
                    "{} item {} was updated by someone else",
                    M::COLLECTION,
                    id
                ))
            } else {
                CrudError::not_found(format!("{} item {} does not exist", M::COLLECTION, id))
            });
        }

        self.read_row(id, cancel)
            .await?
            .ok_or_else(|| CrudError::not_found(format!("{} item {} vanished after update", M::COLLECTION, id)))
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> Delete<M> for CrudSql<M, E> {
    async fn delete(&self, id: &M::Id, cancel: &CancellationToken) -> Result<()> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        let statement = statement::delete_by_id(&self.metadata, Self::id_value(id)?);
        self.executor.execute(&statement, cancel).await?;
        Ok(())
    }

    async fn delete_all(&self, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancelled(cancel)?;
        self.executor
            .execute(&statement::delete_all(&self.metadata), cancel)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> Search<M> for CrudSql<M, E> {
    async fn search(
        &self,
        details: &SearchDetails,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        contract::require_limit(limit)?;
        details.validate()?;
        let count = statement::count(&self.metadata, details)?;
        let page = statement::search(&self.metadata, details, offset, limit)?;
        Self::check_cancelled(cancel)?;

        let total = self
            .executor
            .query(&count, cancel)
            .await?
            .first()
            .and_then(|row| row.get("Count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| CrudError::Backend("count query returned no Count column".to_string()))?;
        let rows = self.executor.query(&page, cancel).await?;
        let data = rows
            .into_iter()
            .take(limit)
            .map(Self::from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(PageEnvelope::new(
            offset,
            limit,
            usize::try_from(total).unwrap_or(usize::MAX),
            data,
        ))
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> DistributedLock<M::Id> for CrudSql<M, E> {
    async fn claim_distributed_lock(
        &self,
        id: &M::Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Lock<M::Id>> {
        self.lock_table()?
            .claim(&self.metadata.table_name, id, lease, current_lock_id, cancel)
            .await
    }

    async fn release_distributed_lock(
        &self,
        id: &M::Id,
        lock_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.lock_table()?
            .release(&self.metadata.table_name, id, lock_id, cancel)
            .await
    }
}

#[async_trait]
impl<M: Model, E: SqlExecutor> TransactionLock<M::Id> for CrudSql<M, E> {
    /// Lock the row for the rest of the caller's transaction.
    ///
    /// A row held by another transaction is skipped by the read; if the row
    /// exists nonetheless, the claim fails with `TryAgain`.
    async fn claim_transaction_lock(&self, id: &M::Id, cancel: &CancellationToken) -> Result<()> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        let statement = statement::select_for_transaction_lock(&self.metadata, Self::id_value(id)?);
        if !self.executor.query(&statement, cancel).await?.is_empty() {
            return Ok(());
        }

        if self.read_row(id, cancel).await?.is_some() {
            warn!(collection = M::COLLECTION, item = %id, "row locked by another transaction");
            Err(CrudError::try_again(
                format!("{} item {} is locked by another transaction", M::COLLECTION, id),
                self.options.transaction_lock_retry,
            ))
        } else {
            Err(CrudError::not_found(format!(
                "{} item {} does not exist",
                M::COLLECTION,
                id
            )))
        }
    }
}
