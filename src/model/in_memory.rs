//! CrudMemory - In-process CRUD store with optimistic concurrency and lease locks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{ConcurrentMap, ItemId, KeyedStore, Model, PageEnvelope, SearchDetails, TokenKind};
use crate::concurrency;
use crate::config::StoreOptions;
use crate::error::{contract, CrudError, Result};
use crate::gate::{GateGuard, MutationGate};
use crate::lock::{DistributedLock, LeaseLockManager, Lock, TransactionLock};
use crate::repository::{Create, Delete, Read, Search, Update};
use crate::search;

/// A named uniqueness rule.
///
/// The check receives the candidate item and every other stored item and
/// returns `true` when the candidate may be stored.
pub struct UniqueConstraint<M> {
    name: String,
    check: Arc<dyn Fn(&M, &[M]) -> bool + Send + Sync>,
}

impl<M> UniqueConstraint<M> {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&M, &[M]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<M> Clone for UniqueConstraint<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: self.check.clone(),
        }
    }
}

impl<M> fmt::Debug for UniqueConstraint<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueConstraint")
            .field("name", &self.name)
            .finish()
    }
}

/// In-memory CRUD store.
///
/// Items are kept as JSON bytes, so every read returns a fresh copy and no
/// caller can observe another caller's instance. Create, update and bulk
/// reads run under the [`MutationGate`]; read-by-id and delete-by-id act
/// directly on the keyed map.
pub struct CrudMemory<M: Model> {
    items: ConcurrentMap<M::Id, Vec<u8>>,
    gate: MutationGate,
    locks: LeaseLockManager<M::Id>,
    sequence: AtomicU64,
    unique_constraints: Vec<UniqueConstraint<M>>,
    options: StoreOptions,
}

impl<M: Model> Default for CrudMemory<M> {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl<M: Model> CrudMemory<M> {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            items: ConcurrentMap::new(),
            gate: MutationGate::new(),
            locks: LeaseLockManager::new(options),
            sequence: AtomicU64::new(0),
            unique_constraints: Vec::new(),
            options,
        }
    }

    /// Register a uniqueness rule. Rules run in registration order.
    pub fn with_unique_constraint(
        mut self,
        name: impl Into<String>,
        check: impl Fn(&M, &[M]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.unique_constraints.push(UniqueConstraint::new(name, check));
        self
    }

    pub fn with_unique_constraints(mut self, constraints: Vec<UniqueConstraint<M>>) -> Self {
        self.unique_constraints.extend(constraints);
        self
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The live lease on `id`, if any.
    pub fn current_lock(&self, id: &M::Id) -> Option<Lock<M::Id>> {
        self.locks.current(id)
    }

    fn next_id(&self) -> Result<M::Id> {
        loop {
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let id = M::Id::generate(sequence).ok_or_else(|| {
                CrudError::Backend(format!("{} has run out of generated ids", M::COLLECTION))
            })?;
            if !self.items.contains(&id) {
                return Ok(id);
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<M> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Every stored item, ordered by id.
    fn snapshot(&self, _gate: &GateGuard<'_>) -> Result<Vec<(M::Id, M)>> {
        let mut ids = self.items.keys();
        ids.sort();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            // A point delete may remove a key after the listing.
            if let Some(bytes) = self.items.get(&id) {
                items.push((id, Self::decode(&bytes)?));
            }
        }
        Ok(items)
    }

    fn verify_unique(&self, gate: &GateGuard<'_>, id: &M::Id, item: &M) -> Result<()> {
        if self.unique_constraints.is_empty() {
            return Ok(());
        }
        let others: Vec<M> = self
            .snapshot(gate)?
            .into_iter()
            .filter(|(other_id, _)| other_id != id)
            .map(|(_, other)| other)
            .collect();
        for constraint in &self.unique_constraints {
            if !(constraint.check)(item, &others) {
                warn!(collection = M::COLLECTION, item = %id, constraint = %constraint.name, "unique constraint violated");
                return Err(CrudError::conflict(format!(
                    "{} item {} violates unique constraint {}",
                    M::COLLECTION,
                    id,
                    constraint.name
                )));
            }
        }
        Ok(())
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(CrudError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<M: Model> Create<M> for CrudMemory<M> {
    async fn create(&self, item: M, cancel: &CancellationToken) -> Result<M::Id> {
        Self::check_cancelled(cancel)?;
        let id = self.next_id()?;
        self.create_with_specified_id(&id, item, cancel).await?;
        Ok(id)
    }

    async fn create_and_return(&self, item: M, cancel: &CancellationToken) -> Result<M> {
        Self::check_cancelled(cancel)?;
        let id = self.next_id()?;
        self.create_with_specified_id_and_return(&id, item, cancel)
            .await
    }

    async fn create_with_specified_id(
        &self,
        id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.create_with_specified_id_and_return(id, item, cancel)
            .await
            .map(|_| ())
    }

    #[instrument(level = "debug", skip(self, item, cancel), fields(collection = M::COLLECTION, id = %id))]
    async fn create_with_specified_id_and_return(
        &self,
        id: &M::Id,
        mut item: M,
        cancel: &CancellationToken,
    ) -> Result<M> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        item.validate()?;

        item.assign_id(id);
        concurrency::assign_initial(&mut item);
        if item.concurrency().kind() == Some(TokenKind::RowVersion) {
            concurrency::stamp(&mut item);
        }
        let now = Utc::now();
        item.set_created_at(now);
        item.set_updated_at(now);
        let bytes = serde_json::to_vec(&item)?;

        let gate = self.gate.acquire(cancel).await?;
        if self.items.contains(id) {
            warn!("id already exists");
            return Err(CrudError::conflict(format!(
                "{} item {} already exists",
                M::COLLECTION,
                id
            )));
        }
        self.verify_unique(&gate, id, &item)?;
        if !self.items.insert(id.clone(), bytes.clone()) {
            return Err(CrudError::conflict(format!(
                "{} item {} already exists",
                M::COLLECTION,
                id
            )));
        }
        drop(gate);

        debug!("item created");
        Self::decode(&bytes)
    }
}

#[async_trait]
impl<M: Model> Read<M> for CrudMemory<M> {
    async fn read(&self, id: &M::Id, cancel: &CancellationToken) -> Result<Option<M>> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        self.items
            .get(id)
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    async fn read_all_with_paging(
        &self,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        contract::require_limit(limit)?;
        let gate = self.gate.acquire(cancel).await?;
        let items = self.snapshot(&gate)?.into_iter().map(|(_, item)| item);
        search::search_page(items, &SearchDetails::all(), offset, limit)
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
impl<M: Model> Update<M> for CrudMemory<M> {
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

        let gate = self.gate.acquire(cancel).await?;
        let stored_bytes = self.items.get(id).ok_or_else(|| {
            CrudError::not_found(format!("{} item {} does not exist", M::COLLECTION, id))
        })?;
        let stored = Self::decode(&stored_bytes)?;
        if let Err(err) = concurrency::verify_for_update(&stored, &item) {
            warn!("stale concurrency token");
            return Err(err);
        }
        self.verify_unique(&gate, id, &item)?;

        concurrency::stamp(&mut item);
        item.set_updated_at(Utc::now());
        let bytes = serde_json::to_vec(&item)?;
        if !self.items.replace(id, &stored_bytes, bytes.clone()) {
            // Only a point delete can race a gated update.
            return Err(CrudError::not_found(format!(
                "{} item {} was deleted during the update",
                M::COLLECTION,
                id
            )));
        }
        drop(gate);

        debug!("item updated");
        Self::decode(&bytes)
    }
}

#[async_trait]
impl<M: Model> Delete<M> for CrudMemory<M> {
    async fn delete(&self, id: &M::Id, cancel: &CancellationToken) -> Result<()> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)?;
        if self.items.remove(id) {
            debug!(collection = M::COLLECTION, item = %id, "item deleted");
        }
        Ok(())
    }

    async fn delete_all(&self, cancel: &CancellationToken) -> Result<()> {
        let _gate = self.gate.acquire(cancel).await?;
        self.items.clear();
        debug!(collection = M::COLLECTION, "all items deleted");
        Ok(())
    }
}

#[async_trait]
impl<M: Model> Search<M> for CrudMemory<M> {
    async fn search(
        &self,
        details: &SearchDetails,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        contract::require_limit(limit)?;
        details.validate()?;
        let gate = self.gate.acquire(cancel).await?;
        let items = self.snapshot(&gate)?.into_iter().map(|(_, item)| item);
        search::search_page(items, details, offset, limit)
    }
}

#[async_trait]
impl<M: Model> DistributedLock<M::Id> for CrudMemory<M> {
    async fn claim_distributed_lock(
        &self,
        id: &M::Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Lock<M::Id>> {
        self.locks.claim(id, lease, current_lock_id, cancel).await
    }

    async fn release_distributed_lock(
        &self,
        id: &M::Id,
        lock_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.locks.release(id, lock_id, cancel).await
    }
}

/// No transactions in memory, so there is nothing to lock.
#[async_trait]
impl<M: Model> TransactionLock<M::Id> for CrudMemory<M> {
    async fn claim_transaction_lock(&self, id: &M::Id, cancel: &CancellationToken) -> Result<()> {
        contract::require_id(id, "id")?;
        Self::check_cancelled(cancel)
    }
}
