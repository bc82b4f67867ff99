use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::StoreOptions;
use crate::error::{contract, CrudError, Result};
use crate::lock::{DependentLock, DistributedLock};
use crate::model::{
    ConcurrentMap, CrudMemory, Dependent, ItemId, Model, PageEnvelope, SearchDetails,
    UniqueConstraint,
};
use crate::repository::{Create, Delete, Read, Search, Update};

/// Dependent items partitioned by master id.
///
/// Every operation resolves the master's partition and delegates to it with
/// the dependent id as the key. Creates and lock claims install a partition
/// on first use; reads, updates and deletes only look one up, so an unknown
/// master reads as empty. Partitions live as long as the router.
pub struct DependentToMasterMemory<MasterId: ItemId, M: Model> {
    partitions: ConcurrentMap<MasterId, Arc<CrudMemory<M>>>,
    options: StoreOptions,
    unique_constraints: Vec<UniqueConstraint<M>>,
}

impl<MasterId: ItemId, M: Dependent<MasterId>> Default for DependentToMasterMemory<MasterId, M> {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl<MasterId: ItemId, M: Dependent<MasterId>> DependentToMasterMemory<MasterId, M> {
    pub fn new(options: StoreOptions) -> Self {
        DependentToMasterMemory {
            partitions: ConcurrentMap::new(),
            options,
            unique_constraints: Vec::new(),
        }
    }

    /// Register a uniqueness rule applied within each master's partition.
    pub fn with_unique_constraint(
        mut self,
        name: impl Into<String>,
        check: impl Fn(&M, &[M]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.unique_constraints.push(UniqueConstraint::new(name, check));
        self
    }

    /// The partition for `master_id`, created on first use. Racing callers
    /// for a new master all get the same partition.
    pub fn store_for(&self, master_id: &MasterId) -> Result<Arc<CrudMemory<M>>> {
        contract::require_id(master_id, "master_id")?;
        Ok(self.partitions.get_or_insert_with(master_id.clone(), || {
            debug!(collection = M::COLLECTION, master = %master_id, "partition created");
            Arc::new(
                CrudMemory::new(self.options).with_unique_constraints(self.unique_constraints.clone()),
            )
        }))
    }

    /// The existing partition for `master_id`, if any.
    fn existing(&self, master_id: &MasterId) -> Result<Option<Arc<CrudMemory<M>>>> {
        contract::require_id(master_id, "master_id")?;
        Ok(self.partitions.lookup(master_id))
    }

    /// Master ids that currently have a partition.
    pub fn masters(&self) -> Vec<MasterId> {
        let mut masters = self.partitions.keys();
        masters.sort();
        masters
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(CrudError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Check the master id the item carries and stamp the one it is stored under.
    fn stamp_master(master_id: &MasterId, mut item: M) -> Result<M> {
        contract::require_id(master_id, "master_id")?;
        if let Some(carried) = item.master_id() {
            contract::require(carried == *master_id, || {
                format!(
                    "{} item carries master id {} but is stored under master {}",
                    M::COLLECTION,
                    carried,
                    master_id
                )
            })?;
        }
        item.assign_master_id(master_id);
        Ok(item)
    }

    fn not_found(master_id: &MasterId, dependent_id: &M::Id) -> CrudError {
        CrudError::not_found(format!(
            "{} item {} does not exist under master {}",
            M::COLLECTION,
            dependent_id,
            master_id
        ))
    }

    pub async fn create(
        &self,
        master_id: &MasterId,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<M::Id> {
        Self::check_cancelled(cancel)?;
        let item = Self::stamp_master(master_id, item)?;
        self.store_for(master_id)?.create(item, cancel).await
    }

    pub async fn create_and_return(
        &self,
        master_id: &MasterId,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<M> {
        Self::check_cancelled(cancel)?;
        let item = Self::stamp_master(master_id, item)?;
        self.store_for(master_id)?.create_and_return(item, cancel).await
    }

    pub async fn create_with_specified_id(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.create_with_specified_id_and_return(master_id, dependent_id, item, cancel)
            .await
            .map(|_| ())
    }

    pub async fn create_with_specified_id_and_return(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<M> {
        Self::check_cancelled(cancel)?;
        contract::require_id(dependent_id, "dependent_id")?;
        let item = Self::stamp_master(master_id, item)?;
        self.store_for(master_id)?
            .create_with_specified_id_and_return(dependent_id, item, cancel)
            .await
    }

    pub async fn read(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        cancel: &CancellationToken,
    ) -> Result<Option<M>> {
        Self::check_cancelled(cancel)?;
        contract::require_id(dependent_id, "dependent_id")?;
        match self.existing(master_id)? {
            Some(store) => store.read(dependent_id, cancel).await,
            None => Ok(None),
        }
    }

    pub async fn read_children_with_paging(
        &self,
        master_id: &MasterId,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        self.search_children(master_id, &SearchDetails::all(), offset, limit, cancel)
            .await
    }

    pub async fn read_children(
        &self,
        master_id: &MasterId,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<M>> {
        Self::check_cancelled(cancel)?;
        contract::require_limit(limit)?;
        match self.existing(master_id)? {
            Some(store) => store.read_all(limit, cancel).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn search_children(
        &self,
        master_id: &MasterId,
        details: &SearchDetails,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        Self::check_cancelled(cancel)?;
        contract::require_limit(limit)?;
        details.validate()?;
        match self.existing(master_id)? {
            Some(store) => store.search(details, offset, limit, cancel).await,
            None => Ok(PageEnvelope::empty(offset, limit, 0)),
        }
    }

    pub async fn find_unique_child(
        &self,
        master_id: &MasterId,
        details: &SearchDetails,
        cancel: &CancellationToken,
    ) -> Result<M> {
        crate::search::find_unique(|offset, limit| {
            self.search_children(master_id, details, offset, limit, cancel)
        })
        .await
    }

    pub async fn update(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.update_and_return(master_id, dependent_id, item, cancel)
            .await
            .map(|_| ())
    }

    pub async fn update_and_return(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<M> {
        Self::check_cancelled(cancel)?;
        contract::require_id(dependent_id, "dependent_id")?;
        let item = Self::stamp_master(master_id, item)?;
        match self.existing(master_id)? {
            Some(store) => store.update_and_return(dependent_id, item, cancel).await,
            None => Err(Self::not_found(master_id, dependent_id)),
        }
    }

    pub async fn delete(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        contract::require_id(dependent_id, "dependent_id")?;
        match self.existing(master_id)? {
            Some(store) => store.delete(dependent_id, cancel).await,
            None => Ok(()),
        }
    }

    /// Delete every dependent of `master_id`.
    pub async fn delete_children(&self, master_id: &MasterId, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancelled(cancel)?;
        match self.existing(master_id)? {
            Some(store) => store.delete_all(cancel).await,
            None => Ok(()),
        }
    }

    pub async fn claim_distributed_lock(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        lease: Option<Duration>,
        current_lock_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<DependentLock<MasterId, M::Id>> {
        Self::check_cancelled(cancel)?;
        contract::require_id(dependent_id, "dependent_id")?;
        self.options.lease_or_default(lease)?;
        let lock = self
            .store_for(master_id)?
            .claim_distributed_lock(dependent_id, lease, current_lock_id, cancel)
            .await?;
        Ok(lock.into_dependent(master_id.clone()))
    }

    pub async fn release_distributed_lock(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        lock_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        contract::require_id(dependent_id, "dependent_id")?;
        match self.existing(master_id)? {
            Some(store) => store.release_distributed_lock(dependent_id, lock_id, cancel).await,
            None => Ok(()),
        }
    }

    /// No-op apart from argument checks.
    pub async fn claim_transaction_lock(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        contract::require_id(master_id, "master_id")?;
        contract::require_id(dependent_id, "dependent_id")
    }

    pub async fn claim_transaction_lock_and_read(
        &self,
        master_id: &MasterId,
        dependent_id: &M::Id,
        cancel: &CancellationToken,
    ) -> Result<Option<M>> {
        self.claim_transaction_lock(master_id, dependent_id, cancel)
            .await?;
        self.read(master_id, dependent_id, cancel).await
    }
}
