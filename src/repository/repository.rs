use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::lock::{DistributedLock, TransactionLock};
use crate::model::{Model, PageEnvelope, SearchDetails};
use crate::search;

/// Create items, with a generated id or one chosen by the caller.
#[async_trait]
pub trait Create<M: Model>: Send + Sync {
    /// Store a new item under a generated id and return that id.
    async fn create(&self, item: M, cancel: &CancellationToken) -> Result<M::Id>;

    async fn create_and_return(&self, item: M, cancel: &CancellationToken) -> Result<M>;

    /// Store a new item under `id`. Fails with `Conflict` if `id` is taken.
    async fn create_with_specified_id(
        &self,
        id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn create_with_specified_id_and_return(
        &self,
        id: &M::Id,
        item: M,
        cancel: &CancellationToken,
    ) -> Result<M>;
}

/// Read items by id or page through all of them.
#[async_trait]
pub trait Read<M: Model>: Send + Sync {
    async fn read(&self, id: &M::Id, cancel: &CancellationToken) -> Result<Option<M>>;

    async fn read_all_with_paging(
        &self,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>>;

    /// Up to `limit` items.
    async fn read_all(&self, limit: usize, cancel: &CancellationToken) -> Result<Vec<M>>;
}

/// Replace stored items, checking the concurrency token when the model has one.
#[async_trait]
pub trait Update<M: Model>: Send + Sync {
    async fn update(&self, id: &M::Id, item: M, cancel: &CancellationToken) -> Result<()>;

    async fn update_and_return(&self, id: &M::Id, item: M, cancel: &CancellationToken)
        -> Result<M>;
}

/// Delete items. Deleting an id that does not exist succeeds.
#[async_trait]
pub trait Delete<M: Model>: Send + Sync {
    async fn delete(&self, id: &M::Id, cancel: &CancellationToken) -> Result<()>;

    async fn delete_all(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Search by field equality with ordering and paging.
#[async_trait]
pub trait Search<M: Model>: Send + Sync {
    async fn search(
        &self,
        details: &SearchDetails,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>>;

    /// The only item matching `details`. `NotFound` if none, `Contract` if
    /// several.
    async fn find_unique(&self, details: &SearchDetails, cancel: &CancellationToken) -> Result<M> {
        search::find_unique(|offset, limit| self.search(details, offset, limit, cancel)).await
    }

    async fn search_first(
        &self,
        details: &SearchDetails,
        cancel: &CancellationToken,
    ) -> Result<Option<M>> {
        search::search_first(|offset, limit| self.search(details, offset, limit, cancel)).await
    }

    /// Every match, up to `max_items`, fetched `page_limit` at a time.
    async fn search_all(
        &self,
        details: &SearchDetails,
        page_limit: usize,
        max_items: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<M>> {
        search::read_pages(
            |offset, limit| self.search(details, offset, limit, cancel),
            page_limit,
            max_items,
        )
        .await
    }
}

/// Claim the transaction lock on an item, then read it.
#[async_trait]
pub trait ClaimAndRead<M: Model>: TransactionLock<M::Id> + Read<M> {
    async fn claim_transaction_lock_and_read(
        &self,
        id: &M::Id,
        cancel: &CancellationToken,
    ) -> Result<Option<M>> {
        self.claim_transaction_lock(id, cancel).await?;
        self.read(id, cancel).await
    }
}

impl<M: Model, T> ClaimAndRead<M> for T where T: TransactionLock<M::Id> + Read<M> + ?Sized {}

/// Full CRUD store combining all capabilities.
pub trait Crud<M: Model>:
    Create<M>
    + Read<M>
    + Update<M>
    + Delete<M>
    + Search<M>
    + DistributedLock<M::Id>
    + TransactionLock<M::Id>
{
}

// Blanket implementation: anything implementing all capabilities is a Crud store
impl<M: Model, T> Crud<M> for T where
    T: Create<M>
        + Read<M>
        + Update<M>
        + Delete<M>
        + Search<M>
        + DistributedLock<M::Id>
        + TransactionLock<M::Id>
        + ?Sized
{
}
