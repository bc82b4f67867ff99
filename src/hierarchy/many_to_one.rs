use std::marker::PhantomData;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{contract, CrudError, Result};
use crate::model::{Dependent, ItemId, PageEnvelope, SearchDetails};
use crate::repository::{Create, Delete, Read, Search, Update};
use crate::search;

const CHILD_PAGE: usize = 100;

/// Children that point at their parent through a field of their own.
///
/// Unlike [`DependentToMasterMemory`](super::DependentToMasterMemory), the
/// children share one store and one id space. Child queries are searches on
/// `parent_field`, so any store with search works, in memory or SQL.
pub struct ManyToOne<S, M, ParentId> {
    store: S,
    parent_field: String,
    id_field: String,
    _marker: PhantomData<fn() -> (M, ParentId)>,
}

impl<S, M, ParentId> ManyToOne<S, M, ParentId>
where
    S: Create<M> + Read<M> + Update<M> + Delete<M> + Search<M>,
    M: Dependent<ParentId>,
    ParentId: ItemId,
{
    /// `parent_field` is the serialized name of the field holding the parent id.
    pub fn new(store: S, parent_field: impl Into<String>) -> Self {
        Self {
            store,
            parent_field: parent_field.into(),
            id_field: "Id".to_string(),
            _marker: PhantomData,
        }
    }

    /// Serialized name of the child's own id field. Defaults to `Id`.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// The underlying store, for operations that are not parent-scoped.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(CrudError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// `details` narrowed to the children of `parent_id`.
    fn scoped(&self, parent_id: &ParentId, details: &SearchDetails) -> Result<SearchDetails> {
        contract::require_id(parent_id, "parent_id")?;
        let parent = serde_json::to_value(parent_id)?;
        if let Some(existing) = details.where_.get(&self.parent_field) {
            contract::require(*existing == parent, || {
                format!(
                    "search condition {} = {} contradicts parent {}",
                    self.parent_field, existing, parent_id
                )
            })?;
        }
        Ok(details.clone().where_eq(self.parent_field.clone(), parent))
    }

    fn child_id(&self, child: &M) -> Result<M::Id> {
        let mut value = serde_json::to_value(child)?;
        let id = value
            .get_mut(&self.id_field)
            .map(Value::take)
            .ok_or_else(|| {
                CrudError::contract(format!(
                    "{} items have no field {}",
                    M::COLLECTION,
                    self.id_field
                ))
            })?;
        Ok(serde_json::from_value(id)?)
    }

    /// Store a child of `parent_id` under a generated id.
    ///
    /// The parent id is stamped onto the item; an item already pointing at
    /// another parent is rejected with `Contract`.
    pub async fn create_child(
        &self,
        parent_id: &ParentId,
        mut item: M,
        cancel: &CancellationToken,
    ) -> Result<M::Id> {
        Self::check_cancelled(cancel)?;
        contract::require_id(parent_id, "parent_id")?;
        if let Some(carried) = item.master_id() {
            contract::require(carried == *parent_id, || {
                format!(
                    "{} item points at parent {} but was created under {}",
                    M::COLLECTION,
                    carried,
                    parent_id
                )
            })?;
        }
        item.assign_master_id(parent_id);
        self.store.create(item, cancel).await
    }

    pub async fn read_children_with_paging(
        &self,
        parent_id: &ParentId,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        self.search_children(parent_id, &SearchDetails::all(), offset, limit, cancel)
            .await
    }

    /// Up to `limit` children, fetched a page at a time.
    pub async fn read_children(
        &self,
        parent_id: &ParentId,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<M>> {
        Self::check_cancelled(cancel)?;
        contract::require_limit(limit)?;
        let details = self.scoped(parent_id, &SearchDetails::all())?;
        search::read_pages(
            |offset, page_limit| self.store.search(&details, offset, page_limit, cancel),
            limit.min(CHILD_PAGE),
            limit,
        )
        .await
    }

    pub async fn search_children(
        &self,
        parent_id: &ParentId,
        details: &SearchDetails,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PageEnvelope<M>> {
        Self::check_cancelled(cancel)?;
        let details = self.scoped(parent_id, details)?;
        self.store.search(&details, offset, limit, cancel).await
    }

    pub async fn find_unique_child(
        &self,
        parent_id: &ParentId,
        details: &SearchDetails,
        cancel: &CancellationToken,
    ) -> Result<M> {
        Self::check_cancelled(cancel)?;
        let details = self.scoped(parent_id, details)?;
        self.store.find_unique(&details, cancel).await
    }

    /// Delete every child of `parent_id`, one id at a time.
    pub async fn delete_children(&self, parent_id: &ParentId, cancel: &CancellationToken) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let details = self.scoped(parent_id, &SearchDetails::all())?;
        let mut deleted = 0usize;
        loop {
            let page = self.store.search(&details, 0, CHILD_PAGE, cancel).await?;
            if page.is_empty() {
                break;
            }
            for child in &page.data {
                let id = self.child_id(child)?;
                self.store.delete(&id, cancel).await?;
                deleted += 1;
            }
        }
        debug!(collection = M::COLLECTION, parent = %parent_id, deleted, "children deleted");
        Ok(())
    }
}
