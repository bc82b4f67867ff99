//! Models - The item, identity, token, page and search types shared by all backends.
//!
//! A stored type implements [`Model`]. Only the id type and a collection name
//! are required; the other capabilities are opt-in.
//!
//! ## Example
//!
//! ```ignore
//! use crud_rust::{Concurrency, ConcurrencyToken, Model};
//!
//! #[derive(Serialize, Deserialize, Clone)]
//! struct Customer {
//!     pub id: Uuid,
//!     pub name: String,
//!     pub etag: Option<String>,
//! }
//!
//! impl Model for Customer {
//!     type Id = Uuid;
//!     const COLLECTION: &'static str = "customers";
//!
//!     fn assign_id(&mut self, id: &Uuid) { self.id = *id; }
//!     fn concurrency(&self) -> Concurrency {
//!         Concurrency::WithToken(ConcurrencyToken::ETag(self.etag.clone().unwrap_or_default()))
//!     }
//!     fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
//!         self.etag = Some(token.as_etag());
//!     }
//! }
//! ```

mod id;
mod in_memory;
mod page;
mod search;
mod store;
mod token;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

pub use id::ItemId;
pub use in_memory::{CrudMemory, UniqueConstraint};
pub use page::{PageEnvelope, PageInfo};
pub use search::{OrderBy, SearchDetails};
pub use store::{ConcurrentMap, KeyedStore};
pub use token::{Concurrency, ConcurrencyToken, TokenKind};

/// Trait for types that can be stored.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identity type of this model.
    type Id: ItemId;

    /// The collection name (table name in SQL, partition label in memory).
    const COLLECTION: &'static str;

    /// Copy a newly assigned id into the item, if it carries one.
    fn assign_id(&mut self, _id: &Self::Id) {}

    /// Whether this model carries a concurrency token, and its current value.
    fn concurrency(&self) -> Concurrency {
        Concurrency::Plain
    }

    /// Store a new concurrency token. Only called for `WithToken` models.
    fn set_concurrency_token(&mut self, _token: ConcurrencyToken) {}

    fn set_created_at(&mut self, _at: DateTime<Utc>) {}

    fn set_updated_at(&mut self, _at: DateTime<Utc>) {}

    /// Reject an item that must not be stored. Runs before every create and
    /// update; an `Err` should be a [`CrudError::Contract`](crate::CrudError).
    fn validate(&self) -> crate::Result<()> {
        Ok(())
    }
}

/// A model stored under a master item.
///
/// Items that carry their master id get it stamped on create and update. A
/// carried master id that differs from the one the item is stored under is a
/// contract violation. Models without a master field keep the defaults.
pub trait Dependent<MasterId>: Model {
    fn master_id(&self) -> Option<MasterId> {
        None
    }

    fn assign_master_id(&mut self, _master_id: &MasterId) {}
}

/// Copy an item through its serialized form, so the copy shares nothing
/// with the source.
pub fn deep_copy<M: Model>(item: &M) -> crate::Result<M> {
    let bytes = serde_json::to_vec(item)?;
    Ok(serde_json::from_slice(&bytes)?)
}
