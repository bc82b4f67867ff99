use std::fmt;
use std::hash::Hash;

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Identity of a stored item.
///
/// Ids are comparable so that unordered reads have a stable order, and they
/// have a recognisable default value that is never a valid identity.
pub trait ItemId:
    Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Produce a new id. `sequence` is a per-store counter starting at 1;
    /// integer ids use it directly, random ids ignore it.
    /// Returns `None` when the id space is exhausted.
    fn generate(sequence: u64) -> Option<Self>;

    /// True for the zero / empty value.
    fn is_default(&self) -> bool;
}

impl ItemId for Uuid {
    fn generate(_sequence: u64) -> Option<Self> {
        Some(Uuid::new_v4())
    }

    fn is_default(&self) -> bool {
        self.is_nil()
    }
}

impl ItemId for String {
    fn generate(_sequence: u64) -> Option<Self> {
        Some(Uuid::new_v4().to_string())
    }

    fn is_default(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! integer_item_id {
    ($($ty:ty),*) => {
        $(
            impl ItemId for $ty {
                fn generate(sequence: u64) -> Option<Self> {
                    <$ty>::try_from(sequence).ok()
                }

                fn is_default(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}

integer_item_id!(i32, i64, u32, u64);
