//! Hierarchy - Master/dependent partitioning and parent-keyed children.
//!
//! A dependent item is addressed by `(master_id, dependent_id)`. Each master
//! gets its own [`CrudMemory`](crate::CrudMemory) keyed by dependent id, so
//! the same dependent id can live under many masters.
//!
//! [`ManyToOne`] covers the other shape: children with their own global id
//! that name their parent in a field, queried by search on that field.

mod dependent_memory;
mod many_to_one;

pub use dependent_memory::DependentToMasterMemory;
pub use many_to_one::ManyToOne;
