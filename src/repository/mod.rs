#[allow(clippy::module_inception)]
mod repository;

pub use repository::{ClaimAndRead, Create, Crud, Delete, Read, Search, Update};
