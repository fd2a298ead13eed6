//! Domain module - catalog entities and the store contract
//!
//! This module contains the catalog entities, the per-row change set and the
//! repository trait the import pipeline writes through.

pub mod catalog;
pub mod repositories;

// Re-export commonly used items
pub use catalog::*;
pub use repositories::CatalogRepository;
