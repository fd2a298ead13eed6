//! Perfume catalog import
//!
//! Resumable batch import of perfume records from a `;`-delimited export into
//! a SQLite catalog, with image and description enrichment fetched from a
//! rate-limited reference site.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use application::{ImportError, ImportOrchestrator, ImportSummary};
