//! Application layer
//!
//! Drives the import: reconciliation, conditional enrichment, pacing and
//! the run summary, on top of the domain traits and infrastructure adapters.

pub mod import_orchestrator;

// Re-export commonly used items
pub use import_orchestrator::{ImportError, ImportOrchestrator, ImportSummary, RowError};
