//! Repository interfaces for the perfume catalog
//!
//! The import pipeline only needs key lookup, creation and additive updates;
//! browsing and moderation live elsewhere.

use async_trait::async_trait;
use anyhow::Result;

use crate::domain::catalog::{CatalogEntry, EntryChanges, ImportRecord, NaturalKey, PendingAsset};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<CatalogEntry>>;

    /// Insert a new entry built from `record`, applying `changes` in the same save
    async fn create(&self, record: &ImportRecord, changes: &EntryChanges) -> Result<CatalogEntry>;

    /// Write only the fields present in `changes`; the asset (if any) is stored
    /// in the same transaction as the column updates
    async fn update(&self, entry: &CatalogEntry, changes: &EntryChanges) -> Result<CatalogEntry>;

    async fn attach_asset(&self, entry: &CatalogEntry, asset: PendingAsset) -> Result<CatalogEntry> {
        let changes = EntryChanges { image: Some(asset), ..EntryChanges::default() };
        self.update(entry, &changes).await
    }

    async fn count_entries(&self) -> Result<u64>;
}
