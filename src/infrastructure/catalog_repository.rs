//! SQLite implementation of the catalog repository
//!
//! Each `create`/`update` is one SQL transaction; when the entry carries a
//! pending asset the file is written first and removed again if the
//! transaction does not commit.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::catalog::{CatalogEntry, EntryChanges, ImportRecord, NaturalKey, PerfumeAttributes};
use crate::domain::repositories::CatalogRepository;
use crate::infrastructure::asset_storage::{AssetStorage, StoredAsset};

const ENTRY_COLUMNS: &str = "id, name, brand, url, country, gender, rating_value, rating_count, year, \
     top_notes, middle_notes, base_notes, perfumer1, perfumer2, \
     main_accord1, main_accord2, main_accord3, main_accord4, main_accord5, \
     description, image, image_url, created_at, updated_at";

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
    storage: AssetStorage,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool, storage: AssetStorage) -> Self {
        Self { pool, storage }
    }

    pub fn storage(&self) -> &AssetStorage {
        &self.storage
    }

    /// Helper method to convert database row to CatalogEntry entity
    fn row_to_entry(row: &SqliteRow) -> Result<CatalogEntry> {
        let rating_count = row
            .try_get::<Option<i64>, _>("rating_count")?
            .map(u32::try_from)
            .transpose()
            .map_err(|e| anyhow!("Failed to read rating_count: {}", e))?;

        let attributes = PerfumeAttributes {
            country: row.try_get("country")?,
            gender: row.try_get("gender")?,
            rating_value: row.try_get("rating_value")?,
            rating_count,
            year: row.try_get("year")?,
            top_notes: row.try_get("top_notes")?,
            middle_notes: row.try_get("middle_notes")?,
            base_notes: row.try_get("base_notes")?,
            perfumer1: row.try_get("perfumer1")?,
            perfumer2: row.try_get("perfumer2")?,
            main_accords: [
                row.try_get("main_accord1")?,
                row.try_get("main_accord2")?,
                row.try_get("main_accord3")?,
                row.try_get("main_accord4")?,
                row.try_get("main_accord5")?,
            ],
        };

        Ok(CatalogEntry {
            id: row.try_get("id")?,
            key: NaturalKey { name: row.try_get("name")?, brand: row.try_get("brand")? },
            url: row.try_get("url")?,
            attributes,
            description: row.try_get("description")?,
            image: row.try_get("image")?,
            image_url: row.try_get("image_url")?,
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM perfumes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn store_asset(&self, changes: &EntryChanges) -> Result<Option<StoredAsset>> {
        match &changes.image {
            Some(asset) => Ok(Some(self.storage.store(asset).await?)),
            None => Ok(None),
        }
    }

    async fn insert_entry(
        &self,
        id: &str,
        record: &ImportRecord,
        changes: &EntryChanges,
        image: Option<&str>,
        now: &str,
    ) -> Result<()> {
        let attrs = &record.attributes;
        let [accord1, accord2, accord3, accord4, accord5] = &attrs.main_accords;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO perfumes ({ENTRY_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)"
        ))
        .bind(id)
        .bind(&record.key.name)
        .bind(&record.key.brand)
        .bind(&record.url)
        .bind(&attrs.country)
        .bind(&attrs.gender)
        .bind(attrs.rating_value)
        .bind(attrs.rating_count.map(i64::from))
        .bind(&attrs.year)
        .bind(&attrs.top_notes)
        .bind(&attrs.middle_notes)
        .bind(&attrs.base_notes)
        .bind(&attrs.perfumer1)
        .bind(&attrs.perfumer2)
        .bind(accord1)
        .bind(accord2)
        .bind(accord3)
        .bind(accord4)
        .bind(accord5)
        .bind(&changes.description)
        .bind(image)
        .bind(&changes.image_url)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_changes(
        &self,
        id: &str,
        changes: &EntryChanges,
        image: Option<&str>,
        now: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE perfumes
            SET description = COALESCE($2, description),
                image = COALESCE($3, image),
                image_url = COALESCE($4, image_url),
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&changes.description)
        .bind(image)
        .bind(&changes.image_url)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Catalog entry {} no longer exists", id));
        }
        tx.commit().await?;
        Ok(())
    }
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    Ok(DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| anyhow!("Failed to parse {}: {}", column, e))?
        .with_timezone(&Utc))
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM perfumes WHERE name = $1 AND brand = $2"
        ))
        .bind(&key.name)
        .bind(&key.brand)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn create(&self, record: &ImportRecord, changes: &EntryChanges) -> Result<CatalogEntry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let stored = self.store_asset(changes).await?;
        let image = stored.as_ref().map(|s| s.relative_path.as_str());

        if let Err(e) = self.insert_entry(&id, record, changes, image, &now).await {
            if let Some(stored) = &stored {
                warn!("Rolling back asset {} after failed insert", stored.relative_path);
                self.storage.discard(stored).await;
            }
            return Err(e.context(format!("Failed to create catalog entry {}", record.key)));
        }

        debug!("Created catalog entry {} ({})", record.key, id);
        self.find_by_id(&id)
            .await?
            .ok_or_else(|| anyhow!("Catalog entry {} vanished after insert", id))
    }

    async fn update(&self, entry: &CatalogEntry, changes: &EntryChanges) -> Result<CatalogEntry> {
        if changes.is_empty() {
            return Ok(entry.clone());
        }

        let now = Utc::now().to_rfc3339();
        let stored = self.store_asset(changes).await?;
        let image = stored.as_ref().map(|s| s.relative_path.as_str());

        if let Err(e) = self.apply_changes(&entry.id, changes, image, &now).await {
            if let Some(stored) = &stored {
                warn!("Rolling back asset {} after failed update", stored.relative_path);
                self.storage.discard(stored).await;
            }
            return Err(e.context(format!("Failed to update catalog entry {}", entry.key)));
        }

        debug!("Updated {} on {}", changes.changed_fields().join(", "), entry.key);
        self.find_by_id(&entry.id)
            .await?
            .ok_or_else(|| anyhow!("Catalog entry {} vanished after update", entry.id))
    }

    async fn count_entries(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM perfumes")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total)?)
    }
}
