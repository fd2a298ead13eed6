// Database connection and pool management
// This module handles the SQLite catalog database using sqlx

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = is_memory_url(database_url);

        if !in_memory {
            let db_path = file_path(database_url);
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create database directory {parent:?}"))?;
                }
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)
                    .with_context(|| format!("Failed to create database file {db_path}"))?;
            }
        }

        // Every pooled connection to `sqlite::memory:` is a separate database
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        info!("📁 Connected to catalog database: {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_perfumes_sql = r#"
            CREATE TABLE IF NOT EXISTS perfumes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                brand TEXT NOT NULL,
                url TEXT,
                country TEXT,
                gender TEXT,
                rating_value REAL,
                rating_count INTEGER,
                year TEXT,
                top_notes TEXT,
                middle_notes TEXT,
                base_notes TEXT,
                perfumer1 TEXT,
                perfumer2 TEXT,
                main_accord1 TEXT,
                main_accord2 TEXT,
                main_accord3 TEXT,
                main_accord4 TEXT,
                main_accord5 TEXT,
                description TEXT,
                image TEXT,
                image_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (name, brand)
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_perfumes_brand ON perfumes (brand);
        "#;

        sqlx::query(create_perfumes_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn file_path(database_url: &str) -> &str {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    path.split('?').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection_creates_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("catalog.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration_is_repeatable() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        db.migrate().await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='perfumes'")
            .fetch_optional(db.pool())
            .await?;
        assert!(result.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_natural_key_is_unique() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;

        let insert = "INSERT INTO perfumes (id, name, brand, created_at, updated_at) VALUES ($1, 'Aventus', 'Creed', '', '')";
        sqlx::query(insert).bind("a").execute(db.pool()).await?;
        let duplicate = sqlx::query(insert).bind("b").execute(db.pool()).await;
        assert!(duplicate.is_err());
        Ok(())
    }

    #[test]
    fn test_file_path_strips_scheme_and_query() {
        assert_eq!(file_path("sqlite://data/catalog.db"), "data/catalog.db");
        assert_eq!(file_path("sqlite:/tmp/x.db?mode=rwc"), "/tmp/x.db");
        assert!(is_memory_url("sqlite::memory:"));
    }
}
