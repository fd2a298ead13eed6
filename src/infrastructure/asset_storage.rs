//! Filesystem storage for owned image assets
//!
//! Files land in `<root>/<upload_dir>/`; the catalog stores the path relative
//! to `root`. An existing file with the same name is never overwritten: the
//! new file gets a short content-hash suffix instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::catalog::PendingAsset;
use crate::infrastructure::config::MediaConfig;

/// A file written by [`AssetStorage::store`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Value persisted in the catalog (`perfumes/aventus.jpg`)
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AssetStorage {
    root: PathBuf,
    upload_dir: String,
}

impl AssetStorage {
    pub fn new(root: impl Into<PathBuf>, upload_dir: impl Into<String>) -> Self {
        Self { root: root.into(), upload_dir: upload_dir.into() }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.root.clone(), config.upload_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Write the asset, picking a free name
    pub async fn store(&self, asset: &PendingAsset) -> Result<StoredAsset> {
        let dir = self.root.join(&self.upload_dir);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create media directory {dir:?}"))?;

        let file_name = self.free_name(&dir, &sanitize(&asset.file_name), &asset.bytes).await;
        let absolute_path = dir.join(&file_name);
        fs::write(&absolute_path, &asset.bytes)
            .await
            .with_context(|| format!("Failed to write asset {absolute_path:?}"))?;

        let relative_path = if self.upload_dir.is_empty() {
            file_name
        } else {
            format!("{}/{}", self.upload_dir.trim_end_matches('/'), file_name)
        };
        debug!("Stored {} bytes at {:?}", asset.bytes.len(), absolute_path);
        Ok(StoredAsset { relative_path, absolute_path })
    }

    /// Undo a store whose database write failed
    pub async fn discard(&self, stored: &StoredAsset) {
        if let Err(e) = fs::remove_file(&stored.absolute_path).await {
            warn!("Failed to remove orphaned asset {:?}: {}", stored.absolute_path, e);
        }
    }

    async fn free_name(&self, dir: &Path, file_name: &str, bytes: &[u8]) -> String {
        if !fs::try_exists(dir.join(file_name)).await.unwrap_or(false) {
            return file_name.to_string();
        }

        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (file_name, String::new()),
        };
        let hash = blake3::hash(bytes).to_hex();
        let mut candidate = format!("{stem}_{}{extension}", &hash[..7]);
        let mut counter = 1;
        while fs::try_exists(dir.join(&candidate)).await.unwrap_or(false) {
            candidate = format!("{stem}_{}_{counter}{extension}", &hash[..7]);
            counter += 1;
        }
        candidate
    }
}

/// Keep the name a single, harmless path component
fn sanitize(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0' | ':') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() { "image".to_string() } else { cleaned.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str, bytes: &[u8]) -> PendingAsset {
        PendingAsset { file_name: name.to_string(), bytes: bytes.to_vec() }
    }

    #[tokio::test]
    async fn stores_under_upload_dir() -> Result<()> {
        let root = tempfile::tempdir()?;
        let storage = AssetStorage::new(root.path(), "perfumes");

        let stored = storage.store(&asset("aventus.jpg", b"jpeg")).await?;
        assert_eq!(stored.relative_path, "perfumes/aventus.jpg");
        assert_eq!(std::fs::read(storage.resolve(&stored.relative_path))?, b"jpeg");
        Ok(())
    }

    #[tokio::test]
    async fn name_collision_gets_hash_suffix() -> Result<()> {
        let root = tempfile::tempdir()?;
        let storage = AssetStorage::new(root.path(), "perfumes");

        let first = storage.store(&asset("a.jpg", b"one")).await?;
        let second = storage.store(&asset("a.jpg", b"two")).await?;
        assert_ne!(first.relative_path, second.relative_path);
        assert!(second.relative_path.starts_with("perfumes/a_"));
        assert!(second.relative_path.ends_with(".jpg"));
        assert_eq!(std::fs::read(&first.absolute_path)?, b"one");
        Ok(())
    }

    #[tokio::test]
    async fn discard_removes_file() -> Result<()> {
        let root = tempfile::tempdir()?;
        let storage = AssetStorage::new(root.path(), "perfumes");
        let stored = storage.store(&asset("gone.jpg", b"x")).await?;
        storage.discard(&stored).await;
        assert!(!stored.absolute_path.exists());
        Ok(())
    }

    #[test]
    fn sanitize_strips_path_tricks() {
        assert_eq!(sanitize("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize("..."), "image");
    }
}
