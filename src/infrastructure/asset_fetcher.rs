//! Image download for catalog entries
//!
//! A failed download is logged and leaves the entry's image empty; it is
//! never retried here and never stops the run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::catalog::PendingAsset;
use crate::infrastructure::http_client::Fetcher;

const FALLBACK_STEM: &str = "image";

pub struct AssetFetcher {
    fetcher: Arc<dyn Fetcher>,
    default_extension: String,
}

impl AssetFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, default_extension: impl Into<String>) -> Self {
        Self { fetcher, default_extension: default_extension.into() }
    }

    /// Download `image_url`; `None` on any failure
    pub async fn download(&self, image_url: &str) -> Option<PendingAsset> {
        match self.fetcher.fetch(image_url, &[]).await {
            Ok(response) if response.is_ok() => {
                let file_name = asset_file_name(image_url, &self.default_extension);
                debug!("Downloaded {} bytes from {} as {}", response.body.len(), image_url, file_name);
                Some(PendingAsset { file_name, bytes: response.body })
            }
            Ok(response) => {
                warn!(
                    "⚠️ Image download failed. Status code: {} for URL: {}",
                    response.status, image_url
                );
                None
            }
            Err(e) => {
                warn!("⚠️ Download error for {}: {}", image_url, e);
                None
            }
        }
    }
}

/// Last path segment of `url` without query or fragment; a name without
/// extension gets `default_extension`
pub fn asset_file_name(url: &str, default_extension: &str) -> String {
    let segment = url::Url::parse(url).map_or_else(
        |_| {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            without_query.rsplit('/').next().unwrap_or_default().to_string()
        },
        |parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string()
        },
    );

    let mut name = if segment.is_empty() { FALLBACK_STEM.to_string() } else { segment };
    if !name.contains('.') {
        name.push('.');
        name.push_str(default_extension.trim_start_matches('.'));
    }
    name
}
