//! Row-by-row catalog import
//!
//! Reconciles every source row against the catalog by natural key, fetches
//! the reference page only for new or incomplete entries, and writes each
//! row's result in a single save. The catalog itself is the checkpoint: a
//! re-run skips complete entries and picks up where the last one stopped.
//!
//! Only persistent rate limiting stops the run. Every other failure is
//! logged against its row and the run moves on.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::catalog::{CatalogEntry, EntryChanges, ImportRecord, RecordError};
use crate::domain::repositories::CatalogRepository;
use crate::infrastructure::asset_fetcher::AssetFetcher;
use crate::infrastructure::config::{AppConfig, PacingConfig};
use crate::infrastructure::csv_source::{CsvSource, SourceError, SourceRow};
use crate::infrastructure::html_parser::PerfumePageExtractor;
use crate::infrastructure::http_client::Fetcher;
use crate::infrastructure::retry_manager::{BackoffController, BackoffOutcome, RateLimitExhausted};
use crate::infrastructure::timing::{SharedRng, Sleeper, seconds};

/// Errors that end the whole run
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Persistent rate limiting at row {row} ({name}): {attempts} attempts on {url}")]
    RateLimitExhausted { row: usize, name: String, url: String, attempts: u32 },
}

/// Failure of a single row
#[derive(Error, Debug)]
pub enum RowError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExhausted),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows_read: usize,
    /// New entries that received at least one enrichment field
    pub imported: usize,
    pub enriched_existing: usize,
    pub created_without_enrichment: usize,
    pub skipped_complete: usize,
    pub malformed: usize,
    /// Fetched rows that produced nothing to write
    pub no_data: usize,
    pub failed: usize,
}

impl ImportSummary {
    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Malformed => self.malformed += 1,
            RowOutcome::SkippedComplete => self.skipped_complete += 1,
            RowOutcome::CreatedWithoutUrl => self.created_without_enrichment += 1,
            RowOutcome::NothingToFetch => {}
            RowOutcome::Fetched { created, changed } => {
                match (*created, changed.is_empty()) {
                    (true, false) => self.imported += 1,
                    (true, true) => self.created_without_enrichment += 1,
                    (false, false) => self.enriched_existing += 1,
                    (false, true) => {}
                }
                if changed.is_empty() {
                    self.no_data += 1;
                }
            }
        }
    }

    pub fn log(&self) {
        info!("📊 Rows read: {}", self.rows_read);
        info!(
            "   created+enriched: {}, enriched existing: {}, created without enrichment: {}",
            self.imported, self.enriched_existing, self.created_without_enrichment
        );
        info!(
            "   skipped complete: {}, malformed: {}, no data: {}, failed: {}",
            self.skipped_complete, self.malformed, self.no_data, self.failed
        );
        info!("✅ Imported {} new perfumes with images & descriptions", self.imported);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RowOutcome {
    Malformed,
    SkippedComplete,
    CreatedWithoutUrl,
    /// Existing incomplete entry whose row carries no URL
    NothingToFetch,
    Fetched { created: bool, changed: Vec<&'static str> },
}

/// What reconciliation decided for a row before any network traffic
enum Plan {
    Done(RowOutcome),
    Enrich { record: ImportRecord, existing: Option<CatalogEntry>, url: String },
}

pub struct ImportOrchestrator {
    repository: Arc<dyn CatalogRepository>,
    controller: BackoffController,
    extractor: PerfumePageExtractor,
    assets: AssetFetcher,
    sleeper: Arc<dyn Sleeper>,
    rng: Arc<SharedRng>,
    pacing: PacingConfig,
}

impl ImportOrchestrator {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        controller: BackoffController,
        extractor: PerfumePageExtractor,
        assets: AssetFetcher,
        sleeper: Arc<dyn Sleeper>,
        rng: Arc<SharedRng>,
        pacing: PacingConfig,
    ) -> Self {
        Self { repository, controller, extractor, assets, sleeper, rng, pacing }
    }

    /// Wire the pipeline from configuration around the given adapters
    pub fn from_config(
        config: &AppConfig,
        repository: Arc<dyn CatalogRepository>,
        fetcher: Arc<dyn Fetcher>,
        sleeper: Arc<dyn Sleeper>,
        rng: Arc<SharedRng>,
    ) -> Self {
        let controller = BackoffController::new(
            fetcher.clone(),
            sleeper.clone(),
            rng.clone(),
            config.retry.clone(),
        );
        Self::new(
            repository,
            controller,
            PerfumePageExtractor::with_config(config.extractor.clone()),
            AssetFetcher::new(fetcher, config.media.default_extension.clone()),
            sleeper,
            rng,
            config.pacing.clone(),
        )
    }

    /// Import every row of the file at `path`
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<ImportSummary, ImportError> {
        let path = path.as_ref();
        info!("📖 Reading CSV file: {}", path.display());
        let mut source = CsvSource::open(path)?;

        let mut summary = self.run(source.by_ref()).await?;
        summary.rows_read += source.rejected();
        summary.malformed += source.rejected();
        summary.log();
        Ok(summary)
    }

    /// Import a sequence of rows in order
    pub async fn run<I>(&self, rows: I) -> Result<ImportSummary, ImportError>
    where
        I: IntoIterator<Item = Result<SourceRow, SourceError>>,
    {
        let mut summary = ImportSummary::default();

        for item in rows {
            summary.rows_read += 1;
            let row = match item {
                Ok(row) => row,
                Err(e) => {
                    warn!(row = e.row(), "⚠️ Skipping unreadable row: {}", e);
                    summary.failed += 1;
                    continue;
                }
            };

            match self.import_row(&row).await {
                Ok(outcome) => summary.record(&outcome),
                Err(RowError::RateLimited(exhausted)) => {
                    error!(
                        "⛔ CRITICAL 429 at row {}: retry budget spent for {}",
                        row.row_number,
                        row.name()
                    );
                    return Err(ImportError::RateLimitExhausted {
                        row: row.row_number,
                        name: row.name().to_string(),
                        url: exhausted.url,
                        attempts: exhausted.attempts,
                    });
                }
                Err(e) => {
                    warn!("⚠️ Error importing row {} ({}): {:#}", row.row_number, row.name(), e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn import_row(&self, row: &SourceRow) -> Result<RowOutcome, RowError> {
        match self.plan(row).await? {
            Plan::Done(outcome) => Ok(outcome),
            Plan::Enrich { record, existing, url } => {
                let result = self.enrich(&record, existing, &url).await;
                if !matches!(result, Err(RowError::RateLimited(_))) {
                    self.pace().await;
                }
                result
            }
        }
    }

    async fn plan(&self, row: &SourceRow) -> Result<Plan, RowError> {
        let record = match ImportRecord::from_fields(&row.fields) {
            Ok(record) => record,
            Err(RecordError::MalformedRow { .. }) => return Ok(Plan::Done(RowOutcome::Malformed)),
            Err(e) => return Err(e.into()),
        };

        let existing = self.repository.find_by_natural_key(&record.key).await?;
        if existing.as_ref().is_some_and(CatalogEntry::is_complete) {
            info!("➡️ Skipping row {}: {} already complete.", row.row_number, record.key);
            return Ok(Plan::Done(RowOutcome::SkippedComplete));
        }

        let Some(url) = record.url.clone() else {
            if existing.is_some() {
                info!("Row {}: {} is incomplete but has no URL", row.row_number, record.key);
                return Ok(Plan::Done(RowOutcome::NothingToFetch));
            }
            self.repository.create(&record, &EntryChanges::default()).await?;
            info!("🆕 Row {}: created {} without URL", row.row_number, record.key);
            return Ok(Plan::Done(RowOutcome::CreatedWithoutUrl));
        };

        info!("🔍 Row {}: fetching {} from {}", row.row_number, record.key, url);
        Ok(Plan::Enrich { record, existing, url })
    }

    async fn enrich(
        &self,
        record: &ImportRecord,
        existing: Option<CatalogEntry>,
        url: &str,
    ) -> Result<RowOutcome, RowError> {
        let needs_image = existing.as_ref().is_none_or(|e| !e.has_image());
        let needs_description = existing.as_ref().is_none_or(|e| !e.has_description());

        let page = match self.controller.fetch_with_backoff(url).await? {
            BackoffOutcome::Succeeded(response) => Some(self.extractor.extract(&response.text())),
            BackoffOutcome::Abandoned { status } => {
                warn!("No data for {}: status {}", record.key, status);
                None
            }
            BackoffOutcome::TransportExhausted { attempts, last_error } => {
                warn!("No data for {} after {} attempts: {}", record.key, attempts, last_error);
                None
            }
        };

        let mut changes = EntryChanges::default();
        if let Some(page) = page {
            if needs_image {
                if let Some(image_url) = page.image_url {
                    changes.image = self.assets.download(&image_url).await;
                    changes.image_url = Some(image_url);
                }
            }
            if needs_description {
                changes.description = page.description;
            }
        }

        let created = existing.is_none();
        match existing {
            Some(entry) if !changes.is_empty() => {
                self.repository.update(&entry, &changes).await?;
            }
            Some(_) => {}
            None => {
                self.repository.create(record, &changes).await?;
            }
        }

        if changes.image.is_some() {
            info!("🖼️ Added image for {}", record.key.name);
        }
        if changes.description.is_some() {
            info!("📝 Added description for {}", record.key.name);
        }
        Ok(RowOutcome::Fetched { created, changed: changes.changed_fields() })
    }

    async fn pace(&self) {
        let delay = seconds(self.rng.uniform(self.pacing.min_delay_seconds, self.pacing.max_delay_seconds));
        info!("💤 Pausing {:.2}s before the next row", delay.as_secs_f64());
        self.sleeper.sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::NaturalKey;
    use crate::infrastructure::asset_storage::AssetStorage;
    use crate::infrastructure::catalog_repository::SqliteCatalogRepository;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use crate::test_utils::{RecordingSleeper, ScriptedFetcher, perfume_page};
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Harness {
        orchestrator: ImportOrchestrator,
        repository: Arc<SqliteCatalogRepository>,
        fetcher: Arc<ScriptedFetcher>,
        sleeper: Arc<RecordingSleeper>,
        _media: TempDir,
    }

    async fn harness() -> Harness {
        let media = tempfile::tempdir().unwrap();
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        let repository = Arc::new(SqliteCatalogRepository::new(
            db.pool().clone(),
            AssetStorage::new(media.path(), "perfumes"),
        ));
        let fetcher = Arc::new(ScriptedFetcher::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = AppConfig { rng_seed: Some(7), ..AppConfig::default() };
        let orchestrator = ImportOrchestrator::from_config(
            &config,
            repository.clone(),
            fetcher.clone(),
            sleeper.clone(),
            Arc::new(SharedRng::new(config.rng_seed)),
        );
        Harness { orchestrator, repository, fetcher, sleeper, _media: media }
    }

    fn row(number: usize, pairs: &[(&str, &str)]) -> Result<SourceRow, SourceError> {
        let fields: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Ok(SourceRow { row_number: number, fields })
    }

    #[tokio::test]
    async fn blank_brand_is_malformed_without_requests() {
        let h = harness().await;
        let summary = h
            .orchestrator
            .run(vec![row(1, &[("Perfume", "Aventus"), ("Brand", ""), ("url", "https://p/a")])])
            .await
            .unwrap();

        assert_eq!(summary.malformed, 1);
        assert!(h.fetcher.requests().is_empty());
        assert!(h.sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn invalid_number_fails_only_its_row() {
        let h = harness().await;
        let summary = h
            .orchestrator
            .run(vec![
                row(1, &[("Perfume", "Bad"), ("Brand", "X"), ("Rating Value", "lots")]),
                row(2, &[("Perfume", "Good"), ("Brand", "X")]),
            ])
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created_without_enrichment, 1);
        assert!(h.repository.find_by_natural_key(&NaturalKey::new("Good", "X")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn existing_entry_gets_only_missing_field() {
        let h = harness().await;
        let record = ImportRecord::from_fields(
            &[("Perfume", "Aventus"), ("Brand", "Creed")]
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
        .unwrap();
        let changes = EntryChanges { description: Some("Original".into()), ..Default::default() };
        h.repository.create(&record, &changes).await.unwrap();

        h.fetcher.push_status("https://p/aventus", 200, &perfume_page("https://img/perfume/a.jpg", "Replacement"));
        h.fetcher.push_bytes("https://img/perfume/a.jpg", 200, b"jpeg");

        let summary = h
            .orchestrator
            .run(vec![row(1, &[("Perfume", "Aventus"), ("Brand", "Creed"), ("url", "https://p/aventus")])])
            .await
            .unwrap();
        assert_eq!(summary.enriched_existing, 1);
        assert_eq!(summary.imported, 0);

        let entry = h.repository.find_by_natural_key(&record.key).await.unwrap().unwrap();
        assert_eq!(entry.description.as_deref(), Some("Original"));
        assert_eq!(entry.image.as_deref(), Some("perfumes/a.jpg"));
        assert_eq!(entry.image_url.as_deref(), Some("https://img/perfume/a.jpg"));
    }

    #[tokio::test]
    async fn failed_image_download_still_records_image_url() {
        let h = harness().await;
        h.fetcher.push_status("https://p/x", 200, &perfume_page("https://img/perfume/x.jpg", ""));
        h.fetcher.push_status("https://img/perfume/x.jpg", 404, "");

        let summary = h
            .orchestrator
            .run(vec![row(1, &[("Perfume", "X"), ("Brand", "Y"), ("url", "https://p/x")])])
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.no_data, 0);

        let entry = h.repository.find_by_natural_key(&NaturalKey::new("X", "Y")).await.unwrap().unwrap();
        assert_eq!(entry.image_url.as_deref(), Some("https://img/perfume/x.jpg"));
        assert_eq!(entry.image, None);
        assert_eq!(entry.description, None);
        assert!(!entry.is_complete());
    }

    #[tokio::test]
    async fn unreadable_source_row_fails_without_stopping() {
        let h = harness().await;
        let unreadable = Err(SourceError::Record {
            row: 7,
            source: csv::Error::from(std::io::Error::other("truncated")),
        });

        let summary = h
            .orchestrator
            .run(vec![unreadable, row(8, &[("Perfume", "After"), ("Brand", "B")])])
            .await
            .unwrap();
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created_without_enrichment, 1);
    }

    #[test]
    fn rate_limit_error_counts_attempts_not_responses() {
        let err = ImportError::RateLimitExhausted {
            row: 3,
            name: "Blocked".into(),
            url: "https://p/blocked".into(),
            attempts: 10,
        };
        let message = err.to_string();
        assert!(message.contains("row 3"));
        assert!(message.contains("10 attempts"));
        assert!(!message.contains("consecutive"));
    }

    #[tokio::test]
    async fn abandoned_fetch_creates_bare_entry_and_paces() {
        let h = harness().await;
        h.fetcher.push_status("https://p/gone", 404, "");

        let summary = h
            .orchestrator
            .run(vec![row(1, &[("Perfume", "Gone"), ("Brand", "Z"), ("url", "https://p/gone")])])
            .await
            .unwrap();
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.created_without_enrichment, 1);
        assert_eq!(h.fetcher.request_count("https://p/gone"), 1);

        let waits = h.sleeper.waits();
        assert_eq!(waits.len(), 1);
        assert!((8.0..15.0).contains(&waits[0].as_secs_f64()));
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_reports_row_and_stops() {
        let h = harness().await;
        h.fetcher.always("https://p/blocked", 429, "");

        let err = h
            .orchestrator
            .run(vec![
                row(1, &[("Perfume", "Blocked"), ("Brand", "B"), ("url", "https://p/blocked")]),
                row(2, &[("Perfume", "Never"), ("Brand", "B")]),
            ])
            .await
            .unwrap_err();

        match err {
            ImportError::RateLimitExhausted { row, name, attempts, .. } => {
                assert_eq!(row, 1);
                assert_eq!(name, "Blocked");
                assert_eq!(attempts, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(h.repository.find_by_natural_key(&NaturalKey::new("Never", "B")).await.unwrap().is_none());
        assert!(h.repository.find_by_natural_key(&NaturalKey::new("Blocked", "B")).await.unwrap().is_none());
    }
}
