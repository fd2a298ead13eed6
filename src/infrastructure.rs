//! Infrastructure layer: configuration, logging, HTTP, parsing and storage
//!
//! Adapters behind the traits the import pipeline is written against
//! (`Fetcher`, `Sleeper`, `CatalogRepository`), plus the input reader.

pub mod asset_fetcher;
pub mod asset_storage;
pub mod catalog_repository;
pub mod config;
pub mod csv_source;
pub mod database_connection;
pub mod html_parser;
pub mod http_client;
pub mod logging;
pub mod retry_manager;
pub mod timing;

// Re-export commonly used items
pub use asset_fetcher::{AssetFetcher, asset_file_name};
pub use asset_storage::{AssetStorage, StoredAsset};
pub use catalog_repository::SqliteCatalogRepository;
pub use config::{AppConfig, ConfigError, ConfigManager};
pub use csv_source::{CsvSource, SourceError, SourceRow};
pub use database_connection::DatabaseConnection;
pub use html_parser::{ExtractedPage, PerfumePageExtractor};
pub use http_client::{FetchError, FetchResponse, Fetcher, HttpClient};
pub use logging::{init_logging, init_logging_with_config};
pub use retry_manager::{BackoffController, BackoffOutcome, RateLimitExhausted};
pub use timing::{SharedRng, Sleeper, TokioSleeper};
