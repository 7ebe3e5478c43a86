//! devdata core - shared infrastructure for development-data importers
//!
//! This crate provides the importer contract, the column harmonizer and
//! country resolution, plus the fetch, retry, cache and logging plumbing
//! used by the per-source crates.

pub mod archive;
pub mod cache;
pub mod client;
pub mod config;
pub mod disk_cache;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod fields;
pub mod harmonize;
pub mod importer;
pub mod logging;
pub mod pool;
pub mod progress;
pub mod raw;
pub mod retry;
pub mod table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use cache::{CacheSlot, KeyedCache};
pub use client::SourceClient;
pub use config::{CacheConfig, HttpConfig, Settings, WorkersConfig};
pub use disk_cache::{DiskCache, ParquetSink, cleanup_tmp_files, is_valid_parquet, read_parquet};
pub use entity::{Entity, resolve_code, resolve_entity};
pub use error::{ErrorKind, ImportError, Result};
pub use fetch::{FetchError, Fetcher, HttpFetcher, Method, Request, SHARED_RUNTIME, default_fetcher};
pub use harmonize::{ColumnRule, EntityMatch, Harmonizer, Kind, date_to_days, parse_date};
pub use importer::Importer;
pub use logging::{IndicatifLogger, init_logging};
pub use pool::{WorkerPool, batches};
pub use progress::{ProgressContext, SharedProgress, global_progress};
pub use raw::{Cell, RawTable, decode_text};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use table::{concat, validate_table};
