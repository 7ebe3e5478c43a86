//! World Bank importer configuration

use devdata_core::{HttpConfig, Settings};

/// World Development Indicators
pub const WDI: u32 = 2;
/// International Debt Statistics
pub const IDS: u32 = 6;

/// Runtime configuration for the World Bank importer
#[derive(Debug, Clone)]
pub struct Config {
    /// Source database id (2 = WDI, 6 = IDS, ...)
    pub database: u32,
    /// Threads fetching indicator batches in parallel
    pub workers: usize,
    /// Indicators per API request
    pub batch_size: usize,
    /// Rows per API page
    pub per_page: u32,
    /// API root
    pub base_url: String,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: WDI,
            workers: 4,
            batch_size: 1,
            per_page: 1000,
            base_url: "https://api.worldbank.org/v2".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workers: settings.workers.threads,
            batch_size: settings.workers.batch_size,
            http: settings.http.clone(),
            ..Self::default()
        }
    }

    pub fn database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }
}
