//! World Bank data API importers
//!
//! [`WorldBank`] reads any database of the World Bank sources API (World
//! Development Indicators by default). [`InternationalDebtStatistics`] adds
//! creditor breakdowns for the debt database.

mod api;
pub mod config;
pub mod ids;
mod importer;
pub mod query;
pub mod schema;

pub use config::{Config, IDS, WDI};
pub use ids::{DebtIndicator, InternationalDebtStatistics, debt_service_indicators, debt_stock_indicators};
pub use importer::WorldBank;
pub use query::{MostRecent, Query};
