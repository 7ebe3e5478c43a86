//! CEPII BACI bilateral trade flows
//!
//! BACI releases are large zip archives of yearly CSV files. [`Baci`]
//! downloads a release once, converts it to Parquet in a disk cache owned by
//! the importer, and answers queries by scanning those files.

pub mod baci;
pub mod filter;
pub mod release;
pub mod versions;

pub use baci::{Baci, BaciConfig, BaciQuery};
pub use filter::Filter;
pub use release::{BaciRelease, LoadedRelease};
pub use versions::{VersionInfo, Versions};
