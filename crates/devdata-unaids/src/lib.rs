//! UNAIDS AIDSinfo bulk dataset importer

pub mod unaids;

pub use unaids::{Dataset, Unaids, UnaidsConfig};
