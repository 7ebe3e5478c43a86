//! IMF importers
//!
//! [`Weo`] reads the World Economic Outlook "all countries" files, one
//! release at a time. [`Dsa`] reads the list of low-income-country debt
//! sustainability analyses.

pub mod dsa;
pub mod version;
pub mod weo;

pub use dsa::{Dsa, DsaConfig};
pub use version::{Month, Release, WeoVersion};
pub use weo::{Weo, WeoConfig};
