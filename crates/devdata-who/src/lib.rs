//! WHO Global Health Expenditure Database (GHED) importer

pub mod ghed;

pub use ghed::{Ghed, GhedConfig};
