//! UNDP Human Development Report composite indices importer

pub mod hdi;

pub use hdi::{HdiConfig, HumanDevelopmentIndex};
