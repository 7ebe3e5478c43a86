//! World Food Programme importers
//!
//! [`WfpInflation`] reads the VAM economic explorer inflation series and
//! [`WfpFoodSecurity`] the HungerMap food consumption series. Both share a
//! process-wide list of the countries WFP covers (see [`countries`]).

pub mod config;
pub mod countries;
pub mod food_security;
pub mod inflation;

pub use config::WfpConfig;
pub use countries::{WfpCountry, clear_countries};
pub use food_security::{FoodSecurityQuery, Level, WfpFoodSecurity};
pub use inflation::{InflationIndicator, InflationQuery, WfpInflation};
