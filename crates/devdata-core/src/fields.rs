//! Harmonized column names shared by all importers.

pub const ENTITY_CODE: &str = "entity_code";
pub const ENTITY_NAME: &str = "entity_name";
pub const ISO3_CODE: &str = "iso3_code";
pub const COUNTRY_NAME: &str = "country_name";
pub const REGION_CODE: &str = "region_code";
pub const REGION_NAME: &str = "region_name";
pub const INCOME_LEVEL: &str = "income_level";

pub const INDICATOR_CODE: &str = "indicator_code";
pub const INDICATOR_NAME: &str = "indicator_name";

pub const YEAR: &str = "year";
pub const DATE: &str = "date";

pub const VALUE: &str = "value";
pub const VALUE_UPPER: &str = "value_upper";
pub const VALUE_LOWER: &str = "value_lower";
pub const VALUE_FORMATTED: &str = "value_formatted";
pub const UNIT: &str = "unit";
pub const SCALE: &str = "scale";

pub const SOURCE: &str = "source";
pub const FOOTNOTE: &str = "footnote";
pub const NOTES: &str = "notes";
pub const SUBGROUP: &str = "subgroup";
pub const TIME_RANGE: &str = "time_range";

// Bilateral trade
pub const EXPORTER_CODE: &str = "exporter_code";
pub const IMPORTER_CODE: &str = "importer_code";
pub const EXPORTER_NAME: &str = "exporter_name";
pub const IMPORTER_NAME: &str = "importer_name";
pub const EXPORTER_ISO3_CODE: &str = "exporter_iso3_code";
pub const IMPORTER_ISO3_CODE: &str = "importer_iso3_code";
pub const PRODUCT_CODE: &str = "product_code";
pub const PRODUCT_DESCRIPTION: &str = "product_description";
pub const QUANTITY: &str = "quantity";
