//! Output schemas for World Bank tables
//!
//! Each table is described by its harmonizer; the Arrow schema is derived
//! from the rules so the two cannot drift apart.

use std::sync::LazyLock;

use arrow::datatypes::SchemaRef;
use devdata_core::fields::*;
use devdata_core::{ColumnRule, EntityMatch, Harmonizer, Kind};

use crate::api::{
    COL_COUNTERPART_CODE, COL_COUNTERPART_ENTITY, COL_COUNTERPART_NAME, COL_COUNTRY_CODE,
    COL_COUNTRY_NAME, COL_SERIES_CODE, COL_SERIES_NAME, COL_VALUE, COL_YEAR, PROVIDER,
};

pub const COUNTERPART_CODE: &str = "counterpart_code";
pub const COUNTERPART_NAME: &str = "counterpart_name";
pub const COUNTERPART_ENTITY_CODE: &str = "counterpart_entity_code";
pub const IS_AGGREGATE: &str = "is_aggregate";

fn observation_rules() -> Vec<ColumnRule> {
    vec![
        ColumnRule::new(YEAR, &[COL_YEAR], Kind::Year).key(),
        ColumnRule::new(ENTITY_CODE, &[COL_COUNTRY_CODE], Kind::Code).key(),
        ColumnRule::new(ENTITY_NAME, &[COL_COUNTRY_NAME], Kind::Text),
        ColumnRule::new(INDICATOR_CODE, &[COL_SERIES_CODE], Kind::Text).key(),
        ColumnRule::new(INDICATOR_NAME, &[COL_SERIES_NAME], Kind::Text),
        ColumnRule::new(VALUE, &[COL_VALUE], Kind::Float),
    ]
}

/// Indicator observations
pub static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(PROVIDER, observation_rules()).resolve_entities(
        ENTITY_CODE,
        Some(ENTITY_NAME),
        EntityMatch::Canonicalize,
    )
});

/// Indicator observations with a counterpart area (International Debt Statistics)
pub static COUNTERPART_DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    let mut rules = observation_rules();
    rules.extend([
        ColumnRule::new(COUNTERPART_CODE, &[COL_COUNTERPART_CODE], Kind::Text).key(),
        ColumnRule::new(COUNTERPART_NAME, &[COL_COUNTERPART_NAME], Kind::Text),
        ColumnRule::new(COUNTERPART_ENTITY_CODE, &[COL_COUNTERPART_ENTITY], Kind::Text).optional(),
    ]);
    Harmonizer::new(PROVIDER, rules).resolve_entities(
        ENTITY_CODE,
        Some(ENTITY_NAME),
        EntityMatch::Canonicalize,
    )
});

/// Series metadata
pub static METADATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(INDICATOR_CODE, &["indicator_code"], Kind::Text).key(),
            ColumnRule::new(INDICATOR_NAME, &["indicator_name"], Kind::Text),
            ColumnRule::new(UNIT, &["unit"], Kind::Text),
            ColumnRule::new("definition", &["definition"], Kind::Text),
            ColumnRule::new(SOURCE, &["source"], Kind::Text),
            ColumnRule::new("topic", &["topic"], Kind::Text),
            ColumnRule::new("periodicity", &["periodicity"], Kind::Text),
            ColumnRule::new("aggregation_method", &["aggregation_method"], Kind::Text),
            ColumnRule::new("license", &["license"], Kind::Text),
        ],
    )
});

/// `/sources` list
pub static DATABASES: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new("id", &["id"], Kind::Int).key(),
            ColumnRule::new("name", &["name"], Kind::Text),
            ColumnRule::new("code", &["code"], Kind::Text).optional(),
            ColumnRule::new("last_updated", &["lastupdated"], Kind::Date("%Y-%m-%d")).optional(),
            ColumnRule::new("data_availability", &["dataavailability"], Kind::Bool).optional(),
            ColumnRule::new("metadata_availability", &["metadataavailability"], Kind::Bool)
                .optional(),
        ],
    )
});

/// JSON paths of the `/country` list, in harmonizer order.
pub(crate) const ENTITY_PATHS: &[&str] = &[
    "id",
    "name",
    "region/id",
    "region/value",
    "adminregion/id",
    "adminregion/value",
    "incomeLevel/id",
    "incomeLevel/value",
    "lendingType/id",
    "lendingType/value",
    "capitalCity",
    "longitude",
    "latitude",
];

/// `/country` list. Region and income codes stay text: "NA" is a real code.
pub static ENTITIES: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(ENTITY_CODE, &["id"], Kind::Code).key(),
            ColumnRule::new(ENTITY_NAME, &["name"], Kind::Text),
            ColumnRule::new(REGION_CODE, &["region/id"], Kind::Text),
            ColumnRule::new(REGION_NAME, &["region/value"], Kind::Text),
            ColumnRule::new("admin_region_code", &["adminregion/id"], Kind::Text),
            ColumnRule::new("admin_region_name", &["adminregion/value"], Kind::Text),
            ColumnRule::new("income_level_code", &["incomeLevel/id"], Kind::Text),
            ColumnRule::new(INCOME_LEVEL, &["incomeLevel/value"], Kind::Text),
            ColumnRule::new("lending_type_code", &["lendingType/id"], Kind::Text),
            ColumnRule::new("lending_type", &["lendingType/value"], Kind::Text),
            ColumnRule::new("capital_city", &["capitalCity"], Kind::Text),
            ColumnRule::new("longitude", &["longitude"], Kind::Float),
            ColumnRule::new("latitude", &["latitude"], Kind::Float),
            ColumnRule::new(IS_AGGREGATE, &[IS_AGGREGATE], Kind::Bool),
        ],
    )
});

/// Series list of a database
pub static INDICATORS: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(INDICATOR_CODE, &["id"], Kind::Text).key(),
            ColumnRule::new(INDICATOR_NAME, &["value"], Kind::Text),
        ],
    )
});

pub fn data() -> SchemaRef {
    DATA.schema()
}

pub fn counterpart_data() -> SchemaRef {
    COUNTERPART_DATA.schema()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    #[test]
    fn schema_has_expected_fields() {
        let schema = data();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec!["year", "entity_code", "entity_name", "indicator_code", "indicator_name", "value"]
        );
        assert_eq!(schema.field_with_name("year").unwrap().data_type(), &DataType::Int32);
        assert_eq!(schema.field_with_name("value").unwrap().data_type(), &DataType::Float64);
    }

    #[test]
    fn counterpart_schema_extends_data() {
        let schema = counterpart_data();
        assert_eq!(schema.fields().len(), data().fields().len() + 3);
        assert!(schema.field_with_name(COUNTERPART_ENTITY_CODE).unwrap().is_nullable());
    }

    #[test]
    fn entity_list_matches_paths() {
        assert_eq!(ENTITIES.schema().fields().len(), ENTITY_PATHS.len() + 1);
    }
}
