//! HungerMap food consumption series
//!
//! The series counts people with insufficient food consumption (FCS), with an
//! upper and lower bound, daily. National data comes from
//! `adm0/{code}/countryData.json`, first-level subdivisions from
//! `adm0/{code}/adm1data.json`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use arrow::array::{RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use devdata_core::fields::*;
use devdata_core::{
    Cell, ColumnRule, Fetcher, Harmonizer, ImportError, Importer, Kind, KeyedCache, RawTable,
    Request, Result, SourceClient, concat, default_fetcher, parse_date,
};
use serde_json::Value;

use crate::config::{HUNGERMAP_REFERRER, WfpConfig};
use crate::countries::{self, WfpCountry, resolve_countries};

const PROVIDER: &str = "WFP food security";

pub const INDICATOR: &str = "people with insufficient food consumption";
pub const SOURCE_NAME: &str = "World Food Programme";

/// Geographic level of the series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Level {
    #[default]
    National,
    Subnational,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::National => "national",
            Self::Subnational => "subnational",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "national" => Ok(Self::National),
            "subnational" => Ok(Self::Subnational),
            _ => Err(ImportError::invalid(format!(
                "level must be 'national' or 'subnational', got '{s}'"
            ))),
        }
    }
}

/// What to fetch; `countries: None` means every country with data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoodSecurityQuery {
    /// Names or ISO codes
    pub countries: Option<Vec<String>>,
    pub level: Level,
}

impl FoodSecurityQuery {
    pub fn national() -> Self {
        Self::default()
    }

    pub fn subnational() -> Self {
        Self {
            level: Level::Subnational,
            ..Self::default()
        }
    }

    pub fn countries<S: Into<String>>(mut self, countries: impl IntoIterator<Item = S>) -> Self {
        self.countries = Some(countries.into_iter().map(Into::into).collect());
        self
    }
}

const GRAPH_COLUMNS: [&str; 4] = ["x", "fcs", "fcsHigh", "fcsLow"];

fn rules(level: Level) -> Vec<ColumnRule> {
    let mut rules = vec![
        ColumnRule::new(DATE, &["x"], Kind::Date("%Y-%m-%d")).key(),
        ColumnRule::new(VALUE, &["fcs"], Kind::Float),
        ColumnRule::new(VALUE_UPPER, &["fcsHigh"], Kind::Float).optional(),
        ColumnRule::new(VALUE_LOWER, &["fcsLow"], Kind::Float).optional(),
    ];
    if level == Level::Subnational {
        rules.push(ColumnRule::new(REGION_NAME, &["Name"], Kind::Text));
    }
    rules.extend([
        ColumnRule::new(ISO3_CODE, &[ISO3_CODE], Kind::Code).key(),
        ColumnRule::new(COUNTRY_NAME, &[COUNTRY_NAME], Kind::Text),
        ColumnRule::constant(INDICATOR_NAME, INDICATOR),
        ColumnRule::constant(SOURCE, SOURCE_NAME),
    ]);
    rules
}

static NATIONAL: LazyLock<Harmonizer> =
    LazyLock::new(|| Harmonizer::new(PROVIDER, rules(Level::National)));
static SUBNATIONAL: LazyLock<Harmonizer> =
    LazyLock::new(|| Harmonizer::new(PROVIDER, rules(Level::Subnational)));

fn harmonizer(level: Level) -> &'static Harmonizer {
    match level {
        Level::National => &*NATIONAL,
        Level::Subnational => &*SUBNATIONAL,
    }
}

pub fn schema(level: Level) -> SchemaRef {
    harmonizer(level).schema()
}

/// Rows of one `fcsGraph` array. Points without a valid date or `fcs` value
/// are a format error.
fn graph_rows(graph: &Value, iso3: &str) -> Result<Vec<Vec<Cell>>> {
    let points = graph
        .as_array()
        .ok_or_else(|| ImportError::format(PROVIDER, format!("country - {iso3}: fcsGraph is not a list")))?;
    points
        .iter()
        .map(|point| {
            let date = point.get("x").and_then(Value::as_str);
            if date.and_then(|d| parse_date(d, "%Y-%m-%d")).is_none() {
                return Err(ImportError::format(
                    PROVIDER,
                    format!("country - {iso3}: invalid date {:?}", point.get("x")),
                ));
            }
            if point.get("fcs").and_then(Value::as_f64).is_none() {
                return Err(ImportError::format(
                    PROVIDER,
                    format!("country - {iso3}: invalid fcs {:?}", point.get("fcs")),
                ));
            }
            Ok(GRAPH_COLUMNS
                .iter()
                .map(|c| point.get(*c).map(Cell::from).unwrap_or(Cell::Empty))
                .collect())
        })
        .collect()
}

fn columns(extra: &[&str]) -> Vec<String> {
    GRAPH_COLUMNS
        .iter()
        .chain(extra)
        .map(|c| c.to_string())
        .collect()
}

/// Parse `countryData.json`.
pub fn parse_national(body: &Value, iso3: &str, country_name: &str) -> Result<RecordBatch> {
    let graph = body
        .get("fcsGraph")
        .ok_or_else(|| ImportError::format(PROVIDER, format!("country - {iso3}: missing fcsGraph")))?;
    let rows = graph_rows(graph, iso3)?
        .into_iter()
        .map(|mut row| {
            row.extend([Cell::text(iso3), Cell::text(country_name)]);
            row
        })
        .collect();
    NATIONAL.apply(&RawTable::new(columns(&[ISO3_CODE, COUNTRY_NAME]), rows))
}

/// Parse `adm1data.json`: one `fcsGraph` per feature.
pub fn parse_subnational(body: &Value, iso3: &str, country_name: &str) -> Result<RecordBatch> {
    let features = body
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ImportError::format(PROVIDER, format!("country - {iso3}: missing features")))?;

    let mut rows = Vec::new();
    for feature in features {
        let props = feature.get("properties").unwrap_or(&Value::Null);
        let region = props.get("Name").map(Cell::from).unwrap_or(Cell::Empty);
        let Some(graph) = props.get("fcsGraph") else {
            log::debug!("{PROVIDER}: {iso3} region {region:?} has no fcsGraph");
            continue;
        };
        for mut row in graph_rows(graph, iso3)? {
            row.extend([region.clone(), Cell::text(iso3), Cell::text(country_name)]);
            rows.push(row);
        }
    }
    SUBNATIONAL.apply(&RawTable::new(columns(&["Name", ISO3_CODE, COUNTRY_NAME]), rows))
}

static METADATA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("field", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]))
});

/// Importer for HungerMap food security data.
///
/// Cached per (level, country). Countries without a published series are
/// skipped with a warning.
pub struct WfpFoodSecurity {
    config: WfpConfig,
    client: SourceClient,
    data: KeyedCache<(Level, String), RecordBatch>,
}

impl fmt::Debug for WfpFoodSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WfpFoodSecurity")
            .field("cached", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for WfpFoodSecurity {
    fn default() -> Self {
        Self::new()
    }
}

impl WfpFoodSecurity {
    pub fn new() -> Self {
        Self::with_fetcher(WfpConfig::default(), default_fetcher())
    }

    pub fn with_fetcher(config: WfpConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            data: KeyedCache::new(),
        }
    }

    fn fetch_country(
        client: &SourceClient,
        config: &WfpConfig,
        level: Level,
        iso3: &str,
        country: &WfpCountry,
    ) -> Result<RecordBatch> {
        let file = match level {
            Level::National => "countryData.json",
            Level::Subnational => "adm1data.json",
        };
        let url = format!("{}/adm0/{}/{file}", config.hungermap_api, country.adm0_code);
        log::debug!("{PROVIDER}: fetching {level} data for {iso3}");
        let request = Request::get(url).header("referrer", HUNGERMAP_REFERRER);
        let body: Value = client.fetch_json(request)?;
        match level {
            Level::National => parse_national(&body, iso3, &country.name),
            Level::Subnational => parse_subnational(&body, iso3, &country.name),
        }
    }
}

impl Importer for WfpFoodSecurity {
    type Query = FoodSecurityQuery;
    type MetadataQuery = ();
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    /// National schema; subnational results add `region_name`.
    fn schema(&self) -> SchemaRef {
        schema(Level::National)
    }

    fn get_data(&mut self, query: &FoodSecurityQuery) -> Result<RecordBatch> {
        let requested = match &query.countries {
            Some(countries) => Some(resolve_countries(PROVIDER, countries)?),
            None => None,
        };
        let available = countries::countries(&self.client, &self.config)?;
        let with_data = |code: &String| {
            let has_data = available.get(code).is_some_and(|c| c.data_type.is_some());
            if !has_data {
                log::warn!("{PROVIDER}: no data for {code}");
            }
            has_data
        };
        let iso3_codes: Vec<String> = match requested {
            Some(codes) => codes.into_iter().filter(|c| with_data(c)).collect(),
            None => available
                .iter()
                .filter(|(_, c)| c.data_type.is_some())
                .map(|(code, _)| code.clone())
                .collect(),
        };

        let level = query.level;
        let mut batches = Vec::new();
        for iso3 in &iso3_codes {
            let Some(country) = available.get(iso3) else {
                continue;
            };
            let (client, config) = (&self.client, &self.config);
            let batch = self.data.get_or_try_insert_with((level, iso3.clone()), || {
                Self::fetch_country(client, config, level, iso3, country)
            })?;
            if batch.num_rows() > 0 {
                batches.push(batch.clone());
            }
        }

        if batches.is_empty() {
            log::warn!("{PROVIDER}: no {level} data found for the requested countries");
            return Ok(RecordBatch::new_empty(schema(level)));
        }
        concat(&schema(level), &batches)
    }

    /// Indicator description. No I/O.
    fn get_metadata(&mut self, _query: &()) -> Result<RecordBatch> {
        let fields = ["indicator_name", "source", "url", "levels"];
        let values = [INDICATOR, SOURCE_NAME, "https://hungermap.wfp.org/", "national, subnational"];
        Ok(RecordBatch::try_new(
            METADATA.clone(),
            vec![
                Arc::new(StringArray::from(fields.to_vec())),
                Arc::new(StringArray::from(values.to_vec())),
            ],
        )?)
    }

    /// Also forgets the country list shared by the WFP importers.
    fn clear_cache(&mut self) {
        self.data.clear();
        countries::clear_countries();
        log::info!("{PROVIDER}: cache cleared");
    }
}
