//! Inflation series from the VAM economic explorer

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use arrow::array::{Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use devdata_core::fields::*;
use devdata_core::raw::decode_text;
use devdata_core::{
    Cell, ColumnRule, EntityMatch, Fetcher, Harmonizer, ImportError, Importer, Kind, KeyedCache,
    RawTable, Request, Result, SourceClient, concat, default_fetcher,
};
use serde_json::json;

use crate::config::{VAM_REFERRER, WfpConfig};
use crate::countries::{self, WfpCountry, resolve_countries};

const PROVIDER: &str = "WFP inflation";

/// Inflation indicators published by the economic explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InflationIndicator {
    HeadlineYoY,
    HeadlineMoM,
    Food,
}

impl InflationIndicator {
    pub const ALL: [InflationIndicator; 3] = [Self::HeadlineYoY, Self::HeadlineMoM, Self::Food];

    /// Economic indicator id on the VAM API
    pub fn id(self) -> i64 {
        match self {
            Self::HeadlineYoY => 116,
            Self::HeadlineMoM => 117,
            Self::Food => 71,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::HeadlineYoY => "Headline inflation (YoY)",
            Self::HeadlineMoM => "Headline inflation (MoM)",
            Self::Food => "Food inflation",
        }
    }
}

impl fmt::Display for InflationIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InflationIndicator {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ImportError::invalid(format!(
                    "Invalid indicator - {s}. Available: {}",
                    Self::ALL.map(Self::name).join(", ")
                ))
            })
    }
}

/// What to fetch. Empty `indicators` means all; `countries: None` means every
/// country WFP covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InflationQuery {
    pub indicators: Vec<InflationIndicator>,
    /// Names or ISO codes
    pub countries: Option<Vec<String>>,
}

impl InflationQuery {
    pub fn indicator(mut self, indicator: InflationIndicator) -> Self {
        self.indicators.push(indicator);
        self
    }

    pub fn countries<S: Into<String>>(mut self, countries: impl IntoIterator<Item = S>) -> Self {
        self.countries = Some(countries.into_iter().map(Into::into).collect());
        self
    }
}

const ISO3: &str = "iso3";

static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(DATE, &["Date"], Kind::Date("%d/%m/%Y")).key(),
            ColumnRule::new(VALUE, &["Value"], Kind::Float),
            ColumnRule::new(SOURCE, &["SourceOfTheData"], Kind::Text).optional(),
            ColumnRule::new(INDICATOR_NAME, &["IndicatorName"], Kind::Text),
            ColumnRule::new(ISO3_CODE, &[ISO3], Kind::Code).key(),
            ColumnRule::new(COUNTRY_NAME, &["CountryName"], Kind::Text).optional(),
            ColumnRule::constant(UNIT, "percent"),
        ],
    )
    .resolve_entities(ISO3_CODE, Some(COUNTRY_NAME), EntityMatch::Canonicalize)
});

pub fn schema() -> SchemaRef {
    DATA.schema()
}

/// Parse one country's CSV export. A body without any row is an empty table.
pub fn parse_inflation(bytes: &[u8], iso3: &str) -> Result<RecordBatch> {
    let text = decode_text(bytes);
    if text.trim().is_empty() {
        return Ok(RecordBatch::new_empty(schema()));
    }
    let raw = RawTable::from_csv(&text, b',')
        .map_err(|e| ImportError::format(PROVIDER, format!("country - {iso3}: {e}")))?;

    let mut columns = raw.columns().to_vec();
    columns.push(ISO3.to_string());
    let rows = raw
        .rows()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.push(Cell::text(iso3));
            row
        })
        .collect();
    DATA.apply(&RawTable::new(columns, rows))
}

static METADATA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(INDICATOR_NAME, DataType::Utf8, false),
        Field::new("indicator_id", DataType::Int64, false),
        Field::new(UNIT, DataType::Utf8, false),
    ]))
});

/// Importer for WFP inflation data.
///
/// Results are cached per (indicator, country), including empty ones, so a
/// wider query only fetches what is missing.
pub struct WfpInflation {
    config: WfpConfig,
    client: SourceClient,
    data: KeyedCache<(InflationIndicator, String), RecordBatch>,
}

impl fmt::Debug for WfpInflation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WfpInflation")
            .field("cached", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for WfpInflation {
    fn default() -> Self {
        Self::new()
    }
}

impl WfpInflation {
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

    pub fn available_indicators(&self) -> &'static [InflationIndicator] {
        &InflationIndicator::ALL
    }

    fn fetch_country(
        client: &SourceClient,
        url: &str,
        indicator: InflationIndicator,
        iso3: &str,
        country: &WfpCountry,
    ) -> Result<RecordBatch> {
        log::debug!("{PROVIDER}: fetching {indicator} for {iso3}");
        let body = json!({
            "adm0Code": country.adm0_code,
            "economicIndicatorIds": [indicator.id()],
        });
        let request = Request::post_json(url, body).header("referrer", VAM_REFERRER);
        parse_inflation(&client.fetch(request)?, iso3)
    }
}

impl Importer for WfpInflation {
    type Query = InflationQuery;
    type MetadataQuery = ();
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    fn schema(&self) -> SchemaRef {
        schema()
    }

    fn get_data(&mut self, query: &InflationQuery) -> Result<RecordBatch> {
        let requested = match &query.countries {
            Some(countries) => Some(resolve_countries(PROVIDER, countries)?),
            None => None,
        };
        let indicators: &[InflationIndicator] = if query.indicators.is_empty() {
            &InflationIndicator::ALL
        } else {
            &query.indicators
        };

        let available = countries::countries(&self.client, &self.config)?;
        let iso3_codes: Vec<String> = match requested {
            Some(codes) => codes
                .into_iter()
                .filter(|code| {
                    let known = available.contains_key(code);
                    if !known {
                        log::warn!("{PROVIDER}: no data for {code}");
                    }
                    known
                })
                .collect(),
            None => available.keys().cloned().collect(),
        };

        let url = self.config.inflation_url();
        let mut batches = Vec::new();
        for &indicator in indicators {
            for iso3 in &iso3_codes {
                let Some(country) = available.get(iso3) else {
                    continue;
                };
                let client = &self.client;
                let batch = self.data.get_or_try_insert_with((indicator, iso3.clone()), || {
                    Self::fetch_country(client, &url, indicator, iso3, country)
                })?;
                if batch.num_rows() == 0 {
                    log::debug!("{PROVIDER}: no {indicator} data for {iso3}");
                } else {
                    batches.push(batch.clone());
                }
            }
        }

        if batches.is_empty() {
            log::warn!("{PROVIDER}: no data found for the requested indicators and countries");
            return Ok(RecordBatch::new_empty(schema()));
        }
        concat(&schema(), &batches)
    }

    /// Indicator names and ids. No I/O.
    fn get_metadata(&mut self, _query: &()) -> Result<RecordBatch> {
        let all = InflationIndicator::ALL;
        Ok(RecordBatch::try_new(
            METADATA.clone(),
            vec![
                Arc::new(StringArray::from(all.map(InflationIndicator::name).to_vec())),
                Arc::new(Int64Array::from(all.map(InflationIndicator::id).to_vec())),
                Arc::new(StringArray::from(vec!["percent"; all.len()])),
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
