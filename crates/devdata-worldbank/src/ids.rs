//! International Debt Statistics (database 6)
//!
//! IDS series are broken down by creditor ("counterpart area"). On top of the
//! plain World Bank importer this module knows the debt stock and debt
//! service series, their creditor categories, and how counterpart areas map
//! to country codes.

use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use chrono::NaiveDate;
use devdata_core::fields::{ENTITY_CODE, ENTITY_NAME, INDICATOR_CODE, VALUE, YEAR};
use devdata_core::table::{float64_column, int32_column, string_column};
use devdata_core::{Fetcher, ImportError, Importer, Result, default_fetcher, resolve_entity};
use rustc_hash::FxHashMap;

use crate::api::PROVIDER;
use crate::config::{Config, IDS};
use crate::importer::WorldBank;
use crate::query::Query;
use crate::schema::{COUNTERPART_CODE, COUNTERPART_ENTITY_CODE, COUNTERPART_NAME};

/// Counterpart ids that do not resolve by name: historical states, territories
/// and the world total.
const COUNTERPART_CODES: &[(&str, &str)] = &[
    ("WLD", "WLD"),
    ("063", "YUG"),
    ("073", "CSK"),
    ("074", "DDR"),
    ("264", "REU"),
    ("345", "GLP"),
    ("361", "ANT"),
    ("376", "AIA"),
    ("377", "ATG"),
    ("379", "VIR"),
    ("457", "SUR"),
    ("740", "PRK"),
];

/// Entity code of a counterpart area, by id first and then by name.
pub fn counterpart_entity(code: &str, name: &str) -> Option<&'static str> {
    let code = code.trim();
    COUNTERPART_CODES
        .iter()
        .find(|(id, _)| *id == code)
        .map(|(_, iso3)| *iso3)
        .or_else(|| resolve_entity(name).map(|e| e.code))
}

/// A debt series and its creditor category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtIndicator {
    pub code: &'static str,
    /// "Official" or "Private"
    pub broad_category: &'static str,
    /// Bilateral, multilateral, bonds, commercial banks, other private
    pub detailed_category: &'static str,
}

impl DebtIndicator {
    pub fn category(&self, detailed: bool) -> &'static str {
        if detailed {
            self.detailed_category
        } else {
            self.broad_category
        }
    }
}

const fn debt(code: &'static str, broad: &'static str, detailed: &'static str) -> DebtIndicator {
    DebtIndicator {
        code,
        broad_category: broad,
        detailed_category: detailed,
    }
}

const DEBT_STOCKS: &[DebtIndicator] = &[
    debt("DT.DOD.BLAT.CD", "Official", "Bilateral"),
    debt("DT.DOD.MLAT.CD", "Official", "Multilateral"),
    debt("DT.DOD.PBND.CD", "Private", "Bonds"),
    debt("DT.DOD.PCBK.CD", "Private", "Commercial banks"),
    debt("DT.DOD.PROP.CD", "Private", "Other private"),
];

const DEBT_SERVICE: &[DebtIndicator] = &[
    debt("DT.AMT.BLAT.CD", "Official", "Bilateral"),
    debt("DT.AMT.MLAT.CD", "Official", "Multilateral"),
    debt("DT.AMT.PBND.CD", "Private", "Bonds"),
    debt("DT.AMT.PCBK.CD", "Private", "Commercial banks"),
    debt("DT.AMT.PROP.CD", "Private", "Other private"),
    debt("DT.INT.BLAT.CD", "Official", "Bilateral"),
    debt("DT.INT.MLAT.CD", "Official", "Multilateral"),
    debt("DT.INT.PBND.CD", "Private", "Bonds"),
    debt("DT.INT.PCBK.CD", "Private", "Commercial banks"),
    debt("DT.INT.PROP.CD", "Private", "Other private"),
];

/// Debt stock series (external debt outstanding by creditor).
pub fn debt_stock_indicators() -> &'static [DebtIndicator] {
    DEBT_STOCKS
}

/// Debt service series (principal repayments and interest by creditor).
pub fn debt_service_indicators() -> &'static [DebtIndicator] {
    DEBT_SERVICE
}

/// Debt data summed per creditor category.
pub static CATEGORY_DATA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(YEAR, DataType::Int32, false),
        Field::new(ENTITY_CODE, DataType::Utf8, false),
        Field::new(ENTITY_NAME, DataType::Utf8, true),
        Field::new(COUNTERPART_CODE, DataType::Utf8, false),
        Field::new(COUNTERPART_NAME, DataType::Utf8, true),
        Field::new(COUNTERPART_ENTITY_CODE, DataType::Utf8, true),
        Field::new("category", DataType::Utf8, false),
        Field::new(VALUE, DataType::Float64, true),
    ]))
});

type GroupKey = (i32, String, Option<String>, String, Option<String>, Option<String>, &'static str);

/// Sum `value` over indicators sharing a category, keeping first-seen order.
fn sum_by_category(
    data: &RecordBatch,
    indicators: &[DebtIndicator],
    detailed: bool,
) -> Result<RecordBatch> {
    let missing = || ImportError::format(PROVIDER, "debt data lacks expected columns");
    let years = int32_column(data, YEAR).ok_or_else(missing)?;
    let entity = string_column(data, ENTITY_CODE).ok_or_else(missing)?;
    let entity_name = string_column(data, ENTITY_NAME).ok_or_else(missing)?;
    let indicator = string_column(data, INDICATOR_CODE).ok_or_else(missing)?;
    let cp_code = string_column(data, COUNTERPART_CODE).ok_or_else(missing)?;
    let cp_name = string_column(data, COUNTERPART_NAME).ok_or_else(missing)?;
    let cp_entity = string_column(data, COUNTERPART_ENTITY_CODE).ok_or_else(missing)?;
    let values = float64_column(data, VALUE).ok_or_else(missing)?;

    let categories: FxHashMap<&str, &'static str> = indicators
        .iter()
        .map(|i| (i.code, i.category(detailed)))
        .collect();
    let opt = |col: &StringArray, i: usize| (!col.is_null(i)).then(|| col.value(i).to_string());

    let mut order: Vec<GroupKey> = Vec::new();
    let mut sums: FxHashMap<GroupKey, Option<f64>> = FxHashMap::default();
    for i in 0..data.num_rows() {
        let Some(category) = categories.get(indicator.value(i)).copied() else {
            continue;
        };
        let key = (
            years.value(i),
            entity.value(i).to_string(),
            opt(entity_name, i),
            cp_code.value(i).to_string(),
            opt(cp_name, i),
            opt(cp_entity, i),
            category,
        );
        let value = (!values.is_null(i)).then(|| values.value(i));
        match sums.get_mut(&key) {
            Some(sum) => {
                if let Some(v) = value {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            None => {
                order.push(key.clone());
                sums.insert(key, value);
            }
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(order.iter().map(|k| k.0).collect::<Vec<_>>())),
        Arc::new(order.iter().map(|k| Some(k.1.as_str())).collect::<StringArray>()),
        Arc::new(order.iter().map(|k| k.2.as_deref()).collect::<StringArray>()),
        Arc::new(order.iter().map(|k| Some(k.3.as_str())).collect::<StringArray>()),
        Arc::new(order.iter().map(|k| k.4.as_deref()).collect::<StringArray>()),
        Arc::new(order.iter().map(|k| k.5.as_deref()).collect::<StringArray>()),
        Arc::new(order.iter().map(|k| Some(k.6)).collect::<StringArray>()),
        Arc::new(order.iter().map(|k| sums.get(k).copied().flatten()).collect::<Float64Array>()),
    ];
    Ok(RecordBatch::try_new(CATEGORY_DATA.clone(), columns)?)
}

/// World Bank importer bound to International Debt Statistics.
#[derive(Debug)]
pub struct InternationalDebtStatistics {
    inner: WorldBank,
}

impl Default for InternationalDebtStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl InternationalDebtStatistics {
    pub fn new() -> Self {
        Self::with_fetcher(Config::default(), default_fetcher())
    }

    /// `config.database` is forced to IDS.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            inner: WorldBank::with_fetcher(config.database(IDS), fetcher).counterpart_areas(true),
        }
    }

    /// The underlying World Bank importer, read-only so it stays on IDS.
    pub fn world_bank(&self) -> &WorldBank {
        &self.inner
    }

    pub fn get_entities(&mut self, skip_aggregates: bool) -> Result<RecordBatch> {
        self.inner.get_entities(skip_aggregates)
    }

    pub fn get_databases(&mut self) -> Result<RecordBatch> {
        self.inner.get_databases()
    }

    /// Date of the last IDS release, from the databases list.
    pub fn last_updated(&mut self) -> Result<Option<NaiveDate>> {
        let databases = self.inner.get_databases()?;
        let ids = databases
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<arrow::array::Int64Array>())
            .ok_or_else(|| ImportError::format(PROVIDER, "database list without ids"))?;
        let Some(row) = ids.iter().position(|id| id == Some(IDS as i64)) else {
            return Ok(None);
        };
        let dates = databases
            .column_by_name("last_updated")
            .and_then(|c| c.as_any().downcast_ref::<arrow::array::Date32Array>());
        Ok(dates
            .filter(|d| !d.is_null(row))
            .and_then(|d| d.value_as_date(row)))
    }

    pub fn get_indicators(&mut self) -> Result<RecordBatch> {
        self.inner.get_indicators()
    }

    pub fn debt_stocks_metadata(&mut self) -> Result<RecordBatch> {
        self.inner.get_metadata(&codes(DEBT_STOCKS))
    }

    pub fn debt_service_metadata(&mut self) -> Result<RecordBatch> {
        self.inner.get_metadata(&codes(DEBT_SERVICE))
    }

    /// Debt stocks summed per creditor category. The indicators of `filters`
    /// are replaced by the debt stock series.
    pub fn get_debt_stocks_data(&mut self, filters: &Query, detailed: bool) -> Result<RecordBatch> {
        self.category_data(filters, DEBT_STOCKS, detailed)
    }

    /// Debt service (principal and interest) summed per creditor category.
    pub fn get_debt_service_data(&mut self, filters: &Query, detailed: bool) -> Result<RecordBatch> {
        self.category_data(filters, DEBT_SERVICE, detailed)
    }

    fn category_data(
        &mut self,
        filters: &Query,
        indicators: &[DebtIndicator],
        detailed: bool,
    ) -> Result<RecordBatch> {
        let query = Query {
            indicators: codes(indicators),
            ..filters.clone()
        };
        let data = self.inner.get_data(&query)?;
        sum_by_category(&data, indicators, detailed)
    }
}

fn codes(indicators: &[DebtIndicator]) -> Vec<String> {
    indicators.iter().map(|i| i.code.to_string()).collect()
}

impl Importer for InternationalDebtStatistics {
    type Query = Query;
    type MetadataQuery = Vec<String>;
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        "World Bank International Debt Statistics"
    }

    fn schema(&self) -> SchemaRef {
        self.inner.schema()
    }

    fn get_data(&mut self, query: &Query) -> Result<RecordBatch> {
        self.inner.get_data(query)
    }

    fn get_metadata(&mut self, indicators: &Vec<String>) -> Result<RecordBatch> {
        self.inner.get_metadata(indicators)
    }

    fn clear_cache(&mut self) {
        self.inner.clear_cache();
    }
}
