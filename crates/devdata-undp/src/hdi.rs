//! Human Development Index composite indices
//!
//! The data file is a wide Latin-1 CSV with one `<indicator>_<year>` column
//! per observation; indicator names come from a separate metadata workbook.

use std::sync::{Arc, LazyLock};

use arrow::array::{Array, RecordBatch};
use arrow::datatypes::SchemaRef;
use devdata_core::fields::*;
use devdata_core::raw::decode_latin1;
use devdata_core::table::string_column;
use devdata_core::progress::fmt_num;
use devdata_core::{
    CacheSlot, Cell, ColumnRule, EntityMatch, Fetcher, Harmonizer, HttpConfig, ImportError,
    Importer, Kind, RawTable, Request, Result, SourceClient, default_fetcher,
};
use rustc_hash::FxHashMap;

const PROVIDER: &str = "UNDP HDI";

pub const DATA_URL: &str = "https://hdr.undp.org/sites/default/files/2023-24_HDR/HDR23-24_Composite_indices_complete_time_series.csv";
pub const METADATA_URL: &str = "https://hdr.undp.org/sites/default/files/2023-24_HDR/HDR23-24_Composite_indices_metadata.xlsx";

pub const HDI_GROUP: &str = "hdi_group";

const ID_COLUMNS: [&str; 4] = ["iso3", "country", "region", "hdicode"];

static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(ENTITY_CODE, &["iso3"], Kind::Code).key(),
            ColumnRule::new(ENTITY_NAME, &["country"], Kind::Text),
            ColumnRule::new(REGION_CODE, &["region"], Kind::Code),
            ColumnRule::new(HDI_GROUP, &["hdicode"], Kind::Text),
            ColumnRule::new(INDICATOR_CODE, &[INDICATOR_CODE], Kind::Text).key(),
            ColumnRule::new(INDICATOR_NAME, &[INDICATOR_NAME], Kind::Text),
            ColumnRule::new(YEAR, &[YEAR], Kind::Year).key(),
            ColumnRule::new(VALUE, &[VALUE], Kind::Float),
        ],
    )
    .resolve_entities(ENTITY_CODE, Some(ENTITY_NAME), EntityMatch::Canonicalize)
});

static METADATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(INDICATOR_NAME, &["Full name"], Kind::Text),
            ColumnRule::new(INDICATOR_CODE, &["Short name"], Kind::Text).key(),
            // Rows without a time series are section headings
            ColumnRule::new(TIME_RANGE, &["Time series"], Kind::Text).key(),
            ColumnRule::new(NOTES, &["Note"], Kind::Text).optional(),
        ],
    )
});

pub fn schema() -> SchemaRef {
    DATA.schema()
}

pub fn metadata_schema() -> SchemaRef {
    METADATA.schema()
}

/// Parse the metadata workbook (first sheet).
pub fn parse_metadata(bytes: &[u8]) -> Result<RecordBatch> {
    let raw = RawTable::from_first_sheet(bytes).map_err(|e| ImportError::format(PROVIDER, e))?;
    METADATA.apply(&raw)
}

/// `"gnipc_f_2022"` -> `("gnipc_f", 2022)`; `None` when there is no year suffix.
pub fn split_indicator_year(column: &str) -> Option<(&str, i32)> {
    let (code, year) = column.trim().rsplit_once('_')?;
    if code.is_empty() || year.len() != 4 {
        return None;
    }
    year.parse().ok().map(|y| (code, y))
}

fn indicator_names(metadata: &RecordBatch) -> FxHashMap<String, String> {
    let (Some(codes), Some(names)) = (
        string_column(metadata, INDICATOR_CODE),
        string_column(metadata, INDICATOR_NAME),
    ) else {
        return FxHashMap::default();
    };
    (0..metadata.num_rows())
        .filter(|&i| !names.is_null(i))
        .map(|i| (codes.value(i).to_ascii_lowercase(), names.value(i).to_string()))
        .collect()
}

/// Parse and melt the composite indices CSV, naming indicators from `metadata`.
pub fn parse_data(bytes: &[u8], metadata: &RecordBatch) -> Result<RecordBatch> {
    let wide = RawTable::from_csv(&decode_latin1(bytes), b',')
        .map_err(|e| ImportError::format(PROVIDER, e))?;
    let long = wide
        .melt(&ID_COLUMNS, "indicator", VALUE)
        .map_err(|e| ImportError::format(PROVIDER, e))?;

    let names = indicator_names(metadata);
    let mut columns: Vec<String> = ID_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend([INDICATOR_CODE, INDICATOR_NAME, YEAR, VALUE].map(String::from));

    let (var, value) = (ID_COLUMNS.len(), ID_COLUMNS.len() + 1);
    let mut out = RawTable::new(columns, Vec::with_capacity(long.num_rows()));
    let mut skipped = 0usize;
    for row in long.rows() {
        let header = row[var].as_str().unwrap_or_default();
        let Some((code, year)) = split_indicator_year(&header) else {
            skipped += 1;
            continue;
        };
        let name = names
            .get(&code.to_ascii_lowercase())
            .map(|n| Cell::text(n.as_str()))
            .unwrap_or(Cell::Empty);
        let mut cells = row[..var].to_vec();
        cells.extend([Cell::text(code), name, Cell::Number(year as f64), row[value].clone()]);
        out.push_row(cells);
    }
    if skipped > 0 {
        log::debug!("{PROVIDER}: skipped {skipped} values in columns without a year suffix");
    }
    DATA.apply(&out)
}

/// HDI importer configuration
#[derive(Debug, Clone)]
pub struct HdiConfig {
    pub data_url: String,
    pub metadata_url: String,
    pub http: HttpConfig,
}

impl Default for HdiConfig {
    fn default() -> Self {
        Self {
            data_url: DATA_URL.to_string(),
            metadata_url: METADATA_URL.to_string(),
            http: HttpConfig::default(),
        }
    }
}

/// Importer for the UNDP Human Development Report composite indices.
///
/// Data depends on metadata for indicator names, so the first `get_data`
/// also fills the metadata slot.
pub struct HumanDevelopmentIndex {
    config: HdiConfig,
    client: SourceClient,
    data: CacheSlot<RecordBatch>,
    metadata: CacheSlot<RecordBatch>,
}

impl std::fmt::Debug for HumanDevelopmentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanDevelopmentIndex")
            .field("data_cached", &self.data.is_cached())
            .field("metadata_cached", &self.metadata.is_cached())
            .finish_non_exhaustive()
    }
}

impl Default for HumanDevelopmentIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanDevelopmentIndex {
    pub fn new() -> Self {
        Self::with_fetcher(HdiConfig::default(), default_fetcher())
    }

    pub fn with_fetcher(config: HdiConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            data: CacheSlot::new(),
            metadata: CacheSlot::new(),
        }
    }

    fn load_metadata(&mut self) -> Result<&RecordBatch> {
        let (client, url) = (&self.client, &self.config.metadata_url);
        self.metadata.get_or_try_insert_with(|| {
            log::info!("{PROVIDER}: fetching metadata");
            parse_metadata(&client.fetch(Request::get(url.clone()))?)
        })
    }
}

impl Importer for HumanDevelopmentIndex {
    type Query = ();
    type MetadataQuery = ();
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    fn schema(&self) -> SchemaRef {
        schema()
    }

    fn get_data(&mut self, _query: &()) -> Result<RecordBatch> {
        if let Some(batch) = self.data.get() {
            log::debug!("{PROVIDER}: data served from cache");
            return Ok(batch.clone());
        }
        let metadata = self.load_metadata()?.clone();
        log::info!("{PROVIDER}: fetching data");
        let bytes = self.client.fetch(Request::get(self.config.data_url.clone()))?;
        let batch = parse_data(&bytes, &metadata)?;
        log::info!("{PROVIDER}: {} rows", fmt_num(batch.num_rows()));
        Ok(self.data.set(batch).clone())
    }

    fn get_metadata(&mut self, _query: &()) -> Result<RecordBatch> {
        self.load_metadata().cloned()
    }

    fn clear_cache(&mut self) {
        self.data.clear();
        self.metadata.clear();
        log::info!("{PROVIDER}: cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdata_core::table::{distinct_strings, float64_column, int32_column};
    use devdata_core::testing::xlsx_bytes;

    const CSV: &str = "iso3,country,region,hdicode,hdi_2000,hdi_2001,ineq_le_2000,hdi_rank\n\
        KEN,Kenya,SSA,Medium,0.500,0.505,0.1,146\n\
        ZZK.WORLD,World,,,0.640,0.645,,\n";

    fn metadata() -> RecordBatch {
        let rows: &[&[&str]] = &[
            &["Full name", "Short name", "Time series", "Note"],
            &["Human Development Index", "hdi", "1990-2022", "Composite index"],
            &["Inequality in life expectancy", "ineq_le", "2010-2022", ""],
            &["Dimension indices", "", "", ""],
        ];
        parse_metadata(&xlsx_bytes(&[("Sheet1", rows)])).unwrap()
    }

    #[test]
    fn metadata_drops_rows_without_time_series() {
        let batch = metadata();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema(), metadata_schema());
    }

    #[test]
    fn split_on_last_underscore() {
        assert_eq!(split_indicator_year("ineq_le_2000"), Some(("ineq_le", 2000)));
        assert_eq!(split_indicator_year("hdi_2021"), Some(("hdi", 2021)));
        assert_eq!(split_indicator_year("hdi_rank"), None);
        assert_eq!(split_indicator_year("2021"), None);
    }

    #[test]
    fn melts_and_names_indicators() {
        let batch = parse_data(CSV.as_bytes(), &metadata()).unwrap();
        // KEN: 3 values, World: 2 values; hdi_rank has no year suffix
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.schema(), schema());
        assert_eq!(distinct_strings(&batch, INDICATOR_CODE), ["hdi", "ineq_le"]);

        let names = string_column(&batch, INDICATOR_NAME).unwrap();
        assert_eq!(names.value(2), "Inequality in life expectancy");
        let years = int32_column(&batch, YEAR).unwrap();
        assert_eq!(years.value(1), 2001);
        let values = float64_column(&batch, VALUE).unwrap();
        assert_eq!(values.value(0), 0.5);
        let codes = string_column(&batch, ENTITY_CODE).unwrap();
        assert_eq!(codes.value(4), "ZZK.WORLD");
    }

    #[test]
    fn latin1_names_decode() {
        let mut bytes = b"iso3,country,region,hdicode,hdi_2000\nCIV,C".to_vec();
        bytes.push(0xF4);
        bytes.extend_from_slice(b"te d'Ivoire,SSA,Low,0.4\n");
        let batch = parse_data(&bytes, &metadata()).unwrap();
        assert_eq!(string_column(&batch, ENTITY_NAME).unwrap().value(0), "Côte d'Ivoire");
    }

    #[test]
    fn missing_id_column_is_data_format() {
        let err = parse_data(b"iso3,country,hdi_2000\nKEN,Kenya,0.5\n", &metadata()).unwrap_err();
        assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");
    }
}
