//! GHED workbook importer.
//!
//! The workbook carries three sheets: `Data` (one column per indicator),
//! `Codebook` (indicator names and categories) and `Metadata` (sources and
//! comments per country and indicator).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use devdata_core::fetch::read_local;
use devdata_core::fields::*;
use devdata_core::progress::fmt_num;
use devdata_core::{
    CacheSlot, Cell, ColumnRule, EntityMatch, Fetcher, Harmonizer, HttpConfig, ImportError,
    Importer, Kind, RawTable, Request, Result, SourceClient, default_fetcher,
};
use rustc_hash::FxHashMap;

const PROVIDER: &str = "WHO GHED";

pub const GHED_URL: &str = "https://apps.who.int/nha/database/Home/IndicatorsDownload/en";

pub const REGION: &str = "region";
pub const CATEGORY_1: &str = "category_1";
pub const CATEGORY_2: &str = "category_2";
pub const CURRENCY: &str = "currency";

const DATA_SHEET: &str = "Data";
const CODEBOOK_SHEET: &str = "Codebook";
const METADATA_SHEET: &str = "Metadata";

// Source spellings changed between releases; the first present wins.
const NAME_COLUMNS: &[&str] = &["location", "country"];
const CODE_COLUMNS: &[&str] = &["code", "country code"];
const REGION_COLUMNS: &[&str] = &["region", "region (WHO)"];
const INCOME_COLUMNS: &[&str] = &["income", "income group"];
const YEAR_COLUMNS: &[&str] = &["year"];

const CODEBOOK_CODE: &[&str] = &["variable code", "Indicator short code"];
const CODEBOOK_COLUMNS: [(&str, &[&str]); 5] = [
    ("indicator_name", &["variable name", "Indicator name"]),
    (CATEGORY_1, &["Category 1"]),
    (CATEGORY_2, &["Category 2"]),
    (UNIT, &["Indicator units"]),
    (CURRENCY, &["Indicator currency"]),
];

/// Metadata columns that repeat information from the data sheet
const METADATA_DROPPED: &[&str] = &[
    "country",
    "location",
    "region (WHO)",
    "income group",
    "long code (GHED data explorer)",
    "variable name",
];

static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(ENTITY_NAME, NAME_COLUMNS, Kind::Text),
            ColumnRule::new(ENTITY_CODE, CODE_COLUMNS, Kind::Code).key(),
            ColumnRule::new(REGION, REGION_COLUMNS, Kind::Text).optional(),
            ColumnRule::new(INCOME_LEVEL, INCOME_COLUMNS, Kind::Text).optional(),
            ColumnRule::new(YEAR, YEAR_COLUMNS, Kind::Year).key(),
            // GHED codes are lower-case ("che_gdp"); keep them verbatim
            ColumnRule::new(INDICATOR_CODE, &[INDICATOR_CODE], Kind::Text).key(),
            ColumnRule::new(INDICATOR_NAME, &[INDICATOR_NAME], Kind::Text),
            ColumnRule::new(CATEGORY_1, &[CATEGORY_1], Kind::Text),
            ColumnRule::new(CATEGORY_2, &[CATEGORY_2], Kind::Text),
            ColumnRule::new(UNIT, &[UNIT], Kind::Text),
            ColumnRule::new(CURRENCY, &[CURRENCY], Kind::Text),
            ColumnRule::new(VALUE, &[VALUE], Kind::Float),
        ],
    )
    .resolve_entities(ENTITY_CODE, Some(ENTITY_NAME), EntityMatch::Canonicalize)
});

pub fn schema() -> SchemaRef {
    DATA.schema()
}

fn workbook_sheet(bytes: &[u8], sheet: &str) -> Result<RawTable> {
    RawTable::from_workbook(bytes, sheet).map_err(|e| ImportError::format(PROVIDER, e))
}

fn find_index(raw: &RawTable, aliases: &[&str], sheet: &str) -> Result<usize> {
    aliases
        .iter()
        .find_map(|a| raw.column_index(a))
        .ok_or_else(|| {
            ImportError::format(
                PROVIDER,
                format!("sheet '{sheet}' has none of the columns {aliases:?}"),
            )
        })
}

/// Text of a cell with the `-` placeholder treated as empty.
fn text_cell(cell: &Cell) -> Cell {
    match cell.as_str() {
        Some(s) if s.trim() == "-" => Cell::Empty,
        Some(s) => Cell::text(s.trim()),
        None => Cell::Empty,
    }
}

/// Indicator code -> `[name, category 1, category 2, unit, currency]`
fn parse_codebook(codebook: &RawTable) -> Result<FxHashMap<String, Vec<Cell>>> {
    let code_idx = find_index(codebook, CODEBOOK_CODE, CODEBOOK_SHEET)?;
    let attr_idx = CODEBOOK_COLUMNS
        .iter()
        .map(|(_, aliases)| find_index(codebook, aliases, CODEBOOK_SHEET))
        .collect::<Result<Vec<_>>>()?;

    let mut entries = FxHashMap::default();
    for row in codebook.rows() {
        let Some(code) = row[code_idx].as_str().map(|c| c.trim().to_string()) else {
            continue;
        };
        if code.is_empty() {
            continue;
        }
        let attrs = attr_idx.iter().map(|&i| text_cell(&row[i])).collect();
        entries.entry(code).or_insert(attrs);
    }
    Ok(entries)
}

/// Melt the data sheet and attach codebook attributes to every row.
pub fn parse_data(bytes: &[u8]) -> Result<RecordBatch> {
    let data = workbook_sheet(bytes, DATA_SHEET)?;
    let codebook = parse_codebook(&workbook_sheet(bytes, CODEBOOK_SHEET)?)?;

    let mut id_vars = Vec::new();
    for aliases in [NAME_COLUMNS, CODE_COLUMNS, REGION_COLUMNS, INCOME_COLUMNS, YEAR_COLUMNS] {
        let idx = find_index(&data, aliases, DATA_SHEET)?;
        id_vars.push(data.columns()[idx].as_str());
    }
    let long = data
        .melt(&id_vars, INDICATOR_CODE, VALUE)
        .map_err(|e| ImportError::format(PROVIDER, e))?;

    let code_idx = long.column_index(INDICATOR_CODE).unwrap_or_default();
    let mut columns = long.columns().to_vec();
    columns.extend(CODEBOOK_COLUMNS.iter().map(|(name, _)| name.to_string()));

    let mut unknown = 0usize;
    let rows = long
        .rows()
        .iter()
        .map(|row| {
            let code = row[code_idx].as_str().unwrap_or_default();
            let attrs = match codebook.get(code.trim()) {
                Some(attrs) => attrs.clone(),
                None => {
                    unknown += 1;
                    vec![Cell::Empty; CODEBOOK_COLUMNS.len()]
                }
            };
            let mut out = row.clone();
            out.extend(attrs);
            out
        })
        .collect();
    if unknown > 0 {
        log::debug!("{PROVIDER}: {unknown} values for indicators missing from the codebook");
    }

    DATA.apply(&RawTable::new(columns, rows))
}

/// `"Data type (GHED)"` -> `data_type_ghed`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Metadata sheet: `entity_code, indicator_code`, then every remaining
/// column as text under a snake_case name.
pub fn parse_metadata(bytes: &[u8]) -> Result<RecordBatch> {
    let raw = workbook_sheet(bytes, METADATA_SHEET)?;
    let code = find_index(&raw, CODE_COLUMNS, METADATA_SHEET)?;
    let indicator = find_index(&raw, CODEBOOK_CODE, METADATA_SHEET)?;

    let mut selected = vec![(ENTITY_CODE.to_string(), code), (INDICATOR_CODE.to_string(), indicator)];
    for (i, name) in raw.columns().iter().enumerate() {
        let dropped = METADATA_DROPPED.iter().any(|d| d.eq_ignore_ascii_case(name.trim()));
        if i == code || i == indicator || dropped || name.trim().is_empty() {
            continue;
        }
        let mut target = snake_case(name);
        if selected.iter().any(|(t, _)| *t == target) {
            target = format!("{target}_{i}");
        }
        selected.push((target, i));
    }

    let fields: Vec<Field> = selected
        .iter()
        .enumerate()
        .map(|(pos, (name, _))| Field::new(name, DataType::Utf8, pos >= 2))
        .collect();

    let keep: Vec<&Vec<Cell>> = raw
        .rows()
        .iter()
        .filter(|r| r[code].as_str().is_some() && r[indicator].as_str().is_some())
        .collect();
    let columns: Vec<ArrayRef> = selected
        .iter()
        .enumerate()
        .map(|(pos, (_, i))| {
            let values: StringArray = keep
                .iter()
                .map(|r| {
                    let value = text_cell(&r[*i]).as_str();
                    if pos == 0 { value.map(|v| v.to_uppercase()) } else { value }
                })
                .collect();
            Arc::new(values) as ArrayRef
        })
        .collect();

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// GHED importer configuration
#[derive(Debug, Clone)]
pub struct GhedConfig {
    pub url: String,
    /// Read the workbook from this file instead of downloading it
    pub data_file: Option<PathBuf>,
    pub http: HttpConfig,
}

impl Default for GhedConfig {
    fn default() -> Self {
        Self {
            url: GHED_URL.to_string(),
            data_file: None,
            http: HttpConfig::default(),
        }
    }
}

/// Importer for the WHO Global Health Expenditure Database.
///
/// The downloaded workbook is kept alongside the two tables derived from it,
/// so `get_metadata` after `get_data` does not download again.
pub struct Ghed {
    config: GhedConfig,
    client: SourceClient,
    raw: CacheSlot<Vec<u8>>,
    data: CacheSlot<RecordBatch>,
    metadata: CacheSlot<RecordBatch>,
}

impl std::fmt::Debug for Ghed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ghed")
            .field("data_file", &self.config.data_file)
            .field("raw_cached", &self.raw.is_cached())
            .finish_non_exhaustive()
    }
}

impl Default for Ghed {
    fn default() -> Self {
        Self::new()
    }
}

impl Ghed {
    pub fn new() -> Self {
        Self::with_fetcher(GhedConfig::default(), default_fetcher())
    }

    /// Use a local copy of the workbook. The path is checked on first use.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let config = GhedConfig {
            data_file: Some(path.into()),
            ..GhedConfig::default()
        };
        Self::with_fetcher(config, default_fetcher())
    }

    pub fn with_fetcher(config: GhedConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            raw: CacheSlot::new(),
            data: CacheSlot::new(),
            metadata: CacheSlot::new(),
        }
    }

    fn raw(&mut self) -> Result<&[u8]> {
        let (client, config) = (&self.client, &self.config);
        let bytes = self.raw.get_or_try_insert_with(|| match &config.data_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ImportError::invalid(format!(
                        "GHED data file {} does not exist",
                        path.display()
                    )));
                }
                log::info!("{PROVIDER}: reading {}", path.display());
                read_local(path).map_err(|e| {
                    ImportError::unavailable(PROVIDER, format!("{}: {e}", path.display()))
                })
            }
            None => {
                log::info!("{PROVIDER}: downloading workbook");
                client.fetch(Request::get(config.url.clone()))
            }
        })?;
        Ok(bytes.as_slice())
    }

    /// Write the unprocessed workbook to `{directory}/{file_name}.xlsx`.
    pub fn export_raw_data(
        &mut self,
        directory: &Path,
        file_name: &str,
        overwrite: bool,
    ) -> Result<PathBuf> {
        if !directory.is_dir() {
            return Err(ImportError::invalid(format!(
                "directory {} does not exist",
                directory.display()
            )));
        }
        let path = directory.join(format!("{file_name}.xlsx"));
        if path.exists() && !overwrite {
            return Err(ImportError::invalid(format!(
                "{} already exists; pass overwrite to replace it",
                path.display()
            )));
        }

        let bytes = self.raw()?;
        let tmp = path.with_extension("xlsx.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        log::info!("{PROVIDER}: raw workbook written to {}", path.display());
        Ok(path)
    }
}

impl Importer for Ghed {
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
        let batch = parse_data(self.raw()?)?;
        log::info!("{PROVIDER}: {} rows", fmt_num(batch.num_rows()));
        Ok(self.data.set(batch).clone())
    }

    fn get_metadata(&mut self, _query: &()) -> Result<RecordBatch> {
        if let Some(batch) = self.metadata.get() {
            return Ok(batch.clone());
        }
        let batch = parse_metadata(self.raw()?)?;
        Ok(self.metadata.set(batch).clone())
    }

    fn clear_cache(&mut self) {
        self.raw.clear();
        self.data.clear();
        self.metadata.clear();
        log::info!("{PROVIDER}: cache cleared");
    }
}
