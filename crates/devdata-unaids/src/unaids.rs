//! UNAIDS AIDSinfo datasets.
//!
//! Each dataset is published as a zip holding a single CSV. The AIDSinfo
//! server has presented an incomplete certificate chain, so certificate
//! verification is off unless the configuration turns it back on.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use devdata_core::archive::{entries_with_extension, read_entry};
use devdata_core::fields::*;
use devdata_core::table::string_column;
use devdata_core::progress::fmt_num;
use devdata_core::{
    ColumnRule, EntityMatch, Fetcher, Harmonizer, HttpConfig, ImportError, Importer, KeyedCache,
    Kind, RawTable, Request, Result, SourceClient, decode_text, default_fetcher,
};
use rustc_hash::FxHashSet;

const PROVIDER: &str = "UNAIDS";

/// The bulk downloads offered by AIDSinfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Estimates,
    LawsAndPolicies,
    KeyPopulations,
    Gam,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Estimates,
        Dataset::LawsAndPolicies,
        Dataset::KeyPopulations,
        Dataset::Gam,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Estimates => "Estimates",
            Dataset::LawsAndPolicies => "Laws and Policies",
            Dataset::KeyPopulations => "Key Populations",
            Dataset::Gam => "GAM",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = Dataset::ALL.iter().map(|d| d.name()).collect();
                ImportError::invalid(format!("Invalid dataset '{s}'. Choose one of {names:?}"))
            })
    }
}

static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(INDICATOR_NAME, &["Indicator"], Kind::Text).key(),
            ColumnRule::new(UNIT, &["Unit"], Kind::Text),
            ColumnRule::new(SUBGROUP, &["Subgroup"], Kind::Text),
            ColumnRule::new(ENTITY_NAME, &["Area"], Kind::Text),
            ColumnRule::new(ENTITY_CODE, &["Area ID"], Kind::Code),
            ColumnRule::new(YEAR, &["Time Period"], Kind::Year).key(),
            ColumnRule::new(SOURCE, &["Source"], Kind::Text),
            ColumnRule::new(VALUE, &["Data value"], Kind::Float),
            ColumnRule::new(VALUE_FORMATTED, &["Formatted"], Kind::Text),
            ColumnRule::new(FOOTNOTE, &["Footnote"], Kind::Text).optional(),
        ],
    )
    .resolve_entities(ENTITY_CODE, Some(ENTITY_NAME), EntityMatch::Canonicalize)
});

static INDICATORS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(INDICATOR_NAME, DataType::Utf8, false),
        Field::new(UNIT, DataType::Utf8, true),
    ]))
});

pub fn schema() -> SchemaRef {
    DATA.schema()
}

/// The single CSV inside a dataset archive.
pub fn csv_from_zip(bytes: &[u8]) -> Result<String> {
    let names = entries_with_extension(bytes, "csv").map_err(|e| ImportError::format(PROVIDER, e))?;
    let name = match names.as_slice() {
        [] => return Err(ImportError::format(PROVIDER, "No files found in the archive")),
        [name] => name,
        _ => {
            return Err(ImportError::format(
                PROVIDER,
                format!("Multiple files found in the archive: {names:?}"),
            ));
        }
    };
    let content = read_entry(Cursor::new(bytes), name).map_err(|e| ImportError::format(PROVIDER, e))?;
    Ok(decode_text(&content))
}

pub fn parse_dataset(bytes: &[u8]) -> Result<RecordBatch> {
    let text = csv_from_zip(bytes)?;
    let raw = RawTable::from_csv(&text, b',').map_err(|e| ImportError::format(PROVIDER, e))?;
    DATA.apply(&raw)
}

/// Distinct `(indicator_name, unit)` pairs in first-seen order.
fn indicator_list(data: &RecordBatch) -> Result<RecordBatch> {
    let names = string_column(data, INDICATOR_NAME)
        .ok_or_else(|| ImportError::format(PROVIDER, "indicator column missing"))?;
    let units = string_column(data, UNIT)
        .ok_or_else(|| ImportError::format(PROVIDER, "unit column missing"))?;

    let mut seen = FxHashSet::default();
    let mut out_names = Vec::new();
    let mut out_units = Vec::new();
    for (name, unit) in names.iter().zip(units.iter()) {
        let Some(name) = name else { continue };
        if seen.insert((name, unit)) {
            out_names.push(name);
            out_units.push(unit);
        }
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(out_names)),
        Arc::new(StringArray::from(out_units)),
    ];
    Ok(RecordBatch::try_new(INDICATORS.clone(), columns)?)
}

/// UNAIDS importer configuration
#[derive(Debug, Clone)]
pub struct UnaidsConfig {
    pub estimates_url: String,
    pub laws_and_policies_url: String,
    pub key_populations_url: String,
    pub gam_url: String,
    pub http: HttpConfig,
}

impl Default for UnaidsConfig {
    fn default() -> Self {
        Self {
            estimates_url: "https://aidsinfo.unaids.org/documents/Estimates_2024_en.zip".to_string(),
            laws_and_policies_url: "https://aidsinfo.unaids.org/documents/NCPI_2024_en.zip".to_string(),
            key_populations_url: "https://aidsinfo.unaids.org/documents/KPAtlasDB_2024_en.zip".to_string(),
            gam_url: "https://aidsinfo.unaids.org/documents/GAM_2024_en.zip".to_string(),
            http: HttpConfig {
                verify_ssl: false,
                ..HttpConfig::default()
            },
        }
    }
}

impl UnaidsConfig {
    pub fn url(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Estimates => &self.estimates_url,
            Dataset::LawsAndPolicies => &self.laws_and_policies_url,
            Dataset::KeyPopulations => &self.key_populations_url,
            Dataset::Gam => &self.gam_url,
        }
    }
}

/// Importer for the UNAIDS AIDSinfo datasets, one cache slot per dataset.
pub struct Unaids {
    config: UnaidsConfig,
    client: SourceClient,
    data: KeyedCache<Dataset, RecordBatch>,
}

impl fmt::Debug for Unaids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unaids")
            .field("verify_ssl", &self.config.http.verify_ssl)
            .field("cached", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for Unaids {
    fn default() -> Self {
        Self::new()
    }
}

impl Unaids {
    pub fn new() -> Self {
        Self::with_fetcher(UnaidsConfig::default(), default_fetcher())
    }

    pub fn with_fetcher(config: UnaidsConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        if !config.http.verify_ssl {
            log::warn!("{PROVIDER}: SSL certificate verification is disabled for AIDSinfo downloads");
        }
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            data: KeyedCache::new(),
        }
    }

    pub fn verify_ssl(&self) -> bool {
        self.config.http.verify_ssl
    }

    fn load(&mut self, dataset: Dataset) -> Result<&RecordBatch> {
        let (client, url) = (&self.client, self.config.url(dataset));
        self.data.get_or_try_insert_with(dataset, || {
            log::info!("{PROVIDER}: fetching {dataset}");
            let batch = parse_dataset(&client.fetch(Request::get(url))?)?;
            log::info!("{PROVIDER}: {dataset}: {} rows", fmt_num(batch.num_rows()));
            Ok(batch)
        })
    }
}

impl Importer for Unaids {
    type Query = Dataset;
    /// Indicators available in a dataset
    type MetadataQuery = Dataset;
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    fn schema(&self) -> SchemaRef {
        schema()
    }

    fn get_data(&mut self, dataset: &Dataset) -> Result<RecordBatch> {
        self.load(*dataset).cloned()
    }

    fn get_metadata(&mut self, dataset: &Dataset) -> Result<RecordBatch> {
        indicator_list(self.load(*dataset)?)
    }

    fn clear_cache(&mut self) {
        self.data.clear();
        log::info!("{PROVIDER}: cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use devdata_core::table::{float64_column, int32_column};
    use devdata_core::testing::zip_bytes;

    const CSV: &str = "Indicator,Unit,Subgroup,Area,Area ID,Time Period,Source,Data value,Formatted,Footnote\n\
        People living with HIV,Number,All ages estimate,Kenya,KEN,2022,UNAIDS_Estimates_,1400000,1 400 000,\n\
        People living with HIV,Number,All ages estimate,Ivory Coast,CIV,2022,UNAIDS_Estimates_,...,...,no data\n\
        HIV prevalence,Percent,Adults (15-49) estimate,Kenya,KEN,2022,UNAIDS_Estimates_,3.7,3.7,\n";

    #[test]
    fn dataset_names_parse() {
        assert_eq!("laws and policies".parse::<Dataset>().unwrap(), Dataset::LawsAndPolicies);
        assert_eq!("GAM".parse::<Dataset>().unwrap(), Dataset::Gam);
        let err = "wrong".parse::<Dataset>().unwrap_err();
        assert!(err.to_string().contains("Invalid dataset"));
    }

    #[test]
    fn archive_must_hold_one_csv() {
        let none = zip_bytes(&[("readme.txt", "hi")]);
        let err = csv_from_zip(&none).unwrap_err();
        assert!(err.to_string().contains("No files"), "{err}");

        let many = zip_bytes(&[("a.csv", "x"), ("b.csv", "y")]);
        let err = csv_from_zip(&many).unwrap_err();
        assert!(err.to_string().contains("Multiple files"), "{err}");

        assert!(matches!(csv_from_zip(b"not a zip"), Err(ImportError::DataFormat { .. })));
    }

    #[test]
    fn dataset_is_harmonized() {
        let batch = parse_dataset(&zip_bytes(&[("Estimates.csv", CSV)])).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema(), schema());

        let names = string_column(&batch, ENTITY_NAME).unwrap();
        assert_eq!(names.value(1), "Côte d'Ivoire");
        let values = float64_column(&batch, VALUE).unwrap();
        assert_eq!(values.value(0), 1_400_000.0);
        assert!(values.is_null(1));
        let formatted = string_column(&batch, VALUE_FORMATTED).unwrap();
        assert_eq!(formatted.value(0), "1 400 000");
        assert_eq!(int32_column(&batch, YEAR).unwrap().value(2), 2022);
    }

    #[test]
    fn renamed_column_is_data_format() {
        let csv = CSV.replace("Data value", "Value");
        let err = parse_dataset(&zip_bytes(&[("Estimates.csv", &csv)])).unwrap_err();
        assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");
    }

    #[test]
    fn indicator_list_is_distinct() {
        let batch = parse_dataset(&zip_bytes(&[("Estimates.csv", CSV)])).unwrap();
        let list = indicator_list(&batch).unwrap();
        assert_eq!(list.num_rows(), 2);
    }
}
