//! One downloaded BACI release.
//!
//! The zip is written next to the Parquet files of its cache entry so it can
//! be saved later without downloading again. Every `BACI_*.csv` member is
//! streamed into its own Parquet file; the small code lists and the readme
//! are kept in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayBuilder, Float64Builder, Int32Builder, Int64Builder, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use devdata_core::fields::*;
use devdata_core::archive::read_to_vec;
use devdata_core::progress::fmt_num;
use devdata_core::{
    ColumnRule, DiskCache, Harmonizer, ImportError, Kind, ProgressContext, RawTable, Request, Result,
    SourceClient, decode_text, read_parquet,
};
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use zip::ZipArchive;

use crate::baci::PROVIDER;
use crate::filter::Filter;

const CHUNK_ROWS: usize = 256 * 1024;
const RAW_ZIP: &str = "raw.zip";

/// Which release to use. `hs_version` accepts `"22"` or `"HS22"`;
/// `baci_version` accepts a release code or `"latest"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaciRelease {
    pub hs_version: String,
    pub baci_version: String,
}

impl Default for BaciRelease {
    fn default() -> Self {
        Self {
            hs_version: "HS22".to_string(),
            baci_version: "latest".to_string(),
        }
    }
}

impl BaciRelease {
    pub fn new(hs_version: impl Into<String>, baci_version: impl Into<String>) -> Self {
        Self {
            hs_version: hs_version.into(),
            baci_version: baci_version.into(),
        }
    }
}

/// Stored trade flow columns. Codes are BACI's numeric country codes and HS
/// product codes; values are thousands of USD, quantities metric tons.
pub static FLOWS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(YEAR, DataType::Int32, false),
        Field::new(EXPORTER_CODE, DataType::Int64, false),
        Field::new(IMPORTER_CODE, DataType::Int64, false),
        Field::new(PRODUCT_CODE, DataType::Int64, false),
        Field::new(VALUE, DataType::Float64, true),
        Field::new(QUANTITY, DataType::Float64, true),
    ]))
});

/// Raw header of each flow column, in [`FLOWS`] order
const RAW_COLUMNS: [&str; 6] = ["t", "i", "j", "k", "v", "q"];

pub const COUNTRY_CODE: &str = "country_code";
pub const ISO2_CODE: &str = "iso2_code";

static COUNTRIES: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(COUNTRY_CODE, &["country_code"], Kind::Int).key(),
            ColumnRule::new(COUNTRY_NAME, &["country_name", "country_name_full"], Kind::Text),
            ColumnRule::new(ISO3_CODE, &["country_iso3"], Kind::Code).optional(),
            ColumnRule::new(ISO2_CODE, &["country_iso2"], Kind::Code).optional(),
        ],
    )
});

static PRODUCTS: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(PRODUCT_CODE, &["code"], Kind::Int).key(),
            ColumnRule::new(PRODUCT_DESCRIPTION, &["description"], Kind::Text),
        ],
    )
});

/// Entry name without any directory prefix.
fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn is_data_file(name: &str) -> bool {
    let base = base_name(name);
    base.starts_with("BACI") && base.to_ascii_lowercase().ends_with(".csv")
}

fn find_entry<'a>(names: &'a [String], prefix: &str, suffix: &str) -> Option<&'a String> {
    names.iter().find(|n| {
        let base = base_name(n).to_ascii_lowercase();
        base.starts_with(prefix) && base.ends_with(suffix)
    })
}

fn format_error(message: impl Into<String>) -> ImportError {
    ImportError::format(PROVIDER, message)
}

/// Parse the readme's `Key: value` blocks. Blocks are separated by blank
/// lines; continuation lines are joined with spaces; the variable list is
/// skipped.
pub fn parse_readme(text: &str) -> Result<BTreeMap<String, String>> {
    let text = text.replace("\r\n", "\n");
    let mut metadata = BTreeMap::new();
    for block in text.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        if block.starts_with("List of Variables:") {
            continue;
        }
        let mut lines = block.lines();
        let Some((key, first)) = lines.next().and_then(|l| l.split_once(':')) else {
            continue;
        };
        let value = std::iter::once(first)
            .chain(lines)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        metadata.insert(key.trim().to_string(), value);
    }
    if metadata.is_empty() {
        return Err(format_error("No metadata found in Readme.txt"));
    }
    Ok(metadata)
}

/// Code list CSV into a table; an empty file gives an empty table.
fn parse_code_list(bytes: &[u8], harmonizer: &Harmonizer, what: &str) -> Result<RecordBatch> {
    let text = decode_text(bytes);
    if text.trim().is_empty() {
        log::warn!("{PROVIDER}: {what} file is empty");
        return Ok(RecordBatch::new_empty(harmonizer.schema()));
    }
    let raw = RawTable::from_csv(&text, b',').map_err(|e| format_error(format!("{what}: {e}")))?;
    harmonizer.apply(&raw)
}

struct FlowBuilders {
    year: Int32Builder,
    exporter: Int64Builder,
    importer: Int64Builder,
    product: Int64Builder,
    value: Float64Builder,
    quantity: Float64Builder,
}

impl FlowBuilders {
    fn new() -> Self {
        Self {
            year: Int32Builder::with_capacity(CHUNK_ROWS),
            exporter: Int64Builder::with_capacity(CHUNK_ROWS),
            importer: Int64Builder::with_capacity(CHUNK_ROWS),
            product: Int64Builder::with_capacity(CHUNK_ROWS),
            value: Float64Builder::with_capacity(CHUNK_ROWS),
            quantity: Float64Builder::with_capacity(CHUNK_ROWS),
        }
    }

    fn len(&self) -> usize {
        self.year.len()
    }

    fn finish(&mut self) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            FLOWS.clone(),
            vec![
                Arc::new(self.year.finish()),
                Arc::new(self.exporter.finish()),
                Arc::new(self.importer.finish()),
                Arc::new(self.product.finish()),
                Arc::new(self.value.finish()),
                Arc::new(self.quantity.finish()),
            ],
        )?)
    }
}

fn parse_int(field: &str, line: u64, column: &str, file: &str) -> Result<i64> {
    field
        .trim()
        .parse()
        .map_err(|_| format_error(format!("{file} line {line}: bad '{column}' value '{field}'")))
}

/// Empty, "NA" and unparseable measures are null.
fn parse_measure(field: &str) -> Option<f64> {
    field.trim().parse().ok().filter(|v: &f64| v.is_finite())
}

/// A Parquet file of flows and the years it holds.
#[derive(Debug, Clone)]
pub struct DataFile {
    pub path: PathBuf,
    pub years: BTreeSet<i32>,
}

/// Stream one `BACI_*.csv` member into `name.parquet`. `None` for a file
/// without rows.
fn convert_csv<R: Read>(
    reader: R,
    cache: &DiskCache,
    key: &str,
    name: &str,
) -> Result<Option<DataFile>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| format_error(format!("{name}: unreadable header: {e}")))?
        .clone();
    let mut positions = [0usize; 6];
    for (slot, column) in positions.iter_mut().zip(RAW_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column))
            .ok_or_else(|| format_error(format!("{name}: missing column '{column}'")))?;
    }
    let [t, i, j, k, v, q] = positions;

    let stem = base_name(name).trim_end_matches(".csv").trim_end_matches(".CSV");
    let mut sink = None;
    let mut builders = FlowBuilders::new();
    let mut years = BTreeSet::new();
    let mut record = csv::StringRecord::new();

    loop {
        let more = rdr
            .read_record(&mut record)
            .map_err(|e| format_error(format!("{name}: {e}")))?;
        if more {
            let line = record.position().map_or(0, |p| p.line());
            let field = |idx: usize| record.get(idx).unwrap_or("");
            let year = parse_int(field(t), line, "t", name)?;
            let year = i32::try_from(year)
                .map_err(|_| format_error(format!("{name} line {line}: year {year} out of range")))?;
            years.insert(year);
            builders.year.append_value(year);
            builders.exporter.append_value(parse_int(field(i), line, "i", name)?);
            builders.importer.append_value(parse_int(field(j), line, "j", name)?);
            builders.product.append_value(parse_int(field(k), line, "k", name)?);
            builders.value.append_option(parse_measure(field(v)));
            builders.quantity.append_option(parse_measure(field(q)));
        }
        if builders.len() >= CHUNK_ROWS || (!more && builders.len() > 0) {
            let batch = builders.finish()?;
            if sink.is_none() {
                sink = Some(cache.writer(key, stem, &FLOWS)?);
            }
            if let Some(sink) = sink.as_mut() {
                sink.write_batch(&batch)?;
            }
        }
        if !more {
            break;
        }
    }

    let Some(sink) = sink else {
        log::warn!("{PROVIDER}: Skipping empty data file {name}");
        return Ok(None);
    };
    let rows = sink.finalize()?;
    log::debug!("{PROVIDER}: {name}: {} rows", fmt_num(rows));
    Ok(Some(DataFile {
        path: cache.entry_dir(key).join(format!("{stem}.parquet")),
        years,
    }))
}

/// A release converted to Parquet, with its code lists and readme.
#[derive(Debug)]
pub struct LoadedRelease {
    pub hs_version: String,
    pub version: String,
    key: String,
    zip_path: PathBuf,
    files: Vec<DataFile>,
    countries: RecordBatch,
    products: RecordBatch,
    metadata: BTreeMap<String, String>,
    years: Vec<i32>,
}

/// Disk cache key of a release
pub fn entry_key(hs_version: &str, version: &str) -> String {
    format!("BACI_{hs_version}_V{version}")
}

impl LoadedRelease {
    /// Download the release zip from `url` and convert it into `cache`.
    pub fn download(
        client: &SourceClient,
        cache: &DiskCache,
        progress: &ProgressContext,
        url: &str,
        hs_version: &str,
        version: &str,
    ) -> Result<Self> {
        log::info!("{PROVIDER}: downloading {hs_version} release {version}. This may take a while");
        let stage = progress.stage_line("baci");
        stage.set_message(format!("downloading {hs_version} {version}"));
        let bytes = client.fetch(Request::get(url))?;

        let key = entry_key(hs_version, version);
        let dir = cache.entry_dir(&key);
        fs::create_dir_all(&dir)?;
        let zip_path = dir.join(RAW_ZIP);
        let tmp = dir.join(format!("{RAW_ZIP}.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &zip_path)?;
        drop(bytes);

        let loaded = Self::load(cache, &zip_path, hs_version, version, &stage);
        stage.finish_and_clear();
        loaded
    }

    /// Reuse the archive a previous download left in `cache`, if it still converts.
    pub fn from_cache(cache: &DiskCache, hs_version: &str, version: &str) -> Option<Self> {
        let zip_path = cache.entry_dir(&entry_key(hs_version, version)).join(RAW_ZIP);
        if !zip_path.is_file() {
            return None;
        }
        log::info!("{PROVIDER}: reusing cached {hs_version} release {version}");
        match Self::from_zip(cache, &zip_path, hs_version, version) {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                log::warn!("{PROVIDER}: cached archive unusable, downloading again: {e}");
                None
            }
        }
    }

    /// Convert an archive already on disk. On failure the entry is removed.
    pub fn from_zip(cache: &DiskCache, zip_path: &Path, hs_version: &str, version: &str) -> Result<Self> {
        Self::load(cache, zip_path, hs_version, version, &ProgressBar::hidden())
    }

    fn load(
        cache: &DiskCache,
        zip_path: &Path,
        hs_version: &str,
        version: &str,
        stage: &ProgressBar,
    ) -> Result<Self> {
        let key = entry_key(hs_version, version);
        let loaded = Self::convert(cache, &key, zip_path, hs_version, version, stage);
        if loaded.is_err() {
            if let Err(e) = cache.remove(&key) {
                log::warn!("{PROVIDER}: could not remove partial cache entry: {e}");
            }
        }
        loaded
    }

    fn convert(
        cache: &DiskCache,
        key: &str,
        zip_path: &Path,
        hs_version: &str,
        version: &str,
        stage: &ProgressBar,
    ) -> Result<Self> {
        let mut archive = ZipArchive::new(File::open(zip_path)?)
            .map_err(|e| format_error(format!("Failed to extract data from ZIP: {e}")))?;
        let names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_string)
            .collect();

        let data_names: Vec<&String> = names.iter().filter(|n| is_data_file(n)).collect();
        if data_names.is_empty() {
            return Err(format_error("No BACI data files found in the archive"));
        }

        let mut read_member = |name: &str| -> Result<Vec<u8>> {
            let entry = archive
                .by_name(name)
                .map_err(|e| format_error(format!("{name}: {e}")))?;
            let declared = entry.size();
            Ok(read_to_vec(entry, declared)?)
        };

        let countries_name = find_entry(&names, "country_codes", ".csv")
            .ok_or_else(|| format_error("No country codes file found in the archive"))?;
        let countries = parse_code_list(&read_member(countries_name.as_str())?, &COUNTRIES, "country codes")?;

        let products_name = find_entry(&names, "product_codes", ".csv")
            .ok_or_else(|| format_error("No product codes file found in the archive"))?;
        let products = parse_code_list(&read_member(products_name.as_str())?, &PRODUCTS, "product codes")?;

        let readme_name = find_entry(&names, "readme", ".txt")
            .ok_or_else(|| format_error("No Readme.txt file found in the archive"))?;
        let metadata = parse_readme(&decode_text(&read_member(readme_name.as_str())?))?;

        log::info!("{PROVIDER}: converting {} data file(s) to Parquet", data_names.len());
        let mut files = Vec::with_capacity(data_names.len());
        for name in data_names {
            stage.set_message(format!("converting {}", base_name(name)));
            let entry = archive
                .by_name(name)
                .map_err(|e| format_error(format!("{name}: {e}")))?;
            if let Some(file) = convert_csv(entry, cache, key, name)? {
                files.push(file);
            }
        }

        let years: BTreeSet<i32> = files.iter().flat_map(|f| f.years.iter().copied()).collect();
        Ok(Self {
            hs_version: hs_version.to_string(),
            version: version.to_string(),
            key: key.to_string(),
            zip_path: zip_path.to_path_buf(),
            files,
            countries,
            products,
            metadata,
            years: years.into_iter().collect(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn zip_path(&self) -> &Path {
        &self.zip_path
    }

    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    /// Years present in the data, ascending.
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn countries(&self) -> &RecordBatch {
        &self.countries
    }

    pub fn products(&self) -> &RecordBatch {
        &self.products
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Flows matching the filters, file by file in archive order.
    pub fn scan(&self, years: Option<&Filter>, products: Option<&Filter>) -> Result<Vec<RecordBatch>> {
        let mut out = Vec::new();
        for file in &self.files {
            if years.is_some_and(|f| !f.matches_any(file.years.iter().map(|&y| i64::from(y)))) {
                continue;
            }
            for batch in read_parquet(&file.path)? {
                let batch = match (years, products) {
                    (None, None) => batch,
                    _ => filter_flows(&batch, years, products)?,
                };
                if batch.num_rows() > 0 {
                    out.push(batch);
                }
            }
        }
        Ok(out)
    }

    /// BACI country code -> (name, ISO3)
    pub fn country_labels(&self) -> FxHashMap<i64, (Option<String>, Option<String>)> {
        let batch = &self.countries;
        let codes = int64_values(batch, COUNTRY_CODE);
        let names = optional_strings(batch, COUNTRY_NAME);
        let iso3 = optional_strings(batch, ISO3_CODE);
        codes
            .into_iter()
            .zip(names.into_iter().zip(iso3))
            .filter_map(|(code, labels)| code.map(|c| (c, labels)))
            .collect()
    }

    /// HS product code -> description
    pub fn product_labels(&self) -> FxHashMap<i64, String> {
        let batch = &self.products;
        int64_values(batch, PRODUCT_CODE)
            .into_iter()
            .zip(optional_strings(batch, PRODUCT_DESCRIPTION))
            .filter_map(|(code, desc)| Some((code?, desc?)))
            .collect()
    }
}

fn filter_flows(batch: &RecordBatch, years: Option<&Filter>, products: Option<&Filter>) -> Result<RecordBatch> {
    let year_values = int32_values(batch, YEAR);
    let product_values = int64_values(batch, PRODUCT_CODE);
    devdata_core::table::filter_rows(batch, |row| {
        let year_ok = years.map_or(true, |f| {
            year_values
                .get(row)
                .copied()
                .flatten()
                .is_some_and(|y| f.matches(i64::from(y)))
        });
        let product_ok = products.map_or(true, |f| {
            product_values
                .get(row)
                .copied()
                .flatten()
                .is_some_and(|p| f.matches(p))
        });
        year_ok && product_ok
    })
}

pub(crate) fn int32_values(batch: &RecordBatch, name: &str) -> Vec<Option<i32>> {
    devdata_core::table::int32_column(batch, name)
        .map(|col| col.iter().collect())
        .unwrap_or_else(|| vec![None; batch.num_rows()])
}

pub(crate) fn int64_values(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<arrow::array::Int64Array>())
        .map(|col| col.iter().collect())
        .unwrap_or_else(|| vec![None; batch.num_rows()])
}

fn optional_strings(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    devdata_core::table::string_column(batch, name)
        .map(|col| col.iter().map(|v| v.map(str::to_string)).collect())
        .unwrap_or_else(|| vec![None; batch.num_rows()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdata_core::testing::zip_bytes;

    const README: &str = "Version: 202501\n\nRelease Date: 2025 01 30\n\n\
        Content:\nTrade flows at the year - exporter - importer - product level.\n\n\
        List of Variables:\nt: year\ni: exporter\n\nReference:\nGaulier, G. and Zignago, S. (2010)\n";

    fn archive(flows: &[(&str, &str)]) -> Vec<u8> {
        let mut entries = vec![
            ("country_codes_V202501.csv", "country_code,country_name,country_iso2,country_iso3\n4,Afghanistan,AF,AFG\n566,Nigeria,NG,NGA\n"),
            ("product_codes_HS22_V202501.csv", "code,description\n010121,Horses\n520100,Cotton\n"),
            ("Readme.txt", README),
        ];
        entries.extend_from_slice(flows);
        zip_bytes(&entries)
    }

    fn load(bytes: &[u8]) -> (DiskCache, Result<LoadedRelease>) {
        let cache = DiskCache::temporary("devdata-baci-test").unwrap();
        let dir = cache.entry_dir(&entry_key("HS22", "202501"));
        fs::create_dir_all(&dir).unwrap();
        let zip_path = dir.join(RAW_ZIP);
        fs::write(&zip_path, bytes).unwrap();
        let loaded = LoadedRelease::from_zip(&cache, &zip_path, "HS22", "202501");
        (cache, loaded)
    }

    #[test]
    fn readme_blocks() {
        let metadata = parse_readme(README).unwrap();
        assert_eq!(metadata["Version"], "202501");
        assert_eq!(metadata["Release Date"], "2025 01 30");
        assert_eq!(metadata["Content"], "Trade flows at the year - exporter - importer - product level.");
        assert!(!metadata.contains_key("List of Variables"));
        assert!(!metadata.contains_key("t"));

        let err = parse_readme("This readme is broken\nIt has no keys\n").unwrap_err();
        assert!(err.to_string().contains("No metadata found"));
        assert!(parse_readme("").is_err());
    }

    #[test]
    fn converts_flows_and_code_lists() {
        let bytes = archive(&[
            ("BACI_HS22_Y2021_V202501.csv", "t,i,j,k,v,q\n2021,4,566,010121,1.5,         NA\n2021,566,4,520100,2.0,3.0\n"),
            ("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n2022,4,566,520100,  7.25,1\n"),
        ]);
        let (_cache, loaded) = load(&bytes);
        let loaded = loaded.unwrap();

        assert_eq!(loaded.years(), [2021, 2022]);
        assert_eq!(loaded.files().len(), 2);
        assert_eq!(loaded.metadata()["Version"], "202501");
        assert_eq!(loaded.countries().num_rows(), 2);
        assert_eq!(loaded.product_labels()[&10121], "Horses");
        assert_eq!(loaded.country_labels()[&566].1.as_deref(), Some("NGA"));

        let all = loaded.scan(None, None).unwrap();
        assert_eq!(all.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
        assert_eq!(all[0].schema(), FLOWS.clone());
        let quantity = devdata_core::table::float64_column(&all[0], QUANTITY).unwrap();
        assert!(arrow::array::Array::is_null(quantity, 0));
    }

    #[test]
    fn scan_filters_and_skips_files() {
        let bytes = archive(&[
            ("BACI_HS22_Y2021_V202501.csv", "t,i,j,k,v,q\n2021,4,566,10121,1,1\n2021,4,566,520100,2,2\n"),
            ("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n2022,4,566,520100,3,3\n"),
        ]);
        let (_cache, loaded) = load(&bytes);
        let loaded = loaded.unwrap();

        let rows = |years: Option<Filter>, products: Option<Filter>| -> usize {
            loaded
                .scan(years.as_ref(), products.as_ref())
                .unwrap()
                .iter()
                .map(|b| b.num_rows())
                .sum()
        };
        assert_eq!(rows(Some(Filter::Single(2022)), None), 1);
        assert_eq!(rows(Some(Filter::Range(2020, 2021)), None), 2);
        assert_eq!(rows(None, Some(Filter::Single(520100))), 2);
        assert_eq!(rows(Some(Filter::List(vec![2021])), Some(Filter::Single(520100))), 1);
        assert_eq!(rows(Some(Filter::Single(1999)), None), 0);
    }

    #[test]
    fn empty_data_file_is_skipped() {
        let bytes = archive(&[
            ("BACI_HS22_Y2021_V202501.csv", "t,i,j,k,v,q\n"),
            ("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n2022,4,566,520100,3,3\n"),
        ]);
        let (_cache, loaded) = load(&bytes);
        let loaded = loaded.unwrap();
        assert_eq!(loaded.files().len(), 1);
        assert_eq!(loaded.years(), [2022]);
    }

    #[test]
    fn empty_code_lists_are_empty_tables() {
        let bytes = zip_bytes(&[
            ("country_codes_V202501.csv", ""),
            ("product_codes_HS22_V202501.csv", ""),
            ("Readme.txt", README),
            ("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n2022,4,566,520100,3,3\n"),
        ]);
        let (_cache, loaded) = load(&bytes);
        let loaded = loaded.unwrap();
        assert_eq!(loaded.countries().num_rows(), 0);
        assert!(loaded.product_labels().is_empty());
    }

    #[test]
    fn missing_members_are_format_errors() {
        let (_c, err) = load(&zip_bytes(&[("not_data.csv", "x\n1\n")]));
        assert!(err.unwrap_err().to_string().contains("No BACI data files found"));

        let (_c, err) = load(&zip_bytes(&[
            ("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n"),
            ("Readme.txt", README),
        ]));
        assert!(err.unwrap_err().to_string().contains("No country codes file found"));

        let (_c, err) = load(b"not a zip");
        assert!(err.unwrap_err().to_string().contains("Failed to extract data from ZIP"));
    }

    #[test]
    fn bad_flow_row_fails_and_cleans_entry() {
        let bytes = archive(&[("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n2022,x,566,520100,3,3\n")]);
        let (cache, loaded) = load(&bytes);
        let err = loaded.unwrap_err();
        assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");
        assert!(!cache.entry_dir(&entry_key("HS22", "202501")).exists());
    }
}
