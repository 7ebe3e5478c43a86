//! IMF World Economic Outlook importer
//!
//! Reads the tab-delimited "all countries" WEO file of a release. The file is
//! wide (one column per year); it is melted to one row per country,
//! indicator and year.

use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::SchemaRef;
use chrono::NaiveDate;
use devdata_core::fields::*;
use devdata_core::table::string_column;
use devdata_core::progress::fmt_num;
use devdata_core::{
    ColumnRule, EntityMatch, FetchError, Fetcher, Harmonizer, HttpConfig, ImportError, Importer,
    KeyedCache, Kind, RawTable, Request, Result, SourceClient, decode_text, default_fetcher,
};
use devdata_core::raw::is_null_sentinel;
use rustc_hash::FxHashSet;

use crate::version::{Release, WeoVersion, candidates};

pub(crate) const PROVIDER: &str = "IMF WEO";

pub const LAST_ACTUAL_YEAR: &str = "last_actual_year";

const ID_COLUMNS: &[&str] = &[
    "WEO Country Code",
    "ISO",
    "WEO Subject Code",
    "Country",
    "Subject Descriptor",
    "Subject Notes",
    "Units",
    "Scale",
    "Country/Series-specific Notes",
    "Estimates Start After",
];

static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(ENTITY_CODE, &["ISO"], Kind::Code).key(),
            ColumnRule::new(ENTITY_NAME, &["Country"], Kind::Text),
            ColumnRule::new(INDICATOR_CODE, &["WEO Subject Code"], Kind::Text).key(),
            ColumnRule::new(INDICATOR_NAME, &["Subject Descriptor"], Kind::Text),
            ColumnRule::new(UNIT, &["Units"], Kind::Text),
            ColumnRule::new(SCALE, &["Scale"], Kind::Text),
            ColumnRule::new(YEAR, &["year"], Kind::Year).key(),
            ColumnRule::new(VALUE, &["value"], Kind::Float),
            ColumnRule::new(NOTES, &["Country/Series-specific Notes"], Kind::Text).optional(),
            ColumnRule::new(LAST_ACTUAL_YEAR, &["Estimates Start After"], Kind::Year).optional(),
        ],
    )
    .resolve_entities(ENTITY_CODE, Some(ENTITY_NAME), EntityMatch::Canonicalize)
});

/// Harmonized WEO schema
pub fn schema() -> SchemaRef {
    DATA.schema()
}

/// Per-indicator metadata
pub static METADATA: LazyLock<SchemaRef> = LazyLock::new(|| {
    use arrow::datatypes::{DataType, Field, Schema};
    Arc::new(Schema::new(vec![
        Field::new(INDICATOR_CODE, DataType::Utf8, false),
        Field::new(INDICATOR_NAME, DataType::Utf8, true),
        Field::new(UNIT, DataType::Utf8, true),
        Field::new(SCALE, DataType::Utf8, true),
        Field::new(NOTES, DataType::Utf8, true),
    ]))
});

/// WEO importer configuration
#[derive(Debug, Clone)]
pub struct WeoConfig {
    /// Root of the WEO database downloads
    pub base_url: String,
    /// Releases tried when resolving "latest"
    pub max_candidates: usize,
    /// Date used to pick "latest" candidates; today when unset
    pub reference_date: Option<NaiveDate>,
    pub http: HttpConfig,
}

impl Default for WeoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.imf.org/-/media/Files/Publications/WEO/WEO-Database".to_string(),
            max_candidates: 4,
            reference_date: None,
            http: HttpConfig::default(),
        }
    }
}

impl WeoConfig {
    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Download locations of a release, most common layout first.
    pub fn urls(&self, release: Release) -> Vec<String> {
        let file = format!("WEO{}{}all.ashx", release.month.abbrev(), release.year);
        vec![
            format!("{}/{}/{}/{file}", self.base_url, release.year, release.month.name()),
            format!("{}/{}/{file}", self.base_url, release.year),
        ]
    }
}

fn is_year_column(name: &str) -> bool {
    name.len() == 4 && name.parse::<i32>().is_ok_and(|y| y >= 1900)
}

/// Parse a WEO payload into the harmonized long table.
pub fn parse_weo(bytes: &[u8]) -> Result<RecordBatch> {
    let text = decode_text(bytes);
    let wide = RawTable::from_csv(&text, b'\t').map_err(|e| ImportError::format(PROVIDER, e))?;
    if !wide.has_column("WEO Subject Code") || !wide.columns().iter().any(|c| is_year_column(c)) {
        return Err(ImportError::format(
            PROVIDER,
            format!("not a WEO table (columns {:?})", &wide.columns()[..wide.columns().len().min(6)]),
        ));
    }

    let id_vars: Vec<&str> = ID_COLUMNS
        .iter()
        .copied()
        .filter(|c| wide.has_column(c))
        .collect();
    let extra: Vec<&str> = wide
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|c| !c.is_empty() && !is_year_column(c) && !id_vars.iter().any(|v| v.eq_ignore_ascii_case(c)))
        .collect();
    if !extra.is_empty() {
        log::debug!("{PROVIDER}: ignoring columns {extra:?}");
    }

    let mut long = wide
        .melt(&id_vars, "year", "value")
        .map_err(|e| ImportError::format(PROVIDER, e))?;
    let year = long.column_index("year");
    let value = long.column_index("value");
    long.retain_rows(|row| {
        let is_year = year.and_then(|i| row[i].as_str()).is_some_and(|y| is_year_column(&y));
        let has_value = value
            .and_then(|i| row[i].as_str())
            .is_some_and(|v| !is_null_sentinel(&v));
        is_year && has_value
    });
    DATA.apply(&long)
}

/// Distinct indicators of a harmonized WEO table, first occurrence wins.
fn indicator_metadata(data: &RecordBatch) -> Result<RecordBatch> {
    let column = |name: &'static str| {
        string_column(data, name)
            .ok_or_else(|| ImportError::format(PROVIDER, format!("data without '{name}'")))
    };
    let (code, name, unit, scale, notes) = (
        column(INDICATOR_CODE)?,
        column(INDICATOR_NAME)?,
        column(UNIT)?,
        column(SCALE)?,
        column(NOTES)?,
    );

    let mut seen = FxHashSet::default();
    let rows: Vec<usize> = (0..data.num_rows())
        .filter(|&i| seen.insert(code.value(i)))
        .collect();
    let pick = |col: &StringArray| -> ArrayRef {
        Arc::new(
            rows.iter()
                .map(|&i| (!col.is_null(i)).then(|| col.value(i)))
                .collect::<StringArray>(),
        )
    };
    Ok(RecordBatch::try_new(
        METADATA.clone(),
        vec![pick(code), pick(name), pick(unit), pick(scale), pick(notes)],
    )?)
}

/// IMF World Economic Outlook.
///
/// Releases are cached by version; "latest" remembers which release it
/// resolved to, so the lookup runs once per cache lifetime.
pub struct Weo {
    config: WeoConfig,
    client: SourceClient,
    data: KeyedCache<Release, RecordBatch>,
    latest: Option<Release>,
}

impl std::fmt::Debug for Weo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weo")
            .field("cached", &self.data.len())
            .field("latest", &self.latest)
            .finish_non_exhaustive()
    }
}

impl Default for Weo {
    fn default() -> Self {
        Self::new()
    }
}

impl Weo {
    pub fn new() -> Self {
        Self::with_fetcher(WeoConfig::default(), default_fetcher())
    }

    pub fn with_fetcher(config: WeoConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            data: KeyedCache::new(),
            latest: None,
        }
    }

    /// Release that "latest" resolved to, if it has been fetched.
    pub fn latest_release(&self) -> Option<Release> {
        self.latest
    }

    /// Releases currently cached, oldest first.
    pub fn cached_releases(&self) -> Vec<Release> {
        let mut releases: Vec<Release> = self.data.keys().copied().collect();
        releases.sort_unstable();
        releases
    }

    /// Fetch one release; `Ok(None)` when no candidate URL exists.
    fn download(&self, release: Release) -> Result<Option<Vec<u8>>> {
        for url in self.config.urls(release) {
            match self.client.try_fetch(Request::get(url.clone())) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(FetchError::Http { status: Some(404), .. }) => {
                    log::debug!("{PROVIDER}: {release} not at {url}");
                }
                Err(e) => {
                    return Err(ImportError::unavailable(
                        PROVIDER,
                        format!("{url}: {e} (after {} attempts)", self.client.retry_policy().attempts()),
                    ));
                }
            }
        }
        Ok(None)
    }

    fn load(&mut self, release: Release) -> Result<&RecordBatch> {
        if self.data.contains(&release) {
            log::debug!("{PROVIDER}: {release} served from cache");
        } else {
            log::info!("{PROVIDER}: fetching {release}");
            let bytes = self.download(release)?.ok_or_else(|| {
                ImportError::unavailable(PROVIDER, format!("no download found for {release}"))
            })?;
            let batch = parse_weo(&bytes)?;
            log::info!("{PROVIDER}: {release}: {} rows", fmt_num(batch.num_rows()));
            self.data.insert(release, batch);
        }
        self.data
            .get(&release)
            .ok_or_else(|| ImportError::empty(PROVIDER, format!("{release} not cached")))
    }

    /// Try releases newest-first and load the first one published.
    fn resolve_latest(&mut self) -> Result<Release> {
        if let Some(release) = self.latest {
            if self.data.contains(&release) {
                return Ok(release);
            }
        }
        for release in candidates(self.config.today(), self.config.max_candidates) {
            if self.data.contains(&release) {
                self.latest = Some(release);
                return Ok(release);
            }
            let Some(bytes) = self.download(release)? else {
                continue;
            };
            let batch = parse_weo(&bytes)?;
            log::info!("{PROVIDER}: latest release is {release} ({} rows)", fmt_num(batch.num_rows()));
            self.data.insert(release, batch);
            self.latest = Some(release);
            return Ok(release);
        }
        Err(ImportError::unavailable(
            PROVIDER,
            format!(
                "no release found among the last {} candidates",
                self.config.max_candidates
            ),
        ))
    }

    fn resolve(&mut self, version: &WeoVersion) -> Result<Release> {
        match version {
            WeoVersion::Latest => self.resolve_latest(),
            WeoVersion::Release(release) => {
                release.validate(self.config.today())?;
                self.load(*release)?;
                Ok(*release)
            }
        }
    }
}

impl Importer for Weo {
    type Query = WeoVersion;
    type MetadataQuery = WeoVersion;
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    fn schema(&self) -> SchemaRef {
        schema()
    }

    fn get_data(&mut self, version: &WeoVersion) -> Result<RecordBatch> {
        let release = self.resolve(version)?;
        self.load(release).cloned()
    }

    fn get_metadata(&mut self, version: &WeoVersion) -> Result<RecordBatch> {
        let data = self.get_data(version)?;
        indicator_metadata(&data)
    }

    fn clear_cache(&mut self) {
        self.data.clear();
        self.latest = None;
        log::info!("{PROVIDER}: cache cleared");
    }
}
