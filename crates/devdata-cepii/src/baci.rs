//! BACI importer

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayRef, RecordBatch, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use devdata_core::fields::*;
use devdata_core::progress::fmt_num;
use devdata_core::{
    CacheSlot, DiskCache, Fetcher, HttpConfig, ImportError, Importer, KeyedCache, Request, Result,
    Settings, SharedProgress, SourceClient, concat, default_fetcher, global_progress,
};

use crate::filter::Filter;
use crate::release::{BaciRelease, FLOWS, LoadedRelease, entry_key, int64_values};
use crate::versions::{self, Versions};

pub(crate) const PROVIDER: &str = "CEPII BACI";

pub const PAGE_URL: &str = "https://www.cepii.fr/CEPII/en/bdd_modele/bdd_modele_item.asp?id=37";
pub const DOWNLOAD_URL: &str = "https://www.cepii.fr/DATA_DOWNLOAD/baci/data";

/// BACI importer configuration
#[derive(Debug, Clone)]
pub struct BaciConfig {
    pub page_url: String,
    /// Directory holding `BACI_<HS>_V<version>.zip` archives
    pub download_url: String,
    /// Shared Parquet cache; `None` uses a temporary directory owned by the importer
    pub cache_dir: Option<PathBuf>,
    pub http: HttpConfig,
}

impl Default for BaciConfig {
    fn default() -> Self {
        Self {
            page_url: PAGE_URL.to_string(),
            download_url: DOWNLOAD_URL.to_string(),
            cache_dir: None,
            http: HttpConfig {
                timeout_secs: 1800,
                ..HttpConfig::default()
            },
        }
    }
}

impl BaciConfig {
    /// Network settings and cache directory from the shared settings. The
    /// timeout never drops below the default, archives are several gigabytes.
    pub fn from_settings(settings: &Settings) -> Self {
        let default = Self::default();
        Self {
            cache_dir: settings.cache.dir.clone(),
            http: HttpConfig {
                timeout_secs: settings.http.timeout_secs.max(default.http.timeout_secs),
                ..settings.http.clone()
            },
            ..default
        }
    }

    pub fn archive_url(&self, hs_version: &str, version: &str) -> String {
        format!("{}/{}.zip", self.download_url, entry_key(hs_version, version))
    }
}

/// Trade flow query. Filters are applied while scanning; labels are joined
/// from the release's code lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaciQuery {
    pub release: BaciRelease,
    pub years: Option<Filter>,
    pub products: Option<Filter>,
    /// Add exporter/importer names and ISO3 codes
    pub incl_country_labels: bool,
    /// Add product descriptions
    pub incl_product_labels: bool,
}

impl BaciQuery {
    pub fn years(mut self, years: impl Into<Filter>) -> Self {
        self.years = Some(years.into());
        self
    }

    pub fn products(mut self, products: impl Into<Filter>) -> Self {
        self.products = Some(products.into());
        self
    }

    pub fn with_labels(mut self) -> Self {
        self.incl_country_labels = true;
        self.incl_product_labels = true;
        self
    }
}

/// Output schema for a combination of label flags.
///
/// `year, exporter_code, [exporter_iso3_code, exporter_name], importer_code,
/// [importer_iso3_code, importer_name], product_code, [product_description],
/// value, quantity`
pub fn output_schema(country_labels: bool, product_labels: bool) -> SchemaRef {
    static SCHEMAS: LazyLock<[SchemaRef; 4]> = LazyLock::new(|| {
        [
            build_schema(false, false),
            build_schema(false, true),
            build_schema(true, false),
            build_schema(true, true),
        ]
    });
    SCHEMAS[usize::from(country_labels) * 2 + usize::from(product_labels)].clone()
}

fn build_schema(country_labels: bool, product_labels: bool) -> SchemaRef {
    let flows = FLOWS.clone();
    let field = |name: &str| flows.field_with_name(name).cloned().ok();
    let label = |name: &str| Field::new(name, DataType::Utf8, true);

    let mut fields: Vec<Field> = Vec::new();
    fields.extend(field(YEAR));
    fields.extend(field(EXPORTER_CODE));
    if country_labels {
        fields.extend([label(EXPORTER_ISO3_CODE), label(EXPORTER_NAME)]);
    }
    fields.extend(field(IMPORTER_CODE));
    if country_labels {
        fields.extend([label(IMPORTER_ISO3_CODE), label(IMPORTER_NAME)]);
    }
    fields.extend(field(PRODUCT_CODE));
    if product_labels {
        fields.push(label(PRODUCT_DESCRIPTION));
    }
    fields.extend(field(VALUE));
    fields.extend(field(QUANTITY));
    Arc::new(Schema::new(fields))
}

/// Add the requested label columns to a batch of flows.
fn label_flows(
    batch: &RecordBatch,
    release: &LoadedRelease,
    country_labels: bool,
    product_labels: bool,
) -> Result<RecordBatch> {
    let schema = output_schema(country_labels, product_labels);
    if !country_labels && !product_labels {
        return Ok(RecordBatch::try_new(schema, batch.columns().to_vec())?);
    }

    let mut labels: BTreeMap<&str, ArrayRef> = BTreeMap::new();
    if country_labels {
        let countries = release.country_labels();
        for (code_column, iso3_column, name_column) in [
            (EXPORTER_CODE, EXPORTER_ISO3_CODE, EXPORTER_NAME),
            (IMPORTER_CODE, IMPORTER_ISO3_CODE, IMPORTER_NAME),
        ] {
            let mut iso3 = StringBuilder::new();
            let mut names = StringBuilder::new();
            for code in int64_values(batch, code_column) {
                let found = code.and_then(|c| countries.get(&c));
                iso3.append_option(found.and_then(|(_, iso3)| iso3.as_deref()));
                names.append_option(found.and_then(|(name, _)| name.as_deref()));
            }
            labels.insert(iso3_column, Arc::new(iso3.finish()));
            labels.insert(name_column, Arc::new(names.finish()));
        }
    }
    if product_labels {
        let products = release.product_labels();
        let mut descriptions = StringBuilder::new();
        for code in int64_values(batch, PRODUCT_CODE) {
            descriptions.append_option(code.and_then(|c| products.get(&c)));
        }
        labels.insert(PRODUCT_DESCRIPTION, Arc::new(descriptions.finish()));
    }

    let columns = schema
        .fields()
        .iter()
        .map(|f| {
            let name = f.name().as_str();
            labels
                .get(name)
                .cloned()
                .or_else(|| batch.column_by_name(name).cloned())
                .ok_or_else(|| ImportError::format(PROVIDER, format!("stored flows lack column '{name}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Importer for the CEPII BACI trade database.
///
/// Loaded releases live in a disk cache: a private temporary directory
/// (removed when the importer is dropped) unless `cache_dir` is set. The
/// directory is created on first load, not at construction.
pub struct Baci {
    config: BaciConfig,
    client: SourceClient,
    progress: SharedProgress,
    versions: CacheSlot<Versions>,
    disk: CacheSlot<DiskCache>,
    releases: KeyedCache<(String, String), LoadedRelease>,
}

impl std::fmt::Debug for Baci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Baci")
            .field("versions_cached", &self.versions.is_cached())
            .field("releases", &self.releases.len())
            .finish_non_exhaustive()
    }
}

impl Default for Baci {
    fn default() -> Self {
        Self::new()
    }
}

impl Baci {
    pub fn new() -> Self {
        Self::with_fetcher(BaciConfig::default(), default_fetcher())
    }

    pub fn with_fetcher(config: BaciConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            progress: global_progress(),
            versions: CacheSlot::new(),
            disk: CacheSlot::new(),
            releases: KeyedCache::new(),
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Releases listed on the BACI page, scraped once per instance.
    pub fn available_versions(&mut self) -> Result<&Versions> {
        let (client, url) = (&self.client, &self.config.page_url);
        self.versions.get_or_try_insert_with(|| {
            log::info!("{PROVIDER}: reading available versions");
            let html = client.fetch(Request::get(url.clone()))?;
            versions::parse_versions(&String::from_utf8_lossy(&html))
        })
    }

    /// Release code flagged as current.
    pub fn latest_version(&mut self) -> Result<String> {
        versions::latest(self.available_versions()?)
            .map(str::to_string)
            .ok_or_else(|| ImportError::format(PROVIDER, "no release is flagged as latest"))
    }

    fn resolve(&mut self, release: &BaciRelease) -> Result<(String, String)> {
        versions::resolve(self.available_versions()?, &release.hs_version, &release.baci_version)
    }

    /// Load (download and convert) a release unless already loaded.
    pub fn load_release(&mut self, release: &BaciRelease) -> Result<&LoadedRelease> {
        let (hs, version) = self.resolve(release)?;
        let Self {
            config,
            client,
            progress,
            disk,
            releases,
            ..
        } = self;
        releases.get_or_try_insert_with((hs.clone(), version.clone()), || {
            let disk = disk.get_or_try_insert_with(|| -> Result<DiskCache> {
                Ok(match &config.cache_dir {
                    Some(dir) => DiskCache::at(dir)?,
                    None => DiskCache::temporary("devdata-baci")?,
                })
            })?;
            if let Some(loaded) = LoadedRelease::from_cache(disk, &hs, &version) {
                return Ok(loaded);
            }
            let url = config.archive_url(&hs, &version);
            LoadedRelease::download(client, disk, &**progress, &url, &hs, &version)
        })
    }

    /// Years with data in a release, ascending.
    pub fn available_years(&mut self, release: &BaciRelease) -> Result<Vec<i32>> {
        Ok(self.load_release(release)?.years().to_vec())
    }

    /// Country code list of a release: `country_code, country_name, iso3_code, iso2_code`.
    pub fn available_countries(&mut self, release: &BaciRelease) -> Result<RecordBatch> {
        Ok(self.load_release(release)?.countries().clone())
    }

    /// Product code list of a release: `product_code, product_description`.
    pub fn product_descriptions(&mut self, release: &BaciRelease) -> Result<RecordBatch> {
        Ok(self.load_release(release)?.products().clone())
    }

    /// Copy the release archive to `path`.
    ///
    /// `path` must name a `.zip` file in an existing directory; an existing
    /// file is replaced only with `overwrite`.
    pub fn save_raw_data(&mut self, release: &BaciRelease, path: &Path, overwrite: bool) -> Result<PathBuf> {
        if !path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        {
            return Err(ImportError::invalid(format!(
                "{} must include a file name with a .zip extension",
                path.display()
            )));
        }
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = parent {
            if !dir.is_dir() {
                return Err(ImportError::invalid(format!("directory {} does not exist", dir.display())));
            }
        }
        if path.exists() && !overwrite {
            return Err(ImportError::invalid(format!(
                "{} already exists; pass overwrite to replace it",
                path.display()
            )));
        }

        let source = self.load_release(release)?.zip_path().to_path_buf();
        fs::copy(&source, path)?;
        log::info!("{PROVIDER}: raw data saved to {}", path.display());
        Ok(path.to_path_buf())
    }
}

impl Importer for Baci {
    type Query = BaciQuery;
    type MetadataQuery = BaciRelease;
    type Metadata = BTreeMap<String, String>;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    /// Schema without label columns.
    fn schema(&self) -> SchemaRef {
        output_schema(false, false)
    }

    fn get_data(&mut self, query: &BaciQuery) -> Result<RecordBatch> {
        if let Some(years) = &query.years {
            years.validate("years")?;
        }
        if let Some(products) = &query.products {
            products.validate("products")?;
        }

        let loaded = self.load_release(&query.release)?;
        if let Some(requested) = query.years.as_ref().and_then(Filter::listed) {
            let missing: Vec<i64> = requested
                .into_iter()
                .filter(|y| !loaded.years().iter().any(|&a| i64::from(a) == *y))
                .collect();
            if !missing.is_empty() {
                log::warn!(
                    "{PROVIDER}: years {missing:?} not in {} {}; available {:?}",
                    loaded.hs_version,
                    loaded.version,
                    loaded.years()
                );
            }
        }

        let flows = loaded.scan(query.years.as_ref(), query.products.as_ref())?;
        let labelled = flows
            .iter()
            .map(|b| label_flows(b, loaded, query.incl_country_labels, query.incl_product_labels))
            .collect::<Result<Vec<_>>>()?;
        let schema = output_schema(query.incl_country_labels, query.incl_product_labels);
        let batch = concat(&schema, &labelled)?;
        log::info!("{PROVIDER}: {} rows", fmt_num(batch.num_rows()));
        Ok(batch)
    }

    fn get_metadata(&mut self, release: &BaciRelease) -> Result<BTreeMap<String, String>> {
        Ok(self.load_release(release)?.metadata().clone())
    }

    /// Forget loaded releases and scraped versions, deleting their Parquet files.
    fn clear_cache(&mut self) {
        if let Some(disk) = self.disk.get() {
            for (hs, version) in self.releases.keys() {
                if let Err(e) = disk.remove(&entry_key(hs, version)) {
                    log::warn!("{PROVIDER}: could not delete cached {hs} {version}: {e}");
                }
            }
        }
        self.releases.clear();
        self.versions.clear();
        log::info!("{PROVIDER}: cache cleared");
    }
}
