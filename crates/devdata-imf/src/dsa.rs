//! IMF list of LIC debt sustainability analyses (DSA)
//!
//! The list is published as a one-page PDF table. Text is extracted with
//! `pdf-extract` and each table line is matched with a regex.

use std::sync::{Arc, LazyLock};

use arrow::array::{RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use chrono::NaiveDate;
use devdata_core::fields::{COUNTRY_NAME, ISO3_CODE};
use devdata_core::{
    CacheSlot, Cell, ColumnRule, EntityMatch, Fetcher, Harmonizer, HttpConfig, ImportError,
    Importer, Kind, RawTable, Request, Result, SourceClient, default_fetcher,
};
use regex::Regex;

pub(crate) const PROVIDER: &str = "IMF DSA";

pub const DSA_URL: &str = "https://www.imf.org/external/Pubs/ft/dsa/DSAlist.pdf";

pub const LATEST_PUBLICATION: &str = "latest_publication";
pub const RISK_OF_DEBT_DISTRESS: &str = "risk_of_debt_distress";
pub const DEBT_SUSTAINABILITY: &str = "debt_sustainability";
pub const JOINT_WITH_WB: &str = "joint_with_wb";
pub const LATEST_DSA_DISCUSSED: &str = "latest_dsa_discussed";

static FOOTNOTE_TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\d+/\s*$").expect("invalid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex"));

const DATE: &str = r"\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}-[A-Za-z]{3}-\d{2,4}";

/// `[#] country [n/] date risk [extra] sustainability [n/] Yes|No [date]`
static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:\d+\.?\s+)?(?P<country>[^\d].*?)\s+(?P<published>{DATE})\s+(?P<risk>in\s+debt\s+distress|low|moderate|high)(?:\s+\S+)*?\s+(?P<sustainability>sustainable|unsustainable)(?:\s*\d+/)?\s+(?P<joint>yes|no)(?:\s+(?P<discussed>{DATE}))?\s*$"
    ))
    .expect("invalid regex")
});

static DATA: LazyLock<Harmonizer> = LazyLock::new(|| {
    Harmonizer::new(
        PROVIDER,
        vec![
            ColumnRule::new(ISO3_CODE, &[ISO3_CODE], Kind::Code).optional(),
            ColumnRule::new(COUNTRY_NAME, &["country"], Kind::Text).key(),
            ColumnRule::new(LATEST_PUBLICATION, &["published"], Kind::Date("%Y-%m-%d")),
            ColumnRule::new(RISK_OF_DEBT_DISTRESS, &["risk"], Kind::Text),
            ColumnRule::new(DEBT_SUSTAINABILITY, &["sustainability"], Kind::Text),
            ColumnRule::new(JOINT_WITH_WB, &["joint"], Kind::Bool),
            ColumnRule::new(LATEST_DSA_DISCUSSED, &["discussed"], Kind::Date("%Y-%m-%d")).optional(),
        ],
    )
    .resolve_entities(ISO3_CODE, Some(COUNTRY_NAME), EntityMatch::Canonicalize)
});

pub fn schema() -> SchemaRef {
    DATA.schema()
}

/// Remove a trailing footnote marker such as `"  3/"`.
pub fn strip_footnote_trailer(s: &str) -> String {
    FOOTNOTE_TRAILER.replace(s, "").trim().to_string()
}

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Canonical casing of a risk rating; unknown labels pass through.
pub fn normalize_risk(s: &str) -> String {
    let s = collapse(s);
    match s.to_ascii_lowercase().as_str() {
        "in debt distress" => "In debt distress".to_string(),
        "low" => "Low".to_string(),
        "moderate" => "Moderate".to_string(),
        "high" => "High".to_string(),
        _ => s,
    }
}

pub fn normalize_sustainability(s: &str) -> String {
    let s = strip_footnote_trailer(s);
    match s.to_ascii_lowercase().as_str() {
        "sustainable" => "Sustainable".to_string(),
        "unsustainable" => "Unsustainable".to_string(),
        _ => s,
    }
}

/// Dates appear as `1/15/2024`, `2024-01-15`, `January 15, 2024` or `15-Jan-24`.
pub fn parse_publication_date(s: &str) -> Option<NaiveDate> {
    let s = collapse(s).replace('.', "");
    ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%B %d, %Y", "%B %d %Y", "%b %d, %Y", "%b %d %Y", "%d-%b-%y", "%d-%b-%Y"]
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(&s, f).ok())
}

fn iso_date(s: Option<&str>) -> Cell {
    s.and_then(parse_publication_date)
        .map(|d| Cell::text(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Cell::Empty)
}

/// Extract table rows from the PDF text. Lines that are not table rows
/// (titles, headers, footnotes) are skipped.
pub fn parse_dsa_text(text: &str) -> Result<RecordBatch> {
    let columns = ["country", "published", "risk", "sustainability", "joint", "discussed"];
    let mut raw = RawTable::new(columns.iter().map(|c| c.to_string()).collect(), Vec::new());
    for line in text.lines() {
        let Some(caps) = ROW.captures(line) else {
            continue;
        };
        let get = |name| caps.name(name).map(|m| m.as_str());
        raw.push_row(vec![
            get("country").map(|c| Cell::text(strip_footnote_trailer(c))).unwrap_or(Cell::Empty),
            iso_date(get("published")),
            get("risk").map(|r| Cell::text(normalize_risk(r))).unwrap_or(Cell::Empty),
            get("sustainability")
                .map(|s| Cell::text(normalize_sustainability(s)))
                .unwrap_or(Cell::Empty),
            get("joint")
                .map(|j| Cell::Bool(j.eq_ignore_ascii_case("yes")))
                .unwrap_or(Cell::Empty),
            iso_date(get("discussed")),
        ]);
    }
    if raw.is_empty() {
        return Err(ImportError::format(PROVIDER, "no DSA rows found in the PDF text"));
    }
    log::debug!("{PROVIDER}: {} table rows", raw.num_rows());
    DATA.apply(&raw)
}

pub fn pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ImportError::format(PROVIDER, format!("could not read PDF: {e}")))
}

/// DSA importer configuration
#[derive(Debug, Clone)]
pub struct DsaConfig {
    pub url: String,
    pub http: HttpConfig,
}

impl Default for DsaConfig {
    fn default() -> Self {
        Self {
            url: DSA_URL.to_string(),
            http: HttpConfig::default(),
        }
    }
}

/// Latest IMF LIC DSA list, one row per country.
pub struct Dsa {
    config: DsaConfig,
    client: SourceClient,
    data: CacheSlot<RecordBatch>,
}

impl std::fmt::Debug for Dsa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dsa")
            .field("url", &self.config.url)
            .field("cached", &self.data.is_cached())
            .finish_non_exhaustive()
    }
}

impl Default for Dsa {
    fn default() -> Self {
        Self::new()
    }
}

impl Dsa {
    pub fn new() -> Self {
        Self::with_fetcher(DsaConfig::default(), default_fetcher())
    }

    pub fn with_fetcher(config: DsaConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            config,
            client,
            data: CacheSlot::new(),
        }
    }
}

/// Description of the DSA list as `field, value` rows.
pub static METADATA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("field", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]))
});

impl Importer for Dsa {
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
        let (client, url) = (&self.client, &self.config.url);
        self.data
            .get_or_try_insert_with(|| {
                log::info!("{PROVIDER}: fetching {url}");
                let request = Request::get(url.clone())
                    .header("User-Agent", "devdata importers")
                    .header("Accept", "application/pdf");
                let bytes = client.fetch(request)?;
                parse_dsa_text(&pdf_text(&bytes)?)
            })
            .cloned()
    }

    fn get_metadata(&mut self, _query: &()) -> Result<RecordBatch> {
        let fields = ["source", "url", "description"];
        let values = [
            "International Monetary Fund",
            self.config.url.as_str(),
            "List of LIC DSAs for PRGT-eligible countries: latest publication, risk of debt distress and debt sustainability",
        ];
        Ok(RecordBatch::try_new(
            METADATA.clone(),
            vec![
                Arc::new(StringArray::from(fields.to_vec())),
                Arc::new(StringArray::from(values.to_vec())),
            ],
        )?)
    }

    fn clear_cache(&mut self) {
        self.data.clear();
        log::info!("{PROVIDER}: cache cleared");
    }
}
