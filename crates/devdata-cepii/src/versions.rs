//! Release discovery from the BACI web page.
//!
//! The page has a `Download` box announcing the current release ("This is the
//! 202501 version") with its HS classifications, and an `Archives` box listing
//! older releases as `202401b version:` blocks.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use devdata_core::{ImportError, Result};
use regex::Regex;
use scraper::{Html, Selector};

use crate::baci::PROVIDER;

/// HS classifications of one release, e.g. `["HS22", "HS17"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub hs_versions: Vec<String>,
    pub latest: bool,
}

/// Release code (`"202501"`, `"202401b"`) -> info
pub type Versions = BTreeMap<String, VersionInfo>;

static SECTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.content_box").expect("valid selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.titre-rubrique").expect("valid selector"));

static LATEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)This is the\s+(\d{6}[a-z]?)\s+version").expect("valid regex"));
static ARCHIVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{6}[a-z]?)\s+version:").expect("valid regex"));
static HS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"HS(\d{2})").expect("valid regex"));

/// Text of the `div.content_box` titled `title` (exact, case-sensitive).
fn section_text(document: &Html, title: &str) -> Result<String> {
    document
        .select(&SECTION)
        .find(|section| {
            section
                .select(&TITLE)
                .next()
                .is_some_and(|t| t.text().collect::<String>().trim() == title)
        })
        .map(|section| section.text().collect::<Vec<_>>().join(" "))
        .ok_or_else(|| ImportError::format(PROVIDER, format!("section '{title}' not found on the BACI page")))
}

/// Distinct `HSxx` codes in order of appearance.
fn hs_codes(text: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for cap in HS.captures_iter(text) {
        let code = format!("HS{}", &cap[1]);
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

fn parse_latest(text: &str) -> Result<(String, VersionInfo)> {
    let cap = LATEST
        .captures(text)
        .ok_or_else(|| ImportError::format(PROVIDER, "latest BACI version could not be found"))?;
    let hs_versions = hs_codes(&text[cap.get(0).map_or(0, |m| m.end())..]);
    if hs_versions.is_empty() {
        return Err(ImportError::format(PROVIDER, "No HS versions listed for the latest BACI version"));
    }
    Ok((
        cap[1].to_string(),
        VersionInfo {
            hs_versions,
            latest: true,
        },
    ))
}

fn parse_archived(text: &str) -> Result<Versions> {
    let marks: Vec<(String, usize, usize)> = ARCHIVED
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some((cap[1].to_string(), whole.start(), whole.end()))
        })
        .collect();
    if marks.is_empty() {
        return Err(ImportError::format(PROVIDER, "No archive BACI versions found"));
    }

    let mut versions = Versions::new();
    for (i, (version, _, block_start)) in marks.iter().enumerate() {
        let block_end = marks.get(i + 1).map_or(text.len(), |next| next.1);
        versions.insert(
            version.clone(),
            VersionInfo {
                hs_versions: hs_codes(&text[*block_start..block_end]),
                latest: false,
            },
        );
    }
    Ok(versions)
}

/// Parse every release the page lists.
pub fn parse_versions(html: &str) -> Result<Versions> {
    let document = Html::parse_document(html);
    let (latest, info) = parse_latest(&section_text(&document, "Download")?)?;
    let mut versions = parse_archived(&section_text(&document, "Archives")?)?;
    versions.insert(latest, info);
    Ok(versions)
}

/// The release flagged as current.
pub fn latest(versions: &Versions) -> Option<&str> {
    versions
        .iter()
        .find(|(_, info)| info.latest)
        .map(|(version, _)| version.as_str())
}

/// `"22"`, `"hs22"` and `"HS22"` all mean `"HS22"`.
pub fn normalize_hs(hs: &str) -> String {
    let hs = hs.trim();
    let digits = hs
        .strip_prefix("HS")
        .or_else(|| hs.strip_prefix("hs"))
        .unwrap_or(hs);
    format!("HS{digits}")
}

/// Resolve `"latest"` and check the pair exists. Returns `(hs, version)`.
pub fn resolve(versions: &Versions, hs_version: &str, baci_version: &str) -> Result<(String, String)> {
    let version = if baci_version.trim().eq_ignore_ascii_case("latest") {
        latest(versions)
            .ok_or_else(|| ImportError::format(PROVIDER, "no release is flagged as latest"))?
            .to_string()
    } else {
        baci_version.trim().to_string()
    };
    let info = versions.get(&version).ok_or_else(|| {
        ImportError::invalid(format!(
            "BACI version '{version}' is not available. Available versions: {}",
            versions.keys().cloned().collect::<Vec<_>>().join(", ")
        ))
    })?;
    let hs = normalize_hs(hs_version);
    if !info.hs_versions.contains(&hs) {
        return Err(ImportError::invalid(format!(
            "{hs} is not available for BACI version {version}. Available: {}",
            info.hs_versions.join(", ")
        )));
    }
    Ok((hs, version))
}
