//! Countries covered by WFP.
//!
//! The HungerMap country list is fetched once per process and shared by every
//! WFP importer. `clear_cache` on any WFP importer (or [`clear_countries`])
//! drops it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use devdata_core::{ImportError, Request, Result, SourceClient, resolve_code, resolve_entity};
use serde_json::Value;

use crate::config::{HUNGERMAP_REFERRER, WfpConfig};

/// One WFP country
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfpCountry {
    /// HungerMap/VAM admin-0 code
    pub adm0_code: i64,
    /// HungerMap food-security data type; `None` when no series is published
    pub data_type: Option<String>,
    pub name: String,
}

/// ISO3 code -> country
pub type CountryMap = BTreeMap<String, WfpCountry>;

static COUNTRIES: Mutex<Option<Arc<CountryMap>>> = Mutex::new(None);

fn shared() -> std::sync::MutexGuard<'static, Option<Arc<CountryMap>>> {
    COUNTRIES.lock().unwrap_or_else(|e| e.into_inner())
}

/// Parse `body.features[].properties.{iso3, adm0_id, dataType}`.
pub fn parse_countries(provider: &'static str, body: &Value) -> Result<CountryMap> {
    let features = body
        .pointer("/body/features")
        .and_then(Value::as_array)
        .ok_or_else(|| ImportError::format(provider, "country list has no body.features"))?;

    let mut countries = CountryMap::new();
    for feature in features {
        let Some(props) = feature.get("properties") else {
            continue;
        };
        let (Some(iso3), Some(adm0)) = (
            props.get("iso3").and_then(Value::as_str),
            props.get("adm0_id").and_then(Value::as_i64),
        ) else {
            continue;
        };
        let iso3 = iso3.trim().to_ascii_uppercase();
        let name = resolve_entity(&iso3)
            .map(|e| e.name.to_string())
            .unwrap_or_else(|| iso3.clone());
        let data_type = props
            .get("dataType")
            .and_then(Value::as_str)
            .map(str::to_string);
        countries.insert(
            iso3,
            WfpCountry {
                adm0_code: adm0,
                data_type,
                name,
            },
        );
    }
    if countries.is_empty() {
        return Err(ImportError::format(provider, "country list is empty"));
    }
    Ok(countries)
}

/// The shared country list, fetching it with `client` when absent.
pub(crate) fn countries(client: &SourceClient, config: &WfpConfig) -> Result<Arc<CountryMap>> {
    if let Some(map) = shared().as_ref() {
        return Ok(Arc::clone(map));
    }
    log::info!("{}: fetching country list", client.provider());
    let request = Request::get(config.countries_url()).header("referrer", HUNGERMAP_REFERRER);
    let body: Value = client.fetch_json(request)?;
    let map = Arc::new(parse_countries(client.provider(), &body)?);
    *shared() = Some(Arc::clone(&map));
    Ok(map)
}

/// Forget the shared country list.
pub fn clear_countries() {
    *shared() = None;
}

/// Resolve country names or codes to unique ISO3 codes, in request order.
///
/// Unrecognized inputs are skipped with a warning; if none resolve the
/// request is invalid.
pub fn resolve_countries(provider: &'static str, countries: &[String]) -> Result<Vec<String>> {
    let mut codes: Vec<String> = Vec::with_capacity(countries.len());
    for country in countries {
        match resolve_code(country) {
            Some(code) if !codes.iter().any(|c| c == code) => codes.push(code.to_string()),
            Some(_) => {}
            None => log::warn!("{provider}: unrecognized country '{country}'"),
        }
    }
    if codes.is_empty() {
        return Err(ImportError::invalid(format!("No valid countries found in {countries:?}")));
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_feature_properties() {
        let body = json!({"body": {"features": [
            {"properties": {"iso3": "VEN", "adm0_id": 1, "dataType": null}},
            {"properties": {"iso3": "LBN", "adm0_id": 2, "dataType": "ACTUAL DATA"}},
            {"properties": {"adm0_id": 3}}
        ]}});
        let countries = parse_countries("WFP", &body).unwrap();
        assert_eq!(countries.len(), 2);
        assert_eq!(countries["VEN"].adm0_code, 1);
        assert_eq!(countries["VEN"].data_type, None);
        assert_eq!(countries["LBN"].data_type.as_deref(), Some("ACTUAL DATA"));
        assert_eq!(countries["LBN"].name, "Lebanon");
    }

    #[test]
    fn unexpected_shape_is_data_format() {
        let err = parse_countries("WFP", &json!({"features": []})).unwrap_err();
        assert!(matches!(err, ImportError::DataFormat { .. }));
    }

    #[test]
    fn names_and_codes_resolve_once() {
        let input = ["Kenya".to_string(), "KEN".to_string(), "Atlantis".to_string(), "uga".to_string()];
        assert_eq!(resolve_countries("WFP", &input).unwrap(), ["KEN", "UGA"]);

        let err = resolve_countries("WFP", &["Atlantis".to_string()]).unwrap_err();
        assert!(err.to_string().contains("No valid countries found"));
    }
}
