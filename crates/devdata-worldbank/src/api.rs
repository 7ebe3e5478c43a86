//! World Bank sources API: request builders and JSON walkers

use std::ops::RangeInclusive;

use devdata_core::{Cell, ImportError, RawTable, Request, Result, SourceClient};
use serde_json::Value;

use crate::config::Config;
use crate::ids::counterpart_entity;
use crate::query::ResolvedQuery;

pub(crate) const PROVIDER: &str = "World Bank";

/// Explicit year lists longer than this are requested as `all`.
const MAX_PATH_YEARS: usize = 60;

pub(crate) const COL_COUNTRY_CODE: &str = "CountryCode";
pub(crate) const COL_COUNTRY_NAME: &str = "CountryName";
pub(crate) const COL_SERIES_CODE: &str = "SeriesCode";
pub(crate) const COL_SERIES_NAME: &str = "SeriesName";
pub(crate) const COL_YEAR: &str = "Year";
pub(crate) const COL_COUNTERPART_CODE: &str = "CounterpartCode";
pub(crate) const COL_COUNTERPART_NAME: &str = "CounterpartName";
pub(crate) const COL_COUNTERPART_ENTITY: &str = "CounterpartEntity";
pub(crate) const COL_VALUE: &str = "Val";

fn year_span(range: &RangeInclusive<i32>) -> usize {
    let span = i64::from(*range.end()) - i64::from(*range.start()) + 1;
    usize::try_from(span).unwrap_or(0)
}

/// Build the series data URL for one batch of indicators (page excluded).
pub(crate) fn data_request(
    config: &Config,
    indicators: &[String],
    query: &ResolvedQuery,
    counterparts: bool,
) -> Request {
    let entities = match &query.entities {
        Some(codes) => codes.join(";"),
        None => "all".to_string(),
    };
    let time = match &query.time {
        Some(range) if year_span(range) <= MAX_PATH_YEARS => range
            .clone()
            .map(|y| format!("YR{y}"))
            .collect::<Vec<_>>()
            .join(";"),
        _ => "all".to_string(),
    };
    let mut url = format!(
        "{}/sources/{}/series/{}/country/{entities}/time/{time}",
        config.base_url,
        config.database,
        indicators.join(";"),
    );
    if counterparts {
        url.push_str("/counterpart-area/all");
    }

    let mut request = Request::get(url)
        .query("format", "json")
        .query("per_page", config.per_page);
    request = match query.most_recent {
        Some(crate::MostRecent::Values(n)) => request.query("mrv", n),
        Some(crate::MostRecent::NonEmpty(n)) => request.query("mrnev", n),
        None => request,
    };
    request
}

/// The API reports bad parameters as `[{"message": [{"id", "key", "value"}]}]`.
pub(crate) fn check_api_message(body: &Value) -> Result<()> {
    let Some(first) = body.as_array().and_then(|a| a.first()) else {
        return Ok(());
    };
    let Some(messages) = first.get("message").and_then(Value::as_array) else {
        return Ok(());
    };
    let text: Vec<String> = messages
        .iter()
        .map(|m| {
            let key = m.get("key").and_then(Value::as_str).unwrap_or("error");
            let value = m.get("value").and_then(Value::as_str).unwrap_or("");
            format!("{key}: {value}")
        })
        .collect();
    Err(ImportError::invalid(format!(
        "{PROVIDER} API rejected the request: {}",
        text.join("; ")
    )))
}

/// `pages` arrives as a number or a numeric string depending on the endpoint.
fn number(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The `source` member is an object for one database and an array otherwise.
fn sources(body: &Value) -> Vec<&Value> {
    match body.get("source") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

fn data_columns(counterparts: bool) -> Vec<String> {
    let mut columns = vec![
        COL_COUNTRY_CODE,
        COL_COUNTRY_NAME,
        COL_SERIES_CODE,
        COL_SERIES_NAME,
        COL_YEAR,
    ];
    if counterparts {
        columns.extend([COL_COUNTERPART_CODE, COL_COUNTERPART_NAME, COL_COUNTERPART_ENTITY]);
    }
    columns.push(COL_VALUE);
    columns.into_iter().map(String::from).collect()
}

/// Append the observations of one data page to `table`; returns the page count.
pub(crate) fn parse_data_page(body: &Value, table: &mut RawTable, counterparts: bool) -> Result<u64> {
    check_api_message(body)?;
    if body.get("source").is_none() {
        return Err(ImportError::format(PROVIDER, "response has no 'source' member"));
    }
    let pages = number(body.get("pages")).unwrap_or(1);

    for source in sources(body) {
        let Some(observations) = source.get("data").and_then(Value::as_array) else {
            continue;
        };
        for obs in observations {
            let variables = obs
                .get("variable")
                .and_then(Value::as_array)
                .ok_or_else(|| ImportError::format(PROVIDER, "observation without 'variable'"))?;

            let mut country = None;
            let mut series = None;
            let mut time = None;
            let mut counterpart = None;
            for var in variables {
                let id = var.get("id").and_then(Value::as_str).unwrap_or("");
                let label = var.get("value").and_then(Value::as_str).unwrap_or("");
                match var.get("concept").and_then(Value::as_str) {
                    Some("Country" | "Economy") => country = Some((id, label)),
                    Some("Series") => series = Some((id, label)),
                    Some("Time") => time = Some(id),
                    Some("Counterpart-Area") => counterpart = Some((id, label)),
                    _ => {}
                }
            }
            let (Some((country_id, country_name)), Some((series_id, series_name)), Some(time)) =
                (country, series, time)
            else {
                return Err(ImportError::format(
                    PROVIDER,
                    "observation lacks a Country, Series or Time concept",
                ));
            };

            let year = time.strip_prefix("YR").unwrap_or(time);
            let mut row = vec![
                Cell::text(country_id),
                Cell::text(country_name),
                Cell::text(series_id),
                Cell::text(series_name),
                Cell::text(year),
            ];
            if counterparts {
                let (code, name) = counterpart.unwrap_or(("", ""));
                row.push(Cell::text(code));
                row.push(Cell::text(name));
                row.push(
                    counterpart_entity(code, name)
                        .map(Cell::text)
                        .unwrap_or(Cell::Empty),
                );
            }
            row.push(obs.get("value").map(Cell::from).unwrap_or(Cell::Empty));
            table.push_row(row);
        }
    }
    Ok(pages)
}

/// Fetch every page of one batch into a raw table.
pub(crate) fn fetch_data(
    client: &SourceClient,
    config: &Config,
    indicators: &[String],
    query: &ResolvedQuery,
    counterparts: bool,
) -> Result<RawTable> {
    let base = data_request(config, indicators, query, counterparts);
    let mut table = RawTable::new(data_columns(counterparts), Vec::new());
    let mut page = 1u64;
    loop {
        let body: Value = client.fetch_json(base.clone().query("page", page))?;
        let pages = parse_data_page(&body, &mut table, counterparts)?;
        if page >= pages {
            break;
        }
        page += 1;
    }
    log::debug!(
        "{PROVIDER}: {} rows for {} in {page} page(s)",
        table.num_rows(),
        indicators.join(";")
    );
    Ok(table)
}

/// Fetch a `[meta, rows]` list endpoint, following pages.
pub(crate) fn fetch_list(client: &SourceClient, config: &Config, path: &str) -> Result<Vec<Value>> {
    let mut rows = Vec::new();
    let mut page = 1u64;
    loop {
        let request = Request::get(format!("{}/{path}", config.base_url))
            .query("format", "json")
            .query("per_page", 1000)
            .query("page", page);
        let body: Value = client.fetch_json(request)?;
        check_api_message(&body)?;
        let (meta, items) = match body.as_array().map(Vec::as_slice) {
            Some([meta, Value::Array(items), ..]) => (meta, items),
            Some([_, Value::Null, ..]) => break,
            _ => {
                return Err(ImportError::format(
                    PROVIDER,
                    format!("unexpected response shape from /{path}"),
                ));
            }
        };
        rows.extend(items.iter().cloned());
        let pages = number(meta.get("pages")).unwrap_or(1);
        if page >= pages {
            break;
        }
        page += 1;
    }
    Ok(rows)
}

/// `concept[] -> variable[]` entries of every source in a body.
fn concept_variables<'a>(body: &'a Value, concept: &str) -> Vec<&'a Value> {
    sources(body)
        .into_iter()
        .filter_map(|s| s.get("concept").and_then(Value::as_array))
        .flatten()
        .filter(|c| c.get("id").and_then(Value::as_str) == Some(concept))
        .filter_map(|c| c.get("variable").and_then(Value::as_array))
        .flatten()
        .collect()
}

/// Series code/name list of the current database.
pub(crate) fn fetch_series_list(client: &SourceClient, config: &Config) -> Result<RawTable> {
    let mut table = RawTable::new(vec!["id".into(), "value".into()], Vec::new());
    let mut page = 1u64;
    loop {
        let request = Request::get(format!("{}/sources/{}/series", config.base_url, config.database))
            .query("format", "json")
            .query("per_page", config.per_page)
            .query("page", page);
        let body: Value = client.fetch_json(request)?;
        check_api_message(&body)?;
        for var in concept_variables(&body, "Series") {
            table.push_row(vec![
                var.get("id").map(Cell::from).unwrap_or(Cell::Empty),
                var.get("value").map(Cell::from).unwrap_or(Cell::Empty),
            ]);
        }
        let pages = number(body.get("pages")).unwrap_or(1);
        if page >= pages {
            break;
        }
        page += 1;
    }
    Ok(table)
}

/// Metadata field names, as reported in `metatype[].id`, per output column.
pub(crate) const METATYPES: &[(&str, &str)] = &[
    ("indicator_name", "IndicatorName"),
    ("unit", "Unitofmeasure"),
    ("definition", "Longdefinition"),
    ("source", "Source"),
    ("topic", "Topic"),
    ("periodicity", "Periodicity"),
    ("aggregation_method", "Aggregationmethod"),
    ("license", "License_Type"),
];

/// Series metadata for a batch of indicators, one row per indicator.
pub(crate) fn fetch_series_metadata(
    client: &SourceClient,
    config: &Config,
    indicators: &[String],
) -> Result<RawTable> {
    let request = Request::get(format!(
        "{}/sources/{}/series/{}/metadata",
        config.base_url,
        config.database,
        indicators.join(";")
    ))
    .query("format", "json");
    let body: Value = client.fetch_json(request)?;
    check_api_message(&body)?;

    let mut columns = vec!["indicator_code".to_string()];
    columns.extend(METATYPES.iter().map(|(target, _)| target.to_string()));
    let mut table = RawTable::new(columns, Vec::new());
    for var in concept_variables(&body, "Series") {
        let mut row = vec![var.get("id").map(Cell::from).unwrap_or(Cell::Empty)];
        let metatypes = var.get("metatype").and_then(Value::as_array);
        for (_, id) in METATYPES {
            let cell = metatypes
                .and_then(|m| m.iter().find(|t| t.get("id").and_then(Value::as_str) == Some(id)))
                .and_then(|t| t.get("value"))
                .map(Cell::from)
                .unwrap_or(Cell::Empty);
            row.push(cell);
        }
        table.push_row(row);
    }
    Ok(table)
}

/// Flatten list items into a raw table; `paths` are `/`-separated JSON paths.
pub(crate) fn flatten(items: &[Value], paths: &[&str]) -> RawTable {
    let rows = items
        .iter()
        .map(|item| {
            paths
                .iter()
                .map(|path| {
                    path.split('/')
                        .try_fold(item, |v, key| v.get(key))
                        .map(Cell::from)
                        .unwrap_or(Cell::Empty)
                })
                .collect()
        })
        .collect();
    RawTable::new(paths.iter().map(|p| p.to_string()).collect(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolved(q: crate::Query) -> ResolvedQuery {
        q.resolve().unwrap()
    }

    #[test]
    fn url_lists_short_year_ranges() {
        let q = resolved(crate::Query::new(["NY.GDP.MKTP.CD", "SP.POP.TOTL"])
            .entities(["KEN", "UGA"])
            .years(Some(2019), Some(2021)));
        let req = data_request(&Config::default(), &q.indicators, &q, false);
        let url = req.full_url();
        assert!(url.contains("/sources/2/series/NY.GDP.MKTP.CD;SP.POP.TOTL/"));
        assert!(url.contains("/country/KEN;UGA/time/YR2019;YR2020;YR2021?"));
        assert!(url.contains("format=json"));
    }

    #[test]
    fn url_uses_all_for_long_ranges_and_counterparts() {
        let q = resolved(crate::Query::new(["A"]).years(None, Some(2000)));
        let req = data_request(&Config::default().database(6), &q.indicators, &q, true);
        let url = req.full_url();
        assert!(url.contains("/sources/6/series/A/country/all/time/all/counterpart-area/all?"));
    }

    #[test]
    fn year_span_counts_inclusive_bounds() {
        assert_eq!(year_span(&(2019..=2021)), 3);
        assert_eq!(year_span(&(crate::query::EARLIEST_YEAR..=crate::query::LATEST_YEAR)), 300);
        assert!(year_span(&(i32::MIN..=i32::MAX)) > MAX_PATH_YEARS);
    }

    #[test]
    fn most_recent_parameters() {
        let q = resolved(crate::Query::new(["A"]).most_recent(crate::MostRecent::NonEmpty(2)));
        let url = data_request(&Config::default(), &q.indicators, &q, false).full_url();
        assert!(url.contains("mrnev=2"));
    }

    #[test]
    fn parses_object_and_array_sources() {
        let obs = json!({"variable": [
            {"concept": "Country", "id": "KEN", "value": "Kenya"},
            {"concept": "Series", "id": "SP.POP.TOTL", "value": "Population, total"},
            {"concept": "Time", "id": "YR2020", "value": "2020"}
        ], "value": 53.0});
        let as_object = json!({"page": 1, "pages": 2, "source": {"id": "2", "data": [obs.clone()]}});
        let as_array = json!({"page": 2, "pages": "2", "source": [{"id": "2", "data": [obs]}]});

        let mut table = RawTable::new(data_columns(false), Vec::new());
        assert_eq!(parse_data_page(&as_object, &mut table, false).unwrap(), 2);
        assert_eq!(parse_data_page(&as_array, &mut table, false).unwrap(), 2);
        assert_eq!(table.num_rows(), 2);
        let year = table.column_index(COL_YEAR).unwrap();
        assert_eq!(table.rows()[0][year], Cell::text("2020"));
    }

    #[test]
    fn missing_concept_is_data_format() {
        let body = json!({"pages": 1, "source": {"data": [{"variable": [
            {"concept": "Region", "id": "KEN", "value": "Kenya"}
        ], "value": 1.0}]}});
        let mut table = RawTable::new(data_columns(false), Vec::new());
        assert!(matches!(
            parse_data_page(&body, &mut table, false),
            Err(ImportError::DataFormat { .. })
        ));
    }

    #[test]
    fn api_message_is_invalid_request() {
        let body = json!([{"message": [{"id": "120", "key": "Invalid value", "value": "The provided parameter value is not valid"}]}]);
        let err = check_api_message(&body).unwrap_err();
        assert!(matches!(err, ImportError::InvalidRequest(_)));
        assert!(err.to_string().contains("Invalid value"));
    }

    #[test]
    fn flatten_follows_nested_paths() {
        let items = vec![json!({"id": "KEN", "region": {"id": "SSF", "value": "Sub-Saharan Africa"}})];
        let table = flatten(&items, &["id", "region/value", "capitalCity"]);
        assert_eq!(table.rows()[0][1], Cell::text("Sub-Saharan Africa"));
        assert_eq!(table.rows()[0][2], Cell::Empty);
    }
}
