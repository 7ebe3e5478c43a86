//! Data request parameters and cache keys

use std::ops::RangeInclusive;

use devdata_core::{ImportError, Result};

/// Lower bound used when only an end year is given
pub const EARLIEST_YEAR: i32 = 1800;
/// Upper bound used when only a start year is given
pub const LATEST_YEAR: i32 = 2099;

/// Most-recent-value selection, applied by the API per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MostRecent {
    /// Last `n` periods, blank or not (`mrv`)
    Values(u32),
    /// Last `n` periods with data (`mrnev`)
    NonEmpty(u32),
}

/// Indicator data request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub indicators: Vec<String>,
    /// Entity codes; `None` requests every economy
    pub entities: Option<Vec<String>>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub most_recent: Option<MostRecent>,
    /// Drop rows without a value
    pub skip_blanks: bool,
    /// Drop regional and income-group aggregates
    pub skip_aggregates: bool,
}

impl Query {
    pub fn new<I, S>(indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            indicators: indicators.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    pub fn years(mut self, start: Option<i32>, end: Option<i32>) -> Self {
        self.start_year = start;
        self.end_year = end;
        self
    }

    pub fn most_recent(mut self, most_recent: MostRecent) -> Self {
        self.most_recent = Some(most_recent);
        self
    }

    pub fn skip_blanks(mut self) -> Self {
        self.skip_blanks = true;
        self
    }

    pub fn skip_aggregates(mut self) -> Self {
        self.skip_aggregates = true;
        self
    }

    /// Check parameters and normalize them. No network access.
    pub(crate) fn resolve(&self) -> Result<ResolvedQuery> {
        let mut indicators: Vec<String> = Vec::with_capacity(self.indicators.len());
        for code in &self.indicators {
            let code = code.trim();
            if code.is_empty() {
                return Err(ImportError::invalid("empty indicator code"));
            }
            if !indicators.iter().any(|c| c == code) {
                indicators.push(code.to_string());
            }
        }
        if indicators.is_empty() {
            return Err(ImportError::invalid("at least one indicator is required"));
        }

        let entities = match &self.entities {
            None => None,
            Some(list) => {
                let mut codes: Vec<String> = list
                    .iter()
                    .map(|c| c.trim().to_ascii_uppercase())
                    .collect();
                if codes.is_empty() || codes.iter().any(|c| c.is_empty()) {
                    return Err(ImportError::invalid("entity codes must not be empty"));
                }
                codes.sort_unstable();
                codes.dedup();
                Some(codes)
            }
        };

        for year in [self.start_year, self.end_year].into_iter().flatten() {
            if !(EARLIEST_YEAR..=LATEST_YEAR).contains(&year) {
                return Err(ImportError::invalid(format!(
                    "year {year} outside {EARLIEST_YEAR}..={LATEST_YEAR}"
                )));
            }
        }
        let time = time_range(self.start_year, self.end_year);
        if let Some(range) = &time {
            if range.is_empty() {
                return Err(ImportError::invalid(format!(
                    "start year {} is after end year {}",
                    range.start(),
                    range.end()
                )));
            }
        }
        if matches!(self.most_recent, Some(MostRecent::Values(0) | MostRecent::NonEmpty(0))) {
            return Err(ImportError::invalid("most recent value count must be at least 1"));
        }

        Ok(ResolvedQuery {
            indicators,
            entities,
            time,
            most_recent: self.most_recent,
        })
    }
}

/// Inclusive year range; one-sided bounds are closed with
/// [`EARLIEST_YEAR`] / [`LATEST_YEAR`].
pub fn time_range(start: Option<i32>, end: Option<i32>) -> Option<RangeInclusive<i32>> {
    match (start, end) {
        (None, None) => None,
        (start, end) => Some(start.unwrap_or(EARLIEST_YEAR)..=end.unwrap_or(LATEST_YEAR)),
    }
}

/// Validated, normalized request.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedQuery {
    pub indicators: Vec<String>,
    pub entities: Option<Vec<String>>,
    pub time: Option<RangeInclusive<i32>>,
    pub most_recent: Option<MostRecent>,
}

impl ResolvedQuery {
    pub fn key(&self, database: u32, indicator: &str) -> DataKey {
        DataKey {
            database,
            indicator: indicator.to_string(),
            entities: self.entities.clone(),
            time: self.time.as_ref().map(|r| (*r.start(), *r.end())),
            most_recent: self.most_recent,
        }
    }
}

/// Cache key: one indicator under the parameters that shape its rows.
///
/// Row filters applied after fetching (blanks, aggregates) are not part of
/// the key, so toggling them reuses cached data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DataKey {
    pub database: u32,
    pub indicator: String,
    pub entities: Option<Vec<String>>,
    pub time: Option<(i32, i32)>,
    pub most_recent: Option<MostRecent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_bounds() {
        assert_eq!(time_range(None, None), None);
        assert_eq!(time_range(Some(2000), Some(2005)), Some(2000..=2005));
        assert_eq!(*time_range(None, Some(1900)).unwrap().start(), EARLIEST_YEAR);
        assert_eq!(*time_range(Some(2010), None).unwrap().end(), LATEST_YEAR);
    }

    #[test]
    fn indicators_deduplicated_in_order() {
        let q = Query::new(["B", "A", "B", " A "]).resolve().unwrap();
        assert_eq!(q.indicators, vec!["B", "A"]);
    }

    #[test]
    fn entities_normalized() {
        let q = Query::new(["A"]).entities(["usa", "KEN", "USA"]).resolve().unwrap();
        assert_eq!(q.entities, Some(vec!["KEN".to_string(), "USA".to_string()]));
    }

    #[test]
    fn invalid_parameters() {
        assert!(matches!(
            Query::new(Vec::<String>::new()).resolve(),
            Err(ImportError::InvalidRequest(_))
        ));
        assert!(Query::new(["A"]).years(Some(2020), Some(2010)).resolve().is_err());
        assert!(Query::new(["A"]).most_recent(MostRecent::Values(0)).resolve().is_err());
        assert!(Query::new(["A"]).entities(Vec::<String>::new()).resolve().is_err());
        assert!(Query::new([""]).resolve().is_err());
    }

    #[test]
    fn years_outside_supported_span_rejected() {
        for (start, end) in [
            (Some(2150), None),
            (None, Some(1700)),
            (Some(i32::MIN), Some(i32::MAX)),
        ] {
            assert!(matches!(
                Query::new(["A"]).years(start, end).resolve(),
                Err(ImportError::InvalidRequest(_))
            ));
        }
        let open = Query::new(["A"]).years(None, Some(EARLIEST_YEAR)).resolve().unwrap();
        assert_eq!(open.time, Some(EARLIEST_YEAR..=EARLIEST_YEAR));
    }

    #[test]
    fn keys_ignore_row_filters() {
        let a = Query::new(["A"]).resolve().unwrap();
        let b = Query::new(["A"]).skip_blanks().skip_aggregates().resolve().unwrap();
        assert_eq!(a.key(2, "A"), b.key(2, "A"));
        assert_ne!(a.key(2, "A"), a.key(6, "A"));
    }
}
