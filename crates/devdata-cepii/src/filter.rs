//! Year and product filters.

use std::ops::RangeInclusive;

use devdata_core::{ImportError, Result};

/// Values to keep: one value, a list, or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Single(i64),
    List(Vec<i64>),
    Range(i64, i64),
}

impl Filter {
    /// Reject empty lists and reversed ranges. `what` names the filter in the error.
    pub fn validate(&self, what: &str) -> Result<()> {
        match self {
            Self::List(values) if values.is_empty() => {
                Err(ImportError::invalid(format!("{what} filter list is empty")))
            }
            Self::Range(start, end) if start > end => Err(ImportError::invalid(format!(
                "{what} filter range {start}..={end} is reversed"
            ))),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, value: i64) -> bool {
        match self {
            Self::Single(v) => *v == value,
            Self::List(values) => values.contains(&value),
            Self::Range(start, end) => (*start..=*end).contains(&value),
        }
    }

    /// Whether any of `values` passes.
    pub fn matches_any(&self, mut values: impl Iterator<Item = i64>) -> bool {
        values.any(|v| self.matches(v))
    }

    /// Explicitly requested values; `None` for ranges.
    pub fn listed(&self) -> Option<Vec<i64>> {
        match self {
            Self::Single(v) => Some(vec![*v]),
            Self::List(values) => Some(values.clone()),
            Self::Range(..) => None,
        }
    }
}

impl From<i64> for Filter {
    fn from(value: i64) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<i64>> for Filter {
    fn from(values: Vec<i64>) -> Self {
        Self::List(values)
    }
}

impl From<RangeInclusive<i64>> for Filter {
    fn from(range: RangeInclusive<i64>) -> Self {
        Self::Range(*range.start(), *range.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching() {
        assert!(Filter::from(2021_i64).matches(2021));
        assert!(!Filter::from(2021_i64).matches(2020));
        assert!(Filter::from(vec![2020_i64, 2022]).matches(2022));
        let range = Filter::from(2018_i64..=2020);
        assert!(range.matches(2018) && range.matches(2020));
        assert!(!range.matches(2021));
        assert!(range.matches_any([2017, 2019].into_iter()));
    }

    #[test]
    fn invalid_filters() {
        assert!(Filter::List(vec![]).validate("years").is_err());
        let err = Filter::Range(2022, 2020).validate("years").unwrap_err();
        assert!(matches!(err, ImportError::InvalidRequest(_)));
        assert!(Filter::Range(2020, 2020).validate("years").is_ok());
    }
}
