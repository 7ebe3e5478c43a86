//! WEO release identification

use std::fmt;

use chrono::{Datelike, NaiveDate};
use devdata_core::{ImportError, Result};

/// First release published as a tab-delimited "all countries" file
pub const FIRST_RELEASE_YEAR: i32 = 2008;

/// WEO is published twice a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Month {
    April,
    October,
}

impl Month {
    pub fn name(self) -> &'static str {
        match self {
            Month::April => "April",
            Month::October => "October",
        }
    }

    pub fn abbrev(self) -> &'static str {
        match self {
            Month::April => "Apr",
            Month::October => "Oct",
        }
    }

    fn number(self) -> u32 {
        match self {
            Month::April => 4,
            Month::October => 10,
        }
    }
}

/// One WEO release. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Release {
    pub year: i32,
    pub month: Month,
}

impl Release {
    pub fn new(month: Month, year: i32) -> Self {
        Self { year, month }
    }

    /// Parse `"April"`/`"Apr"`/`"October"`/`"Oct"` (any case).
    pub fn parse(month: &str, year: i32) -> Result<Self> {
        let month = match month.trim().to_ascii_lowercase().as_str() {
            "april" | "apr" => Month::April,
            "october" | "oct" => Month::October,
            other => {
                return Err(ImportError::invalid(format!(
                    "WEO releases are April or October, not '{other}'"
                )));
            }
        };
        Ok(Self::new(month, year))
    }

    /// Most recent release that could have been published by `today`.
    pub fn latest_possible(today: NaiveDate) -> Self {
        match today.month() {
            10..=12 => Self::new(Month::October, today.year()),
            4..=9 => Self::new(Month::April, today.year()),
            _ => Self::new(Month::October, today.year() - 1),
        }
    }

    pub fn previous(self) -> Self {
        match self.month {
            Month::October => Self::new(Month::April, self.year),
            Month::April => Self::new(Month::October, self.year - 1),
        }
    }

    /// Reject releases outside the range served as bulk files.
    pub fn validate(self, today: NaiveDate) -> Result<Self> {
        if self.year < FIRST_RELEASE_YEAR || self > Self::latest_possible(today) {
            return Err(ImportError::invalid(format!(
                "no WEO release {self} (available from April {FIRST_RELEASE_YEAR})"
            )));
        }
        Ok(self)
    }

    /// First day of the release month.
    pub fn date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.number(), 1)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.month.name(), self.year)
    }
}

/// Which release `Weo::get_data` should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WeoVersion {
    /// Newest release available upstream
    #[default]
    Latest,
    Release(Release),
}

impl From<Release> for WeoVersion {
    fn from(release: Release) -> Self {
        WeoVersion::Release(release)
    }
}

/// Releases to try for "latest", newest first.
pub fn candidates(today: NaiveDate, count: usize) -> Vec<Release> {
    let mut out = Vec::with_capacity(count);
    let mut release = Release::latest_possible(today);
    while out.len() < count && release.year >= FIRST_RELEASE_YEAR {
        out.push(release);
        release = release.previous();
    }
    out
}
