//! Freshness period: the calendar day a record was produced for.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};

/// Storage format for reference dates (`YYYY-MM-DD`).
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A calendar day.
///
/// A target is "fresh" for a period when a record with that reference date
/// already exists, and is skipped instead of refetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(NaiveDate);

impl Period {
    /// Today's period in the process's local time zone.
    #[must_use]
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// Wraps an explicit date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns the underlying date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Database representation.
    #[must_use]
    pub fn to_db_string(&self) -> String {
        self.0.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for Period {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map(Self)
    }
}
