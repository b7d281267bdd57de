//! Names and birthdays

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::Error;

/// Date layout used on disk and on the wire
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// A person's name as given by a caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// Wrap a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as given
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used as the storage key
    pub fn normalize(&self) -> Name {
        Name(self.0.to_lowercase())
    }

    /// Check for an empty name
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A calendar date, formatted as `YYYY-MM-DD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Birthday(NaiveDate);

impl Birthday {
    /// Wrap a date
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying date
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for Birthday {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for Birthday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for Birthday {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Birthday)
            .map_err(|e| Error::Parse(format!("invalid date {:?}: {}", s, e)))
    }
}
