//! Invoice series: short alphabetic prefix partitioning numbering streams.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use fiscalio_core::{DomainError, DomainResult, ValueObject};

/// A numbering series: 1 to 3 uppercase ASCII letters (e.g. `"F"` for
/// ordinary invoices, `"FS"` for simplified ones).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Series(String);

impl Series {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.is_empty() || value.len() > 3 {
            return Err(DomainError::validation(format!(
                "series '{value}' must be 1 to 3 characters"
            )));
        }
        if !value.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "series '{value}' must consist of uppercase ASCII letters"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Series {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Series {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Series::new(s)
    }
}

impl TryFrom<String> for Series {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Series::new(value)
    }
}

impl From<Series> for String {
    fn from(value: Series) -> Self {
        value.0
    }
}

impl ValueObject for Series {}
