//! Work history entries.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    #[serde(deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company: String,
    #[serde(deserialize_with = "null_as_default")]
    pub start_date: String,
    /// Empty while the position is current
    #[serde(deserialize_with = "null_as_default")]
    pub end_date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

impl Experience {
    pub fn is_current(&self) -> bool {
        self.end_date.trim().is_empty()
    }

    pub fn period(&self) -> String {
        let end = if self.is_current() { "Present" } else { self.end_date.as_str() };
        format!("{} - {}", self.start_date, end)
    }
}

impl Record for Experience {
    const COLLECTION: Collection = Collection::Experience;

    fn summary(&self) -> String {
        format!("{} @ {} ({})", self.role, self.company, self.period())
    }
}
