//! Offered services.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
}

impl Record for Service {
    const COLLECTION: Collection = Collection::Services;

    fn summary(&self) -> String {
        self.title.clone()
    }
}
