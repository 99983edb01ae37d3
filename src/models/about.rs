//! About section text and portrait.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct About {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image_url: String,
}

impl Record for About {
    const COLLECTION: Collection = Collection::About;

    fn summary(&self) -> String {
        self.title.clone()
    }
}
