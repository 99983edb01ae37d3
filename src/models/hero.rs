//! Landing page hero copy.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hero {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subtitle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cta_text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cta_link: String,
}

impl Record for Hero {
    const COLLECTION: Collection = Collection::Hero;

    fn summary(&self) -> String {
        if self.subtitle.is_empty() {
            self.title.clone()
        } else {
            format!("{} / {}", self.title, self.subtitle)
        }
    }
}
