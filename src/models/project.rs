//! Portfolio projects.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub year: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    /// Desktop screenshot URL
    #[serde(deserialize_with = "null_as_default")]
    pub image_pc: String,
    /// Mobile screenshot URL
    #[serde(deserialize_with = "null_as_default")]
    pub image_mobile: String,
    #[serde(deserialize_with = "null_as_default")]
    pub link: String,
}

impl Project {
    /// Image URLs held by this project, for cleanup when it is deleted
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        [self.image_pc.as_str(), self.image_mobile.as_str()]
            .into_iter()
            .filter(|url| !url.is_empty())
    }
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn summary(&self) -> String {
        match (self.category.is_empty(), self.year.is_empty()) {
            (true, true) => self.title.clone(),
            (false, true) => format!("{} ({})", self.title, self.category),
            (true, false) => format!("{} ({})", self.title, self.year),
            (false, false) => format!("{} ({}, {})", self.title, self.category, self.year),
        }
    }
}
