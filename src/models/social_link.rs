//! Social profile links.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialLink {
    #[serde(deserialize_with = "null_as_default")]
    pub platform: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
}

impl Record for SocialLink {
    const COLLECTION: Collection = Collection::SocialLinks;

    fn summary(&self) -> String {
        format!("{}: {}", self.platform, self.url)
    }
}
