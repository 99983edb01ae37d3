//! Skills, bucketed by a free-text category.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Document, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Skill {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
}

impl Skill {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            icon: String::new(),
        }
    }

    /// Whether this skill belongs in the given display bucket ("tech", "art", ...)
    pub fn in_bucket(&self, bucket: &str) -> bool {
        self.category.trim().eq_ignore_ascii_case(bucket)
    }
}

impl Record for Skill {
    const COLLECTION: Collection = Collection::Skills;

    fn summary(&self) -> String {
        if self.category.is_empty() {
            self.name.clone()
        } else {
            format!("{} [{}]", self.name, self.category)
        }
    }
}

/// Names of the skills in one display bucket, in list order
pub fn skills_in_bucket<'a>(skills: &'a [Document<Skill>], bucket: &str) -> Vec<&'a str> {
    skills
        .iter()
        .filter(|doc| doc.record.in_bucket(bucket))
        .map(|doc| doc.record.name.as_str())
        .collect()
}
