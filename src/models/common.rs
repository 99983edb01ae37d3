//! Types shared by every collection: the collection names, the document
//! envelope and the record trait.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{About, Experience, Hero, Message, Project, Service, Skill, SocialLink};

/// A named category of content documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Hero,
    About,
    Skills,
    Projects,
    Experience,
    Services,
    SocialLinks,
    Messages,
}

impl Collection {
    /// All collections in dashboard order
    pub const ALL: [Collection; 8] = [
        Collection::Hero,
        Collection::About,
        Collection::Skills,
        Collection::Projects,
        Collection::Experience,
        Collection::Services,
        Collection::SocialLinks,
        Collection::Messages,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::About => "about",
            Self::Skills => "skills",
            Self::Projects => "projects",
            Self::Experience => "experience",
            Self::Services => "services",
            Self::SocialLinks => "social_links",
            Self::Messages => "messages",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hero => "Hero Section",
            Self::About => "About",
            Self::Skills => "Skills",
            Self::Projects => "Projects",
            Self::Experience => "Experience",
            Self::Services => "Services",
            Self::SocialLinks => "Social Links",
            Self::Messages => "Messages",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Hero => "🏠",
            Self::About => "👤",
            Self::Skills => "🛠️",
            Self::Projects => "📁",
            Self::Experience => "💼",
            Self::Services => "⚡",
            Self::SocialLinks => "🔗",
            Self::Messages => "📧",
        }
    }

    /// Singleton collections hold at most one document (hero, about)
    pub fn is_singleton(&self) -> bool {
        matches!(self, Self::Hero | Self::About)
    }

    /// Contact-form submissions are written by the public site, never by the admin
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Messages)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "hero" => Ok(Self::Hero),
            "about" => Ok(Self::About),
            "skills" | "skill" => Ok(Self::Skills),
            "projects" | "project" | "work" => Ok(Self::Projects),
            "experience" => Ok(Self::Experience),
            "services" | "service" => Ok(Self::Services),
            "social_links" | "social" | "links" => Ok(Self::SocialLinks),
            "messages" | "message" => Ok(Self::Messages),
            _ => Err(format!("Unknown collection: {}", s)),
        }
    }
}

/// A typed content record stored in one collection.
///
/// Field names are the remote attribute names; missing attributes
/// deserialize to their defaults.
pub trait Record:
    Serialize + DeserializeOwned + Clone + PartialEq + Default + Send + Sync + 'static
{
    const COLLECTION: Collection;

    /// One-line description for listings
    fn summary(&self) -> String;
}

/// Reads a `null` attribute as the field's default.
///
/// Unset optional attributes come back as `null` rather than missing.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A remote document: a record plus system-assigned id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "$createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "$updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Document<T> {
    /// A document that has not been persisted yet
    pub fn new(record: T) -> Self {
        Self {
            id: None,
            created_at: None,
            updated_at: None,
            record,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

impl<T: Default> Default for Document<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Any document, tagged by the collection it came from
#[derive(Debug, Clone, PartialEq)]
pub enum ContentRecord {
    Hero(Document<Hero>),
    About(Document<About>),
    Skill(Document<Skill>),
    Project(Document<Project>),
    Experience(Document<Experience>),
    Service(Document<Service>),
    SocialLink(Document<SocialLink>),
    Message(Document<Message>),
}

impl ContentRecord {
    /// Decode an untyped remote document into the record type of `collection`
    pub fn from_value(
        collection: Collection,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match collection {
            Collection::Hero => Self::Hero(serde_json::from_value(value)?),
            Collection::About => Self::About(serde_json::from_value(value)?),
            Collection::Skills => Self::Skill(serde_json::from_value(value)?),
            Collection::Projects => Self::Project(serde_json::from_value(value)?),
            Collection::Experience => Self::Experience(serde_json::from_value(value)?),
            Collection::Services => Self::Service(serde_json::from_value(value)?),
            Collection::SocialLinks => Self::SocialLink(serde_json::from_value(value)?),
            Collection::Messages => Self::Message(serde_json::from_value(value)?),
        })
    }

    pub fn collection(&self) -> Collection {
        match self {
            Self::Hero(_) => Collection::Hero,
            Self::About(_) => Collection::About,
            Self::Skill(_) => Collection::Skills,
            Self::Project(_) => Collection::Projects,
            Self::Experience(_) => Collection::Experience,
            Self::Service(_) => Collection::Services,
            Self::SocialLink(_) => Collection::SocialLinks,
            Self::Message(_) => Collection::Messages,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Hero(d) => d.id(),
            Self::About(d) => d.id(),
            Self::Skill(d) => d.id(),
            Self::Project(d) => d.id(),
            Self::Experience(d) => d.id(),
            Self::Service(d) => d.id(),
            Self::SocialLink(d) => d.id(),
            Self::Message(d) => d.id(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Hero(d) => d.record.summary(),
            Self::About(d) => d.record.summary(),
            Self::Skill(d) => d.record.summary(),
            Self::Project(d) => d.record.summary(),
            Self::Experience(d) => d.record.summary(),
            Self::Service(d) => d.record.summary(),
            Self::SocialLink(d) => d.record.summary(),
            Self::Message(d) => d.record.summary(),
        }
    }
}
