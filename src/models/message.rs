//! Contact-form submissions.

use serde::{Deserialize, Serialize};

use super::{null_as_default, Collection, Document, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
}

impl Record for Message {
    const COLLECTION: Collection = Collection::Messages;

    fn summary(&self) -> String {
        let subject = if self.subject.is_empty() { "(no subject)" } else { self.subject.as_str() };
        format!("{} <{}>: {}", self.name, self.email, subject)
    }
}

impl Document<Message> {
    /// Receive time as shown in the inbox, e.g. "Mar 1, 2024 10:05"
    pub fn received_label(&self) -> String {
        self.created_at
            .map(|at| at.format("%b %-d, %Y %H:%M").to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_received_label() {
        let mut doc = Document::new(Message::default());
        assert_eq!(doc.received_label(), "");

        doc.created_at = Some(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap());
        assert_eq!(doc.received_label(), "Mar 1, 2024 10:05");
    }

    #[test]
    fn test_summary_without_subject() {
        let msg = Message {
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(msg.summary(), "Sam <sam@example.com>: (no subject)");
    }
}
