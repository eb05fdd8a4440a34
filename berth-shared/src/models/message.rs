/// Chat message model
///
/// Messages are stored as JSON in a per-room list, oldest first. When the
/// translation service is configured, `metadata` carries the detected source
/// language and the text rendered in every other supported language.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message posted to a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,

    pub room_id: Uuid,

    /// Display name of the sender at the time of posting
    pub sender: String,

    /// Subject of the sender
    pub sender_id: String,

    pub text: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Builds a new message stamped with the current time
    pub fn new(
        room_id: Uuid,
        sender_id: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender: sender.into(),
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
            attachment: None,
            metadata: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Text in the requested language, falling back to the original
    pub fn text_in(&self, language: &str) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.translations.get(language))
            .map(String::as_str)
            .unwrap_or(&self.text)
    }
}

/// File attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub content_type: String,
}

/// Language data produced by the translation service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Detected language code of `text`
    pub source_language: String,

    /// Language code to translated text
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_in_falls_back_to_original() {
        let mut translations = BTreeMap::new();
        translations.insert("fr".to_string(), "bonjour".to_string());

        let msg = Message::new(Uuid::new_v4(), "sub-1", "ada", "hello").with_metadata(
            MessageMetadata {
                source_language: "en".to_string(),
                translations,
            },
        );

        assert_eq!(msg.text_in("fr"), "bonjour");
        assert_eq!(msg.text_in("de"), "hello");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let msg = Message::new(Uuid::new_v4(), "sub-1", "ada", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("attachment").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["sender_id"], "sub-1");
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let raw = format!(
            r#"{{"id":"{}","room_id":"{}","sender":"ada","sender_id":"sub-1","text":"hi","timestamp":"2025-01-01T00:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let msg: Message = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.text, "hi");
        assert!(msg.attachment.is_none());
    }
}
