//! Inbound Telegram update payloads.
//!
//! Only the fields the router reads are modelled; everything else in the
//! update is ignored during deserialization.

use serde::Deserialize;

use crate::routing::ChatType;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub edited_message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

impl Update {
    /// First present of `message`, `edited_message`, `channel_post`.
    pub fn into_message(self) -> Option<Message> {
        self.message.or(self.edited_message).or(self.channel_post)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    #[serde(default)]
    pub caption_entities: Vec<MessageEntity>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Message text (or caption when there is no text), trimmed.
    /// Returns `None` when nothing usable remains.
    pub fn text_payload(&self) -> Option<&str> {
        let raw = match self.text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => self.caption.as_deref()?,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Entities that index into the text returned by [`Message::text_payload`].
    ///
    /// Offsets refer to the untrimmed source string.
    pub fn payload_entities(&self) -> (&str, &[MessageEntity]) {
        match self.text.as_deref() {
            Some(text) if !text.is_empty() => (text, &self.entities),
            _ => (
                self.caption.as_deref().unwrap_or_default(),
                &self.caption_entities,
            ),
        }
    }

    pub fn chat_type(&self) -> ChatType {
        self.chat.as_ref().map_or(ChatType::Other, |chat| chat.kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "type", default = "default_chat_type")]
    pub kind: ChatType,
}

fn default_chat_type() -> ChatType {
    ChatType::Other
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Text entity; `offset` and `length` are UTF-16 code units.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub user: Option<User>,
}

impl MessageEntity {
    /// Slice `source` by this entity's UTF-16 range.
    pub fn slice(&self, source: &str) -> String {
        let units: Vec<u16> = source.encode_utf16().collect();
        let start = self.offset.min(units.len());
        let end = self.offset.saturating_add(self.length).min(units.len());
        String::from_utf16_lossy(&units[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_message_before_edited_and_channel_post() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "edited_message": {"message_id": 2, "text": "edited"},
            "channel_post": {"message_id": 3, "text": "post"}
        }))
        .unwrap();
        let message = update.into_message().unwrap();
        assert_eq!(message.message_id, Some(2));
    }

    #[test]
    fn text_falls_back_to_caption() {
        let message: Message = serde_json::from_value(json!({
            "caption": "  photo caption  ",
            "caption_entities": [{"type": "mention", "offset": 0, "length": 4}]
        }))
        .unwrap();
        assert_eq!(message.text_payload(), Some("photo caption"));
        let (source, entities) = message.payload_entities();
        assert_eq!(source, "  photo caption  ");
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn blank_text_yields_nothing() {
        let message: Message = serde_json::from_value(json!({"text": "   "})).unwrap();
        assert!(message.text_payload().is_none());
        let message = Message::default();
        assert!(message.text_payload().is_none());
    }

    #[test]
    fn entity_slice_counts_utf16_units() {
        let text = "😀 hi @bot";
        let entity = MessageEntity {
            kind: "mention".into(),
            offset: 6,
            length: 4,
            user: None,
        };
        assert_eq!(entity.slice(text), "@bot");
    }

    #[test]
    fn entity_slice_clamps_out_of_range() {
        let entity = MessageEntity {
            kind: "mention".into(),
            offset: 3,
            length: 50,
            user: None,
        };
        assert_eq!(entity.slice("hello"), "lo");
        let entity = MessageEntity {
            kind: "mention".into(),
            offset: 99,
            length: 2,
            user: None,
        };
        assert_eq!(entity.slice("hello"), "");
    }

    #[test]
    fn participants_without_ids_still_parse() {
        let message: Message = serde_json::from_value(json!({
            "chat": {"type": "private"},
            "from": {"is_bot": false},
            "text": "hi"
        }))
        .unwrap();
        assert_eq!(message.chat.unwrap().id, None);
        assert_eq!(message.from.unwrap().id, None);
    }

    #[test]
    fn unknown_chat_type_is_tolerated() {
        let message: Message =
            serde_json::from_value(json!({"chat": {"id": 5, "type": "forum"}})).unwrap();
        assert_eq!(message.chat_type(), ChatType::Other);
    }
}
