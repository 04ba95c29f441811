use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::message::Message;

/// Opaque user identifier issued by the identity system.
///
/// The relay never creates or mutates these; it only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse a client-supplied id. Anything that is not a UUID cannot name a
    /// stored conversation.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConversationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Public identity fields of a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
}

impl UserProfile {
    /// Profile for a user the directory has no entry for
    pub fn fallback(id: &UserId) -> Self {
        Self {
            id: id.clone(),
            username: format!("user_{}", id),
        }
    }
}

/// Private conversation between exactly two distinct users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participant1_id: UserId,
    pub participant2_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Last activity; bumped on every accepted message
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participant1_id == *user_id || self.participant2_id == *user_id
    }

    /// The participant that is not `user_id`. Only meaningful when
    /// `has_participant(user_id)` holds.
    pub fn other_participant(&self, user_id: &UserId) -> &UserId {
        if self.participant1_id == *user_id {
            &self.participant2_id
        } else {
            &self.participant1_id
        }
    }

    /// True when this conversation is between `a` and `b`, in either order.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (self.participant1_id == *a && self.participant2_id == *b)
            || (self.participant1_id == *b && self.participant2_id == *a)
    }
}

/// Row of the `conversations` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participant1: UserProfile,
    pub participant2: UserProfile,
    /// Most recent message only; empty for a conversation with no messages
    pub messages: Vec<Message>,
}

impl ConversationSummary {
    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(a: &str, b: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: ConversationId::new(),
            participant1_id: UserId::from(a),
            participant2_id: UserId::from(b),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_between_ignores_order() {
        let conv = conversation("u1", "u2");
        assert!(conv.is_between(&"u1".into(), &"u2".into()));
        assert!(conv.is_between(&"u2".into(), &"u1".into()));
        assert!(!conv.is_between(&"u1".into(), &"u3".into()));
    }

    #[test]
    fn test_other_participant() {
        let conv = conversation("u1", "u2");
        assert_eq!(conv.other_participant(&"u1".into()).as_str(), "u2");
        assert_eq!(conv.other_participant(&"u2".into()).as_str(), "u1");
    }

    #[test]
    fn test_conversation_id_parse_rejects_garbage() {
        assert!(ConversationId::parse("conv-1").is_none());
        let id = ConversationId::new();
        assert_eq!(ConversationId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn test_summary_serializes_flat_camel_case() {
        let conv = conversation("u1", "u2");
        let summary = ConversationSummary {
            participant1: UserProfile::fallback(&conv.participant1_id),
            participant2: UserProfile::fallback(&conv.participant2_id),
            conversation: conv,
            messages: vec![],
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["participant1Id"], "u1");
        assert_eq!(json["participant2"]["username"], "user_u2");
        assert!(json["updatedAt"].is_string());
        assert_eq!(json["messages"], serde_json::json!([]));
    }
}
