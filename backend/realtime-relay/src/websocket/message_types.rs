use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::models::{ConversationId, ConversationSummary, Message};

// ============================================================
// Inbound
// ============================================================

/// Raw frame as it arrives on the socket: `{"event": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationPayload {
    pub other_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: String,
    /// Missing/null text is treated like empty text and dropped
    #[serde(default)]
    pub text: Option<String>,
}

/// Validated client intent. The acting user never comes from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    GetConversations,
    GetMessages(GetMessagesPayload),
    StartConversation(StartConversationPayload),
    SendMessage(SendMessagePayload),
}

impl Intent {
    pub const GET_CONVERSATIONS: &'static str = "get:conversations";
    pub const GET_MESSAGES: &'static str = "get:messages";
    pub const START_CONVERSATION: &'static str = "start:conversation";
    pub const SEND_MESSAGE: &'static str = "send:message";

    /// Parse a text frame. Unknown event names and mismatched payload shapes
    /// are rejected before any handler runs.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let frame: InboundFrame = serde_json::from_str(text)
            .map_err(|e| AppError::InvalidPayload(format!("frame: {e}")))?;

        let intent = match frame.event.as_str() {
            Self::GET_CONVERSATIONS => Intent::GetConversations,
            Self::GET_MESSAGES => Intent::GetMessages(payload(frame.data)?),
            Self::START_CONVERSATION => Intent::StartConversation(payload(frame.data)?),
            Self::SEND_MESSAGE => Intent::SendMessage(payload(frame.data)?),
            other => {
                return Err(AppError::InvalidPayload(format!("unknown event {other:?}")));
            }
        };
        Ok(intent)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intent::GetConversations => Self::GET_CONVERSATIONS,
            Intent::GetMessages(_) => Self::GET_MESSAGES,
            Intent::StartConversation(_) => Self::START_CONVERSATION,
            Intent::SendMessage(_) => Self::SEND_MESSAGE,
        }
    }
}

fn payload<T: for<'de> Deserialize<'de>>(data: JsonValue) -> Result<T, AppError> {
    serde_json::from_value(data).map_err(|e| AppError::InvalidPayload(e.to_string()))
}

// ============================================================
// Outbound
// ============================================================

/// Events pushed from server to client, framed as `{"event": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "conversations")]
    Conversations(Vec<ConversationSummary>),

    #[serde(rename = "messages", rename_all = "camelCase")]
    Messages {
        conversation_id: ConversationId,
        messages: Vec<Message>,
    },

    #[serde(rename = "conversation:started", rename_all = "camelCase")]
    ConversationStarted { conversation_id: ConversationId },

    #[serde(rename = "new:message", rename_all = "camelCase")]
    NewMessage {
        conversation_id: ConversationId,
        message: Message,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl OutboundEvent {
    pub fn error(err: &AppError) -> Self {
        OutboundEvent::Error {
            message: err.client_message().to_string(),
        }
    }
}
