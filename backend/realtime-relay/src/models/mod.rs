pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationId, ConversationSummary, UserId, UserProfile};
pub use message::{Message, MessageId};
