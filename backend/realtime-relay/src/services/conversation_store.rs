//! Durable conversation/message store consumed by the relay.
//!
//! The store is the system of record; the relay only ever writes through
//! `create` and `append_message` (plus the `touch_activity` bookkeeping that
//! accompanies an append). Single-row atomicity is the store's job.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Conversation, ConversationId, ConversationSummary, Message, UserId};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Conversation between `a` and `b` in either participant order
    async fn find_by_participants(&self, a: &UserId, b: &UserId)
        -> AppResult<Option<Conversation>>;

    /// Create a conversation with `a` as participant 1 and `b` as participant 2
    async fn create(&self, a: &UserId, b: &UserId) -> AppResult<Conversation>;

    async fn find_by_id(&self, id: ConversationId) -> AppResult<Option<Conversation>>;

    /// Bump the conversation's last-activity timestamp to now
    async fn touch_activity(&self, id: ConversationId) -> AppResult<()>;

    /// Persist a message. `text` must already be trimmed and non-empty.
    async fn append_message(
        &self,
        id: ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> AppResult<Message>;

    /// All messages of a conversation, oldest first (ties by insertion order)
    async fn list_messages(&self, id: ConversationId) -> AppResult<Vec<Message>>;

    /// Conversations `user_id` participates in, most recently active first
    async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<ConversationSummary>>;
}
