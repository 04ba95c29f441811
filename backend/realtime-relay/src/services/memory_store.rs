use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::conversation_store::ConversationStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationId, ConversationSummary, Message, MessageId, UserId, UserProfile,
};

#[derive(Default)]
struct Inner {
    conversations: Vec<Conversation>,
    // All conversations' messages in insertion order
    messages: Vec<Message>,
    usernames: HashMap<UserId, String>,
}

impl Inner {
    fn profile(&self, id: &UserId) -> UserProfile {
        match self.usernames.get(id) {
            Some(username) => UserProfile {
                id: id.clone(),
                username: username.clone(),
            },
            None => UserProfile::fallback(id),
        }
    }
}

/// Process-local conversation store.
///
/// Used when no `DATABASE_URL` is configured and as the store behind the
/// relay tests. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the user directory used to fill in profile fields
    pub fn with_users<I, U, N>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, N)>,
        U: Into<String>,
        N: Into<String>,
    {
        let usernames = users
            .into_iter()
            .map(|(id, name)| (UserId::new(id), name.into()))
            .collect();

        Self {
            inner: RwLock::new(Inner {
                usernames,
                ..Inner::default()
            }),
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.inner.read().await.conversations.len()
    }

    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find_by_participants(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .conversations
            .iter()
            .find(|c| c.is_between(a, b))
            .cloned())
    }

    async fn create(&self, a: &UserId, b: &UserId) -> AppResult<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            participant1_id: a.clone(),
            participant2_id: b.clone(),
            created_at: now,
            updated_at: now,
        };

        self.inner
            .write()
            .await
            .conversations
            .push(conversation.clone());

        tracing::debug!(conversation_id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    async fn find_by_id(&self, id: ConversationId) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn touch_activity(&self, id: ConversationId) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let conversation = guard
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AppError::NotFound)?;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn append_message(
        &self,
        id: ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> AppResult<Message> {
        let mut guard = self.inner.write().await;
        if !guard.conversations.iter().any(|c| c.id == id) {
            return Err(AppError::NotFound);
        }

        let message = Message {
            id: MessageId::new(),
            conversation_id: id,
            sender_id: sender_id.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
            sender: guard.profile(sender_id),
        };
        guard.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, id: ConversationId) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut messages: Vec<Message> = guard
            .messages
            .iter()
            .filter(|m| m.conversation_id == id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<ConversationSummary>> {
        let guard = self.inner.read().await;
        let mut summaries: Vec<ConversationSummary> = guard
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id))
            .map(|c| {
                let latest = guard
                    .messages
                    .iter()
                    .filter(|m| m.conversation_id == c.id)
                    .max_by_key(|m| m.created_at)
                    .cloned();

                ConversationSummary {
                    participant1: guard.profile(&c.participant1_id),
                    participant2: guard.profile(&c.participant2_id),
                    conversation: c.clone(),
                    messages: latest.into_iter().collect(),
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
        Ok(summaries)
    }
}
