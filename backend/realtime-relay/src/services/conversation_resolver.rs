use std::sync::Arc;

use super::conversation_store::ConversationStore;
use crate::error::{AppError, AppResult};
use crate::models::{ConversationId, UserId};

/// Finds or creates the single conversation between two users.
///
/// Lookup and creation are two separate store calls with no lock held in
/// between, so two first-contact requests from both sides can both miss the
/// lookup. Stores with a pair uniqueness constraint resolve that by returning
/// the existing row from `create`.
#[derive(Clone)]
pub struct ConversationResolver {
    store: Arc<dyn ConversationStore>,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    pub async fn find_or_create(&self, user_a: &UserId, user_b: &UserId) -> AppResult<ConversationId> {
        if user_a == user_b {
            return Err(AppError::SelfConversation);
        }

        if let Some(existing) = self.store.find_by_participants(user_a, user_b).await? {
            return Ok(existing.id);
        }

        // Caller first; participant order carries no meaning
        let created = self.store.create(user_a, user_b).await?;
        tracing::info!(
            conversation_id = %created.id,
            participant1 = %user_a,
            participant2 = %user_b,
            "conversation created"
        );
        Ok(created.id)
    }
}
