use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use super::conversation_store::ConversationStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationId, ConversationSummary, Message, MessageId, UserId, UserProfile,
};

const CONVERSATION_COLUMNS: &str =
    "id, participant1_id, participant2_id, created_at, updated_at";

/// Postgres-backed store.
///
/// `users(id, username)` is owned by the identity system; it is only read
/// (LEFT JOIN) to fill profile fields.
#[derive(Clone)]
pub struct PgConversationStore {
    db: Pool,
}

impl PgConversationStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}

fn profile(id: &UserId, username: Option<String>) -> UserProfile {
    match username {
        Some(username) => UserProfile {
            id: id.clone(),
            username,
        },
        None => UserProfile::fallback(id),
    }
}

fn conversation_from_row(row: &Row) -> Conversation {
    Conversation {
        id: ConversationId::from(row.get::<_, Uuid>("id")),
        participant1_id: UserId::new(row.get::<_, String>("participant1_id")),
        participant2_id: UserId::new(row.get::<_, String>("participant2_id")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &Row) -> Message {
    let sender_id = UserId::new(row.get::<_, String>("sender_id"));
    let sender = profile(&sender_id, row.get("sender_username"));

    Message {
        id: MessageId::from(row.get::<_, Uuid>("id")),
        conversation_id: ConversationId::from(row.get::<_, Uuid>("conversation_id")),
        sender_id,
        text: row.get("text"),
        created_at: row.get("created_at"),
        sender,
    }
}

fn summary_from_row(row: &Row) -> ConversationSummary {
    let conversation = conversation_from_row(row);
    let participant1 = profile(
        &conversation.participant1_id,
        row.get("participant1_username"),
    );
    let participant2 = profile(
        &conversation.participant2_id,
        row.get("participant2_username"),
    );

    let latest = row.get::<_, Option<Uuid>>("last_id").map(|last_id| {
        let sender_id = UserId::new(row.get::<_, String>("last_sender_id"));
        Message {
            id: MessageId::from(last_id),
            conversation_id: conversation.id,
            sender: profile(&sender_id, row.get("last_sender_username")),
            sender_id,
            text: row.get("last_text"),
            created_at: row.get::<_, DateTime<Utc>>("last_created_at"),
        }
    });

    ConversationSummary {
        conversation,
        participant1,
        participant2,
        messages: latest.into_iter().collect(),
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_by_participants(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE (participant1_id = $1 AND participant2_id = $2) \
                OR (participant1_id = $2 AND participant2_id = $1) \
             LIMIT 1"
        );
        let row = client.query_opt(&sql, &[&a.as_str(), &b.as_str()]).await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn create(&self, a: &UserId, b: &UserId) -> AppResult<Conversation> {
        let id = ConversationId::new().as_uuid();
        let client = self.db.get().await?;
        let sql = format!(
            "INSERT INTO conversations (id, participant1_id, participant2_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING \
             RETURNING {CONVERSATION_COLUMNS}"
        );

        if let Some(row) = client
            .query_opt(&sql, &[&id, &a.as_str(), &b.as_str()])
            .await?
        {
            return Ok(conversation_from_row(&row));
        }

        // Lost a first-contact race against the pair index: return the winner
        tracing::info!(participant1 = %a, participant2 = %b, "conversation already exists, re-fetching");
        drop(client);
        self.find_by_participants(a, b)
            .await?
            .ok_or_else(|| AppError::Database("conversation insert conflicted but no row found".into()))
    }

    async fn find_by_id(&self, id: ConversationId) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        let row = client.query_opt(&sql, &[&id.as_uuid()]).await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn touch_activity(&self, id: ConversationId) -> AppResult<()> {
        let client = self.db.get().await?;
        let updated = client
            .execute(
                "UPDATE conversations SET updated_at = NOW() WHERE id = $1",
                &[&id.as_uuid()],
            )
            .await?;

        if updated == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn append_message(
        &self,
        id: ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> AppResult<Message> {
        let message_id = MessageId::new().as_uuid();
        let client = self.db.get().await?;
        let row = client
            .query_one(
                r#"
                WITH inserted AS (
                    INSERT INTO messages (id, conversation_id, sender_id, text)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, conversation_id, sender_id, text, created_at
                )
                SELECT i.id, i.conversation_id, i.sender_id, i.text, i.created_at,
                       u.username AS sender_username
                FROM inserted i
                LEFT JOIN users u ON u.id = i.sender_id
                "#,
                &[&message_id, &id.as_uuid(), &sender_id.as_str(), &text],
            )
            .await?;

        Ok(message_from_row(&row))
    }

    async fn list_messages(&self, id: ConversationId) -> AppResult<Vec<Message>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT m.id, m.conversation_id, m.sender_id, m.text, m.created_at,
                       u.username AS sender_username
                FROM messages m
                LEFT JOIN users u ON u.id = m.sender_id
                WHERE m.conversation_id = $1
                ORDER BY m.created_at ASC, m.seq ASC
                "#,
                &[&id.as_uuid()],
            )
            .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<ConversationSummary>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT c.id, c.participant1_id, c.participant2_id, c.created_at, c.updated_at,
                       u1.username AS participant1_username,
                       u2.username AS participant2_username,
                       lm.id AS last_id,
                       lm.sender_id AS last_sender_id,
                       lm.text AS last_text,
                       lm.created_at AS last_created_at,
                       lu.username AS last_sender_username
                FROM conversations c
                LEFT JOIN users u1 ON u1.id = c.participant1_id
                LEFT JOIN users u2 ON u2.id = c.participant2_id
                LEFT JOIN LATERAL (
                    SELECT m.id, m.sender_id, m.text, m.created_at
                    FROM messages m
                    WHERE m.conversation_id = c.id
                    ORDER BY m.created_at DESC, m.seq DESC
                    LIMIT 1
                ) lm ON TRUE
                LEFT JOIN users lu ON lu.id = lm.sender_id
                WHERE c.participant1_id = $1 OR c.participant2_id = $1
                ORDER BY c.updated_at DESC
                "#,
                &[&user_id.as_str()],
            )
            .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }
}
