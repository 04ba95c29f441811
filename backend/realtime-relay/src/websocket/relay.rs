//! Intent dispatch for authenticated sessions.
//!
//! `Relay::handle` is the single entry point: it takes the session and a
//! parsed intent, performs authorization and persistence, and returns the
//! emissions to perform. It never touches the transport, so everything here
//! is testable with a store and a registry alone. `deliver` applies the
//! emissions through the `SessionRegistry`.

use std::sync::Arc;

use super::message_types::{
    GetMessagesPayload, Intent, OutboundEvent, SendMessagePayload, StartConversationPayload,
};
use super::{ConnectionId, SessionRegistry};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Conversation, ConversationId, UserId};
use crate::services::{ConversationResolver, ConversationStore};

/// Authenticated connection: who is acting, and on which connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// Effect produced by handling an intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// To the requesting connection only
    Reply(OutboundEvent),
    /// To every live connection joined under `user_id`
    Room {
        user_id: UserId,
        event: OutboundEvent,
    },
}

#[derive(Clone)]
pub struct Relay {
    store: Arc<dyn ConversationStore>,
    resolver: ConversationResolver,
}

impl Relay {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        let resolver = ConversationResolver::new(store.clone());
        Self { store, resolver }
    }

    /// Handle one intent. Failures never escape: they become an `error`
    /// reply (or nothing at all for an empty message).
    pub async fn handle(&self, session: &Session, intent: Intent) -> Vec<Emission> {
        let name = intent.name();
        let result = match intent {
            Intent::GetConversations => self.list_conversations(session).await,
            Intent::GetMessages(payload) => self.list_messages(session, payload).await,
            Intent::StartConversation(payload) => self.start_conversation(session, payload).await,
            Intent::SendMessage(payload) => self.send_message(session, payload).await,
        };

        match result {
            Ok(emissions) => {
                metrics::record_intent(name, "ok");
                emissions
            }
            Err(err) => {
                metrics::record_intent(name, err.kind());
                match &err {
                    AppError::Database(detail) => tracing::error!(
                        user_id = %session.user_id,
                        intent = name,
                        error = %detail,
                        "store failure while handling intent"
                    ),
                    _ => tracing::debug!(
                        user_id = %session.user_id,
                        intent = name,
                        error = %err,
                        "intent rejected"
                    ),
                }
                vec![Emission::Reply(OutboundEvent::error(&err))]
            }
        }
    }

    async fn list_conversations(&self, session: &Session) -> AppResult<Vec<Emission>> {
        let conversations = self.store.list_for_user(&session.user_id).await?;
        Ok(vec![Emission::Reply(OutboundEvent::Conversations(
            conversations,
        ))])
    }

    async fn list_messages(
        &self,
        session: &Session,
        payload: GetMessagesPayload,
    ) -> AppResult<Vec<Emission>> {
        let conversation = self
            .authorized_conversation(session, &payload.conversation_id)
            .await?;
        let messages = self.store.list_messages(conversation.id).await?;

        Ok(vec![Emission::Reply(OutboundEvent::Messages {
            conversation_id: conversation.id,
            messages,
        })])
    }

    async fn start_conversation(
        &self,
        session: &Session,
        payload: StartConversationPayload,
    ) -> AppResult<Vec<Emission>> {
        let other = UserId::new(payload.other_user_id);
        let conversation_id = self.resolver.find_or_create(&session.user_id, &other).await?;

        Ok(vec![Emission::Reply(OutboundEvent::ConversationStarted {
            conversation_id,
        })])
    }

    async fn send_message(
        &self,
        session: &Session,
        payload: SendMessagePayload,
    ) -> AppResult<Vec<Emission>> {
        let text = payload.text.as_deref().map(trim_blank).unwrap_or_default();
        if text.is_empty() {
            tracing::debug!(user_id = %session.user_id, "dropping empty message");
            return Ok(Vec::new());
        }

        let conversation = self
            .authorized_conversation(session, &payload.conversation_id)
            .await?;

        let message = self
            .store
            .append_message(conversation.id, &session.user_id, text)
            .await?;
        // The message is already persisted; a stale activity stamp must not
        // stop it from reaching the rooms.
        if let Err(e) = self.store.touch_activity(conversation.id).await {
            tracing::error!(
                user_id = %session.user_id,
                conversation_id = %conversation.id,
                error = %e,
                "failed to bump conversation activity"
            );
        }

        let event = OutboundEvent::NewMessage {
            conversation_id: conversation.id,
            message,
        };
        let other = conversation.other_participant(&session.user_id).clone();

        Ok(vec![
            Emission::Room {
                user_id: session.user_id.clone(),
                event: event.clone(),
            },
            Emission::Room {
                user_id: other,
                event,
            },
        ])
    }

    /// Conversation named by a client-supplied id, provided the acting user
    /// participates in it. Unknown ids fold into `Unauthorized`.
    async fn authorized_conversation(
        &self,
        session: &Session,
        raw_id: &str,
    ) -> AppResult<Conversation> {
        let id = ConversationId::parse(raw_id).ok_or(AppError::Unauthorized)?;
        match self.store.find_by_id(id).await? {
            Some(conversation) if conversation.has_participant(&session.user_id) => {
                Ok(conversation)
            }
            _ => Err(AppError::Unauthorized),
        }
    }
}

/// Trim whitespace and byte-order marks from both ends
fn trim_blank(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

/// Apply emissions through the registry. Rooms without live connections
/// (including a requester that has since disconnected) are skipped silently.
pub fn deliver(registry: &SessionRegistry, session: &Session, emissions: Vec<Emission>) {
    for emission in emissions {
        match emission {
            Emission::Reply(event) => {
                if !registry.send_to(session.connection_id, &event) {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        "requester gone, reply dropped"
                    );
                }
            }
            Emission::Room { user_id, event } => {
                registry.broadcast(&user_id, &event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryConversationStore;
    use async_trait::async_trait;

    use crate::models::{ConversationSummary, Message};

    fn session(user: &str) -> Session {
        Session {
            connection_id: ConnectionId::new(),
            user_id: UserId::from(user),
        }
    }

    fn start(other: &str) -> Intent {
        Intent::StartConversation(StartConversationPayload {
            other_user_id: other.to_string(),
        })
    }

    fn send(conversation_id: ConversationId, text: &str) -> Intent {
        Intent::SendMessage(SendMessagePayload {
            conversation_id: conversation_id.to_string(),
            text: Some(text.to_string()),
        })
    }

    fn started_id(emissions: &[Emission]) -> ConversationId {
        match emissions {
            [Emission::Reply(OutboundEvent::ConversationStarted { conversation_id })] => {
                *conversation_id
            }
            other => panic!("expected conversation:started, got {other:?}"),
        }
    }

    fn setup() -> (Arc<InMemoryConversationStore>, Relay) {
        let store = Arc::new(InMemoryConversationStore::with_users([
            ("u1", "alice"),
            ("u2", "bob"),
        ]));
        let relay = Relay::new(store.clone());
        (store, relay)
    }

    #[tokio::test]
    async fn test_start_conversation_with_self_errors() {
        let (store, relay) = setup();
        let emissions = relay.handle(&session("u1"), start("u1")).await;

        assert_eq!(
            emissions,
            vec![Emission::Reply(OutboundEvent::Error {
                message: "You cannot chat with yourself.".into()
            })]
        );
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_conversation_idempotent_from_both_sides() {
        let (store, relay) = setup();

        let x = started_id(&relay.handle(&session("u1"), start("u2")).await);
        let y = started_id(&relay.handle(&session("u2"), start("u1")).await);

        assert_eq!(x, y);
        assert_eq!(store.conversation_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_messages_by_outsider_is_unauthorized() {
        let (_store, relay) = setup();
        let id = started_id(&relay.handle(&session("u1"), start("u2")).await);

        let emissions = relay
            .handle(
                &session("u3"),
                Intent::GetMessages(GetMessagesPayload {
                    conversation_id: id.to_string(),
                }),
            )
            .await;

        assert_eq!(
            emissions,
            vec![Emission::Reply(OutboundEvent::Error {
                message: "Unauthorized".into()
            })]
        );
    }

    #[tokio::test]
    async fn test_unknown_conversation_folds_into_unauthorized() {
        let (_store, relay) = setup();

        for raw in ["conv-1".to_string(), ConversationId::new().to_string()] {
            let emissions = relay
                .handle(
                    &session("u1"),
                    Intent::GetMessages(GetMessagesPayload {
                        conversation_id: raw,
                    }),
                )
                .await;
            assert_eq!(
                emissions,
                vec![Emission::Reply(OutboundEvent::Error {
                    message: "Unauthorized".into()
                })]
            );
        }
    }

    #[tokio::test]
    async fn test_blank_message_is_dropped_silently() {
        let (store, relay) = setup();
        let id = started_id(&relay.handle(&session("u1"), start("u2")).await);

        for text in ["", "   ", "\n\t", "\u{FEFF}", " \u{FEFF}\u{00A0} "] {
            assert!(relay.handle(&session("u1"), send(id, text)).await.is_empty());
        }
        let missing_text = Intent::SendMessage(SendMessagePayload {
            conversation_id: id.to_string(),
            text: None,
        });
        assert!(relay.handle(&session("u1"), missing_text).await.is_empty());

        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_byte_order_marks_are_trimmed_from_stored_text() {
        let (_store, relay) = setup();
        let id = started_id(&relay.handle(&session("u1"), start("u2")).await);

        let emissions = relay
            .handle(&session("u1"), send(id, "\u{FEFF} hi \u{FEFF}"))
            .await;

        match emissions.first() {
            Some(Emission::Room {
                event: OutboundEvent::NewMessage { message, .. },
                ..
            }) => assert_eq!(message.text, "hi"),
            other => panic!("expected new:message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_message_targets_both_rooms_with_same_payload() {
        let (store, relay) = setup();
        let id = started_id(&relay.handle(&session("u1"), start("u2")).await);

        let emissions = relay.handle(&session("u1"), send(id, "  Hello!  ")).await;

        let (first, second) = match emissions.as_slice() {
            [Emission::Room {
                user_id: a,
                event: first,
            }, Emission::Room {
                user_id: b,
                event: second,
            }] => {
                assert_eq!(a.as_str(), "u1");
                assert_eq!(b.as_str(), "u2");
                (first.clone(), second.clone())
            }
            other => panic!("unexpected emissions {other:?}"),
        };
        assert_eq!(first, second);

        match first {
            OutboundEvent::NewMessage {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, id);
                assert_eq!(message.text, "Hello!");
                assert_eq!(message.sender_id.as_str(), "u1");
                assert_eq!(message.sender.username, "alice");
            }
            other => panic!("expected new:message, got {other:?}"),
        }
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_send_message_by_outsider_is_unauthorized_and_not_stored() {
        let (store, relay) = setup();
        let id = started_id(&relay.handle(&session("u1"), start("u2")).await);

        let emissions = relay.handle(&session("u3"), send(id, "hi")).await;

        assert_eq!(
            emissions,
            vec![Emission::Reply(OutboundEvent::Error {
                message: "Unauthorized".into()
            })]
        );
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_get_conversations_lists_latest_first() {
        let (_store, relay) = setup();
        let first = started_id(&relay.handle(&session("u1"), start("u2")).await);
        let second = started_id(&relay.handle(&session("u1"), start("u3")).await);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        relay.handle(&session("u2"), send(first, "newest")).await;

        let emissions = relay.handle(&session("u1"), Intent::GetConversations).await;
        let conversations = match emissions.as_slice() {
            [Emission::Reply(OutboundEvent::Conversations(list))] => list.clone(),
            other => panic!("unexpected emissions {other:?}"),
        };

        let ids: Vec<ConversationId> = conversations.iter().map(|c| c.conversation.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(
            conversations[0].latest_message().map(|m| m.text.as_str()),
            Some("newest")
        );
    }

    struct FailingStore;

    #[async_trait]
    impl ConversationStore for FailingStore {
        async fn find_by_participants(
            &self,
            _a: &UserId,
            _b: &UserId,
        ) -> AppResult<Option<Conversation>> {
            Err(AppError::Database("connection reset".into()))
        }

        async fn create(&self, _a: &UserId, _b: &UserId) -> AppResult<Conversation> {
            Err(AppError::Database("connection reset".into()))
        }

        async fn find_by_id(&self, _id: ConversationId) -> AppResult<Option<Conversation>> {
            Err(AppError::Database("connection reset".into()))
        }

        async fn touch_activity(&self, _id: ConversationId) -> AppResult<()> {
            Err(AppError::Database("connection reset".into()))
        }

        async fn append_message(
            &self,
            _id: ConversationId,
            _sender_id: &UserId,
            _text: &str,
        ) -> AppResult<Message> {
            Err(AppError::Database("connection reset".into()))
        }

        async fn list_messages(&self, _id: ConversationId) -> AppResult<Vec<Message>> {
            Err(AppError::Database("connection reset".into()))
        }

        async fn list_for_user(&self, _user_id: &UserId) -> AppResult<Vec<ConversationSummary>> {
            Err(AppError::Database("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_becomes_generic_error_reply() {
        let relay = Relay::new(Arc::new(FailingStore));

        for intent in [Intent::GetConversations, start("u2")] {
            let emissions = relay.handle(&session("u1"), intent).await;
            assert_eq!(
                emissions,
                vec![Emission::Reply(OutboundEvent::Error {
                    message: "Internal server error".into()
                })]
            );
        }
    }

    /// In-memory store whose activity bump always fails
    struct StaleActivityStore(InMemoryConversationStore);

    #[async_trait]
    impl ConversationStore for StaleActivityStore {
        async fn find_by_participants(
            &self,
            a: &UserId,
            b: &UserId,
        ) -> AppResult<Option<Conversation>> {
            self.0.find_by_participants(a, b).await
        }

        async fn create(&self, a: &UserId, b: &UserId) -> AppResult<Conversation> {
            self.0.create(a, b).await
        }

        async fn find_by_id(&self, id: ConversationId) -> AppResult<Option<Conversation>> {
            self.0.find_by_id(id).await
        }

        async fn touch_activity(&self, _id: ConversationId) -> AppResult<()> {
            Err(AppError::Database("statement timeout".into()))
        }

        async fn append_message(
            &self,
            id: ConversationId,
            sender_id: &UserId,
            text: &str,
        ) -> AppResult<Message> {
            self.0.append_message(id, sender_id, text).await
        }

        async fn list_messages(&self, id: ConversationId) -> AppResult<Vec<Message>> {
            self.0.list_messages(id).await
        }

        async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<ConversationSummary>> {
            self.0.list_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_persisted_message_fans_out_when_activity_bump_fails() {
        let store = Arc::new(StaleActivityStore(InMemoryConversationStore::new()));
        let relay = Relay::new(store.clone());
        let id = started_id(&relay.handle(&session("u1"), start("u2")).await);

        let emissions = relay.handle(&session("u1"), send(id, "still delivered")).await;

        assert_eq!(emissions.len(), 2);
        assert!(emissions
            .iter()
            .all(|e| matches!(e, Emission::Room { event: OutboundEvent::NewMessage { .. }, .. })));
        assert_eq!(store.0.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_deliver_routes_reply_and_rooms() {
        let (_store, relay) = setup();
        let registry = SessionRegistry::new();

        let (u1_conn, mut u1_rx) = registry.join("u1".into());
        let (_u1_other, mut u1_other_rx) = registry.join("u1".into());
        let (_u2_conn, mut u2_rx) = registry.join("u2".into());
        let actor = Session {
            connection_id: u1_conn,
            user_id: "u1".into(),
        };

        let emissions = relay.handle(&actor, start("u2")).await;
        let id = started_id(&emissions);
        deliver(&registry, &actor, emissions);
        assert!(u1_rx.try_recv().unwrap().contains("conversation:started"));
        assert!(u1_other_rx.try_recv().is_err());
        assert!(u2_rx.try_recv().is_err());

        let emissions = relay.handle(&actor, send(id, "hey")).await;
        deliver(&registry, &actor, emissions);
        let a = u1_rx.try_recv().unwrap();
        let b = u1_other_rx.try_recv().unwrap();
        let c = u2_rx.try_recv().unwrap();
        assert!(a.contains("new:message"));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }
}
