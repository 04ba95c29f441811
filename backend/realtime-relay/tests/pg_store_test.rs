//! Postgres store tests. Run with a scratch database:
//!
//! TEST_DATABASE_URL=postgres://... cargo test -p realtime-relay -- --ignored

use std::sync::Arc;

use deadpool_postgres::Pool;
use realtime_relay::db;
use realtime_relay::models::{ConversationId, UserId};
use realtime_relay::services::{ConversationResolver, ConversationStore, PgConversationStore};
use uuid::Uuid;

async fn setup() -> (Pool, PgConversationStore) {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = db::init_pool(&url, 4).await.unwrap();

    let client = pool.get().await.unwrap();
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, username TEXT NOT NULL)",
        )
        .await
        .unwrap();
    drop(client);

    (pool.clone(), PgConversationStore::new(pool))
}

/// Fresh user ids so runs never collide with earlier data
fn user(pool_tag: &str) -> UserId {
    UserId::new(format!("{pool_tag}-{}", Uuid::new_v4()))
}

async fn add_user(pool: &Pool, id: &UserId, username: &str) {
    let client = pool.get().await.unwrap();
    client
        .execute(
            "INSERT INTO users (id, username) VALUES ($1, $2)",
            &[&id.as_str(), &username],
        )
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn pair_is_unique_in_either_order() {
    let (_pool, store) = setup().await;
    let a = user("a");
    let b = user("b");

    let first = store.create(&a, &b).await.unwrap();
    // Losing insert returns the existing row instead of failing
    let second = store.create(&b, &a).await.unwrap();

    assert_eq!(first.id, second.id);
    let found = store.find_by_participants(&b, &a).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
#[ignore]
async fn concurrent_first_contact_converges() {
    let (_pool, store) = setup().await;
    let resolver = ConversationResolver::new(Arc::new(store));
    let a = user("a");
    let b = user("b");

    let (x, y) = tokio::join!(resolver.find_or_create(&a, &b), resolver.find_or_create(&b, &a));

    assert_eq!(x.unwrap(), y.unwrap());
}

#[tokio::test]
#[ignore]
async fn messages_carry_profiles_and_keep_order() {
    let (pool, store) = setup().await;
    let a = user("a");
    let b = user("b");
    add_user(&pool, &a, "alice").await;

    let conv = store.create(&a, &b).await.unwrap();
    for text in ["one", "two", "three"] {
        store.append_message(conv.id, &a, text).await.unwrap();
    }
    store.append_message(conv.id, &b, "reply").await.unwrap();
    store.touch_activity(conv.id).await.unwrap();

    let messages = store.list_messages(conv.id).await.unwrap();
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three", "reply"]);
    assert_eq!(messages[0].sender.username, "alice");
    assert_eq!(messages[3].sender.username, format!("user_{b}"));

    let summaries = store.list_for_user(&a).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(
        summaries[0].latest_message().map(|m| m.text.as_str()),
        Some("reply")
    );
    assert_eq!(summaries[0].participant1.username, "alice");
}

#[tokio::test]
#[ignore]
async fn touching_unknown_conversation_is_not_found() {
    let (_pool, store) = setup().await;

    let err = store
        .touch_activity(ConversationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, realtime_relay::error::AppError::NotFound));
    assert!(store.find_by_id(ConversationId::new()).await.unwrap().is_none());
}
