pub mod conversation_resolver;
pub mod conversation_store;
pub mod identity;
pub mod memory_store;
pub mod pg_store;

pub use conversation_resolver::ConversationResolver;
pub use conversation_store::ConversationStore;
pub use identity::{IdentityVerifier, JwtIdentityVerifier};
pub use memory_store::InMemoryConversationStore;
pub use pg_store::PgConversationStore;
