use std::sync::Arc;

use crate::{
    config::Config,
    db,
    error::AppError,
    services::{
        ConversationStore, IdentityVerifier, InMemoryConversationStore, JwtIdentityVerifier,
        PgConversationStore,
    },
    websocket::{Relay, SessionRegistry},
};

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub relay: Arc<Relay>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ConversationStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            relay: Arc::new(Relay::new(store)),
            verifier,
            config,
        }
    }

    /// Wire up the store and verifier described by `config`
    pub async fn from_config(config: Arc<Config>) -> Result<Self, AppError> {
        let store: Arc<dyn ConversationStore> = match &config.database_url {
            Some(url) => {
                let pool = db::init_pool(url, config.db_max_connections)
                    .await
                    .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
                tracing::info!("using postgres conversation store");
                Arc::new(PgConversationStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, conversations are kept in memory only");
                Arc::new(InMemoryConversationStore::new())
            }
        };

        let verifier = Arc::new(JwtIdentityVerifier::from_secret(&config.jwt_secret)?);

        Ok(Self::new(config, store, verifier))
    }
}
