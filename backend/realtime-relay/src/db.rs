use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::{Config as PgConfig, NoTls};

use crate::error::AppError;

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_create_conversations",
    include_str!("../migrations/0001_create_conversations.sql"),
)];

/// Build the connection pool, verify connectivity and apply migrations.
pub async fn init_pool(database_url: &str, max_connections: usize) -> Result<Pool, AppError> {
    let pg_config: PgConfig = database_url
        .parse()
        .map_err(|e| AppError::Config(format!("invalid DATABASE_URL: {e}")))?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(max_connections)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(Duration::from_secs(10)))
        .create_timeout(Some(Duration::from_secs(5)))
        .build()
        .map_err(|e| AppError::StartServer(format!("db pool: {e}")))?;

    run_migrations(&pool).await?;

    tracing::info!(max_connections, "database pool ready");
    Ok(pool)
}

async fn run_migrations(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        client
            .batch_execute(sql)
            .await
            .map_err(|e| AppError::StartServer(format!("migration {name}: {e}")))?;
        tracing::debug!(migration = name, "migration applied");
    }
    Ok(())
}
