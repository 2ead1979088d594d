//! The controller's transactional store: entity CRUD plus the
//! serialized challenge-assignment transaction, backed by `sqlx`+SQLite.
//!
//! `Store` wraps a pool and a config, with `migrations::run_migrations`
//! called once at construction. Concrete, entity-typed methods are used
//! throughout rather than a generic get/set/CAS abstraction: this domain's
//! queries (priority ordering, NULLS FIRST tie-breaks, atomic assignment)
//! don't fit that shape.

pub mod agents;
pub mod bootstrap;
pub mod challenges;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod files;
pub mod migrations;
pub mod recordings;
pub mod sessions;
pub mod system_state;
pub mod transmissions;
pub mod users;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex as AsyncMutex;

pub use bootstrap::BOOTSTRAP_USERNAME;
pub use config::StoreConfig;
pub use error::StoreError;

/// In-memory per-challenge timing: the Store serializes reads/writes
/// of this map with the same transaction that flips `status`, since
/// `assign_next_challenge` must treat "is this challenge ready" and "flip it
/// to assigned" as one atomic step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChallengeTiming {
    pub last_tx: DateTime<Utc>,
    pub next_tx: DateTime<Utc>,
}

/// Handle to the controller's database. Cheap to clone (wraps a pool and an
/// `Arc`-shared timing map).
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    config: StoreConfig,
    pub(crate) timing: Arc<AsyncMutex<HashMap<String, ChallengeTiming>>>,
}

impl Store {
    /// Connect, run migrations, and return a ready-to-use store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot be created or
    /// migrations fail.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().max_connections(config.pool_size)
        .connect(&config.database_url)
        .await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self {
                pool,
                config,
                timing: Arc::new(AsyncMutex::new(HashMap::new())),
        })
    }

    /// Wrap an already-connected pool (used by tests with `sqlite::memory:`).
    pub async fn from_pool(pool: SqlitePool, config: StoreConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool).await?;
        Ok(Self {
                pool,
                config,
                timing: Arc::new(AsyncMutex::new(HashMap::new())),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(any(test, feature = "test-util"))]
pub async fn test_store() -> Store {
    // A single pooled connection: each `:memory:` SQLite connection is its
    // own database, so a pool of more than one would silently scatter
    // writes and reads across unrelated databases.
    let pool = SqlitePoolOptions::new().max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("in-memory sqlite connects");
    Store::from_pool(pool, StoreConfig::default())
    .await
    .expect("migrations run")
}
