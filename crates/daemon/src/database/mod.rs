mod sqlite;
mod state_database;

use std::ops::Deref;

use common::state::CursorRegistry;
use sqlx::SqlitePool;

/// SQLite-backed world state.
///
/// Implements [`StateDatabase`](common::state::StateDatabase) over the
///  `world_state` and `savepoint` tables.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
    cursors: CursorRegistry,
}

impl Database {
    /// Connect to `sqlite://<path>` or `sqlite::memory:` and run migrations
    pub async fn connect(database_url: &url::Url) -> Result<Self, DatabaseSetupError> {
        if database_url.scheme() == "sqlite" {
            let db = sqlite::connect_sqlite(database_url).await?;
            sqlite::migrate_sqlite(&db).await?;
            return Ok(Database::new(db));
        }

        Err(DatabaseSetupError::UnknownDbType(
            database_url.scheme().to_string(),
        ))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cursors: CursorRegistry::new(),
        }
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("requested database type was not recognized: {0}")]
    UnknownDbType(String),
}
