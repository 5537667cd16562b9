use std::sync::Arc;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::RunQueryDsl;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
#[cfg(feature = "postgres")]
use crate::db::postgres::{
    PostgresStandupStore, PostgresStandupTimeStore, PostgresStandupUserStore, PostgresUserStore,
};
#[cfg(feature = "sqlite")]
use crate::db::sqlite::{
    SqliteStandupStore, SqliteStandupTimeStore, SqliteStandupUserStore, SqliteUserStore,
};
use crate::db::{DatabaseError, StandupStore, StandupTimeStore, StandupUserStore, UserStore};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    user_store: Arc<dyn UserStore>,
    standup_user_store: Arc<dyn StandupUserStore>,
    standup_time_store: Arc<dyn StandupTimeStore>,
    standup_store: Arc<dyn StandupStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let manager = ConnectionManager::<PgConnection>::new(config.connection_string());

                let pool = r2d2::Pool::builder()
                    .max_size(config.max_connections().unwrap_or(10))
                    .min_idle(Some(config.min_connections().unwrap_or(1)))
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                Ok(Self {
                    user_store: Arc::new(PostgresUserStore::new(pool.clone())),
                    standup_user_store: Arc::new(PostgresStandupUserStore::new(pool.clone())),
                    standup_time_store: Arc::new(PostgresStandupTimeStore::new(pool.clone())),
                    standup_store: Arc::new(PostgresStandupStore::new(pool.clone())),
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite database path is missing".to_string())
                })?;
                Ok(Self::with_sqlite_path(path))
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "sqlite")]
    fn with_sqlite_path(path: String) -> Self {
        let path_arc = Arc::new(path.clone());

        Self {
            #[cfg(feature = "postgres")]
            postgres_pool: None,
            sqlite_path: Some(path),
            user_store: Arc::new(SqliteUserStore::new(path_arc.clone())),
            standup_user_store: Arc::new(SqliteStandupUserStore::new(path_arc.clone())),
            standup_time_store: Arc::new(SqliteStandupTimeStore::new(path_arc.clone())),
            standup_store: Arc::new(SqliteStandupStore::new(path_arc)),
            db_type: DbType::Sqlite,
        }
    }

    /// Fresh, migrated database in a temporary directory. The directory is
    /// removed when the returned guard is dropped.
    #[cfg(all(test, feature = "sqlite"))]
    pub async fn sqlite_for_tests() -> (tempfile::TempDir, Self) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("standup.db");
        let manager = Self::with_sqlite_path(path.to_string_lossy().into_owned());
        manager.migrate().await.expect("migrate test database");
        (dir, manager)
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool is not initialized".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path is not initialized".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    user_id TEXT NOT NULL UNIQUE,
                    user_name TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT '',
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standup_users (
                    id BIGSERIAL PRIMARY KEY,
                    slack_user_id TEXT NOT NULL,
                    slack_name TEXT NOT NULL,
                    channel_id TEXT NOT NULL,
                    channel TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    UNIQUE (slack_name, channel_id)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standup_times (
                    id BIGSERIAL PRIMARY KEY,
                    channel_id TEXT NOT NULL UNIQUE,
                    channel TEXT NOT NULL,
                    time BIGINT NOT NULL,
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standups (
                    id BIGSERIAL PRIMARY KEY,
                    channel_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    comment TEXT NOT NULL,
                    message_ts TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standup_edit_history (
                    id BIGSERIAL PRIMARY KEY,
                    standup_id BIGINT NOT NULL REFERENCES standups(id) ON DELETE CASCADE,
                    standup_text TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_users_user_name ON users(user_name)",
                "CREATE INDEX IF NOT EXISTS idx_standups_message_ts ON standups(message_ts)",
                "CREATE INDEX IF NOT EXISTS idx_standups_channel_created ON standups(channel_id, created_at)",
                "CREATE INDEX IF NOT EXISTS idx_standups_user_created ON standups(user_id, created_at)",
                "CREATE INDEX IF NOT EXISTS idx_standup_edit_history_standup ON standup_edit_history(standup_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = crate::db::sqlite::establish_connection(&path)?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL UNIQUE,
                    user_name TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standup_users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    slack_user_id TEXT NOT NULL,
                    slack_name TEXT NOT NULL,
                    channel_id TEXT NOT NULL,
                    channel TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (slack_name, channel_id)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standup_times (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    channel_id TEXT NOT NULL UNIQUE,
                    channel TEXT NOT NULL,
                    time BIGINT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    channel_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    comment TEXT NOT NULL,
                    message_ts TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS standup_edit_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    standup_id INTEGER NOT NULL REFERENCES standups(id) ON DELETE CASCADE,
                    standup_text TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_users_user_name ON users(user_name)",
                "CREATE INDEX IF NOT EXISTS idx_standups_message_ts ON standups(message_ts)",
                "CREATE INDEX IF NOT EXISTS idx_standups_channel_created ON standups(channel_id, created_at)",
                "CREATE INDEX IF NOT EXISTS idx_standups_user_created ON standups(user_id, created_at)",
                "CREATE INDEX IF NOT EXISTS idx_standup_edit_history_standup ON standup_edit_history(standup_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn user_store(&self) -> Arc<dyn UserStore> {
        self.user_store.clone()
    }

    pub fn standup_user_store(&self) -> Arc<dyn StandupUserStore> {
        self.standup_user_store.clone()
    }

    pub fn standup_time_store(&self) -> Arc<dyn StandupTimeStore> {
        self.standup_time_store.clone()
    }

    pub fn standup_store(&self) -> Arc<dyn StandupStore> {
        self.standup_store.clone()
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}
