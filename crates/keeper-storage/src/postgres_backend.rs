//! PostgreSQL storage backend.
//!
//! Creates its schema on connect (`CREATE ... IF NOT EXISTS`), then serves
//! every table through one bounded `PgPool`. Each write is a single
//! statement, so row-level atomicity comes from PostgreSQL itself. The
//! per-owner live-name invariant is a partial unique index, which makes the
//! insert the source of truth even when two requests race past the service's
//! existence check.
//!
//! Feature-gated behind `postgres-backend`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AuthBackend, AuthRow, ColumnUpdate, EventBackend, EventRow, RecordBackend, RecordListing,
    RecordRow, StorageError, UserBackend, UserRow,
};

/// PostgreSQL SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY,
        login         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS auths (
        id         UUID PRIMARY KEY,
        user_id    UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        token_hash TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL
    )",
    r#"CREATE TABLE IF NOT EXISTS records (
        id             UUID PRIMARY KEY,
        user_id        UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        name           TEXT NOT NULL,
        "type"         TEXT NOT NULL,
        data           BYTEA NOT NULL,
        comment        TEXT NOT NULL DEFAULT '',
        created_at     TIMESTAMPTZ NOT NULL,
        updated_at     TIMESTAMPTZ NOT NULL,
        deleted_at     TIMESTAMPTZ,
        data_encrypted BOOLEAN NOT NULL DEFAULT FALSE
    )"#,
    r"CREATE UNIQUE INDEX IF NOT EXISTS records_user_live_name
        ON records (user_id, name) WHERE deleted_at IS NULL",
    r"CREATE TABLE IF NOT EXISTS events (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL,
        record_id   UUID NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        action      TEXT NOT NULL,
        data        BYTEA NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS events_user_time ON events (user_id, occurred_at)",
    r"CREATE INDEX IF NOT EXISTS events_record_time ON events (record_id, occurred_at)",
];

const RECORD_COLUMNS: &str = r#"id, user_id, name, "type" AS record_type, data, comment,
    created_at, updated_at, deleted_at, data_encrypted"#;

const EVENT_COLUMNS: &str = "id, user_id, record_id, occurred_at, action, data";

/// Connection pool limits.
///
/// The pool is the only resource shared across requests, so it stays small
/// and recycles connections to tolerate backend restarts.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            idle_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(120),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// A storage backend backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connect to PostgreSQL and create the schema if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or schema setup fails.
    /// The reason never includes the connection string.
    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(0)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                path: "[redacted]".to_owned(),
                reason: e.to_string(),
            })?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and create the schema if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if a schema statement fails.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StorageError::Open {
                    path: "[redacted]".to_owned(),
                    reason: format!("schema setup failed: {e}"),
                })?;
        }
        info!(statements = SCHEMA.len(), "PostgreSQL schema ready");
        Ok(Self { pool })
    }

    /// Return a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error, turning unique violations into `AlreadyExists`.
fn query_error(op: &'static str, what: impl FnOnce() -> String, err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StorageError::AlreadyExists { what: what() };
        }
    }
    StorageError::Query {
        op,
        reason: err.to_string(),
    }
}

fn plain_error(op: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |err| StorageError::Query {
        op,
        reason: err.to_string(),
    }
}

#[async_trait::async_trait]
impl UserBackend for PostgresBackend {
    async fn create_user(&self, user: &UserRow) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO users (id, login, password_hash) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(&user.login)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error("create user", || format!("user '{}'", user.login), e))?;
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StorageError> {
        sqlx::query_as::<_, UserRow>("SELECT id, login, password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(plain_error("find user by id"))
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<UserRow>, StorageError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, login, password_hash FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(plain_error("find user by login"))
    }

    async fn update_user(&self, user: &UserRow) -> Result<(), StorageError> {
        let result =
            sqlx::query("UPDATE users SET login = $1, password_hash = $2 WHERE id = $3")
                .bind(&user.login)
                .bind(&user.password_hash)
                .bind(user.id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    query_error("update user", || format!("user '{}'", user.login), e)
                })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                what: format!("user {}", user.id),
            });
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(plain_error("delete user"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthBackend for PostgresBackend {
    async fn insert_auth(&self, auth: &AuthRow) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO auths (id, user_id, token_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(auth.id)
        .bind(auth.user_id)
        .bind(&auth.token_hash)
        .bind(auth.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("insert auth", || "auth token".to_owned(), e))?;
        Ok(())
    }

    async fn auth_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AuthRow>, StorageError> {
        sqlx::query_as::<_, AuthRow>(
            "SELECT id, user_id, token_hash, created_at FROM auths WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(plain_error("find auth by token"))
    }

    async fn auths_for_user(&self, user_id: Uuid) -> Result<Vec<AuthRow>, StorageError> {
        sqlx::query_as::<_, AuthRow>(
            "SELECT id, user_id, token_hash, created_at FROM auths
             WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(plain_error("list auths"))
    }
}

#[async_trait::async_trait]
impl RecordBackend for PostgresBackend {
    async fn insert_record(&self, record: &RecordRow) -> Result<(), StorageError> {
        sqlx::query(
            r#"INSERT INTO records (id, user_id, name, "type", data, comment,
                 created_at, updated_at, deleted_at, data_encrypted)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.name)
        .bind(&record.record_type)
        .bind(&record.data)
        .bind(&record.comment)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .bind(record.data_encrypted)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("insert record", || format!("record '{}'", record.name), e))?;
        Ok(())
    }

    async fn record_by_id(&self, id: Uuid) -> Result<Option<RecordRow>, StorageError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = $1");
        sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(plain_error("find record by id"))
    }

    async fn live_record_by_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<RecordRow>, StorageError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE user_id = $1 AND name = $2 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, RecordRow>(&sql)
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(plain_error("find record by name"))
    }

    async fn live_records_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecordListing>, StorageError> {
        sqlx::query_as::<_, RecordListing>(
            r#"SELECT id, name, "type" AS record_type, created_at, updated_at
               FROM records
               WHERE user_id = $1 AND deleted_at IS NULL
               ORDER BY name"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(plain_error("list records"))
    }

    async fn update_live_record(
        &self,
        id: Uuid,
        change: &ColumnUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<RecordRow>, StorageError> {
        let guard = "WHERE id = $2 AND deleted_at IS NULL";
        let query = match change {
            ColumnUpdate::Name(name) => {
                let sql = format!(
                    "UPDATE records SET name = $1, updated_at = $3 {guard} RETURNING {RECORD_COLUMNS}"
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(name)
                    .bind(id)
                    .bind(updated_at)
                    .fetch_optional(&self.pool)
                    .await
            }
            ColumnUpdate::Comment(comment) => {
                let sql = format!(
                    "UPDATE records SET comment = $1, updated_at = $3 {guard} RETURNING {RECORD_COLUMNS}"
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(comment)
                    .bind(id)
                    .bind(updated_at)
                    .fetch_optional(&self.pool)
                    .await
            }
            ColumnUpdate::Data { bytes, encrypted } => {
                let sql = format!(
                    "UPDATE records SET data = $1, updated_at = $3, data_encrypted = $4 {guard} \
                     RETURNING {RECORD_COLUMNS}"
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(bytes)
                    .bind(id)
                    .bind(updated_at)
                    .bind(encrypted)
                    .fetch_optional(&self.pool)
                    .await
            }
        };

        query.map_err(|e| {
            query_error(
                "update record",
                || match change {
                    ColumnUpdate::Name(name) => format!("record '{name}'"),
                    _ => format!("record {id}"),
                },
                e,
            )
        })
    }

    async fn mark_record_deleted(
        &self,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result =
            sqlx::query("UPDATE records SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL")
                .bind(deleted_at)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(plain_error("delete record"))?;

        let deleted = result.rows_affected() > 0;
        debug!(record_id = %id, deleted, "mark record deleted");
        Ok(deleted)
    }
}

#[async_trait::async_trait]
impl EventBackend for PostgresBackend {
    async fn append_event(&self, event: &EventRow) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO events (id, user_id, record_id, occurred_at, action, data)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.record_id)
        .bind(event.occurred_at)
        .bind(&event.action)
        .bind(&event.data)
        .execute(&self.pool)
        .await
        .map_err(plain_error("append event"))?;
        Ok(())
    }

    async fn events_for_user(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventRow>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = $1 AND ($2::timestamptz IS NULL OR occurred_at >= $2)
             ORDER BY occurred_at"
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(plain_error("list user events"))
    }

    async fn events_for_record(
        &self,
        record_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventRow>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE record_id = $1 AND ($2::timestamptz IS NULL OR occurred_at >= $2)
             ORDER BY occurred_at"
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(record_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(plain_error("list record events"))
    }
}
