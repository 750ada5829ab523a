//! Storage backend abstraction for Keeper.
//!
//! This crate defines the row types and backend traits for the four tables
//! Keeper persists: users, auth sessions, records and events. Backends know
//! nothing about encryption: the record `data` column is an opaque byte
//! string plus the `data_encrypted` flag written by the caller. The record
//! store in `keeper-core` wraps a [`RecordBackend`] to encrypt payloads before
//! they reach this layer.
//!
//! Two implementations are provided:
//!
//! - [`PostgresBackend`]: production backend (feature `postgres-backend`)
//! - [`MemoryBackend`]: in-memory, for tests and development

mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::{PoolSettings, PostgresBackend};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct UserRow {
    pub id: Uuid,
    /// Case-sensitive, unique across all users.
    pub login: String,
    /// Argon2id PHC string.
    pub password_hash: String,
}

/// A bearer session. Only the SHA-256 hex digest of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct AuthRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A stored record exactly as it sits in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct RecordRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub record_type: String,
    /// Payload bytes, ciphertext when `data_encrypted` is set.
    pub data: Vec<u8>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub data_encrypted: bool,
}

/// Record listing entry. Never carries the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct RecordListing {
    pub id: Uuid,
    pub name: String,
    pub record_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&RecordRow> for RecordListing {
    fn from(row: &RecordRow) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            record_type: row.record_type.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A single-column change applied to a live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnUpdate {
    Name(String),
    Comment(String),
    Data { bytes: Vec<u8>, encrypted: bool },
}

/// An entry of the append-only event journal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct EventRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub record_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub action: String,
    pub data: Vec<u8>,
}

/// Persistence for user accounts.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait UserBackend: Send + Sync + 'static {
    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the login is taken.
    async fn create_user(&self, user: &UserRow) -> Result<(), StorageError>;

    /// Fetch a user by id. Returns `Ok(None)` if absent.
    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StorageError>;

    /// Fetch a user by exact login. Returns `Ok(None)` if absent.
    async fn user_by_login(&self, login: &str) -> Result<Option<UserRow>, StorageError>;

    /// Overwrite login and password hash of an existing user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no user has this id.
    async fn update_user(&self, user: &UserRow) -> Result<(), StorageError>;

    /// Physically remove a user. Idempotent.
    async fn delete_user(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Persistence for bearer sessions.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Insert a session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] on a token hash collision.
    async fn insert_auth(&self, auth: &AuthRow) -> Result<(), StorageError>;

    /// Look up a session by the SHA-256 hex digest of its token.
    async fn auth_by_token_hash(&self, token_hash: &str)
        -> Result<Option<AuthRow>, StorageError>;

    /// All sessions of one user, oldest first.
    async fn auths_for_user(&self, user_id: Uuid) -> Result<Vec<AuthRow>, StorageError>;
}

/// Persistence for secret records.
///
/// A record is *live* while `deleted_at` is `None`. For each user at most one
/// live record may carry a given name; backends enforce this on insert and
/// rename so that a racing check-then-insert cannot break it.
#[async_trait::async_trait]
pub trait RecordBackend: Send + Sync + 'static {
    /// Insert a record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the owner already has a
    /// live record with this name.
    async fn insert_record(&self, record: &RecordRow) -> Result<(), StorageError>;

    /// Fetch a record by id, live or soft-deleted.
    async fn record_by_id(&self, id: Uuid) -> Result<Option<RecordRow>, StorageError>;

    /// Fetch the owner's live record with this name.
    async fn live_record_by_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<RecordRow>, StorageError>;

    /// List the owner's live records ordered by name, without payloads.
    async fn live_records_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecordListing>, StorageError>;

    /// Apply one column change to a live record and stamp `updated_at`.
    ///
    /// Returns the updated row, or `Ok(None)` if no live record has this id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a rename collides with
    /// another live record of the same owner.
    async fn update_live_record(
        &self,
        id: Uuid,
        change: &ColumnUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<RecordRow>, StorageError>;

    /// Stamp `deleted_at` on a live record.
    ///
    /// Returns `false` when no live record has this id.
    async fn mark_record_deleted(
        &self,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}

/// Append-only event journal.
#[async_trait::async_trait]
pub trait EventBackend: Send + Sync + 'static {
    /// Append an event.
    async fn append_event(&self, event: &EventRow) -> Result<(), StorageError>;

    /// Events of a user at or after `since`, oldest first.
    async fn events_for_user(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventRow>, StorageError>;

    /// Events of a record at or after `since`, oldest first.
    async fn events_for_record(
        &self,
        record_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventRow>, StorageError>;
}
