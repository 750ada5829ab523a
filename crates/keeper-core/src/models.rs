//! Domain types shared by the record store, authenticator and service.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseTagError;

/// Kind of secret held by a record. Selects the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Text,
    File,
    Login,
    Card,
}

impl RecordType {
    /// Every built-in type, in display order.
    pub const ALL: [Self; 4] = [Self::Text, Self::File, Self::Login, Self::Card];

    /// The persisted tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::Login => "login",
            Self::Card => "card",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseTagError {
                kind: "record type",
                value: s.to_owned(),
            })
    }
}

/// The record types this deployment accepts on create.
///
/// Built once at startup and shared read-only; cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedTypes {
    types: Arc<[RecordType]>,
}

impl SupportedTypes {
    /// Restrict to the given types. Duplicates are dropped, order is kept.
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = RecordType>) -> Self {
        let mut unique: Vec<RecordType> = Vec::new();
        for t in types {
            if !unique.contains(&t) {
                unique.push(t);
            }
        }
        Self {
            types: unique.into(),
        }
    }

    #[must_use]
    pub fn contains(&self, record_type: RecordType) -> bool {
        self.types.contains(&record_type)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[RecordType] {
        &self.types
    }
}

impl Default for SupportedTypes {
    fn default() -> Self {
        Self::new(RecordType::ALL)
    }
}

/// Lifecycle of a record. Deleted rows keep their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl RecordState {
    #[must_use]
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        deleted_at.map_or(Self::Active, |at| Self::Deleted { at })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A decrypted record.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub record_type: RecordType,
    /// Encoded payload. See [`crate::codec`].
    pub data: Vec<u8>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("record_type", &self.record_type)
            .field("data", &format_args!("[{} bytes]", self.data.len()))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Listing entry. Never carries the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub id: Uuid,
    pub name: String,
    pub record_type: RecordType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::records::RecordStore::create`].
#[derive(Clone)]
pub struct NewRecord {
    pub owner: Uuid,
    pub name: String,
    pub record_type: RecordType,
    pub data: Vec<u8>,
    pub comment: String,
}

/// A change to exactly one mutable field of a record.
#[derive(Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    Name(String),
    Comment(String),
    Data(Vec<u8>),
}

impl RecordUpdate {
    #[must_use]
    pub fn field(&self) -> RecordField {
        match self {
            Self::Name(_) => RecordField::Name,
            Self::Comment(_) => RecordField::Comment,
            Self::Data(_) => RecordField::Data,
        }
    }
}

/// Name of an updatable record field, as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Name,
    Comment,
    Data,
}

impl RecordField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Comment => "comment",
            Self::Data => "data",
        }
    }
}

impl FromStr for RecordField {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "comment" => Ok(Self::Comment),
            "data" => Ok(Self::Data),
            other => Err(ParseTagError {
                kind: "record field",
                value: other.to_owned(),
            }),
        }
    }
}

/// A registered user, without credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub login: String,
}

/// Result of register/authorize. The token is shown to the caller once.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}
