//! Error types for `keeper-core`.
//!
//! Inner layers (codec, cipher, record store, authenticator) keep detailed
//! errors. [`ServiceError`] is the outward taxonomy: storage and cipher
//! detail is logged where it is converted and never carried across.

use keeper_storage::StorageError;

use crate::models::RecordType;

/// A tag string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseTagError {
    pub kind: &'static str,
    pub value: String,
}

/// Errors from encoding or decoding typed payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes do not have the shape of the requested record type.
    #[error("malformed {record_type} payload: {reason}")]
    Decode {
        record_type: RecordType,
        reason: String,
    },

    /// A well-formed payload breaks an input rule.
    #[error("invalid {record_type} payload: {reason}")]
    Invalid {
        record_type: RecordType,
        reason: String,
    },

    /// Serialization of a payload failed.
    #[error("failed to encode {record_type} payload: {reason}")]
    Encode {
        record_type: RecordType,
        reason: String,
    },
}

/// Errors from the at-rest cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// A row is flagged encrypted but no key is configured.
    #[error("record is encrypted but no encryption key is configured")]
    MissingKey,

    /// Authentication failed in every supported ciphertext format.
    #[error("decryption failed: {reason}")]
    Decrypt { reason: String },

    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encrypt { reason: String },
}

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// No (live) record matches.
    #[error("record not found")]
    NotFound,

    /// The owner already has a live record with this name.
    #[error("record '{name}' already exists")]
    AlreadyExists { name: String },

    /// A stored row cannot be turned back into a record.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: uuid::Uuid, reason: String },

    #[error("record cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("record storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for RecordError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

/// Errors from registration, login and token resolution.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Login or password is empty after trimming.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The login is already registered.
    #[error("login '{login}' is already taken")]
    AlreadyExists { login: String },

    /// Unknown login or wrong password. The two cases are indistinguishable.
    #[error("invalid login or password")]
    InvalidCredentials,

    /// Missing or unknown bearer token.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Password hashing failed or the blocking task died.
    #[error("password hashing failed: {reason}")]
    Hash { reason: String },

    #[error("auth storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors returned by [`crate::service::VaultService`].
///
/// Messages are safe to show to clients.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("{reason}")]
    InvalidArgument { reason: String },

    #[error("{what} already exists")]
    AlreadyExists { what: String },

    #[error("{what} not found")]
    NotFound { what: String },

    /// Storage or cipher failure. Detail has already been logged.
    #[error("internal error")]
    Internal,
}

impl ServiceError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidArgument { reason } => Self::InvalidArgument { reason },
            AuthError::AlreadyExists { login } => Self::AlreadyExists {
                what: format!("user '{login}'"),
            },
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::Hash { .. } | AuthError::Storage(_) => {
                tracing::error!(error = %err, "auth operation failed");
                Self::Internal
            }
        }
    }
}

impl From<RecordError> for ServiceError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound => Self::NotFound {
                what: "record".to_owned(),
            },
            RecordError::AlreadyExists { name } => Self::AlreadyExists {
                what: format!("record '{name}'"),
            },
            RecordError::Corrupt { .. } | RecordError::Cipher(_) | RecordError::Storage(_) => {
                tracing::error!(error = %err, "record operation failed");
                Self::Internal
            }
        }
    }
}
