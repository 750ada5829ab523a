//! The vault's public operations.
//!
//! [`VaultService`] is what the transport calls. Every record operation first
//! resolves the bearer token; the resolved user is the only source of
//! tenancy, and records owned by someone else look exactly like records that
//! do not exist.

use std::sync::Arc;

use keeper_storage::{AuthBackend, RecordBackend, UserBackend};
use tracing::debug;
use uuid::Uuid;

use crate::auth::SessionAuthenticator;
use crate::cipher::AtRestCipher;
use crate::error::{RecordError, ServiceError};
use crate::models::{
    NewRecord, Record, RecordField, RecordSummary, RecordType, RecordUpdate, Session,
    SupportedTypes, User,
};
use crate::records::RecordStore;

/// Multi-user secret vault operations.
#[derive(Debug, Clone)]
pub struct VaultService {
    auth: SessionAuthenticator,
    records: RecordStore,
    types: SupportedTypes,
}

impl VaultService {
    #[must_use]
    pub fn new(auth: SessionAuthenticator, records: RecordStore, types: SupportedTypes) -> Self {
        Self {
            auth,
            records,
            types,
        }
    }

    /// Build the service on one backend that stores users, sessions and records.
    #[must_use]
    pub fn with_backend<B>(backend: B, cipher: AtRestCipher, types: SupportedTypes) -> Self
    where
        B: UserBackend + AuthBackend + RecordBackend + Clone,
    {
        let auth = SessionAuthenticator::new(Arc::new(backend.clone()), Arc::new(backend.clone()));
        let records = RecordStore::new(Arc::new(backend), cipher);
        Self::new(auth, records, types)
    }

    #[must_use]
    pub fn supported_types(&self) -> &SupportedTypes {
        &self.types
    }

    /// Liveness check. The message is ignored.
    #[must_use]
    pub fn ping(&self, message: &str) -> String {
        debug!(len = message.len(), "ping");
        "pong".to_owned()
    }

    /// Create an account and return its first session.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidArgument`] for blank credentials,
    /// [`ServiceError::AlreadyExists`] for a taken login.
    pub async fn register(&self, login: &str, password: &str) -> Result<Session, ServiceError> {
        Ok(self.auth.register(login, password).await?)
    }

    /// Open a new session for existing credentials.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidArgument`] for blank credentials,
    /// [`ServiceError::InvalidCredentials`] otherwise.
    pub async fn authorize(&self, login: &str, password: &str) -> Result<Session, ServiceError> {
        Ok(self.auth.authorize(login, password).await?)
    }

    /// Store a new secret for the token's user.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unauthenticated`] for a bad token.
    /// - [`ServiceError::InvalidArgument`] for a blank name or an unsupported type.
    /// - [`ServiceError::AlreadyExists`] if a live record has this name.
    pub async fn create_record(
        &self,
        token: &str,
        name: &str,
        record_type: &str,
        data: Vec<u8>,
        comment: &str,
    ) -> Result<Record, ServiceError> {
        let user = self.authenticate(token).await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid("record name must not be empty"));
        }
        let record_type = self.supported(record_type)?;

        if self.records.name_taken(user.id, name).await? {
            return Err(RecordError::AlreadyExists {
                name: name.to_owned(),
            }
            .into());
        }

        let record = self
            .records
            .create(NewRecord {
                owner: user.id,
                name: name.to_owned(),
                record_type,
                data,
                comment: comment.trim().to_owned(),
            })
            .await?;
        Ok(record)
    }

    /// Fetch one of the user's live records by name.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthenticated`] or [`ServiceError::NotFound`].
    pub async fn get_record(&self, token: &str, name: &str) -> Result<Record, ServiceError> {
        let user = self.authenticate(token).await?;
        Ok(self.records.get_by_owner_and_name(user.id, name).await?)
    }

    /// List the user's live records without payloads.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthenticated`] for a bad token.
    pub async fn get_records(&self, token: &str) -> Result<Vec<RecordSummary>, ServiceError> {
        let user = self.authenticate(token).await?;
        Ok(self.records.list_by_owner(user.id).await?)
    }

    /// Replace one field of a live record.
    ///
    /// `name` and `comment` values must be UTF-8 and are trimmed; `data` is
    /// stored as given.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unauthenticated`] for a bad token.
    /// - [`ServiceError::NotFound`] if the record is missing, deleted or not the user's.
    /// - [`ServiceError::InvalidArgument`] for an unknown field or a bad value.
    /// - [`ServiceError::AlreadyExists`] if a rename collides.
    pub async fn update_record_field(
        &self,
        token: &str,
        id: Uuid,
        field: &str,
        value: Vec<u8>,
    ) -> Result<Record, ServiceError> {
        let user = self.authenticate(token).await?;
        self.owned_live_record(&user, id).await?;

        let field: RecordField = field
            .parse()
            .map_err(|e: crate::error::ParseTagError| ServiceError::invalid(e.to_string()))?;
        let update = match field {
            RecordField::Name => {
                let name = utf8_value(field, value)?;
                if name.is_empty() {
                    return Err(ServiceError::invalid("record name must not be empty"));
                }
                RecordUpdate::Name(name)
            }
            RecordField::Comment => RecordUpdate::Comment(utf8_value(field, value)?),
            RecordField::Data => RecordUpdate::Data(value),
        };

        Ok(self.records.update_field(id, update).await?)
    }

    /// Soft-delete one of the user's live records.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthenticated`] or [`ServiceError::NotFound`].
    pub async fn delete_record(&self, token: &str, id: Uuid) -> Result<(), ServiceError> {
        let user = self.authenticate(token).await?;
        self.owned_live_record(&user, id).await?;
        Ok(self.records.soft_delete(id).await?)
    }

    /// Resolve a bearer token to its user without touching any record.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthenticated`] for an empty or unknown token.
    pub async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        Ok(self.auth.resolve(token).await?)
    }

    fn supported(&self, tag: &str) -> Result<RecordType, ServiceError> {
        tag.parse::<RecordType>()
            .ok()
            .filter(|t| self.types.contains(*t))
            .ok_or_else(|| ServiceError::invalid(format!("unsupported record type '{tag}'")))
    }

    /// Foreign and deleted records are reported as missing. The payload is
    /// not decrypted.
    async fn owned_live_record(&self, user: &User, id: Uuid) -> Result<(), ServiceError> {
        let (owner, state) = self.records.owner_and_state(id).await?;
        if owner != user.id || !state.is_active() {
            return Err(RecordError::NotFound.into());
        }
        Ok(())
    }
}

fn utf8_value(field: RecordField, value: Vec<u8>) -> Result<String, ServiceError> {
    String::from_utf8(value)
        .map(|s| s.trim().to_owned())
        .map_err(|_| ServiceError::invalid(format!("{} must be valid UTF-8", field.as_str())))
}
