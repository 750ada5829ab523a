//! Record persistence with at-rest encryption.
//!
//! [`RecordStore`] sits between the service and a [`RecordBackend`]. Every
//! payload written goes through [`AtRestCipher::protect`] and every payload
//! read goes through [`AtRestCipher::reveal`]; listings never touch the
//! payload at all.

use std::sync::Arc;

use chrono::Utc;
use keeper_storage::{ColumnUpdate, RecordBackend, RecordListing, RecordRow, StorageError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cipher::AtRestCipher;
use crate::error::RecordError;
use crate::models::{NewRecord, Record, RecordState, RecordSummary, RecordType, RecordUpdate};

/// Encrypting facade over a record backend.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn RecordBackend>,
    cipher: AtRestCipher,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("encrypted", &self.cipher.is_keyed())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    #[must_use]
    pub fn new(backend: Arc<dyn RecordBackend>, cipher: AtRestCipher) -> Self {
        Self { backend, cipher }
    }

    /// Insert a new live record.
    ///
    /// # Errors
    ///
    /// - [`RecordError::AlreadyExists`] if the owner has a live record with this name.
    /// - [`RecordError::Cipher`] or [`RecordError::Storage`] on failure.
    pub async fn create(&self, new: NewRecord) -> Result<Record, RecordError> {
        let (data, data_encrypted) = self.cipher.protect(&new.data)?;
        let now = Utc::now();
        let row = RecordRow {
            id: Uuid::new_v4(),
            user_id: new.owner,
            name: new.name,
            record_type: new.record_type.as_str().to_owned(),
            data,
            comment: new.comment,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            data_encrypted,
        };

        self.backend
            .insert_record(&row)
            .await
            .map_err(|e| name_conflict(e, &row.name))?;

        info!(record_id = %row.id, record_type = %new.record_type, "record created");

        Ok(Record {
            id: row.id,
            owner: row.user_id,
            name: row.name,
            record_type: new.record_type,
            data: new.data,
            comment: row.comment,
            created_at: now,
            updated_at: now,
            state: RecordState::Active,
        })
    }

    /// Fetch a record by id, live or soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no row has this id.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Record, RecordError> {
        let row = self
            .backend
            .record_by_id(id)
            .await?
            .ok_or(RecordError::NotFound)?;
        self.decrypt_row(row)
    }

    /// Owner and lifecycle state of a record, live or soft-deleted.
    ///
    /// The payload is neither read nor decrypted, so this works for rows
    /// written under a key this store does not hold.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no row has this id.
    pub async fn owner_and_state(&self, id: Uuid) -> Result<(Uuid, RecordState), RecordError> {
        let row = self
            .backend
            .record_by_id(id)
            .await?
            .ok_or(RecordError::NotFound)?;
        Ok((row.user_id, RecordState::from_deleted_at(row.deleted_at)))
    }

    /// Fetch the owner's live record with this name.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if the owner has no such live record.
    pub async fn get_by_owner_and_name(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Record, RecordError> {
        let row = self
            .backend
            .live_record_by_name(owner, name)
            .await?
            .ok_or(RecordError::NotFound)?;
        self.decrypt_row(row)
    }

    /// Whether the owner has a live record with this name. Nothing is decrypted.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Storage`] if the backend fails.
    pub async fn name_taken(&self, owner: Uuid, name: &str) -> Result<bool, RecordError> {
        Ok(self.backend.live_record_by_name(owner, name).await?.is_some())
    }

    /// List the owner's live records ordered by name. Payloads are not read.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Storage`] if the backend fails, or
    /// [`RecordError::Corrupt`] if a row carries an unknown type tag.
    pub async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<RecordSummary>, RecordError> {
        let listings = self.backend.live_records_for_user(owner).await?;
        listings.into_iter().map(summary_from_listing).collect()
    }

    /// Change one field of a live record and stamp `updated_at`.
    ///
    /// Only a `Data` change is re-encrypted.
    ///
    /// # Errors
    ///
    /// - [`RecordError::NotFound`] if no live record has this id.
    /// - [`RecordError::AlreadyExists`] if a rename collides with another live record.
    pub async fn update_field(
        &self,
        id: Uuid,
        update: RecordUpdate,
    ) -> Result<Record, RecordError> {
        let field = update.field();
        let change = match update {
            RecordUpdate::Name(name) => ColumnUpdate::Name(name),
            RecordUpdate::Comment(comment) => ColumnUpdate::Comment(comment),
            RecordUpdate::Data(data) => {
                let (bytes, encrypted) = self.cipher.protect(&data)?;
                ColumnUpdate::Data { bytes, encrypted }
            }
        };

        let row = self
            .backend
            .update_live_record(id, &change, Utc::now())
            .await
            .map_err(|e| match &change {
                ColumnUpdate::Name(name) => name_conflict(e, name),
                _ => e.into(),
            })?
            .ok_or(RecordError::NotFound)?;

        debug!(record_id = %id, field = field.as_str(), "record field updated");
        self.decrypt_row(row)
    }

    /// Mark a live record deleted. The row and its payload are kept.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no live record has this id,
    /// including one that is already deleted.
    pub async fn soft_delete(&self, id: Uuid) -> Result<(), RecordError> {
        if !self.backend.mark_record_deleted(id, Utc::now()).await? {
            return Err(RecordError::NotFound);
        }
        info!(record_id = %id, "record deleted");
        Ok(())
    }

    fn decrypt_row(&self, row: RecordRow) -> Result<Record, RecordError> {
        let record_type = parse_type(row.id, &row.record_type)?;
        let data = self.cipher.reveal(&row.data, row.data_encrypted)?;
        Ok(Record {
            id: row.id,
            owner: row.user_id,
            name: row.name,
            record_type,
            data,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
            state: RecordState::from_deleted_at(row.deleted_at),
        })
    }
}

fn name_conflict(err: StorageError, name: &str) -> RecordError {
    match err {
        StorageError::AlreadyExists { .. } => RecordError::AlreadyExists {
            name: name.to_owned(),
        },
        other => other.into(),
    }
}

fn parse_type(id: Uuid, tag: &str) -> Result<RecordType, RecordError> {
    tag.parse().map_err(|e: crate::error::ParseTagError| RecordError::Corrupt {
        id,
        reason: e.to_string(),
    })
}

fn summary_from_listing(listing: RecordListing) -> Result<RecordSummary, RecordError> {
    Ok(RecordSummary {
        record_type: parse_type(listing.id, &listing.record_type)?,
        id: listing.id,
        name: listing.name,
        created_at: listing.created_at,
        updated_at: listing.updated_at,
    })
}
