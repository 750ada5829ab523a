//! In-memory storage backend for testing.
//!
//! All tables live in one struct behind a single `RwLock`, so every write is
//! atomic with respect to the uniqueness checks it performs. Nothing is
//! persistent: all data is lost when the process exits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    AuthBackend, AuthRow, ColumnUpdate, EventBackend, EventRow, RecordBackend, RecordListing,
    RecordRow, StorageError, UserBackend, UserRow,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    auths: HashMap<String, AuthRow>,
    records: BTreeMap<Uuid, RecordRow>,
    events: Vec<EventRow>,
}

impl Tables {
    fn live_name_taken(&self, user_id: Uuid, name: &str, except: Option<Uuid>) -> bool {
        self.records.values().any(|r| {
            r.user_id == user_id
                && r.name == name
                && r.deleted_at.is_none()
                && Some(r.id) != except
        })
    }
}

/// An in-memory backend implementing every Keeper storage trait.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserBackend for MemoryBackend {
    async fn create_user(&self, user: &UserRow) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.login == user.login) {
            return Err(StorageError::AlreadyExists {
                what: format!("user '{}'", user.login),
            });
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StorageError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<UserRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.login == login).cloned())
    }

    async fn update_user(&self, user: &UserRow) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.login == user.login && u.id != user.id)
        {
            return Err(StorageError::AlreadyExists {
                what: format!("user '{}'", user.login),
            });
        }
        let Some(existing) = tables.users.get_mut(&user.id) else {
            return Err(StorageError::NotFound {
                what: format!("user {}", user.id),
            });
        };
        *existing = user.clone();
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&id);
        tables.auths.retain(|_, a| a.user_id != id);
        tables.records.retain(|_, r| r.user_id != id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthBackend for MemoryBackend {
    async fn insert_auth(&self, auth: &AuthRow) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.auths.contains_key(&auth.token_hash) {
            return Err(StorageError::AlreadyExists {
                what: "auth token".to_owned(),
            });
        }
        tables.auths.insert(auth.token_hash.clone(), auth.clone());
        Ok(())
    }

    async fn auth_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AuthRow>, StorageError> {
        Ok(self.tables.read().await.auths.get(token_hash).cloned())
    }

    async fn auths_for_user(&self, user_id: Uuid) -> Result<Vec<AuthRow>, StorageError> {
        let tables = self.tables.read().await;
        let mut auths: Vec<AuthRow> = tables
            .auths
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        auths.sort_by_key(|a| a.created_at);
        Ok(auths)
    }
}

#[async_trait::async_trait]
impl RecordBackend for MemoryBackend {
    async fn insert_record(&self, record: &RecordRow) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if record.deleted_at.is_none() && tables.live_name_taken(record.user_id, &record.name, None)
        {
            return Err(StorageError::AlreadyExists {
                what: format!("record '{}'", record.name),
            });
        }
        if tables.records.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists {
                what: format!("record {}", record.id),
            });
        }
        tables.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn record_by_id(&self, id: Uuid) -> Result<Option<RecordRow>, StorageError> {
        Ok(self.tables.read().await.records.get(&id).cloned())
    }

    async fn live_record_by_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<RecordRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .values()
            .find(|r| r.user_id == user_id && r.name == name && r.deleted_at.is_none())
            .cloned())
    }

    async fn live_records_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecordListing>, StorageError> {
        let tables = self.tables.read().await;
        let mut listing: Vec<RecordListing> = tables
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.deleted_at.is_none())
            .map(RecordListing::from)
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn update_live_record(
        &self,
        id: Uuid,
        change: &ColumnUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<RecordRow>, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(owner) = tables
            .records
            .get(&id)
            .filter(|r| r.deleted_at.is_none())
            .map(|r| r.user_id)
        else {
            return Ok(None);
        };

        if let ColumnUpdate::Name(name) = change {
            if tables.live_name_taken(owner, name, Some(id)) {
                return Err(StorageError::AlreadyExists {
                    what: format!("record '{name}'"),
                });
            }
        }

        let Some(row) = tables.records.get_mut(&id) else {
            return Ok(None);
        };
        match change {
            ColumnUpdate::Name(name) => row.name.clone_from(name),
            ColumnUpdate::Comment(comment) => row.comment.clone_from(comment),
            ColumnUpdate::Data { bytes, encrypted } => {
                row.data.clone_from(bytes);
                row.data_encrypted = *encrypted;
            }
        }
        row.updated_at = updated_at;
        Ok(Some(row.clone()))
    }

    async fn mark_record_deleted(
        &self,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        match tables.records.get_mut(&id) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(deleted_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl EventBackend for MemoryBackend {
    async fn append_event(&self, event: &EventRow) -> Result<(), StorageError> {
        self.tables.write().await.events.push(event.clone());
        Ok(())
    }

    async fn events_for_user(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(select_events(&tables.events, since, |e| e.user_id == user_id))
    }

    async fn events_for_record(
        &self,
        record_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(select_events(&tables.events, since, |e| {
            e.record_id == record_id
        }))
    }
}

fn select_events(
    events: &[EventRow],
    since: Option<DateTime<Utc>>,
    matches: impl Fn(&EventRow) -> bool,
) -> Vec<EventRow> {
    let mut selected: Vec<EventRow> = events
        .iter()
        .filter(|e| matches(e) && since.is_none_or(|t| e.occurred_at >= t))
        .cloned()
        .collect();
    selected.sort_by_key(|e| e.occurred_at);
    selected
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(login: &str) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            login: login.to_owned(),
            password_hash: "hash".to_owned(),
        }
    }

    fn record(user_id: Uuid, name: &str) -> RecordRow {
        let now = Utc::now();
        RecordRow {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_owned(),
            record_type: "text".to_owned(),
            data: b"payload".to_vec(),
            comment: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            data_encrypted: false,
        }
    }

    #[tokio::test]
    async fn duplicate_login_is_rejected() {
        let backend = MemoryBackend::new();
        backend.create_user(&user("alice")).await.unwrap();
        let result = backend.create_user(&user("alice")).await;
        assert!(matches!(result, Err(StorageError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn login_lookup_is_case_sensitive() {
        let backend = MemoryBackend::new();
        backend.create_user(&user("alice")).await.unwrap();
        assert!(backend.user_by_login("Alice").await.unwrap().is_none());
        assert!(backend.user_by_login("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let backend = MemoryBackend::new();
        let result = backend.update_user(&user("ghost")).await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn auths_are_listed_per_user() {
        let backend = MemoryBackend::new();
        let owner = user("alice");
        backend.create_user(&owner).await.unwrap();
        for n in 0..3 {
            backend
                .insert_auth(&AuthRow {
                    id: Uuid::new_v4(),
                    user_id: owner.id,
                    token_hash: format!("hash-{n}"),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(backend.auths_for_user(owner.id).await.unwrap().len(), 3);
        assert!(backend.auth_by_token_hash("hash-1").await.unwrap().is_some());
        assert!(backend.auth_by_token_hash("hash-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_name_is_unique_per_owner() {
        let backend = MemoryBackend::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        backend.insert_record(&record(alice, "bank")).await.unwrap();
        // Same name under another owner is fine.
        backend.insert_record(&record(bob, "bank")).await.unwrap();

        let dup = backend.insert_record(&record(alice, "bank")).await;
        assert!(matches!(dup, Err(StorageError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn deleted_record_frees_its_name() {
        let backend = MemoryBackend::new();
        let owner = Uuid::new_v4();
        let first = record(owner, "bank");
        backend.insert_record(&first).await.unwrap();
        assert!(backend.mark_record_deleted(first.id, Utc::now()).await.unwrap());

        backend.insert_record(&record(owner, "bank")).await.unwrap();
        assert!(backend.record_by_id(first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_twice_reports_no_rows() {
        let backend = MemoryBackend::new();
        let row = record(Uuid::new_v4(), "x");
        backend.insert_record(&row).await.unwrap();
        assert!(backend.mark_record_deleted(row.id, Utc::now()).await.unwrap());
        assert!(!backend.mark_record_deleted(row.id, Utc::now()).await.unwrap());
        assert!(!backend.mark_record_deleted(Uuid::new_v4(), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn listing_skips_deleted_and_sorts_by_name() {
        let backend = MemoryBackend::new();
        let owner = Uuid::new_v4();
        let gone = record(owner, "a-gone");
        backend.insert_record(&record(owner, "zeta")).await.unwrap();
        backend.insert_record(&record(owner, "alpha")).await.unwrap();
        backend.insert_record(&gone).await.unwrap();
        backend.mark_record_deleted(gone.id, Utc::now()).await.unwrap();

        let names: Vec<String> = backend
            .live_records_for_user(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn update_ignores_deleted_rows() {
        let backend = MemoryBackend::new();
        let row = record(Uuid::new_v4(), "x");
        backend.insert_record(&row).await.unwrap();
        backend.mark_record_deleted(row.id, Utc::now()).await.unwrap();

        let updated = backend
            .update_live_record(row.id, &ColumnUpdate::Comment("c".to_owned()), Utc::now())
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn rename_onto_live_name_conflicts() {
        let backend = MemoryBackend::new();
        let owner = Uuid::new_v4();
        let a = record(owner, "a");
        backend.insert_record(&a).await.unwrap();
        backend.insert_record(&record(owner, "b")).await.unwrap();

        let result = backend
            .update_live_record(a.id, &ColumnUpdate::Name("b".to_owned()), Utc::now())
            .await;
        assert!(matches!(result, Err(StorageError::AlreadyExists { .. })));

        // Renaming to its own name is a no-op, not a conflict.
        let same = backend
            .update_live_record(a.id, &ColumnUpdate::Name("a".to_owned()), Utc::now())
            .await
            .unwrap();
        assert!(same.is_some());
    }

    #[tokio::test]
    async fn data_update_sets_flag_and_timestamp() {
        let backend = MemoryBackend::new();
        let row = record(Uuid::new_v4(), "x");
        backend.insert_record(&row).await.unwrap();
        let later = row.updated_at + Duration::seconds(5);

        let updated = backend
            .update_live_record(
                row.id,
                &ColumnUpdate::Data {
                    bytes: vec![1, 2, 3],
                    encrypted: true,
                },
                later,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.data, vec![1, 2, 3]);
        assert!(updated.data_encrypted);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.name, row.name);
    }

    #[tokio::test]
    async fn events_filter_by_time_and_sort_ascending() {
        let backend = MemoryBackend::new();
        let owner = Uuid::new_v4();
        let rec = Uuid::new_v4();
        let base = Utc::now();
        for (offset, action) in [(20, "delete"), (0, "create"), (10, "update")] {
            backend
                .append_event(&EventRow {
                    id: Uuid::new_v4(),
                    user_id: owner,
                    record_id: rec,
                    occurred_at: base + Duration::seconds(offset),
                    action: action.to_owned(),
                    data: Vec::new(),
                })
                .await
                .unwrap();
        }

        let all: Vec<String> = backend
            .events_for_user(owner, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(all, vec!["create", "update", "delete"]);

        let recent = backend
            .events_for_record(rec, Some(base + Duration::seconds(10)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(backend.events_for_user(Uuid::new_v4(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.create_user(&user("alice")).await.unwrap();
        assert!(clone.user_by_login("alice").await.unwrap().is_some());
    }
}
