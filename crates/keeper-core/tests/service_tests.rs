//! End-to-end tests of `VaultService` over the in-memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use keeper_core::cipher::AtRestCipher;
use keeper_core::codec::{self, LoginData, SecretPayload};
use keeper_core::error::ServiceError;
use keeper_core::models::{RecordType, SupportedTypes};
use keeper_core::service::VaultService;
use keeper_storage::MemoryBackend;
use uuid::Uuid;

fn vault() -> VaultService {
    VaultService::with_backend(
        MemoryBackend::new(),
        AtRestCipher::new("operator secret"),
        SupportedTypes::default(),
    )
}

fn text(s: &str) -> Vec<u8> {
    codec::encode(&SecretPayload::Text(s.as_bytes().to_vec())).unwrap()
}

// ── Scenario ─────────────────────────────────────────────────────────

#[tokio::test]
async fn alice_stores_and_annotates_a_login() {
    let vault = vault();
    let t1 = vault.register("alice", "secret1").await.unwrap().token;

    let login = SecretPayload::Login(LoginData {
        login: "bob".to_owned(),
        password: "pw".to_owned(),
    });
    let created = vault
        .create_record(&t1, "bank", "login", codec::encode(&login).unwrap(), "")
        .await
        .unwrap();
    assert_eq!(created.record_type, RecordType::Login);

    let fetched = vault.get_record(&t1, "bank").await.unwrap();
    assert_eq!(codec::decode(fetched.record_type, &fetched.data).unwrap(), login);

    vault
        .update_record_field(&t1, created.id, "comment", b"updated".to_vec())
        .await
        .unwrap();

    let fetched = vault.get_record(&t1, "bank").await.unwrap();
    assert_eq!(fetched.comment, "updated");
    assert_eq!(codec::decode(fetched.record_type, &fetched.data).unwrap(), login);
}

// ── Tenancy ──────────────────────────────────────────────────────────

#[tokio::test]
async fn other_users_records_are_invisible() {
    let vault = vault();
    let alice = vault.register("alice", "pw-a").await.unwrap().token;
    let bob = vault.register("bob", "pw-b").await.unwrap().token;

    let record = vault
        .create_record(&alice, "X", "text", text("alice's"), "")
        .await
        .unwrap();

    assert!(matches!(
        vault.get_record(&bob, "X").await,
        Err(ServiceError::NotFound { .. })
    ));
    assert!(vault.get_records(&bob).await.unwrap().is_empty());

    let update = vault
        .update_record_field(&bob, record.id, "data", text("bob's"))
        .await;
    assert!(matches!(update, Err(ServiceError::NotFound { .. })));

    let delete = vault.delete_record(&bob, record.id).await;
    assert!(matches!(delete, Err(ServiceError::NotFound { .. })));

    // Masked the same way as a record that never existed.
    let missing = vault.delete_record(&bob, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(delete.unwrap_err().to_string(), missing.to_string());

    assert_eq!(
        vault.get_record(&alice, "X").await.unwrap().data,
        text("alice's")
    );
}

#[tokio::test]
async fn both_users_may_use_the_same_name() {
    let vault = vault();
    let alice = vault.register("alice", "pw").await.unwrap().token;
    let bob = vault.register("bob", "pw").await.unwrap().token;

    vault.create_record(&alice, "shared", "text", text("a"), "").await.unwrap();
    vault.create_record(&bob, "shared", "text", text("b"), "").await.unwrap();

    assert_eq!(vault.get_record(&alice, "shared").await.unwrap().data, text("a"));
    assert_eq!(vault.get_record(&bob, "shared").await.unwrap().data, text("b"));
}

#[tokio::test]
async fn foreign_record_is_missing_even_when_undecryptable() {
    let backend = MemoryBackend::new();
    let writer = VaultService::with_backend(
        backend.clone(),
        AtRestCipher::new("k1"),
        SupportedTypes::default(),
    );
    let alice = writer.register("alice", "pw-a").await.unwrap().token;
    let bob = writer.register("bob", "pw-b").await.unwrap().token;
    let id = writer
        .create_record(&alice, "X", "text", text("mine"), "")
        .await
        .unwrap()
        .id;

    // Same rows, but this instance holds no key.
    let keyless = VaultService::with_backend(backend, AtRestCipher::new(""), SupportedTypes::default());

    assert!(matches!(
        keyless.delete_record(&bob, id).await,
        Err(ServiceError::NotFound { .. })
    ));
    assert!(matches!(
        keyless
            .update_record_field(&bob, id, "data", b"x".to_vec())
            .await,
        Err(ServiceError::NotFound { .. })
    ));

    // The owner can still overwrite and then delete the row.
    let rewritten = keyless
        .update_record_field(&alice, id, "data", text("fresh"))
        .await
        .unwrap();
    assert_eq!(rewritten.data, text("fresh"));
    keyless.delete_record(&alice, id).await.unwrap();
    assert!(keyless.get_records(&alice).await.unwrap().is_empty());
}

// ── Uniqueness ───────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_name_conflicts_until_deleted() {
    let vault = vault();
    let token = vault.register("alice", "pw").await.unwrap().token;

    let first = vault
        .create_record(&token, "dup", "text", text("1"), "")
        .await
        .unwrap();
    let second = vault.create_record(&token, "dup", "text", text("2"), "").await;
    assert!(matches!(second, Err(ServiceError::AlreadyExists { .. })));

    vault.delete_record(&token, first.id).await.unwrap();
    let third = vault
        .create_record(&token, "dup", "text", text("3"), "")
        .await
        .unwrap();
    assert_ne!(third.id, first.id);
}

#[tokio::test]
async fn rename_onto_live_name_conflicts() {
    let vault = vault();
    let token = vault.register("alice", "pw").await.unwrap().token;
    vault.create_record(&token, "a", "text", text("1"), "").await.unwrap();
    let b = vault.create_record(&token, "b", "text", text("2"), "").await.unwrap();

    let result = vault
        .update_record_field(&token, b.id, "name", b"a".to_vec())
        .await;
    assert!(matches!(result, Err(ServiceError::AlreadyExists { .. })));
}

// ── Auth ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_password_and_unknown_login_look_the_same() {
    let vault = vault();
    vault.register("alice", "secret1").await.unwrap();

    let wrong = vault.authorize("alice", "secret2").await.unwrap_err();
    let unknown = vault.authorize("nobody", "secret1").await.unwrap_err();
    assert!(matches!(wrong, ServiceError::InvalidCredentials));
    assert!(matches!(unknown, ServiceError::InvalidCredentials));
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let vault = vault();
    vault.register("alice", "pw").await.unwrap();
    assert!(matches!(
        vault.register("alice", "other").await,
        Err(ServiceError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn authorize_token_sees_registered_records() {
    let vault = vault();
    let t1 = vault.register("alice", "pw").await.unwrap().token;
    vault.create_record(&t1, "n", "text", text("x"), "").await.unwrap();

    let t2 = vault.authorize("alice", "pw").await.unwrap().token;
    assert_ne!(t1, t2);
    assert_eq!(vault.get_records(&t2).await.unwrap().len(), 1);
}

// ── Soft delete ──────────────────────────────────────────────────────

#[tokio::test]
async fn deleted_record_disappears_but_siblings_remain() {
    let vault = vault();
    let token = vault.register("alice", "pw").await.unwrap().token;
    let gone = vault.create_record(&token, "gone", "text", text("1"), "").await.unwrap();
    vault.create_record(&token, "kept", "text", text("2"), "").await.unwrap();

    vault.delete_record(&token, gone.id).await.unwrap();

    let names: Vec<String> = vault
        .get_records(&token)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, ["kept"]);
    assert!(matches!(
        vault.get_record(&token, "gone").await,
        Err(ServiceError::NotFound { .. })
    ));
}

#[tokio::test]
async fn deleted_record_cannot_be_updated_or_deleted_again() {
    let vault = vault();
    let token = vault.register("alice", "pw").await.unwrap().token;
    let record = vault.create_record(&token, "n", "text", text("1"), "").await.unwrap();
    vault.delete_record(&token, record.id).await.unwrap();

    let update = vault
        .update_record_field(&token, record.id, "comment", b"late".to_vec())
        .await;
    assert!(matches!(update, Err(ServiceError::NotFound { .. })));
    assert!(matches!(
        vault.delete_record(&token, record.id).await,
        Err(ServiceError::NotFound { .. })
    ));
}

// ── Listing ──────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_is_sorted_and_typed() {
    let vault = vault();
    let token = vault.register("alice", "pw").await.unwrap().token;
    vault.create_record(&token, "zeta", "text", text("1"), "").await.unwrap();
    let card = codec::encode(&SecretPayload::Card(codec::CardData {
        number: "4111111111111111".to_owned(),
        holder: String::new(),
        month: 1,
        year: 2031,
        cvv: String::new(),
    }))
    .unwrap();
    vault.create_record(&token, "alpha", "card", card, "").await.unwrap();

    let listing = vault.get_records(&token).await.unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].name, "alpha");
    assert_eq!(listing[0].record_type, RecordType::Card);
    assert_eq!(listing[1].name, "zeta");
}
