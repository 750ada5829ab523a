//! Registration, login and bearer token resolution.
//!
//! # Security model
//!
//! - Passwords are hashed with Argon2id and a random salt. Hashing and
//!   verification run on the blocking thread pool.
//! - Tokens are 64 characters drawn uniformly from a 64-symbol alphabet
//!   using `OsRng` (384 bits). Only `SHA-256(token)` is persisted.
//! - An unknown login and a wrong password produce the same error, and an
//!   unknown login still pays for one hash verification.

use std::sync::{Arc, OnceLock};

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use keeper_storage::{AuthBackend, AuthRow, StorageError, UserBackend, UserRow};
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::hash_token;
use crate::error::AuthError;
use crate::models::{Session, User};

/// Token alphabet. Exactly 64 symbols, so masking a random byte is unbiased.
const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of an issued token.
pub const TOKEN_LEN: usize = 64;

/// Generate a fresh bearer token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| char::from(TOKEN_ALPHABET[usize::from(b & 0x3F)]))
        .collect()
}

/// Issues and resolves sessions for registered users.
#[derive(Clone)]
pub struct SessionAuthenticator {
    users: Arc<dyn UserBackend>,
    auths: Arc<dyn AuthBackend>,
}

impl std::fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthenticator").finish_non_exhaustive()
    }
}

impl SessionAuthenticator {
    #[must_use]
    pub fn new(users: Arc<dyn UserBackend>, auths: Arc<dyn AuthBackend>) -> Self {
        Self { users, auths }
    }

    /// Create a user and open a first session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] if login or password is blank.
    /// - [`AuthError::AlreadyExists`] if the login is taken.
    pub async fn register(&self, login: &str, password: &str) -> Result<Session, AuthError> {
        let (login, password) = credentials(login, password)?;

        if self.users.user_by_login(login).await?.is_some() {
            return Err(AuthError::AlreadyExists {
                login: login.to_owned(),
            });
        }

        let password_hash = hash_password(password.to_owned()).await?;
        let row = UserRow {
            id: Uuid::new_v4(),
            login: login.to_owned(),
            password_hash,
        };

        self.users.create_user(&row).await.map_err(|e| match e {
            StorageError::AlreadyExists { .. } => AuthError::AlreadyExists {
                login: login.to_owned(),
            },
            other => other.into(),
        })?;

        info!(user_id = %row.id, login = %row.login, "user registered");

        self.open_session(User {
            id: row.id,
            login: row.login,
        })
        .await
    }

    /// Verify credentials and open a new session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] if login or password is blank.
    /// - [`AuthError::InvalidCredentials`] for an unknown login or a wrong password.
    pub async fn authorize(&self, login: &str, password: &str) -> Result<Session, AuthError> {
        let (login, password) = credentials(login, password)?;

        let user = self.users.user_by_login(login).await?;
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let verified = verify_password(password.to_owned(), stored_hash).await?;

        match user {
            Some(user) if verified => {
                self.open_session(User {
                    id: user.id,
                    login: user.login,
                })
                .await
            }
            _ => {
                warn!(login = %login, "failed login attempt");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Map a bearer token to its user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for an empty or unknown token.
    pub async fn resolve(&self, token: &str) -> Result<User, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let auth = self
            .auths
            .auth_by_token_hash(&hash_token(token))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let user = self
            .users
            .user_by_id(auth.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        Ok(User {
            id: user.id,
            login: user.login,
        })
    }

    async fn open_session(&self, user: User) -> Result<Session, AuthError> {
        let token = generate_token();
        let row = AuthRow {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_token(&token),
            created_at: Utc::now(),
        };
        self.auths.insert_auth(&row).await?;

        Ok(Session { token, user })
    }
}

fn credentials<'a>(login: &'a str, password: &'a str) -> Result<(&'a str, &'a str), AuthError> {
    let (login, password) = (login.trim(), password.trim());
    if login.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidArgument {
            reason: "login and password must not be empty".to_owned(),
        });
    }
    Ok((login, password))
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hash {
                reason: e.to_string(),
            })
    })
    .await
    .map_err(|e| AuthError::Hash {
        reason: e.to_string(),
    })?
}

/// Verify against `stored_hash`, or against a dummy hash when there is no
/// user. The dummy path always yields `false`.
async fn verify_password(
    password: String,
    stored_hash: Option<String>,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let hash = match stored_hash.as_deref() {
            Some(hash) => hash,
            None => dummy_hash(),
        };
        let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash {
            reason: e.to_string(),
        })?;
        let matched = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
        Ok(matched && stored_hash.is_some())
    })
    .await
    .map_err(|e| AuthError::Hash {
        reason: e.to_string(),
    })?
}

/// A valid hash of a random password, verified against for unknown logins.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(generate_token().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .unwrap_or_default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keeper_storage::MemoryBackend;

    use super::*;

    fn authenticator() -> (SessionAuthenticator, MemoryBackend) {
        let backend = MemoryBackend::new();
        let auth = SessionAuthenticator::new(Arc::new(backend.clone()), Arc::new(backend.clone()));
        (auth, backend)
    }

    #[test]
    fn tokens_use_alphabet_and_length() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn register_then_resolve() {
        let (auth, _) = authenticator();
        let session = auth.register("alice", "pw1").await.unwrap();
        assert_eq!(session.user.login, "alice");

        let user = auth.resolve(&session.token).await.unwrap();
        assert_eq!(user, session.user);
    }

    #[tokio::test]
    async fn register_trims_and_rejects_blank() {
        let (auth, _) = authenticator();
        let session = auth.register("  bob ", " pw ").await.unwrap();
        assert_eq!(session.user.login, "bob");
        auth.authorize("bob", "pw").await.unwrap();

        assert!(matches!(
            auth.register("   ", "pw").await,
            Err(AuthError::InvalidArgument { .. })
        ));
        assert!(matches!(
            auth.authorize("bob", "").await,
            Err(AuthError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_login_rejected() {
        let (auth, _) = authenticator();
        auth.register("alice", "pw1").await.unwrap();
        assert!(matches!(
            auth.register("alice", "other").await,
            Err(AuthError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_login_and_wrong_password_are_identical() {
        let (auth, _) = authenticator();
        auth.register("alice", "pw1").await.unwrap();

        let wrong = auth.authorize("alice", "nope").await.unwrap_err();
        let unknown = auth.authorize("mallory", "pw1").await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn each_authorize_issues_a_distinct_valid_token() {
        let (auth, backend) = authenticator();
        let first = auth.register("alice", "pw1").await.unwrap();
        let second = auth.authorize("alice", "pw1").await.unwrap();
        assert_ne!(first.token, second.token);

        auth.resolve(&first.token).await.unwrap();
        auth.resolve(&second.token).await.unwrap();
        assert_eq!(backend.auths_for_user(first.user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_token_hash_is_stored() {
        let (auth, backend) = authenticator();
        let session = auth.register("alice", "pw1").await.unwrap();
        let rows = backend.auths_for_user(session.user.id).await.unwrap();
        assert_eq!(rows[0].token_hash, hash_token(&session.token));
        assert_ne!(rows[0].token_hash, session.token);

        let user = backend.user_by_login("alice").await.unwrap().unwrap();
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn empty_or_unknown_token_unauthenticated() {
        let (auth, _) = authenticator();
        assert!(matches!(auth.resolve("").await, Err(AuthError::Unauthenticated)));
        assert!(matches!(
            auth.resolve(&generate_token()).await,
            Err(AuthError::Unauthenticated)
        ));
    }
}
