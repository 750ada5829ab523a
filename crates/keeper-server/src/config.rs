//! Server configuration for Keeper.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `KEEPER_*` environment variables.

use std::fmt;
use std::net::SocketAddr;

/// Default request body limit: 16 MiB, enough for file records.
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Default listener port.
const DEFAULT_PORT: u16 = 3030;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Operator key for at-rest encryption. Empty disables encryption.
    pub encryption_key: String,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &self.storage_backend)
            .field("encryption", &!self.encryption_key.is_empty())
            .field("log_level", &self.log_level)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Supported storage backend types.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

impl fmt::Debug for StorageBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Postgres { .. } => f.debug_struct("Postgres").field("url", &"[redacted]").finish(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, binds to `0.0.0.0`
    /// - `KEEPER_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:3030`)
    /// - `KEEPER_STORAGE`: `memory` or `postgres` (default: `memory`)
    /// - `DATABASE_URL`: PostgreSQL connection string (default: `postgres://localhost/keeper`)
    /// - `KEEPER_ENCRYPTION_KEY`: at-rest key (default: empty, payloads stored as-is)
    /// - `KEEPER_LOG_LEVEL`: log filter (default: `info`)
    /// - `KEEPER_MAX_BODY_BYTES`: request body limit (default: 16 MiB)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let default_addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));

        // Priority: KEEPER_BIND_ADDR > PORT > default
        let bind_addr = if let Some(addr) = var("KEEPER_BIND_ADDR") {
            addr.parse().unwrap_or(default_addr)
        } else if let Some(port) = var("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(DEFAULT_PORT)))
        } else {
            default_addr
        };

        let storage_backend = match var("KEEPER_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackendType::Postgres {
                url: var("DATABASE_URL")
                    .unwrap_or_else(|| "postgres://localhost/keeper".to_owned()),
            },
            _ => StorageBackendType::Memory,
        };

        Self {
            bind_addr,
            storage_backend,
            encryption_key: var("KEEPER_ENCRYPTION_KEY").unwrap_or_default(),
            log_level: var("KEEPER_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            max_body_bytes: var("KEEPER_MAX_BODY_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
        }
    }
}
