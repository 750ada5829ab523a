//! Shared application state for the Keeper server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use keeper_core::service::VaultService;

/// Shared application state passed to all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    pub service: VaultService,
}
