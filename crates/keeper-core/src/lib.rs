//! Core library for Keeper.
//!
//! Contains the typed payload codec, the at-rest cipher, the record store,
//! session authentication and the [`service::VaultService`] that ties them
//! together. This crate depends on `keeper-storage` for the backend traits
//! and knows nothing about HTTP.

pub mod auth;
pub mod cipher;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod models;
pub mod records;
pub mod service;
