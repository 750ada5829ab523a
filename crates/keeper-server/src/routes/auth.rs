//! Session routes: `/v1/ping`, `/v1/register`, `/v1/authorize`.
//!
//! These are the only routes that do not need a bearer token.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keeper_core::models::Session;

use super::bad_input;
use crate::error::AppError;
use crate::state::AppState;

/// Build the session router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", post(ping))
        .route("/register", post(register))
        .route("/authorize", post(authorize))
}

// ── Request / response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub id: Uuid,
    pub login: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserBody,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token,
            user: UserBody {
                id: session.user.id,
                login: session.user.login,
            },
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn ping(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PingRequest>, JsonRejection>,
) -> Result<Json<PingResponse>, AppError> {
    let Json(body) = body.map_err(bad_input)?;
    Ok(Json(PingResponse {
        message: state.service.ping(&body.message),
    }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(body) = body.map_err(bad_input)?;
    let session = state.service.register(&body.login, &body.password).await?;
    Ok(Json(session.into()))
}

async fn authorize(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(body) = body.map_err(bad_input)?;
    let session = state.service.authorize(&body.login, &body.password).await?;
    Ok(Json(session.into()))
}
