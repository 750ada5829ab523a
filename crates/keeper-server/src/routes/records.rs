//! Record routes: `/v1/records/*` and `/v1/record-types`.
//!
//! All record routes take the caller's bearer token. Binary fields travel as
//! standard base64 strings. Malformed paths, bodies and base64 fields are
//! only reported once the token has been checked, so an unauthenticated
//! caller always gets a 401.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keeper_core::models::{Record, RecordState, RecordSummary, RecordType};

use super::{bad_input, decode_base64, encode_base64};
use crate::error::AppError;
use crate::state::AppState;
use crate::token::BearerToken;

/// Build the record router.
///
/// Paths:
/// - `POST   /v1/records` create
/// - `GET    /v1/records` list
/// - `GET    /v1/records/by-name/{name}` read
/// - `PATCH  /v1/records/{id}` update one field
/// - `DELETE /v1/records/{id}` soft delete
/// - `GET    /v1/record-types` supported types
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/records", get(list_records).post(create_record))
        .route("/records/by-name/{name}", get(get_record))
        .route("/records/{id}", patch(update_record).delete(delete_record))
        .route("/record-types", get(record_types))
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    /// Base64 payload.
    pub data: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub field: String,
    /// Base64 value. `name` and `comment` must decode to UTF-8.
    pub value: String,
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RecordBody {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub data: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Record> for RecordBody {
    fn from(record: Record) -> Self {
        let deleted_at = match record.state {
            RecordState::Active => None,
            RecordState::Deleted { at } => Some(at),
        };
        Self {
            id: record.id,
            name: record.name,
            record_type: record.record_type,
            data: encode_base64(&record.data),
            comment: record.comment,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub record: RecordBody,
}

#[derive(Debug, Serialize)]
pub struct SummaryBody {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecordSummary> for SummaryBody {
    fn from(summary: RecordSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            record_type: summary.record_type,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub records: Vec<SummaryBody>,
}

#[derive(Debug, Serialize)]
pub struct EmptyResponse {}

#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub types: Vec<RecordType>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Pass `input` through. On failure, a bad token is reported instead.
async fn checked<T>(
    state: &AppState,
    token: &str,
    input: Result<T, AppError>,
) -> Result<T, AppError> {
    match input {
        Ok(value) => Ok(value),
        Err(err) => {
            state.service.authenticate(token).await?;
            Err(err)
        }
    }
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    body: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<Json<RecordResponse>, AppError> {
    let Json(body) = checked(&state, &token, body.map_err(bad_input)).await?;
    let data = checked(&state, &token, decode_base64("data", &body.data)).await?;
    let record = state
        .service
        .create_record(&token, &body.name, &body.record_type, data, &body.comment)
        .await?;
    Ok(Json(RecordResponse {
        record: record.into(),
    }))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(name): Path<String>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = state.service.get_record(&token, &name).await?;
    Ok(Json(RecordResponse {
        record: record.into(),
    }))
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<ListResponse>, AppError> {
    let records = state.service.get_records(&token).await?;
    Ok(Json(ListResponse {
        records: records.into_iter().map(SummaryBody::from).collect(),
    }))
}

async fn update_record(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateRecordRequest>, JsonRejection>,
) -> Result<Json<RecordResponse>, AppError> {
    let Path(id) = checked(&state, &token, id.map_err(bad_input)).await?;
    let Json(body) = checked(&state, &token, body.map_err(bad_input)).await?;
    let value = checked(&state, &token, decode_base64("value", &body.value)).await?;
    let record = state
        .service
        .update_record_field(&token, id, &body.field, value)
        .await?;
    Ok(Json(RecordResponse {
        record: record.into(),
    }))
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EmptyResponse>, AppError> {
    let Path(id) = checked(&state, &token, id.map_err(bad_input)).await?;
    state.service.delete_record(&token, id).await?;
    Ok(Json(EmptyResponse {}))
}

async fn record_types(State(state): State<Arc<AppState>>) -> Json<TypesResponse> {
    Json(TypesResponse {
        types: state.service.supported_types().as_slice().to_vec(),
    })
}
