//! Index maintenance handlers
//!
//! Both endpoints enqueue and return 202; the outcome is only visible in logs
//! and metrics. With RAG disabled the jobs are silently discarded.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use orgrag_common::{
    auth::AuthContext,
    errors::{AppError, Result},
};
use orgrag_rag::SourceType;

#[derive(Debug, Deserialize, Validate)]
pub struct IndexBody {
    pub source_type: String,
    pub source_id: Uuid,
    #[validate(length(max = 1_000_000))]
    pub content: String,
}

#[derive(Serialize)]
pub struct Accepted {
    pub status: &'static str,
}

const ACCEPTED: Accepted = Accepted { status: "accepted" };

/// Enqueue an upsert for the caller's organization
pub async fn index_source(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<IndexBody>,
) -> Result<(StatusCode, Json<Accepted>)> {
    body.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("content".to_string()),
    })?;
    let source_type: SourceType = body.source_type.parse()?;

    state
        .indexer
        .index_raw(auth.org_id, source_type, body.source_id, body.content);

    Ok((StatusCode::ACCEPTED, Json(ACCEPTED)))
}

/// Enqueue removal of a record
pub async fn delete_source(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((source_type, source_id)): Path<(String, Uuid)>,
) -> Result<(StatusCode, Json<Accepted>)> {
    let source_type: SourceType = source_type.parse()?;

    state.indexer.delete_source(auth.org_id, source_type, source_id);

    Ok((StatusCode::ACCEPTED, Json(ACCEPTED)))
}
