//! Question answering, document chunks, verification, summaries and backfill handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use orgrag_common::{
    auth::AuthContext,
    errors::{AppError, Result},
};
use orgrag_rag::{BackfillReport, DocumentSummary, QueryRequest, QueryResponse, VerificationResult};

/// Roles allowed to trigger a backfill
const BACKFILL_ROLES: &[&str] = &["admin", "manager"];

#[derive(Debug, Deserialize, Validate)]
pub struct QuestionBody {
    /// Blank questions are rejected downstream as `EmptyQuery`
    #[validate(length(max = 4000))]
    pub question: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChunksBody {
    /// Extracted document text
    #[validate(length(max = 1_000_000))]
    pub text: String,
}

#[derive(Serialize)]
pub struct ChunksResponse {
    pub document_id: Uuid,
    pub chunks: usize,
    /// False when chunk embeddings were dropped and verification ranks lexically
    pub searchable: bool,
}

#[derive(Serialize)]
pub struct BackfillResponse {
    #[serde(flatten)]
    pub report: BackfillReport,
    pub indexed: usize,
    pub processing_time_ms: u64,
}

fn validate(body: &QuestionBody) -> Result<()> {
    body.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })
}

/// Answer a question over the caller's visible records
pub async fn query(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<QuestionBody>,
) -> Result<Json<QueryResponse>> {
    validate(&body)?;
    let rag = state.rag()?;

    let response = rag
        .orchestrator
        .query(QueryRequest {
            org_id: auth.org_id,
            user_id: auth.user_id,
            role: auth.role,
            question: body.question,
        })
        .await?;

    Ok(Json(response))
}

/// Chunk and embed the extracted text of an uploaded document.
///
/// Runs inline so the document is verifiable once this returns.
pub async fn ingest_chunks(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(body): Json<ChunksBody>,
) -> Result<(StatusCode, Json<ChunksResponse>)> {
    body.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("text".to_string()),
    })?;
    if body.text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "document text is empty".to_string(),
            field: Some("text".to_string()),
        });
    }
    let rag = state.rag()?;

    let chunks = rag
        .service
        .store_document_chunks(auth.org_id, document_id, &body.text)
        .await?;
    let searchable = chunks.iter().all(|c| c.embedding.is_some());

    tracing::info!(
        document_id = %document_id,
        chunks = chunks.len(),
        searchable,
        request_id = %auth.request_id,
        "Document chunks stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(ChunksResponse {
            document_id,
            chunks: chunks.len(),
            searchable,
        }),
    ))
}

/// Verify a claim against one uploaded document.
///
/// Chunks are read within the caller's org only, so a foreign document is a 404.
pub async fn verify_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(body): Json<QuestionBody>,
) -> Result<Json<VerificationResult>> {
    validate(&body)?;
    let rag = state.rag()?;

    let result = rag
        .verifier
        .verify(auth.org_id, document_id, &body.question)
        .await?;

    tracing::info!(
        document_id = %document_id,
        verdict = ?result.verdict,
        confidence = result.confidence,
        request_id = %auth.request_id,
        "Document verified"
    );

    Ok(Json(result))
}

/// Structured summary of one uploaded document
pub async fn summarize_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentSummary>> {
    let rag = state.rag()?;

    let summary = rag.summarizer.summarize(auth.org_id, document_id).await?;

    tracing::info!(
        document_id = %document_id,
        recommendation = ?summary.verification_recommendation,
        request_id = %auth.request_id,
        "Document summarized"
    );

    Ok(Json(summary))
}

/// Re-index every task and issue of the caller's organization
pub async fn backfill(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<BackfillResponse>> {
    auth.require_role(BACKFILL_ROLES)?;
    let rag = state.rag()?;
    let start = Instant::now();

    let report = rag.backfill.backfill_organization(auth.org_id).await;

    Ok(Json(BackfillResponse {
        indexed: report.indexed(),
        report,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::router;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use orgrag_rag::generation::prompts::FALLBACK_INTRODUCTION;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn post(uri: &str, role: Option<&str>, body: &str) -> Request<Body> {
        post_as(Uuid::new_v4(), uri, role, body)
    }

    fn post_as(org_id: Uuid, uri: &str, role: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header("content-type", "application/json")
            .header("x-org-id", org_id.to_string())
            .header("x-user-id", Uuid::new_v4().to_string());
        if let Some(role) = role {
            builder = builder.header("x-user-role", role);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_query_conversational() {
        let response = router(true)
            .oneshot(post("/v1/rag/query", Some("member"), r#"{"question":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["answer"], FALLBACK_INTRODUCTION);
        assert_eq!(body["sources"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_query_rejections() {
        let app = router(true);

        let missing_role = app
            .clone()
            .oneshot(post("/v1/rag/query", None, r#"{"question":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(missing_role.status(), StatusCode::UNAUTHORIZED);

        let bad_role = app
            .clone()
            .oneshot(post("/v1/rag/query", Some("guest"), r#"{"question":"what is open?"}"#))
            .await
            .unwrap();
        assert_eq!(bad_role.status(), StatusCode::BAD_REQUEST);

        let empty = app
            .oneshot(post("/v1/rag/query", Some("admin"), r#"{"question":"   "}"#))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disabled_rag_is_unavailable() {
        let app = router(false);

        let query = app
            .clone()
            .oneshot(post("/v1/rag/query", Some("admin"), r#"{"question":"what is open?"}"#))
            .await
            .unwrap();
        assert_eq!(query.status(), StatusCode::SERVICE_UNAVAILABLE);

        let verify = app
            .clone()
            .oneshot(post(
                &format!("/v1/rag/documents/{}/verify", Uuid::new_v4()),
                Some("admin"),
                r#"{"question":"was it signed?"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(verify.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ingest = app
            .clone()
            .oneshot(post(
                &format!("/v1/rag/documents/{}/chunks", Uuid::new_v4()),
                Some("admin"),
                r#"{"text":"signed"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(ingest.status(), StatusCode::SERVICE_UNAVAILABLE);

        let summary = app
            .oneshot(post(&format!("/v1/rag/documents/{}/summary", Uuid::new_v4()), Some("admin"), ""))
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ingested_document_can_be_verified() {
        let app = router(true);
        let (org, doc) = (Uuid::new_v4(), Uuid::new_v4());

        let ingest = app
            .clone()
            .oneshot(post_as(
                org,
                &format!("/v1/rag/documents/{doc}/chunks"),
                Some("member"),
                r#"{"text":"The contract was signed by both parties on March 3rd."}"#,
            ))
            .await
            .unwrap();
        assert_eq!(ingest.status(), StatusCode::CREATED);
        let body = json(ingest).await;
        assert_eq!(body["chunks"], 1);
        assert_eq!(body["searchable"], true);

        let verify = app
            .clone()
            .oneshot(post_as(
                org,
                &format!("/v1/rag/documents/{doc}/verify"),
                Some("member"),
                r#"{"question":"Was the contract signed?"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(verify.status(), StatusCode::OK);
        let body = json(verify).await;
        // no backend configured: degraded verdict, still cites the stored chunk
        assert_eq!(body["verdict"], "insufficient");
        assert_eq!(body["citations"][0]["chunk_index"], 0);
        assert!(body["citations"][0]["snippet"]
            .as_str()
            .is_some_and(|s| s.starts_with("The contract was signed")));

        let summary = app
            .clone()
            .oneshot(post_as(org, &format!("/v1/rag/documents/{doc}/summary"), Some("member"), ""))
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::OK);
        let body = json(summary).await;
        assert_eq!(body["verification_recommendation"], "needs_review");
        assert_eq!(body["document_type"], "other");

        // chunks are created once per document
        let again = app
            .clone()
            .oneshot(post_as(
                org,
                &format!("/v1/rag/documents/{doc}/chunks"),
                Some("member"),
                r#"{"text":"Second upload"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);

        // another organization cannot reach the document
        let foreign = app
            .oneshot(post(
                &format!("/v1/rag/documents/{doc}/verify"),
                Some("admin"),
                r#"{"question":"Was the contract signed?"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_document_text_rejected() {
        let response = router(true)
            .oneshot(post(
                &format!("/v1/rag/documents/{}/chunks", Uuid::new_v4()),
                Some("member"),
                r#"{"text":"  "}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let summary = router(true)
            .oneshot(post(
                &format!("/v1/rag/documents/{}/summary", Uuid::new_v4()),
                Some("member"),
                "",
            ))
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_backfill_requires_privileged_role() {
        let app = router(true);

        let member = app
            .clone()
            .oneshot(post("/v1/rag/backfill", Some("member"), ""))
            .await
            .unwrap();
        assert_eq!(member.status(), StatusCode::FORBIDDEN);

        let manager = app
            .oneshot(post("/v1/rag/backfill", Some("Manager"), ""))
            .await
            .unwrap();
        assert_eq!(manager.status(), StatusCode::OK);
        let body = json(manager).await;
        assert_eq!(body["indexed"], 0);
        assert_eq!(body["errors"], 0);
    }
}
