//! OrgRAG API Gateway
//!
//! HTTP surface for the RAG core.
//! Handles:
//! - Caller identity from upstream headers
//! - Question answering, document ingestion, verification, summaries and backfill
//! - Fire-and-forget index maintenance
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use orgrag_common::{
    config::{AppConfig, AuthConfig},
    db::{DbPool, Repository},
    embeddings::create_embedder,
    errors::{AppError, Result},
    metrics,
    queue::QueueConfig,
};
use orgrag_rag::{
    BackendChain, BackfillService, DocumentSummarizer, DocumentVerifier, GenerationOrchestrator,
    Indexer, PgDocumentStore, RagService, VectorRetriever,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, task::JoinHandle};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    /// No-op when RAG is disabled
    pub indexer: Indexer,
    pub rag: Option<RagComponents>,
}

/// Services that exist only while RAG is enabled
#[derive(Clone)]
pub struct RagComponents {
    pub service: Arc<RagService>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub verifier: Arc<DocumentVerifier>,
    pub summarizer: Arc<DocumentSummarizer>,
    pub backfill: Arc<BackfillService>,
}

impl AppState {
    pub fn rag(&self) -> Result<&RagComponents> {
        self.rag.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
            message: "RAG is disabled".to_string(),
        })
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.auth.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);
    info!("Starting OrgRAG API Gateway v{}", orgrag_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port)))
            .install()?;
        info!(port = config.observability.metrics_port, "Prometheus exporter listening");
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let (indexer, worker, rag) = build_rag(&config, &db)?;

    let state = AppState {
        config: config.clone(),
        db,
        indexer: indexer.clone(),
        rag,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router is gone; dropping the last handle lets the worker drain and exit
    drop(indexer);
    if let Some(worker) = worker {
        if tokio::time::timeout(config.shutdown_timeout(), worker).await.is_err() {
            warn!("Index queue did not drain before the shutdown timeout");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Wire the RAG services, or the disabled no-op form.
///
/// RAG is disabled when `rag.enabled` is off or no embedder can be built.
fn build_rag(
    config: &AppConfig,
    db: &DbPool,
) -> Result<(Indexer, Option<JoinHandle<()>>, Option<RagComponents>)> {
    let embedder = if config.rag.enabled {
        create_embedder(&config.embedding)?
    } else {
        None
    };
    let Some(embedder) = embedder else {
        warn!("RAG disabled, indexing is a no-op and query endpoints return 503");
        return Ok((Indexer::disabled(), None, None));
    };

    let chain = BackendChain::from_config(&config.generation)?;
    if chain.is_empty() {
        warn!("No generation backend configured, answers will use static fallbacks");
    }

    let store = Arc::new(PgDocumentStore::new(Arc::new(db.clone())));
    let service = Arc::new(RagService::from_config(store.clone(), embedder.clone(), &config.rag));

    let retriever = VectorRetriever::new(store.clone(), embedder.clone())
        .with_max_embed_chars(config.rag.max_embed_chars);
    let orchestrator = GenerationOrchestrator::new(Arc::new(retriever), chain.clone())
        .with_query_limit(config.rag.query_limit);
    let verifier = DocumentVerifier::new(store.clone(), Some(embedder), chain.clone())
        .with_top_k(config.rag.verify_top_k)
        .with_max_embed_chars(config.rag.max_embed_chars);
    let summarizer = DocumentSummarizer::new(store, chain).with_chunking(service.chunking());
    let backfill = BackfillService::new(Arc::new(Repository::new(db.clone())), service.clone());

    let (indexer, worker) = Indexer::start(
        service.clone(),
        QueueConfig {
            name: "rag-index".to_string(),
            capacity: config.rag.index_queue_capacity,
            concurrency: config.rag.index_concurrency,
        },
    );

    info!(
        model = %config.embedding.model,
        query_limit = config.rag.query_limit,
        "RAG enabled"
    );

    Ok((
        indexer,
        Some(worker),
        Some(RagComponents {
            service,
            orchestrator: Arc::new(orchestrator),
            verifier: Arc::new(verifier),
            summarizer: Arc::new(summarizer),
            backfill: Arc::new(backfill),
        }),
    ))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let timeout = request_timeout(&state.config);

    let api_routes = Router::new()
        // Health endpoints (no identity)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Question answering
        .route("/rag/query", post(handlers::rag::query))
        .route("/rag/documents/{id}/chunks", post(handlers::rag::ingest_chunks))
        .route("/rag/documents/{id}/verify", post(handlers::rag::verify_document))
        .route("/rag/documents/{id}/summary", post(handlers::rag::summarize_document))
        .route("/rag/backfill", post(handlers::rag::backfill))
        // Index maintenance
        .route("/rag/index", post(handlers::index::index_source))
        .route("/rag/index/{source_type}/{source_id}", delete(handlers::index::delete_source));

    Router::new()
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

fn request_timeout(config: &AppConfig) -> Duration {
    match config.request_timeout() {
        d if d.is_zero() => Duration::from_secs(30),
        d => d,
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
