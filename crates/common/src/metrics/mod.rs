//! Metrics and observability utilities
//!
//! Prometheus metric descriptions and recording helpers for the query,
//! embedding, generation and indexing paths.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all OrgRAG metrics
pub const METRICS_PREFIX: &str = "orgrag";

/// Histogram buckets for answer latency (in seconds); dominated by generation
pub const QUERY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 4.000, 8.000, 15.00, 30.00, 60.00,
];

/// Buckets for embedding latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Query metrics
    describe_counter!(
        format!("{}_rag_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Questions answered, by answer path"
    );

    describe_histogram!(
        format!("{}_rag_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end answer latency in seconds"
    );

    describe_histogram!(
        format!("{}_rag_sources_returned", METRICS_PREFIX),
        Unit::Count,
        "Sources attached to each answer"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Generation metrics
    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Generation backend calls, by backend and status"
    );

    // Background job metrics
    describe_counter!(
        format!("{}_queue_jobs_total", METRICS_PREFIX),
        Unit::Count,
        "Background jobs finished, by queue, operation and status"
    );

    describe_counter!(
        format!("{}_queue_jobs_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Background jobs dropped because the queue was full or closed"
    );

    describe_counter!(
        format!("{}_backfill_records_total", METRICS_PREFIX),
        Unit::Count,
        "Records processed by backfill, by kind and status"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record an answered question. `path` is one of
/// `conversational`, `no_hits`, `grounded`, `fallback`.
pub fn record_query(duration_secs: f64, path: &str, sources: usize) {
    counter!(
        format!("{}_rag_queries_total", METRICS_PREFIX),
        "path" => path.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_rag_query_duration_seconds", METRICS_PREFIX),
        "path" => path.to_string()
    )
    .record(duration_secs);

    histogram!(format!("{}_rag_sources_returned", METRICS_PREFIX)).record(sources as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(batch_size.max(1) as u64);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Record one generation backend call
pub fn record_generation(backend: &str, success: bool) {
    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "backend" => backend.to_string(),
        "status" => if success { "success" } else { "error" }.to_string()
    )
    .increment(1);
}

/// Record a finished background job. `status` is `success`, `error` or `panic`.
pub fn record_queue_job(queue: &str, operation: &str, status: &str) {
    counter!(
        format!("{}_queue_jobs_total", METRICS_PREFIX),
        "queue" => queue.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a job that never reached a worker
pub fn record_dropped_job(queue: &str) {
    counter!(
        format!("{}_queue_jobs_dropped_total", METRICS_PREFIX),
        "queue" => queue.to_string()
    )
    .increment(1);
}

/// Record one backfilled record
pub fn record_backfill(kind: &str, success: bool) {
    counter!(
        format!("{}_backfill_records_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => if success { "indexed" } else { "error" }.to_string()
    )
    .increment(1);
}
