//! Bulk re-indexing of an organization's existing tasks and issues

use crate::indexer::{issue_content, task_content};
use crate::service::{IndexOutcome, RagService};
use crate::types::SourceType;
use async_trait::async_trait;
use futures::StreamExt;
use orgrag_common::db::{WorkItemRow, WorkItemStream};
use orgrag_common::errors::Result;
use orgrag_common::{metrics, Repository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemKind {
    Task,
    Issue,
}

impl WorkItemKind {
    pub fn source_type(&self) -> SourceType {
        match self {
            WorkItemKind::Task => SourceType::Task,
            WorkItemKind::Issue => SourceType::Issue,
        }
    }

    fn content(&self, row: &WorkItemRow) -> String {
        let description = row.description.as_deref().unwrap_or_default();
        match self {
            WorkItemKind::Task => task_content(&row.title, description),
            WorkItemKind::Issue => issue_content(&row.title, description),
        }
    }
}

/// Where backfill reads existing records from
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    async fn stream(&self, org_id: Uuid, kind: WorkItemKind) -> Result<WorkItemStream<'_>>;
}

#[async_trait]
impl WorkItemSource for Repository {
    async fn stream(&self, org_id: Uuid, kind: WorkItemKind) -> Result<WorkItemStream<'_>> {
        match kind {
            WorkItemKind::Task => self.stream_tasks(org_id).await,
            WorkItemKind::Issue => self.stream_issues(org_id).await,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    pub tasks_indexed: usize,
    pub issues_indexed: usize,
    pub errors: usize,
}

impl BackfillReport {
    pub fn indexed(&self) -> usize {
        self.tasks_indexed + self.issues_indexed
    }
}

pub struct BackfillService {
    source: Arc<dyn WorkItemSource>,
    rag: Arc<RagService>,
}

impl BackfillService {
    pub fn new(source: Arc<dyn WorkItemSource>, rag: Arc<RagService>) -> Self {
        Self { source, rag }
    }

    /// Re-index every task and issue of `org_id`.
    ///
    /// Never fails as a whole: each bad record (or a stream that cannot be
    /// opened) adds one to `errors`. Safe to re-run since indexing upserts.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn backfill_organization(&self, org_id: Uuid) -> BackfillReport {
        let mut report = BackfillReport::default();

        report.tasks_indexed = self.backfill_kind(org_id, WorkItemKind::Task, &mut report.errors).await;
        report.issues_indexed = self.backfill_kind(org_id, WorkItemKind::Issue, &mut report.errors).await;

        info!(
            tasks = report.tasks_indexed,
            issues = report.issues_indexed,
            errors = report.errors,
            "Backfill complete"
        );
        report
    }

    async fn backfill_kind(&self, org_id: Uuid, kind: WorkItemKind, errors: &mut usize) -> usize {
        let source_type = kind.source_type();
        let mut rows = match self.source.stream(org_id, kind).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, %source_type, "Could not read records for backfill");
                *errors += 1;
                return 0;
            }
        };

        let mut indexed = 0;
        while let Some(row) = rows.next().await {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, %source_type, "Skipping unreadable record");
                    *errors += 1;
                    metrics::record_backfill(source_type.as_str(), false);
                    continue;
                }
            };

            if row.title.trim().is_empty()
                && row.description.as_deref().map_or(true, |d| d.trim().is_empty())
            {
                continue;
            }

            match self
                .rag
                .index(org_id, source_type, row.id, kind.content(&row))
                .await
            {
                Ok(IndexOutcome::Searchable) => {
                    indexed += 1;
                    metrics::record_backfill(source_type.as_str(), true);
                }
                Ok(IndexOutcome::Skipped) => {}
                Ok(IndexOutcome::Unsearchable) => {
                    warn!(source_id = %row.id, %source_type, "Record stored without embedding");
                    *errors += 1;
                    metrics::record_backfill(source_type.as_str(), false);
                }
                Err(e) => {
                    warn!(error = %e, source_id = %row.id, %source_type, "Failed to index record");
                    *errors += 1;
                    metrics::record_backfill(source_type.as_str(), false);
                }
            }
        }

        indexed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, InMemoryDocumentStore};
    use crate::test_support::FailingEmbedder;
    use futures::stream;
    use orgrag_common::embeddings::HashingEmbedder;
    use orgrag_common::errors::AppError;

    fn row(title: &str, description: Option<&str>) -> WorkItemRow {
        WorkItemRow {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.map(String::from),
        }
    }

    /// Canned rows per kind; `None` means the stream cannot be opened
    struct FixedSource {
        tasks: Option<Vec<Result<WorkItemRow>>>,
        issues: Option<Vec<Result<WorkItemRow>>>,
    }

    #[async_trait]
    impl WorkItemSource for FixedSource {
        async fn stream(&self, _org_id: Uuid, kind: WorkItemKind) -> Result<WorkItemStream<'_>> {
            let rows = match kind {
                WorkItemKind::Task => &self.tasks,
                WorkItemKind::Issue => &self.issues,
            };
            let rows = rows.as_ref().ok_or_else(|| AppError::DatabaseConnection {
                message: "connection reset".into(),
            })?;
            let items: Vec<Result<WorkItemRow>> = rows
                .iter()
                .map(|r| match r {
                    Ok(row) => Ok(row.clone()),
                    Err(_) => Err(AppError::Internal {
                        message: "malformed row".into(),
                    }),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    fn malformed() -> Result<WorkItemRow> {
        Err(AppError::Internal {
            message: "malformed row".into(),
        })
    }

    #[tokio::test]
    async fn test_one_bad_record_does_not_abort() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let rag = Arc::new(RagService::new(store.clone(), Arc::new(HashingEmbedder::new(64))));
        let source = FixedSource {
            tasks: Some(vec![
                Ok(row("Fix login bug", Some("Users cannot log in"))),
                malformed(),
                Ok(row("Update docs", None)),
            ]),
            issues: Some(vec![
                Ok(row("Crash on start", Some("Null pointer"))),
                Ok(row("Slow search", Some("Takes 10s"))),
            ]),
        };
        let service = BackfillService::new(Arc::new(source), rag);
        let org = Uuid::new_v4();

        let report = service.backfill_organization(org).await;
        assert_eq!(
            report,
            BackfillReport {
                tasks_indexed: 2,
                issues_indexed: 2,
                errors: 1
            }
        );
        assert_eq!(report.indexed(), 4);

        let docs = store.list_documents(org, 10).await.unwrap();
        assert_eq!(docs.len(), 4);
        assert!(docs.iter().any(|d| d.content == "Task: Update docs\n\n"));

        // re-running upserts the same records
        service.backfill_organization(org).await;
        assert_eq!(store.list_documents(org, 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unopenable_stream_counts_one_error() {
        let rag = Arc::new(RagService::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(HashingEmbedder::new(64)),
        ));
        let source = FixedSource {
            tasks: None,
            issues: Some(vec![Ok(row("Crash on start", None)), Ok(row("  ", None))]),
        };

        let report = BackfillService::new(Arc::new(source), rag)
            .backfill_organization(Uuid::new_v4())
            .await;
        assert_eq!(report.tasks_indexed, 0);
        assert_eq!(report.issues_indexed, 1);
        assert_eq!(report.errors, 1);
    }

    #[tokio::test]
    async fn test_unsearchable_records_count_as_errors() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let rag = Arc::new(RagService::new(store.clone(), Arc::new(FailingEmbedder)));
        let source = FixedSource {
            tasks: Some(vec![Ok(row("Fix login bug", None))]),
            issues: Some(Vec::new()),
        };
        let org = Uuid::new_v4();

        let report = BackfillService::new(Arc::new(source), rag)
            .backfill_organization(org)
            .await;
        assert_eq!(report.indexed(), 0);
        assert_eq!(report.errors, 1);
        assert_eq!(store.list_documents(org, 10).await.unwrap().len(), 1);
    }
}
