//! Read access to business tables
//!
//! Tasks and issues are owned by other domains. The RAG core only streams
//! them to backfill the index.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use futures::stream::{BoxStream, StreamExt};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title and body of a task or issue, as fed to the indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

impl From<Task> for WorkItemRow {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
        }
    }
}

impl From<Issue> for WorkItemRow {
    fn from(issue: Issue) -> Self {
        Self {
            id: issue.id,
            title: issue.title,
            description: issue.description,
        }
    }
}

/// Rows decoded one at a time; a bad row surfaces as a single `Err` item
pub type WorkItemStream<'a> = BoxStream<'a, Result<WorkItemRow>>;

/// Repository for business-table reads
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Work Items
    // ========================================================================

    /// Stream every task of an organization
    pub async fn stream_tasks(&self, org_id: Uuid) -> Result<WorkItemStream<'_>> {
        let rows = TaskEntity::find()
            .filter(TaskColumn::OrgId.eq(org_id))
            .order_by_asc(TaskColumn::Id)
            .stream(self.read_conn())
            .await?;

        Ok(rows
            .map(|row| row.map(WorkItemRow::from).map_err(AppError::from))
            .boxed())
    }

    /// Stream every issue of an organization
    pub async fn stream_issues(&self, org_id: Uuid) -> Result<WorkItemStream<'_>> {
        let rows = IssueEntity::find()
            .filter(IssueColumn::OrgId.eq(org_id))
            .order_by_asc(IssueColumn::Id)
            .stream(self.read_conn())
            .await?;

        Ok(rows
            .map(|row| row.map(WorkItemRow::from).map_err(AppError::from))
            .boxed())
    }
}
