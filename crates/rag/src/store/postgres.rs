//! PostgreSQL + pgvector document store
//!
//! Similarity search runs as one raw statement ordered by cosine distance
//! (`<=>`). Member visibility is compiled into the same statement, so the
//! database returns the member's true top-K. Embeddings travel as pgvector
//! text literals and are cast with `::vector` on the way in and `::text` on
//! the way out.

use super::{clamp_search_limit, require_embedding, require_query_vector, DocumentStore};
use crate::types::{DocumentChunk, IndexedDocument, NewChunk, SimilarityHit, SourceType};
use crate::visibility::MemberVisibility;
use async_trait::async_trait;
use chrono::Utc;
use orgrag_common::db::models::{
    DocumentChunkEntity, DocumentChunkRow, RagDocument, RagDocumentColumn, RagDocumentEntity,
};
use orgrag_common::db::{format_vector, DbPool};
use orgrag_common::errors::{AppError, Result};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, QueryFilter, Statement,
    TransactionTrait, Value,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Document store backed by the `rag_documents` and `document_chunks` tables
pub struct PgDocumentStore {
    db: Arc<DbPool>,
}

impl PgDocumentStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn write_row(
        &self,
        id: Uuid,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: String,
        embedding: Option<String>,
    ) -> Result<()> {
        let sql = r#"
            INSERT INTO rag_documents (id, org_id, source_type, source_id, content, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5, $6::vector, NOW())
            ON CONFLICT (org_id, source_type, source_id)
            DO UPDATE SET content = EXCLUDED.content, embedding = EXCLUDED.embedding
        "#;

        self.db
            .write()
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![
                    id.into(),
                    org_id.into(),
                    source_type.as_str().into(),
                    source_id.into(),
                    content.into(),
                    Value::String(embedding.map(Box::new)),
                ],
            ))
            .await?;

        Ok(())
    }

    async fn search(
        &self,
        org_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        member: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SimilarityHit>> {
        require_query_vector(query)?;
        let limit = clamp_search_limit(limit);

        let mut values: Vec<Value> = vec![org_id.into(), format_vector(query).into()];
        if let Some(user_id) = member {
            values.push(user_id.into());
        }
        let sql = similarity_sql(allowed, member.map(|_| "$3"), limit);

        let rows = HitRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            values,
        ))
        .all(self.db.read())
        .await?;

        debug!(org_id = %org_id, rows = rows.len(), member = member.is_some(), "Similarity search");

        Ok(rows.into_iter().filter_map(HitRow::into_hit).collect())
    }
}

/// Build the nearest-neighbour statement.
///
/// Binds: `$1` organization, `$2` query vector, and the member's id at
/// `member_param` when the search is member-restricted.
fn similarity_sql(allowed: &[SourceType], member_param: Option<&str>, limit: usize) -> String {
    let mut sql = String::from(
        r#"
            SELECT d.source_type, d.source_id, d.content,
                   GREATEST(0, 1 - (d.embedding <=> $2::vector))::float8 AS similarity
            FROM rag_documents d
            WHERE d.org_id = $1
              AND d.embedding IS NOT NULL"#,
    );

    if !allowed.is_empty() {
        let labels = allowed
            .iter()
            .map(|t| format!("'{}'", t.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!("\n              AND d.source_type IN ({})", labels));
    }

    if let Some(param) = member_param {
        sql.push_str("\n              AND ");
        sql.push_str(&MemberVisibility::sql_predicate("d", param));
    }

    sql.push_str(&format!(
        "\n            ORDER BY d.embedding <=> $2::vector, d.created_at, d.id\n            LIMIT {}",
        limit
    ));
    sql
}

#[derive(Debug, FromQueryResult)]
struct HitRow {
    source_type: String,
    source_id: Uuid,
    content: String,
    similarity: f64,
}

impl HitRow {
    fn into_hit(self) -> Option<SimilarityHit> {
        match self.source_type.parse::<SourceType>() {
            Ok(source_type) => Some(SimilarityHit::new(
                source_type,
                self.source_id,
                self.content,
                self.similarity,
            )),
            Err(_) => {
                warn!(source_type = %self.source_type, source_id = %self.source_id, "Skipping row with unknown source type");
                None
            }
        }
    }
}

fn to_indexed(row: RagDocument) -> Option<IndexedDocument> {
    let embedding = row.parse_embedding();
    let source_type = row.source_type.parse::<SourceType>().ok()?;
    Some(IndexedDocument {
        id: row.id,
        org_id: row.org_id,
        source_type,
        source_id: row.source_id,
        content: row.content,
        embedding,
        created_at: row.created_at.with_timezone(&Utc),
    })
}

fn to_chunk(row: DocumentChunkRow) -> DocumentChunk {
    let embedding = row.parse_embedding();
    DocumentChunk {
        id: row.id,
        org_id: row.org_id,
        document_id: row.document_id,
        chunk_index: usize::try_from(row.chunk_index).unwrap_or_default(),
        content: row.content,
        embedding,
        created_at: row.created_at.with_timezone(&Utc),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn upsert(&self, doc: IndexedDocument) -> Result<()> {
        let embedding = format_vector(require_embedding(&doc)?);
        self.write_row(
            doc.id,
            doc.org_id,
            doc.source_type,
            doc.source_id,
            doc.content,
            Some(embedding),
        )
        .await
    }

    async fn upsert_unsearchable(
        &self,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: String,
    ) -> Result<()> {
        self.write_row(Uuid::new_v4(), org_id, source_type, source_id, content, None)
            .await
    }

    async fn delete_by_source(
        &self,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<()> {
        let result = RagDocumentEntity::delete_many()
            .filter(RagDocumentColumn::OrgId.eq(org_id))
            .filter(RagDocumentColumn::SourceType.eq(source_type.as_str()))
            .filter(RagDocumentColumn::SourceId.eq(source_id))
            .exec(self.db.write())
            .await?;

        debug!(org_id = %org_id, %source_type, source_id = %source_id, deleted = result.rows_affected, "Index entry deleted");
        Ok(())
    }

    async fn find_similar(
        &self,
        org_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>> {
        self.search(org_id, query, allowed, None, limit).await
    }

    async fn find_similar_for_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>> {
        self.search(org_id, query, allowed, Some(user_id), limit).await
    }

    async fn list_documents(&self, org_id: Uuid, limit: usize) -> Result<Vec<IndexedDocument>> {
        let sql = r#"
            SELECT id, org_id, source_type, source_id, content,
                   embedding::text AS embedding, created_at
            FROM rag_documents
            WHERE org_id = $1
            ORDER BY created_at DESC
            LIMIT $2
        "#;

        let rows = RagDocumentEntity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![org_id.into(), (limit as i64).into()],
            ))
            .all(self.db.read())
            .await?;

        Ok(rows.into_iter().filter_map(to_indexed).collect())
    }

    async fn create_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<DocumentChunk>> {
        let txn = self.db.write().begin().await?;

        let existing = txn
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT 1 AS present FROM document_chunks WHERE org_id = $1 AND document_id = $2 LIMIT 1",
                vec![org_id.into(), document_id.into()],
            ))
            .await?;
        if existing.is_some() {
            txn.rollback().await?;
            return Err(AppError::InvalidDocument {
                message: format!("chunks for document {} already exist", document_id),
            });
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(chunks.len());

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let id = Uuid::new_v4();
            txn.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO document_chunks (id, org_id, document_id, chunk_index, content, embedding, created_at)
                VALUES ($1, $2, $3, $4, $5, $6::vector, $7)
                "#,
                vec![
                    id.into(),
                    org_id.into(),
                    document_id.into(),
                    (chunk_index as i32).into(),
                    chunk.content.clone().into(),
                    Value::String(chunk.embedding.as_deref().map(format_vector).map(Box::new)),
                    now.into(),
                ],
            ))
            .await?;

            created.push(DocumentChunk {
                id,
                org_id,
                document_id,
                chunk_index,
                content: chunk.content,
                embedding: chunk.embedding,
                created_at: now,
            });
        }

        txn.commit().await?;
        debug!(org_id = %org_id, document_id = %document_id, chunks = created.len(), "Chunks stored");
        Ok(created)
    }

    async fn list_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let sql = r#"
            SELECT id, org_id, document_id, chunk_index, content,
                   embedding::text AS embedding, created_at
            FROM document_chunks
            WHERE org_id = $1 AND document_id = $2
            ORDER BY chunk_index ASC
            LIMIT $3
        "#;

        let rows = DocumentChunkEntity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![org_id.into(), document_id.into(), (limit as i64).into()],
            ))
            .all(self.db.read())
            .await?;

        Ok(rows.into_iter().map(to_chunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_sql() {
        let sql = similarity_sql(&[], None, 5);
        assert!(sql.contains("WHERE d.org_id = $1"));
        assert!(sql.contains("d.embedding IS NOT NULL"));
        assert!(sql.contains("ORDER BY d.embedding <=> $2::vector"));
        assert!(sql.trim_end().ends_with("LIMIT 5"));
        assert!(!sql.contains("source_type IN"));
        assert!(!sql.contains("EXISTS"));
    }

    #[test]
    fn test_type_filter_sql() {
        let sql = similarity_sql(&[SourceType::Task, SourceType::TaskDocument], None, 10);
        assert!(sql.contains("AND d.source_type IN ('task', 'task_document')"));
    }

    #[test]
    fn test_member_sql_binds_user() {
        let sql = similarity_sql(&[], Some("$3"), 3);
        assert!(sql.contains("o.assigned_to = $3"));
        assert!(sql.contains("d.source_type = 'comment'"));
        assert!(!sql.contains("$4"));
    }

    #[test]
    fn test_unknown_row_type_skipped() {
        let row = HitRow {
            source_type: "milestone".into(),
            source_id: Uuid::new_v4(),
            content: String::new(),
            similarity: 0.3,
        };
        assert!(row.into_hit().is_none());
    }
}
