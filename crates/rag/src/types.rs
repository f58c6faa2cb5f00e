//! Core domain types shared by the index, retrieval and generation layers

use chrono::{DateTime, Utc};
use orgrag_common::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of business object an index entry describes. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Task,
    Issue,
    Comment,
    Document,
    TaskDocument,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::Task,
        SourceType::Issue,
        SourceType::Comment,
        SourceType::Document,
        SourceType::TaskDocument,
    ];

    /// Persisted label
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Task => "task",
            SourceType::Issue => "issue",
            SourceType::Comment => "comment",
            SourceType::Document => "document",
            SourceType::TaskDocument => "task_document",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| AppError::InvalidDocument {
                message: format!("unknown source type '{}'", s),
            })
    }
}

/// Caller role. Anything else is rejected; there is no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

impl Role {
    /// Admins and managers search the whole organization
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "member" => Ok(Role::Member),
            _ => Err(AppError::UnknownRole {
                role: s.to_string(),
            }),
        }
    }
}

/// One indexed business object.
///
/// `embedding == None` is the "stored but unsearchable" state: the record is
/// listed but similarity search never returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: Uuid,
    pub org_id: Uuid,
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl IndexedDocument {
    pub fn new(
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: impl Into<String>,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            source_type,
            source_id,
            content: content.into(),
            embedding,
            created_at: Utc::now(),
        }
    }

    pub fn is_searchable(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// One window of an uploaded document's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub org_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// Chunk content and optional embedding, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// A retrieval result. `similarity` is in `[0, 1]`, 1 meaning same direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub content: String,
    pub similarity: f64,
}

impl SimilarityHit {
    pub fn new(source_type: SourceType, source_id: Uuid, content: String, similarity: f64) -> Self {
        Self {
            source_type,
            source_id,
            content,
            similarity: if similarity.is_nan() {
                0.0
            } else {
                similarity.clamp(0.0, 1.0)
            },
        }
    }
}
