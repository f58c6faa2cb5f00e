//! SeaORM entity models
//!
//! Index tables owned by the RAG core plus the business tables it reads

mod document;
mod document_chunk;
mod issue;
mod rag_document;
mod task;

pub use rag_document::{
    Entity as RagDocumentEntity,
    Model as RagDocument,
    ActiveModel as RagDocumentActiveModel,
    Column as RagDocumentColumn,
};

pub use document_chunk::{
    Entity as DocumentChunkEntity,
    Model as DocumentChunkRow,
    ActiveModel as DocumentChunkActiveModel,
    Column as DocumentChunkColumn,
};

pub use task::{
    Entity as TaskEntity,
    Model as Task,
    Column as TaskColumn,
};

pub use issue::{
    Entity as IssueEntity,
    Model as Issue,
    Column as IssueColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    Column as DocumentColumn,
};
