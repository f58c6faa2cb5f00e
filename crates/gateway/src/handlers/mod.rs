//! API handlers module

pub mod health;
pub mod index;
pub mod rag;
