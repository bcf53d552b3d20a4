//! Knowledge base application services.
//!
//! - [`KnowledgeBaseService`]: document lifecycle and semantic search with
//!   category filtering on top of a [`kb_vector::VectorStore`].
//! - [`ImportService`]: bulk import of CSV and spreadsheet files.

pub mod import;
pub mod knowledge;

pub use import::{ImportFormat, ImportReport, ImportService, RowError};
pub use knowledge::KnowledgeBaseService;
