//! # Workspace Indexer Repository
//!
//! This crate provides the document store adapter used by the indexer. It
//! includes the `DocumentStore` trait, an OpenSearch implementation, an
//! in-memory implementation, and `SearchIndexClient`, the wrapper that
//! application code talks to.

pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod types;

pub use client::SearchIndexClient;
pub use config::SearchIndexConfig;
pub use errors::SearchIndexError;
pub use interfaces::DocumentStore;
pub use memory::InMemoryDocumentStore;
pub use opensearch::OpenSearchClient;
pub use types::{
    BatchOperationResult, BatchOperationSummary, Condition, DocumentAddress, DocumentQuery,
    FieldUpdate, IndexedDocument,
};
