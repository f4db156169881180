//! # Workspace Indexer Shared
//!
//! Shared types for the workspace search indexer: object identity, the
//! event record consumed from the workspace event stream, and the shapes of
//! the documents written to the search index.

pub mod document;
pub mod event;
pub mod object;

pub use document::{
    AccessDocument, DocumentCategory, FeatureDocument, VersionDocument, PUBLIC_GROUP,
};
pub use event::{EventScope, EventType, WorkspaceEvent};
pub use object::{ObjectKey, ObjectRef};
