//! # Workspace Indexer Pipeline
//!
//! This crate provides the pipeline that keeps the search index in step with
//! workspace events.
//!
//! ## Architecture
//!
//! 1. **Consumer**: Receives workspace events from Kafka
//! 2. **Orchestrator**: Routes events to workers partitioned by object
//! 3. **Dispatcher**: Maps each event kind to its handler and records failures
//! 4. **Builder / Latest / Access / Fan-out**: The handlers' building blocks
//!
//! Collaborators (workspace service, extractor runner, event producer, error
//! sink) are traits with production implementations in this crate.

pub mod access;
pub mod builder;
pub mod consumer;
pub mod dispatcher;
pub mod error_sink;
pub mod errors;
pub mod extractor;
pub mod fanout;
pub mod latest;
pub mod locks;
pub mod orchestrator;
pub mod producer;
pub mod resolver;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Collaborators, DispatchOutcome, Dispatcher, DispatcherConfig};
pub use error_sink::{ErrorRecord, ErrorSink, FileErrorSink, MemoryErrorSink};
pub use errors::PipelineError;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use resolver::{TypeMapping, TypeResolver};
