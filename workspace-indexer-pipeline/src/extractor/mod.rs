//! Type-specific extractor collaborator.
//!
//! An extractor turns raw object content into the structured payload stored
//! in the index, plus one payload per feature for composite types.

mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipelineError;
use crate::workspace::ObjectData;

pub use process::ProcessExtractorRunner;

/// Which extractor module to run for a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorRef {
    /// Module name, used for logging.
    pub module: String,
    /// Container image (or program argument) that runs the extractor.
    pub image: String,
}

/// Output of one extractor run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractorOutput {
    /// Payload for the version document.
    #[serde(default)]
    pub data: Value,
    /// Ordered payloads for feature documents.
    #[serde(default)]
    pub features: Vec<Value>,
}

impl ExtractorOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<Value>) -> Self {
        self.features = features;
        self
    }
}

/// Feature identifier carried by a feature payload.
pub fn feature_id(payload: &Value) -> Result<&str, PipelineError> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PipelineError::extraction("feature payload is missing a string id"))
}

/// Abstract interface for running extractors.
#[async_trait]
pub trait ExtractorRunner: Send + Sync {
    /// Run `extractor` over one object version.
    ///
    /// # Returns
    ///
    /// * `Ok(ExtractorOutput)` - The structured payload and feature payloads
    /// * `Err(PipelineError::ExtractionError)` - On runtime failure, timeout or malformed output
    async fn run(
        &self,
        extractor: &ExtractorRef,
        object: &ObjectData,
    ) -> Result<ExtractorOutput, PipelineError>;
}
