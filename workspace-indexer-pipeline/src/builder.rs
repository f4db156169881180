//! Version document builder.
//!
//! Fetches one object version, runs its extractor and assembles the version
//! document plus feature documents. Nothing is written here, so a failed
//! build leaves the index untouched.

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use workspace_indexer_repository::{DocumentAddress, IndexedDocument};
use workspace_indexer_shared::{AccessDocument, FeatureDocument, ObjectRef, VersionDocument};

use crate::errors::PipelineError;
use crate::extractor::{feature_id, ExtractorOutput, ExtractorRunner};
use crate::resolver::{ResolvedType, TypeResolver};
use crate::workspace::WorkspaceClient;

/// Documents built for one object version, not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltVersion {
    pub target: ResolvedType,
    pub version: VersionDocument,
    pub features: Vec<FeatureDocument>,
}

impl BuiltVersion {
    /// Set the latest flag on the version and its features.
    pub fn set_islast(&mut self, islast: bool) {
        self.version.islast = islast;
        for feature in &mut self.features {
            feature.islast = islast;
        }
    }

    /// Set the public flag on the version and its features.
    pub fn set_public(&mut self, public: bool) {
        self.version.public = public;
        for feature in &mut self.features {
            feature.public = public;
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        self.version.object_ref()
    }

    /// Version and feature documents, addressed under the object's routing key.
    pub fn documents(&self) -> Result<Vec<IndexedDocument>, PipelineError> {
        let routing = self.version.routing_key();
        let mut documents = Vec::with_capacity(self.features.len() + 1);
        documents.push(IndexedDocument::new(
            DocumentAddress::data(&self.target.index_name, &routing, &self.version.id),
            &self.version,
        )?);

        if let Some(feature_index) = self.target.feature_index() {
            for feature in &self.features {
                documents.push(IndexedDocument::new(
                    DocumentAddress::data(&feature_index, &routing, &feature.id),
                    feature,
                )?);
            }
        }
        Ok(documents)
    }

    /// The object's access document, stored alongside its versions.
    pub fn access_document(&self) -> Result<IndexedDocument, PipelineError> {
        let key = self.object_ref().key;
        let access = AccessDocument::new(&key, self.version.public);
        Ok(IndexedDocument::new(
            DocumentAddress::access(&self.target.index_name, key.routing_key(), &access.id),
            &access,
        )?)
    }
}

/// Builds version documents from workspace objects.
pub struct VersionDocumentBuilder {
    workspace: Arc<dyn WorkspaceClient>,
    extractor: Arc<dyn ExtractorRunner>,
    resolver: Arc<TypeResolver>,
}

impl VersionDocumentBuilder {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        extractor: Arc<dyn ExtractorRunner>,
        resolver: Arc<TypeResolver>,
    ) -> Self {
        Self {
            workspace,
            extractor,
            resolver,
        }
    }

    /// Resolve a type, falling back to the default index for unknown types.
    pub fn target_for(&self, type_name: &str) -> ResolvedType {
        match self.resolver.resolve(type_name) {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, "No type mapping, using default index");
                TypeResolver::fallback()
            }
        }
    }

    /// Build the documents for one object version.
    ///
    /// # Returns
    ///
    /// * `Ok(BuiltVersion)` - Documents with `islast = true` and `deleted = false`
    /// * `Err(PipelineError)` - If the fetch or the extractor fails, or a feature lacks an id
    #[instrument(skip(self), fields(object = %object))]
    pub async fn build(&self, object: &ObjectRef) -> Result<BuiltVersion, PipelineError> {
        let fetched = self.workspace.get_object_version(object).await?;
        let object_type = fetched.info.object_type().to_string();
        let target = self.target_for(&object_type);

        let output = match &target.extractor {
            Some(extractor) => self.extractor.run(extractor, &fetched).await?,
            None => ExtractorOutput::default(),
        };

        let mut version = VersionDocument::new(object, fetched.info.name.clone(), object_type);
        version.type_version = fetched.info.type_version();
        version.save_date = Some(fetched.info.save_date.clone());
        version.saved_by = Some(fetched.info.saved_by.clone());
        version.extracted = output.data;

        let features = if target.has_features {
            output
                .features
                .into_iter()
                .map(|payload| -> Result<FeatureDocument, PipelineError> {
                    let id = feature_id(&payload)?.to_string();
                    Ok(version.feature(id, payload))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            if !output.features.is_empty() {
                debug!(count = output.features.len(), "Ignoring features of a type without a feature index");
            }
            Vec::new()
        };

        debug!(index = %target.index_name, features = features.len(), "Built version documents");
        Ok(BuiltVersion {
            target,
            version,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TypeMapping;
    use crate::test_support::{FakeWorkspace, ScriptedExtractor};
    use serde_json::json;

    fn builder(workspace: FakeWorkspace, extractor: ScriptedExtractor) -> VersionDocumentBuilder {
        let resolver = TypeResolver::new([TypeMapping::new("KBaseGenomes.Genome")
            .with_features()
            .with_extractor("genome_indexer", "kbase/genome")]);
        VersionDocumentBuilder::new(Arc::new(workspace), Arc::new(extractor), Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_build_with_features() {
        let workspace = FakeWorkspace::new();
        workspace.add_object(1, "3", 1, "Rhodobacter", "KBaseGenomes.Genome-14.2").await;
        let extractor = ScriptedExtractor::new().with_output(
            "genome_indexer",
            ExtractorOutput::new(json!({"scientific_name": "Rhodobacter"}))
                .with_features(vec![json!({"id": "f1", "function": "kinase"}), json!({"id": "f2"})]),
        );

        let built = builder(workspace, extractor)
            .build(&ObjectRef::new("WS", 1, "3", 1))
            .await
            .unwrap();

        assert_eq!(built.version.id, "WS:1:3:1");
        assert_eq!(built.version.name, "Rhodobacter");
        assert_eq!(built.version.type_version, Some(14));
        assert!(built.version.islast);
        assert!(!built.version.deleted);
        assert_eq!(built.features.len(), 2);
        assert_eq!(built.features[0].id, "WS:1:3:1:f1");

        let documents = built.documents().unwrap();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].address.index, "genome");
        assert_eq!(documents[1].address.index, "genomefeature");
        assert!(documents.iter().all(|d| d.address.routing == "WS:1:3"));
    }

    #[tokio::test]
    async fn test_unknown_type_uses_default_index() {
        let workspace = FakeWorkspace::new();
        workspace.add_object(1, "2", 3, "foo", "X.Foo-1.0").await;

        let built = builder(workspace, ScriptedExtractor::new())
            .build(&ObjectRef::new("WS", 1, "2", 3))
            .await
            .unwrap();

        assert_eq!(built.target.index_name, "generic");
        assert_eq!(built.version.object_type, "X.Foo");
        assert!(built.features.is_empty());
    }

    #[tokio::test]
    async fn test_feature_without_id_fails_build() {
        let workspace = FakeWorkspace::new();
        workspace.add_object(1, "3", 1, "g", "KBaseGenomes.Genome-14.2").await;
        let extractor = ScriptedExtractor::new().with_output(
            "genome_indexer",
            ExtractorOutput::new(json!({})).with_features(vec![json!({"function": "kinase"})]),
        );

        let result = builder(workspace, extractor)
            .build(&ObjectRef::new("WS", 1, "3", 1))
            .await;

        assert!(matches!(result, Err(PipelineError::ExtractionError(_))));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let result = builder(FakeWorkspace::new(), ScriptedExtractor::new())
            .build(&ObjectRef::new("WS", 1, "9", 1))
            .await;

        assert!(matches!(result, Err(PipelineError::ObjectFetchError(_))));
    }
}
