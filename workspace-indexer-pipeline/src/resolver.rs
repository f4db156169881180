//! Type resolver.
//!
//! Maps a workspace type name to its target index, whether the type has
//! feature sub-documents, and the extractor that produces its payload.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::errors::PipelineError;
use crate::extractor::ExtractorRef;

/// Index receiving objects of unrecognized types.
pub const DEFAULT_INDEX: &str = "generic";

/// Suffix appended to an index name to form its feature index.
const FEATURE_INDEX_SUFFIX: &str = "feature";

/// One entry of the type mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeMapping {
    /// Type name without version, e.g. `KBaseGenomes.Genome`.
    pub type_name: String,
    /// Index override. Derived from the type name when absent.
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub has_features: bool,
    /// Extractor producing the searchable payload. Metadata only when absent.
    #[serde(default)]
    pub extractor: Option<ExtractorRef>,
}

impl TypeMapping {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            index_name: None,
            has_features: false,
            extractor: None,
        }
    }

    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_features(mut self) -> Self {
        self.has_features = true;
        self
    }

    pub fn with_extractor(mut self, module: impl Into<String>, image: impl Into<String>) -> Self {
        self.extractor = Some(ExtractorRef {
            module: module.into(),
            image: image.into(),
        });
        self
    }
}

/// Result of resolving a type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    /// Index holding the type's version documents.
    pub index_name: String,
    pub has_features: bool,
    pub extractor: Option<ExtractorRef>,
}

impl ResolvedType {
    /// Index holding the type's feature documents, if it has any.
    pub fn feature_index(&self) -> Option<String> {
        self.has_features.then(|| feature_index_name(&self.index_name))
    }

    /// Indices holding any data document of this type.
    pub fn data_indices(&self) -> Vec<String> {
        let mut indices = vec![self.index_name.clone()];
        indices.extend(self.feature_index());
        indices
    }
}

/// Normalized index name for a type: the lowercased part after the module dot.
pub fn normalize_index_name(type_name: &str) -> String {
    let base = type_name.split_once('-').map_or(type_name, |(name, _)| name);
    let name = base.rsplit_once('.').map_or(base, |(_, name)| name);
    name.to_lowercase()
}

fn feature_index_name(index: &str) -> String {
    format!("{}{}", index, FEATURE_INDEX_SUFFIX)
}

/// Static lookup from type name to index and extractor.
#[derive(Debug, Clone, Default)]
pub struct TypeResolver {
    mappings: HashMap<String, TypeMapping>,
}

impl TypeResolver {
    pub fn new(mappings: impl IntoIterator<Item = TypeMapping>) -> Self {
        Self {
            mappings: mappings
                .into_iter()
                .map(|mapping| (mapping.type_name.clone(), mapping))
                .collect(),
        }
    }

    /// Load mappings from a JSON file holding an array of `TypeMapping`s.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::unknown_type(format!("cannot read type mapping {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let mappings: Vec<TypeMapping> = serde_json::from_str(raw)
            .map_err(|e| PipelineError::unknown_type(format!("invalid type mapping: {}", e)))?;
        Ok(Self::new(mappings))
    }

    /// Resolve a type name, which may carry a `-Major.Minor` suffix.
    pub fn resolve(&self, type_name: &str) -> Result<ResolvedType, PipelineError> {
        let base = type_name.split_once('-').map_or(type_name, |(name, _)| name);
        let mapping = self
            .mappings
            .get(base)
            .ok_or_else(|| PipelineError::unknown_type(base))?;

        Ok(ResolvedType {
            index_name: mapping
                .index_name
                .clone()
                .unwrap_or_else(|| normalize_index_name(base)),
            has_features: mapping.has_features,
            extractor: mapping.extractor.clone(),
        })
    }

    /// Target for objects of unrecognized types: metadata only, default index.
    pub fn fallback() -> ResolvedType {
        ResolvedType {
            index_name: DEFAULT_INDEX.to_string(),
            has_features: false,
            extractor: None,
        }
    }

    /// Every index documents may live in, including the default index.
    pub fn all_indices(&self) -> Vec<String> {
        let mut indices = BTreeSet::from([DEFAULT_INDEX.to_string()]);
        for mapping in self.mappings.values() {
            let index = mapping
                .index_name
                .clone()
                .unwrap_or_else(|| normalize_index_name(&mapping.type_name));
            if mapping.has_features {
                indices.insert(feature_index_name(&index));
            }
            indices.insert(index);
        }
        indices.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
