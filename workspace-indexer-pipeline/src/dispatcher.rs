//! Event dispatcher.
//!
//! Routes each workspace event to its handler, serializes handling per
//! object, enforces the handler deadline and turns every handler failure
//! into an error sink record. Dispatching never fails: the caller can always
//! move on to the next event.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use workspace_indexer_repository::{DocumentQuery, FieldUpdate, SearchIndexClient};
use workspace_indexer_shared::{DocumentCategory, EventType, ObjectKey, ObjectRef, WorkspaceEvent};

use crate::access::AccessPropagator;
use crate::builder::VersionDocumentBuilder;
use crate::error_sink::{ErrorRecord, ErrorSink};
use crate::errors::PipelineError;
use crate::extractor::ExtractorRunner;
use crate::fanout::FanoutProducer;
use crate::latest::LatestReconciler;
use crate::locks::ObjectLocks;
use crate::producer::EventProducer;
use crate::resolver::TypeResolver;
use crate::workspace::WorkspaceClient;

/// Default deadline for a single handler.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deadline for one handler run.
    pub handler_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// Collaborators injected into the dispatcher.
#[derive(Clone)]
pub struct Collaborators {
    pub workspace: Arc<dyn WorkspaceClient>,
    pub extractor: Arc<dyn ExtractorRunner>,
    pub producer: Arc<dyn EventProducer>,
    pub index: Arc<SearchIndexClient>,
    pub resolver: Arc<TypeResolver>,
    pub error_sink: Arc<dyn ErrorSink>,
}

/// What happened to one event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler ran to completion.
    Handled,
    /// The event kind is not handled by this indexer.
    Skipped,
    /// The handler failed; the failure was recorded.
    Failed(PipelineError),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Name under which failures of an event kind are recorded.
pub fn handler_name(event_type: &EventType) -> &'static str {
    match event_type {
        EventType::NewVersion => "new_version",
        EventType::NewAllVersions => "new_all_versions",
        EventType::PublishAccessGroup => "publish_access_group",
        EventType::UnpublishAccessGroup => "unpublish_access_group",
        EventType::PublishAllVersions => "publish_all_versions",
        EventType::UnpublishAllVersions => "unpublish_all_versions",
        EventType::DeleteAllVersions => "delete_all_versions",
        EventType::UndeleteAllVersions => "undelete_all_versions",
        EventType::DeleteAccessGroup => "delete_access_group",
        EventType::RenameAllVersions => "rename_all_versions",
        EventType::CopyAccessGroup => "copy_access_group",
        EventType::ReindexWorkspace => "reindex_workspace",
        EventType::Unknown(_) => "unknown",
    }
}

/// The reconciliation engine.
pub struct Dispatcher {
    workspace: Arc<dyn WorkspaceClient>,
    builder: VersionDocumentBuilder,
    latest: LatestReconciler,
    access: AccessPropagator,
    fanout: FanoutProducer,
    index: Arc<SearchIndexClient>,
    indices: Vec<String>,
    error_sink: Arc<dyn ErrorSink>,
    locks: ObjectLocks,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_config(collaborators, DispatcherConfig::default())
    }

    pub fn with_config(collaborators: Collaborators, config: DispatcherConfig) -> Self {
        let Collaborators {
            workspace,
            extractor,
            producer,
            index,
            resolver,
            error_sink,
        } = collaborators;
        let indices = resolver.all_indices();

        Self {
            builder: VersionDocumentBuilder::new(workspace.clone(), extractor, resolver),
            latest: LatestReconciler::new(index.clone(), indices.clone()),
            access: AccessPropagator::new(index.clone(), indices.clone()),
            fanout: FanoutProducer::new(workspace.clone(), producer),
            workspace,
            index,
            indices,
            error_sink,
            locks: ObjectLocks::new(),
            config,
        }
    }

    /// Every index the dispatcher may write to.
    pub fn indices(&self) -> &[String] {
        &self.indices
    }

    /// Handle one event.
    ///
    /// Events sharing a scope are handled one at a time, in call order.
    #[instrument(
        skip(self, event),
        fields(
            evtype = %event.event_type,
            accgrp = event.access_group_id,
            objid = ?event.object_id,
            ver = ?event.version
        )
    )]
    pub async fn dispatch(&self, event: &WorkspaceEvent) -> DispatchOutcome {
        if let EventType::Unknown(name) = &event.event_type {
            warn!(evtype = %name, "Skipping unknown event type");
            return DispatchOutcome::Skipped;
        }

        let _guard = self.locks.lock(&event.scope()).await;
        let result = match tokio::time::timeout(self.config.handler_timeout, self.handle(event)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(self.config.handler_timeout.as_secs())),
        };

        match result {
            Ok(()) => {
                debug!("Event handled");
                DispatchOutcome::Handled
            }
            Err(e) => {
                let payload = serde_json::to_value(event).unwrap_or(Value::Null);
                self.record(payload, handler_name(&event.event_type), &e).await;
                DispatchOutcome::Failed(e)
            }
        }
    }

    /// Record an event that could not be decoded.
    pub async fn reject(&self, payload: Value, error: PipelineError) -> DispatchOutcome {
        warn!(error = %error, "Rejecting malformed event");
        self.record(payload, "decode", &error).await;
        DispatchOutcome::Failed(error)
    }

    async fn record(&self, payload: Value, handler: &str, e: &PipelineError) {
        error!(handler = %handler, error = %e, "Event handling failed");
        if let Err(sink_error) = self.error_sink.append(ErrorRecord::new(payload, handler, e)).await {
            error!(error = %sink_error, "Failed to record failure");
        }
    }

    async fn handle(&self, event: &WorkspaceEvent) -> Result<(), PipelineError> {
        match &event.event_type {
            EventType::NewVersion => self.new_version(&required_ref(event)?).await,
            EventType::NewAllVersions => self.new_all_versions(&required_key(event)?).await,
            EventType::PublishAccessGroup | EventType::UnpublishAccessGroup => {
                self.set_group_access(event).await
            }
            EventType::PublishAllVersions | EventType::UnpublishAllVersions => {
                self.set_object_access(&required_key(event)?).await
            }
            EventType::DeleteAllVersions => self.delete_all_versions(&required_key(event)?).await,
            EventType::UndeleteAllVersions => {
                self.undelete_all_versions(&required_key(event)?).await
            }
            EventType::DeleteAccessGroup => self.delete_access_group(event).await,
            EventType::RenameAllVersions => {
                let name = event
                    .new_name
                    .as_deref()
                    .ok_or_else(|| PipelineError::malformed("newname is required"))?;
                self.rename_all_versions(&required_key(event)?, name).await
            }
            EventType::CopyAccessGroup | EventType::ReindexWorkspace => {
                self.fanout
                    .fan_out(&event.storage_code, event.access_group_id)
                    .await?;
                Ok(())
            }
            EventType::Unknown(name) => Err(PipelineError::malformed(format!(
                "unhandled event type {}",
                name
            ))),
        }
    }

    async fn is_public(&self, access_group_id: i64) -> Result<bool, PipelineError> {
        Ok(self
            .workspace
            .get_workspace_info(access_group_id)
            .await?
            .is_public())
    }

    async fn new_version(&self, object: &ObjectRef) -> Result<(), PipelineError> {
        let mut built = self.builder.build(object).await?;
        built.set_public(self.is_public(object.key.access_group_id).await?);

        let is_latest = self.latest.commit(built).await?;
        info!(object = %object, islast = is_latest, "Indexed version");
        Ok(())
    }

    async fn new_all_versions(&self, key: &ObjectKey) -> Result<(), PipelineError> {
        let info = self.workspace.get_object_info(key).await?;
        for version in 1..=info.version {
            self.new_version(&key.at_version(version)).await?;
        }
        info!(object = %key, versions = info.version, "Indexed all versions");
        Ok(())
    }

    async fn set_group_access(&self, event: &WorkspaceEvent) -> Result<(), PipelineError> {
        // The workspace's current state wins over the flag carried by the event
        let public = self.is_public(event.access_group_id).await?;
        if event.public.is_some_and(|flag| flag != public) {
            debug!(public = public, "Event public flag is stale");
        }
        self.access
            .apply_access(&event.storage_code, event.access_group_id, public)
            .await?;
        Ok(())
    }

    async fn set_object_access(&self, key: &ObjectKey) -> Result<(), PipelineError> {
        let public = self.is_public(key.access_group_id).await?;
        self.access.apply_object_access(key, public).await?;
        Ok(())
    }

    /// Set `field` on the object's data documents that do not hold `value` yet.
    async fn update_object(
        &self,
        key: &ObjectKey,
        field: &str,
        value: Value,
    ) -> Result<u64, PipelineError> {
        let routing = key.routing_key();
        let query = DocumentQuery::object(key)
            .category(DocumentCategory::Data)
            .not_term(field, value.clone());
        Ok(self
            .index
            .update_by_query(
                &self.indices,
                Some(&routing),
                &query,
                &[FieldUpdate::set(field, value)],
            )
            .await?)
    }

    async fn delete_all_versions(&self, key: &ObjectKey) -> Result<(), PipelineError> {
        let updated = self.update_object(key, "deleted", Value::Bool(true)).await?;
        info!(object = %key, updated = updated, "Deleted all versions");
        Ok(())
    }

    async fn undelete_all_versions(&self, key: &ObjectKey) -> Result<(), PipelineError> {
        let updated = self.update_object(key, "deleted", Value::Bool(false)).await?;
        let latest = self.latest.recompute(key).await?;
        info!(object = %key, updated = updated, latest = ?latest, "Undeleted all versions");
        Ok(())
    }

    async fn delete_access_group(&self, event: &WorkspaceEvent) -> Result<(), PipelineError> {
        let query = DocumentQuery::access_group(&event.storage_code, event.access_group_id)
            .category(DocumentCategory::Data)
            .not_term("deleted", true);
        let updated = self
            .index
            .update_by_query(
                &self.indices,
                None,
                &query,
                &[FieldUpdate::set("deleted", true)],
            )
            .await?;
        info!(updated = updated, "Deleted access group");
        Ok(())
    }

    async fn rename_all_versions(&self, key: &ObjectKey, name: &str) -> Result<(), PipelineError> {
        let updated = self
            .update_object(key, "name", Value::String(name.to_string()))
            .await?;
        info!(object = %key, name = %name, updated = updated, "Renamed all versions");
        Ok(())
    }
}

fn required_key(event: &WorkspaceEvent) -> Result<ObjectKey, PipelineError> {
    event.object_key().ok_or_else(|| {
        PipelineError::malformed(format!("{} requires objid", event.event_type))
    })
}

fn required_ref(event: &WorkspaceEvent) -> Result<ObjectRef, PipelineError> {
    let key = required_key(event)?;
    let version = event
        .version
        .ok_or_else(|| PipelineError::malformed(format!("{} requires ver", event.event_type)))?;
    Ok(key.at_version(version))
}
