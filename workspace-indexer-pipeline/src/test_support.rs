//! In-memory fakes of the pipeline's collaborators.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use workspace_indexer_shared::{ObjectKey, ObjectRef, WorkspaceEvent};

use crate::errors::PipelineError;
use crate::extractor::{ExtractorOutput, ExtractorRef, ExtractorRunner};
use crate::producer::EventProducer;
use crate::workspace::{ObjectData, ObjectInfo, WorkspaceClient, WorkspaceInfo};

/// Workspace holding objects in memory.
#[derive(Default)]
pub struct FakeWorkspace {
    workspaces: RwLock<HashMap<i64, WorkspaceInfo>>,
    objects: RwLock<BTreeMap<(i64, String, u64), ObjectData>>,
}

impl FakeWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn workspace_info(id: i64, public: bool) -> WorkspaceInfo {
        WorkspaceInfo {
            id,
            name: format!("ws_{}", id),
            owner: "auser".to_string(),
            modified: "2018-10-18T00:12:42+0000".to_string(),
            max_object_id: 0,
            user_permission: "a".to_string(),
            global_read: if public { "r" } else { "n" }.to_string(),
            lock_status: "unlocked".to_string(),
            metadata: HashMap::new(),
        }
    }

    pub async fn set_public(&self, access_group_id: i64, public: bool) {
        self.workspaces
            .write()
            .await
            .insert(access_group_id, Self::workspace_info(access_group_id, public));
    }

    pub async fn add_object(
        &self,
        access_group_id: i64,
        object_id: &str,
        version: u64,
        name: &str,
        type_string: &str,
    ) {
        self.workspaces
            .write()
            .await
            .entry(access_group_id)
            .or_insert_with(|| Self::workspace_info(access_group_id, false));

        let info = ObjectInfo {
            object_id: object_id.to_string(),
            name: name.to_string(),
            type_string: type_string.to_string(),
            save_date: "2018-02-08T23:23:25+0000".to_string(),
            version,
            saved_by: "auser".to_string(),
            access_group_id,
            workspace_name: format!("ws_{}", access_group_id),
            checksum: String::new(),
            size: 0,
            metadata: HashMap::new(),
        };
        self.objects.write().await.insert(
            (access_group_id, object_id.to_string(), version),
            ObjectData {
                info,
                data: json!({ "name": name }),
            },
        );
    }
}

#[async_trait]
impl WorkspaceClient for FakeWorkspace {
    async fn get_workspace_info(&self, access_group_id: i64) -> Result<WorkspaceInfo, PipelineError> {
        self.workspaces
            .read()
            .await
            .get(&access_group_id)
            .cloned()
            .ok_or_else(|| PipelineError::object_fetch(format!("no workspace {}", access_group_id)))
    }

    async fn get_object_version(&self, object: &ObjectRef) -> Result<ObjectData, PipelineError> {
        self.objects
            .read()
            .await
            .get(&(object.key.access_group_id, object.key.object_id.clone(), object.version))
            .cloned()
            .ok_or_else(|| PipelineError::object_fetch(format!("object {} not found", object)))
    }

    async fn list_objects(&self, access_group_id: i64) -> Result<Vec<ObjectInfo>, PipelineError> {
        let objects = self.objects.read().await;
        let mut latest: BTreeMap<String, ObjectInfo> = BTreeMap::new();
        for ((group, object_id, _), data) in objects.iter() {
            if *group == access_group_id {
                // Keys are ordered by version, so the last one wins
                latest.insert(object_id.clone(), data.info.clone());
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn get_object_info(&self, object: &ObjectKey) -> Result<ObjectInfo, PipelineError> {
        self.objects
            .read()
            .await
            .iter()
            .filter(|((group, object_id, _), _)| {
                *group == object.access_group_id && *object_id == object.object_id
            })
            .map(|(_, data)| data.info.clone())
            .last()
            .ok_or_else(|| PipelineError::object_fetch(format!("object {} not found", object)))
    }
}

/// Extractor returning canned output per module.
#[derive(Default)]
pub struct ScriptedExtractor {
    outputs: HashMap<String, Result<ExtractorOutput, PipelineError>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, module: &str, output: ExtractorOutput) -> Self {
        self.outputs.insert(module.to_string(), Ok(output));
        self
    }

    pub fn with_failure(mut self, module: &str, message: &str) -> Self {
        self.outputs
            .insert(module.to_string(), Err(PipelineError::extraction(message)));
        self
    }
}

#[async_trait]
impl ExtractorRunner for ScriptedExtractor {
    async fn run(
        &self,
        extractor: &ExtractorRef,
        object: &ObjectData,
    ) -> Result<ExtractorOutput, PipelineError> {
        match self.outputs.get(&extractor.module) {
            Some(output) => output.clone(),
            None => Ok(ExtractorOutput::new(json!({ "name": object.info.name }))),
        }
    }
}

/// Extractor that holds every run until the test releases it.
pub struct GatedExtractor {
    entered: Notify,
    gate: Semaphore,
}

impl GatedExtractor {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Wait until a run is blocked on the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let `runs` blocked or future runs finish.
    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }
}

#[async_trait]
impl ExtractorRunner for GatedExtractor {
    async fn run(
        &self,
        _extractor: &ExtractorRef,
        object: &ObjectData,
    ) -> Result<ExtractorOutput, PipelineError> {
        self.entered.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| PipelineError::extraction(e.to_string()))?
            .forget();
        Ok(ExtractorOutput::new(json!({ "name": object.info.name })))
    }
}

/// Producer recording every emitted event.
#[derive(Default)]
pub struct RecordingProducer {
    events: Mutex<Vec<WorkspaceEvent>>,
    fail: AtomicBool,
}

impl RecordingProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<WorkspaceEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventProducer for RecordingProducer {
    async fn emit(&self, event: &WorkspaceEvent) -> Result<(), PipelineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::producer("broker unavailable"));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
