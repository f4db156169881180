//! Extractor runner that spawns an external process per object.
//!
//! The process receives `{"data": ..., "info": ...}` on stdin and must print
//! an `ExtractorOutput` JSON document on stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{ExtractorOutput, ExtractorRef, ExtractorRunner};
use crate::errors::PipelineError;
use crate::workspace::ObjectData;

/// Runs extractors as child processes, by default through `docker run`.
#[derive(Debug, Clone)]
pub struct ProcessExtractorRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessExtractorRunner {
    /// Create a runner invoking `program args... <image>`.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Runner using `docker run --rm -i <image>`.
    pub fn docker(timeout: Duration) -> Self {
        Self::new(
            "docker",
            vec!["run".to_string(), "--rm".to_string(), "-i".to_string()],
            timeout,
        )
    }
}

#[async_trait]
impl ExtractorRunner for ProcessExtractorRunner {
    #[instrument(skip(self, object), fields(module = %extractor.module, object_id = %object.info.object_id))]
    async fn run(
        &self,
        extractor: &ExtractorRef,
        object: &ObjectData,
    ) -> Result<ExtractorOutput, PipelineError> {
        let input = serde_json::to_vec(&json!({
            "data": object.data,
            "info": object.info
        }))
        .map_err(|e| PipelineError::extraction(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&extractor.image)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::extraction(format!("failed to start {}: {}", self.program, e))
            })?;

        // Feed stdin concurrently so a chatty child cannot deadlock on a full pipe
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::extraction("extractor stdin unavailable"))?;
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                PipelineError::extraction(format!(
                    "{} timed out after {}s",
                    extractor.module,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PipelineError::extraction(e.to_string()))?;

        if let Ok(Err(e)) = writer.await {
            warn!(error = %e, "Extractor closed stdin early");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::extraction(format!(
                "{} exited with {}: {}",
                extractor.module,
                output.status,
                stderr.trim()
            )));
        }

        let parsed: ExtractorOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            PipelineError::extraction(format!("{} produced malformed output: {}", extractor.module, e))
        })?;

        debug!(features = parsed.features.len(), "Extractor finished");
        Ok(parsed)
    }
}
