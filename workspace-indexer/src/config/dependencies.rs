//! Dependency initialization and wiring for the workspace indexer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::IndexerConfig;
use crate::IndexingError;
use workspace_indexer_pipeline::{
    consumer::KafkaConsumer,
    extractor::ProcessExtractorRunner,
    orchestrator::{Orchestrator, OrchestratorConfig},
    producer::KafkaEventProducer,
    workspace::JsonRpcWorkspaceClient,
    Collaborators, Dispatcher, DispatcherConfig, FileErrorSink, TypeResolver,
};
use workspace_indexer_repository::{opensearch::IndexConfig, OpenSearchClient, SearchIndexClient};

/// Deadline for a single workspace service call.
const WORKSPACE_TIMEOUT: Duration = Duration::from_secs(60);

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    /// Producer for re-emitted events, flushed on shutdown.
    pub producer: Arc<KafkaEventProducer>,
}

impl Dependencies {
    /// Initialize all dependencies from the configuration.
    ///
    /// Verifies the search engine is healthy and creates every mapped index
    /// before the consumer is built.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails
    pub async fn new(config: &IndexerConfig) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %config.opensearch_url,
            kafka_broker = %config.kafka_broker,
            kafka_group_id = %config.kafka_group_id,
            kafka_topic = %config.kafka_topic,
            workspace_url = %config.workspace_url,
            "Initializing dependencies"
        );

        // Initialize OpenSearch client
        let search_client = OpenSearchClient::new(&config.opensearch_url, IndexConfig::default())
            .await
            .map_err(|e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)))?;
        let index = Arc::new(SearchIndexClient::new(Box::new(search_client)));

        // Verify OpenSearch is reachable
        let healthy = index
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let resolver = match &config.type_mapping_file {
            Some(path) => TypeResolver::from_file(path)?,
            None => {
                warn!("TYPE_MAPPING_FILE not set, all objects go to the default index");
                TypeResolver::default()
            }
        };
        let indices = resolver.all_indices();
        index.ensure_indices(&indices).await?;

        info!(types = resolver.len(), indices = ?indices, "Indices ready");

        let workspace = JsonRpcWorkspaceClient::new(
            config.workspace_url.clone(),
            config.auth_token.clone(),
            WORKSPACE_TIMEOUT,
        )?;

        let extractor = if config.extractor_program == "docker" {
            ProcessExtractorRunner::docker(config.extractor_timeout)
        } else {
            ProcessExtractorRunner::new(
                config.extractor_program.clone(),
                Vec::new(),
                config.extractor_timeout,
            )
        };

        // Re-emitted events go back onto the consumed topic
        let producer = KafkaEventProducer::new(&config.kafka_broker, config.kafka_topic.clone())
            .map_err(|e| IndexingError::config(format!("Failed to create Kafka producer: {}", e)))?;
        let producer = Arc::new(producer);

        let dispatcher = Dispatcher::with_config(
            Collaborators {
                workspace: Arc::new(workspace),
                extractor: Arc::new(extractor),
                producer: producer.clone(),
                index,
                resolver: Arc::new(resolver),
                error_sink: Arc::new(FileErrorSink::new(config.error_log_path.clone())),
            },
            DispatcherConfig {
                handler_timeout: config.handler_timeout,
            },
        );

        // Initialize Kafka consumer
        let consumer = KafkaConsumer::new(
            &config.kafka_broker,
            &config.kafka_group_id,
            &config.kafka_topic,
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?;

        info!("Kafka consumer created");

        let orchestrator = Orchestrator::with_config(
            consumer,
            Arc::new(dispatcher),
            OrchestratorConfig {
                worker_count: config.worker_count,
                ..OrchestratorConfig::default()
            },
        );

        Ok(Self {
            orchestrator,
            producer,
        })
    }
}
