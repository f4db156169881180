//! Configuration for the workspace indexer.

mod dependencies;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::IndexingError;

pub use dependencies::Dependencies;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "workspace-indexer";

/// Default topic carrying workspace events.
const DEFAULT_KAFKA_TOPIC: &str = "workspaceevents";

const DEFAULT_EXTRACTOR_PROGRAM: &str = "docker";
const DEFAULT_EXTRACTOR_TIMEOUT_SECS: u64 = 600;
const DEFAULT_ERROR_LOG_PATH: &str = "error.log";
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 300;

/// Settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    pub opensearch_url: String,
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub kafka_topic: String,
    pub workspace_url: String,
    pub auth_token: Option<String>,
    pub type_mapping_file: Option<PathBuf>,
    pub extractor_program: String,
    pub extractor_timeout: Duration,
    pub error_log_path: PathBuf,
    pub worker_count: usize,
    pub handler_timeout: Duration,
}

impl IndexerConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: workspace-indexer)
    /// - `KAFKA_TOPIC`: Event topic (default: workspaceevents)
    /// - `WORKSPACE_URL`: Workspace service endpoint (required)
    /// - `KB_AUTH_TOKEN`: Token sent to the workspace service
    /// - `TYPE_MAPPING_FILE`: JSON type mapping; every type uses the default index when unset
    /// - `EXTRACTOR_PROGRAM`: Program running extractor images (default: docker)
    /// - `EXTRACTOR_TIMEOUT_SECS`: Extractor deadline (default: 600)
    /// - `ERROR_LOG_PATH`: Error sink file (default: error.log)
    /// - `WORKER_COUNT`: Partitioned workers (default: 4)
    /// - `HANDLER_TIMEOUT_SECS`: Handler deadline (default: 300)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let workspace_url = get("WORKSPACE_URL")
            .ok_or_else(|| IndexingError::config("WORKSPACE_URL is required"))?;

        Ok(Self {
            opensearch_url: or_default("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            kafka_broker: or_default("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            kafka_group_id: or_default("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            kafka_topic: or_default("KAFKA_TOPIC", DEFAULT_KAFKA_TOPIC),
            workspace_url,
            auth_token: get("KB_AUTH_TOKEN"),
            type_mapping_file: get("TYPE_MAPPING_FILE").map(PathBuf::from),
            extractor_program: or_default("EXTRACTOR_PROGRAM", DEFAULT_EXTRACTOR_PROGRAM),
            extractor_timeout: Duration::from_secs(parse_or(
                get("EXTRACTOR_TIMEOUT_SECS"),
                "EXTRACTOR_TIMEOUT_SECS",
                DEFAULT_EXTRACTOR_TIMEOUT_SECS,
            )?),
            error_log_path: PathBuf::from(or_default("ERROR_LOG_PATH", DEFAULT_ERROR_LOG_PATH)),
            worker_count: parse_or(get("WORKER_COUNT"), "WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            handler_timeout: Duration::from_secs(parse_or(
                get("HANDLER_TIMEOUT_SECS"),
                "HANDLER_TIMEOUT_SECS",
                DEFAULT_HANDLER_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, IndexingError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IndexingError::config(format!("{} is invalid ({}): {}", key, raw, e))),
        None => Ok(default),
    }
}
