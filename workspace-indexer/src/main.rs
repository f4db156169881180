use std::env;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use workspace_indexer::{Dependencies, IndexerConfig, IndexingError};

/// Time allowed for buffered events to reach the broker on shutdown.
const PRODUCER_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> Result<(), IndexingError> {
    let config = IndexerConfig::from_env()?;
    let dependencies = Dependencies::new(&config).await?;

    info!(
        started_at = %chrono::Utc::now().to_rfc3339(),
        workers = config.worker_count,
        "Workspace indexer started"
    );
    dependencies.orchestrator.run().await?;

    // Re-emitted events still buffered would otherwise be lost
    if let Err(e) = dependencies.producer.flush(PRODUCER_FLUSH_TIMEOUT) {
        warn!(error = %e, "Failed to flush producer");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "Workspace indexer failed");
        std::process::exit(1);
    }
}
