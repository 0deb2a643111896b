use std::sync::Arc;
use syncline::{
    HttpTransport, LogFormat, Orchestrator, SqliteStore, SyncReport, WorkerConfig,
};
use syncline_client::ApiClient;
use syncline_core::SyncError;
use syncline_credential::{CredentialConfig, CredentialManager};
use syncline_queue::SyncQueueConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    init_logging(&config);

    let code = match execute(config).await {
        Ok(report) if report.is_success() => 0,
        Ok(_) => 1,
        Err(err) => {
            tracing::error!(error = %err, kind = err.kind(), "sync run failed");
            1
        }
    };
    std::process::exit(code);
}

async fn execute(config: WorkerConfig) -> Result<SyncReport, SyncError> {
    let transport = HttpTransport::new()?.boxed();

    let credentials = CredentialManager::new(
        CredentialConfig::builder()
            .base_url(&config.base_url)
            .email(&config.email)
            .password(&config.password)
            .build()?,
        transport.clone(),
    );

    let client = ApiClient::builder()
        .transport(transport)
        .rate_limiter(config.rate_limiter())
        .credentials(credentials)
        .retry(config.retry_policy())
        .base_url(&config.base_url)
        .default_timeout(config.fetch_timeout())
        .build()?;

    let queue = SyncQueueConfig::builder()
        .max_parallel(config.max_parallel_syncs)
        .name("records")
        .build()?;

    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);

    Orchestrator::new(client, queue, store, &config).run().await
}

fn init_logging(config: &WorkerConfig) {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
