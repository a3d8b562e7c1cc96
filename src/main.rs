use std::process::ExitCode;

use tracing::{error, info};

use docstore::file::BlobStore;
use docstore::{Config, Database, FileService, Lifecycle, TaskGateway, WebServer};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = docstore::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        docstore::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> docstore::Result<()> {
    config.validate()?;

    info!("docstore starting");

    let lifecycle = Lifecycle::from_config(&config.files);
    lifecycle.start().await?;

    let db = Database::open(&config.database.path).await?;
    let gateway = TaskGateway::new(&config.executor)?;
    let files = FileService::new(
        db.clone(),
        BlobStore::new(&config.files.storage_path),
        gateway,
    )
    .with_max_file_size(config.max_upload_size_bytes());

    let server = WebServer::new(&config.server, files)?;
    let served = server.run(shutdown_signal()).await;

    if let Err(e) = lifecycle.stop().await {
        error!("Failed to apply retention policy: {}", e);
    }
    db.close().await;
    info!("docstore stopped");

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
