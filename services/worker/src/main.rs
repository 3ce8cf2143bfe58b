use anyhow::{Context, Result};
use docingest_worker::config::ServiceConfig;
use docingest_worker::{BatchOrchestrator, Config, NotificationBatch, PdfiumRasterizer, S3ObjectStore};
use std::io::Read;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        bucket = %config.s3.bucket,
        visibility_timeout_secs = config.transport.visibility_timeout_secs,
        "Starting docingest worker"
    );

    let batch = read_batch().context("Failed to read notification batch")?;
    if batch.records.len() > config.transport.max_batch_size {
        warn!(
            messages = batch.records.len(),
            max_batch_size = config.transport.max_batch_size,
            "Batch larger than the transport is configured to deliver"
        );
    }

    // Initialize components
    let store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize S3 object store")?,
    );
    let rasterizer = Arc::new(
        PdfiumRasterizer::new(config.render.pdfium_library_path.clone())
            .context("Failed to initialize PDFium")?,
    );

    let orchestrator =
        BatchOrchestrator::new(store, rasterizer, config.layout.clone(), config.render.scale);

    let response = orchestrator
        .process_batch_within(&batch, config.invocation_timeout())
        .await;

    serde_json::to_writer(std::io::stdout().lock(), &response)
        .context("Failed to write batch response")?;
    println!();

    info!(
        failed = response.batch_item_failures.len(),
        "Docingest worker finished"
    );

    Ok(())
}

/// Initialize tracing/logging on stderr, keeping stdout for the response
fn init_tracing(config: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

/// Read one batch envelope from the path given as first argument, or stdin
fn read_batch() -> Result<NotificationBatch> {
    let raw = match std::env::args().nth(1) {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {path}"))?
        }
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read stdin")?;
            raw
        }
    };

    serde_json::from_str(&raw).context("Batch is not a valid notification envelope")
}
