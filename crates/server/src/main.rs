use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stickerkit_core::{
    create_broker, create_reaper, load_config, load_default_config, validate_config, Config,
    FfmpegTranscoder, ImageEncoder, ProcessorConfig, RasterImageEncoder, ShutdownMode,
    StickerProcessor, SweepScheduler, Transcoder,
};
use stickerkit_server::api::create_router;
use stickerkit_server::state::AppState;

/// Config file used when `STICKERKIT_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_configuration()?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    for dir in [&config.paths.uploads, &config.paths.output] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    info!(
        uploads = %config.paths.uploads.display(),
        output = %config.paths.output.display(),
        "Working directories ready"
    );

    // Notification broker
    let (broker, broker_actor) = create_broker();
    let broker_handle = tokio::spawn(broker_actor.run());

    // Delayed deletes and periodic sweep
    let (reaper, reaper_task) =
        create_reaper(Duration::from_millis(config.cleanup.delete_grace_ms));
    let reaper_handle = tokio::spawn(reaper_task.run());
    let scheduler = SweepScheduler::from_config(
        vec![config.paths.uploads.clone(), config.paths.output.clone()],
        &config.cleanup,
    );
    info!(
        interval_secs = config.cleanup.interval_secs,
        max_age_secs = config.cleanup.max_age_secs,
        "Cleanup scheduler started"
    );

    // Converters
    let ffmpeg = FfmpegTranscoder::new(config.converter.clone());
    if let Err(e) = ffmpeg.validate().await {
        warn!("ffmpeg unavailable, video conversion will fail: {}", e);
    }
    let transcoder: Arc<dyn Transcoder> = Arc::new(ffmpeg);
    let image_encoder: Arc<dyn ImageEncoder> = Arc::new(RasterImageEncoder::new());

    let processor = Arc::new(StickerProcessor::new(
        ProcessorConfig::from_config(&config),
        transcoder,
        image_encoder,
        broker.clone(),
        reaper.clone(),
    ));

    let state = Arc::new(AppState::new(
        config.clone(),
        processor,
        broker.clone(),
        reaper.clone(),
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    scheduler.stop().await;
    info!("Cleanup scheduler stopped");

    let drained = reaper.shutdown(ShutdownMode::Drain).await;
    let _ = reaper_handle.await;
    info!(deleted = drained, "Pending deletions drained");

    broker.shutdown();
    let _ = broker_handle.await;
    info!("Broker stopped");

    Ok(())
}

/// Loads the config file named by `STICKERKIT_CONFIG`, or `config.toml`.
///
/// A missing default file means all defaults; a missing explicit file is an error.
fn load_configuration() -> Result<Config> {
    match std::env::var("STICKERKIT_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                info!("Loading configuration from {:?}", path);
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))
            } else {
                info!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                load_default_config().context("Failed to load default config")
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
