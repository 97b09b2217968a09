use anyhow::{Context, Result};
use camwatch_common::CameraConfig;
use camwatch_operator::{AppContext, LoggingRepository, OperatorConfig};
use camwatch_perception::{DetectorSet, RoutingTransport};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/operator.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config = OperatorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config))?;

    info!("Starting camwatch operator {}", config.node_id);

    // Detection engines are plugged in by deployments; the stock binary
    // only captures.
    let factory = |_: &CameraConfig| DetectorSet::disabled();
    let context = Arc::new(AppContext::new(
        &config,
        Arc::new(RoutingTransport::with_default_live()),
        Arc::new(factory),
        Arc::new(LoggingRepository),
    ));

    context.load_known_identities(config.identities.clone());

    let cameras = config.valid_cameras();
    if cameras.is_empty() {
        warn!("No valid cameras configured");
    }
    for camera in cameras {
        context.add_camera(camera);
    }
    info!(
        "Monitoring {} cameras, {} running",
        context.registry().len(),
        context.registry().active_camera_ids().len()
    );

    wait_for_shutdown().await;

    info!("Shutting down camwatch operator");
    let shutdown = context.clone();
    tokio::task::spawn_blocking(move || shutdown.shutdown()).await?;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("installing tracing subscriber")?;

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
