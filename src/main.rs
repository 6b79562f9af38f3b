use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webcam_relay::camera::{DeviceRegistry, FrameBuffer, V4l2Driver};
use webcam_relay::config::{self, ConfigStore};
use webcam_relay::events::EventBus;
use webcam_relay::state::AppState;
use webcam_relay::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// webcam-relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "webcam-relay")]
#[command(version, about = "Stream local cameras to remote clients over WebSocket", long_about = None)]
struct CliArgs {
    /// Listen address (overrides database config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides database config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Data directory path (default: /etc/webcam-relay)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory scanned for capture devices (overrides database config)
    #[arg(long, value_name = "DIR")]
    device_dir: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting webcam-relay v{}", env!("CARGO_PKG_VERSION"));

    // Determine data directory (CLI arg takes precedence)
    let data_dir = args.data_dir.unwrap_or_else(get_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir).await?;

    // Initialize configuration store
    let db_path = data_dir.join("webcam-relay.db");
    let config_store = ConfigStore::new(&db_path).await?;
    let mut config = (*config_store.get()).clone();

    if config.capture.device_dir.trim().is_empty() {
        config.capture.device_dir = config::CaptureConfig::default().device_dir;
        tracing::warn!(
            "Capture device directory not set, using {}",
            config.capture.device_dir
        );
        config_store.set(config.clone()).await?;
    }

    // Apply CLI argument overrides to config (only if explicitly specified)
    if let Some(addr) = args.address {
        config.web.bind_address = addr;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(dir) = args.device_dir {
        config.capture.device_dir = dir.to_string_lossy().to_string();
    }

    let bind_addr = resolve_bind_address(&config.web)?;
    tracing::info!("Server will listen on: http://{}", bind_addr);

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let events = Arc::new(EventBus::new());
    tracing::info!("Event bus initialized");

    // Camera core: the driver feeds the frame buffer, the registry owns the driver
    let frames = Arc::new(FrameBuffer::new());
    let driver = Arc::new(V4l2Driver::new(config.capture.clone(), frames.clone()));
    let registry = Arc::new(DeviceRegistry::new(driver));

    let state = AppState::new(config_store, registry, frames, events, shutdown_tx);

    // Initial enumeration; clients re-enumerate with getcameras
    let reload_registry = state.registry.clone();
    match tokio::task::spawn_blocking(move || reload_registry.reload()).await? {
        Ok(count) => tracing::info!(
            "Found {} camera(s) in {}",
            count,
            config.capture.device_dir
        ),
        Err(e) => tracing::warn!("Failed to enumerate cameras: {}", e),
    }

    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    let server = axum::serve(listener, app);
    tokio::select! {
        _ = shutdown_signal => {
            cleanup(&state).await;
        }
        result = server => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
            cleanup(&state).await;
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "webcam_relay=error,tower_http=error",
        LogLevel::Warn => "webcam_relay=warn,tower_http=warn",
        LogLevel::Info => "webcam_relay=info,tower_http=info",
        LogLevel::Verbose => "webcam_relay=debug,tower_http=info",
        LogLevel::Debug => "webcam_relay=debug,tower_http=debug",
        LogLevel::Trace => "webcam_relay=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the application data directory
fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("WEBCAM_RELAY_DATA_DIR") {
        return PathBuf::from(path);
    }

    PathBuf::from("/etc/webcam-relay")
}

fn resolve_bind_address(web: &config::WebConfig) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", web.bind_address))?;
    Ok(SocketAddr::new(ip, web.http_port))
}

/// Stop streams, then release cameras
async fn cleanup(state: &Arc<AppState>) {
    state.shutdown().await;
    tracing::info!("Streams stopped and cameras released");
}
