//! Card-frame daemon
//!
//! Registers the configured chassis, cards, and serial ports, then serves the
//! operator console until input ends, `quit` is entered, or a shutdown signal
//! arrives.
//!
//! # Mock mode
//!
//! `--mock` registers everything against an in-memory host instead of the
//! machine's serial devices. `--fail <device>` (repeatable, mock mode only)
//! makes that device's registration fail, e.g. `--fail 3/1` for the card in
//! slot 1 of chassis 0x03.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cardframe_core::{default_config_path, DeviceId};
use cardframe_hardware::{MockHost, RegistrationHost, Registry, SystemHost};
use cardframed::lifecycle::{self, DaemonLifecycle, ProcessEvent};
use cardframed::{Console, DeviceRegistrationFacade, LinkMonitor, PortDispatcher, RuntimeConfig};
use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info, warn};

/// Card-frame serial dispatch daemon
#[derive(Parser, Debug)]
#[command(name = "cardframed")]
#[command(version, about = "Card-frame registration daemon and operator console", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable mock mode (run without hardware for testing/development)
    #[arg(long)]
    mock: bool,

    /// Device whose registration fails in mock mode (`3`, `3/1`, `3/1/2`)
    #[arg(long = "fail", value_name = "DEVICE")]
    fail: Vec<DeviceId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("cardframed starting...");

    // CLI flag > env var > default
    let config_path = args.config.unwrap_or_else(|| {
        std::env::var("CARDFRAME_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    });
    info!("Configuration file: {}", config_path.display());

    let runtime_config = RuntimeConfig::load(&config_path).await?;
    let static_config = runtime_config.static_config();

    let host: Box<dyn RegistrationHost> = if args.mock {
        info!("Mock mode: no serial devices will be opened");
        Box::new(MockHost::with_failures(args.fail))
    } else {
        if !args.fail.is_empty() {
            warn!("--fail only applies in mock mode, ignoring");
        }
        Box::new(SystemHost::new(&static_config.link))
    };

    // Registration failures degrade the daemon but never stop it
    let registry = Arc::new(Registry::new());
    let mut facade = DeviceRegistrationFacade::new(registry.clone());
    facade.bring_up(&*host, static_config).await;

    let (monitor, link_task) = LinkMonitor::spawn(registry.clone());
    let heartbeat = if static_config.link.enable_heartbeat {
        Some(monitor.start_heartbeat(
            registry.clone(),
            Duration::from_secs(static_config.link.heartbeat_interval_secs),
        ))
    } else {
        None
    };

    let dispatcher = PortDispatcher::new(registry.clone(), static_config.console.default_chassis);
    let console = Console::new(
        dispatcher,
        registry.clone(),
        static_config.console.prompt.clone(),
    );

    info!("Console ready, type 'help' for commands");

    let mut interrupted = false;
    let mut stdout = tokio::io::stdout();
    tokio::select! {
        result = console.run(BufReader::new(tokio::io::stdin()), &mut stdout) => {
            if let Err(e) = result {
                error!("Console I/O failed: {}", e);
            }
        }
        _ = shutdown_signal() => {
            interrupted = true;
        }
    }

    lifecycle::deliver(&DaemonLifecycle::new(registry.clone()), &ProcessEvent::Stopping).await;

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    drop(monitor);
    if let Err(e) = link_task.await {
        warn!("Link monitor ended abnormally: {}", e);
    }

    info!("cardframed shutdown complete");

    if interrupted {
        // A pending stdin read cannot be cancelled and would hold the runtime open
        std::process::exit(0);
    }
    Ok(())
}

/// Wait for shutdown signal
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
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
