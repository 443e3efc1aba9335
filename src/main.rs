use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolgate::logging::init_logging;
use toolgate::mcp::{detached_stdin, metadata_from_env, run_stdio, GatewayState, McpServer};
use toolgate::shutdown::ShutdownCoordinator;
use toolgate::{Config, DEFAULT_CONFIG_FILE, VERSION};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Serve JSON-RPC on stdin/stdout only (no network listener)
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config, cli.host, cli.port)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if cli.stdio {
        config.transports.stdio = true;
        config.transports.http = false;
        config.transports.websocket = false;
        config.transports.sse = false;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging)?;
    info!("Starting toolgate v{}", VERSION);
    if !cli.config.exists() {
        warn!("Config file {} not found, running with defaults", cli.config.display());
    }

    let shutdown = ShutdownCoordinator::new();
    let state = GatewayState::from_config(&config, shutdown.clone())?;

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let network = async {
        if !config.transports.any_network() {
            return Ok(());
        }
        let server = McpServer::new(state.clone(), config.transports.clone());
        let result = server.run(&config.server.host, config.server.port).await;
        if let Err(e) = &result {
            error!("Network transports failed: {}", e);
            shutdown.begin_shutdown();
        }
        result
    };

    let stdio = async {
        if !config.transports.stdio {
            return Ok(());
        }
        let metadata = metadata_from_env(&config.auth.headers);
        let result = match detached_stdin() {
            Ok(stdin) => run_stdio(state.clone(), metadata, stdin, tokio::io::stdout()).await,
            Err(e) => Err(e),
        };
        // stdin EOF ends the session, and with it the process
        shutdown.begin_shutdown();
        result
    };

    let drain = drain_on_shutdown(
        &shutdown,
        &state,
        Duration::from_millis(config.shutdown.drain_timeout_ms),
    );

    let (network, stdio, ()) = tokio::join!(network, stdio, drain);
    network?;
    stdio?;

    info!("toolgate stopped");
    Ok(())
}

async fn drain_on_shutdown(shutdown: &Arc<ShutdownCoordinator>, state: &GatewayState, timeout: Duration) {
    shutdown.shutdown_requested().await;
    if !shutdown.drain(state.broadcaster(), timeout).await {
        warn!("Some invocations were still running when connections were closed");
    }
}

async fn wait_for_signal(shutdown: Arc<ShutdownCoordinator>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt");
    }

    shutdown.begin_shutdown();
}
