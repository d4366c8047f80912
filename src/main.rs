use std::{path::Path, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tollgate::{
    GatewayRegistry,
    adapters::{FileConfigProvider, HealthMonitor, TcpHealthProbe},
    config::{ConfigLoadError, GatewayConfig, load_config, load_config_or_default},
    ports::config_provider::ConfigProvider,
    tracing_setup::{self, component_span},
    utils::{GracefulShutdown, RateLimitSweeper, ShutdownReason},
};
use tracing::Instrument;

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);
const RELOAD_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "tollgate.json")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "tollgate.json")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "tollgate.json")]
        config: String,
    },
    /// Print the gateway snapshot built from a configuration file
    Info {
        /// Configuration file to use
        #[clap(short, long, default_value = "tollgate.json")]
        config: String,
    },
    /// Run the decision core with config hot reload (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "tollgate.json")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config),
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Info { config }) => info_command(&config),
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

async fn serve_command(config_path: &str) -> Result<()> {
    tracing_setup::init_tracing().wrap_err("Failed to initialize tracing")?;

    tracing::info!("Loading initial configuration from {config_path}");
    let initial_config = load_config_or_default(config_path);

    let registry = Arc::new(
        GatewayRegistry::from_config(&initial_config)
            .context("Failed to build gateway registry")?,
    );
    let config_holder = Arc::new(ArcSwap::from_pointee(initial_config));

    tracing::info!(
        "Tollgate started with {} routes and {} services",
        registry.route_count(),
        registry.service_count()
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    let cleanup_interval = config_holder.load().rate_limit.cleanup_interval();
    let sweeper_handle = RateLimitSweeper::new(Arc::clone(&registry), cleanup_interval)
        .spawn(graceful_shutdown.subscribe());

    let probe_interval = {
        let config = config_holder.load();
        humantime::parse_duration(&config.health.probe_interval)
            .map_err(|e| eyre!("Invalid health.probe_interval: {e}"))?
    };
    let monitor = HealthMonitor::new(
        Arc::clone(&registry),
        Arc::new(TcpHealthProbe::default()),
        probe_interval,
    );
    let monitor_shutdown = graceful_shutdown.subscribe();
    let monitor_handle = tokio::spawn(
        async move {
            if let Err(e) = monitor.run(monitor_shutdown).await {
                tracing::error!("Health monitor error: {}", e);
            }
        }
        .instrument(component_span("health_monitor")),
    );

    // Config Watcher Task
    let watcher_handle = match FileConfigProvider::new(config_path) {
        Ok(provider) => Some(spawn_config_watcher(
            Arc::new(provider),
            Arc::clone(&registry),
            Arc::clone(&config_holder),
            graceful_shutdown.subscribe(),
        )),
        Err(e) => {
            tracing::warn!(
                "Config hot reload disabled, cannot watch {}: {:#}",
                config_path,
                e
            );
            None
        }
    };

    let status_registry = Arc::clone(&registry);
    let status_handle = tokio::spawn(
        log_status(status_registry, graceful_shutdown.subscribe())
            .instrument(component_span("status_reporter")),
    );

    graceful_shutdown
        .run_signal_handler()
        .await
        .context("Signal handler failed")?;

    let handles = [
        Some(sweeper_handle),
        Some(monitor_handle),
        watcher_handle,
        Some(status_handle),
    ];
    for handle in handles.into_iter().flatten() {
        if let Err(e) = handle.await {
            tracing::warn!("Background task ended abnormally: {}", e);
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

fn spawn_config_watcher(
    provider: Arc<FileConfigProvider>,
    registry: Arc<GatewayRegistry>,
    holder: Arc<ArcSwap<GatewayConfig>>,
    mut shutdown: broadcast::Receiver<ShutdownReason>,
) -> JoinHandle<()> {
    let mut notify_rx = provider.watch();
    tokio::spawn(
        async move {
            tracing::info!("Config watcher task started.");
            let mut last_reload = tokio::time::Instant::now()
                .checked_sub(RELOAD_DEBOUNCE)
                .unwrap_or_else(tokio::time::Instant::now);

            loop {
                tokio::select! {
                    event = notify_rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                    }
                    _ = shutdown.recv() => break,
                }

                if last_reload.elapsed() < RELOAD_DEBOUNCE {
                    tracing::debug!("Debouncing config reload event");
                    while notify_rx.try_recv().is_ok() {}
                    continue;
                }
                last_reload = tokio::time::Instant::now();

                reload_config(&*provider, &registry, &holder).await;
                while notify_rx.try_recv().is_ok() {}
            }
            tracing::info!("Config watcher task is shutting down.");
        }
        .instrument(component_span("config_watcher")),
    )
}

async fn reload_config(
    provider: &dyn ConfigProvider,
    registry: &GatewayRegistry,
    holder: &ArcSwap<GatewayConfig>,
) {
    tracing::info!("Attempting to reload configuration");
    let new_config = match provider.load_config().await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                "Failed to reload configuration: {:#}. Keeping old configuration.",
                e
            );
            return;
        }
    };

    match registry.apply_config(&new_config) {
        Ok(()) => {
            holder.store(Arc::new(new_config));
            tracing::info!(
                "Configuration reloaded: {} routes, {} services",
                registry.route_count(),
                registry.service_count()
            );
        }
        Err(e) => {
            tracing::error!("Rejected reloaded configuration: {}", e);
        }
    }
}

async fn log_status(
    registry: Arc<GatewayRegistry>,
    mut shutdown: broadcast::Receiver<ShutdownReason>,
) {
    let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let info = registry.get_gateway_info();
                tracing::info!(
                    status = %info.status,
                    routes = info.routes,
                    services = info.services,
                    requests_total = info.metrics.requests_total,
                    success_rate = info.metrics.success_rate,
                    p95_latency_ms = info.metrics.p95_latency_ms,
                    "Gateway status"
                );
            }
            _ = shutdown.recv() => return,
        }
    }
}

/// Print the snapshot of a registry built from the config
fn info_command(config_path: &str) -> Result<()> {
    tracing_setup::init_console_tracing().wrap_err("Failed to initialize tracing")?;

    let config = load_config_or_default(config_path);
    let registry =
        GatewayRegistry::from_config(&config).context("Failed to build gateway registry")?;
    let info = registry.get_gateway_info();
    let rendered = serde_json::to_string_pretty(&info).context("Failed to render gateway info")?;
    println!("{rendered}");
    Ok(())
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Routes: {}", config.routes.len());
            println!("   • Services: {}", config.services.len());
            println!(
                "   • Instances: {}",
                config
                    .services
                    .iter()
                    .map(|s| s.instances.len())
                    .sum::<usize>()
            );
            println!("   • Breaker timeout: {}", config.circuit_breaker.timeout);
            println!("   • Probe interval: {}", config.health.probe_interval);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(ConfigLoadError::NotFound { path }) => {
            eprintln!("❌ Error: Configuration file '{path}' not found");
            std::process::exit(1);
        }
        Err(e @ ConfigLoadError::Read { .. }) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e:#}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Route paths must start with '/'");
            println!("   • Circuit breaker thresholds must be in (0, 1]");
            println!("   • Durations use humantime units such as 30s, 5m, 1h");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = serde_json::to_string_pretty(&GatewayConfig::default())
        .context("Failed to render default config")?;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'tollgate serve --config {config_path}' to start the gateway core");
    Ok(())
}
