//! herakles-script-exporter
//!
//! Prometheus exporter that runs configured scripts on demand.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod handlers;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use herakles_script_exporter::config::{load_config, Config, ConfigStore, DEFAULT_BIND_ADDR};
use herakles_script_exporter::discovery::DiscoveryOptions;
use herakles_script_exporter::metrics::{ExporterMetrics, REVISION, VERSION};
use herakles_script_exporter::prober::{ProbeOptions, Prober, ResultCache};
use prometheus::Registry;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, level_filters::LevelFilter};

use cli::{Args, Commands, LogLevel};
use commands::{check_config, command_probe, command_scripts, show_config};
use handlers::{
    config_handler, discovery_handler, health_handler, metrics_handler, probe_handler,
    reload_handler, root_handler,
};
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    // Logs go to stderr so `probe` output on stdout stays clean
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    debug!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if loading or validation fails.
fn load_validated_config(args: &Args) -> Config {
    match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn probe_options(args: &Args) -> ProbeOptions {
    ProbeOptions {
        log_env: args.log_env,
        timeout_offset: args.script_timeout_offset,
        no_args: args.script_no_args,
    }
}

/// Reloads the configuration off the async runtime and logs the outcome.
async fn reload_config(store: &Arc<ConfigStore>) {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.reload()).await {
        Ok(Ok(())) => info!("Configuration reloaded"),
        Ok(Err(e)) => error!("Failed to reload configuration, keeping previous one: {}", e),
        Err(e) => error!("Configuration reload task failed: {}", e),
    }
}

/// Starts the SIGHUP and interval based reload tasks.
fn spawn_reload_tasks(store: Arc<ConfigStore>, interval_secs: u64) {
    #[cfg(unix)]
    {
        let store = store.clone();
        tokio::spawn(async move {
            let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
                Ok(hangup) => hangup,
                Err(e) => {
                    error!("Failed to install SIGHUP handler: {}", e);
                    return;
                }
            };
            while hangup.recv().await.is_some() {
                info!("Received SIGHUP, reloading configuration");
                reload_config(&store).await;
            }
        });
    }

    if interval_secs > 0 {
        info!("Reloading configuration every {} seconds", interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                reload_config(&store).await;
            }
        });
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config inspection modes print to stdout and exit
    if args.check_config {
        return check_config(&args);
    }
    if args.show_config {
        let config = load_validated_config(&args);
        return show_config(&config, args.config_format);
    }

    setup_logging(&args);

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = load_validated_config(&args);

        return match command {
            Commands::Scripts { verbose } => command_scripts(*verbose, &config),

            Commands::Probe {
                script,
                params,
                timeout,
            } => command_probe(script, params, *timeout, probe_options(&args), &config).await,
        };
    }

    if let Err(e) = args.validate_tls() {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    info!(
        "Starting herakles-script-exporter (version={}, revision={})",
        VERSION, REVISION
    );

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = ExporterMetrics::new(&registry)?;

    let store = Arc::new(ConfigStore::new(args.config.clone(), &registry)?);
    if let Err(e) = store.reload() {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    debug!("All metrics registered successfully");

    let prober = Prober::new(
        Arc::new(ResultCache::new()),
        probe_options(&args),
        metrics.script_unknown_total.clone(),
    );

    let state = Arc::new(AppState {
        registry,
        metrics,
        config: store.clone(),
        prober: Arc::new(prober),
        discovery: DiscoveryOptions {
            host: args.discovery_host.clone(),
            port: args.discovery_port.clone(),
            scheme: args.discovery_scheme.clone(),
            tls: args.enable_tls,
        },
        start_time: Instant::now(),
    });

    spawn_reload_tasks(store, args.config_reload_interval);

    // Setup graceful shutdown signal handlers
    let shutdown_signal = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    // Configure HTTP server routes
    let bind_ip: IpAddr = match args.bind {
        Some(ip) => ip,
        None => DEFAULT_BIND_ADDR.parse()?,
    };
    let addr = SocketAddr::new(bind_ip, args.port);

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/probe", get(probe_handler))
        .route("/metrics", get(metrics_handler))
        .route("/discovery", get(discovery_handler))
        .route("/config", get(config_handler))
        .route("/-/healthy", get(health_handler))
        .route("/-/reload", post(reload_handler))
        .with_state(state);

    match (args.enable_tls, &args.tls_cert, &args.tls_key) {
        (true, Some(cert_path), Some(key_path)) => {
            info!("Loading TLS certificate from: {}", cert_path.display());
            info!("Loading TLS private key from: {}", key_path.display());

            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| {
                    error!("Failed to load TLS configuration: {}", e);
                    e
                })?;

            info!("herakles-script-exporter listening on https://{}", addr);

            let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                        return Err(e.into());
                    }
                }
                _ = shutdown_signal => {
                    info!("Shutdown signal received, exiting...");
                }
            }
        }
        _ => {
            let listener = TcpListener::bind(addr).await?;
            info!("herakles-script-exporter listening on http://{}", addr);

            let server = axum::serve(listener, app);

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                        return Err(e.into());
                    }
                }
                _ = shutdown_signal => {
                    info!("Shutdown signal received, exiting...");
                }
            }
        }
    }

    info!("herakles-script-exporter stopped gracefully");
    Ok(())
}
