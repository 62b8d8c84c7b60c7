//! CardioGuard gateway binary

use anyhow::Result;
use cardioguard_server::cli::{Cli, Commands, LogFormat, ServeArgs};
use cardioguard_server::{create_router, evaluate, predict, AppState, GatewayConfig};
use cardioguard_telemetry::serving;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Evaluate(args) => {
            init_tracing(args.verbose, LogFormat::Text);
            evaluate::run(&args)
        }
        Commands::Predict(args) => {
            init_tracing(args.verbose, LogFormat::Text);
            predict::run(&args).map(|_| ())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    init_tracing(args.verbose, args.log_format);

    info!("Starting CardioGuard gateway");
    let config = GatewayConfig::load(&args.config, &args)?;
    info!(
        environment = ?config.environment,
        artifact = %config.model.artifact_path.display(),
        requests_per_minute = config.rate_limit.requests_per_minute,
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = config.bind_address().parse()?;
    let state = AppState::from_config(config)?.with_metrics(metrics_handle);
    serving::set_model_loaded(state.host.is_loaded());
    if !state.host.is_loaded() {
        warn!("No model loaded, serving in degraded mode until a reload succeeds");
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
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
                warn!(error = %e, "failed to install SIGTERM handler");
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

/// Initialize tracing/logging
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("cardioguard=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cardioguard=info,tower_http=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    serving::describe_metrics();

    info!("Metrics exporter initialized");
    Ok(handle)
}
