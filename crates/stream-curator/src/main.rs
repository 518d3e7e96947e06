use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_curator::{
    automation::{AutomationEngine, Collaborators},
    config::Config,
    database::Database,
    platform::{PlatformClient, RegexMatchProvider},
    services::FfprobeStreamProbe,
    web::{AppState, WebServer},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "stream-curator")]
#[command(version)]
#[command(about = "Automated stream matching, quality checking and dead-channel handling for IPTV platforms")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(cli: &Cli) {
    let log_filter = if cli.log_level == "trace" {
        format!("stream_curator={},tower_http=trace", cli.log_level)
    } else {
        format!("stream_curator={}", cli.log_level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into());

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to install signal handlers: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down gracefully");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("Starting stream-curator v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let platform = Arc::new(PlatformClient::new(&config.platform)?);
    let matcher = Arc::new(RegexMatchProvider::load(&config.platform.patterns_file).await?);
    let probe = Arc::new(FfprobeStreamProbe::new(&config.probe));
    info!("Platform client targeting {}", config.platform.base_url);

    let engine = AutomationEngine::build(
        &config,
        &database,
        Collaborators {
            directory: platform.clone(),
            matcher,
            probe,
            epg: platform.clone(),
            profiles: platform,
        },
    )
    .await?;

    let web_server = WebServer::new(&config.web, AppState::new(database.clone(), engine.service()))?;
    info!("Starting web server on {}:{}", web_server.host(), web_server.port());

    let cancellation_token = CancellationToken::new();
    let engine_handles = engine.spawn(cancellation_token.clone()).await;

    let server_token = cancellation_token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = web_server.serve(server_token.clone()).await {
            error!("Web server failed: {}", e);
            server_token.cancel();
        }
    });

    info!("All services started successfully");

    tokio::select! {
        _ = shutdown_signal() => cancellation_token.cancel(),
        _ = cancellation_token.cancelled() => {}
    }

    // Workers get their grace period; allow a little more for the loops to return
    let deadline = config.automation.shutdown_grace_period + Duration::from_secs(5);
    let wait_all = async {
        for handle in engine_handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        if let Err(e) = server_handle.await {
            warn!("Web server task ended abnormally: {}", e);
        }
    };
    if tokio::time::timeout(deadline, wait_all).await.is_err() {
        warn!("Shutdown did not complete within {:?}", deadline);
    }

    info!("stream-curator stopped");
    Ok(())
}
