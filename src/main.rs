//! dashlink: follow a dashboard live-update channel from the terminal.

mod cli;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use dashlink_core::config::{AppConfig, LogFormat};
use dashlink_core::error::AppError;
use dashlink_realtime::{ChannelState, DashboardClient, StaticCredential};

use cli::Cli;
use output::StatusPrinter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        tracing::error!("dashlink error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting dashlink v{}", env!("CARGO_PKG_VERSION"));

    let client = DashboardClient::new(
        config.endpoint.clone(),
        config.channel.clone(),
        Arc::new(StaticCredential::new(cli.token)),
    )
    .with_observer(Arc::new(StatusPrinter));

    client.register_fn("stdout", |message| {
        output::print_message(message);
        Ok(())
    });

    if !client.connect().await? {
        return Err(AppError::authentication(
            "No bearer token; pass --token or set DASHLINK_TOKEN",
        ));
    }

    let manager = client
        .manager()
        .ok_or_else(|| AppError::internal("Channel manager missing after connect"))?;
    let mut liveness = manager.subscribe();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, disconnecting...");
                client.disconnect().await?;
                return Ok(());
            }
            changed = liveness.changed() => {
                if changed.is_err() {
                    return Err(AppError::service_unavailable("Channel driver stopped"));
                }
                if liveness.borrow_and_update().state == ChannelState::Exhausted {
                    client.disconnect().await?;
                    return Err(AppError::service_unavailable(format!(
                        "Gave up reconnecting to {}",
                        config.endpoint.host
                    )));
                }
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
