mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ingest_worker::nats::{JetStreamSource, NatsClient};
use ingest_worker::sink::DailyCsvRouter;
use ingest_worker::IngestLoop;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let config = match config::ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting fieldsink");

    if let Err(e) = run(config).await {
        error!(error = %e, "fieldsink exited with error");
        std::process::exit(1);
    }

    info!("fieldsink stopped gracefully");
}

async fn run(config: config::ServiceConfig) -> Result<()> {
    let client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.connect_timeout_secs),
    )
    .await?;
    client.ensure_stream(&config.nats_stream).await?;

    let source = JetStreamSource::create(
        client.jetstream(),
        &config.nats_stream,
        &config.nats_consumer,
        &config.nats_subject,
    )
    .await?;
    let router = DailyCsvRouter::new(&config.output_dir)?;

    let ingest = IngestLoop::new(
        Arc::new(source),
        Box::new(router),
        config.batch_size,
        Duration::from_secs(config.pull_wait_secs),
    );

    let token = CancellationToken::new();
    spawn_signal_handlers(&token);

    info!(
        stream = %config.nats_stream,
        consumer = %config.nats_consumer,
        output_dir = %config.output_dir,
        "Listening for messages"
    );
    ingest.run(token).await
}

fn spawn_signal_handlers(token: &CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    {
        let sigterm_token = token.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM signal");
                    sigterm_token.cancel();
                }
                Err(err) => {
                    tracing::error!("Error setting up SIGTERM handler: {}", err);
                }
            }
        });
    }
}
