//! SQS Consumer Service
//!
//! Runs one handler from the built-in registry against its queue.
//!
//! ## Architecture
//!
//! ```text
//! SQS queue
//!   ↓ (long-poll receive, batch of up to 10)
//! PollingScheduler
//!   ↓ (max_workers slots, FIFO groups serialized)
//! Executor → MessageHandler
//!   ↓
//! delete | visibility 0 | send to DLQ + delete
//! ```
//!
//! ## Usage
//!
//! ```text
//! sqs-consumer --handler fifo_dlq --max-workers 4 --metrics-addr 0.0.0.0:9090
//! ```
//!
//! Connection settings come from `AWS_REGION`, `AWS_ENDPOINT_URL` and the
//! standard credential variables. The `env` handler is registered when
//! `SQS_QUEUE_NAME` or `SQS_QUEUE_URL` is set.

pub mod handlers;
pub mod telemetry;

use clap::Parser;
use eyre::{Result, WrapErr};
use sqs_worker::{
    ConfigOverrides, PollingScheduler, SessionProvider, SignalBus, SqsClientFactory, init_metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use telemetry::{Environment, init_tracing, install_color_eyre};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sqs-consumer")]
#[command(about = "Consume an SQS queue with a registered handler")]
pub struct Cli {
    /// Registered handler to run
    #[arg(short = 'f', long)]
    pub handler: String,

    /// Consume this queue URL instead of the registered queue
    #[arg(short, long)]
    pub queue_url: Option<String>,

    /// Messages per receive (1-10)
    #[arg(short = 'c', long)]
    pub max_messages: Option<i32>,

    /// Visibility timeout in seconds
    #[arg(short = 't', long)]
    pub visibility_timeout: Option<i32>,

    /// Concurrent execution slots
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Overrides for the selected handler's registered configuration
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            queue_url: self.queue_url.clone(),
            visibility_timeout: self.visibility_timeout,
            max_workers: self.max_workers,
            max_messages: self.max_messages,
            ..Default::default()
        }
    }
}

/// Run the consumer
///
/// Exits cleanly after a signal-triggered drain. Returns an error if the
/// handler is unknown, its configuration is invalid, the queue cannot be
/// resolved, or a lifecycle subscriber failed.
pub async fn run() -> Result<()> {
    install_color_eyre();
    let cli = Cli::parse();

    let environment = Environment::from_env();
    init_tracing(&environment);

    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr).wrap_err("Failed to start Prometheus exporter")?;
    }

    let registry = handlers::registry().wrap_err("Failed to register handlers")?;
    info!(handlers = ?registry.names(), selected = %cli.handler, "Handlers registered");

    let signals = Arc::new(SignalBus::new());
    handlers::connect_logging(&signals);

    let scheduler = PollingScheduler::from_registry(
        &registry,
        &cli.handler,
        cli.overrides(),
        Arc::new(SessionProvider::new(SqsClientFactory)),
        signals,
    )
    .wrap_err_with(|| format!("Failed to prepare handler '{}'", cli.handler))?;

    scheduler
        .run_until_signal()
        .await
        .wrap_err_with(|| format!("Handler '{}' stopped with an error", cli.handler))?;

    info!("Consumer shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "sqs-consumer",
            "-f",
            "simple",
            "-q",
            "http://localhost:4566/000000000000/other",
            "-c",
            "5",
            "-t",
            "30",
            "-w",
            "3",
            "--metrics-addr",
            "127.0.0.1:9090",
        ])
        .unwrap();

        assert_eq!(cli.handler, "simple");
        assert_eq!(cli.metrics_addr, Some("127.0.0.1:9090".parse().unwrap()));

        let overrides = cli.overrides();
        assert_eq!(
            overrides.queue_url.as_deref(),
            Some("http://localhost:4566/000000000000/other")
        );
        assert_eq!(overrides.max_messages, Some(5));
        assert_eq!(overrides.visibility_timeout, Some(30));
        assert_eq!(overrides.max_workers, Some(3));
    }

    #[test]
    fn test_cli_requires_handler() {
        assert!(Cli::try_parse_from(["sqs-consumer"]).is_err());
    }

    #[test]
    fn test_no_flags_means_no_overrides() {
        let cli = Cli::try_parse_from(["sqs-consumer", "--handler", "flaky"]).unwrap();
        assert!(cli.overrides().is_empty());
    }

    #[test]
    fn test_overrides_reach_the_scheduler() {
        let registry = temp_env::with_vars_unset(["SQS_QUEUE_NAME", "SQS_QUEUE_URL"], || {
            handlers::registry().unwrap()
        });
        let cli = Cli::try_parse_from(["sqs-consumer", "-f", "simple", "-w", "8"]).unwrap();

        let scheduler = PollingScheduler::from_registry(
            &registry,
            &cli.handler,
            cli.overrides(),
            Arc::new(SessionProvider::new(SqsClientFactory)),
            Arc::new(SignalBus::new()),
        )
        .unwrap();
        assert_eq!(scheduler.descriptor().config().max_workers, 8);
    }

    #[test]
    fn test_unknown_handler() {
        let registry = temp_env::with_vars_unset(["SQS_QUEUE_NAME", "SQS_QUEUE_URL"], || {
            handlers::registry().unwrap()
        });
        let result = PollingScheduler::from_registry(
            &registry,
            "missing",
            ConfigOverrides::default(),
            Arc::new(SessionProvider::new(SqsClientFactory)),
            Arc::new(SignalBus::new()),
        );
        assert!(result.is_err());
    }
}
