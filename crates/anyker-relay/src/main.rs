//! anyker-relay: Kafka to HTTP relay binary
//!
//! Consumes records from a Kafka topic and posts each one, unchanged, to a
//! downstream HTTP endpoint. Records can be filtered by the origin prefix of
//! their key.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anyker_relay::{
    cancel_on_signal, run_server, BrokerSource, Config, KafkaReader, RelayMetrics, RelayPolicy,
    ReqwestSink, Runner, ServerState,
};

#[derive(Parser, Debug)]
#[command(name = "anyker-relay")]
#[command(about = "Relays Kafka records to an HTTP endpoint")]
struct Args {
    /// Optional dotenv file loaded before reading the environment
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Health server bind address, overrides HEALTH_ADDR
    #[arg(long)]
    health_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(addr) = args.health_addr {
        config.health_addr = addr;
    }

    // RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        instance = %config.instance_name,
        broker = %config.kafka.broker,
        topic = %config.kafka.topic,
        group_id = %config.kafka.group_id,
        endpoint = %config.relay.endpoint,
        "Starting relay"
    );

    let reader = KafkaReader::new(&config.kafka).context("failed to create kafka consumer")?;
    let source = BrokerSource::new(reader, config.kafka.topic.clone());
    let sink = ReqwestSink::new(config.api_token.clone(), config.relay.request_timeout)
        .context("failed to create http sink")?;
    let policy = RelayPolicy::new(config.relay.clone(), sink);
    let metrics = RelayMetrics::new(config.instance_name.clone());

    let runner = Runner::new(source, policy, metrics);

    let server_state = ServerState::new(config.instance_name.clone(), runner.state());
    let health_addr = config.health_addr;
    tokio::spawn(async move {
        info!(addr = %health_addr, "Starting health server");
        if let Err(e) = run_server(health_addr, server_state).await {
            error!(error = %e, "Health server error");
        }
    });

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    match runner.run(shutdown).await {
        Ok(summary) => {
            info!(
                forwarded = summary.forwarded,
                filtered = summary.filtered,
                failed = summary.failed,
                "Worker stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Worker stopped with error");
            Err(e.into())
        }
    }
}
