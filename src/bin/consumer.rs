use clap::Parser;
use log::info;
use std::time::Duration;

use kafka_purge::application::{config, PurgeConfig, PurgePartitionUseCase};
use kafka_purge::domain::services::{DEFAULT_MAX_BYTES, DEFAULT_PER_READ_TIMEOUT, DEFAULT_TOMBSTONE_TIMEOUT};

#[derive(Parser)]
#[command(author, version, about = "Read a Kafka partition and tombstone every message in it", long_about = None)]
struct Args {
    /// Broker to bootstrap from
    #[arg(short, long, default_value = config::DEFAULT_ADDRESS)]
    address: String,

    /// Topic to purge
    #[arg(short, long, default_value = config::DEFAULT_TOPIC)]
    topic: String,

    /// Partition to purge
    #[arg(short, long, default_value_t = config::DEFAULT_PARTITION)]
    partition: i32,

    /// Seconds after which reading stops altogether
    #[arg(long, default_value_t = config::DEFAULT_READ_DEADLINE.as_secs())]
    read_deadline_secs: u64,

    /// Milliseconds to wait for each message
    #[arg(long, default_value_t = DEFAULT_PER_READ_TIMEOUT.as_millis() as u64)]
    read_timeout_ms: u64,

    /// Milliseconds allowed for each tombstone write
    #[arg(long, default_value_t = DEFAULT_TOMBSTONE_TIMEOUT.as_millis() as u64)]
    tombstone_timeout_ms: u64,

    /// Upper bound on bytes fetched per read
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = PurgeConfig {
        address: args.address,
        topic: args.topic,
        partition: args.partition,
        read_deadline: Duration::from_secs(args.read_deadline_secs),
        per_read_timeout: Duration::from_millis(args.read_timeout_ms),
        tombstone_timeout: Duration::from_millis(args.tombstone_timeout_ms),
        max_bytes: args.max_bytes,
    };

    info!(
        "Purging {}:{} via {}",
        config.topic, config.partition, config.address
    );
    let report = PurgePartitionUseCase::new(config).execute().await?;
    info!("Stopped: {}", report.stop.detail());

    Ok(())
}
