use clap::Parser;
use log::info;
use std::time::Duration;

use kafka_purge::application::{config, ProduceExamplesUseCase, ProducerConfig};

#[derive(Parser)]
#[command(author, version, about = "Write the example messages to a Kafka partition", long_about = None)]
struct Args {
    /// Broker to bootstrap from
    #[arg(short, long, default_value = config::DEFAULT_ADDRESS)]
    address: String,

    /// Topic to write to
    #[arg(short, long, default_value = config::DEFAULT_TOPIC)]
    topic: String,

    /// Partition to write to
    #[arg(short, long, default_value_t = config::DEFAULT_PARTITION)]
    partition: i32,

    /// Seconds allowed for the write
    #[arg(long, default_value_t = config::DEFAULT_WRITE_DEADLINE.as_secs())]
    write_deadline_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ProducerConfig {
        address: args.address,
        topic: args.topic,
        partition: args.partition,
        write_deadline: Duration::from_secs(args.write_deadline_secs),
    };

    info!(
        "Producing to {}:{} via {}",
        config.topic, config.partition, config.address
    );
    ProduceExamplesUseCase::new(config).execute().await?;

    Ok(())
}
