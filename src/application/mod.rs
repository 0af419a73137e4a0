pub mod config;
pub mod use_cases;

pub use config::{ProducerConfig, PurgeConfig};
pub use use_cases::{example_messages, ProduceExamplesUseCase, PurgePartitionUseCase};
