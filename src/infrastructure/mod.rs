pub mod connection;
pub mod partition;
pub mod protocol;
pub mod records;
pub mod writer;

pub use connection::{BrokerConnection, RequiredAcks};
pub use partition::PartitionConnection;
pub use writer::TopicWriter;
