pub mod consumer;
pub mod partitioner;
pub mod producer;
pub mod topic_manager;

pub use consumer::{
    ConsumedRecord, EventConsumer, EventHandler, KafkaMessageStream, MessageStream,
};
pub use partitioner::{Partitioner, TopicPartitionMap, PARTITION_ANY};
pub use producer::{EventProducer, PartitionMode};
pub use topic_manager::TopicManager;
