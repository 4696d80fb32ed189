//! Kafka event client: schema-registry backed Avro codecs, a synchronous
//! typed producer with reference-compatible partitioning, and a
//! poll-decode-dispatch-commit consumer loop with a strict fatal-error
//! contract.

pub mod config;
pub mod error;
pub mod retry;
pub mod shutdown;
pub mod trace;

pub mod kafka;
pub mod schema;

pub use config::Config;
pub use error::{Error, Result};
pub use kafka::{ConsumedRecord, EventConsumer, EventHandler, EventProducer, PartitionMode};
pub use retry::RetryPolicy;
pub use schema::{
    AvroDeserializer, AvroSerializer, CompositeDeserializer, Decoded, SchemaRegistryClient,
};
pub use shutdown::ShutdownCoordinator;
pub use trace::TraceContext;
