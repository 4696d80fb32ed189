//! Synchronous typed producer.
//!
//! Every [`produce`](EventProducer::produce) call serializes one record,
//! picks its partition, injects trace headers when a context is present, and
//! blocks until the broker acknowledges or rejects delivery. Delivery
//! failures are returned to the caller unretried; bounded retry, where
//! wanted, belongs at the call site via [`retry`](crate::retry).

use crate::config::KafkaConfig;
use crate::kafka::partitioner::{Partitioner, TopicPartitionMap, PARTITION_ANY};
use crate::retry::{self, RetryPolicy};
use crate::schema::AvroSerializer;
use crate::trace::TraceContext;
use crate::{Error, Result};
use rdkafka::message::OwnedHeaders;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use serde::Serialize;
use tracing::{debug, info};

/// Whether records are hash-partitioned by key or left to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Deterministic assignment from the serialized key bytes; requires the
    /// topic's partition count from broker metadata at construction.
    HashByKey,
    /// No deterministic choice; records go to any partition.
    Any,
}

/// Typed producer bound to one topic and one key/value schema pair.
pub struct EventProducer<K, V> {
    producer: FutureProducer,
    topic: String,
    key_serializer: AvroSerializer<K>,
    value_serializer: AvroSerializer<V>,
    partitioner: Partitioner,
}

impl<K: Serialize, V: Serialize> EventProducer<K, V> {
    /// Builds the producer and, for [`PartitionMode::HashByKey`], fetches the
    /// topic's current partition count from broker metadata (bounded by the
    /// configured metadata timeout). Failure here is fatal to startup.
    pub async fn new(
        config: &KafkaConfig,
        topic: impl Into<String>,
        key_serializer: AvroSerializer<K>,
        value_serializer: AvroSerializer<V>,
        mode: PartitionMode,
    ) -> Result<Self> {
        let topic = topic.into();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("compression.type", &config.compression)
            .set("acks", &config.acks)
            .set("linger.ms", config.linger_ms.to_string())
            .create()
            .map_err(Error::Kafka)?;

        let partitioner = match mode {
            PartitionMode::Any => Partitioner::unconstrained(),
            PartitionMode::HashByKey => {
                let partitions = fetch_partition_count(&producer, &topic, config)?;
                info!(topic = %topic, partitions, "Fetched topic partition count");
                Partitioner::hash(Some(TopicPartitionMap::from([(
                    topic.clone(),
                    partitions,
                )])))
            }
        };

        Ok(Self {
            producer,
            topic,
            key_serializer,
            value_serializer,
            partitioner,
        })
    }

    /// [`new`](Self::new) wrapped in bounded retry, for bootstrap against a
    /// broker that may still be starting.
    pub async fn connect(
        config: &KafkaConfig,
        topic: impl Into<String>,
        key_serializer: AvroSerializer<K>,
        value_serializer: AvroSerializer<V>,
        mode: PartitionMode,
        policy: &RetryPolicy,
    ) -> Result<Self> {
        let topic = topic.into();
        retry::retry(policy, || {
            Self::new(
                config,
                topic.clone(),
                key_serializer.clone(),
                value_serializer.clone(),
                mode,
            )
        })
        .await
    }

    /// Sends one record and blocks until the broker acknowledges or rejects
    /// it.
    ///
    /// Serialization failures abort before anything is sent. A missing trace
    /// context is not an error; the record is sent without propagation
    /// headers. Delivery rejections are returned to the caller unretried.
    pub async fn produce(
        &self,
        trace: Option<&TraceContext>,
        key: &K,
        value: &V,
    ) -> Result<()> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        // A topic missing from the partition map is misconfiguration, not a
        // per-record condition.
        let partition = self
            .partitioner
            .partition(&self.topic, &key_bytes)
            .map_err(Error::into_fatal)?;

        let mut record = FutureRecord::to(&self.topic)
            .key(&key_bytes)
            .payload(&value_bytes);
        if partition != PARTITION_ANY {
            record = record.partition(partition);
        }
        if let Some(trace) = trace {
            record = record.headers(trace.inject(OwnedHeaders::new()));
        }

        // rdkafka hands each send its own delivery future, so concurrent
        // produce calls never share a delivery result.
        match self.producer.send(record, rdkafka::util::Timeout::Never).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %self.topic,
                    partition,
                    offset,
                    "Record delivered"
                );
                Ok(())
            }
            Err((e, _unsent)) => Err(Error::Kafka(e)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

fn fetch_partition_count(
    producer: &FutureProducer,
    topic: &str,
    config: &KafkaConfig,
) -> Result<i32> {
    let metadata = producer
        .client()
        .fetch_metadata(Some(topic), config.metadata_timeout())
        .map_err(Error::Kafka)?;

    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| Error::UnknownTopic(topic.to_string()))?;

    if let Some(err) = topic_metadata.error() {
        return Err(Error::Config(format!(
            "broker reports topic '{topic}' in error state: {err:?}"
        )));
    }

    let partitions = topic_metadata.partitions().len() as i32;
    if partitions == 0 {
        return Err(Error::UnknownTopic(topic.to_string()));
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RegisteredSchema;
    use std::sync::Arc;

    fn test_kafka_config() -> KafkaConfig {
        KafkaConfig {
            brokers: vec!["localhost:9092".to_string()],
            compression: "none".to_string(),
            acks: "1".to_string(),
            linger_ms: 0,
            metadata_timeout_secs: 10,
            default_partitions: 3,
            default_replication_factor: 1,
        }
    }

    fn string_serializer() -> AvroSerializer<String> {
        let definition = r#""string""#;
        AvroSerializer::new(Arc::new(RegisteredSchema {
            id: 1,
            version: 1,
            definition: definition.to_string(),
            schema: apache_avro::Schema::parse_str(definition).unwrap(),
        }))
    }

    #[tokio::test]
    #[ignore] // Requires running Kafka
    async fn producer_construction_fetches_metadata() {
        let producer = EventProducer::new(
            &test_kafka_config(),
            "file-events",
            string_serializer(),
            string_serializer(),
            PartitionMode::HashByKey,
        )
        .await;
        assert!(producer.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires running Kafka
    async fn produce_round_trip() {
        let producer = EventProducer::new(
            &test_kafka_config(),
            "file-events",
            string_serializer(),
            string_serializer(),
            PartitionMode::Any,
        )
        .await
        .unwrap();

        let result = producer
            .produce(None, &"key-1".to_string(), &"value-1".to_string())
            .await;
        assert!(result.is_ok());
    }
}
