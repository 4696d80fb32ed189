//! Topic administration for local and test environments.
//!
//! Production clusters provision topics out of band; this manager exists so
//! services can bring up the topics they produce to when running against a
//! disposable broker.

use crate::config::KafkaConfig;
use crate::{Error, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct TopicManager {
    admin_client: AdminClient<DefaultClientContext>,
    default_partitions: i32,
    default_replication_factor: i32,
    created_topics: HashSet<String>,
}

impl TopicManager {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let admin_client: AdminClient<_> = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            admin_client,
            default_partitions: config.default_partitions,
            default_replication_factor: config.default_replication_factor,
            created_topics: HashSet::new(),
        })
    }

    #[instrument(skip(self), fields(topic = %topic_name))]
    pub async fn ensure_topic_exists(&mut self, topic_name: &str) -> Result<()> {
        if self.created_topics.contains(topic_name) {
            debug!("Topic '{}' already verified to exist", topic_name);
            return Ok(());
        }

        match self.topic_exists(topic_name).await {
            Ok(true) => {
                info!("Topic '{}' already exists", topic_name);
                self.created_topics.insert(topic_name.to_string());
                Ok(())
            }
            Ok(false) => {
                info!("Creating topic '{}'", topic_name);
                self.create_topic(topic_name).await?;
                self.created_topics.insert(topic_name.to_string());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to check if topic '{}' exists: {}", topic_name, e);
                Err(e)
            }
        }
    }

    async fn topic_exists(&self, topic_name: &str) -> Result<bool> {
        let metadata = self
            .admin_client
            .inner()
            .fetch_metadata(Some(topic_name), Duration::from_secs(5))
            .map_err(Error::Kafka)?;

        Ok(metadata
            .topics()
            .iter()
            .any(|topic| topic.name() == topic_name && !topic.partitions().is_empty()))
    }

    async fn create_topic(&self, topic_name: &str) -> Result<()> {
        let new_topic = NewTopic::new(
            topic_name,
            self.default_partitions,
            TopicReplication::Fixed(self.default_replication_factor),
        )
        .set("cleanup.policy", "delete");

        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(30)));

        let results = self
            .admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(Error::Kafka)?;

        for result in results {
            match result {
                Ok(topic) => {
                    info!("Successfully created topic: {}", topic);
                }
                // Two services racing to create the same topic is normal.
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!("Topic '{}' was created concurrently", topic);
                }
                Err((_topic, error)) => {
                    return Err(Error::Kafka(rdkafka::error::KafkaError::AdminOp(error)));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KafkaConfig;

    fn local_config() -> KafkaConfig {
        KafkaConfig {
            brokers: vec!["localhost:9092".to_string()],
            default_partitions: 3,
            default_replication_factor: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore] // Requires running Kafka
    async fn test_topic_creation_is_idempotent() {
        let mut manager = TopicManager::new(&local_config()).unwrap();

        let topic_name = "test-topic-creation";
        manager.ensure_topic_exists(topic_name).await.unwrap();
        manager.ensure_topic_exists(topic_name).await.unwrap();

        assert!(manager.topic_exists(topic_name).await.unwrap());
    }
}
