//! Poll-decode-dispatch-commit consumer loop.
//!
//! The loop runs on one dedicated task per consumer and is the only task
//! polling or committing for its subscription. Each iteration checks the
//! shutdown token (cooperatively, between iterations only), polls with a
//! read timeout, decodes key and value through composite deserializers,
//! invokes the handler, and commits the offset synchronously.
//!
//! Failure-mode ordering is strict: poll timeouts continue the loop; a
//! broker-unreachable poll error is retried indefinitely (the expected
//! steady state while the broker itself restarts); every other condition —
//! deserialization failure, handler error, commit failure, unexpected poll
//! error — is fatal and terminates the process. The core deliberately has no
//! per-message skip or dead-letter path; forgiving behavior belongs in the
//! calling workflow's handler.

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::schema::{CompositeDeserializer, Decoded};
use crate::trace::TraceContext;
use crate::{Error, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{Headers, Message, OwnedMessage};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Offset, Timestamp, TopicPartitionList};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One decoded message as handed to an [`EventHandler`].
#[derive(Debug)]
pub struct ConsumedRecord {
    pub trace: Option<TraceContext>,
    pub key: Decoded,
    pub value: Decoded,
    /// Raw message headers as carried on the wire.
    pub headers: Vec<(String, Option<Vec<u8>>)>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker timestamp; the variant carries the timestamp type.
    pub timestamp: Timestamp,
}

/// User callback invoked once per decoded record.
///
/// An error return is fatal to the consumer loop; there is no per-message
/// skip. A workflow that wants to tolerate a bad message must handle it
/// inside `handle` and still return `Ok` to force the commit.
#[async_trait]
pub trait EventHandler: Send {
    async fn handle(
        &mut self,
        record: ConsumedRecord,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Source of messages for the consumer loop.
///
/// Exists so the loop's failure-mode ordering is testable without a broker;
/// the production implementation is [`KafkaMessageStream`].
#[async_trait]
pub trait MessageStream: Send {
    /// Polls for the next message, returning `None` on read timeout.
    async fn poll(&mut self, timeout: Duration) -> Option<KafkaResult<OwnedMessage>>;

    /// Synchronously commits the offset after `message`.
    fn commit(&mut self, message: &OwnedMessage) -> KafkaResult<()>;
}

/// rdkafka-backed message stream for one subscription.
pub struct KafkaMessageStream {
    consumer: StreamConsumer,
}

impl KafkaMessageStream {
    pub fn new(
        kafka: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        topics: &[String],
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", kafka.brokers.join(","))
            .set("group.id", &consumer_config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &consumer_config.auto_offset_reset)
            .create()
            .map_err(Error::Kafka)?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs).map_err(Error::Kafka)?;
        info!(topics = ?topics, group = %consumer_config.group_id, "Subscribed");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageStream for KafkaMessageStream {
    async fn poll(&mut self, timeout: Duration) -> Option<KafkaResult<OwnedMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => None,
            Ok(Ok(message)) => Some(Ok(message.detach())),
            Ok(Err(e)) => Some(Err(e)),
        }
    }

    fn commit(&mut self, message: &OwnedMessage) -> KafkaResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset() + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Sync)
    }
}

/// The consumer loop: poll, decode, dispatch, commit.
pub struct EventConsumer<S, H> {
    stream: S,
    handler: H,
    key_deserializer: CompositeDeserializer,
    value_deserializer: CompositeDeserializer,
    read_timeout: Duration,
    shutdown: CancellationToken,
}

impl<S, H> EventConsumer<S, H>
where
    S: MessageStream,
    H: EventHandler,
{
    pub fn new(
        stream: S,
        handler: H,
        key_deserializer: CompositeDeserializer,
        value_deserializer: CompositeDeserializer,
        read_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream,
            handler,
            key_deserializer,
            value_deserializer,
            read_timeout,
            shutdown,
        }
    }

    /// Runs the loop until shutdown or a fatal condition.
    ///
    /// Termination is only observed between iterations; an in-flight
    /// poll/decode/dispatch/commit sequence always completes first.
    pub async fn run(mut self) -> Result<()> {
        info!("Consumer loop starting");
        loop {
            if self.shutdown.is_cancelled() {
                info!("Consumer loop stopping on shutdown signal");
                return Ok(());
            }

            match self.stream.poll(self.read_timeout).await {
                None => continue,
                Some(Err(e)) if is_broker_unreachable(&e) => {
                    warn!(error = %e, "Broker unreachable, retrying poll");
                    continue;
                }
                Some(Err(e)) => {
                    return Err(Error::Kafka(e).into_fatal());
                }
                Some(Ok(message)) => self.process(message).await?,
            }
        }
    }

    /// Spawns the loop on a dedicated task, terminating the process on any
    /// fatal error. A corrupted or unrecoverable stream state is never
    /// silently tolerated.
    pub fn spawn(self) -> JoinHandle<()>
    where
        S: 'static,
        H: 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(
                    error = %e,
                    backtrace = %std::backtrace::Backtrace::capture(),
                    "Consumer terminated on fatal error"
                );
                std::process::exit(1);
            }
        })
    }

    async fn process(&mut self, message: OwnedMessage) -> Result<()> {
        let trace = match message.headers() {
            Some(headers) => {
                let trace = TraceContext::extract(headers);
                if trace.is_none() {
                    debug!(
                        topic = message.topic(),
                        offset = message.offset(),
                        "No usable trace context in headers, proceeding without parent trace"
                    );
                }
                trace
            }
            None => None,
        };

        let key_bytes = message.key().ok_or_else(|| {
            fatal_wire_format("message without key", &message)
        })?;
        let value_bytes = message.payload().ok_or_else(|| {
            fatal_wire_format("message without payload", &message)
        })?;

        let key = self
            .key_deserializer
            .deserialize(key_bytes)
            .map_err(Error::into_fatal)?;
        let value = self
            .value_deserializer
            .deserialize(value_bytes)
            .map_err(Error::into_fatal)?;

        let record = ConsumedRecord {
            trace,
            key,
            value,
            headers: raw_headers(&message),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp: message.timestamp(),
        };

        self.handler
            .handle(record)
            .await
            .map_err(|e| Error::Handler(e).into_fatal())?;

        self.stream
            .commit(&message)
            .map_err(|e| Error::Kafka(e).into_fatal())?;

        debug!(
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            "Processed and committed"
        );
        Ok(())
    }
}

fn fatal_wire_format(message: &str, msg: &OwnedMessage) -> Error {
    Error::WireFormat {
        message: format!(
            "{message} at {}[{}]@{}",
            msg.topic(),
            msg.partition(),
            msg.offset()
        ),
    }
    .into_fatal()
}

fn raw_headers(message: &OwnedMessage) -> Vec<(String, Option<Vec<u8>>)> {
    message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                .collect()
        })
        .unwrap_or_default()
}

/// The connection-refused class of poll errors: the broker is momentarily
/// unreachable (its own startup, a rolling restart) and the poll is retried
/// on the next iteration, indefinitely.
fn is_broker_unreachable(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::BrokerTransportFailure) | Some(RDKafkaErrorCode::AllBrokersDown)
    )
}
