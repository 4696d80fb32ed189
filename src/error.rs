//! Error types and result handling for kafka-event-client.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Errors fall into three classes:
//!
//! - **Caller-surfaced**: returned from [`produce`](crate::kafka::EventProducer::produce)
//!   and similar entry points; the caller decides whether to retry, drop, or
//!   escalate.
//! - **Transient**: broker-unreachable conditions the consumer loop retries
//!   on its own, and registry failures expected to be wrapped by
//!   [`retry`](crate::retry).
//! - **Fatal**: wrapped in [`Error::Fatal`]; the process cannot safely
//!   continue past them (corrupted stream state, failed commit, handler
//!   error) and the consumer supervisor terminates the process.

use thiserror::Error;

/// The main error type for kafka-event-client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically an invalid or missing setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka client, producer, or consumer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Schema registry protocol error (unexpected status or body).
    #[error("Schema registry error: {message}")]
    Registry {
        /// Description of the registry failure
        message: String,
    },

    /// HTTP transport error talking to the schema registry.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Avro schema parsing or datum encoding/decoding error.
    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    /// JSON (de)serialization error when mapping domain types.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value does not conform to the Avro schema it is bound to.
    #[error("Value does not conform to schema: {message}")]
    SchemaConformance {
        /// Description of the mismatch
        message: String,
    },

    /// Malformed wire envelope (bad magic byte or truncated frame).
    #[error("Invalid wire format: {message}")]
    WireFormat {
        /// Description of what was invalid
        message: String,
    },

    /// No registered deserializer handles the given schema id.
    #[error("No handler for schema id {schema_id}")]
    NoHandler {
        /// The schema id read from the wire envelope
        schema_id: u32,
    },

    /// A decoded value was downcast to the wrong target type.
    #[error("Decoded value is not a {expected}")]
    Downcast {
        /// The requested target type
        expected: &'static str,
    },

    /// Topic missing from the partition map when hash-partitioning.
    #[error("Topic '{0}' not present in partition map")]
    UnknownTopic(String),

    /// Error returned by a consumer event handler.
    #[error("Handler error: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An unrecoverable condition the process must not continue past.
    ///
    /// Produced by the consumer loop for deserialization failures, handler
    /// errors, commit failures, and unexpected poll errors. The supervisor
    /// logs the cause and exits the process with a non-zero status.
    #[error("Fatal: {0}")]
    Fatal(#[source] Box<Error>),
}

impl Error {
    /// Wraps this error as fatal, unless it already is.
    pub fn into_fatal(self) -> Self {
        match self {
            Error::Fatal(_) => self,
            other => Error::Fatal(Box::new(other)),
        }
    }

    /// Whether this error is fatal to the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

/// A convenient Result type alias for kafka-event-client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_fatal_wraps_once() {
        let err = Error::Config("bad".to_string()).into_fatal();
        assert!(err.is_fatal());

        // Re-wrapping must not nest another Fatal layer.
        let err = err.into_fatal();
        match err {
            Error::Fatal(inner) => assert!(matches!(*inner, Error::Config(_))),
            other => panic!("unexpected: {other}"),
        }
    }
}
