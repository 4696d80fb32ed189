//! Distributed-trace context carrier for Kafka message headers.
//!
//! Only the carrier lives here: the producer injects the context into
//! outgoing record headers and the consumer extracts it from incoming ones.
//! The tracing backend that creates and consumes spans is an external
//! collaborator. Header keys follow the W3C Trace Context convention
//! (`traceparent` / `tracestate`).

use rdkafka::message::{Header, Headers, OwnedHeaders};
use tracing::debug;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";

/// A propagated trace context, correlating a record with a distributed trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub traceparent: String,
    pub tracestate: Option<String>,
}

impl TraceContext {
    pub fn new(traceparent: impl Into<String>) -> Self {
        Self {
            traceparent: traceparent.into(),
            tracestate: None,
        }
    }

    pub fn with_tracestate(mut self, tracestate: impl Into<String>) -> Self {
        self.tracestate = Some(tracestate.into());
        self
    }

    /// Appends the propagation headers to an outgoing record's headers.
    pub fn inject(&self, headers: OwnedHeaders) -> OwnedHeaders {
        let headers = headers.insert(Header {
            key: TRACEPARENT_HEADER,
            value: Some(self.traceparent.as_str()),
        });
        match &self.tracestate {
            Some(state) => headers.insert(Header {
                key: TRACESTATE_HEADER,
                value: Some(state.as_str()),
            }),
            None => headers,
        }
    }

    /// Reads a trace context out of incoming message headers.
    ///
    /// Returns `None` when no `traceparent` header is present or when its
    /// value is not valid; processing continues without a parent trace in
    /// that case.
    pub fn extract<H: Headers>(headers: &H) -> Option<TraceContext> {
        let mut traceparent = None;
        let mut tracestate = None;

        for header in headers.iter() {
            match header.key {
                TRACEPARENT_HEADER => {
                    traceparent = header.value.and_then(|v| std::str::from_utf8(v).ok());
                }
                TRACESTATE_HEADER => {
                    tracestate = header.value.and_then(|v| std::str::from_utf8(v).ok());
                }
                _ => {}
            }
        }

        let traceparent = traceparent?;
        if !is_valid_traceparent(traceparent) {
            debug!(traceparent, "Ignoring malformed traceparent header");
            return None;
        }

        Some(TraceContext {
            traceparent: traceparent.to_string(),
            tracestate: tracestate.map(str::to_string),
        })
    }
}

/// `version-traceid-spanid-flags`, all lowercase hex.
fn is_valid_traceparent(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() != 4 {
        return false;
    }
    let lengths = [2, 32, 16, 2];
    parts
        .iter()
        .zip(lengths)
        .all(|(part, len)| part.len() == len && part.chars().all(|c| c.is_ascii_hexdigit()))
}
