//! Reporting of relay events.
//!
//! The pipeline never logs directly; it hands [`RelayEvent`]s to a
//! [`Reporter`]. The binary wires up [`TracingReporter`] for logs and
//! [`RelayStats`](crate::stats::RelayStats) for counters, while tests
//! substitute a [`MemoryReporter`] and assert on what was reported.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::adif::EncodeError;
use crate::delivery::TransportError;

/// Something noteworthy that happened while relaying a datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// A datagram arrived.
    Received { from: SocketAddr, bytes: usize },

    /// A datagram was not valid UTF-8 and was discarded.
    InvalidUtf8 { from: SocketAddr },

    /// A datagram contained only whitespace.
    Empty { from: SocketAddr },

    /// An XML payload was not a contact document.
    NotContact,

    /// A contact document could not be converted.
    ConversionFailed { error: EncodeError },

    /// A contact document was converted to ADIF.
    Converted { adif: String },

    /// A non-XML payload is being forwarded unchanged.
    PassThrough { preview: String },

    /// One delivery attempt failed at the transport level.
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: TransportError,
    },

    /// The server accepted a record.
    Delivered {
        status: u16,
        attempt: u32,
        latency: Duration,
    },

    /// The server rejected a record with an error status.
    Rejected { status: u16, body: String },

    /// Delivery gave up without reaching the server.
    Exhausted {
        attempts: u32,
        max_attempts: u32,
        last_error: Option<TransportError>,
    },

    /// Reading from the socket failed.
    ReceiveFailed { error: String },
}

/// Sink for relay events.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &RelayEvent);
}

/// Writes events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &RelayEvent) {
        match event {
            RelayEvent::Received { from, bytes } => {
                info!("Received {} bytes from {}", bytes, from);
            }
            RelayEvent::InvalidUtf8 { from } => {
                warn!("Discarding non-UTF-8 datagram from {}", from);
            }
            RelayEvent::Empty { from } => {
                debug!("Ignoring empty datagram from {}", from);
            }
            RelayEvent::NotContact => {
                warn!("XML payload is not a contact document, skipping");
            }
            RelayEvent::ConversionFailed { error } => {
                warn!("Failed to convert contact to ADIF: {}", error);
            }
            RelayEvent::Converted { adif } => {
                info!("Converted contact to ADIF: {}", adif);
            }
            RelayEvent::PassThrough { preview } => {
                info!("Forwarding non-XML payload as-is: {}...", preview);
            }
            RelayEvent::AttemptFailed {
                attempt,
                max_attempts,
                error,
            } => {
                warn!(
                    category = error.category(),
                    "Attempt {}/{} failed: {}", attempt, max_attempts, error
                );
            }
            RelayEvent::Delivered {
                status,
                attempt,
                latency,
            } => {
                info!(
                    "Delivered to Wavelog: HTTP {} (attempt {}, {} ms)",
                    status,
                    attempt,
                    latency.as_millis()
                );
            }
            RelayEvent::Rejected { status, body } => {
                error!("Wavelog rejected record: HTTP {} - {}", status, body);
            }
            RelayEvent::Exhausted {
                attempts,
                max_attempts,
                last_error,
            } => {
                let category = last_error.as_ref().map_or("none", TransportError::category);
                if attempts < max_attempts {
                    warn!(
                        category,
                        "Delivery abandoned after {}/{} attempts (shutdown)", attempts, max_attempts
                    );
                } else {
                    error!(
                        category,
                        "Delivery failed after {}/{} attempts", attempts, max_attempts
                    );
                }
            }
            RelayEvent::ReceiveFailed { error } => {
                error!("Socket receive error: {}", error);
            }
        }
    }
}

/// Forwards each event to several reporters in order.
#[derive(Clone, Default)]
pub struct Fanout {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter.
    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl Reporter for Fanout {
    fn report(&self, event: &RelayEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<RelayEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the events reported so far.
    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: &RelayEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
