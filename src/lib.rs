//! Wavelog Relay - forwards contest logger contacts to Wavelog.
//!
//! Contest loggers broadcast each logged contact as an XML datagram. This
//! crate provides:
//! - A tolerant tag extractor and ADIF encoder for those contact documents
//! - A Wavelog API client with retry and exponential backoff
//! - A UDP listener that ties the two together, one datagram at a time
//! - Pluggable event reporting, statistics, and an optional metrics endpoint
//!
//! # Example
//!
//! ```rust
//! use wavelog_relay::adif::{EncoderOptions, encode};
//!
//! let xml = r#"<?xml version="1.0" encoding="utf-8"?>
//! <contactinfo>
//!     <timestamp>2024-05-01 12:30:45</timestamp>
//!     <call>W1AW</call>
//!     <mode>CW</mode>
//! </contactinfo>"#;
//!
//! let record = encode(xml, &EncoderOptions::default())
//!     .expect("valid contact")
//!     .expect("is a contact document");
//! assert_eq!(
//!     record.to_string(),
//!     "<call:4>W1AW<mode:2>CW<qso_date:8>20240501<time_on:6>123045<time_off:6>123045<eor>"
//! );
//! ```

pub mod adif;
pub mod config;
pub mod contact;
pub mod delivery;
pub mod extract;
pub mod listener;
pub mod metrics;
pub mod report;
pub mod stats;

#[cfg(test)]
mod testing;

pub use adif::{AdifRecord, EncodeError, EncoderOptions, encode};
pub use config::{Config, ConfigError};
pub use contact::{ContactFields, is_contact_document};
pub use delivery::{
    DeliveryOutcome, Endpoint, HttpEndpoint, RetryPolicy, TransportError, WavelogClient,
    WavelogTarget,
};
pub use extract::extract_field;
pub use listener::{Disposition, Listener, ListenerError, Relay};
pub use report::{Fanout, MemoryReporter, RelayEvent, Reporter, TracingReporter};
pub use stats::{RelayStats, StatsSummary};
