//! UDP listener that relays logger datagrams to Wavelog.
//!
//! One datagram is handled at a time, start to finish (conversion, upload,
//! retries), before the next one is read. Nothing that happens to a single
//! datagram stops the loop; only the shutdown signal does.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::info;

use crate::adif::{EncoderOptions, encode};
use crate::delivery::{DeliveryOutcome, Endpoint, WavelogClient};
use crate::report::{RelayEvent, Reporter};

/// Default UDP port the logger broadcasts to.
pub const DEFAULT_UDP_PORT: u16 = 2333;

/// Largest datagram accepted.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Prefix identifying XML payloads.
pub const XML_DECLARATION: &str = "<?xml";

/// Characters of a pass-through payload included in the log.
const PREVIEW_CHARS: usize = 100;

/// Fatal listener errors.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    /// Whether the address is already taken, usually by another instance.
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            ListenerError::Bind { source, .. } => {
                source.kind() == std::io::ErrorKind::AddrInUse
            }
        }
    }
}

/// What became of one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not valid UTF-8, or empty.
    Discarded,
    /// XML that could not be turned into an ADIF record.
    ConversionFailed,
    Delivered,
    Rejected,
    Exhausted,
}

impl From<&DeliveryOutcome> for Disposition {
    fn from(outcome: &DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Delivered { .. } => Disposition::Delivered,
            DeliveryOutcome::Rejected { .. } => Disposition::Rejected,
            DeliveryOutcome::Exhausted { .. } => Disposition::Exhausted,
        }
    }
}

/// Turns datagrams into uploads.
pub struct Relay<E> {
    client: WavelogClient<E>,
    options: EncoderOptions,
    reporter: Arc<dyn Reporter>,
}

impl<E: Endpoint> Relay<E> {
    pub fn new(client: WavelogClient<E>, options: EncoderOptions, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            client,
            options,
            reporter,
        }
    }

    /// Handle one datagram to completion. Never fails.
    ///
    /// XML payloads are converted to ADIF first and dropped if conversion
    /// fails. Anything else is assumed to already be ADIF and is uploaded
    /// unchanged.
    pub async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Disposition {
        self.reporter.report(&RelayEvent::Received {
            from,
            bytes: data.len(),
        });

        let Ok(text) = std::str::from_utf8(data) else {
            self.reporter.report(&RelayEvent::InvalidUtf8 { from });
            return Disposition::Discarded;
        };

        let text = text.trim();
        if text.is_empty() {
            self.reporter.report(&RelayEvent::Empty { from });
            return Disposition::Discarded;
        }

        let record = if text.starts_with(XML_DECLARATION) {
            match encode(text, &self.options) {
                Ok(Some(record)) => {
                    let adif = record.to_string();
                    self.reporter
                        .report(&RelayEvent::Converted { adif: adif.clone() });
                    adif
                }
                Ok(None) => {
                    self.reporter.report(&RelayEvent::NotContact);
                    return Disposition::ConversionFailed;
                }
                Err(error) => {
                    self.reporter.report(&RelayEvent::ConversionFailed { error });
                    return Disposition::ConversionFailed;
                }
            }
        } else {
            self.reporter.report(&RelayEvent::PassThrough {
                preview: text.chars().take(PREVIEW_CHARS).collect(),
            });
            text.to_string()
        };

        Disposition::from(&self.client.deliver(&record).await)
    }
}

/// Owns the UDP socket and runs the receive loop.
pub struct Listener<E> {
    socket: UdpSocket,
    relay: Relay<E>,
}

impl<E: Endpoint> Listener<E> {
    /// Bind the listening socket. Failure here is fatal.
    pub async fn bind(addr: &str, relay: Relay<E>) -> Result<Self, ListenerError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self { socket, relay })
    }

    /// The address the socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive and relay datagrams until `shutdown` becomes true (or its
    /// sender goes away). The socket is released on return.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        if let Ok(addr) = self.local_addr() {
            info!("Listening for logger datagrams on {}", addr);
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => {
                            self.relay.handle_datagram(&buf[..len], from).await;
                        }
                        Err(e) => {
                            self.relay
                                .reporter
                                .report(&RelayEvent::ReceiveFailed { error: e.to_string() });
                        }
                    }
                }
            }
        }

        info!("UDP listener stopped");
    }
}
