//! Statistics tracking for the relay.
//!
//! Counts datagrams and their fate, and keeps an HDR histogram of how long
//! successful uploads took.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::report::{RelayEvent, Reporter};

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct RelayStats {
    /// Datagrams received
    pub datagrams: AtomicU64,

    /// Total bytes of datagram payload received
    pub bytes_received: AtomicU64,

    /// Datagrams discarded as non-UTF-8 or empty
    pub discarded: AtomicU64,

    /// Contact documents converted to ADIF
    pub converted: AtomicU64,

    /// XML payloads that could not be converted
    pub conversion_failures: AtomicU64,

    /// Non-XML payloads forwarded unchanged
    pub passed_through: AtomicU64,

    /// Records accepted by Wavelog
    pub delivered: AtomicU64,

    /// Records rejected by Wavelog with an error status
    pub rejected: AtomicU64,

    /// Records dropped after every attempt failed
    pub exhausted: AtomicU64,

    /// Individual attempts that failed at the transport level
    pub failed_attempts: AtomicU64,

    /// Socket receive errors
    pub receive_errors: AtomicU64,

    /// Histogram of successful upload latency in milliseconds
    latency_histogram: RwLock<Histogram<u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl RelayStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            datagrams: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            converted: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
            passed_through: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            // Latency histogram: 1 ms to 2 minutes, 3 significant figures
            latency_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 120_000, 3)
                    .expect("Failed to create latency histogram"),
            ),
            start_time: Instant::now(),
        }
    }

    /// Record the latency of a successful upload.
    pub fn record_latency(&self, latency: Duration) {
        let ms = (latency.as_millis() as u64).clamp(1, 120_000);
        if let Ok(mut hist) = self.latency_histogram.write() {
            let _ = hist.record(ms);
        }
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let latency_percentiles = self
            .latency_histogram
            .read()
            .ok()
            .filter(|h| !h.is_empty())
            .map(|h| HistogramPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            datagrams: self.datagrams.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            latency_percentiles,
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for RelayStats {
    fn report(&self, event: &RelayEvent) {
        let counter = match event {
            RelayEvent::Received { bytes, .. } => {
                self.bytes_received
                    .fetch_add(*bytes as u64, Ordering::Relaxed);
                &self.datagrams
            }
            RelayEvent::InvalidUtf8 { .. } | RelayEvent::Empty { .. } => &self.discarded,
            RelayEvent::NotContact | RelayEvent::ConversionFailed { .. } => {
                &self.conversion_failures
            }
            RelayEvent::Converted { .. } => &self.converted,
            RelayEvent::PassThrough { .. } => &self.passed_through,
            RelayEvent::AttemptFailed { .. } => &self.failed_attempts,
            RelayEvent::Delivered { latency, .. } => {
                self.record_latency(*latency);
                &self.delivered
            }
            RelayEvent::Rejected { .. } => &self.rejected,
            RelayEvent::Exhausted { .. } => &self.exhausted,
            RelayEvent::ReceiveFailed { .. } => &self.receive_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub datagrams: u64,
    pub bytes_received: u64,
    pub discarded: u64,
    pub converted: u64,
    pub conversion_failures: u64,
    pub passed_through: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub exhausted: u64,
    pub failed_attempts: u64,
    pub receive_errors: u64,
    pub latency_percentiles: Option<HistogramPercentiles>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                 WAVELOG RELAY STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(
            f,
            "Datagrams: {} ({} bytes)",
            self.datagrams, self.bytes_received
        )?;
        writeln!(f, "Discarded: {}", self.discarded)?;
        writeln!(f, "Converted: {}", self.converted)?;
        writeln!(f, "Conversion failures: {}", self.conversion_failures)?;
        writeln!(f, "Passed through: {}", self.passed_through)?;
        writeln!(f)?;
        writeln!(f, "Delivered: {}", self.delivered)?;
        writeln!(f, "Rejected: {}", self.rejected)?;
        writeln!(f, "Exhausted: {}", self.exhausted)?;
        writeln!(f, "Failed attempts: {}", self.failed_attempts)?;
        writeln!(f, "Receive errors: {}", self.receive_errors)?;

        if let Some(ref p) = self.latency_percentiles {
            writeln!(f)?;
            writeln!(f, "Upload Latency (ms):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
        }

        Ok(())
    }
}
