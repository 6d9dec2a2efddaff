//! Per-dispatcher call counters and their serializable snapshot.

use alpaca_core::DeviceError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Counters for dispatched calls.
///
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct CallMetrics {
    /// Calls started
    calls: Arc<AtomicU64>,
    /// Calls that returned a value
    successes: Arc<AtomicU64>,
    /// Calls rejected by the server with a non-zero ErrorNumber
    protocol_errors: Arc<AtomicU64>,
    /// Calls that never got a response
    communication_errors: Arc<AtomicU64>,
    /// Calls whose response could not be decoded
    decode_errors: Arc<AtomicU64>,
    /// Total response body bytes
    bytes_received: Arc<AtomicU64>,
    /// Last activity timestamp
    last_activity: Arc<parking_lot::RwLock<SystemTime>>,
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMetrics {
    /// Create a new CallMetrics instance
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicU64::new(0)),
            successes: Arc::new(AtomicU64::new(0)),
            protocol_errors: Arc::new(AtomicU64::new(0)),
            communication_errors: Arc::new(AtomicU64::new(0)),
            decode_errors: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            last_activity: Arc::new(parking_lot::RwLock::new(SystemTime::now())),
        }
    }

    /// Record a call being started
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.update_last_activity();
    }

    /// Record bytes received
    pub fn record_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.update_last_activity();
    }

    /// Record how a call ended
    pub fn record_outcome<T>(&self, result: &Result<T, DeviceError>) {
        let counter = match result {
            Ok(_) => &self.successes,
            Err(DeviceError::Protocol(_)) => &self.protocol_errors,
            Err(DeviceError::Communication(_)) => &self.communication_errors,
            Err(DeviceError::Decode(_)) => &self.decode_errors,
            Err(DeviceError::Configuration(_)) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_last_activity(&self) {
        *self.last_activity.write() = SystemTime::now();
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    pub fn communication_errors(&self) -> u64 {
        self.communication_errors.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn last_activity(&self) -> SystemTime {
        *self.last_activity.read()
    }

    /// Get time since last activity
    pub fn time_since_last_activity(&self) -> Duration {
        self.last_activity()
            .elapsed()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls(),
            successes: self.successes(),
            protocol_errors: self.protocol_errors(),
            communication_errors: self.communication_errors(),
            decode_errors: self.decode_errors(),
            bytes_received: self.bytes_received(),
            last_activity: self.last_activity(),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.protocol_errors.store(0, Ordering::Relaxed);
        self.communication_errors.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.update_last_activity();
    }
}

/// Snapshot of call metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub protocol_errors: u64,
    pub communication_errors: u64,
    pub decode_errors: u64,
    pub bytes_received: u64,
    pub last_activity: SystemTime,
}

impl MetricsSnapshot {
    /// Calls that have not finished yet, or ended in a configuration error.
    pub fn unsettled(&self) -> u64 {
        self.calls.saturating_sub(
            self.successes + self.protocol_errors + self.communication_errors + self.decode_errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpaca_core::{CommunicationError, ProtocolError, ProtocolErrorKind};

    #[test]
    fn test_outcomes_are_counted_by_category() {
        let metrics = CallMetrics::new();
        for _ in 0..4 {
            metrics.record_call();
        }
        metrics.record_outcome::<()>(&Ok(()));
        metrics.record_outcome::<()>(&Err(ProtocolError {
            kind: ProtocolErrorKind::NotConnected,
            error_number: 0x407,
            message: String::new(),
        }
        .into()));
        metrics.record_outcome::<()>(&Err(CommunicationError::timeout("azimuth", 10).into()));
        metrics.record_bytes_received(120);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls, 4);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.protocol_errors, 1);
        assert_eq!(snapshot.communication_errors, 1);
        assert_eq!(snapshot.bytes_received, 120);
        assert_eq!(snapshot.unsettled(), 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CallMetrics::new();
        let clone = metrics.clone();
        clone.record_call();
        assert_eq!(metrics.calls(), 1);

        metrics.reset();
        assert_eq!(clone.calls(), 0);
    }
}
