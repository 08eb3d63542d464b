//! Time oracle seam for the input log.
//!
//! The log annotates every entry with a best-effort network-synchronized
//! wall-clock sample. Where that sample comes from (NTP, PTP, a test
//! fixture) is the caller's business; this core only defines the interface
//! and a local-clock fallback.

use std::time::SystemTime;

/// A wall-clock sample with a trust marker.
#[derive(Debug, Clone, Copy)]
pub struct SyncedTime {
    pub wall_clock: SystemTime,
    /// True when the sample came from a synchronized source rather than
    /// the local clock.
    pub synced: bool,
}

/// Supplies synced wall-clock samples to the input log.
///
/// Implementations must be cheap: the pump calls this once per received
/// report, so a network oracle should answer from a cached sample.
pub trait TimeOracle: Send + Sync {
    fn current_synced_time(&self) -> SyncedTime;
}

/// Fallback oracle: local wall clock, never marked synced.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTimeOracle;

impl TimeOracle for LocalTimeOracle {
    fn current_synced_time(&self) -> SyncedTime {
        SyncedTime {
            wall_clock: SystemTime::now(),
            synced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_oracle_is_never_synced() {
        let sample = LocalTimeOracle.current_synced_time();
        assert!(!sample.synced);
    }
}
