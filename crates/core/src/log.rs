//! Timestamped raw-input log.
//!
//! Every completed read appends one [`LogEntry`] carrying the raw report
//! bytes and four clock samples: monotonic elapsed time, local UTC wall
//! clock, the time oracle's synced sample, and the jitter between the two
//! monotonic reads taken while building the entry. The log is a bounded
//! ring; once full the oldest entry is evicted.
//!
//! Exports use 100 ns ticks. Absolute times are expressed as ticks since
//! 0001-01-01 UTC so the text format matches existing capture tooling.

use crate::time::TimeOracle;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Default entry capacity, about ten hours of inputs at 60 Hz.
pub const LOG_CAPACITY: usize = 2_097_152;

/// Raw bytes kept per entry. Longer reports are truncated, shorter ones
/// zero-padded.
pub const RAW_CAPTURE_LEN: usize = 5;

/// Bytes per entry in the packed export.
pub const PACKED_FRAME_LEN: usize = 4;

/// Flag mask applied to the first payload byte of a packed frame.
const PACKED_XOR_MASK: u8 = 0b0000_1000;

/// Ticks (100 ns) between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: u64 = 621_355_968_000_000_000;

/// One logged input report with its clock samples.
#[derive(Debug, Clone, Copy)]
pub struct LogEntry {
    /// Monotonic time since the log was created.
    pub elapsed: Duration,
    /// Local UTC wall clock at entry creation.
    pub wall_clock: SystemTime,
    /// The oracle's wall-clock sample.
    pub synced_clock: SystemTime,
    /// Whether the oracle sample was actually synchronized.
    pub synced: bool,
    /// Delta between the two monotonic samples taken while building the
    /// entry; measures scheduling delay inside the completion path.
    pub jitter: Duration,
    /// Raw report bytes, `[id, body...]`.
    pub raw: [u8; RAW_CAPTURE_LEN],
}

impl LogEntry {
    /// Fixed-width lowercase-hex text record: 48-bit elapsed ticks, 64-bit
    /// wall ticks, 64-bit synced ticks, synced flag, 32-bit jitter ticks,
    /// raw bytes 1..=4.
    pub fn to_text_record(&self) -> String {
        format!(
            "{:012x}{:016x}{:016x}{}{:08x}{:02x}{:02x}{:02x}{:02x}",
            duration_ticks(self.elapsed) & 0xFFFF_FFFF_FFFF,
            wall_ticks(self.wall_clock),
            wall_ticks(self.synced_clock),
            if self.synced { "01" } else { "00" },
            duration_ticks(self.jitter) & 0xFFFF_FFFF,
            self.raw[1],
            self.raw[2],
            self.raw[3],
            self.raw[4],
        )
    }

    /// Packed 4-byte frame: payload byte 1 with the flag mask applied,
    /// byte 2 verbatim, bytes 3 and 4 re-centered as signed offsets from
    /// the 8-bit midpoint (byte 4 inverted).
    pub fn to_packed_frame(&self) -> [u8; PACKED_FRAME_LEN] {
        [
            self.raw[1] ^ PACKED_XOR_MASK,
            self.raw[2],
            self.raw[3].wrapping_sub(128),
            128u8.wrapping_sub(self.raw[4]),
        ]
    }
}

/// Bounded ring of timestamped raw input records.
///
/// Appended to only by the pump; exports run under the same lock as the
/// appends (see the controller), so they see a consistent sequence.
#[derive(Debug)]
pub struct InputLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    epoch: Instant,
}

impl Default for InputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InputLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            epoch: Instant::now(),
        }
    }

    /// Build and append an entry for one received report.
    pub fn record(&mut self, raw: &[u8], oracle: &dyn TimeOracle) {
        let elapsed = self.epoch.elapsed();
        let wall_clock = SystemTime::now();
        let sample = oracle.current_synced_time();
        let jitter = self.epoch.elapsed().saturating_sub(elapsed);

        let mut bytes = [0u8; RAW_CAPTURE_LEN];
        let n = raw.len().min(RAW_CAPTURE_LEN);
        bytes[..n].copy_from_slice(&raw[..n]);

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            trace!("input log full, evicting oldest entry");
        }
        self.entries.push_back(LogEntry {
            elapsed,
            wall_clock,
            synced_clock: sample.wall_clock,
            synced: sample.synced,
            jitter,
            raw: bytes,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Write the line-oriented text export, one record per entry.
    pub fn write_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for entry in &self.entries {
            writeln!(w, "{}", entry.to_text_record())?;
        }
        Ok(())
    }

    /// Write the packed binary export, four bytes per entry.
    pub fn write_packed<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for entry in &self.entries {
            w.write_all(&entry.to_packed_frame())?;
        }
        Ok(())
    }
}

/// Duration → 100 ns ticks.
fn duration_ticks(d: Duration) -> u64 {
    (d.as_nanos() / 100) as u64
}

/// Wall-clock time → ticks since 0001-01-01 UTC.
fn wall_ticks(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH_TICKS + duration_ticks(d),
        Err(e) => UNIX_EPOCH_TICKS.saturating_sub(duration_ticks(e.duration())),
    }
}
