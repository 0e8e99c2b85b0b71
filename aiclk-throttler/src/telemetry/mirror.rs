//! Bounded recording of per-tick samples into the telemetry window.
//!
//! # Layout
//!
//! ```text
//! offset      0            4             8             12 ...
//!             +------------+-------------+-------------+------------
//!  slot 0     | timestamp  | tdp power   | board power | slot 1 ...
//!             | u32 LE     | f32 bits LE | f32 bits LE |
//!             +------------+-------------+-------------+------------
//! ```
//!
//! Slot `n` starts at `n * SAMPLE_STRIDE`. Recording stops for good once
//! [`SAMPLE_CAPACITY`] slots have been written; it is not a ring buffer.

use bytes::Buf;

use super::window::{TelemetryWindow, WordAccess};

/// Number of samples recorded before the mirror saturates.
pub const SAMPLE_CAPACITY: u32 = 500;

/// Bytes per recorded sample.
pub const SAMPLE_STRIDE: u32 = 12;

/// One recorded tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: u32,
    /// Core rail power (W).
    pub tdp_power: f32,
    /// Board input power (W).
    pub board_power: f32,
}

impl TelemetrySample {
    pub fn to_words(self) -> [u32; 3] {
        [
            self.timestamp,
            self.tdp_power.to_bits(),
            self.board_power.to_bits(),
        ]
    }

    pub fn from_words(words: [u32; 3]) -> Self {
        Self {
            timestamp: words[0],
            tdp_power: f32::from_bits(words[1]),
            board_power: f32::from_bits(words[2]),
        }
    }
}

/// Byte offset of `slot` within the window.
pub const fn slot_offset(slot: u32) -> u32 {
    slot * SAMPLE_STRIDE
}

/// Result of [`TelemetryMirror::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded { slot: u32 },
    /// Capacity already reached; nothing was written.
    Saturated,
}

/// Append-only recorder with a saturating slot counter.
#[derive(Debug, Default)]
pub struct TelemetryMirror {
    recorded: u32,
}

impl TelemetryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> u32 {
        self.recorded
    }

    pub fn is_saturated(&self) -> bool {
        self.recorded >= SAMPLE_CAPACITY
    }

    pub fn record(&mut self, window: &mut TelemetryWindow, sample: TelemetrySample) -> RecordOutcome {
        if self.is_saturated() {
            return RecordOutcome::Saturated;
        }

        let slot = self.recorded;
        let base = slot_offset(slot);
        for (i, word) in sample.to_words().into_iter().enumerate() {
            // Slot offsets are aligned and far below the window end.
            let access = window.write_word(base + 4 * i as u32, word);
            debug_assert_eq!(access, WordAccess::Ok);
        }

        self.recorded += 1;
        RecordOutcome::Recorded { slot }
    }
}

/// Decode samples from a dump of the start of the window.
///
/// Reads whole slots only, at most `limit` of them (capacity when
/// `None`). Without a limit, trailing all-zero slots are dropped as
/// never written. A real all-zero sample at the very end of the record
/// is indistinguishable from an empty slot; pass the recorded count to
/// keep it.
pub fn decode_samples(mut dump: &[u8], limit: Option<usize>) -> Vec<TelemetrySample> {
    let max = limit.unwrap_or(SAMPLE_CAPACITY as usize);
    let mut slots = Vec::new();

    while slots.len() < max && dump.remaining() >= SAMPLE_STRIDE as usize {
        slots.push([dump.get_u32_le(), dump.get_u32_le(), dump.get_u32_le()]);
    }

    if limit.is_none() {
        while slots.last() == Some(&[0; 3]) {
            slots.pop();
        }
    }

    slots.into_iter().map(TelemetrySample::from_words).collect()
}
