//! Interface to the AI clock arbiter.
//!
//! The arbiter combines several independent frequency ceilings into the
//! clock that actually runs. The throttler only sees its per-category
//! maximum; how the arbiter picks the final frequency is not its concern.
//!
//! # Loop state lives here
//!
//! The throttler never recomputes a category maximum from scratch. Each
//! tick it reads the stored value and adds its PD output to it, so the
//! stored maximum accumulates the loop's error history between ticks and
//! plays the part of the integral term the PD law leaves out. Treat the
//! arbiter's maxima as part of the control loop's state: replacing
//! [`ClockArbiter::set_max`] with a stateless recompute changes the
//! closed-loop behavior.

use std::collections::HashMap;

use parking_lot::Mutex;
use strum::IntoEnumIterator;

/// Arbiter ceiling owned by one throttler channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ArbiterCategory {
    Tdp,
    FastTdc,
    Tdc,
    Thermal,
    BoardPower,
    GddrThermal,
}

/// Per-category maximum clock (MHz) interface of the arbiter.
///
/// Implementations provide their own synchronization; the throttler calls
/// these from whichever task runs the tick.
pub trait ClockArbiter: Send + Sync {
    /// Current maximum for `category`.
    fn max(&self, category: ArbiterCategory) -> f32;

    /// Replace the maximum for `category`.
    fn set_max(&self, category: ArbiterCategory, mhz: f32);
}

/// Arbiter that keeps its maxima in memory.
///
/// Stored values are clamped to `[floor, ceiling]`, which stands in for
/// the firmware arbiter's fmin/fmax bounds. Used by the daemon's
/// simulated board and by tests.
#[derive(Debug)]
pub struct InMemoryArbiter {
    maxima: Mutex<HashMap<ArbiterCategory, f32>>,
    floor: f32,
    ceiling: f32,
}

impl InMemoryArbiter {
    /// Create an arbiter with every category at `initial` and no bounds.
    pub fn new(initial: f32) -> Self {
        Self::with_bounds(initial, f32::NEG_INFINITY, f32::INFINITY)
    }

    /// Create an arbiter whose stored maxima never leave `[floor, ceiling]`.
    pub fn with_bounds(initial: f32, floor: f32, ceiling: f32) -> Self {
        let initial = initial.clamp(floor, ceiling);
        Self {
            maxima: Mutex::new(
                ArbiterCategory::iter()
                    .map(|category| (category, initial))
                    .collect(),
            ),
            floor,
            ceiling,
        }
    }

    /// The lowest maximum across all categories, i.e. the clock the
    /// arbiter would grant.
    pub fn effective_max(&self) -> f32 {
        self.maxima
            .lock()
            .values()
            .copied()
            .fold(f32::INFINITY, f32::min)
    }
}

impl ClockArbiter for InMemoryArbiter {
    fn max(&self, category: ArbiterCategory) -> f32 {
        self.maxima.lock().get(&category).copied().unwrap_or(self.ceiling)
    }

    fn set_max(&self, category: ArbiterCategory, mhz: f32) {
        let bounded = if mhz.is_nan() {
            self.floor
        } else {
            mhz.clamp(self.floor, self.ceiling)
        };
        self.maxima.lock().insert(category, bounded);
    }
}
