//! Telemetry inputs consumed by the throttler.
//!
//! Acquisition itself (sensor aggregation, PMBus reads, GDDR temperature
//! polling) happens elsewhere. The throttler sees it through
//! [`TelemetrySource`] and reads it exactly once per tick via
//! [`TelemetrySnapshot::capture`].

use tokio::time::Instant;

/// Values produced by the internal telemetry aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InternalTelemetry {
    /// Core rail power (W).
    pub vcore_power: f32,
    /// Core rail current (A).
    pub vcore_current: f32,
    /// Die temperature (°C).
    pub asic_temperature: f32,
}

/// Source of the measurements the throttler reacts to.
pub trait TelemetrySource: Send + Sync {
    /// Latest internally aggregated telemetry.
    fn read_internal(&self) -> InternalTelemetry;

    /// Board input power (W), measured outside the chip.
    fn input_power(&self) -> f32;

    /// Hottest GDDR module temperature (°C).
    fn max_gddr_temperature(&self) -> f32;
}

/// All measurements used by one tick, taken at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub internal: InternalTelemetry,
    pub input_power: f32,
    pub max_gddr_temperature: f32,
}

impl TelemetrySnapshot {
    /// Read every input once.
    pub fn capture(source: &dyn TelemetrySource) -> Self {
        Self {
            internal: source.read_internal(),
            input_power: source.input_power(),
            max_gddr_temperature: source.max_gddr_temperature(),
        }
    }
}

/// 32-bit timestamp source for telemetry samples.
pub trait Timer: Send + Sync {
    fn timestamp(&self) -> u32;
}

/// Microseconds since creation, wrapping at 32 bits like the hardware
/// timer it replaces.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for MonotonicTimer {
    fn timestamp(&self) -> u32 {
        // Truncation is the wrap.
        self.start.elapsed().as_micros() as u32
    }
}
