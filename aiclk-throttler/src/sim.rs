//! Simulated board for running the throttler off-chip.
//!
//! A crude static plant: core power follows the arbiter's granted clock
//! and a workload factor, and every other measurement is derived from
//! core power. Good enough to watch the loop settle against its limits;
//! not a thermal model.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::arbiter::InMemoryArbiter;
use crate::sensors::{InternalTelemetry, TelemetrySource};

const IDLE_POWER_W: f32 = 30.0;
const WATTS_PER_MHZ: f32 = 0.3;
const VCORE_V: f32 = 0.8;
const AMBIENT_C: f32 = 35.0;
const DIE_C_PER_W: f32 = 0.12;
const VR_EFFICIENCY: f32 = 0.85;
const BOARD_OVERHEAD_W: f32 = 25.0;
const GDDR_BASE_C: f32 = 40.0;
const GDDR_C_PER_W: f32 = 0.05;

pub struct SimulatedBoard {
    arbiter: Arc<InMemoryArbiter>,
    load: Mutex<f32>,
}

impl SimulatedBoard {
    /// `load` is the fraction of full activity, clamped to `[0, 1]`.
    pub fn new(arbiter: Arc<InMemoryArbiter>, load: f32) -> Self {
        Self {
            arbiter,
            load: Mutex::new(load.clamp(0.0, 1.0)),
        }
    }

    pub fn set_load(&self, load: f32) {
        *self.load.lock() = load.clamp(0.0, 1.0);
    }

    fn vcore_power(&self) -> f32 {
        let clock = self.arbiter.effective_max().max(0.0);
        IDLE_POWER_W + *self.load.lock() * clock * WATTS_PER_MHZ
    }
}

impl TelemetrySource for SimulatedBoard {
    fn read_internal(&self) -> InternalTelemetry {
        let power = self.vcore_power();
        InternalTelemetry {
            vcore_power: power,
            vcore_current: power / VCORE_V,
            asic_temperature: AMBIENT_C + power * DIE_C_PER_W,
        }
    }

    fn input_power(&self) -> f32 {
        self.vcore_power() / VR_EFFICIENCY + BOARD_OVERHEAD_W
    }

    fn max_gddr_temperature(&self) -> f32 {
        GDDR_BASE_C + self.input_power() * GDDR_C_PER_W
    }
}
