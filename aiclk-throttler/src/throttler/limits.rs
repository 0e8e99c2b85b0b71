//! Limit clamping and the startup limit policy.

use super::channel::{Channel, ChannelTable};
use super::config::ChipLimits;

/// Board power limit (W) used at startup.
///
/// Unlike the other channels this does not come from the firmware table;
/// the cable limit message from the board management controller is
/// expected to raise it once the power supply is known.
pub const DEFAULT_BOARD_POWER_LIMIT: f32 = 150.0;

/// What happened to a requested limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitOutcome {
    /// The request was inside the channel's range and stored as-is.
    Applied(f32),
    /// The request was outside the range; `applied` is the stored value.
    Clamped { requested: f32, applied: f32 },
}

impl LimitOutcome {
    /// The value that ends up stored.
    pub fn applied(self) -> f32 {
        match self {
            LimitOutcome::Applied(value) => value,
            LimitOutcome::Clamped { applied, .. } => applied,
        }
    }

    pub fn was_clamped(self) -> bool {
        matches!(self, LimitOutcome::Clamped { .. })
    }
}

/// Clamp `requested` into `channel`'s safety range.
///
/// Never fails. NaN lands on the range minimum.
pub fn clamp_limit(channel: Channel, requested: f32) -> LimitOutcome {
    let range = channel.limit_range();

    if requested.is_nan() {
        return LimitOutcome::Clamped {
            requested,
            applied: range.min,
        };
    }

    let applied = requested.clamp(range.min, range.max);
    if applied == requested {
        LimitOutcome::Applied(applied)
    } else {
        LimitOutcome::Clamped { requested, applied }
    }
}

/// Unclamped startup request for every channel.
///
/// Five channels read the firmware table; board power always starts from
/// [`DEFAULT_BOARD_POWER_LIMIT`].
pub fn initial_requests(chip: &ChipLimits) -> ChannelTable<f32> {
    ChannelTable::from_fn(|channel| match channel {
        Channel::Tdp => chip.tdp_limit as f32,
        Channel::FastTdc => chip.tdc_fast_limit as f32,
        Channel::Tdc => chip.tdc_limit as f32,
        Channel::Thermal => chip.thm_limit as f32,
        Channel::BoardPower => DEFAULT_BOARD_POWER_LIMIT,
        Channel::GddrThermal => chip.gddr_thm_limit as f32,
    })
}
