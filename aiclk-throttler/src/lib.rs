//! Power and thermal throttling of the AI clock.
//!
//! The [`throttler::Throttler`] runs one control cycle per tick: it reads
//! a telemetry snapshot, updates a PD controller per constraint channel,
//! mirrors a sample into the shared telemetry window, and nudges each
//! channel's clock arbiter maximum. Board power limits can be revised at
//! any time through [`throttler::Throttler::update_board_power_limit`].

pub mod arbiter;
pub mod commands;
pub mod error;
pub mod sensors;
pub mod sim;
pub mod telemetry;
pub mod throttler;
pub mod tracing;
