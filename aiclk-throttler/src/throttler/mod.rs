mod channel;
mod config;
mod controller;
mod filter;
mod limits;
mod pd;

pub use channel::{Channel, ChannelTable, ControlParams, LimitRange};
pub use config::{CONFIG_PATH_ENV, ChipLimits, ThrottlerConfig};
pub use controller::{
    ChannelSnapshot, Throttler, ThrottlerParts, ThrottlerStatus, TickReport,
};
pub use filter::ExponentialFilter;
pub use limits::{DEFAULT_BOARD_POWER_LIMIT, LimitOutcome, clamp_limit};
pub use pd::{AICLK_SCALE_FACTOR, ChannelController};
