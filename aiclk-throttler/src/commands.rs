//! Command types sent from the control plane to the throttler loop.
//!
//! Each command carries a oneshot reply channel so the sender can await
//! the result and translate it into a status for the remote side.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::throttler::LimitOutcome;

/// Commands served by [`Throttler::run`](crate::throttler::Throttler::run).
#[derive(Debug)]
pub enum ThrottlerCommand {
    /// Revise the board power limit from a raw control-plane payload
    /// (little-endian u16 watts).
    SetBoardPowerLimit {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<LimitOutcome>>,
    },
}
