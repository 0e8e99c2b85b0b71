//! Throttler daemon.
//!
//! Runs the control loop against a simulated board, an in-memory arbiter
//! and a heap-backed telemetry window. Useful for watching the loop's
//! behavior off-chip.
//!
//! Environment:
//!   AICLK_THROTTLER_CONFIG       JSON config file (default: built-in limits)
//!   AICLK_THROTTLER_LOAD         simulated workload, 0.0--1.0 (default: 1.0)
//!   AICLK_THROTTLER_CABLE_LIMIT  board power limit (W) sent after startup
//!   AICLK_THROTTLER_DUMP         write the telemetry window here on exit

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use aiclk_throttler::arbiter::InMemoryArbiter;
use aiclk_throttler::commands::ThrottlerCommand;
use aiclk_throttler::sensors::MonotonicTimer;
use aiclk_throttler::sim::SimulatedBoard;
use aiclk_throttler::telemetry::{SAMPLE_CAPACITY, TelemetryWindow, slot_offset};
use aiclk_throttler::throttler::{Throttler, ThrottlerConfig, ThrottlerParts};
use aiclk_throttler::tracing::prelude::*;

const ARBITER_FMIN_MHZ: f32 = 200.0;
const ARBITER_FMAX_MHZ: f32 = 1350.0;

#[tokio::main]
async fn main() -> Result<()> {
    aiclk_throttler::tracing::init_journald_or_stdout();

    let config = ThrottlerConfig::load_from_env().context("loading throttler config")?;
    let load = match env::var("AICLK_THROTTLER_LOAD") {
        Ok(value) => value
            .parse::<f32>()
            .with_context(|| format!("invalid AICLK_THROTTLER_LOAD: {value}"))?,
        Err(_) => 1.0,
    };

    let arbiter = Arc::new(InMemoryArbiter::with_bounds(
        ARBITER_FMAX_MHZ,
        ARBITER_FMIN_MHZ,
        ARBITER_FMAX_MHZ,
    ));
    let board = Arc::new(SimulatedBoard::new(arbiter.clone(), load));

    let throttler = Arc::new(Throttler::new(ThrottlerParts {
        arbiter: arbiter.clone(),
        telemetry: board,
        timer: Arc::new(MonotonicTimer::new()),
        window: TelemetryWindow::in_memory(),
        chip_limits: config.chip_limits,
    }));
    throttler.init_limits();

    let (command_tx, command_rx) = mpsc::channel(8);
    let running = CancellationToken::new();
    let loop_handle = tokio::spawn(throttler.clone().run(
        config.tick_period(),
        command_rx,
        running.clone(),
    ));

    if let Ok(value) = env::var("AICLK_THROTTLER_CABLE_LIMIT") {
        let watts: u16 = value
            .parse()
            .with_context(|| format!("invalid AICLK_THROTTLER_CABLE_LIMIT: {value}"))?;
        let (reply, reply_rx) = oneshot::channel();
        command_tx
            .send(ThrottlerCommand::SetBoardPowerLimit {
                payload: watts.to_le_bytes().to_vec(),
                reply,
            })
            .await
            .context("throttler loop exited")?;
        let outcome = reply_rx.await.context("throttler loop exited")??;
        info!(limit = outcome.applied(), clamped = outcome.was_clamped(), "Cable limit applied");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    running.cancel();
    loop_handle.await?;

    let status = throttler.status();
    info!(
        samples = status.samples_recorded,
        board_power_limit = status.board_power_limit,
        granted_mhz = arbiter.effective_max(),
        "Throttler stopped"
    );

    if let Ok(path) = env::var("AICLK_THROTTLER_DUMP") {
        let dump = throttler.dump_window(slot_offset(SAMPLE_CAPACITY));
        std::fs::write(&path, dump).with_context(|| format!("writing window dump to {path}"))?;
        info!(path = %path, "Telemetry window dumped");
    }

    Ok(())
}
