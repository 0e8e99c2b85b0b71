use std::sync::Arc;
use std::time::Duration;

use bytes::Buf;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::channel::{Channel, ChannelTable};
use super::config::ChipLimits;
use super::limits::{self, LimitOutcome};
use super::pd::ChannelController;
use crate::arbiter::ClockArbiter;
use crate::commands::ThrottlerCommand;
use crate::error::{Error, Result};
use crate::sensors::{TelemetrySnapshot, TelemetrySource, Timer};
use crate::telemetry::{
    RecordOutcome, SAMPLE_CAPACITY, TelemetryMirror, TelemetrySample, TelemetryWindow, WordAccess,
    WordRead,
};
use crate::tracing::prelude::*;

/// Bytes in a board power limit message: one little-endian u16.
const BOARD_POWER_PAYLOAD_LEN: usize = 2;

/// Collaborators handed to [`Throttler::new`].
pub struct ThrottlerParts {
    pub arbiter: Arc<dyn ClockArbiter>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub timer: Arc<dyn Timer>,
    pub window: TelemetryWindow,
    pub chip_limits: ChipLimits,
}

/// Published after every tick and every limit change.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottlerStatus {
    pub limits: ChannelTable<f32>,
    pub outputs: ChannelTable<f32>,
    /// Board power limit the loop is using.
    pub board_power_limit: f32,
    /// Last cable limit republished to telemetry: the request capped at
    /// the firmware ceiling, before range clamping. `None` until the
    /// first cable limit message.
    pub published_board_power_limit: Option<u32>,
    pub samples_recorded: u32,
}

/// What one call to [`Throttler::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub snapshot: TelemetrySnapshot,
    /// Limits in force for this tick.
    pub limits: ChannelTable<f32>,
    pub outputs: ChannelTable<f32>,
    pub record: RecordOutcome,
}

/// Point-in-time copy of one channel's controller state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSnapshot {
    pub limit: f32,
    pub filtered_value: f32,
    pub error: f32,
    pub previous_error: f32,
    pub output: f32,
}

/// State the tick and the limit handler both touch.
struct LoopState {
    channels: ChannelTable<ChannelController>,
    mirror: TelemetryMirror,
    window: TelemetryWindow,
    published_board_power_limit: Option<u32>,
}

impl LoopState {
    fn status(&self) -> ThrottlerStatus {
        ThrottlerStatus {
            limits: self.channels.map(|_, c| c.limit()),
            outputs: self.channels.map(|_, c| c.output()),
            board_power_limit: self.channels[Channel::BoardPower].limit(),
            published_board_power_limit: self.published_board_power_limit,
            samples_recorded: self.mirror.recorded(),
        }
    }
}

/// The AI clock throttler.
///
/// Owns every channel's controller state. A single lock covers the
/// channel table, the telemetry mirror and the window, and both
/// [`tick`](Self::tick) and [`set_limit`](Self::set_limit) hold it for
/// their whole update, so a limit change from the control plane lands
/// strictly between two ticks.
///
/// The arbiter maxima are part of this loop's state too: see
/// [`crate::arbiter`].
pub struct Throttler {
    arbiter: Arc<dyn ClockArbiter>,
    telemetry: Arc<dyn TelemetrySource>,
    timer: Arc<dyn Timer>,
    chip_limits: ChipLimits,
    state: Mutex<LoopState>,
    status_tx: watch::Sender<ThrottlerStatus>,
}

impl Throttler {
    /// Builds a throttler with every limit at the bottom of its range.
    /// Call [`init_limits`](Self::init_limits) to load the real ones.
    pub fn new(parts: ThrottlerParts) -> Self {
        let state = LoopState {
            channels: ChannelTable::from_fn(|channel| {
                ChannelController::new(channel.control_params(), channel.limit_range().min)
            }),
            mirror: TelemetryMirror::new(),
            window: parts.window,
            published_board_power_limit: None,
        };
        let (status_tx, _) = watch::channel(state.status());

        Self {
            arbiter: parts.arbiter,
            telemetry: parts.telemetry,
            timer: parts.timer,
            chip_limits: parts.chip_limits,
            state: Mutex::new(state),
            status_tx,
        }
    }

    /// Sets every channel's startup limit.
    ///
    /// Board power starts at [`limits::DEFAULT_BOARD_POWER_LIMIT`]; the
    /// rest come from the firmware table.
    pub fn init_limits(&self) {
        let requests = limits::initial_requests(&self.chip_limits);
        for (channel, &requested) in requests.iter() {
            self.set_limit(channel, requested);
        }
    }

    /// Clamps `requested` into the channel's range and stores it.
    pub fn set_limit(&self, channel: Channel, requested: f32) -> LimitOutcome {
        let mut state = self.state.lock();
        let outcome = Self::store_limit(&mut state, channel, requested);
        self.publish(&state);
        outcome
    }

    fn store_limit(state: &mut LoopState, channel: Channel, requested: f32) -> LimitOutcome {
        let outcome = limits::clamp_limit(channel, requested);
        state.channels[channel].set_limit(outcome.applied());

        if outcome.was_clamped() {
            info!(%channel, requested, limit = outcome.applied(), "Throttler limit clamped");
        } else {
            info!(%channel, limit = outcome.applied(), "Throttler limit set");
        }

        outcome
    }

    /// Must be called with the state lock held, so statuses go out in
    /// the order the state changed.
    fn publish(&self, state: &LoopState) {
        self.status_tx.send_replace(state.status());
    }

    pub fn limit(&self, channel: Channel) -> f32 {
        self.state.lock().channels[channel].limit()
    }

    pub fn channel(&self, channel: Channel) -> ChannelSnapshot {
        let state = self.state.lock();
        let c = &state.channels[channel];
        ChannelSnapshot {
            limit: c.limit(),
            filtered_value: c.filtered_value(),
            error: c.error(),
            previous_error: c.previous_error(),
            output: c.output(),
        }
    }

    /// Clears every channel's filter and error history. Limits and the
    /// arbiter maxima are left alone.
    pub fn reset_controllers(&self) {
        let mut state = self.state.lock();
        for (_, controller) in state.channels.iter_mut() {
            controller.reset();
        }
        debug!("Throttler controllers reset");
    }

    /// Runs one control cycle.
    ///
    /// All channels react to the same snapshot, and arbiter maxima are
    /// only touched after every channel has been updated.
    pub fn tick(&self) -> TickReport {
        let snapshot = TelemetrySnapshot::capture(self.telemetry.as_ref());

        let mut state = self.state.lock();

        for (channel, controller) in state.channels.iter_mut() {
            controller.update(measurement(&snapshot, channel));
        }

        let sample = TelemetrySample {
            timestamp: self.timer.timestamp(),
            tdp_power: snapshot.internal.vcore_power,
            board_power: snapshot.input_power,
        };
        let LoopState { mirror, window, .. } = &mut *state;
        let record = mirror.record(window, sample);
        if record == (RecordOutcome::Recorded { slot: SAMPLE_CAPACITY - 1 }) {
            info!(samples = SAMPLE_CAPACITY, "Telemetry mirror full, recording stopped");
        }

        for (channel, controller) in state.channels.iter() {
            self.apply_to_arbiter(channel, controller);
        }

        self.publish(&state);

        TickReport {
            snapshot,
            limits: state.channels.map(|_, c| c.limit()),
            outputs: state.channels.map(|_, c| c.output()),
            record,
        }
    }

    /// Adds the channel's scaled output to its arbiter maximum.
    ///
    /// The read-modify-write makes the arbiter value the loop's
    /// integrator; see [`crate::arbiter`].
    fn apply_to_arbiter(&self, channel: Channel, controller: &ChannelController) {
        let category = channel.arbiter_category();
        let current = self.arbiter.max(category);
        let next = current + controller.arbiter_delta();
        self.arbiter.set_max(category, next);

        trace!(
            %channel,
            limit = controller.limit(),
            filtered = controller.filtered_value(),
            error = controller.error(),
            output = controller.output(),
            arbiter_max_mhz = next,
            "Throttler channel applied"
        );
    }

    /// Handles a board power limit message from the control plane.
    ///
    /// `payload` must be exactly one little-endian u16 (watts). The value
    /// is capped at the firmware table's board power limit, then clamped
    /// like any other limit. The status republishes the capped value,
    /// not the clamped one. A malformed payload changes nothing.
    pub fn update_board_power_limit(&self, payload: &[u8]) -> Result<LimitOutcome> {
        if payload.len() != BOARD_POWER_PAYLOAD_LEN {
            warn!(len = payload.len(), "Rejected board power limit message");
            return Err(Error::InvalidPayloadLength {
                expected: BOARD_POWER_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let mut payload = payload;
        let requested = u32::from(payload.get_u16_le());
        info!(watts = requested, "Cable power limit");

        let capped = requested.min(self.chip_limits.board_power_limit);

        let mut state = self.state.lock();
        let outcome = Self::store_limit(&mut state, Channel::BoardPower, capped as f32);
        state.published_board_power_limit = Some(capped);
        self.publish(&state);

        Ok(outcome)
    }

    pub fn read_window_word(&self, offset: u32) -> WordRead {
        self.state.lock().window.read_word(offset)
    }

    pub fn write_window_word(&self, offset: u32, value: u32) -> WordAccess {
        self.state.lock().window.write_word(offset, value)
    }

    /// Copy of the first `len` bytes of the telemetry window.
    pub fn dump_window(&self, len: u32) -> Vec<u8> {
        self.state.lock().window.dump(len)
    }

    pub fn status(&self) -> ThrottlerStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThrottlerStatus> {
        self.status_tx.subscribe()
    }

    /// Ticks every `period` and serves control-plane commands until
    /// cancelled.
    pub async fn run(
        self: Arc<Self>,
        period: Duration,
        mut commands: mpsc::Receiver<ThrottlerCommand>,
        cancellation: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(period_ms = period.as_millis() as u64, "Throttler loop started");

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command);
                }
            }
        }

        info!("Throttler loop stopped");
    }

    fn handle_command(&self, command: ThrottlerCommand) {
        match command {
            ThrottlerCommand::SetBoardPowerLimit { payload, reply } => {
                let result = self.update_board_power_limit(&payload);
                if reply.send(result).is_err() {
                    debug!("Board power limit reply receiver dropped");
                }
            }
        }
    }
}

/// The snapshot field each channel reacts to.
fn measurement(snapshot: &TelemetrySnapshot, channel: Channel) -> f32 {
    match channel {
        Channel::Tdp => snapshot.internal.vcore_power,
        Channel::FastTdc | Channel::Tdc => snapshot.internal.vcore_current,
        Channel::Thermal => snapshot.internal.asic_temperature,
        Channel::BoardPower => snapshot.input_power,
        Channel::GddrThermal => snapshot.max_gddr_temperature,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    use test_case::test_case;
    use tokio::sync::oneshot;
    use tokio::time;

    use super::*;
    use crate::arbiter::{ArbiterCategory, InMemoryArbiter};
    use crate::sensors::InternalTelemetry;
    use crate::telemetry::{SAMPLE_STRIDE, slot_offset};
    use crate::throttler::{AICLK_SCALE_FACTOR, DEFAULT_BOARD_POWER_LIMIT};

    const INITIAL_MHZ: f32 = 1000.0;

    struct FakeTelemetry {
        snapshot: Mutex<TelemetrySnapshot>,
    }

    impl FakeTelemetry {
        fn set(&self, snapshot: TelemetrySnapshot) {
            *self.snapshot.lock() = snapshot;
        }
    }

    impl TelemetrySource for FakeTelemetry {
        fn read_internal(&self) -> InternalTelemetry {
            self.snapshot.lock().internal
        }

        fn input_power(&self) -> f32 {
            self.snapshot.lock().input_power
        }

        fn max_gddr_temperature(&self) -> f32 {
            self.snapshot.lock().max_gddr_temperature
        }
    }

    /// Advances 10 ticks of time per read.
    struct SteppingTimer {
        now: AtomicU32,
    }

    impl Timer for SteppingTimer {
        fn timestamp(&self) -> u32 {
            self.now.fetch_add(10, Ordering::Relaxed)
        }
    }

    struct Fixture {
        throttler: Arc<Throttler>,
        arbiter: Arc<InMemoryArbiter>,
        telemetry: Arc<FakeTelemetry>,
    }

    fn at_limits() -> TelemetrySnapshot {
        let chip = ChipLimits::default();
        TelemetrySnapshot {
            internal: InternalTelemetry {
                vcore_power: chip.tdp_limit as f32,
                vcore_current: chip.tdc_limit as f32,
                asic_temperature: chip.thm_limit as f32,
            },
            input_power: DEFAULT_BOARD_POWER_LIMIT,
            max_gddr_temperature: chip.gddr_thm_limit as f32,
        }
    }

    /// Built but without `init_limits`.
    fn bare_fixture(chip_limits: ChipLimits) -> Fixture {
        let arbiter = Arc::new(InMemoryArbiter::new(INITIAL_MHZ));
        let telemetry = Arc::new(FakeTelemetry {
            snapshot: Mutex::new(at_limits()),
        });
        let throttler = Arc::new(Throttler::new(ThrottlerParts {
            arbiter: arbiter.clone(),
            telemetry: telemetry.clone(),
            timer: Arc::new(SteppingTimer {
                now: AtomicU32::new(100),
            }),
            window: TelemetryWindow::in_memory(),
            chip_limits,
        }));

        Fixture {
            throttler,
            arbiter,
            telemetry,
        }
    }

    fn fixture_with(chip_limits: ChipLimits) -> Fixture {
        let f = bare_fixture(chip_limits);
        f.throttler.init_limits();
        f
    }

    fn fixture() -> Fixture {
        fixture_with(ChipLimits::default())
    }

    #[test]
    fn new_throttler_starts_at_range_minimums() {
        let f = bare_fixture(ChipLimits::default());

        let status = f.throttler.status();
        for channel in Channel::ALL {
            assert_eq!(f.throttler.limit(channel), channel.limit_range().min);
            assert_eq!(status.limits[channel], channel.limit_range().min);
        }
        assert_eq!(status.published_board_power_limit, None);
    }

    #[test]
    fn tick_before_init_keeps_arbiter_finite() {
        let f = bare_fixture(ChipLimits::default());

        f.throttler.tick();
        f.throttler.init_limits();
        f.throttler.tick();

        for channel in Channel::ALL {
            let max = f.arbiter.max(channel.arbiter_category());
            assert!(max.is_finite(), "{channel} arbiter max is {max}");
        }
    }

    #[test]
    fn init_limits_uses_firmware_table_except_board_power() {
        let f = fixture_with(ChipLimits {
            tdp_limit: 250,
            tdc_fast_limit: 700,
            tdc_limit: 280,
            thm_limit: 20,
            gddr_thm_limit: 85,
            board_power_limit: 450,
        });

        assert_eq!(f.throttler.limit(Channel::Tdp), 250.0);
        assert_eq!(f.throttler.limit(Channel::FastTdc), 500.0);
        assert_eq!(f.throttler.limit(Channel::Tdc), 280.0);
        assert_eq!(f.throttler.limit(Channel::Thermal), 50.0);
        assert_eq!(f.throttler.limit(Channel::GddrThermal), 85.0);
        assert_eq!(
            f.throttler.limit(Channel::BoardPower),
            DEFAULT_BOARD_POWER_LIMIT
        );
    }

    #[test]
    fn set_limit_reports_clamping() {
        let f = fixture();

        let outcome = f.throttler.set_limit(Channel::Thermal, 120.0);

        assert_eq!(
            outcome,
            LimitOutcome::Clamped {
                requested: 120.0,
                applied: 100.0
            }
        );
        assert_eq!(f.throttler.limit(Channel::Thermal), 100.0);
    }

    #[test]
    fn tdp_at_500_limit_gives_zero_output() {
        let f = fixture();
        f.throttler.set_limit(Channel::Tdp, 500.0);
        let mut snapshot = at_limits();
        snapshot.internal.vcore_power = 500.0;
        f.telemetry.set(snapshot);

        f.throttler.tick();

        let tdp = f.throttler.channel(Channel::Tdp);
        assert_eq!(tdp.filtered_value, 500.0);
        assert_eq!(tdp.error, 0.0);
        assert_eq!(tdp.previous_error, 0.0);
        assert_eq!(tdp.output, 0.0);
        assert_eq!(f.arbiter.max(ArbiterCategory::Tdp), INITIAL_MHZ);
    }

    #[test]
    fn tick_routes_current_to_both_tdc_channels() {
        let f = fixture();
        let mut snapshot = at_limits();
        snapshot.internal.vcore_current = 200.0;
        f.telemetry.set(snapshot);

        f.throttler.tick();

        let fast = f.throttler.channel(Channel::FastTdc);
        let slow = f.throttler.channel(Channel::Tdc);
        assert_eq!(fast.filtered_value, 200.0);
        // Tdc smooths with alpha 0.1 from a zero start.
        assert!((slow.filtered_value - 20.0).abs() < 1e-4);
    }

    #[test_case(Channel::Tdp; "tdp")]
    #[test_case(Channel::Thermal; "thermal")]
    #[test_case(Channel::BoardPower; "board power")]
    #[test_case(Channel::GddrThermal; "gddr thermal")]
    fn over_limit_lowers_arbiter_maximum(channel: Channel) {
        let f = fixture();
        let mut snapshot = at_limits();
        let limit = f.throttler.limit(channel);
        let over = limit * 1.1;
        match channel {
            Channel::Tdp => snapshot.internal.vcore_power = over,
            Channel::Thermal => snapshot.internal.asic_temperature = over,
            Channel::BoardPower => snapshot.input_power = over,
            Channel::GddrThermal => snapshot.max_gddr_temperature = over,
            Channel::FastTdc | Channel::Tdc => unreachable!(),
        }
        f.telemetry.set(snapshot);

        let report = f.throttler.tick();

        assert!(report.outputs[channel] < 0.0);
        let expected = INITIAL_MHZ + report.outputs[channel] * AICLK_SCALE_FACTOR;
        assert!((f.arbiter.max(channel.arbiter_category()) - expected).abs() < 1e-3);
        assert!(f.arbiter.max(channel.arbiter_category()) < INITIAL_MHZ);
    }

    #[test]
    fn arbiter_accumulates_output_across_ticks() {
        let f = fixture();
        let mut snapshot = at_limits();
        snapshot.internal.vcore_power = 150.0;
        f.telemetry.set(snapshot);

        // Tdp limit 300, power 150: error 0.5, output 0.1, +50 MHz per tick.
        for _ in 0..3 {
            f.throttler.tick();
        }

        assert!((f.arbiter.max(ArbiterCategory::Tdp) - (INITIAL_MHZ + 150.0)).abs() < 1e-2);
    }

    #[test]
    fn arbiter_is_applied_against_pre_tick_value() {
        let f = fixture();
        f.arbiter.set_max(ArbiterCategory::BoardPower, 640.0);
        let mut snapshot = at_limits();
        snapshot.input_power = 75.0;
        f.telemetry.set(snapshot);

        let report = f.throttler.tick();

        let expected = 640.0 + report.outputs[Channel::BoardPower] * AICLK_SCALE_FACTOR;
        assert!((f.arbiter.max(ArbiterCategory::BoardPower) - expected).abs() < 1e-3);
    }

    #[test]
    fn mirror_records_first_500_ticks_then_stops() {
        let f = fixture();

        for tick in 0..SAMPLE_CAPACITY {
            let mut snapshot = at_limits();
            snapshot.internal.vcore_power = 100.0 + tick as f32;
            f.telemetry.set(snapshot);
            assert_eq!(
                f.throttler.tick().record,
                RecordOutcome::Recorded { slot: tick }
            );
        }

        let mut previous = 0;
        for slot in 0..SAMPLE_CAPACITY {
            let offset = slot_offset(slot);
            let timestamp = f.throttler.read_window_word(offset).value;
            let tdp = f32::from_bits(f.throttler.read_window_word(offset + 4).value);
            let board = f32::from_bits(f.throttler.read_window_word(offset + 8).value);

            assert!(timestamp >= previous);
            previous = timestamp;
            assert_eq!(tdp, 100.0 + slot as f32);
            assert_eq!(board, DEFAULT_BOARD_POWER_LIMIT);
        }
        assert_eq!(slot_offset(SAMPLE_CAPACITY - 1), 5988);

        let window_before = f.throttler.dump_window(slot_offset(SAMPLE_CAPACITY) + SAMPLE_STRIDE);
        for _ in 0..5 {
            assert_eq!(f.throttler.tick().record, RecordOutcome::Saturated);
        }

        assert_eq!(f.throttler.status().samples_recorded, SAMPLE_CAPACITY);
        assert_eq!(
            f.throttler.dump_window(slot_offset(SAMPLE_CAPACITY) + SAMPLE_STRIDE),
            window_before
        );
    }

    #[test_case(&[]; "empty")]
    #[test_case(&[0xc8]; "one byte")]
    #[test_case(&[0xc8, 0x00, 0x00]; "three bytes")]
    fn malformed_board_power_message_changes_nothing(payload: &[u8]) {
        let f = fixture();

        let err = f.throttler.update_board_power_limit(payload).unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidPayloadLength { expected: 2, actual } if actual == payload.len()
        ));
        assert_eq!(
            f.throttler.limit(Channel::BoardPower),
            DEFAULT_BOARD_POWER_LIMIT
        );
    }

    #[test_case(200, 600, LimitOutcome::Applied(200.0); "within range")]
    #[test_case(550, 450, LimitOutcome::Applied(450.0); "capped by firmware ceiling")]
    #[test_case(20, 600, LimitOutcome::Clamped { requested: 20.0, applied: 50.0 }; "below range")]
    #[test_case(65535, 1000, LimitOutcome::Clamped { requested: 1000.0, applied: 600.0 }; "ceiling above range")]
    fn board_power_message_is_capped_then_clamped(
        watts: u16,
        ceiling: u32,
        expected: LimitOutcome,
    ) {
        let f = fixture_with(ChipLimits {
            board_power_limit: ceiling,
            ..ChipLimits::default()
        });

        let outcome = f
            .throttler
            .update_board_power_limit(&watts.to_le_bytes())
            .unwrap();

        assert_eq!(outcome, expected);
        assert_eq!(f.throttler.limit(Channel::BoardPower), expected.applied());
    }

    #[test]
    fn board_power_update_is_republished() {
        let f = fixture();
        let mut status = f.throttler.subscribe();

        f.throttler
            .update_board_power_limit(&300u16.to_le_bytes())
            .unwrap();

        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().board_power_limit, 300.0);
    }

    #[test_case(200, 600, 200, 200.0; "within range")]
    #[test_case(20, 600, 20, 50.0; "below range")]
    #[test_case(550, 450, 450, 450.0; "capped by firmware ceiling")]
    #[test_case(700, 1000, 700, 600.0; "above range")]
    fn board_power_status_carries_capped_request(
        watts: u16,
        ceiling: u32,
        published: u32,
        applied: f32,
    ) {
        let f = fixture_with(ChipLimits {
            board_power_limit: ceiling,
            ..ChipLimits::default()
        });

        f.throttler
            .update_board_power_limit(&watts.to_le_bytes())
            .unwrap();

        let status = f.throttler.status();
        assert_eq!(status.published_board_power_limit, Some(published));
        assert_eq!(status.board_power_limit, applied);
        assert_eq!(status.limits[Channel::BoardPower], applied);
    }

    #[test]
    fn limit_updates_never_interleave_with_ticks() {
        let f = fixture();
        let input_power = 240.0;
        let mut snapshot = at_limits();
        snapshot.input_power = input_power;
        f.telemetry.set(snapshot);

        let requests: [u16; 4] = [100, 200, 300, 20];
        let applied = [100.0, 200.0, 300.0, 50.0, DEFAULT_BOARD_POWER_LIMIT];
        let params = Channel::BoardPower.control_params();

        thread::scope(|scope| {
            scope.spawn(|| {
                for watts in requests.iter().cycle().take(2_000) {
                    f.throttler
                        .update_board_power_limit(&watts.to_le_bytes())
                        .unwrap();
                }
            });

            scope.spawn(|| {
                let status = f.throttler.subscribe();
                let mut last = 0;
                for _ in 0..10_000 {
                    let recorded = status.borrow().samples_recorded;
                    assert!(recorded >= last, "samples went from {last} to {recorded}");
                    last = recorded;
                }
            });

            let mut previous_error = 0.0f32;
            for _ in 0..1_000 {
                let report = f.throttler.tick();
                let limit = report.limits[Channel::BoardPower];
                assert!(applied.contains(&limit), "unexpected limit {limit}");

                let error = (limit - input_power) / limit;
                let expected =
                    params.p_gain * error + params.d_gain * (error - previous_error);
                assert!((report.outputs[Channel::BoardPower] - expected).abs() < 1e-5);
                previous_error = error;
            }
        });
    }

    #[test]
    fn replaying_inputs_reproduces_outputs() {
        let inputs = [120.0, 280.0, 310.0, 295.0, 400.0, 260.0];
        let run = || {
            let f = fixture();
            inputs
                .iter()
                .map(|&power| {
                    let mut snapshot = at_limits();
                    snapshot.internal.vcore_power = power;
                    snapshot.input_power = power * 1.3;
                    f.telemetry.set(snapshot);
                    f.throttler.tick().outputs
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn reset_controllers_keeps_limits() {
        let f = fixture();
        let mut snapshot = at_limits();
        snapshot.internal.vcore_power = 450.0;
        f.telemetry.set(snapshot);
        f.throttler.tick();

        f.throttler.reset_controllers();

        let tdp = f.throttler.channel(Channel::Tdp);
        assert_eq!(tdp.limit, 300.0);
        assert_eq!(tdp.filtered_value, 0.0);
        assert_eq!(tdp.output, 0.0);
    }

    #[test]
    fn window_accessor_is_exposed() {
        let f = fixture();

        assert_eq!(f.throttler.write_window_word(0x100, 42), WordAccess::Ok);
        assert_eq!(f.throttler.read_window_word(0x100).value, 42);
        assert_eq!(
            f.throttler.write_window_word(0x101, 7),
            WordAccess::Misaligned
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_and_serves_limit_commands() {
        let f = fixture();
        let (command_tx, command_rx) = mpsc::channel(4);
        let cancellation = CancellationToken::new();
        let handle = tokio::spawn(f.throttler.clone().run(
            Duration::from_millis(10),
            command_rx,
            cancellation.clone(),
        ));

        let (reply_tx, reply_rx) = oneshot::channel();
        command_tx
            .send(ThrottlerCommand::SetBoardPowerLimit {
                payload: 250u16.to_le_bytes().to_vec(),
                reply: reply_tx,
            })
            .await
            .unwrap();
        assert_eq!(reply_rx.await.unwrap().unwrap(), LimitOutcome::Applied(250.0));

        time::sleep(Duration::from_millis(55)).await;
        cancellation.cancel();
        handle.await.unwrap();

        assert_eq!(f.throttler.limit(Channel::BoardPower), 250.0);
        assert!(f.throttler.status().samples_recorded >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn run_replies_with_error_for_malformed_command() {
        let f = fixture();
        let (command_tx, command_rx) = mpsc::channel(4);
        let cancellation = CancellationToken::new();
        let handle = tokio::spawn(f.throttler.clone().run(
            Duration::from_millis(10),
            command_rx,
            cancellation.clone(),
        ));

        let (reply_tx, reply_rx) = oneshot::channel();
        command_tx
            .send(ThrottlerCommand::SetBoardPowerLimit {
                payload: vec![1, 2, 3],
                reply: reply_tx,
            })
            .await
            .unwrap();
        let result = reply_rx.await.unwrap();

        cancellation.cancel();
        handle.await.unwrap();

        assert_eq!(crate::error::status_code(&result), -1);
        assert_eq!(
            f.throttler.limit(Channel::BoardPower),
            DEFAULT_BOARD_POWER_LIMIT
        );
    }
}
