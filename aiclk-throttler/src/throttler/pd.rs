use super::channel::ControlParams;
use super::filter::ExponentialFilter;

/// MHz of arbiter adjustment per unit of controller output.
pub const AICLK_SCALE_FACTOR: f32 = 500.0;

/// Smoothing filter plus PD feedback for one channel.
///
/// Error is normalized to the limit: positive means headroom, negative
/// means the channel is over its limit. There is no integral term; the
/// arbiter maximum the output is added to accumulates instead.
#[derive(Debug, Clone)]
pub struct ChannelController {
    params: ControlParams,
    filter: ExponentialFilter,
    limit: f32,
    error: f32,
    previous_error: f32,
    output: f32,
}

impl ChannelController {
    /// `limit` must already be clamped into the channel's range.
    pub fn new(params: ControlParams, limit: f32) -> Self {
        Self {
            params,
            filter: ExponentialFilter::new(params.alpha),
            limit,
            error: 0.0,
            previous_error: 0.0,
            output: 0.0,
        }
    }

    /// Runs one control step on `raw` and returns the new output.
    ///
    /// The limit must be non-zero; the throttler only stores clamped
    /// limits, whose ranges all have positive minimums.
    pub fn update(&mut self, raw: f32) -> f32 {
        let filtered = self.filter.consider(raw);
        self.error = (self.limit - filtered) / self.limit;
        self.output = self.params.p_gain * self.error
            + self.params.d_gain * (self.error - self.previous_error);
        self.previous_error = self.error;
        self.output
    }

    /// Adjustment (MHz) to add to the arbiter maximum for this output.
    pub fn arbiter_delta(&self) -> f32 {
        self.output * AICLK_SCALE_FACTOR
    }

    /// Stores an already-clamped limit.
    pub(super) fn set_limit(&mut self, limit: f32) {
        self.limit = limit;
    }

    /// Clears filter history and error terms. The limit is kept.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.error = 0.0;
        self.previous_error = 0.0;
        self.output = 0.0;
    }

    pub fn limit(&self) -> f32 {
        self.limit
    }

    pub fn filtered_value(&self) -> f32 {
        self.filter.value()
    }

    pub fn error(&self) -> f32 {
        self.error
    }

    pub fn previous_error(&self) -> f32 {
        self.previous_error
    }

    pub fn output(&self) -> f32 {
        self.output
    }
}
