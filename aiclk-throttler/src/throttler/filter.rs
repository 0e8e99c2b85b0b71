/// Exponential moving average over raw channel measurements.
///
/// `value ← alpha·raw + (1 − alpha)·value`. With `alpha = 1.0` the filter
/// is a passthrough and keeps no history.
#[derive(Debug, Clone)]
pub struct ExponentialFilter {
    alpha: f32,
    value: f32,
}

impl ExponentialFilter {
    /// Creates a filter with weight `alpha` for the newest sample and a
    /// starting value of zero.
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: 0.0 }
    }

    /// Folds `raw` into the average and returns the new filtered value.
    pub fn consider(&mut self, raw: f32) -> f32 {
        self.value = self.alpha * raw + (1.0 - self.alpha) * self.value;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
