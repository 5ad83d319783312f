//! Monotone progress reporting.

/// Wraps an optional progress callback, guaranteeing reported fractions are
/// non-decreasing, clamped to `[0, 1]`, and end on exactly 1.0.
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a (dyn Fn(f64) + Send + Sync)>,
    last_reported: f64,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(callback: Option<&'a (dyn Fn(f64) + Send + Sync)>) -> Self {
        ProgressReporter {
            callback,
            last_reported: 0.0,
        }
    }

    /// Reports `fraction`, skipping the call if it would move backwards.
    pub(crate) fn report(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < self.last_reported {
            return;
        }
        self.last_reported = fraction;
        if let Some(callback) = self.callback {
            callback(fraction);
        }
    }

    /// Reports completion as exactly 1.0.
    pub(crate) fn finish(&mut self) {
        self.report(1.0);
    }
}
