use tracing::debug;

/// Caller-supplied progress sink, receives a percentage in [0, 100]
pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// Turns tick times into monotonic percentages for the caller.
///
/// Once closed (completion or failure) the callback is dropped and never
/// invoked again.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    total_duration: f64,
    last: f64,
}

impl ProgressReporter {
    pub fn new(total_duration: f64, callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            total_duration,
            last: 0.0,
        }
    }

    /// Percentage for timeline time `t`, clamped and never below the last report
    pub fn percent_at(&self, t: f64) -> f64 {
        let raw = if self.total_duration > 0.0 {
            t / self.total_duration * 100.0
        } else {
            100.0
        };
        raw.clamp(0.0, 100.0).max(self.last)
    }

    pub fn report(&mut self, t: f64) {
        let percent = self.percent_at(t);
        self.last = percent;
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn close(&mut self) {
        if self.callback.take().is_some() {
            debug!("Progress closed at {:.1}%", self.last);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.callback.is_none()
    }
}
