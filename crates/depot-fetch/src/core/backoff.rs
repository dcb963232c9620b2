use std::time::Duration;

/// Delay inserted before a retry.
///
/// The first attempt (index 0) never waits. The default is quadratic in the
/// attempt index with a one second unit: 0s, 1s, 4s, 9s, ... which keeps the
/// first retry fast and backs off hard from a mirror that keeps failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Fixed(Duration),
    /// `unit * attempt²`
    Quadratic { unit: Duration },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Quadratic {
            unit: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Quadratic { unit } => unit.saturating_mul(attempt.saturating_mul(attempt)),
        }
    }
}
