use std::time::Duration;

use rand::Rng;

/// Delay between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    Fixed(Duration),
    /// Uniformly drawn from `[min, max]` before every sleep
    Jittered { min: Duration, max: Duration },
}

impl PollInterval {
    pub fn next_delay(&self) -> Duration {
        match *self {
            PollInterval::Fixed(delay) => delay,
            PollInterval::Jittered { min, max } if max <= min => min,
            PollInterval::Jittered { min, max } => rand::thread_rng().gen_range(min..=max),
        }
    }
}
