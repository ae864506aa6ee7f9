//! Exponential-backoff readiness probing for rendering workers.
//!
//! A freshly launched worker takes a while to load its data set and open
//! its listening socket; the provisioner keeps probing with increasing
//! delays until the worker answers, the worker dies, or the session's
//! provisioning budget runs out.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Delay before the first probe.
    pub initial_delay: Duration,
    /// Upper bound on the delay between probes.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each unanswered probe.
    pub multiplier: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ProbeConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ProbeConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = ProbeConfig::default();
        let d = next_delay(Duration::from_millis(250), &config);
        assert_eq!(d, Duration::from_millis(500));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = ProbeConfig {
            max_delay: Duration::from_secs(2),
            ..Default::default()
        };
        let d = next_delay(Duration::from_millis(1500), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_already_at_max() {
        let config = ProbeConfig::default();
        let d = next_delay(Duration::from_secs(5), &config);
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = ProbeConfig::default();
        let mut delay = config.initial_delay;
        let expected_ms = [250, 500, 1000, 2000, 4000, 5000, 5000];

        for &expected in &expected_ms {
            assert_eq!(delay.as_millis() as u64, expected);
            delay = next_delay(delay, &config);
        }
    }
}
