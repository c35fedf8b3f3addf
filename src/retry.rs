use crate::config::RetrySettings;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Gas multiplier applied on each retry of a contract call.
    pub gas_increment: f64,
    /// Gas multiplier applied on each retry of a plain value transfer.
    pub transfer_gas_increment: f64,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, jitter_min: Duration, jitter_max: Duration) -> Self {
        Self {
            max_retries,
            jitter_min,
            jitter_max,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            gas_increment: settings.gas_increment,
            transfer_gas_increment: settings.transfer_gas_increment,
            jitter_min: Duration::from_secs(settings.jitter_min_seconds),
            jitter_max: Duration::from_secs(settings.jitter_max_seconds),
        }
    }

    pub fn with_increments(mut self, gas_increment: f64, transfer_gas_increment: f64) -> Self {
        self.gas_increment = gas_increment;
        self.transfer_gas_increment = transfer_gas_increment;
        self
    }

    /// Total attempts allowed for one logical submission.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before the next attempt: uniform in `[jitter_min, jitter_max]`.
    pub fn jitter_delay(&self) -> Duration {
        random_between(self.jitter_min, self.jitter_max)
    }
}

/// Uniform random duration in `[min, max]`, millisecond resolution.
pub fn random_between(min: Duration, max: Duration) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    if max_ms <= min_ms {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}
