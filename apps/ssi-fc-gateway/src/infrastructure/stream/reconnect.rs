//! Reconnection Policy
//!
//! Exponential backoff with jitter between stream reconnect attempts, with
//! an optional attempt budget. The budget is counted per outage: a
//! successful reconnect resets it.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::StreamSettings;

/// Jitter applied when built from stream settings (±10%).
const DEFAULT_JITTER: f64 = 0.1;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt of an outage.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay.
    pub jitter_factor: f64,
    /// Attempts allowed per outage (0 = unlimited).
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Build from stream settings.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: DEFAULT_JITTER,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from_stream_settings(&StreamSettings::default())
    }
}

/// Tracks attempts within one outage and hands out delays.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    next_base: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy at the start of an outage.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let next_base = config.initial_delay;
        Self {
            config,
            next_base,
            attempts: 0,
        }
    }

    /// Take the delay before the next attempt.
    ///
    /// Returns `None` once the attempt budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempts += 1;

        let delay = jitter(self.next_base, self.config.jitter_factor);
        self.next_base = grow(self.next_base, self.config.multiplier).min(self.config.max_delay);
        Some(delay)
    }

    /// Start a new outage after a successful connection.
    pub const fn reset(&mut self) {
        self.next_base = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts made in the current outage.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Check whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }
}

fn grow(delay: Duration, multiplier: f64) -> Duration {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return delay;
    }
    Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier).unwrap_or(Duration::MAX)
}

fn jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = delay.as_secs_f64() * factor;
    let offset: f64 = rand::rng().random_range(-spread..=spread);
    Duration::try_from_secs_f64((delay.as_secs_f64() + offset).max(0.001)).unwrap_or(delay)
}
