//! Simulated dimmable light bulb.
//!
//! The crate is split the same way the running service is:
//! - `bulb`: the pure state machine (power, brightness, metering)
//! - `auto_cycle`: the triangle-wave brightness sweep
//! - `persistence`: saving and restoring the durable subset
//! - `runtime`: the single thread that owns a bulb and drives its timers
//! - `server`: the HTTP/WebSocket surface a browser page talks to
//!
//! Configuration types shared by all of them live here.

pub mod auto_cycle;
pub mod bulb;
pub mod persistence;
pub mod runtime;
pub mod server;

use std::time::Duration;

// ── Reset policy ───────────────────────────────────────────────────

/// What `reset_to_default` clears besides power and brightness.
///
/// Both counters are kept unless asked otherwise, so a reset behaves like
/// flipping the wall switch rather than swapping the bulb.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResetPolicy {
    pub clear_energy: bool,
    pub clear_runtime: bool,
}

// ── Bulb configuration ─────────────────────────────────────────────

/// Timing and reset settings for one simulated bulb.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheap to hand to a thread by value. There is no
/// hidden global state: every bulb gets its own config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulbConfig {
    /// How often runtime and energy are metered
    pub runtime_tick: Duration,
    /// How often auto-cycle moves brightness one step
    pub auto_cycle_interval: Duration,
    pub reset: ResetPolicy,
}

impl BulbConfig {
    pub fn new(auto_cycle_interval: Duration, reset: ResetPolicy) -> Self {
        Self {
            auto_cycle_interval,
            reset,
            ..Self::default()
        }
    }

    /// Whole seconds metered per runtime tick (never zero).
    pub fn runtime_tick_seconds(&self) -> u64 {
        self.runtime_tick.as_secs().max(1)
    }
}

impl Default for BulbConfig {
    fn default() -> Self {
        Self {
            runtime_tick: Duration::from_secs(1),
            auto_cycle_interval: Duration::from_secs(1),
            reset: ResetPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn default_config_ticks_every_second() {
        let config = BulbConfig::default();
        assert_eq!(config.runtime_tick, Duration::from_secs(1));
        assert_eq!(config.auto_cycle_interval, Duration::from_secs(1));
        assert_eq!(config.reset, ResetPolicy::default());
    }

    #[test]
    fn default_reset_policy_keeps_counters() {
        let policy = ResetPolicy::default();
        assert!(!policy.clear_energy);
        assert!(!policy.clear_runtime);
    }

    #[rstest]
    #[case(Duration::from_millis(10), 1)]
    #[case(Duration::from_secs(1), 1)]
    #[case(Duration::from_secs(5), 5)]
    fn test_runtime_tick_seconds(#[case] tick: Duration, #[case] expected: u64) {
        let config = BulbConfig {
            runtime_tick: tick,
            ..BulbConfig::default()
        };
        assert_eq!(config.runtime_tick_seconds(), expected);
    }

    #[test]
    fn new_keeps_default_runtime_tick() {
        let config = BulbConfig::new(Duration::from_millis(250), ResetPolicy::default());
        assert_eq!(config.auto_cycle_interval, Duration::from_millis(250));
        assert_eq!(config.runtime_tick, Duration::from_secs(1));
    }
}
