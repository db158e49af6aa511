//! Bulb state machine: power, brightness, and the rules that couple them.
//!
//! `BulbController` is a plain struct with no timers, threads, or I/O. Every
//! command mutates the state synchronously and returns a `StateSnapshot`.
//! Periodic behavior (runtime metering, auto-cycle) arrives as explicit
//! `tick` calls from whoever owns the controller.
//!
//! ## Rust concepts
//! - `&mut self` methods as the only way to mutate state
//! - `Copy` snapshots handed out by value
//! - `#[serde(rename_all = "camelCase")]` for the JSON shape a browser expects
//! - `i64::clamp` for total input handling

use crate::ResetPolicy;
use crate::auto_cycle::AutoCycle;
use crate::persistence::PersistedBulb;
use serde::Serialize;

// ── Constants ────────────────────────────────────────────────────────

pub const MIN_BRIGHTNESS: u8 = 10;
pub const MAX_BRIGHTNESS: u8 = 100;
pub const DEFAULT_BRIGHTNESS: u8 = 50;

/// Turning on never lands below this level.
pub const MIN_ON_BRIGHTNESS: u8 = 30;

/// Rated wattage at full brightness.
pub const RATED_WATTS: f64 = 14.0;

/// Reported temperature of an idle bulb, in Fahrenheit.
pub const AMBIENT_TEMPERATURE_F: i32 = 72;

/// Temperature rise at full brightness, in Fahrenheit.
pub const MAX_TEMPERATURE_RISE_F: f64 = 15.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

// ── Derived quantities ───────────────────────────────────────────────

/// Clamp any integer into the valid brightness range.
pub fn clamp_brightness(value: i64) -> u8 {
    value.clamp(MIN_BRIGHTNESS as i64, MAX_BRIGHTNESS as i64) as u8
}

/// Round to `places` decimal places, halves away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Instantaneous power draw in watts, rounded to one decimal place.
pub fn power_draw_watts(is_on: bool, brightness: u8) -> f64 {
    if !is_on {
        return 0.0;
    }
    round_to(RATED_WATTS * brightness as f64 / 100.0, 1)
}

/// Simulated bulb temperature in whole degrees Fahrenheit.
pub fn temperature_f(is_on: bool, brightness: u8) -> i32 {
    if !is_on {
        return AMBIENT_TEMPERATURE_F;
    }
    AMBIENT_TEMPERATURE_F + (brightness as f64 / 100.0 * MAX_TEMPERATURE_RISE_F).round() as i32
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// Fade hint for the presentation layer, set by the last power toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    PowerOn,
    PowerOff,
}

/// Immutable readout of the bulb plus derived display quantities.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub is_on: bool,
    /// Brightness percentage (10-100)
    pub brightness: u8,
    /// Seconds spent switched on this session
    pub runtime_seconds: u64,
    /// Energy used, rounded to two decimal places
    pub total_energy_watt_hours: f64,
    pub power_draw_watts: f64,
    pub temperature_f: i32,
    pub auto_cycle_active: bool,
    /// Hint from the most recent power toggle, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    /// Increments on every state change; unchanged for no-op commands
    pub revision: u64,
}

// ── State ────────────────────────────────────────────────────────────

/// The bulb's mutable record.
///
/// Energy is kept at full precision and only rounded when read, so
/// one-second ticks at low wattage still add up over time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BulbState {
    pub is_on: bool,
    pub brightness: u8,
    pub runtime_seconds: u64,
    pub energy_watt_hours: f64,
    pub auto_cycle_active: bool,
}

impl BulbState {
    pub fn power_draw_watts(&self) -> f64 {
        power_draw_watts(self.is_on, self.brightness)
    }

    pub fn temperature_f(&self) -> i32 {
        temperature_f(self.is_on, self.brightness)
    }

    pub fn total_energy_watt_hours(&self) -> f64 {
        round_to(self.energy_watt_hours, 2)
    }
}

impl Default for BulbState {
    fn default() -> Self {
        Self {
            is_on: false,
            brightness: DEFAULT_BRIGHTNESS,
            runtime_seconds: 0,
            energy_watt_hours: 0.0,
            auto_cycle_active: false,
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────

/// Owns a `BulbState` and enforces the power/brightness coupling rules.
///
/// # Rust concept: exclusive ownership
/// Nothing outside this struct can reach the state mutably. Callers that
/// need to share a bulb across threads hand the controller to one owner and
/// talk to it through messages (see `runtime`).
#[derive(Debug)]
pub struct BulbController {
    state: BulbState,
    cycle: AutoCycle,
    transition: Option<Transition>,
    reset_policy: ResetPolicy,
    revision: u64,
}

impl BulbController {
    pub fn new(reset_policy: ResetPolicy) -> Self {
        Self::with_state(BulbState::default(), reset_policy)
    }

    /// Start from a persisted record. Runtime always starts at zero.
    pub fn restore(record: PersistedBulb, reset_policy: ResetPolicy) -> Self {
        let record = record.sanitized();
        let state = BulbState {
            is_on: record.is_on,
            brightness: clamp_brightness(record.brightness),
            energy_watt_hours: record.total_energy_watt_hours,
            ..BulbState::default()
        };
        Self::with_state(state, reset_policy)
    }

    fn with_state(state: BulbState, reset_policy: ResetPolicy) -> Self {
        Self {
            state,
            cycle: AutoCycle::new(),
            transition: None,
            reset_policy,
            revision: 0,
        }
    }

    pub fn state(&self) -> &BulbState {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            is_on: self.state.is_on,
            brightness: self.state.brightness,
            runtime_seconds: self.state.runtime_seconds,
            total_energy_watt_hours: self.state.total_energy_watt_hours(),
            power_draw_watts: self.state.power_draw_watts(),
            temperature_f: self.state.temperature_f(),
            auto_cycle_active: self.state.auto_cycle_active,
            transition: self.transition,
            revision: self.revision,
        }
    }

    /// The subset of state that survives a restart.
    pub fn persisted(&self) -> PersistedBulb {
        PersistedBulb {
            is_on: self.state.is_on,
            brightness: self.state.brightness as i64,
            total_energy_watt_hours: self.state.total_energy_watt_hours(),
        }
    }

    pub fn toggle_power(&mut self) -> StateSnapshot {
        if self.state.is_on {
            self.state.is_on = false;
            self.transition = Some(Transition::PowerOff);
        } else {
            self.state.is_on = true;
            self.state.brightness = self.state.brightness.max(MIN_ON_BRIGHTNESS);
            self.transition = Some(Transition::PowerOn);
        }
        self.revision += 1;
        tracing::debug!(
            is_on = self.state.is_on,
            brightness = self.state.brightness,
            "power toggled"
        );
        self.snapshot()
    }

    /// Set brightness, clamped to 10-100. A value equal to the current
    /// brightness (after clamping) changes nothing, not even the revision.
    pub fn set_brightness(&mut self, value: i64) -> StateSnapshot {
        let brightness = clamp_brightness(value);
        if brightness == self.state.brightness {
            return self.snapshot();
        }

        self.state.brightness = brightness;
        if !self.state.is_on && brightness >= MIN_ON_BRIGHTNESS {
            self.state.is_on = true;
            tracing::debug!(brightness, "brightness powered the bulb on");
        }
        self.revision += 1;
        self.snapshot()
    }

    pub fn reset_to_default(&mut self) -> StateSnapshot {
        self.stop_auto_cycle();
        self.state.is_on = false;
        self.state.brightness = DEFAULT_BRIGHTNESS;
        if self.reset_policy.clear_energy {
            self.state.energy_watt_hours = 0.0;
        }
        if self.reset_policy.clear_runtime {
            self.state.runtime_seconds = 0;
        }
        self.transition = None;
        self.revision += 1;
        tracing::debug!(policy = ?self.reset_policy, "bulb reset to defaults");
        self.snapshot()
    }

    pub fn start_auto_cycle(&mut self) -> StateSnapshot {
        if !self.state.auto_cycle_active {
            self.cycle = AutoCycle::new();
            self.state.auto_cycle_active = true;
            self.revision += 1;
        }
        self.snapshot()
    }

    /// Safe to call when no cycle is running.
    pub fn stop_auto_cycle(&mut self) -> StateSnapshot {
        if self.state.auto_cycle_active {
            self.state.auto_cycle_active = false;
            self.revision += 1;
        }
        self.snapshot()
    }

    /// Advance the auto-cycle by one step. Does nothing while inactive.
    pub fn auto_cycle_tick(&mut self) -> StateSnapshot {
        if !self.state.auto_cycle_active {
            return self.snapshot();
        }
        let next = self.cycle.next_brightness(self.state.brightness);
        self.set_brightness(next as i64)
    }

    /// Meter runtime and energy for `elapsed_seconds` of wall time.
    pub fn tick(&mut self, elapsed_seconds: u64) -> StateSnapshot {
        if !self.state.is_on || elapsed_seconds == 0 {
            return self.snapshot();
        }
        self.state.runtime_seconds = self.state.runtime_seconds.saturating_add(elapsed_seconds);
        self.state.energy_watt_hours +=
            self.state.power_draw_watts() * (elapsed_seconds as f64 / SECONDS_PER_HOUR);
        self.revision += 1;
        self.snapshot()
    }
}

impl Default for BulbController {
    fn default() -> Self {
        Self::new(ResetPolicy::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
