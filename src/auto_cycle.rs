//! Triangle-wave brightness generator for auto-cycle mode.
//!
//! The generator only remembers which way it is heading. The next value is
//! always computed from the bulb's *current* brightness, so a manual
//! brightness change mid-cycle is picked up on the next tick.

use crate::bulb::{MAX_BRIGHTNESS, MIN_BRIGHTNESS};

/// Brightness change per auto-cycle tick.
pub const AUTO_CYCLE_STEP: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoCycle {
    direction: Direction,
}

impl AutoCycle {
    /// A fresh cycle always starts climbing.
    pub fn new() -> Self {
        Self {
            direction: Direction::Up,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Step away from `current`, bouncing off the brightness limits.
    pub fn next_brightness(&mut self, current: u8) -> u8 {
        // Already at a limit: turn around before stepping, so every tick moves.
        if current >= MAX_BRIGHTNESS {
            self.direction = Direction::Down;
        } else if current <= MIN_BRIGHTNESS {
            self.direction = Direction::Up;
        }

        let next = match self.direction {
            Direction::Up => current.saturating_add(AUTO_CYCLE_STEP),
            Direction::Down => current.saturating_sub(AUTO_CYCLE_STEP),
        };

        if next >= MAX_BRIGHTNESS {
            self.direction = Direction::Down;
            MAX_BRIGHTNESS
        } else if next <= MIN_BRIGHTNESS {
            self.direction = Direction::Up;
            MIN_BRIGHTNESS
        } else {
            next
        }
    }
}

impl Default for AutoCycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sweep(start: u8, ticks: usize) -> Vec<u8> {
        let mut cycle = AutoCycle::new();
        let mut current = start;
        (0..ticks)
            .map(|_| {
                current = cycle.next_brightness(current);
                current
            })
            .collect()
    }

    #[test]
    fn from_95_clamps_at_the_top_then_falls() {
        assert_eq!(
            sweep(95, 11),
            vec![100, 90, 80, 70, 60, 50, 40, 30, 20, 10, 20]
        );
    }

    #[test]
    fn from_the_top_the_first_step_goes_down() {
        assert_eq!(sweep(100, 4), vec![90, 80, 70, 60]);
    }

    #[test]
    fn from_the_bottom_the_first_step_goes_up() {
        let mut cycle = AutoCycle {
            direction: Direction::Down,
        };
        assert_eq!(cycle.next_brightness(10), 20);
        assert_eq!(cycle.direction(), Direction::Up);
    }

    #[test]
    fn full_period_returns_to_the_top() {
        let values = sweep(10, 18);
        assert_eq!(values[8], 100);
        assert_eq!(values[17], 10);
    }

    #[rstest]
    #[case(100, Direction::Down)]
    #[case(95, Direction::Down)]
    #[case(50, Direction::Up)]
    fn direction_after_one_step(#[case] start: u8, #[case] expected: Direction) {
        let mut cycle = AutoCycle::new();
        cycle.next_brightness(start);
        assert_eq!(cycle.direction(), expected);
    }

    #[rstest]
    #[case(10)]
    #[case(13)]
    #[case(57)]
    #[case(99)]
    #[case(100)]
    fn never_leaves_the_valid_range(#[case] start: u8) {
        for value in sweep(start, 200) {
            assert!((MIN_BRIGHTNESS..=MAX_BRIGHTNESS).contains(&value), "{value}");
        }
    }

    #[test]
    fn follows_external_brightness_changes() {
        let mut cycle = AutoCycle::new();
        assert_eq!(cycle.next_brightness(40), 50);
        // someone moved the slider to 75 between ticks
        assert_eq!(cycle.next_brightness(75), 85);
    }
}
