//! Duty-Cycle Deadline Computation
//!
//! ## Overview
//!
//! The heart of the scheduler: given the current epoch time and a
//! `(period, active_window)` configuration, decide whether the node is inside
//! its active window or its sleep window and compute the next wake deadline.
//!
//! Each period of `P` seconds opens with an active window of `G` seconds:
//!
//! ```text
//! period boundary                                period boundary
//!   │←──────── active (G) ────────→│←─── sleep (P - G) ───→│
//!   ├────────────────────────────────────────────────────────┤
//!   0                              G                         P
//! ```
//!
//! [`tick`] is a pure function (no clock reads, no side effects), so every
//! boundary case is unit-testable without hardware. The surrounding
//! [`DutyCycleScheduler`](crate::scheduler::DutyCycleScheduler) owns all the
//! side effects (alarm arming, power transitions).
//!
//! ## Deadline invariants
//!
//! For every valid config and every `now`:
//! - the returned deadline is strictly in the future, and
//! - it is aligned to either the end of the current active window or the next
//!   period boundary.
//!
//! The `phase == active_window` instant and `active_window == 0` configs both
//! take the sleep branch, where `period - phase >= 1` keeps the deadline
//! strict.

use crate::errors::{SchedulerError, SchedulerResult};
use crate::time::Epoch;

/// Duty-cycle configuration, immutable for the scheduler's lifetime
///
/// Deployed nodes run a range of `(period, active_window)` pairs (20/10,
/// 70/60, 120/60, 360/60), so both values are parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DutyCycleConfig {
    period: u32,
    active_window: u32,
    sleep_mode: u8,
    active_hold: Option<u8>,
}

impl DutyCycleConfig {
    /// Default power mode entered for the sleep interval
    pub const DEFAULT_SLEEP_MODE: u8 = 1;

    /// Validate and build a config
    ///
    /// Requires `period > 0` and `active_window < period`. Both fields are
    /// unsigned, so negative values are unrepresentable.
    pub fn new(period: u32, active_window: u32) -> SchedulerResult<Self> {
        if period == 0 {
            return Err(SchedulerError::ZeroPeriod);
        }
        if active_window >= period {
            return Err(SchedulerError::WindowExceedsPeriod { period, active_window });
        }
        Ok(Self {
            period,
            active_window,
            sleep_mode: Self::DEFAULT_SLEEP_MODE,
            active_hold: None,
        })
    }

    /// Power mode to enter for the sleep interval
    pub fn with_sleep_mode(mut self, mode: u8) -> Self {
        self.sleep_mode = mode;
        self
    }

    /// Hold power mode `mode` blocked while the active window is open
    ///
    /// Some fleets keep the radio powered for the whole active window, some
    /// do not; this is that knob. The hold is released by the alarm callback
    /// when the window closes.
    pub fn with_active_hold(mut self, mode: u8) -> Self {
        self.active_hold = Some(mode);
        self
    }

    /// Cycle period in seconds
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Active window at the start of each period, in seconds
    pub fn active_window(&self) -> u32 {
        self.active_window
    }

    /// Power mode entered for the sleep interval
    pub fn sleep_mode(&self) -> u8 {
        self.sleep_mode
    }

    /// Power mode held blocked while the active window is open, if any
    pub fn active_hold(&self) -> Option<u8> {
        self.active_hold
    }

    /// Fraction of each period spent active
    pub fn duty_cycle(&self) -> f32 {
        self.active_window as f32 / self.period as f32
    }
}

/// What the main loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Decision {
    /// Inside the active window: keep running for `remaining` seconds, then
    /// arm an alarm for `deadline` (the end of the window) and enter low
    /// power
    StayActive {
        /// Seconds still owed in the active window
        remaining: u32,
        /// End of the current active window
        deadline: Epoch,
    },
    /// Inside the sleep window: arm an alarm for `deadline` (the next period
    /// boundary) immediately and enter low power
    EnterSleep {
        /// Start of the next period
        deadline: Epoch,
    },
}

impl Decision {
    /// The wake deadline, whichever branch was taken
    pub fn deadline(&self) -> Epoch {
        match *self {
            Decision::StayActive { deadline, .. } | Decision::EnterSleep { deadline } => deadline,
        }
    }
}

/// Decide the next wake deadline from the current time
///
/// Pure function of its inputs; calling it twice with the same arguments
/// yields the same decision.
pub fn tick(now: Epoch, cfg: &DutyCycleConfig) -> Decision {
    let period = Epoch::from(cfg.period);
    let window = Epoch::from(cfg.active_window);
    let phase = now % period;

    if phase < window {
        Decision::StayActive {
            remaining: (window - phase) as u32,
            deadline: now - phase + window,
        }
    } else {
        // phase == window and window == 0 both land here; period - phase is
        // at least 1 because phase < period
        Decision::EnterSleep {
            deadline: now + (period - phase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg(period: u32, window: u32) -> DutyCycleConfig {
        DutyCycleConfig::new(period, window).unwrap()
    }

    #[test]
    fn rejects_zero_period() {
        assert_eq!(DutyCycleConfig::new(0, 0), Err(SchedulerError::ZeroPeriod));
    }

    #[test]
    fn rejects_window_at_or_over_period() {
        assert_eq!(
            DutyCycleConfig::new(20, 20),
            Err(SchedulerError::WindowExceedsPeriod { period: 20, active_window: 20 })
        );
        assert_eq!(
            DutyCycleConfig::new(20, 21),
            Err(SchedulerError::WindowExceedsPeriod { period: 20, active_window: 21 })
        );
    }

    #[test]
    fn mid_window_stays_active() {
        // period=20, window=10, phase=5
        let t = 3 * 20 + 5;
        assert_eq!(
            tick(t, &cfg(20, 10)),
            Decision::StayActive { remaining: 5, deadline: t + 5 }
        );
    }

    #[test]
    fn past_window_enters_sleep() {
        // period=20, window=10, phase=15 -> 5s to the next boundary
        let t = 7 * 20 + 15;
        assert_eq!(tick(t, &cfg(20, 10)), Decision::EnterSleep { deadline: t + 5 });
    }

    #[test]
    fn long_period_mid_window() {
        // period=360, window=60, phase=40
        let t = 11 * 360 + 40;
        assert_eq!(
            tick(t, &cfg(360, 60)),
            Decision::StayActive { remaining: 20, deadline: t + 20 }
        );
    }

    #[test]
    fn short_sleep_tail() {
        // period=70, window=60, phase=65 -> 5s to the next boundary
        let t = 4 * 70 + 65;
        assert_eq!(tick(t, &cfg(70, 60)), Decision::EnterSleep { deadline: t + 5 });
    }

    #[test]
    fn window_close_boundary_sleeps() {
        // phase == active_window belongs to the sleep branch
        let t = 5 * 20 + 10;
        assert_eq!(tick(t, &cfg(20, 10)), Decision::EnterSleep { deadline: t + 10 });
    }

    #[test]
    fn zero_window_always_sleeps() {
        let c = cfg(20, 0);
        for t in [0u64, 1, 19, 20, 39] {
            match tick(t, &c) {
                Decision::EnterSleep { deadline } => assert!(deadline > t),
                other => panic!("expected sleep, got {other:?}"),
            }
        }
    }

    #[test]
    fn tick_is_pure() {
        let c = cfg(120, 60);
        assert_eq!(tick(1234, &c), tick(1234, &c));
    }

    #[test]
    fn repeated_ticks_reproduce_the_cycle() {
        // Advancing now to each returned deadline must alternate G active
        // seconds with P - G asleep, indefinitely
        let c = cfg(20, 10);
        let mut now: Epoch = 40; // period boundary, window open

        for _ in 0..50 {
            match tick(now, &c) {
                Decision::StayActive { remaining, deadline } => {
                    assert_eq!(remaining, 10);
                    assert_eq!(deadline, now + 10);
                    now = deadline;
                }
                other => panic!("expected active window at {now}, got {other:?}"),
            }
            match tick(now, &c) {
                Decision::EnterSleep { deadline } => {
                    assert_eq!(deadline, now + 10);
                    now = deadline;
                }
                other => panic!("expected sleep window at {now}, got {other:?}"),
            }
        }
    }

    #[test]
    fn duty_cycle_ratio() {
        assert_eq!(cfg(20, 10).duty_cycle(), 0.5);
        assert_eq!(cfg(360, 60).duty_cycle(), 60.0 / 360.0);
    }

    proptest! {
        #[test]
        fn deadline_is_strictly_future(
            period in 1u32..100_000,
            window_frac in 0u32..100_000,
            now in 0u64..1_000_000_000,
        ) {
            let window = window_frac % period;
            let c = cfg(period, window);
            prop_assert!(tick(now, &c).deadline() > now);
        }

        #[test]
        fn deadline_is_aligned(
            period in 1u32..100_000,
            window_frac in 0u32..100_000,
            now in 0u64..1_000_000_000,
        ) {
            let window = window_frac % period;
            let c = cfg(period, window);
            let deadline = tick(now, &c).deadline();
            // Either the end of this period's active window or a period start
            let offset = deadline % u64::from(period);
            prop_assert!(offset == u64::from(window) || offset == 0);
        }
    }
}
