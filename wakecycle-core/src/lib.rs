//! Core duty-cycle wake scheduler for WakeCycle
//!
//! Keeps a battery-powered node asleep almost all the time while
//! guaranteeing it wakes for a bounded window once per fixed period. The
//! node computes its next wake instant, arms a one-shot RTC alarm for it,
//! and parks in a reduced-power mode until the alarm callback fires.
//!
//! Key constraints:
//! - Runs on no_std targets; no heap allocation anywhere
//! - The alarm callback is interrupt context: O(1), lock-free, never blocks
//! - Recoverable faults (busy timer, failed clock read) never stop the cycle
//!
//! ```no_run
//! use wakecycle_core::{tick, Decision, DutyCycleConfig};
//!
//! let cfg = DutyCycleConfig::new(20, 10).unwrap();
//!
//! // Pure decision: where in the cycle is second 45?
//! match tick(45, &cfg) {
//!     Decision::StayActive { remaining, deadline } => {
//!         // inside the active window for another `remaining` seconds
//!         let _ = (remaining, deadline);
//!     }
//!     Decision::EnterSleep { deadline } => {
//!         // arm an alarm for `deadline` and descend
//!         let _ = deadline;
//!     }
//! }
//! ```
//!
//! The hardware seams (RTC, one-shot alarm, power modes, console) are
//! capability traits ([`TimeSource`], [`alarm::AlarmTimer`],
//! [`power::PowerModeController`], [`console::ConsoleSink`]); the crate
//! implements none of them for real hardware.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alarm;
pub mod console;
pub mod errors;
pub mod power;
pub mod schedule;
pub mod scheduler;
pub mod signal;
pub mod time;

// Public API
pub use errors::{SchedulerError, SchedulerResult};
pub use schedule::{tick, Decision, DutyCycleConfig};
pub use scheduler::{CycleState, CycleStats, DutyCycleScheduler};
pub use signal::WakeSignal;
pub use time::{Calendar, Epoch, ReferenceEpoch, TimeSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
