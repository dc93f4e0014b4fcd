//! Error Types for Duty-Cycle Scheduling Failures
//!
//! ## Design Philosophy
//!
//! WakeCycle's error system follows the same rules as the rest of the crate:
//!
//! 1. **Small Size**: every variant is a handful of bytes. Errors cross the
//!    main loop on every pass and must be cheap to return and match on.
//!
//! 2. **No Heap Allocation**: all payloads are inline integers or
//!    `&'static str`, so memory usage is deterministic on no_std targets.
//!
//! 3. **Copy Semantics**: errors implement `Copy` so they can be logged and
//!    re-returned without move gymnastics.
//!
//! ## Error Categories
//!
//! ### Configuration (fatal at startup)
//! - `ZeroPeriod`: the duty-cycle period is zero
//! - `WindowExceedsPeriod`: the active window does not fit inside the period
//!
//! A scheduler is never constructed with an invalid config; these can only
//! surface from [`DutyCycleConfig::new`](crate::schedule::DutyCycleConfig::new).
//!
//! ### Runtime (recoverable)
//! - `AlarmBusy`: the hardware timer refused an arm request. The main loop
//!   logs, skips the sleep transition, and retries with a fresh `now` on the
//!   next pass.
//! - `ClockRead` / `ClockWrite`: the RTC failed. Reads fall back to the last
//!   known time plus a conservative deadline; the loop never stops.
//!
//! Alarm-callback races (a stale callback firing after a newer alarm was
//! armed) are prevented structurally by arm generations (see
//! [`crate::alarm::AlarmArmer`]) and therefore have no error variant.

use thiserror_no_std::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduling errors - kept small for embedded use
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Duty-cycle period of zero seconds
    #[error("period must be at least one second")]
    ZeroPeriod,

    /// Active window must be strictly shorter than the period
    #[error("active window {active_window}s must be shorter than period {period}s")]
    WindowExceedsPeriod {
        /// Configured period in seconds
        period: u32,
        /// Configured active window in seconds
        active_window: u32,
    },

    /// The alarm timer refused an arm request
    #[error("alarm timer busy")]
    AlarmBusy,

    /// Reading the time source failed
    #[error("clock read failed: {reason}")]
    ClockRead {
        /// Platform description of the fault
        reason: &'static str,
    },

    /// Writing the time source failed
    #[error("clock write failed: {reason}")]
    ClockWrite {
        /// Platform description of the fault
        reason: &'static str,
    },
}

impl SchedulerError {
    /// True for errors the main loop recovers from without stopping
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlarmBusy | Self::ClockRead { .. } | Self::ClockWrite { .. }
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SchedulerError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::ZeroPeriod =>
                defmt::write!(fmt, "period must be at least one second"),
            Self::WindowExceedsPeriod { period, active_window } =>
                defmt::write!(fmt, "window {}s >= period {}s", active_window, period),
            Self::AlarmBusy =>
                defmt::write!(fmt, "alarm timer busy"),
            Self::ClockRead { reason } =>
                defmt::write!(fmt, "clock read: {}", reason),
            Self::ClockWrite { reason } =>
                defmt::write!(fmt, "clock write: {}", reason),
        }
    }
}
