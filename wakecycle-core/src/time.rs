//! Time management for duty-cycled devices
//!
//! Provides the clock abstraction the scheduler depends on:
//! - Epoch timestamps (integer seconds since a fixed reference instant) for
//!   all scheduling arithmetic
//! - Calendar time (year/month/day hour:minute:second) used only at the
//!   RTC/alarm hardware boundary, which takes calendar fields rather than
//!   raw integers
//! - A [`TimeSource`] trait for the hardware RTC, with test doubles
//!
//! The reference instant is configurable. Deployed nodes have used
//! 2020-01-01T00:00:00Z, expressed as a literal Unix-seconds offset; at least
//! one fleet ran with the offset shifted by a few seconds, so the constant is
//! a parameter rather than a baked-in value.

use crate::errors::SchedulerResult;

/// Timestamp in whole seconds since the reference instant
pub type Epoch = u64;

/// Seconds per civil day
const SECS_PER_DAY: u64 = 86_400;

/// Unix seconds of 2020-01-01T00:00:00Z, the default reference instant
pub const UNIX_2020: u64 = 1_577_836_800;

/// Calendar time as the RTC hardware sees it
///
/// Used only at the [`TimeSource`]/alarm boundary; everything else works on
/// [`Epoch`] integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calendar {
    /// Full year, e.g. 2020
    pub year: u16,
    /// 1 = January, 12 = December
    pub month: u8,
    /// Day of month, 1-31
    pub day: u8,
    /// Hour of day, 0-23
    pub hour: u8,
    /// Minute, 0-59
    pub minute: u8,
    /// Second, 0-59
    pub second: u8,
}

impl core::fmt::Display for Calendar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Days from 1970-01-01 for a civil date (proleptic Gregorian)
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = i64::from(if month > 2 { month - 3 } else { month + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Civil date for days from 1970-01-01 (inverse of [`days_from_civil`])
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// The fixed reference instant, in Unix seconds
///
/// All [`Epoch`] values count from here. The default matches the deployed
/// fleets' 2020-01-01 constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceEpoch(
    /// Unix seconds of the reference instant
    pub u64,
);

impl ReferenceEpoch {
    /// 2020-01-01T00:00:00Z
    pub const DEFAULT: Self = Self(UNIX_2020);

    /// Convert an epoch offset to calendar form
    pub fn to_calendar(&self, at: Epoch) -> Calendar {
        let unix = self.0 + at;
        let days = (unix / SECS_PER_DAY) as i64;
        let secs = unix % SECS_PER_DAY;
        let (year, month, day) = civil_from_days(days);
        Calendar {
            year: year as u16,
            month,
            day,
            hour: (secs / 3600) as u8,
            minute: (secs % 3600 / 60) as u8,
            second: (secs % 60) as u8,
        }
    }

    /// Convert calendar form back to an epoch offset
    ///
    /// Instants before the reference saturate to zero; the scheduler never
    /// arms alarms in the past.
    pub fn to_epoch(&self, time: Calendar) -> Epoch {
        let days = days_from_civil(i64::from(time.year), time.month, time.day);
        let unix = days * SECS_PER_DAY as i64
            + i64::from(time.hour) * 3600
            + i64::from(time.minute) * 60
            + i64::from(time.second);
        (unix - self.0 as i64).max(0) as Epoch
    }
}

impl Default for ReferenceEpoch {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Source of time for the scheduler
///
/// Implemented over the platform RTC; the scheduler only ever reads whole
/// seconds and converts to calendar form when arming hardware alarms.
pub trait TimeSource {
    /// Current epoch timestamp
    fn now(&self) -> SchedulerResult<Epoch>;

    /// Write the clock (e.g. after provisioning or a time sync)
    fn set(&mut self, time: Calendar) -> SchedulerResult<()>;

    /// Reference instant this source counts from
    fn reference(&self) -> ReferenceEpoch {
        ReferenceEpoch::DEFAULT
    }

    /// Convert an epoch offset to the calendar form the alarm hardware takes
    fn to_calendar(&self, at: Epoch) -> Calendar {
        self.reference().to_calendar(at)
    }
}

/// Settable clock for testing
///
/// Starts at a caller-chosen epoch and only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Epoch,
    reference: ReferenceEpoch,
}

impl FixedClock {
    /// Start the clock at the given epoch
    pub fn new(now: Epoch) -> Self {
        Self {
            now,
            reference: ReferenceEpoch::DEFAULT,
        }
    }

    /// Count from a non-default reference instant
    pub fn with_reference(mut self, reference: ReferenceEpoch) -> Self {
        self.reference = reference;
        self
    }

    /// Move the clock forward
    pub fn advance(&mut self, seconds: u64) {
        self.now += seconds;
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> SchedulerResult<Epoch> {
        Ok(self.now)
    }

    fn set(&mut self, time: Calendar) -> SchedulerResult<()> {
        self.now = self.reference.to_epoch(time);
        Ok(())
    }

    fn reference(&self) -> ReferenceEpoch {
        self.reference
    }
}

/// Host clock (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    reference: ReferenceEpoch,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Host clock counting from the default reference instant
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "std")]
impl TimeSource for SystemClock {
    fn now(&self) -> SchedulerResult<Epoch> {
        use std::time::{SystemTime, UNIX_EPOCH};

        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Ok(unix.saturating_sub(self.reference.0))
    }

    fn set(&mut self, _time: Calendar) -> SchedulerResult<()> {
        Err(crate::errors::SchedulerError::ClockWrite {
            reason: "host clock is read-only",
        })
    }

    fn reference(&self) -> ReferenceEpoch {
        self.reference
    }
}
