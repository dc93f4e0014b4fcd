//! One-Shot RTC Alarm Discipline
//!
//! ## Overview
//!
//! The hardware RTC offers exactly one alarm slot. This module wraps that
//! capability with the discipline the scheduler needs:
//!
//! - **Typed callback intent**: instead of an opaque pointer argument decoded
//!   inside the interrupt handler, every alarm carries an [`AlarmAction`]
//!   describing what the firing means. The callback dispatches on the tag;
//!   nothing is cast.
//! - **Single outstanding alarm**: [`AlarmArmer`] cancels any pending alarm
//!   before arming a new one, so two alarms are never live at once.
//! - **Stale-callback immunity**: each arm bumps a generation counter that
//!   travels with the alarm. A callback from a superseded alarm still runs,
//!   but the main loop recognizes the stale generation and ignores it. The
//!   arm/fire race is prevented structurally rather than detected.
//!
//! ## Callback constraints
//!
//! [`AlarmWaker::fire`] is the entire callback body: at most one atomic
//! power-mode unblock plus one lock-free push into the shared
//! [`WakeSignal`](crate::signal::WakeSignal). O(1), no blocking I/O, no
//! re-entry into arm/cancel logic. Anything heavier (re-arming, console
//! output) happens on the main loop's next pass.

use crate::errors::SchedulerResult;
use crate::power::PowerModeController;
use crate::signal::{WakeEvent, WakeSignal};
use crate::time::{Calendar, Epoch};

/// What an armed alarm is for, dispatched by the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmAction {
    /// End of a sleep interval: resume the main loop, nothing else
    ResumeActive,
    /// Release a power-mode hold placed before the alarm was armed
    UnblockMode(u8),
    /// Emit a diagnostic line, deferred to the main loop; the callback
    /// itself never touches the console
    Log(&'static str),
}

/// Opaque handle to an armed hardware alarm slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmToken(u32);

impl AlarmToken {
    /// Wrap a platform slot identifier
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The platform slot identifier
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// ISR-side handle for a single armed alarm
///
/// Handed to the [`AlarmTimer`] at arm time; the platform invokes
/// [`fire`](Self::fire) from its alarm interrupt. `'static` borrows because
/// the interrupt outlives any stack frame.
#[derive(Clone, Copy)]
pub struct AlarmWaker {
    signal: &'static WakeSignal,
    power: &'static dyn PowerModeController,
    generation: u32,
    action: AlarmAction,
}

impl AlarmWaker {
    /// The alarm callback. O(1), never blocks, interrupt-safe.
    pub fn fire(&self) {
        if let AlarmAction::UnblockMode(level) = self.action {
            // Single atomic op; the main loop applies everything else
            self.power.unblock(level);
        }
        self.signal.notify(WakeEvent {
            generation: self.generation,
            action: self.action,
        });
    }

    /// The arm generation this waker was created for
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// What the alarm was armed for
    pub fn action(&self) -> AlarmAction {
        self.action
    }
}

impl core::fmt::Debug for AlarmWaker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlarmWaker")
            .field("generation", &self.generation)
            .field("action", &self.action)
            .finish()
    }
}

/// One-shot alarm capability of the platform RTC
///
/// At most one alarm is outstanding at the hardware level; arming while one
/// is live may be refused with
/// [`AlarmBusy`](crate::errors::SchedulerError::AlarmBusy), which the caller
/// recovers from by retrying with a recomputed deadline on its next pass.
pub trait AlarmTimer {
    /// Arm a one-shot alarm at the given calendar instant
    fn arm(&mut self, at: Calendar, waker: AlarmWaker) -> SchedulerResult<AlarmToken>;

    /// Cancel an armed alarm; the waker must not fire after this returns
    fn cancel(&mut self, token: AlarmToken);
}

/// The single alarm the scheduler has in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAlarm {
    /// Epoch deadline the alarm was armed for
    pub deadline: Epoch,
    /// Hardware slot handle
    pub token: AlarmToken,
    /// Arm generation, matched against incoming wake events
    pub generation: u32,
    /// What the alarm was armed for
    pub action: AlarmAction,
}

/// Enforces the single-outstanding-alarm invariant over an [`AlarmTimer`]
pub struct AlarmArmer<T: AlarmTimer> {
    timer: T,
    signal: &'static WakeSignal,
    power: &'static dyn PowerModeController,
    pending: Option<PendingAlarm>,
    generation: u32,
}

impl<T: AlarmTimer> AlarmArmer<T> {
    /// Wrap a timer; the signal and power controller are shared with every
    /// waker this armer hands out
    pub fn new(
        timer: T,
        signal: &'static WakeSignal,
        power: &'static dyn PowerModeController,
    ) -> Self {
        Self {
            timer,
            signal,
            power,
            pending: None,
            generation: 0,
        }
    }

    /// Arm an alarm for `deadline`, superseding any pending one
    ///
    /// The old alarm is canceled synchronously before the new arm, so its
    /// callback cannot fire afterwards; a callback already delivered keeps
    /// its old generation and is discarded by [`retire`](Self::retire).
    ///
    /// On [`AlarmBusy`](crate::errors::SchedulerError::AlarmBusy) no alarm is
    /// recorded and the caller retries next pass.
    pub fn arm(
        &mut self,
        deadline: Epoch,
        at: Calendar,
        action: AlarmAction,
    ) -> SchedulerResult<u32> {
        self.cancel();

        let generation = self.generation.wrapping_add(1);
        self.generation = generation;

        let waker = AlarmWaker {
            signal: self.signal,
            power: self.power,
            generation,
            action,
        };
        let token = self.timer.arm(at, waker)?;
        self.pending = Some(PendingAlarm { deadline, token, generation, action });
        Ok(generation)
    }

    /// Cancel the pending alarm, if any. Idempotent.
    ///
    /// Canceling an alarm that would have released a power-mode hold
    /// discharges the hold immediately: a floor must never outlive the
    /// alarm that was going to lift it.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.timer.cancel(pending.token);
            if let AlarmAction::UnblockMode(level) = pending.action {
                self.power.unblock(level);
            }
        }
    }

    /// Match a fired generation against the pending alarm
    ///
    /// Returns true and clears the pending slot when the generation is
    /// current; returns false for stale callbacks from superseded alarms.
    pub fn retire(&mut self, generation: u32) -> bool {
        match self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// The currently pending alarm, if one is armed
    pub fn pending(&self) -> Option<PendingAlarm> {
        self.pending
    }
}
