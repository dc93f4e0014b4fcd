//! Duty-Cycle Scheduler: the Main Control Loop
//!
//! ## Overview
//!
//! [`DutyCycleScheduler`] drives the cycle the whole crate exists for:
//!
//! ```text
//! ACTIVE --(phase < G, remaining elapses)--> ARMING --(arm ok)--> LOW_POWER
//! ACTIVE --(phase >= G)---------------------> ARMING --(arm ok)--> LOW_POWER
//! LOW_POWER --(alarm fires, callback runs)--> ACTIVE
//! ```
//!
//! One `run_cycle` pass reads the clock, takes a [`tick`] decision, waits out
//! any remaining active time, arms the wake alarm, and descends into low
//! power. Execution resumes when the callback fires; the loop drains the
//! wake signal and goes around again. The cycle has no terminal state;
//! [`shutdown`](DutyCycleScheduler::shutdown) exists so tests and orderly
//! reboots can stop it deterministically.
//!
//! ## State ownership
//!
//! Earlier firmware kept `alarm_time`, `current_time` and assorted counters
//! as module-level globals shared between the loop and the interrupt
//! handler. Here every piece of state lives in the scheduler context, except
//! the one structure genuinely shared with the callback: the `&'static`
//! [`WakeSignal`], which the callback reaches through its typed
//! [`AlarmWaker`](crate::alarm::AlarmWaker) instead of an ambient global.
//!
//! ## Error posture
//!
//! Recoverable faults never stop the cycle: a busy alarm slot is retried
//! next pass with a fresh `now`, and a failed clock read advances the last
//! known time by one period and sleeps to that deadline. A missed or delayed
//! wake is acceptable; a node wedged in low power is not.

use core::fmt;

use crate::alarm::{AlarmAction, AlarmArmer, AlarmTimer, PendingAlarm};
use crate::console::ConsoleSink;
use crate::errors::{SchedulerError, SchedulerResult};
use crate::power::{IdleWait, PowerGate, PowerModeController};
use crate::schedule::{tick, Decision, DutyCycleConfig};
use crate::signal::WakeSignal;
use crate::time::{Calendar, Epoch, TimeSource};

/// Where in the cycle the main loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Running normally (boot state)
    Active,
    /// Between deadline computation and a successful arm
    Arming,
    /// Armed and descended; waiting for the alarm
    LowPower,
}

/// Counters for one scheduler instance, main-loop mutated only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Completed ACTIVE -> LOW_POWER -> ACTIVE transitions
    pub cycles: u32,
    /// Alarms successfully armed
    pub alarms_armed: u32,
    /// Arm attempts refused by the timer
    pub busy_retries: u32,
    /// Clock reads that fell back to the last known time
    pub clock_faults: u32,
    /// Wake events discarded because their alarm had been superseded
    pub stale_wakes: u32,
}

/// The periodic duty-cycle wake scheduler
///
/// Owns its collaborators except the power controller and the wake signal,
/// which are `&'static` because the alarm callback reaches them from
/// interrupt context.
pub struct DutyCycleScheduler<C, A, P, W, S>
where
    C: TimeSource,
    A: AlarmTimer,
    P: PowerModeController + 'static,
    W: IdleWait,
    S: ConsoleSink,
{
    cfg: DutyCycleConfig,
    clock: C,
    armer: AlarmArmer<A>,
    gate: PowerGate<P>,
    idle: W,
    console: S,
    signal: &'static WakeSignal,
    state: CycleState,
    last_known: Epoch,
    stats: CycleStats,
}

impl<C, A, P, W, S> DutyCycleScheduler<C, A, P, W, S>
where
    C: TimeSource,
    A: AlarmTimer,
    P: PowerModeController + 'static,
    W: IdleWait,
    S: ConsoleSink,
{
    /// Assemble a scheduler from its platform collaborators
    pub fn new(
        cfg: DutyCycleConfig,
        clock: C,
        timer: A,
        power: &'static P,
        idle: W,
        console: S,
        signal: &'static WakeSignal,
    ) -> Self {
        Self {
            cfg,
            clock,
            armer: AlarmArmer::new(timer, signal, power),
            gate: PowerGate::new(power),
            idle,
            console,
            signal,
            state: CycleState::Active,
            last_known: 0,
            stats: CycleStats::default(),
        }
    }

    /// Write the RTC before the loop starts (provisioning, time sync)
    pub fn bootstrap_clock(&mut self, time: Calendar) -> SchedulerResult<()> {
        self.trace(format_args!("setting clock to {time}"));
        self.clock.set(time)?;
        self.last_known = self.clock.now()?;
        Ok(())
    }

    /// One full pass of the duty cycle
    ///
    /// Returns the decision that was taken. A busy alarm slot is not an
    /// error here: the pass ends without sleeping and the next one retries
    /// with a freshly read clock.
    pub fn run_cycle(&mut self) -> SchedulerResult<Decision> {
        self.state = CycleState::Active;

        let decision = match self.read_clock() {
            Some(now) => tick(now, &self.cfg),
            // Conservative fallback: advance the last known time by a full
            // period rather than guessing at window alignment. The advance
            // keeps the deadline strictly ahead of wherever the device has
            // reached, so back-to-back faults never re-arm for an instant
            // already in the past.
            None => {
                self.last_known += Epoch::from(self.cfg.period());
                Decision::EnterSleep { deadline: self.last_known }
            }
        };

        match decision {
            Decision::StayActive { remaining, deadline } => {
                self.trace(format_args!("active window open, {remaining}s remaining"));
                if let Some(hold) = self.cfg.active_hold() {
                    // Keep the radio's floor in place until the window closes
                    self.gate.hold(hold);
                    self.idle.wait(remaining);
                    let armed = self.arm_and_sleep(deadline, AlarmAction::UnblockMode(hold))?;
                    if !armed {
                        self.gate.release(hold);
                    }
                } else {
                    self.idle.wait(remaining);
                    self.arm_and_sleep(deadline, AlarmAction::ResumeActive)?;
                }
            }
            Decision::EnterSleep { deadline } => {
                self.arm_and_sleep(deadline, AlarmAction::ResumeActive)?;
            }
        }

        Ok(decision)
    }

    /// Run cycles until [`shutdown`](Self::shutdown) (or any holder of the
    /// wake signal) requests a stop
    pub fn run(&mut self) -> SchedulerResult<()> {
        self.console.log("duty cycle started");
        while !self.signal.stop_requested() {
            self.run_cycle()?;
        }
        self.armer.cancel();
        self.console.log("duty cycle stopped");
        Ok(())
    }

    /// Stop the loop deterministically
    ///
    /// Cancels any pending alarm (discharging a hold it would have
    /// released) and raises the stop flag; a loop suspended in low power
    /// exits after its current cycle.
    pub fn shutdown(&mut self) {
        self.signal.request_stop();
        self.armer.cancel();
        self.state = CycleState::Active;
        self.console.log("shutdown requested");
    }

    /// Hold power mode `mode` blocked for `duration` seconds
    ///
    /// Blocks the level immediately and arms the alarm whose callback
    /// releases it. Supersedes any pending duty-cycle alarm, so this is for
    /// use outside the running loop (the next `run_cycle` re-arms the duty
    /// cycle and discharges the hold early).
    pub fn timed_hold(&mut self, mode: u8, duration: u32) -> SchedulerResult<()> {
        // A hold without its release alarm would strand the floor, so a
        // clock fault fails the request instead of falling back
        let now = self.clock.now()?;
        self.last_known = now;

        self.gate.hold(mode);
        let deadline = now + Epoch::from(duration);
        let at = self.clock.to_calendar(deadline);
        if let Err(err) = self.armer.arm(deadline, at, AlarmAction::UnblockMode(mode)) {
            self.gate.release(mode);
            return Err(err);
        }
        self.stats.alarms_armed += 1;
        self.trace(format_args!("holding mode {mode} for {duration}s"));
        Ok(())
    }

    /// Where in the cycle the main loop currently is
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Snapshot of the cycle counters
    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// The immutable duty-cycle configuration
    pub fn config(&self) -> &DutyCycleConfig {
        &self.cfg
    }

    /// The alarm currently armed, if any
    pub fn pending_alarm(&self) -> Option<PendingAlarm> {
        self.armer.pending()
    }

    /// Arm for `deadline`, descend, and handle the wake
    ///
    /// Returns false when the timer was busy and the pass should end
    /// without sleeping.
    fn arm_and_sleep(&mut self, deadline: Epoch, action: AlarmAction) -> SchedulerResult<bool> {
        self.state = CycleState::Arming;
        let at = self.clock.to_calendar(deadline);

        match self.armer.arm(deadline, at, action) {
            Ok(_generation) => {}
            Err(SchedulerError::AlarmBusy) => {
                self.stats.busy_retries += 1;
                self.console.log("alarm busy, retrying next pass");
                self.state = CycleState::Active;
                return Ok(false);
            }
            Err(other) => return Err(other),
        }
        self.stats.alarms_armed += 1;

        self.trace(format_args!("alarm armed for {at}, entering low power"));
        self.state = CycleState::LowPower;
        self.gate.sleep(self.cfg.sleep_mode());
        // Execution resumes here once the alarm (or a stop request) wakes us
        self.state = CycleState::Active;
        self.drain_signal();
        self.stats.cycles += 1;
        Ok(true)
    }

    /// Apply the bookkeeping the callback deferred to main-loop context
    fn drain_signal(&mut self) {
        while let Some(event) = self.signal.take() {
            if !self.armer.retire(event.generation) {
                // Callback from a superseded alarm; its arm generation no
                // longer matches, so its effects are ignored
                self.stats.stale_wakes += 1;
                continue;
            }
            match event.action {
                AlarmAction::ResumeActive => self.console.log("wake up!"),
                AlarmAction::UnblockMode(level) => {
                    // The unblock itself already happened in the callback
                    self.trace(format_args!("hold on mode {level} released"));
                }
                AlarmAction::Log(line) => self.console.log(line),
            }
        }
    }

    /// Read the clock, falling back to the last known time on failure
    fn read_clock(&mut self) -> Option<Epoch> {
        match self.clock.now() {
            Ok(now) => {
                self.last_known = now;
                Some(now)
            }
            Err(err) => {
                self.stats.clock_faults += 1;
                self.trace(format_args!("clock read failed ({err}), holding last known time"));
                None
            }
        }
    }

    /// Format a trace line without allocating
    fn trace(&self, args: fmt::Arguments<'_>) {
        let mut line = heapless::String::<96>::new();
        // Truncation is acceptable; the console is best-effort
        let _ = fmt::write(&mut line, args);
        self.console.log(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmToken, AlarmWaker};
    use crate::console::NullConsole;
    use crate::power::{LayeredModes, NoWait};
    use crate::signal::WakeEvent;
    use crate::time::FixedClock;
    use std::sync::{Arc, Mutex};

    /// Records arms; optionally refuses the first one
    #[derive(Default)]
    struct StubTimer {
        armed: Arc<Mutex<Vec<(Calendar, AlarmWaker)>>>,
        cancels: Arc<Mutex<u32>>,
        busy_once: bool,
    }

    impl AlarmTimer for StubTimer {
        fn arm(&mut self, at: Calendar, waker: AlarmWaker) -> SchedulerResult<AlarmToken> {
            if self.busy_once {
                self.busy_once = false;
                return Err(SchedulerError::AlarmBusy);
            }
            let mut armed = self.armed.lock().unwrap();
            armed.push((at, waker));
            Ok(AlarmToken::new(armed.len() as u32))
        }

        fn cancel(&mut self, _token: AlarmToken) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    type TestScheduler =
        DutyCycleScheduler<FixedClock, StubTimer, LayeredModes, NoWait, NullConsole>;

    fn scheduler(cfg: DutyCycleConfig, now: Epoch, timer: StubTimer) -> TestScheduler {
        let signal: &'static WakeSignal = Box::leak(Box::new(WakeSignal::new()));
        let power: &'static LayeredModes = Box::leak(Box::new(LayeredModes::new()));
        DutyCycleScheduler::new(cfg, FixedClock::new(now), timer, power, NoWait, NullConsole, signal)
    }

    #[test]
    fn sleep_branch_arms_next_period_start() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let timer = StubTimer::default();
        let armed = timer.armed.clone();
        let mut sched = scheduler(cfg, 15, timer);

        let decision = sched.run_cycle().unwrap();
        assert_eq!(decision, Decision::EnterSleep { deadline: 20 });
        assert_eq!(sched.pending_alarm().unwrap().deadline, 20);
        assert_eq!(armed.lock().unwrap().len(), 1);
        assert_eq!(sched.stats().alarms_armed, 1);
        // LayeredModes::enter does not suspend, so the pass completed
        assert_eq!(sched.state(), CycleState::Active);
    }

    #[test]
    fn busy_timer_skips_sleep_and_counts_retry() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let timer = StubTimer { busy_once: true, ..StubTimer::default() };
        let mut sched = scheduler(cfg, 15, timer);

        sched.run_cycle().unwrap();
        assert!(sched.pending_alarm().is_none());
        assert_eq!(sched.stats().busy_retries, 1);
        assert_eq!(sched.stats().alarms_armed, 0);
        assert_eq!(sched.state(), CycleState::Active);

        // Next pass succeeds
        sched.run_cycle().unwrap();
        assert_eq!(sched.stats().alarms_armed, 1);
    }

    #[test]
    fn busy_timer_releases_active_hold() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap().with_active_hold(2);
        let timer = StubTimer { busy_once: true, ..StubTimer::default() };
        let mut sched = scheduler(cfg, 5, timer);

        sched.run_cycle().unwrap();
        assert!(sched.gate.controller().blocked().is_empty());
        assert_eq!(sched.stats().busy_retries, 1);
    }

    #[test]
    fn stale_wake_events_are_discarded() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let mut sched = scheduler(cfg, 15, StubTimer::default());

        // A straggler from an alarm that was superseded long ago
        sched.signal.notify(WakeEvent {
            generation: 999,
            action: AlarmAction::ResumeActive,
        });
        sched.run_cycle().unwrap();

        assert_eq!(sched.stats().stale_wakes, 1);
        // The real alarm never fired, so it is still pending
        assert!(sched.pending_alarm().is_some());
    }

    struct BrokenClock;

    impl TimeSource for BrokenClock {
        fn now(&self) -> SchedulerResult<Epoch> {
            Err(SchedulerError::ClockRead { reason: "i2c timeout" })
        }
        fn set(&mut self, _time: Calendar) -> SchedulerResult<()> {
            Ok(())
        }
    }

    fn broken_clock_scheduler(
        cfg: DutyCycleConfig,
    ) -> DutyCycleScheduler<BrokenClock, StubTimer, LayeredModes, NoWait, NullConsole> {
        let signal: &'static WakeSignal = Box::leak(Box::new(WakeSignal::new()));
        let power: &'static LayeredModes = Box::leak(Box::new(LayeredModes::new()));
        DutyCycleScheduler::new(
            cfg,
            BrokenClock,
            StubTimer::default(),
            power,
            NoWait,
            NullConsole,
            signal,
        )
    }

    #[test]
    fn clock_fault_falls_back_one_period() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let mut sched = broken_clock_scheduler(cfg);

        let decision = sched.run_cycle().unwrap();
        // last_known starts at 0; the fallback deadline is one period out
        assert_eq!(decision, Decision::EnterSleep { deadline: 20 });
        assert_eq!(sched.stats().clock_faults, 1);
    }

    #[test]
    fn consecutive_clock_faults_keep_the_deadline_moving() {
        // By the time a fallback pass ends the device has reached its
        // deadline, so the next faulted pass must arm strictly later or the
        // alarm never fires and the node stays in low power
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let mut sched = broken_clock_scheduler(cfg);

        let mut previous: Epoch = 0;
        for pass in 1u64..=3 {
            let deadline = sched.run_cycle().unwrap().deadline();
            assert!(deadline > previous, "pass {pass}: deadline stagnated");
            assert_eq!(deadline, pass * 20);
            previous = deadline;
        }
        assert_eq!(sched.stats().clock_faults, 3);
    }

    #[test]
    fn shutdown_cancels_pending_and_raises_stop() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let timer = StubTimer::default();
        let cancels = timer.cancels.clone();
        let mut sched = scheduler(cfg, 15, timer);

        sched.run_cycle().unwrap();
        assert!(sched.pending_alarm().is_some());

        sched.shutdown();
        assert!(sched.pending_alarm().is_none());
        assert!(sched.signal.stop_requested());
        assert_eq!(*cancels.lock().unwrap(), 1);
    }

    #[test]
    fn timed_hold_blocks_until_release_alarm() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let timer = StubTimer::default();
        let armed = timer.armed.clone();
        let mut sched = scheduler(cfg, 100, timer);

        sched.timed_hold(2, 30).unwrap();
        assert!(sched.gate.controller().blocked().contains(2));
        assert_eq!(sched.pending_alarm().unwrap().deadline, 130);

        // Firing the release alarm unblocks the level
        let (_, waker) = armed.lock().unwrap()[0];
        waker.fire();
        assert!(!sched.gate.controller().blocked().contains(2));

        // And the next drain retires the pending alarm
        sched.drain_signal();
        assert!(sched.pending_alarm().is_none());
    }

    #[test]
    fn timed_hold_rolls_back_on_busy_timer() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let timer = StubTimer { busy_once: true, ..StubTimer::default() };
        let mut sched = scheduler(cfg, 100, timer);

        assert_eq!(sched.timed_hold(2, 30), Err(SchedulerError::AlarmBusy));
        assert!(sched.gate.controller().blocked().is_empty());
        assert!(sched.pending_alarm().is_none());
    }

    #[test]
    fn shutdown_discharges_a_timed_hold() {
        let cfg = DutyCycleConfig::new(20, 10).unwrap();
        let mut sched = scheduler(cfg, 100, StubTimer::default());

        sched.timed_hold(2, 30).unwrap();
        sched.shutdown();
        assert!(sched.gate.controller().blocked().is_empty());
        assert!(sched.pending_alarm().is_none());
    }
}
