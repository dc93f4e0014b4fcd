//! Lock-Free Wake Handshake Between Alarm Callback and Main Loop
#![allow(unsafe_code)] // Required for lock-free atomic operations
//!
//! ## Overview
//!
//! This module implements the shared state that crosses the scheduler's two
//! execution contexts:
//!
//! - the **main control loop**, a single sequential context that may block
//!   while waiting out the active window or requesting a power-mode
//!   transition, and
//! - the **alarm callback**, invoked from an interrupt-like context when the
//!   armed deadline elapses. It must never block and must finish in bounded
//!   time.
//!
//! ## Why Lock-Free?
//!
//! A mutex is off the table: the callback runs in interrupt context, where
//! taking a lock held by the suspended main loop deadlocks the node in low
//! power, the one failure mode the scheduler must never have.
//!
//! ```text
//! Callback (ISR)                     Main loop
//!      ↓                                 ↓
//!   Atomic Write ────→ Ring Buffer ←─── Atomic Read
//!      ↓                                 ↓
//!   Never Blocks                     Never Blocks
//! ```
//!
//! ## Algorithm
//!
//! A bounded ring buffer with atomic head/tail indices, single producer
//! (the callback) and single consumer (the main loop):
//!
//! - **push**: load head, check full against tail (Acquire), write the slot,
//!   publish with a Release store of the new head.
//! - **pop**: load tail, check empty against head (Acquire), read the slot,
//!   publish with a Release store of the new tail.
//!
//! With exactly one producer and one consumer, each index has a single
//! writer, so neither side needs a compare-and-swap loop.
//!
//! Alarm arm/fire races are not solved here: every armed alarm carries a
//! generation number, and the main loop discards events whose generation is
//! not the currently armed one (see [`crate::alarm::AlarmArmer`]).

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::alarm::AlarmAction;

/// Wake events the callback can have in flight at once
///
/// One outstanding alarm plus a superseded straggler is the realistic
/// worst case; eight leaves slack without wasting RAM.
pub const SIGNAL_CAPACITY: usize = 8;

/// Capacity must be a power of two for the masked index arithmetic
const _: () = assert!(SIGNAL_CAPACITY.is_power_of_two());

/// One alarm firing, as seen by the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeEvent {
    /// Arm generation this firing corresponds to
    pub generation: u32,
    /// What the armed alarm was for
    pub action: AlarmAction,
}

/// Handshake statistics
///
/// Track signal health without impacting the callback path.
#[derive(Debug)]
pub struct SignalStats {
    /// Events the callback delivered
    pub notified: AtomicU32,
    /// Events the main loop consumed
    pub taken: AtomicU32,
    /// Events dropped because the ring was full
    pub dropped: AtomicU32,
}

impl SignalStats {
    const fn new() -> Self {
        Self {
            notified: AtomicU32::new(0),
            taken: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }
}

/// Shared wake/stop state between the alarm callback and the main loop
///
/// Lives for the process lifetime (typically a `static`); both the scheduler
/// and every [`AlarmWaker`](crate::alarm::AlarmWaker) hold `&'static`
/// references into it.
pub struct WakeSignal {
    /// Ring buffer storage; slots are only written by the producer and only
    /// read back by the consumer, fenced by the head/tail indices
    slots: UnsafeCell<[MaybeUninit<WakeEvent>; SIGNAL_CAPACITY]>,

    /// Next write position (callback owned)
    head: AtomicUsize,

    /// Next read position (main loop owned)
    tail: AtomicUsize,

    /// Set by `shutdown()`; observed by the run loop
    stop: AtomicBool,

    stats: SignalStats,
}

// The ring serializes all slot access through the atomic indices
unsafe impl Send for WakeSignal {}
unsafe impl Sync for WakeSignal {}

impl WakeSignal {
    /// Create an empty signal, usable in a `static`
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new([MaybeUninit::uninit(); SIGNAL_CAPACITY]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            stats: SignalStats::new(),
        }
    }

    /// Deliver a wake event (callback side)
    ///
    /// O(1), never blocks. Returns false if the ring was full; the event is
    /// counted as dropped and the wake is lost, which the main loop tolerates
    /// by recomputing from the clock on its next pass.
    ///
    /// ## Safety contract
    /// Only one producer context may call this.
    pub fn notify(&self, event: WakeEvent) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next_head = (head + 1) & (SIGNAL_CAPACITY - 1);

        if next_head == self.tail.load(Ordering::Acquire) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // Sole producer: nobody else writes this slot until head advances
        unsafe {
            let slots = &mut *self.slots.get();
            slots[head].write(event);
        }

        self.head.store(next_head, Ordering::Release);
        self.stats.notified.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Take the oldest pending wake event (main-loop side)
    ///
    /// ## Safety contract
    /// Only one consumer context may call this.
    pub fn take(&self) -> Option<WakeEvent> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        let event = unsafe {
            let slots = &*self.slots.get();
            ptr::read(&slots[tail]).assume_init()
        };

        self.tail
            .store((tail + 1) & (SIGNAL_CAPACITY - 1), Ordering::Release);
        self.stats.taken.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// True when no wake events are pending
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    /// Ask the run loop to halt after the current cycle
    ///
    /// Callable from any context.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Clear a previous stop request (e.g. before restarting the loop)
    pub fn reset_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    /// Handshake statistics
    pub fn stats(&self) -> &SignalStats {
        &self.stats
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(generation: u32) -> WakeEvent {
        WakeEvent { generation, action: AlarmAction::ResumeActive }
    }

    #[test]
    fn delivers_in_order() {
        let signal = WakeSignal::new();

        assert!(signal.notify(event(1)));
        assert!(signal.notify(event(2)));

        assert_eq!(signal.take(), Some(event(1)));
        assert_eq!(signal.take(), Some(event(2)));
        assert_eq!(signal.take(), None);
        assert!(signal.is_empty());
    }

    #[test]
    fn full_ring_drops_and_counts() {
        let signal = WakeSignal::new();

        // Ring holds capacity - 1 events
        for generation in 0..(SIGNAL_CAPACITY as u32 - 1) {
            assert!(signal.notify(event(generation)));
        }
        assert!(!signal.notify(event(99)));
        assert_eq!(signal.stats().dropped.load(Ordering::Relaxed), 1);

        // Draining makes room again
        assert!(signal.take().is_some());
        assert!(signal.notify(event(100)));
    }

    #[test]
    fn stop_flag_round_trip() {
        let signal = WakeSignal::new();
        assert!(!signal.stop_requested());

        signal.request_stop();
        assert!(signal.stop_requested());

        signal.reset_stop();
        assert!(!signal.stop_requested());
    }

    #[test]
    fn wraps_around_capacity() {
        let signal = WakeSignal::new();

        for generation in 0..(4 * SIGNAL_CAPACITY as u32) {
            assert!(signal.notify(event(generation)));
            assert_eq!(signal.take(), Some(event(generation)));
        }
        assert!(signal.is_empty());
    }
}
