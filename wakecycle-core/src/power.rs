//! Power-Mode Gating Around the Sleep Interval
//!
//! ## Overview
//!
//! Power modes are numbered levels: lower numbers save more power and may
//! need an interrupt to wake the CPU. A *blocker* on level `m` holds a floor
//! under the system: it cannot descend to `m` or below while the block is
//! held. Blocks are placed and released from both the main loop and the alarm
//! callback, so the set lives in a single atomic word: a reader never
//! observes a half-updated set, and `unblock` is a plain idempotent
//! bit-clear.
//!
//! [`PowerGate`] is the main-loop side: it clamps the requested sleep mode to
//! the blocker floor before asking the platform to descend. Descending may
//! suspend the calling context until the armed alarm fires; main-loop
//! context only, never the callback.

use core::sync::atomic::{AtomicU32, Ordering};

/// Highest representable mode level (one bit per level in a u32)
pub const MAX_MODE_LEVELS: u8 = 32;

/// Snapshot of the currently blocked mode levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockerSet(u32);

impl BlockerSet {
    /// No levels blocked
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from a raw bitmask, one bit per level
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bitmask
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True when no level is blocked
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether level `mode` is blocked
    pub const fn contains(&self, mode: u8) -> bool {
        mode < MAX_MODE_LEVELS && self.0 & (1 << mode) != 0
    }

    /// Lowest mode the system may still enter
    ///
    /// One above the highest blocked level; 0 when nothing is blocked.
    pub const fn floor(&self) -> u8 {
        if self.0 == 0 {
            0
        } else {
            32 - self.0.leading_zeros() as u8
        }
    }
}

/// Platform power-mode capability
///
/// All methods take `&self`: `unblock` must be callable from the alarm
/// callback, and implementations keep their blocker state in atomics.
pub trait PowerModeController: Sync {
    /// Descend to `mode`; may suspend the caller until a wake interrupt.
    /// Main-loop context only.
    fn enter(&self, mode: u8);

    /// Hold a floor: prevent descending to `mode` or below
    fn block(&self, mode: u8);

    /// Release a held floor. Idempotent; a no-op if `mode` is not blocked.
    fn unblock(&self, mode: u8);

    /// Snapshot of the blocked levels
    fn blocked(&self) -> BlockerSet;
}

/// Software blocker bookkeeping for [`PowerModeController`] implementations
///
/// A single atomic word, so callback-side `unblock` and main-loop `block`
/// serialize without a lock. Platforms embed this and add their own `enter`.
#[derive(Debug, Default)]
pub struct LayeredModes {
    blocked: AtomicU32,
}

impl LayeredModes {
    /// All levels unblocked; usable in a `static`
    pub const fn new() -> Self {
        Self { blocked: AtomicU32::new(0) }
    }
}

impl PowerModeController for LayeredModes {
    fn enter(&self, _mode: u8) {
        // Bookkeeping-only controller; platforms wire the actual descent
    }

    fn block(&self, mode: u8) {
        if mode < MAX_MODE_LEVELS {
            self.blocked.fetch_or(1 << mode, Ordering::AcqRel);
        }
    }

    fn unblock(&self, mode: u8) {
        if mode < MAX_MODE_LEVELS {
            self.blocked.fetch_and(!(1 << mode), Ordering::AcqRel);
        }
    }

    fn blocked(&self) -> BlockerSet {
        BlockerSet::from_bits(self.blocked.load(Ordering::Acquire))
    }
}

/// Bounded wait inside the active window
///
/// Main-loop context; expected to suspend the caller for roughly the given
/// number of seconds while the node keeps behaving normally.
pub trait IdleWait {
    /// Suspend the caller for roughly `seconds`
    fn wait(&self, seconds: u32);
}

/// No-op wait for tests and simulation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWait;

impl IdleWait for NoWait {
    fn wait(&self, _seconds: u32) {}
}

/// Thread-sleeping wait for hosted targets
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadWait;

#[cfg(feature = "std")]
impl IdleWait for ThreadWait {
    fn wait(&self, seconds: u32) {
        std::thread::sleep(std::time::Duration::from_secs(u64::from(seconds)));
    }
}

/// Main-loop side of power gating
pub struct PowerGate<P: PowerModeController + 'static> {
    power: &'static P,
}

impl<P: PowerModeController + 'static> PowerGate<P> {
    /// Gate the given controller
    pub fn new(power: &'static P) -> Self {
        Self { power }
    }

    /// The underlying controller
    pub fn controller(&self) -> &'static P {
        self.power
    }

    /// Place a floor at `mode` (e.g. keep the radio powered)
    pub fn hold(&self, mode: u8) {
        self.power.block(mode);
    }

    /// Release a floor placed with [`hold`](Self::hold)
    pub fn release(&self, mode: u8) {
        self.power.unblock(mode);
    }

    /// Enter the requested sleep mode, clamped to the blocker floor
    ///
    /// May suspend until the armed alarm fires.
    pub fn sleep(&self, requested: u8) {
        let floor = self.power.blocked().floor();
        self.power.enter(requested.max(floor));
    }
}
