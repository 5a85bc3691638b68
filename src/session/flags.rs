//! Login and reload bookkeeping.
//!
//! After the transport-level logins succeed, a wrapper issues a fixed list
//! of bootstrap requests. Each completion sets one bit; the session is logged
//! on when every required bit is set. A configuration reload tracks the same
//! kind of bitmask in parallel.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of completed bootstrap steps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InitFlags(u32);

impl InitFlags {
    /// No bits set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Bits set in either mask.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bits of `self` not set in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for InitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for InitFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Debug for InitFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InitFlags({:#b})", self.0)
    }
}

/// Tracks which bootstrap and reload steps have completed.
///
/// # Example
///
/// ```
/// use tradelink_rs::session::{InitFlags, LoginTracker};
///
/// const LOGIN: InitFlags = InitFlags::from_bits(1);
/// const SYMBOLS: InitFlags = InitFlags::from_bits(2);
///
/// let mut tracker = LoginTracker::new(LOGIN | SYMBOLS, SYMBOLS);
/// assert!(!tracker.complete(SYMBOLS));
/// assert!(tracker.complete(LOGIN));
/// assert!(tracker.is_logged_on());
/// ```
#[derive(Debug, Clone)]
pub struct LoginTracker {
    required: InitFlags,
    reload_required: InitFlags,
    init: InitFlags,
    reload: InitFlags,
    reload_generation: u64,
    reloading: bool,
    logged_on: bool,
}

impl LoginTracker {
    /// Create a tracker for the given "All" masks.
    pub fn new(required: InitFlags, reload_required: InitFlags) -> Self {
        Self {
            required,
            reload_required,
            init: InitFlags::empty(),
            reload: InitFlags::empty(),
            reload_generation: 0,
            reloading: false,
            logged_on: false,
        }
    }

    /// Mark a bootstrap step complete.
    ///
    /// Returns `true` exactly once: on the call that makes the mask equal
    /// "All". Later completions return `false` until [`reset`](Self::reset).
    pub fn complete(&mut self, flag: InitFlags) -> bool {
        if self.logged_on {
            return false;
        }
        self.init.insert(flag);
        if self.init.contains(self.required) {
            self.logged_on = true;
            return true;
        }
        false
    }

    /// Returns `true` if the given step has completed.
    pub fn is_complete(&self, flag: InitFlags) -> bool {
        self.init.contains(flag)
    }

    /// Steps still outstanding before logon.
    pub fn missing(&self) -> InitFlags {
        self.required.difference(self.init)
    }

    /// Returns `true` once every bootstrap step has completed.
    pub fn is_logged_on(&self) -> bool {
        self.logged_on
    }

    /// Start a reload: clears the reload mask and returns the generation
    /// that completions must quote.
    pub fn begin_reload(&mut self) -> u64 {
        self.reload_generation += 1;
        self.reload = InitFlags::empty();
        self.reloading = true;
        self.reload_generation
    }

    /// Mark a reload step complete.
    ///
    /// Completions for an older generation are ignored. Returns `true`
    /// exactly once per generation, when the reload mask becomes "All".
    pub fn complete_reload(&mut self, generation: u64, flag: InitFlags) -> bool {
        if !self.reloading || generation != self.reload_generation {
            return false;
        }
        self.reload.insert(flag);
        if self.reload.contains(self.reload_required) {
            self.reloading = false;
            return true;
        }
        false
    }

    /// Returns `true` while a reload is outstanding.
    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// Forget all progress; outstanding reloads become stale.
    pub fn reset(&mut self) {
        self.init = InitFlags::empty();
        self.reload = InitFlags::empty();
        self.reload_generation += 1;
        self.reloading = false;
        self.logged_on = false;
    }
}
