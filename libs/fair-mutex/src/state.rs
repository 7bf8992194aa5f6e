// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![expect(
    impl_trait_overcaptures,
    reason = "mycelium_bitfield is not updated to edition 2024 yet"
)]

use crate::fatal::InvariantViolation;
use static_assertions::const_assert_eq;

mycelium_bitfield::bitfield! {
    /// A snapshot of a mutex's state word.
    ///
    /// The mutex stores its entire state in a single atomic `u32` with the following layout:
    ///
    /// ```text
    /// | 31          3 |    2     |   1   |   0    |
    /// | waiter count  | starving | woken | locked |
    /// ```
    ///
    /// The all-zero word is an unlocked mutex in normal mode without waiters, which is why a
    /// zero-initialized mutex is immediately usable.
    #[derive(PartialEq, Eq)]
    pub struct LockState<u32> {
        /// If set, the mutex is owned by some thread.
        pub const LOCKED: bool;
        /// If set, a thread has already been promised a wakeup (either a spinning thread or one
        /// just released from the semaphore), so `unlock` must not wake another one.
        pub const WOKEN: bool;
        /// If set, the mutex is in starvation mode and ownership is handed off directly to the
        /// waiter at the front of the queue.
        pub const STARVING: bool;
        /// The number of threads parked on the mutex's semaphore.
        pub const WAITERS = ..;
    }
}

pub(crate) const LOCKED_BIT: u32 = LockState::LOCKED.raw_mask();
pub(crate) const WOKEN_BIT: u32 = LockState::WOKEN.raw_mask();
pub(crate) const STARVING_BIT: u32 = LockState::STARVING.raw_mask();
pub(crate) const WAITER_ONE: u32 = LockState::WAITERS.first_bit();
const MAX_WAITERS: u32 = u32::MAX >> WAITER_ONE.trailing_zeros();

const_assert_eq!(LOCKED_BIT, 0b001);
const_assert_eq!(WOKEN_BIT, 0b010);
const_assert_eq!(STARVING_BIT, 0b100);
const_assert_eq!(WAITER_ONE, 0b1000);

/// The fairness mode a mutex is operating in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    /// Waiters compete with newly arriving threads for ownership.
    Normal,
    /// Ownership is handed off to the waiter at the front of the queue.
    Starvation,
}

// === impl LockState ===

impl LockState {
    pub(crate) const UNLOCKED: Self = Self(0);

    pub(crate) const fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    pub(crate) const fn into_raw(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn is_locked(self) -> bool {
        self.get(Self::LOCKED)
    }

    #[inline]
    #[must_use]
    pub fn is_woken(self) -> bool {
        self.get(Self::WOKEN)
    }

    #[inline]
    #[must_use]
    pub fn is_starving(self) -> bool {
        self.get(Self::STARVING)
    }

    /// The number of threads currently parked on the mutex.
    #[inline]
    #[must_use]
    pub fn waiters(self) -> u32 {
        self.get(Self::WAITERS)
    }

    #[inline]
    #[must_use]
    pub fn mode(self) -> Mode {
        if self.is_starving() {
            Mode::Starvation
        } else {
            Mode::Normal
        }
    }

    /// Returns `true` if a thread that observed this state may spin instead of queueing.
    ///
    /// Spinning only makes sense while the mutex is held in normal mode. In starvation mode
    /// ownership is handed off to waiters so a spinning thread could never acquire it.
    #[inline]
    pub(crate) fn allows_spinning(self) -> bool {
        self.is_locked() && !self.is_starving()
    }

    /// Returns the state with `WOKEN` set, if a spinning thread may claim the wake
    /// responsibility in this state.
    ///
    /// The flag is only claimed when nobody else holds it and there is actually a parked waiter
    /// that `unlock` would otherwise wake.
    #[inline]
    pub(crate) fn claim_woken(self) -> Option<Self> {
        if self.is_woken() || self.waiters() == 0 {
            None
        } else {
            Some(self.with(Self::WOKEN, true))
        }
    }

    /// Computes the state a contending thread tries to install from this observed state.
    ///
    /// - In normal mode the thread tries to take the lock.
    /// - If the lock is held or the mutex is starving, the thread joins the wait queue.
    /// - A thread that believes itself starving switches the mutex to starvation mode, but only
    ///   while the mutex is held: `unlock` expects a starving mutex to have waiters, which would
    ///   not be true otherwise.
    /// - A thread that claimed the wake responsibility (`awoke`) consumes the `WOKEN` flag.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] if `awoke` is set but the state has no `WOKEN` flag to
    /// consume, or if the waiter count would overflow.
    pub fn acquire_candidate(self, starving: bool, awoke: bool) -> Result<Self, InvariantViolation> {
        let mut new = self;

        if !self.is_starving() {
            new.set(Self::LOCKED, true);
        }

        if self.is_locked() || self.is_starving() {
            if self.waiters() == MAX_WAITERS {
                return Err(InvariantViolation::WaiterOverflow { state: self });
            }
            new.set(Self::WAITERS, self.waiters() + 1);
        }

        if starving && self.is_locked() {
            new.set(Self::STARVING, true);
        }

        if awoke {
            if !new.is_woken() {
                return Err(InvariantViolation::WokenNotSet { state: self });
            }
            new.set(Self::WOKEN, false);
        }

        Ok(new)
    }

    /// Returns `true` if installing a candidate over this observed state acquired the lock
    /// outright, without having to park.
    #[inline]
    #[must_use]
    pub fn acquired_by_cas(self) -> bool {
        !self.is_locked() && !self.is_starving()
    }

    /// Computes the delta a waiter adds to the state word to take ownership after a starvation
    /// mode handoff.
    ///
    /// After a handoff the state is necessarily inconsistent: `LOCKED` is clear and the new owner
    /// is still counted as a waiter. The delta sets `LOCKED` and removes the owner from the
    /// waiter count. If the owner is the last waiter, or it was not `starving` itself, the delta
    /// also clears `STARVING`, switching the mutex back to normal mode.
    ///
    /// The returned value wraps and must be applied with a wrapping `fetch_add`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] unless the state is exactly "locked clear, woken clear,
    /// at least one waiter".
    pub fn handoff_delta(self, starving: bool) -> Result<u32, InvariantViolation> {
        if self.is_locked() || self.is_woken() || self.waiters() == 0 {
            return Err(InvariantViolation::InconsistentHandoff { state: self });
        }

        let mut delta = LOCKED_BIT.wrapping_sub(WAITER_ONE);
        if !starving || self.waiters() == 1 {
            delta = delta.wrapping_sub(STARVING_BIT);
        }
        Ok(delta)
    }

    /// Computes the state `unlock` installs to wake one waiter in normal mode, given the state
    /// right after the lock bit was dropped.
    ///
    /// Returns `None` if nobody needs to be woken: there are no waiters, or some thread already
    /// grabbed the lock, was already woken, or the mutex switched to starvation mode (in which
    /// case the handoff chain does not include us).
    #[inline]
    pub fn wake_candidate(self) -> Option<Self> {
        if self.waiters() == 0 || self.is_locked() || self.is_woken() || self.is_starving() {
            return None;
        }

        Some(
            self.with(Self::WAITERS, self.waiters() - 1)
                .with(Self::WOKEN, true),
        )
    }
}
