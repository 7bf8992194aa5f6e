// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::clock::Clock;
use crate::fatal::{InvariantViolation, fatal};
use crate::loom::loom_const_fn;
use crate::loom::sync::atomic::{AtomicU32, Ordering};
use crate::semaphore::Semaphore;
use crate::spin::SpinPolicy;
use crate::state::{LOCKED_BIT, LockState};
use core::fmt;

/// A waiter that has been parked for longer than this (in nanoseconds) switches the mutex to
/// starvation mode.
pub const STARVATION_THRESHOLD_NS: u64 = 1_000_000;

/// A raw mutual-exclusion lock with an opportunistic fast path and a starvation mode that bounds
/// worst-case waiting time.
///
/// The mutex is generic over its three collaborators:
/// - `S`, the [`Semaphore`] contending threads park on,
/// - `P`, the [`SpinPolicy`] deciding whether to spin before parking,
/// - `C`, the [`Clock`] used to measure how long waiters have been parked.
///
/// Ownership is not tied to a thread: any thread may unlock a mutex that was locked by another.
/// Locking a mutex twice from the same thread deadlocks.
///
/// Most users want the [`lock_api`] wrapper [`Mutex`](crate::Mutex) instead, which guarantees that
/// every `lock` is paired with exactly one `unlock`.
pub struct RawFairMutex<S, P, C> {
    state: AtomicU32,
    sema: S,
    spin: P,
    clock: C,
}

static_assertions::assert_not_impl_any!(RawFairMutex<(), (), ()>: Clone, Copy);

// === impl RawFairMutex ===

impl<S, P, C> RawFairMutex<S, P, C> {
    loom_const_fn! {
        /// Returns a new unlocked mutex using the given collaborators.
        #[must_use]
        pub const fn from_parts(sema: S, spin: P, clock: C) -> Self {
            Self {
                state: AtomicU32::new(LockState::UNLOCKED.into_raw()),
                sema,
                spin,
                clock,
            }
        }
    }

    /// Returns a snapshot of the current state word.
    ///
    /// The snapshot is stale the moment it is returned, it is only useful for diagnostics.
    #[inline]
    pub fn state(&self) -> LockState {
        self.load(Ordering::Relaxed)
    }

    pub fn semaphore(&self) -> &S {
        &self.sema
    }

    pub fn spin_policy(&self) -> &P {
        &self.spin
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline]
    fn load(&self, ordering: Ordering) -> LockState {
        LockState::from_raw(self.state.load(ordering))
    }

    #[inline]
    fn compare_exchange(
        &self,
        current: LockState,
        new: LockState,
        success: Ordering,
    ) -> Result<LockState, LockState> {
        self.state
            .compare_exchange(
                current.into_raw(),
                new.into_raw(),
                success,
                Ordering::Relaxed,
            )
            .map(LockState::from_raw)
            .map_err(LockState::from_raw)
    }
}

impl<S, P, C> RawFairMutex<S, P, C>
where
    S: Semaphore,
    P: SpinPolicy,
    C: Clock,
{
    /// Acquires the mutex, blocking the current thread until it is able to do so.
    ///
    /// There is no timeout and no way to cancel the acquisition.
    #[inline]
    pub fn lock(&self) {
        // Fast path: grab an unlocked mutex without waiters.
        if self
            .compare_exchange(
                LockState::UNLOCKED,
                LockState::UNLOCKED.with(LockState::LOCKED, true),
                Ordering::Acquire,
            )
            .is_err()
        {
            self.lock_slow();
        }
    }

    /// Attempts to acquire the mutex without blocking, returning `true` on success.
    ///
    /// This never barges into a starving mutex even if its lock bit is currently clear, the mutex
    /// is then in the middle of handing ownership to a waiter.
    #[inline]
    pub fn try_lock(&self) -> bool {
        let old = self.load(Ordering::Relaxed);
        if old.is_locked() || old.is_starving() {
            return false;
        }

        self.compare_exchange(old, old.with(LockState::LOCKED, true), Ordering::Acquire)
            .is_ok()
    }

    /// Releases the mutex.
    ///
    /// Aborts the process if the mutex is not locked.
    ///
    /// # Safety
    ///
    /// The mutex must be logically owned by the caller: it was locked through [`Self::lock`] or
    /// [`Self::try_lock`] and that ownership was not yet released, possibly by a different thread.
    #[inline]
    pub unsafe fn unlock(&self) {
        // Fast path: drop the lock bit.
        let old = LockState::from_raw(self.state.fetch_sub(LOCKED_BIT, Ordering::Release));
        if !old.is_locked() {
            fatal(InvariantViolation::UnlockOfUnlocked);
        }

        let new = old.with(LockState::LOCKED, false);
        if new != LockState::UNLOCKED {
            // Outlined slow path to allow inlining the fast path.
            self.unlock_slow(new);
        }
    }

    /// Returns `true` if the mutex is currently owned, including while ownership is being handed
    /// off in starvation mode.
    #[inline]
    pub fn is_locked(&self) -> bool {
        let state = self.load(Ordering::Relaxed);
        state.is_locked() || state.is_starving()
    }

    #[cold]
    fn lock_slow(&self) {
        tracing::trace!(state = ?self.state(), "RawFairMutex::lock_slow");

        let mut wait_start: Option<u64> = None;
        let mut starving = false;
        let mut awoke = false;
        let mut iter = 0;
        let mut old = self.load(Ordering::Relaxed);

        loop {
            // Don't spin in starvation mode, ownership is handed off to waiters so we won't be
            // able to acquire the mutex anyway.
            if old.allows_spinning() && self.spin.can_spin(iter) {
                // Active spinning makes sense. Try to set the woken flag to tell `unlock` not to
                // wake other parked threads, we are going to take the lock ourselves.
                if !awoke
                    && let Some(claimed) = old.claim_woken()
                    && self
                        .compare_exchange(old, claimed, Ordering::Relaxed)
                        .is_ok()
                {
                    awoke = true;
                }
                self.spin.spin_once();
                iter += 1;
                old = self.load(Ordering::Relaxed);
                continue;
            }

            let new = old
                .acquire_candidate(starving, awoke)
                .unwrap_or_else(|violation| fatal(violation));

            if new.is_starving() && !old.is_starving() {
                tracing::trace!(state = ?new, "RawFairMutex: entering starvation mode");
            }

            match self.compare_exchange(old, new, Ordering::Acquire) {
                Ok(_) if old.acquired_by_cas() => break,
                Ok(_) => {}
                Err(actual) => {
                    old = actual;
                    continue;
                }
            }

            // If we were already waiting before, queue at the front of the queue.
            let lifo = wait_start.is_some();
            let start = *wait_start.get_or_insert_with(|| self.clock.now());

            tracing::trace!(lifo, waiters = new.waiters(), "RawFairMutex: parking");
            self.sema.acquire(lifo);

            let waited = self.clock.now().saturating_sub(start);
            starving = starving || waited > STARVATION_THRESHOLD_NS;
            tracing::trace!(waited, starving, "RawFairMutex: woken");

            old = self.load(Ordering::Relaxed);
            if old.is_starving() {
                // Ownership was handed off to us, but the state is inconsistent: the lock bit is
                // not set and we are still accounted as a waiter. Fix that.
                let delta = old
                    .handoff_delta(starving)
                    .unwrap_or_else(|violation| fatal(violation));
                let prev = LockState::from_raw(self.state.fetch_add(delta, Ordering::Acquire));

                tracing::trace!(
                    state = ?prev,
                    exit_starvation = !starving || prev.waiters() == 1,
                    "RawFairMutex: acquired through handoff"
                );
                break;
            }

            awoke = true;
            iter = 0;
        }
    }

    #[cold]
    fn unlock_slow(&self, new: LockState) {
        if new.is_starving() {
            // Starvation mode: hand ownership off to the next waiter. The lock bit is not set,
            // the waiter sets it after wakeup, but the mutex is still considered locked while the
            // starving bit is set so new arrivals won't acquire it.
            self.sema.release(true);
            return;
        }

        let mut old = new;
        // If there are no waiters, or a thread has already been woken or grabbed the lock, no
        // need to wake anyone. Grab the right to wake someone otherwise.
        while let Some(next) = old.wake_candidate() {
            match self.compare_exchange(old, next, Ordering::Relaxed) {
                Ok(_) => {
                    self.sema.release(false);
                    return;
                }
                Err(actual) => old = actual,
            }
        }
    }
}

impl<S, P, C> fmt::Debug for RawFairMutex<S, P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFairMutex")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// Safety: mutual exclusion is provided by the state word, ownership in starvation mode is
// transferred through a `Semaphore` whose contract rules out spurious wakeups.
#[cfg(not(loom))]
unsafe impl<S, P, C> lock_api::RawMutex for RawFairMutex<S, P, C>
where
    S: Semaphore + crate::ConstInit,
    P: SpinPolicy + crate::ConstInit,
    C: Clock + crate::ConstInit,
{
    // Ownership is not tied to the locking thread.
    type GuardMarker = lock_api::GuardSend;

    const INIT: Self = Self::from_parts(S::INIT, P::INIT, C::INIT);

    #[inline]
    fn lock(&self) {
        RawFairMutex::lock(self);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        RawFairMutex::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { RawFairMutex::unlock(self) };
    }

    #[inline]
    fn is_locked(&self) -> bool {
        RawFairMutex::is_locked(self)
    }
}
