// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A mutual-exclusion lock with two operating modes: *normal* and *starvation*.
//!
//! In normal mode waiters are queued in FIFO order, but a woken up waiter does not own the mutex
//! and competes with newly arriving threads over the ownership. New arrivals have an advantage,
//! they are already running on a CPU, so a woken up waiter has good chances of losing. In that
//! case it is queued at the *front* of the wait queue. If a waiter fails to acquire the mutex for
//! more than [`STARVATION_THRESHOLD_NS`] it switches the mutex to starvation mode.
//!
//! In starvation mode ownership of the mutex is directly handed off from the unlocking thread to
//! the waiter at the front of the queue. New arrivals don't try to acquire the mutex even if it
//! appears to be unlocked, and they don't spin. Instead they queue themselves at the tail of the
//! wait queue.
//!
//! If a waiter receives ownership of the mutex and sees that either it is the last waiter in the
//! queue, or it waited for less than the threshold, it switches the mutex back to normal mode.
//!
//! Normal mode has considerably better throughput as a thread can acquire the mutex several times
//! in a row even if there are blocked waiters. Starvation mode bounds tail latency.
//!
//! The entire lock state lives in a single [`LockState`] word that is only ever mutated through
//! atomic compare-and-swap or fetch-add. Blocking, spinning and time are delegated to the
//! [`Semaphore`], [`SpinPolicy`] and [`Clock`] collaborators respectively, which makes the
//! algorithm itself independent of any particular scheduler.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod clock;
mod fatal;
mod loom;
mod raw_mutex;
mod semaphore;
mod spin;
mod state;
#[cfg(test)]
mod test_util;

pub use clock::Clock;
#[cfg(feature = "std")]
pub use clock::MonotonicClock;
pub use fatal::InvariantViolation;
pub use raw_mutex::{RawFairMutex, STARVATION_THRESHOLD_NS};
#[cfg(feature = "std")]
pub use semaphore::ParkSemaphore;
pub use semaphore::Semaphore;
#[cfg(feature = "std")]
pub use spin::AdaptiveSpin;
pub use spin::{NeverSpin, SpinPolicy};
pub use state::{LockState, Mode};

/// The mutex with the default, thread-parking collaborators.
#[cfg(feature = "std")]
pub type RawMutex = RawFairMutex<ParkSemaphore, AdaptiveSpin, MonotonicClock>;
#[cfg(feature = "std")]
pub type Mutex<T> = lock_api::Mutex<RawMutex, T>;
#[cfg(feature = "std")]
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawMutex, T>;
#[cfg(feature = "std")]
pub type MappedMutexGuard<'a, T> = lock_api::MappedMutexGuard<'a, RawMutex, T>;

/// Types that can be constructed in a `const` context.
///
/// [`lock_api::RawMutex`] requires a `const INIT` value, so a [`RawFairMutex`] only implements it
/// when all of its collaborators implement this trait.
pub trait ConstInit {
    /// The initial value.
    const INIT: Self;
}
