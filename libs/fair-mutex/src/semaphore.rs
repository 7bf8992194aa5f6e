// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// A counting semaphore used by the mutex to park and wake contending threads.
///
/// # Safety
///
/// The mutex relies on this type to uphold mutual exclusion in starvation mode, where ownership
/// is transferred through the semaphore rather than the state word. Implementations must ensure
/// that:
///
/// - every return from [`acquire`](Self::acquire) consumes exactly one token made available by a
///   [`release`](Self::release), i.e. there are no spurious returns.
/// - a `release` with no blocked caller is not lost but makes the next `acquire` return without
///   blocking.
pub unsafe trait Semaphore {
    /// Blocks the calling thread until a token is available and consumes it.
    ///
    /// If `lifo` is `true` the caller is queued at the *front* of the wait queue instead of the
    /// back. The mutex uses this for threads that already waited once and lost the race for the
    /// lock.
    fn acquire(&self, lifo: bool);

    /// Makes one token available, waking exactly one blocked caller if there is any.
    ///
    /// If `handoff` is `true`, ownership of the mutex is being transferred directly to the woken
    /// caller and implementations should let it run as soon as possible.
    fn release(&self, handoff: bool);
}

// Safety: forwards to the underlying implementation
unsafe impl<S: Semaphore + ?Sized> Semaphore for &S {
    #[inline]
    fn acquire(&self, lifo: bool) {
        (**self).acquire(lifo);
    }

    #[inline]
    fn release(&self, handoff: bool) {
        (**self).release(handoff);
    }
}

#[cfg(feature = "std")]
pub use park::ParkSemaphore;

#[cfg(feature = "std")]
mod park {
    use super::Semaphore;
    use crate::loom::loom_const_fn;
    use crate::loom::sync::atomic::{AtomicBool, Ordering};
    use crate::loom::sync::{Arc, Mutex};
    use crate::loom::thread::{self, Thread};
    use core::fmt;
    use std::collections::VecDeque;
    use std::sync::PoisonError;

    /// A [`Semaphore`] that blocks threads by parking them.
    ///
    /// Tokens released while a thread is queued are granted to that thread directly, so a queued
    /// thread can never be overtaken by one that calls [`acquire`](Semaphore::acquire) later.
    pub struct ParkSemaphore {
        inner: Mutex<Inner>,
    }

    struct Inner {
        /// Tokens released while nobody was queued.
        tokens: u32,
        /// Parked threads, woken front to back.
        queue: VecDeque<Arc<Waiter>>,
    }

    struct Waiter {
        thread: Thread,
        granted: AtomicBool,
    }

    // === impl ParkSemaphore ===

    impl ParkSemaphore {
        loom_const_fn! {
            #[must_use]
            pub const fn new() -> Self {
                Self {
                    inner: Mutex::new(Inner {
                        tokens: 0,
                        queue: VecDeque::new(),
                    }),
                }
            }
        }

        /// Returns the number of threads currently blocked in `acquire`.
        pub fn num_queued(&self) -> usize {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .queue
                .len()
        }
    }

    impl Default for ParkSemaphore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(not(loom))]
    impl crate::ConstInit for ParkSemaphore {
        const INIT: Self = Self::new();
    }

    impl fmt::Debug for ParkSemaphore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            f.debug_struct("ParkSemaphore")
                .field("tokens", &inner.tokens)
                .field("queued", &inner.queue.len())
                .finish()
        }
    }

    // Safety: tokens are only handed out under the inner lock, either from the counter or by
    // granting them to exactly one dequeued waiter, and waiters only return once granted.
    unsafe impl Semaphore for ParkSemaphore {
        fn acquire(&self, lifo: bool) {
            let waiter = {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.tokens > 0 {
                    inner.tokens -= 1;
                    return;
                }

                let waiter = Arc::new(Waiter {
                    thread: thread::current(),
                    granted: AtomicBool::new(false),
                });
                if lifo {
                    inner.queue.push_front(waiter.clone());
                } else {
                    inner.queue.push_back(waiter.clone());
                }
                waiter
            };

            while !waiter.granted.load(Ordering::Acquire) {
                tracing::trace!("parking current thread ({:?})...", waiter.thread.id());
                thread::park();
            }
        }

        fn release(&self, handoff: bool) {
            let waiter = {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                match inner.queue.pop_front() {
                    Some(waiter) => waiter,
                    None => {
                        inner.tokens = inner
                            .tokens
                            .checked_add(1)
                            .expect("semaphore token count overflowed");
                        return;
                    }
                }
            };

            tracing::trace!(handoff, "unparking thread {:?}...", waiter.thread.id());
            waiter.granted.store(true, Ordering::Release);
            waiter.thread.unpark();

            if handoff {
                // give the new owner a chance to run right away instead of letting it wait for
                // our time slice to end
                thread::yield_now();
            }
        }
    }

}
