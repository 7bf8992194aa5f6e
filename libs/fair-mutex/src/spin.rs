// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::ConstInit;

/// Decides whether a contending thread should spin instead of parking.
///
/// Spinning is purely a performance optimization: the locking algorithm is correct for any
/// policy, including one that never spins or one that always spins for a bounded number of
/// rounds.
pub trait SpinPolicy {
    /// Returns `true` if active spinning is currently worthwhile for a thread that has already
    /// spun `iteration` times since it last woke up.
    ///
    /// Implementations must eventually return `false` for growing `iteration`s, otherwise a
    /// contending thread never parks.
    fn can_spin(&self, iteration: u32) -> bool;

    /// Busy-waits for one short round.
    fn spin_once(&self);
}

impl<P: SpinPolicy + ?Sized> SpinPolicy for &P {
    #[inline]
    fn can_spin(&self, iteration: u32) -> bool {
        (**self).can_spin(iteration)
    }

    #[inline]
    fn spin_once(&self) {
        (**self).spin_once();
    }
}

/// A [`SpinPolicy`] that never spins, every contending thread parks right away.
///
/// This is the right choice on uniprocessors where the lock holder cannot make progress while we
/// spin.
#[derive(Debug, Default, Copy, Clone)]
pub struct NeverSpin;

impl ConstInit for NeverSpin {
    const INIT: Self = NeverSpin;
}

impl SpinPolicy for NeverSpin {
    #[inline]
    fn can_spin(&self, _iteration: u32) -> bool {
        false
    }

    #[inline]
    fn spin_once(&self) {}
}

#[cfg(feature = "std")]
pub use adaptive::AdaptiveSpin;

#[cfg(feature = "std")]
mod adaptive {
    use super::SpinPolicy;
    use crate::ConstInit;
    use core::hint;
    use core::num::NonZeroUsize;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Spins for a few short rounds, but only when there is more than one CPU to run the lock
    /// holder on.
    #[derive(Debug, Copy, Clone)]
    pub struct AdaptiveSpin {
        max_rounds: u32,
        pauses_per_round: u32,
    }

    // === impl AdaptiveSpin ===

    impl AdaptiveSpin {
        /// The default number of spin rounds before a thread parks.
        pub const DEFAULT_MAX_ROUNDS: u32 = 4;
        /// The default number of [spin loop hints] issued per round.
        ///
        /// [spin loop hints]: hint::spin_loop
        pub const DEFAULT_PAUSES_PER_ROUND: u32 = 30;

        #[must_use]
        pub const fn new() -> Self {
            Self {
                max_rounds: Self::DEFAULT_MAX_ROUNDS,
                pauses_per_round: Self::DEFAULT_PAUSES_PER_ROUND,
            }
        }

        /// Returns a policy spinning for at most `max_rounds` rounds of `pauses_per_round` spin
        /// loop hints each.
        #[must_use]
        pub const fn with_limits(max_rounds: u32, pauses_per_round: u32) -> Self {
            Self {
                max_rounds,
                pauses_per_round,
            }
        }
    }

    impl Default for AdaptiveSpin {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ConstInit for AdaptiveSpin {
        const INIT: Self = Self::new();
    }

    impl SpinPolicy for AdaptiveSpin {
        fn can_spin(&self, iteration: u32) -> bool {
            iteration < self.max_rounds && available_parallelism() > 1
        }

        #[inline]
        fn spin_once(&self) {
            for _ in 0..self.pauses_per_round {
                // In tests, especially in loom tests, we need to yield the thread back to the runtime
                // so it can make progress. See https://github.com/tokio-rs/loom/issues/162#issuecomment-665128979
                #[cfg(any(test, loom))]
                crate::loom::thread::yield_now();

                hint::spin_loop();
            }
        }
    }

    /// Number of CPUs available to this process, queried once and cached.
    fn available_parallelism() -> usize {
        // not part of any modeled state, so this is a plain `core` atomic even under loom.
        // 0 means not yet queried
        static CACHED: AtomicUsize = AtomicUsize::new(0);

        let cached = CACHED.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }

        let n = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        CACHED.store(n, Ordering::Relaxed);
        n
    }

}
