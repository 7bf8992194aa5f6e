// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// A monotonic time source.
///
/// The mutex only uses it to measure how long a waiter has been parked, so the origin of the
/// timeline is irrelevant. Readings must never go backwards.
pub trait Clock {
    /// Returns the current time in nanoseconds.
    fn now(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }
}

#[cfg(feature = "std")]
pub use std_clock::MonotonicClock;

#[cfg(feature = "std")]
mod std_clock {
    use super::Clock;
    use crate::ConstInit;
    use std::time::Instant;

    lazy_static::lazy_static! {
        static ref TIME_ANCHOR: Instant = Instant::now();
    }

    /// A [`Clock`] backed by [`std::time::Instant`].
    ///
    /// All instances share a process-wide anchor, readings are nanoseconds since the first time
    /// any `MonotonicClock` was read.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct MonotonicClock(());

    impl MonotonicClock {
        #[must_use]
        pub const fn new() -> Self {
            Self(())
        }
    }

    impl ConstInit for MonotonicClock {
        const INIT: Self = Self::new();
    }

    impl Clock for MonotonicClock {
        fn now(&self) -> u64 {
            // saturates after ~584 years of uptime
            u64::try_from(TIME_ANCHOR.elapsed().as_nanos()).unwrap_or(u64::MAX)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use core::time::Duration;

        #[test]
        fn monotonic() {
            let clock = MonotonicClock::new();
            let a = clock.now();
            std::thread::sleep(Duration::from_millis(2));
            let b = clock.now();
            assert!(b >= a + 2_000_000, "{b} - {a} < 2ms");
        }
    }
}
