// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::clock::Clock;
use crate::loom::sync::atomic::{AtomicU64, Ordering};
use crate::semaphore::{ParkSemaphore, Semaphore};
use crate::spin::SpinPolicy;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Spins until `cond` returns `true`, panicking after a generous timeout so a broken test fails
/// instead of hanging.
#[track_caller]
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::yield_now();
    }
}

/// A [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn advance(&self, nanos: u64) {
        self.0.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A [`Clock`] that advances by a fixed step every time it is read.
#[derive(Debug)]
pub struct StepClock {
    now: AtomicU64,
    step: u64,
}

impl StepClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

/// A [`SpinPolicy`] that spins for a fixed number of rounds, yielding to the scheduler each time.
#[derive(Debug)]
pub struct YieldSpin {
    max_rounds: u32,
}

impl YieldSpin {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }
}

impl SpinPolicy for YieldSpin {
    fn can_spin(&self, iteration: u32) -> bool {
        iteration < self.max_rounds
    }

    fn spin_once(&self) {
        crate::loom::thread::yield_now();
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SemaEvent {
    Acquire { lifo: bool },
    Release { handoff: bool },
}

/// A [`ParkSemaphore`] that records every call and can hold back releases.
///
/// While [`hold`](Self::hold)ing, released tokens are recorded but not delivered until
/// [`flush`](Self::flush) is called, which lets tests decide who wins a race against a woken
/// waiter.
#[derive(Debug)]
pub struct RecordingSemaphore {
    inner: ParkSemaphore,
    events: Mutex<Vec<SemaEvent>>,
    held: Mutex<Option<Vec<bool>>>,
}

impl RecordingSemaphore {
    pub fn new() -> Self {
        Self {
            inner: ParkSemaphore::new(),
            events: Mutex::new(Vec::new()),
            held: Mutex::new(None),
        }
    }

    pub fn events(&self) -> Vec<SemaEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn hold(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.get_or_insert_with(Vec::new);
    }

    pub fn flush(&self) {
        let pending = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        for handoff in pending {
            self.inner.release(handoff);
        }
    }

    fn record(&self, event: SemaEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

// Safety: forwards to `ParkSemaphore`, held tokens are delivered later but never dropped
unsafe impl Semaphore for RecordingSemaphore {
    fn acquire(&self, lifo: bool) {
        self.record(SemaEvent::Acquire { lifo });
        self.inner.acquire(lifo);
    }

    fn release(&self, handoff: bool) {
        self.record(SemaEvent::Release { handoff });

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = held.as_mut() {
            pending.push(handoff);
            return;
        }
        drop(held);

        self.inner.release(handoff);
    }
}
