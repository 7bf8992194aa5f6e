// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::state::LockState;
use core::fmt;

/// A broken invariant of the mutex.
///
/// These are never returned from the mutex itself. They indicate either misuse by the caller or a
/// bug in the locking algorithm (or corruption of the state word), and the mutex reacts to them by
/// terminating the process through [`fatal`]. The pure state transitions on [`LockState`] report
/// them as values so they can be tested.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InvariantViolation {
    /// `unlock` was called on a mutex that was not locked.
    UnlockOfUnlocked,
    /// A thread that claimed the wake responsibility found the `WOKEN` flag already cleared.
    WokenNotSet { state: LockState },
    /// A waiter woken in starvation mode found a state other than "locked clear, woken clear,
    /// at least one waiter".
    InconsistentHandoff { state: LockState },
    /// Queueing one more waiter would overflow the waiter count.
    WaiterOverflow { state: LockState },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::UnlockOfUnlocked => f.write_str("unlock of unlocked mutex"),
            InvariantViolation::WokenNotSet { state } => {
                write!(f, "inconsistent mutex state: woken flag missing ({state:?})")
            }
            InvariantViolation::InconsistentHandoff { state } => {
                write!(f, "inconsistent mutex state: bad handoff ({state:?})")
            }
            InvariantViolation::WaiterOverflow { state } => {
                write!(f, "inconsistent mutex state: too many waiters ({state:?})")
            }
        }
    }
}

impl core::error::Error for InvariantViolation {}

/// Terminates execution because of a broken mutex invariant. This function never returns.
///
/// With `std` the process is aborted, without it the violation is raised as a panic (`no_std`
/// targets are expected to build with `panic = "abort"`). Either way it is not an error callers
/// can handle.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn fatal(violation: InvariantViolation) -> ! {
    tracing::error!(%violation, "fatal mutex invariant violation");

    cfg_if::cfg_if! {
        if #[cfg(any(test, feature = "std"))] {
            std::eprintln!(
                "fatal error: sync: {violation} at {}",
                core::panic::Location::caller()
            );
            std::process::abort();
        } else {
            panic!("fatal error: sync: {violation}");
        }
    }
}
