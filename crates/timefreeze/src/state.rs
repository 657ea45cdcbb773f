//! Process-wide frozen-clock stack shared by every time reader.
//!
//! The stack is the single point of truth for "what time is it right now":
//! while it is non-empty, its top entry overrides the real clock for every
//! reader in [`crate::source`]. All access goes through [`ClockState`] behind
//! one mutex, so no ambient alias can bypass the LIFO discipline.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

/// Errors surfaced when the freeze stack is addressed incorrectly.
///
/// Both variants indicate an ordering bug in the caller rather than a
/// recoverable runtime condition. They are reported immediately instead of
/// being absorbed: a silently wrong "current time" produces confusing
/// downstream test failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreezeError {
    /// An operation addressed a stack slot that no longer exists.
    #[error("no active freeze at stack position {position}")]
    NoActiveFreeze {
        /// Slot position the failed operation addressed.
        position: usize,
    },
    /// A freeze was released while more-nested freezes were still active.
    #[error("freeze at position {position} released out of order ({depth} freezes active)")]
    UnorderedRelease {
        /// Slot position of the handle that attempted the release.
        position: usize,
        /// Number of freezes that were active at the time.
        depth: usize,
    },
}

/// The authoritative stack of active frozen instants.
///
/// Empty stack means the real clock is authoritative. The stack is only ever
/// modified by push (freeze begin) and pop (freeze end) in strict LIFO
/// order; slot rewrites for ticking are position-addressed and never reorder
/// entries.
#[derive(Debug)]
pub(crate) struct ClockState {
    stack: Vec<DateTime<Utc>>,
}

static STATE: Mutex<ClockState> = Mutex::new(ClockState::new());

/// Locks the process-wide clock state.
///
/// A poisoned lock is recovered rather than propagated: a panicking test
/// that held the lock must not wedge every later time query in the process.
pub(crate) fn lock() -> MutexGuard<'static, ClockState> {
    STATE.lock().unwrap_or_else(|err| err.into_inner())
}

impl ClockState {
    const fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Returns the live frozen instant, or `None` when the real clock is
    /// authoritative.
    pub(crate) fn current(&self) -> Option<DateTime<Utc>> {
        self.stack.last().copied()
    }

    /// Pushes a new frozen instant and returns the slot position it owns.
    pub(crate) fn push(&mut self, instant: DateTime<Utc>) -> usize {
        self.stack.push(instant);
        self.stack.len() - 1
    }

    /// Rewrites the instant at `position` in place.
    ///
    /// The slot need not be the top: an outer handle may tick while shadowed
    /// by a more-nested freeze. Only reads privilege the topmost slot.
    pub(crate) fn set_at(
        &mut self,
        position: usize,
        instant: DateTime<Utc>,
    ) -> Result<(), FreezeError> {
        match self.stack.get_mut(position) {
            Some(slot) => {
                *slot = instant;
                Ok(())
            }
            None => Err(FreezeError::NoActiveFreeze { position }),
        }
    }

    /// Removes the slot at `position`, which must be the current top.
    ///
    /// On [`FreezeError::UnorderedRelease`] the stack is left untouched so a
    /// subsequent correct-order release sequence can still unwind cleanly.
    pub(crate) fn release(&mut self, position: usize) -> Result<(), FreezeError> {
        let depth = self.stack.len();
        if position >= depth {
            return Err(FreezeError::NoActiveFreeze { position });
        }
        if position + 1 != depth {
            return Err(FreezeError::UnorderedRelease { position, depth });
        }
        self.stack.pop();
        Ok(())
    }

    /// Returns the number of active freezes.
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Serializes unit tests that touch the process-wide stack.
#[cfg(test)]
pub(crate) fn test_lock() -> MutexGuard<'static, ()> {
    static TEST_LOCK: Mutex<()> = Mutex::new(());
    TEST_LOCK.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn empty_stack_defers_to_real_clock() {
        let state = ClockState::new();
        assert_eq!(state.current(), None);
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn push_and_release_follow_lifo_order() {
        let mut state = ClockState::new();
        let outer = state.push(instant(100));
        let inner = state.push(instant(200));

        assert_eq!(state.current(), Some(instant(200)));
        state.release(inner).expect("inner release should succeed");
        assert_eq!(state.current(), Some(instant(100)));
        state.release(outer).expect("outer release should succeed");
        assert_eq!(state.current(), None);
    }

    #[test]
    fn set_at_rewrites_shadowed_slots() {
        let mut state = ClockState::new();
        let outer = state.push(instant(100));
        state.push(instant(200));

        state
            .set_at(outer, instant(150))
            .expect("shadowed slot should be writable");

        // The live instant is still the inner freeze.
        assert_eq!(state.current(), Some(instant(200)));
        state.release(1).unwrap();
        assert_eq!(state.current(), Some(instant(150)));
    }

    #[test]
    fn release_out_of_order_leaves_stack_untouched() {
        let mut state = ClockState::new();
        let outer = state.push(instant(100));
        let inner = state.push(instant(200));

        let err = state.release(outer).unwrap_err();
        assert_eq!(
            err,
            FreezeError::UnorderedRelease {
                position: outer,
                depth: 2
            }
        );

        // The violating release had no effect; correct ordering still unwinds.
        assert_eq!(state.depth(), 2);
        assert_eq!(state.current(), Some(instant(200)));
        state.release(inner).unwrap();
        state.release(outer).unwrap();
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn stale_positions_report_no_active_freeze() {
        let mut state = ClockState::new();
        assert_eq!(
            state.set_at(0, instant(1)).unwrap_err(),
            FreezeError::NoActiveFreeze { position: 0 }
        );
        assert_eq!(
            state.release(3).unwrap_err(),
            FreezeError::NoActiveFreeze { position: 3 }
        );
    }
}
