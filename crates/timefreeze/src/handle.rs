//! Scoped freeze handles that own one slot of the process-wide stack.

use chrono::{DateTime, Duration, Utc};

use crate::state::{self, FreezeError};

/// A scoped freeze of the process-wide clock.
///
/// Acquiring a handle pushes its target instant onto the clock stack, making
/// every reader in [`crate::source`] observe it until a more-nested freeze
/// begins. Dropping the handle releases the freeze and restores whatever was
/// beneath it: an outer freeze or the real clock.
///
/// The handle is the only legal way to mutate its own stack slot. Its
/// position is fixed for its whole lifetime; the stack only grows above it
/// through correctly nested begin/end pairs and is never reordered.
#[derive(Debug)]
pub struct FreezeHandle {
    position: usize,
    instant: DateTime<Utc>,
    released: bool,
}

/// Begins a freeze at `target`.
///
/// Convenience wrapper over [`FreezeHandle::begin`].
pub fn freeze(target: DateTime<Utc>) -> FreezeHandle {
    FreezeHandle::begin(target)
}

/// Runs `body` under a freeze at `target`, releasing it on every exit path.
///
/// The handle is released when the closure returns and also when it panics,
/// so an assertion failure inside `body` cannot leak a frozen clock into
/// later tests.
pub fn frozen<T>(target: DateTime<Utc>, body: impl FnOnce(&mut FreezeHandle) -> T) -> T {
    let mut handle = FreezeHandle::begin(target);
    body(&mut handle)
}

impl FreezeHandle {
    /// Begins a freeze at `target`.
    ///
    /// Immediately after this returns, every concurrent and subsequent
    /// [`crate::source::now`] call observes `target` until a nested freeze
    /// begins or this handle ticks.
    pub fn begin(target: DateTime<Utc>) -> Self {
        let position = state::lock().push(target);
        Self {
            position,
            instant: target,
            released: false,
        }
    }

    /// Returns the instant this handle currently pins its slot to.
    ///
    /// This is the handle's own tracked value. It equals the live `now()`
    /// only while no more-nested freeze shadows it.
    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.instant
    }

    /// Advances this handle's instant by `delta` and returns the new value.
    ///
    /// `delta` may be negative, positive, or zero with unrestricted
    /// magnitude; the arithmetic is pure duration addition with no timezone
    /// reinterpretation, so ticking across a daylight-saving boundary yields
    /// exactly `frozen_at() + delta`. Ticking while shadowed by a more-nested
    /// freeze is permitted and takes visible effect once the inner freeze
    /// ends.
    ///
    /// # Errors
    /// Returns [`FreezeError::NoActiveFreeze`] when the handle was already
    /// released.
    pub fn tick(&mut self, delta: Duration) -> Result<DateTime<Utc>, FreezeError> {
        let next = self.instant + delta;
        self.rewrite(next)
    }

    /// Jumps this handle's instant to an absolute `target`.
    ///
    /// Same slot addressing and error rules as [`tick`](Self::tick).
    ///
    /// # Errors
    /// Returns [`FreezeError::NoActiveFreeze`] when the handle was already
    /// released.
    pub fn move_to(&mut self, target: DateTime<Utc>) -> Result<DateTime<Utc>, FreezeError> {
        self.rewrite(target)
    }

    /// Ends this freeze, restoring the state beneath it.
    ///
    /// The first call pops this handle's slot; every subsequent call is a
    /// no-op. The idempotence is deliberate: freeze lifetimes are typically
    /// managed by scope exit, and double release from cleanup code must not
    /// corrupt the stack.
    ///
    /// # Errors
    /// Returns [`FreezeError::UnorderedRelease`] when more-nested freezes are
    /// still active. The release then has no effect and the handle stays
    /// live, so a later correct-order release still unwinds cleanly.
    pub fn end(&mut self) -> Result<(), FreezeError> {
        if self.released {
            return Ok(());
        }
        state::lock().release(self.position)?;
        self.released = true;
        Ok(())
    }

    fn rewrite(&mut self, next: DateTime<Utc>) -> Result<DateTime<Utc>, FreezeError> {
        if self.released {
            return Err(FreezeError::NoActiveFreeze {
                position: self.position,
            });
        }
        state::lock().set_at(self.position, next)?;
        self.instant = next;
        Ok(next)
    }
}

impl Drop for FreezeHandle {
    fn drop(&mut self) {
        // Errors cannot propagate from drop; an out-of-order drop leaves the
        // stack in its last consistent state, matching `end`.
        let _ = self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;
    use chrono::TimeZone;

    #[test]
    fn tick_applies_signed_deltas_to_the_live_instant() {
        let _guard = state::test_lock();
        let start = Utc.with_ymd_and_hms(2012, 1, 14, 1, 59, 59).unwrap();

        let mut handle = freeze(start);
        assert_eq!(source::now(), start);

        let moved = handle.tick(Duration::hours(-1)).expect("tick should apply");
        assert_eq!(moved, Utc.with_ymd_and_hms(2012, 1, 14, 0, 59, 59).unwrap());
        assert_eq!(source::now(), moved);
        assert_eq!(handle.frozen_at(), moved);
    }

    #[test]
    fn move_to_jumps_to_an_absolute_instant() {
        let _guard = state::test_lock();
        let start = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        let target = Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap();

        let mut handle = freeze(start);
        let moved = handle.move_to(target).expect("move should apply");
        assert_eq!(moved, target);
        assert_eq!(source::now(), target);
    }

    #[test]
    fn end_twice_is_a_no_op() {
        let _guard = state::test_lock();
        let mut handle = freeze(Utc.with_ymd_and_hms(2012, 1, 14, 1, 2, 3).unwrap());

        handle.end().expect("first end should succeed");
        handle.end().expect("second end should be a no-op");
        assert!(!source::is_frozen());
    }

    #[test]
    fn operations_after_end_report_no_active_freeze() {
        let _guard = state::test_lock();
        let mut handle = freeze(Utc.with_ymd_and_hms(2012, 1, 14, 1, 2, 3).unwrap());
        handle.end().unwrap();

        let err = handle.tick(Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, FreezeError::NoActiveFreeze { .. }));
        let err = handle
            .move_to(Utc.with_ymd_and_hms(2012, 1, 15, 0, 0, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, FreezeError::NoActiveFreeze { .. }));
    }

    #[test]
    fn frozen_closure_releases_on_exit() {
        let _guard = state::test_lock();
        let target = Utc.with_ymd_and_hms(2012, 1, 14, 1, 2, 3).unwrap();

        let observed = frozen(target, |_handle| source::now());
        assert_eq!(observed, target);
        assert!(!source::is_frozen());
    }
}
