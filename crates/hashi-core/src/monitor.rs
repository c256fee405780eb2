//! Per-object intrinsic locks
//!
//! Each heap object carries a monitor: a mutex owned by a logical thread
//! token with a recursion count. Managed block-scoped locking and native
//! enter/exit pairs share the same monitor, so a native enter on a thread
//! that already holds the lock via managed code nests instead of
//! deadlocking. Mutual exclusion and release/acquire ordering come from the
//! underlying parking_lot mutex, which is what gives consecutive holders
//! the happens-before guarantee on writes made under the lock.

use crate::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};

/// Token identifying a logical thread to the monitor (assigned at attach).
pub type ThreadToken = u64;

#[derive(Debug)]
struct MonitorState {
    owner: Option<ThreadToken>,
    recursion: u32,
}

/// Intrinsic lock of one managed object.
#[derive(Debug)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    cond: Condvar,
}

impl Monitor {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState { owner: None, recursion: 0 }),
            cond: Condvar::new(),
        }
    }

    /// Acquire the lock for `thread`, blocking until available.
    ///
    /// Re-entry by the current owner nests.
    pub fn enter(&self, thread: ThreadToken) {
        let mut state = self.state.lock();
        if state.owner == Some(thread) {
            state.recursion += 1;
            return;
        }
        while state.owner.is_some() {
            self.cond.wait(&mut state);
        }
        state.owner = Some(thread);
        state.recursion = 1;
    }

    /// Acquire the lock for `thread` without blocking.
    pub fn try_enter(&self, thread: ThreadToken) -> bool {
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(thread);
                state.recursion = 1;
                true
            }
            Some(owner) if owner == thread => {
                state.recursion += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Release one level of the lock held by `thread`.
    ///
    /// Exit by a thread that does not own the lock is a pairing violation.
    pub fn exit(&self, thread: ThreadToken) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.owner != Some(thread) {
            return Err(CoreError::MonitorState("exit by non-owner thread"));
        }
        state.recursion -= 1;
        if state.recursion == 0 {
            state.owner = None;
            drop(state);
            self.cond.notify_one();
        }
        Ok(())
    }

    /// True if `thread` currently owns the lock.
    pub fn is_held_by(&self, thread: ThreadToken) -> bool {
        self.state.lock().owner == Some(thread)
    }
}
