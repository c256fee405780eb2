//! Monitor adapter: object locks from native code
//!
//! Native code takes the same per-object intrinsic lock managed code uses,
//! so both sides serialize against each other. Entry is recursive; exits
//! must pair with entries on the same thread. [`MonitorGuard`] gives the
//! lock RAII shape on the native side while staying interoperable with
//! manual enter/exit pairs.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::Reference;
use crate::vm::Env;
use hashi_core::Obj;

/// RAII wrapper holding one monitor entry; exits on drop.
pub struct MonitorGuard<'env> {
    env: &'env Env,
    obj: Obj,
    released: bool,
}

impl MonitorGuard<'_> {
    /// Release the lock explicitly, surfacing pairing errors that a drop
    /// would swallow.
    pub fn unlock(mut self) -> BridgeResult<()> {
        self.released = true;
        self.obj.monitor().exit(self.env.token).map_err(BridgeError::from)
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.obj.monitor().exit(self.env.token);
        }
    }
}

impl Env {
    /// Enter the object's monitor, blocking until available. Re-entry by
    /// the owning thread nests.
    pub fn monitor_enter<R: Reference>(&self, reference: R) -> BridgeResult<()> {
        let obj = reference.resolve(self)?;
        obj.monitor().enter(self.token);
        Ok(())
    }

    /// Exit one level of the object's monitor.
    pub fn monitor_exit<R: Reference>(&self, reference: R) -> BridgeResult<()> {
        let obj = reference.resolve(self)?;
        obj.monitor().exit(self.token)?;
        Ok(())
    }

    /// Enter the object's monitor and hold it for the guard's lifetime.
    pub fn lock<R: Reference>(&self, reference: R) -> BridgeResult<MonitorGuard<'_>> {
        let obj = reference.resolve(self)?;
        obj.monitor().enter(self.token);
        Ok(MonitorGuard { env: self, obj, released: false })
    }
}
