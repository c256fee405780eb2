//! Reference manager: local, global, and weak handles
//!
//! Native code never holds a managed object directly; it holds a handle
//! that pins (or, for weak handles, observes) the object. Local handles
//! live in a per-thread table organized into frames and die when their
//! frame pops or the thread detaches. Global handles pin across threads
//! until explicitly deleted. Weak handles never pin: upgrading one yields
//! `None` once the object has been collected.
//!
//! A handle is a plain index token, cheap to copy and meaningless without
//! the environment that issued it. Stale or foreign handles resolve to
//! `InvalidHandle`, deleted ones to `DoubleRelease`.

use crate::error::{BridgeError, BridgeResult};
use crate::vm::Env;
use hashi_core::Obj;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Thread-confined handle into the local reference table.
///
/// Carries the generation of the slot it was issued for: once the slot is
/// reused (after a frame pop or deletion), the old handle stops resolving
/// instead of aliasing the new occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LocalRef {
    pub(crate) index: u32,
    pub(crate) gen: u32,
}

/// Process-wide handle that pins an object until deleted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GlobalRef(pub(crate) u64);

/// Non-pinning observer of an object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WeakRef(pub(crate) u64);

/// Strong handle kinds that can be resolved to the object they pin.
pub trait Reference: Copy {
    /// The pinned object.
    fn resolve(self, env: &Env) -> BridgeResult<Obj>;
}

impl Reference for LocalRef {
    fn resolve(self, env: &Env) -> BridgeResult<Obj> {
        env.with_state(|st| match st.locals.get(self.index as usize) {
            Some(slot) if slot.gen == self.gen => match &slot.obj {
                Some(obj) => Ok(Arc::clone(obj)),
                None => Err(BridgeError::InvalidHandle),
            },
            _ => Err(BridgeError::InvalidHandle),
        })
    }
}

impl Reference for GlobalRef {
    fn resolve(self, env: &Env) -> BridgeResult<Obj> {
        env.vm
            .globals
            .get(&self.0)
            .map(|entry| Arc::clone(&entry))
            .ok_or(BridgeError::InvalidHandle)
    }
}

impl Env {
    /// Pin `obj` with a new local handle in the current frame.
    pub(crate) fn alloc_local(&self, obj: Obj) -> BridgeResult<LocalRef> {
        let capacity = self.vm.local_capacity;
        self.with_state(|st| {
            st.last_gen = st.last_gen.wrapping_add(1);
            let gen = st.last_gen;
            let base = st.frames.last().copied().unwrap_or(0);
            // Reuse a deleted slot from the current frame if one exists.
            if let Some(pos) = st.free.iter().rposition(|&i| (i as usize) >= base) {
                let index = st.free.swap_remove(pos);
                let slot = &mut st.locals[index as usize];
                slot.gen = gen;
                slot.obj = Some(obj);
                return Ok(LocalRef { index, gen });
            }
            if st.locals.len() >= capacity {
                return Err(BridgeError::LocalOverflow { capacity });
            }
            let index = st.locals.len() as u32;
            st.locals.push(crate::vm::LocalSlot { gen, obj: Some(obj) });
            Ok(LocalRef { index, gen })
        })
    }

    /// Create an additional local handle to the same object.
    pub fn new_local_ref<R: Reference>(&self, reference: R) -> BridgeResult<LocalRef> {
        let obj = reference.resolve(self)?;
        self.alloc_local(obj)
    }

    /// Delete a local handle, releasing its pin.
    pub fn delete_local_ref(&self, reference: LocalRef) -> BridgeResult<()> {
        self.with_state(|st| {
            let slot = st
                .locals
                .get_mut(reference.index as usize)
                .ok_or(BridgeError::InvalidHandle)?;
            if slot.gen != reference.gen {
                return Err(BridgeError::InvalidHandle);
            }
            if slot.obj.is_none() {
                return Err(BridgeError::DoubleRelease);
            }
            slot.obj = None;
            st.free.push(reference.index);
            Ok(())
        })
    }

    /// Pin the referenced object with a global handle.
    pub fn new_global_ref<R: Reference>(&self, reference: R) -> BridgeResult<GlobalRef> {
        let obj = reference.resolve(self)?;
        let id = self.vm.next_global.fetch_add(1, Ordering::Relaxed);
        self.vm.globals.insert(id, obj);
        Ok(GlobalRef(id))
    }

    /// Delete a global handle, releasing its pin.
    pub fn delete_global_ref(&self, reference: GlobalRef) -> BridgeResult<()> {
        self.vm
            .globals
            .remove(&reference.0)
            .map(|_| ())
            .ok_or(BridgeError::DoubleRelease)
    }

    /// Observe the referenced object with a weak handle.
    pub fn new_weak_ref<R: Reference>(&self, reference: R) -> BridgeResult<WeakRef> {
        let obj = reference.resolve(self)?;
        let id = self.vm.next_weak.fetch_add(1, Ordering::Relaxed);
        self.vm.weaks.insert(id, Arc::downgrade(&obj));
        Ok(WeakRef(id))
    }

    /// Delete a weak handle.
    pub fn delete_weak_ref(&self, reference: WeakRef) -> BridgeResult<()> {
        self.vm
            .weaks
            .remove(&reference.0)
            .map(|_| ())
            .ok_or(BridgeError::DoubleRelease)
    }

    /// Upgrade a weak handle to a fresh local handle.
    ///
    /// Returns `None` once the observed object has been collected.
    pub fn upgrade_weak(&self, reference: WeakRef) -> BridgeResult<Option<LocalRef>> {
        let weak = self
            .vm
            .weaks
            .get(&reference.0)
            .map(|entry| entry.clone())
            .ok_or(BridgeError::InvalidHandle)?;
        match weak.upgrade() {
            Some(obj) => Ok(Some(self.alloc_local(obj)?)),
            None => Ok(None),
        }
    }

    /// True once the object observed by `reference` has been collected.
    pub fn weak_is_cleared(&self, reference: WeakRef) -> BridgeResult<bool> {
        let weak = self
            .vm
            .weaks
            .get(&reference.0)
            .map(|entry| entry.clone())
            .ok_or(BridgeError::InvalidHandle)?;
        Ok(weak.upgrade().is_none())
    }

    /// Open a new local frame; handles created after this call die when
    /// the frame pops.
    pub fn push_local_frame(&self) -> BridgeResult<()> {
        self.with_state(|st| {
            st.frames.push(st.locals.len());
            Ok(())
        })
    }

    /// Pop the innermost local frame, deleting its handles.
    ///
    /// `keep` survives the pop: it is re-pinned in the enclosing frame and
    /// the new handle is returned.
    pub fn pop_local_frame(&self, keep: Option<LocalRef>) -> BridgeResult<Option<LocalRef>> {
        let kept = match keep {
            Some(r) => Some(r.resolve(self)?),
            None => None,
        };
        self.with_state(|st| {
            let base = st.frames.pop().ok_or(BridgeError::InvalidHandle)?;
            st.locals.truncate(base);
            st.free.retain(|&i| (i as usize) < base);
            Ok(())
        })?;
        match kept {
            Some(obj) => Ok(Some(self.alloc_local(obj)?)),
            None => Ok(None),
        }
    }

    /// Run `f` inside its own local frame.
    pub fn with_local_frame<R>(&self, f: impl FnOnce(&Env) -> BridgeResult<R>) -> BridgeResult<R> {
        self.push_local_frame()?;
        let result = f(self);
        let popped = self.pop_local_frame(None);
        match (result, popped) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), _) => Err(e),
            (_, Err(e)) => Err(e),
        }
    }

    /// True if both handles refer to the same object (two `None`s agree).
    pub fn is_same_object<A: Reference, B: Reference>(
        &self,
        a: Option<A>,
        b: Option<B>,
    ) -> BridgeResult<bool> {
        match (a, b) {
            (None, None) => Ok(true),
            (Some(_), None) | (None, Some(_)) => Ok(false),
            (Some(a), Some(b)) => {
                let a = a.resolve(self)?;
                let b = b.resolve(self)?;
                Ok(Arc::ptr_eq(&a, &b))
            }
        }
    }

    /// Number of live local handles, for diagnostics.
    pub fn local_ref_count(&self) -> BridgeResult<usize> {
        self.with_state(|st| Ok(st.locals.iter().filter(|s| s.obj.is_some()).count()))
    }
}
