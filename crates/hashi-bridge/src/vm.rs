//! VM handle and thread attachment
//!
//! A [`Vm`] wraps the managed runtime behind the boundary. Threads must
//! attach before touching managed state: attachment is per-thread,
//! reference-counted (nested attaches are idempotent), and exclusive to one
//! VM at a time. The per-thread state carries the local reference table,
//! frame marks, the pending exception slot, and the critical-section depth.
//!
//! The state lives in a `thread_local` cell. Operations borrow it only for
//! short table edits and always release the borrow before calling back into
//! the runtime, so native hooks invoked from managed code can re-enter.

use crate::error::{BridgeError, BridgeResult};
use dashmap::DashMap;
use hashi_core::monitor::ThreadToken;
use hashi_core::object::HeapObject;
use hashi_core::runtime::Thrown;
use hashi_core::{Obj, Runtime, RuntimeOptions};
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// VM construction options.
#[derive(Clone, Copy, Debug)]
pub struct VmOptions {
    /// Heap budget in bytes for the managed runtime.
    pub heap_limit: usize,
    /// Capacity of each thread's local reference table.
    pub local_capacity: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self { heap_limit: 64 * 1024 * 1024, local_capacity: 512 }
    }
}

pub(crate) struct VmInner {
    pub(crate) runtime: Runtime,
    pub(crate) globals: DashMap<u64, Obj>,
    pub(crate) weaks: DashMap<u64, Weak<HeapObject>>,
    pub(crate) next_global: AtomicU64,
    pub(crate) next_weak: AtomicU64,
    next_token: AtomicU64,
    pub(crate) field_cache: DashMap<String, crate::resolver::FieldId>,
    pub(crate) method_cache: DashMap<String, crate::resolver::MethodId>,
    pub(crate) local_capacity: usize,
}

/// One local reference table slot. The generation stamps the current
/// occupant: a handle resolves only while its generation matches, so a
/// stale handle from a popped frame never aliases a reused index.
pub(crate) struct LocalSlot {
    pub(crate) gen: u32,
    pub(crate) obj: Option<Obj>,
}

/// Per-thread attachment state.
pub(crate) struct ThreadState {
    pub(crate) vm: Weak<VmInner>,
    pub(crate) token: ThreadToken,
    pub(crate) attach_count: u32,
    /// Local reference table; empty slots are deleted references.
    pub(crate) locals: Vec<LocalSlot>,
    /// Deleted slots eligible for reuse.
    pub(crate) free: Vec<u32>,
    /// Generation of the most recently issued local handle.
    pub(crate) last_gen: u32,
    /// Start index of each pushed frame (the base frame is implicit).
    pub(crate) frames: Vec<usize>,
    pub(crate) pending: Option<Thrown>,
    pub(crate) critical_depth: u32,
}

thread_local! {
    static STATE: RefCell<Option<ThreadState>> = const { RefCell::new(None) };
}

/// Handle to a managed runtime instance. Clones share the same VM.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<VmInner>,
}

impl Vm {
    /// Create a VM with a fresh runtime.
    pub fn new(options: VmOptions) -> Self {
        Self {
            inner: Arc::new(VmInner {
                runtime: Runtime::new(RuntimeOptions { heap_limit: options.heap_limit }),
                globals: DashMap::new(),
                weaks: DashMap::new(),
                next_global: AtomicU64::new(1),
                next_weak: AtomicU64::new(1),
                next_token: AtomicU64::new(1),
                field_cache: DashMap::new(),
                method_cache: DashMap::new(),
                local_capacity: options.local_capacity,
            }),
        }
    }

    /// The managed runtime behind this VM, for class definition and setup.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Attach the current thread.
    ///
    /// Attaching an already-attached thread to the same VM nests; the
    /// thread detaches when the last guard drops. Attaching to a second
    /// VM while attached to another fails.
    pub fn attach(&self) -> BridgeResult<AttachGuard> {
        STATE.with(|cell| {
            let mut slot = cell.borrow_mut();
            match &mut *slot {
                Some(state) => {
                    if !Weak::ptr_eq(&state.vm, &Arc::downgrade(&self.inner)) {
                        return Err(BridgeError::AttachConflict);
                    }
                    state.attach_count += 1;
                }
                None => {
                    let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
                    *slot = Some(ThreadState {
                        vm: Arc::downgrade(&self.inner),
                        token,
                        attach_count: 1,
                        locals: Vec::new(),
                        free: Vec::new(),
                        last_gen: 0,
                        frames: Vec::new(),
                        pending: None,
                        critical_depth: 0,
                    });
                }
            }
            Ok(AttachGuard { vm: Arc::clone(&self.inner), _not_send: PhantomData })
        })
    }

    /// Environment for the current (attached) thread.
    pub fn env(&self) -> BridgeResult<Env> {
        STATE.with(|cell| {
            let slot = cell.borrow();
            let state = slot.as_ref().ok_or(BridgeError::Unattached)?;
            if !Weak::ptr_eq(&state.vm, &Arc::downgrade(&self.inner)) {
                return Err(BridgeError::AttachConflict);
            }
            Ok(Env { vm: Arc::clone(&self.inner), token: state.token })
        })
    }

    /// Attach, run `f` with the environment, detach.
    pub fn with_attached<R>(&self, f: impl FnOnce(&Env) -> BridgeResult<R>) -> BridgeResult<R> {
        let _attach = self.attach()?;
        let env = self.env()?;
        f(&env)
    }

    pub(crate) fn from_inner(inner: Arc<VmInner>) -> Self {
        Self { inner }
    }
}

/// Keeps the current thread attached; detaches on drop of the last guard.
pub struct AttachGuard {
    vm: Arc<VmInner>,
    // Attachment is a property of the creating thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        STATE.with(|cell| {
            let mut slot = cell.borrow_mut();
            let detach = match &mut *slot {
                Some(state) if Weak::ptr_eq(&state.vm, &Arc::downgrade(&self.vm)) => {
                    state.attach_count -= 1;
                    state.attach_count == 0
                }
                _ => false,
            };
            // Dropping the state releases every local reference and any
            // pending exception held by this thread.
            if detach {
                *slot = None;
            }
        });
    }
}

/// Per-thread view of an attached VM; the argument to every boundary
/// operation.
#[derive(Clone)]
pub struct Env {
    pub(crate) vm: Arc<VmInner>,
    pub(crate) token: ThreadToken,
}

impl Env {
    /// The managed runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.vm.runtime
    }

    /// Monitor token identifying this thread.
    pub fn thread_token(&self) -> ThreadToken {
        self.token
    }

    /// The VM this environment belongs to.
    pub fn vm(&self) -> Vm {
        Vm::from_inner(Arc::clone(&self.vm))
    }

    /// Run `f` with the thread state borrowed.
    ///
    /// The borrow must never be held across a call back into the runtime;
    /// callers gather what they need, drop the borrow, then call.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut ThreadState) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        STATE.with(|cell| {
            let mut slot = cell.borrow_mut();
            let state = slot.as_mut().ok_or(BridgeError::Unattached)?;
            if !Weak::ptr_eq(&state.vm, &Arc::downgrade(&self.vm)) {
                return Err(BridgeError::AttachConflict);
            }
            if state.token != self.token {
                return Err(BridgeError::Unattached);
            }
            f(state)
        })
    }
}

static GLOBAL_VM: OnceCell<Vm> = OnceCell::new();

/// Install the process-wide VM. Later calls are ignored; returns false
/// if a VM was already installed.
pub fn set_global_vm(vm: Vm) -> bool {
    GLOBAL_VM.set(vm).is_ok()
}

/// The process-wide VM, if one was installed.
pub fn global_vm() -> Option<Vm> {
    GLOBAL_VM.get().cloned()
}
