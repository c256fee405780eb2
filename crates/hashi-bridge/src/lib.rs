//! Hashi binding layer
//!
//! Connects native Rust code to the `hashi-core` managed runtime the way a
//! foreign-function bridge does: every managed object crossing the boundary
//! is pinned behind an explicit handle, every call is mediated by resolved
//! member ids, and managed exceptions surface as a per-thread pending state
//! instead of unwinding through native frames.
//!
//! The entry point is [`Vm`]: attach the current thread, get an [`Env`],
//! and work through it.
//!
//! ```ignore
//! let vm = Vm::new(VmOptions::default());
//! let _attach = vm.attach()?;
//! let env = vm.env()?;
//! let class = env.find_class("geom/Point")?;
//! let ctor = env.get_method_id(class, "<init>", "(II)V")?;
//! let p = env.new_object(class, ctor, &[NativeValue::Int(3), NativeValue::Int(4)])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod array;
pub mod codec;
pub mod convert;
pub mod error;
pub mod except;
pub mod handle;
pub mod invoke;
pub mod monitor;
pub mod resolver;
pub mod signature;
pub mod vm;

pub use array::{ArrayView, PrimElem};
pub use codec::NativeValue;
pub use convert::{FromManaged, IntoManaged};
pub use error::{BridgeError, BridgeResult};
pub use handle::{GlobalRef, LocalRef, Reference, WeakRef};
pub use invoke::{NativeFn, NativeMethod};
pub use monitor::MonitorGuard;
pub use resolver::{ClassRef, FieldId, MethodId};
pub use signature::{MethodSig, TypeSig};
pub use vm::{global_vm, set_global_vm, AttachGuard, Env, Vm, VmOptions};

// Re-export the runtime model types callers need to stand up a VM.
pub use hashi_core::{ClassBuilder, MethodImpl, PrimKind, Runtime, RuntimeOptions, Value};
