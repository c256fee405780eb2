//! Exception bridge
//!
//! Managed exceptions never unwind through native frames. A throw latches
//! the exception object into the thread's pending slot; boundary calls
//! refuse to proceed until native code inspects and clears it. In the other
//! direction, [`Env::exception_guard`] converts native errors into managed
//! exceptions at the boundary, preserving the error message verbatim.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::{LocalRef, Reference};
use crate::resolver::ClassRef;
use crate::vm::Env;
use hashi_core::runtime::Thrown;
use hashi_core::Value;

impl Env {
    /// True if an exception is pending on this thread.
    pub fn exception_pending(&self) -> BridgeResult<bool> {
        self.with_state(|st| Ok(st.pending.is_some()))
    }

    /// The pending exception object, pinned behind a fresh local handle.
    /// Does not clear the pending state.
    pub fn exception_occurred(&self) -> BridgeResult<Option<LocalRef>> {
        let obj = self.with_state(|st| Ok(st.pending.as_ref().map(|t| t.object().clone())))?;
        match obj {
            Some(obj) => Ok(Some(self.alloc_local(obj)?)),
            None => Ok(None),
        }
    }

    /// Detail message of the pending exception, if any.
    pub fn exception_message(&self) -> BridgeResult<Option<String>> {
        self.with_state(|st| Ok(st.pending.as_ref().and_then(|t| t.message())))
    }

    /// Clear the pending exception.
    pub fn exception_clear(&self) -> BridgeResult<()> {
        self.with_state(|st| {
            st.pending = None;
            Ok(())
        })
    }

    /// Throw an existing throwable object on this thread.
    pub fn throw<R: Reference>(&self, reference: R) -> BridgeResult<()> {
        let obj = reference.resolve(self)?;
        let throwable = self.vm.runtime.find_class("rt/Throwable")?;
        if !self.vm.runtime.instance_of(obj.class(), throwable) {
            return Err(BridgeError::SignatureMismatch {
                expected: "rt/Throwable".into(),
                got: self.vm.runtime.class(obj.class())?.name().to_owned(),
            });
        }
        self.install_pending(Thrown::new(obj))?;
        Ok(())
    }

    /// Construct an exception of `class` with `message` and throw it.
    pub fn throw_new(&self, class: ClassRef, message: &str) -> BridgeResult<()> {
        let throwable = self.vm.runtime.find_class("rt/Throwable")?;
        if !self.vm.runtime.instance_of(class.0, throwable) {
            return Err(BridgeError::SignatureMismatch {
                expected: "rt/Throwable".into(),
                got: self.vm.runtime.class(class.0)?.name().to_owned(),
            });
        }
        let obj = self.vm.runtime.alloc_object(class.0)?;
        let msg = self.vm.runtime.alloc_string(message)?;
        obj.set_field(0, Value::Object(Some(msg)))?;
        self.install_pending(Thrown::new(obj))?;
        Ok(())
    }

    /// Run `f`; on error, latch a managed exception describing it and
    /// return `default`.
    ///
    /// This is the native-side boundary wrapper: native code that fails
    /// with a [`BridgeError`] surfaces to managed callers as a pending
    /// exception instead of a panic or a lost error.
    pub fn exception_guard<T>(
        &self,
        default: T,
        f: impl FnOnce(&Env) -> BridgeResult<T>,
    ) -> T {
        match f(self) {
            Ok(value) => value,
            Err(err) => {
                self.latch_error(&err);
                default
            }
        }
    }

    /// Ensure `err` is represented as a pending managed exception.
    pub(crate) fn latch_error(&self, err: &BridgeError) {
        // A managed exception is already pending from the throw site.
        if matches!(err, BridgeError::Managed { .. }) {
            return;
        }
        let thrown = match err {
            BridgeError::OutOfMemory => {
                self.vm.runtime.raise("rt/OutOfMemoryError", "heap budget exhausted")
            }
            BridgeError::RawFailure(_) => self.vm.runtime.raise("rt/Error", &err.to_string()),
            // Native failure text is preserved verbatim.
            BridgeError::Native(msg) => self.vm.runtime.raise("rt/RuntimeException", msg),
            other => self.vm.runtime.raise("rt/RuntimeException", &other.to_string()),
        };
        let _ = self.install_pending(thrown);
    }

    /// Latch `thrown` as pending and return the `Managed` error for it.
    pub(crate) fn install_pending(&self, thrown: Thrown) -> BridgeResult<BridgeError> {
        let class = self
            .vm
            .runtime
            .class(thrown.class_id())
            .map(|c| c.name().to_owned())
            .unwrap_or_default();
        let message = thrown.message().unwrap_or_default();
        self.with_state(|st| {
            st.pending = Some(thrown);
            Ok(())
        })?;
        Ok(BridgeError::Managed { class, message })
    }

    /// Fail with `ExceptionPending` if an exception is already pending.
    pub(crate) fn check_no_pending(&self) -> BridgeResult<()> {
        if self.exception_pending()? {
            return Err(BridgeError::ExceptionPending);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Vm, VmOptions};

    fn attached() -> (Vm, crate::vm::AttachGuard) {
        let vm = Vm::new(VmOptions::default());
        let guard = vm.attach().unwrap();
        (vm, guard)
    }

    #[test]
    fn test_throw_new_latches_pending() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        assert!(!env.exception_pending().unwrap());

        let rex = env.find_class("rt/RuntimeException").unwrap();
        env.throw_new(rex, "std::runtime_error").unwrap();
        assert!(env.exception_pending().unwrap());
        assert_eq!(env.exception_message().unwrap().as_deref(), Some("std::runtime_error"));

        env.exception_clear().unwrap();
        assert!(!env.exception_pending().unwrap());
    }

    #[test]
    fn test_exception_occurred_does_not_clear() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        let rex = env.find_class("rt/RuntimeException").unwrap();
        env.throw_new(rex, "still here").unwrap();

        let handle = env.exception_occurred().unwrap().unwrap();
        assert!(env.exception_pending().unwrap());
        assert!(env.is_instance_of(handle, rex).unwrap());
        env.exception_clear().unwrap();
        // The handle outlives the pending slot.
        handle.resolve(&env).unwrap();
    }

    #[test]
    fn test_throw_requires_throwable() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        let s = env.new_string("not throwable").unwrap();
        assert!(matches!(env.throw(s), Err(BridgeError::SignatureMismatch { .. })));
        let string_cls = env.find_class("rt/String").unwrap();
        assert!(matches!(
            env.throw_new(string_cls, "no"),
            Err(BridgeError::SignatureMismatch { .. })
        ));
        assert!(!env.exception_pending().unwrap());
    }

    #[test]
    fn test_guard_preserves_native_message() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        let out = env.exception_guard(0, |_env| {
            Err(BridgeError::Native("std::runtime_error".into()))
        });
        assert_eq!(out, 0);
        assert_eq!(env.exception_message().unwrap().as_deref(), Some("std::runtime_error"));
        let handle = env.exception_occurred().unwrap().unwrap();
        let rex = env.find_class("rt/RuntimeException").unwrap();
        assert!(env.is_instance_of(handle, rex).unwrap());
    }

    #[test]
    fn test_guard_maps_oom() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        env.exception_guard((), |_env| Err(BridgeError::OutOfMemory));
        let handle = env.exception_occurred().unwrap().unwrap();
        let oom = env.find_class("rt/OutOfMemoryError").unwrap();
        assert!(env.is_instance_of(handle, oom).unwrap());
    }

    #[test]
    fn test_guard_maps_raw_failure_to_error_class() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        env.exception_guard((), |_env| Err(BridgeError::RawFailure(-2)));
        let handle = env.exception_occurred().unwrap().unwrap();
        let error_cls = env.find_class("rt/Error").unwrap();
        assert!(env.is_instance_of(handle, error_cls).unwrap());
        let rex = env.find_class("rt/RuntimeException").unwrap();
        assert!(!env.is_instance_of(handle, rex).unwrap());
    }

    #[test]
    fn test_guard_passes_success_through() {
        let (vm, _guard) = attached();
        let env = vm.env().unwrap();
        let out = env.exception_guard(0, |_env| Ok(42));
        assert_eq!(out, 42);
        assert!(!env.exception_pending().unwrap());
    }
}
