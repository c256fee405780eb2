//! Invocation layer: field access, method calls, native registration
//!
//! Calls go through resolved ids. Instance calls dispatch virtually on the
//! receiver's class; `call_nonvirtual_method` pins dispatch to the resolved
//! class. Every call validates argument kinds against the method signature
//! before touching managed code, refuses to run with an exception pending,
//! and refuses to run inside a critical array section.
//!
//! `register_natives` installs Rust closures as the bodies of
//! native-declared managed methods. The installed hook runs inside its own
//! local frame; errors it returns become managed exceptions in the caller.

use crate::codec::NativeValue;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{LocalRef, Reference};
use crate::resolver::{ClassRef, FieldId, MethodId};
use crate::signature::MethodSig;
use crate::vm::{Env, Vm};
use hashi_core::class::MethodBody;
use hashi_core::runtime::ClassId;
use hashi_core::{MethodImpl, Obj, Value};
use std::sync::Arc;

/// Rust implementation of a native-declared managed method.
///
/// Receives the environment of the calling thread, the receiver handle
/// (`None` for statics), and the arguments. A returned error becomes a
/// managed exception in the managed caller.
pub type NativeFn =
    Arc<dyn Fn(&Env, Option<LocalRef>, &[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync>;

/// One native method registration entry.
#[derive(Clone)]
pub struct NativeMethod {
    /// Declared method name.
    pub name: &'static str,
    /// Declared method signature.
    pub sig: &'static str,
    /// Implementation to install.
    pub func: NativeFn,
}

impl NativeMethod {
    /// Build an entry from a closure.
    pub fn new(
        name: &'static str,
        sig: &'static str,
        func: impl Fn(&Env, Option<LocalRef>, &[NativeValue]) -> BridgeResult<NativeValue>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self { name, sig, func: Arc::new(func) }
    }
}

impl Env {
    fn check_not_critical(&self) -> BridgeResult<()> {
        self.with_state(|st| {
            if st.critical_depth > 0 {
                return Err(BridgeError::CriticalSection);
            }
            Ok(())
        })
    }

    fn take_pending(&self) -> BridgeResult<Option<hashi_core::runtime::Thrown>> {
        self.with_state(|st| Ok(st.pending.take()))
    }

    fn field_sig(&self, field: FieldId) -> BridgeResult<String> {
        let def = self.vm.runtime.class(field.class)?;
        let declared = if field.is_static {
            def.static_def(field.slot as usize)
        } else {
            def.field_def(field.slot as usize)
        };
        declared.map(|f| f.sig.clone()).ok_or(BridgeError::InvalidHandle)
    }

    fn check_receiver_class(&self, obj: &Obj, class: ClassId) -> BridgeResult<()> {
        if !self.vm.runtime.instance_of(obj.class(), class) {
            return Err(BridgeError::SignatureMismatch {
                expected: self.vm.runtime.class(class)?.name().to_owned(),
                got: self.vm.runtime.class(obj.class())?.name().to_owned(),
            });
        }
        Ok(())
    }

    /// Read an instance field.
    pub fn get_field<R: Reference>(&self, obj: R, field: FieldId) -> BridgeResult<NativeValue> {
        if field.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let obj = obj.resolve(self)?;
        self.check_receiver_class(&obj, field.class)?;
        let value = obj.get_field(field.slot as usize)?;
        self.from_value(value)
    }

    /// Write an instance field; the value must match the declared
    /// signature exactly.
    pub fn set_field<R: Reference>(
        &self,
        obj: R,
        field: FieldId,
        value: &NativeValue,
    ) -> BridgeResult<()> {
        if field.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let sig = self.field_sig(field)?;
        let parsed = crate::signature::TypeSig::parse(&sig)?;
        if !value.matches(&parsed) {
            return Err(BridgeError::SignatureMismatch {
                expected: sig,
                got: value.kind_name().to_owned(),
            });
        }
        let obj = obj.resolve(self)?;
        self.check_receiver_class(&obj, field.class)?;
        let value = self.to_value(value)?;
        obj.set_field(field.slot as usize, value)?;
        Ok(())
    }

    /// Read a static field.
    pub fn get_static_field(&self, field: FieldId) -> BridgeResult<NativeValue> {
        if !field.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let def = self.vm.runtime.class(field.class)?;
        let value = def.get_static(field.slot as usize)?;
        self.from_value(value)
    }

    /// Write a static field; the value must match the declared signature
    /// exactly.
    pub fn set_static_field(&self, field: FieldId, value: &NativeValue) -> BridgeResult<()> {
        if !field.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let sig = self.field_sig(field)?;
        let parsed = crate::signature::TypeSig::parse(&sig)?;
        if !value.matches(&parsed) {
            return Err(BridgeError::SignatureMismatch {
                expected: sig,
                got: value.kind_name().to_owned(),
            });
        }
        let def = self.vm.runtime.class(field.class)?;
        let value = self.to_value(value)?;
        def.set_static(field.slot as usize, value)?;
        Ok(())
    }

    /// Validate `args` against the method's declared signature and convert
    /// them to managed values.
    fn check_args(&self, sig_text: &str, args: &[NativeValue]) -> BridgeResult<Vec<Value>> {
        let sig = MethodSig::parse(sig_text)?;
        if sig.args.len() != args.len() {
            return Err(BridgeError::SignatureMismatch {
                expected: sig_text.to_owned(),
                got: format!("{} argument(s)", args.len()),
            });
        }
        let mut values = Vec::with_capacity(args.len());
        for (arg, declared) in args.iter().zip(&sig.args) {
            if !arg.matches(declared) {
                return Err(BridgeError::SignatureMismatch {
                    expected: declared.to_string(),
                    got: arg.kind_name().to_owned(),
                });
            }
            values.push(self.to_value(arg)?);
        }
        Ok(values)
    }

    fn method_text(&self, method: MethodId) -> BridgeResult<(String, String)> {
        let def = self.vm.runtime.class(method.class)?;
        let m = def.method_at(method.index as usize).ok_or(BridgeError::InvalidHandle)?;
        Ok((m.name.clone(), m.sig.clone()))
    }

    fn dispatch(
        &self,
        class: ClassId,
        index: usize,
        receiver: Option<&Obj>,
        values: &[Value],
    ) -> BridgeResult<NativeValue> {
        match self.vm.runtime.call(class, index, receiver, values) {
            Ok(None) => Ok(NativeValue::Void),
            Ok(Some(v)) => self.from_value(v),
            Err(thrown) => Err(self.install_pending(thrown)?),
        }
    }

    /// Call an instance method with virtual dispatch on the receiver.
    pub fn call_method<R: Reference>(
        &self,
        receiver: R,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        self.check_no_pending()?;
        self.check_not_critical()?;
        if method.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let (name, sig) = self.method_text(method)?;
        let values = self.check_args(&sig, args)?;
        let obj = receiver.resolve(self)?;
        self.check_receiver_class(&obj, method.class)?;
        let (owner, index) = self
            .vm
            .runtime
            .select_method(obj.class(), &name, &sig)
            .ok_or(BridgeError::MemberNotFound {
                class: self.vm.runtime.class(obj.class())?.name().to_owned(),
                name,
                signature: sig,
            })?;
        self.dispatch(owner, index, Some(&obj), &values)
    }

    /// Call the exact resolved method, bypassing virtual dispatch.
    pub fn call_nonvirtual_method<R: Reference>(
        &self,
        receiver: R,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        self.check_no_pending()?;
        self.check_not_critical()?;
        if method.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let (_, sig) = self.method_text(method)?;
        let values = self.check_args(&sig, args)?;
        let obj = receiver.resolve(self)?;
        self.check_receiver_class(&obj, method.class)?;
        self.dispatch(method.class, method.index as usize, Some(&obj), &values)
    }

    /// Call a static method.
    pub fn call_static_method(
        &self,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        self.check_no_pending()?;
        self.check_not_critical()?;
        if !method.is_static {
            return Err(BridgeError::InvalidHandle);
        }
        let (_, sig) = self.method_text(method)?;
        let values = self.check_args(&sig, args)?;
        self.dispatch(method.class, method.index as usize, None, &values)
    }

    /// Allocate an instance of `class` and run the resolved constructor.
    pub fn new_object(
        &self,
        class: ClassRef,
        ctor: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<LocalRef> {
        self.check_no_pending()?;
        self.check_not_critical()?;
        if ctor.is_static || ctor.class != class.0 {
            return Err(BridgeError::InvalidHandle);
        }
        let (name, sig) = self.method_text(ctor)?;
        if name != "<init>" {
            return Err(BridgeError::InvalidHandle);
        }
        let values = self.check_args(&sig, args)?;
        let obj = self.vm.runtime.alloc_object(class.0)?;
        self.dispatch(ctor.class, ctor.index as usize, Some(&obj), &values)?;
        self.alloc_local(obj)
    }

    /// Install Rust implementations for native-declared methods of `class`.
    ///
    /// Each entry must name a method declared native on exactly this
    /// class. Re-registration replaces the previous implementation.
    pub fn register_natives(
        &self,
        class: ClassRef,
        methods: &[NativeMethod],
    ) -> BridgeResult<()> {
        let def = self.vm.runtime.class(class.0)?;
        for entry in methods {
            MethodSig::parse(entry.sig)?;
            let not_found = || BridgeError::MemberNotFound {
                class: def.name().to_owned(),
                name: entry.name.to_owned(),
                signature: entry.sig.to_owned(),
            };
            let index = def.find_method(entry.name, entry.sig).ok_or_else(not_found)?;
            let method = def.method_at(index).ok_or_else(not_found)?;
            {
                // Only native-declared methods accept a registration.
                let body = method.body.read();
                match &*body {
                    MethodBody::Native(_) | MethodBody::NativeUnbound => {}
                    MethodBody::Host(_) => return Err(not_found()),
                }
            }
            let hook = self.make_native_hook(Arc::clone(&entry.func));
            *method.body.write() = MethodBody::Native(hook);
        }
        Ok(())
    }

    /// Remove every registered native implementation from `class`,
    /// returning its native methods to the unbound state.
    pub fn unregister_natives(&self, class: ClassRef) -> BridgeResult<()> {
        let def = self.vm.runtime.class(class.0)?;
        let mut index = 0;
        while let Some(method) = def.method_at(index) {
            let registered = matches!(&*method.body.read(), MethodBody::Native(_));
            if registered {
                *method.body.write() = MethodBody::NativeUnbound;
            }
            index += 1;
        }
        Ok(())
    }

    /// Wrap a [`NativeFn`] as a runtime method body.
    ///
    /// The hook runs in a fresh local frame on the calling thread, which
    /// must already be attached (the call necessarily entered managed code
    /// through an attached environment). The VM is captured weakly so
    /// installed hooks do not keep it alive.
    fn make_native_hook(&self, func: NativeFn) -> MethodImpl {
        let vm_weak = Arc::downgrade(&self.vm);
        Arc::new(move |rt, recv, args| {
            let vm = match vm_weak.upgrade() {
                Some(vm) => vm,
                None => return Err(rt.raise("rt/Error", "VM shut down")),
            };
            let env = match Vm::from_inner(vm).env() {
                Ok(env) => env,
                Err(e) => return Err(rt.raise("rt/Error", &e.to_string())),
            };
            if env.push_local_frame().is_err() {
                return Err(rt.raise("rt/Error", "local frame unavailable"));
            }
            let result = (|| -> BridgeResult<Option<Value>> {
                let recv_ref = match recv {
                    Some(obj) => Some(env.alloc_local(Arc::clone(obj))?),
                    None => None,
                };
                let native_args = args
                    .iter()
                    .map(|v| env.from_value(v.clone()))
                    .collect::<BridgeResult<Vec<_>>>()?;
                let out = func(&env, recv_ref, &native_args)?;
                Ok(match out {
                    NativeValue::Void => None,
                    // Resolved before the frame pops; the raw object
                    // outlives its handle.
                    other => Some(env.to_value(&other)?),
                })
            })();
            let _ = env.pop_local_frame(None);
            match result {
                Ok(value) => {
                    // An exception thrown by the native and left pending
                    // propagates into the managed caller.
                    match env.take_pending() {
                        Ok(Some(thrown)) => Err(thrown),
                        _ => Ok(value),
                    }
                }
                Err(err) => {
                    env.latch_error(&err);
                    match env.take_pending() {
                        Ok(Some(thrown)) => Err(thrown),
                        _ => Err(rt.raise("rt/RuntimeException", &err.to_string())),
                    }
                }
            }
        })
    }
}
