//! Class system: definitions, builders, method bodies
//!
//! Classes are registered once and live for the process lifetime. Instance
//! field slots are flattened across the inheritance chain (inherited slots
//! first), so a slot index resolved against a class is valid for every
//! subclass instance. Method bodies are either host closures (managed code
//! modeled in Rust) or native hooks installed later by the binding layer's
//! registration operation.

use crate::object::Obj;
use crate::runtime::{ClassId, Runtime, Thrown};
use crate::value::{default_for_sig, Value};
use crate::{CoreError, CoreResult};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Callable body of a managed method.
///
/// Receives the runtime, the receiver (`None` for statics), and the
/// argument values; returns the result value (`None` for void) or a
/// managed exception.
pub type MethodImpl =
    Arc<dyn Fn(&Runtime, Option<&Obj>, &[Value]) -> Result<Option<Value>, Thrown> + Send + Sync>;

/// How a method executes.
pub enum MethodBody {
    /// Managed code, modeled as a host closure.
    Host(MethodImpl),
    /// Native code, installed through the binding layer's registration.
    Native(MethodImpl),
    /// Declared native but not yet registered; calling it throws.
    NativeUnbound,
}

/// A declared field.
#[derive(Clone, Debug)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Type signature text (e.g. `I`, `Lrt/String;`, `[I`).
    pub sig: String,
}

/// A declared method.
pub struct MethodDef {
    /// Method name (`<init>` for constructors).
    pub name: String,
    /// Method signature text (e.g. `(II)V`).
    pub sig: String,
    /// Static methods take no receiver.
    pub is_static: bool,
    /// Executable body; native registration swaps this at runtime.
    pub body: RwLock<MethodBody>,
}

/// A registered class.
pub struct Class {
    id: ClassId,
    name: String,
    super_id: Option<ClassId>,
    /// Instance field slots, inherited slots first.
    fields: Vec<FieldDef>,
    static_fields: Vec<FieldDef>,
    statics: Mutex<Vec<Value>>,
    methods: Vec<MethodDef>,
    /// Own-method lookup keyed by `name + sig`.
    method_index: FxHashMap<String, usize>,
}

impl Class {
    /// Class id.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Fully-qualified, slash-separated name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Superclass, if any.
    pub fn super_id(&self) -> Option<ClassId> {
        self.super_id
    }

    /// Instance field slot for `name`, if declared (including inherited).
    pub fn field_slot(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Declared instance field at `slot`.
    pub fn field_def(&self, slot: usize) -> Option<&FieldDef> {
        self.fields.get(slot)
    }

    /// Number of instance field slots.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Static field slot for `name`, if declared on this class.
    pub fn static_slot(&self, name: &str) -> Option<usize> {
        self.static_fields.iter().position(|f| f.name == name)
    }

    /// Declared static field at `slot`.
    pub fn static_def(&self, slot: usize) -> Option<&FieldDef> {
        self.static_fields.get(slot)
    }

    /// Read a static field slot.
    pub fn get_static(&self, slot: usize) -> CoreResult<Value> {
        let statics = self.statics.lock();
        statics
            .get(slot)
            .cloned()
            .ok_or(CoreError::OutOfBounds { index: slot, len: statics.len() })
    }

    /// Write a static field slot. The stored kind must match exactly.
    pub fn set_static(&self, slot: usize, value: Value) -> CoreResult<()> {
        let mut statics = self.statics.lock();
        let len = statics.len();
        let cell = statics
            .get_mut(slot)
            .ok_or(CoreError::OutOfBounds { index: slot, len })?;
        if cell.kind() != value.kind() {
            return Err(CoreError::KindMismatch {
                expected: cell.kind().name(),
                got: value.kind().name(),
            });
        }
        *cell = value;
        Ok(())
    }

    /// Index of the own method with this exact name and signature.
    pub fn find_method(&self, name: &str, sig: &str) -> Option<usize> {
        let mut key = String::with_capacity(name.len() + sig.len());
        key.push_str(name);
        key.push_str(sig);
        self.method_index.get(&key).copied()
    }

    /// Declared method at `index`.
    pub fn method_at(&self, index: usize) -> Option<&MethodDef> {
        self.methods.get(index)
    }
}

enum PendingMethod {
    Host { name: String, sig: String, is_static: bool, body: MethodImpl },
    Native { name: String, sig: String, is_static: bool },
}

/// Fluent builder for class definitions; consumed by
/// [`Runtime::define_class`].
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) super_id: Option<ClassId>,
    fields: Vec<FieldDef>,
    static_fields: Vec<FieldDef>,
    methods: Vec<PendingMethod>,
}

impl ClassBuilder {
    /// Start a class definition. Names may use `/` or `.` separators;
    /// they are stored slash-separated.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().replace('.', "/"),
            super_id: None,
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Set the superclass.
    pub fn extends(mut self, super_id: ClassId) -> Self {
        self.super_id = Some(super_id);
        self
    }

    /// Declare an instance field.
    pub fn field(mut self, name: impl Into<String>, sig: impl Into<String>) -> Self {
        self.fields.push(FieldDef { name: name.into(), sig: sig.into() });
        self
    }

    /// Declare a static field.
    pub fn static_field(mut self, name: impl Into<String>, sig: impl Into<String>) -> Self {
        self.static_fields.push(FieldDef { name: name.into(), sig: sig.into() });
        self
    }

    /// Declare an instance method with a host body.
    pub fn method(
        mut self,
        name: impl Into<String>,
        sig: impl Into<String>,
        body: MethodImpl,
    ) -> Self {
        self.methods.push(PendingMethod::Host {
            name: name.into(),
            sig: sig.into(),
            is_static: false,
            body,
        });
        self
    }

    /// Declare a static method with a host body.
    pub fn static_method(
        mut self,
        name: impl Into<String>,
        sig: impl Into<String>,
        body: MethodImpl,
    ) -> Self {
        self.methods.push(PendingMethod::Host {
            name: name.into(),
            sig: sig.into(),
            is_static: true,
            body,
        });
        self
    }

    /// Declare a constructor (`<init>`); the body runs on a freshly
    /// allocated instance.
    pub fn constructor(self, sig: impl Into<String>, body: MethodImpl) -> Self {
        self.method("<init>", sig, body)
    }

    /// Declare a native method; it throws until the binding layer
    /// registers an implementation.
    pub fn native_method(
        mut self,
        name: impl Into<String>,
        sig: impl Into<String>,
        is_static: bool,
    ) -> Self {
        self.methods.push(PendingMethod::Native { name: name.into(), sig: sig.into(), is_static });
        self
    }

    /// Finalize into a [`Class`] with the given id and inherited slots.
    pub(crate) fn build(self, id: ClassId, inherited: Vec<FieldDef>) -> Class {
        let mut fields = inherited;
        fields.extend(self.fields);

        let statics: Vec<Value> =
            self.static_fields.iter().map(|f| default_for_sig(&f.sig)).collect();

        let mut methods = Vec::with_capacity(self.methods.len());
        let mut method_index = FxHashMap::default();
        for pending in self.methods {
            let (name, sig, is_static, body) = match pending {
                PendingMethod::Host { name, sig, is_static, body } => {
                    (name, sig, is_static, MethodBody::Host(body))
                }
                PendingMethod::Native { name, sig, is_static } => {
                    (name, sig, is_static, MethodBody::NativeUnbound)
                }
            };
            let mut key = String::with_capacity(name.len() + sig.len());
            key.push_str(&name);
            key.push_str(&sig);
            method_index.insert(key, methods.len());
            methods.push(MethodDef { name, sig, is_static, body: RwLock::new(body) });
        }

        Class {
            id,
            name: self.name,
            super_id: self.super_id,
            fields,
            static_fields: self.static_fields,
            statics: Mutex::new(statics),
            methods,
            method_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_slots() {
        let builder = ClassBuilder::new("demo.Pair").field("a", "I").field("b", "J");
        let class = builder.build(ClassId(7), Vec::new());
        assert_eq!(class.name(), "demo/Pair");
        assert_eq!(class.field_slot("a"), Some(0));
        assert_eq!(class.field_slot("b"), Some(1));
        assert_eq!(class.field_slot("c"), None);
    }

    #[test]
    fn test_inherited_slots_come_first() {
        let inherited = vec![FieldDef { name: "x".into(), sig: "I".into() }];
        let class = ClassBuilder::new("demo/Sub").field("y", "I").build(ClassId(1), inherited);
        assert_eq!(class.field_slot("x"), Some(0));
        assert_eq!(class.field_slot("y"), Some(1));
        assert_eq!(class.field_count(), 2);
    }

    #[test]
    fn test_static_defaults() {
        let class = ClassBuilder::new("demo/S")
            .static_field("flag", "Z")
            .static_field("count", "I")
            .build(ClassId(0), Vec::new());
        assert_eq!(class.get_static(0).unwrap(), Value::Bool(false));
        assert_eq!(class.get_static(1).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_static_kind_check() {
        let class =
            ClassBuilder::new("demo/S").static_field("count", "I").build(ClassId(0), Vec::new());
        assert!(matches!(
            class.set_static(0, Value::Long(1)),
            Err(CoreError::KindMismatch { .. })
        ));
        class.set_static(0, Value::Int(1)).unwrap();
        assert_eq!(class.get_static(0).unwrap(), Value::Int(1));
    }
}
