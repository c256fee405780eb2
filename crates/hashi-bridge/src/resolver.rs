//! Class and member resolution
//!
//! Classes and members are addressed by resolved ids rather than name
//! strings: a [`ClassRef`] or member id is cheap to copy, valid for the VM's
//! lifetime, and skips the string lookup on every use. Lookups validate the
//! signature text and verify the declared signature matches exactly — a
//! field of one type never resolves under another signature.
//!
//! Resolution results are cached in the VM, keyed by class, name, and
//! signature, so hot paths pay the search once.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::Reference;
use crate::signature::{MethodSig, TypeSig};
use crate::vm::Env;
use hashi_core::runtime::ClassId;

/// Resolved class handle. Classes are never unloaded, so this is valid
/// for the VM's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassRef(pub(crate) ClassId);

/// Resolved field id: defining class, slot, and staticness.
#[derive(Clone, Copy, Debug)]
pub struct FieldId {
    pub(crate) class: ClassId,
    pub(crate) slot: u32,
    pub(crate) is_static: bool,
}

/// Resolved method id: defining class, method index, and staticness.
#[derive(Clone, Copy, Debug)]
pub struct MethodId {
    pub(crate) class: ClassId,
    pub(crate) index: u32,
    pub(crate) is_static: bool,
}

impl Env {
    /// Resolve a class by name (`/` or `.` separated).
    pub fn find_class(&self, name: &str) -> BridgeResult<ClassRef> {
        let id = self.vm.runtime.find_class(name)?;
        Ok(ClassRef(id))
    }

    /// Slash-separated name of a resolved class.
    pub fn class_name(&self, class: ClassRef) -> BridgeResult<String> {
        Ok(self.vm.runtime.class(class.0)?.name().to_owned())
    }

    /// Superclass of a resolved class, if any.
    pub fn get_super_class(&self, class: ClassRef) -> BridgeResult<Option<ClassRef>> {
        Ok(self.vm.runtime.class(class.0)?.super_id().map(ClassRef))
    }

    /// True if `sub` is `sup` or a subclass of it.
    pub fn is_assignable_from(&self, sub: ClassRef, sup: ClassRef) -> bool {
        self.vm.runtime.instance_of(sub.0, sup.0)
    }

    /// Class of the referenced object.
    pub fn get_object_class<R: Reference>(&self, reference: R) -> BridgeResult<ClassRef> {
        let obj = reference.resolve(self)?;
        Ok(ClassRef(obj.class()))
    }

    /// True if the referenced object is an instance of `class`.
    pub fn is_instance_of<R: Reference>(
        &self,
        reference: R,
        class: ClassRef,
    ) -> BridgeResult<bool> {
        let obj = reference.resolve(self)?;
        Ok(self.vm.runtime.instance_of(obj.class(), class.0))
    }

    /// Resolve an instance field by name and exact signature.
    pub fn get_field_id(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
    ) -> BridgeResult<FieldId> {
        self.resolve_field(class, name, sig, false)
    }

    /// Resolve a static field by name and exact signature.
    pub fn get_static_field_id(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
    ) -> BridgeResult<FieldId> {
        self.resolve_field(class, name, sig, true)
    }

    fn resolve_field(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
        is_static: bool,
    ) -> BridgeResult<FieldId> {
        let parsed = TypeSig::parse(sig)?;
        if parsed == TypeSig::Void {
            return Err(BridgeError::BadSignature(sig.to_owned()));
        }
        let key = format!("{:?}#{}{}#{}", class.0, if is_static { "s:" } else { "" }, name, sig);
        if let Some(hit) = self.vm.field_cache.get(&key) {
            return Ok(*hit);
        }
        let def = self.vm.runtime.class(class.0)?;
        let not_found = || BridgeError::MemberNotFound {
            class: def.name().to_owned(),
            name: name.to_owned(),
            signature: sig.to_owned(),
        };
        let slot = if is_static { def.static_slot(name) } else { def.field_slot(name) }
            .ok_or_else(not_found)?;
        let declared = if is_static { def.static_def(slot) } else { def.field_def(slot) }
            .ok_or_else(not_found)?;
        if declared.sig != sig {
            return Err(not_found());
        }
        let id = FieldId { class: class.0, slot: slot as u32, is_static };
        self.vm.field_cache.insert(key, id);
        Ok(id)
    }

    /// Resolve an instance method (or constructor, name `<init>`) by name
    /// and exact signature, searching superclasses.
    pub fn get_method_id(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
    ) -> BridgeResult<MethodId> {
        self.resolve_method(class, name, sig, false)
    }

    /// Resolve a static method by name and exact signature.
    pub fn get_static_method_id(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
    ) -> BridgeResult<MethodId> {
        self.resolve_method(class, name, sig, true)
    }

    fn resolve_method(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
        is_static: bool,
    ) -> BridgeResult<MethodId> {
        MethodSig::parse(sig)?;
        let key = format!("{:?}#{}{}#{}", class.0, if is_static { "s:" } else { "" }, name, sig);
        if let Some(hit) = self.vm.method_cache.get(&key) {
            return Ok(*hit);
        }
        let def = self.vm.runtime.class(class.0)?;
        let not_found = || BridgeError::MemberNotFound {
            class: def.name().to_owned(),
            name: name.to_owned(),
            signature: sig.to_owned(),
        };
        // Constructors do not inherit; everything else resolves through
        // the superclass chain.
        let (owner, index) = if name == "<init>" {
            let index = def.find_method(name, sig).ok_or_else(not_found)?;
            (class.0, index)
        } else {
            self.vm.runtime.select_method(class.0, name, sig).ok_or_else(not_found)?
        };
        let owner_def = self.vm.runtime.class(owner)?;
        let method = owner_def.method_at(index).ok_or_else(not_found)?;
        if method.is_static != is_static {
            return Err(not_found());
        }
        let id = MethodId { class: owner, index: index as u32, is_static };
        self.vm.method_cache.insert(key, id);
        Ok(id)
    }
}
