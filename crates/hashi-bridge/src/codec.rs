//! Value codec: native values and string conversion
//!
//! [`NativeValue`] is the boundary representation of one managed slot:
//! primitives carry their exact width (a byte stays `i8`), references are
//! handles, never raw objects. Managed strings are UTF-16; conversion to
//! Rust strings is exact and fails on unpaired surrogates instead of
//! substituting replacement characters.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::{LocalRef, Reference};
use crate::signature::TypeSig;
use crate::vm::Env;
use hashi_core::{Obj, Value};

/// A value crossing the boundary in native representation.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum NativeValue {
    /// Boolean.
    Bool(bool),
    /// 8-bit signed integer.
    Byte(i8),
    /// UTF-16 code unit.
    Char(u16),
    /// 16-bit signed integer.
    Short(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Reference handle (`None` is the null reference).
    Object(Option<LocalRef>),
    /// Absence of a value, produced by void-returning calls.
    Void,
}

impl NativeValue {
    /// The null reference.
    pub const fn null() -> Self {
        NativeValue::Object(None)
    }

    /// Short kind name for error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            NativeValue::Bool(_) => "bool",
            NativeValue::Byte(_) => "byte",
            NativeValue::Char(_) => "char",
            NativeValue::Short(_) => "short",
            NativeValue::Int(_) => "int",
            NativeValue::Long(_) => "long",
            NativeValue::Float(_) => "float",
            NativeValue::Double(_) => "double",
            NativeValue::Object(_) => "object",
            NativeValue::Void => "void",
        }
    }

    /// True if this value can occupy a slot of the given declared type.
    ///
    /// Primitives must match exactly; any reference (including null) fits
    /// any reference type.
    pub fn matches(&self, sig: &TypeSig) -> bool {
        matches!(
            (self, sig),
            (NativeValue::Bool(_), TypeSig::Bool)
                | (NativeValue::Byte(_), TypeSig::Byte)
                | (NativeValue::Char(_), TypeSig::Char)
                | (NativeValue::Short(_), TypeSig::Short)
                | (NativeValue::Int(_), TypeSig::Int)
                | (NativeValue::Long(_), TypeSig::Long)
                | (NativeValue::Float(_), TypeSig::Float)
                | (NativeValue::Double(_), TypeSig::Double)
                | (NativeValue::Object(_), TypeSig::Object(_))
                | (NativeValue::Object(_), TypeSig::Array(_))
        )
    }

    /// Extract the reference handle, if this is an object value.
    pub fn as_object(&self) -> Option<Option<LocalRef>> {
        match self {
            NativeValue::Object(r) => Some(*r),
            _ => None,
        }
    }
}

impl Env {
    /// Convert a native value into its managed representation.
    pub(crate) fn to_value(&self, value: &NativeValue) -> BridgeResult<Value> {
        Ok(match value {
            NativeValue::Bool(v) => Value::Bool(*v),
            NativeValue::Byte(v) => Value::Byte(*v),
            NativeValue::Char(v) => Value::Char(*v),
            NativeValue::Short(v) => Value::Short(*v),
            NativeValue::Int(v) => Value::Int(*v),
            NativeValue::Long(v) => Value::Long(*v),
            NativeValue::Float(v) => Value::Float(*v),
            NativeValue::Double(v) => Value::Double(*v),
            NativeValue::Object(None) => Value::null(),
            NativeValue::Object(Some(r)) => Value::Object(Some(r.resolve(self)?)),
            NativeValue::Void => {
                return Err(BridgeError::Conversion("void is not a value".into()))
            }
        })
    }

    /// Convert a managed value into native representation, pinning any
    /// object behind a fresh local handle.
    pub(crate) fn from_value(&self, value: Value) -> BridgeResult<NativeValue> {
        Ok(match value {
            Value::Bool(v) => NativeValue::Bool(v),
            Value::Byte(v) => NativeValue::Byte(v),
            Value::Char(v) => NativeValue::Char(v),
            Value::Short(v) => NativeValue::Short(v),
            Value::Int(v) => NativeValue::Int(v),
            Value::Long(v) => NativeValue::Long(v),
            Value::Float(v) => NativeValue::Float(v),
            Value::Double(v) => NativeValue::Double(v),
            Value::Object(None) => NativeValue::null(),
            Value::Object(Some(obj)) => NativeValue::Object(Some(self.alloc_local(obj)?)),
        })
    }

    pub(crate) fn expect_string(&self, obj: &Obj) -> BridgeResult<Vec<u16>> {
        obj.str_units()
            .map(|u| u.to_vec())
            .ok_or_else(|| BridgeError::Conversion("object is not a string".into()))
    }

    /// Create a managed string from Rust text.
    pub fn new_string(&self, text: &str) -> BridgeResult<LocalRef> {
        let obj = self.vm.runtime.alloc_string(text)?;
        self.alloc_local(obj)
    }

    /// Create a managed string from UTF-16 code units (copied verbatim,
    /// surrogate pairing not required).
    pub fn new_string_utf16(&self, units: &[u16]) -> BridgeResult<LocalRef> {
        let obj = self.vm.runtime.alloc_string_utf16(units.to_vec())?;
        self.alloc_local(obj)
    }

    /// Read a managed string as Rust text.
    ///
    /// Fails on non-string objects and on unpaired surrogates.
    pub fn get_string<R: Reference>(&self, reference: R) -> BridgeResult<String> {
        let obj = reference.resolve(self)?;
        let units = self.expect_string(&obj)?;
        String::from_utf16(&units)
            .map_err(|_| BridgeError::Conversion("unpaired surrogate in string".into()))
    }

    /// Copy out a managed string's UTF-16 code units verbatim.
    pub fn get_string_utf16<R: Reference>(&self, reference: R) -> BridgeResult<Vec<u16>> {
        let obj = reference.resolve(self)?;
        self.expect_string(&obj)
    }

    /// Length of a managed string in UTF-16 code units.
    pub fn string_len<R: Reference>(&self, reference: R) -> BridgeResult<usize> {
        let obj = reference.resolve(self)?;
        Ok(self.expect_string(&obj)?.len())
    }

    /// Copy a range of UTF-16 code units out of a managed string.
    pub fn get_string_region<R: Reference>(
        &self,
        reference: R,
        start: usize,
        len: usize,
    ) -> BridgeResult<Vec<u16>> {
        let obj = reference.resolve(self)?;
        let units = self.expect_string(&obj)?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= units.len())
            .ok_or_else(|| {
                BridgeError::Conversion(format!(
                    "string region {start}..+{len} out of bounds (len {})",
                    units.len()
                ))
            })?;
        Ok(units[start..end].to_vec())
    }
}
