//! Ergonomic conversions between Rust values and boundary values
//!
//! [`IntoManaged`] and [`FromManaged`] let call sites pass Rust values
//! directly and take typed results back, instead of building
//! [`NativeValue`] variants by hand. Conversions are exact: a managed int
//! only converts to `i32`, a managed string only to `String`.

use crate::array::PrimElem;
use crate::codec::NativeValue;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::LocalRef;
use crate::vm::Env;

/// Convert a Rust value into a boundary value, allocating managed objects
/// as needed.
pub trait IntoManaged {
    /// Perform the conversion.
    fn into_managed(self, env: &Env) -> BridgeResult<NativeValue>;
}

/// Convert a boundary value into a Rust value.
pub trait FromManaged: Sized {
    /// Perform the conversion.
    fn from_managed(value: NativeValue, env: &Env) -> BridgeResult<Self>;
}

fn wrong_kind(expected: &str, got: &NativeValue) -> BridgeError {
    BridgeError::Conversion(format!("expected {expected}, got {}", got.kind_name()))
}

macro_rules! scalar_conv {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl IntoManaged for $ty {
            fn into_managed(self, _env: &Env) -> BridgeResult<NativeValue> {
                Ok(NativeValue::$variant(self))
            }
        }
        impl FromManaged for $ty {
            fn from_managed(value: NativeValue, _env: &Env) -> BridgeResult<Self> {
                match value {
                    NativeValue::$variant(v) => Ok(v),
                    other => Err(wrong_kind($name, &other)),
                }
            }
        }
    };
}

scalar_conv!(bool, Bool, "bool");
scalar_conv!(i8, Byte, "byte");
scalar_conv!(u16, Char, "char");
scalar_conv!(i16, Short, "short");
scalar_conv!(i32, Int, "int");
scalar_conv!(i64, Long, "long");
scalar_conv!(f32, Float, "float");
scalar_conv!(f64, Double, "double");

impl FromManaged for () {
    fn from_managed(value: NativeValue, _env: &Env) -> BridgeResult<Self> {
        match value {
            NativeValue::Void => Ok(()),
            other => Err(wrong_kind("void", &other)),
        }
    }
}

impl IntoManaged for &str {
    fn into_managed(self, env: &Env) -> BridgeResult<NativeValue> {
        Ok(NativeValue::Object(Some(env.new_string(self)?)))
    }
}

impl IntoManaged for String {
    fn into_managed(self, env: &Env) -> BridgeResult<NativeValue> {
        self.as_str().into_managed(env)
    }
}

impl FromManaged for String {
    fn from_managed(value: NativeValue, env: &Env) -> BridgeResult<Self> {
        match value {
            NativeValue::Object(Some(r)) => env.get_string(r),
            NativeValue::Object(None) => Err(BridgeError::NullReference),
            other => Err(wrong_kind("string", &other)),
        }
    }
}

impl FromManaged for Option<String> {
    fn from_managed(value: NativeValue, env: &Env) -> BridgeResult<Self> {
        match value {
            NativeValue::Object(None) => Ok(None),
            other => String::from_managed(other, env).map(Some),
        }
    }
}

impl<T: PrimElem> IntoManaged for &[T] {
    fn into_managed(self, env: &Env) -> BridgeResult<NativeValue> {
        Ok(NativeValue::Object(Some(env.new_prim_array_from(self)?)))
    }
}

impl<T: PrimElem> IntoManaged for Vec<T> {
    fn into_managed(self, env: &Env) -> BridgeResult<NativeValue> {
        self.as_slice().into_managed(env)
    }
}

impl<T: PrimElem> FromManaged for Vec<T> {
    fn from_managed(value: NativeValue, env: &Env) -> BridgeResult<Self> {
        match value {
            NativeValue::Object(Some(r)) => env.get_array(r),
            NativeValue::Object(None) => Err(BridgeError::NullReference),
            other => Err(wrong_kind("array", &other)),
        }
    }
}

impl IntoManaged for LocalRef {
    fn into_managed(self, _env: &Env) -> BridgeResult<NativeValue> {
        Ok(NativeValue::Object(Some(self)))
    }
}

impl IntoManaged for Option<LocalRef> {
    fn into_managed(self, _env: &Env) -> BridgeResult<NativeValue> {
        Ok(NativeValue::Object(self))
    }
}

impl FromManaged for Option<LocalRef> {
    fn from_managed(value: NativeValue, _env: &Env) -> BridgeResult<Self> {
        match value {
            NativeValue::Object(r) => Ok(r),
            other => Err(wrong_kind("object", &other)),
        }
    }
}

impl FromManaged for LocalRef {
    fn from_managed(value: NativeValue, _env: &Env) -> BridgeResult<Self> {
        match value {
            NativeValue::Object(Some(r)) => Ok(r),
            NativeValue::Object(None) => Err(BridgeError::NullReference),
            other => Err(wrong_kind("object", &other)),
        }
    }
}

impl FromManaged for NativeValue {
    fn from_managed(value: NativeValue, _env: &Env) -> BridgeResult<Self> {
        Ok(value)
    }
}

impl Env {
    /// Call an instance method and convert the result.
    pub fn call_method_as<T: FromManaged, R: crate::handle::Reference>(
        &self,
        receiver: R,
        method: crate::resolver::MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<T> {
        let out = self.call_method(receiver, method, args)?;
        T::from_managed(out, self)
    }

    /// Call a static method and convert the result.
    pub fn call_static_method_as<T: FromManaged>(
        &self,
        method: crate::resolver::MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<T> {
        let out = self.call_static_method(method, args)?;
        T::from_managed(out, self)
    }
}
