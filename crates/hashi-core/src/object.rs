//! Heap object model
//!
//! Every managed object is an `Arc<HeapObject>`. The strong count is the
//! collector: handles, fields and array elements each hold a strong clone,
//! and dropping the last one collects the object. `std::sync::Weak` gives
//! weak observers that can never yield a dangling reference.

use crate::monitor::Monitor;
use crate::runtime::ClassId;
use crate::value::{Value, ValueKind};
use crate::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Strong reference to a managed object.
pub type Obj = Arc<HeapObject>;

/// Bytes charged against the runtime's heap budget, returned on drop.
pub(crate) struct HeapCharge {
    bytes: usize,
    used: Arc<AtomicUsize>,
}

impl HeapCharge {
    pub(crate) fn new(bytes: usize, used: Arc<AtomicUsize>) -> Self {
        Self { bytes, used }
    }
}

impl Drop for HeapCharge {
    fn drop(&mut self) {
        self.used.fetch_sub(self.bytes, Ordering::Relaxed);
    }
}

/// Primitive array element kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PrimKind {
    /// Boolean elements.
    Bool,
    /// i8 elements.
    Byte,
    /// UTF-16 code unit elements.
    Char,
    /// i16 elements.
    Short,
    /// i32 elements.
    Int,
    /// i64 elements.
    Long,
    /// f32 elements.
    Float,
    /// f64 elements.
    Double,
}

/// Backing storage of a primitive array, one vector per element kind.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimArray {
    /// Boolean array.
    Bool(Vec<bool>),
    /// Byte array.
    Byte(Vec<i8>),
    /// Char array (UTF-16 code units).
    Char(Vec<u16>),
    /// Short array.
    Short(Vec<i16>),
    /// Int array.
    Int(Vec<i32>),
    /// Long array.
    Long(Vec<i64>),
    /// Float array.
    Float(Vec<f32>),
    /// Double array.
    Double(Vec<f64>),
}

impl PrimArray {
    /// Allocate a zero-filled array of `len` elements of `kind`.
    pub fn new(kind: PrimKind, len: usize) -> Self {
        match kind {
            PrimKind::Bool => PrimArray::Bool(vec![false; len]),
            PrimKind::Byte => PrimArray::Byte(vec![0; len]),
            PrimKind::Char => PrimArray::Char(vec![0; len]),
            PrimKind::Short => PrimArray::Short(vec![0; len]),
            PrimKind::Int => PrimArray::Int(vec![0; len]),
            PrimKind::Long => PrimArray::Long(vec![0; len]),
            PrimKind::Float => PrimArray::Float(vec![0.0; len]),
            PrimKind::Double => PrimArray::Double(vec![0.0; len]),
        }
    }

    /// Element kind of this array.
    pub fn kind(&self) -> PrimKind {
        match self {
            PrimArray::Bool(_) => PrimKind::Bool,
            PrimArray::Byte(_) => PrimKind::Byte,
            PrimArray::Char(_) => PrimKind::Char,
            PrimArray::Short(_) => PrimKind::Short,
            PrimArray::Int(_) => PrimKind::Int,
            PrimArray::Long(_) => PrimKind::Long,
            PrimArray::Float(_) => PrimKind::Float,
            PrimArray::Double(_) => PrimKind::Double,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            PrimArray::Bool(v) => v.len(),
            PrimArray::Byte(v) => v.len(),
            PrimArray::Char(v) => v.len(),
            PrimArray::Short(v) => v.len(),
            PrimArray::Int(v) => v.len(),
            PrimArray::Long(v) => v.len(),
            PrimArray::Float(v) => v.len(),
            PrimArray::Double(v) => v.len(),
        }
    }

    /// True if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one element as a [`Value`].
    pub fn get(&self, index: usize) -> CoreResult<Value> {
        let len = self.len();
        if index >= len {
            return Err(CoreError::OutOfBounds { index, len });
        }
        Ok(match self {
            PrimArray::Bool(v) => Value::Bool(v[index]),
            PrimArray::Byte(v) => Value::Byte(v[index]),
            PrimArray::Char(v) => Value::Char(v[index]),
            PrimArray::Short(v) => Value::Short(v[index]),
            PrimArray::Int(v) => Value::Int(v[index]),
            PrimArray::Long(v) => Value::Long(v[index]),
            PrimArray::Float(v) => Value::Float(v[index]),
            PrimArray::Double(v) => Value::Double(v[index]),
        })
    }

    /// Write one element from a [`Value`] of the matching kind.
    pub fn set(&mut self, index: usize, value: &Value) -> CoreResult<()> {
        let len = self.len();
        if index >= len {
            return Err(CoreError::OutOfBounds { index, len });
        }
        let mismatch = |expected: ValueKind, got: &Value| CoreError::KindMismatch {
            expected: expected.name(),
            got: got.kind().name(),
        };
        match (self, value) {
            (PrimArray::Bool(v), Value::Bool(x)) => v[index] = *x,
            (PrimArray::Byte(v), Value::Byte(x)) => v[index] = *x,
            (PrimArray::Char(v), Value::Char(x)) => v[index] = *x,
            (PrimArray::Short(v), Value::Short(x)) => v[index] = *x,
            (PrimArray::Int(v), Value::Int(x)) => v[index] = *x,
            (PrimArray::Long(v), Value::Long(x)) => v[index] = *x,
            (PrimArray::Float(v), Value::Float(x)) => v[index] = *x,
            (PrimArray::Double(v), Value::Double(x)) => v[index] = *x,
            (arr, v) => {
                let expected = match arr.kind() {
                    PrimKind::Bool => ValueKind::Bool,
                    PrimKind::Byte => ValueKind::Byte,
                    PrimKind::Char => ValueKind::Char,
                    PrimKind::Short => ValueKind::Short,
                    PrimKind::Int => ValueKind::Int,
                    PrimKind::Long => ValueKind::Long,
                    PrimKind::Float => ValueKind::Float,
                    PrimKind::Double => ValueKind::Double,
                };
                return Err(mismatch(expected, v));
            }
        }
        Ok(())
    }
}

/// Storage variants of a heap object.
pub enum Body {
    /// Ordinary object: one slot per declared instance field.
    Fields(Mutex<Vec<Value>>),
    /// Immutable string: UTF-16 code units.
    Str(Vec<u16>),
    /// Primitive array.
    PrimArray(Mutex<PrimArray>),
    /// Object array: element class plus reference slots.
    ObjArray {
        /// Class every element must be assignable to.
        elem: ClassId,
        /// Element slots.
        elems: Mutex<Vec<Option<Obj>>>,
    },
}

/// A managed heap object: class tag, storage, and intrinsic lock.
pub struct HeapObject {
    class: ClassId,
    body: Body,
    monitor: Monitor,
    /// Heap budget charge, released when the object is collected.
    _charge: Option<HeapCharge>,
}

impl HeapObject {
    pub(crate) fn new(class: ClassId, body: Body, charge: Option<HeapCharge>) -> Self {
        Self {
            class,
            body,
            monitor: Monitor::new(),
            _charge: charge,
        }
    }

    /// Class of this object.
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Storage body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The object's intrinsic lock.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Read an instance field slot.
    pub fn get_field(&self, slot: usize) -> CoreResult<Value> {
        match &self.body {
            Body::Fields(fields) => {
                let fields = fields.lock();
                fields
                    .get(slot)
                    .cloned()
                    .ok_or(CoreError::OutOfBounds { index: slot, len: fields.len() })
            }
            _ => Err(CoreError::KindMismatch { expected: "object", got: "non-object body" }),
        }
    }

    /// Write an instance field slot. The stored kind must match exactly.
    pub fn set_field(&self, slot: usize, value: Value) -> CoreResult<()> {
        match &self.body {
            Body::Fields(fields) => {
                let mut fields = fields.lock();
                let len = fields.len();
                let cell = fields
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
            _ => Err(CoreError::KindMismatch { expected: "object", got: "non-object body" }),
        }
    }

    /// UTF-16 code units, if this is a string object.
    pub fn str_units(&self) -> Option<&[u16]> {
        match &self.body {
            Body::Str(units) => Some(units),
            _ => None,
        }
    }

    /// Primitive array storage, if this is a primitive array.
    pub fn prim_array(&self) -> Option<&Mutex<PrimArray>> {
        match &self.body {
            Body::PrimArray(arr) => Some(arr),
            _ => None,
        }
    }

    /// Array length for primitive and object arrays, string length for strings.
    pub fn array_len(&self) -> Option<usize> {
        match &self.body {
            Body::PrimArray(arr) => Some(arr.lock().len()),
            Body::ObjArray { elems, .. } => Some(elems.lock().len()),
            Body::Str(units) => Some(units.len()),
            Body::Fields(_) => None,
        }
    }
}

impl std::fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            Body::Fields(_) => "fields",
            Body::Str(_) => "string",
            Body::PrimArray(_) => "prim-array",
            Body::ObjArray { .. } => "obj-array",
        };
        write!(f, "HeapObject(class={:?}, body={body})", self.class)
    }
}
