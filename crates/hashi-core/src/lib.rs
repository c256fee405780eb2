//! Hashi managed runtime core
//!
//! This crate models the collector-owned side of the binding boundary:
//! - Class registry with single inheritance and virtual dispatch
//! - Reference-counted heap objects (fields, UTF-16 strings, arrays)
//! - Per-object intrinsic locks (monitors)
//! - Managed exception objects (`Thrown`)
//!
//! Object lifetime is deterministic refcounting: dropping the last strong
//! reference collects the object and invalidates weak observers. The
//! native-facing handle discipline lives in `hashi-bridge`; this crate only
//! provides the raw object model it binds into.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod monitor;
pub mod object;
pub mod runtime;
pub mod value;

pub use class::{Class, ClassBuilder, FieldDef, MethodBody, MethodDef, MethodImpl};
pub use monitor::Monitor;
pub use object::{Body, HeapObject, Obj, PrimArray, PrimKind};
pub use runtime::{ClassId, Runtime, RuntimeOptions, Thrown};
pub use value::{Value, ValueKind};

/// Runtime model errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// Heap budget exhausted.
    #[error("out of memory: allocation of {requested} bytes exceeds heap budget")]
    OutOfMemory {
        /// Size of the allocation that failed.
        requested: usize,
    },

    /// No class registered under the given name.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// Field or array slot index out of range.
    #[error("slot {index} out of bounds (len {len})")]
    OutOfBounds {
        /// Requested index.
        index: usize,
        /// Number of available slots.
        len: usize,
    },

    /// A value of the wrong kind was stored into or read from a slot.
    #[error("kind mismatch: expected {expected}, got {got}")]
    KindMismatch {
        /// Expected value kind.
        expected: &'static str,
        /// Actual value kind.
        got: &'static str,
    },

    /// Monitor enter/exit pairing violated (exit by a non-owner thread).
    #[error("monitor state error: {0}")]
    MonitorState(&'static str),
}

/// Result alias for runtime model operations.
pub type CoreResult<T> = Result<T, CoreError>;
