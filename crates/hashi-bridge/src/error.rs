//! Bridge error taxonomy
//!
//! Every fallible boundary operation returns [`BridgeResult`]. Managed
//! exceptions are a distinct variant: they also latch into the calling
//! thread's pending-exception slot, so `Managed` in a result and
//! `Env::exception_pending` always agree.

use hashi_core::CoreError;

/// Errors produced at the native/managed boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// The current thread is not attached to the VM.
    #[error("current thread is not attached")]
    Unattached,

    /// The current thread is already attached to a different VM.
    #[error("current thread is attached to a different VM")]
    AttachConflict,

    /// A handle referred to a slot that no longer exists (stale frame,
    /// wrong VM, or already-deleted reference).
    #[error("invalid reference handle")]
    InvalidHandle,

    /// A reference was deleted twice.
    #[error("reference released twice")]
    DoubleRelease,

    /// The local reference table is full.
    #[error("local reference table overflow (capacity {capacity})")]
    LocalOverflow {
        /// Configured table capacity.
        capacity: usize,
    },

    /// A null reference where an object was required.
    #[error("null reference")]
    NullReference,

    /// Class, field, method, or constructor lookup failed.
    ///
    /// Class-resolution misses leave `name` and `signature` empty.
    #[error("member not found: {}", member_label(.class, .name, .signature))]
    MemberNotFound {
        /// Class searched (or the class name that failed to resolve).
        class: String,
        /// Member name.
        name: String,
        /// Signature text the lookup required.
        signature: String,
    },

    /// Signature text failed to parse.
    #[error("malformed signature: {0}")]
    BadSignature(String),

    /// A value's kind did not match the declared signature.
    #[error("signature mismatch: expected {expected}, got {got}")]
    SignatureMismatch {
        /// Declared signature or kind.
        expected: String,
        /// Supplied kind.
        got: String,
    },

    /// String or value conversion failed.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// A boundary call was made while an exception was already pending.
    #[error("operation with exception pending")]
    ExceptionPending,

    /// A forbidden operation was attempted inside a critical array section.
    #[error("operation forbidden inside critical array section")]
    CriticalSection,

    /// Monitor enter/exit pairing violated.
    #[error("monitor misuse: {0}")]
    Monitor(&'static str),

    /// Heap or reference-table resources exhausted in the managed runtime.
    #[error("managed heap exhausted")]
    OutOfMemory,

    /// A managed exception was thrown and is now pending on this thread.
    #[error("managed exception {class}: {message}")]
    Managed {
        /// Exception class name.
        class: String,
        /// Detail message (empty when the exception carries none).
        message: String,
    },

    /// Failure reported by registered native code.
    #[error("native failure: {0}")]
    Native(String),

    /// Non-exception integral failure code from a raw native entry point.
    #[error("native call failed with status {0}")]
    RawFailure(i32),
}

fn member_label(class: &str, name: &str, signature: &str) -> String {
    if name.is_empty() {
        class.to_owned()
    } else {
        format!("{class}.{name} {signature}")
    }
}

impl From<CoreError> for BridgeError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::OutOfMemory { .. } => BridgeError::OutOfMemory,
            CoreError::UnknownClass(name) => BridgeError::MemberNotFound {
                class: name,
                name: String::new(),
                signature: String::new(),
            },
            CoreError::OutOfBounds { index, len } => {
                BridgeError::Conversion(format!("index {index} out of bounds (len {len})"))
            }
            CoreError::KindMismatch { expected, got } => BridgeError::SignatureMismatch {
                expected: expected.to_owned(),
                got: got.to_owned(),
            },
            CoreError::MonitorState(msg) => BridgeError::Monitor(msg),
        }
    }
}

/// Result alias for boundary operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
