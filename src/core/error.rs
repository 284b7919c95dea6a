// This module defines the error types for the map compiler using the thiserror crate for
// idiomatic Rust error handling. CompileError is the single error enum raised anywhere in
// a compile call: maps that violate the single-input/single-output contract, output
// element types with no synthesis path, ports whose storage variable was never
// registered, indexed access on scalar variables, out-of-range element indices, and
// misuse of the low-level emitter (no current function, unknown block, mismatched
// operand types). Each variant carries enough context for a useful message. Errors are
// raised where they are detected and propagate with `?`; compilation is all-or-nothing,
// so nothing in the crate recovers from them locally. CompileResult<T> is the
// convenience alias used by every fallible operation.

//! Error types for the map compiler.

use thiserror::Error;

/// Main error type for map compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        reason: String,
    },

    #[error("Type mismatch: {reason}")]
    TypeMismatch {
        reason: String,
    },

    #[error("Not supported: {reason}")]
    NotSupported {
        reason: String,
    },

    #[error("Vector variable expected for element index {index}")]
    VectorVariableExpected {
        index: usize,
    },

    #[error("Index {index} out of range for variable of dimension {dimension}")]
    IndexOutOfRange {
        index: usize,
        dimension: usize,
    },

    #[error("Emitter error: {reason}")]
    Emitter {
        reason: String,
    },
}

impl CompileError {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        CompileError::InvalidArgument { reason: reason.into() }
    }

    pub(crate) fn type_mismatch(reason: impl Into<String>) -> Self {
        CompileError::TypeMismatch { reason: reason.into() }
    }

    pub(crate) fn not_supported(reason: impl Into<String>) -> Self {
        CompileError::NotSupported { reason: reason.into() }
    }

    pub(crate) fn emitter(reason: impl Into<String>) -> Self {
        CompileError::Emitter { reason: reason.into() }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
