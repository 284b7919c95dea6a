// This module serves as the central hub for the compiler's core infrastructure, the pieces
// shared by the graph model, the map compiler and every emitter backend. It exports the
// error taxonomy (CompileError and the CompileResult alias), the arena-backed compilation
// session with its statistics, the configuration structs, the storage Variable type, and
// the Emitter capability trait together with the handle and value types that cross it.
// Nothing in here knows about nodes or graphs; nothing in here knows about a specific
// code generation target.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - One error enum for the whole compile call, built with `thiserror`
//!
//! ## Session Management (`session`)
//! - Arena-based label interning using `bumpalo`
//! - Compilation statistics
//!
//! ## Configuration (`parameters`)
//! - Module and function names, profiling, target device, diagnostics
//!
//! ## Emitter capability (`emitter`, `variable`)
//! - The trait every code generation backend implements
//! - Storage variables for port values

pub mod error;
pub mod session;
pub mod parameters;
pub mod emitter;
pub mod variable;

pub use error::{CompileError, CompileResult};

pub use session::{CompilationSession, SessionStats};

pub use parameters::{CompilerSettings, MapCompilerParameters, TargetDevice};

pub use emitter::{
    BinaryOperator,
    BlockRef,
    ComparisonPredicate,
    Emitter,
    FunctionRef,
    Literal,
    ModuleBuilder,
    RegionRef,
    StructRef,
    ValueRef,
    VariableType,
};

pub use variable::{VarId, Variable, VariableScope};
