//! mapc - compile dataflow maps into predict functions.
//!
//! A map is a typed dataflow graph with one input and one output. The map
//! compiler validates and normalizes the map, refines composite nodes into
//! directly compilable ones, and emits a module containing the predict function
//! plus public accessors describing the model's input and output sizes and
//! tensor shapes. Code generation goes through the [`core::Emitter`] trait,
//! implemented by the built-in block IR ([`ir`]) and, with the `llvm` feature,
//! by an inkwell backend ([`llvm`]).
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use mapc::{CompilationSession, IrModuleEmitter, MapCompiler, MapCompilerParameters};
//!
//! let map = mapc::test_map::parse_map(
//!     "%x = input real[3]\n%c = constant real [1, 2, 3]\n%s = add %x, %c\nmap %x -> %s",
//! )?;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let params = MapCompilerParameters::default();
//! let emitter = IrModuleEmitter::new(&params.module_name, &session);
//! let compiled = MapCompiler::new(emitter, params, &session).compile(map)?;
//!
//! assert_eq!(compiled.predict(&[1.0, 1.0, 1.0])?, vec![2.0, 3.0, 4.0]);
//! println!("{}", compiled.module().header());
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, session, configuration and the emitter capability
//! - [`model`] - Graph model, ports, shapes, refinement and maps
//! - [`nodes`] - Node kinds
//! - [`compiler`] - The map compiler: normalization, regions, variables, accessors, profiling
//! - [`ir`] - Built-in block IR, C header writer and interpreter
//! - [`llvm`] - LLVM backend (feature `llvm`)
//! - [`test_map`] - Text format for maps

pub mod core;
pub mod model;
pub mod nodes;
pub mod compiler;
pub mod ir;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod test_map;

pub use core::{
    CompilationSession,
    CompileError,
    CompileResult,
    CompilerSettings,
    Emitter,
    MapCompilerParameters,
    ModuleBuilder,
    SessionStats,
    TargetDevice,
};
pub use model::{DynamicMap, Model, TensorShape};
pub use compiler::{CompiledMap, MapCompiler};
pub use ir::{Interpreter, IrModule, IrModuleEmitter};
