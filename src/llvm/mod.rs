// This module provides the LLVM backend of the map compiler, available with the `llvm`
// cargo feature. LlvmModuleEmitter implements the same Emitter/ModuleBuilder capability
// as the built-in IR emitter, but builds an inkwell Module inside a caller-owned LLVM
// Context. The finished LlvmModule carries the verified inkwell module (with target
// triple and data layout set) together with the C header declarations collected while
// emitting, since LLVM itself has no notion of which functions form the public header.

//! LLVM backend built on inkwell.
//!
//! # Example
//! ```ignore
//! use inkwell::context::Context;
//! use mapc::llvm::LlvmModuleEmitter;
//! use mapc::{CompilationSession, MapCompiler, MapCompilerParameters};
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let context = Context::create();
//! let params = MapCompilerParameters::default();
//! let emitter = LlvmModuleEmitter::new(&context, &params.module_name, &session);
//! let compiled = MapCompiler::new(emitter, params, &session).compile(map)?;
//! println!("{}", compiled.module());
//! ```

pub mod emitter;

pub use emitter::{LlvmModule, LlvmModuleEmitter};
