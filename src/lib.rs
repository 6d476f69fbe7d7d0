//! wasm-baseline - a single-pass baseline compiler for WebAssembly.
//!
//! Each function body is translated into x86-64 machine code in one linear walk
//! over its operators. The compiler keeps no IR: it tracks, for every local and
//! every operand stack value, whether it currently lives in a register, is a
//! known constant or sits in its frame slot, and reconciles those locations
//! wherever control flow joins. Functions using anything outside the supported
//! subset are rejected with a reason so a different tier can take them.
//!
//! # Primary Usage
//!
//! ```ignore
//! use wasm_baseline::baseline::{compile, CompileOptions};
//! use wasm_baseline::wasm::WasmModule;
//!
//! let module = WasmModule::parse(&bytes)?;
//! let code = compile(&module.body(0), &module.env, &CompileOptions::default())?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Cache state, merging, register bookkeeping and interfaces
//! - [`wasm`] - Module parsing, function body decoding and validation
//! - [`baseline`] - The opcode handlers, control frames and compilation driver
//! - [`x64`] - x86-64 code emission, calling convention and executable memory

pub mod baseline;
pub mod core;
pub mod wasm;
pub mod x64;

pub use baseline::{compile, CompilationUnit, CompileOptions, CompiledCode};
pub use core::{Bailout, CompilationSession, SessionStats};
pub use wasm::{FuncBody, ModuleEnv, WasmModule};
