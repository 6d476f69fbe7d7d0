//! WebAssembly front end.
//!
//! - `module`: module environment, function bodies and whole-module parsing
//! - `instr`: decoded instruction forms
//! - `decoder`: validating decoder driving a [`FunctionBodyVisitor`]

pub mod decoder;
pub mod instr;
pub mod module;

pub use decoder::{decode_function, FunctionBodyVisitor, ValidationError};
pub use instr::{BinaryOp, Instr};
pub use module::{
    FuncBody, FunctionEntry, GlobalDesc, InstanceContext, ModuleEnv, ModuleError, WasmModule,
    GLOBALS_START_OFFSET,
};
