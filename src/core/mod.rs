// This module collects the target independent pieces of the baseline compiler: register
// identifiers and use counting, the value types the compiler understands, the location
// cache state that maps every live wasm value to a register, constant or spill slot, the
// transfer recipe that reconciles two cache states at a control-flow join, the assembler
// that ties the cache state to a concrete code emitter, and the narrow interfaces through
// which the compiler reaches its collaborators (code emitter, calling convention). Session
// statistics and error types live here as well.

//! Core infrastructure of the baseline compiler.
//!
//! # Key Components
//!
//! ## Location Cache State (`cache_state`)
//! - One slot per local and operand stack value
//! - Register use counts, so aliased registers are released exactly once
//! - Derivation of merge states for control-flow joins
//!
//! ## Merging (`transfer`)
//! - Stores, parallel register moves and fills emitted in a safe order
//!
//! ## Assembler (`assembler`)
//! - Register allocation with round-robin spilling
//! - Pop-to-register, spill-all and merge operations on top of an emitter

pub mod assembler;
pub mod cache_state;
pub mod emitter;
pub mod error;
pub mod linkage;
pub mod register_file;
pub mod session;
pub mod test_utils;
pub mod transfer;
pub mod types;

pub use assembler::BaselineAssembler;
pub use cache_state::{CacheState, Location, VarState};
pub use emitter::{CodeEmitter, F32BinOp, I32BinOp, Label};
pub use error::{Bailout, CompileError, CompileResult, EmitResult, EncodingError};
pub use linkage::{CallingConvention, ParamLocation};
pub use register_file::{AsmReg, RegBitSet, RegClass, RegisterFile};
pub use session::{CompilationSession, SessionStats};
pub use transfer::StackTransferRecipe;
pub use types::{FuncSig, ValueType, WasmValue};
