//! The baseline compilation tier.
//!
//! [`compile`] turns one function body into x86-64 machine code in a single
//! pass, or reports why it did not: either the body is invalid or it uses
//! something this tier does not implement, in which case the caller is
//! expected to hand the function to another tier.

pub mod compiler;
pub mod control;
pub mod safepoint;
pub mod unit;

pub use compiler::BaselineCompiler;
pub use control::{Control, ControlKind, MergeState};
pub use safepoint::{SafepointTable, SafepointTableBuilder};
pub use unit::CompilationUnit;

use crate::core::emitter::CodeEmitter;
use crate::core::error::{Bailout, EncodingError};
use crate::core::linkage::CallingConvention;
use crate::wasm::decoder::decode_function;
use crate::wasm::module::{FuncBody, ModuleEnv};
use crate::x64::{SysVCallDescriptor, X64Emitter};
use bumpalo::Bump;

/// Knobs of a compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Operand stack values allowed on top of the locals.
    pub max_value_stack_height: u32,
    /// Trace the cache state before every instruction (needs trace logging).
    pub trace_cache_state: bool,
    /// Log the time spent per function.
    pub trace_decode_time: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_value_stack_height: 8,
            trace_cache_state: false,
            trace_decode_time: false,
        }
    }
}

/// Machine code of one function plus its metadata.
#[derive(Debug, Clone)]
pub struct CompiledCode {
    /// Code followed by the safepoint table.
    pub code: Vec<u8>,
    pub safepoint_table_offset: usize,
    pub frame_slot_count: u32,
    /// Bytes of machine code, excluding metadata.
    pub memory_cost: usize,
    pub instruction_count: usize,
    pub spill_count: usize,
}

impl CompiledCode {
    pub fn machine_code(&self) -> &[u8] {
        &self.code[..self.memory_cost]
    }
}

/// Compile `body` for x86-64 with the System V based calling convention.
pub fn compile(
    body: &FuncBody<'_>,
    env: &ModuleEnv,
    options: &CompileOptions,
) -> Result<CompiledCode, Bailout> {
    let conv = SysVCallDescriptor::for_signature(body.sig);
    let emitter = X64Emitter::new().map_err(internal_error)?;
    compile_with(body, env, options, emitter, &conv)
}

fn internal_error(err: EncodingError) -> Bailout {
    debug_assert!(false, "emitter failure: {err}");
    Bailout::Unsupported {
        reason: format!("internal error: {err}"),
    }
}

/// Compile `body` through an arbitrary emitter and calling convention.
pub fn compile_with<E: CodeEmitter, C: CallingConvention>(
    body: &FuncBody<'_>,
    env: &ModuleEnv,
    options: &CompileOptions,
    emitter: E,
    conv: &C,
) -> Result<CompiledCode, Bailout> {
    let arena = Bump::new();
    let mut compiler = BaselineCompiler::new(emitter, conv, env, body.sig, options, &arena);
    let decoded = decode_function(body, env, &mut compiler);
    let output = compiler.into_output();

    if let Err(err) = decoded {
        log::debug!("Validation of function {} failed: {err}", body.sig);
        return Err(Bailout::Validation {
            offset: err.offset,
            message: err.message,
        });
    }
    if let Some(reason) = output.unsupported {
        return Err(Bailout::Unsupported { reason });
    }
    if !output.finished {
        debug_assert!(false, "decoding stopped without a reason");
        return Err(Bailout::Unsupported {
            reason: "internal error: decoding stopped".to_string(),
        });
    }

    let mut code = output.emitter.finish().map_err(internal_error)?;
    let memory_cost = code.len();
    let safepoint_table_offset =
        SafepointTableBuilder::new(output.frame_slot_count).emit(&mut code);

    Ok(CompiledCode {
        code,
        safepoint_table_offset,
        frame_slot_count: output.frame_slot_count,
        memory_cost,
        instruction_count: output.instructions,
        spill_count: output.spills,
    })
}
