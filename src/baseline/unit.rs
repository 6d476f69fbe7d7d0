//! One unit of compilation work: a single function of a module.

use super::{compile, CompileOptions, CompiledCode};
use crate::core::error::Bailout;
use crate::core::session::CompilationSession;
use crate::wasm::module::{FuncBody, ModuleEnv};
use std::time::Instant;

pub struct CompilationUnit<'a> {
    pub func_index: u32,
    pub body: FuncBody<'a>,
}

impl<'a> CompilationUnit<'a> {
    pub fn new(func_index: u32, body: FuncBody<'a>) -> Self {
        Self { func_index, body }
    }

    /// Compile the function and record the outcome in `session`.
    pub fn execute(
        &self,
        env: &ModuleEnv,
        options: &CompileOptions,
        session: &CompilationSession<'_>,
    ) -> Result<CompiledCode, Bailout> {
        let start = Instant::now();
        let result = compile(&self.body, env, options);
        let elapsed = start.elapsed();

        if options.trace_decode_time {
            log::info!(
                "Compiling wasm function {}: body {} bytes, took {:.3} ms",
                self.func_index,
                self.body.bytes.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }

        match &result {
            Ok(code) => {
                session.record_function_compiled(code.memory_cost);
                session.record_instructions(code.instruction_count);
                session.record_spills(code.spill_count);
            }
            Err(Bailout::Unsupported { reason }) => session.record_unsupported(reason),
            Err(Bailout::Validation { .. }) => session.record_validation_failure(),
        }
        result
    }
}
