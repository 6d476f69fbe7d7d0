//! Shared helpers for building single-function modules with wasm-encoder.

#![allow(dead_code)]

use wasm_baseline::baseline::{compile, CompileOptions, CompiledCode};
use wasm_baseline::core::Bailout;
use wasm_baseline::wasm::WasmModule;
use wasm_encoder::{
    CodeSection, ConstExpr, Function, FunctionSection, GlobalSection, GlobalType, Instruction,
    Module, TypeSection, ValType,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Description of a module with one defined function.
pub struct TestFunction<'a> {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    pub locals: Vec<(u32, ValType)>,
    pub globals: Vec<ValType>,
    pub body: Vec<Instruction<'a>>,
}

impl<'a> TestFunction<'a> {
    pub fn new(params: &[ValType], results: &[ValType]) -> Self {
        Self {
            params: params.to_vec(),
            results: results.to_vec(),
            locals: Vec::new(),
            globals: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn locals(mut self, locals: &[(u32, ValType)]) -> Self {
        self.locals = locals.to_vec();
        self
    }

    pub fn globals(mut self, globals: &[ValType]) -> Self {
        self.globals = globals.to_vec();
        self
    }

    /// Operators of the body; the closing `end` is added automatically.
    pub fn body(mut self, body: Vec<Instruction<'a>>) -> Self {
        self.body = body;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut module = Module::new();

        let mut types = TypeSection::new();
        types
            .ty()
            .function(self.params.iter().copied(), self.results.iter().copied());
        module.section(&types);

        let mut functions = FunctionSection::new();
        functions.function(0);
        module.section(&functions);

        if !self.globals.is_empty() {
            let mut globals = GlobalSection::new();
            for &ty in &self.globals {
                let init = match ty {
                    ValType::I32 => ConstExpr::i32_const(0),
                    ValType::I64 => ConstExpr::i64_const(0),
                    ValType::F32 => ConstExpr::f32_const(0.0f32.into()),
                    _ => ConstExpr::f64_const(0.0f64.into()),
                };
                globals.global(
                    GlobalType {
                        val_type: ty,
                        mutable: true,
                        shared: false,
                    },
                    &init,
                );
            }
            module.section(&globals);
        }

        let mut function = Function::new(self.locals.iter().copied());
        for instr in &self.body {
            function.instruction(instr);
        }
        function.instruction(&Instruction::End);
        let mut code = CodeSection::new();
        code.function(&function);
        module.section(&code);

        module.finish()
    }
}

pub fn compile_module(bytes: &[u8], options: &CompileOptions) -> Result<CompiledCode, Bailout> {
    let module = WasmModule::parse(bytes).expect("test module parses");
    compile(&module.body(0), &module.env, options)
}

pub fn compile_function(func: &TestFunction<'_>) -> Result<CompiledCode, Bailout> {
    compile_module(&func.encode(), &CompileOptions::default())
}

pub fn unsupported_reason(result: Result<CompiledCode, Bailout>) -> String {
    match result {
        Err(Bailout::Unsupported { reason }) => reason,
        Err(other) => panic!("expected an unsupported bailout, got {other}"),
        Ok(_) => panic!("expected an unsupported bailout, got code"),
    }
}
