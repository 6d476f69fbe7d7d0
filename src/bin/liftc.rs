//! Compile every function of a wasm module with the baseline tier.
//!
//! Prints one line per function (code size or the reason it was rejected)
//! followed by the session statistics. With `--emit-obj` the compiled
//! functions are also written to a relocatable ELF object.

use bumpalo::Bump;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use wasm_baseline::baseline::{CompilationUnit, CompileOptions, SafepointTable};
use wasm_baseline::core::CompilationSession;
use wasm_baseline::wasm::WasmModule;
use wasm_baseline::x64::ObjectBuilder;

#[derive(Parser, Debug)]
#[command(name = "liftc", about = "Single-pass baseline compiler for WebAssembly modules.")]
struct Args {
    /// Input module (.wasm)
    input: PathBuf,

    /// Write the compiled functions to this ELF object file
    #[arg(long, value_name = "PATH")]
    emit_obj: Option<PathBuf>,

    /// Operand stack values allowed on top of the locals
    #[arg(long, value_name = "N", default_value_t = CompileOptions::default().max_value_stack_height)]
    max_stack: u32,

    /// Trace the cache state before every instruction (use with RUST_LOG=trace)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    trace: bool,

    /// Log the compile time of every function
    #[arg(long, action = clap::ArgAction::SetTrue)]
    trace_decode_time: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let bytes = fs::read(&args.input)?;
    let module = WasmModule::parse(&bytes)?;
    let options = CompileOptions {
        max_value_stack_height: args.max_stack,
        trace_cache_state: args.trace,
        trace_decode_time: args.trace_decode_time,
    };

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut object = args.emit_obj.as_ref().map(|_| ObjectBuilder::new());

    for index in 0..module.functions.len() {
        let unit = CompilationUnit::new(index as u32, module.body(index));
        match unit.execute(&module.env, &options, &session) {
            Ok(code) => {
                let table = SafepointTable::parse(&code.code, code.safepoint_table_offset)?;
                println!(
                    "func[{index}] {}: {} bytes, {} frame slots, {} safepoints",
                    module.body(index).sig,
                    code.memory_cost,
                    table.frame_slot_count,
                    table.entries.len()
                );
                if let Some(object) = object.as_mut() {
                    let name = session.alloc_str(&format!("wasm_func_{index}"));
                    object.add_function(name, &code);
                }
            }
            Err(bailout) => {
                let action = if bailout.is_unsupported() {
                    "left to another tier"
                } else {
                    "rejected"
                };
                println!("func[{index}] {}: {bailout} ({action})", module.body(index).sig);
            }
        }
    }

    if let (Some(path), Some(object)) = (args.emit_obj.as_ref(), object) {
        let count = object.function_count();
        fs::write(path, object.finish()?)?;
        println!("wrote {count} functions to {}", path.display());
    }

    print!("{}", session.stats());
    Ok(())
}
