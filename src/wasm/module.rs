//! Module environment and function bodies.

use crate::core::types::{FuncSig, ValueType};
use thiserror::Error;
use wasmparser::{Parser, Payload};

/// Runtime context handed to compiled code as its first argument.
#[repr(C)]
#[derive(Debug)]
pub struct InstanceContext {
    /// Start of the globals area; global `i` lives at `GlobalDesc::offset`.
    pub globals_start: *mut u8,
}

/// Offset of `globals_start` inside [`InstanceContext`].
pub const GLOBALS_START_OFFSET: i32 = std::mem::offset_of!(InstanceContext, globals_start) as i32;

/// A global as seen by compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalDesc {
    pub ty: ValueType,
    pub mutable: bool,
    /// Byte offset from `globals_start`.
    pub offset: u32,
}

/// What the compiler needs to know about the enclosing module.
#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    pub signatures: Vec<FuncSig>,
    pub globals: Vec<GlobalDesc>,
    globals_size: u32,
}

impl ModuleEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signature(&mut self, sig: FuncSig) -> u32 {
        self.signatures.push(sig);
        self.signatures.len() as u32 - 1
    }

    /// Append a global, laying it out naturally aligned after the previous ones.
    pub fn add_global(&mut self, ty: ValueType, mutable: bool) -> u32 {
        let align = ty.size();
        let offset = (self.globals_size + align - 1) & !(align - 1);
        self.globals_size = offset + ty.size();
        self.globals.push(GlobalDesc {
            ty,
            mutable,
            offset,
        });
        self.globals.len() as u32 - 1
    }

    pub fn global(&self, index: u32) -> Option<&GlobalDesc> {
        self.globals.get(index as usize)
    }

    /// Bytes needed for the globals area.
    pub fn globals_size(&self) -> u32 {
        self.globals_size
    }
}

/// One function body: local declarations followed by the operator stream.
#[derive(Debug, Clone, Copy)]
pub struct FuncBody<'a> {
    pub sig: &'a FuncSig,
    pub bytes: &'a [u8],
    /// Position of `bytes` within the module, for diagnostics.
    pub offset: usize,
}

impl<'a> FuncBody<'a> {
    pub fn new(sig: &'a FuncSig, bytes: &'a [u8]) -> Self {
        Self {
            sig,
            bytes,
            offset: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("malformed module: {0}")]
    Parse(#[from] wasmparser::BinaryReaderError),

    #[error("modules with imports are not supported")]
    Imports,

    #[error("function {index} refers to unknown type {type_index}")]
    UnknownType { index: u32, type_index: u32 },

    #[error("{declared} functions declared but {defined} bodies present")]
    FunctionCountMismatch { declared: usize, defined: usize },
}

/// A function defined in a parsed module.
#[derive(Debug, Clone, Copy)]
pub struct FunctionEntry<'a> {
    pub type_index: u32,
    pub bytes: &'a [u8],
    pub offset: usize,
}

/// A self-contained module split into environment and bodies.
#[derive(Debug)]
pub struct WasmModule<'a> {
    pub env: ModuleEnv,
    pub functions: Vec<FunctionEntry<'a>>,
}

impl<'a> WasmModule<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ModuleError> {
        let mut env = ModuleEnv::new();
        let mut type_indices = Vec::new();
        let mut bodies = Vec::new();

        for payload in Parser::new(0).parse_all(bytes) {
            match payload? {
                Payload::TypeSection(reader) => {
                    for func_type in reader.into_iter_err_on_gc_types() {
                        let func_type = func_type?;
                        env.add_signature(FuncSig::new(
                            func_type
                                .params()
                                .iter()
                                .map(|&t| ValueType::from(t))
                                .collect::<Vec<_>>(),
                            func_type
                                .results()
                                .iter()
                                .map(|&t| ValueType::from(t))
                                .collect::<Vec<_>>(),
                        ));
                    }
                }
                Payload::ImportSection(_) => return Err(ModuleError::Imports),
                Payload::FunctionSection(reader) => {
                    for type_index in reader {
                        type_indices.push(type_index?);
                    }
                }
                Payload::GlobalSection(reader) => {
                    for global in reader {
                        let global = global?;
                        env.add_global(global.ty.content_type.into(), global.ty.mutable);
                    }
                }
                Payload::CodeSectionEntry(body) => {
                    let range = body.range();
                    bodies.push((range.start, &bytes[range]));
                }
                _ => {}
            }
        }

        if type_indices.len() != bodies.len() {
            return Err(ModuleError::FunctionCountMismatch {
                declared: type_indices.len(),
                defined: bodies.len(),
            });
        }

        let mut functions = Vec::with_capacity(bodies.len());
        for (index, (type_index, (offset, bytes))) in type_indices.into_iter().zip(bodies).enumerate() {
            if type_index as usize >= env.signatures.len() {
                return Err(ModuleError::UnknownType {
                    index: index as u32,
                    type_index,
                });
            }
            functions.push(FunctionEntry {
                type_index,
                bytes,
                offset,
            });
        }
        Ok(Self { env, functions })
    }

    /// Body of defined function `index`.
    pub fn body(&self, index: usize) -> FuncBody<'_> {
        let entry = &self.functions[index];
        FuncBody {
            sig: &self.env.signatures[entry.type_index as usize],
            bytes: entry.bytes,
            offset: entry.offset,
        }
    }
}
