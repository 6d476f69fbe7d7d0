//! Value types and literals as seen by the compiler.

use super::register_file::RegClass;
use std::fmt;

/// Semantic type of a wasm value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Ref,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::V128 => "v128",
            ValueType::Ref => "ref",
        }
    }

    /// Register class holding values of this type, if the baseline tier
    /// keeps such values in registers at all.
    pub fn reg_class(self) -> Option<RegClass> {
        match self {
            ValueType::I32 => Some(RegClass::Gp),
            ValueType::F32 => Some(RegClass::Fp),
            _ => None,
        }
    }

    /// Size of the value in bytes.
    pub fn size(self) -> u32 {
        match self {
            ValueType::I32 | ValueType::F32 => 4,
            ValueType::I64 | ValueType::F64 | ValueType::Ref => 8,
            ValueType::V128 => 16,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<wasmparser::ValType> for ValueType {
    fn from(ty: wasmparser::ValType) -> Self {
        match ty {
            wasmparser::ValType::I32 => ValueType::I32,
            wasmparser::ValType::I64 => ValueType::I64,
            wasmparser::ValType::F32 => ValueType::F32,
            wasmparser::ValType::F64 => ValueType::F64,
            wasmparser::ValType::V128 => ValueType::V128,
            wasmparser::ValType::Ref(_) => ValueType::Ref,
        }
    }
}

/// A literal the compiler can materialize into a register or slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WasmValue {
    I32(i32),
    F32(f32),
}

impl WasmValue {
    pub fn ty(self) -> ValueType {
        match self {
            WasmValue::I32(_) => ValueType::I32,
            WasmValue::F32(_) => ValueType::F32,
        }
    }

    /// Raw 32-bit pattern of the literal.
    pub fn bits(self) -> u32 {
        match self {
            WasmValue::I32(v) => v as u32,
            WasmValue::F32(v) => v.to_bits(),
        }
    }
}

/// Function signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncSig {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FuncSig {
    pub fn new(params: impl Into<Vec<ValueType>>, results: impl Into<Vec<ValueType>>) -> Self {
        Self {
            params: params.into(),
            results: results.into(),
        }
    }
}

impl fmt::Display for FuncSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |types: &[ValueType]| {
            types.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        };
        write!(f, "({}) -> ({})", list(&self.params), list(&self.results))
    }
}
