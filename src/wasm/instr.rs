//! Decoded instruction forms handed to the compiler.

use crate::core::types::ValueType;
use std::fmt;

/// Binary operators with a common shape across value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }
}

/// One decoded instruction.
///
/// Operands have been validated by the decoder: indices are in range and
/// types line up.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Nop,
    Unreachable,
    Block { result: Option<ValueType> },
    Loop { result: Option<ValueType> },
    If { result: Option<ValueType> },
    Else,
    /// Close the innermost construct. `fallthrough` tells whether the end is
    /// reached by falling off the construct's last instruction.
    End { fallthrough: bool },
    Br { depth: u32 },
    BrIf { depth: u32 },
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Drop,
    Select,
    LocalGet { index: u32 },
    LocalSet { index: u32 },
    LocalTee { index: u32 },
    GlobalGet { index: u32 },
    GlobalSet { index: u32 },
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    Binary { op: BinaryOp, ty: ValueType },
    /// Any other numeric operator (comparisons, unary operators,
    /// conversions, division, shifts, ...).
    Numeric {
        name: &'static str,
        params: &'static [ValueType],
        result: ValueType,
    },
    /// An operator outside what the decoder models.
    Unmodeled(String),
}

impl Instr {
    /// Text format mnemonic.
    pub fn name(&self) -> String {
        match self {
            Instr::Nop => "nop".into(),
            Instr::Unreachable => "unreachable".into(),
            Instr::Block { .. } => "block".into(),
            Instr::Loop { .. } => "loop".into(),
            Instr::If { .. } => "if".into(),
            Instr::Else => "else".into(),
            Instr::End { .. } => "end".into(),
            Instr::Br { .. } => "br".into(),
            Instr::BrIf { .. } => "br_if".into(),
            Instr::BrTable { .. } => "br_table".into(),
            Instr::Return => "return".into(),
            Instr::Drop => "drop".into(),
            Instr::Select => "select".into(),
            Instr::LocalGet { .. } => "local.get".into(),
            Instr::LocalSet { .. } => "local.set".into(),
            Instr::LocalTee { .. } => "local.tee".into(),
            Instr::GlobalGet { .. } => "global.get".into(),
            Instr::GlobalSet { .. } => "global.set".into(),
            Instr::I32Const(_) => "i32.const".into(),
            Instr::I64Const(_) => "i64.const".into(),
            Instr::F32Const(_) => "f32.const".into(),
            Instr::F64Const(_) => "f64.const".into(),
            Instr::Binary { op, ty } => format!("{ty}.{}", op.name()),
            Instr::Numeric { name, .. } => (*name).into(),
            Instr::Unmodeled(name) => name.clone(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
