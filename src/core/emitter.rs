//! The interface the compiler drives to produce machine code.
//!
//! A `CodeEmitter` owns the instruction buffer and the label table of one
//! function. The compiler only ever talks about value slots by index, so the
//! frame layout (where slot `i` lives, where the context pointer is kept) is
//! entirely the emitter's business.

use super::error::EmitResult;
use super::register_file::{AsmReg, RegBitSet, RegClass};
use super::types::{ValueType, WasmValue};

/// Handle into the emitter's label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// i32 operations with a native two-operand form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I32BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

impl I32BinOp {
    pub fn is_commutative(self) -> bool {
        !matches!(self, I32BinOp::Sub)
    }
}

/// f32 operations with a native two-operand form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F32BinOp {
    Add,
    Sub,
    Mul,
}

impl F32BinOp {
    pub fn is_commutative(self) -> bool {
        !matches!(self, F32BinOp::Sub)
    }
}

pub trait CodeEmitter {
    /// Registers the compiler may keep values in.
    fn cache_registers(&self) -> RegBitSet;

    /// A register of `class` outside the cache set, free for short sequences
    /// such as breaking move cycles.
    fn scratch_register(&self, class: RegClass) -> AsmReg;

    /// Number of instructions emitted so far.
    fn instruction_count(&self) -> usize;

    fn new_label(&mut self) -> Label;
    fn bind(&mut self, label: Label) -> EmitResult;
    fn is_bound(&self, label: Label) -> bool;
    fn jmp(&mut self, label: Label) -> EmitResult;
    fn jump_if_zero(&mut self, reg: AsmReg, label: Label) -> EmitResult;
    fn jump_if_not_equal(&mut self, reg: AsmReg, imm: i32, label: Label) -> EmitResult;

    /// Set up the native frame with room for `slot_count` value slots.
    fn enter_frame(&mut self, slot_count: u32) -> EmitResult;
    fn leave_frame_and_return(&mut self) -> EmitResult;

    fn spill_context(&mut self, reg: AsmReg) -> EmitResult;
    /// Load the pointer-sized field at `offset` of the context into `dst`.
    fn load_from_context(&mut self, dst: AsmReg, offset: i32) -> EmitResult;
    /// Load an argument passed in the caller's frame.
    fn load_caller_frame_slot(&mut self, dst: AsmReg, slot: u32, ty: ValueType) -> EmitResult;
    fn move_to_return_register(&mut self, src: AsmReg, ty: ValueType) -> EmitResult;

    fn load_constant(&mut self, dst: AsmReg, value: WasmValue) -> EmitResult;
    fn move_register(&mut self, dst: AsmReg, src: AsmReg, ty: ValueType) -> EmitResult;
    fn spill(&mut self, index: u32, src: AsmReg, ty: ValueType) -> EmitResult;
    fn spill_constant(&mut self, index: u32, value: WasmValue) -> EmitResult;
    fn fill(&mut self, dst: AsmReg, index: u32, ty: ValueType) -> EmitResult;
    fn move_stack_value(&mut self, dst_index: u32, src_index: u32, ty: ValueType) -> EmitResult;

    fn load(&mut self, dst: AsmReg, base: AsmReg, offset: u32, ty: ValueType) -> EmitResult;
    fn store(&mut self, base: AsmReg, offset: u32, src: AsmReg, ty: ValueType) -> EmitResult;

    fn emit_i32_binop(&mut self, op: I32BinOp, dst: AsmReg, lhs: AsmReg, rhs: AsmReg)
        -> EmitResult;
    fn emit_f32_binop(&mut self, op: F32BinOp, dst: AsmReg, lhs: AsmReg, rhs: AsmReg)
        -> EmitResult;

    /// Assemble the function. Labels still unbound are bound at the end.
    fn finish(self) -> EmitResult<Vec<u8>>
    where
        Self: Sized;
}
