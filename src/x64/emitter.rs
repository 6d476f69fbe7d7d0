// CodeEmitter implementation for x86-64. The frame is a classic RBP frame: the prologue pushes
// RBP, points it at the saved RBP and reserves 8 bytes for the instance context pointer plus
// 8 bytes per value slot, rounded up so RSP stays 16-byte aligned. Everything is addressed off
// RBP: the context at [rbp-8], value slot i at [rbp-16-8*i], and arguments the caller passed
// on its stack at [rbp+16+8*n]. Values are 32 bits wide, so slots only use their low half.
//
// Register use: the cache set is the caller-saved GP registers minus R11 (RAX, RCX, RDX, RSI,
// RDI, R8-R10) and XMM0-XMM7. R11 and XMM15 are the scratch registers; the compiler's move
// scheduler may borrow them to break cycles and this emitter uses them inside single
// operations (stack-to-stack moves, float constants, non-commutative float ops). Callee-saved
// registers are never touched, so the epilogue has nothing to restore.

//! x86-64 code emission for the baseline compiler.

use super::encoder::X64Encoder;
use crate::core::emitter::{CodeEmitter, F32BinOp, I32BinOp, Label};
use crate::core::error::{EmitResult, EncodingError};
use crate::core::register_file::{AsmReg, RegBitSet, RegClass};
use crate::core::types::{ValueType, WasmValue};

const RAX: AsmReg = AsmReg::gp(0);
const RSP: AsmReg = AsmReg::gp(4);
const RBP: AsmReg = AsmReg::gp(5);
const R11: AsmReg = AsmReg::gp(11);
const XMM0: AsmReg = AsmReg::fp(0);
const XMM15: AsmReg = AsmReg::fp(15);

/// RBP offset of the spilled instance context pointer.
const CONTEXT_OFFSET: i32 = -8;
const SLOT_SIZE: i32 = 8;

const CACHE_REGS: [AsmReg; 16] = [
    AsmReg::gp(0),
    AsmReg::gp(1),
    AsmReg::gp(2),
    AsmReg::gp(6),
    AsmReg::gp(7),
    AsmReg::gp(8),
    AsmReg::gp(9),
    AsmReg::gp(10),
    AsmReg::fp(0),
    AsmReg::fp(1),
    AsmReg::fp(2),
    AsmReg::fp(3),
    AsmReg::fp(4),
    AsmReg::fp(5),
    AsmReg::fp(6),
    AsmReg::fp(7),
];

fn slot_offset(index: u32) -> i32 {
    CONTEXT_OFFSET - SLOT_SIZE - SLOT_SIZE * index as i32
}

fn caller_slot_offset(slot: u32) -> i32 {
    // Saved RBP and the return address sit between RBP and the arguments.
    2 * SLOT_SIZE + SLOT_SIZE * slot as i32
}

fn frame_size(slot_count: u32) -> i32 {
    let bytes = SLOT_SIZE as u32 * (slot_count + 1);
    bytes.next_multiple_of(16) as i32
}

fn class_of(ty: ValueType) -> EmitResult<RegClass> {
    ty.reg_class().ok_or(EncodingError::InvalidRegister)
}

fn displacement(offset: u32) -> EmitResult<i32> {
    i32::try_from(offset)
        .map_err(|_| EncodingError::AssemblyError(format!("offset {offset:#x} out of range")))
}

/// Emits x86-64 machine code for one function.
pub struct X64Emitter {
    encoder: X64Encoder,
}

impl X64Emitter {
    pub fn new() -> EmitResult<Self> {
        Ok(Self {
            encoder: X64Encoder::new()?,
        })
    }

    fn load_slot(&mut self, dst: AsmReg, offset: i32, ty: ValueType) -> EmitResult {
        match class_of(ty)? {
            RegClass::Gp => self.encoder.mov32_reg_mem(dst, RBP, offset),
            RegClass::Fp => self.encoder.movss_reg_mem(dst, RBP, offset),
        }
    }
}

impl CodeEmitter for X64Emitter {
    fn cache_registers(&self) -> RegBitSet {
        RegBitSet::from_regs(&CACHE_REGS)
    }

    fn scratch_register(&self, class: RegClass) -> AsmReg {
        match class {
            RegClass::Gp => R11,
            RegClass::Fp => XMM15,
        }
    }

    fn instruction_count(&self) -> usize {
        self.encoder.instruction_count()
    }

    fn new_label(&mut self) -> Label {
        self.encoder.create_label()
    }

    fn bind(&mut self, label: Label) -> EmitResult {
        self.encoder.place_label(label)
    }

    fn is_bound(&self, label: Label) -> bool {
        self.encoder.is_placed(label)
    }

    fn jmp(&mut self, label: Label) -> EmitResult {
        self.encoder.jmp(label)
    }

    fn jump_if_zero(&mut self, reg: AsmReg, label: Label) -> EmitResult {
        self.encoder.test32_reg_reg(reg, reg)?;
        self.encoder.je(label)
    }

    fn jump_if_not_equal(&mut self, reg: AsmReg, imm: i32, label: Label) -> EmitResult {
        self.encoder.cmp32_reg_imm(reg, imm)?;
        self.encoder.jne(label)
    }

    fn enter_frame(&mut self, slot_count: u32) -> EmitResult {
        self.encoder.push_reg(RBP)?;
        self.encoder.mov64_reg_reg(RBP, RSP)?;
        self.encoder.sub64_reg_imm(RSP, frame_size(slot_count))
    }

    fn leave_frame_and_return(&mut self) -> EmitResult {
        self.encoder.mov64_reg_reg(RSP, RBP)?;
        self.encoder.pop_reg(RBP)?;
        self.encoder.ret()
    }

    fn spill_context(&mut self, reg: AsmReg) -> EmitResult {
        self.encoder.mov64_mem_reg(RBP, CONTEXT_OFFSET, reg)
    }

    fn load_from_context(&mut self, dst: AsmReg, offset: i32) -> EmitResult {
        self.encoder.mov64_reg_mem(dst, RBP, CONTEXT_OFFSET)?;
        self.encoder.mov64_reg_mem(dst, dst, offset)
    }

    fn load_caller_frame_slot(&mut self, dst: AsmReg, slot: u32, ty: ValueType) -> EmitResult {
        self.load_slot(dst, caller_slot_offset(slot), ty)
    }

    fn move_to_return_register(&mut self, src: AsmReg, ty: ValueType) -> EmitResult {
        match class_of(ty)? {
            RegClass::Gp if src != RAX => self.encoder.mov32_reg_reg(RAX, src),
            RegClass::Fp if src != XMM0 => self.encoder.movaps_reg_reg(XMM0, src),
            _ => Ok(()),
        }
    }

    fn load_constant(&mut self, dst: AsmReg, value: WasmValue) -> EmitResult {
        match value {
            WasmValue::I32(0) => self.encoder.xor32_reg_reg(dst, dst),
            WasmValue::I32(v) => self.encoder.mov32_reg_imm(dst, v),
            WasmValue::F32(_) if value.bits() == 0 => self.encoder.xorps_reg_reg(dst, dst),
            WasmValue::F32(_) => {
                self.encoder.mov32_reg_imm(R11, value.bits() as i32)?;
                self.encoder.movd_xmm_gp32(dst, R11)
            }
        }
    }

    fn move_register(&mut self, dst: AsmReg, src: AsmReg, ty: ValueType) -> EmitResult {
        if dst == src {
            return Ok(());
        }
        match class_of(ty)? {
            RegClass::Gp => self.encoder.mov32_reg_reg(dst, src),
            RegClass::Fp => self.encoder.movaps_reg_reg(dst, src),
        }
    }

    fn spill(&mut self, index: u32, src: AsmReg, ty: ValueType) -> EmitResult {
        match class_of(ty)? {
            RegClass::Gp => self.encoder.mov32_mem_reg(RBP, slot_offset(index), src),
            RegClass::Fp => self.encoder.movss_mem_reg(RBP, slot_offset(index), src),
        }
    }

    fn spill_constant(&mut self, index: u32, value: WasmValue) -> EmitResult {
        self.encoder
            .mov32_mem_imm(RBP, slot_offset(index), value.bits() as i32)
    }

    fn fill(&mut self, dst: AsmReg, index: u32, ty: ValueType) -> EmitResult {
        self.load_slot(dst, slot_offset(index), ty)
    }

    fn move_stack_value(&mut self, dst_index: u32, src_index: u32, ty: ValueType) -> EmitResult {
        if dst_index == src_index {
            return Ok(());
        }
        // Bit pattern copy, floats included.
        class_of(ty)?;
        self.encoder.mov32_reg_mem(R11, RBP, slot_offset(src_index))?;
        self.encoder.mov32_mem_reg(RBP, slot_offset(dst_index), R11)
    }

    fn load(&mut self, dst: AsmReg, base: AsmReg, offset: u32, ty: ValueType) -> EmitResult {
        let disp = displacement(offset)?;
        match class_of(ty)? {
            RegClass::Gp => self.encoder.mov32_reg_mem(dst, base, disp),
            RegClass::Fp => self.encoder.movss_reg_mem(dst, base, disp),
        }
    }

    fn store(&mut self, base: AsmReg, offset: u32, src: AsmReg, ty: ValueType) -> EmitResult {
        let disp = displacement(offset)?;
        match class_of(ty)? {
            RegClass::Gp => self.encoder.mov32_mem_reg(base, disp, src),
            RegClass::Fp => self.encoder.movss_mem_reg(base, disp, src),
        }
    }

    fn emit_i32_binop(&mut self, op: I32BinOp, dst: AsmReg, lhs: AsmReg, rhs: AsmReg) -> EmitResult {
        let apply = |encoder: &mut X64Encoder, dst: AsmReg, src: AsmReg| match op {
            I32BinOp::Add => encoder.add32_reg_reg(dst, src),
            I32BinOp::Sub => encoder.sub32_reg_reg(dst, src),
            I32BinOp::Mul => encoder.imul32_reg_reg(dst, src),
            I32BinOp::And => encoder.and32_reg_reg(dst, src),
            I32BinOp::Or => encoder.or32_reg_reg(dst, src),
            I32BinOp::Xor => encoder.xor32_reg_reg(dst, src),
        };

        if dst == lhs {
            apply(&mut self.encoder, dst, rhs)
        } else if dst == rhs && op.is_commutative() {
            apply(&mut self.encoder, dst, lhs)
        } else if dst == rhs {
            // dst = lhs - dst
            self.encoder.neg32_reg(dst)?;
            self.encoder.add32_reg_reg(dst, lhs)
        } else {
            self.encoder.mov32_reg_reg(dst, lhs)?;
            apply(&mut self.encoder, dst, rhs)
        }
    }

    fn emit_f32_binop(&mut self, op: F32BinOp, dst: AsmReg, lhs: AsmReg, rhs: AsmReg) -> EmitResult {
        let apply = |encoder: &mut X64Encoder, dst: AsmReg, src: AsmReg| match op {
            F32BinOp::Add => encoder.addss_reg_reg(dst, src),
            F32BinOp::Sub => encoder.subss_reg_reg(dst, src),
            F32BinOp::Mul => encoder.mulss_reg_reg(dst, src),
        };

        if dst == lhs {
            apply(&mut self.encoder, dst, rhs)
        } else if dst == rhs && op.is_commutative() {
            apply(&mut self.encoder, dst, lhs)
        } else if dst == rhs {
            self.encoder.movaps_reg_reg(XMM15, rhs)?;
            self.encoder.movaps_reg_reg(dst, lhs)?;
            apply(&mut self.encoder, dst, XMM15)
        } else {
            self.encoder.movaps_reg_reg(dst, lhs)?;
            apply(&mut self.encoder, dst, rhs)
        }
    }

    fn finish(mut self) -> EmitResult<Vec<u8>> {
        self.encoder.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EAX: AsmReg = AsmReg::gp(0);
    const ECX: AsmReg = AsmReg::gp(1);

    #[test]
    fn test_frame_layout() {
        assert_eq!(slot_offset(0), -16);
        assert_eq!(slot_offset(3), -40);
        assert_eq!(caller_slot_offset(1), 24);
        // Context plus one slot fits in 16 bytes, a second slot needs 32.
        assert_eq!(frame_size(1), 16);
        assert_eq!(frame_size(2), 32);
        assert_eq!(frame_size(0), 16);
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let mut emitter = X64Emitter::new().unwrap();
        emitter.enter_frame(1).unwrap();
        emitter.leave_frame_and_return().unwrap();
        let code = emitter.finish().unwrap();
        assert_eq!(
            code,
            vec![
                0x55, // push rbp
                0x48, 0x89, 0xe5, // mov rbp, rsp
                0x48, 0x83, 0xec, 0x10, // sub rsp, 16
                0x48, 0x89, 0xec, // mov rsp, rbp
                0x5d, // pop rbp
                0xc3, // ret
            ]
        );
    }

    #[test]
    fn test_sub_into_rhs_negates() {
        let mut emitter = X64Emitter::new().unwrap();
        emitter.emit_i32_binop(I32BinOp::Sub, EAX, ECX, EAX).unwrap();
        let code = emitter.finish().unwrap();
        // neg eax; add eax, ecx
        assert_eq!(code, vec![0xf7, 0xd8, 0x01, 0xc8]);
    }

    #[test]
    fn test_commutative_op_into_rhs() {
        let mut emitter = X64Emitter::new().unwrap();
        emitter.emit_i32_binop(I32BinOp::Add, EAX, ECX, EAX).unwrap();
        assert_eq!(emitter.instruction_count(), 1);
        assert_eq!(emitter.finish().unwrap(), vec![0x01, 0xc8]);
    }

    #[test]
    fn test_float_sub_into_rhs_uses_scratch() {
        let mut emitter = X64Emitter::new().unwrap();
        emitter
            .emit_f32_binop(F32BinOp::Sub, AsmReg::fp(1), AsmReg::fp(0), AsmReg::fp(1))
            .unwrap();
        assert_eq!(emitter.instruction_count(), 3);
    }

    #[test]
    fn test_zero_constants_use_xor() {
        let mut emitter = X64Emitter::new().unwrap();
        emitter.load_constant(EAX, WasmValue::I32(0)).unwrap();
        emitter.load_constant(XMM0, WasmValue::F32(0.0)).unwrap();
        assert_eq!(emitter.instruction_count(), 2);
        emitter.load_constant(XMM0, WasmValue::F32(1.5)).unwrap();
        assert_eq!(emitter.instruction_count(), 4);
    }

    #[test]
    fn test_scratch_registers_are_not_cached() {
        let emitter = X64Emitter::new().unwrap();
        let cache = emitter.cache_registers();
        assert!(!cache.contains(emitter.scratch_register(RegClass::Gp)));
        assert!(!cache.contains(emitter.scratch_register(RegClass::Fp)));
        assert!(!cache.contains(RSP));
        assert!(!cache.contains(RBP));
        assert!(!cache.contains(AsmReg::gp(3)));
    }

    #[test]
    fn test_return_move_is_skipped_when_in_place() {
        let mut emitter = X64Emitter::new().unwrap();
        emitter.move_to_return_register(EAX, ValueType::I32).unwrap();
        emitter.move_to_return_register(XMM0, ValueType::F32).unwrap();
        assert_eq!(emitter.instruction_count(), 0);
        emitter.move_to_return_register(ECX, ValueType::I32).unwrap();
        assert_eq!(emitter.instruction_count(), 1);
    }

    #[test]
    fn test_wide_types_are_rejected() {
        let mut emitter = X64Emitter::new().unwrap();
        assert_eq!(
            emitter.spill(0, EAX, ValueType::I64),
            Err(EncodingError::InvalidRegister)
        );
    }
}
