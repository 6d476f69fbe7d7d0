// Thin layer over the iced-x86 code assembler. X64Encoder converts AsmReg identifiers into
// iced register operands (64-bit and 32-bit general purpose views, XMM registers), emits the
// handful of instruction forms the baseline compiler needs (32-bit integer ALU operations,
// scalar single precision SSE arithmetic, frame-relative loads and stores, compares and
// jumps) and owns the function's label table. Labels are plain indices into that table;
// each entry keeps the iced CodeLabel and whether it has been placed. Placing a label is
// followed by a zero-byte pseudo instruction so several labels can share one address.

//! x86-64 instruction encoding using iced-x86.

use crate::core::emitter::Label;
use crate::core::error::EncodingError;
use crate::core::register_file::{AsmReg, FP_BANK, GP_BANK};
use iced_x86::code_asm::*;
use iced_x86::IcedError;

fn asm_error(e: IcedError) -> EncodingError {
    EncodingError::AssemblyError(e.to_string())
}

#[derive(Debug, Clone, Copy)]
struct LabelSlot {
    label: CodeLabel,
    placed: bool,
}

/// x86-64 instruction encoder for one function.
pub struct X64Encoder {
    assembler: CodeAssembler,
    labels: Vec<LabelSlot>,
}

impl X64Encoder {
    pub fn new() -> Result<Self, EncodingError> {
        let assembler = CodeAssembler::new(64).map_err(asm_error)?;
        Ok(Self {
            assembler,
            labels: Vec::new(),
        })
    }

    /// Convert AsmReg to iced-x86 64-bit GP register.
    fn gp64(reg: AsmReg) -> Result<AsmRegister64, EncodingError> {
        const GP64_REGS: [AsmRegister64; 16] = [
            rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
        ];
        if reg.bank != GP_BANK {
            return Err(EncodingError::InvalidRegister);
        }
        GP64_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister)
    }

    /// Convert AsmReg to iced-x86 32-bit GP register.
    fn gp32(reg: AsmReg) -> Result<AsmRegister32, EncodingError> {
        const GP32_REGS: [AsmRegister32; 16] = [
            eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
        ];
        if reg.bank != GP_BANK {
            return Err(EncodingError::InvalidRegister);
        }
        GP32_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister)
    }

    fn xmm(reg: AsmReg) -> Result<AsmRegisterXmm, EncodingError> {
        const XMM_REGS: [AsmRegisterXmm; 16] = [
            xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7, xmm8, xmm9, xmm10, xmm11, xmm12,
            xmm13, xmm14, xmm15,
        ];
        if reg.bank != FP_BANK {
            return Err(EncodingError::InvalidRegister);
        }
        XMM_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister)
    }

    fn mem(base: AsmReg, offset: i32) -> Result<AsmMemoryOperand, EncodingError> {
        Ok(Self::gp64(base)? + offset)
    }

    pub fn instruction_count(&self) -> usize {
        self.assembler.instructions().len()
    }

    // ==== LABELS ====

    pub fn create_label(&mut self) -> Label {
        let label = self.assembler.create_label();
        self.labels.push(LabelSlot {
            label,
            placed: false,
        });
        Label(self.labels.len() as u32 - 1)
    }

    fn slot(&self, label: Label) -> Result<LabelSlot, EncodingError> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .ok_or(EncodingError::InvalidLabel(label.0))
    }

    /// Place `label` at the current position.
    pub fn place_label(&mut self, label: Label) -> Result<(), EncodingError> {
        let mut slot = self.slot(label)?;
        if slot.placed {
            return Err(EncodingError::InvalidLabel(label.0));
        }
        self.assembler.set_label(&mut slot.label).map_err(asm_error)?;
        self.assembler.zero_bytes().map_err(asm_error)?;
        slot.placed = true;
        self.labels[label.0 as usize] = slot;
        Ok(())
    }

    pub fn is_placed(&self, label: Label) -> bool {
        self.slot(label).map(|slot| slot.placed).unwrap_or(false)
    }

    // ==== CONTROL FLOW ====

    pub fn jmp(&mut self, label: Label) -> Result<(), EncodingError> {
        let target = self.slot(label)?.label;
        self.assembler.jmp(target).map_err(asm_error)
    }

    pub fn je(&mut self, label: Label) -> Result<(), EncodingError> {
        let target = self.slot(label)?.label;
        self.assembler.je(target).map_err(asm_error)
    }

    pub fn jne(&mut self, label: Label) -> Result<(), EncodingError> {
        let target = self.slot(label)?.label;
        self.assembler.jne(target).map_err(asm_error)
    }

    pub fn test32_reg_reg(&mut self, left: AsmReg, right: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .test(Self::gp32(left)?, Self::gp32(right)?)
            .map_err(asm_error)
    }

    pub fn cmp32_reg_imm(&mut self, reg: AsmReg, imm: i32) -> Result<(), EncodingError> {
        self.assembler.cmp(Self::gp32(reg)?, imm).map_err(asm_error)
    }

    pub fn push_reg(&mut self, reg: AsmReg) -> Result<(), EncodingError> {
        self.assembler.push(Self::gp64(reg)?).map_err(asm_error)
    }

    pub fn pop_reg(&mut self, reg: AsmReg) -> Result<(), EncodingError> {
        self.assembler.pop(Self::gp64(reg)?).map_err(asm_error)
    }

    pub fn ret(&mut self) -> Result<(), EncodingError> {
        self.assembler.ret().map_err(asm_error)
    }

    // ==== MOVES ====

    pub fn mov64_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .mov(Self::gp64(dst)?, Self::gp64(src)?)
            .map_err(asm_error)
    }

    pub fn mov32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .mov(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn mov32_reg_imm(&mut self, dst: AsmReg, imm: i32) -> Result<(), EncodingError> {
        self.assembler.mov(Self::gp32(dst)?, imm).map_err(asm_error)
    }

    pub fn mov64_reg_mem(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> Result<(), EncodingError> {
        let mem = qword_ptr(Self::mem(base, offset)?);
        self.assembler.mov(Self::gp64(dst)?, mem).map_err(asm_error)
    }

    pub fn mov64_mem_reg(&mut self, base: AsmReg, offset: i32, src: AsmReg) -> Result<(), EncodingError> {
        let mem = qword_ptr(Self::mem(base, offset)?);
        self.assembler.mov(mem, Self::gp64(src)?).map_err(asm_error)
    }

    pub fn mov32_reg_mem(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> Result<(), EncodingError> {
        let mem = dword_ptr(Self::mem(base, offset)?);
        self.assembler.mov(Self::gp32(dst)?, mem).map_err(asm_error)
    }

    pub fn mov32_mem_reg(&mut self, base: AsmReg, offset: i32, src: AsmReg) -> Result<(), EncodingError> {
        let mem = dword_ptr(Self::mem(base, offset)?);
        self.assembler.mov(mem, Self::gp32(src)?).map_err(asm_error)
    }

    pub fn mov32_mem_imm(&mut self, base: AsmReg, offset: i32, imm: i32) -> Result<(), EncodingError> {
        let mem = dword_ptr(Self::mem(base, offset)?);
        self.assembler.mov(mem, imm).map_err(asm_error)
    }

    pub fn sub64_reg_imm(&mut self, dst: AsmReg, imm: i32) -> Result<(), EncodingError> {
        self.assembler.sub(Self::gp64(dst)?, imm).map_err(asm_error)
    }

    // ==== 32-BIT INTEGER ARITHMETIC ====

    pub fn add32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .add(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn sub32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .sub(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn imul32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .imul_2(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn and32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .and(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn or32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .or(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn xor32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .xor(Self::gp32(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn neg32_reg(&mut self, dst: AsmReg) -> Result<(), EncodingError> {
        self.assembler.neg(Self::gp32(dst)?).map_err(asm_error)
    }

    // ==== SSE SCALAR SINGLE ====

    pub fn movaps_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .movaps(Self::xmm(dst)?, Self::xmm(src)?)
            .map_err(asm_error)
    }

    pub fn movd_xmm_gp32(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .movd(Self::xmm(dst)?, Self::gp32(src)?)
            .map_err(asm_error)
    }

    pub fn xorps_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .xorps(Self::xmm(dst)?, Self::xmm(src)?)
            .map_err(asm_error)
    }

    pub fn movss_reg_mem(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> Result<(), EncodingError> {
        let mem = dword_ptr(Self::mem(base, offset)?);
        self.assembler.movss(Self::xmm(dst)?, mem).map_err(asm_error)
    }

    pub fn movss_mem_reg(&mut self, base: AsmReg, offset: i32, src: AsmReg) -> Result<(), EncodingError> {
        let mem = dword_ptr(Self::mem(base, offset)?);
        self.assembler.movss(mem, Self::xmm(src)?).map_err(asm_error)
    }

    pub fn addss_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .addss(Self::xmm(dst)?, Self::xmm(src)?)
            .map_err(asm_error)
    }

    pub fn subss_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .subss(Self::xmm(dst)?, Self::xmm(src)?)
            .map_err(asm_error)
    }

    pub fn mulss_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        self.assembler
            .mulss(Self::xmm(dst)?, Self::xmm(src)?)
            .map_err(asm_error)
    }

    /// Place every label still unplaced and assemble the function.
    pub fn finalize(&mut self) -> Result<Vec<u8>, EncodingError> {
        for index in 0..self.labels.len() {
            if !self.labels[index].placed {
                self.place_label(Label(index as u32))?;
            }
        }
        self.assembler.assemble(0).map_err(asm_error)
    }
}
