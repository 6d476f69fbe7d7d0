//! Test utilities.
//!
//! `RecordingEmitter` implements [`CodeEmitter`](super::emitter::CodeEmitter)
//! by logging every request instead of encoding it, so tests can assert on
//! what the compiler asked for. `Machine` replays such a log over a tiny model
//! of registers and frame slots to check data movement.

#[cfg(test)]
pub mod test {
    use crate::core::emitter::{CodeEmitter, F32BinOp, I32BinOp, Label};
    use crate::core::error::{EmitResult, EncodingError};
    use crate::core::register_file::{AsmReg, RegBitSet, RegClass};
    use crate::core::types::{ValueType, WasmValue};
    use hashbrown::HashMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub const GP_SCRATCH: AsmReg = AsmReg::gp(11);
    pub const FP_SCRATCH: AsmReg = AsmReg::fp(15);

    /// One recorded emitter request.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Emitted {
        Bind(Label),
        Jmp(Label),
        JumpIfZero(AsmReg, Label),
        JumpIfNotEqual(AsmReg, i32, Label),
        EnterFrame(u32),
        LeaveFrameAndReturn,
        SpillContext(AsmReg),
        LoadFromContext(AsmReg, i32),
        LoadCallerFrameSlot(AsmReg, u32),
        MoveToReturn(AsmReg),
        LoadConstant(AsmReg, WasmValue),
        Move(AsmReg, AsmReg),
        Spill(u32, AsmReg),
        SpillConstant(u32, WasmValue),
        Fill(AsmReg, u32),
        MoveStack(u32, u32),
        Load(AsmReg, AsmReg, u32),
        Store(AsmReg, u32, AsmReg),
        I32Op(I32BinOp, AsmReg, AsmReg, AsmReg),
        F32Op(F32BinOp, AsmReg, AsmReg, AsmReg),
    }

    pub type EmitLog = Rc<RefCell<Vec<Emitted>>>;

    pub struct RecordingEmitter {
        log: EmitLog,
        bound: Vec<bool>,
        cache_regs: RegBitSet,
    }

    impl RecordingEmitter {
        /// Emitter with four GP and four FP cache registers.
        pub fn new() -> Self {
            Self::with_cache_registers(RegBitSet::from_regs(&[
                AsmReg::gp(0),
                AsmReg::gp(1),
                AsmReg::gp(2),
                AsmReg::gp(6),
                AsmReg::fp(0),
                AsmReg::fp(1),
                AsmReg::fp(2),
                AsmReg::fp(3),
            ]))
        }

        pub fn with_cache_registers(cache_regs: RegBitSet) -> Self {
            Self {
                log: Rc::new(RefCell::new(Vec::new())),
                bound: Vec::new(),
                cache_regs,
            }
        }

        /// Shared handle on the request log; stays valid after `finish`.
        pub fn log(&self) -> EmitLog {
            Rc::clone(&self.log)
        }

        fn record(&mut self, op: Emitted) -> EmitResult {
            self.log.borrow_mut().push(op);
            Ok(())
        }

        fn check_label(&self, label: Label) -> EmitResult {
            if (label.0 as usize) < self.bound.len() {
                Ok(())
            } else {
                Err(EncodingError::InvalidLabel(label.0))
            }
        }
    }

    impl Default for RecordingEmitter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CodeEmitter for RecordingEmitter {
        fn cache_registers(&self) -> RegBitSet {
            self.cache_regs
        }

        fn scratch_register(&self, class: RegClass) -> AsmReg {
            match class {
                RegClass::Gp => GP_SCRATCH,
                RegClass::Fp => FP_SCRATCH,
            }
        }

        fn instruction_count(&self) -> usize {
            self.log.borrow().len()
        }

        fn new_label(&mut self) -> Label {
            self.bound.push(false);
            Label(self.bound.len() as u32 - 1)
        }

        fn bind(&mut self, label: Label) -> EmitResult {
            self.check_label(label)?;
            if self.bound[label.0 as usize] {
                return Err(EncodingError::InvalidLabel(label.0));
            }
            self.bound[label.0 as usize] = true;
            self.record(Emitted::Bind(label))
        }

        fn is_bound(&self, label: Label) -> bool {
            self.bound.get(label.0 as usize).copied().unwrap_or(false)
        }

        fn jmp(&mut self, label: Label) -> EmitResult {
            self.check_label(label)?;
            self.record(Emitted::Jmp(label))
        }

        fn jump_if_zero(&mut self, reg: AsmReg, label: Label) -> EmitResult {
            self.check_label(label)?;
            self.record(Emitted::JumpIfZero(reg, label))
        }

        fn jump_if_not_equal(&mut self, reg: AsmReg, imm: i32, label: Label) -> EmitResult {
            self.check_label(label)?;
            self.record(Emitted::JumpIfNotEqual(reg, imm, label))
        }

        fn enter_frame(&mut self, slot_count: u32) -> EmitResult {
            self.record(Emitted::EnterFrame(slot_count))
        }

        fn leave_frame_and_return(&mut self) -> EmitResult {
            self.record(Emitted::LeaveFrameAndReturn)
        }

        fn spill_context(&mut self, reg: AsmReg) -> EmitResult {
            self.record(Emitted::SpillContext(reg))
        }

        fn load_from_context(&mut self, dst: AsmReg, offset: i32) -> EmitResult {
            self.record(Emitted::LoadFromContext(dst, offset))
        }

        fn load_caller_frame_slot(&mut self, dst: AsmReg, slot: u32, _ty: ValueType) -> EmitResult {
            self.record(Emitted::LoadCallerFrameSlot(dst, slot))
        }

        fn move_to_return_register(&mut self, src: AsmReg, _ty: ValueType) -> EmitResult {
            self.record(Emitted::MoveToReturn(src))
        }

        fn load_constant(&mut self, dst: AsmReg, value: WasmValue) -> EmitResult {
            self.record(Emitted::LoadConstant(dst, value))
        }

        fn move_register(&mut self, dst: AsmReg, src: AsmReg, _ty: ValueType) -> EmitResult {
            self.record(Emitted::Move(dst, src))
        }

        fn spill(&mut self, index: u32, src: AsmReg, _ty: ValueType) -> EmitResult {
            self.record(Emitted::Spill(index, src))
        }

        fn spill_constant(&mut self, index: u32, value: WasmValue) -> EmitResult {
            self.record(Emitted::SpillConstant(index, value))
        }

        fn fill(&mut self, dst: AsmReg, index: u32, _ty: ValueType) -> EmitResult {
            self.record(Emitted::Fill(dst, index))
        }

        fn move_stack_value(&mut self, dst_index: u32, src_index: u32, _ty: ValueType) -> EmitResult {
            self.record(Emitted::MoveStack(dst_index, src_index))
        }

        fn load(&mut self, dst: AsmReg, base: AsmReg, offset: u32, _ty: ValueType) -> EmitResult {
            self.record(Emitted::Load(dst, base, offset))
        }

        fn store(&mut self, base: AsmReg, offset: u32, src: AsmReg, _ty: ValueType) -> EmitResult {
            self.record(Emitted::Store(base, offset, src))
        }

        fn emit_i32_binop(
            &mut self,
            op: I32BinOp,
            dst: AsmReg,
            lhs: AsmReg,
            rhs: AsmReg,
        ) -> EmitResult {
            self.record(Emitted::I32Op(op, dst, lhs, rhs))
        }

        fn emit_f32_binop(
            &mut self,
            op: F32BinOp,
            dst: AsmReg,
            lhs: AsmReg,
            rhs: AsmReg,
        ) -> EmitResult {
            self.record(Emitted::F32Op(op, dst, lhs, rhs))
        }

        fn finish(mut self) -> EmitResult<Vec<u8>> {
            for index in 0..self.bound.len() {
                if !self.bound[index] {
                    self.bind(Label(index as u32))?;
                }
            }
            Ok(vec![0x90; self.log.borrow().len()])
        }
    }

    /// Registers and frame slots holding symbolic values.
    #[derive(Debug, Default, Clone)]
    pub struct Machine {
        pub regs: HashMap<AsmReg, i64>,
        pub slots: HashMap<u32, i64>,
    }

    impl Machine {
        /// Replay straight-line data movement. Control flow is ignored.
        pub fn run(&mut self, ops: &[Emitted]) {
            for op in ops {
                match *op {
                    Emitted::LoadConstant(dst, value) => {
                        self.regs.insert(dst, value.bits() as i32 as i64);
                    }
                    Emitted::Move(dst, src) => {
                        let value = self.regs[&src];
                        self.regs.insert(dst, value);
                    }
                    Emitted::Spill(index, src) => {
                        let value = self.regs[&src];
                        self.slots.insert(index, value);
                    }
                    Emitted::SpillConstant(index, value) => {
                        self.slots.insert(index, value.bits() as i32 as i64);
                    }
                    Emitted::Fill(dst, index) => {
                        let value = self.slots[&index];
                        self.regs.insert(dst, value);
                    }
                    Emitted::MoveStack(dst, src) => {
                        let value = self.slots[&src];
                        self.slots.insert(dst, value);
                    }
                    _ => {}
                }
            }
        }
    }
}
