// The baseline compiler proper. BaselineCompiler is the visitor the decoder drives: one
// hook call per reachable instruction, each dispatched through a single match onto the
// cache state and the code emitter. The control stack mirrors the nesting of
// function/block/loop constructs; every frame owns the cache state that paths arriving at
// its label must produce. The first forward branch to a block derives that state from
// its own (init_merge), later branches and fall-throughs are reconciled with it through a
// transfer recipe. Loops spill everything and bind their header on entry so back-edges
// only ever consume the header state. Anything outside the supported operator set, as
// well as an operand stack deeper than the configured limit, declares the function
// unsupported: the compiler then stops decoding and binds every outstanding label.

//! Compilation driver and opcode dispatcher.

use super::control::{Control, ControlKind};
use super::CompileOptions;
use crate::core::assembler::BaselineAssembler;
use crate::core::cache_state::{Location, VarState};
use crate::core::emitter::{CodeEmitter, F32BinOp, I32BinOp};
use crate::core::error::{CompileError, CompileResult, EmitResult};
use crate::core::linkage::{CallingConvention, ParamLocation};
use crate::core::register_file::{AsmReg, RegBitSet, RegClass};
use crate::core::types::{FuncSig, ValueType, WasmValue};
use crate::wasm::decoder::FunctionBodyVisitor;
use crate::wasm::instr::{BinaryOp, Instr};
use crate::wasm::module::{ModuleEnv, GLOBALS_START_OFFSET};
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use std::ops::ControlFlow;

/// What a finished compilation hands back to the driver.
pub struct CompilerOutput<E> {
    pub emitter: E,
    /// Set when the function was declared unsupported.
    pub unsupported: Option<String>,
    /// Whether the final `end` was processed.
    pub finished: bool,
    pub frame_slot_count: u32,
    pub instructions: usize,
    pub spills: usize,
}

pub struct BaselineCompiler<'a, E, C> {
    asm: BaselineAssembler<E>,
    conv: &'a C,
    env: &'a ModuleEnv,
    sig: &'a FuncSig,
    options: &'a CompileOptions,
    control: BumpVec<'a, Control>,
    ok: bool,
    unsupported: Option<String>,
    finished: bool,
    frame_slot_count: u32,
    instructions: usize,
}

impl<'a, E: CodeEmitter, C: CallingConvention> BaselineCompiler<'a, E, C> {
    pub fn new(
        emitter: E,
        conv: &'a C,
        env: &'a ModuleEnv,
        sig: &'a FuncSig,
        options: &'a CompileOptions,
        arena: &'a Bump,
    ) -> Self {
        Self {
            asm: BaselineAssembler::new(emitter),
            conv,
            env,
            sig,
            options,
            control: BumpVec::new_in(arena),
            ok: true,
            unsupported: None,
            finished: false,
            frame_slot_count: 0,
            instructions: 0,
        }
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn into_output(self) -> CompilerOutput<E> {
        let spills = self.asm.spill_count();
        CompilerOutput {
            emitter: self.asm.into_emitter(),
            unsupported: self.unsupported,
            finished: self.finished,
            frame_slot_count: self.frame_slot_count,
            instructions: self.instructions,
            spills,
        }
    }

    /// Give up on this function. Labels still unbound are bound at the
    /// current position so the emitter stays consistent.
    fn declare_unsupported(&mut self, reason: String) -> ControlFlow<()> {
        if !self.ok {
            return ControlFlow::Break(());
        }
        self.ok = false;
        log::debug!("Abort compilation of function with signature {}: {reason}", self.sig);
        self.bind_unbound_labels();
        self.unsupported = Some(reason);
        ControlFlow::Break(())
    }

    fn bind_unbound_labels(&mut self) {
        for control in self.control.iter() {
            if self.asm.emitter().is_bound(control.label) {
                continue;
            }
            if let Err(err) = self.asm.emitter_mut().bind(control.label) {
                log::debug!("Failed to bind label {:?}: {err}", control.label);
            }
        }
    }

    /// Fold a handler result into the decoder protocol.
    fn check(&mut self, result: CompileResult<()>) -> ControlFlow<()> {
        match result {
            Ok(()) => {
                debug_assert!(self.asm.cache_state().is_consistent());
                ControlFlow::Continue(())
            }
            Err(CompileError::Unsupported(reason)) => self.declare_unsupported(reason),
            Err(CompileError::Encoding(err)) => {
                debug_assert!(false, "emitter failure: {err}");
                self.declare_unsupported(format!("internal error: {err}"))
            }
        }
    }

    fn num_locals(&self) -> u32 {
        self.asm.num_locals()
    }

    fn reg_class(ty: ValueType) -> CompileResult<RegClass> {
        ty.reg_class()
            .ok_or_else(|| CompileError::unsupported(format!("{ty} value")))
    }

    fn check_stack_size(&self) -> CompileResult<()> {
        let height = self.asm.cache_state().stack_height() - self.num_locals();
        if height > self.options.max_value_stack_height {
            return Err(CompileError::unsupported("value stack too large"));
        }
        Ok(())
    }

    fn push_register(&mut self, ty: ValueType, reg: AsmReg) -> CompileResult<()> {
        self.asm.push_register(ty, reg);
        self.check_stack_size()
    }

    fn push_constant(&mut self, value: i32) -> CompileResult<()> {
        self.asm.cache_state_mut().push_constant(value);
        self.check_stack_size()
    }

    fn trace_cache_state(&self, instr: &Instr) {
        if !self.options.trace_cache_state || !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let mut states: Vec<String> = self
            .control
            .iter()
            .map(|control| control.to_string())
            .collect();
        states.push(self.asm.cache_state().to_string());
        log::trace!("{:<12} {}", instr.name(), states.join("; "));
    }

    // Prologue

    fn prologue(&mut self, locals: &[ValueType]) -> CompileResult<()> {
        for &ty in locals {
            match ty {
                ValueType::I32 | ValueType::F32 => {}
                ValueType::I64 => return Err(CompileError::unsupported("i64 param/local")),
                ValueType::F64 => return Err(CompileError::unsupported("f64 param/local")),
                _ => return Err(CompileError::unsupported("exotic param/local")),
            }
        }
        self.asm.set_local_types(locals.to_vec());

        self.frame_slot_count = self.num_locals() + self.options.max_value_stack_height;
        self.asm.emitter_mut().enter_frame(self.frame_slot_count)?;
        let context = self.conv.context_register();
        self.asm.emitter_mut().spill_context(context)?;

        self.bind_params()?;
        self.init_locals()
    }

    fn bind_params(&mut self) -> CompileResult<()> {
        let locations: Vec<ParamLocation> = (0..self.sig.params.len() as u32)
            .map(|index| self.conv.param_location(index))
            .collect();

        for (index, &location) in locations.iter().enumerate() {
            let ty = self.sig.params[index];
            let class = Self::reg_class(ty)?;
            // Registers of parameters not yet bound still hold live arguments.
            let mut pinned = RegBitSet::new();
            for later in &locations[index + 1..] {
                if let ParamLocation::Register(reg) = *later {
                    pinned.set(reg);
                }
            }

            let state = self.asm.cache_state();
            let adopt = matches!(location, ParamLocation::Register(reg)
                if state.cache_regs().contains(reg) && !state.is_used(reg));
            let reg = match location {
                ParamLocation::Register(reg) if adopt => reg,
                ParamLocation::Register(src) => {
                    let dst = self.asm.get_unused_register(class, pinned)?;
                    self.asm.emitter_mut().move_register(dst, src, ty)?;
                    dst
                }
                ParamLocation::CallerFrameSlot(slot) => {
                    let dst = self.asm.get_unused_register(class, pinned)?;
                    self.asm.emitter_mut().load_caller_frame_slot(dst, slot, ty)?;
                    dst
                }
            };
            self.asm.push_register(ty, reg);
        }
        Ok(())
    }

    fn init_locals(&mut self) -> CompileResult<()> {
        let mut f32_zero = None;
        for index in self.sig.params.len() as u32..self.num_locals() {
            match self.asm.local_type(index) {
                ValueType::I32 => self.asm.cache_state_mut().push_constant(0),
                ValueType::F32 => {
                    let reg = match f32_zero {
                        Some(reg) => reg,
                        None => {
                            let reg = self.asm.get_unused_register(RegClass::Fp, RegBitSet::new())?;
                            self.asm
                                .emitter_mut()
                                .load_constant(reg, WasmValue::F32(0.0))?;
                            f32_zero = Some(reg);
                            reg
                        }
                    };
                    self.asm.push_register(ValueType::F32, reg);
                }
                ty => return Err(CompileError::unsupported(format!("{ty} param/local"))),
            }
        }
        Ok(())
    }

    fn enter_function_body(&mut self) -> CompileResult<()> {
        if self.sig.results.len() > 1 {
            return Err(CompileError::unsupported("multi-return"));
        }
        for &ty in &self.sig.results {
            Self::reg_class(ty)?;
        }
        self.push_control(ControlKind::Function, self.sig.results.len() as u32);
        self.check_stack_size()
    }

    // Control flow

    fn push_control(&mut self, kind: ControlKind, arity: u32) {
        let label = self.asm.emitter_mut().new_label();
        let mut label_state = self.asm.cache_state().empty_like();
        label_state.stack_base = self.asm.cache_state().stack_height();
        self.control
            .push(Control::new(kind, label, label_state, arity));
    }

    fn enter_loop(&mut self) -> CompileResult<()> {
        self.asm.spill_all()?;
        let label = self.asm.emitter_mut().new_label();
        self.asm.emitter_mut().bind(label)?;

        let mut header = self.asm.cache_state().empty_like();
        header.split(self.asm.cache_state());
        header.stack_base = header.stack_height();
        let mut control = Control::new(ControlKind::Loop, label, header, 0);
        control.mark_reached();
        self.control.push(control);
        Ok(())
    }

    fn control_index(&self, depth: u32) -> usize {
        self.control.len() - 1 - depth as usize
    }

    fn br(&mut self, depth: u32) -> CompileResult<()> {
        let index = self.control_index(depth);
        let num_locals = self.num_locals();
        let target = &mut self.control[index];
        if !target.is_reached() {
            target
                .label_state
                .init_merge(self.asm.cache_state(), num_locals, target.arity);
        }
        self.asm.merge_stack_with(&target.label_state, target.arity)?;
        self.asm.emitter_mut().jmp(target.label)?;
        target.mark_reached();
        Ok(())
    }

    fn br_if(&mut self, depth: u32) -> CompileResult<()> {
        let cond = self.asm.pop_to_register(RegClass::Gp, RegBitSet::new())?;
        let skip = self.asm.emitter_mut().new_label();
        self.asm.emitter_mut().jump_if_zero(cond, skip)?;
        self.br(depth)?;
        self.asm.emitter_mut().bind(skip)?;
        Ok(())
    }

    fn br_table(&mut self, targets: &[u32], default: u32) -> CompileResult<()> {
        let key = self.asm.pop_to_register(RegClass::Gp, RegBitSet::new())?;
        for (entry, &depth) in targets.iter().enumerate() {
            let next = self.asm.emitter_mut().new_label();
            self.asm
                .emitter_mut()
                .jump_if_not_equal(key, entry as i32, next)?;
            self.br(depth)?;
            self.asm.emitter_mut().bind(next)?;
        }
        self.br(default)
    }

    /// Move the current state into the label state of the top frame when
    /// control falls off its end.
    fn fall_through(&mut self) -> CompileResult<()> {
        let Some(top) = self.control.last_mut() else {
            return Ok(());
        };
        if top.is_reached() {
            self.asm.merge_full_stack_with(&top.label_state)?;
        } else {
            top.label_state.split(self.asm.cache_state());
        }
        top.mark_reached();
        Ok(())
    }

    fn end(&mut self, fallthrough: bool) -> CompileResult<()> {
        let kind = match self.control.last() {
            Some(control) => control.kind,
            None => return Err(CompileError::unsupported("internal error: no open frame")),
        };
        if fallthrough && kind != ControlKind::Loop {
            self.fall_through()?;
        }
        let Some(mut control) = self.control.pop() else {
            return Ok(());
        };
        if !self.asm.emitter().is_bound(control.label) {
            self.asm.emitter_mut().bind(control.label)?;
        }
        if kind != ControlKind::Loop && control.is_reached() {
            self.asm.cache_state_mut().steal(&mut control.label_state);
        }
        if kind == ControlKind::Function && control.is_reached() {
            self.emit_return()?;
        }
        Ok(())
    }

    fn emit_return(&mut self) -> CompileResult<()> {
        match self.sig.results.as_slice() {
            [] => {}
            &[ty] => {
                let reg = self.asm.pop_to_register(Self::reg_class(ty)?, RegBitSet::new())?;
                self.asm.emitter_mut().move_to_return_register(reg, ty)?;
            }
            _ => return Err(CompileError::unsupported("multi-return")),
        }
        self.asm.emitter_mut().leave_frame_and_return()?;
        Ok(())
    }

    // Locals and globals

    fn local_get(&mut self, index: u32) -> CompileResult<()> {
        let slot = self.asm.cache_state().slot(index);
        match slot.loc() {
            Location::Register(reg) => self.push_register(slot.ty(), reg),
            Location::Constant(value) => self.push_constant(value),
            Location::Stack => {
                let class = Self::reg_class(slot.ty())?;
                let reg = self.asm.get_unused_register(class, RegBitSet::new())?;
                self.asm.fill(reg, index, slot.ty())?;
                self.push_register(slot.ty(), reg)
            }
        }
    }

    fn local_set(&mut self, index: u32, is_tee: bool) -> CompileResult<()> {
        let state = self.asm.cache_state();
        let top = state.stack_height() - 1;
        let source = state.slot(top);
        match source.loc() {
            Location::Register(_) | Location::Constant(_) => {
                self.asm.cache_state_mut().set_slot(index, source);
            }
            Location::Stack => {
                let ty = source.ty();
                let reusable = state
                    .slot(index)
                    .reg()
                    .filter(|&reg| state.use_count(reg) == 1);
                let reg = match reusable {
                    Some(reg) => reg,
                    None => self
                        .asm
                        .get_unused_register(Self::reg_class(ty)?, RegBitSet::new())?,
                };
                self.asm.fill(reg, top, ty)?;
                let value = VarState::register(ty, reg);
                self.asm.cache_state_mut().set_slot(index, value);
                if is_tee {
                    self.asm.cache_state_mut().set_slot(top, value);
                }
            }
        }
        if !is_tee {
            self.asm.drop_top();
        }
        Ok(())
    }

    fn global_get(&mut self, index: u32) -> CompileResult<()> {
        let global = self
            .env
            .global(index)
            .copied()
            .ok_or_else(|| CompileError::unsupported(format!("unknown global {index}")))?;
        let class = Self::reg_class(global.ty)
            .map_err(|_| CompileError::unsupported(format!("{} global", global.ty)))?;

        let base = self.asm.get_unused_register(RegClass::Gp, RegBitSet::new())?;
        self.asm
            .emitter_mut()
            .load_from_context(base, GLOBALS_START_OFFSET)?;
        let dst = match class {
            RegClass::Gp => base,
            RegClass::Fp => self.asm.get_unused_register(RegClass::Fp, RegBitSet::new())?,
        };
        self.asm
            .emitter_mut()
            .load(dst, base, global.offset, global.ty)?;
        self.push_register(global.ty, dst)
    }

    fn global_set(&mut self, index: u32) -> CompileResult<()> {
        let global = self
            .env
            .global(index)
            .copied()
            .ok_or_else(|| CompileError::unsupported(format!("unknown global {index}")))?;
        let class = Self::reg_class(global.ty)
            .map_err(|_| CompileError::unsupported(format!("{} global", global.ty)))?;

        let value = self.asm.pop_to_register(class, RegBitSet::new())?;
        let base = self
            .asm
            .get_unused_register(RegClass::Gp, RegBitSet::from_regs(&[value]))?;
        self.asm
            .emitter_mut()
            .load_from_context(base, GLOBALS_START_OFFSET)?;
        self.asm
            .emitter_mut()
            .store(base, global.offset, value, global.ty)?;
        Ok(())
    }

    // Arithmetic

    fn binop(
        &mut self,
        ty: ValueType,
        emit: impl FnOnce(&mut E, AsmReg, AsmReg, AsmReg) -> EmitResult,
    ) -> CompileResult<()> {
        let class = Self::reg_class(ty)?;
        let rhs = self.asm.pop_to_register(class, RegBitSet::new())?;
        let lhs = self
            .asm
            .pop_to_register(class, RegBitSet::from_regs(&[rhs]))?;

        let lhs_free = self.asm.cache_state().use_count(lhs) == 0;
        let rhs_free = self.asm.cache_state().use_count(rhs) == 0;
        let dst = if lhs_free {
            lhs
        } else if rhs_free {
            rhs
        } else {
            self.asm
                .get_unused_register(class, RegBitSet::from_regs(&[lhs, rhs]))?
        };
        emit(self.asm.emitter_mut(), dst, lhs, rhs)?;
        self.push_register(ty, dst)
    }

    fn binary(&mut self, op: BinaryOp, ty: ValueType, instr: &Instr) -> CompileResult<()> {
        match ty {
            ValueType::I32 => {
                let op = match op {
                    BinaryOp::Add => I32BinOp::Add,
                    BinaryOp::Sub => I32BinOp::Sub,
                    BinaryOp::Mul => I32BinOp::Mul,
                    BinaryOp::And => I32BinOp::And,
                    BinaryOp::Or => I32BinOp::Or,
                    BinaryOp::Xor => I32BinOp::Xor,
                };
                self.binop(ty, |e, dst, lhs, rhs| e.emit_i32_binop(op, dst, lhs, rhs))
            }
            ValueType::F32 => {
                let op = match op {
                    BinaryOp::Add => F32BinOp::Add,
                    BinaryOp::Sub => F32BinOp::Sub,
                    BinaryOp::Mul => F32BinOp::Mul,
                    _ => return Err(CompileError::unsupported(instr.name())),
                };
                self.binop(ty, |e, dst, lhs, rhs| e.emit_f32_binop(op, dst, lhs, rhs))
            }
            _ => Err(CompileError::unsupported(instr.name())),
        }
    }

    fn dispatch(&mut self, instr: &Instr) -> CompileResult<()> {
        match instr {
            Instr::Nop => Ok(()),
            Instr::Block { result } => {
                self.push_control(ControlKind::Block, result.is_some() as u32);
                Ok(())
            }
            Instr::Loop { .. } => self.enter_loop(),
            Instr::End { fallthrough } => self.end(*fallthrough),
            Instr::Br { depth } => self.br(*depth),
            Instr::BrIf { depth } => self.br_if(*depth),
            Instr::BrTable { targets, default } => self.br_table(targets, *default),
            Instr::Return => self.emit_return(),
            Instr::Drop => {
                self.asm.drop_top();
                Ok(())
            }
            Instr::LocalGet { index } => self.local_get(*index),
            Instr::LocalSet { index } => self.local_set(*index, false),
            Instr::LocalTee { index } => self.local_set(*index, true),
            Instr::GlobalGet { index } => self.global_get(*index),
            Instr::GlobalSet { index } => self.global_set(*index),
            Instr::I32Const(value) => self.push_constant(*value),
            Instr::F32Const(value) => {
                let reg = self.asm.get_unused_register(RegClass::Fp, RegBitSet::new())?;
                self.asm
                    .emitter_mut()
                    .load_constant(reg, WasmValue::F32(*value))?;
                self.push_register(ValueType::F32, reg)
            }
            Instr::Binary { op, ty } => self.binary(*op, *ty, instr),
            Instr::Unreachable
            | Instr::If { .. }
            | Instr::Else
            | Instr::Select
            | Instr::I64Const(_)
            | Instr::F64Const(_)
            | Instr::Numeric { .. }
            | Instr::Unmodeled(_) => Err(CompileError::unsupported(instr.name())),
        }
    }
}

impl<E: CodeEmitter, C: CallingConvention> FunctionBodyVisitor for BaselineCompiler<'_, E, C> {
    fn start_function(&mut self, locals: &[ValueType]) -> ControlFlow<()> {
        let result = self.prologue(locals);
        self.check(result)
    }

    fn start_function_body(&mut self) -> ControlFlow<()> {
        let result = self.enter_function_body();
        self.check(result)
    }

    fn visit(&mut self, instr: &Instr) -> ControlFlow<()> {
        if !self.ok {
            return ControlFlow::Break(());
        }
        self.trace_cache_state(instr);
        self.instructions += 1;
        let result = self.dispatch(instr);
        self.check(result)
    }

    fn finish_function(&mut self) {
        debug_assert!(self.control.is_empty());
        self.finished = self.ok;
    }

    fn on_first_error(&mut self) {
        self.ok = false;
        self.bind_unbound_labels();
    }
}
