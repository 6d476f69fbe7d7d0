//! The cache state bound to a code emitter.
//!
//! `BaselineAssembler` is the one mutable context a function compilation
//! threads through every opcode handler. It owns the current cache state, the
//! emitter, and the types of the function's locals, and implements the
//! operations that need both: register allocation with spilling, popping into
//! registers, spilling everything at loop headers, and merging into the
//! canonical state of a control-flow frame.

use super::cache_state::{CacheState, Location};
use super::emitter::CodeEmitter;
use super::error::{EmitResult, EncodingError};
use super::register_file::{AsmReg, RegBitSet, RegClass};
use super::transfer::StackTransferRecipe;
use super::types::{ValueType, WasmValue};

pub struct BaselineAssembler<E> {
    emitter: E,
    cache_state: CacheState,
    local_types: Vec<ValueType>,
    spill_count: usize,
}

impl<E: CodeEmitter> BaselineAssembler<E> {
    pub fn new(emitter: E) -> Self {
        let cache_state = CacheState::new(emitter.cache_registers());
        Self {
            emitter,
            cache_state,
            local_types: Vec::new(),
            spill_count: 0,
        }
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut E {
        &mut self.emitter
    }

    pub fn into_emitter(self) -> E {
        self.emitter
    }

    pub fn cache_state(&self) -> &CacheState {
        &self.cache_state
    }

    pub fn cache_state_mut(&mut self) -> &mut CacheState {
        &mut self.cache_state
    }

    /// Declare the types of the function's locals, parameters first.
    pub fn set_local_types(&mut self, types: Vec<ValueType>) {
        self.local_types = types;
    }

    /// Parameters plus declared locals; the lowest slots of the cache state.
    pub fn num_locals(&self) -> u32 {
        self.local_types.len() as u32
    }

    /// Type of local `index`. Local indices are checked by the decoder
    /// before any handler sees them.
    pub fn local_type(&self, index: u32) -> ValueType {
        debug_assert!(
            index < self.num_locals(),
            "local {index} out of range, the decoder validates local indices"
        );
        self.local_types[index as usize]
    }

    /// Values written to spill slots so far.
    pub fn spill_count(&self) -> usize {
        self.spill_count
    }

    /// A register of `class` no live slot references, spilling one if the
    /// class is exhausted. Never returns a register in `pinned`.
    pub fn get_unused_register(&mut self, class: RegClass, pinned: RegBitSet) -> EmitResult<AsmReg> {
        if let Some(reg) = self.cache_state.unused_register(class, &pinned) {
            return Ok(reg);
        }
        self.spill_one_register(class, pinned)
    }

    fn spill_one_register(&mut self, class: RegClass, pinned: RegBitSet) -> EmitResult<AsmReg> {
        let reg = self
            .cache_state
            .next_spill_candidate(class, &pinned)
            .ok_or(EncodingError::RegistersExhausted)?;
        self.spill_register(reg)?;
        Ok(reg)
    }

    /// Write every slot held in `reg` to its spill slot.
    pub fn spill_register(&mut self, reg: AsmReg) -> EmitResult {
        let indices: Vec<u32> = self.cache_state.slots_in_register(reg).collect();
        for index in indices {
            let ty = self.cache_state.slot(index).ty();
            self.emitter.spill(index, reg, ty)?;
            self.cache_state.make_stack(index);
            self.spill_count += 1;
        }
        debug_assert!(!self.cache_state.is_used(reg));
        Ok(())
    }

    /// Pop the top slot into a register of `class`.
    pub fn pop_to_register(&mut self, class: RegClass, pinned: RegBitSet) -> EmitResult<AsmReg> {
        let slot = self
            .cache_state
            .pop_slot()
            .ok_or(EncodingError::StackUnderflow)?;
        let index = self.cache_state.stack_height();
        match slot.loc() {
            Location::Register(reg) => {
                self.cache_state.dec_used(reg);
                Ok(reg)
            }
            Location::Constant(value) => {
                let reg = self.get_unused_register(class, pinned)?;
                self.emitter.load_constant(reg, WasmValue::I32(value))?;
                Ok(reg)
            }
            Location::Stack => {
                let reg = self.get_unused_register(class, pinned)?;
                self.emitter.fill(reg, index, slot.ty())?;
                Ok(reg)
            }
        }
    }

    pub fn push_register(&mut self, ty: ValueType, reg: AsmReg) {
        self.cache_state.push_register(ty, reg);
    }

    /// Release the top slot without materializing it.
    pub fn drop_top(&mut self) {
        self.cache_state.drop_top();
    }

    /// Spill the slots in `range` that are not already in memory.
    fn spill_slots(&mut self, range: std::ops::Range<u32>) -> EmitResult {
        for index in range {
            let slot = self.cache_state.slot(index);
            match slot.loc() {
                Location::Stack => continue,
                Location::Register(reg) => self.emitter.spill(index, reg, slot.ty())?,
                Location::Constant(value) => {
                    self.emitter.spill_constant(index, WasmValue::I32(value))?
                }
            }
            self.cache_state.make_stack(index);
            self.spill_count += 1;
        }
        Ok(())
    }

    pub fn spill_all(&mut self) -> EmitResult {
        self.spill_slots(0..self.cache_state.stack_height())
    }

    /// Turn the current state into `target`, which has exactly the same height.
    pub fn merge_full_stack_with(&mut self, target: &CacheState) -> EmitResult {
        debug_assert_eq!(self.cache_state.stack_height(), target.stack_height());
        let mut recipe = StackTransferRecipe::new();
        for index in 0..target.stack_height() {
            recipe.transfer_stack_slot(target, index, &self.cache_state, index);
        }
        self.execute(recipe)
    }

    /// Turn the current state into `target`: slots below the target's stack
    /// base keep their index, the top `arity` values move onto the target's
    /// merge values. Everything else on the current stack is left behind.
    pub fn merge_stack_with(&mut self, target: &CacheState, arity: u32) -> EmitResult {
        let target_base = target.stack_height() - arity;
        let stack_height = self.cache_state.stack_height();
        let stack_base = stack_height - arity;
        debug_assert!(target_base <= stack_base);

        let mut recipe = StackTransferRecipe::new();
        for index in 0..target_base {
            recipe.transfer_stack_slot(target, index, &self.cache_state, index);
        }
        for i in 0..arity {
            recipe.transfer_stack_slot(target, target_base + i, &self.cache_state, stack_base + i);
        }
        self.execute(recipe)
    }

    fn execute(&mut self, recipe: StackTransferRecipe) -> EmitResult {
        self.spill_count += recipe.spill_count();
        recipe.execute(&mut self.emitter)
    }

    /// Fill `reg` from the spill slot of slot `index`.
    pub fn fill(&mut self, reg: AsmReg, index: u32, ty: ValueType) -> EmitResult {
        self.emitter.fill(reg, index, ty)
    }
}
