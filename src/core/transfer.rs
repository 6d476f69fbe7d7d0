//! Moving values from one cache state shape into another.
//!
//! A merge turns the current state into the canonical state of a join point.
//! Transfers are collected first and emitted in three phases:
//!
//! 1. stores into spill slots, while every source register still holds its
//!    original value,
//! 2. register to register moves, scheduled as a parallel copy with cycles
//!    broken through the scratch register of the class,
//! 3. fills from spill slots and constant loads into target registers.
//!
//! Phase 3 only reads memory and immediates, so it cannot observe registers
//! overwritten in phase 2.

use super::cache_state::{CacheState, Location};
use super::emitter::CodeEmitter;
use super::error::EmitResult;
use super::register_file::AsmReg;
use super::types::{ValueType, WasmValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreSource {
    Register(AsmReg),
    Constant(i32),
    Stack(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackStore {
    dst_index: u32,
    src: StoreSource,
    ty: ValueType,
}

/// Register to register copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegMove {
    pub dst: AsmReg,
    pub src: AsmReg,
    pub ty: ValueType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegLoad {
    Constant(i32),
    Stack(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegisterLoad {
    dst: AsmReg,
    src: RegLoad,
    ty: ValueType,
}

/// Pending transfers between two cache states.
#[derive(Debug, Default)]
pub struct StackTransferRecipe {
    stores: Vec<StackStore>,
    moves: Vec<RegMove>,
    loads: Vec<RegisterLoad>,
}

impl StackTransferRecipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what it takes to move slot `src_index` of `source` into slot
    /// `dst_index` of `target`.
    pub fn transfer_stack_slot(
        &mut self,
        target: &CacheState,
        dst_index: u32,
        source: &CacheState,
        src_index: u32,
    ) {
        let dst = target.slot(dst_index);
        let src = source.slot(src_index);
        debug_assert_eq!(dst.ty(), src.ty());
        let ty = dst.ty();

        match (dst.loc(), src.loc()) {
            (Location::Stack, Location::Stack) => {
                if dst_index != src_index {
                    self.stores.push(StackStore {
                        dst_index,
                        src: StoreSource::Stack(src_index),
                        ty,
                    });
                }
            }
            (Location::Stack, Location::Register(reg)) => self.stores.push(StackStore {
                dst_index,
                src: StoreSource::Register(reg),
                ty,
            }),
            (Location::Stack, Location::Constant(value)) => self.stores.push(StackStore {
                dst_index,
                src: StoreSource::Constant(value),
                ty,
            }),
            (Location::Register(dst_reg), Location::Register(src_reg)) => {
                if dst_reg != src_reg {
                    self.moves.push(RegMove {
                        dst: dst_reg,
                        src: src_reg,
                        ty,
                    });
                }
            }
            (Location::Register(dst_reg), Location::Stack) => self.loads.push(RegisterLoad {
                dst: dst_reg,
                src: RegLoad::Stack(src_index),
                ty,
            }),
            (Location::Register(dst_reg), Location::Constant(value)) => {
                self.loads.push(RegisterLoad {
                    dst: dst_reg,
                    src: RegLoad::Constant(value),
                    ty,
                })
            }
            // Constants only survive a merge where every path carries the
            // same value, so nothing needs to move.
            (Location::Constant(expected), src_loc) => {
                debug_assert!(
                    !matches!(src_loc, Location::Constant(v) if v != expected),
                    "diverging constants at slot {dst_index}"
                );
            }
        }
    }

    /// Number of values written to spill slots by this recipe.
    pub fn spill_count(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty() && self.moves.is_empty() && self.loads.is_empty()
    }

    pub fn execute<E: CodeEmitter>(self, emitter: &mut E) -> EmitResult {
        for store in &self.stores {
            match store.src {
                StoreSource::Register(reg) => emitter.spill(store.dst_index, reg, store.ty)?,
                StoreSource::Constant(value) => {
                    emitter.spill_constant(store.dst_index, WasmValue::I32(value))?
                }
                StoreSource::Stack(src_index) => {
                    emitter.move_stack_value(store.dst_index, src_index, store.ty)?
                }
            }
        }

        let scheduled =
            schedule_parallel_moves(&self.moves, |m| emitter.scratch_register(m.dst.class()));
        for mv in scheduled {
            emitter.move_register(mv.dst, mv.src, mv.ty)?;
        }

        for load in &self.loads {
            match load.src {
                RegLoad::Constant(value) => {
                    emitter.load_constant(load.dst, WasmValue::I32(value))?
                }
                RegLoad::Stack(src_index) => emitter.fill(load.dst, src_index, load.ty)?,
            }
        }
        Ok(())
    }
}

/// Order a parallel copy into sequential moves.
///
/// A move may be emitted once no other pending move still reads its
/// destination. When every pending destination is still read, the remaining
/// moves form cycles; one destination is saved into the scratch register
/// returned by `scratch` and its readers are redirected there.
pub fn schedule_parallel_moves(
    moves: &[RegMove],
    mut scratch: impl FnMut(&RegMove) -> AsmReg,
) -> Vec<RegMove> {
    let mut pending: Vec<RegMove> = Vec::with_capacity(moves.len());
    for mv in moves {
        if mv.dst == mv.src || pending.contains(mv) {
            continue;
        }
        debug_assert!(
            pending.iter().all(|p| p.dst != mv.dst),
            "{} written twice in one parallel copy",
            mv.dst
        );
        pending.push(*mv);
    }

    let mut out = Vec::with_capacity(pending.len() + 1);
    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|mv| !pending.iter().any(|other| other.src == mv.dst));
        match ready {
            Some(index) => out.push(pending.remove(index)),
            None => {
                let blocked = pending[0];
                let temp = scratch(&blocked);
                out.push(RegMove {
                    dst: temp,
                    src: blocked.dst,
                    ty: blocked.ty,
                });
                for mv in pending.iter_mut() {
                    if mv.src == blocked.dst {
                        mv.src = temp;
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache_state::VarState;
    use crate::core::emitter::CodeEmitter;
    use crate::core::test_utils::test::{Emitted, Machine, RecordingEmitter, GP_SCRATCH};

    const I32: ValueType = ValueType::I32;

    fn mv(dst: u8, src: u8) -> RegMove {
        RegMove {
            dst: AsmReg::gp(dst),
            src: AsmReg::gp(src),
            ty: I32,
        }
    }

    fn apply(moves: &[RegMove], regs: &mut [i64; 16]) {
        for m in moves {
            regs[m.dst.id as usize] = regs[m.src.id as usize];
        }
    }

    #[test]
    fn test_chain_is_ordered_back_to_front() {
        let scheduled = schedule_parallel_moves(&[mv(1, 0), mv(2, 1)], |_| GP_SCRATCH);
        assert_eq!(scheduled, vec![mv(2, 1), mv(1, 0)]);
    }

    #[test]
    fn test_swap_uses_scratch_once() {
        let scheduled = schedule_parallel_moves(&[mv(0, 1), mv(1, 0)], |_| GP_SCRATCH);
        assert_eq!(scheduled.len(), 3);

        let mut regs = [0i64; 16];
        regs[0] = 10;
        regs[1] = 20;
        apply(&scheduled, &mut regs);
        assert_eq!((regs[0], regs[1]), (20, 10));
    }

    #[test]
    fn test_rotation_with_fan_out() {
        // 0 <- 1, 1 <- 2, 2 <- 0, 3 <- 0
        let moves = [mv(0, 1), mv(1, 2), mv(2, 0), mv(3, 0)];
        let scheduled = schedule_parallel_moves(&moves, |_| GP_SCRATCH);

        let mut regs = [0i64; 16];
        for (i, reg) in regs.iter_mut().enumerate().take(4) {
            *reg = 100 + i as i64;
        }
        apply(&scheduled, &mut regs);
        assert_eq!(&regs[..4], &[101, 102, 100, 100]);
    }

    #[test]
    fn test_self_moves_and_duplicates_vanish() {
        let scheduled = schedule_parallel_moves(&[mv(2, 2), mv(1, 0), mv(1, 0)], |_| GP_SCRATCH);
        assert_eq!(scheduled, vec![mv(1, 0)]);
    }

    fn state(slots: &[VarState]) -> CacheState {
        let regs = RecordingEmitter::new().cache_registers();
        let mut state = CacheState::new(regs);
        for slot in slots {
            match slot.loc() {
                Location::Register(reg) => state.push_register(slot.ty(), reg),
                Location::Constant(value) => state.push_constant(value),
                Location::Stack => state.push_stack(slot.ty()),
            }
        }
        state
    }

    #[test]
    fn test_store_before_register_reuse() {
        // Target wants slot 0 spilled and slot 1 in the register slot 0 used.
        let source = state(&[
            VarState::register(I32, AsmReg::gp(0)),
            VarState::register(I32, AsmReg::gp(1)),
        ]);
        let target = state(&[
            VarState::stack(I32),
            VarState::register(I32, AsmReg::gp(0)),
        ]);

        let mut recipe = StackTransferRecipe::new();
        recipe.transfer_stack_slot(&target, 0, &source, 0);
        recipe.transfer_stack_slot(&target, 1, &source, 1);
        assert_eq!(recipe.spill_count(), 1);

        let mut emitter = RecordingEmitter::new();
        let log = emitter.log();
        recipe.execute(&mut emitter).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                Emitted::Spill(0, AsmReg::gp(0)),
                Emitted::Move(AsmReg::gp(0), AsmReg::gp(1)),
            ]
        );

        let mut machine = Machine::default();
        machine.regs.insert(AsmReg::gp(0), 7);
        machine.regs.insert(AsmReg::gp(1), 9);
        machine.run(&log.borrow());
        assert_eq!(machine.slots[&0], 7);
        assert_eq!(machine.regs[&AsmReg::gp(0)], 9);
    }

    #[test]
    fn test_merge_value_moves_down_through_stack() {
        let source = state(&[
            VarState::constant(1),
            VarState::stack(I32),
            VarState::stack(I32),
        ]);
        let target = state(&[VarState::register(I32, AsmReg::gp(2)), VarState::stack(I32)]);

        let mut recipe = StackTransferRecipe::new();
        recipe.transfer_stack_slot(&target, 0, &source, 0);
        recipe.transfer_stack_slot(&target, 1, &source, 2);

        let mut emitter = RecordingEmitter::new();
        let log = emitter.log();
        recipe.execute(&mut emitter).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                Emitted::MoveStack(1, 2),
                Emitted::LoadConstant(AsmReg::gp(2), WasmValue::I32(1)),
            ]
        );
    }

    #[test]
    fn test_identical_shapes_emit_nothing() {
        let shape = [
            VarState::register(I32, AsmReg::gp(1)),
            VarState::constant(4),
            VarState::stack(I32),
        ];
        let source = state(&shape);
        let target = state(&shape);
        let mut recipe = StackTransferRecipe::new();
        for i in 0..3 {
            recipe.transfer_stack_slot(&target, i, &source, i);
        }
        assert!(recipe.is_empty());
    }
}
