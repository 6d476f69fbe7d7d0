// The location cache state records, at the current point of the linear walk over a
// function body, where each abstract value lives: the locals first, then the operand
// stack. Every slot is a register, an i32 literal that has not been materialized yet, or
// its designated spill slot in the frame. Register use counts are kept in a RegisterFile
// so a register shared by several slots (local.get of a register local) is only released
// once the last reference goes away. Control-flow frames keep their own CacheState
// instances; init_merge derives the canonical shape of a join point from the first state
// that reaches it.

//! Location cache state.

use super::register_file::{AsmReg, RegBitSet, RegClass, RegisterFile};
use super::types::ValueType;
use std::fmt;

/// Where a value slot currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(AsmReg),
    /// An i32 literal not yet materialized.
    Constant(i32),
    /// The slot's spill slot in the frame. Its address follows from the slot index.
    Stack,
}

/// One abstract value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarState {
    ty: ValueType,
    loc: Location,
}

impl VarState {
    pub fn register(ty: ValueType, reg: AsmReg) -> Self {
        Self {
            ty,
            loc: Location::Register(reg),
        }
    }

    pub fn constant(value: i32) -> Self {
        Self {
            ty: ValueType::I32,
            loc: Location::Constant(value),
        }
    }

    pub fn stack(ty: ValueType) -> Self {
        Self {
            ty,
            loc: Location::Stack,
        }
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn loc(&self) -> Location {
        self.loc
    }

    pub fn reg(&self) -> Option<AsmReg> {
        match self.loc {
            Location::Register(reg) => Some(reg),
            _ => None,
        }
    }

    pub fn is_reg(&self) -> bool {
        matches!(self.loc, Location::Register(_))
    }

    pub fn is_const(&self) -> bool {
        matches!(self.loc, Location::Constant(_))
    }

    pub fn is_stack(&self) -> bool {
        matches!(self.loc, Location::Stack)
    }

    fn reg_class(&self) -> RegClass {
        self.ty.reg_class().unwrap_or(RegClass::Gp)
    }
}

impl fmt::Display for VarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Location::Register(reg) => write!(f, "{}:{}", self.ty, reg),
            Location::Constant(_) => write!(f, "{}:c", self.ty),
            Location::Stack => write!(f, "{}:s", self.ty),
        }
    }
}

/// Value slots of one program point plus the register use counts they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheState {
    stack_state: Vec<VarState>,
    regs: RegisterFile,
    /// Height of the stack below which a control frame's values are not
    /// touched by the frame's body.
    pub stack_base: u32,
}

impl CacheState {
    pub fn new(cache_regs: RegBitSet) -> Self {
        Self {
            stack_state: Vec::new(),
            regs: RegisterFile::new(cache_regs),
            stack_base: 0,
        }
    }

    /// Empty state using the same cache registers as `self`.
    pub fn empty_like(&self) -> Self {
        Self::new(self.regs.cache_regs())
    }

    pub fn stack_height(&self) -> u32 {
        self.stack_state.len() as u32
    }

    pub fn slots(&self) -> &[VarState] {
        &self.stack_state
    }

    pub fn slot(&self, index: u32) -> VarState {
        self.stack_state[index as usize]
    }

    pub fn cache_regs(&self) -> RegBitSet {
        self.regs.cache_regs()
    }

    pub fn used_registers(&self) -> RegBitSet {
        self.regs.used()
    }

    pub fn is_used(&self, reg: AsmReg) -> bool {
        self.regs.is_used(reg)
    }

    pub fn use_count(&self, reg: AsmReg) -> u32 {
        self.regs.use_count(reg)
    }

    pub fn inc_used(&mut self, reg: AsmReg) {
        self.regs.inc_used(reg);
    }

    pub fn dec_used(&mut self, reg: AsmReg) {
        self.regs.dec_used(reg);
    }

    pub fn unused_register(&self, class: RegClass, pinned: &RegBitSet) -> Option<AsmReg> {
        self.regs.unused_register(class, pinned)
    }

    pub fn next_spill_candidate(&mut self, class: RegClass, pinned: &RegBitSet) -> Option<AsmReg> {
        self.regs.next_spill_candidate(class, pinned)
    }

    pub fn push_register(&mut self, ty: ValueType, reg: AsmReg) {
        self.regs.inc_used(reg);
        self.stack_state.push(VarState::register(ty, reg));
    }

    pub fn push_constant(&mut self, value: i32) {
        self.stack_state.push(VarState::constant(value));
    }

    pub fn push_stack(&mut self, ty: ValueType) {
        self.stack_state.push(VarState::stack(ty));
    }

    /// Remove the top slot without touching use counts. The caller takes
    /// over the slot's register reference.
    pub fn pop_slot(&mut self) -> Option<VarState> {
        self.stack_state.pop()
    }

    /// Remove the top slot and release its register reference.
    pub fn drop_top(&mut self) {
        if let Some(slot) = self.stack_state.pop() {
            if let Location::Register(reg) = slot.loc {
                self.regs.dec_used(reg);
            }
        }
    }

    /// Overwrite slot `index`, moving register references accordingly.
    pub fn set_slot(&mut self, index: u32, value: VarState) {
        let old = std::mem::replace(&mut self.stack_state[index as usize], value);
        if let Location::Register(reg) = value.loc {
            self.regs.inc_used(reg);
        }
        if let Location::Register(reg) = old.loc {
            self.regs.dec_used(reg);
        }
    }

    /// Mark slot `index` as living in its spill slot.
    pub fn make_stack(&mut self, index: u32) {
        let ty = self.stack_state[index as usize].ty;
        self.set_slot(index, VarState::stack(ty));
    }

    /// Indices of the slots referencing `reg`.
    pub fn slots_in_register(&self, reg: AsmReg) -> impl Iterator<Item = u32> + '_ {
        self.stack_state
            .iter()
            .enumerate()
            .filter(move |(_, slot)| slot.reg() == Some(reg))
            .map(|(index, _)| index as u32)
    }

    /// Derive the canonical state of a merge point from the first state
    /// reaching it.
    ///
    /// `self` must be empty with `stack_base` already set. The result holds
    /// `stack_base + arity` slots: the locals, the values between the locals
    /// and the base, and the top `arity` values of `source`.
    pub fn init_merge(&mut self, source: &CacheState, num_locals: u32, arity: u32) {
        debug_assert!(self.stack_state.is_empty());
        let stack_base = self.stack_base;
        let target_height = stack_base + arity;
        let source_height = source.stack_height();
        debug_assert!(source_height >= target_height);
        debug_assert!(num_locals <= stack_base);

        self.stack_state = (0..target_height)
            .map(|i| {
                let src_index = if i < stack_base {
                    i
                } else {
                    source_height - target_height + i
                };
                VarState::stack(source.slot(src_index).ty)
            })
            .collect();

        // Locals and merge values keep their source register when possible,
        // but never share one, and never stay constants.
        let merge_region = (0..num_locals).chain(stack_base..target_height);
        for i in merge_region {
            let src_index = if i < stack_base {
                i
            } else {
                source_height - target_height + i
            };
            let src = source.slot(src_index);
            let class = src.reg_class();
            let reg = match src.loc {
                Location::Stack => None,
                Location::Register(reg) if !self.is_used(reg) => Some(reg),
                Location::Register(_) | Location::Constant(_) => {
                    self.unused_register(class, &RegBitSet::new())
                }
            };
            if let Some(reg) = reg {
                self.inc_used(reg);
                self.stack_state[i as usize] = VarState::register(src.ty, reg);
            }
        }

        // The section in between is identical on all incoming paths up to
        // location. Constants survive, registers only if not taken above.
        for i in num_locals..stack_base {
            let src = source.slot(i);
            match src.loc {
                Location::Register(reg) if !self.is_used(reg) => {
                    self.inc_used(reg);
                    self.stack_state[i as usize] = VarState::register(src.ty, reg);
                }
                Location::Constant(_) => self.stack_state[i as usize] = src,
                Location::Register(_) | Location::Stack => {}
            }
        }
    }

    /// Become a copy of `source`.
    pub fn split(&mut self, source: &CacheState) {
        self.clone_from(source);
    }

    /// Take over `source`, leaving it empty.
    pub fn steal(&mut self, source: &mut CacheState) {
        let empty = source.empty_like();
        *self = std::mem::replace(source, empty);
    }

    /// Recompute use counts from the slots and compare with the table.
    pub fn is_consistent(&self) -> bool {
        let mut expected = RegisterFile::new(self.regs.cache_regs());
        for slot in &self.stack_state {
            if let Location::Register(reg) = slot.loc {
                if !self.regs.cache_regs().contains(reg) {
                    return false;
                }
                expected.inc_used(reg);
            }
        }
        self.regs.used() == expected.used()
            && self
                .regs
                .used()
                .iter()
                .all(|reg| self.regs.use_count(reg) == expected.use_count(reg))
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, slot) in self.stack_state.iter().enumerate() {
            if index > 0 {
                f.write_str("-")?;
            }
            write!(f, "{slot}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I32: ValueType = ValueType::I32;
    const F32: ValueType = ValueType::F32;

    fn regs() -> RegBitSet {
        RegBitSet::from_regs(&[
            AsmReg::gp(0),
            AsmReg::gp(1),
            AsmReg::gp(2),
            AsmReg::fp(0),
            AsmReg::fp(1),
        ])
    }

    #[test]
    fn test_push_and_drop_keep_counts() {
        let mut state = CacheState::new(regs());
        state.push_register(I32, AsmReg::gp(1));
        state.push_register(I32, AsmReg::gp(1));
        state.push_constant(7);
        assert_eq!(state.use_count(AsmReg::gp(1)), 2);

        state.drop_top();
        state.drop_top();
        assert_eq!(state.use_count(AsmReg::gp(1)), 1);
        assert!(state.is_consistent());
        assert_eq!(state.to_string(), "i32:gp1");
    }

    #[test]
    fn test_set_slot_moves_references() {
        let mut state = CacheState::new(regs());
        state.push_register(I32, AsmReg::gp(0));
        state.push_register(I32, AsmReg::gp(1));

        state.set_slot(0, VarState::register(I32, AsmReg::gp(1)));
        assert!(!state.is_used(AsmReg::gp(0)));
        assert_eq!(state.use_count(AsmReg::gp(1)), 2);

        state.make_stack(1);
        assert_eq!(state.use_count(AsmReg::gp(1)), 1);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_init_merge_never_shares_registers() {
        let mut source = CacheState::new(regs());
        // Two locals aliasing the same register, then a merge value in it too.
        source.push_register(I32, AsmReg::gp(0));
        source.push_register(I32, AsmReg::gp(0));
        source.push_register(I32, AsmReg::gp(0));

        let mut target = source.empty_like();
        target.stack_base = 2;
        target.init_merge(&source, 2, 1);

        let assigned: Vec<_> = target.slots().iter().map(|s| s.reg()).collect();
        assert_eq!(
            assigned,
            vec![Some(AsmReg::gp(0)), Some(AsmReg::gp(1)), Some(AsmReg::gp(2))]
        );
        assert!(target.is_consistent());
    }

    #[test]
    fn test_init_merge_materializes_merge_constants() {
        let mut source = CacheState::new(regs());
        source.push_constant(0); // local
        source.push_constant(5); // in between
        source.push_register(F32, AsmReg::fp(1));
        source.push_constant(9); // merge value

        let mut target = source.empty_like();
        target.stack_base = 2;
        target.init_merge(&source, 1, 1);

        assert_eq!(target.stack_height(), 3);
        assert!(target.slot(0).is_reg());
        assert_eq!(target.slot(1).loc(), Location::Constant(5));
        assert!(target.slot(2).is_reg());
        // The f32 value below the merge values is dropped from the shape.
        assert!(target.slots().iter().all(|s| s.ty() == I32));
    }

    #[test]
    fn test_init_merge_spills_when_registers_run_out() {
        let mut source = CacheState::new(RegBitSet::from_regs(&[AsmReg::gp(0)]));
        source.push_constant(1);
        source.push_constant(2);

        let mut target = source.empty_like();
        target.stack_base = 2;
        target.init_merge(&source, 2, 0);

        assert!(target.slot(0).is_reg());
        assert!(target.slot(1).is_stack());
    }

    #[test]
    fn test_in_between_region_spills_taken_registers() {
        let mut source = CacheState::new(regs());
        source.push_register(I32, AsmReg::gp(2)); // local
        source.push_register(I32, AsmReg::gp(2)); // in between, same value
        source.push_register(I32, AsmReg::gp(1)); // in between

        let mut target = source.empty_like();
        target.stack_base = 3;
        target.init_merge(&source, 1, 0);

        assert_eq!(target.slot(0).reg(), Some(AsmReg::gp(2)));
        assert!(target.slot(1).is_stack());
        assert_eq!(target.slot(2).reg(), Some(AsmReg::gp(1)));
    }

    #[test]
    fn test_steal_leaves_source_empty() {
        let mut source = CacheState::new(regs());
        source.push_register(I32, AsmReg::gp(0));
        let mut target = source.empty_like();
        target.steal(&mut source);

        assert_eq!(target.stack_height(), 1);
        assert_eq!(source.stack_height(), 0);
        assert!(!source.is_used(AsmReg::gp(0)));
        assert!(target.is_used(AsmReg::gp(0)));
    }
}
