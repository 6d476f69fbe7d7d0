//! Control-flow frames.
//!
//! One [`Control`] per open function, block and loop. The frame's
//! `label_state` is the cache state every path arriving at `label` must
//! produce. It is empty until the first path arrives (blocks and the
//! function) or fixed on entry (loops).

use crate::core::cache_state::CacheState;
use crate::core::emitter::Label;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Function,
    Block,
    Loop,
}

/// How many paths have arrived at a frame's label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Unreached,
    /// One path defined the label state.
    Reached,
    /// Further paths were reconciled with it.
    Merged,
}

#[derive(Debug)]
pub struct Control {
    pub kind: ControlKind,
    pub label: Label,
    pub label_state: CacheState,
    /// Values carried to the label.
    pub arity: u32,
    pub merge: MergeState,
}

impl Control {
    pub fn new(kind: ControlKind, label: Label, label_state: CacheState, arity: u32) -> Self {
        Self {
            kind,
            label,
            label_state,
            arity,
            merge: MergeState::Unreached,
        }
    }

    pub fn is_reached(&self) -> bool {
        self.merge != MergeState::Unreached
    }

    /// Record one more path arriving at the label.
    pub fn mark_reached(&mut self) {
        self.merge = match self.merge {
            MergeState::Unreached => MergeState::Reached,
            MergeState::Reached | MergeState::Merged => MergeState::Merged,
        };
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register_file::{AsmReg, RegBitSet};

    #[test]
    fn test_merge_state_progression() {
        let state = CacheState::new(RegBitSet::from_regs(&[AsmReg::gp(0)]));
        let mut control = Control::new(ControlKind::Block, Label(0), state, 1);
        assert!(!control.is_reached());

        control.mark_reached();
        assert_eq!(control.merge, MergeState::Reached);
        control.mark_reached();
        control.mark_reached();
        assert_eq!(control.merge, MergeState::Merged);
        assert!(control.is_reached());
    }
}
