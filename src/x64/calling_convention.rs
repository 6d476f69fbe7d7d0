// System V AMD64 argument assignment for compiled wasm functions. Compiled code is entered
// like a C function taking the instance context pointer first and then the wasm parameters
// in order, so the context arrives in RDI, i32 parameters take the remaining integer
// argument registers (RSI, RDX, RCX, R8, R9), f32 parameters take XMM0-XMM7, and whatever
// does not fit is passed in 8 byte slots of the caller's outgoing argument area. Results
// come back in RAX or XMM0. SysVAssigner walks the argument list once; SysVCallDescriptor
// records the outcome per wasm parameter and answers the compiler's CallingConvention
// queries.

//! System V x86-64 calling convention for compiled functions.

use crate::core::linkage::{CallingConvention, ParamLocation};
use crate::core::register_file::{AsmReg, RegClass};
use crate::core::types::FuncSig;

/// Incremental System V argument assignment.
#[derive(Debug, Default)]
pub struct SysVAssigner {
    /// Current GP argument register index.
    gp_cnt: usize,
    /// Current XMM argument register index.
    xmm_cnt: usize,
    /// Caller stack slots handed out so far.
    stack_slots: u32,
}

impl SysVAssigner {
    /// System V x86-64 GP argument registers.
    pub const GP_ARG_REGS: [AsmReg; 6] = [
        AsmReg::gp(7), // RDI
        AsmReg::gp(6), // RSI
        AsmReg::gp(2), // RDX
        AsmReg::gp(1), // RCX
        AsmReg::gp(8), // R8
        AsmReg::gp(9), // R9
    ];

    /// System V x86-64 XMM argument registers.
    pub const XMM_ARG_REGS: [AsmReg; 8] = [
        AsmReg::fp(0),
        AsmReg::fp(1),
        AsmReg::fp(2),
        AsmReg::fp(3),
        AsmReg::fp(4),
        AsmReg::fp(5),
        AsmReg::fp(6),
        AsmReg::fp(7),
    ];

    pub const RET_GP_REG: AsmReg = AsmReg::gp(0); // RAX
    pub const RET_XMM_REG: AsmReg = AsmReg::fp(0); // XMM0

    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next argument of `class`.
    pub fn assign_arg(&mut self, class: RegClass) -> ParamLocation {
        let (regs, cnt): (&[AsmReg], &mut usize) = match class {
            RegClass::Gp => (&Self::GP_ARG_REGS[..], &mut self.gp_cnt),
            RegClass::Fp => (&Self::XMM_ARG_REGS[..], &mut self.xmm_cnt),
        };
        if let Some(&reg) = regs.get(*cnt) {
            *cnt += 1;
            return ParamLocation::Register(reg);
        }
        let slot = self.stack_slots;
        self.stack_slots += 1;
        ParamLocation::CallerFrameSlot(slot)
    }

    /// Bytes of caller stack used by the arguments, 16-byte aligned.
    pub fn stack_size(&self) -> u32 {
        (self.stack_slots * 8).next_multiple_of(16)
    }
}

/// Parameter locations of one function signature.
#[derive(Debug, Clone)]
pub struct SysVCallDescriptor {
    context: AsmReg,
    params: Vec<ParamLocation>,
    stack_size: u32,
}

impl SysVCallDescriptor {
    pub fn for_signature(sig: &FuncSig) -> Self {
        let mut assigner = SysVAssigner::new();
        let context = match assigner.assign_arg(RegClass::Gp) {
            ParamLocation::Register(reg) => reg,
            ParamLocation::CallerFrameSlot(_) => SysVAssigner::GP_ARG_REGS[0],
        };
        // Types without a register class (rejected by the compiler anyway)
        // travel in integer registers.
        let params = sig
            .params
            .iter()
            .map(|ty| assigner.assign_arg(ty.reg_class().unwrap_or(RegClass::Gp)))
            .collect();
        Self {
            context,
            params,
            stack_size: assigner.stack_size(),
        }
    }

    /// Caller stack bytes needed for the arguments.
    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    pub fn return_register(class: RegClass) -> AsmReg {
        match class {
            RegClass::Gp => SysVAssigner::RET_GP_REG,
            RegClass::Fp => SysVAssigner::RET_XMM_REG,
        }
    }
}

impl CallingConvention for SysVCallDescriptor {
    fn context_register(&self) -> AsmReg {
        self.context
    }

    fn param_location(&self, index: u32) -> ParamLocation {
        self.params[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ValueType;

    #[test]
    fn test_context_takes_first_gp_register() {
        let sig = FuncSig::new([ValueType::I32, ValueType::F32, ValueType::I32], []);
        let desc = SysVCallDescriptor::for_signature(&sig);

        assert_eq!(desc.context_register(), AsmReg::gp(7));
        assert_eq!(desc.param_location(0), ParamLocation::Register(AsmReg::gp(6)));
        assert_eq!(desc.param_location(1), ParamLocation::Register(AsmReg::fp(0)));
        assert_eq!(desc.param_location(2), ParamLocation::Register(AsmReg::gp(2)));
        assert_eq!(desc.stack_size(), 0);
    }

    #[test]
    fn test_overflowing_params_use_caller_slots() {
        let sig = FuncSig::new(vec![ValueType::I32; 7], []);
        let desc = SysVCallDescriptor::for_signature(&sig);

        // Five i32 registers remain after the context pointer.
        assert_eq!(desc.param_location(4), ParamLocation::Register(AsmReg::gp(9)));
        assert_eq!(desc.param_location(5), ParamLocation::CallerFrameSlot(0));
        assert_eq!(desc.param_location(6), ParamLocation::CallerFrameSlot(1));
        assert_eq!(desc.stack_size(), 16);
    }

    #[test]
    fn test_float_and_integer_slots_interleave() {
        let mut assigner = SysVAssigner::new();
        for _ in 0..8 {
            assert!(matches!(assigner.assign_arg(RegClass::Fp), ParamLocation::Register(_)));
        }
        assert_eq!(assigner.assign_arg(RegClass::Fp), ParamLocation::CallerFrameSlot(0));
        assert_eq!(
            assigner.assign_arg(RegClass::Gp),
            ParamLocation::Register(AsmReg::gp(7))
        );
        assert_eq!(assigner.stack_size(), 16);
    }

    #[test]
    fn test_return_registers() {
        assert_eq!(SysVCallDescriptor::return_register(RegClass::Gp), AsmReg::gp(0));
        assert_eq!(SysVCallDescriptor::return_register(RegClass::Fp), AsmReg::fp(0));
    }
}
