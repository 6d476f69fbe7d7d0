//! Calling convention provider interface.

use super::register_file::AsmReg;

/// Where an incoming parameter is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Register(AsmReg),
    /// 8-byte slot `n` of the caller's outgoing argument area.
    CallerFrameSlot(u32),
}

pub trait CallingConvention {
    /// Register carrying the instance context pointer on entry.
    fn context_register(&self) -> AsmReg;

    /// Location of wasm parameter `index`.
    fn param_location(&self, index: u32) -> ParamLocation;
}
