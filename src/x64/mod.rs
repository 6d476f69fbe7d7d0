//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Instruction encoding using iced-x86
//! - The code emitter driven by the baseline compiler, with its frame layout
//! - System V based argument assignment for compiled functions
//! - ELF object output and, on unix, executable memory

pub mod calling_convention;
pub mod elf;
pub mod emitter;
pub mod encoder;
#[cfg(unix)]
pub mod exec;

pub use calling_convention::{SysVAssigner, SysVCallDescriptor};
pub use emitter::X64Emitter;
pub use encoder::X64Encoder;
#[cfg(unix)]
pub use exec::ExecutableBuffer;
pub use elf::{ObjectBuilder, ObjectError};
