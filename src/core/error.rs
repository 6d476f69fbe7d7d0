// Error types for the baseline compiler, built on thiserror. Bailout is what callers of
// compile() see: either the function uses something this tier deliberately does not
// implement (Unsupported, recoverable by falling back to another tier) or the bytecode is
// structurally invalid (Validation). CompileError is the internal result of every opcode
// handler and is folded into a Bailout by the driver. EncodingError covers failures of the
// code emitter, which are programming errors rather than properties of the input.

//! Error types for the baseline compiler.

use thiserror::Error;

/// Why a function produced no code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Bailout {
    /// The function uses a construct this tier does not implement.
    #[error("unsupported: {reason}")]
    Unsupported { reason: String },

    /// The function body failed structural validation.
    #[error("validation failed at offset {offset}: {message}")]
    Validation { offset: usize, message: String },
}

impl Bailout {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Bailout::Unsupported { .. })
    }
}

/// Failures of the code emitter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid register for operation")]
    InvalidRegister,

    #[error("no register available in the requested class")]
    RegistersExhausted,

    #[error("value stack underflow")]
    StackUnderflow,

    #[error("label {0} is unknown or already bound")]
    InvalidLabel(u32),

    #[error("assembly error: {0}")]
    AssemblyError(String),
}

/// Internal error type for opcode handlers.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl CompileError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        CompileError::Unsupported(reason.into())
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type alias for emitter operations.
pub type EmitResult<T = ()> = Result<T, EncodingError>;
