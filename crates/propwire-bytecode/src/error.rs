//! Bytecode error type.
//!
//! Bytecode is trusted compiler output, so every variant is fatal for the
//! record being transcoded. Nothing here is recovered internally.

use propwire_core::StreamError;

#[derive(Debug, thiserror::Error)]
pub enum BytecodeError {
    #[error("unknown expression token 0x{opcode:02x} at code offset {offset}")]
    FormatCorruption { opcode: u8, offset: usize },
    #[error("script serialization mismatch: got {got}, expected {expected}")]
    ByteCountMismatch { got: usize, expected: usize },
    #[error("code truncated: {wanted} bytes at offset {offset} exceed script of {len} bytes")]
    Truncated {
        offset: usize,
        wanted: usize,
        len: usize,
    },
    #[error("label table at offset {offset} exceeds scan limit of {limit} bytes")]
    LabelTableOverrun { offset: usize, limit: usize },
    #[error("unknown name index {index} at code offset {offset}")]
    InvalidName { offset: usize, index: u32 },
    #[error("jump target {target} outside script of {len} bytes")]
    JumpOutOfRange { target: usize, len: usize },
    #[error("negative script size {0}")]
    InvalidSize(i32),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub type Result<T> = std::result::Result<T, BytecodeError>;
