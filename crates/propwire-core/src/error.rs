//! Stream error type.

/// Failure of a low-level stream operation.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("unexpected end of stream: wanted {wanted} bytes at offset {offset}, stream has {len}")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        len: usize,
    },
    #[error("seek to {offset} outside stream of {len} bytes")]
    SeekOutOfRange { offset: usize, len: usize },
    #[error("string length {len} at offset {offset} is out of range")]
    StringLength { offset: usize, len: i32 },
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("unresolved object index {0}")]
    MissingReference(u32),
    #[error("patch overlay cannot be used while saving")]
    PatchWhileSaving,
    #[error("patch table too small: {0} bytes")]
    PatchTooSmall(usize),
    #[error("patch table checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    PatchChecksum { stored: u32, computed: u32 },
    #[error("patch table encoding: {0}")]
    Patch(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
