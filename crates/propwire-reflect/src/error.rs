//! Reflection error type.
//!
//! Only caller mistakes and stream failures are errors here. Anomalies in
//! tagged property data are reported through [`LoadReport`](crate::LoadReport)
//! and never abort a read.

use propwire_bytecode::BytecodeError;
use propwire_core::StreamError;

#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    #[error("type `{ty}` has no field `{field}`")]
    UnknownField { ty: String, field: String },
    #[error("index {index} out of bounds for `{field}` of dimension {dim}")]
    ArrayIndex {
        field: String,
        index: usize,
        dim: usize,
    },
    #[error("value for `{field}` must be {expected}")]
    ValueKind { field: String, expected: &'static str },
    #[error("element count {count} for `{field}` does not fit its data")]
    ArrayLength { field: String, count: i32 },
    #[error("negative tag size {size} for `{field}`")]
    TagSize { field: String, size: i32 },
    #[error("cyclic type dependency through `{0}`")]
    CyclicDependency(String),
    #[error("invalid environment: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
}

pub type Result<T> = std::result::Result<T, ReflectError>;
