#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Script bytecode for propwire.
//!
//! This crate contains:
//! - Expression tokens and the in-memory script buffer
//! - The bidirectional transcoder (load, save and read-only walks)
//! - Script records with in-memory and on-disk sizes, patch overlay support
//!   and reference collection
//! - A disassembler

mod buffer;
mod dump;
mod error;
mod script;
mod token;
mod transcode;


pub use buffer::{BytecodeBuffer, CASE_DEFAULT, NAME_SIZE, OBJECT_SIZE, ScriptBuilder};
pub use dump::dump;
pub use error::{BytecodeError, Result};
pub use script::{
    ScriptContext, ScriptSummary, collect_references, serialize_script, top_level_tokens,
};
pub use token::{EXTENDED_NATIVE, ExprToken, FIRST_NATIVE, MAX_NATIVE_INDEX, Token};
pub use transcode::{Direction, LABEL_TABLE_SCAN_LIMIT, Operand, Transcoder, Visitor};
