#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Stream primitives shared by the propwire codecs.
//!
//! - [`Archive`]: a position-addressable byte stream that reads when loading
//!   and writes when saving, with a two-phase size placeholder API
//! - [`MemoryReader`] / [`MemoryWriter`]: in-memory archives
//! - [`Name`] / [`NameTable`]: field and type names, with `None` as the empty sentinel
//! - [`ObjectHandle`] / [`ObjectMap`]: object references and their pointer-or-index wire form
//! - [`PatchTable`] / [`PatchedArchive`]: out-of-band corrections overlaid on a load

mod archive;
mod error;
mod memory;
mod name;
mod object;
mod patch;
mod version;


pub use archive::{Archive, ArchiveFlags, MAX_STRING_LEN, Placeholder};
pub use error::{Result, StreamError};
pub use memory::{MemoryReader, MemoryWriter};
pub use name::{Name, NameIndex, NameTable};
pub use object::{ObjectHandle, ObjectMap, ObjectTable, PassMode, WireRef, serialize_object};
pub use patch::{BytecodePatch, DefaultsPatch, EnumPatch, PatchTable, PatchedArchive};
pub use version::FormatVersion;
