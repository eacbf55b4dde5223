#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Reflected types and tagged property serialization for propwire.
//!
//! This crate contains:
//! - Property descriptors, type and enum definitions, and the [`TypeRegistry`]
//! - The property linker (offsets, alignment, derived property chains)
//! - Instance memory with a heap for strings, names and dynamic arrays
//! - Property tags and the tagged property walker with default diffing,
//!   legacy conversions and skip-and-continue recovery
//! - Type records (script plus defaults) and patch table application

mod env;
mod error;
mod flags;
mod instance;
mod invariants;
mod link;
mod patch;
mod property;
mod record;
mod refs;
mod registry;
mod report;
mod tag;
mod value;
mod walker;

#[cfg(test)]
mod env_tests;
#[cfg(test)]
mod walker_tests;

pub use env::Environment;
pub use error::{ReflectError, Result};
pub use flags::{PropertyFlags, StructFlags};
pub use instance::{Heap, HeapArray, Instance, Memory, MemoryMut};
pub use patch::apply_enum_patches;
pub use property::{PropertyDescriptor, PropertyKind};
pub use record::{RecordContext, RecordSummary, serialize_type_record};
pub use refs::collect_references;
pub use registry::{EnumDef, EnumId, PropertyRef, TypeDef, TypeId, TypeKind, TypeRegistry};
pub use report::{Conversion, LoadReport, Skip, SkipReason};
pub use tag::{PropertyTag, TagPayload};
pub use value::{Value, read_value, write_value};
pub use walker::{SerializeContext, serialize_bin, serialize_instance, serialize_tagged};
