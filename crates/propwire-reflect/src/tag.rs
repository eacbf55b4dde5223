//! Property tags.
//!
//! Wire layout of one tag:
//!
//! ```text
//! name          string   ("None" ends the section, nothing follows)
//! type_name     string
//! size          i32      payload bytes after the tag, back-patched on save
//! array_index   i32
//! struct_name   string   StructProperty only
//! bool_value    u32 | u8 BoolProperty only, u8 from COMPACT_BOOL_TAG
//! enum_name     string   ByteProperty only, from BYTE_ENUM_TAG
//! ```

use propwire_core::{Archive, FormatVersion, Name, Placeholder};

use crate::error::Result;
use crate::instance::{Memory, read_u32_le};
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::registry::TypeRegistry;

pub(crate) const STRUCT_PROPERTY: &str = "StructProperty";
pub(crate) const BOOL_PROPERTY: &str = "BoolProperty";
pub(crate) const BYTE_PROPERTY: &str = "ByteProperty";

/// Type-specific tag payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPayload {
    None,
    Struct(Name),
    Bool(bool),
    Enum(Name),
}

/// Self-describing header written in front of each property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTag {
    pub name: Name,
    pub type_name: Name,
    pub size: i32,
    pub array_index: i32,
    pub payload: TagPayload,
}

impl PropertyTag {
    /// The section terminator.
    pub fn terminator() -> Self {
        Self {
            name: Name::NONE,
            type_name: Name::NONE,
            size: 0,
            array_index: 0,
            payload: TagPayload::None,
        }
    }

    #[inline]
    pub fn is_terminator(&self) -> bool {
        self.name.is_none()
    }

    /// Tag describing element `index` of `prop`, whose value is at `value`.
    pub fn for_property(
        registry: &TypeRegistry,
        prop: &PropertyDescriptor,
        index: usize,
        value: Memory<'_>,
    ) -> Self {
        let payload = match &prop.kind {
            PropertyKind::Struct { struct_type } => {
                TagPayload::Struct(registry.get(*struct_type).name().clone())
            }
            PropertyKind::Bool => TagPayload::Bool(read_u32_le(value.bytes, 0) & prop.bit_mask != 0),
            PropertyKind::Byte {
                enum_def: Some(enum_def),
            } => TagPayload::Enum(registry.enum_def(*enum_def).name().clone()),
            _ => TagPayload::None,
        };
        Self {
            name: prop.name.clone(),
            type_name: Name::new(prop.kind.type_name()),
            size: 0,
            array_index: index as i32,
            payload,
        }
    }

    pub fn struct_name(&self) -> Option<&Name> {
        match &self.payload {
            TagPayload::Struct(name) => Some(name),
            _ => None,
        }
    }

    /// Enum carried by a byte tag; `None` for plain bytes.
    pub fn enum_name(&self) -> Name {
        match &self.payload {
            TagPayload::Enum(name) => name.clone(),
            _ => Name::NONE,
        }
    }

    pub fn bool_value(&self) -> bool {
        matches!(self.payload, TagPayload::Bool(true))
    }

    /// Reads or writes the tag.
    ///
    /// Saving returns the placeholder of the size field, to be committed once
    /// the payload has been written. The terminator has no size field.
    pub fn serialize(&mut self, ar: &mut dyn Archive) -> Result<Option<Placeholder>> {
        ar.xfer_name(&mut self.name)?;
        if self.is_terminator() {
            return Ok(None);
        }
        ar.xfer_name(&mut self.type_name)?;

        let placeholder = if ar.is_saving() {
            Some(ar.reserve()?)
        } else {
            ar.xfer_i32(&mut self.size)?;
            None
        };
        ar.xfer_i32(&mut self.array_index)?;

        let version = ar.version();
        match self.type_name.as_str() {
            STRUCT_PROPERTY => {
                let mut name = self.struct_name().cloned().unwrap_or(Name::NONE);
                ar.xfer_name(&mut name)?;
                self.payload = TagPayload::Struct(name);
            }
            BOOL_PROPERTY => {
                let mut on = self.bool_value();
                if version.at_least(FormatVersion::COMPACT_BOOL_TAG) {
                    let mut raw = on as u8;
                    ar.xfer_u8(&mut raw)?;
                    on = raw != 0;
                } else {
                    let mut raw = on as u32;
                    ar.xfer_u32(&mut raw)?;
                    on = raw != 0;
                }
                self.payload = TagPayload::Bool(on);
            }
            BYTE_PROPERTY if version.at_least(FormatVersion::BYTE_ENUM_TAG) => {
                let mut name = self.enum_name();
                ar.xfer_name(&mut name)?;
                self.payload = if name.is_none() {
                    TagPayload::None
                } else {
                    TagPayload::Enum(name)
                };
            }
            _ => {}
        }

        tracing::trace!(
            name = %self.name,
            ty = %self.type_name,
            size = self.size,
            index = self.array_index,
            "property tag"
        );
        Ok(placeholder)
    }
}
