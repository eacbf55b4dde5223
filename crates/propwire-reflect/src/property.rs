//! Property descriptors.
//!
//! A descriptor is declared with a name, a kind and an array dimension.
//! Offset, element size, alignment and the bool bit mask are filled in by the
//! linker, or fixed up front with [`PropertyDescriptor::at_offset`] for
//! externally laid out types.

use propwire_core::{Archive, ArchiveFlags, Name};

use crate::env::Environment;
use crate::flags::PropertyFlags;
use crate::registry::{EnumId, TypeId};

/// Semantic kind of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Byte { enum_def: Option<EnumId> },
    Int,
    Float,
    Bool,
    Name,
    Str,
    Object,
    Struct { struct_type: TypeId },
    Array { inner: Box<PropertyDescriptor> },
}

impl PropertyKind {
    /// Type name written into property tags.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Byte { .. } => "ByteProperty",
            Self::Int => "IntProperty",
            Self::Float => "FloatProperty",
            Self::Bool => "BoolProperty",
            Self::Name => "NameProperty",
            Self::Str => "StrProperty",
            Self::Object => "ObjectProperty",
            Self::Struct { .. } => "StructProperty",
            Self::Array { .. } => "ArrayProperty",
        }
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }
}

/// One field of a type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: Name,
    pub kind: PropertyKind,
    pub array_dim: usize,
    pub flags: PropertyFlags,
    pub(crate) offset: usize,
    pub(crate) element_size: usize,
    pub(crate) alignment: usize,
    pub(crate) bit_mask: u32,
}

impl PropertyDescriptor {
    pub fn new(name: &str, kind: PropertyKind) -> Self {
        Self {
            name: Name::new(name),
            kind,
            array_dim: 1,
            flags: PropertyFlags::NONE,
            offset: 0,
            element_size: 0,
            alignment: 1,
            bit_mask: 0,
        }
    }

    pub fn byte(name: &str) -> Self {
        Self::new(name, PropertyKind::Byte { enum_def: None })
    }

    pub fn enum_byte(name: &str, enum_def: EnumId) -> Self {
        Self::new(
            name,
            PropertyKind::Byte {
                enum_def: Some(enum_def),
            },
        )
    }

    pub fn int(name: &str) -> Self {
        Self::new(name, PropertyKind::Int)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, PropertyKind::Float)
    }

    pub fn bool(name: &str) -> Self {
        Self::new(name, PropertyKind::Bool)
    }

    pub fn name(name: &str) -> Self {
        Self::new(name, PropertyKind::Name)
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, PropertyKind::Str)
    }

    pub fn object(name: &str) -> Self {
        Self::new(name, PropertyKind::Object)
    }

    pub fn structure(name: &str, struct_type: TypeId) -> Self {
        Self::new(name, PropertyKind::Struct { struct_type })
    }

    /// Dynamic array whose elements are described by `inner`.
    pub fn array(name: &str, inner: PropertyDescriptor) -> Self {
        Self::new(
            name,
            PropertyKind::Array {
                inner: Box::new(inner),
            },
        )
    }

    /// Fixed array dimension.
    pub fn array_dim(mut self, dim: usize) -> Self {
        self.array_dim = dim;
        self
    }

    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Fixes the offset for types linked without layout.
    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Fixes the bit mask of a bool for types linked without layout.
    pub fn with_bit_mask(mut self, mask: u32) -> Self {
        self.bit_mask = mask;
        self
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Total bytes over every array element.
    #[inline]
    pub fn size(&self) -> usize {
        self.element_size * self.array_dim
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn bit_mask(&self) -> u32 {
        self.bit_mask
    }

    #[inline]
    pub fn is_editor_only(&self) -> bool {
        self.flags.contains(PropertyFlags::EDITOR_ONLY)
    }

    /// Whether the value travels through `ar` at all.
    pub fn should_serialize(&self, ar: &dyn Archive, env: &Environment) -> bool {
        let flags = self.flags;
        let skip = (flags.contains(PropertyFlags::TRANSIENT) && ar.is_persistent())
            || (flags.contains(PropertyFlags::DEPRECATED) && ar.is_saving())
            || (self.is_editor_only()
                && (env.filter_editor_only || ar.flags().contains(ArchiveFlags::FILTER_EDITOR_ONLY)));
        !skip
    }
}
