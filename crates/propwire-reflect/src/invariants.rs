//! Invariant checks excluded from coverage reports.

#![cfg_attr(coverage_nightly, coverage(off))]

#[cfg(not(feature = "editor-only-data"))]
use propwire_core::Name;

#[cfg(not(feature = "editor-only-data"))]
use crate::property::PropertyDescriptor;
use crate::registry::{EnumDef, EnumId, TypeDef, TypeId, TypeRegistry};

impl TypeRegistry {
    pub(crate) fn ensure_type(&self, id: TypeId) -> &TypeDef {
        self.types
            .get_index(id.as_usize())
            .map(|(_, def)| def)
            .unwrap_or_else(|| panic!("TypeRegistry: type id {id:?} not registered"))
    }

    pub(crate) fn ensure_type_mut(&mut self, id: TypeId) -> &mut TypeDef {
        self.types
            .get_index_mut(id.as_usize())
            .map(|(_, def)| def)
            .unwrap_or_else(|| panic!("TypeRegistry: type id {id:?} not registered"))
    }

    pub(crate) fn ensure_enum(&self, id: EnumId) -> &EnumDef {
        self.enums
            .get_index(id.as_usize())
            .map(|(_, def)| def)
            .unwrap_or_else(|| panic!("TypeRegistry: enum id {id:?} not registered"))
    }
}

/// Builds without editor data cannot lay out editor-only properties.
#[cfg(not(feature = "editor-only-data"))]
#[inline]
pub(crate) fn assert_not_editor_only(owner: &Name, prop: &PropertyDescriptor) {
    assert!(
        !prop.is_editor_only(),
        "link: editor-only property {}.{} in a build without editor data",
        owner,
        prop.name
    );
}
