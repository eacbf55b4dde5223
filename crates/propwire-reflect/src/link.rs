//! Property linker.
//!
//! Linking a type lays out its own properties after the inherited block and
//! rebuilds the derived chains. The super type and every embedded struct type
//! are linked first.
//!
//! Layout rules per kind (element size / alignment):
//! - byte: 1 / 1
//! - int, float, bool, name, string, array: 4 / 4
//! - object: 8 / 8
//! - struct: the struct's aligned size / the struct's alignment
//!
//! Consecutive bools in a type that merges bools share one word, each taking
//! the next bit.

use propwire_core::Name;

use crate::error::{ReflectError, Result};
use crate::flags::PropertyFlags;
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::registry::{PropertyRef, TypeId, TypeKind, TypeRegistry};

const FIRST_BITFIELD: u32 = 1;

/// Struct names whose alignment is fixed regardless of their fields.
fn alignment_override(name: &Name) -> Option<(usize, Option<usize>)> {
    match name.as_str() {
        "Matrix" | "Plane" | "SHVector" | "Vector4" | "Quat" => Some((16, None)),
        "QWord" | "Double" | "Pointer" => Some((8, Some(8))),
        "Color" => Some((4, None)),
        _ => None,
    }
}

impl TypeRegistry {
    /// Links `id`, computing offsets when `compute_layout` is set.
    ///
    /// Without layout, offsets and bool masks given at declaration are kept
    /// and only sizes, alignment and the chains are rebuilt.
    pub fn link(&mut self, id: TypeId, compute_layout: bool) -> Result<()> {
        let mut visiting = Vec::new();
        self.link_with(id, compute_layout, &mut visiting)
    }

    /// Links every type that is not linked yet, in registration order.
    pub fn link_all(&mut self) -> Result<()> {
        let ids: Vec<TypeId> = self.types().map(|(id, _)| id).collect();
        for id in ids {
            if !self.get(id).linked {
                self.link(id, true)?;
            }
        }
        Ok(())
    }

    fn link_with(&mut self, id: TypeId, compute_layout: bool, visiting: &mut Vec<TypeId>) -> Result<()> {
        if visiting.contains(&id) {
            return Err(ReflectError::CyclicDependency(self.get(id).name.to_string()));
        }
        visiting.push(id);
        for dep in self.dependencies(id) {
            if !self.get(dep).linked || visiting.contains(&dep) {
                self.link_with(dep, true, visiting)?;
            }
        }
        visiting.pop();

        if compute_layout {
            self.layout(id);
        } else {
            self.relink_fixed(id);
        }
        self.build_chains(id);

        let def = self.get_mut(id);
        def.linked = true;
        tracing::trace!(
            ty = %def.name,
            size = def.properties_size,
            alignment = def.min_alignment,
            properties = def.property_link.len(),
            "linked type"
        );
        Ok(())
    }

    /// Types whose layout must be known before `id` can be laid out.
    fn dependencies(&self, id: TypeId) -> Vec<TypeId> {
        fn embedded(kind: &PropertyKind, id: TypeId, out: &mut Vec<TypeId>) {
            match kind {
                PropertyKind::Struct { struct_type } if *struct_type != id => out.push(*struct_type),
                PropertyKind::Array { inner } => embedded(&inner.kind, id, out),
                _ => {}
            }
        }

        let def = self.get(id);
        let mut deps: Vec<TypeId> = def.super_type.into_iter().collect();
        for prop in &def.properties {
            match &prop.kind {
                // A direct self embed has no finite layout.
                PropertyKind::Struct { struct_type } if *struct_type == id => deps.push(id),
                kind => embedded(kind, id, &mut deps),
            }
        }
        deps
    }

    /// Element size and alignment of one element of `kind` inside `owner`.
    fn element_layout(&self, kind: &mut PropertyKind, owner: TypeId, owner_size: usize) -> (usize, usize) {
        match kind {
            PropertyKind::Byte { .. } => (1, 1),
            PropertyKind::Int
            | PropertyKind::Float
            | PropertyKind::Bool
            | PropertyKind::Name
            | PropertyKind::Str => (4, 4),
            PropertyKind::Object => (8, 8),
            PropertyKind::Struct { struct_type } if *struct_type == owner => (owner_size, 4),
            PropertyKind::Struct { struct_type } => {
                let def = self.get(*struct_type);
                (def.aligned_size(), def.min_alignment)
            }
            PropertyKind::Array { inner } => {
                let (size, alignment) = self.element_layout(&mut inner.kind, owner, owner_size);
                inner.offset = 0;
                inner.element_size = size;
                inner.alignment = alignment;
                if inner.kind.is_bool() {
                    inner.bit_mask = FIRST_BITFIELD;
                }
                (4, 4)
            }
        }
    }

    fn inherited_layout(&self, id: TypeId) -> (usize, usize) {
        match self.get(id).super_type {
            Some(sup) => {
                let sup = self.get(sup);
                (sup.properties_size.next_multiple_of(4), sup.min_alignment)
            }
            None => (0, 1),
        }
    }

    fn layout(&mut self, id: TypeId) {
        let (mut size, mut min_alignment) = self.inherited_layout(id);
        let def = self.get(id);
        let merge_bools = def.kind.merges_bools();
        let mut properties = def.properties.clone();

        let mut prev: Option<(usize, u32, bool)> = None;
        for prop in &mut properties {
            #[cfg(not(feature = "editor-only-data"))]
            crate::invariants::assert_not_editor_only(&def.name, prop);

            let (element_size, alignment) = self.element_layout(&mut prop.kind, id, size);
            prop.element_size = element_size;
            prop.alignment = alignment;

            let single = prop.array_dim == 1;
            match prev {
                Some((offset, mask, true))
                    if merge_bools && single && prop.kind.is_bool() && mask << 1 != 0 =>
                {
                    prop.offset = offset;
                    prop.bit_mask = mask << 1;
                }
                _ => {
                    prop.offset = size.next_multiple_of(alignment);
                    if prop.kind.is_bool() {
                        prop.bit_mask = FIRST_BITFIELD;
                    }
                }
            }

            size = size.max(prop.offset + prop.size());
            min_alignment = min_alignment.max(alignment);
            prev = Some((prop.offset, prop.bit_mask, single && prop.kind.is_bool()));
        }

        // A struct holding an array of itself only learns its element size now.
        if def.kind == TypeKind::Struct {
            for prop in &mut properties {
                if let PropertyKind::Array { inner } = &mut prop.kind
                    && matches!(inner.kind, PropertyKind::Struct { struct_type } if struct_type == id)
                {
                    inner.element_size = size;
                    inner.flags.insert(PropertyFlags::NEED_CTOR_LINK);
                }
            }
        }

        match alignment_override(&def.name) {
            Some((alignment, fixed_size)) => {
                min_alignment = alignment;
                if let Some(fixed) = fixed_size {
                    size = fixed;
                }
            }
            None => min_alignment = min_alignment.max(4),
        }

        let def = self.get_mut(id);
        def.properties = properties;
        def.properties_size = size;
        def.min_alignment = min_alignment;
    }

    fn relink_fixed(&mut self, id: TypeId) {
        let (mut size, mut min_alignment) = self.inherited_layout(id);
        let mut properties = self.get(id).properties.clone();
        for prop in &mut properties {
            let (element_size, alignment) = self.element_layout(&mut prop.kind, id, size);
            prop.element_size = element_size;
            prop.alignment = alignment;
            size = size.max(prop.offset + prop.size());
            min_alignment = min_alignment.max(alignment);
        }

        let def = self.get_mut(id);
        def.properties = properties;
        def.properties_size = size;
        def.min_alignment = min_alignment;
    }

    fn holds_references(&self, kind: &PropertyKind, owner: TypeId) -> bool {
        match kind {
            PropertyKind::Object => true,
            PropertyKind::Struct { struct_type } if *struct_type == owner => false,
            PropertyKind::Struct { struct_type } => !self.get(*struct_type).ref_link.is_empty(),
            PropertyKind::Array { inner } => self.holds_references(&inner.kind, owner),
            _ => false,
        }
    }

    fn needs_construction(&self, prop: &PropertyDescriptor, owner: TypeId) -> bool {
        if prop.flags.contains(PropertyFlags::NEED_CTOR_LINK) {
            return true;
        }
        match &prop.kind {
            PropertyKind::Name | PropertyKind::Str | PropertyKind::Array { .. } => true,
            PropertyKind::Struct { struct_type } if *struct_type != owner => {
                !self.get(*struct_type).ctor_link.is_empty()
            }
            _ => false,
        }
    }

    fn build_chains(&mut self, id: TypeId) {
        let def = self.get(id);
        let own = |index| PropertyRef { owner: id, index };

        let mut property_link: Vec<PropertyRef> = (0..def.properties.len()).map(own).collect();
        let mut ref_link = Vec::new();
        let mut ctor_link = Vec::new();
        let mut net_link = Vec::new();
        let mut self_arrays = Vec::new();

        for (index, prop) in def.properties.iter().enumerate() {
            if self.holds_references(&prop.kind, id) {
                ref_link.push(own(index));
            }
            if self.needs_construction(prop, id) {
                ctor_link.push(own(index));
            }
            if prop.flags.contains(PropertyFlags::NET) {
                net_link.push(own(index));
            }
            if let PropertyKind::Array { inner } = &prop.kind
                && matches!(inner.kind, PropertyKind::Struct { struct_type } if struct_type == id)
            {
                self_arrays.push(own(index));
            }
        }

        if let Some(sup) = def.super_type.map(|s| self.get(s)) {
            property_link.extend_from_slice(&sup.property_link);
            ref_link.extend_from_slice(&sup.ref_link);
            ctor_link.extend_from_slice(&sup.ctor_link);
            net_link.extend_from_slice(&sup.net_link);
        }

        // Elements of a self array carry whatever references the struct does.
        if !ref_link.is_empty() {
            for r in self_arrays {
                if !ref_link.contains(&r) {
                    ref_link.push(r);
                }
            }
            ref_link.sort_by_key(|r| property_link.iter().position(|p| p == r));
        }

        let def = self.get_mut(id);
        def.property_link = property_link;
        def.ref_link = ref_link;
        def.ctor_link = ctor_link;
        def.net_link = net_link;
    }
}
