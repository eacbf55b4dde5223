//! Object reference collection over instance memory.

use propwire_core::ObjectHandle;

use crate::instance::{Memory, read_u32_le, read_u64_le};
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::registry::{TypeId, TypeRegistry};

/// Every distinct non-null object a value of type `ty` refers to, in
/// first-use order. Only the reference chain is visited.
pub fn collect_references(registry: &TypeRegistry, ty: TypeId, memory: Memory<'_>) -> Vec<ObjectHandle> {
    let mut out = Vec::new();
    collect_type(registry, ty, memory, &mut out);
    out
}

fn collect_type(registry: &TypeRegistry, ty: TypeId, memory: Memory<'_>, out: &mut Vec<ObjectHandle>) {
    for &r in registry.get(ty).ref_link() {
        let prop = registry.property(r);
        for idx in 0..prop.array_dim {
            let at = memory.at(prop.offset + idx * prop.element_size);
            collect_item(registry, prop, at, out);
        }
    }
}

fn collect_item(registry: &TypeRegistry, prop: &PropertyDescriptor, memory: Memory<'_>, out: &mut Vec<ObjectHandle>) {
    match &prop.kind {
        PropertyKind::Object => {
            let object = ObjectHandle(read_u64_le(memory.bytes, 0));
            if !object.is_null() && !out.contains(&object) {
                out.push(object);
            }
        }
        PropertyKind::Struct { struct_type } => collect_type(registry, *struct_type, memory, out),
        PropertyKind::Array { inner } => {
            let Some(array) = memory.heap.array(read_u32_le(memory.bytes, 0)) else {
                return;
            };
            for i in 0..array.len {
                let element = Memory::new(&array.bytes[i * inner.element_size..], memory.heap);
                collect_item(registry, inner, element, out);
            }
        }
        _ => {}
    }
}
