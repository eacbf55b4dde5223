//! Typed views of property values.
//!
//! [`Value`] decodes one array element of a property from instance memory.
//! Struct values flatten to one entry per (field, array index) in link order.

use propwire_core::{Name, ObjectHandle};

use crate::error::{ReflectError, Result};
use crate::instance::{
    Heap, HeapArray, Memory, MemoryMut, read_u32_le, read_u64_le, write_u32_le, write_u64_le,
};
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::registry::TypeRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Int(i32),
    Float(f32),
    Bool(bool),
    Name(Name),
    Str(String),
    Object(ObjectHandle),
    Struct(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    fn kind_name(kind: &PropertyKind) -> &'static str {
        match kind {
            PropertyKind::Byte { .. } => "a byte",
            PropertyKind::Int => "an int",
            PropertyKind::Float => "a float",
            PropertyKind::Bool => "a bool",
            PropertyKind::Name => "a name",
            PropertyKind::Str => "a string",
            PropertyKind::Object => "an object",
            PropertyKind::Struct { .. } => "a struct",
            PropertyKind::Array { .. } => "an array",
        }
    }
}

/// Decodes the element at the start of `memory`.
pub fn read_value(registry: &TypeRegistry, prop: &PropertyDescriptor, memory: Memory<'_>) -> Value {
    let bytes = memory.bytes;
    match &prop.kind {
        PropertyKind::Byte { .. } => Value::Byte(bytes[0]),
        PropertyKind::Int => Value::Int(read_u32_le(bytes, 0) as i32),
        PropertyKind::Float => Value::Float(f32::from_bits(read_u32_le(bytes, 0))),
        PropertyKind::Bool => Value::Bool(read_u32_le(bytes, 0) & prop.bit_mask != 0),
        PropertyKind::Name => Value::Name(memory.heap.name(read_u32_le(bytes, 0))),
        PropertyKind::Str => Value::Str(memory.heap.str(read_u32_le(bytes, 0)).to_owned()),
        PropertyKind::Object => Value::Object(ObjectHandle(read_u64_le(bytes, 0))),
        PropertyKind::Struct { struct_type } => {
            let mut fields = Vec::new();
            for &r in registry.get(*struct_type).property_link() {
                let field = registry.property(r);
                for idx in 0..field.array_dim {
                    let at = field.offset + idx * field.element_size;
                    fields.push(read_value(registry, field, memory.at(at)));
                }
            }
            Value::Struct(fields)
        }
        PropertyKind::Array { inner } => {
            let Some(array) = memory.heap.array(read_u32_le(bytes, 0)) else {
                return Value::Array(Vec::new());
            };
            let elements = (0..array.len)
                .map(|i| {
                    let at = Memory::new(&array.bytes[i * inner.element_size..], memory.heap);
                    read_value(registry, inner, at)
                })
                .collect();
            Value::Array(elements)
        }
    }
}

/// Encodes `value` into the element at the start of `memory`.
pub fn write_value(
    registry: &TypeRegistry,
    prop: &PropertyDescriptor,
    mut memory: MemoryMut<'_>,
    value: &Value,
) -> Result<()> {
    let mismatch = || ReflectError::ValueKind {
        field: prop.name.to_string(),
        expected: Value::kind_name(&prop.kind),
    };

    match (&prop.kind, value) {
        (PropertyKind::Byte { .. }, Value::Byte(v)) => memory.bytes[0] = *v,
        (PropertyKind::Int, Value::Int(v)) => write_u32_le(memory.bytes, 0, *v as u32),
        (PropertyKind::Float, Value::Float(v)) => write_u32_le(memory.bytes, 0, v.to_bits()),
        (PropertyKind::Bool, Value::Bool(v)) => set_bool(memory.bytes, prop.bit_mask, *v),
        (PropertyKind::Name, Value::Name(v)) => {
            let handle = memory.heap.store_name(read_u32_le(memory.bytes, 0), v.clone());
            write_u32_le(memory.bytes, 0, handle);
        }
        (PropertyKind::Str, Value::Str(v)) => {
            let handle = memory.heap.store_str(read_u32_le(memory.bytes, 0), v.clone());
            write_u32_le(memory.bytes, 0, handle);
        }
        (PropertyKind::Object, Value::Object(v)) => write_u64_le(memory.bytes, 0, v.0),
        (PropertyKind::Struct { struct_type }, Value::Struct(values)) => {
            let mut values = values.iter();
            for &r in registry.get(*struct_type).property_link() {
                let field = registry.property(r);
                for idx in 0..field.array_dim {
                    let value = values.next().ok_or_else(mismatch)?;
                    let at = field.offset + idx * field.element_size;
                    write_value(registry, field, memory.at(at), value)?;
                }
            }
            if values.next().is_some() {
                return Err(mismatch());
            }
        }
        (PropertyKind::Array { inner }, Value::Array(values)) => {
            let mut array = HeapArray::zeroed(values.len(), inner.element_size);
            for (i, value) in values.iter().enumerate() {
                let at = MemoryMut::new(&mut array.bytes[i * inner.element_size..], &mut *memory.heap);
                write_value(registry, inner, at, value)?;
            }
            let handle = memory.heap.store_array(read_u32_le(memory.bytes, 0), array);
            write_u32_le(memory.bytes, 0, handle);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

#[inline]
pub(crate) fn set_bool(bytes: &mut [u8], mask: u32, on: bool) {
    let word = read_u32_le(bytes, 0);
    let word = if on { word | mask } else { word & !mask };
    write_u32_le(bytes, 0, word);
}

/// Whether two elements hold the same value. A missing `other` is the
/// zero value.
pub(crate) fn identical(
    registry: &TypeRegistry,
    prop: &PropertyDescriptor,
    value: Memory<'_>,
    other: Option<Memory<'_>>,
) -> bool {
    let lhs = read_value(registry, prop, value);
    match other {
        Some(other) => lhs == read_value(registry, prop, other),
        None => {
            let zeros = vec![0u8; prop.element_size];
            let heap = Heap::new();
            lhs == read_value(registry, prop, Memory::new(&zeros, &heap))
        }
    }
}
