//! Tagged property walker.
//!
//! Saving writes one tag plus payload for every element that differs from
//! the defaults, then a terminator. Loading reads tags until the terminator,
//! matching each one to a property. Tags usually arrive in link order, so a
//! cursor tracks the expected property; a miss falls back to a search forward
//! from the cursor, then from the start up to the cursor.
//!
//! Nothing in a tagged load is fatal: a tag that cannot be applied is recorded
//! in the [`LoadReport`], logged, and its payload is skipped using the tag's
//! size.

use std::mem;

use propwire_core::{Archive, FormatVersion, Name, ObjectHandle, ObjectMap, PassMode, serialize_object};

use crate::env::Environment;
use crate::error::{ReflectError, Result};
use crate::flags::{PropertyFlags, StructFlags};
use crate::instance::{
    Heap, HeapArray, Instance, Memory, MemoryMut, read_u32_le, read_u64_le, write_u32_le, write_u64_le,
};
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::registry::{TypeId, TypeKind, TypeRegistry};
use crate::report::{Conversion, LoadReport, Skip, SkipReason};
use crate::tag::{BYTE_PROPERTY, PropertyTag};
use crate::value::{identical, set_bool};

const STR_PROPERTY: &str = "StrProperty";

/// State threaded through one save or load.
pub struct SerializeContext<'a> {
    pub registry: &'a TypeRegistry,
    pub env: &'a Environment,
    pub pass: PassMode,
    pub objects: &'a mut dyn ObjectMap,
    report: LoadReport,
    /// Stream position where the payload of the tag being loaded ends.
    value_end: Option<usize>,
}

impl<'a> SerializeContext<'a> {
    pub fn new(registry: &'a TypeRegistry, env: &'a Environment, objects: &'a mut dyn ObjectMap) -> Self {
        Self {
            registry,
            env,
            pass: PassMode::InMemory,
            objects,
            report: LoadReport::new(),
            value_end: None,
        }
    }

    pub fn pass(mut self, pass: PassMode) -> Self {
        self.pass = pass;
        self
    }

    /// Anomalies recorded since the last public call returned.
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    fn take_report(&mut self) -> LoadReport {
        mem::take(&mut self.report)
    }
}

/// Saves or loads `instance` diffed against its type's registered defaults.
pub fn serialize_instance(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    instance: &mut Instance,
) -> Result<LoadReport> {
    let registry = ctx.registry;
    let ty = instance.type_id();
    let defaults = registry.default_instance(ty).map(Instance::memory);
    serialize_tagged(ctx, ar, ty, instance.memory_mut(), defaults)
}

/// Saves or loads one tagged section for a value of type `ty`.
///
/// `defaults` is only consulted when saving. Loading returns what was
/// skipped or converted; saving returns an empty report.
pub fn serialize_tagged(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    ty: TypeId,
    data: MemoryMut<'_>,
    defaults: Option<Memory<'_>>,
) -> Result<LoadReport> {
    if ar.is_saving() {
        save_tagged(ctx, ar, ty, data, defaults)?;
    } else {
        load_tagged(ctx, ar, ty, data)?;
    }
    Ok(ctx.take_report())
}

/// Saves or loads every serializable field natively, in link order, with no
/// tags and no diffing.
pub fn serialize_bin(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    ty: TypeId,
    mut data: MemoryMut<'_>,
) -> Result<()> {
    let registry = ctx.registry;
    for &r in registry.get(ty).property_link() {
        let prop = registry.property(r);
        if !prop.should_serialize(ar, ctx.env) {
            continue;
        }
        for idx in 0..prop.array_dim {
            let offset = prop.offset + idx * prop.element_size;
            serialize_item(ctx, ar, prop, data.at(offset), None)?;
        }
    }
    Ok(())
}

fn save_tagged(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    ty: TypeId,
    mut data: MemoryMut<'_>,
    defaults: Option<Memory<'_>>,
) -> Result<()> {
    let registry = ctx.registry;
    let def = registry.get(ty);
    let atomic = def.flags().contains(StructFlags::ATOMIC);
    // Structs without defaults have nothing to diff against.
    let write_all = atomic || (def.kind() != TypeKind::Class && defaults.is_none());

    for &r in def.property_link() {
        let prop = registry.property(r);
        if !prop.should_serialize(ar, ctx.env) {
            continue;
        }

        for idx in 0..prop.array_dim {
            let offset = prop.offset + idx * prop.element_size;
            let default = defaults
                .filter(|d| offset + prop.element_size <= d.bytes.len())
                .map(|d| d.at(offset));
            if !write_all && identical(registry, prop, data.view().at(offset), default) {
                continue;
            }

            let mut tag = PropertyTag::for_property(registry, prop, idx, data.view().at(offset));
            let placeholder = tag.serialize(ar)?;
            let start = ar.tell();
            let nested_defaults = if atomic { None } else { default };
            serialize_tagged_value(ctx, ar, prop, data.at(offset), nested_defaults, &tag)?;
            let size = (ar.tell() - start) as i32;
            if let Some(placeholder) = placeholder {
                ar.commit(placeholder, size)?;
            }
        }
    }

    PropertyTag::terminator().serialize(ar)?;
    Ok(())
}

enum Outcome {
    Read,
    Converted(&'static str),
    Skipped(SkipReason),
}

fn load_tagged(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    ty: TypeId,
    mut data: MemoryMut<'_>,
) -> Result<()> {
    let registry = ctx.registry;
    let env = ctx.env;
    let def = registry.get(ty);
    let link = def.property_link();
    let dim_at = |cursor: Option<usize>| cursor.map_or(0, |c| registry.property(link[c]).array_dim as isize);

    let mut cursor = if link.is_empty() { None } else { Some(0) };
    let mut remaining = dim_at(cursor);
    let mut advance = false;

    loop {
        let mut tag = PropertyTag::terminator();
        tag.serialize(ar)?;
        if tag.is_terminator() {
            break;
        }
        if tag.size < 0 {
            return Err(ReflectError::TagSize {
                field: tag.name.to_string(),
                size: tag.size,
            });
        }

        if advance {
            remaining -= 1;
            if remaining <= 0 {
                cursor = cursor.and_then(|c| {
                    (c + 1..link.len()).find(|&i| registry.property(link[i]).should_serialize(&*ar, env))
                });
                advance = false;
                remaining = dim_at(cursor);
            }
        }

        if cursor.is_none_or(|c| registry.property(link[c]).name != tag.name) {
            let matches = |i: &usize| registry.property(link[*i]).name == tag.name;
            cursor = match cursor {
                Some(c) => (c..link.len()).find(matches).or_else(|| (0..c).find(matches)),
                None => (0..link.len()).find(matches),
            };
            remaining = dim_at(cursor);
        }

        let prop = cursor.map(|c| registry.property(link[c]));
        let start = ar.tell();
        let size = tag.size as usize;
        let outer_end = ctx.value_end.replace(start + size);
        let outcome = load_value(ctx, ar, def.name(), prop, &tag, &mut data);
        ctx.value_end = outer_end;
        let outcome = outcome?;

        match outcome {
            Outcome::Read | Outcome::Converted(_) => {
                advance = true;
                let consumed = ar.tell() - start;
                if consumed != size {
                    tracing::warn!(
                        field = %tag.name,
                        ty = %def.name(),
                        consumed,
                        size,
                        "value size differs from its tag"
                    );
                    ar.seek(start + size)?;
                }
                if let Outcome::Converted(to) = outcome {
                    ctx.report.conversions.push(Conversion {
                        owner: def.name().clone(),
                        field: tag.name.clone(),
                        from: tag.type_name.clone(),
                        to,
                    });
                }
            }
            Outcome::Skipped(reason) => {
                advance = false;
                if reason == SkipReason::BuildExcluded {
                    tracing::debug!(field = %tag.name, ty = %tag.type_name, size, "skipping property");
                } else {
                    tracing::warn!(field = %tag.name, ty = %tag.type_name, size, "skipping property");
                }
                ar.skip(size)?;
                ctx.report.skips.push(Skip {
                    owner: def.name().clone(),
                    field: tag.name.clone(),
                    type_name: tag.type_name.clone(),
                    array_index: tag.array_index,
                    size: tag.size,
                    reason,
                });
            }
        }
    }
    Ok(())
}

/// Applies one tag's payload to its property, or decides to skip it.
fn load_value(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    owner: &Name,
    prop: Option<&PropertyDescriptor>,
    tag: &PropertyTag,
    data: &mut MemoryMut<'_>,
) -> Result<Outcome> {
    let registry = ctx.registry;
    let env = ctx.env;

    let Some(prop) = prop else {
        tracing::warn!(field = %tag.name, ty = %owner, "property not found");
        return Ok(Outcome::Skipped(SkipReason::UnknownField));
    };
    if prop.is_editor_only() && !env.loads_editor_only() {
        return Ok(Outcome::Skipped(SkipReason::BuildExcluded));
    }
    if prop.flags.contains(PropertyFlags::NOT_FOR_CONSOLE) && env.console {
        return Ok(Outcome::Skipped(SkipReason::BuildExcluded));
    }
    if tag.array_index < 0 || tag.array_index as usize >= prop.array_dim {
        tracing::warn!(
            field = %tag.name,
            ty = %owner,
            index = tag.array_index,
            dim = prop.array_dim,
            "array index out of bounds"
        );
        return Ok(Outcome::Skipped(SkipReason::ArrayIndexOutOfRange));
    }

    let offset = prop.offset + tag.array_index as usize * prop.element_size;
    let mut value = data.at(offset);
    let stored = tag.type_name.as_str();

    if stored == STR_PROPERTY && matches!(prop.kind, PropertyKind::Name) {
        let mut text = String::new();
        ar.xfer_string(&mut text)?;
        let handle = value.heap.store_name(read_u32_le(value.bytes, 0), Name::new(&text));
        write_u32_le(value.bytes, 0, handle);
        return Ok(Outcome::Converted(prop.kind.type_name()));
    }
    if stored == BYTE_PROPERTY && matches!(prop.kind, PropertyKind::Int) {
        let byte = read_legacy_byte(registry, ar, tag)?;
        write_u32_le(value.bytes, 0, byte as u32);
        return Ok(Outcome::Converted(prop.kind.type_name()));
    }
    if stored != prop.kind.type_name() {
        tracing::warn!(
            field = %tag.name,
            ty = %owner,
            stored,
            declared = prop.kind.type_name(),
            "type mismatch"
        );
        return Ok(Outcome::Skipped(SkipReason::DeclaredTypeMismatch));
    }
    if let PropertyKind::Struct { struct_type } = prop.kind {
        let expected = registry.get(struct_type).name();
        if tag.struct_name() != Some(expected) {
            tracing::warn!(
                field = %tag.name,
                ty = %owner,
                stored = ?tag.struct_name(),
                declared = %expected,
                "struct type mismatch"
            );
            return Ok(Outcome::Skipped(SkipReason::StructIdentityMismatch));
        }
    }
    if !prop.should_serialize(ar, env) {
        tracing::warn!(field = %tag.name, ty = %owner, "property is not serializable");
        return Ok(Outcome::Skipped(SkipReason::NotSerializable));
    }
    if let PropertyKind::Byte { enum_def } = prop.kind
        && tag.enum_name().is_none() != enum_def.is_none()
        && ar.version().at_least(FormatVersion::BYTE_ENUM_TAG)
    {
        value.bytes[0] = read_legacy_byte(registry, ar, tag)?;
        return Ok(Outcome::Converted(prop.kind.type_name()));
    }

    serialize_tagged_value(ctx, ar, prop, value, None, tag)?;
    Ok(Outcome::Read)
}

/// Reads a byte stored under an older declaration: raw, or as an entry of
/// the enum the tag names.
fn read_legacy_byte(registry: &TypeRegistry, ar: &mut dyn Archive, tag: &PropertyTag) -> Result<u8> {
    let enum_name = tag.enum_name();
    if enum_name.is_none() {
        let mut byte = 0u8;
        ar.xfer_u8(&mut byte)?;
        return Ok(byte);
    }

    let mut entry = Name::NONE;
    ar.xfer_name(&mut entry)?;
    match registry.find_enum(&enum_name) {
        Some(id) => Ok(registry.enum_def(id).byte_of(&entry)),
        None => {
            tracing::warn!(field = %tag.name, enum_name = %enum_name, "enum not found while converting");
            Ok(0)
        }
    }
}

/// Bools live in the tag itself; everything else follows it.
fn serialize_tagged_value(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    prop: &PropertyDescriptor,
    value: MemoryMut<'_>,
    defaults: Option<Memory<'_>>,
    tag: &PropertyTag,
) -> Result<()> {
    if prop.kind.is_bool() {
        if ar.is_loading() {
            set_bool(value.bytes, prop.bit_mask, tag.bool_value());
        }
        return Ok(());
    }
    serialize_item(ctx, ar, prop, value, defaults)
}

/// Transfers one element of `prop` in its native encoding.
pub(crate) fn serialize_item(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    prop: &PropertyDescriptor,
    mut value: MemoryMut<'_>,
    defaults: Option<Memory<'_>>,
) -> Result<()> {
    let registry = ctx.registry;
    match &prop.kind {
        PropertyKind::Byte { enum_def: None } => ar.xfer_u8(&mut value.bytes[0])?,
        PropertyKind::Byte {
            enum_def: Some(enum_def),
        } => {
            let def = registry.enum_def(*enum_def);
            let mut entry = def.name_of(value.bytes[0] as usize);
            ar.xfer_name(&mut entry)?;
            if ar.is_loading() {
                value.bytes[0] = def.byte_of(&entry);
            }
        }
        PropertyKind::Int | PropertyKind::Float => {
            let mut raw = read_u32_le(value.bytes, 0);
            ar.xfer_u32(&mut raw)?;
            write_u32_le(value.bytes, 0, raw);
        }
        PropertyKind::Bool => {
            let mut raw = (read_u32_le(value.bytes, 0) & prop.bit_mask != 0) as u8;
            ar.xfer_u8(&mut raw)?;
            set_bool(value.bytes, prop.bit_mask, raw != 0);
        }
        PropertyKind::Name => {
            let handle = read_u32_le(value.bytes, 0);
            let mut name = value.heap.name(handle);
            ar.xfer_name(&mut name)?;
            if ar.is_loading() {
                let handle = value.heap.store_name(handle, name);
                write_u32_le(value.bytes, 0, handle);
            }
        }
        PropertyKind::Str => {
            let handle = read_u32_le(value.bytes, 0);
            let mut text = value.heap.str(handle).to_owned();
            ar.xfer_string(&mut text)?;
            if ar.is_loading() {
                let handle = value.heap.store_str(handle, text);
                write_u32_le(value.bytes, 0, handle);
            }
        }
        PropertyKind::Object => {
            let mut object = ObjectHandle(read_u64_le(value.bytes, 0));
            serialize_object(ar, &mut object, ctx.pass, &mut *ctx.objects)?;
            write_u64_le(value.bytes, 0, object.0);
        }
        PropertyKind::Struct { struct_type } => {
            if registry.get(*struct_type).flags().contains(StructFlags::IMMUTABLE) {
                serialize_bin(ctx, ar, *struct_type, value)?;
            } else if ar.is_saving() {
                save_tagged(ctx, ar, *struct_type, value, defaults)?;
            } else {
                load_tagged(ctx, ar, *struct_type, value)?;
            }
        }
        PropertyKind::Array { inner } => {
            let handle = read_u32_le(value.bytes, 0);
            let mut array = value.heap.take_array(handle);
            let mut count = array.len as i32;
            ar.xfer_i32(&mut count)?;
            if ar.is_loading() {
                // Every element takes at least one byte of the tag's payload.
                let room = ctx.value_end.map(|end| end.saturating_sub(ar.tell()));
                let fits = usize::try_from(count).is_ok_and(|n| room.is_none_or(|room| n <= room));
                if !fits {
                    let handle = value.heap.store_array(handle, array);
                    write_u32_le(value.bytes, 0, handle);
                    return Err(ReflectError::ArrayLength {
                        field: prop.name.to_string(),
                        count,
                    });
                }
                release_elements(registry, inner, &array, value.heap);
                array = HeapArray::zeroed(count as usize, inner.element_size);
            }

            let result = serialize_elements(ctx, ar, inner, &mut array, value.heap);
            let handle = value.heap.store_array(handle, array);
            write_u32_le(value.bytes, 0, handle);
            result?;
        }
    }
    Ok(())
}

/// Returns the heap slots owned by the elements of `array` to the heap.
fn release_elements(registry: &TypeRegistry, inner: &PropertyDescriptor, array: &HeapArray, heap: &mut Heap) {
    for i in 0..array.len {
        release_handles(registry, inner, &array.bytes[i * inner.element_size..], heap);
    }
}

fn release_handles(registry: &TypeRegistry, prop: &PropertyDescriptor, bytes: &[u8], heap: &mut Heap) {
    for i in 0..prop.array_dim {
        let at = i * prop.element_size;
        match &prop.kind {
            PropertyKind::Str | PropertyKind::Name => heap.release(read_u32_le(bytes, at)),
            PropertyKind::Array { inner } => {
                let handle = read_u32_le(bytes, at);
                let array = heap.take_array(handle);
                release_elements(registry, inner, &array, heap);
                heap.release(handle);
            }
            PropertyKind::Struct { struct_type } => {
                for &id in registry.get(*struct_type).property_link() {
                    let field = registry.property(id);
                    release_handles(registry, field, &bytes[at + field.offset..], heap);
                }
            }
            _ => {}
        }
    }
}

fn serialize_elements(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    inner: &PropertyDescriptor,
    array: &mut HeapArray,
    heap: &mut Heap,
) -> Result<()> {
    let size = inner.element_size;
    for i in 0..array.len {
        let element = MemoryMut::new(&mut array.bytes[i * size..], &mut *heap);
        serialize_item(ctx, ar, inner, element, None)?;
    }
    Ok(())
}
