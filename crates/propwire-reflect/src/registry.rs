//! Type and enum definitions and the registry that owns them.

use indexmap::IndexMap;
use propwire_bytecode::BytecodeBuffer;
use propwire_core::Name;

use crate::error::{ReflectError, Result};
use crate::flags::StructFlags;
use crate::instance::{Instance, Memory, MemoryMut};
use crate::property::PropertyDescriptor;
use crate::value::{Value, read_value, write_value};

/// Dense handle to a registered type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Dense handle to a registered enum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EnumId(u32);

impl EnumId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Class,
    Struct,
    /// Parameter list of a script function.
    Function,
}

impl TypeKind {
    /// Consecutive bools share one 32-bit word.
    #[inline]
    pub fn merges_bools(self) -> bool {
        !matches!(self, Self::Function)
    }
}

/// Points at one property: the declaring type and its declaration index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PropertyRef {
    pub owner: TypeId,
    pub index: usize,
}

/// A reflected type: its own properties, layout and derived property chains.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub(crate) name: Name,
    pub(crate) kind: TypeKind,
    pub(crate) super_type: Option<TypeId>,
    pub(crate) properties: Vec<PropertyDescriptor>,
    pub(crate) struct_flags: StructFlags,
    pub(crate) properties_size: usize,
    pub(crate) min_alignment: usize,
    pub(crate) linked: bool,
    pub(crate) property_link: Vec<PropertyRef>,
    pub(crate) ref_link: Vec<PropertyRef>,
    pub(crate) ctor_link: Vec<PropertyRef>,
    pub(crate) net_link: Vec<PropertyRef>,
    pub(crate) defaults: Option<Instance>,
    pub(crate) script: BytecodeBuffer,
}

impl TypeDef {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: Name::new(name),
            kind,
            super_type: None,
            properties: Vec::new(),
            struct_flags: StructFlags::NONE,
            properties_size: 0,
            min_alignment: 1,
            linked: false,
            property_link: Vec::new(),
            ref_link: Vec::new(),
            ctor_link: Vec::new(),
            net_link: Vec::new(),
            defaults: None,
            script: BytecodeBuffer::new(),
        }
    }

    pub fn class(name: &str) -> Self {
        Self::new(name, TypeKind::Class)
    }

    pub fn structure(name: &str) -> Self {
        Self::new(name, TypeKind::Struct)
    }

    pub fn function(name: &str) -> Self {
        Self::new(name, TypeKind::Function)
    }

    pub fn extends(mut self, super_type: TypeId) -> Self {
        self.super_type = Some(super_type);
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn struct_flags(mut self, flags: StructFlags) -> Self {
        self.struct_flags = flags;
        self
    }

    pub fn with_script(mut self, script: BytecodeBuffer) -> Self {
        self.script = script;
        self
    }

    /// Appends a property after linking; the type must be linked again.
    pub fn add_property(&mut self, property: PropertyDescriptor) {
        self.properties.push(property);
        self.linked = false;
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    #[inline]
    pub fn super_type(&self) -> Option<TypeId> {
        self.super_type
    }

    /// Own properties in declaration order.
    #[inline]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    #[inline]
    pub fn flags(&self) -> StructFlags {
        self.struct_flags
    }

    /// Bytes used by the laid out properties, own and inherited.
    #[inline]
    pub fn properties_size(&self) -> usize {
        self.properties_size
    }

    #[inline]
    pub fn min_alignment(&self) -> usize {
        self.min_alignment
    }

    /// Size of one element when embedded as a struct value.
    #[inline]
    pub fn aligned_size(&self) -> usize {
        self.properties_size.next_multiple_of(self.min_alignment.max(1))
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Every property, own first, then inherited.
    #[inline]
    pub fn property_link(&self) -> &[PropertyRef] {
        &self.property_link
    }

    /// Properties whose values hold object references.
    #[inline]
    pub fn ref_link(&self) -> &[PropertyRef] {
        &self.ref_link
    }

    /// Properties whose values own heap storage.
    #[inline]
    pub fn ctor_link(&self) -> &[PropertyRef] {
        &self.ctor_link
    }

    /// Replicated properties.
    #[inline]
    pub fn net_link(&self) -> &[PropertyRef] {
        &self.net_link
    }

    #[inline]
    pub fn script(&self) -> &BytecodeBuffer {
        &self.script
    }
}

/// A named enumeration. The last entry is always the synthetic `<Name>_MAX`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    name: Name,
    entries: Vec<Name>,
}

impl EnumDef {
    pub fn new<'e>(name: &str, entries: impl IntoIterator<Item = &'e str>) -> Self {
        let mut def = Self {
            name: Name::new(name),
            entries: Vec::new(),
        };
        def.set_entries(entries.into_iter().map(Name::new));
        def
    }

    /// Replaces the entries, appending a fresh `_MAX` entry.
    pub fn set_entries(&mut self, entries: impl IntoIterator<Item = Name>) {
        self.entries = entries.into_iter().collect();
        let max = format!("{}_MAX", self.name);
        self.entries.push(Name::new(&max));
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn entries(&self) -> &[Name] {
        &self.entries
    }

    /// Entry count, `_MAX` included.
    #[inline]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Index of the `_MAX` entry.
    #[inline]
    pub fn max_index(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn find(&self, entry: &Name) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }

    pub fn entry(&self, index: usize) -> Option<&Name> {
        self.entries.get(index)
    }

    /// Ordinal for a stored entry name. Unknown names land on `_MAX`.
    pub fn index_of(&self, entry: &Name) -> usize {
        self.find(entry).unwrap_or(self.max_index())
    }

    /// Byte stored for `entry`; indices past `u8::MAX` saturate.
    pub fn byte_of(&self, entry: &Name) -> u8 {
        u8::try_from(self.index_of(entry)).unwrap_or(u8::MAX)
    }

    /// Entry name stored for `value`; `_MAX` and beyond store `None`.
    pub fn name_of(&self, value: usize) -> Name {
        if value < self.max_index() {
            self.entries[value].clone()
        } else {
            Name::NONE
        }
    }
}

/// Owns every type and enum by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    pub(crate) types: IndexMap<Name, TypeDef>,
    pub(crate) enums: IndexMap<Name, EnumDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, replacing any type of the same name in place.
    pub fn add_type(&mut self, def: TypeDef) -> TypeId {
        let (index, _) = self.types.insert_full(def.name.clone(), def);
        TypeId(index as u32)
    }

    pub fn add_enum(&mut self, def: EnumDef) -> EnumId {
        let (index, _) = self.enums.insert_full(def.name.clone(), def);
        EnumId(index as u32)
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeDef {
        self.ensure_type(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeDef {
        self.ensure_type_mut(id)
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types
            .get_index_of(&Name::new(name))
            .map(|i| TypeId(i as u32))
    }

    pub fn find_enum(&self, name: &Name) -> Option<EnumId> {
        self.enums.get_index_of(name).map(|i| EnumId(i as u32))
    }

    #[inline]
    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        self.ensure_enum(id)
    }

    pub fn enum_def_mut(&mut self, name: &Name) -> Option<&mut EnumDef> {
        self.enums.get_mut(name)
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types
            .values()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    #[inline]
    pub fn property(&self, r: PropertyRef) -> &PropertyDescriptor {
        &self.get(r.owner).properties[r.index]
    }

    /// Looks `name` up along the type's property chain, own properties first.
    pub fn find_field(&self, id: TypeId, name: &Name) -> Option<PropertyRef> {
        self.get(id)
            .property_link
            .iter()
            .copied()
            .find(|&r| self.property(r).name == *name)
    }

    pub fn set_defaults(&mut self, id: TypeId, defaults: Instance) {
        self.get_mut(id).defaults = Some(defaults);
    }

    /// Registered default instance used for diffed saves.
    pub fn default_instance(&self, id: TypeId) -> Option<&Instance> {
        self.get(id).defaults.as_ref()
    }

    /// Zeroed instance sized to the type's layout.
    pub fn new_instance(&self, id: TypeId) -> Instance {
        Instance::zeroed(id, self.get(id).properties_size)
    }

    /// Instance initialized from the registered defaults.
    ///
    /// Plain bytes are copied; values owning heap storage are copied into the
    /// new instance's own heap through the constructor chain.
    pub fn instantiate(&self, id: TypeId) -> Result<Instance> {
        let mut instance = self.new_instance(id);
        let Some(defaults) = self.default_instance(id) else {
            return Ok(instance);
        };

        let shared = defaults.len().min(instance.len());
        let mut memory = instance.memory_mut();
        memory.bytes[..shared].copy_from_slice(&defaults.bytes()[..shared]);

        for &r in &self.get(id).ctor_link {
            let prop = self.property(r);
            for idx in 0..prop.array_dim {
                let offset = prop.offset + idx * prop.element_size;
                if offset + prop.element_size > shared {
                    continue;
                }
                let value = read_value(self, prop, defaults.memory().at(offset));
                memory.bytes[offset..offset + prop.element_size].fill(0);
                write_value(self, prop, memory.at(offset), &value)?;
            }
        }
        Ok(instance)
    }

    /// Zeroed instance of `id` carrying the super type's default values.
    pub fn inherit_defaults(&self, id: TypeId) -> Result<Instance> {
        let mut instance = self.new_instance(id);
        let Some(sup) = self.get(id).super_type else {
            return Ok(instance);
        };
        let Some(source) = self.default_instance(sup) else {
            return Ok(instance);
        };

        let mut memory = instance.memory_mut();
        for &r in &self.get(sup).property_link {
            let prop = self.property(r);
            for idx in 0..prop.array_dim {
                let offset = prop.offset + idx * prop.element_size;
                if offset + prop.element_size > source.len() {
                    continue;
                }
                let value = read_value(self, prop, source.memory().at(offset));
                write_value(self, prop, memory.at(offset), &value)?;
            }
        }
        Ok(instance)
    }

    fn field(&self, instance_type: TypeId, field: &str, index: usize) -> Result<&PropertyDescriptor> {
        let r = self
            .find_field(instance_type, &Name::new(field))
            .ok_or_else(|| ReflectError::UnknownField {
                ty: self.get(instance_type).name.to_string(),
                field: field.to_owned(),
            })?;
        let prop = self.property(r);
        if index >= prop.array_dim {
            return Err(ReflectError::ArrayIndex {
                field: field.to_owned(),
                index,
                dim: prop.array_dim,
            });
        }
        Ok(prop)
    }

    /// Reads element `index` of `field`.
    pub fn get_value(&self, instance: &Instance, field: &str, index: usize) -> Result<Value> {
        let prop = self.field(instance.type_id(), field, index)?;
        let memory: Memory<'_> = instance.memory();
        Ok(read_value(
            self,
            prop,
            memory.at(prop.offset + index * prop.element_size),
        ))
    }

    /// Writes element `index` of `field`.
    pub fn set_value(
        &self,
        instance: &mut Instance,
        field: &str,
        index: usize,
        value: &Value,
    ) -> Result<()> {
        let prop = self.field(instance.type_id(), field, index)?;
        let mut memory: MemoryMut<'_> = instance.memory_mut();
        write_value(
            self,
            prop,
            memory.at(prop.offset + index * prop.element_size),
            value,
        )
    }
}
