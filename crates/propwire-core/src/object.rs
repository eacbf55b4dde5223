//! Object references and their wire encoding.
//!
//! A reference is a live handle in memory. On the wire it is either the raw
//! handle (in-memory passes such as duplication) or a dense index assigned by
//! an [`ObjectMap`] (relocatable passes that are linked later).

use std::collections::HashMap;

use crate::archive::Archive;
use crate::error::{Result, StreamError};

/// Opaque handle to a live object. Zero is the null reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectHandle(pub u64);

impl ObjectHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Selects how references are encoded for one pass.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum PassMode {
    /// Raw 8-byte handles.
    #[default]
    InMemory,
    /// 4-byte indices into an [`ObjectMap`].
    Relocatable,
}

/// Wire form of one reference.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WireRef {
    Direct(ObjectHandle),
    Index(u32),
}

impl WireRef {
    pub fn encode(object: ObjectHandle, pass: PassMode, objects: &mut dyn ObjectMap) -> Self {
        match pass {
            PassMode::InMemory => Self::Direct(object),
            PassMode::Relocatable => Self::Index(objects.index_of(object)),
        }
    }

    pub fn resolve(self, objects: &dyn ObjectMap) -> Result<ObjectHandle> {
        match self {
            Self::Direct(object) => Ok(object),
            Self::Index(index) => objects
                .resolve(index)
                .ok_or(StreamError::MissingReference(index)),
        }
    }
}

/// Assigns relocatable indices to objects and resolves them back.
pub trait ObjectMap {
    /// Index for `object`, registering it on first use. Null maps to 0.
    fn index_of(&mut self, object: ObjectHandle) -> u32;

    fn resolve(&self, index: u32) -> Option<ObjectHandle>;
}

/// Insertion-ordered import table. Index `i + 1` names the `i`-th entry.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    objects: Vec<ObjectHandle>,
    map: HashMap<ObjectHandle, u32>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects(objects: impl IntoIterator<Item = ObjectHandle>) -> Self {
        let mut table = Self::new();
        for object in objects {
            table.index_of(object);
        }
        table
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.objects.iter().copied()
    }
}

impl ObjectMap for ObjectTable {
    fn index_of(&mut self, object: ObjectHandle) -> u32 {
        if object.is_null() {
            return 0;
        }
        if let Some(&index) = self.map.get(&object) {
            return index;
        }
        self.objects.push(object);
        let index = self.objects.len() as u32;
        self.map.insert(object, index);
        index
    }

    fn resolve(&self, index: u32) -> Option<ObjectHandle> {
        if index == 0 {
            return Some(ObjectHandle::NULL);
        }
        self.objects.get(index as usize - 1).copied()
    }
}

/// Transfers one object reference in the encoding `pass` selects.
pub fn serialize_object(
    ar: &mut dyn Archive,
    object: &mut ObjectHandle,
    pass: PassMode,
    objects: &mut dyn ObjectMap,
) -> Result<()> {
    if ar.is_saving() {
        return match WireRef::encode(*object, pass, objects) {
            WireRef::Direct(handle) => ar.xfer_u64(&mut { handle.0 }),
            WireRef::Index(index) => ar.xfer_u32(&mut { index }),
        };
    }

    let wire = match pass {
        PassMode::InMemory => {
            let mut raw = 0u64;
            ar.xfer_u64(&mut raw)?;
            WireRef::Direct(ObjectHandle(raw))
        }
        PassMode::Relocatable => {
            let mut index = 0u32;
            ar.xfer_u32(&mut index)?;
            WireRef::Index(index)
        }
    };
    *object = wire.resolve(objects)?;
    Ok(())
}
