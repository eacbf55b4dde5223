//! Instance memory.
//!
//! An instance is a flat byte block laid out by the linker plus a heap of
//! owned values. Strings, names and dynamic arrays store a 4-byte heap handle
//! in the block; handle 0 is the empty value, so zeroed memory is the default
//! value of every kind.

use std::mem;

use propwire_core::Name;

use crate::registry::TypeId;

#[inline]
pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u32_le(bytes: &mut [u8], offset: usize, v: u32) {
    bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
pub(crate) fn read_u64_le(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

#[inline]
pub(crate) fn write_u64_le(bytes: &mut [u8], offset: usize, v: u64) {
    bytes[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
}

/// Element storage of one dynamic array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeapArray {
    pub len: usize,
    pub bytes: Vec<u8>,
}

impl HeapArray {
    pub fn zeroed(len: usize, element_size: usize) -> Self {
        Self {
            len,
            bytes: vec![0; len * element_size],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Free,
    Str(String),
    Name(Name),
    Array(HeapArray),
}

/// Owned values referred to from instance memory.
///
/// Released handles are handed out again before the heap grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, handle: u32) -> Option<&Slot> {
        match handle {
            0 => None,
            h => self.slots.get(h as usize - 1),
        }
    }

    fn slot_mut(&mut self, handle: u32) -> Option<&mut Slot> {
        match handle {
            0 => None,
            h => self.slots.get_mut(h as usize - 1),
        }
    }

    fn push(&mut self, slot: Slot) -> u32 {
        if let Some(handle) = self.free.pop() {
            self.slots[handle as usize - 1] = slot;
            return handle;
        }
        self.slots.push(slot);
        self.slots.len() as u32
    }

    /// Number of released handles waiting for reuse.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Drops the value under `handle` and makes the handle reusable.
    pub(crate) fn release(&mut self, handle: u32) {
        match self.slot_mut(handle) {
            None | Some(Slot::Free) => {}
            Some(slot) => {
                *slot = Slot::Free;
                self.free.push(handle);
            }
        }
    }

    pub fn str(&self, handle: u32) -> &str {
        match self.slot(handle) {
            Some(Slot::Str(s)) => s,
            _ => "",
        }
    }

    pub fn name(&self, handle: u32) -> Name {
        match self.slot(handle) {
            Some(Slot::Name(n)) => n.clone(),
            _ => Name::NONE,
        }
    }

    pub fn array(&self, handle: u32) -> Option<&HeapArray> {
        match self.slot(handle) {
            Some(Slot::Array(a)) => Some(a),
            _ => None,
        }
    }

    /// Stores `value` under `handle`, or under a new handle when `handle`
    /// does not name a string. Returns the handle now holding the value.
    pub fn store_str(&mut self, handle: u32, value: String) -> u32 {
        if let Some(Slot::Str(s)) = self.slot_mut(handle) {
            *s = value;
            return handle;
        }
        self.push(Slot::Str(value))
    }

    pub fn store_name(&mut self, handle: u32, value: Name) -> u32 {
        if let Some(Slot::Name(n)) = self.slot_mut(handle) {
            *n = value;
            return handle;
        }
        self.push(Slot::Name(value))
    }

    pub fn store_array(&mut self, handle: u32, value: HeapArray) -> u32 {
        if let Some(Slot::Array(a)) = self.slot_mut(handle) {
            *a = value;
            return handle;
        }
        self.push(Slot::Array(value))
    }

    /// Moves an array out, leaving an empty one behind.
    pub(crate) fn take_array(&mut self, handle: u32) -> HeapArray {
        match self.slot_mut(handle) {
            Some(Slot::Array(a)) => mem::take(a),
            _ => HeapArray::default(),
        }
    }
}

/// Read view of a value: bytes starting at the value plus the owning heap.
#[derive(Debug, Clone, Copy)]
pub struct Memory<'a> {
    pub bytes: &'a [u8],
    pub heap: &'a Heap,
}

impl<'a> Memory<'a> {
    pub fn new(bytes: &'a [u8], heap: &'a Heap) -> Self {
        Self { bytes, heap }
    }

    /// View starting `offset` bytes further in.
    #[inline]
    pub fn at(self, offset: usize) -> Self {
        Self {
            bytes: &self.bytes[offset..],
            heap: self.heap,
        }
    }
}

/// Write view of a value.
#[derive(Debug)]
pub struct MemoryMut<'a> {
    pub bytes: &'a mut [u8],
    pub heap: &'a mut Heap,
}

impl<'a> MemoryMut<'a> {
    pub fn new(bytes: &'a mut [u8], heap: &'a mut Heap) -> Self {
        Self { bytes, heap }
    }

    #[inline]
    pub fn at(&mut self, offset: usize) -> MemoryMut<'_> {
        MemoryMut {
            bytes: &mut self.bytes[offset..],
            heap: &mut *self.heap,
        }
    }

    #[inline]
    pub fn view(&self) -> Memory<'_> {
        Memory {
            bytes: self.bytes,
            heap: self.heap,
        }
    }
}

/// A live value of some linked type.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_id: TypeId,
    bytes: Vec<u8>,
    heap: Heap,
}

impl Instance {
    /// Zeroed instance of `size` bytes.
    pub fn zeroed(type_id: TypeId, size: usize) -> Self {
        Self {
            type_id,
            bytes: vec![0; size],
            heap: Heap::new(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn memory(&self) -> Memory<'_> {
        Memory::new(&self.bytes, &self.heap)
    }

    pub fn memory_mut(&mut self) -> MemoryMut<'_> {
        MemoryMut::new(&mut self.bytes, &mut self.heap)
    }
}
