//! Names and name interning.
//!
//! A [`Name`] identifies fields, types and enum entries. The `None` name is
//! the empty sentinel that terminates tagged sections and label tables.
//!
//! [`NameTable`] converts names into dense [`NameIndex`] handles so that
//! compiled bytecode can store a name in four bytes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A field, type or enum entry name. Cloning is a reference count bump.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Name(Option<Arc<str>>);

impl Name {
    /// The empty sentinel.
    pub const NONE: Self = Self(None);

    /// Creates a name. Empty text and `"None"` both yield [`Name::NONE`].
    pub fn new(text: &str) -> Self {
        if text.is_empty() || text == "None" {
            return Self::NONE;
        }
        Self(Some(Arc::from(text)))
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("None")
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense handle to a name inside a [`NameTable`].
///
/// Index 0 is always [`Name::NONE`], so zeroed memory decodes as the sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NameIndex(u32);

impl NameIndex {
    pub const NONE: Self = Self(0);

    /// Raw index for serialization/debugging.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Create from a raw index. Use only when decoding stored handles.
    #[inline]
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }
}

/// Name interner. Deduplicates names and hands out [`NameIndex`] handles.
#[derive(Debug, Clone)]
pub struct NameTable {
    map: HashMap<Name, NameIndex>,
    names: Vec<Name>,
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTable {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(Name::NONE, NameIndex::NONE);
        Self {
            map,
            names: vec![Name::NONE],
        }
    }

    /// Intern a name, returning the existing handle if already present.
    pub fn intern(&mut self, name: &Name) -> NameIndex {
        if let Some(&index) = self.map.get(name) {
            return index;
        }

        let index = NameIndex(self.names.len() as u32);
        self.names.push(name.clone());
        self.map.insert(name.clone(), index);
        index
    }

    /// Resolve a handle back to its name.
    ///
    /// # Panics
    /// Panics if the handle was not created by this table.
    #[inline]
    pub fn resolve(&self, index: NameIndex) -> &Name {
        &self.names[index.0 as usize]
    }

    #[inline]
    pub fn try_resolve(&self, index: NameIndex) -> Option<&Name> {
        self.names.get(index.0 as usize)
    }

    /// Number of names, counting the `None` sentinel.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether only the sentinel is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.len() == 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (NameIndex, &Name)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (NameIndex(i as u32), n))
    }
}
