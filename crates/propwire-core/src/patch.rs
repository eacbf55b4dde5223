//! Patch overlay.
//!
//! A [`PatchTable`] carries corrected bytes for a small, explicitly listed set
//! of types and instances. During a load, [`PatchedArchive`] substitutes the
//! corrected bytes for the primary stream while the primary cursor moves past
//! the region the patch replaces.
//!
//! Serialized table layout: `u32` CRC32 of the payload, then the postcard payload.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::archive::{Archive, ArchiveFlags};
use crate::error::{Result, StreamError};
use crate::memory::MemoryReader;
use crate::version::FormatVersion;

/// Replacement script for one function or state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodePatch {
    /// In-memory size of the replacement code.
    pub bytecode_size: u32,
    /// Replacement code in on-disk form.
    pub data: Vec<u8>,
}

/// Replacement tagged-property section for one type's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsPatch {
    pub data: Vec<u8>,
}

/// Replacement entry list for one enum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumPatch {
    pub entries: Vec<String>,
}

/// Patches keyed by the path name of the patched type or instance.
///
/// Populated once before any load and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTable {
    bytecode: IndexMap<String, BytecodePatch>,
    defaults: IndexMap<String, DefaultsPatch>,
    enums: IndexMap<String, EnumPatch>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bytecode(&mut self, path: impl Into<String>, patch: BytecodePatch) {
        self.bytecode.insert(path.into(), patch);
    }

    pub fn insert_defaults(&mut self, path: impl Into<String>, patch: DefaultsPatch) {
        self.defaults.insert(path.into(), patch);
    }

    pub fn insert_enum(&mut self, path: impl Into<String>, patch: EnumPatch) {
        self.enums.insert(path.into(), patch);
    }

    #[inline]
    pub fn bytecode(&self, path: &str) -> Option<&BytecodePatch> {
        self.bytecode.get(path)
    }

    #[inline]
    pub fn defaults(&self, path: &str) -> Option<&DefaultsPatch> {
        self.defaults.get(path)
    }

    #[inline]
    pub fn enum_patch(&self, path: &str) -> Option<&EnumPatch> {
        self.enums.get(path)
    }

    pub fn enums(&self) -> impl Iterator<Item = (&str, &EnumPatch)> {
        self.enums.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty() && self.defaults.is_empty() && self.enums.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(self)?;
        let checksum = crc32fast::hash(&payload);

        let mut out = Vec::with_capacity(payload.len() + 4);
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some((head, payload)) = bytes.split_first_chunk::<4>() else {
            return Err(StreamError::PatchTooSmall(bytes.len()));
        };

        let stored = u32::from_le_bytes(*head);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(StreamError::PatchChecksum { stored, computed });
        }

        Ok(postcard::from_bytes(payload)?)
    }
}

/// Loading archive that reads from patch bytes in place of the primary stream.
///
/// Construction advances the primary cursor past the replaced region, so the
/// primary stream continues as though that region had been consumed.
pub struct PatchedArchive<'p, 'a> {
    patch: MemoryReader<'p>,
    primary: &'a mut dyn Archive,
}

impl<'p, 'a> PatchedArchive<'p, 'a> {
    pub fn new(primary: &'a mut dyn Archive, data: &'p [u8], replaced_len: usize) -> Result<Self> {
        if primary.is_saving() {
            return Err(StreamError::PatchWhileSaving);
        }

        let resume = primary.tell() + replaced_len;
        primary.seek(resume)?;
        tracing::debug!(
            patch_len = data.len(),
            replaced_len,
            resume,
            "reading from patch overlay"
        );

        let patch = MemoryReader::new(data)
            .with_version(primary.version())
            .with_flags(primary.flags());
        Ok(Self { patch, primary })
    }

    /// Cursor of the primary stream, already past the replaced region.
    #[inline]
    pub fn primary_position(&self) -> usize {
        self.primary.tell()
    }

    /// Patch bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.patch.remaining()
    }
}

impl Archive for PatchedArchive<'_, '_> {
    fn is_loading(&self) -> bool {
        true
    }

    fn version(&self) -> FormatVersion {
        self.primary.version()
    }

    fn flags(&self) -> ArchiveFlags {
        self.primary.flags()
    }

    fn tell(&self) -> usize {
        self.patch.tell()
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        self.patch.seek(pos)
    }

    fn serialize(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.patch.serialize(bytes)
    }
}
