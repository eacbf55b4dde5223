//! In-memory archives.

use crate::archive::{Archive, ArchiveFlags};
use crate::error::{Result, StreamError};
use crate::version::FormatVersion;

/// Loading archive over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct MemoryReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    version: FormatVersion,
    flags: ArchiveFlags,
}

impl<'a> MemoryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            version: FormatVersion::CURRENT,
            flags: ArchiveFlags::NONE,
        }
    }

    pub fn with_version(mut self, version: FormatVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_flags(mut self, flags: ArchiveFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes left after the cursor.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

impl Archive for MemoryReader<'_> {
    fn is_loading(&self) -> bool {
        true
    }

    fn version(&self) -> FormatVersion {
        self.version
    }

    fn flags(&self) -> ArchiveFlags {
        self.flags
    }

    fn tell(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.bytes.len() {
            return Err(StreamError::SeekOutOfRange {
                offset: pos,
                len: self.bytes.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn serialize(&mut self, bytes: &mut [u8]) -> Result<()> {
        let end = self.pos + bytes.len();
        let Some(src) = self.bytes.get(self.pos..end) else {
            return Err(StreamError::UnexpectedEof {
                offset: self.pos,
                wanted: bytes.len(),
                len: self.bytes.len(),
            });
        };
        bytes.copy_from_slice(src);
        self.pos = end;
        Ok(())
    }
}

/// Saving archive into an owned, growable buffer.
///
/// Seeking back and writing overwrites in place; the buffer only grows when
/// a write passes its current end.
#[derive(Debug, Clone)]
pub struct MemoryWriter {
    bytes: Vec<u8>,
    pos: usize,
    version: FormatVersion,
    flags: ArchiveFlags,
}

impl Default for MemoryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            pos: 0,
            version: FormatVersion::CURRENT,
            flags: ArchiveFlags::NONE,
        }
    }

    pub fn with_version(mut self, version: FormatVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_flags(mut self, flags: ArchiveFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Archive for MemoryWriter {
    fn is_loading(&self) -> bool {
        false
    }

    fn version(&self) -> FormatVersion {
        self.version
    }

    fn flags(&self) -> ArchiveFlags {
        self.flags
    }

    fn tell(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.bytes.len() {
            return Err(StreamError::SeekOutOfRange {
                offset: pos,
                len: self.bytes.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn serialize(&mut self, bytes: &mut [u8]) -> Result<()> {
        let end = self.pos + bytes.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}
