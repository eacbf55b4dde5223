//! The byte-stream collaborator both codecs run on.
//!
//! An [`Archive`] is direction-agnostic: every `xfer_*` helper reads into its
//! argument when loading and writes it out when saving, so a codec walks one
//! code path for both directions.

use std::ops::BitOr;

use crate::error::{Result, StreamError};
use crate::name::Name;
use crate::version::FormatVersion;

/// Upper bound on a serialized string, including its terminator.
pub const MAX_STRING_LEN: i32 = 1 << 20;

/// Behavioral switches carried by an archive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct ArchiveFlags(u32);

impl ArchiveFlags {
    pub const NONE: Self = Self(0);
    /// Targets durable storage; transient properties are not written or read.
    pub const PERSISTENT: Self = Self(1 << 0);
    /// Only enumerates object references, no bytes move.
    pub const REFERENCE_COLLECTOR: Self = Self(1 << 1);
    /// Editor-only regions are jumped over instead of visited.
    pub const FILTER_EDITOR_ONLY: Self = Self(1 << 2);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for ArchiveFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Stream position of a reserved `i32` size field.
///
/// Obtained from [`Archive::reserve`] and filled in by [`Archive::commit`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Placeholder(usize);

impl Placeholder {
    #[inline]
    pub fn position(self) -> usize {
        self.0
    }
}

/// A position-addressable byte stream.
///
/// Values are little-endian on the wire.
pub trait Archive {
    fn is_loading(&self) -> bool;
    fn version(&self) -> FormatVersion;
    fn flags(&self) -> ArchiveFlags;
    fn tell(&self) -> usize;
    fn seek(&mut self, pos: usize) -> Result<()>;

    /// Fills `bytes` from the stream when loading, writes them when saving.
    fn serialize(&mut self, bytes: &mut [u8]) -> Result<()>;

    #[inline]
    fn is_saving(&self) -> bool {
        !self.is_loading()
    }

    #[inline]
    fn is_persistent(&self) -> bool {
        self.flags().contains(ArchiveFlags::PERSISTENT)
    }

    /// Moves the cursor forward without interpreting the bytes.
    fn skip(&mut self, len: usize) -> Result<()> {
        let pos = self.tell() + len;
        self.seek(pos)
    }

    fn xfer_u8(&mut self, value: &mut u8) -> Result<()> {
        let mut buf = [*value];
        self.serialize(&mut buf)?;
        *value = buf[0];
        Ok(())
    }

    fn xfer_u16(&mut self, value: &mut u16) -> Result<()> {
        let mut buf = value.to_le_bytes();
        self.serialize(&mut buf)?;
        *value = u16::from_le_bytes(buf);
        Ok(())
    }

    fn xfer_i32(&mut self, value: &mut i32) -> Result<()> {
        let mut buf = value.to_le_bytes();
        self.serialize(&mut buf)?;
        *value = i32::from_le_bytes(buf);
        Ok(())
    }

    fn xfer_u32(&mut self, value: &mut u32) -> Result<()> {
        let mut buf = value.to_le_bytes();
        self.serialize(&mut buf)?;
        *value = u32::from_le_bytes(buf);
        Ok(())
    }

    fn xfer_f32(&mut self, value: &mut f32) -> Result<()> {
        let mut buf = value.to_le_bytes();
        self.serialize(&mut buf)?;
        *value = f32::from_le_bytes(buf);
        Ok(())
    }

    fn xfer_u64(&mut self, value: &mut u64) -> Result<()> {
        let mut buf = value.to_le_bytes();
        self.serialize(&mut buf)?;
        *value = u64::from_le_bytes(buf);
        Ok(())
    }

    /// Length-prefixed string: `i32` byte count including a trailing NUL,
    /// then the bytes. The empty string is a bare zero length.
    fn xfer_string(&mut self, value: &mut String) -> Result<()> {
        if self.is_saving() {
            if value.is_empty() {
                return self.xfer_i32(&mut 0);
            }
            let mut bytes = Vec::with_capacity(value.len() + 1);
            bytes.extend_from_slice(value.as_bytes());
            bytes.push(0);
            let mut len = bytes.len() as i32;
            self.xfer_i32(&mut len)?;
            return self.serialize(&mut bytes);
        }

        let offset = self.tell();
        let mut len = 0i32;
        self.xfer_i32(&mut len)?;
        if !(0..=MAX_STRING_LEN).contains(&len) {
            return Err(StreamError::StringLength { offset, len });
        }
        if len == 0 {
            value.clear();
            return Ok(());
        }

        let mut bytes = vec![0u8; len as usize];
        self.serialize(&mut bytes)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        *value = String::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8 { offset })?;
        Ok(())
    }

    /// Names travel as their text; the `None` sentinel is written as `"None"`.
    fn xfer_name(&mut self, value: &mut Name) -> Result<()> {
        let mut text = if self.is_saving() {
            value.as_str().to_owned()
        } else {
            String::new()
        };
        self.xfer_string(&mut text)?;
        if self.is_loading() {
            *value = Name::new(&text);
        }
        Ok(())
    }

    /// Reserves an `i32` size field at the current position.
    ///
    /// Saving writes a zero to be overwritten by [`commit`](Self::commit).
    /// Loading skips the field; read it with `xfer_i32` when its value matters.
    fn reserve(&mut self) -> Result<Placeholder> {
        let at = self.tell();
        self.xfer_i32(&mut 0)?;
        Ok(Placeholder(at))
    }

    /// Writes `value` into a reserved field and returns to the current position.
    fn commit(&mut self, placeholder: Placeholder, value: i32) -> Result<()> {
        let resume = self.tell();
        self.seek(placeholder.0)?;
        let mut value = value;
        self.xfer_i32(&mut value)?;
        self.seek(resume)
    }
}
