//! Format version gates.

/// Monotonically increasing format version of an archive.
///
/// Every schema-evolution branch in the codecs compares against one of the
/// named gates below.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct FormatVersion(pub u32);

impl FormatVersion {
    /// Byte-property tags carry the name of their enum.
    pub const BYTE_ENUM_TAG: Self = Self(633);
    /// Script records store the on-disk size next to the in-memory size.
    pub const SCRIPT_STORAGE_SIZE: Self = Self(639);
    /// Bool tags store their value in one byte instead of four.
    pub const COMPACT_BOOL_TAG: Self = Self(673);
    /// Version written by this crate.
    pub const CURRENT: Self = Self(684);

    #[inline]
    pub fn at_least(self, gate: Self) -> bool {
        self >= gate
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}
