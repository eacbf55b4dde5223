//! Property and struct capability flags.

use std::ops::{BitOr, BitOrAssign};

/// Per-property capability bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    pub const NONE: Self = Self(0);
    /// Not written to or read from persistent archives.
    pub const TRANSIENT: Self = Self(1 << 0);
    /// Only present in builds carrying editor data.
    pub const EDITOR_ONLY: Self = Self(1 << 1);
    /// Dropped on stripped console platforms.
    pub const NOT_FOR_CONSOLE: Self = Self(1 << 2);
    /// Still loaded, never saved.
    pub const DEPRECATED: Self = Self(1 << 3);
    /// Replicated.
    pub const NET: Self = Self(1 << 4);
    /// Value owns heap storage and must be constructed.
    pub const NEED_CTOR_LINK: Self = Self(1 << 5);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PropertyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Struct serialization switches.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct StructFlags(u32);

impl StructFlags {
    pub const NONE: Self = Self(0);
    /// Every field is written whenever the struct is written.
    pub const ATOMIC: Self = Self(1 << 0);
    /// Fields are written natively in link order, without tags.
    pub const IMMUTABLE: Self = Self(1 << 1);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StructFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
