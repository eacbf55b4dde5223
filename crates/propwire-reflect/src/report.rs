//! What a tagged load skipped or converted.

use std::fmt;

use propwire_core::Name;

/// Why a stored value was skipped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SkipReason {
    /// No property of that name on the type.
    UnknownField,
    /// Stored array index outside the property's dimension.
    ArrayIndexOutOfRange,
    /// Stored type differs and no conversion applies.
    DeclaredTypeMismatch,
    /// Stored struct type differs from the property's struct type.
    StructIdentityMismatch,
    /// The property does not travel through this archive.
    NotSerializable,
    /// The property does not exist in this build or on this platform.
    BuildExcluded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UnknownField => "unknown field",
            Self::ArrayIndexOutOfRange => "array index out of range",
            Self::DeclaredTypeMismatch => "type mismatch",
            Self::StructIdentityMismatch => "struct type mismatch",
            Self::NotSerializable => "not serializable",
            Self::BuildExcluded => "excluded from build",
        };
        f.write_str(text)
    }
}

/// One skipped tag.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Skip {
    /// Type whose section held the tag.
    pub owner: Name,
    pub field: Name,
    pub type_name: Name,
    pub array_index: i32,
    /// Payload bytes passed over.
    pub size: i32,
    pub reason: SkipReason,
}

/// One value read through a type conversion.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Conversion {
    pub owner: Name,
    pub field: Name,
    pub from: Name,
    pub to: &'static str,
}

/// Anomalies collected during one tagged load.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LoadReport {
    pub skips: Vec<Skip>,
    pub conversions: Vec<Conversion>,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing was skipped or converted.
    pub fn is_clean(&self) -> bool {
        self.skips.is_empty() && self.conversions.is_empty()
    }

    pub fn count(&self, reason: SkipReason) -> usize {
        self.skips.iter().filter(|s| s.reason == reason).count()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.skips {
            writeln!(
                f,
                "skip {}.{}[{}] {} ({} bytes): {}",
                s.owner, s.field, s.array_index, s.type_name, s.size, s.reason
            )?;
        }
        for c in &self.conversions {
            writeln!(f, "convert {}.{}: {} -> {}", c.owner, c.field, c.from, c.to)?;
        }
        Ok(())
    }
}
