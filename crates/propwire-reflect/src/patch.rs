//! Applying patch table entries to reflected types.

use propwire_core::{Archive, DefaultsPatch, Name, PatchTable, PatchedArchive};

use crate::error::Result;
use crate::instance::Instance;
use crate::registry::{TypeId, TypeRegistry};
use crate::report::LoadReport;
use crate::walker::{SerializeContext, serialize_tagged};

/// Replaces the entries of every registered enum the table patches.
///
/// Returns how many enums were changed. Patches for unknown enums are ignored.
pub fn apply_enum_patches(registry: &mut TypeRegistry, patches: &PatchTable) -> usize {
    let mut applied = 0;
    for (path, patch) in patches.enums() {
        let Some(def) = registry.enum_def_mut(&Name::new(path)) else {
            tracing::debug!(path, "enum patch has no matching enum");
            continue;
        };
        def.set_entries(patch.entries.iter().map(|e| Name::new(e)));
        tracing::debug!(path, entries = def.count(), "patched enum");
        applied += 1;
    }
    applied
}

/// Loads a defaults section from `patch` in place of the stored one.
///
/// The stored section carries no length, so it is read into a scratch
/// instance to move the primary archive past it.
pub(crate) fn load_patched_defaults(
    ctx: &mut SerializeContext<'_>,
    ar: &mut dyn Archive,
    ty: TypeId,
    patch: &DefaultsPatch,
    instance: &mut Instance,
) -> Result<LoadReport> {
    let mut stored = ctx.registry.new_instance(ty);
    serialize_tagged(ctx, ar, ty, stored.memory_mut(), None)?;

    let mut overlay = PatchedArchive::new(ar, &patch.data, 0)?;
    serialize_tagged(ctx, &mut overlay, ty, instance.memory_mut(), None)
}
