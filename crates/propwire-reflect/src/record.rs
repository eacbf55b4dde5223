//! Type records: a type's script followed by its defaults section.
//!
//! The defaults are saved diffed against the super type's defaults, so only
//! values a type overrides are stored. Loading starts from the super type's
//! defaults for the same reason.

use std::mem;

use propwire_bytecode::{ScriptContext, ScriptSummary, serialize_script};
use propwire_core::{Archive, ObjectMap, PassMode, PatchTable};

use crate::env::Environment;
use crate::error::Result;
use crate::patch::load_patched_defaults;
use crate::registry::{TypeId, TypeRegistry};
use crate::report::LoadReport;
use crate::walker::{SerializeContext, serialize_tagged};

/// Per-record settings for [`serialize_type_record`].
pub struct RecordContext<'a> {
    pub env: &'a Environment,
    pub pass: PassMode,
    pub objects: &'a mut dyn ObjectMap,
    /// Consulted on load only.
    pub patches: Option<&'a PatchTable>,
}

impl<'a> RecordContext<'a> {
    pub fn new(env: &'a Environment, objects: &'a mut dyn ObjectMap) -> Self {
        Self {
            env,
            pass: PassMode::InMemory,
            objects,
            patches: None,
        }
    }

    pub fn pass(mut self, pass: PassMode) -> Self {
        self.pass = pass;
        self
    }

    pub fn patches(mut self, patches: &'a PatchTable) -> Self {
        self.patches = Some(patches);
        self
    }
}

/// What a type record pass produced.
#[derive(Debug, Clone, Default)]
pub struct RecordSummary {
    pub script: ScriptSummary,
    pub defaults_patched: bool,
    /// Anomalies in the defaults section. Empty after a save.
    pub report: LoadReport,
}

/// Saves or loads the script and defaults of `id`.
pub fn serialize_type_record(
    registry: &mut TypeRegistry,
    id: TypeId,
    ar: &mut dyn Archive,
    mut ctx: RecordContext<'_>,
) -> Result<RecordSummary> {
    let path = registry.get(id).name().to_string();
    let loading = ar.is_loading();
    let patches = ctx.patches.filter(|_| loading);

    let mut script = mem::take(&mut registry.get_mut(id).script);
    let script_ctx = ScriptContext::new(&mut *ctx.objects)
        .pass(ctx.pass)
        .patch(patches.and_then(|p| p.bytecode(&path)))
        .filter_editor_only(ctx.env.filter_editor_only);
    let script_summary = serialize_script(&mut script, ar, script_ctx);
    registry.get_mut(id).script = script;
    let script_summary = script_summary?;

    let defaults_patch = patches.and_then(|p| p.defaults(&path));
    let registry_view: &TypeRegistry = registry;
    let mut walker = SerializeContext::new(registry_view, ctx.env, &mut *ctx.objects).pass(ctx.pass);

    if !loading {
        let mut defaults = registry_view
            .default_instance(id)
            .cloned()
            .unwrap_or_else(|| registry_view.new_instance(id));
        let super_defaults = registry_view
            .get(id)
            .super_type()
            .and_then(|s| registry_view.default_instance(s))
            .map(|d| d.memory());
        serialize_tagged(&mut walker, ar, id, defaults.memory_mut(), super_defaults)?;
        return Ok(RecordSummary {
            script: script_summary,
            defaults_patched: false,
            report: LoadReport::new(),
        });
    }

    let mut defaults = registry_view.inherit_defaults(id)?;
    let report = match defaults_patch {
        Some(patch) => load_patched_defaults(&mut walker, ar, id, patch, &mut defaults)?,
        None => serialize_tagged(&mut walker, ar, id, defaults.memory_mut(), None)?,
    };
    registry.set_defaults(id, defaults);

    Ok(RecordSummary {
        script: script_summary,
        defaults_patched: defaults_patch.is_some(),
        report,
    })
}
