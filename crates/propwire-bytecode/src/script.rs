//! Script records.
//!
//! Wire layout: `i32` in-memory size, `i32` on-disk size (from
//! [`FormatVersion::SCRIPT_STORAGE_SIZE`]), then the transcoded code. The
//! on-disk size is back-patched once the code has been written.

use propwire_core::{Archive, BytecodePatch, FormatVersion, ObjectHandle, ObjectMap, PassMode, PatchedArchive};

use crate::buffer::BytecodeBuffer;
use crate::error::{BytecodeError, Result};
use crate::token::Token;
use crate::transcode::{Operand, Transcoder, Visitor};

/// Per-record settings for [`serialize_script`].
pub struct ScriptContext<'a> {
    pub pass: PassMode,
    pub objects: &'a mut dyn ObjectMap,
    /// Replacement code for this record. Ignored when saving.
    pub patch: Option<&'a BytecodePatch>,
    /// Skip editor-only regions during reference collection.
    pub filter_editor_only: bool,
}

impl<'a> ScriptContext<'a> {
    pub fn new(objects: &'a mut dyn ObjectMap) -> Self {
        Self {
            pass: PassMode::InMemory,
            objects,
            patch: None,
            filter_editor_only: false,
        }
    }

    pub fn pass(mut self, pass: PassMode) -> Self {
        self.pass = pass;
        self
    }

    pub fn patch(mut self, patch: Option<&'a BytecodePatch>) -> Self {
        self.patch = patch;
        self
    }

    pub fn filter_editor_only(mut self, on: bool) -> Self {
        self.filter_editor_only = on;
        self
    }
}

/// What a script record pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    /// In-memory size of the code now in the buffer.
    pub bytecode_size: usize,
    /// On-disk size of the record's code, when known.
    pub storage_size: Option<usize>,
    pub patched: bool,
    /// Objects the loaded code refers to. Empty after a save.
    pub references: Vec<ObjectHandle>,
}

/// Saves or loads one script record.
pub fn serialize_script(
    buffer: &mut BytecodeBuffer,
    ar: &mut dyn Archive,
    ctx: ScriptContext<'_>,
) -> Result<ScriptSummary> {
    if ar.is_saving() {
        save_script(buffer, ar, ctx)
    } else {
        load_script(buffer, ar, ctx)
    }
}

fn save_script(
    buffer: &BytecodeBuffer,
    ar: &mut dyn Archive,
    ctx: ScriptContext<'_>,
) -> Result<ScriptSummary> {
    let mut bytecode_size = buffer.len() as i32;
    ar.xfer_i32(&mut bytecode_size)?;

    let with_storage = ar.version().at_least(FormatVersion::SCRIPT_STORAGE_SIZE);
    let slot = if with_storage { Some(ar.reserve()?) } else { None };
    let start = ar.tell();

    Transcoder::save(buffer, ar, ctx.pass, ctx.objects).transcode_all()?;

    let storage_size = ar.tell() - start;
    if let Some(slot) = slot {
        ar.commit(slot, storage_size as i32)?;
    }
    tracing::trace!(bytecode_size, storage_size, "saved script");

    Ok(ScriptSummary {
        bytecode_size: buffer.len(),
        storage_size: Some(storage_size),
        patched: false,
        references: Vec::new(),
    })
}

fn load_script(
    buffer: &mut BytecodeBuffer,
    ar: &mut dyn Archive,
    ctx: ScriptContext<'_>,
) -> Result<ScriptSummary> {
    let mut bytecode_size = 0i32;
    ar.xfer_i32(&mut bytecode_size)?;
    if bytecode_size < 0 {
        return Err(BytecodeError::InvalidSize(bytecode_size));
    }

    let mut storage_size = None;
    if ar.version().at_least(FormatVersion::SCRIPT_STORAGE_SIZE) {
        let mut size = 0i32;
        ar.xfer_i32(&mut size)?;
        if size < 0 {
            return Err(BytecodeError::InvalidSize(size));
        }
        storage_size = Some(size as usize);
    }

    let patched = ctx.patch.is_some();
    match ctx.patch {
        Some(patch) => {
            let replaced = match storage_size {
                Some(size) => size,
                None => {
                    // Without a stored size the original code has to be walked to be passed over.
                    let mut discard = BytecodeBuffer::new();
                    discard.reset(bytecode_size as usize);
                    Transcoder::load(&mut discard, &mut *ar, ctx.pass, &mut *ctx.objects)
                        .transcode_all()?;
                    0
                }
            };

            tracing::debug!(
                bytecode_size = patch.bytecode_size,
                replaced,
                "loading patched script"
            );
            let mut overlay = PatchedArchive::new(ar, &patch.data, replaced)?;
            buffer.reset(patch.bytecode_size as usize);
            Transcoder::load(buffer, &mut overlay, ctx.pass, ctx.objects).transcode_all()?;
        }
        None => {
            buffer.reset(bytecode_size as usize);
            Transcoder::load(buffer, ar, ctx.pass, ctx.objects).transcode_all()?;
        }
    }

    let references = collect_references(buffer, ctx.filter_editor_only)?;
    tracing::trace!(
        bytecode_size = buffer.len(),
        references = references.len(),
        patched,
        "loaded script"
    );

    Ok(ScriptSummary {
        bytecode_size: buffer.len(),
        storage_size,
        patched,
        references,
    })
}

#[derive(Default)]
struct ReferenceCollector {
    references: Vec<ObjectHandle>,
}

impl Visitor for ReferenceCollector {
    fn operand(&mut self, operand: &Operand) {
        if let Operand::Object(object) = operand
            && !object.is_null()
            && !self.references.contains(object)
        {
            self.references.push(*object);
        }
    }
}

/// Every distinct non-null object the code refers to, in first-use order.
///
/// With `filter_editor_only`, regions guarded by an editor-only jump are
/// passed over.
pub fn collect_references(buffer: &BytecodeBuffer, filter_editor_only: bool) -> Result<Vec<ObjectHandle>> {
    let mut collector = ReferenceCollector::default();
    Transcoder::walk(buffer)
        .filter_editor_only(filter_editor_only)
        .with_visitor(&mut collector)
        .transcode_all()?;
    Ok(collector.references)
}

/// Top-level tokens of a script, in order.
pub fn top_level_tokens(buffer: &BytecodeBuffer) -> Result<Vec<Token>> {
    let mut walker = Transcoder::walk(buffer);
    let mut tokens = Vec::new();
    while walker.position() < buffer.len() {
        tokens.push(walker.transcode()?);
    }
    Ok(tokens)
}
