//! In-memory script storage.
//!
//! Operands are stored little-endian at fixed in-memory widths:
//! names as a 4-byte [`NameIndex`], object references as an 8-byte handle,
//! skip distances as `u16`. The on-disk form can be shorter or longer, which
//! is why a script record carries both sizes.

use propwire_core::{Name, NameIndex, NameTable, ObjectHandle};

use crate::token::{ExprToken, Token};

/// In-memory width of a name operand.
pub const NAME_SIZE: usize = 4;

/// In-memory width of an object reference operand.
pub const OBJECT_SIZE: usize = 8;

/// Skip value that marks the default case of a switch.
pub const CASE_DEFAULT: u16 = 0xFFFF;

#[inline]
pub(crate) fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
pub(crate) fn read_u64_le(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// Compiled code of one function or state, with the names it refers to.
#[derive(Debug, Clone, Default)]
pub struct BytecodeBuffer {
    pub(crate) code: Vec<u8>,
    pub(crate) names: NameTable,
}

impl BytecodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(code: Vec<u8>, names: NameTable) -> Self {
        Self { code, names }
    }

    /// In-memory size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[inline]
    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Discard contents and make room for `size` bytes of incoming code.
    pub fn reset(&mut self, size: usize) {
        self.code.clear();
        self.code.resize(size, 0);
        self.names = NameTable::new();
    }

    /// The name stored at `offset`, if the handle is valid.
    pub fn name_at(&self, offset: usize) -> Option<&Name> {
        let raw = read_u32_le(&self.code, offset);
        self.names.try_resolve(NameIndex::from_raw(raw))
    }

    pub fn object_at(&self, offset: usize) -> ObjectHandle {
        ObjectHandle(read_u64_le(&self.code, offset))
    }

    pub fn skip_at(&self, offset: usize) -> u16 {
        read_u16_le(&self.code, offset)
    }
}

/// Hand assembler for in-memory code.
///
/// Emits tokens and operands in in-memory form, the way the script compiler
/// would leave them.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    code: Vec<u8>,
    names: NameTable,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current emit offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn token(&mut self, token: ExprToken) -> &mut Self {
        self.code.push(token.to_byte());
        self
    }

    /// Emits a native call opcode, one or two bytes depending on the index.
    ///
    /// # Panics
    /// Panics if the index does not fit the extended encoding.
    pub fn native(&mut self, index: u16) -> &mut Self {
        let Some((bytes, len)) = Token::native_bytes(index) else {
            panic!("native index {index} out of range");
        };
        self.code.extend_from_slice(&bytes[..len]);
        self
    }

    pub fn byte(&mut self, v: u8) -> &mut Self {
        self.code.push(v);
        self
    }

    pub fn word(&mut self, v: u16) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn skip(&mut self, v: u16) -> &mut Self {
        self.word(v)
    }

    pub fn dword(&mut self, v: u32) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn int(&mut self, v: i32) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn float(&mut self, v: f32) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn name(&mut self, text: &str) -> &mut Self {
        let index = self.names.intern(&Name::new(text));
        self.dword(index.as_u32())
    }

    pub fn object(&mut self, object: ObjectHandle) -> &mut Self {
        self.code.extend_from_slice(&object.0.to_le_bytes());
        self
    }

    /// NUL-terminated single-byte string.
    pub fn cstr(&mut self, text: &str) -> &mut Self {
        self.code.extend_from_slice(text.as_bytes());
        self.code.push(0);
        self
    }

    /// NUL-terminated UTF-16 string.
    pub fn wstr(&mut self, text: &str) -> &mut Self {
        for unit in text.encode_utf16() {
            self.code.extend_from_slice(&unit.to_le_bytes());
        }
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// Overwrite a previously emitted skip distance.
    pub fn patch_skip(&mut self, at: usize, v: u16) -> &mut Self {
        self.code[at..at + 2].copy_from_slice(&v.to_le_bytes());
        self
    }

    pub fn build(&self) -> BytecodeBuffer {
        BytecodeBuffer {
            code: self.code.clone(),
            names: self.names.clone(),
        }
    }
}
