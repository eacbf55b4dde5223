//! Bidirectional expression transcoder.
//!
//! [`Transcoder::transcode`] walks one expression: an opcode byte, then the
//! operand layout that opcode selects, recursing into sub-expressions. The
//! walk is identical for every [`Direction`]; only the scalar transfer
//! primitives look at the direction:
//! - `Load`: bytes come from the archive and land in the buffer
//! - `Save`: bytes come from the buffer and go to the archive
//! - `Walk`: nothing moves, the buffer is only visited
//!
//! Names and object references are the operands whose archive form differs
//! from their in-memory form; everything else is copied verbatim.

use std::fmt;

use propwire_core::{Archive, Name, ObjectHandle, ObjectMap, PassMode, serialize_object};

use crate::buffer::{
    BytecodeBuffer, CASE_DEFAULT, NAME_SIZE, OBJECT_SIZE, read_u16_le, read_u32_le,
};
use crate::error::{BytecodeError, Result};
use crate::token::{EXTENDED_NATIVE, ExprToken, FIRST_NATIVE, Token};

/// Maximum in-memory bytes a label table may span.
pub const LABEL_TABLE_SCAN_LIMIT: usize = 0x1_0000;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Load,
    Save,
    Walk,
}

/// One decoded operand, reported to a [`Visitor`].
#[derive(Clone, PartialEq, Debug)]
pub enum Operand {
    Byte(u8),
    Word(u16),
    Dword(u32),
    Skip(u16),
    Int(i32),
    Float(f32),
    Name(Name),
    Object(ObjectHandle),
    Text(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(v) => write!(f, "0x{v:02x}"),
            Self::Word(v) => write!(f, "{v}"),
            Self::Dword(v) => write!(f, "{v}"),
            Self::Skip(v) => write!(f, "skip={v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Name(n) => write!(f, "'{n}'"),
            Self::Object(o) => write!(f, "obj:{:#x}", o.0),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Observes a transcoding pass. Operands are reported after they transfer,
/// so a loading pass sees decoded values.
pub trait Visitor {
    fn enter(&mut self, _offset: usize, _token: Token) {}
    fn operand(&mut self, _operand: &Operand) {}
    fn leave(&mut self, _token: Token) {}
}

enum Channel<'a> {
    Load {
        buffer: &'a mut BytecodeBuffer,
        ar: &'a mut dyn Archive,
        pass: PassMode,
        objects: &'a mut dyn ObjectMap,
    },
    Save {
        buffer: &'a BytecodeBuffer,
        ar: &'a mut dyn Archive,
        pass: PassMode,
        objects: &'a mut dyn ObjectMap,
    },
    Walk {
        buffer: &'a BytecodeBuffer,
        filter_editor_only: bool,
    },
}

/// Cursor over one script in one direction.
pub struct Transcoder<'a> {
    channel: Channel<'a>,
    pos: usize,
    expected: usize,
    visitor: Option<&'a mut dyn Visitor>,
}

impl<'a> Transcoder<'a> {
    /// Loads into `buffer`, whose current length is the declared in-memory size.
    pub fn load(
        buffer: &'a mut BytecodeBuffer,
        ar: &'a mut dyn Archive,
        pass: PassMode,
        objects: &'a mut dyn ObjectMap,
    ) -> Self {
        let expected = buffer.len();
        Self {
            channel: Channel::Load {
                buffer,
                ar,
                pass,
                objects,
            },
            pos: 0,
            expected,
            visitor: None,
        }
    }

    pub fn save(
        buffer: &'a BytecodeBuffer,
        ar: &'a mut dyn Archive,
        pass: PassMode,
        objects: &'a mut dyn ObjectMap,
    ) -> Self {
        Self {
            channel: Channel::Save {
                buffer,
                ar,
                pass,
                objects,
            },
            pos: 0,
            expected: buffer.len(),
            visitor: None,
        }
    }

    pub fn walk(buffer: &'a BytecodeBuffer) -> Self {
        Self {
            channel: Channel::Walk {
                buffer,
                filter_editor_only: false,
            },
            pos: 0,
            expected: buffer.len(),
            visitor: None,
        }
    }

    /// Jump over editor-only regions instead of visiting them. Walk passes only.
    pub fn filter_editor_only(mut self, on: bool) -> Self {
        if let Channel::Walk {
            filter_editor_only, ..
        } = &mut self.channel
        {
            *filter_editor_only = on;
        }
        self
    }

    pub fn with_visitor(mut self, visitor: &'a mut dyn Visitor) -> Self {
        self.visitor = Some(visitor);
        self
    }

    pub fn direction(&self) -> Direction {
        match self.channel {
            Channel::Load { .. } => Direction::Load,
            Channel::Save { .. } => Direction::Save,
            Channel::Walk { .. } => Direction::Walk,
        }
    }

    /// In-memory cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Transcodes expressions until the declared size is reached, then checks
    /// that the cursor landed exactly on it.
    pub fn transcode_all(&mut self) -> Result<()> {
        while self.pos < self.expected {
            self.transcode()?;
        }
        if self.pos != self.expected {
            return Err(BytecodeError::ByteCountMismatch {
                got: self.pos,
                expected: self.expected,
            });
        }
        Ok(())
    }

    /// Transcodes one expression and returns its token.
    pub fn transcode(&mut self) -> Result<Token> {
        let offset = self.pos;
        let op = self.raw_u8()?;

        let token = if op >= FIRST_NATIVE {
            Token::Native(op as u16)
        } else if op >= EXTENDED_NATIVE {
            let low = self.raw_u8()?;
            Token::Native((((op - EXTENDED_NATIVE) as u16) << 8) | low as u16)
        } else {
            match ExprToken::from_u8(op) {
                Some(expr) => Token::Expr(expr),
                None => return Err(BytecodeError::FormatCorruption { opcode: op, offset }),
            }
        };

        if let Some(visitor) = self.visitor.as_deref_mut() {
            visitor.enter(offset, token);
        }

        match token {
            Token::Native(_) => self.arguments()?,
            Token::Expr(expr) => self.operands(expr)?,
        }

        if let Some(visitor) = self.visitor.as_deref_mut() {
            visitor.leave(token);
        }
        Ok(token)
    }

    fn operands(&mut self, expr: ExprToken) -> Result<()> {
        use ExprToken as T;

        match expr {
            T::LocalVariable
            | T::InstanceVariable
            | T::DefaultVariable
            | T::StateVariable
            | T::LocalOutVariable
            | T::NativeParm
            | T::EatReturnValue
            | T::ReturnNothing
            | T::ObjectConst => {
                self.object()?;
            }
            T::Return | T::BoolVariable | T::InterfaceContext | T::GotoLabel | T::DynArrayLength => {
                self.expr()?;
            }
            T::Let
            | T::LetBool
            | T::LetDelegate
            | T::ArrayElement
            | T::DynArrayElement
            | T::DynArrayAdd => {
                self.expr()?;
                self.expr()?;
            }
            T::DynArrayInsert | T::DynArrayRemove => {
                self.expr()?;
                self.expr()?;
                self.expr()?;
            }
            T::New => {
                for _ in 0..4 {
                    self.expr()?;
                }
            }
            T::Jump => {
                self.skip()?;
            }
            T::JumpIfNot | T::Skip => {
                self.skip()?;
                self.expr()?;
            }
            T::JumpIfFilterEditorOnly => self.editor_only_jump()?,
            T::Assert => {
                self.word()?;
                self.byte()?;
                self.expr()?;
            }
            T::Switch => {
                self.object()?;
                self.byte()?;
                self.expr()?;
            }
            T::Case => {
                if self.skip()? != CASE_DEFAULT {
                    self.expr()?;
                }
            }
            T::Iterator => {
                self.expr()?;
                self.skip()?;
            }
            T::DynArrayIterator => {
                self.expr()?;
                self.expr()?;
                self.byte()?;
                self.expr()?;
                self.skip()?;
            }
            T::LabelTable => self.label_table()?,
            T::MetaCast | T::DynamicCast | T::InterfaceCast => {
                self.object()?;
                self.expr()?;
            }
            T::PrimitiveCast => {
                self.byte()?;
                self.expr()?;
            }
            T::StructCmpEq | T::StructCmpNe => {
                self.object()?;
                self.expr()?;
                self.expr()?;
            }
            T::StructMember => {
                self.object()?;
                self.object()?;
                self.byte()?;
                self.byte()?;
                self.expr()?;
            }
            T::DynArrayFind | T::DynArrayAddItem | T::DynArrayRemoveItem | T::DynArraySort => {
                self.expr()?;
                self.skip()?;
                self.expr()?;
            }
            T::DynArrayFindStruct | T::DynArrayInsertItem => {
                self.expr()?;
                self.skip()?;
                self.expr()?;
                self.expr()?;
            }
            T::Context | T::ClassContext => {
                self.expr()?;
                self.skip()?;
                self.object()?;
                self.byte()?;
                self.expr()?;
            }
            T::Conditional => {
                self.expr()?;
                self.skip()?;
                self.expr()?;
                self.skip()?;
                self.expr()?;
            }
            T::DefaultParmValue => {
                self.skip()?;
                while self.transcode()? != Token::END_PARM_VALUE {}
            }
            T::IntConst => {
                self.int()?;
            }
            T::FloatConst => {
                self.float()?;
            }
            T::StringConst => self.ansi_string()?,
            T::UnicodeStringConst => self.wide_string()?,
            T::NameConst | T::InstanceDelegate => {
                self.name()?;
            }
            T::RotationConst => {
                self.int()?;
                self.int()?;
                self.int()?;
            }
            T::VectorConst => {
                self.float()?;
                self.float()?;
                self.float()?;
            }
            T::ByteConst | T::IntConstByte => {
                self.byte()?;
            }
            T::DebugInfo => {
                self.int()?;
                self.int()?;
                self.int()?;
                self.byte()?;
            }
            T::VirtualFunction | T::GlobalFunction => {
                self.name()?;
                self.arguments()?;
            }
            T::FinalFunction => {
                self.object()?;
                self.arguments()?;
            }
            T::DelegateFunction => {
                self.byte()?;
                self.object()?;
                self.name()?;
                self.arguments()?;
            }
            T::DelegateProperty => {
                self.name()?;
                self.object()?;
            }
            T::EqualEqualDelDel
            | T::NotEqualDelDel
            | T::EqualEqualDelFunc
            | T::NotEqualDelFunc => self.arguments()?,
            T::Stop
            | T::Nothing
            | T::EndParmValue
            | T::EndFunctionParms
            | T::SelfObject
            | T::IntZero
            | T::IntOne
            | T::True
            | T::False
            | T::NoObject
            | T::IteratorPop
            | T::IteratorNext
            | T::EmptyDelegate
            | T::EmptyParmValue
            | T::EndOfScript => {}
        }
        Ok(())
    }

    #[inline]
    fn expr(&mut self) -> Result<Token> {
        self.transcode()
    }

    /// Arguments up to the closing token, then an optional debug record.
    fn arguments(&mut self) -> Result<()> {
        while self.transcode()? != Token::END_FUNCTION_PARMS {}
        self.optional_debug_info()
    }

    fn optional_debug_info(&mut self) -> Result<()> {
        if self.pos >= self.expected {
            return Ok(());
        }
        if self.peek_u8()? == ExprToken::DebugInfo.to_byte() {
            self.transcode()?;
        }
        Ok(())
    }

    /// `(name, u32 offset)` entries closed by a `None`-named entry.
    fn label_table(&mut self) -> Result<()> {
        self.scan_until(LABEL_TABLE_SCAN_LIMIT, |t| {
            let name = t.name()?;
            t.dword()?;
            Ok(name.is_none())
        })
    }

    /// Repeats `step` until it reports completion, failing once the cursor has
    /// moved more than `limit` bytes.
    fn scan_until(
        &mut self,
        limit: usize,
        mut step: impl FnMut(&mut Self) -> Result<bool>,
    ) -> Result<()> {
        let offset = self.pos;
        loop {
            if self.pos - offset > limit {
                return Err(BytecodeError::LabelTableOverrun { offset, limit });
            }
            if step(self)? {
                return Ok(());
            }
        }
    }

    fn editor_only_jump(&mut self) -> Result<()> {
        let target = self.skip()? as usize;
        if let Channel::Walk {
            filter_editor_only: true,
            ..
        } = self.channel
        {
            let len = self.expected;
            if target < self.pos || target > len {
                return Err(BytecodeError::JumpOutOfRange { target, len });
            }
            self.pos = target;
        }
        Ok(())
    }

    // Transfer primitives. These are the only direction-aware code.

    fn buffer(&self) -> &BytecodeBuffer {
        match &self.channel {
            Channel::Load { buffer, .. } => buffer,
            Channel::Save { buffer, .. } | Channel::Walk { buffer, .. } => buffer,
        }
    }

    /// Makes room for `wanted` bytes at the cursor and returns its offset.
    ///
    /// Loading grows the buffer so an overlong record is caught by the final
    /// size check; the other directions treat running off the end as truncation.
    fn claim(&mut self, wanted: usize) -> Result<usize> {
        let offset = self.pos;
        let end = offset + wanted;
        let len = self.buffer().len();
        if let Channel::Load { buffer, .. } = &mut self.channel {
            if end > len {
                buffer.code.resize(end, 0);
            }
        } else if end > len {
            return Err(BytecodeError::Truncated {
                offset,
                wanted,
                len,
            });
        }
        Ok(offset)
    }

    /// Moves `len` (at most 8) bytes verbatim and returns their offset.
    fn xfer_raw(&mut self, len: usize) -> Result<usize> {
        debug_assert!(len <= 8);
        let start = self.claim(len)?;
        let end = start + len;
        match &mut self.channel {
            Channel::Load { buffer, ar, .. } => ar.serialize(&mut buffer.code[start..end])?,
            Channel::Save { buffer, ar, .. } => {
                let mut scratch = [0u8; 8];
                let bytes = &mut scratch[..len];
                bytes.copy_from_slice(&buffer.code[start..end]);
                ar.serialize(bytes)?;
            }
            Channel::Walk { .. } => {}
        }
        self.pos = end;
        Ok(start)
    }

    fn peek_u8(&mut self) -> Result<u8> {
        let pos = self.pos;
        if let Channel::Load { ar, .. } = &mut self.channel {
            let resume = ar.tell();
            let mut v = 0u8;
            ar.xfer_u8(&mut v)?;
            ar.seek(resume)?;
            return Ok(v);
        }
        Ok(self.buffer().code[pos])
    }

    fn report(&mut self, operand: Operand) {
        if let Some(visitor) = self.visitor.as_deref_mut() {
            visitor.operand(&operand);
        }
    }

    fn raw_u8(&mut self) -> Result<u8> {
        let at = self.xfer_raw(1)?;
        Ok(self.buffer().code[at])
    }

    fn byte(&mut self) -> Result<u8> {
        let v = self.raw_u8()?;
        self.report(Operand::Byte(v));
        Ok(v)
    }

    fn raw_u16(&mut self) -> Result<u16> {
        let at = self.xfer_raw(2)?;
        Ok(read_u16_le(&self.buffer().code, at))
    }

    fn word(&mut self) -> Result<u16> {
        let v = self.raw_u16()?;
        self.report(Operand::Word(v));
        Ok(v)
    }

    fn skip(&mut self) -> Result<u16> {
        let v = self.raw_u16()?;
        self.report(Operand::Skip(v));
        Ok(v)
    }

    fn dword(&mut self) -> Result<u32> {
        let at = self.xfer_raw(4)?;
        let v = read_u32_le(&self.buffer().code, at);
        self.report(Operand::Dword(v));
        Ok(v)
    }

    fn int(&mut self) -> Result<i32> {
        let at = self.xfer_raw(4)?;
        let v = read_u32_le(&self.buffer().code, at) as i32;
        self.report(Operand::Int(v));
        Ok(v)
    }

    fn float(&mut self) -> Result<f32> {
        let at = self.xfer_raw(4)?;
        let v = f32::from_bits(read_u32_le(&self.buffer().code, at));
        self.report(Operand::Float(v));
        Ok(v)
    }

    fn name(&mut self) -> Result<Name> {
        let start = self.claim(NAME_SIZE)?;
        match &mut self.channel {
            Channel::Load { buffer, ar, .. } => {
                let mut name = Name::NONE;
                ar.xfer_name(&mut name)?;
                let index = buffer.names.intern(&name);
                buffer.code[start..start + NAME_SIZE].copy_from_slice(&index.as_u32().to_le_bytes());
            }
            Channel::Save { buffer, ar, .. } => {
                let mut name = resolve_name(buffer, start)?;
                ar.xfer_name(&mut name)?;
            }
            Channel::Walk { .. } => {}
        }
        self.pos = start + NAME_SIZE;

        let name = resolve_name(self.buffer(), start)?;
        self.report(Operand::Name(name.clone()));
        Ok(name)
    }

    fn object(&mut self) -> Result<ObjectHandle> {
        let start = self.claim(OBJECT_SIZE)?;
        match &mut self.channel {
            Channel::Load {
                buffer,
                ar,
                pass,
                objects,
            } => {
                let mut object = ObjectHandle::NULL;
                serialize_object(&mut **ar, &mut object, *pass, &mut **objects)?;
                buffer.code[start..start + OBJECT_SIZE].copy_from_slice(&object.0.to_le_bytes());
            }
            Channel::Save {
                buffer,
                ar,
                pass,
                objects,
            } => {
                let mut object = buffer.object_at(start);
                serialize_object(&mut **ar, &mut object, *pass, &mut **objects)?;
            }
            Channel::Walk { .. } => {}
        }
        self.pos = start + OBJECT_SIZE;

        let object = self.buffer().object_at(start);
        self.report(Operand::Object(object));
        Ok(object)
    }

    /// NUL-terminated single-byte string, moved one byte at a time.
    fn ansi_string(&mut self) -> Result<()> {
        let start = self.pos;
        while self.raw_u8()? != 0 {}
        if self.visitor.is_some() {
            let bytes = &self.buffer().code[start..self.pos - 1];
            let text = String::from_utf8_lossy(bytes).into_owned();
            self.report(Operand::Text(text));
        }
        Ok(())
    }

    /// NUL-terminated UTF-16 string, moved one unit at a time.
    fn wide_string(&mut self) -> Result<()> {
        let mut units = Vec::new();
        loop {
            let unit = self.raw_u16()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        if self.visitor.is_some() {
            self.report(Operand::Text(String::from_utf16_lossy(&units)));
        }
        Ok(())
    }
}

fn resolve_name(buffer: &BytecodeBuffer, offset: usize) -> Result<Name> {
    buffer
        .name_at(offset)
        .cloned()
        .ok_or_else(|| BytecodeError::InvalidName {
            offset,
            index: read_u32_le(&buffer.code, offset),
        })
}
