//! Expression tokens.
//!
//! One opcode byte selects the operand layout that follows it:
//! - `0x00..=0x5F`: structured expressions ([`ExprToken`])
//! - `0x60..=0x6F`: extended native call, one more byte completes the index
//! - `0x70..=0xFF`: native call whose index is the opcode itself

/// First opcode of the extended native range.
pub const EXTENDED_NATIVE: u8 = 0x60;

/// First opcode that is a native call index on its own.
pub const FIRST_NATIVE: u8 = 0x70;

/// Highest native index the extended encoding can express.
pub const MAX_NATIVE_INDEX: u16 = 0x0FFF;

/// Structured expression opcodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ExprToken {
    LocalVariable = 0x00,
    InstanceVariable = 0x01,
    DefaultVariable = 0x02,
    StateVariable = 0x03,
    Return = 0x04,
    Switch = 0x05,
    Jump = 0x06,
    JumpIfNot = 0x07,
    Stop = 0x08,
    Assert = 0x09,
    Case = 0x0A,
    Nothing = 0x0B,
    LabelTable = 0x0C,
    GotoLabel = 0x0D,
    EatReturnValue = 0x0E,
    Let = 0x0F,
    DynArrayElement = 0x10,
    New = 0x11,
    ClassContext = 0x12,
    MetaCast = 0x13,
    LetBool = 0x14,
    EndParmValue = 0x15,
    EndFunctionParms = 0x16,
    SelfObject = 0x17,
    Skip = 0x18,
    Context = 0x19,
    ArrayElement = 0x1A,
    VirtualFunction = 0x1B,
    FinalFunction = 0x1C,
    IntConst = 0x1D,
    FloatConst = 0x1E,
    StringConst = 0x1F,
    ObjectConst = 0x20,
    NameConst = 0x21,
    RotationConst = 0x22,
    VectorConst = 0x23,
    ByteConst = 0x24,
    IntZero = 0x25,
    IntOne = 0x26,
    True = 0x27,
    False = 0x28,
    NativeParm = 0x29,
    NoObject = 0x2A,
    IntConstByte = 0x2C,
    BoolVariable = 0x2D,
    DynamicCast = 0x2E,
    Iterator = 0x2F,
    IteratorPop = 0x30,
    IteratorNext = 0x31,
    StructCmpEq = 0x32,
    StructCmpNe = 0x33,
    UnicodeStringConst = 0x34,
    StructMember = 0x35,
    DynArrayLength = 0x36,
    GlobalFunction = 0x37,
    PrimitiveCast = 0x38,
    DynArrayInsert = 0x39,
    ReturnNothing = 0x3A,
    EqualEqualDelDel = 0x3B,
    NotEqualDelDel = 0x3C,
    EqualEqualDelFunc = 0x3D,
    NotEqualDelFunc = 0x3E,
    EmptyDelegate = 0x3F,
    DynArrayRemove = 0x40,
    DebugInfo = 0x41,
    DelegateFunction = 0x42,
    DelegateProperty = 0x43,
    LetDelegate = 0x44,
    Conditional = 0x45,
    DynArrayFind = 0x46,
    DynArrayFindStruct = 0x47,
    LocalOutVariable = 0x48,
    DefaultParmValue = 0x49,
    EmptyParmValue = 0x4A,
    InstanceDelegate = 0x4B,
    InterfaceContext = 0x51,
    InterfaceCast = 0x52,
    EndOfScript = 0x53,
    DynArrayAdd = 0x54,
    DynArrayAddItem = 0x55,
    DynArrayRemoveItem = 0x56,
    DynArrayInsertItem = 0x57,
    DynArrayIterator = 0x58,
    DynArraySort = 0x59,
    JumpIfFilterEditorOnly = 0x5A,
}

impl ExprToken {
    /// Every structured token, in opcode order.
    pub const ALL: [Self; 85] = [
        Self::LocalVariable,
        Self::InstanceVariable,
        Self::DefaultVariable,
        Self::StateVariable,
        Self::Return,
        Self::Switch,
        Self::Jump,
        Self::JumpIfNot,
        Self::Stop,
        Self::Assert,
        Self::Case,
        Self::Nothing,
        Self::LabelTable,
        Self::GotoLabel,
        Self::EatReturnValue,
        Self::Let,
        Self::DynArrayElement,
        Self::New,
        Self::ClassContext,
        Self::MetaCast,
        Self::LetBool,
        Self::EndParmValue,
        Self::EndFunctionParms,
        Self::SelfObject,
        Self::Skip,
        Self::Context,
        Self::ArrayElement,
        Self::VirtualFunction,
        Self::FinalFunction,
        Self::IntConst,
        Self::FloatConst,
        Self::StringConst,
        Self::ObjectConst,
        Self::NameConst,
        Self::RotationConst,
        Self::VectorConst,
        Self::ByteConst,
        Self::IntZero,
        Self::IntOne,
        Self::True,
        Self::False,
        Self::NativeParm,
        Self::NoObject,
        Self::IntConstByte,
        Self::BoolVariable,
        Self::DynamicCast,
        Self::Iterator,
        Self::IteratorPop,
        Self::IteratorNext,
        Self::StructCmpEq,
        Self::StructCmpNe,
        Self::UnicodeStringConst,
        Self::StructMember,
        Self::DynArrayLength,
        Self::GlobalFunction,
        Self::PrimitiveCast,
        Self::DynArrayInsert,
        Self::ReturnNothing,
        Self::EqualEqualDelDel,
        Self::NotEqualDelDel,
        Self::EqualEqualDelFunc,
        Self::NotEqualDelFunc,
        Self::EmptyDelegate,
        Self::DynArrayRemove,
        Self::DebugInfo,
        Self::DelegateFunction,
        Self::DelegateProperty,
        Self::LetDelegate,
        Self::Conditional,
        Self::DynArrayFind,
        Self::DynArrayFindStruct,
        Self::LocalOutVariable,
        Self::DefaultParmValue,
        Self::EmptyParmValue,
        Self::InstanceDelegate,
        Self::InterfaceContext,
        Self::InterfaceCast,
        Self::EndOfScript,
        Self::DynArrayAdd,
        Self::DynArrayAddItem,
        Self::DynArrayRemoveItem,
        Self::DynArrayInsertItem,
        Self::DynArrayIterator,
        Self::DynArraySort,
        Self::JumpIfFilterEditorOnly,
    ];

    /// Decode a structured opcode. Native and unassigned opcodes yield `None`.
    pub fn from_u8(v: u8) -> Option<Self> {
        if v >= EXTENDED_NATIVE {
            return None;
        }
        Self::ALL.iter().copied().find(|t| *t as u8 == v)
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether the token is followed by an argument list closed by
    /// [`EndFunctionParms`](Self::EndFunctionParms).
    pub fn takes_arguments(self) -> bool {
        matches!(
            self,
            Self::VirtualFunction
                | Self::FinalFunction
                | Self::GlobalFunction
                | Self::DelegateFunction
                | Self::EqualEqualDelDel
                | Self::NotEqualDelDel
                | Self::EqualEqualDelFunc
                | Self::NotEqualDelFunc
        )
    }
}

/// A decoded opcode: structured expression or native call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Token {
    Expr(ExprToken),
    Native(u16),
}

impl Token {
    pub const END_FUNCTION_PARMS: Self = Self::Expr(ExprToken::EndFunctionParms);
    pub const END_PARM_VALUE: Self = Self::Expr(ExprToken::EndParmValue);
    pub const END_OF_SCRIPT: Self = Self::Expr(ExprToken::EndOfScript);

    /// Opcode bytes encoding a native call index.
    ///
    /// Returns `None` when the index does not fit the extended encoding.
    pub fn native_bytes(index: u16) -> Option<([u8; 2], usize)> {
        if index > MAX_NATIVE_INDEX {
            return None;
        }
        if index >= FIRST_NATIVE as u16 && index <= 0xFF {
            return Some(([index as u8, 0], 1));
        }
        let high = EXTENDED_NATIVE + (index >> 8) as u8;
        Some(([high, (index & 0xFF) as u8], 2))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expr(t) => write!(f, "{t:?}"),
            Self::Native(index) => write!(f, "Native({index})"),
        }
    }
}
