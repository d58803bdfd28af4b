//! Static opcode metadata: mnemonic, encoding mode and operand usage.
//!
//! Every decision the printer makes about an operand (print it or not, as a
//! register, as a constant, as an unsigned immediate) comes from [`OpInfo`],
//! looked up once per instruction. Nothing downstream re-tests bits.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Structural layout of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OpMode {
    /// `A` (8 bits), `B` (9 bits), `C` (9 bits).
    Abc,
    /// `A` (8 bits), unsigned `Bx` (18 bits).
    ABx,
    /// `A` (8 bits), signed `sBx` (18 bits, excess-K).
    AsBx,
    /// Unsigned `Ax` (26 bits).
    Ax,
}

/// How an opcode uses its `B` or `C` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OpArgMask {
    /// Field is not used.
    N,
    /// Field is used as an unsigned immediate.
    U,
    /// Field is a register or a jump offset.
    R,
    /// Field is a constant index or a register/constant (RK).
    K,
}

impl OpArgMask {
    /// True if the field carries information worth printing.
    pub const fn is_used(self) -> bool { !matches!(self, OpArgMask::N) }
}

/// Per-opcode metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Upper-case mnemonic, as printed in listings.
    pub name: &'static str,
    /// Encoding mode.
    pub mode: OpMode,
    /// Usage of `B` (or `Bx` for the `ABx` mode).
    pub b: OpArgMask,
    /// Usage of `C`.
    pub c: OpArgMask,
    /// Instruction is a test (next instruction must be a jump).
    pub test: bool,
    /// Instruction writes register `A`.
    pub sets_a: bool,
}

macro_rules! opcodes {
    ($($variant:ident = $name:literal : $mode:ident $b:ident $c:ident $test:literal $seta:literal),* $(,)?) => {
        /// Opcodes of the virtual machine, in encoding order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum OpCode { $($variant),* }

        impl OpCode {
            /// Every opcode, indexable by its numeric value.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant),*];
        }

        static OP_INFO: &[OpInfo] = &[$(
            OpInfo {
                name: $name,
                mode: OpMode::$mode,
                b: OpArgMask::$b,
                c: OpArgMask::$c,
                test: $test != 0,
                sets_a: $seta != 0,
            }
        ),*];
    };
}

opcodes! {
    Move     = "MOVE"     : Abc  R N 0 1,
    LoadK    = "LOADK"    : ABx  K N 0 1,
    LoadKx   = "LOADKX"   : ABx  N N 0 1,
    LoadBool = "LOADBOOL" : Abc  U U 0 1,
    LoadNil  = "LOADNIL"  : Abc  U N 0 1,
    GetUpval = "GETUPVAL" : Abc  U N 0 1,
    GetTabUp = "GETTABUP" : Abc  U K 0 1,
    GetTable = "GETTABLE" : Abc  R K 0 1,
    SetTabUp = "SETTABUP" : Abc  K K 0 0,
    SetUpval = "SETUPVAL" : Abc  U N 0 0,
    SetTable = "SETTABLE" : Abc  K K 0 0,
    NewTable = "NEWTABLE" : Abc  U U 0 1,
    SelfOp   = "SELF"     : Abc  R K 0 1,
    Add      = "ADD"      : Abc  K K 0 1,
    Sub      = "SUB"      : Abc  K K 0 1,
    Mul      = "MUL"      : Abc  K K 0 1,
    Mod      = "MOD"      : Abc  K K 0 1,
    Pow      = "POW"      : Abc  K K 0 1,
    Div      = "DIV"      : Abc  K K 0 1,
    IDiv     = "IDIV"     : Abc  K K 0 1,
    BAnd     = "BAND"     : Abc  K K 0 1,
    BOr      = "BOR"      : Abc  K K 0 1,
    BXor     = "BXOR"     : Abc  K K 0 1,
    Shl      = "SHL"      : Abc  K K 0 1,
    Shr      = "SHR"      : Abc  K K 0 1,
    Unm      = "UNM"      : Abc  R N 0 1,
    BNot     = "BNOT"     : Abc  R N 0 1,
    Not      = "NOT"      : Abc  R N 0 1,
    Len      = "LEN"      : Abc  R N 0 1,
    Concat   = "CONCAT"   : Abc  R R 0 1,
    Jmp      = "JMP"      : AsBx R N 0 0,
    Eq       = "EQ"       : Abc  K K 1 0,
    Lt       = "LT"       : Abc  K K 1 0,
    Le       = "LE"       : Abc  K K 1 0,
    Test     = "TEST"     : Abc  N U 1 0,
    TestSet  = "TESTSET"  : Abc  R U 1 1,
    Call     = "CALL"     : Abc  U U 0 1,
    TailCall = "TAILCALL" : Abc  U U 0 1,
    Return   = "RETURN"   : Abc  U N 0 0,
    ForLoop  = "FORLOOP"  : AsBx R N 0 1,
    ForPrep  = "FORPREP"  : AsBx R N 0 1,
    TForCall = "TFORCALL" : Abc  N U 0 0,
    TForLoop = "TFORLOOP" : AsBx R N 0 1,
    SetList  = "SETLIST"  : Abc  U U 0 0,
    Closure  = "CLOSURE"  : ABx  U N 0 1,
    VarArg   = "VARARG"   : Abc  U N 0 1,
    ExtraArg = "EXTRAARG" : Ax   U U 0 0,
}

/// Number of opcodes in the table.
pub const NUM_OPCODES: usize = OpCode::ALL.len();

impl OpCode {
    /// Numeric opcode -> `OpCode`, `None` if outside the table.
    pub fn from_u8(raw: u8) -> Option<Self> { Self::ALL.get(raw as usize).copied() }

    /// Static metadata for this opcode.
    pub fn info(self) -> &'static OpInfo { &OP_INFO[self as usize] }

    /// Mnemonic as printed in listings.
    pub fn name(self) -> &'static str { self.info().name }

    /// Encoding mode.
    pub fn mode(self) -> OpMode { self.info().mode }

    /// Relative jumps: the `sBx` operand is an offset from the next instruction.
    pub const fn is_jump(self) -> bool {
        matches!(self, OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep | OpCode::TForLoop)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
