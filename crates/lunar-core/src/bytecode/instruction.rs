//! Fixed-width instruction words and their decoded form.
//!
//! Layout (bit 0 is the least significant):
//!
//! ```text
//!  31       23       14        6     0
//!  |   B    |   C    |   A    |  op  |   Abc
//!  |      Bx         |   A    |  op  |   ABx / AsBx
//!  |            Ax            |  op  |   Ax
//! ```

use core::fmt;

use crate::bytecode::opcodes::{OpCode, OpMode};
use crate::{CoreError, CoreResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const SIZE_OP: u32 = 6;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 9;
const SIZE_C: u32 = 9;
const SIZE_BX: u32 = SIZE_B + SIZE_C;
const SIZE_AX: u32 = SIZE_BX + SIZE_A;

const POS_OP: u32 = 0;
const POS_A: u32 = POS_OP + SIZE_OP;
const POS_C: u32 = POS_A + SIZE_A;
const POS_B: u32 = POS_C + SIZE_C;
const POS_BX: u32 = POS_C;
const POS_AX: u32 = POS_A;

/// Largest value of `A`.
pub const MAXARG_A: u32 = (1 << SIZE_A) - 1;
/// Largest value of `B`.
pub const MAXARG_B: u32 = (1 << SIZE_B) - 1;
/// Largest value of `C`.
pub const MAXARG_C: u32 = (1 << SIZE_C) - 1;
/// Largest value of `Bx`.
pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
/// Bias of `sBx` (`sBx = Bx - MAXARG_SBX`).
pub const MAXARG_SBX: i32 = (MAXARG_BX >> 1) as i32;
/// Largest value of `Ax`.
pub const MAXARG_AX: u32 = (1 << SIZE_AX) - 1;

/// Bit flagging a `B`/`C` operand as a constant-pool index.
pub const BITRK: u32 = 1 << (SIZE_B - 1);
/// Largest constant index reachable through an RK operand.
pub const MAXINDEXRK: u32 = BITRK - 1;

#[inline]
const fn mask(size: u32) -> u32 { (1 << size) - 1 }

/// One 32-bit instruction word. Immutable once produced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Instruction(pub u32);

impl Instruction {
    /// Raw word.
    pub const fn raw(self) -> u32 { self.0 }

    /// Raw 6-bit opcode field.
    pub const fn opcode_bits(self) -> u8 { ((self.0 >> POS_OP) & mask(SIZE_OP)) as u8 }
    /// Field `A`.
    pub const fn a(self) -> u32 { (self.0 >> POS_A) & mask(SIZE_A) }
    /// Field `B` (raw, constant flag included).
    pub const fn b(self) -> u32 { (self.0 >> POS_B) & mask(SIZE_B) }
    /// Field `C` (raw, constant flag included).
    pub const fn c(self) -> u32 { (self.0 >> POS_C) & mask(SIZE_C) }
    /// Field `Bx`.
    pub const fn bx(self) -> u32 { (self.0 >> POS_BX) & mask(SIZE_BX) }
    /// Field `sBx`.
    pub const fn sbx(self) -> i32 { self.bx() as i32 - MAXARG_SBX }
    /// Field `Ax`.
    pub const fn ax(self) -> u32 { (self.0 >> POS_AX) & mask(SIZE_AX) }

    /// Opcode of this word, or [`CoreError::InvalidOpcode`].
    pub fn opcode(self) -> CoreResult<OpCode> {
        let raw = self.opcode_bits();
        OpCode::from_u8(raw).ok_or(CoreError::InvalidOpcode { raw })
    }

    /// Splits the word into opcode and the operand fields of its mode.
    pub fn decode(self) -> CoreResult<Decoded> {
        let op = self.opcode()?;
        let args = match op.mode() {
            OpMode::Abc => Args::Abc { a: self.a(), b: self.b(), c: self.c() },
            OpMode::ABx => Args::ABx { a: self.a(), bx: self.bx() },
            OpMode::AsBx => Args::AsBx { a: self.a(), sbx: self.sbx() },
            OpMode::Ax => Args::Ax { ax: self.ax() },
        };
        Ok(Decoded { op, args })
    }

    /// Encodes an `Abc` instruction. Fields are truncated to their width.
    pub const fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        Self(
            ((op as u32) << POS_OP)
                | ((a & mask(SIZE_A)) << POS_A)
                | ((b & mask(SIZE_B)) << POS_B)
                | ((c & mask(SIZE_C)) << POS_C),
        )
    }

    /// Encodes an `ABx` instruction.
    pub const fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        Self(((op as u32) << POS_OP) | ((a & mask(SIZE_A)) << POS_A) | ((bx & mask(SIZE_BX)) << POS_BX))
    }

    /// Encodes an `AsBx` instruction.
    pub const fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    /// Encodes an `Ax` instruction.
    pub const fn ax_word(op: OpCode, ax: u32) -> Self {
        Self(((op as u32) << POS_OP) | ((ax & mask(SIZE_AX)) << POS_AX))
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Ok(d) => write!(f, "{:?}", d),
            Err(_) => write!(f, "Instruction({:#010x})", self.0),
        }
    }
}

impl From<u32> for Instruction {
    fn from(raw: u32) -> Self { Self(raw) }
}

/// Operand fields present in a given mode. Absent fields do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Args {
    /// `A B C`; `B` and `C` are raw (constant flag included).
    Abc {
        /// Field `A`.
        a: u32,
        /// Field `B`.
        b: u32,
        /// Field `C`.
        c: u32,
    },
    /// `A Bx`.
    ABx {
        /// Field `A`.
        a: u32,
        /// Field `Bx`.
        bx: u32,
    },
    /// `A sBx`.
    AsBx {
        /// Field `A`.
        a: u32,
        /// Field `sBx`.
        sbx: i32,
    },
    /// `Ax`.
    Ax {
        /// Field `Ax`.
        ax: u32,
    },
}

/// Decoded instruction: opcode plus mode-specific operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Opcode.
    pub op: OpCode,
    /// Operands.
    pub args: Args,
}

impl Decoded {
    /// Field `A`, if the mode has one.
    pub const fn a(&self) -> Option<u32> {
        match self.args {
            Args::Abc { a, .. } | Args::ABx { a, .. } | Args::AsBx { a, .. } => Some(a),
            Args::Ax { .. } => None,
        }
    }
}

/// A `B`/`C` operand resolved against the constant flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rk {
    /// Stack register.
    Reg(u32),
    /// Constant-pool index (bias already removed).
    Const(u32),
}

impl Rk {
    /// Resolves a raw 9-bit operand.
    pub const fn from_raw(raw: u32) -> Self {
        if raw & BITRK != 0 { Rk::Const(raw - BITRK) } else { Rk::Reg(raw) }
    }

    /// Pool index if constant-flagged.
    pub const fn constant(self) -> Option<u32> {
        match self {
            Rk::Const(k) => Some(k),
            Rk::Reg(_) => None,
        }
    }

    /// Number shown in the operand column: the register, or `-1 - index`
    /// for a constant so both kinds stay distinguishable.
    pub const fn display_value(self) -> i64 {
        match self {
            Rk::Reg(r) => r as i64,
            Rk::Const(k) => -1 - k as i64,
        }
    }

    /// Raw operand (inverse of [`Rk::from_raw`]).
    pub const fn to_raw(self) -> u32 {
        match self {
            Rk::Reg(r) => r,
            Rk::Const(k) => k | BITRK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn layout_constants() {
        assert_eq!(MAXARG_BX, 262_143);
        assert_eq!(MAXARG_SBX, 131_071);
        assert_eq!(BITRK, 256);
        assert_eq!(MAXARG_AX, (1 << 26) - 1);
    }

    #[test]
    fn loadk_decodes_to_abx() {
        let w = Instruction::abx(OpCode::LoadK, 0, 2);
        assert_eq!(w.decode().unwrap(), Decoded { op: OpCode::LoadK, args: Args::ABx { a: 0, bx: 2 } });
    }

    #[test]
    fn abc_fields_and_constant_flag() {
        let w = Instruction::abc(OpCode::Add, 3, Rk::Const(7).to_raw(), 5);
        let Decoded { op, args } = w.decode().unwrap();
        assert_eq!(op, OpCode::Add);
        let Args::Abc { a, b, c } = args else { panic!("mode") };
        assert_eq!(a, 3);
        assert_eq!(Rk::from_raw(b), Rk::Const(7));
        assert_eq!(b - BITRK, 7);
        assert_eq!(Rk::from_raw(c), Rk::Reg(5));
        assert_eq!(Rk::from_raw(b).display_value(), -8);
        assert_eq!(Rk::from_raw(c).display_value(), 5);
    }

    #[test]
    fn negative_jump_offset() {
        let w = Instruction::asbx(OpCode::Jmp, 0, -4);
        assert_eq!(w.decode().unwrap().args, Args::AsBx { a: 0, sbx: -4 });
        assert_eq!(w.bx(), (MAXARG_SBX - 4) as u32);
    }

    #[test]
    fn invalid_opcode_is_reported() {
        let w = Instruction(63);
        assert!(matches!(w.decode(), Err(CoreError::InvalidOpcode { raw: 63 })));
    }

    proptest! {
        #[test]
        fn abc_fields_roundtrip(a in 0u32..=MAXARG_A, b in 0u32..=MAXARG_B, c in 0u32..=MAXARG_C) {
            let w = Instruction::abc(OpCode::SetTable, a, b, c);
            prop_assert_eq!(w.decode().unwrap().args, Args::Abc { a, b, c });
        }

        #[test]
        fn constant_index_is_raw_minus_bias(raw in BITRK..=MAXARG_B) {
            prop_assert_eq!(Rk::from_raw(raw).constant(), Some(raw - BITRK));
        }

        #[test]
        fn sbx_covers_full_range(sbx in -MAXARG_SBX..=MAXARG_SBX + 1) {
            let w = Instruction::asbx(OpCode::ForLoop, 1, sbx);
            prop_assert_eq!(w.sbx(), sbx);
        }
    }
}
