//! Function prototypes: code, constants, nested functions and debug data.
//!
//! A [`Prototype`] owns its nested prototypes outright, so a tree can only be
//! shared by cloning it and two trees never alias each other's storage.

use core::{hash::{Hash, Hasher}, mem, slice};

use crate::bytecode::instruction::Instruction;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Source names starting with this byte denote a file (`@main.lua`).
pub const SOURCE_FILE_MARK: u8 = b'@';
/// Source names starting with this byte are shown verbatim (`=stdin`).
pub const SOURCE_LITERAL_MARK: u8 = b'=';
/// First byte of a precompiled binary chunk.
pub const SOURCE_BINARY_MARK: u8 = 0x1b;

/// Values that can live in the constant pool.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Constant {
    /// `nil`.
    Nil,
    /// `true` / `false`.
    Boolean(bool),
    /// Floating-point number.
    Number(f64),
    /// Integer.
    Integer(i64),
    /// Short (interned) string. Arbitrary bytes.
    ShortStr(Vec<u8>),
    /// Long string. Arbitrary bytes.
    LongStr(Vec<u8>),
    /// Constant whose type tag is not understood; kept so a listing can go on.
    Unknown(u8),
}

impl Constant {
    /// Builds a short string constant.
    pub fn str(s: impl AsRef<[u8]>) -> Self { Constant::ShortStr(s.as_ref().to_vec()) }

    /// String payload of a text constant.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Constant::ShortStr(s) | Constant::LongStr(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Nil, Constant::Nil) => true,
            (Constant::Boolean(a), Constant::Boolean(b)) => a == b,
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::Integer(a), Constant::Integer(b)) => a == b,
            (Constant::ShortStr(a), Constant::ShortStr(b)) => a == b,
            (Constant::LongStr(a), Constant::LongStr(b)) => a == b,
            (Constant::Unknown(a), Constant::Unknown(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Constant::Nil => {}
            Constant::Boolean(b) => b.hash(state),
            Constant::Number(v) => v.to_bits().hash(state),
            Constant::Integer(v) => v.hash(state),
            Constant::ShortStr(s) | Constant::LongStr(s) => s.hash(state),
            Constant::Unknown(tag) => tag.hash(state),
        }
    }
}

/// Constant pool with stable indices (0-based).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ConstPool {
    values: Vec<Constant>,
}

impl ConstPool {
    /// Create an empty pool.
    pub fn new() -> Self { Self { values: Vec::new() } }

    /// Number of stored constants.
    pub fn len(&self) -> usize { self.values.len() }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Iterate as `(index, &Constant)`.
    pub fn iter(&self) -> ConstIter<'_> { ConstIter { inner: self.values.iter().enumerate() } }

    /// Pushes a value and returns its index.
    pub fn add(&mut self, value: Constant) -> u32 {
        let idx = self.values.len() as u32;
        self.values.push(value);
        idx
    }

    /// Lookup a constant by index.
    pub fn get(&self, idx: u32) -> Option<&Constant> { self.values.get(idx as usize) }
}

impl FromIterator<Constant> for ConstPool {
    fn from_iter<I: IntoIterator<Item = Constant>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Iterator returned by [`ConstPool::iter`].
pub struct ConstIter<'a> {
    inner: core::iter::Enumerate<slice::Iter<'a, Constant>>,
}

impl<'a> Iterator for ConstIter<'a> {
    type Item = (u32, &'a Constant);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(idx, value)| (idx as u32, value))
    }
}

impl<'a> IntoIterator for &'a ConstPool {
    type Item = (u32, &'a Constant);
    type IntoIter = ConstIter<'a>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

/// Line table (pc -> source line). May be empty (stripped chunk).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct LineTable {
    lines: Vec<u32>,
}

impl LineTable {
    /// Create an empty line table.
    pub fn new() -> Self { Self { lines: Vec::new() } }
    /// Append a mapping for the next program counter.
    pub fn push(&mut self, line: u32) { self.lines.push(line); }
    /// Number of stored line entries.
    pub fn len(&self) -> usize { self.lines.len() }
    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    /// Source line of `pc`; `None` when unknown (no entry, or line 0).
    pub fn line_for_pc(&self, pc: usize) -> Option<u32> {
        self.lines.get(pc).copied().filter(|&line| line > 0)
    }
    /// Raw entries.
    pub fn as_slice(&self) -> &[u32] { &self.lines }
    /// Remove all recorded mappings.
    pub fn clear(&mut self) { self.lines.clear(); }
}

impl FromIterator<u32> for LineTable {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self { lines: iter.into_iter().collect() }
    }
}

/// Captured variable descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UpvalDesc {
    /// Debug name (absent when stripped).
    pub name: Option<Vec<u8>>,
    /// `idx` addresses the enclosing frame's stack when set, its upvalue list otherwise.
    pub in_stack: bool,
    /// Register or upvalue index in the enclosing function.
    pub idx: u8,
}

impl UpvalDesc {
    /// Named descriptor.
    pub fn named(name: impl AsRef<[u8]>, in_stack: bool, idx: u8) -> Self {
        Self { name: Some(name.as_ref().to_vec()), in_stack, idx }
    }
}

/// Local variable live range (`start_pc` inclusive, `end_pc` exclusive).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocVar {
    /// Variable name.
    pub name: Vec<u8>,
    /// First instruction where the variable is live.
    pub start_pc: u32,
    /// First instruction where the variable is dead.
    pub end_pc: u32,
}

/// One compiled function.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Prototype {
    /// Chunk name, with its leading marker byte (`@`, `=`, ...).
    pub source: Option<Vec<u8>>,
    /// First line of the definition (0 for a main chunk).
    pub line_defined: u32,
    /// Last line of the definition.
    pub last_line_defined: u32,
    /// Number of fixed parameters.
    pub num_params: u8,
    /// Accepts `...`.
    pub is_vararg: bool,
    /// Registers needed by this function.
    pub max_stack_size: u8,
    /// Instruction words.
    pub code: Vec<Instruction>,
    /// Constant pool.
    pub constants: ConstPool,
    /// Nested functions, in definition order.
    pub protos: Vec<Prototype>,
    /// Captured variables.
    pub upvalues: Vec<UpvalDesc>,
    /// Local variables (debug).
    pub loc_vars: Vec<LocVar>,
    /// Line of each instruction (debug).
    pub line_info: LineTable,
}

impl Prototype {
    /// Empty prototype attributed to `source`.
    pub fn new(source: impl AsRef<[u8]>) -> Self {
        Self { source: Some(source.as_ref().to_vec()), ..Self::default() }
    }

    /// True for the implicit top-level unit of a chunk.
    pub fn is_main(&self) -> bool { self.line_defined == 0 }

    /// Appends an instruction with its source line.
    pub fn push_code(&mut self, ins: Instruction, line: u32) {
        self.code.push(ins);
        self.line_info.push(line);
    }

    /// Pre-order walk over this prototype and every nested one.
    pub fn walk(&self) -> Walk<'_> { Walk { stack: vec![self] } }

    /// Number of prototypes in the tree rooted here.
    pub fn count(&self) -> usize { self.walk().count() }

    /// Removes debug payloads (lines, locals, upvalue names) from the whole tree.
    pub fn strip(&mut self) {
        self.line_info.clear();
        self.loc_vars.clear();
        for uv in &mut self.upvalues {
            uv.name = None;
        }
        for p in &mut self.protos {
            p.strip();
        }
    }
}

/// Iterator returned by [`Prototype::walk`]: depth-first, pre-order, nested
/// prototypes in list order. Uses an explicit stack.
pub struct Walk<'a> {
    stack: Vec<&'a Prototype>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Prototype;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.protos.iter().rev());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(line: u32) -> Prototype {
        Prototype { line_defined: line, ..Prototype::default() }
    }

    #[test]
    fn walk_is_preorder() {
        let mut root = leaf(0);
        let mut a = leaf(1);
        a.protos.push(leaf(2));
        a.protos.push(leaf(3));
        root.protos.push(a);
        root.protos.push(leaf(4));
        let order: Vec<u32> = root.walk().map(|p| p.line_defined).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(root.count(), 5);
    }

    #[test]
    fn line_zero_is_unknown() {
        let lines: LineTable = [3, 0].into_iter().collect();
        assert_eq!(lines.line_for_pc(0), Some(3));
        assert_eq!(lines.line_for_pc(1), None);
        assert_eq!(lines.line_for_pc(9), None);
    }

    #[test]
    fn float_constants_compare_by_bits() {
        assert_eq!(Constant::Number(f64::NAN), Constant::Number(f64::NAN));
        assert_ne!(Constant::Number(0.0), Constant::Number(-0.0));
        assert_ne!(Constant::Number(3.0), Constant::Integer(3));
        assert_ne!(Constant::str("x"), Constant::LongStr(b"x".to_vec()));
    }

    #[test]
    fn strip_clears_debug_recursively() {
        let mut root = Prototype::new("@a.lua");
        root.push_code(Instruction(0), 1);
        root.upvalues.push(UpvalDesc::named("_ENV", true, 0));
        let mut child = leaf(2);
        child.loc_vars.push(LocVar { name: b"x".to_vec(), start_pc: 0, end_pc: 1 });
        root.protos.push(child);
        root.strip();
        assert!(root.line_info.is_empty());
        assert_eq!(root.upvalues[0].name, None);
        assert!(root.protos[0].loc_vars.is_empty());
        assert_eq!(root.code.len(), 1);
    }
}
