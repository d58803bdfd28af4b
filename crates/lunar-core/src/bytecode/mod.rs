//! Bytecode model and tooling: instruction words, opcode table, prototypes,
//! constant rendering, listings and chunk combination.

pub mod combine;
pub mod disasm;
pub mod instruction;
pub mod opcodes;
pub mod proto;
pub mod render;

pub use combine::combine;
pub use disasm::{print_function, ListingOptions};
pub use instruction::{Args, Decoded, Instruction, Rk};
pub use opcodes::{OpArgMask, OpCode, OpInfo, OpMode};
pub use proto::{ConstPool, Constant, LineTable, LocVar, Prototype, UpvalDesc};
pub use render::render;
