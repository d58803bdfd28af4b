//! Merges several top-level prototypes into one artifact.
//!
//! With a single input the input is returned untouched. Otherwise a synthetic
//! main function is built that owns every input as a nested prototype and
//! runs them in order:
//!
//! ```text
//! CLOSURE  0 i     ; for each input i
//! CALL     0 1 1
//! ...
//! RETURN   0 1
//! ```

use log::debug;

use crate::bytecode::instruction::{Instruction, MAXARG_BX};
use crate::bytecode::opcodes::OpCode;
use crate::bytecode::proto::{Prototype, UpvalDesc};
use crate::{CoreError, CoreResult};

/// Chunk name of the synthetic wrapper.
pub const COMBINED_SOURCE: &str = "=(lunarc)";

/// Name of the environment upvalue a main chunk captures.
pub const ENV_NAME: &str = "_ENV";

/// Combines `protos` (in order) into a single root prototype.
///
/// The first upvalue of every input is redirected from the enclosing stack to
/// the wrapper's upvalue list: a standalone main chunk captures its
/// environment from a frame the wrapper does not have, while the wrapper's
/// own upvalue 0 is that environment.
pub fn combine(mut protos: Vec<Prototype>) -> CoreResult<Prototype> {
    match protos.len() {
        0 => return Err(CoreError::NothingToCombine),
        1 => return Ok(protos.remove(0)),
        n if n > MAXARG_BX as usize + 1 => return Err(CoreError::TooManyInputs { count: n, max: MAXARG_BX as usize + 1 }),
        _ => {}
    }

    for (i, p) in protos.iter_mut().enumerate() {
        if let Some(first) = p.upvalues.first_mut() {
            if first.in_stack {
                debug!("combine: input {i} upvalue 0 now refers to the wrapper's upvalue {}", first.idx);
                first.in_stack = false;
            }
        }
    }

    let mut wrapper = Prototype::new(COMBINED_SOURCE);
    wrapper.is_vararg = true;
    wrapper.max_stack_size = 2;
    wrapper.upvalues.push(UpvalDesc::named(ENV_NAME, true, 0));
    for i in 0..protos.len() as u32 {
        wrapper.code.push(Instruction::abx(OpCode::Closure, 0, i));
        wrapper.code.push(Instruction::abc(OpCode::Call, 0, 1, 1));
    }
    wrapper.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
    debug!("combine: wrapped {} chunks ({} instructions)", protos.len(), wrapper.code.len());
    wrapper.protos = protos;
    Ok(wrapper)
}
