//! Chargement d'un chunk précompilé en arbre de prototypes.

use log::debug;

use lunar_core::bytecode::{ConstPool, Constant, Instruction, LineTable, LocVar, Prototype, UpvalDesc};
use lunar_core::CoreResult;

use crate::io::ByteReader;
use crate::{display_name, skip_comment, tag, CHECK_INT, CHECK_NUM, DATA, FORMAT, MAX_NESTING, SIGNATURE, SIZES, VERSION};

const CORRUPTED: &str = "corrupted precompiled chunk";

/// Charge `bytes` (chunk précompilé, éventuellement précédé d'une ligne `#`).
///
/// `chunkname` suit les conventions habituelles (`@fichier`, `=nom`) et ne
/// sert qu'aux messages d'erreur.
pub fn undump(bytes: &[u8], chunkname: &str) -> CoreResult<Prototype> {
    let name = display_name(chunkname);
    let bytes = skip_comment(bytes);
    let mut r = ByteReader::new(bytes, name);
    check_header(&mut r)?;
    let _main_upvalues = r.read_u8()?;
    let main = load_function(&mut r, None, 0)?;
    debug!("undump {name}: {} bytes, {} functions", r.offset(), main.count());
    Ok(main)
}

fn check_header(r: &mut ByteReader<'_>) -> CoreResult<()> {
    if r.remaining() < SIGNATURE.len() || r.read_bytes(SIGNATURE.len())? != SIGNATURE {
        return Err(r.error("not a precompiled chunk"));
    }
    if r.read_u8()? != VERSION {
        return Err(r.error("version mismatch in precompiled chunk"));
    }
    if r.read_u8()? != FORMAT {
        return Err(r.error("format mismatch in precompiled chunk"));
    }
    if r.read_bytes(DATA.len())? != DATA {
        return Err(r.error(CORRUPTED));
    }
    for (size, reason) in SIZES {
        if r.read_u8()? != size {
            return Err(r.error(reason));
        }
    }
    if r.read_i64()? != CHECK_INT {
        return Err(r.error("endianness mismatch in precompiled chunk"));
    }
    if r.read_f64()?.to_bits() != CHECK_NUM.to_bits() {
        return Err(r.error("float format mismatch in precompiled chunk"));
    }
    Ok(())
}

fn read_string(r: &mut ByteReader<'_>) -> CoreResult<Option<Vec<u8>>> {
    let mut size = u64::from(r.read_u8()?);
    if size == 0xFF {
        size = r.read_u64()?;
    }
    if size == 0 {
        return Ok(None);
    }
    let len = usize::try_from(size - 1).map_err(|_| r.error(crate::io::TRUNCATED))?;
    Ok(Some(r.read_bytes(len)?.to_vec()))
}

fn read_uint(r: &mut ByteReader<'_>) -> CoreResult<u32> {
    let v = r.read_i32()?;
    u32::try_from(v).map_err(|_| r.error(CORRUPTED))
}

fn load_function(r: &mut ByteReader<'_>, parent_source: Option<&[u8]>, depth: usize) -> CoreResult<Prototype> {
    if depth > MAX_NESTING {
        return Err(r.error("too many nested functions in precompiled chunk"));
    }
    let source = read_string(r)?.or_else(|| parent_source.map(<[u8]>::to_vec));
    let mut f = Prototype { source, ..Prototype::default() };
    f.line_defined = read_uint(r)?;
    f.last_line_defined = read_uint(r)?;
    f.num_params = r.read_u8()?;
    f.is_vararg = r.read_u8()? != 0;
    f.max_stack_size = r.read_u8()?;

    let n = r.read_count(4)?;
    f.code = (0..n).map(|_| r.read_u32().map(Instruction)).collect::<CoreResult<_>>()?;

    f.constants = load_constants(r)?;

    let n = r.read_count(2)?;
    for _ in 0..n {
        let in_stack = r.read_u8()? != 0;
        let idx = r.read_u8()?;
        f.upvalues.push(UpvalDesc { name: None, in_stack, idx });
    }

    let n = r.read_count(1)?;
    for _ in 0..n {
        let child = load_function(r, f.source.as_deref(), depth + 1)?;
        f.protos.push(child);
    }

    load_debug(r, &mut f)?;
    Ok(f)
}

fn load_constants(r: &mut ByteReader<'_>) -> CoreResult<ConstPool> {
    let n = r.read_count(1)?;
    let mut pool = ConstPool::new();
    for _ in 0..n {
        let value = match r.read_u8()? {
            tag::NIL => Constant::Nil,
            tag::BOOLEAN => Constant::Boolean(r.read_u8()? != 0),
            tag::NUMFLT => Constant::Number(r.read_f64()?),
            tag::NUMINT => Constant::Integer(r.read_i64()?),
            t @ (tag::SHRSTR | tag::LNGSTR) => {
                let s = read_string(r)?.ok_or_else(|| r.error(CORRUPTED))?;
                if t == tag::SHRSTR { Constant::ShortStr(s) } else { Constant::LongStr(s) }
            }
            _ => return Err(r.error("bad constant tag in precompiled chunk")),
        };
        pool.add(value);
    }
    Ok(pool)
}

fn load_debug(r: &mut ByteReader<'_>, f: &mut Prototype) -> CoreResult<()> {
    let n = r.read_count(4)?;
    f.line_info = (0..n).map(|_| read_uint(r)).collect::<CoreResult<LineTable>>()?;

    let n = r.read_count(9)?;
    for _ in 0..n {
        let name = read_string(r)?.unwrap_or_default();
        let start_pc = read_uint(r)?;
        let end_pc = read_uint(r)?;
        f.loc_vars.push(LocVar { name, start_pc, end_pc });
    }

    let n = r.read_count(1)?;
    if n > f.upvalues.len() {
        return Err(r.error(CORRUPTED));
    }
    for i in 0..n {
        f.upvalues[i].name = read_string(r)?;
    }
    Ok(())
}
