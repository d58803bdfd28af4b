//! Sérialisation d'un arbre de prototypes en chunk précompilé.

use std::io::Write;

use log::debug;

use lunar_core::bytecode::{Constant, Prototype};
use lunar_core::disasm::source_label;
use lunar_core::{CoreError, CoreResult};

use crate::io::ByteWriter;
use crate::{tag, CHECK_INT, CHECK_NUM, DATA, FORMAT, SIGNATURE, SIZES, VERSION};

/// Écrit `proto` dans `sink`. Avec `strip`, sources et tables de debug sont omises.
pub fn dump_to(proto: &Prototype, strip: bool, sink: &mut dyn Write) -> CoreResult<()> {
    let label = String::from_utf8_lossy(source_label(proto.source.as_deref())).into_owned();
    let mut w = ByteWriter::new(sink);
    let mut d = DumpState { w: &mut w, strip, label: &label };
    d.header()?;
    let n = u8::try_from(proto.upvalues.len()).map_err(|_| d.error("too many upvalues"))?;
    d.w.write_u8(n)?;
    d.function(proto, None)?;
    debug!("dump {label}: {} functions, strip={strip}", proto.count());
    Ok(())
}

struct DumpState<'a, W: Write> {
    w: &'a mut ByteWriter<W>,
    strip: bool,
    label: &'a str,
}

impl<W: Write> DumpState<'_, W> {
    fn error(&self, reason: &'static str) -> CoreError { CoreError::format(self.label, reason) }

    fn header(&mut self) -> CoreResult<()> {
        self.w.write_bytes(SIGNATURE)?;
        self.w.write_u8(VERSION)?;
        self.w.write_u8(FORMAT)?;
        self.w.write_bytes(DATA)?;
        for (size, _) in SIZES {
            self.w.write_u8(size)?;
        }
        self.w.write_i64(CHECK_INT)?;
        self.w.write_f64(CHECK_NUM)
    }

    fn string(&mut self, s: Option<&[u8]>) -> CoreResult<()> {
        let Some(s) = s else { return self.w.write_u8(0) };
        let size = s.len() + 1;
        match u8::try_from(size) {
            Ok(small) if small < 0xFF => self.w.write_u8(small)?,
            _ => {
                self.w.write_u8(0xFF)?;
                self.w.write_u64(size as u64)?;
            }
        }
        self.w.write_bytes(s)
    }

    fn int(&mut self, v: u32) -> CoreResult<()> {
        let v = i32::try_from(v).map_err(|_| self.error("value does not fit an int"))?;
        self.w.write_i32(v)
    }

    fn function(&mut self, f: &Prototype, parent_source: Option<&[u8]>) -> CoreResult<()> {
        let source = f.source.as_deref();
        if self.strip || source == parent_source {
            self.string(None)?;
        } else {
            self.string(source)?;
        }
        self.int(f.line_defined)?;
        self.int(f.last_line_defined)?;
        self.w.write_u8(f.num_params)?;
        self.w.write_u8(u8::from(f.is_vararg))?;
        self.w.write_u8(f.max_stack_size)?;

        self.w.write_count(f.code.len())?;
        for ins in &f.code {
            self.w.write_u32(ins.raw())?;
        }

        self.w.write_count(f.constants.len())?;
        for (_, k) in &f.constants {
            self.constant(k)?;
        }

        self.w.write_count(f.upvalues.len())?;
        for uv in &f.upvalues {
            self.w.write_u8(u8::from(uv.in_stack))?;
            self.w.write_u8(uv.idx)?;
        }

        self.w.write_count(f.protos.len())?;
        for p in &f.protos {
            self.function(p, source)?;
        }

        self.debug(f)
    }

    fn constant(&mut self, k: &Constant) -> CoreResult<()> {
        match k {
            Constant::Nil => self.w.write_u8(tag::NIL),
            Constant::Boolean(b) => {
                self.w.write_u8(tag::BOOLEAN)?;
                self.w.write_u8(u8::from(*b))
            }
            Constant::Number(n) => {
                self.w.write_u8(tag::NUMFLT)?;
                self.w.write_f64(*n)
            }
            Constant::Integer(i) => {
                self.w.write_u8(tag::NUMINT)?;
                self.w.write_i64(*i)
            }
            Constant::ShortStr(s) => {
                self.w.write_u8(tag::SHRSTR)?;
                self.string(Some(s))
            }
            Constant::LongStr(s) => {
                self.w.write_u8(tag::LNGSTR)?;
                self.string(Some(s))
            }
            Constant::Unknown(_) => Err(self.error("cannot dump a constant of unknown type")),
        }
    }

    fn debug(&mut self, f: &Prototype) -> CoreResult<()> {
        if self.strip {
            for _ in 0..3 {
                self.w.write_count(0)?;
            }
            return Ok(());
        }
        self.w.write_count(f.line_info.len())?;
        for &line in f.line_info.as_slice() {
            self.int(line)?;
        }
        self.w.write_count(f.loc_vars.len())?;
        for lv in &f.loc_vars {
            self.string(Some(&lv.name))?;
            self.int(lv.start_pc)?;
            self.int(lv.end_pc)?;
        }
        self.w.write_count(f.upvalues.len())?;
        for uv in &f.upvalues {
            self.string(uv.name.as_deref())?;
        }
        Ok(())
    }
}
