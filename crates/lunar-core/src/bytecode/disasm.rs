//! Textual listings of prototype trees (headers, code, debug tables).
//!
//! Output goes to a caller-provided [`Write`] sink. Each line is assembled in
//! memory and written with a single `write_all`, so a failing sink never
//! leaves a torn line behind what was already emitted.

use std::io::Write;

use log::trace;

use crate::bytecode::instruction::{Args, Rk};
use crate::bytecode::opcodes::{OpArgMask, OpCode};
use crate::bytecode::proto::{Prototype, SOURCE_BINARY_MARK, SOURCE_FILE_MARK, SOURCE_LITERAL_MARK};
use crate::bytecode::render::render;
use crate::CoreResult;

/// What to print besides headers and code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingOptions {
    /// Append the constants / locals / upvalues tables of every prototype.
    pub debug_tables: bool,
}

impl ListingOptions {
    /// Headers, code and debug tables.
    pub const fn full() -> Self { Self { debug_tables: true } }
}

/// Prints `root` then every nested prototype, depth-first and pre-order.
pub fn print_function<W: Write + ?Sized>(out: &mut W, root: &Prototype, opts: ListingOptions) -> CoreResult<()> {
    for f in root.walk() {
        trace!("listing {} ({} instructions)", identity(f), f.code.len());
        print_header(out, f)?;
        print_code(out, f)?;
        if opts.debug_tables {
            print_debug(out, f)?;
        }
    }
    Ok(())
}

/// Whole listing as a `String` (non UTF-8 names are replaced lossily).
pub fn disassemble_full(root: &Prototype, opts: ListingOptions) -> CoreResult<String> {
    let mut buf = Vec::new();
    print_function(&mut buf, root, opts)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Token identifying a prototype within one run: its address.
pub fn identity(f: &Prototype) -> String { format!("{:p}", f) }

/// Source name as shown in headers, leading marker byte removed.
pub fn source_label(source: Option<&[u8]>) -> &[u8] {
    let s = source.unwrap_or(b"=?");
    match s.first() {
        Some(&SOURCE_FILE_MARK | &SOURCE_LITERAL_MARK) => &s[1..],
        Some(&SOURCE_BINARY_MARK) => b"(bstring)",
        _ => b"(string)",
    }
}

fn plural(n: usize) -> &'static str { if n == 1 { "" } else { "s" } }

/// Two header lines: kind, source, lines, sizes.
pub fn print_header<W: Write + ?Sized>(out: &mut W, f: &Prototype) -> CoreResult<()> {
    let mut line = Vec::new();
    let kind = if f.is_main() { "main" } else { "function" };
    let _ = write!(line, "\n{kind} <");
    line.extend_from_slice(source_label(f.source.as_deref()));
    let n = f.code.len();
    let _ = writeln!(
        line,
        ":{},{}> ({} instruction{} at {})",
        f.line_defined,
        f.last_line_defined,
        n,
        plural(n),
        identity(f)
    );
    let params = usize::from(f.num_params);
    let slots = usize::from(f.max_stack_size);
    let _ = write!(
        line,
        "{}{} param{}, {} slot{}, {} upvalue{}, ",
        params,
        if f.is_vararg { "+" } else { "" },
        plural(params),
        slots,
        plural(slots),
        f.upvalues.len(),
        plural(f.upvalues.len())
    );
    let _ = writeln!(
        line,
        "{} local{}, {} constant{}, {} function{}",
        f.loc_vars.len(),
        plural(f.loc_vars.len()),
        f.constants.len(),
        plural(f.constants.len()),
        f.protos.len(),
        plural(f.protos.len())
    );
    out.write_all(&line)?;
    Ok(())
}

/// One line per instruction (a SETLIST with an out-of-line count takes two words).
pub fn print_code<W: Write + ?Sized>(out: &mut W, f: &Prototype) -> CoreResult<()> {
    let mut pc = 0;
    while pc < f.code.len() {
        let d = f.code[pc].decode()?;
        let mut line = Vec::new();
        let _ = write!(line, "\t{}\t", pc + 1);
        match f.line_info.line_for_pc(pc) {
            Some(l) => { let _ = write!(line, "[{l}]\t"); }
            None => line.extend_from_slice(b"[-]\t"),
        }
        let _ = write!(line, "{:<9}\t", d.op.name());
        write_operands(&mut line, d.op, d.args);
        write_annotation(&mut line, f, &mut pc, d.op, d.args);
        line.push(b'\n');
        out.write_all(&line)?;
        pc += 1;
    }
    Ok(())
}

fn write_operands(line: &mut Vec<u8>, op: OpCode, args: Args) {
    let info = op.info();
    match args {
        Args::Abc { a, b, c } => {
            let _ = write!(line, "{a}");
            if info.b.is_used() {
                let _ = write!(line, " {}", Rk::from_raw(b).display_value());
            }
            if info.c.is_used() {
                let _ = write!(line, " {}", Rk::from_raw(c).display_value());
            }
        }
        Args::ABx { a, bx } => {
            let _ = write!(line, "{a}");
            if matches!(info.b, OpArgMask::K | OpArgMask::U) {
                let _ = write!(line, " {bx}");
            }
        }
        Args::AsBx { a, sbx } => {
            let _ = write!(line, "{a} {sbx}");
        }
        Args::Ax { ax } => {
            let _ = write!(line, "{ax}");
        }
    }
}

fn constant_text(f: &Prototype, idx: u32) -> String {
    f.constants.get(idx).map_or_else(|| format!("<bad constant {idx}>"), render)
}

fn upvalue_name(f: &Prototype, idx: u32) -> &[u8] {
    f.upvalues
        .get(idx as usize)
        .and_then(|uv| uv.name.as_deref())
        .unwrap_or(b"-")
}

fn constant_or_dash(f: &Prototype, raw: u32) -> String {
    Rk::from_raw(raw).constant().map_or_else(|| "-".into(), |k| constant_text(f, k))
}

fn write_annotation(line: &mut Vec<u8>, f: &Prototype, pc: &mut usize, op: OpCode, args: Args) {
    use OpCode as O;
    match (op, args) {
        (O::LoadK, Args::ABx { bx, .. }) => {
            let _ = write!(line, "\t; {}", constant_text(f, bx));
        }
        (O::GetUpval | O::SetUpval, Args::Abc { b, .. }) => {
            line.extend_from_slice(b"\t; ");
            line.extend_from_slice(upvalue_name(f, b));
        }
        (O::GetTabUp, Args::Abc { b, c, .. }) => {
            line.extend_from_slice(b"\t; ");
            line.extend_from_slice(upvalue_name(f, b));
            if let Some(k) = Rk::from_raw(c).constant() {
                let _ = write!(line, " {}", constant_text(f, k));
            }
        }
        (O::SetTabUp, Args::Abc { a, b, c }) => {
            line.extend_from_slice(b"\t; ");
            line.extend_from_slice(upvalue_name(f, a));
            for raw in [b, c] {
                if let Some(k) = Rk::from_raw(raw).constant() {
                    let _ = write!(line, " {}", constant_text(f, k));
                }
            }
        }
        (O::GetTable | O::SelfOp, Args::Abc { c, .. }) => {
            if let Some(k) = Rk::from_raw(c).constant() {
                let _ = write!(line, "\t; {}", constant_text(f, k));
            }
        }
        (
            O::SetTable | O::Add | O::Sub | O::Mul | O::Mod | O::Pow | O::Div | O::IDiv | O::BAnd
            | O::BOr | O::BXor | O::Shl | O::Shr | O::Eq | O::Lt | O::Le,
            Args::Abc { b, c, .. },
        ) => {
            if Rk::from_raw(b).constant().is_some() || Rk::from_raw(c).constant().is_some() {
                let _ = write!(line, "\t; {} {}", constant_or_dash(f, b), constant_or_dash(f, c));
            }
        }
        (O::Jmp | O::ForLoop | O::ForPrep | O::TForLoop, Args::AsBx { sbx, .. }) => {
            let _ = write!(line, "\t; to {}", sbx as i64 + *pc as i64 + 2);
        }
        (O::Closure, Args::ABx { bx, .. }) => match f.protos.get(bx as usize) {
            Some(p) => { let _ = write!(line, "\t; {}", identity(p)); }
            None => { let _ = write!(line, "\t; <bad function {bx}>"); }
        },
        (O::SetList, Args::Abc { c, .. }) => {
            if c == 0 {
                *pc += 1;
                match f.code.get(*pc) {
                    Some(word) => { let _ = write!(line, "\t; {}", word.raw() as i32); }
                    None => line.extend_from_slice(b"\t; ?"),
                }
            } else {
                let _ = write!(line, "\t; {c}");
            }
        }
        (O::ExtraArg, Args::Ax { ax }) => {
            let _ = write!(line, "\t; {}", constant_text(f, ax));
        }
        _ => {}
    }
}

/// Constants, locals and upvalues of one prototype.
pub fn print_debug<W: Write + ?Sized>(out: &mut W, f: &Prototype) -> CoreResult<()> {
    let id = identity(f);
    let mut buf = Vec::new();

    let _ = writeln!(buf, "constants ({}) for {id}:", f.constants.len());
    for (i, k) in f.constants.iter() {
        let _ = writeln!(buf, "\t{}\t{}", i + 1, render(k));
    }

    let _ = writeln!(buf, "locals ({}) for {id}:", f.loc_vars.len());
    for (i, var) in f.loc_vars.iter().enumerate() {
        let _ = write!(buf, "\t{i}\t");
        buf.extend_from_slice(&var.name);
        let _ = writeln!(buf, "\t{}\t{}", var.start_pc + 1, var.end_pc + 1);
    }

    let _ = writeln!(buf, "upvalues ({}) for {id}:", f.upvalues.len());
    for (i, uv) in f.upvalues.iter().enumerate() {
        let _ = write!(buf, "\t{i}\t");
        buf.extend_from_slice(uv.name.as_deref().unwrap_or(b"-"));
        let _ = writeln!(buf, "\t{}\t{}", u8::from(uv.in_stack), uv.idx);
    }

    out.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::{Instruction, BITRK};
    use crate::bytecode::proto::{Constant, LocVar, UpvalDesc};
    use crate::CoreError;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io;

    fn listing(f: &Prototype) -> String {
        let mut buf = Vec::new();
        print_code(&mut buf, f).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn proto_with(code: &[Instruction], constants: Vec<Constant>) -> Prototype {
        let mut f = Prototype::new("@t.lua");
        f.line_defined = 1;
        f.last_line_defined = 3;
        for &ins in code {
            f.push_code(ins, 2);
        }
        f.constants = constants.into_iter().collect();
        f
    }

    #[test]
    fn loadk_float_scenario() {
        let f = proto_with(
            &[Instruction::abx(OpCode::LoadK, 0, 2)],
            vec![Constant::Nil, Constant::Integer(1), Constant::Number(3.0)],
        );
        assert_eq!(listing(&f), "\t1\t[2]\tLOADK    \t0 2\t; 3.0\n");
    }

    #[test]
    fn unknown_line_prints_dash() {
        let mut f = proto_with(&[], vec![]);
        f.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
        assert_eq!(listing(&f), "\t1\t[-]\tRETURN   \t0 1\n");
    }

    #[test]
    fn rk_operands_and_annotations() {
        let f = proto_with(
            &[
                Instruction::abc(OpCode::Add, 1, Rk::Const(0).to_raw(), 2),
                Instruction::abc(OpCode::Sub, 1, 2, 3),
                Instruction::abc(OpCode::SetTable, 0, Rk::Const(1).to_raw(), Rk::Const(0).to_raw()),
                Instruction::abc(OpCode::GetTable, 4, 0, Rk::Const(1).to_raw()),
            ],
            vec![Constant::Integer(10), Constant::str("key")],
        );
        assert_eq!(
            listing(&f),
            concat!(
                "\t1\t[2]\tADD      \t1 -1 2\t; 10 -\n",
                "\t2\t[2]\tSUB      \t1 2 3\n",
                "\t3\t[2]\tSETTABLE \t0 -2 -1\t; \"key\" 10\n",
                "\t4\t[2]\tGETTABLE \t4 0 -2\t; \"key\"\n",
            )
        );
    }

    #[test]
    fn upvalue_annotations() {
        let mut f = proto_with(
            &[
                Instruction::abc(OpCode::GetTabUp, 0, 0, Rk::Const(0).to_raw()),
                Instruction::abc(OpCode::SetTabUp, 0, Rk::Const(0).to_raw(), 1),
                Instruction::abc(OpCode::GetUpval, 2, 1, 0),
                Instruction::abc(OpCode::SetUpval, 2, 1, 0),
            ],
            vec![Constant::str("print")],
        );
        f.upvalues.push(UpvalDesc::named("_ENV", true, 0));
        f.upvalues.push(UpvalDesc { name: None, in_stack: false, idx: 3 });
        assert_eq!(
            listing(&f),
            concat!(
                "\t1\t[2]\tGETTABUP \t0 0 -1\t; _ENV \"print\"\n",
                "\t2\t[2]\tSETTABUP \t0 -1 1\t; _ENV \"print\"\n",
                "\t3\t[2]\tGETUPVAL \t2 1\t; -\n",
                "\t4\t[2]\tSETUPVAL \t2 1\t; -\n",
            )
        );
    }

    #[test]
    fn setlist_sentinel_consumes_next_word() {
        let f = proto_with(
            &[
                Instruction::abc(OpCode::SetList, 0, 3, 0),
                Instruction(70_000),
                Instruction::abc(OpCode::SetList, 0, 2, 5),
                Instruction::abc(OpCode::Return, 0, 1, 0),
            ],
            vec![],
        );
        assert_eq!(
            listing(&f),
            concat!(
                "\t1\t[2]\tSETLIST  \t0 3 0\t; 70000\n",
                "\t3\t[2]\tSETLIST  \t0 2 5\t; 5\n",
                "\t4\t[2]\tRETURN   \t0 1\n",
            )
        );
    }

    #[test]
    fn extraarg_and_loadkx() {
        let f = proto_with(
            &[Instruction::abx(OpCode::LoadKx, 3, 0), Instruction::ax_word(OpCode::ExtraArg, 1)],
            vec![Constant::Nil, Constant::str("big")],
        );
        assert_eq!(
            listing(&f),
            "\t1\t[2]\tLOADKX   \t3\n\t2\t[2]\tEXTRAARG \t1\t; \"big\"\n"
        );
    }

    #[test]
    fn closure_points_at_nested_header() {
        let mut root = proto_with(&[Instruction::abx(OpCode::Closure, 0, 0)], vec![]);
        root.line_defined = 0;
        root.protos.push(proto_with(&[], vec![]));
        let text = disassemble_full(&root, ListingOptions::default()).unwrap();
        let id = identity(&root.protos[0]);
        assert!(text.contains(&format!("CLOSURE  \t0 0\t; {id}\n")));
        assert!(text.contains(&format!("(0 instructions at {id})")));
    }

    #[test]
    fn header_format() {
        let mut f = Prototype::new("@src/a.lua");
        f.line_defined = 0;
        f.is_vararg = true;
        f.max_stack_size = 2;
        f.upvalues.push(UpvalDesc::named("_ENV", true, 0));
        f.push_code(Instruction::abc(OpCode::Return, 0, 1, 0), 1);
        let mut buf = Vec::new();
        print_header(&mut buf, &f).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let id = identity(&f);
        assert_eq!(
            text,
            format!(
                "\nmain <src/a.lua:0,0> (1 instruction at {id})\n\
                 0+ params, 2 slots, 1 upvalue, 0 locals, 0 constants, 0 functions\n"
            )
        );
    }

    #[test]
    fn source_labels() {
        assert_eq!(source_label(None), b"?");
        assert_eq!(source_label(Some(b"=stdin")), b"stdin");
        assert_eq!(source_label(Some(b"@x.lua")), b"x.lua");
        assert_eq!(source_label(Some(b"\x1bLua")), b"(bstring)");
        assert_eq!(source_label(Some(b"return 1")), b"(string)");
    }

    #[test]
    fn debug_tables() {
        let mut f = proto_with(&[], vec![Constant::Number(0.5), Constant::str("s")]);
        f.loc_vars.push(LocVar { name: b"i".to_vec(), start_pc: 0, end_pc: 4 });
        f.upvalues.push(UpvalDesc::named("_ENV", false, 0));
        f.upvalues.push(UpvalDesc { name: None, in_stack: true, idx: 2 });
        let mut buf = Vec::new();
        print_debug(&mut buf, &f).unwrap();
        let id = identity(&f);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            format!(
                "constants (2) for {id}:\n\t1\t0.5\n\t2\t\"s\"\n\
                 locals (1) for {id}:\n\t0\ti\t1\t5\n\
                 upvalues (2) for {id}:\n\t0\t_ENV\t0\t0\n\t1\t-\t1\t2\n"
            )
        );
    }

    #[test]
    fn every_prototype_gets_one_header() {
        let mut root = proto_with(&[], vec![]);
        root.line_defined = 0;
        let mut a = proto_with(&[], vec![]);
        a.protos.push(proto_with(&[], vec![]));
        root.protos.push(a);
        root.protos.push(proto_with(&[], vec![]));
        let text = disassemble_full(&root, ListingOptions::full()).unwrap();
        assert_eq!(text.matches(" instruction").count(), root.count());
        assert_eq!(text.matches("constants (").count(), 4);
        // pre-order: root, first child, grandchild, second child
        let ids: Vec<String> = root.walk().map(identity).collect();
        let positions: Vec<usize> = ids.iter().map(|id| text.find(&format!("at {id})")).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn invalid_opcode_stops_listing() {
        let f = proto_with(&[Instruction(0x3f)], vec![]);
        let mut buf = Vec::new();
        assert!(matches!(print_code(&mut buf, &f), Err(CoreError::InvalidOpcode { raw: 0x3f })));
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> { Err(io::Error::other("closed")) }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    #[test]
    fn sink_failure_is_an_io_error() {
        let f = proto_with(&[Instruction::abc(OpCode::Return, 0, 1, 0)], vec![]);
        let err = print_function(&mut FailingSink, &f, ListingOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }

    proptest! {
        #[test]
        fn jump_targets(pc in 0usize..200, sbx in -100i32..100) {
            let mut code = vec![Instruction::abc(OpCode::Move, 0, 1, 0); pc];
            code.push(Instruction::asbx(OpCode::Jmp, 0, sbx));
            let f = proto_with(&code, vec![]);
            let text = listing(&f);
            let last = text.lines().last().unwrap();
            let expected = format!("\t{}\t[2]\tJMP      \t0 {sbx}\t; to {}", pc + 1, pc as i64 + i64::from(sbx) + 2);
            prop_assert_eq!(last, expected.as_str());
        }

        #[test]
        fn constant_annotations_match_render(k in 0u32..8, value in any::<i64>()) {
            let mut pool: Vec<Constant> = (0..8).map(|i| Constant::Integer(i)).collect();
            pool[k as usize] = Constant::Integer(value);
            let raw = k + BITRK;
            let f = proto_with(&[Instruction::abc(OpCode::Mul, 0, raw, 1)], pool);
            let text = listing(&f);
            let expected = format!("\t1\t[2]\tMUL      \t0 {} 1\t; {} -\n", -1 - i64::from(k), value);
            prop_assert_eq!(text, expected);
        }
    }
}
