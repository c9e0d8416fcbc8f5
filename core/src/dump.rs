//! Text rendering of lowered functions, one line per op.

use std::fmt;
use std::io::{self, Write};

use crate::context::Context;
use crate::ir_builder::FCmpMode;
use crate::op::Op;
use crate::opcode::Opcode;
use crate::temp::{TempIdx, TempKind};
use crate::types::{Cond, Type};

struct TempName<'a>(&'a Context, TempIdx);

impl fmt::Display for TempName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TempName(ctx, idx) = *self;
        if idx.0 >= ctx.nb_temps() {
            return write!(f, "$0x{:x}", idx.0);
        }
        let t = ctx.temp(idx);
        match (t.kind, t.name) {
            (TempKind::Const, _) => write!(f, "$0x{:x}", t.val),
            (TempKind::Global | TempKind::Fixed, Some(name)) => f.write_str(name),
            (TempKind::Global, None) => write!(f, "g{}", idx.0),
            (TempKind::Fixed, None) => write!(f, "fixed({})", t.reg.unwrap_or(0)),
            (TempKind::Ebb, _) => write!(f, "tmp{}", idx.0 - ctx.nb_globals()),
        }
    }
}

fn fcmp_name(mode: FCmpMode) -> &'static str {
    match mode {
        FCmpMode::Lt => "lt",
        FCmpMode::Gt => "gt",
        FCmpMode::Eq => "eq",
        FCmpMode::Unordered => "un",
    }
}

/// Constant arguments rendered the way the opcode interprets them.
fn const_args(op: &Op) -> Vec<String> {
    let c: Vec<u32> = op.cargs().iter().map(|a| a.0).collect();
    let cond = |v: u32| format!("{:?}", Cond::from_u32(v)).to_lowercase();
    match op.opc {
        Opcode::BrCond => vec![cond(c[0]), format!("L{}", c[1])],
        Opcode::SetCond => vec![cond(c[0])],
        Opcode::FCmpBottom => vec![fcmp_name(FCmpMode::from_u32(c[0])).to_string()],
        Opcode::Br => vec![format!("L{}", c[0])],
        Opcode::Call => {
            let target = u64::from(c[4]) << 32 | u64::from(c[3]);
            [target, c[0].into(), c[1].into(), c[2].into()]
                .iter()
                .map(|v| format!("$0x{v:x}"))
                .collect()
        }
        _ => c.iter().map(|v| format!("$0x{v:x}")).collect(),
    }
}

/// Write every segment of `ctx` and its ops.
pub fn dump_ops(ctx: &Context, w: &mut impl Write) -> io::Result<()> {
    dump_ops_with(ctx, w, |_, _| Ok(()))
}

/// Like [`dump_ops`], calling `insn_anno(pc, w)` at the end of each
/// `---- 0x...` instruction header so callers can append the guest
/// instruction.
pub fn dump_ops_with(
    ctx: &Context,
    w: &mut impl Write,
    insn_anno: impl Fn(u32, &mut dyn Write) -> io::Result<()>,
) -> io::Result<()> {
    for seg in ctx.segments() {
        write!(w, "L{}: segment {} @ 0x{:08x}", seg.label, seg.id, seg.guest_start)?;
        if seg.is_enterable {
            write!(w, " enter=0x{:08x}", seg.enter_guest_address)?;
        }
        if seg.is_jump_target {
            w.write_all(b" jump-target")?;
        }
        writeln!(w)?;

        for op in &seg.ops {
            if op.opc == Opcode::InsnStart {
                let pc = op.carg(0);
                write!(w, " ---- 0x{pc:08x}")?;
                insn_anno(pc, w)?;
                writeln!(w)?;
                continue;
            }
            let mut args: Vec<String> = op
                .oargs()
                .iter()
                .chain(op.iargs())
                .map(|&t| TempName(ctx, t).to_string())
                .collect();
            args.extend(const_args(op));

            let suffix = match (op.opc.is_int_polymorphic(), op.op_type) {
                (true, Type::I32) => "_i32",
                (true, Type::I64) => "_i64",
                _ => "",
            };
            write!(w, " {}{suffix}", op.opc.def().name)?;
            if !args.is_empty() {
                write!(w, " {}", args.join(", "))?;
            }
            writeln!(w)?;
        }
    }
    Ok(())
}
