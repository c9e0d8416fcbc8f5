use ppcrec_core::dump::{dump_ops, dump_ops_with};
use ppcrec_core::{Cond, Context, Type};

fn render(ctx: &Context) -> String {
    let mut out = Vec::new();
    dump_ops(ctx, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn increment_function() -> Context {
    let mut ctx = Context::new();
    let env = ctx.new_fixed(Type::I64, 5, "env");
    let r3 = ctx.new_global(Type::I32, env, 12, "gpr");
    let sid = ctx.begin_segment(0x8000_1000);
    ctx.segment_mut(sid).mark_enterable();
    ctx.gen_insn_start(0x8000_1000);
    let t = ctx.new_temp(Type::I32);
    let one = ctx.new_const(Type::I32, 1);
    ctx.gen_add(Type::I32, t, r3, one);
    ctx.gen_mov(Type::I32, r3, t);
    ctx.gen_exit(0);
    ctx
}

#[test]
fn test_dump_segment_and_ops() {
    let text = render(&increment_function());
    let expected = "\
L0: segment 0 @ 0x80001000 enter=0x80001000
 ---- 0x80001000
 add_i32 tmp0, gpr, $0x1
 mov_i32 gpr, tmp0
 exit $0x0
";
    assert_eq!(text, expected);
}

#[test]
fn test_dump_branches_name_labels() {
    let mut ctx = Context::new();
    let env = ctx.new_fixed(Type::I64, 5, "env");
    let cr = ctx.new_global(Type::I32, env, 0, "cr");
    let head = ctx.begin_segment(0x100);
    let tail = ctx.begin_segment(0x108);
    ctx.segment_mut(tail).is_jump_target = true;
    ctx.segment_mut(tail).mark_enterable();

    ctx.set_current_segment(head);
    let zero = ctx.new_const(Type::I32, 0);
    let label = ctx.segment(tail).label;
    ctx.gen_brcond(Type::I32, cr, zero, Cond::Ne, label);
    ctx.gen_br(label);

    let text = render(&ctx);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "L0: segment 0 @ 0x00000100");
    assert_eq!(lines[1], " brcond_i32 cr, $0x0, ne, L1");
    assert_eq!(lines[2], " br L1");
    assert_eq!(lines[3], "L1: segment 1 @ 0x00000108 enter=0x00000108 jump-target");
}

#[test]
fn test_dump_with_instruction_annotation() {
    let ctx = increment_function();
    let mut out = Vec::new();
    dump_ops_with(&ctx, &mut out, |pc, w| write!(w, "  ; pc {pc:#x}")).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains(" ---- 0x80001000  ; pc 0x80001000\n"));
}
