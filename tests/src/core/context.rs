use ppcrec_core::{Context, Opcode, TempKind, Type};

#[test]
fn test_globals_precede_locals() {
    let mut ctx = Context::new();
    let env = ctx.new_fixed(Type::I64, 5, "env");
    let r0 = ctx.new_global(Type::I32, env, 0, "gpr");
    let t = ctx.new_temp(Type::I32);

    assert_eq!(ctx.nb_globals(), 2);
    assert_eq!(ctx.nb_temps(), 3);
    assert_eq!(ctx.temp(env).kind, TempKind::Fixed);
    assert_eq!(ctx.temp(r0).kind, TempKind::Global);
    assert_eq!(ctx.temp(t).kind, TempKind::Ebb);
    assert_eq!(ctx.globals().len(), 2);
}

#[test]
#[should_panic(expected = "globals must be registered before locals")]
fn test_global_after_local_panics() {
    let mut ctx = Context::new();
    let env = ctx.new_fixed(Type::I64, 5, "env");
    ctx.new_temp(Type::I32);
    ctx.new_global(Type::I32, env, 0, "gpr");
}

#[test]
fn test_constants_are_deduplicated_per_type() {
    let mut ctx = Context::new();
    let a = ctx.new_const(Type::I32, 42);
    let b = ctx.new_const(Type::I32, 42);
    let c = ctx.new_const(Type::I64, 42);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(ctx.temp(a).is_const());
    assert_eq!(ctx.temp(a).val, 42);
}

#[test]
fn test_segments_and_labels() {
    let mut ctx = Context::new();
    let s0 = ctx.begin_segment(0x8000_0000);
    let s1 = ctx.begin_segment(0x8000_0010);
    assert_eq!(ctx.num_segments(), 2);
    assert_ne!(ctx.segment(s0).label, ctx.segment(s1).label);
    assert_eq!(ctx.segment_at(0x8000_0010), Some(s1));
    assert_eq!(ctx.segment_at(0x8000_0004), None);
    assert_eq!(ctx.current_segment(), Some(s1));

    ctx.gen_insn_start(0x8000_0010);
    ctx.set_current_segment(s0);
    ctx.gen_insn_start(0x8000_0000);
    ctx.gen_exit(0);

    assert_eq!(ctx.segment(s0).ops.len(), 2);
    assert_eq!(ctx.segment(s1).ops.len(), 1);
    assert_eq!(ctx.num_ops(), 3);
    assert_eq!(ctx.segment(s0).ops[1].opc, Opcode::Exit);
}

#[test]
fn test_emit_without_segment_opens_one() {
    let mut ctx = Context::new();
    ctx.gen_exit(0);
    assert_eq!(ctx.num_segments(), 1);
    assert_eq!(ctx.segment(0).guest_start, 0);
}

#[test]
fn test_segment_entry_and_extent() {
    let mut ctx = Context::new();
    let sid = ctx.begin_segment(0x1000);
    let seg = ctx.segment_mut(sid);
    assert!(!seg.is_enterable);
    seg.num_insns = 3;
    seg.mark_enterable();
    assert!(seg.is_enterable);
    assert_eq!(seg.enter_guest_address, 0x1000);
    assert_eq!(seg.guest_end(), 0x100C);
}

#[test]
fn test_reset_keeps_globals() {
    let mut ctx = Context::new();
    let env = ctx.new_fixed(Type::I64, 5, "env");
    ctx.new_global(Type::I32, env, 0, "gpr");
    ctx.begin_segment(0x1000);
    ctx.new_temp(Type::I32);
    ctx.new_const(Type::I32, 7);
    ctx.gen_exit(0);

    ctx.reset();
    assert_eq!(ctx.nb_temps(), 2);
    assert_eq!(ctx.num_segments(), 0);
    assert!(ctx.labels().is_empty());
}
