use ppcrec_backend::{HostCodeGen, X86_64CodeGen};
use ppcrec_core::dump::dump_ops;
use ppcrec_core::{Context, Opcode, Segment};
use ppcrec_frontend::ppc::cpu::MEMBASE_OFFSET;
use ppcrec_frontend::{lower_function, FunctionBoundaryScanner, LowerError, LowerOptions};

use crate::guest::{asm, GuestImage};

fn lower_with(
    image: &GuestImage,
    entry: u32,
    opts: LowerOptions,
) -> Result<Context, LowerError> {
    let scan = FunctionBoundaryScanner::new().scan(image, entry);
    let backend = X86_64CodeGen::new(MEMBASE_OFFSET as i32);
    let mut ir = Context::new();
    let env = backend.init_context(&mut ir);
    lower_function(&mut ir, env, image, &scan, opts)?;
    Ok(ir)
}

fn lower(image: &GuestImage, entry: u32) -> Context {
    lower_with(image, entry, LowerOptions::default()).unwrap()
}

fn starts(ir: &Context) -> Vec<u32> {
    ir.segments().iter().map(|s| s.guest_start).collect()
}

fn segment(ir: &Context, addr: u32) -> &Segment {
    ir.segment(ir.segment_at(addr).unwrap())
}

fn count_ops(ir: &Context, opc: Opcode) -> usize {
    ir.segments()
        .iter()
        .flat_map(|s| &s.ops)
        .filter(|op| op.opc == opc)
        .count()
}

/// Cycles charged by the segment's `count_cycles` op.
fn charged_cycles(seg: &Segment) -> u32 {
    seg.ops
        .iter()
        .find(|op| op.opc == Opcode::CountCycles)
        .map(|op| op.carg(1))
        .unwrap()
}

fn dump(ir: &Context) -> String {
    let mut out = Vec::new();
    dump_ops(ir, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_conditional_branch_splits_segments() {
    let image = GuestImage::new();
    image.load(
        0x1000,
        &[
            asm::cmpwi(0, 3, 0),
            asm::beq(0x1004, 0x1010),
            asm::li(3, 1),
            asm::BLR,
            asm::li(3, 2),
            asm::BLR,
        ],
    );
    let ir = lower(&image, 0x1000);
    assert_eq!(starts(&ir), vec![0x1000, 0x1008, 0x1010]);

    let entry = segment(&ir, 0x1000);
    assert!(entry.is_enterable);
    assert!(!entry.is_jump_target);
    assert_eq!(entry.num_insns, 2);
    assert_eq!(charged_cycles(entry), 2);

    let fallthrough = segment(&ir, 0x1008);
    assert!(!fallthrough.is_enterable);
    assert_eq!(fallthrough.num_insns, 2);

    let target = segment(&ir, 0x1010);
    assert!(target.is_enterable);
    assert!(target.is_jump_target);
    assert_eq!(target.ops[0].opc, Opcode::CheckCycles);
    assert_eq!(target.ops[0].carg(2), 0x1010);
    assert_eq!(count_ops(&ir, Opcode::CheckCycles), 1);
}

#[test]
fn test_cycles_scale_with_cost() {
    let image = GuestImage::new();
    image.load(0x1100, &[asm::li(3, 1), asm::li(4, 2), asm::li(5, 3), asm::BLR]);
    let opts = LowerOptions {
        cycles_per_instruction: 3,
        ..LowerOptions::default()
    };
    let ir = lower_with(&image, 0x1100, opts).unwrap();
    assert_eq!(charged_cycles(segment(&ir, 0x1100)), 12);
}

#[test]
fn test_return_site_of_call_is_enterable() {
    let image = GuestImage::new();
    image.load(
        0x2000,
        &[
            asm::li(3, 1),
            asm::bl(0x2004, 0x5000),
            asm::addi(3, 3, 1),
            asm::BLR,
        ],
    );
    let ir = lower(&image, 0x2000);
    assert_eq!(starts(&ir), vec![0x2000, 0x2008]);
    let ret = segment(&ir, 0x2008);
    assert!(ret.is_enterable);
    assert!(!ret.is_jump_target);
    assert_eq!(ret.enter_guest_address, 0x2008);
}

#[test]
fn test_branch_out_of_function_gets_exit_stub() {
    let image = GuestImage::new();
    // 0x3100 is never mapped, so the branch target stays outside.
    image.load(0x3000, &[asm::beq(0x3000, 0x3100), asm::BLR]);
    let ir = lower(&image, 0x3000);

    assert_eq!(starts(&ir), vec![0x3000, 0x3004, 0x3100]);
    let stub = segment(&ir, 0x3100);
    assert!(!stub.is_enterable);
    assert_eq!(stub.num_insns, 0);
    let ops: Vec<Opcode> = stub.ops.iter().map(|op| op.opc).collect();
    assert_eq!(ops, vec![Opcode::St, Opcode::Exit]);
}

#[test]
fn test_hle_call_leaves_at_its_own_address() {
    let image = GuestImage::new();
    image.set_handler_returns(1);
    image.load(
        0x4000,
        &[asm::li(3, 1), asm::hle(0x1001), asm::li(3, 2), asm::BLR],
    );
    let ir = lower(&image, 0x4000);

    assert_eq!(starts(&ir), vec![0x4000, 0x4008]);
    assert!(segment(&ir, 0x4008).is_enterable);
    let text = dump(&ir);
    assert!(text.contains(" st_i32 $0x4004, env"), "{text}");
}

#[test]
fn test_unconditional_branch_inside_function_is_local() {
    let image = GuestImage::new();
    image.load(
        0x4100,
        &[
            asm::b(0x4100, 0x4108),
            0,
            asm::li(3, 1),
            asm::BLR,
        ],
    );
    let ir = lower(&image, 0x4100);
    assert_eq!(starts(&ir), vec![0x4100, 0x4108]);
    let target = segment(&ir, 0x4108);
    assert!(target.is_jump_target);
    assert_eq!(count_ops(&ir, Opcode::Br), 1);
}

#[test]
fn test_unsupported_instruction_abandons_function() {
    let image = GuestImage::new();
    image.load(0x5000, &[asm::li(3, 1), asm::SC, asm::BLR]);
    let err = lower_with(&image, 0x5000, LowerOptions::default()).unwrap_err();
    assert_eq!(
        err,
        LowerError::Unsupported {
            address: 0x5004,
            opcode: asm::SC,
        }
    );
}

#[test]
fn test_accurate_multiply_masks_zero_factors() {
    let image = GuestImage::new();
    image.load(0x6000, &[asm::fmul(1, 2, 3), asm::BLR]);

    let accurate = lower(&image, 0x6000);
    assert_eq!(count_ops(&accurate, Opcode::FMulBottom), 1);
    assert_eq!(count_ops(&accurate, Opcode::FZeroMask), 2);
    assert_eq!(count_ops(&accurate, Opcode::FAndNot), 1);

    let opts = LowerOptions {
        accurate_multiply: false,
        ..LowerOptions::default()
    };
    let plain = lower_with(&image, 0x6000, opts).unwrap();
    assert_eq!(count_ops(&plain, Opcode::FMulBottom), 1);
    assert_eq!(count_ops(&plain, Opcode::FZeroMask), 0);
}

#[test]
fn test_registers_are_named_globals() {
    let image = GuestImage::new();
    image.load(0x7000, &[asm::add(3, 4, 5), asm::BLR]);
    let text = dump(&lower(&image, 0x7000));
    assert!(text.starts_with("L0: segment 0 @ 0x00007000 enter=0x00007000\n"));
    assert!(text.contains(" ---- 0x00007000\n"));
    assert!(text.contains("add_i32 "));
    assert!(text.contains(" lr"));
}
