use ppcrec_backend::code_buffer::CodeBuffer;
use ppcrec_backend::{emit_function, EmitError, EmittedFunction, HostCodeGen, X86_64CodeGen};
use ppcrec_core::{Context, Type};
use ppcrec_frontend::ppc::cpu::{MEMBASE_OFFSET, PC_OFFSET};
use ppcrec_frontend::{lower_function, FunctionBoundaryScanner, LowerOptions};

use crate::guest::{asm, GuestImage};

fn backend_with_prologue(buf: &mut CodeBuffer) -> X86_64CodeGen {
    let mut backend = X86_64CodeGen::new(MEMBASE_OFFSET as i32);
    backend.emit_prologue(buf);
    backend.emit_epilogue(buf);
    backend
}

fn compile(
    image: &GuestImage,
    entry: u32,
    backend: &X86_64CodeGen,
    buf: &mut CodeBuffer,
) -> Result<EmittedFunction, EmitError> {
    let scan = FunctionBoundaryScanner::new().scan(image, entry);
    let mut ir = Context::new();
    let env = backend.init_context(&mut ir);
    lower_function(&mut ir, env, image, &scan, LowerOptions::default()).unwrap();
    emit_function(&mut ir, backend, buf)
}

#[test]
fn test_prologue_precedes_functions() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let backend = backend_with_prologue(&mut buf);
    assert_eq!(backend.prologue_offset, 0);
    assert!(backend.code_gen_start > backend.prologue_offset);
    assert!(backend.epilogue_offset() < backend.code_gen_start);
    assert_eq!(buf.offset(), backend.code_gen_start);
}

#[test]
fn test_entries_for_enterable_segments() {
    let image = GuestImage::new();
    // 0x1000 beq 0x100C ; li r3,1 ; blr ; 0x100C li r3,2 ; blr
    image.load(
        0x1000,
        &[
            asm::beq(0x1000, 0x100C),
            asm::li(3, 1),
            asm::BLR,
            asm::li(3, 2),
            asm::BLR,
        ],
    );
    let mut buf = CodeBuffer::new(1 << 16).unwrap();
    let backend = backend_with_prologue(&mut buf);
    let start = buf.offset();

    let f = compile(&image, 0x1000, &backend, &mut buf).unwrap();
    assert_eq!(f.offset, start);
    assert_eq!(f.size, buf.offset() - start);

    let guests: Vec<u32> = f.entries.iter().map(|e| e.guest_address).collect();
    assert_eq!(guests, vec![0x1000, 0x100C]);
    assert_eq!(f.entries[0].offset, f.offset);
    for e in &f.entries {
        assert!(e.offset >= f.offset && e.offset < f.offset + f.size);
    }
}

#[test]
fn test_functions_are_appended() {
    let image = GuestImage::new();
    image.load(0x2000, &[asm::li(3, 1), asm::BLR]);
    image.load(0x3000, &[asm::li(4, 1), asm::BLR]);
    let mut buf = CodeBuffer::new(1 << 16).unwrap();
    let backend = backend_with_prologue(&mut buf);

    let a = compile(&image, 0x2000, &backend, &mut buf).unwrap();
    let b = compile(&image, 0x3000, &backend, &mut buf).unwrap();
    assert_eq!(b.offset, a.offset + a.size);
}

#[test]
fn test_full_buffer_rolls_back() {
    let image = GuestImage::new();
    let body: Vec<u32> = (0..1500)
        .map(|i| asm::addi(3 + i % 8, 3 + i % 8, 1))
        .chain([asm::BLR])
        .collect();
    image.load(0x4000, &body);

    let mut buf = CodeBuffer::new(4096).unwrap();
    let backend = backend_with_prologue(&mut buf);
    let before = buf.offset();

    let err = compile(&image, 0x4000, &backend, &mut buf).unwrap_err();
    assert_eq!(err, EmitError::CodeBufferFull);
    assert_eq!(buf.offset(), before);
}

#[test]
fn test_store_through_state_pointer() {
    let mut buf = CodeBuffer::new(1 << 16).unwrap();
    let backend = backend_with_prologue(&mut buf);

    let mut ir = Context::new();
    let env = backend.init_context(&mut ir);
    ir.begin_segment(0x5000);
    let pc = ir.new_const(Type::I32, 0x5004);
    ir.gen_st(Type::I32, pc, env, PC_OFFSET);
    ir.gen_exit(0);

    let f = emit_function(&mut ir, &backend, &mut buf).unwrap();
    assert!(f.size > 0);
}

#[test]
fn test_guest_and_register_stores() {
    let image = GuestImage::new();
    image.load(
        0x6000,
        &[asm::lwz(5, 0, 4), asm::addi(5, 5, 1), asm::stw(5, 4, 4), asm::BLR],
    );
    let mut buf = CodeBuffer::new(1 << 16).unwrap();
    let backend = backend_with_prologue(&mut buf);

    let f = compile(&image, 0x6000, &backend, &mut buf).unwrap();
    let guests: Vec<u32> = f.entries.iter().map(|e| e.guest_address).collect();
    assert_eq!(guests, vec![0x6000]);
}
