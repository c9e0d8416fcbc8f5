use ppcrec_backend::code_buffer::CodeBuffer;

#[test]
fn test_emit_and_read() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u8(0x90); // NOP
    buf.emit_u32(0xDEADBEEF);
    assert_eq!(buf.offset(), 5);
    assert_eq!(buf.as_slice()[0], 0x90);
    assert_eq!(buf.read_u32(1), 0xDEADBEEF);
}

#[test]
fn test_patch() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u32(0);
    buf.emit_u8(0);
    buf.patch_u32(0, 0x12345678);
    buf.patch_u8(4, 0xEB);
    assert_eq!(buf.read_u32(0), 0x12345678);
    assert_eq!(buf.as_slice()[4], 0xEB);
}

#[test]
fn test_size_rounds_up_to_page() {
    let buf = CodeBuffer::new(1).unwrap();
    assert!(buf.capacity() >= 4096);
    assert_eq!(buf.capacity() % 4096, 0);
    assert_eq!(buf.remaining(), buf.capacity());
}

#[test]
fn test_truncate_rolls_back() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_bytes(&[1, 2, 3, 4]);
    let mark = buf.offset();
    buf.emit_u64(u64::MAX);
    buf.truncate(mark);
    assert_eq!(buf.offset(), 4);
    assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn test_has_room_and_pointers() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let cap = buf.capacity();
    assert!(buf.has_room(cap));
    assert!(!buf.has_room(cap + 1));
    buf.emit_u16(0xC3C3);
    assert_eq!(buf.ptr_at(2) as usize - buf.base_ptr() as usize, 2);
}

#[test]
#[should_panic(expected = "code buffer overflow")]
fn test_overflow_panics() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let cap = buf.capacity();
    buf.emit_bytes(&vec![0u8; cap]);
    buf.emit_u8(0);
}
