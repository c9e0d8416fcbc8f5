use ppcrec_frontend::ppc::helpers;
use ppcrec_frontend::PpcState;

fn word_of(v: f64) -> u32 {
    let bits = v.to_bits();
    assert_eq!(bits >> 32, 0xFFF8_0000);
    bits as u32
}

#[test]
fn test_divw_edge_cases() {
    let mut s = PpcState::default();
    s.gpr[4] = (-7i32) as u32;
    s.gpr[5] = 2;
    unsafe { helpers::divw(&mut s, 3, 4, 5) };
    assert_eq!(s.gpr[3] as i32, -3);

    s.gpr[5] = 0;
    unsafe { helpers::divw(&mut s, 3, 4, 5) };
    assert_eq!(s.gpr[3], u32::MAX);

    s.gpr[4] = 7;
    unsafe { helpers::divw(&mut s, 3, 4, 5) };
    assert_eq!(s.gpr[3], 0);

    s.gpr[4] = i32::MIN as u32;
    s.gpr[5] = u32::MAX;
    unsafe { helpers::divw(&mut s, 3, 4, 5) };
    assert_eq!(s.gpr[3], u32::MAX);
}

#[test]
fn test_divwu_by_zero() {
    let mut s = PpcState::default();
    s.gpr[4] = 100;
    s.gpr[5] = 7;
    unsafe { helpers::divwu(&mut s, 3, 4, 5) };
    assert_eq!(s.gpr[3], 14);
    s.gpr[5] = 0;
    unsafe { helpers::divwu(&mut s, 3, 4, 5) };
    assert_eq!(s.gpr[3], 0);
}

#[test]
fn test_cr_transfer() {
    let mut s = PpcState::default();
    s.gpr[4] = 0x1234_5678;
    unsafe { helpers::mtcrf(&mut s, 4, 0x80, 0) };
    assert_eq!(s.cr_word(), 0x1000_0000);

    unsafe { helpers::mtcrf(&mut s, 4, 0xFF, 0) };
    unsafe { helpers::mfcr(&mut s, 6, 0, 0) };
    assert_eq!(s.gpr[6], 0x1234_5678);
}

#[test]
fn test_cr_and_xer_words() {
    let mut s = PpcState::default();
    s.set_cr_word(0x8000_0001);
    assert_eq!(s.cr[0], 1);
    assert_eq!(s.cr[31], 1);
    assert_eq!(s.cr[1], 0);
    assert_eq!(s.cr_word(), 0x8000_0001);

    s.set_xer(0xA000_0000);
    assert_eq!((s.xer_so, s.xer_ov, s.xer_ca), (1, 0, 1));
    assert_eq!(s.xer(), 0xA000_0000);
}

#[test]
fn test_fctiw_follows_rounding_mode() {
    let mut s = PpcState::default();
    s.fpr[2][0] = 2.5;

    unsafe { helpers::fctiw(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]), 2);

    s.fpscr = 2;
    unsafe { helpers::fctiw(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]), 3);

    s.fpscr = 3;
    s.fpr[2][0] = -2.5;
    unsafe { helpers::fctiw(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]) as i32, -3);
}

#[test]
fn test_fctiw_saturates() {
    let mut s = PpcState::default();
    s.fpr[2][0] = 3.0e9;
    unsafe { helpers::fctiw(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]), 0x7FFF_FFFF);

    s.fpr[2][0] = -3.0e9;
    unsafe { helpers::fctiw(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]), 0x8000_0000);

    s.fpr[2][0] = f64::NAN;
    unsafe { helpers::fctiwz(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]), 0x8000_0000);
}

#[test]
fn test_fctiwz_truncates() {
    let mut s = PpcState::default();
    s.fpscr = 2;
    s.fpr[2][0] = -2.7;
    unsafe { helpers::fctiwz(&mut s, 1, 2, 0) };
    assert_eq!(word_of(s.fpr[1][0]) as i32, -2);
}

#[test]
fn test_reciprocal_estimates_are_single() {
    let mut s = PpcState::default();
    s.fpr[2] = [3.0, 4.0];
    unsafe { helpers::fres(&mut s, 1, 2, 0) };
    let third = (1.0f64 / 3.0) as f32 as f64;
    assert_eq!(s.fpr[1], [third, third]);

    unsafe { helpers::ps_res(&mut s, 5, 2, 0) };
    assert_eq!(s.fpr[5], [third, 0.25]);
}

#[test]
fn test_mtfsf_copies_selected_fields() {
    let mut s = PpcState::default();
    s.fpscr = 0x0000_0003;
    s.fpr[2][0] = f64::from_bits(0xFFF8_0000_A000_0001);
    unsafe { helpers::mtfsf(&mut s, 0x01, 2, 0) };
    assert_eq!(s.fpscr, 0x0000_0001);

    unsafe { helpers::mffs(&mut s, 3, 0, 0) };
    assert_eq!(word_of(s.fpr[3][0]), 0x0000_0001);
}

#[test]
fn test_quantized_load() {
    let mut mem = vec![0u8; 64];
    mem[0x10..0x14].copy_from_slice(&[0x01, 0x00, 0xFF, 0x00]);
    mem[0x20..0x24].copy_from_slice(&1.5f32.to_be_bytes());
    let mut s = PpcState::new(mem.as_mut_ptr());

    // s16, scale 8
    s.gqr[1] = (7 << 16) | (8 << 24);
    s.scratch_ea = 0x10;
    unsafe { helpers::psq_load(&mut s, 1, 0, 1) };
    assert_eq!(s.fpr[1], [1.0, -1.0]);

    // float, single value
    s.scratch_ea = 0x20;
    unsafe { helpers::psq_load(&mut s, 2, 1, 0) };
    assert_eq!(s.fpr[2], [1.5, 1.0]);
}

#[test]
fn test_quantized_store_saturates() {
    let mut mem = vec![0u8; 64];
    let mut s = PpcState::new(mem.as_mut_ptr());

    // u8, scale 1
    s.gqr[2] = 4 | (1 << 8);
    s.fpr[3] = [3.0, 200.0];
    s.scratch_ea = 0x8;
    unsafe { helpers::psq_store(&mut s, 3, 0, 2) };

    s.gqr[0] = 0;
    s.fpr[4] = [-2.0, 9.0];
    s.scratch_ea = 0x20;
    unsafe { helpers::psq_store(&mut s, 4, 1, 0) };

    assert_eq!(&mem[0x8..0xA], &[6, 255]);
    assert_eq!(&mem[0x20..0x24], &(-2.0f32).to_be_bytes());
    assert_eq!(&mem[0x24..0x28], &[0, 0, 0, 0]);
}
