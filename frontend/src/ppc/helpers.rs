//! Helper routines called from generated code.
//!
//! Every helper has the same shape: the state pointer followed by
//! three immediates (register numbers or instruction fields). Helpers
//! read and write guest registers directly in [`PpcState`].

use super::cpu::PpcState;

/// Signature shared by all helpers.
pub type Helper = unsafe extern "C" fn(*mut PpcState, u32, u32, u32);

/// Host address of a helper as embedded in a call op.
pub fn address(helper: Helper) -> u64 {
    helper as usize as u64
}

/// Double bits produced by integer results placed in an FPR.
const FPR_INT_TAG: u64 = 0xFFF8_0000_0000_0000;

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn divw(env: *mut PpcState, rd: u32, ra: u32, rb: u32) {
    let s = &mut *env;
    let a = s.gpr[ra as usize] as i32;
    let b = s.gpr[rb as usize] as i32;
    s.gpr[rd as usize] = if b == 0 || (a == i32::MIN && b == -1) {
        if a < 0 {
            u32::MAX
        } else {
            0
        }
    } else {
        (a / b) as u32
    };
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn divwu(env: *mut PpcState, rd: u32, ra: u32, rb: u32) {
    let s = &mut *env;
    let a = s.gpr[ra as usize];
    let b = s.gpr[rb as usize];
    s.gpr[rd as usize] = a.checked_div(b).unwrap_or(0);
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn mfcr(env: *mut PpcState, rd: u32, _: u32, _: u32) {
    let s = &mut *env;
    s.gpr[rd as usize] = s.cr_word();
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn mtcrf(env: *mut PpcState, rs: u32, crm: u32, _: u32) {
    let s = &mut *env;
    let v = s.gpr[rs as usize];
    for field in 0..8 {
        if crm & (0x80 >> field) == 0 {
            continue;
        }
        for i in field * 4..field * 4 + 4 {
            s.cr[i] = (v >> (31 - i)) & 1;
        }
    }
}

/// Reciprocal estimate, single precision, written to both lanes.
///
/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn fres(env: *mut PpcState, fd: u32, fb: u32, _: u32) {
    let s = &mut *env;
    let r = (1.0 / s.fpr[fb as usize][0]) as f32 as f64;
    s.fpr[fd as usize] = [r, r];
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn frsqrte(env: *mut PpcState, fd: u32, fb: u32, _: u32) {
    let s = &mut *env;
    s.fpr[fd as usize][0] = 1.0 / s.fpr[fb as usize][0].sqrt();
}

/// Convert to a signed word, saturating. NaN converts to the most
/// negative value.
fn to_int_word(v: f64, rounded: f64) -> u32 {
    if v.is_nan() || rounded < -2_147_483_648.0 {
        0x8000_0000
    } else if rounded >= 2_147_483_648.0 {
        0x7FFF_FFFF
    } else {
        rounded as i32 as u32
    }
}

/// `fctiw`: rounding follows FPSCR[RN].
///
/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn fctiw(env: *mut PpcState, fd: u32, fb: u32, _: u32) {
    let s = &mut *env;
    let v = s.fpr[fb as usize][0];
    let rounded = match s.fpscr & 3 {
        0 => v.round_ties_even(),
        1 => v.trunc(),
        2 => v.ceil(),
        _ => v.floor(),
    };
    s.fpr[fd as usize][0] = f64::from_bits(FPR_INT_TAG | to_int_word(v, rounded) as u64);
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn fctiwz(env: *mut PpcState, fd: u32, fb: u32, _: u32) {
    let s = &mut *env;
    let v = s.fpr[fb as usize][0];
    s.fpr[fd as usize][0] = f64::from_bits(FPR_INT_TAG | to_int_word(v, v.trunc()) as u64);
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn mffs(env: *mut PpcState, fd: u32, _: u32, _: u32) {
    let s = &mut *env;
    s.fpr[fd as usize][0] = f64::from_bits(FPR_INT_TAG | s.fpscr as u64);
}

/// Copy the FPSCR fields selected by `fm` from the low word of fB.
/// The host rounding mode is left alone.
///
/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn mtfsf(env: *mut PpcState, fm: u32, fb: u32, _: u32) {
    let s = &mut *env;
    let mask = (0..8)
        .filter(|i| fm & (0x80 >> i) != 0)
        .fold(0u32, |m, i| m | (0xF000_0000 >> (i * 4)));
    let bits = s.fpr[fb as usize][0].to_bits() as u32;
    s.fpscr = (s.fpscr & !mask) | (bits & mask);
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn ps_res(env: *mut PpcState, fd: u32, fb: u32, _: u32) {
    let s = &mut *env;
    let [b0, b1] = s.fpr[fb as usize];
    s.fpr[fd as usize] = [(1.0 / b0) as f32 as f64, (1.0 / b1) as f32 as f64];
}

/// # Safety
/// `env` must point to a live `PpcState`.
pub unsafe extern "C" fn ps_rsqrte(env: *mut PpcState, fd: u32, fb: u32, _: u32) {
    let s = &mut *env;
    let [b0, b1] = s.fpr[fb as usize];
    s.fpr[fd as usize] = [
        (1.0 / b0.sqrt()) as f32 as f64,
        (1.0 / b1.sqrt()) as f32 as f64,
    ];
}

// -- Quantized loads and stores ------------------------------

/// GQR data types.
const QUANT_U8: u32 = 4;
const QUANT_U16: u32 = 5;
const QUANT_S8: u32 = 6;
const QUANT_S16: u32 = 7;

fn quant_size(ty: u32) -> u32 {
    match ty {
        QUANT_U8 | QUANT_S8 => 1,
        QUANT_U16 | QUANT_S16 => 2,
        _ => 4,
    }
}

/// 2^scale for the signed 6-bit scale field.
fn scale_factor(scale: u32) -> f64 {
    let s = ((scale << 26) as i32) >> 26;
    2f64.powi(s)
}

unsafe fn read_bytes<const N: usize>(s: &PpcState, ea: u32) -> [u8; N] {
    let mut out = [0u8; N];
    std::ptr::copy_nonoverlapping(s.membase.add(ea as usize), out.as_mut_ptr(), N);
    out
}

unsafe fn write_bytes(s: &PpcState, ea: u32, bytes: &[u8]) {
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), s.membase.add(ea as usize), bytes.len());
}

unsafe fn load_quantized(s: &PpcState, ea: u32, ty: u32, scale: u32) -> f64 {
    let raw = match ty {
        QUANT_U8 => read_bytes::<1>(s, ea)[0] as f64,
        QUANT_S8 => read_bytes::<1>(s, ea)[0] as i8 as f64,
        QUANT_U16 => u16::from_be_bytes(read_bytes(s, ea)) as f64,
        QUANT_S16 => i16::from_be_bytes(read_bytes(s, ea)) as f64,
        _ => return f32::from_be_bytes(read_bytes(s, ea)) as f64,
    };
    raw / scale_factor(scale)
}

unsafe fn store_quantized(s: &PpcState, ea: u32, ty: u32, scale: u32, v: f64) {
    // `as` saturates out-of-range values and maps NaN to 0.
    let q = v * scale_factor(scale);
    match ty {
        QUANT_U8 => write_bytes(s, ea, &[q as u8]),
        QUANT_S8 => write_bytes(s, ea, &(q as i8).to_be_bytes()),
        QUANT_U16 => write_bytes(s, ea, &(q as u16).to_be_bytes()),
        QUANT_S16 => write_bytes(s, ea, &(q as i16).to_be_bytes()),
        _ => write_bytes(s, ea, &(v as f32).to_be_bytes()),
    }
}

/// `psq_l`: dequantize one or two values at `scratch_ea` using
/// GQR[`i`]. With `w` set ps1 becomes 1.0.
///
/// # Safety
/// `env` must point to a live `PpcState` whose `membase` maps the
/// accessed guest bytes.
pub unsafe extern "C" fn psq_load(env: *mut PpcState, fd: u32, w: u32, i: u32) {
    let s = &mut *env;
    let gqr = s.gqr[(i & 7) as usize];
    let ty = (gqr >> 16) & 7;
    let scale = (gqr >> 24) & 0x3F;
    let ea = s.scratch_ea;
    let ps0 = load_quantized(s, ea, ty, scale);
    let ps1 = if w != 0 {
        1.0
    } else {
        load_quantized(s, ea.wrapping_add(quant_size(ty)), ty, scale)
    };
    s.fpr[fd as usize] = [ps0, ps1];
}

/// `psq_st`: quantize ps0 (and ps1 unless `w`) to `scratch_ea`
/// using GQR[`i`].
///
/// # Safety
/// `env` must point to a live `PpcState` whose `membase` maps the
/// accessed guest bytes.
pub unsafe extern "C" fn psq_store(env: *mut PpcState, fs: u32, w: u32, i: u32) {
    let s = &*env;
    let gqr = s.gqr[(i & 7) as usize];
    let ty = gqr & 7;
    let scale = (gqr >> 8) & 0x3F;
    let ea = s.scratch_ea;
    let [ps0, ps1] = s.fpr[fs as usize];
    store_quantized(s, ea, ty, scale, ps0);
    if w == 0 {
        store_quantized(s, ea.wrapping_add(quant_size(ty)), ty, scale, ps1);
    }
}
