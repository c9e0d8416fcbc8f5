//! PowerPC (Espresso) guest CPU state as seen by generated code.

use std::mem::offset_of;

/// Number of general-purpose registers (r0-r31).
pub const NUM_GPRS: usize = 32;
/// Number of floating-point registers (f0-f31).
pub const NUM_FPRS: usize = 32;
/// Number of condition register bits.
pub const NUM_CR_BITS: usize = 32;
/// Number of graphics quantization registers.
pub const NUM_GQRS: usize = 8;

/// Guest CPU architectural state.
///
/// Layout must be `#[repr(C)]` so that IR globals can reference
/// fields at fixed offsets from the state pointer. Helper routines
/// called from generated code receive a pointer to this struct.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct PpcState {
    /// General-purpose registers r0-r31.
    pub gpr: [u32; NUM_GPRS],
    /// Floating-point registers as (ps0, ps1) pairs.
    pub fpr: [[f64; 2]; NUM_FPRS],
    /// Condition register, one bit per word (0 or 1). Bit 0 is
    /// CR0.LT, bit 31 is CR7.SO.
    pub cr: [u32; NUM_CR_BITS],
    pub lr: u32,
    pub ctr: u32,
    /// XER carry bit.
    pub xer_ca: u32,
    /// XER summary overflow bit.
    pub xer_so: u32,
    /// XER overflow bit.
    pub xer_ov: u32,
    /// Next guest PC, written whenever generated code returns.
    pub pc: u32,
    /// Remaining cycle budget; code leaves at a loop head once
    /// this goes negative.
    pub remaining_cycles: i32,
    pub gqr: [u32; NUM_GQRS],
    /// lwarx/stwcx. reservation.
    pub reservation_addr: u32,
    pub reservation_val: u32,
    pub fpscr: u32,
    /// Effective address handed to quantized load/store helpers.
    pub scratch_ea: u32,
    /// Host address of guest address 0.
    pub membase: *mut u8,
}

// SAFETY: `membase` points into guest memory shared by the whole
// emulator; the state itself is owned by one guest thread at a time.
unsafe impl Send for PpcState {}

// Field offsets (bytes) from the start of PpcState.
// Used by `Context::new_global()` to bind IR temps.

/// Byte offset of `gpr[i]`.
pub const fn gpr_offset(i: usize) -> i64 {
    (offset_of!(PpcState, gpr) + i * 4) as i64
}

/// Byte offset of `fpr[i]` (both lanes).
pub const fn fpr_offset(i: usize) -> i64 {
    (offset_of!(PpcState, fpr) + i * 16) as i64
}

/// Byte offset of `cr[i]`.
pub const fn cr_offset(i: usize) -> i64 {
    (offset_of!(PpcState, cr) + i * 4) as i64
}

/// Byte offset of `gqr[i]`.
pub const fn gqr_offset(i: usize) -> i64 {
    (offset_of!(PpcState, gqr) + i * 4) as i64
}

pub const LR_OFFSET: i64 = offset_of!(PpcState, lr) as i64;
pub const CTR_OFFSET: i64 = offset_of!(PpcState, ctr) as i64;
pub const XER_CA_OFFSET: i64 = offset_of!(PpcState, xer_ca) as i64;
pub const XER_SO_OFFSET: i64 = offset_of!(PpcState, xer_so) as i64;
pub const XER_OV_OFFSET: i64 = offset_of!(PpcState, xer_ov) as i64;
pub const PC_OFFSET: i64 = offset_of!(PpcState, pc) as i64;
pub const CYCLES_OFFSET: i64 = offset_of!(PpcState, remaining_cycles) as i64;
pub const SCRATCH_EA_OFFSET: i64 = offset_of!(PpcState, scratch_ea) as i64;
pub const MEMBASE_OFFSET: i64 = offset_of!(PpcState, membase) as i64;

impl PpcState {
    pub fn new(membase: *mut u8) -> Self {
        Self {
            gpr: [0; NUM_GPRS],
            fpr: [[0.0; 2]; NUM_FPRS],
            cr: [0; NUM_CR_BITS],
            lr: 0,
            ctr: 0,
            xer_ca: 0,
            xer_so: 0,
            xer_ov: 0,
            pc: 0,
            remaining_cycles: 0,
            gqr: [0; NUM_GQRS],
            reservation_addr: 0,
            reservation_val: 0,
            fpscr: 0,
            scratch_ea: 0,
            membase,
        }
    }

    /// Pack the CR bits into the architectural 32-bit register.
    pub fn cr_word(&self) -> u32 {
        self.cr
            .iter()
            .fold(0u32, |acc, &bit| (acc << 1) | (bit & 1))
    }

    /// Unpack an architectural CR value into per-bit words.
    pub fn set_cr_word(&mut self, value: u32) {
        for (i, bit) in self.cr.iter_mut().enumerate() {
            *bit = (value >> (31 - i)) & 1;
        }
    }

    /// Compose XER from its split bits.
    pub fn xer(&self) -> u32 {
        (self.xer_so << 31) | (self.xer_ov << 30) | (self.xer_ca << 29)
    }

    pub fn set_xer(&mut self, value: u32) {
        self.xer_so = (value >> 31) & 1;
        self.xer_ov = (value >> 30) & 1;
        self.xer_ca = (value >> 29) & 1;
    }
}

impl Default for PpcState {
    fn default() -> Self {
        Self::new(std::ptr::null_mut())
    }
}
