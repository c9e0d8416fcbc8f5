//! In-memory guest code and an assembler for the handful of
//! instructions the tests need.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use ppcrec_frontend::GuestCode;

/// Sparse guest code image. Words that were never written read as
/// unmapped. Shared between a test and the engine through `Arc`, so
/// tests can patch code after handing it over.
#[derive(Debug, Default)]
pub struct GuestImage {
    words: RwLock<BTreeMap<u32, u32>>,
    returning_handlers: RwLock<HashSet<u32>>,
}

impl GuestImage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Place `code` starting at `addr`.
    pub fn load(&self, addr: u32, code: &[u32]) {
        let mut words = self.words.write().unwrap();
        for (i, &w) in code.iter().enumerate() {
            words.insert(addr + i as u32 * 4, w);
        }
    }

    pub fn write(&self, addr: u32, word: u32) {
        self.words.write().unwrap().insert(addr, word);
    }

    /// Mark HLE handler `index` as returning to its caller.
    pub fn set_handler_returns(&self, index: u32) {
        self.returning_handlers.write().unwrap().insert(index);
    }
}

impl GuestCode for GuestImage {
    fn read_u32(&self, addr: u32) -> Option<u32> {
        self.words.read().unwrap().get(&addr).copied()
    }

    fn handler_returns(&self, index: u32) -> bool {
        self.returning_handlers.read().unwrap().contains(&index)
    }
}

/// Instruction encoders. Branch helpers take the address of the
/// branch itself and the target.
pub mod asm {
    pub const BLR: u32 = 0x4E80_0020;
    pub const BCTR: u32 = 0x4E80_0420;
    pub const NOP: u32 = 0x6000_0000;
    pub const SC: u32 = 0x4400_0002;

    fn d_form(opcd: u32, rt: u32, ra: u32, imm: i32) -> u32 {
        (opcd << 26) | (rt << 21) | (ra << 16) | (imm as u32 & 0xFFFF)
    }

    pub fn addi(rd: u32, ra: u32, simm: i32) -> u32 {
        d_form(14, rd, ra, simm)
    }

    pub fn li(rd: u32, simm: i32) -> u32 {
        addi(rd, 0, simm)
    }

    pub fn cmpwi(crf: u32, ra: u32, simm: i32) -> u32 {
        d_form(11, crf << 2, ra, simm)
    }

    pub fn lwz(rd: u32, d: i32, ra: u32) -> u32 {
        d_form(32, rd, ra, d)
    }

    pub fn stw(rs: u32, d: i32, ra: u32) -> u32 {
        d_form(36, rs, ra, d)
    }

    pub fn add(rd: u32, ra: u32, rb: u32) -> u32 {
        (31 << 26) | (rd << 21) | (ra << 16) | (rb << 11) | (266 << 1)
    }

    fn mtspr(spr: u32, rs: u32) -> u32 {
        let field = ((spr & 0x1F) << 5) | (spr >> 5);
        (31 << 26) | (rs << 21) | (field << 11) | (467 << 1)
    }

    pub fn mtctr(rs: u32) -> u32 {
        mtspr(9, rs)
    }

    pub fn b(from: u32, to: u32) -> u32 {
        (18 << 26) | (to.wrapping_sub(from) & 0x03FF_FFFC)
    }

    pub fn bl(from: u32, to: u32) -> u32 {
        b(from, to) | 1
    }

    pub fn bc(bo: u32, bi: u32, from: u32, to: u32) -> u32 {
        (16 << 26) | (bo << 21) | (bi << 16) | (to.wrapping_sub(from) & 0xFFFC)
    }

    /// Branch if CR0.EQ is set.
    pub fn beq(from: u32, to: u32) -> u32 {
        bc(12, 2, from, to)
    }

    /// Decrement CTR, branch while it is non-zero.
    pub fn bdnz(from: u32, to: u32) -> u32 {
        bc(16, 0, from, to)
    }

    /// Return if CR0.EQ is set.
    pub fn beqlr() -> u32 {
        (19 << 26) | (12 << 21) | (2 << 16) | (16 << 1)
    }

    pub fn fmul(fd: u32, fa: u32, fc: u32) -> u32 {
        (63 << 26) | (fd << 21) | (fa << 16) | (fc << 6) | (25 << 1)
    }

    pub fn hle(id: u32) -> u32 {
        (1 << 26) | (id & 0xFFFF)
    }
}
