//! Instruction word field extraction.
//!
//! PowerPC numbers bits from the MSB (bit 0) to the LSB (bit 31);
//! accessors here hide that and return plain values.

/// A raw 32-bit guest instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn(pub u32);

/// The unconditional `bctr` encoding.
pub const INSN_BCTR: u32 = 0x4E80_0420;
/// `ori r0,r0,0`, the canonical nop used for alignment padding.
pub const INSN_NOP: u32 = 0x6000_0000;

/// Primary opcode of the HLE escape instruction.
pub const OPC_HLE: u32 = 1;
/// Valid HLE handler id range (low 16 bits of the instruction).
pub const HLE_ID_FIRST: u32 = 0x1000;
pub const HLE_ID_END: u32 = 0x4000;

impl Insn {
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Primary opcode (bits 0-5).
    #[inline]
    pub const fn opcd(self) -> u32 {
        self.0 >> 26
    }

    /// rD / rS / frD / frS / crbD / BO field (bits 6-10).
    #[inline]
    pub const fn rd(self) -> usize {
        ((self.0 >> 21) & 0x1F) as usize
    }

    /// rA / frA / crbA / BI field (bits 11-15).
    #[inline]
    pub const fn ra(self) -> usize {
        ((self.0 >> 16) & 0x1F) as usize
    }

    /// rB / frB / crbB field (bits 16-20).
    #[inline]
    pub const fn rb(self) -> usize {
        ((self.0 >> 11) & 0x1F) as usize
    }

    /// frC field (bits 21-25).
    #[inline]
    pub const fn rc(self) -> usize {
        ((self.0 >> 6) & 0x1F) as usize
    }

    /// Record bit.
    #[inline]
    pub const fn rc_bit(self) -> bool {
        self.0 & 1 != 0
    }

    /// Overflow-enable bit of XO-form arithmetic.
    #[inline]
    pub const fn oe(self) -> bool {
        (self.0 >> 10) & 1 != 0
    }

    /// 10-bit extended opcode of X/XL/XFX-forms.
    #[inline]
    pub const fn xo10(self) -> u32 {
        (self.0 >> 1) & 0x3FF
    }

    /// 5-bit extended opcode of A-forms.
    #[inline]
    pub const fn xo5(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }

    /// 6-bit extended opcode of the indexed quantized forms.
    #[inline]
    pub const fn xo6(self) -> u32 {
        (self.0 >> 1) & 0x3F
    }

    /// Sign-extended 16-bit immediate.
    #[inline]
    pub const fn simm(self) -> i32 {
        (self.0 as u16) as i16 as i32
    }

    /// Zero-extended 16-bit immediate.
    #[inline]
    pub const fn uimm(self) -> u32 {
        self.0 & 0xFFFF
    }

    /// Shift amount / rotate count (bits 16-20).
    #[inline]
    pub const fn sh(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }

    /// Mask begin (bits 21-25).
    #[inline]
    pub const fn mb(self) -> u32 {
        (self.0 >> 6) & 0x1F
    }

    /// Mask end (bits 26-30).
    #[inline]
    pub const fn me(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }

    /// Condition register field of compares / mcrf (bits 6-8).
    #[inline]
    pub const fn crfd(self) -> usize {
        ((self.0 >> 23) & 7) as usize
    }

    /// Source condition register field of mcrf (bits 11-13).
    #[inline]
    pub const fn crfs(self) -> usize {
        ((self.0 >> 18) & 7) as usize
    }

    /// L bit of compares (64-bit compare, invalid on 32-bit parts).
    #[inline]
    pub const fn cmp_l(self) -> bool {
        (self.0 >> 21) & 1 != 0
    }

    /// SPR number with its two 5-bit halves swapped back.
    #[inline]
    pub const fn spr(self) -> u32 {
        let raw = (self.0 >> 11) & 0x3FF;
        ((raw & 0x1F) << 5) | (raw >> 5)
    }

    /// CRM field of mtcrf.
    #[inline]
    pub const fn crm(self) -> u32 {
        (self.0 >> 12) & 0xFF
    }

    /// FM field of mtfsf.
    #[inline]
    pub const fn fm(self) -> u32 {
        (self.0 >> 17) & 0xFF
    }

    /// Absolute-address bit of branches.
    #[inline]
    pub const fn aa(self) -> bool {
        self.0 & 2 != 0
    }

    /// Link bit of branches.
    #[inline]
    pub const fn lk(self) -> bool {
        self.0 & 1 != 0
    }

    /// BO field of conditional branches.
    #[inline]
    pub const fn bo(self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    /// BI field of conditional branches.
    #[inline]
    pub const fn bi(self) -> usize {
        ((self.0 >> 16) & 0x1F) as usize
    }

    /// Sign-extended byte displacement of `b`.
    #[inline]
    pub const fn li(self) -> i32 {
        ((self.0 & 0x03FF_FFFC) << 6) as i32 >> 6
    }

    /// Sign-extended byte displacement of `bc`.
    #[inline]
    pub const fn bd(self) -> i32 {
        (self.0 & 0xFFFC) as u16 as i16 as i32
    }

    /// Target of an I-form branch at `pc`.
    #[inline]
    pub const fn b_target(self, pc: u32) -> u32 {
        if self.aa() {
            self.li() as u32
        } else {
            pc.wrapping_add(self.li() as u32)
        }
    }

    /// Target of a B-form branch at `pc`.
    #[inline]
    pub const fn bc_target(self, pc: u32) -> u32 {
        if self.aa() {
            self.bd() as u32
        } else {
            pc.wrapping_add(self.bd() as u32)
        }
    }

    /// Sign-extended 12-bit displacement of psq_l/psq_st.
    #[inline]
    pub const fn psq_d(self) -> i32 {
        ((self.0 & 0xFFF) << 20) as i32 >> 20
    }

    /// W bit of psq_l/psq_st.
    #[inline]
    pub const fn psq_w(self) -> u32 {
        (self.0 >> 15) & 1
    }

    /// GQR index of psq_l/psq_st.
    #[inline]
    pub const fn psq_i(self) -> u32 {
        (self.0 >> 12) & 7
    }

    /// W bit of psq_lx/psq_stx.
    #[inline]
    pub const fn psqx_w(self) -> u32 {
        (self.0 >> 10) & 1
    }

    /// GQR index of psq_lx/psq_stx.
    #[inline]
    pub const fn psqx_i(self) -> u32 {
        (self.0 >> 7) & 7
    }

    /// HLE handler id when this is an HLE escape in the valid range.
    #[inline]
    pub const fn hle_id(self) -> Option<u32> {
        let id = self.0 & 0xFFFF;
        if self.opcd() == OPC_HLE && id >= HLE_ID_FIRST && id < HLE_ID_END {
            Some(id)
        } else {
            None
        }
    }

    /// `b`/`ba` without link.
    #[inline]
    pub const fn is_unconditional_branch(self) -> bool {
        self.opcd() == 18 && !self.lk()
    }

    /// Whether the word could be an instruction at all: the scanner
    /// treats primary opcode 0 as padding or data.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.opcd() != 0
    }
}

/// BO: don't decrement CTR.
pub const BO_NO_CTR: u32 = 0x04;
/// BO: branch when CTR reaches zero (else when non-zero).
pub const BO_CTR_ZERO: u32 = 0x02;
/// BO: ignore the condition bit.
pub const BO_NO_COND: u32 = 0x10;
/// BO: branch when the condition bit is set (else when clear).
pub const BO_COND_TRUE: u32 = 0x08;

/// Whether a BO field always branches.
#[inline]
pub const fn bo_always(bo: u32) -> bool {
    bo & BO_NO_CTR != 0 && bo & BO_NO_COND != 0
}

/// `rlwinm` style mask from MB to ME inclusive (wrapping).
pub const fn rotate_mask(mb: u32, me: u32) -> u32 {
    let begin = u32::MAX >> mb;
    let end = u32::MAX << (31 - me);
    if mb <= me {
        begin & end
    } else {
        begin | end
    }
}
