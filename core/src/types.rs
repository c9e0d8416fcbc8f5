use std::fmt;

/// IR value types.
///
/// Guest integer state is 32-bit; host pointers and raw double bits
/// travel as I64. Every guest FPR is a pair of doubles (ps0, ps1) and
/// lives in one 128-bit vector register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Type {
    I32 = 0,
    I64 = 1,
    V128 = 2,
}

pub const TYPE_COUNT: usize = 3;

impl Type {
    pub const fn size_bits(self) -> u32 {
        32 << self as u32
    }

    pub const fn size_bytes(self) -> u32 {
        self.size_bits() / 8
    }

    pub const fn is_vector(self) -> bool {
        matches!(self, Type::V128)
    }

    pub const fn is_integer(self) -> bool {
        !self.is_vector()
    }
}

/// Where the register allocator currently keeps a temp's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TempVal {
    Dead = 0,
    Reg = 1,
    Mem = 2,
    Const = 3,
}

/// Branch and setcond conditions.
///
/// Encodings come in complementary pairs differing only in bit 0, so
/// inverting a condition flips that bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cond {
    Never = 0,
    Always = 1,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Ge = 11,
    Le = 12,
    Gt = 13,
    Ltu = 14,
    Geu = 15,
    Leu = 16,
    Gtu = 17,
    /// `(a & b) == 0`
    TstEq = 18,
    TstNe = 19,
}

impl Cond {
    pub const ALL: [Cond; 14] = [
        Cond::Never,
        Cond::Always,
        Cond::Eq,
        Cond::Ne,
        Cond::Lt,
        Cond::Ge,
        Cond::Le,
        Cond::Gt,
        Cond::Ltu,
        Cond::Geu,
        Cond::Leu,
        Cond::Gtu,
        Cond::TstEq,
        Cond::TstNe,
    ];

    pub const fn invert(self) -> Cond {
        Cond::from_u32(self as u32 ^ 1)
    }

    /// Condition that holds for swapped operands (`a < b` iff `b > a`).
    pub const fn swap(self) -> Cond {
        match self {
            Cond::Lt => Cond::Gt,
            Cond::Gt => Cond::Lt,
            Cond::Le => Cond::Ge,
            Cond::Ge => Cond::Le,
            Cond::Ltu => Cond::Gtu,
            Cond::Gtu => Cond::Ltu,
            Cond::Leu => Cond::Geu,
            Cond::Geu => Cond::Leu,
            other => other,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Cond::Lt | Cond::Ge | Cond::Le | Cond::Gt)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(self, Cond::Ltu | Cond::Geu | Cond::Leu | Cond::Gtu)
    }

    pub const fn is_tst(self) -> bool {
        matches!(self, Cond::TstEq | Cond::TstNe)
    }

    /// Decode a condition stored as a constant op argument. Unknown
    /// values decode as `Never`.
    pub const fn from_u32(v: u32) -> Cond {
        let mut i = 0;
        while i < Cond::ALL.len() {
            if Cond::ALL[i] as u32 == v {
                return Cond::ALL[i];
            }
            i += 1;
        }
        Cond::Never
    }
}

/// Guest memory access: size, sign extension and byte order.
///
/// Guest memory is big-endian, so ordinary PowerPC loads and stores
/// carry [`MemOp::BSWAP`] and the byte-reversed forms (`lwbrx`,
/// `sthbrx`, ...) do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemOp(u16);

impl MemOp {
    pub const SIZE_8: u16 = 0;
    pub const SIZE_16: u16 = 1;
    pub const SIZE_32: u16 = 2;
    pub const SIZE_64: u16 = 3;
    const SIZE_MASK: u16 = 0x3;

    pub const SIGN: u16 = 1 << 2;
    pub const BSWAP: u16 = 1 << 3;

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// `lbz`
    pub const fn ub() -> Self {
        Self(Self::SIZE_8)
    }
    pub const fn sb() -> Self {
        Self(Self::SIZE_8 | Self::SIGN)
    }
    /// `lhz`
    pub const fn uw() -> Self {
        Self(Self::SIZE_16)
    }
    /// `lha`
    pub const fn sw() -> Self {
        Self(Self::SIZE_16 | Self::SIGN)
    }
    /// `lwz`, `lfs`
    pub const fn ul() -> Self {
        Self(Self::SIZE_32)
    }
    /// `lfd`
    pub const fn uq() -> Self {
        Self(Self::SIZE_64)
    }

    /// The same access in guest (big-endian) byte order.
    pub const fn be(self) -> Self {
        Self(self.0 | Self::BSWAP)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// log2 of the access size in bytes.
    pub const fn size(self) -> u16 {
        self.0 & Self::SIZE_MASK
    }

    pub const fn size_bytes(self) -> u32 {
        1 << self.size()
    }

    pub const fn is_signed(self) -> bool {
        self.0 & Self::SIGN != 0
    }

    pub const fn is_bswap(self) -> bool {
        self.0 & Self::BSWAP != 0
    }
}

/// Set of host registers: GPRs in bits 0-15, XMM registers in bits
/// 16-31.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegSet(u64);

impl RegSet {
    pub const EMPTY: RegSet = RegSet(0);

    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn set(self, reg: u8) -> Self {
        Self(self.0 | 1 << reg)
    }

    pub const fn clear(self, reg: u8) -> Self {
        Self(self.0 & !(1 << reg))
    }

    pub const fn contains(self, reg: u8) -> bool {
        self.0 >> reg & 1 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: RegSet) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: RegSet) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn subtract(self, other: RegSet) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Lowest register in the set.
    pub const fn first(self) -> Option<u8> {
        match self.0 {
            0 => None,
            bits => Some(bits.trailing_zeros() as u8),
        }
    }
}

impl fmt::Debug for RegSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries((0..64u8).filter(|&r| self.contains(r)))
            .finish()
    }
}
