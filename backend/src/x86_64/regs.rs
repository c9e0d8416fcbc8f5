use ppcrec_core::RegSet;

/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    /// Low 3 bits of the register encoding (for ModR/M).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Map an allocator register number (0-15) back to a `Reg`.
    pub const fn from_u8(n: u8) -> Reg {
        match n & 0xF {
            0 => Reg::Rax,
            1 => Reg::Rcx,
            2 => Reg::Rdx,
            3 => Reg::Rbx,
            4 => Reg::Rsp,
            5 => Reg::Rbp,
            6 => Reg::Rsi,
            7 => Reg::Rdi,
            8 => Reg::R8,
            9 => Reg::R9,
            10 => Reg::R10,
            11 => Reg::R11,
            12 => Reg::R12,
            13 => Reg::R13,
            14 => Reg::R14,
            _ => Reg::R15,
        }
    }
}

/// XMM registers occupy allocator numbers 16-31.
pub const XMM_BASE: u8 = 16;

/// Total number of allocator register numbers (GPRs + XMMs).
pub const NUM_REGS: usize = 32;

/// Allocator number of XMM register `n`.
#[inline]
pub const fn xmm(n: u8) -> u8 {
    XMM_BASE + n
}

/// Hardware encoding (0-15) of an XMM allocator number.
#[inline]
pub const fn xmm_index(reg: u8) -> u8 {
    reg - XMM_BASE
}

/// RBP holds the `PpcState` pointer across all generated code.
pub const ENV_REG: Reg = Reg::Rbp;

/// R14 holds the host address of guest memory offset 0.
pub const MEMBASE_REG: Reg = Reg::R14;

/// R11 is a scratch register for byte swapping on stores and for
/// helper call targets.
pub const SCRATCH_REG: Reg = Reg::R11;

/// XMM15 is a scratch register for sign masks and conversions.
pub const FP_SCRATCH: u8 = 15;

/// Callee-saved registers that the prologue must save/restore
/// (System V ABI).
pub const CALLEE_SAVED: &[Reg] = &[Reg::Rbp, Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Function argument registers (System V AMD64 ABI).
pub const CALL_ARG_REGS: &[Reg] = &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Registers reserved by the backend, not available for allocation.
pub const RESERVED_REGS: RegSet = RegSet::from_raw(
    (1 << Reg::Rsp as u64)
        | (1 << Reg::Rbp as u64)
        | (1 << Reg::R11 as u64)
        | (1 << Reg::R14 as u64)
        | (1 << (XMM_BASE + FP_SCRATCH) as u64),
);

/// Allocatable general purpose registers.
pub const ALLOCATABLE_GPRS: RegSet =
    RegSet::from_raw(0xFFFF & !RESERVED_REGS.raw());

/// Allocatable XMM registers.
pub const ALLOCATABLE_XMMS: RegSet =
    RegSet::from_raw(0xFFFF_0000 & !RESERVED_REGS.raw());

/// Registers a System V call may clobber.
pub const CALL_CLOBBERED: RegSet = RegSet::from_raw(
    (1 << Reg::Rax as u64)
        | (1 << Reg::Rcx as u64)
        | (1 << Reg::Rdx as u64)
        | (1 << Reg::Rsi as u64)
        | (1 << Reg::Rdi as u64)
        | (1 << Reg::R8 as u64)
        | (1 << Reg::R9 as u64)
        | (1 << Reg::R10 as u64)
        | (1 << Reg::R11 as u64)
        | 0xFFFF_0000,
);

/// Stack frame constants.
pub const STACK_ALIGN: usize = 16;
/// Space reserved for outgoing helper calls.
pub const STATIC_CALL_ARGS_SIZE: usize = 128;

/// Total push size: return address (implicit) + callee-saved pushes.
pub const PUSH_SIZE: usize = (1 + CALLEE_SAVED.len()) * 8;

/// Total frame size (16-byte aligned).
pub const FRAME_SIZE: usize = {
    let raw = PUSH_SIZE + STATIC_CALL_ARGS_SIZE;
    (raw + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
};

/// Stack adjustment after pushes.
pub const STACK_ADDEND: usize = FRAME_SIZE - PUSH_SIZE;
