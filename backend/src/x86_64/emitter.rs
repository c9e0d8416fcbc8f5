//! x86-64 instruction encoding.
//!
//! An opcode is a `u32`: the low byte is the opcode byte and the bits
//! above it select the prefixes emitted in front of it. Register
//! operands are raw hardware numbers 0-15 so GPRs and XMM registers go
//! through the same ModR/M paths.

#![allow(non_upper_case_globals)]

use crate::code_buffer::CodeBuffer;
use crate::x86_64::regs::Reg;

pub const P_EXT: u32 = 0x100;
pub const P_DATA16: u32 = 0x400;
pub const P_REXW: u32 = 0x1000;
/// Reg field is a byte register; SPL..DIL need an empty REX.
pub const P_REXB_R: u32 = 0x2000;
/// R/M field is a byte register.
pub const P_REXB_RM: u32 = 0x4000;
pub const P_SIMDF3: u32 = 0x20000;
pub const P_SIMDF2: u32 = 0x40000;

const fn x0f(b: u32) -> u32 {
    b | P_EXT
}
const fn x66(b: u32) -> u32 {
    b | P_EXT | P_DATA16
}
const fn xf2(b: u32) -> u32 {
    b | P_EXT | P_SIMDF2
}
const fn xf3(b: u32) -> u32 {
    b | P_EXT | P_SIMDF3
}

const ARITH_IMM8: u32 = 0x83;
const ARITH_IMM32: u32 = 0x81;
const ARITH_REG: u32 = 0x03;
const SHIFT_BY_1: u32 = 0xD1;
const SHIFT_IMM8: u32 = 0xC1;
const SHIFT_CL: u32 = 0xD3;
const MOV_STORE8: u32 = 0x88;
const MOV_STORE: u32 = 0x89;
const MOV_STORE_IMM: u32 = 0xC7;
const MOV_REG_IMM: u32 = 0xB8;
const XOR_REG: u32 = 0x31;
const GROUP3: u32 = 0xF7;
const GROUP5: u32 = 0xFF;
const TEST: u32 = 0x85;
const LEA: u32 = 0x8D;
const PUSH: u32 = 0x50;
const POP: u32 = 0x58;
const RET: u32 = 0xC3;
const JCC_REL8: u32 = 0x70;
const SETCC: u32 = x0f(0x90) | P_REXB_RM;
const IMUL: u32 = x0f(0xAF);
const BSR: u32 = x0f(0xBD);
const BSWAP: u32 = x0f(0xC8);
const MOVUPD_LOAD: u32 = x66(0x10);
const MOVUPD_STORE: u32 = x66(0x11);
const MOVD_TO_XMM: u32 = x66(0x6E);
const MOVD_FROM_XMM: u32 = x66(0x7E);
const PCMPEQD: u32 = x66(0x76);
const PSHIFTQ_IMM: u32 = x66(0x73);
const PSLLQ: u8 = 6;

pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVZBL: u32 = x0f(0xB6);
pub const OPC_MOVZWL: u32 = x0f(0xB7);
pub const OPC_MOVSBL: u32 = x0f(0xBE);
pub const OPC_MOVSWL: u32 = x0f(0xBF);
pub const OPC_MOVSLQ: u32 = 0x63 | P_REXW;
pub const OPC_JCC_long: u32 = x0f(0x80);
pub const OPC_JMP_long: u32 = 0xE9;

pub const OPC_MOVSD_VxWx: u32 = xf2(0x10);
pub const OPC_MOVAPS: u32 = x0f(0x28);
pub const OPC_MOVQ_VqWq: u32 = xf3(0x7E);
pub const OPC_ADDSD: u32 = xf2(0x58);
pub const OPC_ADDPD: u32 = x66(0x58);
pub const OPC_MULSD: u32 = xf2(0x59);
pub const OPC_MULPD: u32 = x66(0x59);
pub const OPC_SUBSD: u32 = xf2(0x5C);
pub const OPC_SUBPD: u32 = x66(0x5C);
pub const OPC_DIVSD: u32 = xf2(0x5E);
pub const OPC_DIVPD: u32 = x66(0x5E);
pub const OPC_CVTSD2SS: u32 = xf2(0x5A);
pub const OPC_CVTSS2SD: u32 = xf3(0x5A);
pub const OPC_CVTPD2PS: u32 = x66(0x5A);
pub const OPC_CVTPS2PD: u32 = x0f(0x5A);
pub const OPC_ANDPD: u32 = x66(0x54);
pub const OPC_ANDNPD: u32 = x66(0x55);
pub const OPC_ORPD: u32 = x66(0x56);
pub const OPC_XORPD: u32 = x66(0x57);
pub const OPC_CMPPD: u32 = x66(0xC2);
pub const OPC_CMPSD: u32 = xf2(0xC2);
pub const OPC_SHUFPD: u32 = x66(0xC6);
pub const OPC_UNPCKLPD: u32 = x66(0x14);
pub const OPC_UCOMISD: u32 = x66(0x2E);

/// CMPSD/CMPPD predicates.
pub const CMP_EQ: u8 = 0;
pub const CMP_LE: u8 = 2;

/// `/r` selector of the 0x01-0x3B ALU family and of 0x81/0x83.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// `/r` selector of the shift group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Condition nibble of Jcc and SETcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    Jo = 0x0,
    Jno = 0x1,
    Jb = 0x2,
    Jae = 0x3,
    Je = 0x4,
    Jne = 0x5,
    Jbe = 0x6,
    Ja = 0x7,
    Js = 0x8,
    Jns = 0x9,
    Jp = 0xA,
    Jnp = 0xB,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

impl X86Cond {
    /// Flags test for an IR condition after `cmp a, b` (or `test` for
    /// the `Tst*` pair). `Always` and `Never` have no flags test and
    /// are lowered without a Jcc.
    pub fn from_cond(cond: ppcrec_core::Cond) -> Self {
        use ppcrec_core::Cond::*;
        match cond {
            Eq | TstEq | Always => Self::Je,
            Ne | TstNe | Never => Self::Jne,
            Lt => Self::Jl,
            Ge => Self::Jge,
            Le => Self::Jle,
            Gt => Self::Jg,
            Ltu => Self::Jb,
            Geu => Self::Jae,
            Leu => Self::Jbe,
            Gtu => Self::Ja,
        }
    }
}

#[inline]
pub fn rexw_flag(rexw: bool) -> u32 {
    P_REXW * u32::from(rexw)
}

const fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    mode << 6 | (reg & 7) << 3 | rm & 7
}

/// Prefixes, REX, escape and opcode byte.
fn encode_opcode(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8, index: u8) {
    let has = |flag: u32| opc & flag != 0;
    let rex = u8::from(has(P_REXW)) << 3
        | (r >> 3 & 1) << 2
        | (index >> 3 & 1) << 1
        | rm >> 3 & 1;
    let low_byte_reg = (has(P_REXB_R) && r >= 4) || (has(P_REXB_RM) && rm >= 4);

    if has(P_DATA16) {
        buf.emit_u8(0x66);
    }
    if has(P_SIMDF3) {
        buf.emit_u8(0xF3);
    } else if has(P_SIMDF2) {
        buf.emit_u8(0xF2);
    }
    if rex != 0 || low_byte_reg {
        buf.emit_u8(0x40 | rex);
    }
    if has(P_EXT) {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(opc as u8);
}

pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    encode_opcode(buf, opc, r, rm, 0);
}

/// Register-direct form. `reg` is a register or a `/r` selector.
fn op_rr(buf: &mut CodeBuffer, opc: u32, reg: u8, rm: u8) {
    emit_opc(buf, opc, reg, rm);
    buf.emit_u8(modrm(3, reg, rm));
}

/// `[base + disp]` form with the shortest displacement.
fn op_mem(buf: &mut CodeBuffer, opc: u32, reg: u8, base: Reg, disp: i32) {
    emit_opc(buf, opc, reg, base as u8);
    let b = base.low3();
    // RBP/R13 with mode 0 would mean RIP-relative.
    let mode = match disp {
        0 if b != 5 => 0,
        d if i8::try_from(d).is_ok() => 1,
        _ => 2,
    };
    buf.emit_u8(modrm(mode, reg, b));
    if b == 4 {
        buf.emit_u8(0x24);
    }
    match mode {
        1 => buf.emit_u8(disp as u8),
        2 => buf.emit_u32(disp as u32),
        _ => {}
    }
}

/// `[base + index]` form. `index` must not be RSP.
fn op_indexed(buf: &mut CodeBuffer, opc: u32, reg: Reg, base: Reg, index: Reg) {
    encode_opcode(buf, opc, reg as u8, base as u8, index as u8);
    let sib = modrm(0, index as u8, base as u8);
    if base.low3() == 5 {
        buf.emit_u8(modrm(1, reg as u8, 4));
        buf.emit_u8(sib);
        buf.emit_u8(0);
    } else {
        buf.emit_u8(modrm(0, reg as u8, 4));
        buf.emit_u8(sib);
    }
}

fn fits_i8(imm: i32) -> bool {
    i8::try_from(imm).is_ok()
}

/// imm8 or imm32, matching the opcode chosen with [`fits_i8`].
fn emit_imm(buf: &mut CodeBuffer, imm: i32) {
    if fits_i8(imm) {
        buf.emit_u8(imm as u8);
    } else {
        buf.emit_u32(imm as u32);
    }
}

pub fn emit_arith_rr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, src: Reg) {
    let opc = ARITH_REG + ((op as u32) << 3);
    op_rr(buf, opc | rexw_flag(rexw), dst as u8, src as u8);
}

pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, imm: i32) {
    let opc = if fits_i8(imm) { ARITH_IMM8 } else { ARITH_IMM32 };
    op_rr(buf, opc | rexw_flag(rexw), op as u8, dst as u8);
    emit_imm(buf, imm);
}

/// 32-bit ALU op on `[base + offset]` with an immediate.
pub fn emit_arith_mi(buf: &mut CodeBuffer, op: ArithOp, base: Reg, offset: i32, imm: i32) {
    let opc = if fits_i8(imm) { ARITH_IMM8 } else { ARITH_IMM32 };
    op_mem(buf, opc, op as u8, base, offset);
    emit_imm(buf, imm);
}

pub fn emit_neg(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    op_rr(buf, GROUP3 | rexw_flag(rexw), 3, reg as u8);
}

pub fn emit_not(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    op_rr(buf, GROUP3 | rexw_flag(rexw), 2, reg as u8);
}

pub fn emit_shift_ri(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg, imm: u8) {
    let w = rexw_flag(rexw);
    if imm == 1 {
        op_rr(buf, SHIFT_BY_1 | w, op as u8, dst as u8);
    } else {
        op_rr(buf, SHIFT_IMM8 | w, op as u8, dst as u8);
        buf.emit_u8(imm);
    }
}

pub fn emit_shift_cl(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg) {
    op_rr(buf, SHIFT_CL | rexw_flag(rexw), op as u8, dst as u8);
}

/// `rol r16, 8`: byte swap of a halfword.
pub fn emit_rolw_8(buf: &mut CodeBuffer, reg: Reg) {
    op_rr(buf, SHIFT_IMM8 | P_DATA16, ShiftOp::Rol as u8, reg as u8);
    buf.emit_u8(8);
}

pub fn emit_mov_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    op_rr(buf, MOV_STORE | rexw_flag(rexw), src as u8, dst as u8);
}

/// Load an immediate with the shortest encoding: `xor` for zero, a
/// zero-extending `mov r32` when the value fits, a sign-extended imm32,
/// and `movabs` otherwise.
pub fn emit_mov_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, val: u64) {
    let short = MOV_REG_IMM + u32::from(reg.low3());
    if val == 0 {
        op_rr(buf, XOR_REG, reg as u8, reg as u8);
    } else if !rexw || u32::try_from(val).is_ok() {
        emit_opc(buf, short, 0, reg as u8);
        buf.emit_u32(val as u32);
    } else if i32::try_from(val as i64).is_ok() {
        op_rr(buf, MOV_STORE_IMM | P_REXW, 0, reg as u8);
        buf.emit_u32(val as u32);
    } else {
        emit_opc(buf, short | P_REXW, 0, reg as u8);
        buf.emit_u64(val);
    }
}

/// `movzx`/`movsx` family, `opc` being one of the `OPC_MOV[ZS]*`.
pub fn emit_movx(buf: &mut CodeBuffer, opc: u32, dst: Reg, src: Reg) {
    op_rr(buf, opc, dst as u8, src as u8);
}

pub fn emit_bswap(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    let opc = (BSWAP + u32::from(reg.low3())) | rexw_flag(rexw);
    emit_opc(buf, opc, 0, reg as u8);
}

pub fn emit_load(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    op_mem(buf, OPC_MOVL_GvEv | rexw_flag(rexw), dst as u8, base, offset);
}

pub fn emit_store(buf: &mut CodeBuffer, rexw: bool, src: Reg, base: Reg, offset: i32) {
    op_mem(buf, MOV_STORE | rexw_flag(rexw), src as u8, base, offset);
}

/// `mov dword [base + offset], imm32`
pub fn emit_store_imm(buf: &mut CodeBuffer, base: Reg, offset: i32, imm: i32) {
    op_mem(buf, MOV_STORE_IMM, 0, base, offset);
    buf.emit_u32(imm as u32);
}

pub fn emit_lea_sib(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, index: Reg) {
    op_indexed(buf, LEA | rexw_flag(rexw), dst, base, index);
}

/// `dst = [base + index]` with any load opcode.
pub fn emit_load_sib(buf: &mut CodeBuffer, opc: u32, dst: Reg, base: Reg, index: Reg) {
    op_indexed(buf, opc, dst, base, index);
}

/// `[base + index] = src` of `size` bytes.
pub fn emit_store_sib(buf: &mut CodeBuffer, size: u32, src: Reg, base: Reg, index: Reg) {
    let opc = match size {
        1 => MOV_STORE8 | P_REXB_R,
        2 => MOV_STORE | P_DATA16,
        4 => MOV_STORE,
        _ => MOV_STORE | P_REXW,
    };
    op_indexed(buf, opc, src, base, index);
}

pub fn emit_imul_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    op_rr(buf, IMUL | rexw_flag(rexw), dst as u8, src as u8);
}

pub fn emit_bsr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    op_rr(buf, BSR | rexw_flag(rexw), dst as u8, src as u8);
}

fn emit_rel32_to(buf: &mut CodeBuffer, target: usize) {
    let disp = target as i64 - (buf.offset() + 4) as i64;
    buf.emit_u32(disp as u32);
}

/// `jcc rel32` to a code buffer offset.
pub fn emit_jcc(buf: &mut CodeBuffer, cond: X86Cond, target_offset: usize) {
    emit_opc(buf, OPC_JCC_long + cond as u32, 0, 0);
    emit_rel32_to(buf, target_offset);
}

/// `jcc rel8` with the displacement left for [`patch_jcc_short`].
/// Returns where the displacement byte sits.
pub fn emit_jcc_short(buf: &mut CodeBuffer, cond: X86Cond) -> usize {
    buf.emit_u8((JCC_REL8 + cond as u32) as u8);
    buf.emit_u8(0);
    buf.offset() - 1
}

/// Aim a jump from [`emit_jcc_short`] at the current offset.
pub fn patch_jcc_short(buf: &mut CodeBuffer, at: usize) {
    let disp = buf.offset() - (at + 1);
    debug_assert!(disp <= i8::MAX as usize, "short jump out of range");
    buf.patch_u8(at, disp as u8);
}

pub fn emit_jmp(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_JMP_long as u8);
    emit_rel32_to(buf, target_offset);
}

pub fn emit_jmp_reg(buf: &mut CodeBuffer, reg: Reg) {
    op_rr(buf, GROUP5, 4, reg as u8);
}

pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    op_rr(buf, GROUP5, 2, reg as u8);
}

pub fn emit_setcc(buf: &mut CodeBuffer, cond: X86Cond, dst: Reg) {
    op_rr(buf, SETCC + cond as u32, 0, dst as u8);
}

pub fn emit_test_rr(buf: &mut CodeBuffer, rexw: bool, r1: Reg, r2: Reg) {
    op_rr(buf, TEST | rexw_flag(rexw), r1 as u8, r2 as u8);
}

pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, PUSH + u32::from(reg.low3()), 0, reg as u8);
}

pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, POP + u32::from(reg.low3()), 0, reg as u8);
}

pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(RET as u8);
}

/// XMM `dst op= src`.
pub fn emit_sse_rr(buf: &mut CodeBuffer, opc: u32, dst: u8, src: u8) {
    op_rr(buf, opc, dst, src);
}

/// XMM op taking an imm8 predicate or shuffle selector.
pub fn emit_sse_rri(buf: &mut CodeBuffer, opc: u32, dst: u8, src: u8, imm: u8) {
    op_rr(buf, opc, dst, src);
    buf.emit_u8(imm);
}

/// Both lanes of `xmm` from `[base + offset]`, unaligned.
pub fn emit_sse_load(buf: &mut CodeBuffer, xmm: u8, base: Reg, offset: i32) {
    op_mem(buf, MOVUPD_LOAD, xmm, base, offset);
}

pub fn emit_sse_store(buf: &mut CodeBuffer, xmm: u8, base: Reg, offset: i32) {
    op_mem(buf, MOVUPD_STORE, xmm, base, offset);
}

/// `movd`/`movq` GPR to XMM; the upper lanes become zero.
pub fn emit_movd_to_xmm(buf: &mut CodeBuffer, rexw: bool, xmm: u8, src: Reg) {
    op_rr(buf, MOVD_TO_XMM | rexw_flag(rexw), xmm, src as u8);
}

pub fn emit_movd_from_xmm(buf: &mut CodeBuffer, rexw: bool, dst: Reg, xmm: u8) {
    op_rr(buf, MOVD_FROM_XMM | rexw_flag(rexw), xmm, dst as u8);
}

/// Fill `xmm` with the IEEE sign bit in the bottom lane, and in the top
/// lane too when `pair` is set.
pub fn emit_sign_mask(buf: &mut CodeBuffer, xmm: u8, pair: bool) {
    op_rr(buf, PCMPEQD, xmm, xmm);
    op_rr(buf, PSHIFTQ_IMM, PSLLQ, xmm);
    buf.emit_u8(63);
    if !pair {
        op_rr(buf, OPC_MOVQ_VqWq, xmm, xmm);
    }
}

/// x86-64 code generator.
///
/// The prologue and epilogue are emitted once at the start of the
/// code buffer and shared by every function after them.
pub struct X86_64CodeGen {
    pub prologue_offset: usize,
    /// Epilogue entry for exits whose return value is already in RAX.
    pub exit_offset: usize,
    /// First byte after the shared stubs.
    pub code_gen_start: usize,
    /// Offset of the guest memory base pointer inside `PpcState`.
    pub membase_offset: i32,
}

impl X86_64CodeGen {
    pub fn new(membase_offset: i32) -> Self {
        Self {
            prologue_offset: 0,
            exit_offset: 0,
            code_gen_start: 0,
            membase_offset,
        }
    }

    /// Leave native code returning `val`.
    pub fn emit_exit(&self, buf: &mut CodeBuffer, val: u32) {
        emit_mov_ri(buf, false, Reg::Rax, u64::from(val));
        emit_jmp(buf, self.exit_offset);
    }
}
