//! Floating point and paired-single lowering.
//!
//! Each FPR global holds (ps0, ps1) as two f64 lanes. Double
//! precision ops compute on ps0 only. Single precision ops round the
//! result to f32 and write it to both lanes; paired-single ops compute
//! and round both lanes.

use super::cpu::SCRATCH_EA_OFFSET;
use super::helpers;
use super::insn::Insn;
use super::PpcDisasContext;
use crate::LowerError;
use ppcrec_core::{Context, FCmpMode, MemOp, TempIdx, Type};

/// Two-operand vector op: `fn(ir, dst, a, b) -> dst`.
type FBinOp = fn(&mut Context, TempIdx, TempIdx, TempIdx) -> TempIdx;
/// One-operand vector op: `fn(ir, dst, src) -> dst`.
type FUnOp = fn(&mut Context, TempIdx, TempIdx) -> TempIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Double,
    Single,
    Paired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FpAccess {
    LoadSingle,
    LoadDouble,
    StoreSingle,
    StoreDouble,
    /// `stfiwx`: low word of the raw double bits.
    StoreIntWord,
}

impl PpcDisasContext {
    fn fbin(&self, ir: &mut Context, op: FBinOp, a: TempIdx, b: TempIdx) -> TempIdx {
        let d = ir.new_temp(Type::V128);
        op(ir, d, a, b)
    }

    fn fun(&self, ir: &mut Context, op: FUnOp, a: TempIdx) -> TempIdx {
        let d = ir.new_temp(Type::V128);
        op(ir, d, a)
    }

    fn fshuffle(&self, ir: &mut Context, a: TempIdx, b: TempIdx, imm: u32) -> TempIdx {
        let d = ir.new_temp(Type::V128);
        ir.gen_fshuffle(d, a, b, imm)
    }

    /// `a * c`. With accurate multiply every lane where either factor
    /// is +-0 becomes +0.
    fn gen_fmul(&self, ir: &mut Context, a: TempIdx, c: TempIdx, pair: bool) -> TempIdx {
        let prod = if pair {
            self.fbin(ir, Context::gen_fmul_pair, a, c)
        } else {
            self.fbin(ir, Context::gen_fmul_bottom, a, c)
        };
        if !self.opts.accurate_multiply {
            return prod;
        }
        let za = self.fun(ir, Context::gen_fzero_mask, a);
        let zc = self.fun(ir, Context::gen_fzero_mask, c);
        let mut zero = self.fbin(ir, Context::gen_for, za, zc);
        if !pair {
            zero = self.fun(ir, Context::gen_fclear_top, zero);
        }
        self.fbin(ir, Context::gen_fandnot, zero, prod)
    }

    /// Write an arithmetic result to frD with the rounding and lane
    /// rules of `prec`.
    fn set_fpr_result(&self, ir: &mut Context, d: usize, t: TempIdx, prec: Precision) {
        let r = match prec {
            Precision::Double => t,
            Precision::Single => {
                let r = self.fun(ir, Context::gen_fround_single_bottom, t);
                self.fshuffle(ir, r, r, 0b00)
            }
            Precision::Paired => self.fun(ir, Context::gen_fround_single_pair, t),
        };
        ir.gen_mov(Type::V128, self.fpr[d], r);
    }

    /// Write ps0 of `t` to frD, keeping frD.ps1.
    fn set_fpr_bottom(&self, ir: &mut Context, d: usize, t: TempIdx) {
        let r = self.fshuffle(ir, t, self.fpr[d], 0b10);
        ir.gen_mov(Type::V128, self.fpr[d], r);
    }

    /// A-form arithmetic common to the double, single and paired
    /// tables. `None` when `xo5` is not one of them.
    fn gen_farith(&self, ir: &mut Context, insn: Insn, prec: Precision) -> Option<TempIdx> {
        let pair = prec == Precision::Paired;
        let (a, b, c) = (self.fpr[insn.ra()], self.fpr[insn.rb()], self.fpr[insn.rc()]);
        let (add, sub, div, neg): (FBinOp, FBinOp, FBinOp, FUnOp) = if pair {
            (
                Context::gen_fadd_pair,
                Context::gen_fsub_pair,
                Context::gen_fdiv_pair,
                Context::gen_fneg_pair,
            )
        } else {
            (
                Context::gen_fadd_bottom,
                Context::gen_fsub_bottom,
                Context::gen_fdiv_bottom,
                Context::gen_fneg_bottom,
            )
        };
        let xo = insn.xo5();
        let t = match xo {
            18 => self.fbin(ir, div, a, b),
            20 => self.fbin(ir, sub, a, b),
            21 => self.fbin(ir, add, a, b),
            25 => self.gen_fmul(ir, a, c, pair),
            // msub madd nmsub nmadd
            28..=31 => {
                let p = self.gen_fmul(ir, a, c, pair);
                let s = if xo & 1 == 1 {
                    self.fbin(ir, add, p, b)
                } else {
                    self.fbin(ir, sub, p, b)
                };
                if xo >= 30 {
                    self.fun(ir, neg, s)
                } else {
                    s
                }
            }
            _ => return None,
        };
        Some(t)
    }

    /// CR field from an ordered/unordered compare of the ps0 lanes.
    fn gen_fcmp(&self, ir: &mut Context, field: usize, a: TempIdx, b: TempIdx) {
        let modes = [
            FCmpMode::Lt,
            FCmpMode::Gt,
            FCmpMode::Eq,
            FCmpMode::Unordered,
        ];
        for (bit, mode) in modes.into_iter().enumerate() {
            let t = ir.new_temp(Type::I32);
            ir.gen_fcmp_bottom(t, a, b, mode);
            ir.gen_mov(Type::I32, self.cr[field * 4 + bit], t);
        }
    }

    // -- Primary opcode 59: single precision ----------------

    pub(crate) fn trans_op59(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        if insn.rc_bit() {
            return Err(self.unsupported(insn));
        }
        let (d, b) = (insn.rd() as u32, insn.rb() as u32);
        if insn.xo5() == 24 {
            self.gen_helper(ir, helpers::fres, [d, b, 0]);
            return Ok(());
        }
        let t = self
            .gen_farith(ir, insn, Precision::Single)
            .ok_or_else(|| self.unsupported(insn))?;
        self.set_fpr_result(ir, insn.rd(), t, Precision::Single);
        Ok(())
    }

    // -- Primary opcode 63: double precision ----------------

    pub(crate) fn trans_op63(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        if insn.rc_bit() {
            return Err(self.unsupported(insn));
        }
        let d = insn.rd();
        let (a, b, c) = (self.fpr[insn.ra()], self.fpr[insn.rb()], self.fpr[insn.rc()]);
        let helper_args = [d as u32, insn.rb() as u32, 0];

        if insn.xo5() >= 18 {
            match insn.xo5() {
                23 => {
                    let t = ir.new_temp(Type::V128);
                    ir.gen_fselect(t, a, b, c);
                    self.set_fpr_bottom(ir, d, t);
                }
                26 => self.gen_helper(ir, helpers::frsqrte, helper_args),
                _ => {
                    let t = self
                        .gen_farith(ir, insn, Precision::Double)
                        .ok_or_else(|| self.unsupported(insn))?;
                    self.set_fpr_result(ir, d, t, Precision::Double);
                }
            }
            return Ok(());
        }

        match insn.xo10() {
            0 | 32 => self.gen_fcmp(ir, insn.crfd(), a, b),
            12 => {
                let r = self.fun(ir, Context::gen_fround_single_bottom, b);
                let r = self.fshuffle(ir, r, r, 0b00);
                ir.gen_mov(Type::V128, self.fpr[d], r);
            }
            14 => self.gen_helper(ir, helpers::fctiw, helper_args),
            15 => self.gen_helper(ir, helpers::fctiwz, helper_args),
            40 => {
                let t = self.fun(ir, Context::gen_fneg_bottom, b);
                self.set_fpr_bottom(ir, d, t);
            }
            72 => self.set_fpr_bottom(ir, d, b),
            136 => {
                let t = self.fun(ir, Context::gen_fnabs_bottom, b);
                self.set_fpr_bottom(ir, d, t);
            }
            264 => {
                let t = self.fun(ir, Context::gen_fabs_bottom, b);
                self.set_fpr_bottom(ir, d, t);
            }
            583 => self.gen_helper(ir, helpers::mffs, helper_args),
            711 => self.gen_helper(ir, helpers::mtfsf, [insn.fm(), insn.rb() as u32, 0]),
            _ => return Err(self.unsupported(insn)),
        }
        Ok(())
    }

    // -- Primary opcode 4: paired single --------------------

    pub(crate) fn trans_paired(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let xo5 = insn.xo5();
        if matches!(xo5, 6 | 7) {
            return self.trans_psq_x(ir, insn);
        }
        if insn.rc_bit() {
            return Err(self.unsupported(insn));
        }
        let d = insn.rd();
        let (a, b, c) = (self.fpr[insn.ra()], self.fpr[insn.rb()], self.fpr[insn.rc()]);
        match xo5 {
            // ps_sum0: [a0 + b1, c1]
            10 => {
                let bs = self.fshuffle(ir, b, b, 0b01);
                let s = self.fbin(ir, Context::gen_fadd_bottom, a, bs);
                let t = self.fshuffle(ir, s, c, 0b10);
                self.set_fpr_result(ir, d, t, Precision::Paired);
            }
            // ps_sum1: [c0, a0 + b1]
            11 => {
                let bs = self.fshuffle(ir, b, b, 0b01);
                let s = self.fbin(ir, Context::gen_fadd_bottom, a, bs);
                let t = self.fshuffle(ir, c, s, 0b00);
                self.set_fpr_result(ir, d, t, Precision::Paired);
            }
            // ps_muls0/1, ps_madds0/1
            12..=15 => {
                let lane = if xo5 & 1 == 0 { 0b00 } else { 0b11 };
                let cc = self.fshuffle(ir, c, c, lane);
                let mut t = self.gen_fmul(ir, a, cc, true);
                if xo5 >= 14 {
                    t = self.fbin(ir, Context::gen_fadd_pair, t, b);
                }
                self.set_fpr_result(ir, d, t, Precision::Paired);
            }
            23 => {
                let t = ir.new_temp(Type::V128);
                ir.gen_fselect(t, a, b, c);
                ir.gen_mov(Type::V128, self.fpr[d], t);
            }
            24 => self.gen_helper(ir, helpers::ps_res, [d as u32, insn.rb() as u32, 0]),
            26 => self.gen_helper(ir, helpers::ps_rsqrte, [d as u32, insn.rb() as u32, 0]),
            18 | 20 | 21 | 25 | 28..=31 => {
                let t = self
                    .gen_farith(ir, insn, Precision::Paired)
                    .ok_or_else(|| self.unsupported(insn))?;
                self.set_fpr_result(ir, d, t, Precision::Paired);
            }
            _ => return self.trans_paired_x(ir, insn),
        }
        Ok(())
    }

    fn trans_paired_x(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let d = insn.rd();
        let (a, b) = (self.fpr[insn.ra()], self.fpr[insn.rb()]);
        let r = match insn.xo10() {
            // ps_cmpu0 ps_cmpo0
            0 | 32 => {
                self.gen_fcmp(ir, insn.crfd(), a, b);
                return Ok(());
            }
            // ps_cmpu1 ps_cmpo1
            64 | 96 => {
                let a1 = self.fshuffle(ir, a, a, 0b01);
                let b1 = self.fshuffle(ir, b, b, 0b01);
                self.gen_fcmp(ir, insn.crfd(), a1, b1);
                return Ok(());
            }
            40 => self.fun(ir, Context::gen_fneg_pair, b),
            72 => b,
            136 => self.fun(ir, Context::gen_fnabs_pair, b),
            264 => self.fun(ir, Context::gen_fabs_pair, b),
            528 => self.fshuffle(ir, a, b, 0b00),
            560 => self.fshuffle(ir, a, b, 0b10),
            592 => self.fshuffle(ir, a, b, 0b01),
            624 => self.fshuffle(ir, a, b, 0b11),
            _ => return Err(self.unsupported(insn)),
        };
        ir.gen_mov(Type::V128, self.fpr[d], r);
        Ok(())
    }

    // -- Loads and stores -----------------------------------

    fn gen_fp_access(&self, ir: &mut Context, r: usize, ea: TempIdx, kind: FpAccess) {
        match kind {
            FpAccess::LoadSingle => {
                let bits = ir.new_temp(Type::I32);
                ir.gen_guest_ld(Type::I32, bits, ea, MemOp::ul().be());
                let v = self.fun(ir, Context::gen_ffrom_single_bits, bits);
                ir.gen_mov(Type::V128, self.fpr[r], v);
            }
            FpAccess::LoadDouble => {
                let bits = ir.new_temp(Type::I64);
                ir.gen_guest_ld(Type::I64, bits, ea, MemOp::uq().be());
                let v = self.fbin(ir, Context::gen_ffrom_double_bits, self.fpr[r], bits);
                ir.gen_mov(Type::V128, self.fpr[r], v);
            }
            FpAccess::StoreSingle => {
                let bits = ir.new_temp(Type::I32);
                ir.gen_fto_single_bits(bits, self.fpr[r]);
                ir.gen_guest_st(Type::I32, bits, ea, MemOp::ul().be());
            }
            FpAccess::StoreDouble => {
                let bits = ir.new_temp(Type::I64);
                ir.gen_fto_double_bits(bits, self.fpr[r]);
                ir.gen_guest_st(Type::I64, bits, ea, MemOp::uq().be());
            }
            FpAccess::StoreIntWord => {
                let bits = ir.new_temp(Type::I64);
                ir.gen_fto_double_bits(bits, self.fpr[r]);
                let lo = ir.new_temp(Type::I32);
                ir.gen_extrl_i64_i32(lo, bits);
                ir.gen_guest_st(Type::I32, lo, ea, MemOp::ul().be());
            }
        }
    }

    pub(crate) fn trans_fp_load_store_d(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let opcd = insn.opcd();
        let update = opcd & 1 == 1;
        if update && insn.ra() == 0 {
            return Err(self.unsupported(insn));
        }
        let kind = match opcd {
            48 | 49 => FpAccess::LoadSingle,
            50 | 51 => FpAccess::LoadDouble,
            52 | 53 => FpAccess::StoreSingle,
            _ => FpAccess::StoreDouble,
        };
        let ea = self.gen_ea_d(ir, insn);
        self.gen_fp_access(ir, insn.rd(), ea, kind);
        if update {
            self.set_gpr(ir, insn.ra(), ea);
        }
        Ok(())
    }

    pub(crate) fn trans_fp_load_store_x(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let xo = insn.xo10();
        let kind = match xo {
            535 | 567 => FpAccess::LoadSingle,
            599 | 631 => FpAccess::LoadDouble,
            663 | 695 => FpAccess::StoreSingle,
            727 | 759 => FpAccess::StoreDouble,
            _ => FpAccess::StoreIntWord,
        };
        let update = matches!(xo, 567 | 631 | 695 | 759);
        if update && insn.ra() == 0 {
            return Err(self.unsupported(insn));
        }
        let ea = self.gen_ea_x(ir, insn);
        self.gen_fp_access(ir, insn.rd(), ea, kind);
        if update {
            self.set_gpr(ir, insn.ra(), ea);
        }
        Ok(())
    }

    /// `psq_l`/`psq_st` and update forms.
    pub(crate) fn trans_psq_d(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let opcd = insn.opcd();
        let update = opcd & 1 == 1;
        if update && insn.ra() == 0 {
            return Err(self.unsupported(insn));
        }
        let ea = self.gen_ea_disp(ir, insn.ra(), insn.psq_d());
        self.gen_psq(ir, insn, ea, opcd >= 60, update, insn.psq_w(), insn.psq_i());
        Ok(())
    }

    /// `psq_lx`/`psq_stx` and update forms.
    fn trans_psq_x(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let update = insn.xo6() & 0x20 != 0;
        if update && insn.ra() == 0 {
            return Err(self.unsupported(insn));
        }
        let ea = self.gen_ea_x(ir, insn);
        let store = insn.xo5() == 7;
        self.gen_psq(ir, insn, ea, store, update, insn.psqx_w(), insn.psqx_i());
        Ok(())
    }

    /// Quantized accesses go through a helper that reads the GQR; the
    /// address travels through `PpcState::scratch_ea`.
    #[allow(clippy::too_many_arguments)]
    fn gen_psq(
        &self,
        ir: &mut Context,
        insn: Insn,
        ea: TempIdx,
        store: bool,
        update: bool,
        w: u32,
        i: u32,
    ) {
        ir.gen_st(Type::I32, ea, self.env, SCRATCH_EA_OFFSET);
        if update {
            self.set_gpr(ir, insn.ra(), ea);
        }
        let helper = if store {
            helpers::psq_store
        } else {
            helpers::psq_load
        };
        self.gen_helper(ir, helper, [insn.rd() as u32, w, i]);
    }
}
