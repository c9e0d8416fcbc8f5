//! Integer, condition register, SPR and memory instruction lowering.
//!
//! Repetitive patterns are factored into small `gen_*` helpers
//! parameterised by a [`BinOp`] so each instruction arm stays one or
//! two lines.

use super::cpu::gqr_offset;
use super::helpers;
use super::insn::{rotate_mask, Insn};
use super::{Flow, PpcDisasContext};
use crate::LowerError;
use ppcrec_core::{Cond, Context, MemOp, TempIdx, Type};

/// Binary IR operation: `fn(ir, ty, dst, lhs, rhs) -> dst`.
pub(crate) type BinOp = fn(&mut Context, Type, TempIdx, TempIdx, TempIdx) -> TempIdx;

const SPR_XER: u32 = 1;
const SPR_LR: u32 = 8;
const SPR_CTR: u32 = 9;
const SPR_GQR0: u32 = 912;
const SPR_GQR7: u32 = 919;

/// Carry-in of an add-with-carry.
#[derive(Clone, Copy)]
enum CarryIn {
    Zero,
    One,
    Xer,
}

impl PpcDisasContext {
    /// Lower one instruction at `self.pc`.
    pub(crate) fn translate(&mut self, ir: &mut Context, insn: Insn) -> Result<Flow, LowerError> {
        let (rd, ra) = (insn.rd(), insn.ra());
        match insn.opcd() {
            1 => return self.trans_hle(ir, insn),
            16 => return Ok(self.trans_bc(ir, insn)),
            18 => return Ok(self.trans_b(ir, insn)),
            19 => return self.trans_op19(ir, insn),
            4 => self.trans_paired(ir, insn)?,
            7 => {
                let r = self.binop_i(ir, Context::gen_mul, self.gpr[ra], insn.simm() as u32);
                self.set_gpr(ir, rd, r);
            }
            8 => {
                let na = self.unop(ir, Context::gen_not, self.gpr[ra]);
                let v = imm(ir, insn.simm() as u32);
                let r = self.gen_add_carry(ir, na, v, CarryIn::One);
                self.set_gpr(ir, rd, r);
            }
            10 | 11 => {
                if insn.cmp_l() {
                    return Err(self.unsupported(insn));
                }
                let signed = insn.opcd() == 11;
                let b = if signed {
                    imm(ir, insn.simm() as u32)
                } else {
                    imm(ir, insn.uimm())
                };
                self.gen_cr_compare(ir, insn.crfd(), self.gpr[ra], b, signed);
            }
            12 | 13 => {
                let v = imm(ir, insn.simm() as u32);
                let r = self.gen_add_carry(ir, self.gpr[ra], v, CarryIn::Zero);
                self.set_gpr(ir, rd, r);
                if insn.opcd() == 13 {
                    self.gen_record(ir, r);
                }
            }
            14 | 15 => {
                let v = if insn.opcd() == 14 {
                    insn.simm() as u32
                } else {
                    (insn.simm() as u32) << 16
                };
                let r = if ra == 0 {
                    imm(ir, v)
                } else {
                    self.binop_i(ir, Context::gen_add, self.gpr[ra], v)
                };
                self.set_gpr(ir, rd, r);
            }
            20 => {
                let m = rotate_mask(insn.mb(), insn.me());
                let rot = self.binop_i(ir, Context::gen_rotl, self.gpr[rd], insn.sh());
                let ins = self.binop_i(ir, Context::gen_and, rot, m);
                let keep = self.binop_i(ir, Context::gen_and, self.gpr[ra], !m);
                let r = self.binop(ir, Context::gen_or, ins, keep);
                self.set_gpr_rc(ir, insn, ra, r);
            }
            21 => {
                let m = rotate_mask(insn.mb(), insn.me());
                let rot = if insn.sh() == 0 {
                    self.gpr[rd]
                } else {
                    self.binop_i(ir, Context::gen_rotl, self.gpr[rd], insn.sh())
                };
                let r = self.binop_i(ir, Context::gen_and, rot, m);
                self.set_gpr_rc(ir, insn, ra, r);
            }
            23 => {
                let m = rotate_mask(insn.mb(), insn.me());
                let n = self.binop_i(ir, Context::gen_and, self.gpr[insn.rb()], 31);
                let rot = self.binop(ir, Context::gen_rotl, self.gpr[rd], n);
                let r = self.binop_i(ir, Context::gen_and, rot, m);
                self.set_gpr_rc(ir, insn, ra, r);
            }
            24..=29 => self.trans_logic_imm(ir, insn),
            31 => self.trans_op31(ir, insn)?,
            32..=45 => self.trans_load_store_d(ir, insn)?,
            46 => {
                let base = self.gen_ea_d(ir, insn);
                for (i, r) in (rd..32).enumerate() {
                    let ea = self.binop_i(ir, Context::gen_add, base, i as u32 * 4);
                    let v = ir.new_temp(Type::I32);
                    ir.gen_guest_ld(Type::I32, v, ea, MemOp::ul().be());
                    self.set_gpr(ir, r, v);
                }
            }
            47 => {
                let base = self.gen_ea_d(ir, insn);
                for (i, r) in (rd..32).enumerate() {
                    let ea = self.binop_i(ir, Context::gen_add, base, i as u32 * 4);
                    ir.gen_guest_st(Type::I32, self.gpr[r], ea, MemOp::ul().be());
                }
            }
            48..=55 => self.trans_fp_load_store_d(ir, insn)?,
            56 | 57 | 60 | 61 => self.trans_psq_d(ir, insn)?,
            59 => self.trans_op59(ir, insn)?,
            63 => self.trans_op63(ir, insn)?,
            _ => return Err(self.unsupported(insn)),
        }
        Ok(Flow::Next)
    }

    // -- GPR access ----------------------------------------

    pub(crate) fn set_gpr(&self, ir: &mut Context, r: usize, val: TempIdx) {
        ir.gen_mov(Type::I32, self.gpr[r], val);
    }

    /// Write `val` to `r` and update CR0 when Rc is set.
    fn set_gpr_rc(&self, ir: &mut Context, insn: Insn, r: usize, val: TempIdx) {
        self.set_gpr(ir, r, val);
        if insn.rc_bit() {
            self.gen_record(ir, val);
        }
    }

    pub(crate) fn binop(&self, ir: &mut Context, op: BinOp, a: TempIdx, b: TempIdx) -> TempIdx {
        let d = ir.new_temp(Type::I32);
        op(ir, Type::I32, d, a, b)
    }

    /// `op(a, v)` with an immediate right operand.
    pub(crate) fn binop_i(&self, ir: &mut Context, op: BinOp, a: TempIdx, v: u32) -> TempIdx {
        let b = imm(ir, v);
        self.binop(ir, op, a, b)
    }

    fn unop(
        &self,
        ir: &mut Context,
        op: fn(&mut Context, Type, TempIdx, TempIdx) -> TempIdx,
        a: TempIdx,
    ) -> TempIdx {
        let d = ir.new_temp(Type::I32);
        op(ir, Type::I32, d, a)
    }

    // -- Effective addresses --------------------------------

    /// `(rA|0) + d`
    pub(crate) fn gen_ea_d(&self, ir: &mut Context, insn: Insn) -> TempIdx {
        self.gen_ea_disp(ir, insn.ra(), insn.simm())
    }

    pub(crate) fn gen_ea_disp(&self, ir: &mut Context, ra: usize, disp: i32) -> TempIdx {
        if ra == 0 {
            imm(ir, disp as u32)
        } else {
            self.binop_i(ir, Context::gen_add, self.gpr[ra], disp as u32)
        }
    }

    /// `(rA|0) + rB`
    pub(crate) fn gen_ea_x(&self, ir: &mut Context, insn: Insn) -> TempIdx {
        if insn.ra() == 0 {
            self.binop_i(ir, Context::gen_add, self.gpr[insn.rb()], 0)
        } else {
            self.binop(ir, Context::gen_add, self.gpr[insn.ra()], self.gpr[insn.rb()])
        }
    }

    // -- Condition register ---------------------------------

    /// Set CR field `field` from comparing `a` with `b`; SO is copied
    /// from XER.
    pub(crate) fn gen_cr_compare(
        &self,
        ir: &mut Context,
        field: usize,
        a: TempIdx,
        b: TempIdx,
        signed: bool,
    ) {
        let (lt, gt) = if signed {
            (Cond::Lt, Cond::Gt)
        } else {
            (Cond::Ltu, Cond::Gtu)
        };
        for (bit, cond) in [(0, lt), (1, gt), (2, Cond::Eq)] {
            let t = ir.new_temp(Type::I32);
            ir.gen_setcond(Type::I32, t, a, b, cond);
            ir.gen_mov(Type::I32, self.cr[field * 4 + bit], t);
        }
        ir.gen_mov(Type::I32, self.cr[field * 4 + 3], self.xer_so);
    }

    /// CR0 from a signed compare of `val` with zero.
    pub(crate) fn gen_record(&self, ir: &mut Context, val: TempIdx) {
        let zero = imm(ir, 0);
        self.gen_cr_compare(ir, 0, val, zero, true);
    }

    // -- Arithmetic -----------------------------------------

    /// `a + b + carry_in` with the carry out written to XER[CA].
    fn gen_add_carry(&self, ir: &mut Context, a: TempIdx, b: TempIdx, cin: CarryIn) -> TempIdx {
        let a64 = ir.new_temp(Type::I64);
        ir.gen_ext_u32_i64(a64, a);
        let b64 = ir.new_temp(Type::I64);
        ir.gen_ext_u32_i64(b64, b);
        let sum = ir.new_temp(Type::I64);
        ir.gen_add(Type::I64, sum, a64, b64);
        let sum = match cin {
            CarryIn::Zero => sum,
            CarryIn::One => {
                let one = ir.new_const(Type::I64, 1);
                let s = ir.new_temp(Type::I64);
                ir.gen_add(Type::I64, s, sum, one)
            }
            CarryIn::Xer => {
                let ca = ir.new_temp(Type::I64);
                ir.gen_ext_u32_i64(ca, self.xer_ca);
                let s = ir.new_temp(Type::I64);
                ir.gen_add(Type::I64, s, sum, ca)
            }
        };
        let r = ir.new_temp(Type::I32);
        ir.gen_extrl_i64_i32(r, sum);
        let ca = ir.new_temp(Type::I32);
        ir.gen_extrh_i64_i32(ca, sum);
        ir.gen_mov(Type::I32, self.xer_ca, ca);
        r
    }

    /// High word of the 64-bit product.
    fn gen_mulh(&self, ir: &mut Context, a: TempIdx, b: TempIdx, signed: bool) -> TempIdx {
        let a64 = ir.new_temp(Type::I64);
        let b64 = ir.new_temp(Type::I64);
        if signed {
            ir.gen_ext_i32_i64(a64, a);
            ir.gen_ext_i32_i64(b64, b);
        } else {
            ir.gen_ext_u32_i64(a64, a);
            ir.gen_ext_u32_i64(b64, b);
        }
        let p = ir.new_temp(Type::I64);
        ir.gen_mul(Type::I64, p, a64, b64);
        let r = ir.new_temp(Type::I32);
        ir.gen_extrh_i64_i32(r, p)
    }

    /// `slw`/`srw`: shift amounts 32..63 produce zero.
    fn gen_shift_word(&self, ir: &mut Context, s: TempIdx, b: TempIdx, op: BinOp) -> TempIdx {
        let s64 = ir.new_temp(Type::I64);
        ir.gen_ext_u32_i64(s64, s);
        let n = self.binop_i(ir, Context::gen_and, b, 63);
        let n64 = ir.new_temp(Type::I64);
        ir.gen_ext_u32_i64(n64, n);
        let r64 = ir.new_temp(Type::I64);
        op(ir, Type::I64, r64, s64, n64);
        let r = ir.new_temp(Type::I32);
        ir.gen_extrl_i64_i32(r, r64)
    }

    /// `sraw`: CA is set when the source is negative and any one bits
    /// were shifted out.
    fn gen_sraw(&self, ir: &mut Context, s: TempIdx, b: TempIdx) -> TempIdx {
        let s64 = ir.new_temp(Type::I64);
        ir.gen_ext_i32_i64(s64, s);
        let n = self.binop_i(ir, Context::gen_and, b, 63);
        let n64 = ir.new_temp(Type::I64);
        ir.gen_ext_u32_i64(n64, n);
        let r64 = ir.new_temp(Type::I64);
        ir.gen_sar(Type::I64, r64, s64, n64);
        let back = ir.new_temp(Type::I64);
        ir.gen_shl(Type::I64, back, r64, n64);
        let lost64 = ir.new_temp(Type::I64);
        ir.gen_setcond(Type::I64, lost64, back, s64, Cond::Ne);
        let lost = ir.new_temp(Type::I32);
        ir.gen_extrl_i64_i32(lost, lost64);
        self.gen_sra_carry(ir, s, lost);
        let r = ir.new_temp(Type::I32);
        ir.gen_extrl_i64_i32(r, r64)
    }

    fn gen_srawi(&self, ir: &mut Context, s: TempIdx, sh: u32) -> TempIdx {
        if sh == 0 {
            let zero = imm(ir, 0);
            ir.gen_mov(Type::I32, self.xer_ca, zero);
            return self.binop(ir, Context::gen_or, s, zero);
        }
        let n = imm(ir, sh);
        let r = self.binop(ir, Context::gen_sar, s, n);
        let back = self.binop(ir, Context::gen_shl, r, n);
        let lost = ir.new_temp(Type::I32);
        ir.gen_setcond(Type::I32, lost, back, s, Cond::Ne);
        self.gen_sra_carry(ir, s, lost);
        r
    }

    fn gen_sra_carry(&self, ir: &mut Context, s: TempIdx, lost: TempIdx) {
        let neg = ir.new_temp(Type::I32);
        let zero = imm(ir, 0);
        ir.gen_setcond(Type::I32, neg, s, zero, Cond::Lt);
        let ca = self.binop(ir, Context::gen_and, neg, lost);
        ir.gen_mov(Type::I32, self.xer_ca, ca);
    }

    /// Call `helper(state, args...)`. Helpers access guest registers
    /// through the state, so no local may be live across the call.
    pub(crate) fn gen_helper(&self, ir: &mut Context, helper: helpers::Helper, args: [u32; 3]) {
        ir.gen_call(helpers::address(helper), args);
    }

    // -- Instruction groups ---------------------------------

    fn trans_logic_imm(&self, ir: &mut Context, insn: Insn) {
        let (rs, ra) = (insn.rd(), insn.ra());
        let u = insn.uimm();
        let (op, v, record): (BinOp, u32, bool) = match insn.opcd() {
            24 => (Context::gen_or, u, false),
            25 => (Context::gen_or, u << 16, false),
            26 => (Context::gen_xor, u, false),
            27 => (Context::gen_xor, u << 16, false),
            28 => (Context::gen_and, u, true),
            _ => (Context::gen_and, u << 16, true),
        };
        // ori r0,r0,0 and friends
        if !record && v == 0 && rs == ra {
            return;
        }
        let r = self.binop_i(ir, op, self.gpr[rs], v);
        self.set_gpr(ir, ra, r);
        if record {
            self.gen_record(ir, r);
        }
    }

    fn trans_load_store_d(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let opcd = insn.opcd();
        let update = opcd & 1 == 1;
        let (memop, store) = match opcd {
            32 | 33 => (MemOp::ul().be(), false),
            34 | 35 => (MemOp::ub(), false),
            36 | 37 => (MemOp::ul().be(), true),
            38 | 39 => (MemOp::ub(), true),
            40 | 41 => (MemOp::uw().be(), false),
            42 | 43 => (MemOp::sw().be(), false),
            _ => (MemOp::uw().be(), true),
        };
        if update && insn.ra() == 0 {
            return Err(self.unsupported(insn));
        }
        let ea = self.gen_ea_d(ir, insn);
        self.gen_load_store(ir, insn, ea, memop, store, update);
        Ok(())
    }

    /// Shared tail of the integer loads and stores: access `ea`, then
    /// write it back to rA for update forms.
    fn gen_load_store(
        &self,
        ir: &mut Context,
        insn: Insn,
        ea: TempIdx,
        memop: MemOp,
        store: bool,
        update: bool,
    ) {
        if store {
            ir.gen_guest_st(Type::I32, self.gpr[insn.rd()], ea, memop);
        } else {
            let v = ir.new_temp(Type::I32);
            ir.gen_guest_ld(Type::I32, v, ea, memop);
            self.set_gpr(ir, insn.rd(), v);
        }
        if update {
            self.set_gpr(ir, insn.ra(), ea);
        }
    }

    fn trans_op31(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let (rs, ra, rb) = (insn.rd(), insn.ra(), insn.rb());
        let (s, b) = (self.gpr[rs], self.gpr[rb]);
        let xo = insn.xo10();

        // X-form integer loads and stores
        let mem = match xo {
            23 => Some((MemOp::ul().be(), false, false)),
            55 => Some((MemOp::ul().be(), false, true)),
            87 => Some((MemOp::ub(), false, false)),
            119 => Some((MemOp::ub(), false, true)),
            279 => Some((MemOp::uw().be(), false, false)),
            311 => Some((MemOp::uw().be(), false, true)),
            343 => Some((MemOp::sw().be(), false, false)),
            375 => Some((MemOp::sw().be(), false, true)),
            534 => Some((MemOp::ul(), false, false)),
            790 => Some((MemOp::uw(), false, false)),
            151 => Some((MemOp::ul().be(), true, false)),
            183 => Some((MemOp::ul().be(), true, true)),
            215 => Some((MemOp::ub(), true, false)),
            247 => Some((MemOp::ub(), true, true)),
            407 => Some((MemOp::uw().be(), true, false)),
            439 => Some((MemOp::uw().be(), true, true)),
            662 => Some((MemOp::ul(), true, false)),
            918 => Some((MemOp::uw(), true, false)),
            _ => None,
        };
        if let Some((memop, store, update)) = mem {
            if update && ra == 0 {
                return Err(self.unsupported(insn));
            }
            let ea = self.gen_ea_x(ir, insn);
            self.gen_load_store(ir, insn, ea, memop, store, update);
            return Ok(());
        }

        let r = match xo {
            0 | 32 => {
                if insn.cmp_l() {
                    return Err(self.unsupported(insn));
                }
                self.gen_cr_compare(ir, insn.crfd(), self.gpr[ra], b, xo == 0);
                return Ok(());
            }
            28 => self.binop(ir, Context::gen_and, s, b),
            60 => {
                let nb = self.unop(ir, Context::gen_not, b);
                self.binop(ir, Context::gen_and, s, nb)
            }
            444 => {
                // mr rA,rS
                if rs == rb && !insn.rc_bit() {
                    self.set_gpr(ir, ra, s);
                    return Ok(());
                }
                self.binop(ir, Context::gen_or, s, b)
            }
            412 => {
                let nb = self.unop(ir, Context::gen_not, b);
                self.binop(ir, Context::gen_or, s, nb)
            }
            316 => self.binop(ir, Context::gen_xor, s, b),
            124 => {
                let t = self.binop(ir, Context::gen_or, s, b);
                self.unop(ir, Context::gen_not, t)
            }
            476 => {
                let t = self.binop(ir, Context::gen_and, s, b);
                self.unop(ir, Context::gen_not, t)
            }
            284 => {
                let t = self.binop(ir, Context::gen_xor, s, b);
                self.unop(ir, Context::gen_not, t)
            }
            24 => self.gen_shift_word(ir, s, b, Context::gen_shl),
            536 => self.gen_shift_word(ir, s, b, Context::gen_shr),
            792 => self.gen_sraw(ir, s, b),
            824 => self.gen_srawi(ir, s, insn.sh()),
            954 => self.unop(ir, Context::gen_ext8s, s),
            922 => self.unop(ir, Context::gen_ext16s, s),
            26 => self.unop(ir, Context::gen_clz, s),
            19 => {
                self.gen_helper(ir, helpers::mfcr, [rs as u32, 0, 0]);
                return Ok(());
            }
            144 => {
                self.gen_helper(ir, helpers::mtcrf, [rs as u32, insn.crm(), 0]);
                return Ok(());
            }
            339 => return self.trans_mfspr(ir, insn),
            467 => return self.trans_mtspr(ir, insn),
            1014 => {
                let ea = self.gen_ea_x(ir, insn);
                let line = self.binop_i(ir, Context::gen_and, ea, !31);
                let zero = ir.new_const(Type::I64, 0);
                for off in [0u32, 8, 16, 24] {
                    let a = self.binop_i(ir, Context::gen_add, line, off);
                    ir.gen_guest_st(Type::I64, zero, a, MemOp::uq());
                }
                return Ok(());
            }
            // sync eieio dcbf dcbst dcbt dcbtst dcbi icbi
            598 | 854 | 86 | 54 | 278 | 246 | 470 | 982 => return Ok(()),
            535 | 567 | 599 | 631 | 663 | 695 | 727 | 759 | 983 => {
                return self.trans_fp_load_store_x(ir, insn);
            }
            _ => return self.trans_xo(ir, insn),
        };
        // X-form logical ops write rA
        self.set_gpr_rc(ir, insn, ra, r);
        Ok(())
    }

    /// XO-form arithmetic: `rD = op(rA, rB)`.
    fn trans_xo(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let (rd, ra, rb) = (insn.rd(), insn.ra(), insn.rb());
        let (a, b) = (self.gpr[ra], self.gpr[rb]);
        let xo = insn.xo10() & 0x1FF;
        if !matches!(
            xo,
            266 | 10 | 138 | 234 | 202 | 40 | 8 | 136 | 232 | 200 | 104 | 235 | 75 | 11 | 491 | 459
        ) || insn.oe()
        {
            return Err(self.unsupported(insn));
        }
        let minus_one = imm(ir, u32::MAX);
        let zero = imm(ir, 0);
        let r = match xo {
            266 => self.binop(ir, Context::gen_add, a, b),
            10 => self.gen_add_carry(ir, a, b, CarryIn::Zero),
            138 => self.gen_add_carry(ir, a, b, CarryIn::Xer),
            234 => self.gen_add_carry(ir, a, minus_one, CarryIn::Xer),
            202 => self.gen_add_carry(ir, a, zero, CarryIn::Xer),
            40 => self.binop(ir, Context::gen_sub, b, a),
            8 | 136 | 232 | 200 => {
                let na = self.unop(ir, Context::gen_not, a);
                match xo {
                    8 => self.gen_add_carry(ir, na, b, CarryIn::One),
                    136 => self.gen_add_carry(ir, na, b, CarryIn::Xer),
                    232 => self.gen_add_carry(ir, na, minus_one, CarryIn::Xer),
                    _ => self.gen_add_carry(ir, na, zero, CarryIn::Xer),
                }
            }
            104 => self.unop(ir, Context::gen_neg, a),
            235 => self.binop(ir, Context::gen_mul, a, b),
            75 => self.gen_mulh(ir, a, b, true),
            11 => self.gen_mulh(ir, a, b, false),
            _ => {
                let helper = if xo == 491 {
                    helpers::divw
                } else {
                    helpers::divwu
                };
                self.gen_helper(ir, helper, [rd as u32, ra as u32, rb as u32]);
                if insn.rc_bit() {
                    self.gen_record(ir, self.gpr[rd]);
                }
                return Ok(());
            }
        };
        self.set_gpr_rc(ir, insn, rd, r);
        Ok(())
    }

    fn trans_mfspr(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let rd = insn.rd();
        match insn.spr() {
            SPR_LR => self.set_gpr(ir, rd, self.lr),
            SPR_CTR => self.set_gpr(ir, rd, self.ctr),
            SPR_XER => {
                let so = self.binop_i(ir, Context::gen_shl, self.xer_so, 31);
                let ov = self.binop_i(ir, Context::gen_shl, self.xer_ov, 30);
                let ca = self.binop_i(ir, Context::gen_shl, self.xer_ca, 29);
                let t = self.binop(ir, Context::gen_or, so, ov);
                let r = self.binop(ir, Context::gen_or, t, ca);
                self.set_gpr(ir, rd, r);
            }
            spr @ SPR_GQR0..=SPR_GQR7 => {
                let v = ir.new_temp(Type::I32);
                ir.gen_ld(Type::I32, v, self.env, gqr_offset((spr - SPR_GQR0) as usize));
                self.set_gpr(ir, rd, v);
            }
            _ => return Err(self.unsupported(insn)),
        }
        Ok(())
    }

    fn trans_mtspr(&self, ir: &mut Context, insn: Insn) -> Result<(), LowerError> {
        let s = self.gpr[insn.rd()];
        match insn.spr() {
            SPR_LR => {
                ir.gen_mov(Type::I32, self.lr, s);
            }
            SPR_CTR => {
                ir.gen_mov(Type::I32, self.ctr, s);
            }
            SPR_XER => {
                for (bit, dst) in [(31, self.xer_so), (30, self.xer_ov), (29, self.xer_ca)] {
                    let t = self.binop_i(ir, Context::gen_shr, s, bit);
                    let v = self.binop_i(ir, Context::gen_and, t, 1);
                    ir.gen_mov(Type::I32, dst, v);
                }
            }
            spr @ SPR_GQR0..=SPR_GQR7 => {
                ir.gen_st(Type::I32, s, self.env, gqr_offset((spr - SPR_GQR0) as usize));
            }
            _ => return Err(self.unsupported(insn)),
        }
        Ok(())
    }

    /// `mcrf`, condition register logic and `isync`; branches to LR
    /// and CTR are handled in the branch module.
    fn trans_op19(&mut self, ir: &mut Context, insn: Insn) -> Result<Flow, LowerError> {
        let (d, a, b) = (insn.rd(), insn.ra(), insn.rb());
        let xo = insn.xo10();
        let (op, invert_b, invert_result): (BinOp, bool, bool) = match xo {
            16 => return self.trans_bclr(ir, insn, false),
            528 => return self.trans_bclr(ir, insn, true),
            150 => return Ok(Flow::Next),
            0 => {
                let (fd, fs) = (insn.crfd(), insn.crfs());
                let bits: Vec<TempIdx> = (0..4)
                    .map(|i| self.binop_i(ir, Context::gen_or, self.cr[fs * 4 + i], 0))
                    .collect();
                for (i, v) in bits.into_iter().enumerate() {
                    ir.gen_mov(Type::I32, self.cr[fd * 4 + i], v);
                }
                return Ok(Flow::Next);
            }
            257 => (Context::gen_and, false, false),
            129 => (Context::gen_and, true, false),
            289 => (Context::gen_xor, false, true),
            225 => (Context::gen_and, false, true),
            33 => (Context::gen_or, false, true),
            449 => (Context::gen_or, false, false),
            417 => (Context::gen_or, true, false),
            193 => (Context::gen_xor, false, false),
            _ => return Err(self.unsupported(insn)),
        };
        let one = imm(ir, 1);
        let bv = if invert_b {
            self.binop(ir, Context::gen_xor, self.cr[b], one)
        } else {
            self.cr[b]
        };
        let mut r = self.binop(ir, op, self.cr[a], bv);
        if invert_result {
            r = self.binop(ir, Context::gen_xor, r, one);
        }
        ir.gen_mov(Type::I32, self.cr[d], r);
        Ok(Flow::Next)
    }

    /// HLE escape: hand the instruction back to the dispatcher.
    fn trans_hle(&mut self, ir: &mut Context, insn: Insn) -> Result<Flow, LowerError> {
        if insn.hle_id().is_none() {
            return Err(self.unsupported(insn));
        }
        self.gen_exit_to(ir, self.pc);
        Ok(Flow::NoReturn)
    }
}

pub(crate) fn imm(ir: &mut Context, v: u32) -> TempIdx {
    ir.new_const(Type::I32, v as u64)
}
