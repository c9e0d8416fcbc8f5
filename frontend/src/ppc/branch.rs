//! Branch lowering.
//!
//! Branches inside the function jump straight to the target segment's
//! label. Everything else (calls, returns, indirect jumps and branches
//! leaving the function) stores the target into `PpcState::pc` and
//! returns to the dispatcher.

use super::insn::{Insn, BO_COND_TRUE, BO_CTR_ZERO, BO_NO_COND, BO_NO_CTR};
use super::trans::imm;
use super::{Flow, PpcDisasContext};
use crate::LowerError;
use ppcrec_core::{Cond, Context, TempIdx, Type};

impl PpcDisasContext {
    /// Evaluate BO/BI, decrementing CTR when BO asks for it. Returns
    /// a 0/1 temp, or `None` when the branch is always taken.
    fn gen_branch_cond(&self, ir: &mut Context, bo: u32, bi: usize) -> Option<TempIdx> {
        let mut take = None;
        if bo & BO_NO_CTR == 0 {
            let ctr = self.binop_i(ir, Context::gen_sub, self.ctr, 1);
            ir.gen_mov(Type::I32, self.ctr, ctr);
            let cond = if bo & BO_CTR_ZERO != 0 {
                Cond::Eq
            } else {
                Cond::Ne
            };
            let zero = imm(ir, 0);
            let t = ir.new_temp(Type::I32);
            ir.gen_setcond(Type::I32, t, ctr, zero, cond);
            take = Some(t);
        }
        if bo & BO_NO_COND == 0 {
            let bit = self.cr[bi];
            let c = if bo & BO_COND_TRUE != 0 {
                bit
            } else {
                self.binop_i(ir, Context::gen_xor, bit, 1)
            };
            take = Some(match take {
                Some(t) => self.binop(ir, Context::gen_and, t, c),
                None => c,
            });
        }
        take
    }

    pub(crate) fn trans_b(&mut self, ir: &mut Context, insn: Insn) -> Flow {
        let target = insn.b_target(self.pc);
        if insn.lk() {
            let ret = imm(ir, self.pc.wrapping_add(4));
            ir.gen_mov(Type::I32, self.lr, ret);
            self.gen_exit_to(ir, target);
        } else {
            self.gen_goto(ir, target);
        }
        Flow::NoReturn
    }

    pub(crate) fn trans_bc(&mut self, ir: &mut Context, insn: Insn) -> Flow {
        let target = insn.bc_target(self.pc);
        if insn.lk() {
            let ret = imm(ir, self.pc.wrapping_add(4));
            ir.gen_mov(Type::I32, self.lr, ret);
        }
        match self.gen_branch_cond(ir, insn.bo(), insn.bi()) {
            None => {
                if insn.lk() {
                    self.gen_exit_to(ir, target);
                } else {
                    self.gen_goto(ir, target);
                }
                Flow::NoReturn
            }
            Some(take) => {
                let label = self.branch_label(ir, target);
                let zero = imm(ir, 0);
                ir.gen_brcond(Type::I32, take, zero, Cond::Ne, label);
                Flow::Next
            }
        }
    }

    /// `bclr`/`bcctr` and their link forms. The target register is
    /// read before LR is overwritten.
    pub(crate) fn trans_bclr(
        &mut self,
        ir: &mut Context,
        insn: Insn,
        to_ctr: bool,
    ) -> Result<Flow, LowerError> {
        let bo = insn.bo();
        // Decrementing CTR while branching through it is invalid.
        if to_ctr && bo & BO_NO_CTR == 0 {
            return Err(self.unsupported(insn));
        }
        let src = if to_ctr { self.ctr } else { self.lr };
        let target = self.binop_i(ir, Context::gen_and, src, !3);
        let next = self.pc.wrapping_add(4);
        if insn.lk() {
            let ret = imm(ir, next);
            ir.gen_mov(Type::I32, self.lr, ret);
        }
        if let Some(take) = self.gen_branch_cond(ir, bo, insn.bi()) {
            let label = self.branch_label(ir, next);
            let zero = imm(ir, 0);
            ir.gen_brcond(Type::I32, take, zero, Cond::Eq, label);
        }
        self.gen_exit_to_reg(ir, target);
        Ok(Flow::NoReturn)
    }
}
