use crate::code_buffer::CodeBuffer;
use crate::constraint::OpConstraint;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{
    xmm_index, Reg, ALLOCATABLE_GPRS, ALLOCATABLE_XMMS, CALLEE_SAVED, CALL_ARG_REGS,
    CALL_CLOBBERED, ENV_REG, FP_SCRATCH, MEMBASE_REG, SCRATCH_REG, STACK_ADDEND,
};
use crate::HostCodeGen;
use ppcrec_core::{Cond, Context, FCmpMode, MemOp, Op, Opcode, RegSet, TempIdx, Type};

/// Exit value returned by the epilogue when code leaves through a
/// cycle check or a branch out of the function.
pub const EXIT_CONTINUE: u32 = 0;

#[inline]
fn gpr(r: u8) -> Reg {
    Reg::from_u8(r)
}

#[inline]
fn xmm(r: u8) -> u8 {
    xmm_index(r)
}

impl HostCodeGen for X86_64CodeGen {
    fn emit_prologue(&mut self, buf: &mut CodeBuffer) {
        self.prologue_offset = buf.offset();
        for &reg in CALLEE_SAVED {
            emit_push(buf, reg);
        }
        // mov rbp, rdi (state pointer)
        emit_mov_rr(buf, true, ENV_REG, CALL_ARG_REGS[0]);
        // mov r14, [rbp + membase]
        emit_load(buf, true, MEMBASE_REG, ENV_REG, self.membase_offset);
        emit_arith_ri(buf, ArithOp::Sub, true, Reg::Rsp, STACK_ADDEND as i32);
        // jmp *rsi (native entry point)
        emit_jmp_reg(buf, CALL_ARG_REGS[1]);
        self.code_gen_start = buf.offset();
    }

    fn emit_epilogue(&mut self, buf: &mut CodeBuffer) {
        self.exit_offset = buf.offset();
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, STACK_ADDEND as i32);
        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(buf, reg);
        }
        emit_ret(buf);
        self.code_gen_start = buf.offset();
    }

    fn epilogue_offset(&self) -> usize {
        self.exit_offset
    }

    fn init_context(&self, ctx: &mut Context) -> TempIdx {
        ctx.new_fixed(Type::I64, ENV_REG as u8, "env")
    }

    fn op_constraint(&self, opc: Opcode) -> &'static OpConstraint {
        crate::x86_64::constraints::op_constraint(opc)
    }

    fn allocatable_regs(&self, ty: Type) -> RegSet {
        match ty {
            Type::V128 => ALLOCATABLE_XMMS,
            Type::I32 | Type::I64 => ALLOCATABLE_GPRS,
        }
    }

    fn call_clobbered_regs(&self) -> RegSet {
        CALL_CLOBBERED
    }

    fn out_mov(&self, buf: &mut CodeBuffer, ty: Type, dst: u8, src: u8) {
        if dst == src {
            return;
        }
        match ty {
            Type::V128 => emit_sse_rr(buf, OPC_MOVAPS, xmm(dst), xmm(src)),
            _ => emit_mov_rr(buf, ty == Type::I64, gpr(dst), gpr(src)),
        }
    }

    fn out_movi(&self, buf: &mut CodeBuffer, ty: Type, dst: u8, val: u64) {
        match ty {
            Type::V128 => {
                // Bottom lane = raw bits, top lane = 0.
                emit_mov_ri(buf, true, SCRATCH_REG, val);
                emit_movd_to_xmm(buf, true, xmm(dst), SCRATCH_REG);
            }
            _ => emit_mov_ri(buf, ty == Type::I64, gpr(dst), val),
        }
    }

    fn out_ld(&self, buf: &mut CodeBuffer, ty: Type, dst: u8, base: u8, offset: i64) {
        match ty {
            Type::V128 => emit_sse_load(buf, xmm(dst), gpr(base), offset as i32),
            _ => emit_load(buf, ty == Type::I64, gpr(dst), gpr(base), offset as i32),
        }
    }

    fn out_st(&self, buf: &mut CodeBuffer, ty: Type, src: u8, base: u8, offset: i64) {
        match ty {
            Type::V128 => emit_sse_store(buf, xmm(src), gpr(base), offset as i32),
            _ => emit_store(buf, ty == Type::I64, gpr(src), gpr(base), offset as i32),
        }
    }

    fn out_op(
        &self,
        buf: &mut CodeBuffer,
        ctx: &Context,
        op: &Op,
        oregs: &[u8],
        iregs: &[u8],
        cargs: &[u32],
    ) {
        if op.opc.is_float() {
            self.out_float_op(buf, op, oregs, iregs, cargs);
            return;
        }
        let rexw = op.op_type == Type::I64;
        match op.opc {
            Opcode::Add => {
                let d = gpr(oregs[0]);
                let a = gpr(iregs[0]);
                let b = gpr(iregs[1]);
                if oregs[0] == iregs[0] {
                    emit_arith_rr(buf, ArithOp::Add, rexw, d, b);
                } else if oregs[0] == iregs[1] {
                    emit_arith_rr(buf, ArithOp::Add, rexw, d, a);
                } else {
                    emit_lea_sib(buf, rexw, d, a, b);
                }
            }
            // Constraints guarantee oregs[0] == iregs[0]
            Opcode::Sub | Opcode::And | Opcode::Or | Opcode::Xor => {
                let aop = match op.opc {
                    Opcode::Sub => ArithOp::Sub,
                    Opcode::And => ArithOp::And,
                    Opcode::Or => ArithOp::Or,
                    _ => ArithOp::Xor,
                };
                emit_arith_rr(buf, aop, rexw, gpr(oregs[0]), gpr(iregs[1]));
            }
            Opcode::Mul => {
                emit_imul_rr(buf, rexw, gpr(oregs[0]), gpr(iregs[1]));
            }
            Opcode::Neg => emit_neg(buf, rexw, gpr(oregs[0])),
            Opcode::Not => emit_not(buf, rexw, gpr(oregs[0])),
            // Constraints guarantee oregs[0] == iregs[0]
            // and iregs[1] == RCX.
            Opcode::Shl | Opcode::Shr | Opcode::Sar | Opcode::RotL => {
                let sop = match op.opc {
                    Opcode::Shl => ShiftOp::Shl,
                    Opcode::Shr => ShiftOp::Shr,
                    Opcode::Sar => ShiftOp::Sar,
                    _ => ShiftOp::Rol,
                };
                emit_shift_cl(buf, sop, rexw, gpr(oregs[0]));
            }
            Opcode::Clz => {
                let d = gpr(oregs[0]);
                let bits: u64 = if rexw { 64 } else { 32 };
                // bsr yields the index of the highest set bit;
                // clz = index ^ (bits - 1), and 2*bits-1 maps zero to bits.
                emit_bsr(buf, rexw, d, gpr(iregs[0]));
                let nz = emit_jcc_short(buf, X86Cond::Jne);
                emit_mov_ri(buf, false, d, 2 * bits - 1);
                patch_jcc_short(buf, nz);
                emit_arith_ri(buf, ArithOp::Xor, false, d, (bits - 1) as i32);
            }
            Opcode::Ext8S => {
                let opc = OPC_MOVSBL | P_REXB_RM | rexw_flag(rexw);
                emit_movx(buf, opc, gpr(oregs[0]), gpr(iregs[0]));
            }
            Opcode::Ext16S => {
                let opc = OPC_MOVSWL | rexw_flag(rexw);
                emit_movx(buf, opc, gpr(oregs[0]), gpr(iregs[0]));
            }
            Opcode::SetCond => {
                let d = gpr(oregs[0]);
                let cond = Cond::from_u32(cargs[0]);
                emit_compare(buf, cond, rexw, gpr(iregs[0]), gpr(iregs[1]));
                emit_setcc(buf, X86Cond::from_cond(cond), d);
                emit_movx(buf, OPC_MOVZBL | P_REXB_RM, d, d);
            }
            Opcode::BrCond => {
                let cond = Cond::from_u32(cargs[0]);
                emit_compare(buf, cond, rexw, gpr(iregs[0]), gpr(iregs[1]));
                let x86c = X86Cond::from_cond(cond);
                match ctx.label(cargs[1]).value {
                    Some(target) => emit_jcc(buf, x86c, target),
                    None => {
                        emit_opc(buf, OPC_JCC_long + (x86c as u32), 0, 0);
                        buf.emit_u32(0);
                    }
                }
            }
            Opcode::Br => match ctx.label(cargs[0]).value {
                Some(target) => emit_jmp(buf, target),
                None => {
                    buf.emit_u8(OPC_JMP_long as u8);
                    buf.emit_u32(0);
                }
            },
            Opcode::Exit => self.emit_exit(buf, cargs[0]),
            Opcode::CountCycles => {
                emit_arith_mi(buf, ArithOp::Sub, ENV_REG, cargs[0] as i32, cargs[1] as i32);
            }
            Opcode::CheckCycles => {
                // if (remaining < 0) { pc = guest_pc; leave }
                emit_arith_mi(buf, ArithOp::Cmp, ENV_REG, cargs[0] as i32, 0);
                let skip = emit_jcc_short(buf, X86Cond::Jge);
                emit_store_imm(buf, ENV_REG, cargs[1] as i32, cargs[2] as i32);
                self.emit_exit(buf, EXIT_CONTINUE);
                patch_jcc_short(buf, skip);
            }
            Opcode::Ld => {
                emit_load(buf, rexw, gpr(oregs[0]), gpr(iregs[0]), cargs[0] as i32);
            }
            Opcode::St => {
                emit_store(buf, rexw, gpr(iregs[0]), gpr(iregs[1]), cargs[0] as i32);
            }
            Opcode::GuestLd => {
                let memop = MemOp::new(cargs[0] as u16);
                emit_guest_load(buf, rexw, gpr(oregs[0]), gpr(iregs[0]), memop);
            }
            Opcode::GuestSt => {
                let memop = MemOp::new(cargs[0] as u16);
                emit_guest_store(buf, gpr(iregs[0]), gpr(iregs[1]), memop);
            }
            // -- Type conversions --
            Opcode::ExtI32I64 => {
                emit_movx(buf, OPC_MOVSLQ, gpr(oregs[0]), gpr(iregs[0]));
            }
            Opcode::ExtUI32I64 | Opcode::ExtrlI64I32 => {
                // MOV r32, r32 zero-extends to 64 bits
                // (also works as truncate: just ignore high bits)
                emit_mov_rr(buf, false, gpr(oregs[0]), gpr(iregs[0]));
            }
            Opcode::ExtrhI64I32 => {
                emit_shift_ri(buf, ShiftOp::Shr, true, gpr(oregs[0]), 32);
            }
            Opcode::Call => {
                let func = (cargs[4] as u64) << 32 | (cargs[3] as u64);
                emit_mov_rr(buf, true, CALL_ARG_REGS[0], ENV_REG);
                for (i, &arg) in cargs[..3].iter().enumerate() {
                    emit_mov_ri(buf, false, CALL_ARG_REGS[i + 1], arg as u64);
                }
                emit_mov_ri(buf, true, SCRATCH_REG, func);
                emit_call_reg(buf, SCRATCH_REG);
            }
            _ => {
                debug_assert!(false, "out_op: unhandled {:?}", op.opc);
            }
        }
    }
}

impl X86_64CodeGen {
    fn out_float_op(
        &self,
        buf: &mut CodeBuffer,
        op: &Op,
        oregs: &[u8],
        iregs: &[u8],
        cargs: &[u32],
    ) {
        let t = FP_SCRATCH;
        match op.opc {
            // Constraints guarantee oregs[0] == iregs[0]
            Opcode::FAddBottom
            | Opcode::FSubBottom
            | Opcode::FMulBottom
            | Opcode::FDivBottom
            | Opcode::FAddPair
            | Opcode::FSubPair
            | Opcode::FMulPair
            | Opcode::FDivPair
            | Opcode::FOr
            | Opcode::FAndNot => {
                let opc = match op.opc {
                    Opcode::FAddBottom => OPC_ADDSD,
                    Opcode::FSubBottom => OPC_SUBSD,
                    Opcode::FMulBottom => OPC_MULSD,
                    Opcode::FDivBottom => OPC_DIVSD,
                    Opcode::FAddPair => OPC_ADDPD,
                    Opcode::FSubPair => OPC_SUBPD,
                    Opcode::FMulPair => OPC_MULPD,
                    Opcode::FDivPair => OPC_DIVPD,
                    Opcode::FOr => OPC_ORPD,
                    _ => OPC_ANDNPD,
                };
                emit_sse_rr(buf, opc, xmm(oregs[0]), xmm(iregs[1]));
            }
            Opcode::FShuffle => {
                emit_sse_rri(buf, OPC_SHUFPD, xmm(oregs[0]), xmm(iregs[1]), cargs[0] as u8);
            }
            Opcode::FRoundSingleBottom => {
                let d = xmm(oregs[0]);
                emit_sse_rr(buf, OPC_CVTSD2SS, t, d);
                emit_sse_rr(buf, OPC_CVTSS2SD, d, t);
            }
            Opcode::FRoundSinglePair => {
                let d = xmm(oregs[0]);
                emit_sse_rr(buf, OPC_CVTPD2PS, d, d);
                emit_sse_rr(buf, OPC_CVTPS2PD, d, d);
            }
            Opcode::FNegBottom | Opcode::FNegPair => {
                emit_sign_mask(buf, t, op.opc == Opcode::FNegPair);
                emit_sse_rr(buf, OPC_XORPD, xmm(oregs[0]), t);
            }
            Opcode::FAbsBottom | Opcode::FAbsPair => {
                let d = xmm(oregs[0]);
                emit_sign_mask(buf, t, op.opc == Opcode::FAbsPair);
                emit_sse_rr(buf, OPC_ANDNPD, t, d);
                emit_sse_rr(buf, OPC_MOVAPS, d, t);
            }
            Opcode::FNAbsBottom | Opcode::FNAbsPair => {
                emit_sign_mask(buf, t, op.opc == Opcode::FNAbsPair);
                emit_sse_rr(buf, OPC_ORPD, xmm(oregs[0]), t);
            }
            Opcode::FClearTop => {
                let d = xmm(oregs[0]);
                emit_sse_rr(buf, OPC_MOVQ_VqWq, d, d);
            }
            Opcode::FZeroMask => {
                let d = xmm(oregs[0]);
                emit_sse_rr(buf, OPC_XORPD, d, d);
                emit_sse_rri(buf, OPC_CMPPD, d, xmm(iregs[0]), CMP_EQ);
            }
            Opcode::FSelect => {
                // mask = 0.0 <= a; d = (c & mask) | (b & ~mask)
                let d = xmm(oregs[0]);
                emit_sse_rr(buf, OPC_XORPD, t, t);
                emit_sse_rri(buf, OPC_CMPPD, t, xmm(iregs[0]), CMP_LE);
                emit_sse_rr(buf, OPC_MOVAPS, d, xmm(iregs[2]));
                emit_sse_rr(buf, OPC_ANDPD, d, t);
                emit_sse_rr(buf, OPC_ANDNPD, t, xmm(iregs[1]));
                emit_sse_rr(buf, OPC_ORPD, d, t);
            }
            Opcode::FCmpBottom => {
                let d = gpr(oregs[0]);
                let a = xmm(iregs[0]);
                let b = xmm(iregs[1]);
                match FCmpMode::from_u32(cargs[0]) {
                    FCmpMode::Lt => {
                        emit_sse_rr(buf, OPC_UCOMISD, b, a);
                        emit_setcc(buf, X86Cond::Ja, d);
                    }
                    FCmpMode::Gt => {
                        emit_sse_rr(buf, OPC_UCOMISD, a, b);
                        emit_setcc(buf, X86Cond::Ja, d);
                    }
                    FCmpMode::Unordered => {
                        emit_sse_rr(buf, OPC_UCOMISD, a, b);
                        emit_setcc(buf, X86Cond::Jp, d);
                    }
                    FCmpMode::Eq => {
                        // ucomisd sets ZF for unordered too, so use cmpsd.
                        emit_sse_rr(buf, OPC_MOVAPS, t, a);
                        emit_sse_rri(buf, OPC_CMPSD, t, b, CMP_EQ);
                        emit_movd_from_xmm(buf, false, d, t);
                        emit_arith_ri(buf, ArithOp::And, false, d, 1);
                        return;
                    }
                }
                emit_movx(buf, OPC_MOVZBL | P_REXB_RM, d, d);
            }
            Opcode::FFromSingleBits => {
                let d = xmm(oregs[0]);
                emit_movd_to_xmm(buf, false, d, gpr(iregs[0]));
                emit_sse_rr(buf, OPC_CVTSS2SD, d, d);
                emit_sse_rr(buf, OPC_UNPCKLPD, d, d);
            }
            Opcode::FFromDoubleBits => {
                emit_movd_to_xmm(buf, true, t, gpr(iregs[1]));
                emit_sse_rr(buf, OPC_MOVSD_VxWx, xmm(oregs[0]), t);
            }
            Opcode::FToSingleBits => {
                emit_sse_rr(buf, OPC_CVTSD2SS, t, xmm(iregs[0]));
                emit_movd_from_xmm(buf, false, gpr(oregs[0]), t);
            }
            Opcode::FToDoubleBits => {
                emit_movd_from_xmm(buf, true, gpr(oregs[0]), xmm(iregs[0]));
            }
            _ => {
                debug_assert!(false, "out_float_op: unhandled {:?}", op.opc);
            }
        }
    }
}

/// Flag-setting compare for SetCond/BrCond.
fn emit_compare(buf: &mut CodeBuffer, cond: Cond, rexw: bool, a: Reg, b: Reg) {
    if cond.is_tst() {
        emit_test_rr(buf, rexw, a, b);
    } else {
        emit_arith_rr(buf, ArithOp::Cmp, rexw, a, b);
    }
}

/// Guest load `d = [membase + addr]` with big-endian byte swapping.
fn emit_guest_load(buf: &mut CodeBuffer, rexw: bool, d: Reg, addr: Reg, memop: MemOp) {
    let gb = MEMBASE_REG;
    match memop.size() {
        0 => {
            let opc = if memop.is_signed() {
                OPC_MOVSBL | rexw_flag(rexw)
            } else {
                OPC_MOVZBL
            };
            emit_load_sib(buf, opc, d, gb, addr);
        }
        1 => {
            if memop.is_bswap() {
                emit_load_sib(buf, OPC_MOVZWL, d, gb, addr);
                emit_rolw_8(buf, d);
                if memop.is_signed() {
                    emit_movx(buf, OPC_MOVSWL | rexw_flag(rexw), d, d);
                }
            } else {
                let opc = if memop.is_signed() {
                    OPC_MOVSWL | rexw_flag(rexw)
                } else {
                    OPC_MOVZWL
                };
                emit_load_sib(buf, opc, d, gb, addr);
            }
        }
        2 => {
            // MOV r32 zero-extends to 64
            emit_load_sib(buf, OPC_MOVL_GvEv, d, gb, addr);
            if memop.is_bswap() {
                emit_bswap(buf, false, d);
            }
        }
        _ => {
            emit_load_sib(buf, OPC_MOVL_GvEv | P_REXW, d, gb, addr);
            if memop.is_bswap() {
                emit_bswap(buf, true, d);
            }
        }
    }
}

/// Guest store `[membase + addr] = val`, swapped through the scratch
/// register so `val` is left untouched.
fn emit_guest_store(buf: &mut CodeBuffer, val: Reg, addr: Reg, memop: MemOp) {
    let s = SCRATCH_REG;
    let size = memop.size_bytes();
    emit_mov_rr(buf, size == 8, s, val);
    if memop.is_bswap() {
        match size {
            2 => emit_rolw_8(buf, s),
            4 => emit_bswap(buf, false, s),
            8 => emit_bswap(buf, true, s),
            _ => {}
        }
    }
    emit_store_sib(buf, size, s, MEMBASE_REG, addr);
}
