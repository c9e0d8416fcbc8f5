use crate::context::Context;
use crate::op::Op;
use crate::opcode::Opcode;
use crate::temp::TempIdx;
use crate::types::{Cond, MemOp, Type};

/// Constant arguments travel in the argument array as raw values.
fn carg(val: u32) -> TempIdx {
    TempIdx(val)
}

/// Mode selector for `FCmpBottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FCmpMode {
    /// a < b, false when unordered.
    Lt = 0,
    /// a > b, false when unordered.
    Gt = 1,
    /// a == b, false when unordered.
    Eq = 2,
    /// Either operand is NaN.
    Unordered = 3,
}

impl FCmpMode {
    pub const fn from_u32(v: u32) -> FCmpMode {
        match v {
            0 => FCmpMode::Lt,
            1 => FCmpMode::Gt,
            2 => FCmpMode::Eq,
            _ => FCmpMode::Unordered,
        }
    }
}

/// `d = op(a, b)` builders, all integer-polymorphic.
macro_rules! binary_ops {
    ($($name:ident => $opc:ident),* $(,)?) => {
        impl Context {
            $(
                pub fn $name(&mut self, ty: Type, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
                    self.push_with_dst(Opcode::$opc, ty, &[d, a, b])
                }
            )*
        }
    };
}

/// `d = op(s)` builders.
macro_rules! unary_ops {
    ($($name:ident => $opc:ident),* $(,)?) => {
        impl Context {
            $(
                pub fn $name(&mut self, ty: Type, d: TempIdx, s: TempIdx) -> TempIdx {
                    self.push_with_dst(Opcode::$opc, ty, &[d, s])
                }
            )*
        }
    };
}

/// Unary builders whose result type is implied by the opcode.
macro_rules! conversion_ops {
    ($($name:ident => $opc:ident : $ty:ident),* $(,)?) => {
        impl Context {
            $(
                pub fn $name(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
                    self.push_with_dst(Opcode::$opc, Type::$ty, &[d, s])
                }
            )*
        }
    };
}

binary_ops! {
    gen_add => Add,
    gen_sub => Sub,
    gen_mul => Mul,
    gen_and => And,
    gen_or => Or,
    gen_xor => Xor,
    gen_shl => Shl,
    gen_shr => Shr,
    gen_sar => Sar,
    gen_rotl => RotL,
}

unary_ops! {
    gen_neg => Neg,
    gen_not => Not,
    gen_mov => Mov,
    gen_clz => Clz,
    gen_ext8s => Ext8S,
    gen_ext16s => Ext16S,
}

// Width changes between the 32-bit guest and 64-bit host values.
conversion_ops! {
    gen_ext_i32_i64 => ExtI32I64: I64,
    gen_ext_u32_i64 => ExtUI32I64: I64,
    gen_extrl_i64_i32 => ExtrlI64I32: I32,
    gen_extrh_i64_i32 => ExtrhI64I32: I32,
}

impl Context {
    /// Append an op whose first argument is its output and return
    /// that output.
    fn push_with_dst(&mut self, opc: Opcode, ty: Type, args: &[TempIdx]) -> TempIdx {
        self.emit_op(Op::with_args(opc, ty, args));
        args[0]
    }

    /// Append an op with no outputs.
    fn push(&mut self, opc: Opcode, ty: Type, args: &[TempIdx]) {
        self.emit_op(Op::with_args(opc, ty, args));
    }

    /// `d = (a cond b) ? 1 : 0`
    pub fn gen_setcond(
        &mut self,
        ty: Type,
        d: TempIdx,
        a: TempIdx,
        b: TempIdx,
        cond: Cond,
    ) -> TempIdx {
        self.push_with_dst(Opcode::SetCond, ty, &[d, a, b, carg(cond as u32)])
    }

    /// Host load from the state block, `dst = *(base + offset)`.
    pub fn gen_ld(&mut self, ty: Type, dst: TempIdx, base: TempIdx, offset: i64) -> TempIdx {
        self.push_with_dst(Opcode::Ld, ty, &[dst, base, carg(offset as u32)])
    }

    pub fn gen_st(&mut self, ty: Type, src: TempIdx, base: TempIdx, offset: i64) {
        self.push(Opcode::St, ty, &[src, base, carg(offset as u32)]);
    }

    /// `dst = guest[addr]` with the width, sign and byte order of `memop`.
    pub fn gen_guest_ld(
        &mut self,
        ty: Type,
        dst: TempIdx,
        addr: TempIdx,
        memop: MemOp,
    ) -> TempIdx {
        let m = carg(u32::from(memop.bits()));
        self.push_with_dst(Opcode::GuestLd, ty, &[dst, addr, m])
    }

    pub fn gen_guest_st(&mut self, ty: Type, val: TempIdx, addr: TempIdx, memop: MemOp) {
        let m = carg(u32::from(memop.bits()));
        self.push(Opcode::GuestSt, ty, &[val, addr, m]);
    }

    pub fn gen_br(&mut self, label_id: u32) {
        self.push(Opcode::Br, Type::I32, &[carg(label_id)]);
    }

    /// Jump to `label_id` when `a cond b`.
    pub fn gen_brcond(&mut self, ty: Type, a: TempIdx, b: TempIdx, cond: Cond, label_id: u32) {
        self.push(Opcode::BrCond, ty, &[a, b, carg(cond as u32), carg(label_id)]);
    }

    /// Leave native code, handing `val` to the dispatcher.
    pub fn gen_exit(&mut self, val: u32) {
        self.push(Opcode::Exit, Type::I32, &[carg(val)]);
    }

    /// Subtract `count` from the cycle counter at `counter_offset`.
    pub fn gen_count_cycles(&mut self, counter_offset: i64, count: u32) {
        let args = [carg(counter_offset as u32), carg(count)];
        self.push(Opcode::CountCycles, Type::I32, &args);
    }

    /// Leave with `pc = guest_pc` once the cycle counter has gone
    /// negative.
    pub fn gen_check_cycles(&mut self, counter_offset: i64, pc_offset: i64, guest_pc: u32) {
        let args = [carg(counter_offset as u32), carg(pc_offset as u32), carg(guest_pc)];
        self.push(Opcode::CheckCycles, Type::I32, &args);
    }

    /// `helper(env, args[0], args[1], args[2])`.
    ///
    /// Helpers reach guest registers through the state pointer, so
    /// every argument is an immediate. The 64-bit helper address is
    /// split over the last two constant slots.
    pub fn gen_call(&mut self, helper: u64, args: [u32; 3]) {
        let [a0, a1, a2] = args.map(carg);
        let (lo, hi) = (carg(helper as u32), carg((helper >> 32) as u32));
        self.push(Opcode::Call, Type::I64, &[a0, a1, a2, lo, hi]);
    }

    /// Marks where guest instruction `pc` begins.
    pub fn gen_insn_start(&mut self, pc: u32) {
        self.push(Opcode::InsnStart, Type::I32, &[carg(pc)]);
    }

    // -- Floating point: arithmetic --

    pub fn gen_fadd_bottom(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FAddBottom, Type::V128, &[d, a, b])
    }

    pub fn gen_fsub_bottom(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FSubBottom, Type::V128, &[d, a, b])
    }

    pub fn gen_fmul_bottom(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FMulBottom, Type::V128, &[d, a, b])
    }

    pub fn gen_fdiv_bottom(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FDivBottom, Type::V128, &[d, a, b])
    }

    pub fn gen_fadd_pair(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FAddPair, Type::V128, &[d, a, b])
    }

    pub fn gen_fsub_pair(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FSubPair, Type::V128, &[d, a, b])
    }

    pub fn gen_fmul_pair(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FMulPair, Type::V128, &[d, a, b])
    }

    pub fn gen_fdiv_pair(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FDivPair, Type::V128, &[d, a, b])
    }

    // -- Floating point: rounding and sign --

    /// Round ps0 to single precision and widen it back.
    pub fn gen_fround_single_bottom(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FRoundSingleBottom, Type::V128, &[d, s])
    }

    pub fn gen_fround_single_pair(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FRoundSinglePair, Type::V128, &[d, s])
    }

    pub fn gen_fneg_bottom(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FNegBottom, Type::V128, &[d, s])
    }

    pub fn gen_fneg_pair(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FNegPair, Type::V128, &[d, s])
    }

    pub fn gen_fabs_bottom(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FAbsBottom, Type::V128, &[d, s])
    }

    pub fn gen_fabs_pair(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FAbsPair, Type::V128, &[d, s])
    }

    pub fn gen_fnabs_bottom(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FNAbsBottom, Type::V128, &[d, s])
    }

    pub fn gen_fnabs_pair(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FNAbsPair, Type::V128, &[d, s])
    }

    // -- Floating point: lanes and masks --

    /// d = [a[imm & 1], b[(imm >> 1) & 1]]
    pub fn gen_fshuffle(
        &mut self,
        d: TempIdx,
        a: TempIdx,
        b: TempIdx,
        imm: u32,
    ) -> TempIdx {
        self.emit_op(Op::with_args(
            Opcode::FShuffle,
            Type::V128,
            &[d, a, b, carg(imm & 3)],
        ));
        d
    }

    pub fn gen_fzero_mask(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FZeroMask, Type::V128, &[d, s])
    }

    pub fn gen_for(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FOr, Type::V128, &[d, a, b])
    }

    /// d = ~a & b
    pub fn gen_fandnot(&mut self, d: TempIdx, a: TempIdx, b: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FAndNot, Type::V128, &[d, a, b])
    }

    pub fn gen_fclear_top(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FClearTop, Type::V128, &[d, s])
    }

    /// Per lane: d = a >= 0.0 ? c : b (NaN selects b).
    pub fn gen_fselect(
        &mut self,
        d: TempIdx,
        a: TempIdx,
        b: TempIdx,
        c: TempIdx,
    ) -> TempIdx {
        self.emit_op(Op::with_args(Opcode::FSelect, Type::V128, &[d, a, b, c]));
        d
    }

    /// d (I32) = compare(a.ps0, b.ps0) as 0/1.
    pub fn gen_fcmp_bottom(
        &mut self,
        d: TempIdx,
        a: TempIdx,
        b: TempIdx,
        mode: FCmpMode,
    ) -> TempIdx {
        self.emit_op(Op::with_args(
            Opcode::FCmpBottom,
            Type::V128,
            &[d, a, b, carg(mode as u32)],
        ));
        d
    }

    // -- Floating point: bit transfer --

    /// d = (single bits s widened to double) in both lanes.
    pub fn gen_ffrom_single_bits(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FFromSingleBits, Type::V128, &[d, s])
    }

    /// d = old with ps0 replaced by the raw double bits in `bits`.
    pub fn gen_ffrom_double_bits(
        &mut self,
        d: TempIdx,
        old: TempIdx,
        bits: TempIdx,
    ) -> TempIdx {
        self.push_with_dst(Opcode::FFromDoubleBits, Type::V128, &[d, old, bits])
    }

    /// d (I32) = single bits of ps0 rounded to single.
    pub fn gen_fto_single_bits(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FToSingleBits, Type::V128, &[d, s])
    }

    /// d (I64) = raw double bits of ps0.
    pub fn gen_fto_double_bits(&mut self, d: TempIdx, s: TempIdx) -> TempIdx {
        self.push_with_dst(Opcode::FToDoubleBits, Type::V128, &[d, s])
    }
}
