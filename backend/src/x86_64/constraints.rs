use crate::constraint::*;
use crate::x86_64::regs::{Reg, ALLOCATABLE_GPRS, ALLOCATABLE_XMMS};
use ppcrec_core::{Opcode, RegSet};

const R: RegSet = ALLOCATABLE_GPRS;
const R_NO_RCX: RegSet =
    RegSet::from_raw(ALLOCATABLE_GPRS.raw() & !(1u64 << Reg::Rcx as u64));
const X: RegSet = ALLOCATABLE_XMMS;

/// Return the static register constraint for an opcode on x86-64.
pub fn op_constraint(opc: Opcode) -> &'static OpConstraint {
    match opc {
        // -- Three-address via LEA --
        Opcode::Add => {
            static C: OpConstraint = o1_i2(R, R, R);
            &C
        }
        // -- Destructive binary (output aliases input 0) --
        Opcode::Sub | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor => {
            static C: OpConstraint = o1_i2_alias(R, R);
            &C
        }
        // -- Destructive unary (output aliases input 0) --
        Opcode::Neg | Opcode::Not | Opcode::ExtrhI64I32 => {
            static C: OpConstraint = o1_i1_alias(R);
            &C
        }
        // -- Shifts/rotates: output aliases input 0, count in RCX --
        Opcode::Shl | Opcode::Shr | Opcode::Sar | Opcode::RotL => {
            static C: OpConstraint = o1_i2_alias_fixed(R_NO_RCX, Reg::Rcx as u8);
            &C
        }
        // -- SetCond: newreg output (setcc writes low byte) --
        Opcode::SetCond => {
            static C: OpConstraint = n1_i2(R, R, R);
            &C
        }
        // -- Clz: bsr leaves the output undefined for zero input --
        Opcode::Clz => {
            static C: OpConstraint = n1_i1(R, R);
            &C
        }
        Opcode::BrCond => {
            static C: OpConstraint = o0_i2(R, R);
            &C
        }
        Opcode::Ext8S
        | Opcode::Ext16S
        | Opcode::ExtI32I64
        | Opcode::ExtUI32I64
        | Opcode::ExtrlI64I32
        | Opcode::Ld
        | Opcode::GuestLd => {
            static C: OpConstraint = o1_i1(R, R);
            &C
        }
        Opcode::St | Opcode::GuestSt => {
            static C: OpConstraint = o0_i2(R, R);
            &C
        }

        // -- FP: destructive two-operand SSE forms --
        Opcode::FAddBottom
        | Opcode::FSubBottom
        | Opcode::FMulBottom
        | Opcode::FDivBottom
        | Opcode::FAddPair
        | Opcode::FSubPair
        | Opcode::FMulPair
        | Opcode::FDivPair
        | Opcode::FShuffle
        | Opcode::FOr
        | Opcode::FAndNot => {
            static C: OpConstraint = o1_i2_alias(X, X);
            &C
        }
        Opcode::FRoundSingleBottom
        | Opcode::FRoundSinglePair
        | Opcode::FNegBottom
        | Opcode::FNegPair
        | Opcode::FAbsBottom
        | Opcode::FAbsPair
        | Opcode::FNAbsBottom
        | Opcode::FNAbsPair
        | Opcode::FClearTop => {
            static C: OpConstraint = o1_i1_alias(X);
            &C
        }
        Opcode::FZeroMask => {
            static C: OpConstraint = n1_i1(X, X);
            &C
        }
        Opcode::FSelect => {
            static C: OpConstraint = n1_i3(X, X, X, X);
            &C
        }
        Opcode::FCmpBottom => {
            static C: OpConstraint = n1_i2(R, X, X);
            &C
        }
        Opcode::FFromSingleBits => {
            static C: OpConstraint = o1_i1(X, R);
            &C
        }
        Opcode::FFromDoubleBits => {
            static C: OpConstraint = o1_i2_alias(X, R);
            &C
        }
        Opcode::FToSingleBits | Opcode::FToDoubleBits => {
            static C: OpConstraint = o1_i1(R, X);
            &C
        }
        _ => &OpConstraint::EMPTY,
    }
}
