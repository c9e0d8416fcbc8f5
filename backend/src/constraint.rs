//! Register constraints of IR op arguments.
//!
//! The allocator narrows every constraint further to the register
//! class of the temp's type: GPRs for integers, XMM registers for
//! guest FPR pairs.

use ppcrec_core::op::MAX_OP_ARGS;
use ppcrec_core::RegSet;

#[derive(Debug, Clone, Copy)]
pub struct ArgConstraint {
    pub regs: RegSet,
    /// Output that must reuse the register of input `alias_index`
    /// (x86 two-operand forms).
    pub oalias: bool,
    /// Input whose register output `alias_index` may take over.
    pub ialias: bool,
    pub alias_index: u8,
    /// Output that must not share a register with any input.
    pub newreg: bool,
}

impl ArgConstraint {
    pub const UNUSED: Self = Self::any(RegSet::EMPTY);

    pub const fn any(regs: RegSet) -> Self {
        Self {
            regs,
            oalias: false,
            ialias: false,
            alias_index: 0,
            newreg: false,
        }
    }

    pub const fn fixed(reg: u8) -> Self {
        Self::any(RegSet::EMPTY.set(reg))
    }

    pub const fn fresh(self) -> Self {
        Self {
            newreg: true,
            ..self
        }
    }

    const fn output_of(self, input: u8) -> Self {
        Self {
            oalias: true,
            alias_index: input,
            ..self
        }
    }

    const fn input_of(self, output: u8) -> Self {
        Self {
            ialias: true,
            alias_index: output,
            ..self
        }
    }
}

/// Constraints of all arguments of one opcode, outputs first.
#[derive(Debug, Clone, Copy)]
pub struct OpConstraint {
    pub args: [ArgConstraint; MAX_OP_ARGS],
}

impl OpConstraint {
    pub const EMPTY: Self = Self::of(&[]);

    pub const fn of(list: &[ArgConstraint]) -> Self {
        let mut args = [ArgConstraint::UNUSED; MAX_OP_ARGS];
        let mut i = 0;
        while i < list.len() {
            args[i] = list[i];
            i += 1;
        }
        Self { args }
    }
}

type A = ArgConstraint;

/// `d = op(a)` where `d` overwrites `a`.
pub const fn o1_i1_alias(regs: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(regs).output_of(0), A::any(regs).input_of(0)])
}

pub const fn o1_i1(o0: RegSet, i0: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(o0), A::any(i0)])
}

pub const fn n1_i1(o0: RegSet, i0: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(o0).fresh(), A::any(i0)])
}

pub const fn o1_i2(o0: RegSet, i0: RegSet, i1: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(o0), A::any(i0), A::any(i1)])
}

/// `d = op(a, b)` where `d` overwrites `a`.
pub const fn o1_i2_alias(o0: RegSet, i1: RegSet) -> OpConstraint {
    OpConstraint::of(&[
        A::any(o0).output_of(0),
        A::any(o0).input_of(0),
        A::any(i1),
    ])
}

/// Like [`o1_i2_alias`] with the second input pinned, as for x86
/// shift counts in CL.
pub const fn o1_i2_alias_fixed(o0: RegSet, i1_reg: u8) -> OpConstraint {
    OpConstraint::of(&[
        A::any(o0).output_of(0),
        A::any(o0).input_of(0),
        A::fixed(i1_reg),
    ])
}

pub const fn n1_i2(o0: RegSet, i0: RegSet, i1: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(o0).fresh(), A::any(i0), A::any(i1)])
}

pub const fn n1_i3(o0: RegSet, i0: RegSet, i1: RegSet, i2: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(o0).fresh(), A::any(i0), A::any(i1), A::any(i2)])
}

pub const fn o0_i2(i0: RegSet, i1: RegSet) -> OpConstraint {
    OpConstraint::of(&[A::any(i0), A::any(i1)])
}
