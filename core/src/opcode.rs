use crate::types::Type;

/// IR opcodes.
///
/// Integer ops (marked with `OpFlags::INT`) work on both I32 and I64;
/// the actual type is carried in `Op::op_type`. FP ops operate on
/// V128 temps holding a (ps0, ps1) double pair; "bottom" ops touch
/// ps0 and leave ps1 unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // -- Data movement --
    Mov = 0,
    SetCond,

    // -- Arithmetic --
    Add,
    Sub,
    Mul,
    Neg,

    // -- Logic --
    And,
    Or,
    Xor,
    Not,

    // -- Shift/rotate --
    Shl,
    Shr,
    Sar,
    RotL,

    // -- Bit counting --
    Clz, // count leading zeros, clz(0) == width

    // -- Sign extension --
    Ext8S,
    Ext16S,

    // -- Type conversion --
    ExtI32I64, // sign-extend i32 -> i64
    ExtUI32I64, // zero-extend i32 -> i64
    ExtrlI64I32, // truncate i64 -> i32 (low)
    ExtrhI64I32, // extract i64 -> i32 (high)

    // -- Host memory load/store (PpcState fields) --
    Ld,
    St,

    // -- Guest memory access (big-endian, relative to the memory base) --
    GuestLd,
    GuestSt,

    // -- Control flow --
    Br, // branch to a segment label
    BrCond,
    Exit, // return to the dispatcher

    // -- Cycle accounting --
    CountCycles,
    CheckCycles, // leave the function when cycles ran out

    // -- Call --
    Call,

    // -- Misc --
    InsnStart, // marks guest instruction boundary

    // -- FP arithmetic, bottom lane (ps0) only --
    FAddBottom,
    FSubBottom,
    FMulBottom,
    FDivBottom,

    // -- FP arithmetic, both lanes --
    FAddPair,
    FSubPair,
    FMulPair,
    FDivPair,

    // -- FP rounding and sign manipulation --
    FRoundSingleBottom,
    FRoundSinglePair,
    FNegBottom,
    FNegPair,
    FAbsBottom,
    FAbsPair,
    FNAbsBottom,
    FNAbsPair,

    // -- FP lane movement and bitwise helpers --
    FShuffle, // shufpd: [a[imm&1], b[(imm>>1)&1]]
    FZeroMask, // lane = all ones when the input lane is +-0
    FOr,
    FAndNot, // ~a & b
    FClearTop,
    FSelect, // lane = a >= 0 ? c : b

    // -- FP compare (bottom lane -> 0/1) --
    FCmpBottom,

    // -- FP <-> integer bit transfer --
    FFromSingleBits, // i32 single bits -> both lanes
    FFromDoubleBits, // i64 double bits -> bottom lane
    FToSingleBits, // bottom lane -> i32 single bits
    FToDoubleBits, // bottom lane -> i64 double bits

    // Table length, not an opcode.
    Count,
}

/// Properties of an opcode that liveness and allocation care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpFlags(u16);

impl OpFlags {
    pub const NONE: OpFlags = OpFlags(0);
    /// Leaves the compiled function.
    pub const BB_EXIT: OpFlags = OpFlags(0x01);
    /// Ends a basic block; globals are written back first.
    pub const BB_END: OpFlags = OpFlags(0x02);
    pub const CALL_CLOBBER: OpFlags = OpFlags(0x04);
    /// Must be kept even when its outputs are unused.
    pub const SIDE_EFFECTS: OpFlags = OpFlags(0x08);
    /// I32 or I64, chosen by `Op::op_type`.
    pub const INT: OpFlags = OpFlags(0x10);
    /// Handled by the allocator without a `out_op` call.
    pub const NOT_PRESENT: OpFlags = OpFlags(0x20);
    /// Works on V128 (ps0, ps1) values.
    pub const FLOAT: OpFlags = OpFlags(0x40);
    pub const COND_BRANCH: OpFlags = OpFlags(0x80);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: OpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: OpFlags) -> Self {
        Self(self.0 | other.0)
    }
}

/// Name, argument counts and flags of an opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpDef {
    pub name: &'static str,
    pub nb_oargs: u8,
    pub nb_iargs: u8,
    pub nb_cargs: u8,
    pub flags: OpFlags,
}

impl OpDef {
    pub const fn nb_args(&self) -> u8 {
        self.nb_oargs + self.nb_iargs + self.nb_cargs
    }
}

const fn op(name: &'static str, nb_oargs: u8, nb_iargs: u8, nb_cargs: u8, flags: u16) -> OpDef {
    OpDef {
        name,
        nb_oargs,
        nb_iargs,
        nb_cargs,
        flags: OpFlags(flags),
    }
}

const INT: u16 = OpFlags::INT.0;
const NP: u16 = OpFlags::NOT_PRESENT.0;
const SE: u16 = OpFlags::SIDE_EFFECTS.0;
const CC: u16 = OpFlags::CALL_CLOBBER.0;
const BE: u16 = OpFlags::BB_END.0;
const BX: u16 = OpFlags::BB_EXIT.0;
const CB: u16 = OpFlags::COND_BRANCH.0;
const FP: u16 = OpFlags::FLOAT.0;
const N: u16 = 0;

/// Indexed by `Opcode as usize`: name, outputs, inputs, constants,
/// flags.
pub static OPCODE_DEFS: [OpDef; Opcode::Count as usize] = [
    /* Mov                */ op("mov", 1, 1, 0, INT | NP),
    /* SetCond            */ op("setcond", 1, 2, 1, INT),
    /* Add                */ op("add", 1, 2, 0, INT),
    /* Sub                */ op("sub", 1, 2, 0, INT),
    /* Mul                */ op("mul", 1, 2, 0, INT),
    /* Neg                */ op("neg", 1, 1, 0, INT),
    /* And                */ op("and", 1, 2, 0, INT),
    /* Or                 */ op("or", 1, 2, 0, INT),
    /* Xor                */ op("xor", 1, 2, 0, INT),
    /* Not                */ op("not", 1, 1, 0, INT),
    /* Shl                */ op("shl", 1, 2, 0, INT),
    /* Shr                */ op("shr", 1, 2, 0, INT),
    /* Sar                */ op("sar", 1, 2, 0, INT),
    /* RotL               */ op("rotl", 1, 2, 0, INT),
    /* Clz                */ op("clz", 1, 1, 0, INT),
    /* Ext8S              */ op("ext8s", 1, 1, 0, INT),
    /* Ext16S             */ op("ext16s", 1, 1, 0, INT),
    /* ExtI32I64          */ op("ext_i32_i64", 1, 1, 0, N),
    /* ExtUI32I64         */ op("extu_i32_i64", 1, 1, 0, N),
    /* ExtrlI64I32        */ op("extrl_i64_i32", 1, 1, 0, N),
    /* ExtrhI64I32        */ op("extrh_i64_i32", 1, 1, 0, N),
    /* Ld                 */ op("ld", 1, 1, 1, INT),
    /* St                 */ op("st", 0, 2, 1, INT | SE),
    /* GuestLd            */ op("guest_ld", 1, 1, 1, INT | SE),
    /* GuestSt            */ op("guest_st", 0, 2, 1, INT | SE),
    /* Br                 */ op("br", 0, 0, 1, BE | SE),
    /* BrCond             */ op("brcond", 0, 2, 2, INT | BE | CB | SE),
    /* Exit               */ op("exit", 0, 0, 1, BE | BX | SE),
    /* CountCycles        */ op("count_cycles", 0, 0, 2, SE),
    /* CheckCycles        */ op("check_cycles", 0, 0, 3, SE),
    /* Call               */ op("call", 0, 0, 5, CC | SE),
    /* InsnStart          */ op("insn_start", 0, 0, 1, NP),
    /* FAddBottom         */ op("fadd_bottom", 1, 2, 0, FP),
    /* FSubBottom         */ op("fsub_bottom", 1, 2, 0, FP),
    /* FMulBottom         */ op("fmul_bottom", 1, 2, 0, FP),
    /* FDivBottom         */ op("fdiv_bottom", 1, 2, 0, FP),
    /* FAddPair           */ op("fadd_pair", 1, 2, 0, FP),
    /* FSubPair           */ op("fsub_pair", 1, 2, 0, FP),
    /* FMulPair           */ op("fmul_pair", 1, 2, 0, FP),
    /* FDivPair           */ op("fdiv_pair", 1, 2, 0, FP),
    /* FRoundSingleBottom */ op("fround_single_bottom", 1, 1, 0, FP),
    /* FRoundSinglePair   */ op("fround_single_pair", 1, 1, 0, FP),
    /* FNegBottom         */ op("fneg_bottom", 1, 1, 0, FP),
    /* FNegPair           */ op("fneg_pair", 1, 1, 0, FP),
    /* FAbsBottom         */ op("fabs_bottom", 1, 1, 0, FP),
    /* FAbsPair           */ op("fabs_pair", 1, 1, 0, FP),
    /* FNAbsBottom        */ op("fnabs_bottom", 1, 1, 0, FP),
    /* FNAbsPair          */ op("fnabs_pair", 1, 1, 0, FP),
    /* FShuffle           */ op("fshuffle", 1, 2, 1, FP),
    /* FZeroMask          */ op("fzero_mask", 1, 1, 0, FP),
    /* FOr                */ op("for", 1, 2, 0, FP),
    /* FAndNot            */ op("fandnot", 1, 2, 0, FP),
    /* FClearTop          */ op("fclear_top", 1, 1, 0, FP),
    /* FSelect            */ op("fselect", 1, 3, 0, FP),
    /* FCmpBottom         */ op("fcmp_bottom", 1, 2, 1, FP),
    /* FFromSingleBits    */ op("ffrom_single_bits", 1, 1, 0, FP),
    /* FFromDoubleBits    */ op("ffrom_double_bits", 1, 2, 0, FP),
    /* FToSingleBits      */ op("fto_single_bits", 1, 1, 0, FP),
    /* FToDoubleBits      */ op("fto_double_bits", 1, 1, 0, FP),
];

impl Opcode {
    /// Look up the static definition for this opcode.
    pub fn def(self) -> &'static OpDef {
        &OPCODE_DEFS[self as usize]
    }

    /// Return the fixed IR type this opcode operates on, if not
    /// type-polymorphic.
    pub fn fixed_type(self) -> Option<Type> {
        match self {
            Opcode::ExtI32I64 | Opcode::ExtUI32I64 => Some(Type::I64),
            Opcode::ExtrlI64I32 | Opcode::ExtrhI64I32 => Some(Type::I32),
            Opcode::FCmpBottom | Opcode::FToSingleBits => Some(Type::I32),
            Opcode::FToDoubleBits => Some(Type::I64),
            _ if self.is_float() => Some(Type::V128),
            _ => None,
        }
    }

    /// Whether this opcode is type-polymorphic (works on I32 or I64).
    pub fn is_int_polymorphic(self) -> bool {
        self.def().flags.contains(OpFlags::INT)
    }

    /// Whether this is a floating point operation.
    pub fn is_float(self) -> bool {
        self.def().flags.contains(OpFlags::FLOAT)
    }
}
