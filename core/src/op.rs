use std::ops::Range;

use crate::opcode::Opcode;
use crate::temp::TempIdx;
use crate::types::Type;

pub const MAX_OP_ARGS: usize = 8;

/// Per-argument liveness flags, two bits per argument: the temp dies
/// at this op, and the temp must be written back to `PpcState` after
/// this op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LifeData(pub u32);

impl LifeData {
    const fn dead_bit(n: u32) -> u32 {
        1 << (2 * n)
    }

    const fn sync_bit(n: u32) -> u32 {
        2 << (2 * n)
    }

    pub fn is_dead(&self, n: u32) -> bool {
        self.0 & Self::dead_bit(n) != 0
    }

    pub fn is_sync(&self, n: u32) -> bool {
        self.0 & Self::sync_bit(n) != 0
    }

    pub fn set_dead(&mut self, n: u32) {
        self.0 |= Self::dead_bit(n);
    }

    pub fn set_sync(&mut self, n: u32) {
        self.0 |= Self::sync_bit(n);
    }
}

/// One IR operation. Arguments are laid out outputs first, then
/// inputs, then constants; constants (condition codes, label ids,
/// offsets, helper address halves) are stored raw in a `TempIdx`.
#[derive(Debug, Clone)]
pub struct Op {
    pub opc: Opcode,
    /// Operand width for ops that come in I32 and I64 flavours.
    pub op_type: Type,
    pub life: LifeData,
    pub args: [TempIdx; MAX_OP_ARGS],
    pub nargs: u8,
}

impl Op {
    pub fn new(opc: Opcode, op_type: Type) -> Self {
        Self::with_args(opc, op_type, &[])
    }

    /// Arguments beyond [`MAX_OP_ARGS`] are dropped.
    pub fn with_args(opc: Opcode, op_type: Type, args: &[TempIdx]) -> Self {
        let n = args.len().min(MAX_OP_ARGS);
        let mut all = [TempIdx(0); MAX_OP_ARGS];
        all[..n].copy_from_slice(&args[..n]);
        Self {
            opc,
            op_type,
            life: LifeData::default(),
            args: all,
            nargs: n as u8,
        }
    }

    fn arg_ranges(&self) -> [Range<usize>; 3] {
        let def = self.opc.def();
        let o = def.nb_oargs as usize;
        let i = o + def.nb_iargs as usize;
        let c = i + def.nb_cargs as usize;
        [0..o, o..i, i..c]
    }

    pub fn oargs(&self) -> &[TempIdx] {
        let [o, _, _] = self.arg_ranges();
        &self.args[o]
    }

    pub fn iargs(&self) -> &[TempIdx] {
        let [_, i, _] = self.arg_ranges();
        &self.args[i]
    }

    pub fn cargs(&self) -> &[TempIdx] {
        let [_, _, c] = self.arg_ranges();
        &self.args[c]
    }

    /// Constant argument `n` as its raw value.
    pub fn carg(&self, n: usize) -> u32 {
        self.cargs()[n].0
    }
}
