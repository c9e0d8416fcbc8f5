//! PowerPC (Espresso) frontend: guest state, decoding, boundary
//! scanning and lowering into IR.

mod branch;
pub mod cpu;
mod fpu;
pub mod helpers;
pub mod insn;
pub mod scan;
mod trans;

use std::collections::{BTreeMap, HashMap};

use cpu::{
    cr_offset, fpr_offset, gpr_offset, CTR_OFFSET, CYCLES_OFFSET, LR_OFFSET, NUM_CR_BITS,
    NUM_FPRS, NUM_GPRS, PC_OFFSET, XER_CA_OFFSET, XER_OV_OFFSET, XER_SO_OFFSET,
};
use insn::{bo_always, Insn};
use ppcrec_core::context::MAX_INSNS;
use ppcrec_core::{Context, SegmentId, TempIdx, Type};
use scan::ScanResult;
use tracing::trace;

use crate::{GuestCode, LowerError};

/// Value handed back to the dispatcher by every exit. The next guest
/// PC is always in `PpcState::pc`.
pub const EXIT_TO_DISPATCHER: u32 = 0;

/// Knobs consumed while lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowerOptions {
    /// Multiplying by +-0 yields +0 regardless of the other factor.
    pub accurate_multiply: bool,
    /// Cycles charged per lowered guest instruction.
    pub cycles_per_instruction: i32,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            accurate_multiply: true,
            cycles_per_instruction: 1,
        }
    }
}

/// How a lowered instruction leaves its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Execution continues with the next instruction.
    Next,
    /// The instruction transferred control; nothing may follow.
    NoReturn,
}

/// Lowering state for one PowerPC function.
pub struct PpcDisasContext {
    /// Fixed temp holding the `PpcState` pointer.
    pub env: TempIdx,
    pub gpr: [TempIdx; NUM_GPRS],
    /// Each register holds (ps0, ps1).
    pub fpr: [TempIdx; NUM_FPRS],
    pub cr: [TempIdx; NUM_CR_BITS],
    pub lr: TempIdx,
    pub ctr: TempIdx,
    pub xer_ca: TempIdx,
    pub xer_so: TempIdx,
    pub xer_ov: TempIdx,
    pub(crate) opts: LowerOptions,
    /// Address of the instruction being lowered.
    pub(crate) pc: u32,
    /// Guest address -> segment for every planned segment.
    segments: HashMap<u32, SegmentId>,
    /// Targets outside the function -> segment that exits there.
    exit_stubs: HashMap<u32, SegmentId>,
}

impl PpcDisasContext {
    /// Register the guest register globals in `ir`. `env` must be the
    /// state pointer temp set up by the backend.
    pub fn new(ir: &mut Context, env: TempIdx, opts: LowerOptions) -> Self {
        let gpr = std::array::from_fn(|i| ir.new_global(Type::I32, env, gpr_offset(i), "gpr"));
        let fpr = std::array::from_fn(|i| ir.new_global(Type::V128, env, fpr_offset(i), "fpr"));
        let cr = std::array::from_fn(|i| ir.new_global(Type::I32, env, cr_offset(i), "cr"));
        let lr = ir.new_global(Type::I32, env, LR_OFFSET, "lr");
        let ctr = ir.new_global(Type::I32, env, CTR_OFFSET, "ctr");
        let xer_ca = ir.new_global(Type::I32, env, XER_CA_OFFSET, "xer_ca");
        let xer_so = ir.new_global(Type::I32, env, XER_SO_OFFSET, "xer_so");
        let xer_ov = ir.new_global(Type::I32, env, XER_OV_OFFSET, "xer_ov");
        Self {
            env,
            gpr,
            fpr,
            cr,
            lr,
            ctr,
            xer_ca,
            xer_so,
            xer_ov,
            opts,
            pc: 0,
            segments: HashMap::new(),
            exit_stubs: HashMap::new(),
        }
    }

    pub(crate) fn unsupported(&self, insn: Insn) -> LowerError {
        LowerError::Unsupported {
            address: self.pc,
            opcode: insn.raw(),
        }
    }

    /// Segment starting at `addr` inside this function, if any.
    pub(crate) fn segment_for(&self, addr: u32) -> Option<SegmentId> {
        self.segments.get(&addr).copied()
    }

    /// Store `target` as the next PC and return to the dispatcher.
    pub(crate) fn gen_exit_to(&self, ir: &mut Context, target: u32) {
        let t = ir.new_const(Type::I32, target as u64);
        ir.gen_st(Type::I32, t, self.env, PC_OFFSET);
        ir.gen_exit(EXIT_TO_DISPATCHER);
    }

    /// Same as [`Self::gen_exit_to`] with a computed target.
    pub(crate) fn gen_exit_to_reg(&self, ir: &mut Context, target: TempIdx) {
        ir.gen_st(Type::I32, target, self.env, PC_OFFSET);
        ir.gen_exit(EXIT_TO_DISPATCHER);
    }

    /// Label a branch to `target` should jump to: the segment at
    /// `target` when it is part of the function, otherwise a stub
    /// segment that leaves through the dispatcher.
    pub(crate) fn branch_label(&mut self, ir: &mut Context, target: u32) -> u32 {
        if let Some(sid) = self.segment_for(target) {
            return ir.segment(sid).label;
        }
        if let Some(&sid) = self.exit_stubs.get(&target) {
            return ir.segment(sid).label;
        }
        let current = ir.current_segment();
        let sid = ir.begin_segment(target);
        self.gen_exit_to(ir, target);
        self.exit_stubs.insert(target, sid);
        if let Some(cur) = current {
            ir.set_current_segment(cur);
        }
        ir.segment(sid).label
    }

    /// Unconditional transfer to `target`.
    pub(crate) fn gen_goto(&mut self, ir: &mut Context, target: u32) {
        match self.segment_for(target) {
            Some(sid) => {
                let label = ir.segment(sid).label;
                ir.gen_br(label);
            }
            None => self.gen_exit_to(ir, target),
        }
    }
}

/// Per-address facts collected before any op is emitted.
#[derive(Debug, Clone, Copy, Default)]
struct SegmentPlan {
    enterable: bool,
    jump_target: bool,
}

/// Decide where segments start. A segment begins at every range
/// start, every in-function branch target and after every
/// instruction that may leave the straight-line flow.
fn plan_segments<C: GuestCode + ?Sized>(
    code: &C,
    scan: &ScanResult,
) -> Result<BTreeMap<u32, SegmentPlan>, LowerError> {
    let mut plan: BTreeMap<u32, SegmentPlan> = BTreeMap::new();
    for range in &scan.ranges {
        plan.entry(range.start).or_default();
    }
    plan.entry(scan.entry).or_default().enterable = true;

    for range in &scan.ranges {
        for i in 0..range.num_insns() {
            let addr = range.start + i * 4;
            let insn = Insn(code.read_u32(addr).ok_or(LowerError::Unreadable { address: addr })?);
            let next = addr.wrapping_add(4);
            let mut ends_segment = false;
            let mut next_enterable = false;
            match insn.opcd() {
                1 => {
                    ends_segment = true;
                    next_enterable = true;
                }
                16 | 18 => {
                    ends_segment = true;
                    next_enterable = insn.lk();
                    let target = if insn.opcd() == 16 {
                        insn.bc_target(addr)
                    } else {
                        insn.b_target(addr)
                    };
                    if !insn.lk() && scan.contains(target) {
                        let p = plan.entry(target).or_default();
                        p.jump_target = true;
                        p.enterable = true;
                    }
                }
                19 if matches!(insn.xo10(), 16 | 528) => {
                    ends_segment = true;
                    // A conditional return branches to the next
                    // instruction when not taken.
                    let conditional = !bo_always(insn.bo());
                    if conditional && scan.contains(next) {
                        plan.entry(next).or_default().jump_target = true;
                    }
                    next_enterable = insn.lk() || conditional;
                }
                _ => {}
            }
            if ends_segment && scan.contains(next) {
                let p = plan.entry(next).or_default();
                p.enterable |= next_enterable;
            }
        }
    }
    Ok(plan)
}

/// Lower the scanned function into `ir`.
///
/// `env` is the state pointer temp registered by the backend. On
/// success `ir` holds one segment per planned block in address order,
/// followed by stub segments for branches leaving the function.
pub fn lower_function<C: GuestCode + ?Sized>(
    ir: &mut Context,
    env: TempIdx,
    code: &C,
    scan: &ScanResult,
    opts: LowerOptions,
) -> Result<PpcDisasContext, LowerError> {
    let insns = scan.num_insns();
    if insns as usize > MAX_INSNS {
        return Err(LowerError::TooLarge {
            address: scan.entry,
            insns,
        });
    }

    let mut s = PpcDisasContext::new(ir, env, opts);
    let plan = plan_segments(code, scan)?;

    for (&addr, p) in &plan {
        let sid = ir.begin_segment(addr);
        let seg = ir.segment_mut(sid);
        seg.is_jump_target = p.jump_target;
        if p.enterable {
            seg.mark_enterable();
        }
        s.segments.insert(addr, sid);
    }

    let starts: Vec<u32> = plan.keys().copied().collect();
    for (i, &start) in starts.iter().enumerate() {
        let Some(range) = scan.ranges.iter().find(|r| r.contains(start)) else {
            continue;
        };
        let end = match starts.get(i + 1) {
            Some(&next) if next < range.end() => next,
            _ => range.end(),
        };
        lower_segment(&mut s, ir, code, start, end, scan)?;
    }
    trace!(
        entry = scan.entry,
        segments = ir.num_segments(),
        insns,
        "lowered function"
    );
    Ok(s)
}

fn lower_segment<C: GuestCode + ?Sized>(
    s: &mut PpcDisasContext,
    ir: &mut Context,
    code: &C,
    start: u32,
    end: u32,
    scan: &ScanResult,
) -> Result<(), LowerError> {
    let Some(sid) = s.segment_for(start) else {
        return Ok(());
    };
    ir.set_current_segment(sid);
    if ir.segment(sid).is_jump_target {
        ir.gen_check_cycles(CYCLES_OFFSET, PC_OFFSET, start);
    }
    let count_op = ir.segment(sid).ops.len();
    ir.gen_count_cycles(CYCLES_OFFSET, 0);

    let mut flow = Flow::Next;
    let mut addr = start;
    let mut num_insns = 0u32;
    while addr < end {
        let word = code
            .read_u32(addr)
            .ok_or(LowerError::Unreadable { address: addr })?;
        s.pc = addr;
        ir.gen_insn_start(addr);
        flow = s.translate(ir, Insn(word))?;
        num_insns += 1;
        addr += 4;
        if flow == Flow::NoReturn {
            break;
        }
    }
    debug_assert!(addr == end, "segment at {start:#x} ended early");

    // Fall through into the next segment when it continues the
    // function, otherwise leave.
    if flow == Flow::Next && !scan.contains(end) {
        ir.set_current_segment(sid);
        s.gen_exit_to(ir, end);
    }

    let cycles = (num_insns as i64 * s.opts.cycles_per_instruction as i64).max(0) as u32;
    let seg = ir.segment_mut(sid);
    seg.num_insns = num_insns;
    seg.ops[count_op].args[1] = TempIdx(cycles);
    Ok(())
}
