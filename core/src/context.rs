use std::collections::HashMap;

use crate::label::Label;
use crate::op::Op;
use crate::segment::{Segment, SegmentId};
use crate::temp::{Temp, TempIdx, TempKind};
use crate::types::{TempVal, Type, TYPE_COUNT};

/// Maximum number of guest instructions lowered per function.
pub const MAX_INSNS: usize = 0x4000;

/// Lowering context for one guest function.
///
/// Holds everything produced while a function is lowered and later
/// emitted: temporaries, segments with their IR ops, and labels.
/// Owned exclusively by the in-flight compilation.
#[derive(Debug)]
pub struct Context {
    temps: Vec<Temp>,
    segments: Vec<Segment>,
    labels: Vec<Label>,
    current: Option<SegmentId>,

    /// Number of global temps (always at the front of `temps`).
    nb_globals: u32,

    /// Per-type hash map from constant value to TempIdx,
    /// avoiding duplicate const temps.
    const_table: [HashMap<u64, TempIdx>; TYPE_COUNT],
}

impl Context {
    pub fn new() -> Self {
        Self {
            temps: Vec::with_capacity(256),
            segments: Vec::with_capacity(32),
            labels: Vec::with_capacity(32),
            current: None,
            nb_globals: 0,
            const_table: Default::default(),
        }
    }

    /// Reset context for lowering a new function. Preserves globals
    /// but resets their register allocation state so the next
    /// emission pass starts with all globals in memory.
    pub fn reset(&mut self) {
        self.temps.truncate(self.nb_globals as usize);
        for t in &mut self.temps {
            match t.kind {
                TempKind::Fixed => {
                    t.mem_coherent = false;
                }
                TempKind::Global => {
                    t.val_type = TempVal::Mem;
                    t.reg = None;
                    t.mem_coherent = true;
                }
                _ => {}
            }
        }
        self.segments.clear();
        self.labels.clear();
        self.current = None;
        for table in &mut self.const_table {
            table.clear();
        }
    }

    // -- Temp allocation --

    pub fn nb_globals(&self) -> u32 {
        self.nb_globals
    }

    pub fn nb_temps(&self) -> u32 {
        self.temps.len() as u32
    }

    fn push_temp(&mut self, temp: Temp) -> TempIdx {
        let idx = TempIdx(self.temps.len() as u32);
        self.temps.push(temp);
        idx
    }

    /// Temps that outlive segments sit in front of all others, so
    /// `reset` can drop everything past them.
    fn push_global_temp(&mut self, temp: Temp, what: &str) -> TempIdx {
        assert_eq!(
            self.temps.len() as u32,
            self.nb_globals,
            "{what} must be registered before locals"
        );
        self.nb_globals += 1;
        self.push_temp(temp)
    }

    /// Allocate a scratch temp, dead at the end of its segment.
    pub fn new_temp(&mut self, ty: Type) -> TempIdx {
        self.push_temp(Temp::new_ebb(ty))
    }

    /// Constant temp for `val`. One temp per (type, value).
    pub fn new_const(&mut self, ty: Type, val: u64) -> TempIdx {
        if let Some(&idx) = self.const_table[ty as usize].get(&val) {
            return idx;
        }
        let idx = self.push_temp(Temp::new_const(ty, val));
        self.const_table[ty as usize].insert(val, idx);
        idx
    }

    /// Register a guest register stored at `base + offset`, where
    /// `base` is the fixed state pointer temp.
    pub fn new_global(
        &mut self,
        ty: Type,
        base: TempIdx,
        offset: i64,
        name: &'static str,
    ) -> TempIdx {
        self.push_global_temp(Temp::new_global(ty, base, offset, name), "globals")
    }

    /// Register a temp pinned to host register `reg`.
    pub fn new_fixed(&mut self, ty: Type, reg: u8, name: &'static str) -> TempIdx {
        self.push_global_temp(Temp::new_fixed(ty, reg, name), "fixed temps")
    }

    pub fn temp(&self, idx: TempIdx) -> &Temp {
        &self.temps[idx.0 as usize]
    }

    pub fn temp_mut(&mut self, idx: TempIdx) -> &mut Temp {
        &mut self.temps[idx.0 as usize]
    }

    pub fn temps(&self) -> &[Temp] {
        &self.temps
    }

    /// Iterate over global temps only.
    pub fn globals(&self) -> &[Temp] {
        &self.temps[..self.nb_globals as usize]
    }

    // -- Segments --

    /// Open a new segment starting at `guest_start`. All ops emitted
    /// afterwards land in it until the next call.
    pub fn begin_segment(&mut self, guest_start: u32) -> SegmentId {
        let id = self.segments.len();
        let label = self.new_label();
        self.segments.push(Segment::new(id, guest_start, label));
        self.current = Some(id);
        id
    }

    pub fn current_segment(&self) -> Option<SegmentId> {
        self.current
    }

    /// Redirect op emission into an existing segment.
    pub fn set_current_segment(&mut self, id: SegmentId) {
        assert!(id < self.segments.len(), "segment {id} does not exist");
        self.current = Some(id);
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id]
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id]
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Find the segment whose first instruction is at `guest_addr`.
    pub fn segment_at(&self, guest_addr: u32) -> Option<SegmentId> {
        self.segments
            .iter()
            .find(|s| s.guest_start == guest_addr)
            .map(|s| s.id)
    }

    // -- Op emission --

    /// Append an op to the current segment.
    pub fn emit_op(&mut self, op: Op) {
        let id = match self.current {
            Some(id) => id,
            None => self.begin_segment(0),
        };
        self.segments[id].ops.push(op);
    }

    /// Total number of ops across all segments.
    pub fn num_ops(&self) -> usize {
        self.segments.iter().map(|s| s.ops.len()).sum()
    }

    // -- Labels --

    pub fn new_label(&mut self) -> u32 {
        let id = self.labels.len() as u32;
        self.labels.push(Label::new(id));
        id
    }

    pub fn label(&self, id: u32) -> &Label {
        &self.labels[id as usize]
    }

    pub fn label_mut(&mut self, id: u32) -> &mut Label {
        &mut self.labels[id as usize]
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
