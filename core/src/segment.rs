use crate::op::Op;

/// Index into the Context's segment list.
pub type SegmentId = usize;

/// A basic block of lowered guest code.
///
/// Segments are split at every branch instruction and at every branch
/// target. Each one owns a label so that branches between segments
/// resolve to the segment's native offset. Register state never
/// crosses a segment boundary: all guest registers are coherent in
/// memory at the start of every segment.
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: SegmentId,
    /// Guest address of the first instruction lowered into this segment.
    pub guest_start: u32,
    /// Number of guest instructions lowered into this segment.
    pub num_insns: u32,
    /// Guest address at which outside code may enter this segment.
    pub enter_guest_address: u32,
    /// Reachable directly from the dispatch table or another function.
    pub is_enterable: bool,
    /// Target of a branch inside the same function.
    pub is_jump_target: bool,
    /// Label bound to the native offset of the segment's first op.
    pub label: u32,
    pub ops: Vec<Op>,
}

impl Segment {
    pub fn new(id: SegmentId, guest_start: u32, label: u32) -> Self {
        Self {
            id,
            guest_start,
            num_insns: 0,
            enter_guest_address: guest_start,
            is_enterable: false,
            is_jump_target: false,
            label,
            ops: Vec::new(),
        }
    }

    /// Guest address one past the last instruction of this segment.
    pub fn guest_end(&self) -> u32 {
        self.guest_start + self.num_insns * 4
    }

    pub fn mark_enterable(&mut self) {
        self.is_enterable = true;
        self.enter_guest_address = self.guest_start;
    }
}
