//! Function boundary detection.
//!
//! Starting from an entry address the scanner follows straight-line
//! flow until an instruction that cannot fall through, queues every
//! local branch target it meets and scans those as further ranges.
//! Ranges that touch are merged; targets already covered are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use super::insn::{bo_always, Insn, INSN_BCTR, INSN_NOP};
use crate::GuestCode;

/// Upper bound on instructions covered by one scan.
pub const MAX_SCAN_INSNS: u32 = 0x4000;

/// A contiguous span of guest instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestRange {
    pub start: u32,
    /// Length in bytes (a multiple of 4).
    pub length: u32,
}

impl GuestRange {
    pub const fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }

    /// One past the last byte.
    pub const fn end(&self) -> u32 {
        self.start.wrapping_add(self.length)
    }

    pub const fn num_insns(&self) -> u32 {
        self.length / 4
    }

    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Whether this range intersects `[start, end)`.
    pub const fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start < end && start < self.end()
    }
}

/// Decides whether an unconditional jump really ends a function.
///
/// Jump tables compile to runs of `b` instructions, and `bctr` is the
/// usual way to index them, so neither reliably marks the end of a
/// function. This is a heuristic; implementations trade false
/// positives (ranges that run into the next function) against false
/// negatives (switch cases left out of the function).
pub trait JumpTableHeuristic {
    /// Whether scanning continues past the unconditional `b` at `addr`.
    fn continues_after_branch<C: GuestCode + ?Sized>(&self, code: &C, addr: u32) -> bool;

    /// Whether scanning continues past the unconditional `bctr` at
    /// `addr`.
    fn continues_after_bctr<C: GuestCode + ?Sized>(&self, code: &C, addr: u32) -> bool;
}

/// The default heuristic: a `b` inside a run of at least three
/// unconditional branches sits in a jump table, and a `bctr` only
/// ends a function when followed by padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighbourBranchHeuristic;

fn is_branch_at<C: GuestCode + ?Sized>(code: &C, addr: u32) -> bool {
    code.read_u32(addr)
        .is_some_and(|w| Insn(w).is_unconditional_branch())
}

impl JumpTableHeuristic for NeighbourBranchHeuristic {
    fn continues_after_branch<C: GuestCode + ?Sized>(&self, code: &C, addr: u32) -> bool {
        let prev = is_branch_at(code, addr.wrapping_sub(4));
        let next = is_branch_at(code, addr.wrapping_add(4));
        let after = next && is_branch_at(code, addr.wrapping_add(8));
        let before = prev && is_branch_at(code, addr.wrapping_sub(8));
        after || before || (prev && next)
    }

    fn continues_after_bctr<C: GuestCode + ?Sized>(&self, code: &C, addr: u32) -> bool {
        match code.read_u32(addr.wrapping_add(4)) {
            Some(next) => next != INSN_NOP && Insn(next).is_valid(),
            None => false,
        }
    }
}

/// Result of scanning one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub entry: u32,
    /// Disjoint ranges sorted by start address.
    pub ranges: Vec<GuestRange>,
    /// Targets of local (non-linking) branches seen while scanning.
    pub branch_targets: BTreeSet<u32>,
}

impl ScanResult {
    pub fn contains(&self, addr: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }

    pub fn num_insns(&self) -> u32 {
        self.ranges.iter().map(|r| r.num_insns()).sum()
    }

    /// Smallest range covering every scanned range.
    pub fn span(&self) -> Option<GuestRange> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some(GuestRange::new(first.start, last.end() - first.start))
    }
}

/// How one instruction affects the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Control can continue with the next instruction.
    Continue,
    /// The instruction belongs to the range but ends it.
    End,
    /// The word is not code; the range ends before it.
    Invalid,
}

/// Determines the instruction ranges of a guest function.
#[derive(Debug, Clone, Default)]
pub struct FunctionBoundaryScanner<H: JumpTableHeuristic = NeighbourBranchHeuristic> {
    heuristic: H,
}

impl FunctionBoundaryScanner<NeighbourBranchHeuristic> {
    pub fn new() -> Self {
        Self {
            heuristic: NeighbourBranchHeuristic,
        }
    }
}

impl<H: JumpTableHeuristic> FunctionBoundaryScanner<H> {
    pub fn with_heuristic(heuristic: H) -> Self {
        Self { heuristic }
    }

    /// Scan the function entered at `entry`. Always terminates.
    pub fn scan<C: GuestCode + ?Sized>(&self, code: &C, entry: u32) -> ScanResult {
        let mut state = ScanState {
            code,
            heuristic: &self.heuristic,
            ranges: BTreeMap::new(),
            targets: BTreeSet::new(),
            pending: BTreeSet::new(),
            budget: MAX_SCAN_INSNS,
        };
        state.process_range(entry);
        while let Some(target) = state.pending.pop_first() {
            if state.budget == 0 {
                break;
            }
            if !state.is_covered(target) {
                state.process_range(target);
            }
        }
        state.check_for_collisions();
        ScanResult {
            entry,
            ranges: state
                .ranges
                .iter()
                .map(|(&start, &length)| GuestRange::new(start, length))
                .collect(),
            branch_targets: state.targets,
        }
    }
}

struct ScanState<'a, C: ?Sized, H> {
    code: &'a C,
    heuristic: &'a H,
    /// start -> length
    ranges: BTreeMap<u32, u32>,
    targets: BTreeSet<u32>,
    pending: BTreeSet<u32>,
    budget: u32,
}

impl<C: GuestCode + ?Sized, H: JumpTableHeuristic> ScanState<'_, C, H> {
    fn add_branch_target(&mut self, target: u32) {
        if self.targets.insert(target) {
            self.pending.insert(target);
        }
    }

    fn process_insn(&mut self, addr: u32) -> Flow {
        let Some(word) = self.code.read_u32(addr) else {
            return Flow::Invalid;
        };
        let insn = Insn(word);
        if !insn.is_valid() {
            return Flow::Invalid;
        }
        match insn.opcd() {
            1 => match insn.hle_id() {
                Some(id) if self.code.handler_returns(id - super::insn::HLE_ID_FIRST) => {
                    Flow::Continue
                }
                _ => Flow::End,
            },
            16 => {
                if !insn.lk() {
                    self.add_branch_target(insn.bc_target(addr));
                }
                Flow::Continue
            }
            18 => {
                if insn.lk() {
                    return Flow::Continue;
                }
                self.add_branch_target(insn.b_target(addr));
                if self.heuristic.continues_after_branch(self.code, addr) {
                    Flow::Continue
                } else {
                    Flow::End
                }
            }
            19 => match insn.xo10() {
                16 if bo_always(insn.bo()) && !insn.lk() => Flow::End,
                528 if word == INSN_BCTR => {
                    if self.heuristic.continues_after_bctr(self.code, addr) {
                        Flow::Continue
                    } else {
                        Flow::End
                    }
                }
                _ => Flow::Continue,
            },
            _ => Flow::Continue,
        }
    }

    fn is_covered(&self, addr: u32) -> bool {
        self.ranges
            .range(..=addr)
            .next_back()
            .is_some_and(|(&start, &len)| GuestRange::new(start, len).contains(addr))
    }

    /// Walk from `start` until the flow ends or runs into the next
    /// known range, then merge with the neighbours it touches.
    fn process_range(&mut self, start: u32) {
        let previous = self
            .ranges
            .range(..start)
            .next_back()
            .map(|(&s, &l)| (s, l))
            .filter(|&(s, l)| s.wrapping_add(l) == start);
        let next = self
            .ranges
            .range((Bound::Excluded(start), Bound::Unbounded))
            .next()
            .map(|(&s, &l)| (s, l));
        let limit = next.map(|(s, _)| s);

        let mut cur = start;
        loop {
            if limit.is_some_and(|l| cur >= l) || self.budget == 0 {
                break;
            }
            let flow = self.process_insn(cur);
            if flow == Flow::Invalid {
                break;
            }
            self.budget -= 1;
            let Some(after) = cur.checked_add(4) else {
                break;
            };
            cur = after;
            if flow == Flow::End {
                break;
            }
        }
        let length = cur - start;
        if length == 0 {
            return;
        }

        let (range_start, mut range_len) = match previous {
            Some((s, l)) => (s, l + length),
            None => (start, length),
        };
        if let Some((next_start, next_len)) = next {
            if cur >= next_start {
                range_len = next_start + next_len - range_start;
                self.ranges.remove(&next_start);
            }
        }
        self.ranges.insert(range_start, range_len);
    }

    fn check_for_collisions(&self) {
        let mut end_of_previous = 0u32;
        for (&start, &len) in &self.ranges {
            debug_assert!(end_of_previous <= start, "overlapping ranges at {start:#x}");
            end_of_previous = start + len;
        }
    }
}
