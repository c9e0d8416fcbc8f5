//! Interval index from guest address ranges to the compiled function
//! owning them.
//!
//! The address space is cut into granules of [`GRANULE_SIZE`] bytes,
//! and granules are hashed onto [`BUCKET_COUNT`] buckets. Several
//! granules share a bucket; every query re-checks the exact interval.
//! A range spanning several buckets is listed in each of them, so
//! queries stamp visited entries with a per-query generation to report
//! each range at most once.

pub const GRANULE_SIZE: u32 = 0x2000;
pub const BUCKET_COUNT: usize = 7703;

const GRANULE_SHIFT: u32 = GRANULE_SIZE.trailing_zeros();

/// Handle of a stored range, valid until passed to
/// [`RangeRegistry::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeHandle(usize);

/// One stored interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry<O> {
    pub start: u32,
    pub end: u32,
    pub owner: O,
}

#[derive(Debug)]
struct Slot<O> {
    entry: RangeEntry<O>,
    last_visit: u64,
}

#[derive(Debug)]
pub struct RangeRegistry<O> {
    buckets: Vec<Vec<usize>>,
    slots: Vec<Option<Slot<O>>>,
    free: Vec<usize>,
    generation: u64,
    len: usize,
}

impl<O: Copy> Default for RangeRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Buckets touched by `[start, end)`. Empty ranges still occupy the
/// bucket of their start granule.
fn buckets_for(start: u32, end: u32) -> impl Iterator<Item = usize> {
    let first = start >> GRANULE_SHIFT;
    let last = end.saturating_sub(1).max(start) >> GRANULE_SHIFT;
    let count = ((last - first) as usize + 1).min(BUCKET_COUNT);
    (0..count).map(move |i| (first as usize + i) % BUCKET_COUNT)
}

impl<O: Copy> RangeRegistry<O> {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); BUCKET_COUNT],
            slots: Vec::new(),
            free: Vec::new(),
            generation: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record that `owner` covers `[start, end)`.
    pub fn store(&mut self, owner: O, start: u32, end: u32) -> RangeHandle {
        debug_assert!(start <= end, "inverted range {start:#x}..{end:#x}");
        let slot = Slot {
            entry: RangeEntry { start, end, owner },
            last_visit: 0,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        for b in buckets_for(start, end) {
            self.buckets[b].push(idx);
        }
        self.len += 1;
        RangeHandle(idx)
    }

    /// Remove a stored range. Returns its entry, or `None` when the
    /// handle was already deleted.
    pub fn delete(&mut self, handle: RangeHandle) -> Option<RangeEntry<O>> {
        let slot = self.slots.get_mut(handle.0)?.take()?;
        for b in buckets_for(slot.entry.start, slot.entry.end) {
            let bucket = &mut self.buckets[b];
            if let Some(pos) = bucket.iter().position(|&i| i == handle.0) {
                bucket.swap_remove(pos);
            }
        }
        self.free.push(handle.0);
        self.len -= 1;
        Some(slot.entry)
    }

    pub fn get(&self, handle: RangeHandle) -> Option<&RangeEntry<O>> {
        self.slots.get(handle.0)?.as_ref().map(|s| &s.entry)
    }

    /// Call `visitor` once for every stored range intersecting
    /// `[start, end)`.
    pub fn for_each_overlapping<F>(&mut self, start: u32, end: u32, mut visitor: F)
    where
        F: FnMut(RangeHandle, &RangeEntry<O>),
    {
        self.generation += 1;
        let generation = self.generation;
        for b in buckets_for(start, end) {
            for &idx in &self.buckets[b] {
                let Some(slot) = self.slots[idx].as_mut() else {
                    continue;
                };
                if slot.last_visit == generation {
                    continue;
                }
                slot.last_visit = generation;
                if slot.entry.start < end && start < slot.entry.end {
                    visitor(RangeHandle(idx), &slot.entry);
                }
            }
        }
    }

    /// First stored range intersecting `[start, end)`, if any.
    pub fn find_first_overlapping(
        &self,
        start: u32,
        end: u32,
    ) -> Option<(RangeHandle, RangeEntry<O>)> {
        buckets_for(start, end).find_map(|b| {
            self.buckets[b].iter().find_map(|&idx| {
                let slot = self.slots[idx].as_ref()?;
                let e = slot.entry;
                (e.start < end && start < e.end).then_some((RangeHandle(idx), e))
            })
        })
    }

    /// Drop every stored range.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}
