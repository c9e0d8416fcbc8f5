//! Tearing compiled code back out when guest code is overwritten.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::engine::{EngineState, Hex, InvalidationRequest, Shared, StatCounters};
use crate::function::FunctionId;

impl Shared {
    /// Forget everything compiled from guest code in `[start, end)`.
    ///
    /// Slots in the span become `Unvisited`, the span is recorded for
    /// commits in flight, and every function overlapping it is
    /// deleted. Calling it again for the same span changes nothing
    /// observable.
    pub fn invalidate(&self, start: u32, end: u32) {
        if !self.tracks(start) {
            return;
        }
        debug_assert!(end >= start, "inverted invalidation {start:#x}..{end:#x}");
        let end = end.max(start);

        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        self.table.reset_range(&mut st.writer, start, end);
        let seq = st.next_invalidation;
        st.next_invalidation += 1;
        st.pending.push((
            seq,
            InvalidationRequest {
                start,
                size: end - start,
            },
        ));

        let mut deleted = 0u32;
        while let Some((handle, entry)) = st.registry.find_first_overlapping(start, end) {
            if !self.delete_function(st, entry.owner) {
                // Owner already gone; drop the orphaned range so the
                // loop makes progress.
                warn!(start = %Hex(entry.start), "orphaned range in registry");
                st.registry.delete(handle);
            }
            deleted += 1;
        }
        StatCounters::bump(&self.stats.invalidations);
        if deleted > 0 {
            self.stats
                .functions_invalidated
                .fetch_add(deleted as u64, Ordering::Relaxed);
            debug!(start = %Hex(start), end = %Hex(end), deleted, "invalidated compiled code");
        }
    }

    /// Unregister a function: reset the slots of all of its ranges and
    /// remove its ranges from the registry. Its native code stays in
    /// the code cache until shutdown.
    pub(crate) fn delete_function(&self, st: &mut EngineState, id: FunctionId) -> bool {
        let Some(func) = st.functions.remove(id) else {
            return false;
        };
        for r in &func.ranges {
            self.table.reset_range(&mut st.writer, r.start, r.end());
        }
        for &handle in &func.handles {
            st.registry.delete(handle);
        }
        true
    }

    /// Drop every queued request, pending invalidation and committed
    /// function, leaving all slots `Unvisited`.
    pub(crate) fn clear_all(&self) {
        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        st.queue.clear();
        st.in_flight.clear();
        st.pending.clear();
        for id in st.functions.ids() {
            self.delete_function(st, id);
        }
        st.registry.clear();
        self.table.reset_all(&mut st.writer);
    }
}
