//! Compile requests, the background worker and the commit step.
//!
//! A request flips a slot from `Unvisited` to `Visited` and queues the
//! address. The worker scans, lowers and emits outside the global
//! lock, then commits under it. Guest writes may land while a function
//! is being compiled; the commit rejects results that raced with an
//! invalidation instead of preventing the race.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use ppcrec_backend::{emit_function, HostCodeGen};
use ppcrec_core::Context;
use ppcrec_frontend::{lower_function, GuestRange, LowerError};
use tracing::{debug, info, warn};

use crate::dispatch_table::{DispatchSlot, NativeEntry};
use crate::engine::{Compiler, Hex, Shared, StatCounters};
use crate::error::{CommitRejected, CompileError};
use crate::function::{CompiledFunction, FunctionId};

/// Native code for one function, emitted but not yet visible through
/// the dispatch table.
#[derive(Debug, Clone)]
pub struct PendingCommit {
    /// Address the compile was requested for.
    pub address: u32,
    pub ranges: Vec<GuestRange>,
    pub native_code: NativeEntry,
    pub native_size: usize,
    pub entries: Vec<(u32, NativeEntry)>,
    /// First invalidation sequence number this result must be checked
    /// against.
    accepted_at: u64,
}

impl PendingCommit {
    fn overlaps(&self, start: u32, end: u32) -> bool {
        // A range touching the invalidated span counts as overlapping.
        self.ranges
            .iter()
            .any(|r| r.start < end && r.end() >= start)
    }
}

impl Shared {
    /// Queue `addr` for compilation unless it was already requested.
    ///
    /// Never waits for the global lock: when the lock is busy the
    /// request is dropped and the guest asks again on its next branch
    /// to `addr`. Returns whether the address was queued.
    pub fn request(&self, addr: u32) -> bool {
        if !self.tracks(addr) || addr & 3 != 0 || !self.config.passes_filter(addr) {
            return false;
        }
        if self.table.read(addr) != DispatchSlot::Unvisited {
            return false;
        }
        let Ok(mut guard) = self.state.try_lock() else {
            return false;
        };
        let st = &mut *guard;
        // Re-check: another request may have won since the first read.
        if self.table.read(addr) != DispatchSlot::Unvisited {
            return false;
        }
        if let Err(e) = self.table.write(&mut st.writer, addr, DispatchSlot::Visited) {
            warn!(addr = %Hex(addr), error = %e, "cannot map dispatch block");
            return false;
        }
        let seq = st.next_invalidation;
        st.queue.push_back((addr, seq));
        StatCounters::bump(&self.stats.enqueued);
        debug!(
            addr = %Hex(addr),
            queued = st.queue.len(),
            "compile request enqueued"
        );
        true
    }

    /// Pop the next queued address whose slot is still `Visited`,
    /// together with the sequence number it was accepted at.
    /// Addresses invalidated while queued are discarded.
    pub fn next_job(&self) -> Option<(u32, u64)> {
        let mut st = self.state.lock().unwrap();
        while let Some((addr, accepted_at)) = st.queue.pop_front() {
            if self.table.read(addr) == DispatchSlot::Visited {
                st.in_flight.push(accepted_at);
                return Some((addr, accepted_at));
            }
            debug!(addr = %Hex(addr), "dropping stale compile request");
        }
        None
    }

    /// Scan, lower and emit the function entered at `addr`. Runs
    /// without the global lock.
    pub fn compile(
        &self,
        compiler: &mut Compiler,
        addr: u32,
        accepted_at: u64,
    ) -> Result<PendingCommit, CompileError> {
        let scan = compiler.scanner.scan(self.code.as_ref(), addr);
        if scan.ranges.is_empty() {
            return Err(LowerError::Unreadable { address: addr }.into());
        }

        let mut ir = Context::new();
        let env = compiler.backend.init_context(&mut ir);
        if let Err(e) = lower_function(
            &mut ir,
            env,
            self.code.as_ref(),
            &scan,
            self.config.lower_options(),
        ) {
            if matches!(e, LowerError::Unsupported { .. }) {
                StatCounters::bump(&self.stats.unsupported);
            }
            return Err(e.into());
        }

        let emitted = match emit_function(&mut ir, &compiler.backend, &mut compiler.buf) {
            Ok(emitted) => emitted,
            Err(e) => {
                StatCounters::bump(&self.stats.emit_failures);
                return Err(e.into());
            }
        };
        let buf = &compiler.buf;
        let entries = emitted
            .entries
            .iter()
            .map(|e| (e.guest_address, NativeEntry::from_code(buf.ptr_at(e.offset))))
            .collect::<Vec<_>>();
        if !entries.iter().any(|&(guest, _)| guest == addr) {
            warn!(
                addr = %Hex(addr),
                "compiled function has no entry for its requested address"
            );
        }
        Ok(PendingCommit {
            address: addr,
            ranges: scan.ranges,
            native_code: NativeEntry::from_code(buf.ptr_at(emitted.offset)),
            native_size: emitted.size,
            entries,
            accepted_at,
        })
    }

    /// Publish a compiled function, unless guest code changed under
    /// it. Every attempt prunes the recorded invalidations.
    pub fn commit(&self, pending: PendingCommit) -> Result<FunctionId, CommitRejected> {
        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        let addr = pending.address;
        st.retire(pending.accepted_at);

        if self.table.read(addr) != DispatchSlot::Visited {
            st.consume_pending();
            StatCounters::bump(&self.stats.rejected_commits);
            debug!(addr = %Hex(addr), "commit rejected: slot no longer visited");
            return Err(CommitRejected::SlotNoLongerVisited { address: addr });
        }

        let conflict = st
            .pending
            .iter()
            .filter(|&&(seq, _)| seq >= pending.accepted_at)
            .map(|&(_, inv)| inv)
            .find(|inv| pending.overlaps(inv.start, inv.end()));
        st.consume_pending();
        if let Some(inv) = conflict {
            self.table
                .reset_range(&mut st.writer, addr, addr.saturating_add(4));
            StatCounters::bump(&self.stats.rejected_commits);
            debug!(
                addr = %Hex(addr),
                start = %Hex(inv.start),
                size = inv.size,
                "commit rejected: code overwritten during compilation"
            );
            return Err(CommitRejected::PendingInvalidation {
                start: inv.start,
                size: inv.size,
            });
        }

        let mut entries = Vec::with_capacity(pending.entries.len());
        for &(guest, native) in &pending.entries {
            match self
                .table
                .write(&mut st.writer, guest, DispatchSlot::Compiled(native))
            {
                Ok(()) => entries.push((guest, native)),
                Err(e) => warn!(
                    addr = %Hex(guest),
                    error = %e,
                    "cannot map dispatch block, entry dropped"
                ),
            }
        }

        // Addresses queued inside the function that did not become
        // entry points were inlined; they must be requested again if
        // ever jumped to directly. Range ends are exclusive: the word
        // after a range may be a queued neighbour and stays untouched.
        for r in &pending.ranges {
            let mut a = r.start as u64;
            while a < r.end() as u64 {
                let slot = a as u32;
                if self.table.read(slot) == DispatchSlot::Visited {
                    self.table
                        .reset_range(&mut st.writer, slot, slot.saturating_add(4));
                }
                a += 4;
            }
        }

        let span = pending.ranges.first().zip(pending.ranges.last());
        let guest_size = span.map_or(0, |(first, last)| last.end() - first.start);
        let id = st.functions.insert(CompiledFunction {
            guest_address: addr,
            guest_size,
            native_code: pending.native_code,
            native_size: pending.native_size,
            ranges: pending.ranges,
            entries,
            handles: Vec::new(),
        });
        let handles = match st.functions.get(id) {
            Some(func) => func
                .ranges
                .iter()
                .map(|r| st.registry.store(id, r.start, r.end()))
                .collect(),
            None => Vec::new(),
        };
        if let Some(func) = st.functions.get_mut(id) {
            func.handles = handles;
        }

        StatCounters::bump(&self.stats.compiled);
        debug!(
            addr = %Hex(addr),
            guest_size,
            native_size = pending.native_size,
            "function committed"
        );
        Ok(id)
    }

    /// Give up on a dequeued job without committing it.
    pub fn abandon(&self, accepted_at: u64) {
        self.state.lock().unwrap().retire(accepted_at);
    }

    /// Process one queued request. Returns false when the queue was
    /// empty.
    pub fn run_next(&self) -> bool {
        let Some((addr, accepted_at)) = self.next_job() else {
            return false;
        };
        let mut guard = self.compiler.lock().unwrap();
        let Some(compiler) = guard.as_mut() else {
            warn!(addr = %Hex(addr), "compile job without a compiler");
            self.abandon(accepted_at);
            return false;
        };
        let result = match self.compile(compiler, addr, accepted_at) {
            Ok(pending) => self.commit(pending).map_err(CompileError::from),
            Err(e) => {
                self.abandon(accepted_at);
                Err(e)
            }
        };
        if let Err(e) = result {
            debug!(addr = %Hex(addr), error = %e, "compile attempt discarded");
        }
        true
    }
}

/// Body of the background compiler thread. Checks the stop flag once
/// per iteration and sleeps while the queue is empty.
pub(crate) fn worker_loop(shared: Arc<Shared>) {
    info!("compiler worker started");
    while !shared.stop.load(Ordering::Acquire) {
        if !shared.run_next() {
            thread::sleep(shared.config.idle_sleep);
        }
    }
    info!("compiler worker stopped");
}
