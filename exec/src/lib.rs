//! Recompiler runtime: dispatch table, background compilation and
//! invalidation of compiled guest code.
//!
//! Guest execution contexts look up branch targets in the
//! [`DispatchTable`] without locking. An address without native code
//! is queued through [`Recompiler::request`]; a single worker thread
//! compiles queued functions and commits them under the global lock.
//! Guest code writes reach [`Recompiler::invalidate`], which resets the
//! affected slots and unregisters every overlapping function.

pub mod config;
pub mod dispatch_table;
mod engine;
pub mod error;
pub mod function;
mod invalidation;
pub mod range_registry;
mod scheduler;

pub use config::EngineConfig;
pub use dispatch_table::{DispatchSlot, DispatchTable, NativeEntry, TableWriter};
pub use engine::InvalidationRequest;
pub use error::{CommitRejected, CompileError, EngineError};
pub use function::{CompiledFunction, FunctionId};
pub use range_registry::{RangeEntry, RangeHandle, RangeRegistry};
pub use scheduler::PendingCommit;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ppcrec_backend::enter_native;
use ppcrec_frontend::{GuestCode, GuestRange, PpcState};
use tracing::{info, warn};

use engine::Shared;

/// Counters describing what the engine has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub enqueued: u64,
    pub compiled: u64,
    pub rejected_commits: u64,
    pub unsupported_lowerings: u64,
    pub emit_failures: u64,
    pub invalidations: u64,
    pub functions_invalidated: u64,
}

/// Handle to a running recompiler.
///
/// Dropping it stops the worker and unregisters every compiled
/// function before the code cache is released.
pub struct Recompiler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Recompiler {
    /// Create the engine over `code`. Unless the configuration says
    /// otherwise, the background compiler thread starts immediately.
    pub fn new<C>(config: EngineConfig, code: C) -> Result<Self, EngineError>
    where
        C: GuestCode + Send + Sync + 'static,
    {
        let spawn = config.spawn_worker && config.enabled;
        let shared = Arc::new(Shared::new(config, Box::new(code))?);
        let mut rc = Self {
            shared,
            worker: None,
        };
        if spawn {
            rc.spawn_worker()?;
        }
        info!(
            enabled = rc.shared.config.enabled,
            worker = rc.worker.is_some(),
            "recompiler started"
        );
        Ok(rc)
    }

    /// Start the background compiler thread if it is not running.
    pub fn spawn_worker(&mut self) -> Result<(), EngineError> {
        if !self.shared.config.enabled {
            return Err(EngineError::Disabled);
        }
        if self.worker.is_some() {
            return Ok(());
        }
        self.shared.stop.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("ppc-recompiler".into())
            .spawn(move || scheduler::worker_loop(shared))
            .map_err(EngineError::SpawnWorker)?;
        self.worker = Some(handle);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// The dispatch table, for lock-free lookups.
    pub fn table(&self) -> &DispatchTable {
        &self.shared.table
    }

    /// Current state of the dispatch slot for `addr`.
    #[inline]
    pub fn read(&self, addr: u32) -> DispatchSlot {
        self.shared.table.read(addr)
    }

    /// Queue `addr` for compilation. Returns false when the address is
    /// already queued or compiled, out of scope, or the global lock is
    /// busy (the caller simply asks again later).
    pub fn request(&self, addr: u32) -> bool {
        self.shared.request(addr)
    }

    /// Native entry for `addr` if it is compiled. Otherwise requests a
    /// compile and returns `None`; the caller interprets meanwhile.
    pub fn try_enter(&self, addr: u32) -> Option<NativeEntry> {
        match self.read(addr) {
            DispatchSlot::Compiled(entry) => Some(entry),
            DispatchSlot::Unvisited => {
                self.request(addr);
                None
            }
            DispatchSlot::Visited => None,
        }
    }

    /// Run the compiled code for `addr` until it leaves the function.
    /// Returns the guest address execution continues at, or `None`
    /// when `addr` has no native code yet.
    ///
    /// # Safety
    /// `state.membase` must point to guest memory covering every
    /// address the compiled code accesses.
    pub unsafe fn execute(&self, state: &mut PpcState, addr: u32) -> Option<u32> {
        let entry = self.try_enter(addr)?;
        state.pc = addr;
        enter_native(
            self.shared.prologue as *const u8,
            state as *mut PpcState as *mut u8,
            entry.as_ptr(),
        );
        Some(state.pc)
    }

    /// Guest code in `[start, end)` changed.
    pub fn invalidate(&self, start: u32, end: u32) {
        self.shared.invalidate(start, end);
    }

    /// The embedder copied `len` bytes of guest code to `dst`.
    /// Every instruction word the copy touched is invalidated.
    pub fn managed_code_copy(&self, dst: u32, len: u32) {
        if len == 0 {
            return;
        }
        let start = dst & !3;
        let end = dst.saturating_add(len).saturating_add(3) & !3;
        self.invalidate(start, end);
    }

    /// Covered ranges of a compiled function containing `addr`.
    pub fn find_function_ranges(&self, addr: u32) -> Option<Vec<GuestRange>> {
        let st = self.shared.state.lock().unwrap();
        let (_, entry) = st
            .registry
            .find_first_overlapping(addr, addr.saturating_add(4))?;
        st.functions.get(entry.owner).map(|f| f.ranges.clone())
    }

    /// Snapshot of a committed function.
    pub fn function(&self, id: FunctionId) -> Option<CompiledFunction> {
        let st = self.shared.state.lock().unwrap();
        st.functions.get(id).cloned()
    }

    pub fn function_count(&self) -> usize {
        self.shared.state.lock().unwrap().functions.len()
    }

    /// Number of requests waiting for the worker.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Invalidations still held for commits of queued requests.
    pub fn pending_invalidations(&self) -> Vec<InvalidationRequest> {
        let st = self.shared.state.lock().unwrap();
        st.pending.iter().map(|&(_, inv)| inv).collect()
    }

    /// Compile every queued request on the calling thread. Returns the
    /// number of jobs taken from the queue.
    pub fn process_queue(&self) -> usize {
        let mut jobs = 0;
        while self.shared.run_next() {
            jobs += 1;
        }
        jobs
    }

    /// Take the next queued request and compile it without committing.
    /// Returns `None` when nothing is queued.
    ///
    /// A successful result should be handed to [`commit`](Self::commit):
    /// until then, invalidations it may conflict with are retained.
    pub fn compile_next(&self) -> Option<Result<PendingCommit, CompileError>> {
        let (addr, accepted_at) = self.shared.next_job()?;
        let mut guard = self.shared.compiler.lock().unwrap();
        let Some(compiler) = guard.as_mut() else {
            self.shared.abandon(accepted_at);
            return None;
        };
        let result = self.shared.compile(compiler, addr, accepted_at);
        if result.is_err() {
            self.shared.abandon(accepted_at);
        }
        Some(result)
    }

    /// Publish a function produced by [`compile_next`](Self::compile_next).
    pub fn commit(&self, pending: PendingCommit) -> Result<FunctionId, CompileError> {
        Ok(self.shared.commit(pending)?)
    }

    pub fn stats(&self) -> EngineStats {
        let s = &self.shared.stats;
        EngineStats {
            enqueued: s.enqueued.load(Ordering::Relaxed),
            compiled: s.compiled.load(Ordering::Relaxed),
            rejected_commits: s.rejected_commits.load(Ordering::Relaxed),
            unsupported_lowerings: s.unsupported.load(Ordering::Relaxed),
            emit_failures: s.emit_failures.load(Ordering::Relaxed),
            invalidations: s.invalidations.load(Ordering::Relaxed),
            functions_invalidated: s.functions_invalidated.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker, drain the queue without compiling, unregister
    /// every function and release the code cache. Idempotent.
    pub fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("compiler worker panicked");
            }
        }
        self.shared.clear_all();
        if self.shared.compiler.lock().unwrap().take().is_some() {
            info!("recompiler stopped");
        }
    }
}

impl Drop for Recompiler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
