use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use ppcrec_backend::code_buffer::CodeBuffer;
use ppcrec_backend::{HostCodeGen, X86_64CodeGen};
use ppcrec_frontend::ppc::cpu::MEMBASE_OFFSET;
use ppcrec_frontend::{FunctionBoundaryScanner, GuestCode};

use crate::config::EngineConfig;
use crate::dispatch_table::{DispatchTable, TableWriter};
use crate::error::EngineError;
use crate::function::{FunctionId, FunctionList};
use crate::range_registry::RangeRegistry;

/// Guest address formatter for log fields.
pub(crate) struct Hex(pub u32);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A guest code write recorded for commits that are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub start: u32,
    pub size: u32,
}

impl InvalidationRequest {
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.size)
    }
}

/// Everything guarded by the global compilation lock.
pub(crate) struct EngineState {
    pub writer: TableWriter,
    /// Requested addresses with the invalidation sequence number at
    /// the time each request was accepted.
    pub queue: VecDeque<(u32, u64)>,
    /// Acceptance sequence numbers of jobs taken off the queue whose
    /// result has not been committed or discarded yet.
    pub in_flight: Vec<u64>,
    /// Invalidations not yet consumed by a commit, tagged with their
    /// sequence number.
    pub pending: Vec<(u64, InvalidationRequest)>,
    pub next_invalidation: u64,
    pub registry: RangeRegistry<FunctionId>,
    pub functions: FunctionList,
}

impl EngineState {
    /// Forget one in-flight job accepted at `seq`.
    pub fn retire(&mut self, seq: u64) {
        if let Some(i) = self.in_flight.iter().position(|&s| s == seq) {
            self.in_flight.swap_remove(i);
        }
    }

    /// Drop the invalidations no queued or in-flight request can still
    /// be affected by. Called on every commit attempt.
    pub fn consume_pending(&mut self) {
        let oldest = self
            .queue
            .iter()
            .map(|&(_, seq)| seq)
            .chain(self.in_flight.iter().copied())
            .min();
        self.pending
            .retain(|&(seq, _)| oldest.is_some_and(|oldest| seq >= oldest));
    }
}

/// Native code generation state, used by one compile at a time.
pub(crate) struct Compiler {
    pub backend: X86_64CodeGen,
    pub buf: CodeBuffer,
    pub scanner: FunctionBoundaryScanner,
}

impl Compiler {
    /// Map the code cache and emit the shared prologue and epilogue
    /// at its start.
    pub fn new(code_cache_size: usize) -> Result<Self, EngineError> {
        let mut buf = CodeBuffer::new(code_cache_size).map_err(EngineError::Mmap)?;
        let mut backend = X86_64CodeGen::new(MEMBASE_OFFSET as i32);
        backend.emit_prologue(&mut buf);
        backend.emit_epilogue(&mut buf);
        Ok(Self {
            backend,
            buf,
            scanner: FunctionBoundaryScanner::new(),
        })
    }

    pub fn prologue(&self) -> *const u8 {
        self.buf.ptr_at(self.backend.prologue_offset)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub enqueued: AtomicU64,
    pub compiled: AtomicU64,
    pub rejected_commits: AtomicU64,
    pub unsupported: AtomicU64,
    pub emit_failures: AtomicU64,
    pub invalidations: AtomicU64,
    pub functions_invalidated: AtomicU64,
}

impl StatCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared between the engine handle and its worker thread.
pub(crate) struct Shared {
    pub config: EngineConfig,
    pub table: DispatchTable,
    pub state: Mutex<EngineState>,
    /// `None` when the engine is disabled.
    pub compiler: Mutex<Option<Compiler>>,
    /// Shared prologue entry, null when the engine is disabled.
    pub prologue: usize,
    pub code: Box<dyn GuestCode + Send + Sync>,
    pub stop: AtomicBool,
    pub stats: StatCounters,
}

impl Shared {
    pub fn new(
        config: EngineConfig,
        code: Box<dyn GuestCode + Send + Sync>,
    ) -> Result<Self, EngineError> {
        let (table, writer) = DispatchTable::new(config.code_area_end);
        let compiler = if config.enabled {
            Some(Compiler::new(config.code_cache_size)?)
        } else {
            None
        };
        let prologue = compiler.as_ref().map_or(0, |c| c.prologue() as usize);
        Ok(Self {
            config,
            table,
            state: Mutex::new(EngineState {
                writer,
                queue: VecDeque::new(),
                in_flight: Vec::new(),
                pending: Vec::new(),
                next_invalidation: 0,
                registry: RangeRegistry::new(),
                functions: FunctionList::default(),
            }),
            compiler: Mutex::new(compiler),
            prologue,
            code,
            stop: AtomicBool::new(false),
            stats: StatCounters::default(),
        })
    }

    /// Whether `addr` is subject to recompilation at all.
    pub fn tracks(&self, addr: u32) -> bool {
        self.config.enabled && self.config.in_code_area(addr)
    }
}
