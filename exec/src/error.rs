use std::io;

use ppcrec_backend::EmitError;
use ppcrec_frontend::LowerError;
use thiserror::Error;

/// A compiled function was discarded at commit time because guest
/// code changed while it was being compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitRejected {
    #[error("slot {address:#010x} is no longer queued for compilation")]
    SlotNoLongerVisited { address: u32 },
    #[error("guest code at {start:#010x}+{size:#x} was overwritten during compilation")]
    PendingInvalidation { start: u32, size: u32 },
}

/// Any reason a compile attempt produced no committed function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error(transparent)]
    Commit(#[from] CommitRejected),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to map host memory: {0}")]
    Mmap(#[source] io::Error),
    #[error("recompiler is disabled")]
    Disabled,
    #[error("failed to spawn compiler thread: {0}")]
    SpawnWorker(#[source] io::Error),
}
