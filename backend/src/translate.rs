use crate::code_buffer::CodeBuffer;
use crate::liveness::liveness_analysis;
use crate::regalloc::{regalloc_and_codegen, SegmentEntry};
use crate::{EmitError, HostCodeGen};
use ppcrec_core::Context;
use tracing::trace;

/// Native code produced for one guest function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFunction {
    /// Offset of the first emitted byte in the code buffer.
    pub offset: usize,
    /// Number of bytes emitted.
    pub size: usize,
    /// Guest entry address and native offset of every enterable
    /// segment, in emission order.
    pub entries: Vec<SegmentEntry>,
}

/// Full emission pipeline: liveness, then regalloc+codegen.
///
/// On failure the buffer is rolled back to where it was, so no
/// partial native code survives.
pub fn emit_function(
    ctx: &mut Context,
    backend: &impl HostCodeGen,
    buf: &mut CodeBuffer,
) -> Result<EmittedFunction, EmitError> {
    liveness_analysis(ctx);
    let start = buf.offset();
    match regalloc_and_codegen(ctx, backend, buf) {
        Ok(entries) => {
            let size = buf.offset() - start;
            trace!(offset = start, size, entries = entries.len(), "emitted function");
            Ok(EmittedFunction {
                offset: start,
                size,
                entries,
            })
        }
        Err(e) => {
            buf.truncate(start);
            Err(e)
        }
    }
}

/// Run native code at `entry` through the shared prologue at
/// `prologue`.
///
/// Returns the value the code left in RAX on exit.
///
/// # Safety
/// `env` must point to a live `PpcState`-layout block matching the
/// globals registered when the code was emitted, and `entry` must be
/// an entry point returned by [`emit_function`] in the buffer holding
/// `prologue`.
pub unsafe fn enter_native(prologue: *const u8, env: *mut u8, entry: *const u8) -> usize {
    // Prologue signature:
    //   fn(env: *mut u8, entry: *const u8) -> usize
    // RDI = env, RSI = native entry, returns RAX
    let prologue_fn: unsafe extern "C" fn(*mut u8, *const u8) -> usize =
        core::mem::transmute(prologue);
    prologue_fn(env, entry)
}
