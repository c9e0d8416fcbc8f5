//! Native code emission for lowered guest functions.
//!
//! The pipeline is liveness analysis, then constraint-driven register
//! allocation interleaved with x86-64 instruction selection. Output
//! lands in an executable [`CodeBuffer`] shared by all functions.

pub mod code_buffer;
pub mod constraint;
pub mod liveness;
pub mod regalloc;
pub mod translate;
pub mod x86_64;

pub use code_buffer::CodeBuffer;
pub use constraint::{ArgConstraint, OpConstraint};
pub use regalloc::SegmentEntry;
pub use translate::{emit_function, enter_native, EmittedFunction};
pub use x86_64::X86_64CodeGen;

use ppcrec_core::{Context, Op, Opcode, RegSet, Type};
use thiserror::Error;

/// Why native code could not be produced for a function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("code buffer full")]
    CodeBufferFull,
    #[error("no host register available while emitting {0:?}")]
    OutOfRegisters(Opcode),
    #[error("branch displacement out of range")]
    BranchOutOfRange,
}

/// Trait for host architecture code generators.
///
/// A backend supplies register constraints per opcode and the
/// primitive moves the allocator needs, then emits host code for
/// each IR op once its operands sit in registers.
pub trait HostCodeGen {
    /// Emit the shared prologue: save callee-saved registers, load the
    /// state and guest memory base registers, allocate the stack frame
    /// and jump to the native entry passed as second argument.
    fn emit_prologue(&mut self, buf: &mut CodeBuffer);

    /// Emit the epilogue: restore callee-saved registers,
    /// deallocate stack frame, return to caller.
    fn emit_epilogue(&mut self, buf: &mut CodeBuffer);

    /// Return the offset of the function return path.
    fn epilogue_offset(&self) -> usize;

    /// Register the backend's fixed temps (the state pointer) in a
    /// fresh context. Returns the state pointer temp.
    fn init_context(&self, ctx: &mut Context) -> ppcrec_core::TempIdx;

    /// Return the register constraint for an opcode.
    fn op_constraint(&self, opc: Opcode) -> &'static OpConstraint;

    /// Registers the allocator may hand out for values of `ty`.
    fn allocatable_regs(&self, ty: Type) -> RegSet;

    /// Registers a helper call may clobber.
    fn call_clobbered_regs(&self) -> RegSet;

    // -- Register allocator primitives --

    /// Emit host mov between two registers.
    fn out_mov(&self, buf: &mut CodeBuffer, ty: Type, dst: u8, src: u8);

    /// Emit host load-immediate into a register.
    fn out_movi(&self, buf: &mut CodeBuffer, ty: Type, dst: u8, val: u64);

    /// Emit host load from memory [base + offset] into register.
    fn out_ld(&self, buf: &mut CodeBuffer, ty: Type, dst: u8, base: u8, offset: i64);

    /// Emit host store from register to memory [base + offset].
    fn out_st(&self, buf: &mut CodeBuffer, ty: Type, src: u8, base: u8, offset: i64);

    /// Emit host code for a single IR op. Called by the register
    /// allocator after inputs are loaded and outputs allocated.
    /// `oregs`/`iregs` are allocated host register numbers.
    /// `cargs` are raw constant values from the op's carg slots.
    fn out_op(
        &self,
        buf: &mut CodeBuffer,
        ctx: &Context,
        op: &Op,
        oregs: &[u8],
        iregs: &[u8],
        cargs: &[u32],
    );
}
