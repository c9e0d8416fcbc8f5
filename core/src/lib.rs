//! Intermediate representation for the PowerPC recompiler.
//!
//! A guest function is lowered into a [`Context`]: a list of
//! [`Segment`]s (basic blocks) holding IR [`Op`]s over typed temps.

pub mod context;
pub mod dump;
pub mod ir_builder;
pub mod label;
pub mod op;
pub mod opcode;
pub mod segment;
pub mod temp;
pub mod types;

pub use context::Context;
pub use ir_builder::FCmpMode;
pub use label::{Label, LabelUse, RelocKind};
pub use op::{LifeData, Op, MAX_OP_ARGS};
pub use opcode::{OpDef, OpFlags, Opcode, OPCODE_DEFS};
pub use segment::{Segment, SegmentId};
pub use temp::{Temp, TempIdx, TempKind};
pub use types::{Cond, MemOp, RegSet, TempVal, Type};
