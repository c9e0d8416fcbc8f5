//! PowerPC frontend: function boundary detection and lowering of
//! guest instructions into IR.
//!
//! The scanner ([`ppc::scan`]) finds the instruction ranges of a
//! function; [`ppc::lower_function`] then turns those ranges into
//! segments of IR ops ready for native code emission.

pub mod ppc;

pub use ppc::cpu::PpcState;
pub use ppc::scan::{
    FunctionBoundaryScanner, GuestRange, JumpTableHeuristic, NeighbourBranchHeuristic,
    ScanResult,
};
pub use ppc::{lower_function, LowerOptions};

use std::sync::Arc;

use thiserror::Error;

/// Read access to guest code plus the HLE oracle, provided by the
/// interpreter side of the emulator.
pub trait GuestCode {
    /// Big-endian instruction word at `addr`, or `None` when the
    /// address is not backed by guest memory.
    fn read_u32(&self, addr: u32) -> Option<u32>;

    /// Whether HLE handler `index` returns to its caller.
    fn handler_returns(&self, index: u32) -> bool;
}

impl<T: GuestCode + ?Sized> GuestCode for &T {
    fn read_u32(&self, addr: u32) -> Option<u32> {
        (**self).read_u32(addr)
    }

    fn handler_returns(&self, index: u32) -> bool {
        (**self).handler_returns(index)
    }
}

impl<T: GuestCode + ?Sized> GuestCode for Arc<T> {
    fn read_u32(&self, addr: u32) -> Option<u32> {
        (**self).read_u32(addr)
    }

    fn handler_returns(&self, index: u32) -> bool {
        (**self).handler_returns(index)
    }
}

/// Why a function could not be lowered. The compile attempt for the
/// function is abandoned as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("unsupported instruction {opcode:#010x} at {address:#010x}")]
    Unsupported { address: u32, opcode: u32 },
    #[error("instruction at {address:#010x} is not readable")]
    Unreadable { address: u32 },
    #[error("function at {address:#010x} has {insns} instructions, too many to lower")]
    TooLarge { address: u32, insns: u32 },
}
