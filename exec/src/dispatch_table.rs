use std::io;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// Guest bytes covered by one lazily mapped block of slots.
pub const BLOCK_GUEST_SIZE: u32 = 0x10_0000;

const SLOTS_PER_BLOCK: usize = (BLOCK_GUEST_SIZE / 4) as usize;
const BLOCK_BYTES: usize = SLOTS_PER_BLOCK * std::mem::size_of::<AtomicUsize>();

const RAW_UNVISITED: usize = 0;
const RAW_VISITED: usize = 1;

/// Address of native code a guest address can be entered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeEntry(usize);

impl NativeEntry {
    /// Wrap a native code pointer. Returns `None` for values that
    /// collide with the sentinels.
    pub fn new(ptr: *const u8) -> Option<Self> {
        let raw = ptr as usize;
        (raw > RAW_VISITED).then_some(Self(raw))
    }

    /// Wrap a pointer into the code cache, which never hands out the
    /// sentinel values.
    pub(crate) fn from_code(ptr: *const u8) -> Self {
        debug_assert!(ptr as usize > RAW_VISITED);
        Self(ptr as usize)
    }

    pub fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }
}

/// State of one 4-byte guest address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchSlot {
    Unvisited,
    /// Queued for compilation, not yet resolved.
    Visited,
    Compiled(NativeEntry),
}

impl DispatchSlot {
    fn to_raw(self) -> usize {
        match self {
            DispatchSlot::Unvisited => RAW_UNVISITED,
            DispatchSlot::Visited => RAW_VISITED,
            DispatchSlot::Compiled(e) => e.0,
        }
    }

    fn from_raw(raw: usize) -> Self {
        match raw {
            RAW_UNVISITED => DispatchSlot::Unvisited,
            RAW_VISITED => DispatchSlot::Visited,
            p => DispatchSlot::Compiled(NativeEntry(p)),
        }
    }

    pub fn is_compiled(self) -> bool {
        matches!(self, DispatchSlot::Compiled(_))
    }
}

/// Write capability for a [`DispatchTable`].
///
/// Exactly one exists per table. The engine keeps it inside its
/// mutex-guarded state, so holding `&mut TableWriter` proves the
/// global compilation lock is held.
#[derive(Debug)]
pub struct TableWriter {
    table_id: usize,
}

/// Guest address to native code map.
///
/// Reads are lock-free. Backing memory is mapped per
/// [`BLOCK_GUEST_SIZE`] block on the first write into the block;
/// fresh mappings are zero-filled, which is the `Unvisited` encoding.
pub struct DispatchTable {
    blocks: Box<[AtomicPtr<AtomicUsize>]>,
    /// One bit per mapped block.
    allocated: Box<[AtomicU64]>,
    code_area_end: u32,
}

// SAFETY:
// - Block pointers are published with Release after the mapping is
//   complete and are only unmapped in Drop, when no reader exists.
// - Slot cells are atomics; writers are serialized by TableWriter.
unsafe impl Sync for DispatchTable {}
unsafe impl Send for DispatchTable {}

impl DispatchTable {
    /// Create an empty table covering `[0, code_area_end)` and its
    /// single writer handle. No slot memory is mapped yet.
    pub fn new(code_area_end: u32) -> (Self, TableWriter) {
        let nb_blocks = (code_area_end as usize).div_ceil(BLOCK_GUEST_SIZE as usize);
        let blocks = (0..nb_blocks)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let allocated = (0..nb_blocks.div_ceil(64))
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let table = Self {
            blocks,
            allocated,
            code_area_end,
        };
        let writer = TableWriter {
            table_id: table.id(),
        };
        (table, writer)
    }

    fn id(&self) -> usize {
        self.blocks.as_ptr() as usize
    }

    pub fn code_area_end(&self) -> u32 {
        self.code_area_end
    }

    #[inline]
    fn locate(&self, addr: u32) -> Option<(usize, usize)> {
        if addr >= self.code_area_end {
            return None;
        }
        let block = (addr / BLOCK_GUEST_SIZE) as usize;
        let slot = ((addr % BLOCK_GUEST_SIZE) / 4) as usize;
        Some((block, slot))
    }

    /// Current state of `addr`. Never blocks.
    #[inline]
    pub fn read(&self, addr: u32) -> DispatchSlot {
        let Some((block, slot)) = self.locate(addr) else {
            return DispatchSlot::Unvisited;
        };
        let base = self.blocks[block].load(Ordering::Acquire);
        if base.is_null() {
            return DispatchSlot::Unvisited;
        }
        // SAFETY: a non-null block holds SLOTS_PER_BLOCK initialized
        // cells and stays mapped for the lifetime of the table.
        let raw = unsafe { (*base.add(slot)).load(Ordering::Acquire) };
        DispatchSlot::from_raw(raw)
    }

    /// Set the state of `addr`. Addresses outside the code area are
    /// ignored, as are `Unvisited` writes into unmapped blocks.
    pub fn write(
        &self,
        writer: &mut TableWriter,
        addr: u32,
        state: DispatchSlot,
    ) -> io::Result<()> {
        debug_assert_eq!(writer.table_id, self.id(), "writer belongs to another table");
        let Some((block, slot)) = self.locate(addr) else {
            return Ok(());
        };
        let mut base = self.blocks[block].load(Ordering::Acquire);
        if base.is_null() {
            if state == DispatchSlot::Unvisited {
                return Ok(());
            }
            base = self.map_block(block)?;
        }
        // SAFETY: see `read`.
        unsafe { (*base.add(slot)).store(state.to_raw(), Ordering::Release) };
        Ok(())
    }

    /// Reset every slot in `[start, end)` to `Unvisited`. Unmapped
    /// blocks already read as unvisited and stay unmapped.
    pub fn reset_range(&self, writer: &mut TableWriter, start: u32, end: u32) {
        debug_assert_eq!(writer.table_id, self.id(), "writer belongs to another table");
        let end = end.min(self.code_area_end) as u64;
        let mut addr = (start & !3) as u64;
        while addr < end {
            if let Some((block, slot)) = self.locate(addr as u32) {
                let base = self.blocks[block].load(Ordering::Acquire);
                if base.is_null() {
                    // skip to the next block
                    addr = (block as u64 + 1) * BLOCK_GUEST_SIZE as u64;
                    continue;
                }
                // SAFETY: see `read`.
                unsafe { (*base.add(slot)).store(RAW_UNVISITED, Ordering::Release) };
            }
            addr += 4;
        }
    }

    /// Map the backing memory of `block`. Check, map, then recheck:
    /// if another mapping won, ours is released.
    fn map_block(&self, block: usize) -> io::Result<*mut AtomicUsize> {
        let current = self.blocks[block].load(Ordering::Acquire);
        if !current.is_null() {
            return Ok(current);
        }
        // SAFETY: anonymous private mapping, no file backing.
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                BLOCK_BYTES,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let fresh = mem as *mut AtomicUsize;
        match self.blocks[block].compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.allocated[block / 64].fetch_or(1 << (block % 64), Ordering::Release);
                Ok(fresh)
            }
            Err(winner) => {
                // SAFETY: `mem` was mapped above and never published.
                unsafe { libc::munmap(mem, BLOCK_BYTES) };
                Ok(winner)
            }
        }
    }

    /// Whether the block containing `addr` has backing memory.
    pub fn is_mapped(&self, addr: u32) -> bool {
        match self.locate(addr) {
            Some((block, _)) => {
                self.allocated[block / 64].load(Ordering::Acquire) & (1 << (block % 64)) != 0
            }
            None => false,
        }
    }

    /// Number of blocks with backing memory.
    pub fn mapped_blocks(&self) -> usize {
        self.allocated
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Reset every slot to `Unvisited`. Mapped blocks stay mapped
    /// until the table is dropped, so concurrent readers never touch
    /// released memory.
    pub fn reset_all(&self, writer: &mut TableWriter) {
        debug_assert_eq!(writer.table_id, self.id(), "writer belongs to another table");
        for cell in self.blocks.iter() {
            let base = cell.load(Ordering::Acquire);
            if base.is_null() {
                continue;
            }
            for slot in 0..SLOTS_PER_BLOCK {
                // SAFETY: see `read`.
                unsafe { (*base.add(slot)).store(RAW_UNVISITED, Ordering::Release) };
            }
        }
    }
}

impl Drop for DispatchTable {
    fn drop(&mut self) {
        for cell in self.blocks.iter_mut() {
            let base = *cell.get_mut();
            if !base.is_null() {
                // SAFETY: exclusive access in drop; the block was
                // mapped by `map_block` with BLOCK_BYTES.
                unsafe { libc::munmap(base as *mut libc::c_void, BLOCK_BYTES) };
            }
        }
    }
}
