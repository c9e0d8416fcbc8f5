use std::io;
use std::ptr;
use std::slice;

/// Default code cache size: 64 MiB.
pub const DEFAULT_CODE_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Append-only native code storage in one RWX mapping.
///
/// The mapping never moves: the compiler thread appends functions
/// while guest threads run functions committed earlier. A failed
/// emission rolls the write offset back with [`CodeBuffer::truncate`].
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    offset: usize,
}

// SAFETY: the mapping is owned exclusively by the buffer.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Map `size` bytes, rounded up to whole pages.
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1).next_multiple_of(page_size());
        // SAFETY: anonymous private mapping, no file backing.
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: mem.cast(),
            size,
            offset: 0,
        })
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    #[inline]
    pub fn has_room(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr
    }

    #[inline]
    pub fn ptr_at(&self, offset: usize) -> *const u8 {
        assert!(offset <= self.size);
        // SAFETY: in bounds of the mapping.
        unsafe { self.ptr.add(offset) }
    }

    /// Forget everything written from `offset` on.
    #[inline]
    pub fn truncate(&mut self, offset: usize) {
        assert!(offset <= self.offset);
        self.offset = offset;
    }

    #[inline]
    pub fn emit_bytes(&mut self, data: &[u8]) {
        assert!(data.len() <= self.remaining(), "code buffer overflow");
        // SAFETY: bounds checked above; `data` cannot alias the mapping
        // mutably.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(self.offset), data.len());
        }
        self.offset += data.len();
    }

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.emit_bytes(&[val]);
    }

    #[inline]
    pub fn emit_u16(&mut self, val: u16) {
        self.emit_bytes(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.emit_bytes(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.emit_bytes(&val.to_le_bytes());
    }

    /// Overwrite already emitted bytes, e.g. a branch displacement.
    fn patch_bytes(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.offset, "patch past end of code");
        // SAFETY: the patched bytes were emitted before.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }
    }

    #[inline]
    pub fn patch_u8(&mut self, offset: usize, val: u8) {
        self.patch_bytes(offset, &[val]);
    }

    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        self.patch_bytes(offset, &val.to_le_bytes());
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let bytes = &self.as_slice()[offset..offset + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Everything emitted so far.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the first `offset` bytes have been written.
        unsafe { slice::from_raw_parts(self.ptr, self.offset) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`size` describe the mapping created in `new`.
        unsafe { libc::munmap(self.ptr.cast(), self.size) };
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
