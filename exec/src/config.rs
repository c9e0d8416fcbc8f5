use std::time::Duration;

use ppcrec_backend::code_buffer::DEFAULT_CODE_BUF_SIZE;
use ppcrec_frontend::LowerOptions;

/// End of the guest code area. Addresses at or above it are never
/// compiled and never tracked.
pub const DEFAULT_CODE_AREA_END: u32 = 0x1000_0000;

/// Runtime configuration of the recompiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Master switch. A disabled engine never compiles anything,
    /// ignores invalidations and reports every slot as unvisited.
    pub enabled: bool,
    /// Multiplying by +-0 yields +0 regardless of the other factor.
    pub accurate_multiply: bool,
    pub code_area_end: u32,
    /// When set, only entry addresses inside `[lo, hi]` are compiled.
    pub address_filter: Option<(u32, u32)>,
    /// Bytes of native code storage.
    pub code_cache_size: usize,
    /// Worker back-off while the request queue is empty.
    pub idle_sleep: Duration,
    pub cycles_per_instruction: i32,
    /// Start the background compiler thread on construction. Without
    /// it, queued requests are only compiled through
    /// [`Recompiler::process_queue`](crate::Recompiler::process_queue).
    pub spawn_worker: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            accurate_multiply: true,
            code_area_end: DEFAULT_CODE_AREA_END,
            address_filter: None,
            code_cache_size: DEFAULT_CODE_BUF_SIZE,
            idle_sleep: Duration::from_millis(1),
            cycles_per_instruction: 1,
            spawn_worker: true,
        }
    }
}

impl EngineConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_accurate_multiply(mut self, accurate: bool) -> Self {
        self.accurate_multiply = accurate;
        self
    }

    pub fn with_code_area_end(mut self, end: u32) -> Self {
        self.code_area_end = end;
        self
    }

    pub fn with_address_filter(mut self, lo: u32, hi: u32) -> Self {
        self.address_filter = Some((lo, hi));
        self
    }

    pub fn with_code_cache_size(mut self, size: usize) -> Self {
        self.code_cache_size = size;
        self
    }

    pub fn with_idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }

    pub fn with_cycles_per_instruction(mut self, cycles: i32) -> Self {
        self.cycles_per_instruction = cycles;
        self
    }

    pub fn with_spawn_worker(mut self, spawn: bool) -> Self {
        self.spawn_worker = spawn;
        self
    }

    /// Whether `addr` may be tracked at all.
    pub fn in_code_area(&self, addr: u32) -> bool {
        addr < self.code_area_end
    }

    /// Whether a function entered at `addr` may be compiled.
    pub fn passes_filter(&self, addr: u32) -> bool {
        match self.address_filter {
            Some((lo, hi)) => (lo..=hi).contains(&addr),
            None => true,
        }
    }

    pub fn lower_options(&self) -> LowerOptions {
        LowerOptions {
            accurate_multiply: self.accurate_multiply,
            cycles_per_instruction: self.cycles_per_instruction,
        }
    }
}
