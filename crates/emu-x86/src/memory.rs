//! The machine's memory interface.
//!
//! Guest linear addresses map identically onto physical addresses, then go
//! through the cache hierarchy. Instruction fetch uses the same path as
//! data. An access outside physical memory is fatal, enforced at the DRAM
//! edge.

use emu_core::Bus;

use crate::cache::CacheHierarchy;
use crate::dram::Dram;

/// Default physical memory size: 128 MiB.
pub const DRAM_SIZE: usize = 128 * 1024 * 1024;

/// DRAM behind the two-level cache, as seen by the CPU.
pub struct MemoryBus {
    dram: Dram,
    cache: CacheHierarchy,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Create a bus with the default memory size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(DRAM_SIZE)
    }

    /// Create a bus with a custom memory size (tests use small ones).
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            dram: Dram::new(size),
            cache: CacheHierarchy::new(),
        }
    }

    /// Physical memory size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.dram.len()
    }

    /// Place a byte image directly into DRAM, bypassing the caches. Only
    /// meaningful before execution starts.
    pub fn load_image(&mut self, addr: u32, bytes: &[u8]) {
        self.dram.load(addr, bytes);
    }

    /// Invalidate the caches and reseed the replacement LCG.
    pub fn reset_cache(&mut self) {
        self.cache.reset();
    }
}

impl Bus for MemoryBus {
    fn read(&mut self, addr: u32, len: u32) -> u32 {
        self.cache.read(&mut self.dram, addr, len)
    }

    fn write(&mut self, addr: u32, len: u32, value: u32) {
        self.cache.write(&mut self.dram, addr, len, value);
    }
}
