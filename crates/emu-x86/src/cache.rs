//! Two-level cache in front of DRAM.
//!
//! L1 is write-through and never allocates on a write; L2 is write-back
//! with write-allocate. Both use 64-byte blocks and random victim
//! selection from one shared linear congruential generator, reseeded on
//! reset so runs are reproducible. Multi-byte accesses iterate per byte,
//! so nothing ever straddles a block internally.
//!
//! L1 stays a subset of L2: every L1 fill reads through L2, and every
//! write goes to L2, so an L1 line can never hold bytes L2 has dropped
//! ahead of it.

use crate::dram::Dram;

/// Block size shared by both levels.
pub const BLOCK_SIZE: usize = 64;
const BLOCK_BITS: u32 = BLOCK_SIZE.trailing_zeros();
const BLOCK_MASK: u32 = BLOCK_SIZE as u32 - 1;

/// L1: 64 KiB, 8-way.
pub const L1_WAYS: usize = 8;
pub const L1_SETS: usize = (64 * 1024) / BLOCK_SIZE / L1_WAYS;
const L1_SET_BITS: u32 = L1_SETS.trailing_zeros();

/// L2: 4 MiB, 16-way.
pub const L2_WAYS: usize = 16;
pub const L2_SETS: usize = (4 * 1024 * 1024) / BLOCK_SIZE / L2_WAYS;
const L2_SET_BITS: u32 = L2_SETS.trailing_zeros();

/// The replacement LCG. Seeded to 1 on reset; advanced only when a victim
/// is actually chosen at random, so fill order stays deterministic.
#[derive(Debug, Clone, Copy)]
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        self.0
    }
}

#[derive(Clone, Copy)]
struct L1Line {
    tag: u32,
    valid: bool,
    data: [u8; BLOCK_SIZE],
}

impl L1Line {
    const EMPTY: Self = Self {
        tag: 0,
        valid: false,
        data: [0; BLOCK_SIZE],
    };
}

#[derive(Clone, Copy)]
struct L2Line {
    tag: u32,
    valid: bool,
    dirty: bool,
    data: [u8; BLOCK_SIZE],
}

impl L2Line {
    const EMPTY: Self = Self {
        tag: 0,
        valid: false,
        dirty: false,
        data: [0; BLOCK_SIZE],
    };
}

/// L1 over L2 over DRAM. The hierarchy presents the same read/write
/// semantics as DRAM itself.
pub struct CacheHierarchy {
    l1: Box<[[L1Line; L1_WAYS]]>,
    l2: Box<[[L2Line; L2_WAYS]]>,
    rand: Lcg,
}

impl Default for CacheHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheHierarchy {
    /// Create an empty hierarchy with the LCG at its seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            l1: vec![[L1Line::EMPTY; L1_WAYS]; L1_SETS].into_boxed_slice(),
            l2: vec![[L2Line::EMPTY; L2_WAYS]; L2_SETS].into_boxed_slice(),
            rand: Lcg(1),
        }
    }

    /// Invalidate every line and reseed the LCG.
    ///
    /// Dirty L2 data is dropped, not written back; reset is for starting a
    /// fresh run, not for flushing.
    pub fn reset(&mut self) {
        for set in &mut self.l1 {
            for line in set {
                line.valid = false;
            }
        }
        for set in &mut self.l2 {
            for line in set {
                line.valid = false;
                line.dirty = false;
            }
        }
        self.rand = Lcg(1);
    }

    /// Read `len` bytes (1, 2 or 4), little-endian, through the hierarchy.
    pub fn read(&mut self, dram: &mut Dram, addr: u32, len: u32) -> u32 {
        debug_assert!(matches!(len, 1 | 2 | 4));
        let mut value = 0;
        for i in 0..len {
            value |= u32::from(self.l1_read_byte(dram, addr + i)) << (i * 8);
        }
        value
    }

    /// Write the low `len` bytes of `value` through the hierarchy.
    pub fn write(&mut self, dram: &mut Dram, addr: u32, len: u32, value: u32) {
        debug_assert!(matches!(len, 1 | 2 | 4));
        for i in 0..len {
            let byte = (value >> (i * 8)) as u8;
            self.l1_update_byte(addr + i, byte);
            self.l2_write_byte(dram, addr + i, byte);
        }
    }

    // ================================================================
    // L1
    // ================================================================

    fn l1_read_byte(&mut self, dram: &mut Dram, addr: u32) -> u8 {
        let set = l1_set(addr);
        let tag = l1_tag(addr);
        let offset = (addr & BLOCK_MASK) as usize;

        if let Some(way) = find_way(self.l1[set].iter().map(|l| (l.valid, l.tag)), tag) {
            return self.l1[set][way].data[offset];
        }

        let way = select_way(
            &mut self.rand,
            self.l1[set].iter().map(|l| (l.valid, l.tag)),
            tag,
            L1_WAYS,
        );
        let block_addr = addr & !BLOCK_MASK;
        let mut data = [0u8; BLOCK_SIZE];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = self.l2_read_byte(dram, block_addr + i as u32);
        }
        let line = &mut self.l1[set][way];
        line.data = data;
        line.tag = tag;
        line.valid = true;
        line.data[offset]
    }

    /// Write-through without allocation: update the byte only if the line
    /// is already present. The caller forwards the write to L2 regardless.
    fn l1_update_byte(&mut self, addr: u32, byte: u8) {
        let set = l1_set(addr);
        let tag = l1_tag(addr);
        if let Some(way) = find_way(self.l1[set].iter().map(|l| (l.valid, l.tag)), tag) {
            self.l1[set][way].data[(addr & BLOCK_MASK) as usize] = byte;
        }
    }

    // ================================================================
    // L2
    // ================================================================

    fn l2_read_byte(&mut self, dram: &mut Dram, addr: u32) -> u8 {
        let set = l2_set(addr);
        let tag = l2_tag(addr);
        let way = match find_way(self.l2[set].iter().map(|l| (l.valid, l.tag)), tag) {
            Some(way) => way,
            None => self.l2_fill(dram, addr),
        };
        self.l2[set][way].data[(addr & BLOCK_MASK) as usize]
    }

    /// Fetch-on-write with allocation, then mark the line dirty.
    fn l2_write_byte(&mut self, dram: &mut Dram, addr: u32, byte: u8) {
        let set = l2_set(addr);
        let tag = l2_tag(addr);
        let way = match find_way(self.l2[set].iter().map(|l| (l.valid, l.tag)), tag) {
            Some(way) => way,
            None => self.l2_fill(dram, addr),
        };
        let line = &mut self.l2[set][way];
        line.data[(addr & BLOCK_MASK) as usize] = byte;
        line.dirty = true;
    }

    /// Choose a victim, write it back if dirty, and fill the block for
    /// `addr` from DRAM. Returns the way filled.
    fn l2_fill(&mut self, dram: &mut Dram, addr: u32) -> usize {
        let set = l2_set(addr);
        let tag = l2_tag(addr);
        let way = select_way(
            &mut self.rand,
            self.l2[set].iter().map(|l| (l.valid, l.tag)),
            tag,
            L2_WAYS,
        );

        let line = &mut self.l2[set][way];
        if line.valid && line.dirty {
            let victim_addr =
                (line.tag << (BLOCK_BITS + L2_SET_BITS)) | ((set as u32) << BLOCK_BITS);
            for i in (0..BLOCK_SIZE).step_by(4) {
                let mut word = 0u32;
                for b in 0..4 {
                    word |= u32::from(line.data[i + b]) << (b * 8);
                }
                dram.write(victim_addr + i as u32, 4, word);
            }
        }

        let block_addr = addr & !BLOCK_MASK;
        for i in (0..BLOCK_SIZE).step_by(4) {
            let word = dram.read(block_addr + i as u32, 4);
            for b in 0..4 {
                line.data[i + b] = (word >> (b * 8)) as u8;
            }
        }
        line.tag = tag;
        line.valid = true;
        line.dirty = false;
        way
    }
}

/// Victim selection: a matching valid way if any, else the first invalid
/// way, else a random one from the shared LCG.
fn select_way(
    rand: &mut Lcg,
    lines: impl Iterator<Item = (bool, u32)>,
    tag: u32,
    ways: usize,
) -> usize {
    let mut invalid = None;
    for (way, (valid, line_tag)) in lines.enumerate() {
        if valid && line_tag == tag {
            return way;
        }
        if !valid && invalid.is_none() {
            invalid = Some(way);
        }
    }
    invalid.unwrap_or_else(|| (rand.next() as usize) % ways)
}

/// First matching valid way, if any.
fn find_way(lines: impl Iterator<Item = (bool, u32)>, tag: u32) -> Option<usize> {
    lines
        .enumerate()
        .find(|&(_, (valid, line_tag))| valid && line_tag == tag)
        .map(|(way, _)| way)
}

fn l1_set(addr: u32) -> usize {
    ((addr >> BLOCK_BITS) & (L1_SETS as u32 - 1)) as usize
}

fn l1_tag(addr: u32) -> u32 {
    addr >> (BLOCK_BITS + L1_SET_BITS)
}

fn l2_set(addr: u32) -> usize {
    ((addr >> BLOCK_BITS) & (L2_SETS as u32 - 1)) as usize
}

fn l2_tag(addr: u32) -> u32 {
    addr >> (BLOCK_BITS + L2_SET_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_dram() -> Dram {
        Dram::new(32 * 1024 * 1024)
    }

    #[test]
    fn reads_and_writes_are_transparent_over_dram() {
        let mut dram = small_dram();
        let mut shadow = vec![0u8; 32 * 1024 * 1024];
        let mut cache = CacheHierarchy::new();

        // A deterministic pseudo-random access pattern: mixed widths,
        // block-straddling addresses, repeated hot lines.
        let mut x: u32 = 0x1234_5678;
        let step = |x: &mut u32| {
            *x ^= *x << 13;
            *x ^= *x >> 17;
            *x ^= *x << 5;
            *x
        };
        for i in 0..20_000u32 {
            let addr = step(&mut x) % (31 * 1024 * 1024);
            let len = [1u32, 2, 4][(step(&mut x) % 3) as usize];
            if i % 3 == 0 {
                let val = step(&mut x);
                cache.write(&mut dram, addr, len, val);
                for b in 0..len {
                    shadow[(addr + b) as usize] = (val >> (b * 8)) as u8;
                }
            } else {
                let got = cache.read(&mut dram, addr, len);
                let mut want = 0u32;
                for b in 0..len {
                    want |= u32::from(shadow[(addr + b) as usize]) << (b * 8);
                }
                assert_eq!(got, want, "read {len} at {addr:#x}");
            }
        }
    }

    #[test]
    fn write_hits_l2_even_when_l1_misses() {
        let mut dram = small_dram();
        let mut cache = CacheHierarchy::new();
        // No prior read: L1 has no line, so the write only lands in L2.
        cache.write(&mut dram, 0x10_0000, 1, 0xAB);
        assert_eq!(cache.read(&mut dram, 0x10_0000, 1), 0xAB);
        // The L2 line is dirty; DRAM still holds the old byte.
        assert_eq!(dram.read(0x10_0000, 1), 0);
    }

    #[test]
    fn value_survives_l1_eviction_via_l2() {
        let mut dram = small_dram();
        let mut cache = CacheHierarchy::new();
        cache.write(&mut dram, 0x10_0000, 1, 0xAB);
        assert_eq!(cache.read(&mut dram, 0x10_0000, 1), 0xAB);

        // Stream more than an L1's worth of reads to push the line out.
        for addr in (0x20_0000..0x21_0400).step_by(BLOCK_SIZE) {
            let _ = cache.read(&mut dram, addr, 1);
        }

        assert_eq!(cache.read(&mut dram, 0x10_0000, 1), 0xAB);
    }

    #[test]
    fn dirty_eviction_writes_the_block_back() {
        let mut dram = small_dram();
        let mut cache = CacheHierarchy::new();

        // 17 blocks mapping to the same L2 set (stride = sets * block).
        let stride = (L2_SETS * BLOCK_SIZE) as u32;
        let base = 0x4000;

        // Writes allocate: the first 16 occupy every way in fill order
        // without consuming the LCG, each left dirty.
        for t in 0..16u32 {
            cache.write(&mut dram, base + t * stride, 1, 0xC0 + t);
        }
        for t in 0..16u32 {
            assert_eq!(dram.read(base + t * stride, 1), 0, "still cached only");
        }

        // The 17th conflict consumes the first LCG draw:
        // (1 * 1103515245 + 12345) % 16 == 6, so way 6 (the t=6 block)
        // is evicted and written back.
        cache.write(&mut dram, base + 16 * stride, 1, 0xFF);
        assert_eq!(dram.read(base + 6 * stride, 1), 0xC6);
        assert_eq!(dram.read(base, 1), 0, "way 0 still resident");

        // The evicted block is refetched correctly from DRAM afterwards.
        assert_eq!(cache.read(&mut dram, base + 6 * stride, 1), 0xC6);
    }

    #[test]
    fn reset_restores_determinism() {
        let mut dram = small_dram();
        let mut cache = CacheHierarchy::new();

        let run = |cache: &mut CacheHierarchy, dram: &mut Dram| {
            let stride = (L2_SETS * BLOCK_SIZE) as u32;
            let mut out = Vec::new();
            for t in 0..40u32 {
                cache.write(dram, t * stride, 1, t);
                out.push(cache.read(dram, (t / 2) * stride, 1));
            }
            out
        };

        let first = run(&mut cache, &mut dram);
        cache.reset();
        // Zero DRAM back out for an identical starting state.
        let mut dram2 = small_dram();
        let second = run(&mut cache, &mut dram2);
        assert_eq!(first, second);
    }
}
