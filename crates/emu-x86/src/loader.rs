//! ELF32 image loading.
//!
//! The core consumes only the entry point and the loaded-segment byte
//! image; symbol and string tables are irrelevant to execution and are not
//! retained.

use object::elf::FileHeader32;
use object::read::elf::{ElfFile, ProgramHeader};
use object::{Endianness, Object};
use thiserror::Error;

use crate::memory::MemoryBus;

/// Loader failures. All are user-recoverable: the monitor never starts
/// with a bad image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed ELF image: {0}")]
    Parse(#[from] object::read::Error),
    #[error("not an i386 executable")]
    WrongMachine,
    #[error("segment of {size:#x} bytes at {addr:#010x} does not fit in physical memory")]
    SegmentOutOfRange { addr: u64, size: u64 },
    #[error("segment data lies outside the file image")]
    Truncated,
}

/// Parse an ELF32 little-endian i386 executable, copy its loadable
/// segments into DRAM and return the entry point.
///
/// Segment bytes beyond the file image (BSS) stay zero, which DRAM
/// already guarantees.
pub fn load(data: &[u8], mem: &mut MemoryBus) -> Result<u32, LoadError> {
    let file = ElfFile::<FileHeader32<Endianness>>::parse(data)?;
    if file.architecture() != object::Architecture::I386 {
        return Err(LoadError::WrongMachine);
    }

    let endian = file.endian();
    for phdr in file.elf_program_headers() {
        if phdr.p_type(endian) != object::elf::PT_LOAD {
            continue;
        }
        let addr = u64::from(phdr.p_paddr(endian));
        let mem_size = u64::from(phdr.p_memsz(endian));
        if addr + mem_size > mem.size() as u64 {
            return Err(LoadError::SegmentOutOfRange {
                addr,
                size: mem_size,
            });
        }
        let bytes = phdr.data(endian, data).map_err(|()| LoadError::Truncated)?;
        mem.load_image(addr as u32, bytes);
        log::debug!(
            "segment: {:#010x} file {:#x} mem {:#x}",
            addr,
            bytes.len(),
            mem_size
        );
    }

    let entry = file.entry() as u32;
    log::info!("entry point {entry:#010x}");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::Bus;

    /// Hand-assemble a minimal ELF32 i386 executable: one loadable
    /// segment carrying `payload` at `vaddr`.
    fn tiny_elf(entry: u32, vaddr: u32, payload: &[u8]) -> Vec<u8> {
        let mut image = Vec::new();
        // ELF header (52 bytes)
        image.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]); // ident: ELF32 LSB
        image.extend_from_slice(&[0; 8]); // ident padding
        image.extend_from_slice(&2u16.to_le_bytes()); // e_type: EXEC
        image.extend_from_slice(&3u16.to_le_bytes()); // e_machine: EM_386
        image.extend_from_slice(&1u32.to_le_bytes()); // e_version
        image.extend_from_slice(&entry.to_le_bytes()); // e_entry
        image.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        image.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        image.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        image.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        image.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        // Program header (32 bytes)
        let offset = 52 + 32;
        image.extend_from_slice(&1u32.to_le_bytes()); // p_type: LOAD
        image.extend_from_slice(&(offset as u32).to_le_bytes()); // p_offset
        image.extend_from_slice(&vaddr.to_le_bytes()); // p_vaddr
        image.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
        image.extend_from_slice(&(payload.len() as u32).to_le_bytes()); // p_filesz
        image.extend_from_slice(&(payload.len() as u32).to_le_bytes()); // p_memsz
        image.extend_from_slice(&5u32.to_le_bytes()); // p_flags: R+X
        image.extend_from_slice(&4u32.to_le_bytes()); // p_align
        image.extend_from_slice(payload);
        image
    }

    #[test]
    fn loads_segments_and_returns_the_entry() {
        let elf = tiny_elf(0x10_0000, 0x10_0000, &[0xB8, 0x05, 0x00, 0x00, 0x00, 0xF4]);
        let mut mem = MemoryBus::with_size(2 * 1024 * 1024);
        let entry = load(&elf, &mut mem).expect("valid image");
        assert_eq!(entry, 0x10_0000);
        assert_eq!(mem.read(0x10_0000, 1), 0xB8);
        assert_eq!(mem.read(0x10_0005, 1), 0xF4);
    }

    #[test]
    fn rejects_the_wrong_machine() {
        let mut elf = tiny_elf(0x1000, 0x1000, &[0x90]);
        elf[18] = 0x3E; // e_machine: EM_X86_64
        let mut mem = MemoryBus::with_size(1024 * 1024);
        assert!(matches!(load(&elf, &mut mem), Err(LoadError::WrongMachine)));
    }

    #[test]
    fn rejects_segments_that_do_not_fit() {
        let elf = tiny_elf(0x1000, 0xFFFF_0000, &[0x90]);
        let mut mem = MemoryBus::with_size(1024 * 1024);
        assert!(matches!(
            load(&elf, &mut mem),
            Err(LoadError::SegmentOutOfRange { .. })
        ));
    }
}
