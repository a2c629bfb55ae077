//! 64-bit little-endian object-file loader
//!
//! Parses just enough of an ELF64-shaped header and program-header table to
//! place `PT_LOAD` segments into guest RAM and recover the entry point.
//! Parsed by hand, field by field, rather than through a general-purpose
//! ELF crate: the format here is a fixed subset (no relocations, no
//! dynamic linking, section headers are never consulted) and the failure
//! modes this emulator must surface (bad magic, wrong class, wrong
//! machine, segment out of range) are easier to keep bit-exact against
//! §4.5 as direct field reads than to recover from a general parser's
//! richer error surface.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::bus::Bus;
use crate::error::LoadError;

const EI_MAG: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const EM_RISCV: u16 = 0xF3;
const PT_LOAD: u32 = 1;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

fn read_u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn read_u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64_le(b: &[u8]) -> u64 {
    u64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ])
}

struct Ehdr {
    machine: u16,
    entry: u64,
    phoff: u64,
    phnum: u16,
}

fn parse_ehdr(buf: &[u8; EHDR_SIZE]) -> Result<Ehdr, LoadError> {
    if buf[0..4] != EI_MAG {
        return Err(LoadError::BadMagic);
    }
    if buf[4] != ELFCLASS64 {
        return Err(LoadError::UnsupportedClass(buf[4]));
    }
    let machine = read_u16_le(&buf[18..20]);
    if machine != EM_RISCV {
        return Err(LoadError::WrongMachine(machine));
    }
    Ok(Ehdr {
        machine,
        entry: read_u64_le(&buf[24..32]),
        phoff: read_u64_le(&buf[32..40]),
        phnum: read_u16_le(&buf[56..58]),
    })
}

struct Phdr {
    p_type: u32,
    offset: u64,
    vaddr: u64,
    paddr: u64,
    filesz: u64,
    memsz: u64,
}

fn parse_phdr(buf: &[u8; PHDR_SIZE]) -> Phdr {
    Phdr {
        p_type: read_u32_le(&buf[0..4]),
        offset: read_u64_le(&buf[8..16]),
        vaddr: read_u64_le(&buf[16..24]),
        paddr: read_u64_le(&buf[24..32]),
        filesz: read_u64_le(&buf[32..40]),
        memsz: read_u64_le(&buf[40..48]),
    }
}

/// Loads `path` into `bus`'s RAM and returns the architectural entry address.
pub fn load(path: &Path, bus: &mut Bus) -> Result<u64, LoadError> {
    let mut file = File::open(path)?;

    let mut ehdr_buf = [0u8; EHDR_SIZE];
    file.read_exact(&mut ehdr_buf)?;
    let ehdr = parse_ehdr(&ehdr_buf)?;
    log::debug!(
        "elf: machine={:#x} entry={:#x} phoff={:#x} phnum={}",
        ehdr.machine,
        ehdr.entry,
        ehdr.phoff,
        ehdr.phnum
    );

    file.seek(SeekFrom::Start(ehdr.phoff))?;

    for i in 0..ehdr.phnum {
        let mut phdr_buf = [0u8; PHDR_SIZE];
        file.read_exact(&mut phdr_buf)?;
        let phdr = parse_phdr(&phdr_buf);

        if phdr.p_type != PT_LOAD || phdr.memsz == 0 {
            continue;
        }

        let dst = if phdr.paddr != 0 { phdr.paddr } else { phdr.vaddr };
        let ram_base = bus.ram().base();
        let ram_size = bus.ram().size() as u64;
        let end = dst
            .checked_add(phdr.memsz)
            .ok_or(LoadError::SegmentOutOfRange { dst, memsz: phdr.memsz })?;
        if dst < ram_base || end > ram_base + ram_size {
            return Err(LoadError::SegmentOutOfRange { dst, memsz: phdr.memsz });
        }

        bus.ram_mut().zero_fill(dst, phdr.memsz);

        if phdr.filesz > 0 {
            let mut data = vec![0u8; phdr.filesz as usize];
            let saved_pos = file.stream_position()?;
            file.seek(SeekFrom::Start(phdr.offset))?;
            file.read_exact(&mut data)?;
            file.seek(SeekFrom::Start(saved_pos))?;
            bus.ram_mut().write_bytes(dst, &data);
        }

        log::debug!(
            "elf: segment #{i} loaded at {dst:#x} (filesz={:#x} memsz={:#x})",
            phdr.filesz,
            phdr.memsz
        );
    }

    Ok(ehdr.entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MachineConfig;
    use std::io::Write as _;

    fn test_bus() -> Bus {
        Bus::new(MachineConfig {
            ram_base: 0x8000_0000,
            ram_size: 0x1000,
            uart_base: 0x1000_0000,
        })
    }

    /// Builds a minimal one-segment ELF64/RISC-V image: a 64-byte ehdr
    /// followed immediately by one 56-byte phdr, followed by the payload.
    fn build_image(machine: u16, class: u8, paddr: u64, payload: &[u8]) -> Vec<u8> {
        let phoff: u64 = EHDR_SIZE as u64;
        let data_off: u64 = phoff + PHDR_SIZE as u64;

        let mut ehdr = vec![0u8; EHDR_SIZE];
        ehdr[0..4].copy_from_slice(&EI_MAG);
        ehdr[4] = class;
        ehdr[18..20].copy_from_slice(&machine.to_le_bytes());
        ehdr[24..32].copy_from_slice(&paddr.to_le_bytes()); // entry == paddr for the test
        ehdr[32..40].copy_from_slice(&phoff.to_le_bytes());
        ehdr[56..58].copy_from_slice(&1u16.to_le_bytes()); // phnum = 1

        let mut phdr = vec![0u8; PHDR_SIZE];
        phdr[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
        phdr[8..16].copy_from_slice(&data_off.to_le_bytes());
        phdr[16..24].copy_from_slice(&paddr.to_le_bytes()); // vaddr
        phdr[24..32].copy_from_slice(&paddr.to_le_bytes()); // paddr
        phdr[32..40].copy_from_slice(&(payload.len() as u64).to_le_bytes()); // filesz
        phdr[40..48].copy_from_slice(&(payload.len() as u64 + 16).to_le_bytes()); // memsz (extra BSS)

        let mut image = ehdr;
        image.extend_from_slice(&phdr);
        image.extend_from_slice(payload);
        image
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn loads_segment_and_zero_fills_bss() {
        let mut bus = test_bus();
        let image = build_image(EM_RISCV, ELFCLASS64, 0x8000_0000, b"\x01\x02\x03\x04");
        let f = write_temp(&image);
        let entry = load(f.path(), &mut bus).unwrap();
        assert_eq!(entry, 0x8000_0000);
        assert_eq!(bus.ram().read_u32(0x8000_0000), 0x0403_0201);
        // BSS tail beyond filesz must read as zero.
        assert_eq!(bus.ram().read_u8(0x8000_0010), 0);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bus = test_bus();
        let mut image = build_image(EM_RISCV, ELFCLASS64, 0x8000_0000, b"\x00");
        image[0] = 0x00;
        let f = write_temp(&image);
        assert!(matches!(load(f.path(), &mut bus), Err(LoadError::BadMagic)));
    }

    #[test]
    fn rejects_wrong_class() {
        let mut bus = test_bus();
        let image = build_image(EM_RISCV, 1, 0x8000_0000, b"\x00");
        let f = write_temp(&image);
        assert!(matches!(
            load(f.path(), &mut bus),
            Err(LoadError::UnsupportedClass(1))
        ));
    }

    #[test]
    fn rejects_wrong_machine() {
        let mut bus = test_bus();
        let image = build_image(0x03, ELFCLASS64, 0x8000_0000, b"\x00");
        let f = write_temp(&image);
        assert!(matches!(
            load(f.path(), &mut bus),
            Err(LoadError::WrongMachine(0x03))
        ));
    }

    #[test]
    fn rejects_segment_outside_ram() {
        let mut bus = test_bus();
        let image = build_image(EM_RISCV, ELFCLASS64, 0x1000_0000, b"\x01\x02");
        let f = write_temp(&image);
        assert!(matches!(
            load(f.path(), &mut bus),
            Err(LoadError::SegmentOutOfRange { .. })
        ));
    }
}
