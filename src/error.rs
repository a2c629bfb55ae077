//! Load-time error types
//!
//! Architectural traps are not represented here — they are ordinary
//! successful returns from [`crate::cpu::Hart::step`] that happen to have
//! updated `scause`/`sepc`/`stval`/`pc` (see §7 of the design notes). This
//! type covers only the failures that can occur before the hart ever runs:
//! a malformed object file or a host I/O failure while reading it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not an ELF64 file (bad magic)")]
    BadMagic,
    #[error("unsupported ELF class {0} (expected 2, 64-bit)")]
    UnsupportedClass(u8),
    #[error("wrong machine type {0:#06x} (expected 0xf3, RISC-V)")]
    WrongMachine(u16),
    #[error("segment at {dst:#018x} (memsz={memsz:#x}) is outside RAM")]
    SegmentOutOfRange { dst: u64, memsz: u64 },
    #[error("I/O error loading object file: {0}")]
    Io(#[from] std::io::Error),
}
