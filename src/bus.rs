//! Physical address decode
//!
//! The machine exposes exactly two mapped regions to the hart: guest RAM
//! and a single write-only console byte register. Everything else is open
//! bus. `Bus::decode` is the one place that enumerates the map, so the
//! console's side effect (writing to its sink) is visible right at the
//! address-decode site rather than hidden inside a generic byte-store path.
//!
//! ```text
//! [RAM_BASE, RAM_BASE + RAM_SIZE)   RAM
//! UART_BASE (single byte register)  console sink, write-only
//! everything else                   open bus: reads are 0, writes are dropped
//! ```

use std::fmt;
use std::io::Write;

use crate::memory::Ram;

/// Default physical address of the console output register.
pub const DEFAULT_UART_BASE: u64 = 0x1000_0000;

/// Which mapped region a physical address decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRegion {
    Ram,
    Console,
    OpenBus,
}

/// Address-map constants a [`Bus`] is built from.
///
/// Grouped separately from `Bus` so a caller embedding this crate as a
/// library can describe a non-default physical layout without touching
/// the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub ram_base: u64,
    pub ram_size: usize,
    pub uart_base: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_base: crate::memory::DEFAULT_RAM_BASE,
            ram_size: crate::memory::DEFAULT_RAM_SIZE,
            uart_base: DEFAULT_UART_BASE,
        }
    }
}

/// The machine's physical bus: RAM plus the one MMIO console register.
///
/// The console sink is an injectable `Write` rather than a hardcoded
/// `std::io::stdout()` call so the MMIO write path (§8 scenario 2) can be
/// exercised by a test without capturing the process's real stdout.
pub struct Bus {
    ram: Ram,
    uart_base: u64,
    console: Box<dyn Write + Send>,
}

impl Bus {
    /// Builds a bus with a freshly allocated, zero-filled RAM region and
    /// the console wired to the process's standard output.
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        Self::with_console(config, Box::new(std::io::stdout()))
    }

    /// Builds a bus whose console register writes to `console` instead of
    /// stdout. Used by tests to observe MMIO console output directly.
    #[must_use]
    pub fn with_console(config: MachineConfig, console: Box<dyn Write + Send>) -> Self {
        Self {
            ram: Ram::new(config.ram_base, config.ram_size),
            uart_base: config.uart_base,
            console,
        }
    }

    #[must_use]
    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    #[must_use]
    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    /// Decodes a physical address into the region it belongs to.
    #[must_use]
    pub fn decode(&self, addr: u64) -> AddressRegion {
        if self.ram.contains(addr) {
            AddressRegion::Ram
        } else if addr == self.uart_base {
            AddressRegion::Console
        } else {
            AddressRegion::OpenBus
        }
    }

    #[must_use]
    pub fn read_u8(&self, addr: u64) -> u8 {
        match self.decode(addr) {
            AddressRegion::Ram => self.ram.read_u8(addr),
            AddressRegion::Console | AddressRegion::OpenBus => 0,
        }
    }

    /// Writes a byte, emitting it to the console sink if it lands exactly
    /// on the console register's address.
    pub fn write_u8(&mut self, addr: u64, value: u8) {
        match self.decode(addr) {
            AddressRegion::Ram => self.ram.write_u8(addr, value),
            AddressRegion::Console => self.emit_console_byte(value),
            AddressRegion::OpenBus => {}
        }
    }

    #[must_use]
    pub fn read_u16(&self, addr: u64) -> u16 {
        let lo = u16::from(self.read_u8(addr));
        let hi = u16::from(self.read_u8(addr.wrapping_add(1)));
        lo | (hi << 8)
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) {
        self.write_u8(addr, value as u8);
        self.write_u8(addr.wrapping_add(1), (value >> 8) as u8);
    }

    #[must_use]
    pub fn read_u32(&self, addr: u64) -> u32 {
        let mut v = 0u32;
        for i in 0..4 {
            v |= u32::from(self.read_u8(addr.wrapping_add(i))) << (i * 8);
        }
        v
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) {
        for i in 0..4 {
            self.write_u8(addr.wrapping_add(i), (value >> (i * 8)) as u8);
        }
    }

    #[must_use]
    pub fn read_u64(&self, addr: u64) -> u64 {
        let mut v = 0u64;
        for i in 0..8 {
            v |= u64::from(self.read_u8(addr.wrapping_add(i))) << (i * 8);
        }
        v
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) {
        for i in 0..8 {
            self.write_u8(addr.wrapping_add(i), (value >> (i * 8)) as u8);
        }
    }

    fn emit_console_byte(&mut self, value: u8) {
        let _ = self.console.write_all(&[value]);
        let _ = self.console.flush();
        log::debug!("console: wrote byte {value:#04x} ({:?})", value as char);
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("ram", &self.ram)
            .field("uart_base", &format_args!("{:#x}", self.uart_base))
            .finish_non_exhaustive()
    }
}
