//! Top-level driver: wires a [`Bus`] and a [`Hart`] together and runs the
//! bounded fetch-execute loop described in §5.
//!
//! `Machine` itself has no architectural state beyond the bus and the hart
//! it owns — it exists so callers embedding this crate as a library (tests,
//! the CLI, or any future front end) have one value to construct, load an
//! object file into, and drive.

use std::path::Path;

use crate::bus::{Bus, MachineConfig};
use crate::cpu::Hart;
use crate::elf;
use crate::error::LoadError;

/// Default instruction budget for the outer run loop (§5, §6).
pub const DEFAULT_MAX_INSNS: u64 = 50_000_000;

/// Why the run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The hart's halted flag was set (a shutdown firmware call).
    Halted,
    /// The instruction budget was exhausted before the hart halted.
    BudgetExhausted,
}

/// A single hart plus the bus it executes against.
pub struct Machine {
    bus: Bus,
    hart: Hart,
}

impl Machine {
    /// Builds a machine with a freshly allocated, zero-filled bus and a
    /// hart with all state zeroed (PC included, until [`Machine::load`] sets it).
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        Self {
            bus: Bus::new(config),
            hart: Hart::new(),
        }
    }

    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    #[must_use]
    pub fn hart(&self) -> &Hart {
        &self.hart
    }

    /// Loads an object file into RAM and sets the hart's PC to the
    /// returned entry address.
    pub fn load(&mut self, path: &Path) -> Result<(), LoadError> {
        let entry = elf::load(path, &mut self.bus)?;
        self.hart.set_entry(entry);
        log::info!("loader: entry pc={entry:#x}");
        Ok(())
    }

    /// Retires at most one instruction.
    pub fn step(&mut self) {
        self.hart.step(&mut self.bus);
    }

    /// Runs the fetch-execute loop until the hart halts or `max_insns`
    /// instructions have retired, whichever comes first. Returns the
    /// number of instructions retired and why the loop stopped.
    pub fn run(&mut self, max_insns: u64) -> (u64, StopReason) {
        let mut retired = 0u64;
        while retired < max_insns {
            if self.hart.halted {
                return (retired, StopReason::Halted);
            }
            self.step();
            retired += 1;
        }
        if self.hart.halted {
            (retired, StopReason::Halted)
        } else {
            (retired, StopReason::BudgetExhausted)
        }
    }
}
