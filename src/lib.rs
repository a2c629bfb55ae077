//! A minimal RV64I user/supervisor system emulator.
//!
//! The library is the architectural core: [`bus`]/[`memory`] (physical
//! address decode), [`csr`] (the four supervisor CSRs), [`sbi`] (the legacy
//! firmware-call handler), [`cpu`] (fetch/decode/execute), and [`elf`] (the
//! object loader). [`machine::Machine`] wires these together into the
//! bounded fetch-execute loop described in the design notes; the `rv64sim`
//! binary is a thin CLI wrapper around it.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Common patterns that make code more readable
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
// Legacy Codebase Exemptions (Strict Mode)
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::similar_names)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::significant_drop_in_scrutinee)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::fn_params_excessive_bools)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::non_send_fields_in_send_ty)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::match_bool)]
// Style allowances - keep code readable
#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::let_underscore_untyped)]
#![allow(clippy::unnecessary_literal_unwrap)]
#![allow(clippy::ref_patterns)]
#![allow(clippy::inconsistent_struct_constructor)]
#![allow(clippy::bool_to_int_with_if)]
#![allow(clippy::useless_let_if_seq)]
#![allow(clippy::if_not_else)]
#![allow(clippy::single_match)]
#![allow(clippy::single_match_else)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::trait_duplication_in_bounds)]
#![allow(clippy::type_repetition_in_bounds)]
// Performance style - prefer explicitness over micro-optimizations
#![allow(clippy::ptr_arg)]
#![allow(clippy::used_underscore_binding)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::inline_always)]
#![allow(clippy::default_numeric_fallback)]
#![allow(clippy::or_fun_call)]
#![allow(clippy::if_same_then_else)]
#![allow(clippy::let_and_return)]
#![allow(clippy::map_flatten)]
#![allow(clippy::map_identity)]
#![allow(clippy::needless_late_init)]
#![allow(clippy::redundant_else)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::wildcard_in_or_patterns)]
// Additional style allowances
#![allow(clippy::items_after_statements)]
#![allow(clippy::no_effect_underscore_binding)]
#![allow(clippy::branches_sharing_code)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::unused_self)]
// Nursery Exemptions
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::use_self)]
#![allow(clippy::cognitive_complexity)]
// Allow for error handling in emulator code
#![allow(clippy::verbose_bit_mask)]

mod bus;
mod cpu;
mod csr;
mod decode;
mod elf;
mod error;
mod machine;
mod memory;
mod registers;
mod sbi;

pub use bus::{AddressRegion, Bus, MachineConfig, DEFAULT_UART_BASE};
pub use cpu::{Hart, CAUSE_BREAKPOINT, CAUSE_ILLEGAL_INSTRUCTION, CAUSE_INSTR_MISALIGNED};
pub use csr::CsrFile;
pub use error::LoadError;
pub use machine::{Machine, StopReason, DEFAULT_MAX_INSNS};
pub use memory::{Ram, DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE};
pub use registers::RegisterFile;
