//! Hart executor
//!
//! `Hart::step` fetches one instruction, decodes it, and retires it against
//! a [`Bus`]: at most one PC update, at most one register write, at most one
//! CSR update, possibly a memory access, possibly a firmware call, possibly
//! a trap. The dispatch below is a `match` on opcode with nested `match`es
//! on funct3/funct7, kept in the same shape as the architecture manual's
//! opcode table so it can be audited against it line for line.

use crate::bus::Bus;
use crate::csr;
use crate::decode::{self, imm_b, imm_i, imm_j, imm_s, imm_u, sext};
use crate::registers::RegisterFile;
use crate::sbi;

/// Trap cause: instruction-address-misaligned.
pub const CAUSE_INSTR_MISALIGNED: u64 = 0;
/// Trap cause: illegal instruction.
pub const CAUSE_ILLEGAL_INSTRUCTION: u64 = 2;
/// Trap cause: breakpoint (`ebreak`).
pub const CAUSE_BREAKPOINT: u64 = 3;

const OP_LUI: u32 = 0x37;
const OP_AUIPC: u32 = 0x17;
const OP_JAL: u32 = 0x6F;
const OP_JALR: u32 = 0x67;
const OP_BRANCH: u32 = 0x63;
const OP_LOAD: u32 = 0x03;
const OP_STORE: u32 = 0x23;
const OP_IMM: u32 = 0x13;
const OP_IMM_32: u32 = 0x1B;
const OP: u32 = 0x33;
const OP_32: u32 = 0x3B;
const OP_SYSTEM: u32 = 0x73;

/// A single hart: registers, CSRs, and the halted flag.
#[derive(Debug, Clone, Default)]
pub struct Hart {
    pub regs: RegisterFile,
    pub csrs: csr::CsrFile,
    pub halted: bool,
}

impl Hart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial program counter, typically the loader's entry address.
    pub fn set_entry(&mut self, entry: u64) {
        self.regs.set_pc(entry);
    }

    fn trap(&mut self, cause: u64, sepc: u64, stval: u64) {
        log::debug!(
            "trap: cause={cause} sepc={sepc:#x} stval={stval:#x} -> stvec={:#x}",
            self.csrs.stvec
        );
        self.csrs.scause = cause;
        self.csrs.sepc = sepc;
        self.csrs.stval = stval;
        self.regs.set_pc(self.csrs.stvec);
    }

    /// Retires at most one instruction.
    pub fn step(&mut self, bus: &mut Bus) {
        let pc = self.regs.pc();

        if pc % 4 != 0 {
            self.trap(CAUSE_INSTR_MISALIGNED, pc, pc);
            return;
        }

        let insn = bus.read_u32(pc);
        self.regs.set_pc(pc.wrapping_add(4));

        let opcode = decode::opcode(insn);
        let rd = decode::rd(insn);
        let funct3 = decode::funct3(insn);
        let rs1 = decode::rs1(insn);
        let rs2 = decode::rs2(insn);
        let funct7 = decode::funct7(insn);
        let x1 = self.regs.x(rs1);
        let x2 = self.regs.x(rs2);

        log::trace!("retire pc={pc:#x} insn={insn:#010x} opcode={opcode:#04x}");

        match opcode {
            OP_LUI => self.regs.set_x(rd, imm_u(insn)),

            OP_AUIPC => self.regs.set_x(rd, pc.wrapping_add(imm_u(insn))),

            OP_JAL => {
                self.regs.set_x(rd, self.regs.pc());
                self.regs.set_pc(pc.wrapping_add(imm_j(insn)));
            }

            OP_JALR => {
                let link = self.regs.pc();
                let target = x1.wrapping_add(imm_i(insn)) & !1u64;
                self.regs.set_pc(target);
                self.regs.set_x(rd, link);
            }

            OP_BRANCH => {
                let take = match funct3 {
                    0x0 => x1 == x2,
                    0x1 => x1 != x2,
                    0x4 => (x1 as i64) < (x2 as i64),
                    0x5 => (x1 as i64) >= (x2 as i64),
                    0x6 => x1 < x2,
                    0x7 => x1 >= x2,
                    _ => {
                        self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                        return;
                    }
                };
                if take {
                    self.regs.set_pc(pc.wrapping_add(imm_b(insn)));
                }
            }

            OP_LOAD => {
                let addr = x1.wrapping_add(imm_i(insn));
                let value = match funct3 {
                    0x0 => sext(u64::from(bus.read_u8(addr)), 8),
                    0x1 => sext(u64::from(bus.read_u16(addr)), 16),
                    0x2 => sext(u64::from(bus.read_u32(addr)), 32),
                    0x3 => bus.read_u64(addr),
                    0x4 => u64::from(bus.read_u8(addr)),
                    0x5 => u64::from(bus.read_u16(addr)),
                    0x6 => u64::from(bus.read_u32(addr)),
                    _ => {
                        self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                        return;
                    }
                };
                self.regs.set_x(rd, value);
            }

            OP_STORE => {
                let addr = x1.wrapping_add(imm_s(insn));
                match funct3 {
                    0x0 => bus.write_u8(addr, x2 as u8),
                    0x1 => bus.write_u16(addr, x2 as u16),
                    0x2 => bus.write_u32(addr, x2 as u32),
                    0x3 => bus.write_u64(addr, x2),
                    _ => {
                        self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                        return;
                    }
                }
            }

            OP_IMM => {
                let imm = imm_i(insn);
                let value = match funct3 {
                    0x0 => x1.wrapping_add(imm),
                    0x1 => x1 << (insn >> 20 & 0x3F),
                    0x2 => u64::from((x1 as i64) < (imm as i64)),
                    0x3 => u64::from(x1 < imm),
                    0x4 => x1 ^ imm,
                    0x5 => {
                        let shamt = insn >> 20 & 0x3F;
                        if insn >> 30 & 1 != 0 {
                            ((x1 as i64) >> shamt) as u64
                        } else {
                            x1 >> shamt
                        }
                    }
                    0x6 => x1 | imm,
                    0x7 => x1 & imm,
                    _ => unreachable!("funct3 is 3 bits"),
                };
                self.regs.set_x(rd, value);
            }

            OP_IMM_32 => {
                let result32: u32 = match funct3 {
                    0x0 => (x1 as u32).wrapping_add(imm_i(insn) as u32),
                    0x1 => (x1 as u32) << (insn >> 20 & 0x1F),
                    0x5 => {
                        let shamt = insn >> 20 & 0x1F;
                        if insn >> 30 & 1 != 0 {
                            ((x1 as i32) >> shamt) as u32
                        } else {
                            (x1 as u32) >> shamt
                        }
                    }
                    _ => {
                        self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                        return;
                    }
                };
                self.regs.set_x(rd, sext(u64::from(result32), 32));
            }

            OP => {
                let value = match funct3 {
                    0x0 => {
                        if funct7 == 0x20 {
                            x1.wrapping_sub(x2)
                        } else {
                            x1.wrapping_add(x2)
                        }
                    }
                    0x1 => x1 << (x2 & 0x3F),
                    0x2 => u64::from((x1 as i64) < (x2 as i64)),
                    0x3 => u64::from(x1 < x2),
                    0x4 => x1 ^ x2,
                    0x5 => {
                        if funct7 == 0x20 {
                            ((x1 as i64) >> (x2 & 0x3F)) as u64
                        } else {
                            x1 >> (x2 & 0x3F)
                        }
                    }
                    0x6 => x1 | x2,
                    0x7 => x1 & x2,
                    _ => unreachable!("funct3 is 3 bits"),
                };
                self.regs.set_x(rd, value);
            }

            OP_32 => {
                let result32: u32 = match funct3 {
                    0x0 => {
                        if funct7 == 0x20 {
                            (x1 as u32).wrapping_sub(x2 as u32)
                        } else {
                            (x1 as u32).wrapping_add(x2 as u32)
                        }
                    }
                    0x1 => (x1 as u32) << (x2 & 0x1F),
                    0x5 => {
                        let shamt = (x2 & 0x1F) as u32;
                        if funct7 == 0x20 {
                            ((x1 as i32) >> shamt) as u32
                        } else {
                            (x1 as u32) >> shamt
                        }
                    }
                    _ => {
                        self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                        return;
                    }
                };
                self.regs.set_x(rd, sext(u64::from(result32), 32));
            }

            OP_SYSTEM => {
                if funct3 == 0 {
                    let priv_imm = insn >> 20;
                    match priv_imm {
                        0 => sbi::handle(&mut self.regs, &mut self.halted),
                        1 => {
                            self.trap(CAUSE_BREAKPOINT, pc, 0);
                            return;
                        }
                        0x105 => { /* wfi: no-op */ }
                        _ => {
                            self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                            return;
                        }
                    }
                } else if matches!(funct3, 0x1 | 0x2 | 0x3) {
                    let csr_addr = insn >> 20;
                    let old = self.csrs.read(csr_addr);
                    if rd != 0 {
                        self.regs.set_x(rd, old);
                    }
                    let new = match funct3 {
                        0x1 => x1,
                        0x2 => old | x1,
                        0x3 => old & !x1,
                        _ => unreachable!("checked above"),
                    };
                    self.csrs.write(csr_addr, new);
                } else {
                    self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                    return;
                }
            }

            _ => {
                self.trap(CAUSE_ILLEGAL_INSTRUCTION, pc, u64::from(insn));
                return;
            }
        }

        self.regs.clear_x0();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MachineConfig;

    fn test_system() -> (Hart, Bus) {
        let bus = Bus::new(MachineConfig {
            ram_base: 0x8000_0000,
            ram_size: 0x1_0000,
            uart_base: 0x1000_0000,
        });
        let mut hart = Hart::new();
        hart.set_entry(0x8000_0000);
        (hart, bus)
    }

    fn load_program(bus: &mut Bus, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            bus.write_u32(0x8000_0000 + (i as u64) * 4, *w);
        }
    }

    fn i_type(opcode: u32, funct3: u32, rd: u32, rs1: u32, imm12: u32) -> u32 {
        ((imm12 & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn s_type(funct3: u32, rs1: u32, rs2: u32, imm12: i32) -> u32 {
        let hi = ((imm12 >> 5) & 0x7F) as u32;
        let lo = (imm12 & 0x1F) as u32;
        (hi << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (lo << 7) | OP_STORE
    }

    fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(OP_IMM, 0, rd, rs1, imm as u32)
    }

    #[test]
    fn p1_x0_stays_zero() {
        let (mut hart, mut bus) = test_system();
        load_program(&mut bus, &[addi(0, 0, 5)]); // addi x0, x0, 5
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(0), 0);
    }

    #[test]
    fn p2_pc_stays_aligned_after_normal_retire() {
        let (mut hart, mut bus) = test_system();
        load_program(&mut bus, &[addi(1, 0, 5)]);
        hart.step(&mut bus);
        assert_eq!(hart.regs.pc() % 4, 0);
        assert_eq!(hart.regs.pc(), 0x8000_0004);
    }

    #[test]
    fn p3_lui_low_bits_are_zero() {
        let (mut hart, mut bus) = test_system();
        let insn = (0xABCDE_u32 << 12) | (1 << 7) | OP_LUI; // lui x1, 0xABCDE
        load_program(&mut bus, &[insn]);
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(1) & 0xFFF, 0);
        assert_eq!(hart.regs.x(1), 0xABCD_E000);
    }

    #[test]
    fn p4_addiw_sign_extends_bit31() {
        let (mut hart, mut bus) = test_system();
        let insn = i_type(OP_IMM_32, 0, 1, 0, (-1i32) as u32); // addiw x1, x0, -1
        load_program(&mut bus, &[insn]);
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(1), u64::MAX);
    }

    #[test]
    fn p5_store_then_load_round_trips() {
        let (mut hart, mut bus) = test_system();
        // x5 = 0 (RAM_BASE-relative base), x6 = 0x7FF
        let prog = [addi(5, 0, 0), addi(6, 0, 0x7FF)];
        load_program(&mut bus, &prog);
        hart.step(&mut bus);
        hart.step(&mut bus);
        let sd = s_type(3, 5, 6, 0x100); // sd x6, 0x100(x5)
        let ld = i_type(OP_LOAD, 3, 7, 5, 0x100); // ld x7, 0x100(x5)
        bus.write_u32(0x8000_0008, sd);
        bus.write_u32(0x8000_000C, ld);
        hart.step(&mut bus);
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(7), 0x7FF);
    }

    #[test]
    fn p5b_sign_extending_byte_load() {
        let (mut hart, mut bus) = test_system();
        bus.write_u8(0x8000_1000, 0xFF);
        let lui_hi = (0x8_0001_u32 << 12) | (5 << 7) | OP_LUI; // x5 = 0x80001000
        let lb = i_type(OP_LOAD, 0, 6, 5, 0); // lb x6, 0(x5)
        let lbu = i_type(OP_LOAD, 4, 7, 5, 0); // lbu x7, 0(x5)
        load_program(&mut bus, &[lui_hi, lb, lbu]);
        hart.step(&mut bus);
        hart.step(&mut bus);
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(6), u64::MAX);
        assert_eq!(hart.regs.x(7), 0xFF);
    }

    #[test]
    fn p6_csr_read_after_write() {
        let (mut hart, mut bus) = test_system();
        let set = addi(1, 0, 0x42);
        let csrrw = i_type(OP_SYSTEM, 1, 0, 1, crate::csr::SEPC); // csrrw x0, sepc, x1
        let csrrs = i_type(OP_SYSTEM, 2, 2, 0, crate::csr::SEPC); // csrrs x2, sepc, x0
        load_program(&mut bus, &[set, csrrw, csrrs]);
        hart.step(&mut bus);
        hart.step(&mut bus);
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(2), 0x42);
    }

    #[test]
    fn scenario_misaligned_fetch_trap() {
        let (mut hart, mut bus) = test_system();
        hart.csrs.stvec = 0x8000_2000;
        hart.regs.set_pc(0x8000_0009);
        let pc_before = hart.regs.pc();
        hart.step(&mut bus);
        assert_eq!(hart.csrs.scause, CAUSE_INSTR_MISALIGNED);
        assert_eq!(hart.csrs.sepc, pc_before);
        assert_eq!(hart.csrs.stval, pc_before);
        assert_eq!(hart.regs.pc(), 0x8000_2000);
    }

    #[test]
    fn scenario_ebreak_trap() {
        let (mut hart, mut bus) = test_system();
        hart.csrs.stvec = 0x8000_3000;
        let ebreak: u32 = (1 << 20) | OP_SYSTEM;
        load_program(&mut bus, &[ebreak]);
        let pc_before = hart.regs.pc();
        hart.step(&mut bus);
        assert_eq!(hart.csrs.scause, CAUSE_BREAKPOINT);
        assert_eq!(hart.csrs.sepc, pc_before);
        assert_eq!(hart.csrs.stval, 0);
        assert_eq!(hart.regs.pc(), 0x8000_3000);
    }

    #[test]
    fn scenario_branch_boundary_infinite_loop() {
        let (mut hart, mut bus) = test_system();
        // beq x0, x0, -4: 13-bit field for -4 = imm[12]=1 imm[11]=1 imm[10:5]=0x3F imm[4:1]=0xE
        let beq: u32 = (1 << 31) | (0x3F << 25) | (0 << 20) | (0 << 15) | (0 << 12) | (0xE << 8) | (1 << 7) | OP_BRANCH;
        load_program(&mut bus, &[beq]);
        for _ in 0..1000 {
            hart.step(&mut bus);
        }
        assert_eq!(hart.regs.pc(), 0x8000_0000);
        assert!(!hart.halted);
    }

    #[test]
    fn illegal_opcode_traps() {
        let (mut hart, mut bus) = test_system();
        hart.csrs.stvec = 0x8000_4000;
        load_program(&mut bus, &[0x0000_0000]); // opcode 0 is not decoded
        hart.step(&mut bus);
        assert_eq!(hart.csrs.scause, CAUSE_ILLEGAL_INSTRUCTION);
        assert_eq!(hart.regs.pc(), 0x8000_4000);
    }

    #[test]
    fn ecall_putchar_does_not_trap_and_clears_a0() {
        let (mut hart, mut bus) = test_system();
        let set_a0 = addi(10, 0, i32::from(b'H'));
        let set_a7 = addi(17, 0, 1);
        let ecall: u32 = OP_SYSTEM; // imm=0, funct3=0
        load_program(&mut bus, &[set_a0, set_a7, ecall]);
        hart.step(&mut bus);
        hart.step(&mut bus);
        hart.step(&mut bus);
        assert_eq!(hart.regs.x(10), 0);
        assert!(!hart.halted);
    }

    #[test]
    fn ecall_shutdown_halts() {
        let (mut hart, mut bus) = test_system();
        let set_a7 = addi(17, 0, 8);
        let ecall: u32 = OP_SYSTEM;
        load_program(&mut bus, &[set_a7, ecall]);
        hart.step(&mut bus);
        hart.step(&mut bus);
        assert!(hart.halted);
    }

    /// §8 scenario 2: storing 'H' as a byte to `UART_BASE` via `sb` must
    /// reach the console sink with exactly that byte.
    #[test]
    fn scenario_hello_via_mmio() {
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));

        struct SharedSink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl std::io::Write for SharedSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut bus = Bus::with_console(
            MachineConfig {
                ram_base: 0x8000_0000,
                ram_size: 0x1_0000,
                uart_base: 0x1000_0000,
            },
            Box::new(SharedSink(sink.clone())),
        );
        let mut hart = Hart::new();
        hart.set_entry(0x8000_0000);

        // x5 = 0x1000_0000 (UART_BASE); sb x10 (='H'), 0(x5)
        let lui_uart = (0x1_0000_u32 << 12) | (5 << 7) | OP_LUI; // lui x5, 0x10000 -> 0x1000_0000
        let set_h = addi(10, 0, i32::from(b'H'));
        let sb = s_type(0, 5, 10, 0); // sb x10, 0(x5)
        load_program(&mut bus, &[lui_uart, set_h, sb]);
        hart.step(&mut bus);
        hart.step(&mut bus);
        hart.step(&mut bus);

        assert_eq!(sink.lock().unwrap().as_slice(), b"H");
        assert!(!hart.halted);
    }
}
