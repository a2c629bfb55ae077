//! Legacy firmware-call handler
//!
//! Implements the two legacy supervisor-binary-interface extensions this
//! emulator forwards: console-putchar and shutdown. Invoked by the
//! executor when it decodes an `ecall`; never raises a trap itself.

use std::io::Write;

use crate::registers::RegisterFile;

/// a7 (x17) extension id: legacy console putchar.
pub const EXT_CONSOLE_PUTCHAR: u64 = 1;
/// a7 (x17) extension id: legacy shutdown.
pub const EXT_SHUTDOWN: u64 = 8;

/// Register index of a7, the SBI extension selector.
const A7: usize = 17;
/// Register index of a0, argument 0 and the return-value register.
const A0: usize = 10;

/// Services one `ecall`. `halted` is set when the guest requests shutdown.
pub fn handle(regs: &mut RegisterFile, halted: &mut bool) {
    let ext = regs.x(A7);
    match ext {
        EXT_CONSOLE_PUTCHAR => {
            let byte = regs.x(A0) as u8;
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&[byte]);
            let _ = stdout.flush();
            log::debug!("sbi: console_putchar({byte:#04x})");
            regs.set_x(A0, 0);
        }
        EXT_SHUTDOWN => {
            log::debug!("sbi: shutdown requested");
            *halted = true;
            regs.set_x(A0, 0);
        }
        other => {
            log::debug!("sbi: unknown extension {other:#x}");
            regs.set_x(A0, (-1i64) as u64);
        }
    }
}
