//! The `syscall` instruction.
//!
//! ```text
//! number → rax        args → rdi rsi rdx r10 r8 r9
//! result → rax        clobbered → rcx r11
//! ```

use core::arch::asm;

use super::Sysno;

/// Trap into the kernel with all six argument registers loaded. Calls that
/// take fewer arguments ignore the extra registers, so unused slots are 0.
///
/// # Safety
///
/// Any pointer passed in `args` must satisfy what syscall `nr` requires
/// of it.
#[inline]
pub unsafe fn syscall(nr: Sysno, args: [usize; 6]) -> usize {
    let ret: usize;
    // SAFETY: register assignment follows the x86_64 Linux convention;
    // argument validity is the caller's obligation.
    unsafe {
        asm!(
            "syscall",
            inlateout("rax") nr as usize => ret,
            in("rdi") args[0],
            in("rsi") args[1],
            in("rdx") args[2],
            in("r10") args[3],
            in("r8") args[4],
            in("r9") args[5],
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack, preserves_flags),
        );
    }
    ret
}
