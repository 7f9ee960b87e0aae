//! ABI layer for process control functions.
//!
//! Provides fork, waitpid, wait, pipe, exit and _exit over the process
//! primitives in rlibc-core. Streams are not flushed by `fork`; callers
//! that care flush first.

use std::ffi::c_int;

use rlibc_core::errno;
use rlibc_core::ProcessError;
use rlibc_core::process::{self, Role, WNOHANG, WaitTarget};
use rlibc_core::sys::linux::LinuxSys;

use crate::errno_abi::set_abi_errno;
use crate::stdio_abi::with_all_streams;

fn fail(err: ProcessError) -> c_int {
    set_abi_errno(err.errno());
    -1
}

// ---------------------------------------------------------------------------
// fork
// ---------------------------------------------------------------------------

/// POSIX `fork`: 0 in the child, the child's pid in the parent.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fork() -> c_int {
    match process::duplicate(&mut LinuxSys) {
        Ok(Role::Parent { child }) => child,
        Ok(Role::Child) => 0,
        Err(e) => fail(e),
    }
}

// ---------------------------------------------------------------------------
// waitpid / wait
// ---------------------------------------------------------------------------

/// POSIX `waitpid`. `pid` is `-1` (any child) or a child's pid. With
/// `WNOHANG`, returns 0 when no child has changed state yet.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn waitpid(pid: c_int, wstatus: *mut c_int, options: c_int) -> c_int {
    let Some(target) = WaitTarget::from_c(pid) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let reaped = if options & WNOHANG != 0 {
        process::try_wait_child(&mut LinuxSys, target, options)
    } else {
        process::wait_for_child(&mut LinuxSys, target, options).map(Some)
    };
    match reaped {
        Ok(Some((child, status))) => {
            if !wstatus.is_null() {
                unsafe { *wstatus = status.to_raw() };
            }
            child
        }
        Ok(None) => 0,
        Err(e) => fail(e),
    }
}

/// POSIX `wait`: block for any child.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn wait(wstatus: *mut c_int) -> c_int {
    unsafe { waitpid(-1, wstatus, 0) }
}

// ---------------------------------------------------------------------------
// pipe
// ---------------------------------------------------------------------------

/// POSIX `pipe`. `pipefd[0]` is the read end, `pipefd[1]` the write end.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn pipe(pipefd: *mut c_int) -> c_int {
    if pipefd.is_null() {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    match process::create_pipe(&mut LinuxSys) {
        Ok(p) => {
            unsafe {
                *pipefd = p.read;
                *pipefd.add(1) = p.write;
            }
            0
        }
        Err(e) => fail(e),
    }
}

// ---------------------------------------------------------------------------
// exit / _exit
// ---------------------------------------------------------------------------

/// POSIX `exit`: flush every open stream, then terminate. Flush failures
/// do not prevent termination.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn exit(status: c_int) -> ! {
    with_all_streams(|streams| {
        process::exit(&mut LinuxSys, streams.filter(|s| !s.is_closed()), status);
    });
    unreachable!("exit_group returned")
}

/// POSIX `_exit`: terminate without flushing.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn _exit(status: c_int) -> ! {
    process::exit_immediately(&mut LinuxSys, status);
    unreachable!("exit_group returned")
}
