//! ABI layer for descriptor I/O: open/close/read/write/lseek/dup/dup2 and
//! getpid.
//!
//! These are unbuffered; they go straight to the raw layer and report
//! failures as `-1` with errno set.

use std::ffi::{c_char, c_int, c_long, c_void};

use rlibc_core::SysError;
use rlibc_core::errno;
use rlibc_core::fcntl::{OpenFlags, Whence};
use rlibc_core::sys::linux::LinuxSys;
use rlibc_core::sys::{ProcessSys, RawIo};

use crate::errno_abi::set_abi_errno;
use crate::util::c_bytes;

#[inline]
fn ret_int(result: Result<c_int, SysError>) -> c_int {
    result.unwrap_or_else(|e| {
        set_abi_errno(e.errno());
        -1
    })
}

#[inline]
fn ret_isize(result: Result<usize, SysError>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(e) => {
            set_abi_errno(e.errno());
            -1
        }
    }
}

/// Open `pathname`. `flags` uses rlibc's bits: read-only 1, write-only 2,
/// read-write 3, append 4, create 8, truncate 16. Created files get mode
/// 0644; a mode argument is accepted and ignored.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn open(pathname: *const c_char, flags: c_int, _args: ...) -> c_int {
    if pathname.is_null() {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let Some(flags) = u32::try_from(flags).ok().and_then(OpenFlags::from_bits) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let path = unsafe { c_bytes(pathname) };
    ret_int(LinuxSys.open(path, flags))
}

/// POSIX `close`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    ret_int(LinuxSys.close(fd).map(|()| 0))
}

/// POSIX `read`. Returns 0 at end of input.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: usize) -> isize {
    if buf.is_null() && count > 0 {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let dst: &mut [u8] = if count == 0 {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), count) }
    };
    ret_isize(LinuxSys.read(fd, dst))
}

/// POSIX `write`. May write fewer bytes than requested.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: usize) -> isize {
    if buf.is_null() && count > 0 {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let src: &[u8] = if count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), count) }
    };
    ret_isize(LinuxSys.write(fd, src))
}

/// POSIX `lseek`. `whence` is 0 (SET), 1 (CUR) or 2 (END).
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn lseek(fd: c_int, offset: c_long, whence: c_int) -> c_long {
    let Some(whence) = Whence::from_c(whence) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    match LinuxSys.lseek(fd, offset, whence) {
        Ok(pos) => pos as c_long,
        Err(e) => {
            set_abi_errno(e.errno());
            -1
        }
    }
}

/// POSIX `dup`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dup(oldfd: c_int) -> c_int {
    ret_int(LinuxSys.dup(oldfd))
}

/// POSIX `dup2`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dup2(oldfd: c_int, newfd: c_int) -> c_int {
    ret_int(LinuxSys.dup2(oldfd, newfd))
}

/// POSIX `getpid`. Never fails.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn getpid() -> c_int {
    LinuxSys.getpid()
}
