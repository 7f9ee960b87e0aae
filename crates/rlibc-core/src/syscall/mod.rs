//! Linux x86_64 system calls used by [`LinuxSys`](crate::sys::linux::LinuxSys).
//!
//! Each wrapper issues one call through [`raw::syscall`] and decodes the
//! kernel's `-errno` convention into [`SysError`]. Wrappers that take raw
//! pointers are `unsafe`; the others cannot violate memory safety whatever
//! their arguments.

mod raw;

use crate::error::SysError;

/// Syscall numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Sysno {
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Lseek = 8,
    Mmap = 9,
    Munmap = 11,
    Dup = 32,
    Dup2 = 33,
    Getpid = 39,
    Fork = 57,
    Wait4 = 61,
    ExitGroup = 231,
    Pipe2 = 293,
}

pub const PROT_READ: i32 = 0x1;
pub const PROT_WRITE: i32 = 0x2;
pub const MAP_PRIVATE: i32 = 0x02;
pub const MAP_ANONYMOUS: i32 = 0x20;

/// Results in `[-4095, -1]` are negated errno values.
const ERRNO_WINDOW: usize = 4095;

/// Decode a raw return register.
#[inline]
pub fn check(ret: usize) -> Result<usize, SysError> {
    if ret > usize::MAX - ERRNO_WINDOW {
        Err(SysError(ret.wrapping_neg() as i32))
    } else {
        Ok(ret)
    }
}

#[inline]
fn call(nr: Sysno, args: [usize; 6]) -> Result<usize, SysError> {
    // SAFETY: only reached from wrappers whose arguments carry no pointer,
    // or whose callers vouched for the pointers they pass.
    check(unsafe { raw::syscall(nr, args) })
}

/// # Safety
///
/// `buf` must be valid for `len` bytes of writes.
#[inline]
pub unsafe fn read(fd: i32, buf: *mut u8, len: usize) -> Result<usize, SysError> {
    call(Sysno::Read, [fd as usize, buf as usize, len, 0, 0, 0])
}

/// # Safety
///
/// `buf` must be valid for `len` bytes of reads.
#[inline]
pub unsafe fn write(fd: i32, buf: *const u8, len: usize) -> Result<usize, SysError> {
    call(Sysno::Write, [fd as usize, buf as usize, len, 0, 0, 0])
}

/// `open` with Linux `O_*` bits.
///
/// # Safety
///
/// `path` must point to a NUL-terminated string.
#[inline]
pub unsafe fn open(path: *const u8, oflags: i32, mode: u32) -> Result<i32, SysError> {
    call(Sysno::Open, [path as usize, oflags as usize, mode as usize, 0, 0, 0]).map(|fd| fd as i32)
}

#[inline]
pub fn close(fd: i32) -> Result<(), SysError> {
    call(Sysno::Close, [fd as usize, 0, 0, 0, 0, 0]).map(drop)
}

#[inline]
pub fn lseek(fd: i32, offset: i64, whence: i32) -> Result<u64, SysError> {
    call(Sysno::Lseek, [fd as usize, offset as usize, whence as usize, 0, 0, 0]).map(|pos| pos as u64)
}

/// # Safety
///
/// With a non-null `addr` or a file-backed mapping the caller must own the
/// address range it asks for.
#[inline]
pub unsafe fn mmap(
    addr: *mut u8,
    len: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<*mut u8, SysError> {
    let args = [addr as usize, len, prot as usize, flags as usize, fd as usize, offset as usize];
    call(Sysno::Mmap, args).map(|p| p as *mut u8)
}

/// # Safety
///
/// Nothing may reference `[addr, addr + len)` afterwards.
#[inline]
pub unsafe fn munmap(addr: *mut u8, len: usize) -> Result<(), SysError> {
    call(Sysno::Munmap, [addr as usize, len, 0, 0, 0, 0]).map(drop)
}

/// Returns `[read end, write end]`.
#[inline]
pub fn pipe() -> Result<[i32; 2], SysError> {
    let mut fds = [0i32; 2];
    call(Sysno::Pipe2, [fds.as_mut_ptr() as usize, 0, 0, 0, 0, 0])?;
    Ok(fds)
}

#[inline]
pub fn dup(fd: i32) -> Result<i32, SysError> {
    call(Sysno::Dup, [fd as usize, 0, 0, 0, 0, 0]).map(|fd| fd as i32)
}

#[inline]
pub fn dup2(old: i32, new: i32) -> Result<i32, SysError> {
    call(Sysno::Dup2, [old as usize, new as usize, 0, 0, 0, 0]).map(|fd| fd as i32)
}

#[inline]
pub fn getpid() -> i32 {
    call(Sysno::Getpid, [0; 6]).map_or(0, |pid| pid as i32)
}

/// 0 in the child, the child's pid in the parent.
#[inline]
pub fn fork() -> Result<i32, SysError> {
    call(Sysno::Fork, [0; 6]).map(|pid| pid as i32)
}

/// `wait4` without resource usage. Returns the reaped pid (0 under
/// `WNOHANG` when nothing changed) and the raw status word.
#[inline]
pub fn wait4(pid: i32, options: i32) -> Result<(i32, i32), SysError> {
    let mut status = 0i32;
    let args = [pid as isize as usize, (&raw mut status) as usize, options as usize, 0, 0, 0];
    let reaped = call(Sysno::Wait4, args)?;
    Ok((reaped as i32, status))
}

pub fn exit_group(status: i32) -> ! {
    let _ = call(Sysno::ExitGroup, [status as usize, 0, 0, 0, 0, 0]);
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::{EBADF, EINVAL};

    #[test]
    fn check_splits_errno_window() {
        assert_eq!(check(0), Ok(0));
        assert_eq!(check(usize::MAX - ERRNO_WINDOW), Ok(usize::MAX - ERRNO_WINDOW));
        assert_eq!(check((-(EBADF as isize)) as usize), Err(SysError(EBADF)));
        assert_eq!(check((-(EINVAL as isize)) as usize), Err(SysError(EINVAL)));
        assert_eq!(check(usize::MAX), Err(SysError(1)));
    }
}
