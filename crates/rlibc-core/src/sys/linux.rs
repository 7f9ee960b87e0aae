//! Raw layer backed by Linux x86_64 syscalls.

#![allow(unsafe_code)]

use crate::errno::EINVAL;
use crate::error::SysError;
use crate::fcntl::{OpenFlags, Whence};
use crate::process::{Pipe, Role, WaitTarget};
use crate::syscall;

use super::{Fd, Pid, ProcessSys, RawIo};

const O_RDONLY: i32 = 0;
const O_WRONLY: i32 = 0o1;
const O_RDWR: i32 = 0o2;
const O_CREAT: i32 = 0o100;
const O_TRUNC: i32 = 0o1000;
const O_APPEND: i32 = 0o2000;
const CREATE_MODE: u32 = 0o644;

/// Translate rlibc open flags to Linux `O_*` bits.
#[must_use]
pub fn linux_oflags(flags: OpenFlags) -> i32 {
    let mut o = match (flags.readable(), flags.writable()) {
        (true, true) => O_RDWR,
        (false, true) => O_WRONLY,
        _ => O_RDONLY,
    };
    if flags.contains(OpenFlags::CREAT) {
        o |= O_CREAT;
    }
    if flags.contains(OpenFlags::TRUNC) {
        o |= O_TRUNC;
    }
    if flags.contains(OpenFlags::APPEND) {
        o |= O_APPEND;
    }
    o
}

/// The real kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSys;

impl RawIo for LinuxSys {
    fn open(&mut self, path: &[u8], flags: OpenFlags) -> Result<Fd, SysError> {
        if path.contains(&0) {
            return Err(SysError(EINVAL));
        }
        let mut cpath = Vec::with_capacity(path.len() + 1);
        cpath.extend_from_slice(path);
        cpath.push(0);
        // SAFETY: cpath is NUL-terminated and outlives the call.
        unsafe { syscall::open(cpath.as_ptr(), linux_oflags(flags), CREATE_MODE) }
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, SysError> {
        // SAFETY: buf is a valid writable slice.
        unsafe { syscall::read(fd, buf.as_mut_ptr(), buf.len()) }
    }

    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, SysError> {
        // SAFETY: buf is a valid readable slice.
        unsafe { syscall::write(fd, buf.as_ptr(), buf.len()) }
    }

    fn close(&mut self, fd: Fd) -> Result<(), SysError> {
        syscall::close(fd)
    }

    fn lseek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, SysError> {
        syscall::lseek(fd, offset, whence.to_c())
    }

    fn dup(&mut self, fd: Fd) -> Result<Fd, SysError> {
        syscall::dup(fd)
    }

    fn dup2(&mut self, old: Fd, new: Fd) -> Result<Fd, SysError> {
        syscall::dup2(old, new)
    }
}

impl ProcessSys for LinuxSys {
    fn fork(&mut self) -> Result<Role, SysError> {
        match syscall::fork()? {
            0 => Ok(Role::Child),
            child => Ok(Role::Parent { child }),
        }
    }

    fn wait4(
        &mut self,
        target: WaitTarget,
        options: i32,
    ) -> Result<Option<(Pid, i32)>, SysError> {
        let (pid, status) = syscall::wait4(target.to_c(), options)?;
        Ok((pid != 0).then_some((pid, status)))
    }

    fn pipe(&mut self) -> Result<Pipe, SysError> {
        let [read, write] = syscall::pipe()?;
        Ok(Pipe { read, write })
    }

    fn getpid(&mut self) -> Pid {
        syscall::getpid()
    }

    fn exit(&mut self, status: i32) {
        syscall::exit_group(status)
    }
}

/// Map `len` bytes of zeroed, private, read-write memory.
pub fn map_anonymous(len: usize) -> Result<*mut u8, SysError> {
    // SAFETY: an anonymous private mapping with a null hint has no
    // preconditions beyond a non-zero length.
    unsafe {
        syscall::mmap(
            core::ptr::null_mut(),
            len,
            syscall::PROT_READ | syscall::PROT_WRITE,
            syscall::MAP_PRIVATE | syscall::MAP_ANONYMOUS,
            -1,
            0,
        )
    }
}
