//! The raw primitive layer.
//!
//! Every engine in this crate reaches the kernel through these two traits.
//! [`linux::LinuxSys`] issues real syscalls; [`sim::SimSys`] is an in-memory
//! model of files, pipes and processes for hosted testing.

use crate::error::SysError;
use crate::fcntl::{OpenFlags, Whence};
use crate::process::{Pipe, Role, WaitTarget};

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod linux;
pub mod sim;

/// Descriptor handle.
pub type Fd = i32;
/// Process identifier.
pub type Pid = i32;

pub const STDIN_FILENO: Fd = 0;
pub const STDOUT_FILENO: Fd = 1;
pub const STDERR_FILENO: Fd = 2;

/// Unbuffered descriptor I/O.
pub trait RawIo {
    fn open(&mut self, path: &[u8], flags: OpenFlags) -> Result<Fd, SysError>;
    /// Returns 0 at end of input.
    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, SysError>;
    /// May write fewer bytes than requested.
    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, SysError>;
    fn close(&mut self, fd: Fd) -> Result<(), SysError>;
    fn lseek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, SysError>;
    fn dup(&mut self, fd: Fd) -> Result<Fd, SysError>;
    fn dup2(&mut self, old: Fd, new: Fd) -> Result<Fd, SysError>;
}

/// Process lifecycle primitives.
pub trait ProcessSys: RawIo {
    /// Duplicate the calling process.
    fn fork(&mut self) -> Result<Role, SysError>;
    /// Collect a child's raw wait status. `Ok(None)` only when `WNOHANG`
    /// was requested and no matching child has changed state.
    fn wait4(&mut self, target: WaitTarget, options: i32)
    -> Result<Option<(Pid, i32)>, SysError>;
    fn pipe(&mut self) -> Result<Pipe, SysError>;
    fn getpid(&mut self) -> Pid;
    /// Terminate the calling process with `status`. Never returns on a
    /// real system.
    fn exit(&mut self, status: i32);
}

/// Write all of `data`, retrying short writes. A zero-length write is
/// reported as `EIO`.
pub fn write_all<R: RawIo + ?Sized>(io: &mut R, fd: Fd, mut data: &[u8]) -> Result<(), SysError> {
    while !data.is_empty() {
        match io.write(fd, data)? {
            0 => return Err(SysError(crate::errno::EIO)),
            n => data = &data[n.min(data.len())..],
        }
    }
    Ok(())
}
