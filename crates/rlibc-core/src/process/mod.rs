//! Process control: duplication, waiting, exit status and pipes.
//!
//! # Buffered output across `duplicate`
//!
//! Stream buffers live in process memory, so `duplicate` copies them. Any
//! output still buffered at that point is emitted once by each process when
//! it is eventually flushed. Callers that want it written once must flush
//! before duplicating; nothing here flushes implicitly.

use rlibc_membrane::metrics::{RuntimeMetrics, global_metrics};

use crate::error::{ProcessError, SysError};
use crate::stdio::Stream;
use crate::sys::{Fd, Pid, ProcessSys, RawIo};

/// `WNOHANG`: return immediately if no child has exited.
pub const WNOHANG: i32 = 1;

/// `WUNTRACED`: also return if a child has stopped.
pub const WUNTRACED: i32 = 2;

/// `WCONTINUED`: also return if a stopped child has resumed.
pub const WCONTINUED: i32 = 8;

const WAIT_OPTS_MASK: i32 = WNOHANG | WUNTRACED | WCONTINUED;

// ---------------------------------------------------------------------------
// Wait-status decoding
// ---------------------------------------------------------------------------

/// True if the child terminated normally.
#[must_use]
pub const fn wifexited(status: i32) -> bool {
    (status & 0x7f) == 0
}

/// Exit code of a normally-terminated child (valid only when `wifexited`).
#[must_use]
pub const fn wexitstatus(status: i32) -> i32 {
    (status >> 8) & 0xff
}

/// True if the child was killed by a signal.
#[must_use]
pub const fn wifsignaled(status: i32) -> bool {
    let low7 = status & 0x7f;
    low7 != 0 && low7 != 0x7f
}

/// Signal number that killed the child (valid only when `wifsignaled`).
#[must_use]
pub const fn wtermsig(status: i32) -> i32 {
    status & 0x7f
}

/// True if the child is currently stopped.
#[must_use]
pub const fn wifstopped(status: i32) -> bool {
    (status & 0xff) == 0x7f
}

/// Signal that stopped the child (valid only when `wifstopped`).
#[must_use]
pub const fn wstopsig(status: i32) -> i32 {
    (status >> 8) & 0xff
}

/// Returns true if `opts` contains only recognized wait flags.
#[must_use]
pub const fn valid_wait_options(opts: i32) -> bool {
    (opts & !WAIT_OPTS_MASK) == 0
}

/// Clamp an exit status to the [0, 255] range a parent can observe.
#[must_use]
pub const fn clamp_exit_status(status: i32) -> i32 {
    status & 0xff
}

/// Decoded wait status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Terminated voluntarily with this code.
    Exited(i32),
    /// Killed by this signal.
    Signaled(i32),
    /// Stopped by this signal (only with `WUNTRACED`).
    Stopped(i32),
}

impl ExitStatus {
    /// Decode a raw status word: bits 0-7 discriminate, bits 8-15 carry the
    /// exit code or stop signal.
    #[must_use]
    pub const fn from_raw(status: i32) -> Self {
        if wifexited(status) {
            Self::Exited(wexitstatus(status))
        } else if wifstopped(status) {
            Self::Stopped(wstopsig(status))
        } else {
            Self::Signaled(wtermsig(status))
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Exited(code) => clamp_exit_status(code) << 8,
            Self::Signaled(sig) => sig & 0x7f,
            Self::Stopped(sig) => ((sig & 0xff) << 8) | 0x7f,
        }
    }

    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            _ => None,
        }
    }
}

/// Which side of a duplication the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Parent { child: Pid },
    Child,
}

/// Which children a wait should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Any,
    Pid(Pid),
}

impl WaitTarget {
    /// Decode the C `pid` argument of `waitpid`. Process groups are not
    /// modeled, so only `-1` and positive pids are accepted.
    #[must_use]
    pub const fn from_c(pid: i32) -> Option<Self> {
        match pid {
            -1 => Some(Self::Any),
            p if p > 0 => Some(Self::Pid(p)),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_c(self) -> i32 {
        match self {
            Self::Any => -1,
            Self::Pid(p) => p,
        }
    }
}

/// Both ends of a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipe {
    pub read: Fd,
    pub write: Fd,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Duplicate the calling process.
///
/// On success both processes return; the original sees
/// [`Role::Parent`], the copy sees [`Role::Child`]. On failure no child
/// exists and only the caller sees the error.
pub fn duplicate<S: ProcessSys + ?Sized>(sys: &mut S) -> Result<Role, ProcessError> {
    let role = sys.fork()?;
    if matches!(role, Role::Parent { .. }) {
        RuntimeMetrics::inc(&global_metrics().forks);
    }
    Ok(role)
}

/// Block until a matching child changes state and return its pid and
/// decoded status. Fails with [`ProcessError::NoChildren`] instead of
/// blocking when there is nothing to wait for.
pub fn wait_for_child<S: ProcessSys + ?Sized>(
    sys: &mut S,
    target: WaitTarget,
    options: i32,
) -> Result<(Pid, ExitStatus), ProcessError> {
    if !valid_wait_options(options) {
        return Err(ProcessError::InvalidOptions(options));
    }
    loop {
        if let Some((pid, raw)) = sys.wait4(target, options & !WNOHANG)? {
            RuntimeMetrics::inc(&global_metrics().waits);
            return Ok((pid, ExitStatus::from_raw(raw)));
        }
    }
}

/// Like [`wait_for_child`] but returns `Ok(None)` immediately when no
/// matching child has changed state yet.
pub fn try_wait_child<S: ProcessSys + ?Sized>(
    sys: &mut S,
    target: WaitTarget,
    options: i32,
) -> Result<Option<(Pid, ExitStatus)>, ProcessError> {
    if !valid_wait_options(options) {
        return Err(ProcessError::InvalidOptions(options));
    }
    let reaped = sys.wait4(target, options | WNOHANG)?;
    if reaped.is_some() {
        RuntimeMetrics::inc(&global_metrics().waits);
    }
    Ok(reaped.map(|(pid, raw)| (pid, ExitStatus::from_raw(raw))))
}

/// Create a pipe. The caller owns both ends and must close whichever one
/// it does not use: an open write end anywhere keeps readers from seeing
/// end of input.
pub fn create_pipe<S: ProcessSys + ?Sized>(sys: &mut S) -> Result<Pipe, ProcessError> {
    Ok(sys.pipe()?)
}

/// Point `target` at the channel `source` refers to, e.g. to redirect
/// stdout into a pipe's write end before duplicating.
pub fn redirect<R: RawIo + ?Sized>(io: &mut R, source: Fd, target: Fd) -> Result<(), SysError> {
    io.dup2(source, target).map(|_| ())
}

/// Flush every stream, then terminate with `code`.
///
/// Flush failures do not prevent termination.
pub fn exit<'a, S, I>(sys: &mut S, streams: I, code: i32)
where
    S: ProcessSys + ?Sized,
    I: IntoIterator<Item = &'a mut Stream>,
{
    for stream in streams {
        let _ = stream.flush(sys);
    }
    sys.exit(clamp_exit_status(code));
}

/// Terminate immediately without flushing any stream.
pub fn exit_immediately<S: ProcessSys + ?Sized>(sys: &mut S, code: i32) {
    sys.exit(clamp_exit_status(code));
}
