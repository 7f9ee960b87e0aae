//! Error types surfaced by the engines.
//!
//! Every failure is returned, never thrown; the C surface maps these onto
//! its return conventions and errno.

use thiserror::Error;

use crate::errno;

/// A raw-layer call failed with the given errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{} (errno {})", errno::describe(*.0), .0)]
pub struct SysError(pub i32);

impl SysError {
    #[must_use]
    pub const fn errno(self) -> i32 {
        self.0
    }
}

/// Formatted output would exceed `INT_MAX` bytes, or a field width or
/// precision does not fit in an `int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("formatted output exceeds INT_MAX bytes")]
pub struct FormatOverflow;

/// Heap allocator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of memory: no free block holds {requested} bytes")]
    OutOfMemory { requested: usize },
    #[error("allocation size overflows")]
    SizeOverflow,
    #[error("address {0:#x} is not a live allocation")]
    InvalidPointer(usize),
    #[error("arena of {0} bytes is too small to hold a block")]
    ArenaTooSmall(usize),
}

impl AllocError {
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::OutOfMemory { .. } | Self::SizeOverflow | Self::ArenaTooSmall(_) => {
                errno::ENOMEM
            }
            Self::InvalidPointer(_) => errno::EINVAL,
        }
    }
}

/// Buffered stream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("invalid open mode")]
    InvalidMode,
    #[error("stream is closed")]
    Closed,
    #[error("stream error flag is set")]
    ErrorFlagged,
    #[error("stream not opened for {0}")]
    WrongDirection(&'static str),
    #[error("buffering can only change before the first I/O")]
    BufferingLocked,
    #[error(transparent)]
    Overflow(#[from] FormatOverflow),
    #[error(transparent)]
    Sys(#[from] SysError),
}

impl StreamError {
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidMode | Self::BufferingLocked => errno::EINVAL,
            Self::Closed | Self::WrongDirection(_) => errno::EBADF,
            Self::ErrorFlagged => errno::EIO,
            Self::Overflow(_) => errno::EOVERFLOW,
            Self::Sys(e) => e.0,
        }
    }
}

/// Process-control failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("no child processes to wait for")]
    NoChildren,
    #[error("invalid wait options {0:#x}")]
    InvalidOptions(i32),
    #[error(transparent)]
    Sys(SysError),
}

impl From<SysError> for ProcessError {
    fn from(err: SysError) -> Self {
        if err.0 == errno::ECHILD {
            Self::NoChildren
        } else {
            Self::Sys(err)
        }
    }
}

impl ProcessError {
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::NoChildren => errno::ECHILD,
            Self::InvalidOptions(_) => errno::EINVAL,
            Self::Sys(e) => e.0,
        }
    }
}
