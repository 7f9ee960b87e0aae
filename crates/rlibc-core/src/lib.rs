//! # rlibc-core
//!
//! Safe Rust implementations of the rlibc runtime engines.
//!
//! Every engine reaches the kernel through the [`sys::RawIo`] and
//! [`sys::ProcessSys`] traits, so the same code runs over the raw Linux
//! syscall layer ([`sys::linux::LinuxSys`]) and over the in-memory model
//! used by the tests ([`sys::sim::SimSys`]).
//!
//! No `unsafe` code is permitted at the crate level; the raw syscall veneer
//! is the single exception.

#![deny(unsafe_code)]

pub mod errno;
pub mod error;
pub mod fcntl;
pub mod malloc;
pub mod process;
pub mod stdio;
pub mod string;
pub mod sys;
#[allow(unsafe_code)]
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod syscall;

pub use error::{AllocError, FormatOverflow, ProcessError, StreamError, SysError};
