#![feature(c_variadic)]
// Every export takes raw pointers from C callers; per-function safety docs
// would repeat the C contract verbatim.
#![allow(clippy::missing_safety_doc)]
//! # rlibc-abi
//!
//! The `extern "C"` boundary for rlibc.
//!
//! This crate produces a `cdylib` exposing the C surface of the runtime:
//! descriptor I/O, buffered streams, the printf/scanf families, the heap,
//! process control, and the string/memory routines. Each entry point
//! converts C arguments into slices and tagged values, calls the safe
//! engine in `rlibc-core`, and maps the result back onto C return
//! conventions and `errno`.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> rlibc-core engine -> LinuxSys -> kernel
//! ```
//!
//! Symbols are only given unmangled names in release builds, so debug test
//! binaries can call the entry points without shadowing the host libc.

#[macro_use]
mod macros;

pub mod errno_abi;
pub mod util;

// Gated behind cfg(not(test)) because these modules own process-wide state
// (the heap arena, the stream registry) and issue real syscalls.
#[cfg(not(test))]
pub mod malloc_abi;
#[cfg(not(test))]
pub mod process_abi;
#[cfg(not(test))]
pub mod stdio_abi;
#[cfg(not(test))]
pub mod string_abi;
#[cfg(not(test))]
pub mod unistd_abi;
