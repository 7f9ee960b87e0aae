//! Runtime configuration and observability for rlibc.
//!
//! Everything in here is process-wide state that the engines in
//! `rlibc-core` and the C surface in `rlibc-abi` consult but never own:
//!
//! - **Configuration** (`config`): arena size, stdio buffer capacity and the
//!   default stdout buffering mode, read once from the environment.
//! - **Metrics** (`metrics`): atomic counters for allocator, stream and
//!   process activity.
//!
//! The library performs no logging of its own; counters are the only
//! diagnostic channel.

#![forbid(unsafe_code)]

pub mod config;
pub mod metrics;

pub use config::{BufferingDefault, RuntimeConfig, runtime_config};
pub use metrics::{MetricsSnapshot, RuntimeMetrics, global_metrics};
