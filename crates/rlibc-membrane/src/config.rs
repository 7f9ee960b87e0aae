//! Runtime configuration.
//!
//! Read from the environment on first use and cached for the life of the
//! process:
//! - `RLIBC_ARENA_SIZE`: bytes reserved for the heap arena (default 16 MiB).
//!   Accepts decimal, `0x` hex, or a `k`/`m` suffix.
//! - `RLIBC_BUFSIZ`: capacity of a stream buffer (default 8192).
//! - `RLIBC_STDOUT_BUFFERING`: `line` (default), `full`, or `none`.

use std::sync::OnceLock;

use serde::Serialize;

/// Default arena size when `RLIBC_ARENA_SIZE` is unset.
pub const DEFAULT_ARENA_SIZE: usize = 16 * 1024 * 1024;
/// Default stream buffer capacity.
pub const DEFAULT_BUFSIZ: usize = 8192;

const MIN_ARENA_SIZE: usize = 4096;
const MIN_BUFSIZ: usize = 16;
const MAX_BUFSIZ: usize = 1 << 20;

/// Buffering policy applied to stdout when the process starts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferingDefault {
    Full,
    #[default]
    Line,
    None,
}

impl BufferingDefault {
    /// Parse from string (case-insensitive). Unknown values fall back to `Line`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "block" | "iofbf" => Self::Full,
            "none" | "unbuffered" | "ionbf" => Self::None,
            _ => Self::Line,
        }
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    pub arena_size: usize,
    pub bufsiz: usize,
    pub stdout_buffering: BufferingDefault,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_ARENA_SIZE,
            bufsiz: DEFAULT_BUFSIZ,
            stdout_buffering: BufferingDefault::Line,
        }
    }
}

impl RuntimeConfig {
    /// Build a configuration from a variable lookup function.
    ///
    /// Missing or unparsable values keep their defaults; sizes are clamped
    /// to sane bounds.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(size) = lookup("RLIBC_ARENA_SIZE").and_then(|v| parse_size(&v)) {
            cfg.arena_size = size.max(MIN_ARENA_SIZE);
        }
        if let Some(size) = lookup("RLIBC_BUFSIZ").and_then(|v| parse_size(&v)) {
            cfg.bufsiz = size.clamp(MIN_BUFSIZ, MAX_BUFSIZ);
        }
        if let Some(mode) = lookup("RLIBC_STDOUT_BUFFERING") {
            cfg.stdout_buffering = BufferingDefault::from_str_loose(&mode);
        }
        cfg
    }

    /// Build a configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Parse a byte size: `4096`, `0x1000`, `64k`, `16m`.
#[must_use]
pub fn parse_size(raw: &str) -> Option<usize> {
    let s = raw.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix("0x") {
        return usize::from_str_radix(&hex.replace('_', ""), 16).ok();
    }
    let (digits, mult) = match s.as_bytes().last()? {
        b'k' => (&s[..s.len() - 1], 1024usize),
        b'm' => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s.as_str(), 1),
    };
    digits.parse::<usize>().ok()?.checked_mul(mult)
}

static GLOBAL_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Get the process configuration (reads env vars on first call, caches thereafter).
#[must_use]
pub fn runtime_config() -> RuntimeConfig {
    *GLOBAL_CONFIG.get_or_init(RuntimeConfig::from_env)
}
