//! Stream buffer.
//!
//! Three modes: fully-buffered (`_IOFBF`), line-buffered (`_IOLBF`) and
//! unbuffered (`_IONBF`). The buffer itself never talks to a descriptor;
//! the owning [`Stream`](super::Stream) decides when its contents reach the
//! raw layer.
//!
//! A buffer holds either pending output (`data[..filled]`) or read-ahead
//! (`data[pos..filled]`), never both; the stream's orientation says which.

/// Default buffer size (`BUFSIZ`).
pub const BUFSIZ: usize = 8192;

/// Buffering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufMode {
    /// Flush when the buffer is full.
    Full,
    /// Flush on newline or when the buffer is full.
    Line,
    /// No buffering, immediate I/O.
    None,
}

/// `setvbuf` mode constants.
pub const IOFBF: i32 = 0;
pub const IOLBF: i32 = 1;
pub const IONBF: i32 = 2;

impl BufMode {
    /// Convert from the `setvbuf` integer constant.
    pub fn from_posix(mode: i32) -> Option<BufMode> {
        match mode {
            IOFBF => Some(BufMode::Full),
            IOLBF => Some(BufMode::Line),
            IONBF => Some(BufMode::None),
            _ => Option::None,
        }
    }
}

impl From<rlibc_membrane::BufferingDefault> for BufMode {
    fn from(mode: rlibc_membrane::BufferingDefault) -> Self {
        match mode {
            rlibc_membrane::BufferingDefault::Full => BufMode::Full,
            rlibc_membrane::BufferingDefault::Line => BufMode::Line,
            rlibc_membrane::BufferingDefault::None => BufMode::None,
        }
    }
}

/// Fixed-capacity byte buffer with read and write cursors.
///
/// Invariant: `pos <= filled <= data.len()`.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    data: Vec<u8>,
    pos: usize,
    filled: usize,
    mode: BufMode,
    io_started: bool,
}

impl StreamBuffer {
    /// Create a buffer; unbuffered mode allocates nothing.
    pub fn new(mode: BufMode, capacity: usize) -> Self {
        Self {
            data: vec![0u8; storage_len(mode, capacity)],
            pos: 0,
            filled: 0,
            mode,
            io_started: false,
        }
    }

    pub fn mode(&self) -> BufMode {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Change mode and size. Returns `false` once I/O has started.
    pub fn set_mode(&mut self, mode: BufMode, size: usize) -> bool {
        if self.io_started {
            return false;
        }
        self.mode = mode;
        self.data = vec![0u8; storage_len(mode, size)];
        self.pos = 0;
        self.filled = 0;
        true
    }

    pub fn mark_io_started(&mut self) {
        self.io_started = true;
    }

    // --- write side ---

    /// Copy as much of `src` as fits. Returns the number of bytes taken.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len() - self.filled);
        self.data[self.filled..self.filled + n].copy_from_slice(&src[..n]);
        self.filled += n;
        n
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Output waiting to be written.
    pub fn pending(&self) -> &[u8] {
        &self.data[self.pos..self.filled]
    }

    /// Drop the first `n` pending bytes after a (possibly short) write.
    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.filled);
        if self.pos == self.filled {
            self.clear();
        }
    }

    // --- read side ---

    /// Read-ahead not yet handed to the caller.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..self.filled]
    }

    /// Move up to `dst.len()` unread bytes into `dst`.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.filled - self.pos);
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.consume(n);
        n
    }

    /// Empty the buffer and expose its whole storage for a refill.
    pub fn refill_slot(&mut self) -> &mut [u8] {
        self.clear();
        &mut self.data
    }

    /// Record how many bytes the last refill produced.
    pub fn set_filled(&mut self, n: usize) {
        self.pos = 0;
        self.filled = n.min(self.data.len());
    }

    /// Discard pending output or read-ahead.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.filled = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.filled
    }
}

fn storage_len(mode: BufMode, capacity: usize) -> usize {
    if matches!(mode, BufMode::None) {
        0
    } else {
        capacity.max(1)
    }
}
