//! Buffered stream I/O and the formatted conversion engines.
//!
//! Streams own their buffers but borrow the raw layer per call. The
//! formatting engines know nothing about descriptors: they talk to a
//! [`printf::FormatSink`] or a [`scanf::ScanInput`], and the adapters here
//! connect those to a [`Stream`].

pub mod buffer;
pub mod file;
pub mod printf;
pub mod scanf;

use rlibc_membrane::config::{RuntimeConfig, runtime_config};

pub use buffer::{BUFSIZ, BufMode};
pub use file::Stream;
pub use printf::{FormatArg, FormatSink, format_bounded, format_output, format_to_vec};
pub use scanf::{ScanInput, ScanItem, ScanResult, ScanValue, format_input, scan_slice};

use crate::error::StreamError;
use crate::fcntl::{OpenFlags, parse_mode};
use crate::sys::{RawIo, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};

/// Routes formatted output into a stream.
pub struct StreamSink<'s, 'r, R: RawIo + ?Sized> {
    stream: &'s mut Stream,
    io: &'r mut R,
}

impl<'s, 'r, R: RawIo + ?Sized> StreamSink<'s, 'r, R> {
    pub fn new(stream: &'s mut Stream, io: &'r mut R) -> Self {
        Self { stream, io }
    }
}

impl<R: RawIo + ?Sized> FormatSink for StreamSink<'_, '_, R> {
    type Error = StreamError;

    fn put(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.stream.write_bytes(self.io, bytes).map(|_| ())
    }
}

/// Feeds a stream to the scan engine. The lookahead byte goes back onto the
/// stream when the adapter is finished.
pub struct StreamInput<'s, 'r, R: RawIo + ?Sized> {
    stream: &'s mut Stream,
    io: &'r mut R,
    lookahead: Option<u8>,
    error: Option<StreamError>,
}

impl<'s, 'r, R: RawIo + ?Sized> StreamInput<'s, 'r, R> {
    pub fn new(stream: &'s mut Stream, io: &'r mut R) -> Self {
        Self {
            stream,
            io,
            lookahead: None,
            error: None,
        }
    }

    /// Push back any unconsumed lookahead and report the first stream
    /// error seen while scanning.
    pub fn finish(self) -> Result<(), StreamError> {
        if let Some(byte) = self.lookahead {
            self.stream.ungetc(self.io, byte)?;
        }
        self.error.map_or(Ok(()), Err)
    }
}

impl<R: RawIo + ?Sized> ScanInput for StreamInput<'_, '_, R> {
    fn peek(&mut self) -> Option<u8> {
        if self.lookahead.is_none() && self.error.is_none() {
            match self.stream.getc(self.io) {
                Ok(byte) => self.lookahead = byte,
                Err(e) => self.error = Some(e),
            }
        }
        self.lookahead
    }

    fn bump(&mut self) {
        self.lookahead = None;
    }
}

/// Open `path` with a C mode string (`"r"`, `"w+"`, `"ab"`, ...).
pub fn fopen<R: RawIo + ?Sized>(io: &mut R, path: &[u8], mode: &[u8]) -> Result<Stream, StreamError> {
    let flags: OpenFlags = parse_mode(mode).ok_or(StreamError::InvalidMode)?;
    Stream::open(io, path, flags, runtime_config().bufsiz)
}

/// `fprintf`: render into `stream`. Returns the bytes produced.
pub fn fprintf<R: RawIo + ?Sized>(
    io: &mut R,
    stream: &mut Stream,
    fmt: &[u8],
    args: &[FormatArg<'_>],
) -> Result<usize, StreamError> {
    format_output(&mut StreamSink::new(stream, io), fmt, args)
}

/// `fscanf`: scan from `stream`, leaving unconsumed input on it.
pub fn fscanf<R: RawIo + ?Sized>(
    io: &mut R,
    stream: &mut Stream,
    fmt: &[u8],
) -> Result<ScanResult, StreamError> {
    let mut input = StreamInput::new(stream, io);
    let result = format_input(&mut input, fmt);
    input.finish()?;
    Ok(result)
}

/// The three standard streams, configured from `config`.
#[must_use]
pub fn standard_streams(config: &RuntimeConfig) -> [Stream; 3] {
    let stdout_mode = BufMode::from(config.stdout_buffering);
    [STDIN_FILENO, STDOUT_FILENO, STDERR_FILENO]
        .map(|fd| Stream::standard(fd, config.bufsiz, stdout_mode))
}
