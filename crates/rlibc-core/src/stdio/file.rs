//! Buffered stream over a raw descriptor.
//!
//! `Stream` is the safe model of a C `FILE`. It never owns the raw layer:
//! every operation borrows one, so the same stream code runs over the
//! kernel or over the in-memory model.
//!
//! Error and end-of-input are sticky flags. Once either is set, reads report
//! no further progress and writes (for the error flag) are refused until
//! [`Stream::clear_error`].

use rlibc_membrane::metrics::{RuntimeMetrics, global_metrics};

use super::buffer::{BufMode, StreamBuffer};
use crate::errno::EIO;
use crate::error::{StreamError, SysError};
use crate::fcntl::{OpenFlags, Whence};
use crate::sys::{Fd, RawIo, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Idle,
    Reading,
    Writing,
}

/// One open buffered I/O channel.
#[derive(Debug, Clone)]
pub struct Stream {
    fd: Fd,
    buffer: StreamBuffer,
    flags: OpenFlags,
    orientation: Orientation,
    eof: bool,
    error: bool,
    closed: bool,
    pushback: Option<u8>,
}

impl Stream {
    /// Wrap an already-open descriptor.
    #[must_use]
    pub fn from_fd(fd: Fd, flags: OpenFlags, mode: BufMode, capacity: usize) -> Self {
        Self {
            fd,
            buffer: StreamBuffer::new(mode, capacity),
            flags,
            orientation: Orientation::Idle,
            eof: false,
            error: false,
            closed: false,
            pushback: None,
        }
    }

    /// Open `path` and wrap it in a fully-buffered stream.
    pub fn open<R: RawIo + ?Sized>(
        io: &mut R,
        path: &[u8],
        flags: OpenFlags,
        capacity: usize,
    ) -> Result<Self, StreamError> {
        let fd = io.open(path, flags)?;
        Ok(Self::from_fd(fd, flags, BufMode::Full, capacity))
    }

    /// One of the three process-wide streams: stdin line-buffered, stdout
    /// in `stdout_mode`, stderr unbuffered.
    #[must_use]
    pub fn standard(fd: Fd, capacity: usize, stdout_mode: BufMode) -> Self {
        match fd {
            STDIN_FILENO => Self::from_fd(fd, OpenFlags::RDONLY, BufMode::Line, capacity),
            STDOUT_FILENO => Self::from_fd(fd, OpenFlags::WRONLY, stdout_mode, capacity),
            STDERR_FILENO => Self::from_fd(fd, OpenFlags::WRONLY, BufMode::None, capacity),
            _ => Self::from_fd(fd, OpenFlags::RDWR, BufMode::Full, capacity),
        }
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Clear both sticky flags (`clearerr`).
    pub fn clear_error(&mut self) {
        self.eof = false;
        self.error = false;
    }

    pub fn buffer_mode(&self) -> BufMode {
        self.buffer.mode()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Output accepted but not yet written.
    pub fn pending_output(&self) -> &[u8] {
        if self.orientation == Orientation::Writing {
            self.buffer.pending()
        } else {
            &[]
        }
    }

    /// Change buffering (`setvbuf`). Only allowed before the first I/O.
    pub fn set_buffering(&mut self, mode: BufMode, size: usize) -> Result<(), StreamError> {
        self.ensure_open()?;
        if self.buffer.set_mode(mode, size) {
            Ok(())
        } else {
            Err(StreamError::BufferingLocked)
        }
    }

    /// Append `data`, flushing whenever the buffer fills and, in line
    /// mode, after any line terminator.
    pub fn write_bytes<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        data: &[u8],
    ) -> Result<usize, StreamError> {
        self.ensure_open()?;
        if self.error {
            return Err(StreamError::ErrorFlagged);
        }
        self.enter_writing(io)?;

        if self.buffer.mode() == BufMode::None {
            self.write_through(io, data)?;
            return Ok(data.len());
        }

        let mut rest = data;
        while !rest.is_empty() {
            let taken = self.buffer.append(rest);
            rest = &rest[taken..];
            if self.buffer.is_full() {
                self.flush_pending(io)?;
            }
        }
        if self.buffer.mode() == BufMode::Line && data.contains(&b'\n') {
            self.flush_pending(io)?;
        }
        Ok(data.len())
    }

    /// Read up to `dst.len()` bytes. Short only at end of input or error,
    /// which set the corresponding sticky flag.
    pub fn read_bytes<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        dst: &mut [u8],
    ) -> Result<usize, StreamError> {
        self.ensure_open()?;
        self.enter_reading(io)?;

        let mut done = 0;
        if !dst.is_empty() {
            if let Some(byte) = self.pushback.take() {
                dst[0] = byte;
                done = 1;
            }
        }
        while done < dst.len() {
            done += self.buffer.read_into(&mut dst[done..]);
            if done == dst.len() || self.eof || self.error {
                break;
            }
            let want = dst.len() - done;
            let fd = self.fd;
            RuntimeMetrics::inc(&global_metrics().raw_reads);
            let got = if want >= self.buffer.capacity() {
                io.read(fd, &mut dst[done..])
            } else {
                let slot = self.buffer.refill_slot();
                io.read(fd, slot).map(|n| {
                    self.buffer.set_filled(n);
                    0
                })
            };
            match got {
                Ok(n) if n > 0 => done += n,
                Ok(_) if !self.buffer.is_empty() => {}
                Ok(_) => self.eof = true,
                Err(e) => {
                    self.fail(e);
                }
            }
        }
        Ok(done)
    }

    /// Write out any pending output now.
    pub fn flush<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<(), StreamError> {
        self.ensure_open()?;
        if self.orientation == Orientation::Writing {
            self.flush_pending(io)?;
        }
        Ok(())
    }

    /// Flush pending output and release the descriptor. A second close is
    /// an error and writes nothing.
    pub fn close<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<(), StreamError> {
        self.ensure_open()?;
        let flushed = if self.orientation == Orientation::Writing {
            self.flush_pending(io)
        } else {
            Ok(())
        };
        self.closed = true;
        self.buffer.clear();
        self.pushback = None;
        let released = io.close(self.fd).map_err(StreamError::from);
        flushed.and(released)
    }

    /// Read one byte. `Ok(None)` at end of input or after an error.
    pub fn getc<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<Option<u8>, StreamError> {
        let mut byte = [0u8; 1];
        Ok((self.read_bytes(io, &mut byte)? == 1).then_some(byte[0]))
    }

    pub fn putc<R: RawIo + ?Sized>(&mut self, io: &mut R, byte: u8) -> Result<(), StreamError> {
        self.write_bytes(io, &[byte]).map(|_| ())
    }

    /// Push one byte back so the next read returns it. Clears end of input.
    /// Returns `false` if a pushed-back byte is already pending.
    pub fn ungetc<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        byte: u8,
    ) -> Result<bool, StreamError> {
        self.ensure_open()?;
        self.enter_reading(io)?;
        if self.pushback.is_some() {
            return Ok(false);
        }
        self.pushback = Some(byte);
        self.eof = false;
        Ok(true)
    }

    /// Read a line into `dst` (`fgets`).
    ///
    /// Stops after a `\n`, when `dst.len() - 1` bytes are stored, or at end
    /// of input, then appends a NUL. Returns the byte count excluding the
    /// NUL; 0 means nothing was read.
    pub fn gets<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        dst: &mut [u8],
    ) -> Result<usize, StreamError> {
        let Some(limit) = dst.len().checked_sub(1) else {
            return Ok(0);
        };
        let mut n = 0;
        while n < limit {
            match self.getc(io)? {
                Some(byte) => {
                    dst[n] = byte;
                    n += 1;
                    if byte == b'\n' {
                        break;
                    }
                }
                None => break,
            }
        }
        dst[n] = 0;
        Ok(n)
    }

    /// Write `s` (`fputs`).
    pub fn puts<R: RawIo + ?Sized>(&mut self, io: &mut R, s: &[u8]) -> Result<usize, StreamError> {
        self.write_bytes(io, s)
    }

    /// Write `s` followed by a newline (`puts`).
    pub fn put_line<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        s: &[u8],
    ) -> Result<usize, StreamError> {
        let n = self.write_bytes(io, s)?;
        self.write_bytes(io, b"\n")?;
        Ok(n + 1)
    }

    /// Reposition. Pending output is flushed, read-ahead discarded and end
    /// of input cleared.
    pub fn seek<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        offset: i64,
        whence: Whence,
    ) -> Result<u64, StreamError> {
        self.ensure_open()?;
        if self.orientation == Orientation::Writing {
            self.flush_pending(io)?;
        }
        let offset = if whence == Whence::Cur {
            offset - self.read_ahead() as i64
        } else {
            offset
        };
        let pos = io.lseek(self.fd, offset, whence)?;
        self.buffer.clear();
        self.pushback = None;
        self.eof = false;
        self.orientation = Orientation::Idle;
        Ok(pos)
    }

    /// Logical position, accounting for buffered bytes.
    pub fn tell<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<u64, StreamError> {
        self.ensure_open()?;
        let raw = io.lseek(self.fd, 0, Whence::Cur)?;
        Ok(match self.orientation {
            Orientation::Writing => raw + self.buffer.pending().len() as u64,
            Orientation::Reading => raw.saturating_sub(self.read_ahead() as u64),
            Orientation::Idle => raw,
        })
    }

    fn read_ahead(&self) -> usize {
        if self.orientation == Orientation::Reading {
            self.buffer.unread().len() + usize::from(self.pushback.is_some())
        } else {
            0
        }
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed {
            Err(StreamError::Closed)
        } else {
            Ok(())
        }
    }

    fn fail(&mut self, err: SysError) -> StreamError {
        self.error = true;
        RuntimeMetrics::inc(&global_metrics().stream_errors);
        StreamError::Sys(err)
    }

    fn enter_writing<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<(), StreamError> {
        if !self.flags.writable() {
            return Err(StreamError::WrongDirection("writing"));
        }
        if self.orientation == Orientation::Reading {
            let back = self.read_ahead() as i64;
            if back > 0 {
                // The read-ahead stays buffered when the channel cannot rewind.
                if let Err(e) = io.lseek(self.fd, -back, Whence::Cur) {
                    return Err(self.fail(e));
                }
            }
            self.buffer.clear();
            self.pushback = None;
        }
        self.orientation = Orientation::Writing;
        self.buffer.mark_io_started();
        Ok(())
    }

    fn enter_reading<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<(), StreamError> {
        if !self.flags.readable() {
            return Err(StreamError::WrongDirection("reading"));
        }
        if self.orientation == Orientation::Writing {
            self.flush_pending(io)?;
            self.buffer.clear();
        }
        self.orientation = Orientation::Reading;
        self.buffer.mark_io_started();
        Ok(())
    }

    fn flush_pending<R: RawIo + ?Sized>(&mut self, io: &mut R) -> Result<(), StreamError> {
        if self.buffer.pending().is_empty() {
            return Ok(());
        }
        RuntimeMetrics::inc(&global_metrics().flushes);
        while !self.buffer.pending().is_empty() {
            RuntimeMetrics::inc(&global_metrics().raw_writes);
            match io.write(self.fd, self.buffer.pending()) {
                Ok(0) => return Err(self.fail(SysError(EIO))),
                Ok(n) => self.buffer.consume(n),
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(())
    }

    fn write_through<R: RawIo + ?Sized>(
        &mut self,
        io: &mut R,
        mut data: &[u8],
    ) -> Result<(), StreamError> {
        while !data.is_empty() {
            RuntimeMetrics::inc(&global_metrics().raw_writes);
            match io.write(self.fd, data) {
                Ok(0) => return Err(self.fail(SysError(EIO))),
                Ok(n) => data = &data[n.min(data.len())..],
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(())
    }
}
