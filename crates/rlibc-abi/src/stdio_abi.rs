//! ABI layer for `<stdio.h>` functions.
//!
//! Provides stream management (fopen/fclose/fflush), buffered I/O
//! (fread/fwrite/fgetc/fputc/fgets/fputs/puts/ungetc), positioning
//! (fseek/ftell), status (feof/ferror/clearerr), buffering control
//! (setvbuf), `perror`, and the printf and scanf families.
//!
//! Architecture: a global registry maps opaque `FILE*` handles to
//! [`Stream`]s from rlibc-core. stdin/stdout/stderr are pre-registered at
//! well-known sentinel handles. Variadic arguments are read into tagged
//! [`FormatArg`](rlibc_core::stdio::FormatArg) values before formatting.

use std::collections::HashMap;
use std::collections::hash_map::ValuesMut;
use std::ffi::{c_char, c_int, c_long, c_void};
use std::sync::OnceLock;

use parking_lot::Mutex;
use rlibc_core::StreamError;
use rlibc_core::errno;
use rlibc_core::fcntl::Whence;
use rlibc_core::stdio::{self, BufMode, Stream, format_bounded, format_to_vec, scan_slice};
use rlibc_core::sys::linux::LinuxSys;
use rlibc_membrane::config::runtime_config;

use crate::errno_abi::{abi_errno, set_abi_errno};
use crate::util::{self, c_bytes};

/// C `EOF`.
pub const EOF: c_int = -1;

// ---------------------------------------------------------------------------
// Stream registry
// ---------------------------------------------------------------------------

/// `FILE *` handles for fds 0, 1 and 2. Opened streams get handles from
/// `FIRST_DYNAMIC_ID` upwards, so the two ranges never meet.
const STDIN_SENTINEL: usize = 0x1000_0001;
const STDOUT_SENTINEL: usize = 0x1000_0002;
const STDERR_SENTINEL: usize = 0x1000_0003;

/// First handle given to a stream opened with `fopen`.
const FIRST_DYNAMIC_ID: usize = 0x1000_0010;

struct StreamRegistry {
    streams: HashMap<usize, Stream>,
    next_id: usize,
}

impl StreamRegistry {
    fn new() -> Self {
        let [input, output, error] = stdio::standard_streams(&runtime_config());
        let mut streams = HashMap::new();
        streams.insert(STDIN_SENTINEL, input);
        streams.insert(STDOUT_SENTINEL, output);
        streams.insert(STDERR_SENTINEL, error);
        Self {
            streams,
            next_id: FIRST_DYNAMIC_ID,
        }
    }

    fn insert(&mut self, stream: Stream) -> usize {
        let id = self.next_id;
        self.next_id = id.wrapping_add(1);
        self.streams.insert(id, stream);
        id
    }
}

fn registry() -> &'static Mutex<StreamRegistry> {
    static REG: OnceLock<Mutex<StreamRegistry>> = OnceLock::new();
    REG.get_or_init(|| Mutex::new(StreamRegistry::new()))
}

/// Run `f` on the stream behind `handle`. An unknown handle is `EBADF`.
fn with_stream<T>(
    handle: usize,
    f: impl FnOnce(&mut Stream, &mut LinuxSys) -> Result<T, StreamError>,
) -> Result<T, StreamError> {
    let mut reg = registry().lock();
    let stream = reg.streams.get_mut(&handle).ok_or(StreamError::Closed)?;
    f(stream, &mut LinuxSys)
}

/// Hand every registered stream to `f`, for flushing at exit.
pub(crate) fn with_all_streams<T>(f: impl FnOnce(ValuesMut<'_, usize, Stream>) -> T) -> T {
    let mut reg = registry().lock();
    f(reg.streams.values_mut())
}

fn report(err: StreamError) {
    set_abi_errno(err.errno());
}

/// Map a stream result onto the `0` / `EOF` convention.
fn status(result: Result<(), StreamError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            EOF
        }
    }
}

/// Map a byte count onto the printf convention: count, or negative.
fn count(result: Result<usize, StreamError>) -> c_int {
    match result {
        Ok(n) => c_int::try_from(n).unwrap_or(c_int::MAX),
        Err(e) => {
            report(e);
            -1
        }
    }
}

fn byte_result(result: Result<Option<u8>, StreamError>) -> c_int {
    match result {
        Ok(Some(b)) => c_int::from(b),
        Ok(None) => EOF,
        Err(e) => {
            report(e);
            EOF
        }
    }
}

// ---------------------------------------------------------------------------
// stdin / stdout / stderr accessors
// ---------------------------------------------------------------------------

/// Global `stdin` pointer.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub static stdin: usize = STDIN_SENTINEL;

/// Global `stdout` pointer.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub static stdout: usize = STDOUT_SENTINEL;

/// Global `stderr` pointer.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub static stderr: usize = STDERR_SENTINEL;

// ---------------------------------------------------------------------------
// fopen / fclose / fflush
// ---------------------------------------------------------------------------

/// POSIX `fopen`. Mode strings: `r w a r+ w+ a+`, optionally with `b`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fopen(pathname: *const c_char, mode: *const c_char) -> *mut c_void {
    if pathname.is_null() || mode.is_null() {
        set_abi_errno(errno::EFAULT);
        return std::ptr::null_mut();
    }
    let path = unsafe { c_bytes(pathname) };
    let mode = unsafe { c_bytes(mode) };
    match stdio::fopen(&mut LinuxSys, path, mode) {
        Ok(stream) => registry().lock().insert(stream) as *mut c_void,
        Err(e) => {
            report(e);
            std::ptr::null_mut()
        }
    }
}

/// POSIX `fclose`. Flushes, releases the descriptor, and invalidates the
/// handle. A standard stream stays registered but refuses further I/O.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fclose(stream: *mut c_void) -> c_int {
    let id = stream as usize;
    let mut reg = registry().lock();
    let result = if id >= FIRST_DYNAMIC_ID {
        match reg.streams.remove(&id) {
            Some(mut s) => s.close(&mut LinuxSys),
            None => Err(StreamError::Closed),
        }
    } else {
        match reg.streams.get_mut(&id) {
            Some(s) => s.close(&mut LinuxSys),
            None => Err(StreamError::Closed),
        }
    };
    status(result)
}

/// POSIX `fflush`. A null stream flushes every open stream.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fflush(stream: *mut c_void) -> c_int {
    if stream.is_null() {
        let mut first_err = None;
        with_all_streams(|streams| {
            for s in streams.filter(|s| !s.is_closed()) {
                if let Err(e) = s.flush(&mut LinuxSys) {
                    first_err.get_or_insert(e);
                }
            }
        });
        return status(first_err.map_or(Ok(()), Err));
    }
    status(with_stream(stream as usize, |s, sys| s.flush(sys)))
}

// ---------------------------------------------------------------------------
// fread / fwrite
// ---------------------------------------------------------------------------

/// POSIX `fread`. Returns complete items read.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fread(
    ptr: *mut c_void,
    size: usize,
    nmemb: usize,
    stream: *mut c_void,
) -> usize {
    let Some(total) = size.checked_mul(nmemb) else {
        set_abi_errno(errno::EINVAL);
        return 0;
    };
    if total == 0 || ptr.is_null() {
        return 0;
    }
    let dst = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), total) };
    match with_stream(stream as usize, |s, sys| s.read_bytes(sys, dst)) {
        Ok(n) => n / size,
        Err(e) => {
            report(e);
            0
        }
    }
}

/// POSIX `fwrite`. Returns complete items written.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fwrite(
    ptr: *const c_void,
    size: usize,
    nmemb: usize,
    stream: *mut c_void,
) -> usize {
    let Some(total) = size.checked_mul(nmemb) else {
        set_abi_errno(errno::EINVAL);
        return 0;
    };
    if total == 0 || ptr.is_null() {
        return 0;
    }
    let src = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), total) };
    match with_stream(stream as usize, |s, sys| s.write_bytes(sys, src)) {
        Ok(n) => n / size,
        Err(e) => {
            report(e);
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Character and line I/O
// ---------------------------------------------------------------------------

/// POSIX `fgetc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fgetc(stream: *mut c_void) -> c_int {
    byte_result(with_stream(stream as usize, |s, sys| s.getc(sys)))
}

/// POSIX `getc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn getc(stream: *mut c_void) -> c_int {
    unsafe { fgetc(stream) }
}

/// POSIX `getchar`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn getchar() -> c_int {
    unsafe { fgetc(STDIN_SENTINEL as *mut c_void) }
}

/// POSIX `fputc`. Returns the byte written.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fputc(c: c_int, stream: *mut c_void) -> c_int {
    let byte = c as u8;
    match with_stream(stream as usize, |s, sys| s.putc(sys, byte)) {
        Ok(()) => c_int::from(byte),
        Err(e) => {
            report(e);
            EOF
        }
    }
}

/// POSIX `putc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn putc(c: c_int, stream: *mut c_void) -> c_int {
    unsafe { fputc(c, stream) }
}

/// POSIX `putchar`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn putchar(c: c_int) -> c_int {
    unsafe { fputc(c, STDOUT_SENTINEL as *mut c_void) }
}

/// POSIX `fgets`. Null when nothing was read.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fgets(buf: *mut c_char, size: c_int, stream: *mut c_void) -> *mut c_char {
    if buf.is_null() || size <= 0 {
        set_abi_errno(errno::EINVAL);
        return std::ptr::null_mut();
    }
    let dst = unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), size as usize) };
    if dst.len() == 1 {
        dst[0] = 0;
        return buf;
    }
    match with_stream(stream as usize, |s, sys| s.gets(sys, dst)) {
        Ok(0) => std::ptr::null_mut(),
        Ok(_) => buf,
        Err(e) => {
            report(e);
            std::ptr::null_mut()
        }
    }
}

/// POSIX `fputs`. Writes `s` without a newline.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fputs(s: *const c_char, stream: *mut c_void) -> c_int {
    if s.is_null() {
        set_abi_errno(errno::EFAULT);
        return EOF;
    }
    let bytes = unsafe { c_bytes(s) };
    match with_stream(stream as usize, |st, sys| st.puts(sys, bytes)) {
        Ok(n) => c_int::try_from(n).unwrap_or(c_int::MAX),
        Err(e) => {
            report(e);
            EOF
        }
    }
}

/// POSIX `puts`. Writes `s` and a newline to stdout.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn puts(s: *const c_char) -> c_int {
    if s.is_null() {
        set_abi_errno(errno::EFAULT);
        return EOF;
    }
    let bytes = unsafe { c_bytes(s) };
    match with_stream(STDOUT_SENTINEL, |st, sys| st.put_line(sys, bytes)) {
        Ok(n) => c_int::try_from(n).unwrap_or(c_int::MAX),
        Err(e) => {
            report(e);
            EOF
        }
    }
}

/// POSIX `ungetc`. One byte of pushback is guaranteed.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn ungetc(c: c_int, stream: *mut c_void) -> c_int {
    if c == EOF {
        return EOF;
    }
    let byte = c as u8;
    match with_stream(stream as usize, |s, sys| s.ungetc(sys, byte)) {
        Ok(true) => c_int::from(byte),
        Ok(false) => EOF,
        Err(e) => {
            report(e);
            EOF
        }
    }
}

// ---------------------------------------------------------------------------
// Positioning and status
// ---------------------------------------------------------------------------

/// POSIX `fseek`. `whence` is 0 (SET), 1 (CUR) or 2 (END).
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fseek(stream: *mut c_void, offset: c_long, whence: c_int) -> c_int {
    let Some(whence) = Whence::from_c(whence) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    match with_stream(stream as usize, |s, sys| s.seek(sys, offset, whence)) {
        Ok(_) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// POSIX `ftell`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn ftell(stream: *mut c_void) -> c_long {
    match with_stream(stream as usize, |s, sys| s.tell(sys)) {
        Ok(pos) => c_long::try_from(pos).unwrap_or(c_long::MAX),
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// POSIX `feof`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn feof(stream: *mut c_void) -> c_int {
    with_stream(stream as usize, |s, _| Ok(s.is_eof())).map_or(0, c_int::from)
}

/// POSIX `ferror`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn ferror(stream: *mut c_void) -> c_int {
    with_stream(stream as usize, |s, _| Ok(s.is_error())).map_or(0, c_int::from)
}

/// POSIX `clearerr`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn clearerr(stream: *mut c_void) {
    let _ = with_stream(stream as usize, |s, _| {
        s.clear_error();
        Ok(())
    });
}

/// POSIX `setvbuf`. Only valid before the first I/O on the stream. The
/// caller's buffer is not adopted; `size` sets the capacity (0 keeps
/// `BUFSIZ`).
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn setvbuf(
    stream: *mut c_void,
    _buf: *mut c_char,
    mode: c_int,
    size: usize,
) -> c_int {
    let Some(mode) = BufMode::from_posix(mode) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let size = if size == 0 { runtime_config().bufsiz } else { size };
    match with_stream(stream as usize, |s, _| s.set_buffering(mode, size)) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// POSIX `perror`. Writes `"<s>: <message>\n"` for the current errno to
/// stderr.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn perror(s: *const c_char) {
    let code = abi_errno();
    let mut line = Vec::with_capacity(64);
    if let Some(prefix) = unsafe { util::c_bytes_opt(s) }.filter(|p| !p.is_empty()) {
        line.extend_from_slice(prefix);
        line.extend_from_slice(b": ");
    }
    line.extend_from_slice(errno::describe(code).as_bytes());
    line.push(b'\n');
    let _ = with_stream(STDERR_SENTINEL, |st, sys| st.write_bytes(sys, &line));
    set_abi_errno(code);
}

// ---------------------------------------------------------------------------
// printf / fprintf / sprintf / snprintf
// ---------------------------------------------------------------------------

/// POSIX `fprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fprintf(stream: *mut c_void, format: *const c_char, mut args: ...) -> c_int {
    if format.is_null() {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let fmt = unsafe { c_bytes(format) };
    let Some(slots) = util::format_slots(fmt) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let values = va_format_args!(&slots, args);
    count(with_stream(stream as usize, |s, sys| stdio::fprintf(sys, s, fmt, &values)))
}

/// POSIX `printf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn printf(format: *const c_char, mut args: ...) -> c_int {
    if format.is_null() {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let fmt = unsafe { c_bytes(format) };
    let Some(slots) = util::format_slots(fmt) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let values = va_format_args!(&slots, args);
    count(with_stream(STDOUT_SENTINEL, |s, sys| stdio::fprintf(sys, s, fmt, &values)))
}

/// POSIX `sprintf`. The caller guarantees `str` holds the output and NUL.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sprintf(str: *mut c_char, format: *const c_char, mut args: ...) -> c_int {
    if str.is_null() || format.is_null() {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let fmt = unsafe { c_bytes(format) };
    let Some(slots) = util::format_slots(fmt) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let values = va_format_args!(&slots, args);
    let rendered = match format_to_vec(fmt, &values) {
        Ok(rendered) => rendered,
        Err(e) => return count(Err(e.into())),
    };
    unsafe {
        std::ptr::copy_nonoverlapping(rendered.as_ptr(), str.cast::<u8>(), rendered.len());
        *str.add(rendered.len()) = 0;
    }
    count(Ok(rendered.len()))
}

/// POSIX `snprintf`. Stores at most `size - 1` bytes plus a NUL and
/// returns the length the full output would have had.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn snprintf(
    str: *mut c_char,
    size: usize,
    format: *const c_char,
    mut args: ...
) -> c_int {
    if format.is_null() {
        set_abi_errno(errno::EFAULT);
        return -1;
    }
    let fmt = unsafe { c_bytes(format) };
    let Some(slots) = util::format_slots(fmt) else {
        set_abi_errno(errno::EINVAL);
        return -1;
    };
    let values = va_format_args!(&slots, args);
    let dst: &mut [u8] = if str.is_null() || size == 0 {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(str.cast::<u8>(), size) }
    };
    count(format_bounded(dst, fmt, &values).map_err(StreamError::from))
}

// ---------------------------------------------------------------------------
// scanf / fscanf / sscanf
// ---------------------------------------------------------------------------

/// POSIX `sscanf`. Returns the number of assigned conversions, or `EOF`
/// when the input ends before the first one.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sscanf(s: *const c_char, format: *const c_char, mut args: ...) -> c_int {
    if s.is_null() || format.is_null() {
        set_abi_errno(errno::EFAULT);
        return EOF;
    }
    let input = unsafe { c_bytes(s) };
    let fmt = unsafe { c_bytes(format) };
    let result = scan_slice(input, fmt);
    va_store_scan!(&result.items, args);
    result.c_return()
}

/// POSIX `fscanf`. Unconsumed input stays on the stream.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fscanf(stream: *mut c_void, format: *const c_char, mut args: ...) -> c_int {
    if format.is_null() {
        set_abi_errno(errno::EFAULT);
        return EOF;
    }
    let fmt = unsafe { c_bytes(format) };
    match with_stream(stream as usize, |s, sys| stdio::fscanf(sys, s, fmt)) {
        Ok(result) => {
            va_store_scan!(&result.items, args);
            result.c_return()
        }
        Err(e) => {
            report(e);
            EOF
        }
    }
}

/// POSIX `scanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn scanf(format: *const c_char, mut args: ...) -> c_int {
    if format.is_null() {
        set_abi_errno(errno::EFAULT);
        return EOF;
    }
    let fmt = unsafe { c_bytes(format) };
    match with_stream(STDIN_SENTINEL, |s, sys| stdio::fscanf(sys, s, fmt)) {
        Ok(result) => {
            va_store_scan!(&result.items, args);
            result.c_return()
        }
        Err(e) => {
            report(e);
            EOF
        }
    }
}
