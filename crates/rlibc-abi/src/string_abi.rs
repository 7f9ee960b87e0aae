//! ABI layer for `<string.h>` functions.
//!
//! Each entry point measures its C strings, builds slices over exactly the
//! bytes the operation may touch, and delegates to the safe routines in
//! `rlibc_core::string`.

use std::cell::Cell;
use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use rlibc_core::string;

use crate::util::{c_bytes, c_bytes_with_nul, scan_c_string};

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// C `memset`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn memset(dst: *mut c_void, c: c_int, n: usize) -> *mut c_void {
    if n == 0 || dst.is_null() {
        return dst;
    }
    let buf = unsafe { std::slice::from_raw_parts_mut(dst.cast::<u8>(), n) };
    string::memset(buf, c as u8, n);
    dst
}

/// C `memcmp`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn memcmp(s1: *const c_void, s2: *const c_void, n: usize) -> c_int {
    if n == 0 || s1.is_null() || s2.is_null() {
        return 0;
    }
    let a = unsafe { std::slice::from_raw_parts(s1.cast::<u8>(), n) };
    let b = unsafe { std::slice::from_raw_parts(s2.cast::<u8>(), n) };
    string::memcmp(a, b, n)
}

/// C `memcpy`. The regions must not overlap.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn memcpy(dst: *mut c_void, src: *const c_void, n: usize) -> *mut c_void {
    if n == 0 || dst.is_null() || src.is_null() {
        return dst;
    }
    let to = unsafe { std::slice::from_raw_parts_mut(dst.cast::<u8>(), n) };
    let from = unsafe { std::slice::from_raw_parts(src.cast::<u8>(), n) };
    string::memcpy(to, from, n);
    dst
}

/// C `memmove`. The regions may overlap.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn memmove(dst: *mut c_void, src: *const c_void, n: usize) -> *mut c_void {
    if n == 0 || dst.is_null() || src.is_null() || ptr::eq(dst.cast_const(), src) {
        return dst;
    }
    let (d, s) = (dst as usize, src as usize);
    let lo = d.min(s);
    let span = d.max(s) - lo + n;
    // One slice spanning both regions, so the overlap is handled in place.
    let buf = unsafe { std::slice::from_raw_parts_mut(lo as *mut u8, span) };
    string::memmove(buf, d - lo, s - lo, n);
    dst
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// C `strlen`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strlen(s: *const c_char) -> usize {
    if s.is_null() {
        return 0;
    }
    unsafe { scan_c_string(s, None) }.0
}

/// C `strcmp`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strcmp(s1: *const c_char, s2: *const c_char) -> c_int {
    let (a, b) = unsafe { (c_bytes(s1), c_bytes(s2)) };
    string::strcmp(a, b)
}

/// C `strncmp`. Reads at most `n` bytes of either string.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strncmp(s1: *const c_char, s2: *const c_char, n: usize) -> c_int {
    if n == 0 {
        return 0;
    }
    let (la, _) = unsafe { scan_c_string(s1, Some(n)) };
    let (lb, _) = unsafe { scan_c_string(s2, Some(n)) };
    let a = unsafe { std::slice::from_raw_parts(s1.cast::<u8>(), la) };
    let b = unsafe { std::slice::from_raw_parts(s2.cast::<u8>(), lb) };
    string::strncmp(a, b, n)
}

/// C `strcpy`. `dst` must hold `strlen(src) + 1` bytes.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strcpy(dst: *mut c_char, src: *const c_char) -> *mut c_char {
    let from = unsafe { c_bytes_with_nul(src) };
    let to = unsafe { std::slice::from_raw_parts_mut(dst.cast::<u8>(), from.len()) };
    string::strcpy(to, from);
    dst
}

/// C `strncpy`. Writes exactly `n` bytes, NUL-padding a short source; the
/// result is unterminated when `src` has `n` or more bytes.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strncpy(dst: *mut c_char, src: *const c_char, n: usize) -> *mut c_char {
    if n == 0 {
        return dst;
    }
    let (len, _) = unsafe { scan_c_string(src, Some(n)) };
    let from = unsafe { std::slice::from_raw_parts(src.cast::<u8>(), len) };
    let to = unsafe { std::slice::from_raw_parts_mut(dst.cast::<u8>(), n) };
    string::strncpy(to, from, n);
    dst
}

/// C `strcat`. `dst` must hold both strings and one NUL.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strcat(dst: *mut c_char, src: *const c_char) -> *mut c_char {
    let (dst_len, _) = unsafe { scan_c_string(dst, None) };
    let from = unsafe { c_bytes(src) };
    let to = unsafe { std::slice::from_raw_parts_mut(dst.cast::<u8>(), dst_len + from.len() + 1) };
    string::strcat(to, from);
    dst
}

/// C `strchr`. Searching for 0 finds the terminator.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strchr(s: *const c_char, c: c_int) -> *mut c_char {
    let hay = unsafe { c_bytes_with_nul(s) };
    match string::strchr(hay, c as u8) {
        Some(i) => s.wrapping_add(i).cast_mut(),
        None => ptr::null_mut(),
    }
}

/// C `strstr`. An empty needle matches at the start.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strstr(haystack: *const c_char, needle: *const c_char) -> *mut c_char {
    let (hay, pin) = unsafe { (c_bytes(haystack), c_bytes(needle)) };
    match string::strstr(hay, pin) {
        Some(i) => haystack.wrapping_add(i).cast_mut(),
        None => ptr::null_mut(),
    }
}

thread_local! {
    static STRTOK_SAVE: Cell<*mut c_char> = const { Cell::new(ptr::null_mut()) };
}

/// C `strtok`. Keeps its position per thread; pass null to continue the
/// previous string.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn strtok(s: *mut c_char, delim: *const c_char) -> *mut c_char {
    if delim.is_null() {
        return ptr::null_mut();
    }
    let current = if s.is_null() { STRTOK_SAVE.get() } else { s };
    if current.is_null() {
        return ptr::null_mut();
    }
    let (len, _) = unsafe { scan_c_string(current, None) };
    let buf = unsafe { std::slice::from_raw_parts_mut(current.cast::<u8>(), len + 1) };
    let delims = unsafe { c_bytes(delim) };
    match string::strtok_next(buf, 0, delims) {
        Some(token) => {
            STRTOK_SAVE.set(current.wrapping_add(token.resume));
            current.wrapping_add(token.start)
        }
        None => {
            STRTOK_SAVE.set(ptr::null_mut());
            ptr::null_mut()
        }
    }
}
