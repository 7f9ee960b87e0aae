//! Integration tests for the `<string.h>` entry points.

use std::ffi::{CStr, c_char, c_void};

use rlibc_abi::string_abi::*;

fn cstr(p: *const c_char) -> &'static [u8] {
    unsafe { CStr::from_ptr(p) }.to_bytes()
}

#[test]
fn strlen_and_compare() {
    unsafe {
        assert_eq!(strlen(c"hello".as_ptr()), 5);
        assert_eq!(strlen(c"".as_ptr()), 0);
        assert_eq!(strcmp(c"abc".as_ptr(), c"abc".as_ptr()), 0);
        assert!(strcmp(c"abc".as_ptr(), c"abd".as_ptr()) < 0);
        assert!(strcmp(c"abcd".as_ptr(), c"abc".as_ptr()) > 0);
        assert_eq!(strncmp(c"abcX".as_ptr(), c"abcY".as_ptr(), 3), 0);
        assert!(strncmp(c"abcX".as_ptr(), c"abcY".as_ptr(), 4) < 0);
        assert_eq!(strncmp(c"a".as_ptr(), c"b".as_ptr(), 0), 0);
    }
}

#[test]
fn copy_and_concatenate() {
    let mut buf = [0x55 as c_char; 32];
    unsafe {
        let p = strcpy(buf.as_mut_ptr(), c"rust".as_ptr());
        assert_eq!(p, buf.as_mut_ptr());
        assert_eq!(cstr(buf.as_ptr()), b"rust");
        strcat(buf.as_mut_ptr(), c"-libc".as_ptr());
        assert_eq!(cstr(buf.as_ptr()), b"rust-libc");
    }
}

#[test]
fn strncpy_pads_short_source() {
    let mut buf = [b'#' as c_char; 8];
    unsafe { strncpy(buf.as_mut_ptr(), c"ab".as_ptr(), 5) };
    let bytes: Vec<u8> = buf.iter().map(|&c| c as u8).collect();
    assert_eq!(&bytes, b"ab\0\0\0###");
}

#[test]
fn search_functions() {
    let s = c"find the needle here";
    unsafe {
        let hit = strstr(s.as_ptr(), c"needle".as_ptr());
        assert_eq!(hit.offset_from(s.as_ptr()), 9);
        assert!(strstr(s.as_ptr(), c"absent".as_ptr()).is_null());
        assert_eq!(strstr(s.as_ptr(), c"".as_ptr()).cast_const(), s.as_ptr());

        let t = strchr(s.as_ptr(), b't' as i32);
        assert_eq!(t.offset_from(s.as_ptr()), 5);
        let end = strchr(s.as_ptr(), 0);
        assert_eq!(end.offset_from(s.as_ptr()), 20);
        assert!(strchr(s.as_ptr(), b'z' as i32).is_null());
    }
}

#[test]
fn strtok_walks_tokens() {
    let mut buf = *b",,alpha,beta;;gamma,\0";
    let p = buf.as_mut_ptr().cast::<c_char>();
    let delims = c",;".as_ptr();
    unsafe {
        let t1 = strtok(p, delims);
        assert_eq!(cstr(t1), b"alpha");
        let t2 = strtok(std::ptr::null_mut(), delims);
        assert_eq!(cstr(t2), b"beta");
        let t3 = strtok(std::ptr::null_mut(), delims);
        assert_eq!(cstr(t3), b"gamma");
        assert!(strtok(std::ptr::null_mut(), delims).is_null());
        assert!(strtok(std::ptr::null_mut(), delims).is_null());
    }
}

#[test]
fn memory_routines() {
    let mut a = [0u8; 16];
    let b = *b"0123456789abcdef";
    unsafe {
        memset(a.as_mut_ptr().cast(), b'x' as i32, 4);
        assert_eq!(&a[..5], b"xxxx\0");
        memcpy(a.as_mut_ptr().cast(), b.as_ptr().cast(), 16);
        assert_eq!(a, b);
        assert_eq!(memcmp(a.as_ptr().cast(), b.as_ptr().cast(), 16), 0);
        a[3] = b'0';
        assert!(memcmp(a.as_ptr().cast(), b.as_ptr().cast(), 16) < 0);
        assert_eq!(memcmp(a.as_ptr().cast(), b.as_ptr().cast(), 3), 0);
    }
}

#[test]
fn memmove_handles_overlap_both_ways() {
    let mut buf = *b"abcdefgh";
    unsafe {
        let base = buf.as_mut_ptr();
        memmove(base.add(2).cast(), base.cast::<c_void>(), 4);
    }
    assert_eq!(&buf, b"ababcdgh");

    let mut buf = *b"abcdefgh";
    unsafe {
        let base = buf.as_mut_ptr();
        memmove(base.cast(), base.add(3).cast::<c_void>(), 5);
    }
    assert_eq!(&buf, b"defghfgh");
}
