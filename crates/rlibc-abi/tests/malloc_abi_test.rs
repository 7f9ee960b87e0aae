//! Integration tests for the heap entry points.

use std::ffi::c_void;

use rlibc_abi::errno_abi::abi_errno;
use rlibc_abi::malloc_abi::{MALLOC_ALIGNMENT, calloc, free, malloc, malloc_usable_size, realloc};
use rlibc_core::errno::ENOMEM;

unsafe fn fill(p: *mut c_void, n: usize, byte: u8) {
    unsafe { std::ptr::write_bytes(p.cast::<u8>(), byte, n) };
}

unsafe fn all_eq(p: *const c_void, n: usize, byte: u8) -> bool {
    unsafe { std::slice::from_raw_parts(p.cast::<u8>(), n) }
        .iter()
        .all(|&b| b == byte)
}

#[test]
fn malloc_returns_aligned_writable_memory() {
    unsafe {
        let p = malloc(100);
        assert!(!p.is_null());
        assert_eq!(p as usize % MALLOC_ALIGNMENT, 0);
        fill(p, 100, 0xAB);
        assert!(all_eq(p, 100, 0xAB));
        assert!(malloc_usable_size(p) >= 100);
        free(p);
    }
}

#[test]
fn distinct_live_blocks_do_not_overlap() {
    unsafe {
        let a = malloc(64);
        let b = malloc(64);
        assert!(!a.is_null() && !b.is_null());
        fill(a, 64, 1);
        fill(b, 64, 2);
        assert!(all_eq(a, 64, 1));
        assert!(all_eq(b, 64, 2));
        free(a);
        free(b);
    }
}

#[test]
fn calloc_zeroes_and_rejects_overflow() {
    unsafe {
        let p = calloc(32, 8);
        assert!(!p.is_null());
        assert!(all_eq(p, 256, 0));
        free(p);

        assert!(calloc(usize::MAX, 2).is_null());
        assert_eq!(abi_errno(), ENOMEM);
    }
}

#[test]
fn realloc_preserves_contents() {
    unsafe {
        let p = malloc(32);
        fill(p, 32, 7);
        let q = realloc(p, 4096);
        assert!(!q.is_null());
        assert!(all_eq(q, 32, 7));
        let r = realloc(q, 16);
        assert!(!r.is_null());
        assert!(all_eq(r, 16, 7));
        free(r);
    }
}

#[test]
fn realloc_null_and_zero() {
    unsafe {
        let p = realloc(std::ptr::null_mut(), 48);
        assert!(!p.is_null());
        assert!(realloc(p, 0).is_null());
    }
}

#[test]
fn free_tolerates_null_and_foreign_pointers() {
    let mut local = 0u64;
    unsafe {
        free(std::ptr::null_mut());
        free((&raw mut local).cast());
        assert_eq!(malloc_usable_size((&raw mut local).cast()), 0);
    }
}

#[test]
fn oversized_request_fails_with_enomem() {
    unsafe {
        assert!(malloc(usize::MAX / 2).is_null());
        assert_eq!(abi_errno(), ENOMEM);
    }
}
