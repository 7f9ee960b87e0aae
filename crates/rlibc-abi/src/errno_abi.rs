//! ABI layer for `<errno.h>`: thread-local errno storage.

use std::cell::UnsafeCell;
use std::ffi::c_int;

thread_local! {
    static ERRNO: UnsafeCell<c_int> = const { UnsafeCell::new(0) };
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn __errno_location() -> *mut c_int {
    ERRNO.with(|cell| cell.get())
}

/// Store `val` in the calling thread's errno.
#[inline]
pub fn set_abi_errno(val: c_int) {
    ERRNO.with(|cell| unsafe { *cell.get() = val });
}

/// Read the calling thread's errno.
#[inline]
pub fn abi_errno() -> c_int {
    ERRNO.with(|cell| unsafe { *cell.get() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_round_trip() {
        set_abi_errno(22);
        assert_eq!(abi_errno(), 22);
        let p = unsafe { __errno_location() };
        unsafe { *p = 9 };
        assert_eq!(abi_errno(), 9);
    }

    #[test]
    fn errno_is_per_thread() {
        set_abi_errno(5);
        let other = std::thread::spawn(abi_errno).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(abi_errno(), 5);
    }
}
