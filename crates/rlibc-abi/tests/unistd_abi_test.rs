//! Integration tests for descriptor I/O through the C surface.

use std::ffi::{CString, c_int};

use rlibc_abi::errno_abi::abi_errno;
use rlibc_abi::unistd_abi::{close, dup, dup2, lseek, open, read, write};
use rlibc_core::errno::{EBADF, EINVAL, ENOENT};

const O_RDONLY: c_int = 1;
const O_WRONLY: c_int = 2;
const O_RDWR: c_int = 3;
const O_APPEND: c_int = 4;
const O_CREAT: c_int = 8;
const O_TRUNC: c_int = 16;

fn temp_path(name: &str) -> CString {
    let path = std::env::temp_dir().join(format!("rlibc-unistd-{}-{name}", std::process::id()));
    let _ = std::fs::remove_file(&path);
    CString::new(path.to_string_lossy().into_owned()).unwrap()
}

#[test]
fn create_write_reopen_read() {
    let path = temp_path("rw");
    unsafe {
        let fd = open(path.as_ptr(), O_WRONLY | O_CREAT | O_TRUNC);
        assert!(fd >= 0);
        assert_eq!(write(fd, b"abcdef".as_ptr().cast(), 6), 6);
        assert_eq!(close(fd), 0);

        let fd = open(path.as_ptr(), O_RDONLY);
        assert!(fd >= 0);
        let mut buf = [0u8; 16];
        assert_eq!(read(fd, buf.as_mut_ptr().cast(), 16), 6);
        assert_eq!(&buf[..6], b"abcdef");
        assert_eq!(read(fd, buf.as_mut_ptr().cast(), 16), 0);
        assert_eq!(lseek(fd, 2, 0), 2);
        assert_eq!(read(fd, buf.as_mut_ptr().cast(), 2), 2);
        assert_eq!(&buf[..2], b"cd");
        assert_eq!(lseek(fd, 0, 2), 6);
        close(fd);
    }
}

#[test]
fn append_mode_writes_at_end() {
    let path = temp_path("append");
    unsafe {
        let fd = open(path.as_ptr(), O_WRONLY | O_CREAT | O_TRUNC);
        write(fd, b"one".as_ptr().cast(), 3);
        close(fd);
        let fd = open(path.as_ptr(), O_WRONLY | O_APPEND);
        write(fd, b"two".as_ptr().cast(), 3);
        close(fd);
    }
    assert_eq!(std::fs::read(path.to_str().unwrap()).unwrap(), b"onetwo");
}

#[test]
fn dup_shares_the_offset() {
    let path = temp_path("dup");
    unsafe {
        let fd = open(path.as_ptr(), O_RDWR | O_CREAT | O_TRUNC);
        let copy = dup(fd);
        assert!(copy >= 0 && copy != fd);
        write(fd, b"xy".as_ptr().cast(), 2);
        assert_eq!(lseek(copy, 0, 1), 2);

        let target = dup2(fd, copy);
        assert_eq!(target, copy);
        close(copy);
        close(fd);
    }
}

#[test]
fn errors_set_errno() {
    unsafe {
        let mut b = [0u8; 1];
        assert_eq!(read(-1, b.as_mut_ptr().cast(), 1), -1);
        assert_eq!(abi_errno(), EBADF);
        assert_eq!(close(-1), -1);
        assert_eq!(abi_errno(), EBADF);

        let missing = temp_path("missing");
        assert_eq!(open(missing.as_ptr(), O_RDONLY), -1);
        assert_eq!(abi_errno(), ENOENT);
        assert_eq!(open(missing.as_ptr(), 0), -1);
        assert_eq!(abi_errno(), EINVAL);
        assert_eq!(open(missing.as_ptr(), O_RDONLY | 64), -1);
        assert_eq!(abi_errno(), EINVAL);
        assert_eq!(lseek(0, 0, 5), -1);
        assert_eq!(abi_errno(), EINVAL);
    }
}
