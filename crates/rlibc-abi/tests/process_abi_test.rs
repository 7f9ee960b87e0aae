//! Integration tests for fork/wait/pipe/_exit through the C surface.
//!
//! Children only issue raw syscalls before `_exit`, so forking from the
//! multi-threaded test harness is safe.

use std::ffi::c_int;
use std::sync::Mutex;

use rlibc_abi::errno_abi::abi_errno;
use rlibc_abi::process_abi::{_exit, fork, pipe, wait, waitpid};
use rlibc_abi::unistd_abi::{close, getpid, read, write};
use rlibc_core::errno::{EAGAIN, EBADF, ECHILD, EINVAL, ENOMEM};
use rlibc_core::process::{ExitStatus, WCONTINUED, WNOHANG, WUNTRACED, wexitstatus, wifexited};

/// `wait` reaps any child, so tests that fork run one at a time.
static FORK_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> std::sync::MutexGuard<'static, ()> {
    FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[test]
fn child_exit_code_reaches_parent() {
    let _guard = lock();
    unsafe {
        let pid = fork();
        assert!(pid >= 0);
        if pid == 0 {
            _exit(7);
        }
        let mut status: c_int = 0;
        assert_eq!(waitpid(pid, &raw mut status, 0), pid);
        assert!(wifexited(status));
        assert_eq!(wexitstatus(status), 7);
    }
}

#[test]
fn pipe_carries_child_output_until_eof() {
    let _guard = lock();
    let mut fds = [0 as c_int; 2];
    unsafe {
        assert_eq!(pipe(fds.as_mut_ptr()), 0);
        let pid = fork();
        assert!(pid >= 0);
        if pid == 0 {
            close(fds[0]);
            let msg = b"from child";
            write(fds[1], msg.as_ptr().cast(), msg.len());
            _exit(0);
        }
        close(fds[1]);
        let mut got = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = read(fds[0], chunk.as_mut_ptr().cast(), chunk.len());
            assert!(n >= 0);
            if n == 0 {
                break;
            }
            got.extend_from_slice(&chunk[..n as usize]);
        }
        close(fds[0]);
        assert_eq!(got, b"from child");
        let mut status: c_int = 0;
        assert_eq!(wait(&raw mut status), pid);
        assert_eq!(wexitstatus(status), 0);
    }
}

#[test]
fn nohang_wait_returns_zero_while_child_runs() {
    let _guard = lock();
    let mut gate = [0 as c_int; 2];
    unsafe {
        assert_eq!(pipe(gate.as_mut_ptr()), 0);
        let pid = fork();
        if pid == 0 {
            // Block until the parent closes its write end.
            close(gate[1]);
            let mut b = [0u8; 1];
            read(gate[0], b.as_mut_ptr().cast(), 1);
            _exit(3);
        }
        close(gate[0]);
        let mut status: c_int = 0;
        assert_eq!(waitpid(pid, &raw mut status, WNOHANG), 0);
        close(gate[1]);
        assert_eq!(waitpid(pid, &raw mut status, 0), pid);
        assert_eq!(wexitstatus(status), 3);
    }
}

#[test]
fn wait_errors() {
    let _guard = lock();
    unsafe {
        assert_eq!(waitpid(1, std::ptr::null_mut(), 0), -1);
        assert_eq!(abi_errno(), ECHILD);
        assert_eq!(waitpid(0, std::ptr::null_mut(), 0), -1);
        assert_eq!(abi_errno(), EINVAL);
        assert_eq!(waitpid(-1, std::ptr::null_mut(), 0x4000), -1);
        assert_eq!(abi_errno(), EINVAL);
    }
}

#[test]
fn getpid_matches_std() {
    assert_eq!(unsafe { getpid() } as u32, std::process::id());
}

#[test]
fn signaled_child_decodes_like_host_macros() {
    let _guard = lock();
    let mut gate = [0 as c_int; 2];
    unsafe {
        assert_eq!(pipe(gate.as_mut_ptr()), 0);
        let pid = fork();
        if pid == 0 {
            let mut b = [0u8; 1];
            read(gate[0], b.as_mut_ptr().cast(), 1);
            _exit(0);
        }
        assert_eq!(libc::kill(pid, libc::SIGKILL), 0);
        let mut status: c_int = 0;
        assert_eq!(waitpid(pid, &raw mut status, 0), pid);
        close(gate[0]);
        close(gate[1]);

        assert!(libc::WIFSIGNALED(status));
        assert_eq!(ExitStatus::from_raw(status), ExitStatus::Signaled(libc::WTERMSIG(status)));
        assert_eq!(libc::WTERMSIG(status), libc::SIGKILL);
    }
}

#[test]
fn status_encoding_matches_host_macros() {
    for code in [0, 1, 42, 255] {
        let raw = ExitStatus::Exited(code).to_raw();
        assert!(libc::WIFEXITED(raw));
        assert_eq!(libc::WEXITSTATUS(raw), code);
    }
    for sig in [libc::SIGTERM, libc::SIGKILL, libc::SIGSEGV] {
        let raw = ExitStatus::Signaled(sig).to_raw();
        assert!(libc::WIFSIGNALED(raw));
        assert_eq!(libc::WTERMSIG(raw), sig);
    }
    let raw = ExitStatus::Stopped(libc::SIGSTOP).to_raw();
    assert!(libc::WIFSTOPPED(raw));
    assert_eq!(libc::WSTOPSIG(raw), libc::SIGSTOP);
}

#[test]
fn wait_options_and_errno_values_match_host() {
    assert_eq!(WNOHANG, libc::WNOHANG);
    assert_eq!(WUNTRACED, libc::WUNTRACED);
    assert_eq!(WCONTINUED, libc::WCONTINUED);
    for (ours, host) in [
        (ECHILD, libc::ECHILD),
        (EINVAL, libc::EINVAL),
        (EAGAIN, libc::EAGAIN),
        (EBADF, libc::EBADF),
        (ENOMEM, libc::ENOMEM),
    ] {
        assert_eq!(ours, host);
    }
}
