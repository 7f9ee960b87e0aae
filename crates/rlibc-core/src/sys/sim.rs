//! In-memory model of the raw layer.
//!
//! `SimSys` keeps a file namespace, a table of open file descriptions shared
//! by descriptors, pipes with reader/writer counts, and a process table with
//! per-process descriptor maps. It cannot block: a read from an empty pipe
//! that still has writers, or a blocking wait on a running child, fails
//! with `EAGAIN` where a real kernel would suspend the caller.
//!
//! A `fork` returns [`Role::Parent`] to the caller; the child is entered
//! later with [`SimSys::resume_child`], which hands back [`Role::Child`].
//! When the child exits, control returns to its parent.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::errno::{EAGAIN, EBADF, ECHILD, EINVAL, EISDIR, ENOENT, EPIPE, ESPIPE};
use crate::error::SysError;
use crate::fcntl::{OpenFlags, Whence};
use crate::process::{Pipe, Role, WNOHANG, WaitTarget};

use super::{Fd, Pid, ProcessSys, RawIo};

const INIT_PID: Pid = 1;

#[derive(Debug)]
enum Object {
    File {
        path: Vec<u8>,
        offset: u64,
        flags: OpenFlags,
    },
    PipeRead(usize),
    PipeWrite(usize),
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct Description {
    object: Object,
    refs: usize,
}

#[derive(Debug, Default)]
struct SimPipe {
    data: VecDeque<u8>,
    readers: usize,
    writers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcState {
    Running,
    Zombie(i32),
}

#[derive(Debug)]
struct SimProc {
    parent: Option<Pid>,
    fds: BTreeMap<Fd, usize>,
    state: ProcState,
}

/// In-memory raw layer.
#[derive(Debug)]
pub struct SimSys {
    files: HashMap<Vec<u8>, Vec<u8>>,
    descriptions: Vec<Option<Description>>,
    pipes: Vec<SimPipe>,
    procs: BTreeMap<Pid, SimProc>,
    current: Pid,
    next_pid: Pid,
    stdin: VecDeque<u8>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    write_log: Vec<(Fd, usize)>,
    read_calls: usize,
    write_fault: Option<i32>,
    read_fault: Option<i32>,
}

impl Default for SimSys {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSys {
    /// A fresh system with one process holding descriptors 0, 1 and 2.
    #[must_use]
    pub fn new() -> Self {
        let mut sys = Self {
            files: HashMap::new(),
            descriptions: Vec::new(),
            pipes: Vec::new(),
            procs: BTreeMap::new(),
            current: INIT_PID,
            next_pid: INIT_PID + 1,
            stdin: VecDeque::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            write_log: Vec::new(),
            read_calls: 0,
            write_fault: None,
            read_fault: None,
        };
        let mut fds = BTreeMap::new();
        for (fd, object) in [(0, Object::Stdin), (1, Object::Stdout), (2, Object::Stderr)] {
            fds.insert(fd, sys.new_description(object));
        }
        sys.procs.insert(
            INIT_PID,
            SimProc {
                parent: None,
                fds,
                state: ProcState::Running,
            },
        );
        sys
    }

    /// Create or replace a file.
    pub fn put_file(&mut self, path: &[u8], contents: &[u8]) {
        self.files.insert(path.to_vec(), contents.to_vec());
    }

    #[must_use]
    pub fn file_contents(&self, path: &[u8]) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn push_stdin(&mut self, data: &[u8]) {
        self.stdin.extend(data);
    }

    #[must_use]
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Every successful raw write as `(fd, bytes written)`.
    #[must_use]
    pub fn write_log(&self) -> &[(Fd, usize)] {
        &self.write_log
    }

    pub fn clear_write_log(&mut self) {
        self.write_log.clear();
    }

    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    /// Make every subsequent write fail with `errno` (or stop failing).
    pub fn set_write_fault(&mut self, errno: Option<i32>) {
        self.write_fault = errno;
    }

    /// Make every subsequent read fail with `errno` (or stop failing).
    pub fn set_read_fault(&mut self, errno: Option<i32>) {
        self.read_fault = errno;
    }

    #[must_use]
    pub fn current_pid(&self) -> Pid {
        self.current
    }

    /// Number of descriptors open in the current process.
    #[must_use]
    pub fn open_fd_count(&self) -> usize {
        self.procs.get(&self.current).map_or(0, |p| p.fds.len())
    }

    /// True once `pid` has terminated but has not been reaped.
    #[must_use]
    pub fn is_zombie(&self, pid: Pid) -> bool {
        matches!(
            self.procs.get(&pid).map(|p| p.state),
            Some(ProcState::Zombie(_))
        )
    }

    /// Enter a forked child that has not run yet. Returns the role the
    /// child observes on return from `fork`.
    pub fn resume_child(&mut self, pid: Pid) -> Result<Role, SysError> {
        match self.procs.get(&pid) {
            Some(p) if p.parent == Some(self.current) && p.state == ProcState::Running => {
                self.current = pid;
                Ok(Role::Child)
            }
            _ => Err(SysError(ECHILD)),
        }
    }

    /// Switch execution to any running process.
    pub fn switch_to(&mut self, pid: Pid) -> Result<(), SysError> {
        match self.procs.get(&pid) {
            Some(p) if p.state == ProcState::Running => {
                self.current = pid;
                Ok(())
            }
            _ => Err(SysError(EINVAL)),
        }
    }

    /// Terminate `pid` as if by signal `sig`.
    pub fn kill(&mut self, pid: Pid, sig: i32) -> Result<(), SysError> {
        self.terminate(pid, sig & 0x7f)
    }

    fn terminate(&mut self, pid: Pid, raw_status: i32) -> Result<(), SysError> {
        let proc = self.procs.get_mut(&pid).ok_or(SysError(EINVAL))?;
        if proc.state != ProcState::Running {
            return Err(SysError(EINVAL));
        }
        proc.state = ProcState::Zombie(raw_status);
        let fds = std::mem::take(&mut proc.fds);
        let parent = proc.parent;
        for idx in fds.into_values() {
            self.decref(idx);
        }
        if pid == self.current {
            if let Some(parent) = parent {
                self.current = parent;
            }
        }
        Ok(())
    }

    fn new_description(&mut self, object: Object) -> usize {
        match &object {
            Object::PipeRead(p) => self.pipes[*p].readers += 1,
            Object::PipeWrite(p) => self.pipes[*p].writers += 1,
            _ => {}
        }
        let desc = Description { object, refs: 1 };
        if let Some(slot) = self.descriptions.iter().position(Option::is_none) {
            self.descriptions[slot] = Some(desc);
            slot
        } else {
            self.descriptions.push(Some(desc));
            self.descriptions.len() - 1
        }
    }

    fn incref(&mut self, idx: usize) {
        if let Some(desc) = self.descriptions[idx].as_mut() {
            desc.refs += 1;
            match desc.object {
                Object::PipeRead(p) => self.pipes[p].readers += 1,
                Object::PipeWrite(p) => self.pipes[p].writers += 1,
                _ => {}
            }
        }
    }

    fn decref(&mut self, idx: usize) {
        let Some(desc) = self.descriptions[idx].as_mut() else {
            return;
        };
        desc.refs -= 1;
        match desc.object {
            Object::PipeRead(p) => self.pipes[p].readers -= 1,
            Object::PipeWrite(p) => self.pipes[p].writers -= 1,
            _ => {}
        }
        if desc.refs == 0 {
            self.descriptions[idx] = None;
        }
    }

    fn proc_mut(&mut self) -> &mut SimProc {
        self.procs
            .entry(self.current)
            .or_insert_with(|| SimProc {
                parent: None,
                fds: BTreeMap::new(),
                state: ProcState::Running,
            })
    }

    fn lookup(&self, fd: Fd) -> Result<usize, SysError> {
        self.procs
            .get(&self.current)
            .and_then(|p| p.fds.get(&fd).copied())
            .ok_or(SysError(EBADF))
    }

    fn lowest_free_fd(&self) -> Fd {
        let used = self.procs.get(&self.current).map(|p| &p.fds);
        (0..)
            .find(|fd| used.is_none_or(|m| !m.contains_key(fd)))
            .unwrap_or(0)
    }

    fn install(&mut self, idx: usize) -> Fd {
        let fd = self.lowest_free_fd();
        self.proc_mut().fds.insert(fd, idx);
        fd
    }
}

impl RawIo for SimSys {
    fn open(&mut self, path: &[u8], flags: OpenFlags) -> Result<Fd, SysError> {
        if path.is_empty() {
            return Err(SysError(ENOENT));
        }
        if path.ends_with(b"/") {
            return Err(SysError(EISDIR));
        }
        match self.files.get_mut(path) {
            Some(contents) => {
                if flags.contains(OpenFlags::TRUNC) && flags.writable() {
                    contents.clear();
                }
            }
            None if flags.contains(OpenFlags::CREAT) => {
                self.files.insert(path.to_vec(), Vec::new());
            }
            None => return Err(SysError(ENOENT)),
        }
        let idx = self.new_description(Object::File {
            path: path.to_vec(),
            offset: 0,
            flags,
        });
        Ok(self.install(idx))
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, SysError> {
        let idx = self.lookup(fd)?;
        if let Some(errno) = self.read_fault {
            return Err(SysError(errno));
        }
        self.read_calls += 1;
        let files = &self.files;
        let pipes = &mut self.pipes;
        let stdin = &mut self.stdin;
        let desc = self.descriptions[idx].as_mut().ok_or(SysError(EBADF))?;
        match &mut desc.object {
            Object::File {
                path,
                offset,
                flags,
            } => {
                if !flags.readable() {
                    return Err(SysError(EBADF));
                }
                let contents = files.get(path.as_slice()).map_or(&[][..], Vec::as_slice);
                let start = (*offset as usize).min(contents.len());
                let n = buf.len().min(contents.len() - start);
                buf[..n].copy_from_slice(&contents[start..start + n]);
                *offset += n as u64;
                Ok(n)
            }
            Object::PipeRead(p) => {
                let pipe = &mut pipes[*p];
                if pipe.data.is_empty() {
                    return if pipe.writers == 0 {
                        Ok(0)
                    } else {
                        Err(SysError(EAGAIN))
                    };
                }
                let n = buf.len().min(pipe.data.len());
                for (dst, src) in buf.iter_mut().zip(pipe.data.drain(..n)) {
                    *dst = src;
                }
                Ok(n)
            }
            Object::Stdin => {
                let n = buf.len().min(stdin.len());
                for (dst, src) in buf.iter_mut().zip(stdin.drain(..n)) {
                    *dst = src;
                }
                Ok(n)
            }
            Object::PipeWrite(_) | Object::Stdout | Object::Stderr => Err(SysError(EBADF)),
        }
    }

    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, SysError> {
        let idx = self.lookup(fd)?;
        if let Some(errno) = self.write_fault {
            return Err(SysError(errno));
        }
        let files = &mut self.files;
        let pipes = &mut self.pipes;
        let desc = self.descriptions[idx].as_mut().ok_or(SysError(EBADF))?;
        match &mut desc.object {
            Object::File {
                path,
                offset,
                flags,
            } => {
                if !flags.writable() {
                    return Err(SysError(EBADF));
                }
                let contents = files.entry(path.clone()).or_default();
                if flags.contains(OpenFlags::APPEND) {
                    *offset = contents.len() as u64;
                }
                let start = *offset as usize;
                if contents.len() < start + buf.len() {
                    contents.resize(start + buf.len(), 0);
                }
                contents[start..start + buf.len()].copy_from_slice(buf);
                *offset += buf.len() as u64;
            }
            Object::PipeWrite(p) => {
                let pipe = &mut pipes[*p];
                if pipe.readers == 0 {
                    return Err(SysError(EPIPE));
                }
                pipe.data.extend(buf);
            }
            Object::Stdout => self.stdout.extend_from_slice(buf),
            Object::Stderr => self.stderr.extend_from_slice(buf),
            Object::PipeRead(_) | Object::Stdin => return Err(SysError(EBADF)),
        }
        self.write_log.push((fd, buf.len()));
        Ok(buf.len())
    }

    fn close(&mut self, fd: Fd) -> Result<(), SysError> {
        let idx = self
            .procs
            .get_mut(&self.current)
            .and_then(|p| p.fds.remove(&fd))
            .ok_or(SysError(EBADF))?;
        self.decref(idx);
        Ok(())
    }

    fn lseek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, SysError> {
        let idx = self.lookup(fd)?;
        let files = &self.files;
        let desc = self.descriptions[idx].as_mut().ok_or(SysError(EBADF))?;
        match &mut desc.object {
            Object::File {
                path, offset: cur, ..
            } => {
                let len = files.get(path.as_slice()).map_or(0, Vec::len) as i64;
                let base = match whence {
                    Whence::Set => 0,
                    Whence::Cur => *cur as i64,
                    Whence::End => len,
                };
                let target = base.checked_add(offset).ok_or(SysError(EINVAL))?;
                if target < 0 {
                    return Err(SysError(EINVAL));
                }
                *cur = target as u64;
                Ok(*cur)
            }
            _ => Err(SysError(ESPIPE)),
        }
    }

    fn dup(&mut self, fd: Fd) -> Result<Fd, SysError> {
        let idx = self.lookup(fd)?;
        self.incref(idx);
        Ok(self.install(idx))
    }

    fn dup2(&mut self, old: Fd, new: Fd) -> Result<Fd, SysError> {
        let idx = self.lookup(old)?;
        if new < 0 {
            return Err(SysError(EBADF));
        }
        if old == new {
            return Ok(new);
        }
        if self.lookup(new).is_ok() {
            self.close(new)?;
        }
        self.incref(idx);
        self.proc_mut().fds.insert(new, idx);
        Ok(new)
    }
}

impl ProcessSys for SimSys {
    fn fork(&mut self) -> Result<Role, SysError> {
        let fds = self
            .procs
            .get(&self.current)
            .map(|p| p.fds.clone())
            .unwrap_or_default();
        for &idx in fds.values() {
            self.incref(idx);
        }
        let child = self.next_pid;
        self.next_pid += 1;
        self.procs.insert(
            child,
            SimProc {
                parent: Some(self.current),
                fds,
                state: ProcState::Running,
            },
        );
        Ok(Role::Parent { child })
    }

    fn wait4(
        &mut self,
        target: WaitTarget,
        options: i32,
    ) -> Result<Option<(Pid, i32)>, SysError> {
        let me = self.current;
        let candidates: Vec<(Pid, ProcState)> = self
            .procs
            .iter()
            .filter(|(pid, p)| {
                p.parent == Some(me)
                    && match target {
                        WaitTarget::Any => true,
                        WaitTarget::Pid(want) => **pid == want,
                    }
            })
            .map(|(pid, p)| (*pid, p.state))
            .collect();
        if candidates.is_empty() {
            return Err(SysError(ECHILD));
        }
        let reaped = candidates.iter().find_map(|(pid, state)| match state {
            ProcState::Zombie(status) => Some((*pid, *status)),
            ProcState::Running => None,
        });
        match reaped {
            Some((pid, status)) => {
                self.procs.remove(&pid);
                for p in self.procs.values_mut() {
                    if p.parent == Some(pid) {
                        p.parent = Some(INIT_PID);
                    }
                }
                Ok(Some((pid, status)))
            }
            None if options & WNOHANG != 0 => Ok(None),
            None => Err(SysError(EAGAIN)),
        }
    }

    fn pipe(&mut self) -> Result<Pipe, SysError> {
        self.pipes.push(SimPipe::default());
        let p = self.pipes.len() - 1;
        let read_idx = self.new_description(Object::PipeRead(p));
        let read = self.install(read_idx);
        let write_idx = self.new_description(Object::PipeWrite(p));
        let write = self.install(write_idx);
        Ok(Pipe { read, write })
    }

    fn getpid(&mut self) -> Pid {
        self.current
    }

    fn exit(&mut self, status: i32) {
        let _ = self.terminate(self.current, (status & 0xff) << 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_without_create_fails() {
        let mut sys = SimSys::new();
        assert_eq!(sys.open(b"/nope", OpenFlags::RDONLY), Err(SysError(ENOENT)));
    }

    #[test]
    fn descriptors_start_after_stdio() {
        let mut sys = SimSys::new();
        let fd = sys
            .open(b"/a", OpenFlags::WRONLY | OpenFlags::CREAT)
            .unwrap();
        assert_eq!(fd, 3);
        sys.close(fd).unwrap();
        assert_eq!(sys.close(fd), Err(SysError(EBADF)));
    }

    #[test]
    fn write_then_read_file() {
        let mut sys = SimSys::new();
        let fd = sys
            .open(b"/f", OpenFlags::RDWR | OpenFlags::CREAT)
            .unwrap();
        assert_eq!(sys.write(fd, b"hello").unwrap(), 5);
        assert_eq!(sys.lseek(fd, 0, Whence::Set).unwrap(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(sys.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(sys.read(fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn append_writes_at_end() {
        let mut sys = SimSys::new();
        sys.put_file(b"/log", b"ab");
        let fd = sys
            .open(b"/log", OpenFlags::WRONLY | OpenFlags::APPEND)
            .unwrap();
        sys.write(fd, b"cd").unwrap();
        assert_eq!(sys.file_contents(b"/log"), Some(&b"abcd"[..]));
    }

    #[test]
    fn truncate_on_open() {
        let mut sys = SimSys::new();
        sys.put_file(b"/t", b"old contents");
        sys.open(b"/t", OpenFlags::WRONLY | OpenFlags::TRUNC).unwrap();
        assert_eq!(sys.file_contents(b"/t"), Some(&b""[..]));
    }

    #[test]
    fn read_only_descriptor_rejects_write() {
        let mut sys = SimSys::new();
        sys.put_file(b"/r", b"x");
        let fd = sys.open(b"/r", OpenFlags::RDONLY).unwrap();
        assert_eq!(sys.write(fd, b"y"), Err(SysError(EBADF)));
    }

    #[test]
    fn pipe_reports_eof_after_writers_close() {
        let mut sys = SimSys::new();
        let pipe = sys.pipe().unwrap();
        sys.write(pipe.write, b"xy").unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(sys.read(pipe.read, &mut buf).unwrap(), 1);
        sys.close(pipe.write).unwrap();
        assert_eq!(sys.read(pipe.read, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'y');
        assert_eq!(sys.read(pipe.read, &mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_pipe_with_writer_would_block() {
        let mut sys = SimSys::new();
        let pipe = sys.pipe().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(sys.read(pipe.read, &mut buf), Err(SysError(EAGAIN)));
    }

    #[test]
    fn write_without_readers_is_epipe() {
        let mut sys = SimSys::new();
        let pipe = sys.pipe().unwrap();
        sys.close(pipe.read).unwrap();
        assert_eq!(sys.write(pipe.write, b"z"), Err(SysError(EPIPE)));
    }

    #[test]
    fn dup_shares_offset() {
        let mut sys = SimSys::new();
        sys.put_file(b"/d", b"abcdef");
        let a = sys.open(b"/d", OpenFlags::RDONLY).unwrap();
        let b = sys.dup(a).unwrap();
        let mut buf = [0u8; 2];
        sys.read(a, &mut buf).unwrap();
        sys.read(b, &mut buf).unwrap();
        assert_eq!(&buf, b"cd");
    }

    #[test]
    fn dup2_replaces_target() {
        let mut sys = SimSys::new();
        let fd = sys
            .open(b"/out", OpenFlags::WRONLY | OpenFlags::CREAT)
            .unwrap();
        assert_eq!(sys.dup2(fd, 1).unwrap(), 1);
        sys.write(1, b"redirected").unwrap();
        assert_eq!(sys.file_contents(b"/out"), Some(&b"redirected"[..]));
        assert!(sys.stdout().is_empty());
    }

    #[test]
    fn fork_inherits_pipe_ends() {
        let mut sys = SimSys::new();
        let pipe = sys.pipe().unwrap();
        let Role::Parent { child } = sys.fork().unwrap() else {
            panic!("caller must observe the parent role");
        };
        sys.close(pipe.write).unwrap();
        let mut buf = [0u8; 4];
        // The child still holds a write end.
        assert_eq!(sys.read(pipe.read, &mut buf), Err(SysError(EAGAIN)));

        assert_eq!(sys.resume_child(child).unwrap(), Role::Child);
        sys.write(pipe.write, b"hi").unwrap();
        sys.exit(0);
        assert_eq!(sys.current_pid(), INIT_PID);

        assert_eq!(sys.read(pipe.read, &mut buf).unwrap(), 2);
        assert_eq!(sys.read(pipe.read, &mut buf).unwrap(), 0);
    }

    #[test]
    fn wait_reaps_exited_child_once() {
        let mut sys = SimSys::new();
        let Role::Parent { child } = sys.fork().unwrap() else {
            panic!("expected parent");
        };
        assert_eq!(sys.wait4(WaitTarget::Any, WNOHANG).unwrap(), None);
        sys.resume_child(child).unwrap();
        sys.exit(7);
        assert!(sys.is_zombie(child));
        assert_eq!(
            sys.wait4(WaitTarget::Pid(child), 0).unwrap(),
            Some((child, 7 << 8))
        );
        assert_eq!(sys.wait4(WaitTarget::Any, 0), Err(SysError(ECHILD)));
    }

    #[test]
    fn wait_without_children_fails() {
        let mut sys = SimSys::new();
        assert_eq!(sys.wait4(WaitTarget::Any, 0), Err(SysError(ECHILD)));
    }

    #[test]
    fn write_fault_is_reported() {
        let mut sys = SimSys::new();
        sys.set_write_fault(Some(crate::errno::EIO));
        assert_eq!(sys.write(1, b"x"), Err(SysError(crate::errno::EIO)));
        sys.set_write_fault(None);
        assert_eq!(sys.write(1, b"x"), Ok(1));
        assert_eq!(sys.write_log(), &[(1, 1)]);
    }
}
