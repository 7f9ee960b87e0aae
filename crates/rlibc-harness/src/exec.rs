//! Fixture case executors.
//!
//! Each executor decodes a case's JSON inputs, drives one rlibc-core engine
//! over a fresh [`SimSys`], and renders what it observed as a string. A
//! failing call is not a harness error: it is reported through
//! [`CaseRun::errno`] and compared like any other output.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use rlibc_core::errno::{EAGAIN, EINVAL, EIO, EOVERFLOW};
use rlibc_core::fcntl::OpenFlags;
use rlibc_core::malloc::Heap;
use rlibc_core::process::{self, Role, WaitTarget};
use rlibc_core::stdio::{self, BufMode, FormatArg, ScanValue, Stream};
use rlibc_core::string;
use rlibc_core::sys::sim::SimSys;
use rlibc_core::sys::{RawIo, STDOUT_FILENO, write_all};

use crate::error::HarnessError;

/// Executor names accepted in a case's `function` field.
pub const FUNCTIONS: &[&str] = &[
    "printf", "snprintf", "sscanf", "heap", "stream_write", "fgets", "fopen", "fork_wait",
    "waitpid", "pipe", "string",
];

/// What one case produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRun {
    pub output: String,
    /// errno of the failing call, 0 when everything succeeded.
    pub errno: i32,
}

impl CaseRun {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            errno: 0,
        }
    }

    fn failed(output: impl Into<String>, errno: i32) -> Self {
        Self {
            output: output.into(),
            errno,
        }
    }
}

/// Run the executor named `function` on `inputs`.
pub fn execute_fixture_case(
    function: &str,
    inputs: &serde_json::Value,
) -> Result<CaseRun, HarnessError> {
    match function {
        "printf" => decode(function, inputs).map(run_printf),
        "snprintf" => decode(function, inputs).map(run_snprintf),
        "sscanf" => decode(function, inputs).map(run_sscanf),
        "heap" => decode(function, inputs).map(run_heap),
        "stream_write" => decode(function, inputs).map(run_stream_write),
        "fgets" => decode(function, inputs).map(run_fgets),
        "fopen" => decode(function, inputs).map(run_fopen),
        "fork_wait" => decode(function, inputs).map(run_fork_wait),
        "waitpid" => decode(function, inputs).map(run_waitpid),
        "pipe" => decode(function, inputs).map(run_pipe),
        "string" => decode(function, inputs).map(run_string),
        other => Err(HarnessError::UnknownFunction(other.to_string())),
    }
}

fn decode<T: DeserializeOwned>(function: &str, inputs: &serde_json::Value) -> Result<T, HarnessError> {
    T::deserialize(inputs).map_err(|source| HarnessError::BadInputs {
        function: function.to_string(),
        source,
    })
}

/// Bytes as a single-line string: newlines and NULs come out as `\n`, `\0`.
fn escaped(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).escape_debug().to_string()
}

// ---------------------------------------------------------------------------
// Formatted output and input
// ---------------------------------------------------------------------------

/// A tagged variadic argument, e.g. `{"int": -5}` or `{"str": null}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSpec {
    Int(i64),
    Uint(u64),
    Char(String),
    Str(Option<String>),
    Ptr(usize),
    Float(f64),
}

impl ArgSpec {
    fn as_format_arg(&self) -> FormatArg<'_> {
        match self {
            Self::Int(v) => FormatArg::Int(*v),
            Self::Uint(v) => FormatArg::Uint(*v),
            Self::Char(s) => FormatArg::Char(s.bytes().next().unwrap_or(0)),
            Self::Str(s) => FormatArg::Str(s.as_deref().map(str::as_bytes)),
            Self::Ptr(p) => FormatArg::Pointer(*p),
            Self::Float(f) => FormatArg::Float(*f),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrintfInputs {
    format: String,
    #[serde(default)]
    args: Vec<ArgSpec>,
}

fn format_args(specs: &[ArgSpec]) -> Vec<FormatArg<'_>> {
    specs.iter().map(ArgSpec::as_format_arg).collect()
}

fn run_printf(inputs: PrintfInputs) -> CaseRun {
    let args = format_args(&inputs.args);
    match stdio::format_to_vec(inputs.format.as_bytes(), &args) {
        Ok(out) => CaseRun::ok(String::from_utf8_lossy(&out)),
        Err(_) => CaseRun::failed("format overflow", EOVERFLOW),
    }
}

#[derive(Debug, Deserialize)]
struct SnprintfInputs {
    format: String,
    size: usize,
    #[serde(default)]
    args: Vec<ArgSpec>,
}

/// Renders `<would-be length>|<stored bytes>`.
fn run_snprintf(inputs: SnprintfInputs) -> CaseRun {
    let args = format_args(&inputs.args);
    let mut buf = vec![0u8; inputs.size];
    let total = match stdio::format_bounded(&mut buf, inputs.format.as_bytes(), &args) {
        Ok(total) => total,
        Err(_) => return CaseRun::failed("format overflow", EOVERFLOW),
    };
    let stored = string::strlen(&buf);
    CaseRun::ok(format!("{total}|{}", escaped(&buf[..stored])))
}

#[derive(Debug, Deserialize)]
struct SscanfInputs {
    input: String,
    format: String,
}

/// Renders `<return value>:<item>,<item>,...`.
fn run_sscanf(inputs: SscanfInputs) -> CaseRun {
    let result = stdio::scan_slice(inputs.input.as_bytes(), inputs.format.as_bytes());
    let items: Vec<String> = result
        .items
        .iter()
        .map(|item| match &item.value {
            ScanValue::Int(v) => v.to_string(),
            ScanValue::Uint(v) => v.to_string(),
            ScanValue::Pointer(p) => format!("{p:#x}"),
            ScanValue::Float(v) => float_text(*v),
            ScanValue::Chars(bytes) | ScanValue::Str(bytes) => escaped(bytes),
        })
        .collect();
    CaseRun::ok(format!("{}:{}", result.c_return(), items.join(",")))
}

/// Text that reads back as `v`, spelled the way `%g` spells it.
fn float_text(v: f64) -> String {
    stdio::format_to_vec(b"%.17g", &[FormatArg::Float(v)])
        .map_or_else(|_| v.to_string(), |out| String::from_utf8_lossy(&out).into_owned())
}

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HeapOp {
    Malloc { id: String, size: usize },
    Calloc { id: String, count: usize, size: usize },
    Realloc { id: String, size: usize },
    Free { id: String },
}

#[derive(Debug, Deserialize)]
struct HeapInputs {
    arena: usize,
    ops: Vec<HeapOp>,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    addr: usize,
    len: usize,
    fill: u8,
}

fn fill_byte(id: &str) -> u8 {
    id.bytes().next().unwrap_or(b'?')
}

/// Renders `live=<n> free_blocks=<n>` after the last step. Every live block
/// is filled with a byte derived from its id and checked again when it is
/// resized; the heap's structural invariants are checked after each step.
fn run_heap(inputs: HeapInputs) -> CaseRun {
    let mut heap = match Heap::new(vec![0u8; inputs.arena]) {
        Ok(heap) => heap,
        Err(e) => return CaseRun::failed("arena rejected", e.errno()),
    };
    let mut live: BTreeMap<String, Block> = BTreeMap::new();
    // Freed ids keep their stale address so a second free can be tried.
    let mut freed: BTreeMap<String, usize> = BTreeMap::new();

    for (step, op) in inputs.ops.iter().enumerate() {
        let mut mismatch: Option<&str> = None;
        let applied = match op {
            HeapOp::Malloc { id, size } => heap.allocate(*size).map(|addr| {
                live.insert(id.clone(), Block { addr, len: *size, fill: fill_byte(id) });
            }),
            HeapOp::Calloc { id, count, size } => {
                heap.allocate_zeroed(*count, *size).map(|addr| {
                    let len = count * size;
                    if !heap.payload(addr).is_some_and(|p| p[..len].iter().all(|&b| b == 0)) {
                        mismatch = Some("calloc block not zeroed");
                    }
                    live.insert(id.clone(), Block { addr, len, fill: fill_byte(id) });
                })
            }
            HeapOp::Realloc { id, size } => {
                let old = live.get(id).copied();
                heap.resize(old.map(|b| b.addr), *size).map(|moved| match moved {
                    Some(addr) => {
                        if let Some(old) = old {
                            let kept = old.len.min(*size);
                            let intact = heap
                                .payload(addr)
                                .is_some_and(|p| p[..kept].iter().all(|&b| b == old.fill));
                            if !intact {
                                mismatch = Some("realloc lost contents");
                            }
                        }
                        live.insert(id.clone(), Block { addr, len: *size, fill: fill_byte(id) });
                    }
                    None => {
                        if let Some(b) = live.remove(id) {
                            freed.insert(id.clone(), b.addr);
                        }
                    }
                })
            }
            HeapOp::Free { id } => {
                let addr = live
                    .get(id)
                    .map(|b| b.addr)
                    .or_else(|| freed.get(id).copied())
                    .unwrap_or(usize::MAX);
                heap.release(addr).map(|()| {
                    live.remove(id);
                    freed.insert(id.clone(), addr);
                })
            }
        };
        if let Err(e) = applied {
            return CaseRun::failed(format!("step {step} failed"), e.errno());
        }
        if let Some(what) = mismatch {
            return CaseRun::failed(format!("step {step}: {what}"), EIO);
        }
        if let Err(corruption) = heap.check_invariants() {
            return CaseRun::failed(format!("step {step}: {corruption}"), EIO);
        }
        for block in live.values() {
            if let Some(payload) = heap.payload_mut(block.addr) {
                payload[..block.len].fill(block.fill);
            }
        }
    }
    CaseRun::ok(format!(
        "live={} free_blocks={}",
        heap.live_count(),
        heap.free_block_count()
    ))
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Buffering {
    Full,
    Line,
    None,
}

impl From<Buffering> for BufMode {
    fn from(b: Buffering) -> Self {
        match b {
            Buffering::Full => BufMode::Full,
            Buffering::Line => BufMode::Line,
            Buffering::None => BufMode::None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamWriteInputs {
    buffering: Buffering,
    capacity: usize,
    writes: Vec<String>,
    #[serde(default)]
    flush: bool,
    #[serde(default)]
    write_fault: Option<i32>,
}

/// Renders `raw_writes=<n> pending=<n> out=<bytes that reached fd 1>`.
fn run_stream_write(inputs: StreamWriteInputs) -> CaseRun {
    let mut sys = SimSys::new();
    sys.set_write_fault(inputs.write_fault);
    let mut out = Stream::from_fd(
        STDOUT_FILENO,
        OpenFlags::WRONLY,
        inputs.buffering.into(),
        inputs.capacity,
    );
    for text in &inputs.writes {
        if let Err(e) = out.write_bytes(&mut sys, text.as_bytes()) {
            return CaseRun::failed(format!("write failed, error flag {}", out.is_error()), e.errno());
        }
    }
    if inputs.flush {
        if let Err(e) = out.flush(&mut sys) {
            return CaseRun::failed(format!("flush failed, error flag {}", out.is_error()), e.errno());
        }
    }
    let raw_writes = sys
        .write_log()
        .iter()
        .filter(|(fd, _)| *fd == STDOUT_FILENO)
        .count();
    CaseRun::ok(format!(
        "raw_writes={raw_writes} pending={} out={}",
        out.pending_output().len(),
        escaped(sys.stdout())
    ))
}

#[derive(Debug, Deserialize)]
struct FgetsInputs {
    contents: String,
    size: usize,
    capacity: usize,
}

/// Calls `gets` until it returns nothing; renders each line joined by `|`,
/// ending in `<eof>`.
fn run_fgets(inputs: FgetsInputs) -> CaseRun {
    let mut sys = SimSys::new();
    sys.put_file(b"/fixture/input", inputs.contents.as_bytes());
    let mut stream = match Stream::open(&mut sys, b"/fixture/input", OpenFlags::RDONLY, inputs.capacity) {
        Ok(stream) => stream,
        Err(e) => return CaseRun::failed("open failed", e.errno()),
    };
    let mut pieces = Vec::new();
    let mut dst = vec![0u8; inputs.size];
    // Bounded so a zero-sized buffer cannot loop forever.
    for _ in 0..=inputs.contents.len() {
        match stream.gets(&mut sys, &mut dst) {
            Ok(0) => break,
            Ok(n) => pieces.push(escaped(&dst[..n])),
            Err(e) => return CaseRun::failed(pieces.join("|"), e.errno()),
        }
    }
    pieces.push(String::from("<eof>"));
    CaseRun::ok(pieces.join("|"))
}

#[derive(Debug, Deserialize)]
struct FopenInputs {
    path: String,
    mode: String,
    #[serde(default)]
    existing: Option<String>,
}

/// Renders the descriptor and, for a successful write-mode open, whether
/// an existing file was truncated.
fn run_fopen(inputs: FopenInputs) -> CaseRun {
    let mut sys = SimSys::new();
    if let Some(contents) = &inputs.existing {
        sys.put_file(inputs.path.as_bytes(), contents.as_bytes());
    }
    match stdio::fopen(&mut sys, inputs.path.as_bytes(), inputs.mode.as_bytes()) {
        Ok(stream) => {
            let size = sys.file_contents(inputs.path.as_bytes()).map_or(0, <[u8]>::len);
            CaseRun::ok(format!("fd={} size={size}", stream.fd()))
        }
        Err(e) => CaseRun::failed("fopen failed", e.errno()),
    }
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ForkWaitInputs {
    #[serde(default)]
    exit_code: i32,
    /// Terminate the child with this signal instead of exiting.
    #[serde(default)]
    signal: Option<i32>,
    /// Exit without flushing streams.
    #[serde(default)]
    immediate: bool,
    /// Written by the child to a fully-buffered stdout stream.
    #[serde(default)]
    child_output: String,
}

/// Renders `<decoded status> out=<what reached fd 1>`.
fn run_fork_wait(inputs: ForkWaitInputs) -> CaseRun {
    let mut sys = SimSys::new();
    let child = match process::duplicate(&mut sys) {
        Ok(Role::Parent { child }) => child,
        Ok(Role::Child) => return CaseRun::failed("caller resumed as the child", EINVAL),
        Err(e) => return CaseRun::failed("fork failed", e.errno()),
    };
    if let Err(e) = sys.resume_child(child) {
        return CaseRun::failed("child did not start", e.errno());
    }

    let mut out = Stream::from_fd(STDOUT_FILENO, OpenFlags::WRONLY, BufMode::Full, stdio::BUFSIZ);
    if let Err(e) = out.write_bytes(&mut sys, inputs.child_output.as_bytes()) {
        return CaseRun::failed("child write failed", e.errno());
    }
    match inputs.signal {
        Some(sig) => {
            if let Err(e) = sys.kill(child, sig) {
                return CaseRun::failed("kill failed", e.errno());
            }
        }
        None if inputs.immediate => process::exit_immediately(&mut sys, inputs.exit_code),
        None => process::exit(&mut sys, std::iter::once(&mut out), inputs.exit_code),
    }

    match process::wait_for_child(&mut sys, WaitTarget::Pid(child), 0) {
        Ok((pid, status)) if pid == child => {
            CaseRun::ok(format!("{status:?} out={}", escaped(sys.stdout())))
        }
        Ok((pid, _)) => CaseRun::failed(format!("reaped unexpected pid {pid}"), EINVAL),
        Err(e) => CaseRun::failed("wait failed", e.errno()),
    }
}

#[derive(Debug, Deserialize)]
struct WaitpidInputs {
    pid: i32,
    #[serde(default)]
    options: i32,
    /// Children forked beforehand and left running.
    #[serde(default)]
    running_children: usize,
}

fn run_waitpid(inputs: WaitpidInputs) -> CaseRun {
    let mut sys = SimSys::new();
    for _ in 0..inputs.running_children {
        if let Err(e) = process::duplicate(&mut sys) {
            return CaseRun::failed("fork failed", e.errno());
        }
    }
    let Some(target) = WaitTarget::from_c(inputs.pid) else {
        return CaseRun::failed("invalid pid", EINVAL);
    };
    let reaped = if inputs.options & process::WNOHANG != 0 {
        process::try_wait_child(&mut sys, target, inputs.options)
    } else {
        process::wait_for_child(&mut sys, target, inputs.options).map(Some)
    };
    match reaped {
        Ok(Some((pid, status))) => CaseRun::ok(format!("{pid} {status:?}")),
        Ok(None) => CaseRun::ok("no change"),
        Err(e) => CaseRun::failed("waitpid failed", e.errno()),
    }
}

#[derive(Debug, Deserialize)]
struct PipeInputs {
    data: String,
    close_writer: bool,
}

/// Writes `data` into a fresh pipe and drains it. Renders the bytes read,
/// then `<eof>` or `<blocked>` (the latter with `EAGAIN`, where a kernel
/// would suspend the reader).
fn run_pipe(inputs: PipeInputs) -> CaseRun {
    let mut sys = SimSys::new();
    let pipe = match process::create_pipe(&mut sys) {
        Ok(pipe) => pipe,
        Err(e) => return CaseRun::failed("pipe failed", e.errno()),
    };
    if let Err(e) = write_all(&mut sys, pipe.write, inputs.data.as_bytes()) {
        return CaseRun::failed("write failed", e.errno());
    }
    if inputs.close_writer {
        if let Err(e) = sys.close(pipe.write) {
            return CaseRun::failed("close failed", e.errno());
        }
    }
    let mut got = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        match sys.read(pipe.read, &mut buf) {
            Ok(0) => return CaseRun::ok(format!("{}|<eof>", escaped(&got))),
            Ok(n) => got.extend_from_slice(&buf[..n]),
            Err(e) if e.errno() == EAGAIN => {
                return CaseRun::failed(format!("{}|<blocked>", escaped(&got)), EAGAIN);
            }
            Err(e) => return CaseRun::failed(escaped(&got), e.errno()),
        }
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
enum StringOp {
    Strlen { s: String },
    Strcmp { a: String, b: String },
    Strncmp { a: String, b: String, n: usize },
    Strchr { s: String, c: String },
    Strstr { haystack: String, needle: String },
    Strncpy { src: String, n: usize },
    Strtok { s: String, delims: String },
    Memmove { buf: String, dest: usize, src: usize, n: usize },
}

fn position(found: Option<usize>) -> String {
    found.map_or_else(|| String::from("null"), |i| i.to_string())
}

fn with_nul(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn run_string(op: StringOp) -> CaseRun {
    match op {
        StringOp::Strlen { s } => CaseRun::ok(string::strlen(s.as_bytes()).to_string()),
        StringOp::Strcmp { a, b } => {
            CaseRun::ok(string::strcmp(a.as_bytes(), b.as_bytes()).signum().to_string())
        }
        StringOp::Strncmp { a, b, n } => {
            CaseRun::ok(string::strncmp(a.as_bytes(), b.as_bytes(), n).signum().to_string())
        }
        StringOp::Strchr { s, c } => {
            let c = c.bytes().next().unwrap_or(0);
            CaseRun::ok(position(string::strchr(&with_nul(&s), c)))
        }
        StringOp::Strstr { haystack, needle } => {
            CaseRun::ok(position(string::strstr(haystack.as_bytes(), needle.as_bytes())))
        }
        StringOp::Strncpy { src, n } => {
            let mut dest = vec![b'#'; n];
            string::strncpy(&mut dest, src.as_bytes(), n);
            CaseRun::ok(escaped(&dest))
        }
        StringOp::Strtok { s, delims } => {
            let mut buf = with_nul(&s);
            let mut tokens = Vec::new();
            let mut from = 0;
            while let Some(token) = string::strtok_next(&mut buf, from, delims.as_bytes()) {
                let len = string::strlen(&buf[token.start..]);
                tokens.push(escaped(&buf[token.start..token.start + len]));
                from = token.resume;
            }
            CaseRun::ok(tokens.join("|"))
        }
        StringOp::Memmove { buf, dest, src, n } => {
            let mut bytes = buf.into_bytes();
            if string::memmove(&mut bytes, dest, src, n) {
                CaseRun::ok(escaped(&bytes))
            } else {
                CaseRun::failed("range outside buffer", EINVAL)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(function: &str, inputs: serde_json::Value) -> CaseRun {
        execute_fixture_case(function, &inputs).unwrap()
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = execute_fixture_case("gets", &json!({})).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownFunction(name) if name == "gets"));
    }

    #[test]
    fn malformed_inputs_name_the_function() {
        let err = execute_fixture_case("printf", &json!({"fmt": "x"})).unwrap_err();
        assert!(matches!(err, HarnessError::BadInputs { function, .. } if function == "printf"));
    }

    #[test]
    fn every_listed_function_dispatches() {
        for name in FUNCTIONS {
            let err = execute_fixture_case(name, &json!(null));
            assert!(
                matches!(err, Err(HarnessError::BadInputs { .. })),
                "{name} did not reach its decoder"
            );
        }
    }

    #[test]
    fn printf_tagged_args() {
        let got = run(
            "printf",
            json!({"format": "%s=%d %c", "args": [{"str": "n"}, {"int": -3}, {"char": "z"}]}),
        );
        assert_eq!(got, CaseRun::ok("n=-3 z"));
    }

    #[test]
    fn snprintf_reports_full_length() {
        let got = run(
            "snprintf",
            json!({"format": "%d", "size": 4, "args": [{"int": 123456}]}),
        );
        assert_eq!(got.output, "6|123");
    }

    #[test]
    fn heap_double_free_is_rejected() {
        let got = run(
            "heap",
            json!({"arena": 4096, "ops": [
                {"malloc": {"id": "a", "size": 32}},
                {"malloc": {"id": "b", "size": 32}},
                {"free": {"id": "a"}},
                {"free": {"id": "a"}}
            ]}),
        );
        assert_eq!(got, CaseRun::failed("step 3 failed", EINVAL));
    }

    #[test]
    fn heap_realloc_keeps_prefix() {
        let got = run(
            "heap",
            json!({"arena": 4096, "ops": [
                {"malloc": {"id": "a", "size": 24}},
                {"malloc": {"id": "b", "size": 24}},
                {"realloc": {"id": "a", "size": 200}},
                {"free": {"id": "a"}},
                {"free": {"id": "b"}}
            ]}),
        );
        assert_eq!(got, CaseRun::ok("live=0 free_blocks=1"));
    }

    #[test]
    fn pipe_with_open_writer_would_block() {
        let got = run("pipe", json!({"data": "hi", "close_writer": false}));
        assert_eq!(got, CaseRun::failed("hi|<blocked>", EAGAIN));
    }
}
