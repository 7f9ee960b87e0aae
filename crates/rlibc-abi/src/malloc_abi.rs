//! ABI layer for memory allocation functions (`malloc`, `free`, `calloc`, `realloc`).
//!
//! All requests are served by the boundary-tag [`Heap`] from `rlibc-core`,
//! formatted over one anonymous mapping of `RLIBC_ARENA_SIZE` bytes. The
//! arena never grows: once it is exhausted, allocation fails with `ENOMEM`.
//!
//! Setting the arena up reads the environment, which itself allocates. Calls
//! made while that is in progress are served from a small static bootstrap
//! arena; `free` and `realloc` route a pointer to whichever arena holds it.

use std::cell::Cell;
use std::ffi::c_void;
use std::ptr;

use parking_lot::Mutex;
use rlibc_core::errno::ENOMEM;
use rlibc_core::malloc::{ALIGN, Heap};
use rlibc_core::sys::linux::map_anonymous;
use rlibc_core::AllocError;
use rlibc_membrane::config::RuntimeConfig;

use crate::errno_abi::set_abi_errno;

const BOOTSTRAP_SIZE: usize = 64 * 1024;

#[repr(C, align(16))]
struct BootstrapArena([u8; BOOTSTRAP_SIZE]);

static mut BOOTSTRAP_ARENA: BootstrapArena = BootstrapArena([0; BOOTSTRAP_SIZE]);

type Arena = Heap<&'static mut [u8]>;

enum HeapState {
    Uninit,
    Ready(Arena),
    Failed,
}

static MAIN: Mutex<HeapState> = parking_lot::const_mutex(HeapState::Uninit);
static BOOTSTRAP: Mutex<Option<Arena>> = parking_lot::const_mutex(None);

thread_local! {
    static ALLOCATOR_REENTRY_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct AllocatorReentryGuard;

impl Drop for AllocatorReentryGuard {
    fn drop(&mut self) {
        ALLOCATOR_REENTRY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[inline]
fn enter_allocator_reentry_guard() -> Option<AllocatorReentryGuard> {
    ALLOCATOR_REENTRY_DEPTH.with(|depth| {
        if depth.get() > 0 {
            None
        } else {
            depth.set(depth.get() + 1);
            Some(AllocatorReentryGuard)
        }
    })
}

fn build_main_arena() -> Result<Arena, AllocError> {
    let size = RuntimeConfig::from_env().arena_size;
    let base = map_anonymous(size).map_err(|_| AllocError::OutOfMemory { requested: size })?;
    // SAFETY: the mapping is `size` bytes, zeroed, and never unmapped.
    let storage = unsafe { std::slice::from_raw_parts_mut(base, size) };
    Heap::new(storage)
}

fn with_bootstrap<T>(f: impl FnOnce(&mut Arena) -> T) -> Option<T> {
    let mut slot = BOOTSTRAP.lock();
    if slot.is_none() {
        // SAFETY: the static is only ever borrowed here, once, under the lock.
        let storage: &'static mut [u8] = unsafe { &mut (*ptr::addr_of_mut!(BOOTSTRAP_ARENA)).0 };
        *slot = Heap::new(storage).ok();
    }
    slot.as_mut().map(f)
}

/// Run `f` against the main arena, building it on first use. `None` when
/// the arena cannot be used from here (re-entered during setup, or the
/// mapping failed).
fn with_main<T>(f: impl FnOnce(&mut Arena) -> T) -> Option<T> {
    {
        let mut state = MAIN.lock();
        match &mut *state {
            HeapState::Ready(heap) => return Some(f(heap)),
            HeapState::Failed => return None,
            HeapState::Uninit => {}
        }
    }
    let _guard = enter_allocator_reentry_guard()?;
    let built = build_main_arena();
    let mut state = MAIN.lock();
    if matches!(*state, HeapState::Uninit) {
        *state = match built {
            Ok(heap) => HeapState::Ready(heap),
            Err(_) => HeapState::Failed,
        };
    }
    match &mut *state {
        HeapState::Ready(heap) => Some(f(heap)),
        _ => None,
    }
}

fn base_of(heap: &Arena) -> usize {
    heap.bytes().as_ptr() as usize
}

fn owns(heap: &Arena, addr: usize) -> bool {
    let base = base_of(heap);
    addr >= base && addr < base + heap.bytes().len()
}

fn to_ptr(heap: &mut Arena, offset: usize) -> *mut c_void {
    heap.bytes_mut().as_mut_ptr().wrapping_add(offset).cast()
}

fn allocate_in(heap: &mut Arena, request: impl FnOnce(&mut Arena) -> Result<usize, AllocError>) -> *mut c_void {
    match request(heap) {
        Ok(offset) => to_ptr(heap, offset),
        Err(e) => {
            set_abi_errno(e.errno());
            ptr::null_mut()
        }
    }
}

/// Serve an allocation from the main arena, or from the bootstrap arena
/// when the main one is unavailable.
fn allocate_with(request: impl Fn(&mut Arena) -> Result<usize, AllocError>) -> *mut c_void {
    if let Some(p) = with_main(|heap| allocate_in(heap, &request)) {
        return p;
    }
    with_bootstrap(|heap| allocate_in(heap, &request)).unwrap_or_else(|| {
        set_abi_errno(ENOMEM);
        ptr::null_mut()
    })
}

/// Run `f` on whichever arena holds `addr`, with `addr` as an offset.
fn with_owner<T>(addr: usize, f: impl Fn(&mut Arena, usize) -> T) -> Option<T> {
    let in_main = {
        let mut state = MAIN.lock();
        match &mut *state {
            HeapState::Ready(heap) if owns(heap, addr) => {
                let offset = addr - base_of(heap);
                Some(f(heap, offset))
            }
            _ => None,
        }
    };
    in_main.or_else(|| {
        let mut slot = BOOTSTRAP.lock();
        let heap = slot.as_mut()?;
        if owns(heap, addr) {
            let offset = addr - base_of(heap);
            Some(f(heap, offset))
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// malloc / free / calloc / realloc
// ---------------------------------------------------------------------------

/// POSIX `malloc`. Returns a 16-byte aligned block, or null with `ENOMEM`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    allocate_with(|heap| heap.allocate(size))
}

/// POSIX `free`. Null is a no-op; a pointer the heap never handed out is
/// ignored.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    let _ = with_owner(ptr as usize, |heap, offset| heap.release(offset));
}

/// POSIX `calloc`. Fails with `ENOMEM` when `nmemb * size` overflows.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    allocate_with(|heap| heap.allocate_zeroed(nmemb, size))
}

/// POSIX `realloc`.
///
/// Null `ptr` behaves as `malloc`; zero `size` frees and returns null. On
/// failure the original block is left intact and null is returned.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    if ptr.is_null() {
        return unsafe { malloc(size) };
    }
    let resized = with_owner(ptr as usize, |heap, offset| {
        match heap.resize(Some(offset), size) {
            Ok(Some(moved)) => Ok(to_ptr(heap, moved)),
            Ok(None) => Ok(ptr::null_mut()),
            Err(AllocError::OutOfMemory { .. }) => Err(Some(heap.usable_size(offset).unwrap_or(0))),
            Err(e) => {
                set_abi_errno(e.errno());
                Err(None)
            }
        }
    });
    match resized {
        Some(Ok(p)) => p,
        // The owning arena is full: move the block to any arena with room.
        Some(Err(Some(old_len))) => {
            let fresh = unsafe { malloc(size) };
            if !fresh.is_null() {
                // SAFETY: both blocks are live and at least min(old_len, size) bytes.
                unsafe {
                    ptr::copy_nonoverlapping(ptr.cast::<u8>(), fresh.cast::<u8>(), old_len.min(size));
                    free(ptr);
                }
            }
            fresh
        }
        Some(Err(None)) => ptr::null_mut(),
        None => {
            set_abi_errno(AllocError::InvalidPointer(ptr as usize).errno());
            ptr::null_mut()
        }
    }
}

/// Usable bytes behind a live pointer, 0 for anything else.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc_usable_size(ptr: *mut c_void) -> usize {
    if ptr.is_null() {
        return 0;
    }
    with_owner(ptr as usize, |heap, offset| heap.usable_size(offset))
        .flatten()
        .unwrap_or(0)
}

/// Alignment every returned block satisfies.
pub const MALLOC_ALIGNMENT: usize = ALIGN;
