//! Heap allocator.
//!
//! A single fixed arena carved into boundary-tagged blocks. See [`heap`]
//! for the block layout. The engine works on byte offsets; the C surface
//! owns the arena and converts offsets to pointers.

pub mod heap;

pub use heap::{ALIGN, Heap, HeapCorruption, MIN_BLOCK};
