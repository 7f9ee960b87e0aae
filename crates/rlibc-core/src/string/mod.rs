//! Leaf string and memory primitives over byte slices.
//!
//! A C string is modelled as a `&[u8]` whose logical end is the first NUL,
//! or the end of the slice when there is none. Operations that write report
//! `None` instead of overrunning a destination that is too small.

pub mod mem;
pub mod str;

pub use mem::{memcmp, memcpy, memmove, memset};
pub use self::str::{
    Token, strcat, strchr, strcmp, strcpy, strlen, strncmp, strncpy, strstr, strtok_next,
};
