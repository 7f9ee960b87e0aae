//! `memset`, `memcmp`, `memcpy`, `memmove`.

use std::cmp::Ordering;

/// Fill the first `n` bytes of `dest` with `value`. Returns bytes written.
pub fn memset(dest: &mut [u8], value: u8, n: usize) -> usize {
    let n = n.min(dest.len());
    dest[..n].fill(value);
    n
}

/// Compare the first `n` bytes. Returns the difference of the first
/// mismatching pair, 0 when equal.
pub fn memcmp(a: &[u8], b: &[u8], n: usize) -> i32 {
    let n = n.min(a.len()).min(b.len());
    a[..n]
        .iter()
        .zip(&b[..n])
        .find(|(x, y)| x != y)
        .map_or(0, |(&x, &y)| i32::from(x) - i32::from(y))
}

/// Copy `n` bytes between distinct buffers. Returns bytes copied.
pub fn memcpy(dest: &mut [u8], src: &[u8], n: usize) -> usize {
    let n = n.min(dest.len()).min(src.len());
    dest[..n].copy_from_slice(&src[..n]);
    n
}

/// Copy `n` bytes from `src` to `dest` inside one buffer; the ranges may
/// overlap. Returns `false` if either range leaves the buffer.
pub fn memmove(buf: &mut [u8], dest: usize, src: usize, n: usize) -> bool {
    let fits = |at: usize| at.checked_add(n).is_some_and(|end| end <= buf.len());
    if !fits(dest) || !fits(src) {
        return false;
    }
    buf.copy_within(src..src + n, dest);
    true
}

/// Three-way result of [`memcmp`] as an [`Ordering`].
pub fn mem_ordering(a: &[u8], b: &[u8], n: usize) -> Ordering {
    memcmp(a, b, n).cmp(&0)
}
