//! `strlen`, `strcmp`, `strncmp`, `strcpy`, `strncpy`, `strcat`, `strchr`,
//! `strstr` and a re-entrant core for `strtok`.

/// Length up to the first NUL (or the whole slice).
pub fn strlen(s: &[u8]) -> usize {
    s.iter().position(|&b| b == 0).unwrap_or(s.len())
}

fn byte_at(s: &[u8], i: usize) -> u8 {
    s.get(i).copied().unwrap_or(0)
}

/// Lexicographic comparison of two C strings.
pub fn strcmp(s1: &[u8], s2: &[u8]) -> i32 {
    strncmp(s1, s2, usize::MAX)
}

/// [`strcmp`] limited to the first `n` bytes.
pub fn strncmp(s1: &[u8], s2: &[u8], n: usize) -> i32 {
    for i in 0..n {
        let (a, b) = (byte_at(s1, i), byte_at(s2, i));
        if a != b {
            return i32::from(a) - i32::from(b);
        }
        if a == 0 {
            break;
        }
    }
    0
}

/// Copy `src` and its NUL into `dest`. Returns the bytes written including
/// the NUL, or `None` if `dest` cannot hold them.
pub fn strcpy(dest: &mut [u8], src: &[u8]) -> Option<usize> {
    let len = strlen(src);
    if dest.len() <= len {
        return None;
    }
    dest[..len].copy_from_slice(&src[..len]);
    dest[len] = 0;
    Some(len + 1)
}

/// Copy at most `n` bytes, NUL-padding a short source. The result is not
/// terminated when `src` has `n` or more bytes. Returns bytes written.
pub fn strncpy(dest: &mut [u8], src: &[u8], n: usize) -> usize {
    let count = n.min(dest.len());
    let copy = strlen(src).min(count);
    dest[..copy].copy_from_slice(&src[..copy]);
    dest[copy..count].fill(0);
    count
}

/// Append `src` to the C string in `dest`. Returns the new length, or
/// `None` if the result and its NUL do not fit.
pub fn strcat(dest: &mut [u8], src: &[u8]) -> Option<usize> {
    let start = strlen(dest);
    let len = strlen(src);
    let total = start + len;
    if dest.len() <= total {
        return None;
    }
    dest[start..total].copy_from_slice(&src[..len]);
    dest[total] = 0;
    Some(total)
}

/// Index of the first `c`; searching for 0 finds the terminator.
pub fn strchr(s: &[u8], c: u8) -> Option<usize> {
    let len = strlen(s);
    if c == 0 {
        return Some(len);
    }
    s[..len].iter().position(|&b| b == c)
}

/// Index of the first occurrence of `needle`. An empty needle matches at 0.
pub fn strstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let haystack = &haystack[..strlen(haystack)];
    let needle = &needle[..strlen(needle)];
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// A token found by [`strtok_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Offset of the token's first byte.
    pub start: usize,
    /// Offset to resume scanning from on the next call.
    pub resume: usize,
}

/// Find the next token in `s` starting at `from`, skipping leading bytes in
/// `delims`. The delimiter ending the token is overwritten with a NUL, as
/// `strtok` does. Returns `None` when only delimiters remain.
pub fn strtok_next(s: &mut [u8], from: usize, delims: &[u8]) -> Option<Token> {
    let end = strlen(s);
    let delims = &delims[..strlen(delims)];
    let start = (from..end).find(|&i| !delims.contains(&s[i]))?;
    match (start..end).find(|&i| delims.contains(&s[i])) {
        Some(stop) => {
            s[stop] = 0;
            Some(Token {
                start,
                resume: stop + 1,
            })
        }
        None => Some(Token { start, resume: end }),
    }
}
