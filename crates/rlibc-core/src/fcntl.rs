//! Open flags and seek origins understood by the raw layer.
//!
//! The flag bits are rlibc's own layout, not Linux `O_*` values; the Linux
//! backend translates them at the syscall boundary.

use std::ops::BitOr;

/// Raw-layer open flag bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const RDONLY: Self = Self(1 << 0);
    pub const WRONLY: Self = Self(1 << 1);
    pub const RDWR: Self = Self(Self::RDONLY.0 | Self::WRONLY.0);
    pub const APPEND: Self = Self(1 << 2);
    pub const CREAT: Self = Self(1 << 3);
    pub const TRUNC: Self = Self(1 << 4);

    const ALL: u32 = 0b1_1111;

    /// Interpret a C flag word. Unknown bits are rejected.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL != 0 || bits & Self::RDWR.0 == 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn readable(self) -> bool {
        self.0 & Self::RDONLY.0 != 0
    }

    #[must_use]
    pub const fn writable(self) -> bool {
        self.0 & Self::WRONLY.0 != 0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Parse an `fopen` mode string (`"r"`, `"w+"`, `"ab"`, `"r+b"`).
///
/// Returns `None` if the mode string is invalid.
#[must_use]
pub fn parse_mode(mode: &[u8]) -> Option<OpenFlags> {
    let (&base, rest) = mode.split_first()?;
    let mut flags = match base {
        b'r' => OpenFlags::RDONLY,
        b'w' => OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC,
        b'a' => OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::APPEND,
        _ => return None,
    };
    for &m in rest {
        match m {
            b'+' => flags = flags | OpenFlags::RDWR,
            b'b' => {}
            _ => return None,
        }
    }
    Some(flags)
}

/// Origin for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    /// Decode C `SEEK_SET`/`SEEK_CUR`/`SEEK_END` (0, 1, 2).
    #[must_use]
    pub const fn from_c(whence: i32) -> Option<Self> {
        match whence {
            0 => Some(Self::Set),
            1 => Some(Self::Cur),
            2 => Some(Self::End),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_c(self) -> i32 {
        match self {
            Self::Set => 0,
            Self::Cur => 1,
            Self::End => 2,
        }
    }
}
