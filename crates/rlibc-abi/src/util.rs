//! Shared internal utilities for ABI adapters.

use std::ffi::{c_char, c_int, c_long, c_short, c_uint, c_ulong, c_ushort, c_void};

use rlibc_core::stdio::printf::{FormatSegment, LengthMod, Precision, Width, parse_format_string};
use rlibc_core::stdio::{ScanItem, ScanValue};

/// Most variadic arguments pulled for one formatted-output call.
pub const MAX_VA_ARGS: usize = 64;

/// Scan a C string with an optional hard bound.
///
/// Returns `(len, terminated)` where:
/// - `len` is the byte length before the first NUL or before the bound.
/// - `terminated` indicates whether a NUL byte was observed.
///
/// # Safety
///
/// `ptr` must be valid to read up to the discovered length (and bound when given).
pub unsafe fn scan_c_string(ptr: *const c_char, bound: Option<usize>) -> (usize, bool) {
    match bound {
        Some(limit) => {
            for i in 0..limit {
                if unsafe { *ptr.add(i) } == 0 {
                    return (i, true);
                }
            }
            (limit, false)
        }
        None => {
            let mut i = 0usize;
            while unsafe { *ptr.add(i) } != 0 {
                i += 1;
            }
            (i, true)
        }
    }
}

/// The bytes of a C string, without its NUL.
///
/// # Safety
///
/// `ptr` must be non-null and NUL-terminated, and the bytes must stay
/// valid for `'a`.
pub unsafe fn c_bytes<'a>(ptr: *const c_char) -> &'a [u8] {
    let (len, _) = unsafe { scan_c_string(ptr, None) };
    unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) }
}

/// Like [`c_bytes`] but keeps the terminating NUL in the slice.
///
/// # Safety
///
/// Same as [`c_bytes`].
pub unsafe fn c_bytes_with_nul<'a>(ptr: *const c_char) -> &'a [u8] {
    let (len, _) = unsafe { scan_c_string(ptr, None) };
    unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len + 1) }
}

/// [`c_bytes`] that maps a null pointer to `None`.
///
/// # Safety
///
/// Same as [`c_bytes`] for non-null pointers.
pub unsafe fn c_bytes_opt<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { c_bytes(ptr) })
    }
}

/// The C type a variadic argument is read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaSlot {
    /// `int` (also `*` widths, `%c` and promoted `short`/`char`).
    Int,
    Long,
    Uint,
    Ulong,
    Char,
    Double,
    CStr,
    Pointer,
}

fn is_wide(length: LengthMod) -> bool {
    matches!(
        length,
        LengthMod::L | LengthMod::Ll | LengthMod::Z | LengthMod::T | LengthMod::J
    )
}

/// The argument types a format string consumes, in order.
///
/// Mirrors the order in which the formatter pulls arguments: `*` width,
/// `*` precision, then the converted value. Capped at [`MAX_VA_ARGS`].
///
/// `None` when a directive takes a `long double` (`%Lf`, `%Le`, ...): it is
/// passed in memory as an 80-bit value that cannot be pulled from the list,
/// and every argument after it would be misread.
pub fn format_slots(fmt: &[u8]) -> Option<Vec<VaSlot>> {
    let mut slots = Vec::new();
    for segment in parse_format_string(fmt) {
        let FormatSegment::Spec(spec) = segment else {
            continue;
        };
        if spec.width == Width::FromArg {
            slots.push(VaSlot::Int);
        }
        if spec.precision == Precision::FromArg {
            slots.push(VaSlot::Int);
        }
        if is_float(spec.conversion) && spec.length == LengthMod::BigL {
            return None;
        }
        slots.push(match spec.conversion {
            b'd' | b'i' if is_wide(spec.length) => VaSlot::Long,
            b'd' | b'i' => VaSlot::Int,
            b'u' | b'o' | b'x' | b'X' if is_wide(spec.length) => VaSlot::Ulong,
            b'u' | b'o' | b'x' | b'X' => VaSlot::Uint,
            b'c' => VaSlot::Char,
            b's' => VaSlot::CStr,
            b'p' => VaSlot::Pointer,
            _ => VaSlot::Double,
        });
    }
    slots.truncate(MAX_VA_ARGS);
    Some(slots)
}

fn is_float(conversion: u8) -> bool {
    matches!(conversion | 0x20, b'f' | b'e' | b'g' | b'a')
}

/// Widen a double to the x87 80-bit extended layout of `long double`:
/// 64-bit mantissa with an explicit integer bit, then sign and a 15-bit
/// exponent biased by 16383, little-endian.
pub fn x87_extended(value: f64) -> [u8; 10] {
    let bits = value.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let biased = ((bits >> 52) & 0x7ff) as u16;
    let frac = bits & ((1u64 << 52) - 1);
    let (exp, mantissa) = match biased {
        0 if frac == 0 => (0, 0),
        0 => {
            let shift = frac.leading_zeros();
            (15372 - shift as u16, frac << shift)
        }
        0x7ff => (0x7fff, (1 << 63) | (frac << 11)),
        _ => (biased + 15360, (1 << 63) | (frac << 11)),
    };
    let mut out = [0u8; 10];
    out[..8].copy_from_slice(&mantissa.to_le_bytes());
    out[8..].copy_from_slice(&(sign | exp).to_le_bytes());
    out
}

/// Store one scanned value through the caller's destination pointer, in
/// the width its length modifier names.
///
/// # Safety
///
/// `dst` must be valid for a write of the C type that `item` describes;
/// for `%c` and `%s` it must hold the value's bytes (plus a NUL for `%s`).
pub unsafe fn store_scan_item(dst: *mut c_void, item: &ScanItem) {
    match &item.value {
        ScanValue::Int(v) => unsafe {
            match item.length {
                LengthMod::Hh => *dst.cast::<i8>() = *v as i8,
                LengthMod::H => *dst.cast::<c_short>() = *v as c_short,
                l if is_wide(l) => *dst.cast::<c_long>() = *v as c_long,
                _ => *dst.cast::<c_int>() = *v as c_int,
            }
        },
        ScanValue::Uint(v) => unsafe {
            match item.length {
                LengthMod::Hh => *dst.cast::<u8>() = *v as u8,
                LengthMod::H => *dst.cast::<c_ushort>() = *v as c_ushort,
                l if is_wide(l) => *dst.cast::<c_ulong>() = *v as c_ulong,
                _ => *dst.cast::<c_uint>() = *v as c_uint,
            }
        },
        ScanValue::Pointer(p) => unsafe { *dst.cast::<*mut c_void>() = *p as *mut c_void },
        ScanValue::Float(v) => unsafe {
            match item.length {
                LengthMod::L => *dst.cast::<f64>() = *v,
                LengthMod::BigL => {
                    let bytes = x87_extended(*v);
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.cast::<u8>(), bytes.len());
                }
                _ => *dst.cast::<f32>() = *v as f32,
            }
        },
        ScanValue::Chars(bytes) => unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.cast::<u8>(), bytes.len());
        },
        ScanValue::Str(bytes) => unsafe {
            let out = dst.cast::<u8>();
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len());
            *out.add(bytes.len()) = 0;
        },
    }
}
