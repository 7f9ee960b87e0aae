//! Formatted output engine.
//!
//! A format string is parsed into segments, each directive pulls its value
//! from a caller-built slice of [`FormatArg`]s, and the rendered bytes go to
//! a [`FormatSink`]. Arguments are tagged, so the engine never walks a raw
//! argument list; supplying one argument per directive is the caller's job.
//! A directive with nothing left to consume renders as empty.
//!
//! Padding is carried as run lengths rather than bytes, and output that
//! would pass `INT_MAX` bytes fails with [`FormatOverflow`] instead of
//! being produced.

use std::fmt::Write as _;

use crate::error::FormatOverflow;

/// Flags parsed from a directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    pub left_justify: bool, // '-'
    pub force_sign: bool,   // '+'
    pub space_sign: bool,   // ' '
    pub alt_form: bool,     // '#'
    pub zero_pad: bool,     // '0'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    None,
    Fixed(usize),
    FromArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    None,
    Fixed(usize),
    FromArg,
}

/// Length modifier. Decides how many bits of an integer argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMod {
    None,
    Hh,
    H,
    L,
    Ll,
    Z,
    T,
    J,
    BigL,
}

/// One parsed conversion directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub flags: FormatFlags,
    pub width: Width,
    pub precision: Precision,
    pub length: LengthMod,
    pub conversion: u8,
}

impl FormatSpec {
    /// A bare directive (`%d`, `%s`, ...) with no flags or field sizes.
    #[must_use]
    pub const fn plain(conversion: u8) -> Self {
        Self {
            flags: FormatFlags {
                left_justify: false,
                force_sign: false,
                space_sign: false,
                alt_form: false,
                zero_pad: false,
            },
            width: Width::None,
            precision: Precision::None,
            length: LengthMod::None,
            conversion,
        }
    }
}

/// One tagged argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormatArg<'a> {
    Int(i64),
    Uint(u64),
    Char(u8),
    /// `None` is a null string pointer.
    Str(Option<&'a [u8]>),
    Pointer(usize),
    Float(f64),
}

impl FormatArg<'_> {
    fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Uint(v) => v as i64,
            Self::Char(c) => i64::from(c),
            Self::Pointer(p) => p as i64,
            Self::Float(f) => f as i64,
            Self::Str(s) => s.map_or(0, |s| s.as_ptr() as i64),
        }
    }

    fn as_u64(self) -> u64 {
        self.as_i64() as u64
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Float(f) => f,
            Self::Uint(v) => v as f64,
            other => other.as_i64() as f64,
        }
    }
}

/// A piece of a parsed format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSegment<'a> {
    Literal(&'a [u8]),
    Percent,
    Spec(FormatSpec),
}

/// Where rendered bytes go.
pub trait FormatSink {
    type Error: From<FormatOverflow>;

    fn put(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Write `count` copies of `byte`.
    fn fill(&mut self, byte: u8, count: usize) -> Result<(), Self::Error> {
        let chunk = [byte; FILL_CHUNK];
        let mut left = count;
        while left > 0 {
            let n = left.min(FILL_CHUNK);
            self.put(&chunk[..n])?;
            left -= n;
        }
        Ok(())
    }
}

const FILL_CHUNK: usize = 256;

impl FormatSink for Vec<u8> {
    type Error = FormatOverflow;

    fn put(&mut self, bytes: &[u8]) -> Result<(), FormatOverflow> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn fill(&mut self, byte: u8, count: usize) -> Result<(), FormatOverflow> {
        self.extend(std::iter::repeat_n(byte, count));
        Ok(())
    }
}

/// Fixed-size destination that keeps room for a NUL and silently drops
/// overflow while still counting it (`snprintf`).
#[derive(Debug)]
pub struct BoundedSink<'a> {
    dst: &'a mut [u8],
    stored: usize,
}

impl<'a> BoundedSink<'a> {
    pub fn new(dst: &'a mut [u8]) -> Self {
        Self { dst, stored: 0 }
    }

    /// Write the terminating NUL after the stored bytes.
    pub fn terminate(&mut self) {
        if let Some(slot) = self.dst.get_mut(self.stored) {
            *slot = 0;
        }
    }

    pub fn stored(&self) -> usize {
        self.stored
    }

    /// Claim up to `want` bytes of the remaining room.
    fn claim(&mut self, want: usize) -> &mut [u8] {
        let room = self.dst.len().saturating_sub(1).saturating_sub(self.stored);
        let n = want.min(room);
        let start = self.stored;
        self.stored += n;
        &mut self.dst[start..start + n]
    }
}

impl FormatSink for BoundedSink<'_> {
    type Error = FormatOverflow;

    fn put(&mut self, bytes: &[u8]) -> Result<(), FormatOverflow> {
        let slot = self.claim(bytes.len());
        let n = slot.len();
        slot.copy_from_slice(&bytes[..n]);
        Ok(())
    }

    fn fill(&mut self, byte: u8, count: usize) -> Result<(), FormatOverflow> {
        self.claim(count).fill(byte);
        Ok(())
    }
}

/// One rendered directive, laid out as
/// `[spaces][head][zeros][body][body zeros][tail][spaces]`.
///
/// The head holds the sign and any radix prefix, the body the digits, and
/// the tail an exponent. Padding and zero runs are counts, expanded only
/// when the field is written to a sink.
#[derive(Debug, Default)]
pub struct Field {
    text: Vec<u8>,
    head_end: usize,
    body_end: usize,
    lead: usize,
    zeros: usize,
    body_zeros: usize,
    trail: usize,
}

impl Field {
    fn clear(&mut self) {
        self.text.clear();
        self.head_end = 0;
        self.body_end = 0;
        self.lead = 0;
        self.zeros = 0;
        self.body_zeros = 0;
        self.trail = 0;
    }

    fn head(&mut self, bytes: &[u8]) {
        self.text.extend_from_slice(bytes);
        self.head_end = self.text.len();
        self.body_end = self.text.len();
    }

    fn body(&mut self, bytes: &[u8]) {
        self.text.extend_from_slice(bytes);
        self.body_end = self.text.len();
    }

    fn tail(&mut self, bytes: &[u8]) {
        self.text.extend_from_slice(bytes);
    }

    /// Total bytes the field expands to.
    #[must_use]
    pub fn len(&self) -> usize {
        [self.lead, self.zeros, self.body_zeros, self.trail]
            .into_iter()
            .fold(self.text.len(), usize::saturating_add)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pad out to the spec's width: zeros after the head when `zero_fill`,
    /// spaces on the justified side otherwise.
    fn justify(&mut self, spec: &FormatSpec, zero_fill: bool) {
        let pad = resolve_width(spec).saturating_sub(self.len());
        if spec.flags.left_justify {
            self.trail = pad;
        } else if zero_fill {
            self.zeros += pad;
        } else {
            self.lead = pad;
        }
    }

    pub fn write_to<S: FormatSink + ?Sized>(&self, sink: &mut S) -> Result<(), S::Error> {
        let (head, rest) = self.text.split_at(self.head_end);
        let (body, tail) = rest.split_at(self.body_end - self.head_end);
        sink.fill(b' ', self.lead)?;
        put_nonempty(sink, head)?;
        sink.fill(b'0', self.zeros)?;
        put_nonempty(sink, body)?;
        sink.fill(b'0', self.body_zeros)?;
        put_nonempty(sink, tail)?;
        sink.fill(b' ', self.trail)
    }
}

fn put_nonempty<S: FormatSink + ?Sized>(sink: &mut S, bytes: &[u8]) -> Result<(), S::Error> {
    if bytes.is_empty() { Ok(()) } else { sink.put(bytes) }
}

/// Largest output, width or precision a C `int` can report.
pub const FORMAT_MAX: usize = i32::MAX as usize;

/// Parse one directive starting just after its `%`.
///
/// Returns the spec and the number of bytes consumed, or `None` when the
/// directive is malformed.
pub fn parse_format_spec(fmt: &[u8]) -> Option<(FormatSpec, usize)> {
    let mut pos = 0;
    let len = fmt.len();

    let mut flags = FormatFlags::default();
    while pos < len {
        match fmt[pos] {
            b'-' => flags.left_justify = true,
            b'+' => flags.force_sign = true,
            b' ' => flags.space_sign = true,
            b'#' => flags.alt_form = true,
            b'0' => flags.zero_pad = true,
            _ => break,
        }
        pos += 1;
    }
    if flags.force_sign {
        flags.space_sign = false;
    }
    if flags.left_justify {
        flags.zero_pad = false;
    }

    let width = if pos < len && fmt[pos] == b'*' {
        pos += 1;
        Width::FromArg
    } else {
        let start = pos;
        while pos < len && fmt[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos > start {
            Width::Fixed(parse_decimal(&fmt[start..pos]))
        } else {
            Width::None
        }
    };

    let precision = if pos < len && fmt[pos] == b'.' {
        pos += 1;
        if pos < len && fmt[pos] == b'*' {
            pos += 1;
            Precision::FromArg
        } else {
            let start = pos;
            while pos < len && fmt[pos].is_ascii_digit() {
                pos += 1;
            }
            Precision::Fixed(parse_decimal(&fmt[start..pos]))
        }
    } else {
        Precision::None
    };

    let (length, used) = match (fmt.get(pos), fmt.get(pos + 1)) {
        (Some(b'h'), Some(b'h')) => (LengthMod::Hh, 2),
        (Some(b'h'), _) => (LengthMod::H, 1),
        (Some(b'l'), Some(b'l')) => (LengthMod::Ll, 2),
        (Some(b'l'), _) => (LengthMod::L, 1),
        (Some(b'z'), _) => (LengthMod::Z, 1),
        (Some(b't'), _) => (LengthMod::T, 1),
        (Some(b'j'), _) => (LengthMod::J, 1),
        (Some(b'L'), _) => (LengthMod::BigL, 1),
        _ => (LengthMod::None, 0),
    };
    pos += used;

    let conversion = *fmt.get(pos)?;
    pos += 1;
    match conversion {
        b'd' | b'i' | b'u' | b'o' | b'x' | b'X' | b'c' | b's' | b'p' | b'f' | b'F' | b'e'
        | b'E' | b'g' | b'G' | b'a' | b'A' => {}
        _ => return None,
    }

    Some((
        FormatSpec {
            flags,
            width,
            precision,
            length,
            conversion,
        },
        pos,
    ))
}

/// Split a format string into literal runs, `%%` escapes and directives.
/// A malformed directive leaves its `%` as a literal byte.
pub fn parse_format_string(fmt: &[u8]) -> Vec<FormatSegment<'_>> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let len = fmt.len();

    while pos < len {
        let start = pos;
        while pos < len && fmt[pos] != b'%' {
            pos += 1;
        }
        if pos > start {
            segments.push(FormatSegment::Literal(&fmt[start..pos]));
        }
        if pos >= len {
            break;
        }
        pos += 1;
        if fmt.get(pos) == Some(&b'%') {
            segments.push(FormatSegment::Percent);
            pos += 1;
            continue;
        }
        match parse_format_spec(&fmt[pos..]) {
            Some((spec, consumed)) => {
                pos += consumed;
                segments.push(FormatSegment::Spec(spec));
            }
            None => segments.push(FormatSegment::Literal(&fmt[pos - 1..pos])),
        }
    }
    segments
}

/// Render `fmt` with `args` into `sink`. Returns the number of bytes
/// produced, or the sink's first error.
///
/// Output is checked against [`FORMAT_MAX`] before each piece is written,
/// so an oversized directive fails with [`FormatOverflow`] and nothing of
/// it reaches the sink.
pub fn format_output<S: FormatSink + ?Sized>(
    sink: &mut S,
    fmt: &[u8],
    args: &[FormatArg<'_>],
) -> Result<usize, S::Error> {
    let mut args = args.iter().copied();
    let mut total = 0;
    let mut field = Field::default();

    for segment in parse_format_string(fmt) {
        match segment {
            FormatSegment::Literal(lit) => {
                total = grow_total(total, lit.len())?;
                sink.put(lit)?;
            }
            FormatSegment::Percent => {
                total = grow_total(total, 1)?;
                sink.put(b"%")?;
            }
            FormatSegment::Spec(spec) => {
                let Some(spec) = resolve_star_fields(spec, &mut args) else {
                    continue;
                };
                if !fits_int(&spec) {
                    return Err(FormatOverflow.into());
                }
                let Some(arg) = args.next() else {
                    continue;
                };
                field.clear();
                render_directive(&spec, arg, &mut field);
                total = grow_total(total, field.len())?;
                field.write_to(sink)?;
            }
        }
    }
    Ok(total)
}

fn grow_total(total: usize, more: usize) -> Result<usize, FormatOverflow> {
    match total.checked_add(more) {
        Some(sum) if sum <= FORMAT_MAX => Ok(sum),
        _ => Err(FormatOverflow),
    }
}

fn fits_int(spec: &FormatSpec) -> bool {
    let width_ok = !matches!(spec.width, Width::Fixed(w) if w > FORMAT_MAX);
    let precision_ok = !matches!(spec.precision, Precision::Fixed(p) if p > FORMAT_MAX);
    width_ok && precision_ok
}

/// Render into a growable buffer (`sprintf` without the overflow).
pub fn format_to_vec(fmt: &[u8], args: &[FormatArg<'_>]) -> Result<Vec<u8>, FormatOverflow> {
    let mut out = Vec::new();
    format_output(&mut out, fmt, args)?;
    Ok(out)
}

/// `snprintf`: store at most `dst.len() - 1` bytes plus a NUL and return
/// the length the full output would have had.
pub fn format_bounded(
    dst: &mut [u8],
    fmt: &[u8],
    args: &[FormatArg<'_>],
) -> Result<usize, FormatOverflow> {
    let mut sink = BoundedSink::new(dst);
    let total = format_output(&mut sink, fmt, args);
    sink.terminate();
    total
}

/// Replace `*` width and precision with values pulled from `args`.
/// `None` means the arguments ran out.
fn resolve_star_fields<'a>(
    mut spec: FormatSpec,
    args: &mut impl Iterator<Item = FormatArg<'a>>,
) -> Option<FormatSpec> {
    if spec.width == Width::FromArg {
        let w = args.next()?.as_i64() as i32;
        if w < 0 {
            spec.flags.left_justify = true;
            spec.flags.zero_pad = false;
        }
        spec.width = Width::Fixed(w.unsigned_abs() as usize);
    }
    if spec.precision == Precision::FromArg {
        let p = args.next()?.as_i64() as i32;
        spec.precision = if p < 0 {
            Precision::None
        } else {
            Precision::Fixed(p as usize)
        };
    }
    Some(spec)
}

fn render_directive(spec: &FormatSpec, arg: FormatArg<'_>, field: &mut Field) {
    match spec.conversion {
        b'd' | b'i' => format_signed(truncate_signed(arg.as_i64(), spec.length), spec, field),
        b'u' | b'o' | b'x' | b'X' => {
            format_unsigned(truncate_unsigned(arg.as_u64(), spec.length), spec, field);
        }
        b'c' => format_char(arg.as_i64() as u8, spec, field),
        b's' => match arg {
            FormatArg::Str(Some(s)) => format_str(s, spec, field),
            FormatArg::Str(None) => format_str(b"(null)", spec, field),
            FormatArg::Char(c) => format_str(&[c], spec, field),
            _ => {}
        },
        b'p' => format_pointer(arg.as_u64() as usize, spec, field),
        _ => format_float(arg.as_f64(), spec, field),
    }
}

fn truncate_signed(value: i64, length: LengthMod) -> i64 {
    match length {
        LengthMod::Hh => i64::from(value as i8),
        LengthMod::H => i64::from(value as i16),
        LengthMod::None | LengthMod::BigL => i64::from(value as i32),
        _ => value,
    }
}

fn truncate_unsigned(value: u64, length: LengthMod) -> u64 {
    match length {
        LengthMod::Hh => u64::from(value as u8),
        LengthMod::H => u64::from(value as u16),
        LengthMod::None | LengthMod::BigL => u64::from(value as u32),
        _ => value,
    }
}

/// Render a signed integer.
pub fn format_signed(value: i64, spec: &FormatSpec, field: &mut Field) {
    let sign = if value < 0 {
        Some(b'-')
    } else if spec.flags.force_sign {
        Some(b'+')
    } else if spec.flags.space_sign {
        Some(b' ')
    } else {
        None
    };
    emit_integer(sign, value.unsigned_abs(), b"", spec, field);
}

/// Render an unsigned integer in the base the conversion names.
pub fn format_unsigned(value: u64, spec: &FormatSpec, field: &mut Field) {
    let prefix: &[u8] = match (spec.flags.alt_form, spec.conversion, value) {
        (false, _, _) | (true, b'x' | b'X', 0) => b"",
        (true, b'x', _) => b"0x",
        (true, b'X', _) => b"0X",
        (true, _, _) => b"",
    };
    emit_integer(None, value, prefix, spec, field);
}

fn emit_integer(
    sign: Option<u8>,
    magnitude: u64,
    prefix: &[u8],
    spec: &FormatSpec,
    field: &mut Field,
) {
    let (base, uppercase) = int_base(spec.conversion);
    let mut digits = [0u8; 64];
    let count = render_digits(magnitude, base, uppercase, &mut digits);
    let mut digit_slice = &digits[64 - count..];

    let precision = match spec.precision {
        Precision::Fixed(p) => Some(p),
        _ => None,
    };
    // An explicit zero precision prints no digits for zero.
    if magnitude == 0 && precision == Some(0) {
        digit_slice = &[];
    }
    let mut zeros = precision.unwrap_or(1).saturating_sub(digit_slice.len());
    // '#' with octal forces a leading zero.
    if spec.flags.alt_form
        && spec.conversion == b'o'
        && zeros == 0
        && digit_slice.first() != Some(&b'0')
    {
        zeros = 1;
    }

    field.head(sign.as_slice());
    field.head(prefix);
    field.zeros = zeros;
    field.body(digit_slice);
    field.justify(spec, spec.flags.zero_pad && precision.is_none());
}

/// Render a byte string. Stops at a NUL or after `precision` bytes.
pub fn format_str(s: &[u8], spec: &FormatSpec, field: &mut Field) {
    let terminated = s.iter().position(|&b| b == 0).map_or(s, |nul| &s[..nul]);
    let max_len = match spec.precision {
        Precision::Fixed(p) => p,
        _ => terminated.len(),
    };
    field.body(&terminated[..terminated.len().min(max_len)]);
    field.justify(spec, false);
}

pub fn format_char(c: u8, spec: &FormatSpec, field: &mut Field) {
    field.body(&[c]);
    field.justify(spec, false);
}

/// Render an address as `0x` and 16 hex digits; null is `(nil)`.
pub fn format_pointer(addr: usize, spec: &FormatSpec, field: &mut Field) {
    if addr == 0 {
        field.body(b"(nil)");
        return field.justify(spec, false);
    }
    let mut text = [0u8; 18];
    text[..2].copy_from_slice(b"0x");
    let mut value = addr as u64;
    for slot in text[2..].iter_mut().rev() {
        *slot = HEX_LOWER[(value & 0xf) as usize];
        value >>= 4;
    }
    field.body(&text);
    field.justify(spec, false);
}

/// Render a float for `%f %F %e %E %g %G %a %A`.
pub fn format_float(value: f64, spec: &FormatSpec, field: &mut Field) {
    let upper = spec.conversion.is_ascii_uppercase();
    field.head(float_sign(value, spec).as_slice());
    if !value.is_finite() {
        let body: &[u8] = match (value.is_nan(), upper) {
            (true, false) => b"nan",
            (true, true) => b"NAN",
            (false, false) => b"inf",
            (false, true) => b"INF",
        };
        field.body(body);
        return field.justify(spec, false);
    }

    let precision = match spec.precision {
        Precision::Fixed(p) => Some(p),
        _ => None,
    };
    let abs = value.abs();
    let alt = spec.flags.alt_form;
    match spec.conversion | 0x20 {
        b'a' => format_a(abs, precision, upper, alt, field),
        b'e' => format_e(abs, precision.unwrap_or(6), upper, alt, field),
        b'g' => format_g(abs, precision.unwrap_or(6), upper, alt, field),
        _ => format_f(abs, precision.unwrap_or(6), alt, field),
    }
    field.justify(spec, spec.flags.zero_pad);
}

const HEX_LOWER: &[u8; 16] = b"0123456789abcdef";
const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Saturates one past [`FORMAT_MAX`], which is enough to reject the field.
fn parse_decimal(digits: &[u8]) -> usize {
    digits.iter().fold(0usize, |acc, &d| {
        acc.saturating_mul(10)
            .saturating_add(usize::from(d - b'0'))
            .min(FORMAT_MAX + 1)
    })
}

fn resolve_width(spec: &FormatSpec) -> usize {
    match spec.width {
        Width::Fixed(w) => w,
        _ => 0,
    }
}

fn int_base(conversion: u8) -> (u64, bool) {
    match conversion {
        b'o' => (8, false),
        b'x' => (16, false),
        b'X' => (16, true),
        _ => (10, false),
    }
}

/// Write the digits of `value` right-aligned into `buf`; returns the count.
fn render_digits(mut value: u64, base: u64, uppercase: bool, buf: &mut [u8; 64]) -> usize {
    let table = if uppercase { HEX_UPPER } else { HEX_LOWER };
    let mut pos = 64;
    loop {
        pos -= 1;
        buf[pos] = table[(value % base) as usize];
        value /= base;
        if value == 0 {
            break;
        }
    }
    64 - pos
}

fn float_sign(value: f64, spec: &FormatSpec) -> Option<u8> {
    if value.is_sign_negative() && !value.is_nan() {
        Some(b'-')
    } else if spec.flags.force_sign {
        Some(b'+')
    } else if spec.flags.space_sign {
        Some(b' ')
    } else {
        None
    }
}

/// Every binary double has at most this many digits after the decimal
/// point; asking for more only appends zeros.
const EXACT_DIGITS: usize = 1100;

fn format_f(value: f64, precision: usize, alt: bool, field: &mut Field) {
    let shown = precision.min(EXACT_DIGITS);
    field.body(format!("{value:.shown$}").as_bytes());
    field.body_zeros = precision - shown;
    if alt && precision == 0 {
        field.body(b".");
    }
}

/// Scientific notation with a signed, at least two-digit exponent.
fn format_e(value: f64, precision: usize, upper: bool, alt: bool, field: &mut Field) {
    let shown = precision.min(EXACT_DIGITS);
    let (mantissa, exp) = split_exp(value, shown);
    field.body(mantissa.as_bytes());
    field.body_zeros = precision - shown;
    if alt && precision == 0 {
        field.body(b".");
    }
    field.tail(exponent(b'e', exp, upper, 2).as_bytes());
}

/// `%g`: `%e` when the exponent is below -4 or at least the precision,
/// `%f` otherwise; trailing zeros are dropped unless `#` is given.
fn format_g(value: f64, precision: usize, upper: bool, alt: bool, field: &mut Field) {
    let p = precision.max(1);
    let (mantissa, exp) = split_exp(value, (p - 1).min(EXACT_DIGITS));
    let scientific = exp < -4 || i64::from(exp) >= p as i64;
    let (mut text, wanted) = if scientific {
        (mantissa, p - 1)
    } else {
        let frac = (p as i64 - 1 - i64::from(exp)).max(0) as usize;
        let shown = frac.min(EXACT_DIGITS);
        (format!("{value:.shown$}"), frac)
    };
    if alt {
        field.body_zeros = wanted.saturating_sub(EXACT_DIGITS);
        if !text.contains('.') {
            text.push('.');
        }
    } else {
        strip_trailing_zeros(&mut text);
    }
    field.body(text.as_bytes());
    if scientific {
        field.tail(exponent(b'e', exp, upper, 2).as_bytes());
    }
}

/// Round to `precision` fractional mantissa digits and return the mantissa
/// text with its decimal exponent.
fn split_exp(value: f64, precision: usize) -> (String, i32) {
    let text = format!("{value:.precision$e}");
    match text.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_owned(), exp.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

const FRAC_BITS: u32 = 52;
const HEX_FRAC_DIGITS: usize = 13;

/// `%a`: `0x1.<hex fraction>p<binary exponent>`, subnormals as `0x0.`.
///
/// Without a precision the fraction is exact with trailing zeros dropped.
/// With one it is rounded half to even, and a carry out of the fraction
/// lands in the leading digit (`0x2p+0`), never in the exponent.
fn format_a(value: f64, precision: Option<usize>, upper: bool, alt: bool, field: &mut Field) {
    let table = if upper { HEX_UPPER } else { HEX_LOWER };
    let bits = value.to_bits();
    let biased = ((bits >> FRAC_BITS) & 0x7ff) as i32;
    let mut frac = bits & ((1u64 << FRAC_BITS) - 1);
    let (mut lead, exp) = match (biased, frac) {
        (0, 0) => (0u64, 0),
        (0, _) => (0, -1022),
        _ => (1, biased - 1023),
    };

    let mut digits = HEX_FRAC_DIGITS;
    match precision {
        None => {
            while digits > 0 && frac & 0xf == 0 {
                frac >>= 4;
                digits -= 1;
            }
        }
        Some(p) if p < HEX_FRAC_DIGITS => {
            let kept_bits = 4 * p as u32;
            let shift = FRAC_BITS - kept_bits;
            let mut kept = (lead << kept_bits) | (frac >> shift);
            let rest = frac & ((1u64 << shift) - 1);
            let half = 1u64 << (shift - 1);
            if rest > half || (rest == half && kept & 1 == 1) {
                kept += 1;
            }
            lead = kept >> kept_bits;
            frac = kept & ((1u64 << kept_bits) - 1);
            digits = p;
        }
        Some(p) => field.body_zeros = p - HEX_FRAC_DIGITS,
    }

    field.head(if upper { b"0X" } else { b"0x" });
    field.body(&[table[lead as usize]]);
    if digits > 0 || alt {
        field.body(b".");
    }
    for i in (0..digits).rev() {
        field.body(&[table[((frac >> (4 * i)) & 0xf) as usize]]);
    }
    field.tail(exponent(b'p', exp, upper, 1).as_bytes());
}

/// `e+05`, `P-1022`: marker, sign, then at least `min_digits` digits.
fn exponent(marker: u8, exp: i32, upper: bool, min_digits: usize) -> String {
    let marker = if upper { marker.to_ascii_uppercase() } else { marker };
    let mut s = String::with_capacity(6);
    s.push(char::from(marker));
    s.push(if exp < 0 { '-' } else { '+' });
    let _ = write!(s, "{:0min_digits$}", exp.unsigned_abs());
    s
}

fn strip_trailing_zeros(s: &mut String) {
    if s.contains('.') {
        let kept = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(fmt: &str, args: &[FormatArg<'_>]) -> String {
        String::from_utf8(format_to_vec(fmt.as_bytes(), args).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_simple_int() {
        let (spec, consumed) = parse_format_spec(b"d").unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(spec, FormatSpec::plain(b'd'));
    }

    #[test]
    fn test_parse_width_precision_length() {
        let (spec, consumed) = parse_format_spec(b"10.5lf").unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(spec.width, Width::Fixed(10));
        assert_eq!(spec.precision, Precision::Fixed(5));
        assert_eq!(spec.length, LengthMod::L);
    }

    #[test]
    fn test_parse_flags_override() {
        let (spec, _) = parse_format_spec(b"-+ #010d").unwrap();
        assert!(spec.flags.left_justify);
        assert!(spec.flags.force_sign);
        assert!(!spec.flags.space_sign);
        assert!(spec.flags.alt_form);
        assert!(!spec.flags.zero_pad);
    }

    #[test]
    fn test_parse_rejects_unknown_and_n() {
        assert!(parse_format_spec(b"y").is_none());
        assert!(parse_format_spec(b"n").is_none());
        assert!(parse_format_spec(b"hh").is_none());
    }

    #[test]
    fn test_segments() {
        let segments = parse_format_string(b"a %d b %% %s");
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[0], FormatSegment::Literal(b"a "));
        assert_eq!(segments[3], FormatSegment::Percent);
        assert!(matches!(&segments[5], FormatSegment::Spec(s) if s.conversion == b's'));
    }

    #[test]
    fn test_golden_cases() {
        assert_eq!(render("%d", &[FormatArg::Int(123)]), "123");
        assert_eq!(render("%05d", &[FormatArg::Int(42)]), "00042");
        assert_eq!(render("%x", &[FormatArg::Uint(0xBEEF)]), "beef");
        assert_eq!(render("%%", &[]), "%");
    }

    #[test]
    fn test_percent_consumes_no_argument() {
        assert_eq!(render("%%%d", &[FormatArg::Int(7)]), "%7");
    }

    #[test]
    fn test_zero_is_never_empty() {
        assert_eq!(render("%d", &[FormatArg::Int(0)]), "0");
        assert_eq!(render("%x", &[FormatArg::Uint(0)]), "0");
        assert_eq!(render("%o", &[FormatArg::Uint(0)]), "0");
        assert_eq!(render("%#x", &[FormatArg::Uint(0)]), "0");
    }

    #[test]
    fn test_explicit_zero_precision_suppresses_zero() {
        assert_eq!(render("[%.0d]", &[FormatArg::Int(0)]), "[]");
    }

    #[test]
    fn test_signed_rendering() {
        assert_eq!(render("%d", &[FormatArg::Int(-123)]), "-123");
        assert_eq!(render("%+d", &[FormatArg::Int(5)]), "+5");
        assert_eq!(render("% d", &[FormatArg::Int(5)]), " 5");
        assert_eq!(render("%06d", &[FormatArg::Int(-42)]), "-00042");
        assert_eq!(render("%-6d|", &[FormatArg::Int(42)]), "42    |");
        assert_eq!(render("%6.3d", &[FormatArg::Int(7)]), "   007");
        assert_eq!(render("%08.3d", &[FormatArg::Int(7)]), "     007");
    }

    #[test]
    fn test_unsigned_rendering() {
        assert_eq!(render("%u", &[FormatArg::Uint(4_000_000_000)]), "4000000000");
        assert_eq!(render("%X", &[FormatArg::Uint(0xbeef)]), "BEEF");
        assert_eq!(render("%#x", &[FormatArg::Uint(255)]), "0xff");
        assert_eq!(render("%#X", &[FormatArg::Uint(255)]), "0XFF");
        assert_eq!(render("%#o", &[FormatArg::Uint(8)]), "010");
        assert_eq!(render("%o", &[FormatArg::Uint(8)]), "10");
        assert_eq!(render("%#010x", &[FormatArg::Uint(255)]), "0x000000ff");
    }

    #[test]
    fn test_length_modifiers_truncate() {
        assert_eq!(render("%hhd", &[FormatArg::Int(300)]), "44");
        assert_eq!(render("%hd", &[FormatArg::Int(65537)]), "1");
        assert_eq!(render("%d", &[FormatArg::Int(1 << 32)]), "0");
        assert_eq!(render("%ld", &[FormatArg::Int(1 << 32)]), "4294967296");
        assert_eq!(render("%x", &[FormatArg::Int(-1)]), "ffffffff");
        assert_eq!(render("%llx", &[FormatArg::Int(-1)]), "ffffffffffffffff");
        assert_eq!(render("%hhu", &[FormatArg::Int(-1)]), "255");
    }

    #[test]
    fn test_strings_and_chars() {
        assert_eq!(render("%s", &[FormatArg::Str(Some(b"hello"))]), "hello");
        assert_eq!(render("%.3s", &[FormatArg::Str(Some(b"hello"))]), "hel");
        assert_eq!(render("%7s", &[FormatArg::Str(Some(b"hi"))]), "     hi");
        assert_eq!(render("%-4s|", &[FormatArg::Str(Some(b"hi"))]), "hi  |");
        assert_eq!(render("%s", &[FormatArg::Str(Some(b"ab\0cd"))]), "ab");
        assert_eq!(render("%s", &[FormatArg::Str(None)]), "(null)");
        assert_eq!(render("%c%c", &[FormatArg::Char(b'o'), FormatArg::Int(107)]), "ok");
        assert_eq!(render("%3c", &[FormatArg::Char(b'z')]), "  z");
    }

    #[test]
    fn test_pointer_is_fixed_width() {
        assert_eq!(render("%p", &[FormatArg::Pointer(0x1234)]), "0x0000000000001234");
        assert_eq!(render("%p", &[FormatArg::Pointer(0)]), "(nil)");
    }

    #[test]
    fn test_star_fields() {
        assert_eq!(render("%*d", &[FormatArg::Int(5), FormatArg::Int(42)]), "   42");
        assert_eq!(render("%*d|", &[FormatArg::Int(-5), FormatArg::Int(42)]), "42   |");
        assert_eq!(
            render("%.*s", &[FormatArg::Int(2), FormatArg::Str(Some(b"abc"))]),
            "ab"
        );
    }

    #[test]
    fn test_missing_argument_renders_nothing() {
        assert_eq!(render("a%db%sc", &[FormatArg::Int(1)]), "a1bc");
    }

    #[test]
    fn test_malformed_directive_is_literal() {
        assert_eq!(render("%y", &[]), "%y");
        assert_eq!(render("100%", &[]), "100%");
        assert_eq!(render("%n%d", &[FormatArg::Int(3)]), "%n3");
    }

    #[test]
    fn test_fixed_floats() {
        assert_eq!(render("%f", &[FormatArg::Float(3.5)]), "3.500000");
        assert_eq!(render("%5.1f", &[FormatArg::Float(3.14159)]), "  3.1");
        assert_eq!(render("%.2f", &[FormatArg::Float(-0.125)]), "-0.12");
        assert_eq!(render("%.0f", &[FormatArg::Float(7.0)]), "7");
        assert_eq!(render("%#.0f", &[FormatArg::Float(7.0)]), "7.");
        assert_eq!(render("%08.2f", &[FormatArg::Float(-1.5)]), "-0001.50");
        assert_eq!(render("%+.1f", &[FormatArg::Float(2.0)]), "+2.0");
    }

    #[test]
    fn test_exponent_floats() {
        assert_eq!(render("%e", &[FormatArg::Float(12345.678)]), "1.234568e+04");
        assert_eq!(render("%E", &[FormatArg::Float(0.00012)]), "1.200000E-04");
        assert_eq!(render("%.0e", &[FormatArg::Float(5.0)]), "5e+00");
        assert_eq!(render("%e", &[FormatArg::Float(0.0)]), "0.000000e+00");
        assert_eq!(render("%.2e", &[FormatArg::Float(9.999)]), "1.00e+01");
    }

    #[test]
    fn test_general_floats() {
        assert_eq!(render("%g", &[FormatArg::Float(0.0001)]), "0.0001");
        assert_eq!(render("%g", &[FormatArg::Float(0.00001)]), "1e-05");
        assert_eq!(render("%g", &[FormatArg::Float(100000.0)]), "100000");
        assert_eq!(render("%g", &[FormatArg::Float(1_000_000.0)]), "1e+06");
        assert_eq!(render("%g", &[FormatArg::Float(3.5)]), "3.5");
        assert_eq!(render("%G", &[FormatArg::Float(1.5e-10)]), "1.5E-10");
        assert_eq!(render("%g", &[FormatArg::Float(0.0)]), "0");
    }

    #[test]
    fn test_special_floats() {
        assert_eq!(render("%f", &[FormatArg::Float(f64::INFINITY)]), "inf");
        assert_eq!(render("%F", &[FormatArg::Float(f64::NEG_INFINITY)]), "-INF");
        assert_eq!(render("%5f", &[FormatArg::Float(f64::NAN)]), "  nan");
    }

    #[test]
    fn test_bounded_output_reports_full_length() {
        let mut dst = [0xffu8; 6];
        let args = [FormatArg::Str(Some(b"abc")), FormatArg::Int(1234)];
        let total = format_bounded(&mut dst, b"%s-%d", &args);
        assert_eq!(total, Ok(8));
        assert_eq!(&dst, b"abc-1\0");
    }

    #[test]
    fn test_bounded_output_zero_capacity() {
        let mut dst: [u8; 0] = [];
        assert_eq!(format_bounded(&mut dst, b"hello", &[]), Ok(5));
    }

    #[test]
    fn test_count_matches_output() {
        let mut out = Vec::new();
        let args = [FormatArg::Int(10), FormatArg::Str(Some(b"ok"))];
        let n = format_output(&mut out, b"x=%d y=%s", &args).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(out, b"x=10 y=ok");
    }

    #[test]
    fn test_oversized_width_is_overflow() {
        let mut dst = [0u8; 16];
        let result = format_bounded(&mut dst, b"%99999999999999999999d", &[FormatArg::Int(1)]);
        assert_eq!(result, Err(FormatOverflow));
        assert_eq!(dst[0], 0);
        assert_eq!(
            format_to_vec(b"%.4294967296d", &[FormatArg::Int(1)]),
            Err(FormatOverflow)
        );
        assert_eq!(
            format_to_vec(b"%*d", &[FormatArg::Int(i64::from(i32::MIN)), FormatArg::Int(1)]),
            Err(FormatOverflow)
        );
    }

    #[test]
    fn test_width_at_int_max_is_counted_not_allocated() {
        let mut dst = [0xffu8; 8];
        let total = format_bounded(&mut dst, b"%2147483647d", &[FormatArg::Int(7)]);
        assert_eq!(total, Ok(FORMAT_MAX));
        assert_eq!(&dst, b"       \0");

        let mut dst = [0u8; 8];
        let total = format_bounded(&mut dst, b"x%2147483647d", &[FormatArg::Int(7)]);
        assert_eq!(total, Err(FormatOverflow));
    }

    #[test]
    fn test_overflow_surfaces_from_every_sink() {
        let mut out = Vec::new();
        let result = format_output(&mut out, b"ok %2147483648s", &[FormatArg::Str(Some(b"x"))]);
        assert_eq!(result, Err(FormatOverflow));
        assert_eq!(out, b"ok ");
    }

    #[test]
    fn test_huge_float_precision() {
        let fixed = format_to_vec(b"%.70000f", &[FormatArg::Float(1.0)]).unwrap();
        assert_eq!(fixed.len(), 70_002);
        assert_eq!(&fixed[..2], b"1.");
        assert!(fixed[2..].iter().all(|&b| b == b'0'));

        let sci = format_to_vec(b"%.70000e", &[FormatArg::Float(1.5)]).unwrap();
        assert_eq!(sci.len(), 70_006);
        assert_eq!(&sci[..3], b"1.5");
        assert!(sci[3..70_002].iter().all(|&b| b == b'0'));
        assert_eq!(&sci[70_002..], b"e+00");

        let upper = format_to_vec(b"%.70000E", &[FormatArg::Float(-2.0)]).unwrap();
        assert!(upper.starts_with(b"-2.000") && upper.ends_with(b"E+00"));
    }

    #[test]
    fn test_precision_past_exact_digits_only_adds_zeros() {
        let short = render("%.1100f", &[FormatArg::Float(0.1)]);
        let long = render("%.1200f", &[FormatArg::Float(0.1)]);
        assert_eq!(long, format!("{short}{}", "0".repeat(100)));
        assert_eq!(
            render("%.70000g", &[FormatArg::Float(0.1)]),
            "0.1000000000000000055511151231257827021181583404541015625"
        );
        assert_eq!(render("%.70000g", &[FormatArg::Float(1e300)]).len(), 301);
    }

    #[test]
    fn test_alt_general_keeps_point() {
        assert_eq!(render("%#g", &[FormatArg::Float(1.5)]), "1.50000");
        assert_eq!(render("%#.1g", &[FormatArg::Float(5.0)]), "5.");
        assert_eq!(render("%#.1g", &[FormatArg::Float(5e10)]), "5.e+10");
    }

    #[test]
    fn test_hex_floats() {
        assert_eq!(render("%a", &[FormatArg::Float(1.0)]), "0x1p+0");
        assert_eq!(render("%a", &[FormatArg::Float(0.5)]), "0x1p-1");
        assert_eq!(render("%a", &[FormatArg::Float(0.1)]), "0x1.999999999999ap-4");
        assert_eq!(render("%A", &[FormatArg::Float(255.0)]), "0X1.FEP+7");
        assert_eq!(render("%a", &[FormatArg::Float(-2.0)]), "-0x1p+1");
        assert_eq!(render("%a", &[FormatArg::Float(0.0)]), "0x0p+0");
        assert_eq!(render("%a", &[FormatArg::Float(-0.0)]), "-0x0p+0");
        assert_eq!(render("%a", &[FormatArg::Float(5e-324)]), "0x0.0000000000001p-1022");
        assert_eq!(render("%a", &[FormatArg::Float(f64::MAX)]), "0x1.fffffffffffffp+1023");
    }

    #[test]
    fn test_hex_float_precision_and_flags() {
        assert_eq!(render("%.1a", &[FormatArg::Float(1.0)]), "0x1.0p+0");
        assert_eq!(render("%.0a", &[FormatArg::Float(1.0)]), "0x1p+0");
        assert_eq!(render("%#.0a", &[FormatArg::Float(1.0)]), "0x1.p+0");
        assert_eq!(render("%#a", &[FormatArg::Float(1.0)]), "0x1.p+0");
        // Ties round to even, carrying into the leading digit.
        assert_eq!(render("%.0a", &[FormatArg::Float(1.5)]), "0x2p+0");
        assert_eq!(render("%.0a", &[FormatArg::Float(2.5)]), "0x1p+1");
        assert_eq!(render("%.2a", &[FormatArg::Float(1.998046875)]), "0x2.00p+0");
        assert_eq!(render("%.3a", &[FormatArg::Float(0.1)]), "0x1.99ap-4");
        assert_eq!(render("%.15a", &[FormatArg::Float(1.0)]), "0x1.000000000000000p+0");
        assert_eq!(render("%12a|", &[FormatArg::Float(1.0)]), "      0x1p+0|");
        assert_eq!(render("%-12a|", &[FormatArg::Float(1.0)]), "0x1p+0      |");
        assert_eq!(render("%012a", &[FormatArg::Float(1.0)]), "0x0000001p+0");
        assert_eq!(render("%+a", &[FormatArg::Float(2.0)]), "+0x1p+1");
        assert_eq!(render("%A", &[FormatArg::Float(f64::NEG_INFINITY)]), "-INF");
        assert_eq!(render("%a", &[FormatArg::Float(f64::NAN)]), "nan");
    }
}
