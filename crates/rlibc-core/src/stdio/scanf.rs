//! Formatted input engine.
//!
//! Mirrors the output engine: the format string is walked left to right
//! against a byte source with one byte of lookahead. Conversions store their
//! values in a [`ScanResult`] instead of writing through caller pointers;
//! the C entry points copy them into the slots afterwards.

use super::printf::LengthMod;

/// A byte source with one byte of lookahead.
pub trait ScanInput {
    /// The next byte without consuming it.
    fn peek(&mut self) -> Option<u8>;

    /// Consume the byte last returned by `peek`.
    fn bump(&mut self);
}

/// Scan source over an in-memory byte string (`sscanf`). Stops at a NUL.
#[derive(Debug, Clone)]
pub struct SliceInput<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceInput<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

impl ScanInput for SliceInput<'_> {
    fn peek(&mut self) -> Option<u8> {
        self.data.get(self.pos).copied().filter(|&b| b != 0)
    }

    fn bump(&mut self) {
        self.pos = (self.pos + 1).min(self.data.len());
    }
}

/// A converted value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanValue {
    Int(i64),
    Uint(u64),
    Pointer(usize),
    /// `%f %e %g %a`, narrowed to the destination type by the caller.
    Float(f64),
    /// `%c`: exactly `width` bytes, no terminator.
    Chars(Vec<u8>),
    /// `%s`: one whitespace-delimited token, no terminator.
    Str(Vec<u8>),
}

/// One assigned directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanItem {
    pub conversion: u8,
    pub length: LengthMod,
    pub value: ScanValue,
}

/// Outcome of a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub items: Vec<ScanItem>,
    /// Input ran out before the first conversion.
    pub input_failure: bool,
}

impl ScanResult {
    /// Number of directives that were satisfied and assigned.
    pub fn matched(&self) -> usize {
        self.items.len()
    }

    /// The C return value: the match count, or -1 (`EOF`) on an input
    /// failure before anything was converted.
    pub fn c_return(&self) -> i32 {
        if self.input_failure {
            -1
        } else {
            self.items.len() as i32
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScanSpec {
    suppress: bool,
    width: Option<usize>,
    length: LengthMod,
    conversion: u8,
}

/// Parse a scan directive after its `%`. Returns the spec and bytes used.
fn parse_scan_spec(fmt: &[u8]) -> Option<(ScanSpec, usize)> {
    let mut pos = 0;
    let suppress = fmt.first() == Some(&b'*');
    if suppress {
        pos += 1;
    }
    let start = pos;
    while fmt.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    let width = (pos > start).then(|| {
        fmt[start..pos].iter().fold(0usize, |acc, &d| {
            acc.saturating_mul(10).saturating_add(usize::from(d - b'0'))
        })
    });
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
    match conversion {
        b'd' | b'i' | b'u' | b'o' | b'x' | b'X' | b'c' | b's' | b'p' | b'%' | b'f' | b'F'
        | b'e' | b'E' | b'g' | b'G' | b'a' | b'A' => {}
        _ => return None,
    }
    Some((
        ScanSpec {
            suppress,
            width: width.filter(|&w| w > 0),
            length,
            conversion,
        },
        pos + 1,
    ))
}

/// Walk `fmt` against `input`, stopping at the first directive that cannot
/// be satisfied.
pub fn format_input<I: ScanInput + ?Sized>(input: &mut I, fmt: &[u8]) -> ScanResult {
    let mut result = ScanResult::default();
    let mut converted = 0usize;
    let mut i = 0;

    while i < fmt.len() {
        let c = fmt[i];
        if c.is_ascii_whitespace() {
            skip_whitespace(input);
            while fmt.get(i).is_some_and(u8::is_ascii_whitespace) {
                i += 1;
            }
            continue;
        }
        if c != b'%' {
            match input.peek() {
                Some(b) if b == c => {
                    input.bump();
                    i += 1;
                    continue;
                }
                Some(_) => break,
                None => {
                    result.input_failure = converted == 0;
                    break;
                }
            }
        }

        let Some((spec, used)) = parse_scan_spec(&fmt[i + 1..]) else {
            break;
        };
        i += 1 + used;

        if spec.conversion != b'c' {
            skip_whitespace(input);
        }
        if input.peek().is_none() {
            result.input_failure = converted == 0;
            break;
        }

        let value = match spec.conversion {
            b'%' => {
                if input.peek() == Some(b'%') {
                    input.bump();
                    continue;
                }
                break;
            }
            b'c' => {
                let want = spec.width.unwrap_or(1);
                let bytes = take_while(input, want, |_| true);
                if bytes.len() < want {
                    break;
                }
                ScanValue::Chars(bytes)
            }
            b's' => ScanValue::Str(take_while(
                input,
                spec.width.unwrap_or(usize::MAX),
                |b| !b.is_ascii_whitespace(),
            )),
            b'f' | b'F' | b'e' | b'E' | b'g' | b'G' | b'a' | b'A' => {
                match scan_float(input, spec.width.unwrap_or(usize::MAX)) {
                    Some(v) => ScanValue::Float(v),
                    None => break,
                }
            }
            conv => {
                let radix = match conv {
                    b'd' | b'u' => Some(10),
                    b'o' => Some(8),
                    b'x' | b'X' | b'p' => Some(16),
                    _ => None,
                };
                let Some(raw) = scan_integer(input, radix, spec.width.unwrap_or(usize::MAX))
                else {
                    break;
                };
                match conv {
                    b'd' | b'i' => ScanValue::Int(raw as i64),
                    b'p' => ScanValue::Pointer(raw as usize),
                    _ => ScanValue::Uint(raw),
                }
            }
        };

        converted += 1;
        if !spec.suppress {
            result.items.push(ScanItem {
                conversion: spec.conversion,
                length: spec.length,
                value,
            });
        }
    }
    result
}

/// `sscanf` over a byte string.
pub fn scan_slice(data: &[u8], fmt: &[u8]) -> ScanResult {
    format_input(&mut SliceInput::new(data), fmt)
}

fn skip_whitespace<I: ScanInput + ?Sized>(input: &mut I) {
    while input.peek().is_some_and(|b| b.is_ascii_whitespace()) {
        input.bump();
    }
}

fn take_while<I: ScanInput + ?Sized>(
    input: &mut I,
    limit: usize,
    accept: impl Fn(u8) -> bool,
) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < limit {
        match input.peek() {
            Some(b) if accept(b) => {
                out.push(b);
                input.bump();
            }
            _ => break,
        }
    }
    out
}

/// Greedy integer scan. `radix` of `None` detects the base from a `0x` or
/// `0` prefix (`%i`). Returns the two's-complement bits of the value, or
/// `None` if no digit was consumed.
fn scan_integer<I: ScanInput + ?Sized>(
    input: &mut I,
    radix: Option<u32>,
    width: usize,
) -> Option<u64> {
    let mut budget = width;
    let mut negative = false;
    if let Some(sign @ (b'+' | b'-')) = input.peek() {
        negative = sign == b'-';
        input.bump();
        budget -= 1;
    }

    let mut base = radix;
    let mut digits = 0usize;
    if budget > 0 && input.peek() == Some(b'0') && matches!(base, None | Some(16)) {
        input.bump();
        budget -= 1;
        digits = 1;
        if budget > 0 && matches!(input.peek(), Some(b'x' | b'X')) {
            input.bump();
            budget -= 1;
            base = Some(16);
        } else if base.is_none() {
            base = Some(8);
        }
    }
    let base = base.unwrap_or(10);

    let mut value = 0u64;
    while budget > 0 {
        let Some(d) = input.peek().and_then(|b| char::from(b).to_digit(base)) else {
            break;
        };
        value = value.wrapping_mul(u64::from(base)).wrapping_add(u64::from(d));
        input.bump();
        budget -= 1;
        digits += 1;
    }

    (digits > 0).then(|| if negative { value.wrapping_neg() } else { value })
}

/// Bytes consumed under a field width, kept for the decimal parse.
struct FloatText<'i, I: ?Sized> {
    input: &'i mut I,
    budget: usize,
    text: String,
}

impl<I: ScanInput + ?Sized> FloatText<'_, I> {
    fn peek(&mut self) -> Option<u8> {
        if self.budget == 0 { None } else { self.input.peek() }
    }

    /// Consume the next byte if `accept` takes it.
    fn take_if(&mut self, accept: impl Fn(u8) -> bool) -> Option<u8> {
        let b = self.peek().filter(|&b| accept(b))?;
        self.input.bump();
        self.budget -= 1;
        self.text.push(char::from(b));
        Some(b)
    }

    fn take_digits(&mut self) -> usize {
        let mut n = 0;
        while self.take_if(|b| b.is_ascii_digit()).is_some() {
            n += 1;
        }
        n
    }

    /// Case-insensitive match of `word`; false once a byte differs.
    fn take_word(&mut self, word: &[u8]) -> bool {
        word.iter()
            .all(|&w| self.take_if(|b| b.eq_ignore_ascii_case(&w)).is_some())
    }

    fn take_exponent_digits(&mut self) -> Option<i64> {
        let negative = self.take_if(|b| matches!(b, b'+' | b'-')) == Some(b'-');
        let mut value = 0i64;
        let mut digits = 0;
        while let Some(b) = self.take_if(|b| b.is_ascii_digit()) {
            value = (value * 10 + i64::from(b - b'0')).min(EXPONENT_CAP);
            digits += 1;
        }
        (digits > 0).then_some(if negative { -value } else { value })
    }

    /// Digits, optional point and digits, optional exponent. `leading`
    /// digits were consumed by the caller.
    fn decimal(&mut self, leading: usize) -> Option<f64> {
        let mut digits = leading + self.take_digits();
        if self.take_if(|b| b == b'.').is_some() {
            digits += self.take_digits();
        }
        if digits == 0 {
            return None;
        }
        if self.take_if(|b| matches!(b, b'e' | b'E')).is_some() {
            self.take_exponent_digits()?;
        }
        self.text.parse().ok()
    }

    /// Hex digits after `0x`. The leading zero already counts as a digit.
    fn hex(&mut self) -> Option<f64> {
        let mut mantissa = 0u64;
        let mut exp = 0i64;
        let mut after_point = false;
        loop {
            if let Some(b) = self.take_if(|b| b.is_ascii_hexdigit()) {
                let d = char::from(b).to_digit(16).map_or(0, u64::from);
                if mantissa >> 60 == 0 {
                    mantissa = (mantissa << 4) | d;
                    if after_point {
                        exp -= 4;
                    }
                } else {
                    // Out of mantissa room: keep a sticky bit for rounding.
                    mantissa |= u64::from(d != 0);
                    if !after_point {
                        exp += 4;
                    }
                }
            } else if !after_point && self.take_if(|b| b == b'.').is_some() {
                after_point = true;
            } else {
                break;
            }
        }
        if self.take_if(|b| matches!(b, b'p' | b'P')).is_some() {
            exp += self.take_exponent_digits()?;
        }
        Some(scale_by_two(mantissa as f64, exp))
    }
}

const EXPONENT_CAP: i64 = 100_000;

/// `x * 2^exp` in steps that stay inside the normal range.
fn scale_by_two(mut x: f64, exp: i64) -> f64 {
    let mut exp = exp.clamp(-4000, 4000) as i32;
    while exp > 1000 {
        x *= 2f64.powi(1000);
        exp -= 1000;
    }
    while exp < -1000 {
        x *= 2f64.powi(-1000);
        exp += 1000;
    }
    x * 2f64.powi(exp)
}

/// `strtod`-style scan: optional sign, then decimal digits with an optional
/// point and exponent, `0x` hex digits with an optional `p` exponent,
/// `inf`/`infinity`, or `nan` with an optional `(chars)` tag.
///
/// With one byte of lookahead nothing can be given back, so a prefix that
/// stops short of a number (`1e`, `inf` cut off inside `infinity`) is a
/// matching failure.
fn scan_float<I: ScanInput + ?Sized>(input: &mut I, width: usize) -> Option<f64> {
    let mut t = FloatText {
        input,
        budget: width,
        text: String::new(),
    };
    let negative = t.take_if(|b| matches!(b, b'+' | b'-')) == Some(b'-');
    t.text.clear();

    let magnitude = match t.peek()?.to_ascii_lowercase() {
        b'i' => {
            if !t.take_word(b"inf") {
                return None;
            }
            if t.peek().is_some_and(|b| b.eq_ignore_ascii_case(&b'i')) && !t.take_word(b"inity") {
                return None;
            }
            f64::INFINITY
        }
        b'n' => {
            if !t.take_word(b"nan") {
                return None;
            }
            if t.take_if(|b| b == b'(').is_some() {
                while t.take_if(|b| b.is_ascii_alphanumeric() || b == b'_').is_some() {}
                t.take_if(|b| b == b')')?;
            }
            f64::NAN
        }
        b'0' => {
            t.take_if(|b| b == b'0');
            if t.take_if(|b| matches!(b, b'x' | b'X')).is_some() {
                t.hex()?
            } else {
                t.decimal(1)?
            }
        }
        _ => t.decimal(0)?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
