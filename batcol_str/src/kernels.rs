//! String-producing scalar kernels.
//!
//! Kernels write their result into the caller's [`ScratchBuffer`] and return
//! [`Emit::Value`], or [`Emit::Nil`] when an argument is outside the domain
//! for which a value is defined (negative lengths and counts). They never see
//! nil operands.

use batcol_exec::{Emit, KernelError, KernelResult, ScratchBuffer};

use crate::text::{byte_offset, char_len, is_space};

fn emit(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    buf.set(s)?;
    Ok(Emit::Value)
}

fn emit_chars<I>(buf: &mut ScratchBuffer, chars: I) -> KernelResult<Emit>
where
    I: Iterator<Item = char> + Clone,
{
    buf.ensure_capacity(chars.clone().map(char::len_utf8).sum())?;
    for c in chars {
        buf.push_char(c)?;
    }
    Ok(Emit::Value)
}

fn too_large(bytes: usize) -> KernelError {
    KernelError::OutOfMemory { bytes }
}

/// Lower case.
pub fn lower(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    emit_chars(buf, s.chars().flat_map(char::to_lowercase))
}

/// Upper case.
pub fn upper(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    emit_chars(buf, s.chars().flat_map(char::to_uppercase))
}

/// Code point reversal.
pub fn reverse(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    emit_chars(buf, s.chars().rev())
}

/// Remove leading and trailing whitespace.
pub fn strip(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    emit(buf, s.trim_matches(is_space))
}

/// Remove leading whitespace.
pub fn ltrim(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    emit(buf, s.trim_start_matches(is_space))
}

/// Remove trailing whitespace.
pub fn rtrim(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    emit(buf, s.trim_end_matches(is_space))
}

/// Remove leading and trailing characters found in `chars`.
pub fn strip2(buf: &mut ScratchBuffer, s: &str, chars: &str) -> KernelResult<Emit> {
    emit(buf, s.trim_matches(|c: char| chars.contains(c)))
}

/// Remove leading characters found in `chars`.
pub fn ltrim2(buf: &mut ScratchBuffer, s: &str, chars: &str) -> KernelResult<Emit> {
    emit(buf, s.trim_start_matches(|c: char| chars.contains(c)))
}

/// Remove trailing characters found in `chars`.
pub fn rtrim2(buf: &mut ScratchBuffer, s: &str, chars: &str) -> KernelResult<Emit> {
    emit(buf, s.trim_end_matches(|c: char| chars.contains(c)))
}

/// Padding side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Fill before the value.
    Left,
    /// Fill after the value.
    Right,
}

/// Pad `s` with repetitions of `fill` to `len` code points.
///
/// Longer input is truncated to `len`. An empty fill leaves shorter input
/// unchanged. A negative length is nil.
pub fn pad(buf: &mut ScratchBuffer, s: &str, fill: &str, len: i32, side: Side) -> KernelResult<Emit> {
    let Ok(len) = usize::try_from(len) else {
        return Ok(Emit::Nil);
    };
    let slen = char_len(s);
    if slen >= len {
        return emit(buf, &s[..byte_offset(s, len)]);
    }
    let flen = char_len(fill);
    if flen == 0 {
        return emit(buf, s);
    }
    let (repeats, residual) = ((len - slen) / flen, (len - slen) % flen);
    let rest = &fill[..byte_offset(fill, residual)];
    let total = fill
        .len()
        .checked_mul(repeats)
        .and_then(|n| n.checked_add(s.len() + rest.len()))
        .ok_or_else(|| too_large(usize::MAX))?;
    buf.ensure_capacity(total)?;
    if side == Side::Right {
        buf.push_str(s)?;
    }
    for _ in 0..repeats {
        buf.push_str(fill)?;
    }
    buf.push_str(rest)?;
    if side == Side::Left {
        buf.push_str(s)?;
    }
    Ok(Emit::Value)
}

/// Left pad with spaces.
pub fn lpad(buf: &mut ScratchBuffer, s: &str, len: i32) -> KernelResult<Emit> {
    pad(buf, s, " ", len, Side::Left)
}

/// Right pad with spaces.
pub fn rpad(buf: &mut ScratchBuffer, s: &str, len: i32) -> KernelResult<Emit> {
    pad(buf, s, " ", len, Side::Right)
}

fn slice_chars(s: &str, mut off: i64, mut len: i64) -> &str {
    let n = char_len(s) as i64;
    if off < 0 {
        off += n;
        if off < 0 {
            len += off;
            off = 0;
        }
    }
    if len <= 0 || off >= n {
        return "";
    }
    let end = (off + len).min(n);
    &s[byte_offset(s, off as usize)..byte_offset(s, end as usize)]
}

/// `len` code points from the 1-based position `start`. Positions before the
/// first character count as 1; a negative length is nil.
pub fn substring(buf: &mut ScratchBuffer, s: &str, start: i32, len: i32) -> KernelResult<Emit> {
    if len < 0 {
        return Ok(Emit::Nil);
    }
    let off = i64::from(start.max(1)) - 1;
    emit(buf, slice_chars(s, off, i64::from(len)))
}

/// Everything from the 1-based position `start`.
pub fn substring_tail(buf: &mut ScratchBuffer, s: &str, start: i32) -> KernelResult<Emit> {
    tail(buf, s, start.max(1) - 1)
}

/// Everything from the 0-based offset `off`; negative offsets count from the
/// end.
pub fn tail(buf: &mut ScratchBuffer, s: &str, off: i32) -> KernelResult<Emit> {
    let n = char_len(s) as i64;
    let mut off = i64::from(off);
    if off < 0 {
        off = (off + n).max(0);
    }
    emit(buf, &s[byte_offset(s, off as usize)..])
}

/// First `len` code points.
pub fn prefix(buf: &mut ScratchBuffer, s: &str, len: i32) -> KernelResult<Emit> {
    if len < 0 {
        return Ok(Emit::Nil);
    }
    emit(buf, slice_chars(s, 0, i64::from(len)))
}

/// Last `len` code points.
pub fn suffix(buf: &mut ScratchBuffer, s: &str, len: i32) -> KernelResult<Emit> {
    let Ok(len) = usize::try_from(len) else {
        return Ok(Emit::Nil);
    };
    emit(buf, &s[byte_offset(s, char_len(s).saturating_sub(len))..])
}

/// `s` repeated `count` times; a negative count is nil.
pub fn repeat(buf: &mut ScratchBuffer, s: &str, count: i32) -> KernelResult<Emit> {
    let Ok(count) = usize::try_from(count) else {
        return Ok(Emit::Nil);
    };
    if s.is_empty() || count == 0 {
        return emit(buf, "");
    }
    let total = s.len().checked_mul(count).ok_or_else(|| too_large(usize::MAX))?;
    buf.ensure_capacity(total)?;
    for _ in 0..count {
        buf.push_str(s)?;
    }
    Ok(Emit::Value)
}

/// `count` spaces; a negative count is nil.
pub fn space(buf: &mut ScratchBuffer, count: i32) -> KernelResult<Emit> {
    repeat(buf, " ", count)
}

/// The character for code point `cp`; 0 is the empty string.
pub fn unicode(buf: &mut ScratchBuffer, cp: i32) -> KernelResult<Emit> {
    if cp == 0 {
        return emit(buf, "");
    }
    let c = u32::try_from(cp)
        .ok()
        .and_then(char::from_u32)
        .ok_or(KernelError::IllegalCodePoint)?;
    buf.ensure_capacity(c.len_utf8())?;
    buf.push_char(c)?;
    Ok(Emit::Value)
}

/// ASCII transliteration; characters without one become `?`.
pub fn asciify(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
    if s.is_ascii() {
        return emit(buf, s);
    }
    emit(buf, &deunicode::deunicode_with_tofu(s, "?"))
}

/// Field `field` (1-based) of `s` split on `sep`.
///
/// Without a separator the whole input is field 1 and every later field is
/// empty. Fields past the last one are empty.
pub fn splitpart(buf: &mut ScratchBuffer, s: &str, sep: &str, field: i32) -> KernelResult<Emit> {
    if field <= 0 {
        return Err(KernelError::Domain("field position must be greater than zero"));
    }
    if sep.is_empty() {
        return emit(buf, if field == 1 { s } else { "" });
    }
    emit(buf, s.split(sep).nth(field as usize - 1).unwrap_or(""))
}

/// Replace the first occurrence of `src` with `dst`, or every occurrence when
/// `all` is set. An empty `src` leaves the input unchanged.
pub fn substitute(buf: &mut ScratchBuffer, s: &str, src: &str, dst: &str, all: bool) -> KernelResult<Emit> {
    if src.is_empty() || s.is_empty() {
        return emit(buf, s);
    }
    let hits = if all { s.matches(src).count() } else { usize::from(s.contains(src)) };
    let total = dst
        .len()
        .checked_mul(hits)
        .and_then(|n| n.checked_add(s.len() - hits * src.len()))
        .ok_or_else(|| too_large(usize::MAX))?;
    buf.ensure_capacity(total)?;
    let mut last = 0;
    for (at, _) in s.match_indices(src).take(hits) {
        buf.push_str(&s[last..at])?;
        buf.push_str(dst)?;
        last = at + src.len();
    }
    buf.push_str(&s[last..])?;
    Ok(Emit::Value)
}

/// Replace `nchars` code points at the 0-based position `start` with `ins`.
/// Negative positions count from the end.
pub fn insert(buf: &mut ScratchBuffer, s: &str, start: i32, nchars: i32, ins: &str) -> KernelResult<Emit> {
    if nchars < 0 {
        return Err(KernelError::Domain(
            "The number of characters for insert function must be non negative",
        ));
    }
    let n = char_len(s) as i64;
    let mut start = i64::from(start);
    if start < 0 {
        start = (start + n).max(0);
    }
    let start = start.min(n);
    let end = (start + i64::from(nchars)).min(n);
    let (head, rest) = (byte_offset(s, start as usize), byte_offset(s, end as usize));
    buf.ensure_capacity(head + ins.len() + (s.len() - rest))?;
    buf.push_str(&s[..head])?;
    buf.push_str(ins)?;
    buf.push_str(&s[rest..])?;
    Ok(Emit::Value)
}
