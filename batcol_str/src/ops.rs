//! Bulk string operators.
//!
//! One function per logical operator. Every argument is an [`Arg`], so each
//! function covers all column/constant shapes with or without candidate
//! lists.

use batcol_exec::{Arg, BatArg, Dispatcher, ExecError, ExecResult, Joined, OpSpec, ScratchBuffer, CHAR_SCRATCH};
use batcol_storage::ColumnId;

use crate::kernels::{self, Side};
use crate::search;

const LENGTH: OpSpec = OpSpec::new("batstr.length").scratch(0);
const BYTES: OpSpec = OpSpec::new("batstr.bytes").scratch(0);
const ASCII: OpSpec = OpSpec::new("batstr.ascii").scratch(0);
const UNICODE: OpSpec = OpSpec::new("batstr.unicode").scratch(CHAR_SCRATCH);
const UNICODE_AT: OpSpec = OpSpec::new("batstr.unicodeAt").scratch(0);
const SPACE: OpSpec = OpSpec::new("batstr.space");
const LOWER: OpSpec = OpSpec::new("batstr.lower");
const UPPER: OpSpec = OpSpec::new("batstr.upper");
const REVERSE: OpSpec = OpSpec::new("batstr.reverse");
const ASCIIFY: OpSpec = OpSpec::new("batstr.asciify");
const STRIP: OpSpec = OpSpec::new("batstr.strip");
const LTRIM: OpSpec = OpSpec::new("batstr.ltrim");
const RTRIM: OpSpec = OpSpec::new("batstr.rtrim");
const STRIP2: OpSpec = OpSpec::new("batstr.strip2");
const LTRIM2: OpSpec = OpSpec::new("batstr.ltrim2");
const RTRIM2: OpSpec = OpSpec::new("batstr.rtrim2");
const LPAD: OpSpec = OpSpec::new("batstr.lpad");
const RPAD: OpSpec = OpSpec::new("batstr.rpad");
const LPAD3: OpSpec = OpSpec::new("batstr.lpad3");
const RPAD3: OpSpec = OpSpec::new("batstr.rpad3");
const PREFIX: OpSpec = OpSpec::new("batstr.prefix");
const SUFFIX: OpSpec = OpSpec::new("batstr.suffix");
const TAIL: OpSpec = OpSpec::new("batstr.tail");
const SUBSTRING: OpSpec = OpSpec::new("batstr.substring");
const REPEAT: OpSpec = OpSpec::new("batstr.repeat");
const SPLITPART: OpSpec = OpSpec::new("batstr.splitpart");
const SUBSTITUTE: OpSpec = OpSpec::new("batstr.substitute");
const REPLACE: OpSpec = OpSpec::new("batstr.replace");
const INSERT: OpSpec = OpSpec::new("batstr.insert");
const STARTS_WITH: OpSpec = OpSpec::new("batstr.startsWith").scratch(0);
const ENDS_WITH: OpSpec = OpSpec::new("batstr.endsWith").scratch(0);
const CONTAINS: OpSpec = OpSpec::new("batstr.contains").scratch(0);
const SEARCH: OpSpec = OpSpec::new("batstr.search").scratch(0);
const R_SEARCH: OpSpec = OpSpec::new("batstr.r_search").scratch(0);
const LOCATE: OpSpec = OpSpec::new("batstr.locate").scratch(0);
const STARTS_WITH_SELECT: OpSpec = OpSpec::new("batstr.startswithselect").scratch(0);
const ENDS_WITH_SELECT: OpSpec = OpSpec::new("batstr.endswithselect").scratch(0);
const CONTAINS_SELECT: OpSpec = OpSpec::new("batstr.containsselect").scratch(0);
const STARTS_WITH_JOIN: OpSpec = OpSpec::new("batstr.startswithjoin").scratch(0);
const ENDS_WITH_JOIN: OpSpec = OpSpec::new("batstr.endswithjoin").scratch(0);
const CONTAINS_JOIN: OpSpec = OpSpec::new("batstr.containsjoin").scratch(0);
const STARTS_WITH_JOIN1: OpSpec = OpSpec::new("batstr.startswithjoin1").scratch(0);
const ENDS_WITH_JOIN1: OpSpec = OpSpec::new("batstr.endswithjoin1").scratch(0);
const CONTAINS_JOIN1: OpSpec = OpSpec::new("batstr.containsjoin1").scratch(0);

/// Code point count.
pub fn length(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&LENGTH, s, |_: &mut ScratchBuffer, s: &str| Ok(search::length(s)))
}

/// UTF-8 byte count.
pub fn bytes(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&BYTES, s, |_: &mut ScratchBuffer, s: &str| Ok(search::bytes(s)))
}

/// First code point. Nil input yields nil from the kernel itself.
pub fn ascii(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1_nils(&ASCII, s, |_: &mut ScratchBuffer, s: Option<&str>| search::ascii(s))
}

/// Code point to character.
pub fn unicode(d: &Dispatcher<'_>, cp: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map1(&UNICODE, cp, |buf: &mut ScratchBuffer, cp: &i32| kernels::unicode(buf, *cp))
}

/// Code point at a 0-based position.
pub fn unicode_at(d: &Dispatcher<'_>, s: Arg<'_, str>, at: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&UNICODE_AT, s, at, |_: &mut ScratchBuffer, s: &str, at: &i32| search::unicode_at(s, *at))
}

/// `n` spaces.
pub fn space(d: &Dispatcher<'_>, n: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map1(&SPACE, n, |buf: &mut ScratchBuffer, n: &i32| kernels::space(buf, *n))
}

/// Lower case.
pub fn lower(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&LOWER, s, kernels::lower)
}

/// Upper case.
pub fn upper(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&UPPER, s, kernels::upper)
}

/// Code point reversal.
pub fn reverse(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&REVERSE, s, kernels::reverse)
}

/// ASCII transliteration.
pub fn asciify(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&ASCIIFY, s, kernels::asciify)
}

/// Trim whitespace on both sides.
pub fn strip(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&STRIP, s, kernels::strip)
}

/// Trim leading whitespace.
pub fn ltrim(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&LTRIM, s, kernels::ltrim)
}

/// Trim trailing whitespace.
pub fn rtrim(d: &Dispatcher<'_>, s: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map1(&RTRIM, s, kernels::rtrim)
}

/// Trim a character set on both sides.
pub fn strip2(d: &Dispatcher<'_>, s: Arg<'_, str>, chars: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&STRIP2, s, chars, kernels::strip2)
}

/// Trim a leading character set.
pub fn ltrim2(d: &Dispatcher<'_>, s: Arg<'_, str>, chars: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&LTRIM2, s, chars, kernels::ltrim2)
}

/// Trim a trailing character set.
pub fn rtrim2(d: &Dispatcher<'_>, s: Arg<'_, str>, chars: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&RTRIM2, s, chars, kernels::rtrim2)
}

/// Left pad with spaces.
pub fn lpad(d: &Dispatcher<'_>, s: Arg<'_, str>, len: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&LPAD, s, len, |buf: &mut ScratchBuffer, s: &str, len: &i32| kernels::lpad(buf, s, *len))
}

/// Right pad with spaces.
pub fn rpad(d: &Dispatcher<'_>, s: Arg<'_, str>, len: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&RPAD, s, len, |buf: &mut ScratchBuffer, s: &str, len: &i32| kernels::rpad(buf, s, *len))
}

/// Left pad with a fill string.
pub fn lpad3(d: &Dispatcher<'_>, s: Arg<'_, str>, len: Arg<'_, i32>, fill: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map3(&LPAD3, s, len, fill, |buf: &mut ScratchBuffer, s: &str, len: &i32, fill: &str| {
        kernels::pad(buf, s, fill, *len, Side::Left)
    })
}

/// Right pad with a fill string.
pub fn rpad3(d: &Dispatcher<'_>, s: Arg<'_, str>, len: Arg<'_, i32>, fill: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map3(&RPAD3, s, len, fill, |buf: &mut ScratchBuffer, s: &str, len: &i32, fill: &str| {
        kernels::pad(buf, s, fill, *len, Side::Right)
    })
}

/// First `n` code points.
pub fn prefix(d: &Dispatcher<'_>, s: Arg<'_, str>, n: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&PREFIX, s, n, |buf: &mut ScratchBuffer, s: &str, n: &i32| kernels::prefix(buf, s, *n))
}

/// Last `n` code points.
pub fn suffix(d: &Dispatcher<'_>, s: Arg<'_, str>, n: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&SUFFIX, s, n, |buf: &mut ScratchBuffer, s: &str, n: &i32| kernels::suffix(buf, s, *n))
}

/// Everything from a 0-based offset.
pub fn tail(d: &Dispatcher<'_>, s: Arg<'_, str>, off: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&TAIL, s, off, |buf: &mut ScratchBuffer, s: &str, off: &i32| kernels::tail(buf, s, *off))
}

/// `len` code points from a 1-based start.
pub fn substring(d: &Dispatcher<'_>, s: Arg<'_, str>, start: Arg<'_, i32>, len: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map3(&SUBSTRING, s, start, len, |buf: &mut ScratchBuffer, s: &str, start: &i32, len: &i32| {
        kernels::substring(buf, s, *start, *len)
    })
}

/// Everything from a 1-based start.
pub fn substring_tail(d: &Dispatcher<'_>, s: Arg<'_, str>, start: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&SUBSTRING, s, start, |buf: &mut ScratchBuffer, s: &str, start: &i32| {
        kernels::substring_tail(buf, s, *start)
    })
}

/// Repeat a string.
pub fn repeat(d: &Dispatcher<'_>, s: Arg<'_, str>, count: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map2(&REPEAT, s, count, |buf: &mut ScratchBuffer, s: &str, n: &i32| kernels::repeat(buf, s, *n))
}

/// One field of a separated string.
pub fn splitpart(d: &Dispatcher<'_>, s: Arg<'_, str>, sep: Arg<'_, str>, field: Arg<'_, i32>) -> ExecResult<ColumnId> {
    d.map3(&SPLITPART, s, sep, field, |buf: &mut ScratchBuffer, s: &str, sep: &str, field: &i32| {
        kernels::splitpart(buf, s, sep, *field)
    })
}

/// Replace the first or every occurrence, per the `all` flag.
pub fn substitute(
    d: &Dispatcher<'_>,
    s: Arg<'_, str>,
    src: Arg<'_, str>,
    dst: Arg<'_, str>,
    all: Arg<'_, i8>,
) -> ExecResult<ColumnId> {
    d.map4(&SUBSTITUTE, s, src, dst, all, |buf: &mut ScratchBuffer, s: &str, src: &str, dst: &str, all: &i8| {
        kernels::substitute(buf, s, src, dst, *all != 0)
    })
}

/// Replace every occurrence.
pub fn replace(d: &Dispatcher<'_>, s: Arg<'_, str>, src: Arg<'_, str>, dst: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map3(&REPLACE, s, src, dst, |buf: &mut ScratchBuffer, s: &str, src: &str, dst: &str| {
        kernels::substitute(buf, s, src, dst, true)
    })
}

/// Replace code points at a position with another string.
pub fn insert(
    d: &Dispatcher<'_>,
    s: Arg<'_, str>,
    start: Arg<'_, i32>,
    nchars: Arg<'_, i32>,
    ins: Arg<'_, str>,
) -> ExecResult<ColumnId> {
    d.map4(&INSERT, s, start, nchars, ins, |buf: &mut ScratchBuffer, s: &str, start: &i32, n: &i32, ins: &str| {
        kernels::insert(buf, s, *start, *n, ins)
    })
}

/// Prefix test.
pub fn starts_with(d: &Dispatcher<'_>, s: Arg<'_, str>, prefix: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&STARTS_WITH, s, prefix, |_: &mut ScratchBuffer, s: &str, p: &str| Ok(search::starts_with(s, p, false)))
}

/// Prefix test with a case-insensitivity flag.
pub fn starts_with_icase(
    d: &Dispatcher<'_>,
    s: Arg<'_, str>,
    prefix: Arg<'_, str>,
    icase: Arg<'_, i8>,
) -> ExecResult<ColumnId> {
    d.map3(&STARTS_WITH, s, prefix, icase, |_: &mut ScratchBuffer, s: &str, p: &str, icase: &i8| {
        Ok(search::starts_with(s, p, *icase != 0))
    })
}

/// Suffix test.
pub fn ends_with(d: &Dispatcher<'_>, s: Arg<'_, str>, suffix: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&ENDS_WITH, s, suffix, |_: &mut ScratchBuffer, s: &str, p: &str| Ok(search::ends_with(s, p, false)))
}

/// Suffix test with a case-insensitivity flag.
pub fn ends_with_icase(
    d: &Dispatcher<'_>,
    s: Arg<'_, str>,
    suffix: Arg<'_, str>,
    icase: Arg<'_, i8>,
) -> ExecResult<ColumnId> {
    d.map3(&ENDS_WITH, s, suffix, icase, |_: &mut ScratchBuffer, s: &str, p: &str, icase: &i8| {
        Ok(search::ends_with(s, p, *icase != 0))
    })
}

/// Substring test.
pub fn contains(d: &Dispatcher<'_>, s: Arg<'_, str>, needle: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&CONTAINS, s, needle, |_: &mut ScratchBuffer, s: &str, n: &str| Ok(search::contains(s, n, false)))
}

/// Substring test with a case-insensitivity flag.
pub fn contains_icase(
    d: &Dispatcher<'_>,
    s: Arg<'_, str>,
    needle: Arg<'_, str>,
    icase: Arg<'_, i8>,
) -> ExecResult<ColumnId> {
    d.map3(&CONTAINS, s, needle, icase, |_: &mut ScratchBuffer, s: &str, n: &str, icase: &i8| {
        Ok(search::contains(s, n, *icase != 0))
    })
}

/// Position of the first occurrence.
pub fn search(d: &Dispatcher<'_>, s: Arg<'_, str>, needle: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&SEARCH, s, needle, |_: &mut ScratchBuffer, s: &str, n: &str| Ok(search::search(s, n, false)))
}

/// Position of the first occurrence with a case-insensitivity flag.
pub fn search_icase(d: &Dispatcher<'_>, s: Arg<'_, str>, needle: Arg<'_, str>, icase: Arg<'_, i8>) -> ExecResult<ColumnId> {
    d.map3(&SEARCH, s, needle, icase, |_: &mut ScratchBuffer, s: &str, n: &str, icase: &i8| {
        Ok(search::search(s, n, *icase != 0))
    })
}

/// Position of the last occurrence.
pub fn r_search(d: &Dispatcher<'_>, s: Arg<'_, str>, needle: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&R_SEARCH, s, needle, |_: &mut ScratchBuffer, s: &str, n: &str| Ok(search::rsearch(s, n, false)))
}

/// Position of the last occurrence with a case-insensitivity flag.
pub fn r_search_icase(
    d: &Dispatcher<'_>,
    s: Arg<'_, str>,
    needle: Arg<'_, str>,
    icase: Arg<'_, i8>,
) -> ExecResult<ColumnId> {
    d.map3(&R_SEARCH, s, needle, icase, |_: &mut ScratchBuffer, s: &str, n: &str, icase: &i8| {
        Ok(search::rsearch(s, n, *icase != 0))
    })
}

/// 1-based position of `needle` in `haystack`, 0 when absent.
pub fn locate(d: &Dispatcher<'_>, needle: Arg<'_, str>, haystack: Arg<'_, str>) -> ExecResult<ColumnId> {
    d.map2(&LOCATE, needle, haystack, |_: &mut ScratchBuffer, n: &str, h: &str| Ok(search::locate(n, h, 1)))
}

/// 1-based position of `needle` in `haystack` at or after `start`.
pub fn locate_from(
    d: &Dispatcher<'_>,
    needle: Arg<'_, str>,
    haystack: Arg<'_, str>,
    start: Arg<'_, i32>,
) -> ExecResult<ColumnId> {
    d.map3(&LOCATE, needle, haystack, start, |_: &mut ScratchBuffer, n: &str, h: &str, start: &i32| {
        Ok(search::locate(n, h, *start))
    })
}

/// Which predicate a string select applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Value starts with the key.
    Prefix,
    /// Value ends with the key.
    Suffix,
    /// Value contains the key.
    Substring,
}

impl Match {
    fn test(self, s: &str, key: &str, icase: bool) -> bool {
        match self {
            Match::Prefix => search::starts_with(s, key, icase),
            Match::Suffix => search::ends_with(s, key, icase),
            Match::Substring => search::contains(s, key, icase),
        }
    }
}

/// Candidate list of rows of `b` matching `key`, or not matching it when
/// `anti` is set. Nil rows never qualify; nil control arguments are rejected.
pub fn string_select(
    d: &Dispatcher<'_>,
    how: Match,
    b: BatArg,
    key: Option<&str>,
    icase: Option<bool>,
    anti: Option<bool>,
) -> ExecResult<ColumnId> {
    let spec = match how {
        Match::Prefix => &STARTS_WITH_SELECT,
        Match::Suffix => &ENDS_WITH_SELECT,
        Match::Substring => &CONTAINS_SELECT,
    };
    let (Some(key), Some(icase), Some(anti)) = (key, icase, anti) else {
        return Err(ExecError::illegal(spec.name, "NULL argument not allowed for select predicates"));
    };
    d.select::<str, _>(spec, b, |s| how.test(s, key, icase) != anti)
}

/// Row pairs of `l` and `r` where the left value starts with, ends with or
/// contains the right value (or fails to, when `anti` is set). With `pairs`
/// unset only the left row ids are returned. Nil rows on either side never
/// pair up; a nil `icase` or `anti` is rejected.
pub fn string_join(
    d: &Dispatcher<'_>,
    how: Match,
    l: BatArg,
    r: BatArg,
    icase: Option<bool>,
    anti: Option<bool>,
    pairs: bool,
) -> ExecResult<Joined> {
    let spec = match (how, pairs) {
        (Match::Prefix, true) => &STARTS_WITH_JOIN,
        (Match::Suffix, true) => &ENDS_WITH_JOIN,
        (Match::Substring, true) => &CONTAINS_JOIN,
        (Match::Prefix, false) => &STARTS_WITH_JOIN1,
        (Match::Suffix, false) => &ENDS_WITH_JOIN1,
        (Match::Substring, false) => &CONTAINS_JOIN1,
    };
    let (Some(icase), Some(anti)) = (icase, anti) else {
        return Err(ExecError::illegal(spec.name, "NULL argument not allowed for join predicates"));
    };
    d.join::<str, _>(spec, l, r, pairs, |s, key| how.test(s, key, icase) != anti)
}
