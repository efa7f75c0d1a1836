//! Fixed-width kernels: lengths, code points, predicates and positions.

use batcol_exec::{KernelError, KernelResult};
use batcol_storage::INT_NIL;

use crate::text::{byte_offset, char_len, char_pos, ends_with_icase, find_icase, rfind_icase, starts_with_icase};

fn to_int(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Number of code points.
pub fn length(s: &str) -> i32 {
    to_int(char_len(s))
}

/// Number of UTF-8 bytes.
pub fn bytes(s: &str) -> i32 {
    to_int(s.len())
}

/// Code point at 0-based position `at`; nil when out of range.
pub fn unicode_at(s: &str, at: i32) -> KernelResult<i32> {
    let Ok(at) = usize::try_from(at) else {
        return Ok(INT_NIL);
    };
    match s.chars().nth(at) {
        Some(c) => i32::try_from(u32::from(c)).map_err(|_| KernelError::IllegalCodePoint),
        None => Ok(INT_NIL),
    }
}

/// First code point, nil for empty or nil input.
pub fn ascii(s: Option<&str>) -> KernelResult<i32> {
    match s {
        Some(s) => unicode_at(s, 0),
        None => Ok(INT_NIL),
    }
}

/// Prefix test.
pub fn starts_with(s: &str, prefix: &str, icase: bool) -> bool {
    if icase {
        starts_with_icase(s, prefix)
    } else {
        s.starts_with(prefix)
    }
}

/// Suffix test.
pub fn ends_with(s: &str, suffix: &str, icase: bool) -> bool {
    if icase {
        ends_with_icase(s, suffix)
    } else {
        s.ends_with(suffix)
    }
}

/// Substring test.
pub fn contains(s: &str, needle: &str, icase: bool) -> bool {
    if icase {
        find_icase(s, needle).is_some()
    } else {
        s.contains(needle)
    }
}

/// 0-based code point position of the first occurrence of `needle`, -1 when
/// absent.
pub fn search(haystack: &str, needle: &str, icase: bool) -> i32 {
    let pos = if icase {
        find_icase(haystack, needle)
    } else {
        haystack.find(needle).map(|b| char_pos(haystack, b))
    };
    pos.map_or(-1, to_int)
}

/// 0-based code point position of the last occurrence of `needle`, -1 when
/// absent.
pub fn rsearch(haystack: &str, needle: &str, icase: bool) -> i32 {
    let pos = if icase {
        rfind_icase(haystack, needle)
    } else {
        haystack.rfind(needle).map(|b| char_pos(haystack, b))
    };
    pos.map_or(-1, to_int)
}

/// 1-based position of `needle` in `haystack` at or after the 1-based
/// `start`, 0 when absent.
pub fn locate(needle: &str, haystack: &str, start: i32) -> i32 {
    let start = start.max(1);
    let from = byte_offset(haystack, (start - 1) as usize);
    match haystack[from..].find(needle) {
        Some(b) => to_int(char_pos(&haystack[from..], b)).saturating_add(start),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths() {
        assert_eq!(length("héllo"), 5);
        assert_eq!(bytes("héllo"), 6);
        assert_eq!(length(""), 0);
    }

    #[test]
    fn code_point_access() {
        assert_eq!(unicode_at("a€", 1), Ok(0x20AC));
        assert_eq!(unicode_at("a€", 2), Ok(INT_NIL));
        assert_eq!(unicode_at("a€", -1), Ok(INT_NIL));
        assert_eq!(ascii(Some("A")), Ok(65));
        assert_eq!(ascii(Some("\u{80}")), Ok(0x80));
        assert_eq!(ascii(Some("")), Ok(INT_NIL));
        assert_eq!(ascii(None), Ok(INT_NIL));
    }

    #[test]
    fn predicates() {
        assert!(starts_with("Hello", "He", false));
        assert!(!starts_with("Hello", "he", false));
        assert!(starts_with("Hello", "he", true));
        assert!(ends_with("Hello", "LO", true));
        assert!(!ends_with("Hello", "LO", false));
        assert!(contains("Hello", "ELL", true));
        assert!(contains("Hello", "", false));
    }

    #[test]
    fn positions() {
        assert_eq!(search("héllo", "l", false), 2);
        assert_eq!(rsearch("héllo", "l", false), 3);
        assert_eq!(search("héllo", "L", true), 2);
        assert_eq!(rsearch("héllo", "L", true), 3);
        assert_eq!(search("abc", "z", false), -1);
        assert_eq!(locate("l", "héllo", 1), 3);
        assert_eq!(locate("l", "héllo", 4), 4);
        assert_eq!(locate("l", "héllo", 5), 0);
        assert_eq!(locate("h", "héllo", -4), 1);
        assert_eq!(locate("x", "héllo", 1), 0);
    }
}
