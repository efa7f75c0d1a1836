//! Code point helpers shared by the kernels.

/// Number of code points.
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of code point `n`, or `s.len()` past the end.
#[inline]
pub fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// Code point position of byte offset `b`.
#[inline]
pub fn char_pos(s: &str, b: usize) -> usize {
    char_len(&s[..b])
}

/// Whitespace removed by the trim family.
pub fn is_space(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t'
            | '\n'
            | '\r'
            | '\x0B'
            | '\x0C'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

fn fold_rev(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().rev().flat_map(|c| c.to_lowercase().rev())
}

/// Case-insensitive prefix test.
pub fn starts_with_icase(s: &str, prefix: &str) -> bool {
    let mut it = fold(s);
    fold(prefix).all(|c| it.next() == Some(c))
}

/// Case-insensitive suffix test.
pub fn ends_with_icase(s: &str, suffix: &str) -> bool {
    let mut it = fold_rev(s);
    fold_rev(suffix).all(|c| it.next() == Some(c))
}

/// Code point position of the first case-insensitive match.
pub fn find_icase(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .char_indices()
        .enumerate()
        .find(|(_, (b, _))| starts_with_icase(&haystack[*b..], needle))
        .map(|(pos, _)| pos)
}

/// Code point position of the last case-insensitive match.
pub fn rfind_icase(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(char_len(haystack));
    }
    haystack
        .char_indices()
        .enumerate()
        .filter(|(_, (b, _))| starts_with_icase(&haystack[*b..], needle))
        .map(|(pos, _)| pos)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(char_len("héllo"), 5);
        assert_eq!(byte_offset("héllo", 2), 3);
        assert_eq!(byte_offset("héllo", 9), 6);
        assert_eq!(char_pos("héllo", 3), 2);
    }

    #[test]
    fn icase_matching() {
        assert!(starts_with_icase("HeLLo", "hel"));
        assert!(!starts_with_icase("He", "hel"));
        assert!(ends_with_icase("straSSE", "sse"));
        assert_eq!(find_icase("abcABC", "CA"), Some(2));
        assert_eq!(rfind_icase("abcABC", "b"), Some(4));
        assert_eq!(find_icase("ÄÖÜ", "öü"), Some(1));
        assert_eq!(find_icase("abc", "x"), None);
        assert!(is_space('\u{3000}') && !is_space('x'));
    }
}
