use super::*;

#[test]
fn test_line_map_unix_newlines() {
    let src = "a\nbb\nccc";
    let map = LineMap::build(src);
    assert_eq!(map.line_count(), 3);
    assert_eq!(map.position(0, src), (0, 0));
    assert_eq!(map.position(2, src), (1, 0));
    assert_eq!(map.position(3, src), (1, 1));
    assert_eq!(map.position(7, src), (2, 2));
}

#[test]
fn test_line_map_crlf() {
    let src = "a\r\nb\rc";
    let map = LineMap::build(src);
    // \r\n is one line break, lone \r is another
    assert_eq!(map.line_count(), 3);
    assert_eq!(map.position(3, src), (1, 0));
    assert_eq!(map.position(5, src), (2, 0));
}

#[test]
fn test_utf16_columns() {
    // U+1F600 GRINNING FACE takes 4 UTF-8 bytes but 2 UTF-16 code units
    let src = "\u{1F600}x";
    let map = LineMap::build(src);
    assert_eq!(map.position(4, src), (0, 2));
    assert_eq!(map.position(5, src), (0, 3));
}

#[test]
fn test_utf16_len() {
    assert_eq!(utf16_len(""), 0);
    assert_eq!(utf16_len("abc"), 3);
    assert_eq!(utf16_len("é"), 1);
    assert_eq!(utf16_len("\u{1F600}"), 2);
}

#[test]
fn test_source_index_sentinel() {
    assert!(!SourceIndex::INVALID.is_valid());
    assert!(SourceIndex(0).is_valid());
    assert_eq!(SourceIndex::RUNTIME.index(), 0);
}
