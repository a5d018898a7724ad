use super::*;

#[test]
fn test_simple_mapping_stream() {
    let mut b = SourceMapBuilder::new();
    let src = b.add_source("input.js", Some("let x = 1;\n".to_string()));
    b.add_mapping(src, 0, 0, None);
    b.advance_bytes("var x");
    b.add_mapping(src, 0, 8, None);
    b.advance_bytes(" = 1;\n");
    b.add_mapping(src, 1, 0, None);

    let map = b.into_pieces("out.js").finalize(&[]);
    assert_eq!(map.version, 3);
    assert_eq!(map.sources, vec!["input.js"]);
    // Line 2 starts after exactly one ';'
    assert_eq!(map.mappings.matches(';').count(), 1);
    assert_eq!(map.mappings, "AAAA,KAAQ;AACR");
}

#[test]
fn test_advance_bytes_utf16() {
    let mut b = SourceMapBuilder::new();
    let src = b.add_source("a.js", None);
    // Astral plane codepoint advances by 2 UTF-16 units
    b.advance_bytes("\u{1F600}");
    assert_eq!(b.generated_pos(), GeneratedPos { line: 0, column: 2 });
    b.advance_bytes("x\ny");
    assert_eq!(b.generated_pos(), GeneratedPos { line: 1, column: 1 });
    b.add_mapping(src, 0, 0, None);
    let map = b.into_pieces("out.js").finalize(&[]);
    assert!(map.mappings.starts_with(';'));
}

#[test]
fn test_names_and_sources_content() {
    let mut b = SourceMapBuilder::new();
    let src = b.add_source("m.js", Some("foo".to_string()));
    let name = b.add_name("foo");
    b.add_mapping(src, 0, 0, Some(name));
    let map = b.into_pieces("out.js").finalize(&[]);
    assert_eq!(map.names, vec!["foo"]);
    assert_eq!(map.sources_content, vec![Some("foo".to_string())]);
    let json = map.to_json();
    assert!(json.contains("\"sourcesContent\""));
    assert!(json.contains("\"mappings\""));
}

#[test]
fn test_shift_adjusts_following_mapping() {
    let mut b = SourceMapBuilder::new();
    let src = b.add_source("a.js", None);
    b.advance_bytes("import \"");
    // A unique key of length 8 gets substituted with a path of length 12
    b.add_mapping(src, 0, 8, None);
    b.advance_bytes("KKEY0000");
    b.advance_bytes("\";");
    b.add_mapping(src, 0, 20, None);

    let unshifted = b.into_pieces("out.js");
    let shift = SourceMapShift {
        before: GeneratedPos { line: 0, column: 16 },
        after: GeneratedPos { line: 0, column: 20 },
    };
    let map = unshifted.finalize(&[shift]);

    // Decode: the first segment is untouched, the second absorbed +4
    let fields: Vec<i32> = decode_all_columns(&map.mappings);
    assert_eq!(fields, vec![8, 10 + 4]);
}

fn decode_all_columns(mappings: &str) -> Vec<i32> {
    // Collect the generated-column delta (field 0) of each segment
    let mut out = Vec::new();
    for line in mappings.split(';') {
        for seg in line.split(',') {
            if seg.is_empty() {
                continue;
            }
            let (v, _) = crate::vlq::decode(seg.as_bytes()).unwrap();
            out.push(v);
        }
    }
    out
}

#[test]
fn test_data_url() {
    let mut b = SourceMapBuilder::new();
    let src = b.add_source("x.js", None);
    b.add_mapping(src, 0, 0, None);
    let map = b.into_pieces("out.js").finalize(&[]);
    assert!(map.to_data_url().starts_with("data:application/json;base64,"));
}

#[test]
fn test_base64_padding() {
    assert_eq!(base64_encode(b""), "");
    assert_eq!(base64_encode(b"f"), "Zg==");
    assert_eq!(base64_encode(b"fo"), "Zm8=");
    assert_eq!(base64_encode(b"foo"), "Zm9v");
}
