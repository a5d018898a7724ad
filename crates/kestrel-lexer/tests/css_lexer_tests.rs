//! Integration tests for the CSS tokenizer.

use kestrel_common::Log;
use kestrel_lexer::css::{tokenize, CssTokenKind};

#[test]
fn test_stylesheet_with_imports_and_urls() {
    let src = "@import \"base.css\";\n.hero { background: url(img/bg.png); }";
    let log = Log::new();
    let tokens = tokenize(src, 0, &log);
    assert!(!log.has_errors());
    assert_eq!(tokens[0].kind, CssTokenKind::AtKeyword);
    assert_eq!(tokens[0].text(src), "import");
    let url = tokens.iter().find(|t| t.kind == CssTokenKind::Url).unwrap();
    assert_eq!(url.text(src), "img/bg.png");
}

#[test]
fn test_token_ranges_cover_source() {
    // The flat token list must tile the input: every byte belongs to
    // exactly one token (comments excepted).
    let src = ".a{color:#fff;width:10px}";
    let log = Log::new();
    let tokens = tokenize(src, 0, &log);
    let mut pos = 0u32;
    for token in &tokens {
        if token.kind == CssTokenKind::EndOfFile {
            break;
        }
        assert_eq!(token.span.start, pos, "gap before {:?}", token.kind);
        pos = token.span.end;
    }
    assert_eq!(pos as usize, src.len());
}

#[test]
fn test_composes_declaration() {
    let src = ".btn { composes: base from \"./base.css\"; }";
    let log = Log::new();
    let tokens = tokenize(src, 0, &log);
    let idents: Vec<String> = tokens
        .iter()
        .filter(|t| t.kind == CssTokenKind::Ident)
        .map(|t| t.text(src))
        .collect();
    assert!(idents.contains(&"composes".to_string()));
    assert!(idents.contains(&"from".to_string()));
}

#[test]
fn test_escaped_class_name() {
    let src = ".a\\:b {}";
    let log = Log::new();
    let tokens = tokenize(src, 0, &log);
    let ident = tokens
        .iter()
        .find(|t| t.kind == CssTokenKind::Ident)
        .unwrap();
    assert_eq!(ident.text(src), "a:b");
}
