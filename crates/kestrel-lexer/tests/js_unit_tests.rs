use super::*;
use kestrel_common::Log;

fn lex_kinds(src: &str) -> Vec<TokenKind> {
    let log = Log::new();
    let mut lexer = Lexer::new(src, 0, &log);
    let mut out = Vec::new();
    while lexer.token != TokenKind::EndOfFile {
        out.push(lexer.token);
        lexer.next();
    }
    out
}

#[test]
fn test_punctuation() {
    assert_eq!(
        lex_kinds("a ??= b?.c ?? d ** e"),
        vec![
            TokenKind::Identifier,
            TokenKind::QuestionQuestionEquals,
            TokenKind::Identifier,
            TokenKind::QuestionDot,
            TokenKind::Identifier,
            TokenKind::QuestionQuestion,
            TokenKind::Identifier,
            TokenKind::AsteriskAsterisk,
            TokenKind::Identifier,
        ]
    );
}

#[test]
fn test_keywords_vs_identifiers() {
    assert_eq!(
        lex_kinds("class let async await"),
        vec![
            TokenKind::Class,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Await,
        ]
    );
}

#[test]
fn test_question_dot_number_is_conditional() {
    // `a?.5:b` must lex `?` then `.5`, not `?.`
    assert_eq!(
        lex_kinds("a?.5:b"),
        vec![
            TokenKind::Identifier,
            TokenKind::Question,
            TokenKind::NumericLiteral,
            TokenKind::Colon,
            TokenKind::Identifier,
        ]
    );
}

#[test]
fn test_regex_vs_divide() {
    // After an identifier `/` is division
    assert_eq!(
        lex_kinds("a / b"),
        vec![TokenKind::Identifier, TokenKind::Slash, TokenKind::Identifier]
    );
    // After `=` it is a regex
    assert_eq!(
        lex_kinds("x = /ab[/]c/g"),
        vec![
            TokenKind::Identifier,
            TokenKind::Equals,
            TokenKind::RegExpLiteral,
        ]
    );
    // After `return` it is a regex
    assert_eq!(
        lex_kinds("return /x/"),
        vec![TokenKind::Return, TokenKind::RegExpLiteral]
    );
    // After `)` it is division
    assert_eq!(
        lex_kinds("(a) / b"),
        vec![
            TokenKind::OpenParen,
            TokenKind::Identifier,
            TokenKind::CloseParen,
            TokenKind::Slash,
            TokenKind::Identifier,
        ]
    );
}

#[test]
fn test_string_zero_copy_and_decoded() {
    let log = Log::new();
    let lexer = Lexer::new("'plain'", 0, &log);
    assert_eq!(lexer.token, TokenKind::StringLiteral);
    assert_eq!(lexer.text(), "plain");

    let lexer = Lexer::new("'a\\nb'", 0, &log);
    assert_eq!(lexer.text(), "a\nb");

    let lexer = Lexer::new("'\\u0041\\u{1F600}'", 0, &log);
    assert_eq!(lexer.text(), "A\u{1F600}");
}

#[test]
fn test_invalid_escape_is_replacement_char() {
    let log = Log::new();
    let lexer = Lexer::new("'\\u{110000}'", 0, &log);
    assert_eq!(lexer.text(), "\u{FFFD}");
    assert!(log.has_errors());
}

#[test]
fn test_template_segments() {
    let log = Log::new();
    let mut lexer = Lexer::new("`a${x}b${y}c`", 0, &log);
    assert_eq!(lexer.token, TokenKind::TemplateHead);
    assert_eq!(lexer.text(), "a");
    lexer.next(); // x
    assert_eq!(lexer.token, TokenKind::Identifier);
    lexer.next(); // }
    assert_eq!(lexer.token, TokenKind::CloseBrace);
    lexer.rescan_template_token();
    assert_eq!(lexer.token, TokenKind::TemplateMiddle);
    assert_eq!(lexer.text(), "b");
    lexer.next(); // y
    lexer.next(); // }
    lexer.rescan_template_token();
    assert_eq!(lexer.token, TokenKind::TemplateTail);
    assert_eq!(lexer.text(), "c");
}

#[test]
fn test_no_substitution_template() {
    let log = Log::new();
    let lexer = Lexer::new("`hello`", 0, &log);
    assert_eq!(lexer.token, TokenKind::NoSubstitutionTemplateLiteral);
    assert_eq!(lexer.text(), "hello");
}

#[test]
fn test_numbers() {
    let log = Log::new();
    let lexer = Lexer::new("0x10", 0, &log);
    assert_eq!(lexer.number, 16.0);
    let lexer = Lexer::new("0b101", 0, &log);
    assert_eq!(lexer.number, 5.0);
    let lexer = Lexer::new("0o17", 0, &log);
    assert_eq!(lexer.number, 15.0);
    let lexer = Lexer::new("1_000_000", 0, &log);
    assert_eq!(lexer.number, 1_000_000.0);
    let lexer = Lexer::new(".5", 0, &log);
    assert_eq!(lexer.number, 0.5);
    let lexer = Lexer::new("1e3", 0, &log);
    assert_eq!(lexer.number, 1000.0);
}

#[test]
fn test_legacy_octal_flag() {
    let log = Log::new();
    let lexer = Lexer::new("0123", 0, &log);
    assert_eq!(lexer.token, TokenKind::NumericLiteral);
    assert!(lexer.legacy_octal);
    assert_eq!(lexer.number, 83.0);
    // 089 falls back to decimal but stays flagged
    let lexer = Lexer::new("089", 0, &log);
    assert!(lexer.legacy_octal);
    assert_eq!(lexer.number, 89.0);
}

#[test]
fn test_bigint() {
    let log = Log::new();
    let lexer = Lexer::new("123n", 0, &log);
    assert_eq!(lexer.token, TokenKind::BigIntLiteral);
    assert_eq!(lexer.raw(), "123n");
}

#[test]
fn test_private_identifier() {
    let log = Log::new();
    let lexer = Lexer::new("#field", 0, &log);
    assert_eq!(lexer.token, TokenKind::PrivateIdentifier);
    assert_eq!(lexer.raw(), "#field");
}

#[test]
fn test_identifier_unicode_escape() {
    let log = Log::new();
    let lexer = Lexer::new("\\u0061bc", 0, &log);
    assert_eq!(lexer.token, TokenKind::Identifier);
    assert_eq!(lexer.text(), "abc");
    // An escaped keyword is an identifier, not a keyword
    let lexer = Lexer::new("cl\\u0061ss", 0, &log);
    assert_eq!(lexer.token, TokenKind::Identifier);
    assert_eq!(lexer.text(), "class");
}

#[test]
fn test_newline_tracking() {
    let log = Log::new();
    let mut lexer = Lexer::new("a\nb // c\nd /* e\nf */ g", 0, &log);
    while lexer.token != TokenKind::EndOfFile {
        lexer.next();
    }
    let offsets = lexer.take_newline_offsets();
    assert_eq!(offsets, vec![1, 8, 15]);
}

#[test]
fn test_has_newline_before() {
    let log = Log::new();
    let mut lexer = Lexer::new("a\nb c", 0, &log);
    lexer.next();
    assert!(lexer.has_newline_before); // b
    lexer.next();
    assert!(!lexer.has_newline_before); // c
}

#[test]
fn test_hashbang() {
    let log = Log::new();
    let lexer = Lexer::new("#!/usr/bin/env node\nlet", 0, &log);
    assert_eq!(lexer.token, TokenKind::Identifier);
    assert_eq!(lexer.raw(), "let");
}

#[test]
fn test_lexical_error_recovery() {
    // U+00A7 is not a valid identifier char; the lexer reports, substitutes
    // and keeps going
    let log = Log::new();
    let mut lexer = Lexer::new("a § b", 0, &log);
    let mut kinds = Vec::new();
    while lexer.token != TokenKind::EndOfFile {
        kinds.push(lexer.token);
        lexer.next();
    }
    assert_eq!(kinds, vec![TokenKind::Identifier, TokenKind::Identifier]);
    assert!(log.has_errors());
}

#[test]
fn test_token_round_trip() {
    // Each token's recorded range must cover exactly its original bytes:
    // re-lexing the whitespace-joined slices reproduces the token stream.
    let src = "const x = { a: 1.5, b: 'str', c: y };";
    let log = Log::new();
    let mut lexer = Lexer::new(src, 0, &log);
    let mut slices = Vec::new();
    let mut kinds = Vec::new();
    while lexer.token != TokenKind::EndOfFile {
        slices.push(&src[lexer.start as usize..lexer.end as usize]);
        kinds.push(lexer.token);
        lexer.next();
    }
    assert!(!log.has_errors());
    let rejoined = slices.join(" ");
    assert_eq!(lex_kinds(&rejoined), kinds);
}
