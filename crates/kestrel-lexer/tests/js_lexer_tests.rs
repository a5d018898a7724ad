//! Integration tests exercising the public lexer surface.

use kestrel_common::Log;
use kestrel_lexer::{Lexer, TokenKind};

fn all_tokens(src: &str) -> (Vec<TokenKind>, Log) {
    let log = Log::new();
    let mut kinds = Vec::new();
    {
        let mut lexer = Lexer::new(src, 0, &log);
        while lexer.token != TokenKind::EndOfFile {
            kinds.push(lexer.token);
            lexer.next();
        }
    }
    (kinds, log)
}

#[test]
fn test_realistic_module() {
    let src = r#"
import { a as b } from "./dep";
export const answer = a * 2 ** 5;
async function main() {
  const re = /x+/g;
  return `value: ${answer}`;
}
"#;
    let (kinds, log) = all_tokens(src);
    assert!(!log.has_errors());
    assert!(kinds.contains(&TokenKind::Import));
    assert!(kinds.contains(&TokenKind::Export));
    assert!(kinds.contains(&TokenKind::RegExpLiteral));
    assert!(kinds.contains(&TokenKind::TemplateHead));
}

#[test]
fn test_shift_operators_longest_match() {
    let (kinds, _) = all_tokens("a >>> b >>>= c >> d >= e");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Identifier,
            TokenKind::GreaterThanGreaterThanGreaterThan,
            TokenKind::Identifier,
            TokenKind::GreaterThanGreaterThanGreaterThanEquals,
            TokenKind::Identifier,
            TokenKind::GreaterThanGreaterThan,
            TokenKind::Identifier,
            TokenKind::GreaterThanEquals,
            TokenKind::Identifier,
        ]
    );
}

#[test]
fn test_unterminated_string_does_not_abort() {
    let (kinds, log) = all_tokens("let s = 'oops\nlet t = 1");
    assert!(log.has_errors());
    // Lexing continued on the next line
    assert_eq!(kinds.iter().filter(|k| **k == TokenKind::Identifier).count(), 2);
    assert!(kinds.contains(&TokenKind::NumericLiteral));
}

#[test]
fn test_spread_and_optional_chain() {
    let (kinds, _) = all_tokens("f(...xs); a?.b?.(c)");
    assert!(kinds.contains(&TokenKind::DotDotDot));
    assert_eq!(
        kinds.iter().filter(|k| **k == TokenKind::QuestionDot).count(),
        2
    );
}
