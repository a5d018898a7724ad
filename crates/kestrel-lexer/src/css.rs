//! The CSS tokenizer (CSS Syntax Level 3).
//!
//! Unlike the JS lexer this one tokenizes the whole file up front: the CSS
//! AST is a flat rule list that refers back to token ranges, so having the
//! full token vector around makes re-printing cheap.
//!
//! Recovery model: malformed strings and urls become `BadString`/`BadUrl`
//! tokens rather than errors, so the parser can skip the enclosing
//! declaration and continue.

use kestrel_common::{Log, Span};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CssTokenKind {
    EndOfFile,
    Whitespace,
    Ident,
    /// `name(` including the open paren
    Function,
    /// `@name`
    AtKeyword,
    /// `#name`; `is_id` distinguishes hash-id from hash-unrestricted
    Hash,
    String,
    BadString,
    /// `url(unquoted)` lexed by the URL sublexer
    Url,
    BadUrl,
    Number,
    Percentage,
    Dimension,
    Colon,
    Semicolon,
    Comma,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    /// `<!--`
    Cdo,
    /// `-->`
    Cdc,
    /// Any other single character
    Delim,
}

/// One CSS token. The text lives in the source; `span` covers the whole
/// token including delimiters.
#[derive(Clone, Debug)]
pub struct CssToken {
    pub kind: CssTokenKind,
    pub span: Span,
    /// For `Hash`: the hash is a valid ID selector.
    pub is_id: bool,
    /// For `Delim`: the character.
    pub delim: char,
}

impl CssToken {
    #[must_use]
    pub fn raw<'a>(&self, source: &'a str) -> &'a str {
        self.span.slice(source)
    }

    /// Decoded text: identifier without escapes, string without quotes,
    /// url without `url(`/`)`, at-keyword without `@`, hash without `#`.
    #[must_use]
    pub fn text(&self, source: &str) -> String {
        let raw = self.raw(source);
        match self.kind {
            CssTokenKind::Ident => decode_escapes(raw),
            CssTokenKind::Function => decode_escapes(raw.strip_suffix('(').unwrap_or(raw)),
            CssTokenKind::AtKeyword => decode_escapes(raw.strip_prefix('@').unwrap_or(raw)),
            CssTokenKind::Hash => decode_escapes(raw.strip_prefix('#').unwrap_or(raw)),
            CssTokenKind::String => {
                let quote = raw.as_bytes().first().copied().unwrap_or(b'"') as char;
                let body = raw.strip_prefix(quote).unwrap_or(raw);
                decode_escapes(body.strip_suffix(quote).unwrap_or(body))
            }
            CssTokenKind::Url => {
                let inner = raw
                    .strip_prefix("url(")
                    .or_else(|| raw.strip_prefix("URL("))
                    .unwrap_or(raw);
                decode_escapes(inner.strip_suffix(')').unwrap_or(inner).trim())
            }
            _ => raw.to_string(),
        }
    }
}

/// Tokenize an entire stylesheet.
#[must_use]
pub fn tokenize(source: &str, source_index: u32, log: &Log) -> Vec<CssToken> {
    let mut lexer = CssLexer {
        source,
        source_index,
        log,
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.run();
    lexer.tokens
}

struct CssLexer<'a> {
    source: &'a str,
    source_index: u32,
    log: &'a Log,
    pos: usize,
    tokens: Vec<CssToken>,
}

impl<'a> CssLexer<'a> {
    fn run(&mut self) {
        while self.pos < self.source.len() {
            let start = self.pos;
            let ch = self.peek().unwrap();
            let token = match ch {
                c if is_whitespace(c) => {
                    while self.peek().is_some_and(is_whitespace) {
                        self.bump();
                    }
                    self.make(CssTokenKind::Whitespace, start)
                }
                '/' if self.rest().starts_with("/*") => {
                    self.skip_comment(start);
                    continue;
                }
                '"' | '\'' => self.scan_string(start, ch),
                '#' => {
                    self.bump();
                    if self.peek().is_some_and(is_name_char) || self.starts_escape() {
                        let name_start = self.pos;
                        self.scan_name();
                        let is_id = starts_ident(&self.source[name_start..]);
                        let mut t = self.make(CssTokenKind::Hash, start);
                        t.is_id = is_id;
                        t
                    } else {
                        self.delim(start, '#')
                    }
                }
                '(' => self.single(CssTokenKind::OpenParen, start),
                ')' => self.single(CssTokenKind::CloseParen, start),
                '[' => self.single(CssTokenKind::OpenBracket, start),
                ']' => self.single(CssTokenKind::CloseBracket, start),
                '{' => self.single(CssTokenKind::OpenBrace, start),
                '}' => self.single(CssTokenKind::CloseBrace, start),
                ':' => self.single(CssTokenKind::Colon, start),
                ';' => self.single(CssTokenKind::Semicolon, start),
                ',' => self.single(CssTokenKind::Comma, start),
                '<' if self.rest().starts_with("<!--") => {
                    self.pos += 4;
                    self.make(CssTokenKind::Cdo, start)
                }
                '-' if self.rest().starts_with("-->") => {
                    self.pos += 3;
                    self.make(CssTokenKind::Cdc, start)
                }
                '@' => {
                    self.bump();
                    if starts_ident(self.rest()) {
                        self.scan_name();
                        self.make(CssTokenKind::AtKeyword, start)
                    } else {
                        self.delim(start, '@')
                    }
                }
                '+' | '.' if starts_number(self.rest()) => self.scan_numeric(start),
                '-' => {
                    if starts_number(self.rest()) {
                        self.scan_numeric(start)
                    } else if starts_ident(self.rest()) {
                        self.scan_ident_like(start)
                    } else {
                        self.delim_bump(start)
                    }
                }
                '0'..='9' => self.scan_numeric(start),
                '\\' => {
                    if self.starts_escape() {
                        self.scan_ident_like(start)
                    } else {
                        self.log.add_error(
                            self.source_index,
                            Span::new(start as u32, start as u32 + 1),
                            "Invalid escape",
                        );
                        self.delim_bump(start)
                    }
                }
                c if is_name_start(c) => self.scan_ident_like(start),
                _ => self.delim_bump(start),
            };
            self.tokens.push(token);
        }
        self.tokens.push(CssToken {
            kind: CssTokenKind::EndOfFile,
            span: Span::at(self.source.len() as u32),
            is_id: false,
            delim: '\0',
        });
    }

    // ---------------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn make(&self, kind: CssTokenKind, start: usize) -> CssToken {
        CssToken {
            kind,
            span: Span::new(start as u32, self.pos as u32),
            is_id: false,
            delim: '\0',
        }
    }

    fn single(&mut self, kind: CssTokenKind, start: usize) -> CssToken {
        self.bump();
        self.make(kind, start)
    }

    fn delim(&self, start: usize, c: char) -> CssToken {
        let mut t = self.make(CssTokenKind::Delim, start);
        t.delim = c;
        t
    }

    fn delim_bump(&mut self, start: usize) -> CssToken {
        let c = self.bump().unwrap_or('\0');
        self.delim(start, c)
    }

    fn starts_escape(&self) -> bool {
        let b = self.rest().as_bytes();
        b.first() == Some(&b'\\') && b.get(1).is_some_and(|&c| c != b'\n' && c != b'\r')
    }

    fn skip_comment(&mut self, start: usize) {
        self.pos += 2;
        match self.rest().find("*/") {
            Some(n) => self.pos += n + 2,
            None => {
                self.log.add_error(
                    self.source_index,
                    Span::new(start as u32, self.source.len() as u32),
                    "Expected \"*/\" to terminate comment",
                );
                self.pos = self.source.len();
            }
        }
    }

    fn scan_name(&mut self) {
        loop {
            if self.peek().is_some_and(is_name_char) {
                self.bump();
            } else if self.starts_escape() {
                self.pos += 1;
                self.consume_escape();
            } else {
                return;
            }
        }
    }

    /// One escape, positioned after the backslash.
    fn consume_escape(&mut self) {
        let Some(c) = self.bump() else { return };
        if c.is_ascii_hexdigit() {
            let mut digits = 1;
            while digits < 6 && self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
                digits += 1;
            }
            // One optional whitespace terminates a hex escape
            if self.peek().is_some_and(is_whitespace) {
                self.bump();
            }
        }
    }

    fn scan_string(&mut self, start: usize, quote: char) -> CssToken {
        self.bump();
        loop {
            match self.peek() {
                None => {
                    self.log.add_error(
                        self.source_index,
                        Span::new(start as u32, self.pos as u32),
                        "Unterminated string token",
                    );
                    return self.make(CssTokenKind::String, start);
                }
                Some('\n') | Some('\r') => {
                    // Bad string: emit as a recoverable token, newline stays
                    return self.make(CssTokenKind::BadString, start);
                }
                Some(c) if c == quote => {
                    self.bump();
                    return self.make(CssTokenKind::String, start);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('\n') => {
                            self.pos += 1;
                        }
                        Some('\r') => {
                            self.pos += 1;
                            if self.peek() == Some('\n') {
                                self.pos += 1;
                            }
                        }
                        Some(_) => {
                            self.consume_escape();
                        }
                        None => {}
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn scan_numeric(&mut self, start: usize) -> CssToken {
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.source[self.pos + 1..].starts_with(|c: char| c.is_ascii_digit())
        {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        // Scientific notation
        let save = self.pos;
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = save;
            }
        }
        if self.peek() == Some('%') {
            self.bump();
            self.make(CssTokenKind::Percentage, start)
        } else if starts_ident(self.rest()) {
            self.scan_name();
            self.make(CssTokenKind::Dimension, start)
        } else {
            self.make(CssTokenKind::Number, start)
        }
    }

    fn scan_ident_like(&mut self, start: usize) -> CssToken {
        self.scan_name();
        let name = &self.source[start..self.pos];
        if self.peek() == Some('(') {
            self.bump();
            if name.eq_ignore_ascii_case("url") {
                // url( with a quoted argument is an ordinary Function; an
                // unquoted argument switches to the URL sublexer
                let mut look = self.pos;
                while self.source[look..]
                    .chars()
                    .next()
                    .is_some_and(is_whitespace)
                {
                    look += self.source[look..].chars().next().unwrap().len_utf8();
                }
                match self.source[look..].chars().next() {
                    Some('"') | Some('\'') => self.make(CssTokenKind::Function, start),
                    _ => self.scan_url_rest(start),
                }
            } else {
                self.make(CssTokenKind::Function, start)
            }
        } else {
            self.make(CssTokenKind::Ident, start)
        }
    }

    /// The URL sublexer: eats everything until `)` with its own escape
    /// rules. Positioned after `url(`.
    fn scan_url_rest(&mut self, start: usize) -> CssToken {
        while self.peek().is_some_and(is_whitespace) {
            self.bump();
        }
        loop {
            match self.peek() {
                None => {
                    self.log.add_error(
                        self.source_index,
                        Span::new(start as u32, self.pos as u32),
                        "Expected \")\" to end URL token",
                    );
                    return self.make(CssTokenKind::Url, start);
                }
                Some(')') => {
                    self.bump();
                    return self.make(CssTokenKind::Url, start);
                }
                Some(c) if is_whitespace(c) => {
                    // Trailing whitespace must be followed by ')'
                    while self.peek().is_some_and(is_whitespace) {
                        self.bump();
                    }
                    match self.peek() {
                        Some(')') => {
                            self.bump();
                            return self.make(CssTokenKind::Url, start);
                        }
                        None => {
                            return self.make(CssTokenKind::Url, start);
                        }
                        _ => return self.recover_bad_url(start),
                    }
                }
                Some('"') | Some('\'') | Some('(') => {
                    return self.recover_bad_url(start);
                }
                Some('\\') => {
                    if self.starts_escape() {
                        self.pos += 1;
                        self.consume_escape();
                    } else {
                        return self.recover_bad_url(start);
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn recover_bad_url(&mut self, start: usize) -> CssToken {
        // Eat until the closing paren, honoring escapes
        loop {
            match self.peek() {
                None => break,
                Some(')') => {
                    self.bump();
                    break;
                }
                Some('\\') if self.starts_escape() => {
                    self.pos += 1;
                    self.consume_escape();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        self.make(CssTokenKind::BadUrl, start)
    }
}

// =============================================================================
// Character classes & helpers
// =============================================================================

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\u{C}')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

/// Would the input start an identifier per css-syntax-3 "check if three
/// code points would start an ident sequence"?
fn starts_ident(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some('-') => match chars.next() {
            Some('-') => true,
            Some(c) if is_name_start(c) => true,
            Some('\\') => true,
            _ => false,
        },
        Some('\\') => !matches!(chars.next(), Some('\n') | Some('\r') | None),
        Some(c) => is_name_start(c),
        None => false,
    }
}

fn starts_number(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some('+') | Some('-') => match chars.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        },
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        Some(c) => c.is_ascii_digit(),
        None => false,
    }
}

/// Decode CSS escapes in a name or string body. Invalid escapes map to
/// U+FFFD.
#[must_use]
pub fn decode_escapes(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            None => out.push('\u{FFFD}'),
            Some(&next) if next.is_ascii_hexdigit() => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 6 {
                    match chars.peek() {
                        Some(&h) if h.is_ascii_hexdigit() => {
                            value = value * 16 + h.to_digit(16).unwrap_or(0);
                            chars.next();
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if chars.peek().copied().is_some_and(is_whitespace) {
                    chars.next();
                }
                out.push(char::from_u32(value).unwrap_or('\u{FFFD}'));
            }
            Some('\n') | Some('\r') => {
                // Escaped newline inside a string disappears
                chars.next();
            }
            Some(_) => {
                out.push(chars.next().unwrap_or('\u{FFFD}'));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::Log;

    fn kinds(src: &str) -> Vec<CssTokenKind> {
        let log = Log::new();
        tokenize(src, 0, &log)
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| *k != CssTokenKind::Whitespace && *k != CssTokenKind::EndOfFile)
            .collect()
    }

    #[test]
    fn test_basic_rule() {
        assert_eq!(
            kinds(".a { color: red; }"),
            vec![
                CssTokenKind::Delim,
                CssTokenKind::Ident,
                CssTokenKind::OpenBrace,
                CssTokenKind::Ident,
                CssTokenKind::Colon,
                CssTokenKind::Ident,
                CssTokenKind::Semicolon,
                CssTokenKind::CloseBrace,
            ]
        );
    }

    #[test]
    fn test_at_import() {
        assert_eq!(
            kinds("@import \"a.css\";"),
            vec![
                CssTokenKind::AtKeyword,
                CssTokenKind::String,
                CssTokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_unquoted_url() {
        let log = Log::new();
        let tokens = tokenize("url(foo.png)", 0, &log);
        assert_eq!(tokens[0].kind, CssTokenKind::Url);
        assert_eq!(tokens[0].text("url(foo.png)"), "foo.png");
    }

    #[test]
    fn test_quoted_url_is_function() {
        assert_eq!(
            kinds("url(\"foo.png\")"),
            vec![
                CssTokenKind::Function,
                CssTokenKind::String,
                CssTokenKind::CloseParen,
            ]
        );
    }

    #[test]
    fn test_bad_url_recovers() {
        let log = Log::new();
        let tokens = tokenize("url(a\"b) .x{}", 0, &log);
        assert_eq!(tokens[0].kind, CssTokenKind::BadUrl);
        // Tokenization continues after the bad token
        assert!(tokens.iter().any(|t| t.kind == CssTokenKind::OpenBrace));
    }

    #[test]
    fn test_bad_string_recovers() {
        let log = Log::new();
        let tokens = tokenize("\"abc\n.x{}", 0, &log);
        assert_eq!(tokens[0].kind, CssTokenKind::BadString);
        assert!(tokens.iter().any(|t| t.kind == CssTokenKind::OpenBrace));
    }

    #[test]
    fn test_numbers_and_dimensions() {
        assert_eq!(
            kinds("10px 50% 1.5 -3e2"),
            vec![
                CssTokenKind::Dimension,
                CssTokenKind::Percentage,
                CssTokenKind::Number,
                CssTokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_hash_id() {
        let log = Log::new();
        let tokens = tokenize("#main", 0, &log);
        assert_eq!(tokens[0].kind, CssTokenKind::Hash);
        assert!(tokens[0].is_id);
        assert_eq!(tokens[0].text("#main"), "main");
    }

    #[test]
    fn test_escape_decoding() {
        assert_eq!(decode_escapes("a\\62 c"), "abc");
        assert_eq!(decode_escapes("\\2764"), "\u{2764}");
        assert_eq!(decode_escapes("\\110000"), "\u{FFFD}");
        assert_eq!(decode_escapes("no-escapes"), "no-escapes");
    }

    #[test]
    fn test_custom_property_ident() {
        let log = Log::new();
        let tokens = tokenize("--main-color", 0, &log);
        assert_eq!(tokens[0].kind, CssTokenKind::Ident);
    }
}
