//! The JavaScript lexer.
//!
//! One token of lookahead, driven by the parser calling [`Lexer::next`].
//! Escape handling is lazy-eager: the common path is zero-copy (the token
//! is a span of the input) and the first escape in a token triggers
//! allocation of a decoded buffer. Regex-vs-divide is disambiguated from
//! the previous token. Template literals are lexed in segments; the parser
//! re-enters tail lexing after each `${...}` block via
//! [`Lexer::rescan_template_token`].

use kestrel_common::{Log, Span};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    EndOfFile,
    SyntaxError,

    // Literals
    Identifier,
    PrivateIdentifier,
    StringLiteral,
    NumericLiteral,
    BigIntLiteral,
    RegExpLiteral,
    NoSubstitutionTemplateLiteral,
    TemplateHead,
    TemplateMiddle,
    TemplateTail,

    // Punctuation
    Ampersand,
    AmpersandAmpersand,
    AmpersandAmpersandEquals,
    AmpersandEquals,
    Asterisk,
    AsteriskAsterisk,
    AsteriskAsteriskEquals,
    AsteriskEquals,
    At,
    Bar,
    BarBar,
    BarBarEquals,
    BarEquals,
    Caret,
    CaretEquals,
    CloseBrace,
    CloseBracket,
    CloseParen,
    Colon,
    Comma,
    Dot,
    DotDotDot,
    Equals,
    EqualsEquals,
    EqualsEqualsEquals,
    EqualsGreaterThan,
    Exclamation,
    ExclamationEquals,
    ExclamationEqualsEquals,
    GreaterThan,
    GreaterThanEquals,
    GreaterThanGreaterThan,
    GreaterThanGreaterThanEquals,
    GreaterThanGreaterThanGreaterThan,
    GreaterThanGreaterThanGreaterThanEquals,
    LessThan,
    LessThanEquals,
    LessThanLessThan,
    LessThanLessThanEquals,
    Minus,
    MinusEquals,
    MinusMinus,
    OpenBrace,
    OpenBracket,
    OpenParen,
    Percent,
    PercentEquals,
    Plus,
    PlusEquals,
    PlusPlus,
    Question,
    QuestionDot,
    QuestionQuestion,
    QuestionQuestionEquals,
    Semicolon,
    Slash,
    SlashEquals,
    Tilde,

    // Reserved words
    Await,
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Enum,
    Export,
    Extends,
    False,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    New,
    Null,
    Return,
    Super,
    Switch,
    This,
    Throw,
    True,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
}

impl TokenKind {
    /// Reserved words and identifier-shaped tokens.
    #[must_use]
    pub fn is_identifier_or_keyword(self) -> bool {
        matches!(self, TokenKind::Identifier) || self.is_keyword()
    }

    #[must_use]
    pub fn is_keyword(self) -> bool {
        (self as u8) >= (TokenKind::Await as u8)
    }
}

fn keyword_kind(text: &str) -> Option<TokenKind> {
    Some(match text {
        "await" => TokenKind::Await,
        "break" => TokenKind::Break,
        "case" => TokenKind::Case,
        "catch" => TokenKind::Catch,
        "class" => TokenKind::Class,
        "const" => TokenKind::Const,
        "continue" => TokenKind::Continue,
        "debugger" => TokenKind::Debugger,
        "default" => TokenKind::Default,
        "delete" => TokenKind::Delete,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "enum" => TokenKind::Enum,
        "export" => TokenKind::Export,
        "extends" => TokenKind::Extends,
        "false" => TokenKind::False,
        "finally" => TokenKind::Finally,
        "for" => TokenKind::For,
        "function" => TokenKind::Function,
        "if" => TokenKind::If,
        "import" => TokenKind::Import,
        "in" => TokenKind::In,
        "instanceof" => TokenKind::Instanceof,
        "new" => TokenKind::New,
        "null" => TokenKind::Null,
        "return" => TokenKind::Return,
        "super" => TokenKind::Super,
        "switch" => TokenKind::Switch,
        "this" => TokenKind::This,
        "throw" => TokenKind::Throw,
        "true" => TokenKind::True,
        "try" => TokenKind::Try,
        "typeof" => TokenKind::Typeof,
        "var" => TokenKind::Var,
        "void" => TokenKind::Void,
        "while" => TokenKind::While,
        "with" => TokenKind::With,
        _ => return None,
    })
}

/// The JavaScript lexer. `Clone` is cheap enough to snapshot for the
/// parser's try-parse lookahead paths.
#[derive(Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    log: &'a Log,
    source_index: u32,

    pos: usize,
    pub token: TokenKind,
    pub start: u32,
    pub end: u32,

    /// Decoded token text when the raw span contained escapes; `None` for
    /// the zero-copy path.
    decoded: Option<String>,
    pub number: f64,
    /// Set for `0123`-style literals and `\0`-style escapes so the parser
    /// can warn only in strict mode.
    pub legacy_octal: bool,
    pub has_newline_before: bool,
    /// Whether a `/` at the current token position would start a regex.
    would_parse_regex: bool,
    /// Byte offsets of every newline seen, for O(log n) location math.
    newline_offsets: Vec<u32>,
    /// Raw text of template segments, with the delimiters stripped.
    template_raw: Span,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, source_index: u32, log: &'a Log) -> Lexer<'a> {
        let mut lexer = Lexer {
            source,
            log,
            source_index,
            pos: 0,
            token: TokenKind::EndOfFile,
            start: 0,
            end: 0,
            decoded: None,
            number: 0.0,
            legacy_octal: false,
            has_newline_before: true,
            would_parse_regex: true,
            newline_offsets: Vec::new(),
            template_raw: Span::DUMMY,
        };
        // A hashbang line is only valid at position zero
        if lexer.source.starts_with("#!") {
            let end = memchr::memchr(b'\n', lexer.source.as_bytes()).unwrap_or(lexer.source.len());
            lexer.pos = end;
        }
        lexer.next();
        lexer
    }

    // =========================================================================
    // Token accessors
    // =========================================================================

    /// The raw bytes of the current token.
    #[must_use]
    pub fn raw(&self) -> &'a str {
        &self.source[self.start as usize..self.end as usize]
    }

    #[must_use]
    pub fn range(&self) -> Span {
        Span::new(self.start, self.end)
    }

    /// The decoded text of the current token: identifier name without
    /// escapes, string contents without quotes, template segment text.
    #[must_use]
    pub fn text(&self) -> String {
        if let Some(decoded) = &self.decoded {
            return decoded.clone();
        }
        match self.token {
            TokenKind::StringLiteral => {
                let raw = self.raw();
                // Strip the quotes; an unterminated literal has no closer
                let quote = raw.as_bytes()[0] as char;
                let body = &raw[1..];
                body.strip_suffix(quote).unwrap_or(body).to_string()
            }
            TokenKind::NoSubstitutionTemplateLiteral
            | TokenKind::TemplateHead
            | TokenKind::TemplateMiddle
            | TokenKind::TemplateTail => self.template_raw.slice(self.source).to_string(),
            _ => self.raw().to_string(),
        }
    }

    /// Raw text of the current template segment (delimiters stripped,
    /// escapes untouched) for tagged template `raw` arrays.
    #[must_use]
    pub fn template_raw_text(&self) -> String {
        self.template_raw.slice(self.source).to_string()
    }

    /// Take the recorded newline offsets (sorted, deduplicated).
    #[must_use]
    pub fn take_newline_offsets(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.newline_offsets)
    }

    #[must_use]
    pub fn is_contextual_keyword(&self, text: &str) -> bool {
        self.token == TokenKind::Identifier && self.decoded.is_none() && self.raw() == text
    }

    // =========================================================================
    // Character helpers
    // =========================================================================

    #[inline]
    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    #[inline]
    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, span: Span, text: impl Into<String>) {
        self.log.add_error(self.source_index, span, text);
    }

    // =========================================================================
    // Main dispatch
    // =========================================================================

    /// Advance to the next token.
    pub fn next(&mut self) {
        self.has_newline_before = false;
        self.decoded = None;
        self.legacy_octal = false;

        loop {
            self.skip_whitespace_and_comments();
            self.start = self.pos as u32;

            let Some(ch) = self.peek() else {
                self.token = TokenKind::EndOfFile;
                self.end = self.pos as u32;
                return;
            };

            let kind = match ch {
                '(' => self.one(TokenKind::OpenParen),
                ')' => self.one(TokenKind::CloseParen),
                '[' => self.one(TokenKind::OpenBracket),
                ']' => self.one(TokenKind::CloseBracket),
                '{' => self.one(TokenKind::OpenBrace),
                '}' => self.one(TokenKind::CloseBrace),
                ';' => self.one(TokenKind::Semicolon),
                ',' => self.one(TokenKind::Comma),
                ':' => self.one(TokenKind::Colon),
                '~' => self.one(TokenKind::Tilde),
                '@' => self.one(TokenKind::At),
                '+' => {
                    self.bump();
                    if self.eat('+') {
                        TokenKind::PlusPlus
                    } else if self.eat('=') {
                        TokenKind::PlusEquals
                    } else {
                        TokenKind::Plus
                    }
                }
                '-' => {
                    self.bump();
                    if self.eat('-') {
                        TokenKind::MinusMinus
                    } else if self.eat('=') {
                        TokenKind::MinusEquals
                    } else {
                        TokenKind::Minus
                    }
                }
                '*' => {
                    self.bump();
                    if self.eat('*') {
                        if self.eat('=') {
                            TokenKind::AsteriskAsteriskEquals
                        } else {
                            TokenKind::AsteriskAsterisk
                        }
                    } else if self.eat('=') {
                        TokenKind::AsteriskEquals
                    } else {
                        TokenKind::Asterisk
                    }
                }
                '%' => {
                    self.bump();
                    if self.eat('=') {
                        TokenKind::PercentEquals
                    } else {
                        TokenKind::Percent
                    }
                }
                '/' => {
                    if self.would_parse_regex {
                        self.scan_regexp();
                        TokenKind::RegExpLiteral
                    } else {
                        self.bump();
                        if self.eat('=') {
                            TokenKind::SlashEquals
                        } else {
                            TokenKind::Slash
                        }
                    }
                }
                '=' => {
                    self.bump();
                    if self.eat('=') {
                        if self.eat('=') {
                            TokenKind::EqualsEqualsEquals
                        } else {
                            TokenKind::EqualsEquals
                        }
                    } else if self.eat('>') {
                        TokenKind::EqualsGreaterThan
                    } else {
                        TokenKind::Equals
                    }
                }
                '!' => {
                    self.bump();
                    if self.eat('=') {
                        if self.eat('=') {
                            TokenKind::ExclamationEqualsEquals
                        } else {
                            TokenKind::ExclamationEquals
                        }
                    } else {
                        TokenKind::Exclamation
                    }
                }
                '<' => {
                    self.bump();
                    if self.eat('<') {
                        if self.eat('=') {
                            TokenKind::LessThanLessThanEquals
                        } else {
                            TokenKind::LessThanLessThan
                        }
                    } else if self.eat('=') {
                        TokenKind::LessThanEquals
                    } else {
                        TokenKind::LessThan
                    }
                }
                '>' => {
                    self.bump();
                    if self.eat('>') {
                        if self.eat('>') {
                            if self.eat('=') {
                                TokenKind::GreaterThanGreaterThanGreaterThanEquals
                            } else {
                                TokenKind::GreaterThanGreaterThanGreaterThan
                            }
                        } else if self.eat('=') {
                            TokenKind::GreaterThanGreaterThanEquals
                        } else {
                            TokenKind::GreaterThanGreaterThan
                        }
                    } else if self.eat('=') {
                        TokenKind::GreaterThanEquals
                    } else {
                        TokenKind::GreaterThan
                    }
                }
                '&' => {
                    self.bump();
                    if self.eat('&') {
                        if self.eat('=') {
                            TokenKind::AmpersandAmpersandEquals
                        } else {
                            TokenKind::AmpersandAmpersand
                        }
                    } else if self.eat('=') {
                        TokenKind::AmpersandEquals
                    } else {
                        TokenKind::Ampersand
                    }
                }
                '|' => {
                    self.bump();
                    if self.eat('|') {
                        if self.eat('=') {
                            TokenKind::BarBarEquals
                        } else {
                            TokenKind::BarBar
                        }
                    } else if self.eat('=') {
                        TokenKind::BarEquals
                    } else {
                        TokenKind::Bar
                    }
                }
                '^' => {
                    self.bump();
                    if self.eat('=') {
                        TokenKind::CaretEquals
                    } else {
                        TokenKind::Caret
                    }
                }
                '?' => {
                    self.bump();
                    if self.eat('?') {
                        if self.eat('=') {
                            TokenKind::QuestionQuestionEquals
                        } else {
                            TokenKind::QuestionQuestion
                        }
                    } else if self.peek() == Some('.')
                        && !self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                    {
                        // `?.5` is a conditional with a number, not a chain
                        self.bump();
                        TokenKind::QuestionDot
                    } else {
                        TokenKind::Question
                    }
                }
                '.' => {
                    if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                        self.scan_number()
                    } else {
                        self.bump();
                        if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                            self.bump();
                            self.bump();
                            TokenKind::DotDotDot
                        } else {
                            TokenKind::Dot
                        }
                    }
                }
                '"' | '\'' => self.scan_string(ch),
                '`' => self.scan_template(true),
                '#' => {
                    self.bump();
                    if self.peek().is_some_and(is_identifier_start) || self.peek() == Some('\\') {
                        self.scan_identifier_rest();
                        TokenKind::PrivateIdentifier
                    } else {
                        let span = Span::new(self.start, self.pos as u32);
                        self.error(span, "Unexpected \"#\"");
                        TokenKind::SyntaxError
                    }
                }
                '0'..='9' => self.scan_number(),
                _ if is_identifier_start(ch) => {
                    self.bump();
                    let had_escape = self.scan_identifier_rest();
                    if had_escape {
                        TokenKind::Identifier
                    } else {
                        keyword_kind(self.current_raw()).unwrap_or(TokenKind::Identifier)
                    }
                }
                '\\' => {
                    // Identifier starting with a unicode escape
                    let had = self.scan_identifier_rest();
                    if had || self.pos as u32 > self.start {
                        TokenKind::Identifier
                    } else {
                        self.bump();
                        let span = Span::new(self.start, self.pos as u32);
                        self.error(span, "Syntax error \"\\\\\"");
                        TokenKind::SyntaxError
                    }
                }
                _ => {
                    self.bump();
                    let span = Span::new(self.start, self.pos as u32);
                    self.error(span, format!("Syntax error \"{ch}\""));
                    TokenKind::SyntaxError
                }
            };

            self.end = self.pos as u32;
            self.token = kind;
            if kind == TokenKind::SyntaxError {
                // Replacement token: report and move on so downstream parse
                // errors stay localized
                continue;
            }
            self.would_parse_regex = regex_allowed_after(kind);
            return;
        }
    }

    #[inline]
    fn one(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn current_raw(&self) -> &'a str {
        &self.source[self.start as usize..self.pos]
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some('\n') => {
                    self.newline_offsets.push(self.pos as u32);
                    self.has_newline_before = true;
                    self.pos += 1;
                }
                Some('\r') => {
                    self.newline_offsets.push(self.pos as u32);
                    self.has_newline_before = true;
                    self.pos += 1;
                    // \r\n is one line break
                    if self.peek() == Some('\n') {
                        self.pos += 1;
                    }
                }
                Some('\u{2028}') | Some('\u{2029}') => {
                    self.newline_offsets.push(self.pos as u32);
                    self.has_newline_before = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    if self.source[self.pos..].starts_with("//") {
                        let rest = &self.source.as_bytes()[self.pos..];
                        let line_end = memchr::memchr3(b'\n', b'\r', 0xE2, rest)
                            .map(|n| self.find_line_comment_end(n))
                            .unwrap_or(rest.len());
                        self.pos += line_end;
                    } else if self.source[self.pos..].starts_with("/*") {
                        self.skip_block_comment();
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn find_line_comment_end(&self, candidate: usize) -> usize {
        // memchr3 may stop at 0xE2, the first byte of U+2028/U+2029; walk
        // char-by-char from there to find the true terminator.
        let rest = &self.source[self.pos + candidate..];
        for (i, ch) in rest.char_indices() {
            if matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                return candidate + i;
            }
        }
        candidate + rest.len()
    }

    fn skip_block_comment(&mut self) {
        let start = self.pos;
        self.pos += 2;
        loop {
            match self.peek() {
                None => {
                    self.error(
                        Span::new(start as u32, self.pos as u32),
                        "Expected \"*/\" to terminate multi-line comment",
                    );
                    return;
                }
                Some('*') if self.source[self.pos..].starts_with("*/") => {
                    self.pos += 2;
                    return;
                }
                Some(c) => {
                    if matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                        self.newline_offsets.push(self.pos as u32);
                        self.has_newline_before = true;
                    }
                    self.bump();
                }
            }
        }
    }

    // =========================================================================
    // Identifiers
    // =========================================================================

    /// Scan the remainder of an identifier. Returns true if any unicode
    /// escape forced the decoded path.
    fn scan_identifier_rest(&mut self) -> bool {
        let mut had_escape = false;
        loop {
            match self.peek() {
                Some(c) if is_identifier_continue(c) => {
                    self.bump();
                    if had_escape {
                        if let Some(buf) = &mut self.decoded {
                            buf.push(c);
                        }
                    }
                }
                Some('\\') => {
                    if !had_escape {
                        had_escape = true;
                        self.decoded =
                            Some(self.source[self.start as usize..self.pos].to_string());
                    }
                    let escape_start = self.pos;
                    self.pos += 1;
                    match self.scan_unicode_escape() {
                        Some(c) => {
                            if let Some(buf) = &mut self.decoded {
                                buf.push(c);
                            }
                        }
                        None => {
                            self.error(
                                Span::new(escape_start as u32, self.pos as u32),
                                "Invalid unicode escape in identifier",
                            );
                            if let Some(buf) = &mut self.decoded {
                                buf.push('\u{FFFD}');
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        had_escape
    }

    /// `\u{XXXX}` or `\uXXXX`, positioned after the backslash.
    fn scan_unicode_escape(&mut self) -> Option<char> {
        if !self.eat('u') {
            return None;
        }
        if self.eat('{') {
            let mut value: u32 = 0;
            let mut digits = 0;
            while let Some(c) = self.peek() {
                if c == '}' {
                    break;
                }
                value = value.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
                digits += 1;
                self.bump();
            }
            if !self.eat('}') || digits == 0 {
                return None;
            }
            char::from_u32(value)
        } else {
            let mut value: u32 = 0;
            for _ in 0..4 {
                let c = self.peek()?;
                value = value * 16 + c.to_digit(16)?;
                self.bump();
            }
            char::from_u32(value)
        }
    }

    // =========================================================================
    // Numbers
    // =========================================================================

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        let first = self.peek().unwrap_or('0');
        let mut is_bigint = false;

        if first == '0' {
            match self.peek_at(1) {
                Some('x') | Some('X') => {
                    self.pos += 2;
                    let digits = self.eat_radix_digits(16);
                    self.number = digits as f64;
                    is_bigint = self.eat('n');
                    return self.finish_number(start, is_bigint);
                }
                Some('o') | Some('O') => {
                    self.pos += 2;
                    let digits = self.eat_radix_digits(8);
                    self.number = digits as f64;
                    is_bigint = self.eat('n');
                    return self.finish_number(start, is_bigint);
                }
                Some('b') | Some('B') => {
                    self.pos += 2;
                    let digits = self.eat_radix_digits(2);
                    self.number = digits as f64;
                    is_bigint = self.eat('n');
                    return self.finish_number(start, is_bigint);
                }
                Some(c) if c.is_ascii_digit() => {
                    // Legacy octal (or decimal-with-leading-zero when an
                    // 8 or 9 shows up). Distinguished so the parser can
                    // warn only in strict mode.
                    self.legacy_octal = true;
                    let mut all_octal = true;
                    let digits_start = self.pos + 1;
                    self.pos += 1;
                    while let Some(c) = self.peek() {
                        if c.is_ascii_digit() {
                            if c > '7' {
                                all_octal = false;
                            }
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    let text = &self.source[digits_start..self.pos];
                    self.number = if all_octal {
                        u64::from_str_radix(text, 8).unwrap_or(0) as f64
                    } else {
                        text.parse().unwrap_or(0.0)
                    };
                    return self.finish_number(start, false);
                }
                _ => {}
            }
        }

        // Decimal: integer part, fraction, exponent, numeric separators
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.pos += 1;
            }
        } else if self.eat('n') {
            is_bigint = true;
        }
        if !is_bigint && matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        if !is_bigint {
            let text: String = self.source[start..self.pos]
                .chars()
                .filter(|&c| c != '_')
                .collect();
            self.number = text.parse().unwrap_or(f64::NAN);
        }
        self.finish_number(start, is_bigint)
    }

    fn eat_radix_digits(&mut self, radix: u32) -> u64 {
        let mut value: u64 = 0;
        let mut any = false;
        while let Some(c) = self.peek() {
            if c == '_' {
                self.pos += 1;
                continue;
            }
            match c.to_digit(radix) {
                Some(d) => {
                    value = value.wrapping_mul(radix as u64).wrapping_add(d as u64);
                    any = true;
                    self.pos += 1;
                }
                None => break,
            }
        }
        if !any {
            self.error(
                Span::new(self.start, self.pos as u32),
                "Expected digits after numeric literal prefix",
            );
        }
        value
    }

    fn finish_number(&mut self, _start: usize, is_bigint: bool) -> TokenKind {
        // An identifier immediately after a number is always malformed
        if self.peek().is_some_and(is_identifier_start) {
            let span = Span::new(self.pos as u32, self.pos as u32 + 1);
            self.error(span, "An identifier cannot follow a numeric literal");
        }
        if is_bigint {
            TokenKind::BigIntLiteral
        } else {
            TokenKind::NumericLiteral
        }
    }

    // =========================================================================
    // Strings and templates
    // =========================================================================

    fn scan_string(&mut self, quote: char) -> TokenKind {
        self.bump();
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    self.error(
                        Span::new(self.start, self.pos as u32),
                        "Unterminated string literal",
                    );
                    return TokenKind::StringLiteral;
                }
                Some(c) if c == quote => {
                    self.bump();
                    return TokenKind::StringLiteral;
                }
                Some('\\') => {
                    // First escape switches to the decoded buffer
                    if self.decoded.is_none() {
                        self.decoded =
                            Some(self.source[self.start as usize + 1..self.pos].to_string());
                    }
                    self.scan_escape();
                }
                Some(c) => {
                    self.bump();
                    if let Some(buf) = &mut self.decoded {
                        buf.push(c);
                    }
                }
            }
        }
    }

    /// One backslash escape inside a string or template, positioned at the
    /// backslash. Appends the decoded character(s) to the buffer.
    fn scan_escape(&mut self) {
        let escape_start = self.pos;
        self.pos += 1;
        let Some(c) = self.bump() else {
            return;
        };
        let decoded = match c {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{C}'),
            'v' => Some('\u{B}'),
            '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => Some('\0'),
            '0'..='7' => {
                // Legacy octal escape: up to three octal digits
                self.legacy_octal = true;
                let mut value = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) if value * 8 + d <= 0xFF => {
                            value = value * 8 + d;
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                char::from_u32(value)
            }
            '8' | '9' => {
                self.legacy_octal = true;
                Some(c)
            }
            'x' => {
                let mut value: u32 = 0;
                let mut ok = true;
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            self.pos += 1;
                        }
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if ok {
                    char::from_u32(value)
                } else {
                    None
                }
            }
            'u' => {
                self.pos -= 1; // scan_unicode_escape expects to eat the 'u'
                self.scan_unicode_escape()
            }
            '\r' => {
                // Line continuation; \r\n counts as one
                self.eat('\n');
                self.newline_offsets.push(escape_start as u32 + 1);
                return;
            }
            '\n' | '\u{2028}' | '\u{2029}' => {
                self.newline_offsets.push(escape_start as u32 + 1);
                return;
            }
            other => Some(other),
        };
        if decoded.is_none() {
            self.error(
                Span::new(escape_start as u32, self.pos as u32),
                "Invalid escape sequence",
            );
        }
        let buf = self.decoded.get_or_insert_with(String::new);
        match decoded {
            Some(c) => buf.push(c),
            None => buf.push('\u{FFFD}'),
        }
    }

    /// Scan a template segment starting at `` ` `` (head) or `}` (middle /
    /// tail, re-entered by the parser).
    fn scan_template(&mut self, is_head: bool) -> TokenKind {
        self.bump(); // ` or }
        let text_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    self.error(
                        Span::new(self.start, self.pos as u32),
                        "Unterminated template literal",
                    );
                    self.template_raw = Span::new(text_start as u32, self.pos as u32);
                    return if is_head {
                        TokenKind::NoSubstitutionTemplateLiteral
                    } else {
                        TokenKind::TemplateTail
                    };
                }
                Some('`') => {
                    self.template_raw = Span::new(text_start as u32, self.pos as u32);
                    self.bump();
                    return if is_head {
                        TokenKind::NoSubstitutionTemplateLiteral
                    } else {
                        TokenKind::TemplateTail
                    };
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.template_raw = Span::new(text_start as u32, self.pos as u32);
                    self.bump();
                    self.bump();
                    return if is_head {
                        TokenKind::TemplateHead
                    } else {
                        TokenKind::TemplateMiddle
                    };
                }
                Some('\\') => {
                    if self.decoded.is_none() {
                        self.decoded = Some(self.source[text_start..self.pos].to_string());
                    }
                    self.scan_escape();
                }
                Some(c) => {
                    if matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                        self.newline_offsets.push(self.pos as u32);
                    }
                    self.bump();
                    if let Some(buf) = &mut self.decoded {
                        buf.push(c);
                    }
                }
            }
        }
    }

    /// Re-enter template lexing after the parser consumed the `}` closing a
    /// `${...}` substitution. The current token must be `CloseBrace`.
    pub fn rescan_template_token(&mut self) {
        debug_assert_eq!(self.token, TokenKind::CloseBrace);
        self.pos = self.start as usize;
        self.decoded = None;
        let kind = self.scan_template(false);
        self.end = self.pos as u32;
        self.token = kind;
        self.would_parse_regex = regex_allowed_after(kind);
    }

    // =========================================================================
    // Regular expressions
    // =========================================================================

    /// Scan a regex literal starting at `/`. Only bracket-awareness is
    /// needed; validity of the pattern is the engine's problem.
    fn scan_regexp(&mut self) {
        self.bump(); // '/'
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') | Some('\u{2028}') | Some('\u{2029}') => {
                    self.error(
                        Span::new(self.start, self.pos as u32),
                        "Unterminated regular expression",
                    );
                    return;
                }
                Some('\\') => {
                    self.pos += 1;
                    self.bump();
                }
                Some('[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some('/') if !in_class => {
                    self.pos += 1;
                    // Flags
                    while self.peek().is_some_and(is_identifier_continue) {
                        self.bump();
                    }
                    return;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    // =========================================================================
    // JSX
    // =========================================================================

    /// Scan JSX text starting at the current position, up to `<`, `{` or
    /// end of input. Returns the raw text span; the parser decides
    /// whitespace collapsing.
    pub fn scan_jsx_text(&mut self) -> Span {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '<' || c == '{' || c == '}' {
                break;
            }
            if matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                self.newline_offsets.push(self.pos as u32);
            }
            self.bump();
        }
        let span = Span::new(start as u32, self.pos as u32);
        // Re-prime the ordinary token machinery at the stop character
        self.next();
        span
    }

    /// Advance without regex detection: inside JSX syntax a `/` is always
    /// the slash of `</tag>` or `/>`.
    pub fn next_no_regex(&mut self) {
        self.would_parse_regex = false;
        self.next();
    }

    /// Inside a JSX element name or attribute, `-` joins identifiers and
    /// strings do not process escapes.
    pub fn next_inside_jsx_element(&mut self) {
        self.next_no_regex();
        if self.token == TokenKind::Identifier {
            // Glue `a-b-c` into one identifier token
            while self.peek() == Some('-') {
                self.pos += 1;
                while self.peek().is_some_and(is_identifier_continue) {
                    self.bump();
                }
                self.end = self.pos as u32;
                self.decoded = None;
            }
        }
    }
}

// =============================================================================
// Character classes
// =============================================================================

#[must_use]
pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || (!c.is_ascii() && c.is_alphabetic())
}

#[must_use]
pub fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        || c == '$'
        || (!c.is_ascii() && (c.is_alphanumeric() || c == '\u{200C}' || c == '\u{200D}'))
}

/// Whether the text is a valid identifier (no escapes considered).
#[must_use]
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => {}
        _ => return false,
    }
    chars.all(is_identifier_continue)
}

/// After these tokens a `/` starts a regex rather than a division.
fn regex_allowed_after(kind: TokenKind) -> bool {
    !matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::NumericLiteral
            | TokenKind::BigIntLiteral
            | TokenKind::StringLiteral
            | TokenKind::RegExpLiteral
            | TokenKind::NoSubstitutionTemplateLiteral
            | TokenKind::TemplateTail
            | TokenKind::CloseParen
            | TokenKind::CloseBracket
            | TokenKind::CloseBrace
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus
            | TokenKind::This
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Super
            | TokenKind::PrivateIdentifier
    )
}

#[cfg(test)]
#[path = "../tests/js_unit_tests.rs"]
mod tests;
