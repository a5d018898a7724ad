//! TypeScript support: type erasure, enums and namespaces.
//!
//! Types are scanned with a token-balanced skipper rather than a full type
//! grammar: the bundler never needs the type structure, only where it ends.
//! Shift tokens (`>>`, `>>>`) close multiple angle brackets at once.

use super::{Parser, PResult};
use crate::ast::*;
use crate::scope::ScopeKind;
use crate::symbols::SymbolKind;
use kestrel_lexer::{Lexer, TokenKind};

impl<'a> Parser<'a> {
    /// `: T` if present.
    pub(crate) fn ts_skip_type_annotation(&mut self) -> PResult<()> {
        if self.is_typescript && self.eat(TokenKind::Colon) {
            self.ts_skip_type()?;
        }
        Ok(())
    }

    /// `<T, U extends V = W>` if present.
    pub(crate) fn ts_skip_type_parameters(&mut self) -> PResult<()> {
        if self.is_typescript && self.lexer.token == TokenKind::LessThan {
            self.ts_skip_angle_group()?;
        }
        Ok(())
    }

    /// Type arguments after `extends C` or on a decorator target.
    pub(crate) fn ts_skip_type_args_if_present(&mut self) -> PResult<()> {
        if self.is_typescript
            && self.lexer.token == TokenKind::LessThan
            && self.ts_probe_type_args()
        {
            self.ts_skip_angle_group()?;
        }
        Ok(())
    }

    /// Access modifiers on constructor parameters; erased.
    pub(crate) fn ts_skip_parameter_modifiers(&mut self) {
        if !self.is_typescript {
            return;
        }
        loop {
            if self.lexer.token != TokenKind::Identifier
                || !matches!(
                    self.lexer.raw(),
                    "public" | "private" | "protected" | "readonly" | "override"
                )
            {
                return;
            }
            // Only a modifier when a binding follows; `(readonly)` is a name
            let mut probe = self.lexer.clone();
            probe.next();
            if !matches!(
                probe.token,
                TokenKind::Identifier | TokenKind::OpenBrace | TokenKind::OpenBracket
            ) {
                return;
            }
            self.lexer.next();
        }
    }

    /// Skip one type expression. Union/intersection, conditional types,
    /// array/index suffixes, function and constructor types are consumed by
    /// balance; the type ends at the first top-level token that cannot
    /// continue a type.
    pub(crate) fn ts_skip_type(&mut self) -> PResult<()> {
        // Leading | or & is legal
        while matches!(self.lexer.token, TokenKind::Bar | TokenKind::Ampersand) {
            self.lexer.next();
        }
        self.ts_skip_type_atom()?;
        loop {
            match self.lexer.token {
                TokenKind::Bar | TokenKind::Ampersand => {
                    self.lexer.next();
                    self.ts_skip_type_atom()?;
                }
                TokenKind::Extends => {
                    // Conditional type `T extends U ? X : Y`
                    self.lexer.next();
                    self.ts_skip_type_atom()?;
                    if self.eat(TokenKind::Question) {
                        self.ts_skip_type()?;
                        self.expect(TokenKind::Colon)?;
                        self.ts_skip_type()?;
                    }
                }
                TokenKind::Question => {
                    // Conditional continuation when `extends` was part of
                    // the atom
                    self.lexer.next();
                    self.ts_skip_type()?;
                    self.expect(TokenKind::Colon)?;
                    self.ts_skip_type()?;
                }
                TokenKind::OpenBracket => {
                    // Array or indexed access
                    self.ts_skip_balanced(TokenKind::OpenBracket, TokenKind::CloseBracket)?;
                }
                TokenKind::Dot => {
                    self.lexer.next();
                    if !self.lexer.token.is_identifier_or_keyword() {
                        return Err(self.unexpected());
                    }
                    self.lexer.next();
                }
                TokenKind::LessThan => {
                    self.ts_skip_angle_group()?;
                }
                TokenKind::EqualsGreaterThan => {
                    // Function-type return
                    self.lexer.next();
                    self.ts_skip_type()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn ts_skip_type_atom(&mut self) -> PResult<()> {
        match self.lexer.token {
            TokenKind::OpenParen => {
                self.ts_skip_balanced(TokenKind::OpenParen, TokenKind::CloseParen)?;
                // `(args) => ret` function type
                if self.eat(TokenKind::EqualsGreaterThan) {
                    self.ts_skip_type()?;
                }
                Ok(())
            }
            TokenKind::OpenBrace => {
                self.ts_skip_balanced(TokenKind::OpenBrace, TokenKind::CloseBrace)
            }
            TokenKind::OpenBracket => {
                self.ts_skip_balanced(TokenKind::OpenBracket, TokenKind::CloseBracket)
            }
            TokenKind::StringLiteral
            | TokenKind::NumericLiteral
            | TokenKind::BigIntLiteral
            | TokenKind::NoSubstitutionTemplateLiteral
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Void
            | TokenKind::This => {
                self.lexer.next();
                Ok(())
            }
            TokenKind::TemplateHead => {
                // Template literal type: scan segments
                loop {
                    self.lexer.next();
                    self.ts_skip_type()?;
                    if self.lexer.token != TokenKind::CloseBrace {
                        return Err(self.unexpected());
                    }
                    self.lexer.rescan_template_token();
                    if self.lexer.token == TokenKind::TemplateTail {
                        self.lexer.next();
                        return Ok(());
                    }
                }
            }
            TokenKind::Typeof => {
                self.lexer.next();
                self.ts_skip_type_atom()
            }
            TokenKind::New => {
                // Constructor type `new (args) => T`
                self.lexer.next();
                self.ts_skip_type_atom()
            }
            TokenKind::Minus => {
                // Negative literal type
                self.lexer.next();
                if self.lexer.token != TokenKind::NumericLiteral {
                    return Err(self.unexpected());
                }
                self.lexer.next();
                Ok(())
            }
            TokenKind::Import => {
                // `import("path").Entity`
                self.lexer.next();
                self.ts_skip_balanced(TokenKind::OpenParen, TokenKind::CloseParen)
            }
            _ if self.lexer.token.is_identifier_or_keyword() => {
                let word = self.lexer.raw().to_string();
                self.lexer.next();
                if matches!(
                    word.as_str(),
                    "keyof" | "readonly" | "infer" | "unique" | "asserts" | "abstract"
                ) {
                    return self.ts_skip_type_atom();
                }
                // Type predicate `x is T`
                if self.lexer.is_contextual_keyword("is") {
                    self.lexer.next();
                    return self.ts_skip_type();
                }
                Ok(())
            }
            _ => Err(self.unexpected()),
        }
    }

    fn ts_skip_balanced(&mut self, open: TokenKind, close: TokenKind) -> PResult<()> {
        if self.lexer.token != open {
            return Err(self.unexpected());
        }
        let mut depth = 0u32;
        loop {
            let t = self.lexer.token;
            if t == TokenKind::EndOfFile {
                return Err(self.unexpected());
            }
            if t == open {
                depth += 1;
            } else if t == close {
                depth -= 1;
                if depth == 0 {
                    self.lexer.next();
                    return Ok(());
                }
            }
            self.lexer.next();
        }
    }

    /// Skip `<...>` treating shift tokens as multiple closers.
    fn ts_skip_angle_group(&mut self) -> PResult<()> {
        debug_assert_eq!(self.lexer.token, TokenKind::LessThan);
        let mut depth: i32 = 0;
        loop {
            match self.lexer.token {
                TokenKind::EndOfFile => return Err(self.unexpected()),
                TokenKind::LessThan => depth += 1,
                TokenKind::GreaterThan => depth -= 1,
                TokenKind::GreaterThanGreaterThan => depth -= 2,
                TokenKind::GreaterThanGreaterThanGreaterThan => depth -= 3,
                _ => {}
            }
            self.lexer.next();
            if depth <= 0 {
                return Ok(());
            }
        }
    }

    /// Probe whether `<` starts type arguments: balanced-scan on a lexer
    /// clone and require a call or template to follow the closing `>`.
    pub(crate) fn ts_probe_type_args(&self) -> bool {
        let mut probe = self.lexer.clone();
        let mut depth: i32 = 0;
        loop {
            match probe.token {
                TokenKind::LessThan => depth += 1,
                TokenKind::GreaterThan => depth -= 1,
                TokenKind::GreaterThanGreaterThan => depth -= 2,
                TokenKind::GreaterThanGreaterThanGreaterThan => depth -= 3,
                TokenKind::EndOfFile | TokenKind::Semicolon => return false,
                TokenKind::AmpersandAmpersand | TokenKind::BarBar => return false,
                _ => {}
            }
            probe.next();
            if depth <= 0 {
                break;
            }
        }
        matches!(
            probe.token,
            TokenKind::OpenParen
                | TokenKind::NoSubstitutionTemplateLiteral
                | TokenKind::TemplateHead
        )
    }

    /// From a probe positioned at the `:` after arrow parens, decide
    /// whether a `=>` follows the return annotation at depth zero.
    pub(crate) fn ts_return_annotation_precedes_arrow(&self, probe: &Lexer) -> bool {
        let mut probe = probe.clone();
        probe.next(); // :
        let mut depth: i32 = 0;
        loop {
            match probe.token {
                TokenKind::EqualsGreaterThan if depth == 0 => return true,
                TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace
                | TokenKind::LessThan => depth += 1,
                TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace
                | TokenKind::GreaterThan => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                TokenKind::Semicolon | TokenKind::EndOfFile => return false,
                TokenKind::Comma if depth == 0 => return false,
                _ => {}
            }
            probe.next();
        }
    }

    // =========================================================================
    // Erased declarations
    // =========================================================================

    /// Whether the statement starting at the current identifier is a
    /// TypeScript-only declaration.
    pub(crate) fn ts_stmt_starts_erased_declaration(&self) -> bool {
        let word = self.lexer.raw();
        let mut probe = self.lexer.clone();
        probe.next();
        if probe.has_newline_before {
            return false;
        }
        match word {
            "interface" => probe.token == TokenKind::Identifier,
            "type" => {
                if probe.token != TokenKind::Identifier {
                    return false;
                }
                probe.next();
                matches!(probe.token, TokenKind::Equals | TokenKind::LessThan)
            }
            "declare" => probe.token.is_identifier_or_keyword(),
            "namespace" | "module" => {
                matches!(probe.token, TokenKind::Identifier | TokenKind::StringLiteral)
            }
            "abstract" => probe.token == TokenKind::Class,
            _ => false,
        }
    }

    pub(crate) fn parse_ts_declaration(&mut self, is_export: bool) -> PResult<Stmt> {
        let start = self.span();
        let word = self.lexer.raw().to_string();
        match word.as_str() {
            "interface" => {
                self.lexer.next();
                self.expect_identifier()?;
                self.ts_skip_type_parameters()?;
                if self.eat(TokenKind::Extends) {
                    self.ts_skip_type()?;
                    while self.eat(TokenKind::Comma) {
                        self.ts_skip_type()?;
                    }
                }
                self.ts_skip_balanced(TokenKind::OpenBrace, TokenKind::CloseBrace)?;
                Ok(Stmt::new(start, SData::TsErased))
            }
            "type" => {
                self.lexer.next();
                self.expect_identifier()?;
                self.ts_skip_type_parameters()?;
                self.expect(TokenKind::Equals)?;
                self.ts_skip_type()?;
                self.semicolon()?;
                Ok(Stmt::new(start, SData::TsErased))
            }
            "declare" => {
                // Everything under `declare` is ambient; skip to the end of
                // the declaration
                self.lexer.next();
                self.ts_skip_ambient_declaration()?;
                Ok(Stmt::new(start, SData::TsErased))
            }
            "abstract" => {
                self.lexer.next();
                self.parse_stmt()
            }
            "namespace" | "module" => {
                self.lexer.next();
                if self.lexer.token == TokenKind::StringLiteral {
                    // Ambient module declaration
                    self.lexer.next();
                    self.ts_skip_balanced(TokenKind::OpenBrace, TokenKind::CloseBrace)?;
                    return Ok(Stmt::new(start, SData::TsErased));
                }
                self.parse_namespace(start, is_export)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn ts_skip_ambient_declaration(&mut self) -> PResult<()> {
        // Walk tokens until the declaration's closing brace or semicolon
        let mut depth = 0u32;
        loop {
            match self.lexer.token {
                TokenKind::OpenBrace => depth += 1,
                TokenKind::CloseBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.lexer.next();
                        self.eat(TokenKind::Semicolon);
                        return Ok(());
                    }
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.lexer.next();
                    return Ok(());
                }
                TokenKind::EndOfFile => return Ok(()),
                _ => {}
            }
            self.lexer.next();
        }
    }

    fn parse_namespace(&mut self, start: kestrel_common::Span, is_export: bool) -> PResult<Stmt> {
        let (name, name_span) = self.expect_identifier()?;
        let name_ref = self.declare_symbol(SymbolKind::TsNamespace, &name, name_span);
        self.expect(TokenKind::OpenBrace)?;
        self.push_scope(ScopeKind::Block);
        let mut body = Vec::new();
        while !self.eat(TokenKind::CloseBrace) {
            if self.lexer.token == TokenKind::EndOfFile {
                return Err(self.syntax_error(self.span(), "Expected \"}\" but found end of file"));
            }
            // `export` inside a namespace exposes the member on the
            // namespace object; the lowering pass handles it
            body.push(self.parse_stmt()?);
        }
        self.pop_scope();
        if is_export {
            self.add_named_export(&name, name_ref, name_span);
        }
        Ok(Stmt::new(
            start,
            SData::Namespace {
                name,
                name_ref,
                body,
                is_export,
            },
        ))
    }

    // =========================================================================
    // Enums
    // =========================================================================

    pub(crate) fn parse_enum(&mut self, is_export: bool) -> PResult<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Enum)?;
        let (name, name_span) = self.expect_identifier()?;
        let name_ref = self.declare_symbol(SymbolKind::TsEnum, &name, name_span);
        self.expect(TokenKind::OpenBrace)?;
        let mut members = Vec::new();
        while self.lexer.token != TokenKind::CloseBrace {
            let member_name = match self.lexer.token {
                TokenKind::StringLiteral => self.lexer.text(),
                _ if self.lexer.token.is_identifier_or_keyword() => {
                    if self.lexer.token == TokenKind::Identifier {
                        self.lexer.text()
                    } else {
                        self.lexer.raw().to_string()
                    }
                }
                _ => return Err(self.unexpected()),
            };
            self.lexer.next();
            let value = if self.eat(TokenKind::Equals) {
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            members.push(EnumMember {
                name: member_name,
                value,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseBrace)?;
        if is_export {
            self.add_named_export(&name, name_ref, name_span);
        }
        Ok(Stmt::new(
            start,
            SData::Enum {
                name,
                name_ref,
                members,
                is_export,
            },
        ))
    }
}
