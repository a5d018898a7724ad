//! Expression parsing: precedence climbing with a one-token lexer and
//! snapshot-based lookahead for the arrow-function and TypeScript-generic
//! ambiguities.

use super::{Parser, PResult};
use crate::ast::*;
use crate::import_record::{ImportKind, ImportRecordFlags};
use crate::scope::ScopeKind;
use crate::symbols::{Ref, SymbolKind};
use kestrel_common::Span;
use kestrel_lexer::TokenKind;

/// Binding power of a binary operator; higher binds tighter. Returns
/// `None` for non-operators.
fn binary_op_for(token: TokenKind) -> Option<(BinOp, u8, bool)> {
    // (op, level, right_associative)
    Some(match token {
        TokenKind::QuestionQuestion => (BinOp::NullishCoalescing, 4, false),
        TokenKind::BarBar => (BinOp::LogicalOr, 5, false),
        TokenKind::AmpersandAmpersand => (BinOp::LogicalAnd, 6, false),
        TokenKind::Bar => (BinOp::BitOr, 7, false),
        TokenKind::Caret => (BinOp::BitXor, 8, false),
        TokenKind::Ampersand => (BinOp::BitAnd, 9, false),
        TokenKind::EqualsEquals => (BinOp::LooseEq, 10, false),
        TokenKind::ExclamationEquals => (BinOp::LooseNe, 10, false),
        TokenKind::EqualsEqualsEquals => (BinOp::StrictEq, 10, false),
        TokenKind::ExclamationEqualsEquals => (BinOp::StrictNe, 10, false),
        TokenKind::LessThan => (BinOp::Lt, 11, false),
        TokenKind::LessThanEquals => (BinOp::Le, 11, false),
        TokenKind::GreaterThan => (BinOp::Gt, 11, false),
        TokenKind::GreaterThanEquals => (BinOp::Ge, 11, false),
        TokenKind::In => (BinOp::In, 11, false),
        TokenKind::Instanceof => (BinOp::Instanceof, 11, false),
        TokenKind::LessThanLessThan => (BinOp::Shl, 12, false),
        TokenKind::GreaterThanGreaterThan => (BinOp::Shr, 12, false),
        TokenKind::GreaterThanGreaterThanGreaterThan => (BinOp::UShr, 12, false),
        TokenKind::Plus => (BinOp::Add, 13, false),
        TokenKind::Minus => (BinOp::Sub, 13, false),
        TokenKind::Asterisk => (BinOp::Mul, 14, false),
        TokenKind::Slash => (BinOp::Div, 14, false),
        TokenKind::Percent => (BinOp::Rem, 14, false),
        TokenKind::AsteriskAsterisk => (BinOp::Pow, 15, true),
        _ => return None,
    })
}

fn assign_op_for(token: TokenKind) -> Option<BinOp> {
    Some(match token {
        TokenKind::Equals => BinOp::Assign,
        TokenKind::PlusEquals => BinOp::AddAssign,
        TokenKind::MinusEquals => BinOp::SubAssign,
        TokenKind::AsteriskEquals => BinOp::MulAssign,
        TokenKind::SlashEquals => BinOp::DivAssign,
        TokenKind::PercentEquals => BinOp::RemAssign,
        TokenKind::AsteriskAsteriskEquals => BinOp::PowAssign,
        TokenKind::LessThanLessThanEquals => BinOp::ShlAssign,
        TokenKind::GreaterThanGreaterThanEquals => BinOp::ShrAssign,
        TokenKind::GreaterThanGreaterThanGreaterThanEquals => BinOp::UShrAssign,
        TokenKind::AmpersandEquals => BinOp::BitAndAssign,
        TokenKind::BarEquals => BinOp::BitOrAssign,
        TokenKind::CaretEquals => BinOp::BitXorAssign,
        TokenKind::AmpersandAmpersandEquals => BinOp::LogicalAndAssign,
        TokenKind::BarBarEquals => BinOp::LogicalOrAssign,
        TokenKind::QuestionQuestionEquals => BinOp::NullishAssign,
        _ => return None,
    })
}

impl<'a> Parser<'a> {
    /// Full expression including the comma operator.
    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_assign_expr()?;
        while self.lexer.token == TokenKind::Comma {
            self.lexer.next();
            let right = self.parse_assign_expr()?;
            let span = expr.span.merge(right.span);
            expr = Expr::new(
                span,
                EData::Binary(EBinary {
                    op: BinOp::Comma,
                    left: Box::new(expr),
                    right: Box::new(right),
                }),
            );
        }
        Ok(expr)
    }

    /// Assignment-level expression (no comma operator).
    pub(crate) fn parse_assign_expr(&mut self) -> PResult<Expr> {
        // yield (only significant inside a generator)
        if self.fn_is_generator && self.lexer.is_contextual_keyword("yield") {
            let start = self.span();
            self.lexer.next();
            let is_star = !self.lexer.has_newline_before && self.eat(TokenKind::Asterisk);
            let value = if self.lexer.has_newline_before
                || matches!(
                    self.lexer.token,
                    TokenKind::CloseParen
                        | TokenKind::CloseBracket
                        | TokenKind::CloseBrace
                        | TokenKind::Comma
                        | TokenKind::Semicolon
                        | TokenKind::Colon
                        | TokenKind::EndOfFile
                ) {
                None
            } else {
                Some(Box::new(self.parse_assign_expr()?))
            };
            return Ok(Expr::new(start, EData::Yield(EYield { value, is_star })));
        }

        // Arrow-function fast paths
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let left = self.parse_conditional()?;
        if let Some(op) = assign_op_for(self.lexer.token) {
            self.check_assignment_target(&left);
            self.lexer.next();
            let right = self.parse_assign_expr()?;
            let span = left.span.merge(right.span);
            return Ok(Expr::new(
                span,
                EData::Binary(EBinary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
            ));
        }
        Ok(left)
    }

    fn check_assignment_target(&mut self, target: &Expr) {
        match &target.data {
            EData::Ident(id) => {
                if self.is_strict() && matches!(id.name.as_str(), "eval" | "arguments") {
                    self.log.add_error(
                        self.source.index.0,
                        target.span,
                        format!("\"{}\" cannot be assigned in strict mode", id.name),
                    );
                }
            }
            EData::Dot(_) | EData::Index(_) | EData::Array(_) | EData::Object(_) => {}
            _ => {
                self.log.add_error(
                    self.source.index.0,
                    target.span,
                    "Invalid assignment target",
                );
            }
        }
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(0)?;
        if self.lexer.token != TokenKind::Question {
            return Ok(test);
        }
        self.lexer.next();
        let old_allow_in = std::mem::replace(&mut self.allow_in, true);
        let yes = self.parse_assign_expr()?;
        self.allow_in = old_allow_in;
        self.expect(TokenKind::Colon)?;
        let no = self.parse_assign_expr()?;
        let span = test.span.merge(no.span);
        Ok(Expr::new(
            span,
            EData::Cond(ECond {
                test: Box::new(test),
                yes: Box::new(yes),
                no: Box::new(no),
            }),
        ))
    }

    fn parse_binary(&mut self, min_level: u8) -> PResult<Expr> {
        let mut left = self.parse_prefix()?;
        loop {
            // TypeScript `as` / `satisfies` casts are erased
            if self.is_typescript
                && !self.lexer.has_newline_before
                && (self.lexer.is_contextual_keyword("as")
                    || self.lexer.is_contextual_keyword("satisfies"))
            {
                self.lexer.next();
                self.ts_skip_type()?;
                continue;
            }
            let Some((op, level, right_assoc)) = binary_op_for(self.lexer.token) else {
                break;
            };
            if level < min_level {
                break;
            }
            if op == BinOp::In && !self.allow_in {
                break;
            }
            // `a ?? b || c` is a syntax error; force parens
            if op == BinOp::NullishCoalescing {
                if let EData::Binary(b) = &left.data {
                    if matches!(b.op, BinOp::LogicalAnd | BinOp::LogicalOr) {
                        self.log.add_error(
                            self.source.index.0,
                            self.span(),
                            "Cannot mix \"??\" with \"&&\" or \"||\" without parentheses",
                        );
                    }
                }
            }
            self.lexer.next();
            let next_min = if right_assoc { level } else { level + 1 };
            let right = self.parse_binary(next_min)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                span,
                EData::Binary(EBinary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
            );
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let start = self.span();
        let op = match self.lexer.token {
            TokenKind::Exclamation => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Plus => Some(UnOp::Pos),
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Typeof => Some(UnOp::Typeof),
            TokenKind::Void => Some(UnOp::Void),
            TokenKind::Delete => Some(UnOp::Delete),
            TokenKind::PlusPlus => Some(UnOp::PreInc),
            TokenKind::MinusMinus => Some(UnOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.lexer.next();
            let value = self.parse_prefix()?;
            if op == UnOp::Delete {
                if let EData::Ident(_) = &value.data {
                    if self.is_strict() {
                        self.log.add_error(
                            self.source.index.0,
                            start.merge(value.span),
                            "Delete of a bare identifier cannot be used in strict mode",
                        );
                    }
                }
            }
            let span = start.merge(value.span);
            return Ok(Expr::new(
                span,
                EData::Unary(EUnary {
                    op,
                    value: Box::new(value),
                }),
            ));
        }

        if self.lexer.token == TokenKind::Await {
            self.lexer.next();
            if self.current_function_depth() == 0 {
                self.record_top_level_await(start);
            } else if !self.fn_is_async {
                self.log.add_error(
                    self.source.index.0,
                    start,
                    "\"await\" can only be used inside an \"async\" function",
                );
            }
            let value = self.parse_prefix()?;
            let span = start.merge(value.span);
            return Ok(Expr::new(span, EData::Await(Box::new(value))));
        }

        // `<T>expr` cast (TypeScript, not .mts/.cts, not JSX)
        if self.lexer.token == TokenKind::LessThan
            && self.is_typescript
            && !self.jsx_enabled
        {
            if self.no_ambiguous_less_than {
                return Err(self.syntax_error(
                    start,
                    "The angle-bracket cast syntax is not allowed in this file type",
                ));
            }
            self.lexer.next();
            self.ts_skip_type()?;
            self.expect(TokenKind::GreaterThan)?;
            return self.parse_prefix();
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let expr = self.parse_suffix_expr()?;
        if !self.lexer.has_newline_before {
            let op = match self.lexer.token {
                TokenKind::PlusPlus => Some(UnOp::PostInc),
                TokenKind::MinusMinus => Some(UnOp::PostDec),
                _ => None,
            };
            if let Some(op) = op {
                let span = expr.span.merge(self.span());
                self.lexer.next();
                return Ok(Expr::new(
                    span,
                    EData::Unary(EUnary {
                        op,
                        value: Box::new(expr),
                    }),
                ));
            }
        }
        Ok(expr)
    }

    // =========================================================================
    // Suffix chains: member access, calls, optional chains, templates
    // =========================================================================

    pub(crate) fn parse_suffix_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        let mut in_chain = false;
        loop {
            match self.lexer.token {
                TokenKind::Dot => {
                    self.lexer.next();
                    if self.lexer.token == TokenKind::PrivateIdentifier {
                        let name = self.lexer.raw()[1..].to_string();
                        let name_span = self.span();
                        self.lexer.next();
                        let span = expr.span.merge(name_span);
                        expr = Expr::new(
                            span,
                            EData::Index(EIndex {
                                target: Box::new(expr),
                                index: Box::new(Expr::new(
                                    name_span,
                                    EData::PrivateIdent(EPrivateIdent {
                                        name,
                                        ref_: Ref::INVALID,
                                    }),
                                )),
                                optional_chain: chain_state(in_chain),
                            }),
                        );
                        continue;
                    }
                    if !self.lexer.token.is_identifier_or_keyword() {
                        return Err(self.unexpected());
                    }
                    let name = if self.lexer.token == TokenKind::Identifier {
                        self.lexer.text()
                    } else {
                        self.lexer.raw().to_string()
                    };
                    let name_span = self.span();
                    self.lexer.next();
                    let span = expr.span.merge(name_span);
                    expr = Expr::new(
                        span,
                        EData::Dot(EDot {
                            target: Box::new(expr),
                            name,
                            name_span,
                            optional_chain: chain_state(in_chain),
                        }),
                    );
                }
                TokenKind::QuestionDot => {
                    self.lexer.next();
                    in_chain = true;
                    match self.lexer.token {
                        TokenKind::OpenParen => {
                            let args = self.parse_call_args()?;
                            let span = expr.span.merge(self.span());
                            expr = Expr::new(
                                span,
                                EData::Call(ECall {
                                    target: Box::new(expr),
                                    args,
                                    optional_chain: OptionalChain::Start,
                                    is_direct_eval: false,
                                }),
                            );
                        }
                        TokenKind::OpenBracket => {
                            self.lexer.next();
                            let old_allow_in = std::mem::replace(&mut self.allow_in, true);
                            let index = self.parse_expr()?;
                            self.allow_in = old_allow_in;
                            self.expect(TokenKind::CloseBracket)?;
                            let span = expr.span.merge(index.span);
                            expr = Expr::new(
                                span,
                                EData::Index(EIndex {
                                    target: Box::new(expr),
                                    index: Box::new(index),
                                    optional_chain: OptionalChain::Start,
                                }),
                            );
                        }
                        _ => {
                            if !self.lexer.token.is_identifier_or_keyword()
                                && self.lexer.token != TokenKind::PrivateIdentifier
                            {
                                return Err(self.unexpected());
                            }
                            let name = if self.lexer.token == TokenKind::Identifier {
                                self.lexer.text()
                            } else {
                                self.lexer.raw().to_string()
                            };
                            let name_span = self.span();
                            self.lexer.next();
                            let span = expr.span.merge(name_span);
                            expr = Expr::new(
                                span,
                                EData::Dot(EDot {
                                    target: Box::new(expr),
                                    name,
                                    name_span,
                                    optional_chain: OptionalChain::Start,
                                }),
                            );
                        }
                    }
                }
                TokenKind::OpenBracket => {
                    self.lexer.next();
                    let old_allow_in = std::mem::replace(&mut self.allow_in, true);
                    let index = self.parse_expr()?;
                    self.allow_in = old_allow_in;
                    self.expect(TokenKind::CloseBracket)?;
                    let span = expr.span.merge(self.span());
                    expr = Expr::new(
                        span,
                        EData::Index(EIndex {
                            target: Box::new(expr),
                            index: Box::new(index),
                            optional_chain: chain_state(in_chain),
                        }),
                    );
                }
                TokenKind::OpenParen => {
                    expr = self.finish_call(expr, in_chain)?;
                }
                TokenKind::Exclamation
                    if self.is_typescript && !self.lexer.has_newline_before =>
                {
                    // TS non-null assertion: erased
                    self.lexer.next();
                }
                TokenKind::LessThan if self.is_typescript => {
                    // Possible generic call `f<T>()`; probe with a lexer
                    // snapshot and back out if it does not close onto an
                    // argument list
                    if !self.ts_probe_type_args() {
                        break;
                    }
                    self.lexer.next(); // <
                    self.ts_skip_type()?;
                    while self.eat(TokenKind::Comma) {
                        self.ts_skip_type()?;
                    }
                    self.expect(TokenKind::GreaterThan)?;
                    match self.lexer.token {
                        TokenKind::OpenParen => {
                            expr = self.finish_call(expr, in_chain)?;
                        }
                        TokenKind::NoSubstitutionTemplateLiteral | TokenKind::TemplateHead => {
                            expr = self.parse_template_tag(expr, in_chain)?;
                        }
                        _ => {
                            // `f<T>` with no call: instantiation expression,
                            // erased to just `f`
                        }
                    }
                }
                TokenKind::NoSubstitutionTemplateLiteral | TokenKind::TemplateHead => {
                    if in_chain {
                        self.log.add_error(
                            self.source.index.0,
                            self.span(),
                            "Tagged template expressions are not permitted inside optional chains",
                        );
                    }
                    expr = self.parse_template_tag(expr, in_chain)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, target: Expr, in_chain: bool) -> PResult<Expr> {
        let is_direct_eval = matches!(&target.data, EData::Ident(id) if id.name == "eval");

        // `require("...")` / `require.resolve("...")` with a string literal
        // become import records
        if let Some(record_kind) = self.call_is_require_shape(&target) {
            let snapshot = self.lexer.clone();
            self.lexer.next(); // (
            if self.lexer.token == TokenKind::StringLiteral {
                let path = self.lexer.text();
                let path_span = self.span();
                self.lexer.next();
                if self.lexer.token == TokenKind::CloseParen {
                    self.lexer.next();
                    let index = self.add_import_record(record_kind, path, path_span);
                    if self.try_body_depth > 0 {
                        // A guarded require handles its own failure
                        self.import_records[index as usize].flags |=
                            ImportRecordFlags::HANDLES_IMPORT_ERRORS;
                    }
                    let span = target.span.merge(path_span);
                    let data = if record_kind == ImportKind::Require {
                        EData::RequireString {
                            import_record_index: index,
                        }
                    } else {
                        EData::RequireResolveString {
                            import_record_index: index,
                        }
                    };
                    return Ok(Expr::new(span, data));
                }
            }
            self.lexer = snapshot;
        }

        let args = self.parse_call_args()?;
        let span = target.span.merge(self.span());
        Ok(Expr::new(
            span,
            EData::Call(ECall {
                target: Box::new(target),
                args,
                optional_chain: chain_state(in_chain),
                is_direct_eval,
            }),
        ))
    }

    fn call_is_require_shape(&self, target: &Expr) -> Option<ImportKind> {
        match &target.data {
            EData::Ident(id) if id.name == "require" => Some(ImportKind::Require),
            EData::Dot(dot) if dot.name == "resolve" => match &dot.target.data {
                EData::Ident(id) if id.name == "require" => Some(ImportKind::RequireResolve),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::OpenParen)?;
        let old_allow_in = std::mem::replace(&mut self.allow_in, true);
        let mut args = Vec::new();
        while self.lexer.token != TokenKind::CloseParen {
            if self.eat(TokenKind::DotDotDot) {
                let value = self.parse_assign_expr()?;
                let span = value.span;
                args.push(Expr::new(span, EData::Spread(Box::new(value))));
            } else {
                args.push(self.parse_assign_expr()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.allow_in = old_allow_in;
        self.expect(TokenKind::CloseParen)?;
        Ok(args)
    }

    fn parse_template_tag(&mut self, tag: Expr, in_chain: bool) -> PResult<Expr> {
        let template = self.parse_template_literal()?;
        let span = tag.span.merge(template.span);
        if let EData::Template(mut t) = template.data {
            t.tag = Some(Box::new(tag));
            t.tag_was_optional_chain = in_chain;
            Ok(Expr::new(span, EData::Template(t)))
        } else {
            unreachable!("parse_template_literal returns a template")
        }
    }

    // =========================================================================
    // Primary expressions
    // =========================================================================

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.span();
        match self.lexer.token {
            TokenKind::This => {
                self.lexer.next();
                Ok(Expr::new(start, EData::This))
            }
            TokenKind::Super => {
                self.lexer.next();
                Ok(Expr::new(start, EData::Super))
            }
            TokenKind::Null => {
                self.lexer.next();
                Ok(Expr::new(start, EData::Null))
            }
            TokenKind::True => {
                self.lexer.next();
                Ok(Expr::new(start, EData::Boolean(true)))
            }
            TokenKind::False => {
                self.lexer.next();
                Ok(Expr::new(start, EData::Boolean(false)))
            }
            TokenKind::NumericLiteral => {
                self.legacy_octal_check(start);
                let value = self.lexer.number;
                self.lexer.next();
                Ok(Expr::new(start, EData::Number(value)))
            }
            TokenKind::BigIntLiteral => {
                let raw = self.lexer.raw().to_string();
                self.lexer.next();
                Ok(Expr::new(start, EData::BigInt(raw)))
            }
            TokenKind::StringLiteral => {
                self.legacy_octal_check(start);
                let value = self.lexer.text();
                self.lexer.next();
                Ok(Expr::new(start, EData::String(value)))
            }
            TokenKind::RegExpLiteral => {
                let raw = self.lexer.raw().to_string();
                self.lexer.next();
                Ok(Expr::new(start, EData::RegExp(raw)))
            }
            TokenKind::NoSubstitutionTemplateLiteral | TokenKind::TemplateHead => {
                self.parse_template_literal()
            }
            TokenKind::OpenParen => {
                self.lexer.next();
                let old_allow_in = std::mem::replace(&mut self.allow_in, true);
                let value = self.parse_expr()?;
                self.allow_in = old_allow_in;
                self.expect(TokenKind::CloseParen)?;
                Ok(value)
            }
            TokenKind::OpenBracket => self.parse_array_literal(),
            TokenKind::OpenBrace => self.parse_object_literal(),
            TokenKind::Function => {
                self.lexer.next();
                let is_generator = self.eat(TokenKind::Asterisk);
                self.parse_function_expr(start, false, is_generator)
            }
            TokenKind::Class => {
                self.lexer.next();
                self.push_scope(ScopeKind::ClassName);
                let name = if self.lexer.token == TokenKind::Identifier {
                    let (name, span) = self.expect_identifier()?;
                    let r = self.declare_symbol(SymbolKind::Class, &name, span);
                    Some(EIdent { name, ref_: r })
                } else {
                    None
                };
                let class = self.parse_class_rest(name)?;
                self.pop_scope();
                Ok(Expr::new(start, EData::Class(Box::new(class))))
            }
            TokenKind::New => {
                self.lexer.next();
                if self.eat(TokenKind::Dot) {
                    if !self.lexer.is_contextual_keyword("target") {
                        return Err(self.unexpected());
                    }
                    self.lexer.next();
                    return Ok(Expr::new(start, EData::NewTarget));
                }
                // The callee binds member accesses but not call parens
                let mut target = self.parse_primary()?;
                loop {
                    match self.lexer.token {
                        TokenKind::Dot => {
                            self.lexer.next();
                            if !self.lexer.token.is_identifier_or_keyword() {
                                return Err(self.unexpected());
                            }
                            let name = self.lexer.text();
                            let name_span = self.span();
                            self.lexer.next();
                            let span = target.span.merge(name_span);
                            target = Expr::new(
                                span,
                                EData::Dot(EDot {
                                    target: Box::new(target),
                                    name,
                                    name_span,
                                    optional_chain: OptionalChain::None,
                                }),
                            );
                        }
                        TokenKind::OpenBracket => {
                            self.lexer.next();
                            let index = self.parse_expr()?;
                            self.expect(TokenKind::CloseBracket)?;
                            let span = target.span.merge(self.span());
                            target = Expr::new(
                                span,
                                EData::Index(EIndex {
                                    target: Box::new(target),
                                    index: Box::new(index),
                                    optional_chain: OptionalChain::None,
                                }),
                            );
                        }
                        _ => break,
                    }
                }
                let args = if self.lexer.token == TokenKind::OpenParen {
                    self.parse_call_args()?
                } else {
                    Vec::new()
                };
                let span = start.merge(self.span());
                Ok(Expr::new(
                    span,
                    EData::New(ENew {
                        target: Box::new(target),
                        args,
                    }),
                ))
            }
            TokenKind::Import => {
                self.lexer.next();
                if self.eat(TokenKind::Dot) {
                    if !self.lexer.is_contextual_keyword("meta") {
                        return Err(self.unexpected());
                    }
                    self.lexer.next();
                    return Ok(Expr::new(start, EData::ImportMeta));
                }
                self.expect(TokenKind::OpenParen)?;
                let value = self.parse_assign_expr()?;
                let options = if self.eat(TokenKind::Comma)
                    && self.lexer.token != TokenKind::CloseParen
                {
                    Some(Box::new(self.parse_assign_expr()?))
                } else {
                    None
                };
                self.eat(TokenKind::Comma);
                self.expect(TokenKind::CloseParen)?;
                let span = start.merge(self.span());

                let import_record_index = if let EData::String(path) = &value.data {
                    let index =
                        self.add_import_record(ImportKind::Dynamic, path.clone(), value.span);
                    Some(index)
                } else {
                    // A non-literal dynamic import stays as-is; the glob
                    // pattern (if any) is the resolver's business
                    None
                };
                Ok(Expr::new(
                    span,
                    EData::ImportCall(EImportCall {
                        expr: Box::new(value),
                        options,
                        import_record_index,
                    }),
                ))
            }
            TokenKind::PrivateIdentifier => {
                // Only valid as `#field in obj`
                let name = self.lexer.raw()[1..].to_string();
                self.lexer.next();
                if self.lexer.token != TokenKind::In {
                    return Err(self.syntax_error(
                        start,
                        "Private names are only valid on the left of an \"in\" expression",
                    ));
                }
                Ok(Expr::new(
                    start,
                    EData::PrivateIdent(EPrivateIdent {
                        name,
                        ref_: Ref::INVALID,
                    }),
                ))
            }
            TokenKind::LessThan if self.jsx_enabled => {
                // The element ends on its final `>`; step past it
                let element = self.parse_jsx_element()?;
                self.lexer.next();
                Ok(element)
            }
            TokenKind::Identifier => {
                let name = self.lexer.text();
                self.lexer.next();
                Ok(Expr::new(
                    start,
                    EData::Ident(EIdent {
                        name,
                        ref_: Ref::INVALID,
                    }),
                ))
            }
            _ => Err(self.unexpected()),
        }
    }

    pub(crate) fn parse_function_expr(
        &mut self,
        start: Span,
        is_async: bool,
        is_generator: bool,
    ) -> PResult<Expr> {
        // A function expression's name is scoped to the function itself
        self.push_scope(ScopeKind::ClassName);
        let name = if self.lexer.token == TokenKind::Identifier {
            let (name, span) = self.expect_identifier()?;
            let r = self.declare_symbol(SymbolKind::HoistedFunction, &name, span);
            Some(EIdent { name, ref_: r })
        } else {
            None
        };
        let func = self.parse_function_rest(name, is_async, is_generator)?;
        self.pop_scope();
        Ok(Expr::new(start, EData::Function(Box::new(func))))
    }

    fn parse_template_literal(&mut self) -> PResult<Expr> {
        let start = self.span();
        if self.lexer.token == TokenKind::NoSubstitutionTemplateLiteral {
            let cooked = self.lexer.text();
            let raw = self.lexer.template_raw_text();
            self.lexer.next();
            return Ok(Expr::new(
                start,
                EData::Template(ETemplate {
                    tag: None,
                    tag_was_optional_chain: false,
                    head_cooked: cooked,
                    head_raw: raw,
                    parts: Vec::new(),
                }),
            ));
        }
        debug_assert_eq!(self.lexer.token, TokenKind::TemplateHead);
        let head_cooked = self.lexer.text();
        let head_raw = self.lexer.template_raw_text();
        self.lexer.next();
        let mut parts = Vec::new();
        loop {
            let value = self.parse_expr()?;
            if self.lexer.token != TokenKind::CloseBrace {
                return Err(self.unexpected());
            }
            // The `}` closing the substitution re-enters template lexing
            self.lexer.rescan_template_token();
            let cooked = self.lexer.text();
            let raw = self.lexer.template_raw_text();
            let is_tail = self.lexer.token == TokenKind::TemplateTail;
            self.lexer.next();
            parts.push(ETemplatePart { value, cooked, raw });
            if is_tail {
                break;
            }
        }
        let span = start.merge(self.span());
        Ok(Expr::new(
            span,
            EData::Template(ETemplate {
                tag: None,
                tag_was_optional_chain: false,
                head_cooked,
                head_raw,
                parts,
            }),
        ))
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.lexer.next();
        let old_allow_in = std::mem::replace(&mut self.allow_in, true);
        let mut items = Vec::new();
        while self.lexer.token != TokenKind::CloseBracket {
            match self.lexer.token {
                TokenKind::Comma => {
                    // Hole
                    items.push(Expr::new(self.span(), EData::Undefined));
                    self.lexer.next();
                    continue;
                }
                TokenKind::DotDotDot => {
                    self.lexer.next();
                    let value = self.parse_assign_expr()?;
                    let span = value.span;
                    items.push(Expr::new(span, EData::Spread(Box::new(value))));
                }
                _ => items.push(self.parse_assign_expr()?),
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.allow_in = old_allow_in;
        self.expect(TokenKind::CloseBracket)?;
        let span = start.merge(self.span());
        Ok(Expr::new(span, EData::Array(items)))
    }

    /// A property key: identifier/string/number/computed. Identifier keys
    /// become string literals.
    pub(crate) fn parse_property_key(&mut self) -> PResult<(Expr, bool)> {
        let start = self.span();
        match self.lexer.token {
            TokenKind::OpenBracket => {
                self.lexer.next();
                let old_allow_in = std::mem::replace(&mut self.allow_in, true);
                let key = self.parse_assign_expr()?;
                self.allow_in = old_allow_in;
                self.expect(TokenKind::CloseBracket)?;
                Ok((key, true))
            }
            TokenKind::StringLiteral => {
                let value = self.lexer.text();
                self.lexer.next();
                Ok((Expr::new(start, EData::String(value)), false))
            }
            TokenKind::NumericLiteral => {
                let value = self.lexer.number;
                self.lexer.next();
                Ok((Expr::new(start, EData::Number(value)), false))
            }
            TokenKind::PrivateIdentifier => {
                let name = self.lexer.raw()[1..].to_string();
                self.lexer.next();
                Ok((
                    Expr::new(
                        start,
                        EData::PrivateIdent(EPrivateIdent {
                            name,
                            ref_: Ref::INVALID,
                        }),
                    ),
                    false,
                ))
            }
            _ if self.lexer.token.is_identifier_or_keyword() => {
                let name = if self.lexer.token == TokenKind::Identifier {
                    self.lexer.text()
                } else {
                    self.lexer.raw().to_string()
                };
                self.lexer.next();
                Ok((Expr::new(start, EData::String(name)), false))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.lexer.next();
        let old_allow_in = std::mem::replace(&mut self.allow_in, true);
        let mut properties = Vec::new();
        while self.lexer.token != TokenKind::CloseBrace {
            if self.eat(TokenKind::DotDotDot) {
                let value = self.parse_assign_expr()?;
                properties.push(Property {
                    kind: PropertyKind::Spread,
                    key: Expr::synth(EData::Undefined),
                    value: Some(value),
                    computed: false,
                    shorthand: false,
                    method: false,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                continue;
            }

            // Modifier detection needs one token of lookahead: `get x()`
            // vs a property named `get`
            let mut kind = PropertyKind::Normal;
            let mut is_async = false;
            let mut is_generator = false;
            loop {
                if self.lexer.token == TokenKind::Asterisk {
                    self.lexer.next();
                    is_generator = true;
                    continue;
                }
                if (self.lexer.is_contextual_keyword("get")
                    || self.lexer.is_contextual_keyword("set")
                    || self.lexer.is_contextual_keyword("async"))
                    && !is_generator
                {
                    let word = self.lexer.raw().to_string();
                    let mut probe = self.lexer.clone();
                    probe.next();
                    let is_modifier = !matches!(
                        probe.token,
                        TokenKind::Colon
                            | TokenKind::Comma
                            | TokenKind::CloseBrace
                            | TokenKind::OpenParen
                            | TokenKind::Equals
                    ) && !probe.has_newline_before;
                    if is_modifier {
                        self.lexer.next();
                        match word.as_str() {
                            "get" => kind = PropertyKind::Get,
                            "set" => kind = PropertyKind::Set,
                            _ => is_async = true,
                        }
                        continue;
                    }
                }
                break;
            }

            let (key, computed) = self.parse_property_key()?;

            if kind != PropertyKind::Normal
                || is_async
                || is_generator
                || self.lexer.token == TokenKind::OpenParen
            {
                // Method or accessor
                let func = self.parse_function_rest(None, is_async, is_generator)?;
                properties.push(Property {
                    kind,
                    key,
                    value: Some(Expr::synth(EData::Function(Box::new(func)))),
                    computed,
                    shorthand: false,
                    method: kind == PropertyKind::Normal,
                });
            } else if self.eat(TokenKind::Colon) {
                let value = self.parse_assign_expr()?;
                properties.push(Property {
                    kind: PropertyKind::Normal,
                    key,
                    value: Some(value),
                    computed,
                    shorthand: false,
                    method: false,
                });
            } else {
                // Shorthand `{ x }` or `{ x = default }` (the latter only
                // valid as a destructuring target)
                let name = match &key.data {
                    EData::String(name) => name.clone(),
                    _ => return Err(self.unexpected()),
                };
                let mut value = Expr::new(
                    key.span,
                    EData::Ident(EIdent {
                        name,
                        ref_: Ref::INVALID,
                    }),
                );
                if self.eat(TokenKind::Equals) {
                    let default = self.parse_assign_expr()?;
                    let span = value.span.merge(default.span);
                    value = Expr::new(
                        span,
                        EData::Binary(EBinary {
                            op: BinOp::Assign,
                            left: Box::new(value),
                            right: Box::new(default),
                        }),
                    );
                }
                properties.push(Property {
                    kind: PropertyKind::Normal,
                    key,
                    value: Some(value),
                    computed: false,
                    shorthand: true,
                    method: false,
                });
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.allow_in = old_allow_in;
        self.expect(TokenKind::CloseBrace)?;
        let span = start.merge(self.span());
        Ok(Expr::new(span, EData::Object(properties)))
    }

    // =========================================================================
    // Arrow functions
    // =========================================================================

    /// Detect and parse an arrow function at assignment level. Returns
    /// `None` when the tokens are not an arrow, leaving the lexer where it
    /// was.
    fn try_parse_arrow(&mut self) -> PResult<Option<Expr>> {
        let start = self.span();

        // `async ...`
        if self.lexer.is_contextual_keyword("async") {
            let mut probe = self.lexer.clone();
            probe.next();
            if probe.has_newline_before {
                return Ok(None);
            }
            match probe.token {
                TokenKind::Identifier => {
                    // `async x => ...`
                    let mut probe2 = probe.clone();
                    probe2.next();
                    if probe2.token == TokenKind::EqualsGreaterThan {
                        self.lexer.next(); // async
                        return Ok(Some(self.parse_arrow_with_single_arg(start, true)?));
                    }
                }
                TokenKind::OpenParen => {
                    let mut probe2 = probe.clone();
                    if scan_balanced(&mut probe2)
                        && probe2.token == TokenKind::EqualsGreaterThan
                    {
                        self.lexer.next(); // async
                        return Ok(Some(self.parse_arrow_with_paren_args(start, true)?));
                    }
                }
                TokenKind::Function => {
                    // `async function` expression
                    self.lexer.next(); // async
                    self.lexer.next(); // function
                    let is_generator = self.eat(TokenKind::Asterisk);
                    return Ok(Some(self.parse_function_expr(start, true, is_generator)?));
                }
                _ => {}
            }
            return Ok(None);
        }

        // `x => ...`
        if self.lexer.token == TokenKind::Identifier
            && !(self.fn_is_generator && self.lexer.is_contextual_keyword("yield"))
        {
            let mut probe = self.lexer.clone();
            probe.next();
            if probe.token == TokenKind::EqualsGreaterThan && !probe.has_newline_before {
                return Ok(Some(self.parse_arrow_with_single_arg(start, false)?));
            }
            return Ok(None);
        }

        // `( ... ) => ...`
        if self.lexer.token == TokenKind::OpenParen {
            let mut probe = self.lexer.clone();
            if scan_balanced(&mut probe) {
                let arrow_next = probe.token == TokenKind::EqualsGreaterThan
                    || (self.is_typescript && probe.token == TokenKind::Colon);
                if arrow_next {
                    // A TS return annotation `(): T =>` needs a second look
                    if probe.token == TokenKind::Colon {
                        // Only commit if a `=>` eventually follows the
                        // annotation; the cheap check is to look for `=>`
                        // before a `;`/`)` at depth zero
                        if !self.ts_return_annotation_precedes_arrow(&probe) {
                            return Ok(None);
                        }
                    }
                    return Ok(Some(self.parse_arrow_with_paren_args(start, false)?));
                }
            }
            return Ok(None);
        }

        Ok(None)
    }

    fn parse_arrow_with_single_arg(&mut self, start: Span, is_async: bool) -> PResult<Expr> {
        self.push_scope(ScopeKind::FunctionArgs);
        let (name, span) = self.expect_identifier()?;
        let r = self.declare_symbol(SymbolKind::Hoisted, &name, span);
        let args = vec![Arg {
            binding: Binding::Ident(EIdent { name, ref_: r }),
            default: None,
            is_rest: false,
            decorators: Vec::new(),
        }];
        self.expect(TokenKind::EqualsGreaterThan)?;
        let body = self.parse_arrow_body(is_async)?;
        self.pop_scope();
        Ok(Expr::new(
            start,
            EData::Arrow(Box::new(EArrow {
                args,
                body,
                is_async,
            })),
        ))
    }

    fn parse_arrow_with_paren_args(&mut self, start: Span, is_async: bool) -> PResult<Expr> {
        self.push_scope(ScopeKind::FunctionArgs);
        self.expect(TokenKind::OpenParen)?;
        let args = self.parse_args()?;
        self.ts_skip_type_annotation()?;
        self.expect(TokenKind::EqualsGreaterThan)?;
        let body = self.parse_arrow_body(is_async)?;
        self.pop_scope();
        Ok(Expr::new(
            start,
            EData::Arrow(Box::new(EArrow {
                args,
                body,
                is_async,
            })),
        ))
    }

    fn parse_arrow_body(&mut self, is_async: bool) -> PResult<ArrowBody> {
        // Arrows do not rebind `arguments`, so no Arguments symbol here
        let old_async = std::mem::replace(&mut self.fn_is_async, is_async);
        let old_gen = std::mem::replace(&mut self.fn_is_generator, false);
        self.fn_depth += 1;
        let body = if self.eat(TokenKind::OpenBrace) {
            self.push_scope(ScopeKind::FunctionBody);
            let stmts = self.parse_block_body()?;
            self.pop_scope();
            ArrowBody::Stmts(stmts)
        } else {
            ArrowBody::Expr(Box::new(self.parse_assign_expr()?))
        };
        self.fn_depth -= 1;
        self.fn_is_async = old_async;
        self.fn_is_generator = old_gen;
        Ok(body)
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub(crate) fn parse_class_rest(&mut self, name: Option<EIdent>) -> PResult<Class> {
        self.ts_skip_type_parameters()?;
        let extends = if self.eat(TokenKind::Extends) {
            let e = self.parse_suffix_expr()?;
            self.ts_skip_type_args_if_present()?;
            Some(Box::new(e))
        } else {
            None
        };
        if self.is_typescript && self.lexer.is_contextual_keyword("implements") {
            self.lexer.next();
            self.ts_skip_type()?;
            while self.eat(TokenKind::Comma) {
                self.ts_skip_type()?;
            }
        }
        self.expect(TokenKind::OpenBrace)?;
        self.push_scope(ScopeKind::ClassBody);

        let mut properties = Vec::new();
        while !self.eat(TokenKind::CloseBrace) {
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            if self.lexer.token == TokenKind::EndOfFile {
                return Err(self.syntax_error(self.span(), "Expected \"}\" but found end of file"));
            }
            properties.push(self.parse_class_member()?);
        }
        self.pop_scope();
        Ok(Class {
            name,
            extends,
            properties,
            decorators: Vec::new(),
        })
    }

    fn parse_class_member(&mut self) -> PResult<ClassProperty> {
        let start = self.span();
        let decorators = if self.lexer.token == TokenKind::At {
            self.parse_decorators()?
        } else {
            Vec::new()
        };

        let mut is_static = false;
        let mut kind = ClassPropertyKind::Method;
        let mut is_async = false;
        let mut is_generator = false;
        let mut is_accessor = false;
        let mut saw_field_kind = false;

        loop {
            if self.lexer.token == TokenKind::Asterisk {
                self.lexer.next();
                is_generator = true;
                continue;
            }
            let word = if self.lexer.token == TokenKind::Identifier {
                self.lexer.raw().to_string()
            } else {
                String::new()
            };
            let is_candidate = matches!(
                word.as_str(),
                "static" | "get" | "set" | "async" | "accessor"
            ) || (self.is_typescript
                && matches!(
                    word.as_str(),
                    "public" | "private" | "protected" | "readonly" | "abstract"
                        | "declare" | "override"
                ));
            if !is_candidate || is_generator && word != "async" {
                break;
            }
            let mut probe = self.lexer.clone();
            probe.next();
            let is_modifier = !matches!(
                probe.token,
                TokenKind::OpenParen
                    | TokenKind::Equals
                    | TokenKind::Semicolon
                    | TokenKind::CloseBrace
                    | TokenKind::Colon
                    | TokenKind::Question
                    | TokenKind::Exclamation
                    | TokenKind::LessThan
            ) && !probe.has_newline_before;
            if !is_modifier {
                break;
            }
            self.lexer.next();
            match word.as_str() {
                "static" => {
                    is_static = true;
                    // `static { ... }` block
                    if self.lexer.token == TokenKind::OpenBrace {
                        self.lexer.next();
                        self.push_scope(ScopeKind::ClassStaticInit);
                        let block = self.parse_block_body()?;
                        self.pop_scope();
                        return Ok(ClassProperty {
                            kind: ClassPropertyKind::StaticBlock,
                            is_static: true,
                            is_computed: false,
                            key: Expr::synth(EData::Undefined),
                            func: None,
                            initializer: None,
                            block,
                            decorators,
                            span: start,
                        });
                    }
                }
                "get" => {
                    kind = ClassPropertyKind::Get;
                    saw_field_kind = true;
                }
                "set" => {
                    kind = ClassPropertyKind::Set;
                    saw_field_kind = true;
                }
                "async" => is_async = true,
                "accessor" => is_accessor = true,
                _ => {} // TS modifiers are erased
            }
        }

        let (key, is_computed) = self.parse_property_key()?;

        // Declare private member symbols in the class body scope
        let key = if let EData::PrivateIdent(private) = &key.data {
            let symbol_kind = private_symbol_kind(kind, is_static, self.lexer.token);
            let r = self.declare_symbol(symbol_kind, &private.name, key.span);
            Expr::new(
                key.span,
                EData::PrivateIdent(EPrivateIdent {
                    name: private.name.clone(),
                    ref_: r,
                }),
            )
        } else {
            key
        };

        // TS optional/definite-assignment markers
        if self.is_typescript {
            self.eat(TokenKind::Question);
            self.eat(TokenKind::Exclamation);
        }

        if !saw_field_kind && !is_async && !is_generator {
            // Field or method, decided by the next token
            if self.lexer.token != TokenKind::OpenParen
                && self.lexer.token != TokenKind::LessThan
            {
                self.ts_skip_type_annotation()?;
                let initializer = if self.eat(TokenKind::Equals) {
                    Some(self.parse_assign_expr()?)
                } else {
                    None
                };
                self.semicolon()?;
                return Ok(ClassProperty {
                    kind: if is_accessor {
                        ClassPropertyKind::Accessor
                    } else {
                        ClassPropertyKind::Field
                    },
                    is_static,
                    is_computed,
                    key,
                    func: None,
                    initializer,
                    block: Vec::new(),
                    decorators,
                    span: start,
                });
            }
        }

        let func = self.parse_function_rest(None, is_async, is_generator)?;
        Ok(ClassProperty {
            kind,
            is_static,
            is_computed,
            key,
            func: Some(func),
            initializer: None,
            block: Vec::new(),
            decorators,
            span: start,
        })
    }
}

fn chain_state(in_chain: bool) -> OptionalChain {
    if in_chain {
        OptionalChain::Continue
    } else {
        OptionalChain::None
    }
}

fn private_symbol_kind(kind: ClassPropertyKind, is_static: bool, next: TokenKind) -> SymbolKind {
    let is_method = matches!(next, TokenKind::OpenParen | TokenKind::LessThan);
    match (kind, is_static) {
        (ClassPropertyKind::Get, false) => SymbolKind::PrivateGet,
        (ClassPropertyKind::Set, false) => SymbolKind::PrivateSet,
        (ClassPropertyKind::Get, true) => SymbolKind::PrivateStaticGet,
        (ClassPropertyKind::Set, true) => SymbolKind::PrivateStaticSet,
        (_, false) if is_method => SymbolKind::PrivateMethod,
        (_, true) if is_method => SymbolKind::PrivateStaticMethod,
        (_, false) => SymbolKind::PrivateField,
        (_, true) => SymbolKind::PrivateStaticField,
    }
}

/// Skip a balanced `(...)` group on a cloned lexer; `lexer` must be at the
/// open paren. Returns false when the group never closes.
fn scan_balanced(lexer: &mut kestrel_lexer::Lexer) -> bool {
    debug_assert_eq!(lexer.token, TokenKind::OpenParen);
    let mut depth = 0u32;
    loop {
        match lexer.token {
            TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace => depth += 1,
            TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    lexer.next();
                    return true;
                }
            }
            TokenKind::EndOfFile => return false,
            _ => {}
        }
        lexer.next();
    }
}
