//! JSX parsing.
//!
//! Elements are desugared during parsing into calls of the configured
//! factory (`React.createElement` unless overridden): lowercase tag names
//! become string literals, capitalized names become identifier references
//! whose symbols must keep a capital first letter through renaming.

use super::{Parser, PResult};
use crate::ast::*;
use crate::symbols::Ref;
use kestrel_common::Span;
use kestrel_lexer::TokenKind;

impl<'a> Parser<'a> {
    /// Parse one element; the current token is `<`.
    pub(crate) fn parse_jsx_element(&mut self) -> PResult<Expr> {
        let start = self.span();
        self.lexer.next_inside_jsx_element(); // consume `<`

        // Fragment `<>...</>`
        if self.lexer.token == TokenKind::GreaterThan {
            let children = self.parse_jsx_children(None)?;
            let fragment = self.entity_chain(&self.options.jsx.fragment_chain());
            return Ok(self.jsx_factory_call(start, fragment, None, children));
        }

        let (tag_name, tag_expr) = self.parse_jsx_tag()?;

        // Attributes
        let mut properties: Vec<Property> = Vec::new();
        loop {
            match self.lexer.token {
                TokenKind::Slash | TokenKind::GreaterThan => break,
                TokenKind::OpenBrace => {
                    // `{...spread}`
                    self.lexer.next();
                    self.expect(TokenKind::DotDotDot)?;
                    let value = self.parse_assign_expr()?;
                    if self.lexer.token != TokenKind::CloseBrace {
                        return Err(self.unexpected());
                    }
                    self.lexer.next_inside_jsx_element();
                    properties.push(Property {
                        kind: PropertyKind::Spread,
                        key: Expr::synth(EData::Undefined),
                        value: Some(value),
                        computed: false,
                        shorthand: false,
                        method: false,
                    });
                }
                _ if self.lexer.token.is_identifier_or_keyword() => {
                    let name = self.lexer.raw().to_string();
                    let name_span = self.span();
                    self.lexer.next_inside_jsx_element();
                    let value = if self.lexer.token == TokenKind::Equals {
                        self.lexer.next_inside_jsx_element();
                        match self.lexer.token {
                            TokenKind::StringLiteral => {
                                let v = self.lexer.text();
                                let span = self.span();
                                self.lexer.next_inside_jsx_element();
                                Expr::new(span, EData::String(v))
                            }
                            TokenKind::OpenBrace => {
                                self.lexer.next();
                                let v = self.parse_assign_expr()?;
                                if self.lexer.token != TokenKind::CloseBrace {
                                    return Err(self.unexpected());
                                }
                                self.lexer.next_inside_jsx_element();
                                v
                            }
                            _ => return Err(self.unexpected()),
                        }
                    } else {
                        // Bare attribute means `true`
                        Expr::new(name_span, EData::Boolean(true))
                    };
                    properties.push(Property {
                        kind: PropertyKind::Normal,
                        key: Expr::new(name_span, EData::String(name)),
                        value: Some(value),
                        computed: false,
                        shorthand: false,
                        method: false,
                    });
                }
                _ => return Err(self.unexpected()),
            }
        }

        let props = if properties.is_empty() {
            None
        } else {
            Some(Expr::synth(EData::Object(properties)))
        };

        // Self-closing. The element ends ON its final `>`; the caller
        // advances past it (children scanning must not re-lex what follows).
        if self.lexer.token == TokenKind::Slash {
            self.lexer.next_no_regex();
            if self.lexer.token != TokenKind::GreaterThan {
                return Err(self.unexpected());
            }
            return Ok(self.jsx_factory_call(start, tag_expr, props, Vec::new()));
        }

        let children = self.parse_jsx_children(Some(&tag_name))?;
        Ok(self.jsx_factory_call(start, tag_expr, props, children))
    }

    /// Children between `>` and the matching `</tag>`. The current token is
    /// the opening tag's `>`.
    fn parse_jsx_children(&mut self, tag: Option<&str>) -> PResult<Vec<Expr>> {
        let mut children = Vec::new();
        loop {
            // Everything until `<` or `{` is text
            let text_span = self.lexer.scan_jsx_text();
            if let Some(text) = jsx_text_value(self.source.text_for(text_span)) {
                children.push(Expr::new(text_span, EData::String(text)));
            }
            match self.lexer.token {
                TokenKind::OpenBrace => {
                    self.lexer.next();
                    if self.lexer.token == TokenKind::CloseBrace {
                        // `{}` is an empty child
                    } else {
                        children.push(self.parse_assign_expr()?);
                    }
                    if self.lexer.token != TokenKind::CloseBrace {
                        return Err(self.unexpected());
                    }
                    // Continue scanning text right after the brace
                }
                TokenKind::LessThan => {
                    // Either a closing tag or a nested element
                    let mut probe = self.lexer.clone();
                    probe.next_no_regex();
                    if probe.token == TokenKind::Slash {
                        self.lexer.next_no_regex(); // <
                        self.lexer.next_inside_jsx_element(); // /
                        match tag {
                            None => {
                                // Fragment close `</>`
                                if self.lexer.token != TokenKind::GreaterThan {
                                    return Err(self.unexpected());
                                }
                            }
                            Some(expected) => {
                                let (closing, _) = self.parse_jsx_tag_name()?;
                                if closing != expected {
                                    self.log.add_error(
                                        self.source.index.0,
                                        self.span(),
                                        format!(
                                            "Expected closing tag \"</{expected}>\" but found \"</{closing}>\""
                                        ),
                                    );
                                }
                                if self.lexer.token != TokenKind::GreaterThan {
                                    return Err(self.unexpected());
                                }
                            }
                        }
                        // Stay on the closing `>`; the caller advances
                        return Ok(children);
                    }
                    children.push(self.parse_jsx_element()?);
                    // After a nested element the lexer is in normal mode;
                    // loop back to scan the following text
                    continue;
                }
                TokenKind::EndOfFile => {
                    return Err(self.syntax_error(
                        self.span(),
                        match tag {
                            Some(t) => format!("Unexpected end of file before closing \"</{t}>\""),
                            None => "Unexpected end of file inside JSX fragment".to_string(),
                        },
                    ));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    /// The tag of an element: `div`, `my-tag`, `Component`, `A.B.C`.
    fn parse_jsx_tag(&mut self) -> PResult<(String, Expr)> {
        let (name, span) = self.parse_jsx_tag_name()?;
        // Dotted member tags: `<A.B.C />`
        if name.contains('.') {
            let mut segments = name.split('.');
            let head = segments.next().unwrap_or_default().to_string();
            self.note_jsx_component(&head);
            let mut expr = Expr::new(
                span,
                EData::Ident(EIdent {
                    name: head,
                    ref_: Ref::INVALID,
                }),
            );
            for segment in segments {
                expr = Expr::dot(expr, segment);
            }
            return Ok((name, expr));
        }
        let is_component = name.chars().next().is_some_and(char::is_uppercase);
        let expr = if is_component {
            self.note_jsx_component(&name);
            Expr::new(
                span,
                EData::Ident(EIdent {
                    name: name.clone(),
                    ref_: Ref::INVALID,
                }),
            )
        } else {
            // Lowercase and dashed tags are intrinsic: a string
            Expr::new(span, EData::String(name.clone()))
        };
        Ok((name, expr))
    }

    /// A tag name including dots and dashes. Leaves the lexer on the token
    /// after the name.
    fn parse_jsx_tag_name(&mut self) -> PResult<(String, Span)> {
        if !self.lexer.token.is_identifier_or_keyword() {
            return Err(self.unexpected());
        }
        let mut name = self.lexer.raw().to_string();
        let mut span = self.span();
        self.lexer.next_inside_jsx_element();
        while self.lexer.token == TokenKind::Dot {
            self.lexer.next_inside_jsx_element();
            if !self.lexer.token.is_identifier_or_keyword() {
                return Err(self.unexpected());
            }
            name.push('.');
            name.push_str(self.lexer.raw());
            span = span.merge(self.span());
            self.lexer.next_inside_jsx_element();
        }
        Ok((name, span))
    }

    fn note_jsx_component(&mut self, name: &str) {
        if !self.jsx_component_names.iter().any(|n| n == name) {
            self.jsx_component_names.push(name.to_string());
        }
    }

    /// Build `factory(tag, props-or-null, ...children)`.
    fn jsx_factory_call(
        &mut self,
        span: Span,
        tag: Expr,
        props: Option<Expr>,
        children: Vec<Expr>,
    ) -> Expr {
        let factory = self.entity_chain(&self.options.jsx.factory_chain());
        let mut args = vec![tag];
        if props.is_some() || !children.is_empty() {
            args.push(props.unwrap_or_else(|| Expr::synth(EData::Null)));
        }
        args.extend(children);
        let mut call = Expr::call(factory, args);
        call.span = span;
        call
    }

    /// Build an identifier or dotted chain expression from path segments.
    pub(crate) fn entity_chain(&self, segments: &[String]) -> Expr {
        let mut iter = segments.iter();
        let head = iter.next().cloned().unwrap_or_default();
        let mut expr = Expr::synth(EData::Ident(EIdent {
            name: head,
            ref_: Ref::INVALID,
        }));
        for segment in iter {
            expr = Expr::dot(expr, segment.clone());
        }
        expr
    }
}

/// JSX text handling: a chunk that is only whitespace containing a newline
/// disappears; a multi-line chunk collapses to its trimmed lines joined by
/// single spaces; single-line text is kept as written.
fn jsx_text_value(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if !raw.contains('\n') {
        return Some(raw.to_string());
    }
    if raw.trim().is_empty() {
        return None;
    }
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
