//! The CSS parser.
//!
//! Consumes the flat token vector from the CSS lexer and produces the rule
//! list plus import records. Recovery leans on the lexer's Bad* tokens:
//! a bad string or bad url invalidates its enclosing declaration, never the
//! stylesheet.

use crate::css_ast::*;
use crate::import_record::{ImportKind, ImportRecord};
use crate::symbols::{Ref, Symbol, SymbolKind};
use indexmap::IndexMap;
use kestrel_common::{Log, Source, Span};
use kestrel_lexer::css::{tokenize, CssToken, CssTokenKind};

/// Files with local class scope follow the CSS modules convention.
fn has_local_scope(path: &str) -> bool {
    path.ends_with(".module.css")
}

pub fn parse_css(source: &Source, log: &Log) -> CssAst {
    let tokens = tokenize(&source.contents, source.index.0, log);
    let mut parser = CssParser {
        source,
        log,
        tokens,
        pos: 0,
        symbols: Vec::new(),
        import_records: Vec::new(),
        exports: IndexMap::new(),
        local: has_local_scope(&source.key_path),
    };
    let rules = parser.parse_rules(true);
    CssAst {
        rules,
        symbols: parser.symbols,
        import_records: parser.import_records,
        exports: parser.exports,
        has_local_scope: parser.local,
    }
}

struct CssParser<'a> {
    source: &'a Source,
    log: &'a Log,
    tokens: Vec<CssToken>,
    pos: usize,
    symbols: Vec<Symbol>,
    import_records: Vec<ImportRecord>,
    exports: IndexMap<String, CssExport>,
    local: bool,
}

impl<'a> CssParser<'a> {
    fn peek(&self) -> &CssToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> CssToken {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn skip_ws(&mut self) {
        while self.peek().kind == CssTokenKind::Whitespace {
            self.bump();
        }
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == CssTokenKind::EndOfFile
    }

    fn text_of(&self, t: &CssToken) -> String {
        t.text(&self.source.contents)
    }

    fn parse_rules(&mut self, top_level: bool) -> Vec<CssRule> {
        let mut rules = Vec::new();
        loop {
            self.skip_ws();
            match self.peek().kind {
                CssTokenKind::EndOfFile => break,
                CssTokenKind::CloseBrace if !top_level => break,
                CssTokenKind::Cdo | CssTokenKind::Cdc => {
                    self.bump();
                }
                CssTokenKind::AtKeyword => {
                    if let Some(rule) = self.parse_at_rule() {
                        rules.push(rule);
                    }
                }
                _ => {
                    if let Some(rule) = self.parse_style_rule() {
                        rules.push(rule);
                    }
                }
            }
        }
        rules
    }

    fn parse_at_rule(&mut self) -> Option<CssRule> {
        let at = self.bump();
        let name = self.text_of(&at);
        let start = at.span;

        if name.eq_ignore_ascii_case("import") {
            self.skip_ws();
            let target = self.bump();
            let path = match target.kind {
                CssTokenKind::String | CssTokenKind::Url => self.text_of(&target),
                CssTokenKind::Function if self.text_of(&target).eq_ignore_ascii_case("url") => {
                    self.skip_ws();
                    let inner = self.bump();
                    let path = self.text_of(&inner);
                    self.skip_ws();
                    if self.peek().kind == CssTokenKind::CloseParen {
                        self.bump();
                    }
                    path
                }
                _ => {
                    self.log.add_error(
                        self.source.index.0,
                        target.span,
                        "Expected URL token or string after \"@import\"",
                    );
                    self.recover_to_semicolon();
                    return None;
                }
            };
            // Media query conditions after the path stay with the record
            let mut end = target.span;
            while !matches!(
                self.peek().kind,
                CssTokenKind::Semicolon | CssTokenKind::EndOfFile | CssTokenKind::OpenBrace
            ) {
                end = self.bump().span;
            }
            if self.peek().kind == CssTokenKind::Semicolon {
                self.bump();
            }
            let record_index = self.add_record(ImportKind::AtImport, path, target.span);
            return Some(CssRule::AtImport {
                record_index,
                span: start.merge(end),
            });
        }

        // Generic at-rule: prelude up to `{` or `;`
        let prelude_start = self.peek().span;
        let mut prelude_end = prelude_start;
        while !matches!(
            self.peek().kind,
            CssTokenKind::OpenBrace | CssTokenKind::Semicolon | CssTokenKind::EndOfFile
        ) {
            prelude_end = self.bump().span;
        }
        let prelude = Span::new(prelude_start.start, prelude_end.end.max(prelude_start.start));

        let block = if self.peek().kind == CssTokenKind::OpenBrace {
            self.bump();
            // Conditional group rules nest full rules; everything else is
            // declarations re-emitted verbatim, which parse_rules also
            // round-trips via style-rule recovery
            let nested = if matches!(
                name.to_ascii_lowercase().as_str(),
                "media" | "supports" | "layer" | "container"
            ) {
                self.parse_rules(false)
            } else {
                self.parse_opaque_block()
            };
            if self.peek().kind == CssTokenKind::CloseBrace {
                self.bump();
            }
            Some(nested)
        } else {
            if self.peek().kind == CssTokenKind::Semicolon {
                self.bump();
            }
            None
        };

        Some(CssRule::At {
            name,
            prelude,
            block,
            span: start.merge(self.previous_span()),
        })
    }

    /// A block we do not interpret: keep it as a single opaque style rule
    /// spanning the braces so re-printing is byte-faithful.
    fn parse_opaque_block(&mut self) -> Vec<CssRule> {
        let start = self.peek().span;
        let mut depth = 1u32;
        let mut end = start;
        while !self.at_eof() {
            match self.peek().kind {
                CssTokenKind::OpenBrace => depth += 1,
                CssTokenKind::CloseBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            end = self.bump().span;
        }
        vec![CssRule::Style {
            prelude: Span::new(start.start, start.start),
            declarations: vec![CssDeclaration {
                name: String::new(),
                value: Span::new(start.start, end.end),
                important: false,
                url_records: Vec::new(),
                composes: None,
            }],
            span: Span::new(start.start, end.end),
        }]
    }

    fn previous_span(&self) -> Span {
        if self.pos == 0 {
            Span::at(0)
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn parse_style_rule(&mut self) -> Option<CssRule> {
        // Selector prelude up to `{`
        let prelude_start = self.peek().span;
        let mut prelude_end = prelude_start;
        let mut class_names: Vec<String> = Vec::new();
        let mut prev_was_dot = false;
        while !matches!(
            self.peek().kind,
            CssTokenKind::OpenBrace | CssTokenKind::EndOfFile
        ) {
            let t = self.bump();
            if t.kind == CssTokenKind::Delim && t.delim == '.' {
                prev_was_dot = true;
            } else {
                if prev_was_dot && t.kind == CssTokenKind::Ident {
                    class_names.push(self.text_of(&t));
                }
                prev_was_dot = false;
            }
            prelude_end = t.span;
        }
        if self.at_eof() {
            self.log.add_error(
                self.source.index.0,
                prelude_start,
                "Expected \"{\" for a style rule",
            );
            return None;
        }
        self.bump(); // {

        // Class selectors become symbols (local when CSS modules)
        for class in &class_names {
            self.declare_class(class);
        }

        let declarations = self.parse_declarations(&class_names);
        if self.peek().kind == CssTokenKind::CloseBrace {
            self.bump();
        }
        Some(CssRule::Style {
            prelude: Span::new(prelude_start.start, prelude_end.end),
            declarations,
            span: Span::new(prelude_start.start, self.previous_span().end),
        })
    }

    fn declare_class(&mut self, name: &str) -> Ref {
        if let Some(export) = self.exports.get(name) {
            return export.ref_;
        }
        let kind = if self.local {
            SymbolKind::LocalCss
        } else {
            SymbolKind::GlobalCss
        };
        self.symbols.push(Symbol::new(name, kind));
        let r = Ref {
            source: self.source.index.0,
            inner: (self.symbols.len() - 1) as u32,
        };
        if self.local {
            self.exports.insert(
                name.to_string(),
                CssExport {
                    ref_: r,
                    composes_local: Vec::new(),
                    composes_from: Vec::new(),
                },
            );
        }
        r
    }

    fn parse_declarations(&mut self, rule_classes: &[String]) -> Vec<CssDeclaration> {
        let mut declarations = Vec::new();
        loop {
            self.skip_ws();
            match self.peek().kind {
                CssTokenKind::CloseBrace | CssTokenKind::EndOfFile => break,
                CssTokenKind::Semicolon => {
                    self.bump();
                }
                CssTokenKind::Ident => {
                    let name_token = self.bump();
                    let name = self.text_of(&name_token);
                    self.skip_ws();
                    if self.peek().kind != CssTokenKind::Colon {
                        // Not a declaration; skip to the next `;` or `}`
                        self.recover_to_semicolon();
                        continue;
                    }
                    self.bump(); // :
                    self.skip_ws();

                    if name.eq_ignore_ascii_case("composes") {
                        if let Some(declaration) =
                            self.parse_composes_declaration(rule_classes, name_token.span)
                        {
                            declarations.push(declaration);
                        }
                        continue;
                    }

                    let value_start = self.peek().span;
                    let mut value_end = value_start;
                    let mut url_records = Vec::new();
                    let mut important = false;
                    let mut bad_value = false;
                    while !matches!(
                        self.peek().kind,
                        CssTokenKind::Semicolon
                            | CssTokenKind::CloseBrace
                            | CssTokenKind::EndOfFile
                    ) {
                        let t = self.bump();
                        match t.kind {
                            CssTokenKind::Url => {
                                let path = self.text_of(&t);
                                let record =
                                    self.add_record(ImportKind::UrlToken, path, t.span);
                                url_records.push(record);
                            }
                            CssTokenKind::BadString | CssTokenKind::BadUrl => {
                                bad_value = true;
                            }
                            CssTokenKind::Delim if t.delim == '!' => {
                                // `!important`
                                self.skip_ws();
                                if self.peek().kind == CssTokenKind::Ident
                                    && self
                                        .text_of(self.peek())
                                        .eq_ignore_ascii_case("important")
                                {
                                    self.bump();
                                    important = true;
                                }
                            }
                            _ => {}
                        }
                        value_end = t.span;
                    }
                    if bad_value {
                        // Declaration dropped; recovery already positioned
                        // us at the terminator
                        continue;
                    }
                    declarations.push(CssDeclaration {
                        name,
                        value: Span::new(value_start.start, value_end.end),
                        important,
                        url_records,
                        composes: None,
                    });
                }
                _ => {
                    self.recover_to_semicolon();
                }
            }
        }
        declarations
    }

    fn parse_composes_declaration(
        &mut self,
        rule_classes: &[String],
        name_span: Span,
    ) -> Option<CssDeclaration> {
        if !self.local {
            self.log.add_warning(
                self.source.index.0,
                name_span,
                "\"composes\" only works inside a local-scope (CSS modules) file",
            );
        }
        let value_start = self.peek().span;
        let mut names: Vec<String> = Vec::new();
        let mut composes = Composes::default();
        let mut value_end = value_start;
        loop {
            self.skip_ws();
            match self.peek().kind {
                CssTokenKind::Semicolon | CssTokenKind::CloseBrace | CssTokenKind::EndOfFile => {
                    composes.local_names = names.clone();
                    break;
                }
                CssTokenKind::Ident => {
                    let t = self.bump();
                    let word = self.text_of(&t);
                    value_end = t.span;
                    if word == "from" {
                        // The names seen so far come from the given source
                        self.skip_ws();
                        let target = self.bump();
                        value_end = target.span;
                        match target.kind {
                            CssTokenKind::String => {
                                let path = self.text_of(&target);
                                let record = self.add_record(
                                    ImportKind::ComposesFrom,
                                    path,
                                    target.span,
                                );
                                for name in names.drain(..) {
                                    composes.from_records.push((name, record));
                                }
                            }
                            CssTokenKind::Ident
                                if self.text_of(&target) == "global" =>
                            {
                                // `composes: x from global` — names refer to
                                // global classes; keep them verbatim
                                composes.local_names.append(&mut names);
                            }
                            _ => {
                                self.log.add_error(
                                    self.source.index.0,
                                    target.span,
                                    "Expected source string after \"from\"",
                                );
                                names.clear();
                            }
                        }
                    } else {
                        names.push(word);
                    }
                }
                _ => {
                    let t = self.bump();
                    value_end = t.span;
                }
            }
        }
        if self.peek().kind == CssTokenKind::Semicolon {
            self.bump();
        }

        // Attach the composition to every class of the enclosing rule
        for class in rule_classes {
            if let Some(export) = self.exports.get_mut(class) {
                export
                    .composes_local
                    .extend(composes.local_names.iter().cloned());
                export
                    .composes_from
                    .extend(composes.from_records.iter().cloned());
            }
        }

        Some(CssDeclaration {
            name: "composes".to_string(),
            value: Span::new(value_start.start, value_end.end),
            important: false,
            url_records: Vec::new(),
            composes: Some(composes),
        })
    }

    fn recover_to_semicolon(&mut self) {
        let mut depth = 0u32;
        while !self.at_eof() {
            match self.peek().kind {
                CssTokenKind::OpenBrace | CssTokenKind::OpenParen
                | CssTokenKind::OpenBracket => depth += 1,
                CssTokenKind::CloseParen | CssTokenKind::CloseBracket => {
                    depth = depth.saturating_sub(1);
                }
                CssTokenKind::CloseBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                CssTokenKind::Semicolon if depth == 0 => {
                    self.bump();
                    return;
                }
                _ => {}
            }
            self.bump();
        }
    }

    fn add_record(&mut self, kind: ImportKind, path: String, span: Span) -> u32 {
        self.import_records
            .push(ImportRecord::new(path, span, kind));
        (self.import_records.len() - 1) as u32
    }
}

#[cfg(test)]
#[path = "../tests/css_parser_unit_tests.rs"]
mod tests;
