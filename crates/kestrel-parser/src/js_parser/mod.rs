//! The JavaScript/TypeScript/JSX parser.
//!
//! Single pass with one token of lookahead. The two ambiguities that need
//! more (arrow function vs parenthesized expression, TypeScript generic
//! call vs less-than) are resolved with a fast-path try-parse over a
//! snapshot of the lexer state.
//!
//! Parse errors unwind to [`parse`] through the [`ParseAbort`] sentinel;
//! the entry point converts the failure into a stub AST so the module
//! graph can keep going and report downstream diagnostics.

mod exprs;
mod jsx;
mod ts;

use crate::ast::*;
use crate::import_record::{ImportKind, ImportRecord, ImportRecordFlags};
use crate::part::Part;
use crate::scope::{ScopeId, ScopeKind, ScopeTree, StrictMode};
use crate::symbols::{Ref, Symbol, SymbolFlags, SymbolKind};
use indexmap::IndexMap;
use kestrel_common::{Loader, Log, Source, Span};
use kestrel_lexer::{Lexer, TokenKind};
use rustc_hash::FxHashMap;

/// The fast-unwind sentinel for fatal parse errors. The error message is
/// logged at the point of failure; this carries nothing.
#[derive(Debug, Clone, Copy)]
pub struct ParseAbort;

pub type PResult<T> = Result<T, ParseAbort>;

/// A configured identifier replacement, keyed by a dotted path.
#[derive(Debug, Clone)]
pub enum DefineExpr {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// An identifier or dotted entity-name chain.
    Chain(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct DefineValue {
    pub value: DefineExpr,
    /// `--drop`-style behavior: calls of this path become `undefined` and
    /// the arguments are discarded without evaluation.
    pub method_calls_must_be_replaced_with_undefined: bool,
}

#[derive(Debug, Clone, Default)]
pub struct JsxOptions {
    /// Defaults to `React.createElement`.
    pub factory: Vec<String>,
    /// Defaults to `React.Fragment`.
    pub fragment: Vec<String>,
}

impl JsxOptions {
    fn factory_chain(&self) -> Vec<String> {
        if self.factory.is_empty() {
            vec!["React".to_string(), "createElement".to_string()]
        } else {
            self.factory.clone()
        }
    }

    fn fragment_chain(&self) -> Vec<String> {
        if self.fragment.is_empty() {
            vec!["React".to_string(), "Fragment".to_string()]
        } else {
            self.fragment.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    pub loader: Loader,
    pub jsx: JsxOptions,
    /// Dotted path -> replacement.
    pub defines: FxHashMap<String, DefineValue>,
    /// Mirrors the `--alwaysStrict`-style TS option.
    pub ts_always_strict: bool,
    /// Keep original function/class names observable (`__name` helper).
    pub keep_names: bool,
}

/// Parse one JavaScript/TypeScript file into an AST bundle.
///
/// Never returns `Err`: a fatal parse error produces a stub AST with no
/// exports and the diagnostics in `log`.
pub fn parse(source: &Source, options: &ParserOptions, log: &Log) -> Ast {
    let mut parser = Parser::new(source, options, log);
    match parser.parse_module() {
        Ok(stmts) => parser.finish(stmts),
        Err(ParseAbort) => {
            // Stub: no exports, no parts; the error is already logged
            let mut ast = Ast::default();
            ast.symbols = std::mem::take(&mut parser.symbols);
            ast.import_records = Vec::new();
            ast
        }
    }
}

pub(crate) struct Parser<'a> {
    pub(crate) lexer: Lexer<'a>,
    pub(crate) log: &'a Log,
    pub(crate) source: &'a Source,
    pub(crate) options: &'a ParserOptions,

    pub(crate) symbols: Vec<Symbol>,
    pub(crate) scopes: ScopeTree,
    pub(crate) current_scope: ScopeId,
    pub(crate) import_records: Vec<ImportRecord>,
    pub(crate) named_imports: IndexMap<Ref, NamedImport>,
    pub(crate) named_exports: IndexMap<String, NamedExport>,
    pub(crate) export_star_import_records: Vec<u32>,

    pub(crate) is_typescript: bool,
    pub(crate) no_ambiguous_less_than: bool,
    pub(crate) jsx_enabled: bool,

    pub(crate) has_esm_syntax: bool,
    pub(crate) top_level_await_span: Option<Span>,

    /// Function context flags.
    pub(crate) fn_is_async: bool,
    pub(crate) fn_is_generator: bool,
    /// `in` operator suppressed inside a bare for-initializer.
    pub(crate) allow_in: bool,
    /// Function nesting depth; 0 = module top level.
    pub(crate) fn_depth: u32,
    /// Nesting depth of enclosing `try` blocks; imports resolved inside
    /// one can handle their own failures.
    pub(crate) try_body_depth: u32,

    pub(crate) exports_ref: Ref,
    pub(crate) module_ref: Ref,
    pub(crate) wrapper_ref: Ref,

    /// Names used as capitalized JSX tags; their symbols must keep a
    /// capital first letter through renaming.
    pub(crate) jsx_component_names: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a Source, options: &'a ParserOptions, log: &'a Log) -> Parser<'a> {
        let loader = options.loader;
        let is_typescript = loader.is_typescript();
        let module_strict = if is_typescript && options.ts_always_strict {
            StrictMode::ImplicitStrictTsAlwaysStrict
        } else {
            StrictMode::Sloppy
        };
        let mut parser = Parser {
            lexer: Lexer::new(&source.contents, source.index.0, log),
            log,
            source,
            options,
            symbols: Vec::new(),
            scopes: ScopeTree::new(module_strict),
            current_scope: ScopeId::ROOT,
            import_records: Vec::new(),
            named_imports: IndexMap::new(),
            named_exports: IndexMap::new(),
            export_star_import_records: Vec::new(),
            is_typescript,
            no_ambiguous_less_than: loader == Loader::TsNoAmbiguousLessThan,
            jsx_enabled: loader.is_jsx(),
            has_esm_syntax: false,
            top_level_await_span: None,
            fn_is_async: false,
            fn_is_generator: false,
            allow_in: true,
            fn_depth: 0,
            try_body_depth: 0,
            exports_ref: Ref::INVALID,
            module_ref: Ref::INVALID,
            wrapper_ref: Ref::INVALID,
            jsx_component_names: Vec::new(),
        };
        // Module-shape symbols exist up front so CommonJS detection can
        // bind free `exports` / `module` to them
        parser.exports_ref = parser.new_symbol(SymbolKind::Hoisted, "exports");
        parser.module_ref = parser.new_symbol(SymbolKind::Hoisted, "module");
        let stem = file_stem(&source.pretty_path);
        parser.wrapper_ref =
            parser.new_symbol(SymbolKind::Other, format!("init_{}", sanitize_ident(&stem)));
        parser
    }

    // =========================================================================
    // Symbols and scopes
    // =========================================================================

    pub(crate) fn new_symbol(&mut self, kind: SymbolKind, name: impl Into<String>) -> Ref {
        self.symbols.push(Symbol::new(name, kind));
        Ref {
            source: self.source.index.0,
            inner: (self.symbols.len() - 1) as u32,
        }
    }

    pub(crate) fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.push(self.current_scope, kind);
        self.current_scope = id;
        id
    }

    pub(crate) fn pop_scope(&mut self) {
        let parent = self.scopes.get(self.current_scope).parent;
        self.current_scope = parent.unwrap_or(ScopeId::ROOT);
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.scopes.get(self.current_scope).strict_mode.is_strict()
    }

    /// Declare a name in the appropriate scope, applying hoisting and the
    /// redeclaration rules.
    pub(crate) fn declare_symbol(
        &mut self,
        kind: SymbolKind,
        name: &str,
        span: Span,
    ) -> Ref {
        let target_scope = if kind.is_hoisted() {
            self.hoist_with_checks(name, span)
        } else {
            self.current_scope
        };

        if let Some(&existing) = self.scopes.get(target_scope).members.get(name) {
            let existing_kind = self.symbols[existing.inner as usize].kind;
            // A private getter and setter with the same name share a symbol
            if let Some(pair) = private_get_set_pair(existing_kind, kind) {
                self.symbols[existing.inner as usize].kind = pair;
                return existing;
            }
            let both_hoisted = kind.is_hoisted() && existing_kind.is_hoisted();
            let catch_var = kind == SymbolKind::Hoisted
                && existing_kind == SymbolKind::CatchIdentifier;
            if both_hoisted || catch_var {
                // `var x; var x` merges; a later function declaration
                // overwrites an earlier one
                if kind == SymbolKind::HoistedFunction
                    && existing_kind == SymbolKind::HoistedFunction
                {
                    self.symbols[existing.inner as usize]
                        .flags
                        .insert(SymbolFlags::REMOVE_OVERWRITTEN_FUNCTION_DECLARATION);
                }
                return existing;
            }
            self.log.add_error(
                self.source.index.0,
                span,
                format!("The symbol \"{name}\" has already been declared"),
            );
            return existing;
        }

        let r = self.new_symbol(kind, name);
        self.scopes
            .get_mut(target_scope)
            .members
            .insert(name.to_string(), r);
        r
    }

    /// Walk up to the hoist target, checking for conflicting lexical names
    /// on the way. `catch (e) { var e }` is the documented special case
    /// that is allowed.
    fn hoist_with_checks(&mut self, name: &str, span: Span) -> ScopeId {
        let mut scope = self.current_scope;
        loop {
            let s = self.scopes.get(scope);
            if s.kind.stops_hoisting() {
                return scope;
            }
            if let Some(&existing) = s.members.get(name) {
                let existing_kind = self.symbols[existing.inner as usize].kind;
                match existing_kind {
                    SymbolKind::CatchIdentifier | SymbolKind::Hoisted
                    | SymbolKind::HoistedFunction => {}
                    _ => {
                        self.log.add_error(
                            self.source.index.0,
                            span,
                            format!("The symbol \"{name}\" has already been declared"),
                        );
                    }
                }
            }
            match s.parent {
                Some(parent) => scope = parent,
                None => return scope,
            }
        }
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    pub(crate) fn span(&self) -> Span {
        self.lexer.range()
    }

    pub(crate) fn syntax_error(&mut self, span: Span, text: impl Into<String>) -> ParseAbort {
        self.log.add_error(self.source.index.0, span, text);
        ParseAbort
    }

    pub(crate) fn unexpected(&mut self) -> ParseAbort {
        let raw = if self.lexer.token == TokenKind::EndOfFile {
            "end of file".to_string()
        } else {
            format!("\"{}\"", self.lexer.raw())
        };
        self.syntax_error(self.span(), format!("Unexpected {raw}"))
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> PResult<()> {
        if self.lexer.token != kind {
            return Err(self.unexpected());
        }
        self.lexer.next();
        Ok(())
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.lexer.token == kind {
            self.lexer.next();
            true
        } else {
            false
        }
    }

    /// Automatic semicolon insertion.
    pub(crate) fn semicolon(&mut self) -> PResult<()> {
        if self.eat(TokenKind::Semicolon) {
            return Ok(());
        }
        if self.lexer.has_newline_before
            || matches!(self.lexer.token, TokenKind::CloseBrace | TokenKind::EndOfFile)
        {
            return Ok(());
        }
        Err(self.unexpected())
    }

    pub(crate) fn expect_identifier(&mut self) -> PResult<(String, Span)> {
        if self.lexer.token != TokenKind::Identifier {
            return Err(self.unexpected());
        }
        let name = self.lexer.text();
        let span = self.span();
        self.lexer.next();
        Ok((name, span))
    }

    pub(crate) fn add_import_record(
        &mut self,
        kind: ImportKind,
        path: String,
        range: Span,
    ) -> u32 {
        self.import_records
            .push(ImportRecord::new(path, range, kind));
        (self.import_records.len() - 1) as u32
    }

    // =========================================================================
    // Module entry
    // =========================================================================

    fn parse_module(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        // Leading directives
        while self.lexer.token == TokenKind::StringLiteral {
            let snapshot = self.lexer.clone();
            let text = self.lexer.text();
            let span = self.span();
            self.lexer.next();
            let followed_by_operator = !matches!(
                self.lexer.token,
                TokenKind::Semicolon | TokenKind::CloseBrace | TokenKind::EndOfFile
            ) && !self.lexer.has_newline_before;
            if followed_by_operator {
                self.lexer = snapshot;
                break;
            }
            self.eat(TokenKind::Semicolon);
            if text == "use strict" {
                self.scopes.get_mut(ScopeId::ROOT).strict_mode = StrictMode::ExplicitUseStrict;
            }
            stmts.push(Stmt::new(span, SData::Directive(text)));
        }
        while self.lexer.token != TokenKind::EndOfFile {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn finish(mut self, stmts: Vec<Stmt>) -> Ast {
        let exports_kind = if self.has_esm_syntax {
            ExportsKind::Esm
        } else {
            ExportsKind::None // may become CommonJs in the binding pass
        };
        if self.has_esm_syntax {
            self.scopes.get_mut(ScopeId::ROOT).strict_mode = StrictMode::ImplicitStrictEsm;
        }

        let mut ast = Ast {
            parts: partition_into_parts(stmts),
            symbols: self.symbols,
            scopes: Some(self.scopes),
            import_records: self.import_records,
            named_imports: self.named_imports,
            named_exports: self.named_exports,
            export_star_import_records: self.export_star_import_records,
            top_level_symbol_to_parts: FxHashMap::default(),
            exports_kind,
            exports_ref: self.exports_ref,
            module_ref: self.module_ref,
            wrapper_ref: self.wrapper_ref,
            uses_exports_ref: false,
            uses_module_ref: false,
            top_level_await_span: self.top_level_await_span,
            hashbang: None,
            char_freq: None,
            jsx_component_names: self.jsx_component_names,
            runtime_imports: IndexMap::new(),
        };
        if ast.exports_kind == ExportsKind::Esm {
            if let Some(scopes) = &mut ast.scopes {
                scopes.get_mut(ScopeId::ROOT).strict_mode = StrictMode::ImplicitStrictEsm;
            }
        }
        ast
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn parse_stmt(&mut self) -> PResult<Stmt> {
        let start = self.span();
        match self.lexer.token {
            TokenKind::Semicolon => {
                self.lexer.next();
                Ok(Stmt::new(start, SData::Empty))
            }
            TokenKind::OpenBrace => {
                self.lexer.next();
                self.push_scope(ScopeKind::Block);
                let stmts = self.parse_block_body()?;
                self.pop_scope();
                Ok(Stmt::new(start.merge(self.span()), SData::Block(stmts)))
            }
            TokenKind::Debugger => {
                self.lexer.next();
                self.semicolon()?;
                Ok(Stmt::new(start, SData::Debugger))
            }
            TokenKind::Var => self.parse_local(LocalKind::Var, false),
            TokenKind::Const => {
                if self.is_typescript && self.peek_is_enum() {
                    self.lexer.next(); // const
                    return self.parse_enum(false);
                }
                self.parse_local(LocalKind::Const, false)
            }
            TokenKind::Identifier if self.lexer.is_contextual_keyword("let") => {
                if self.peek_starts_binding() {
                    self.parse_local(LocalKind::Let, false)
                } else {
                    self.parse_expr_stmt()
                }
            }
            TokenKind::Identifier if self.lexer.is_contextual_keyword("using") => {
                if self.peek_starts_using_binding() {
                    self.parse_local(LocalKind::Using, false)
                } else {
                    self.parse_expr_stmt()
                }
            }
            TokenKind::Await
                if self.source_allows_await() && self.peek_is_using_after_await() =>
            {
                self.lexer.next(); // await
                self.record_top_level_await(start);
                self.parse_local(LocalKind::AwaitUsing, false)
            }
            TokenKind::Function => self.parse_function_stmt(false),
            TokenKind::Class => self.parse_class_stmt(false, Vec::new()),
            TokenKind::At => {
                // Decorators before a (possibly exported) class
                let decorators = self.parse_decorators()?;
                match self.lexer.token {
                    TokenKind::Class => self.parse_class_stmt(false, decorators),
                    TokenKind::Export => {
                        self.lexer.next();
                        let is_default = self.eat(TokenKind::Default);
                        if self.lexer.token != TokenKind::Class {
                            return Err(self.unexpected());
                        }
                        if is_default {
                            self.parse_export_default_class(decorators)
                        } else {
                            self.parse_class_stmt(true, decorators)
                        }
                    }
                    _ => Err(self.unexpected()),
                }
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => {
                self.lexer.next();
                self.expect(TokenKind::OpenParen)?;
                let test = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::new(start, SData::While { test, body }))
            }
            TokenKind::Do => {
                self.lexer.next();
                let body = Box::new(self.parse_stmt()?);
                self.expect(TokenKind::While)?;
                self.expect(TokenKind::OpenParen)?;
                let test = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                self.eat(TokenKind::Semicolon);
                Ok(Stmt::new(start, SData::DoWhile { test, body }))
            }
            TokenKind::With => {
                self.lexer.next();
                if self.is_strict() {
                    self.log.add_error(
                        self.source.index.0,
                        start,
                        "With statements cannot be used in strict mode",
                    );
                }
                self.expect(TokenKind::OpenParen)?;
                let value = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                self.push_scope(ScopeKind::With);
                let body = Box::new(self.parse_stmt()?);
                self.pop_scope();
                Ok(Stmt::new(start, SData::With { value, body }))
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Return => {
                self.lexer.next();
                let value = if self.lexer.has_newline_before
                    || matches!(
                        self.lexer.token,
                        TokenKind::Semicolon | TokenKind::CloseBrace | TokenKind::EndOfFile
                    ) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.semicolon()?;
                Ok(Stmt::new(start, SData::Return(value)))
            }
            TokenKind::Throw => {
                self.lexer.next();
                if self.lexer.has_newline_before {
                    return Err(
                        self.syntax_error(start, "Unexpected newline after \"throw\"")
                    );
                }
                let value = self.parse_expr()?;
                self.semicolon()?;
                Ok(Stmt::new(start, SData::Throw(value)))
            }
            TokenKind::Break | TokenKind::Continue => {
                let is_break = self.lexer.token == TokenKind::Break;
                self.lexer.next();
                let label = if self.lexer.token == TokenKind::Identifier
                    && !self.lexer.has_newline_before
                {
                    let (name, _) = self.expect_identifier()?;
                    Some((name, Ref::INVALID))
                } else {
                    None
                };
                self.semicolon()?;
                Ok(Stmt::new(
                    start,
                    if is_break {
                        SData::Break(label)
                    } else {
                        SData::Continue(label)
                    },
                ))
            }
            TokenKind::Import => self.parse_import_stmt(),
            TokenKind::Export => self.parse_export_stmt(),
            TokenKind::Identifier
                if self.is_typescript && self.ts_stmt_starts_erased_declaration() =>
            {
                self.parse_ts_declaration(false)
            }
            TokenKind::Enum if self.is_typescript => {
                return self.parse_enum(false);
            }
            TokenKind::Identifier if self.lexer.is_contextual_keyword("async") => {
                // `async function` declaration, otherwise an expression
                let snapshot = self.lexer.clone();
                self.lexer.next();
                if self.lexer.token == TokenKind::Function && !self.lexer.has_newline_before {
                    self.parse_async_function_stmt(start, false)
                } else {
                    self.lexer = snapshot;
                    self.parse_expr_stmt()
                }
            }
            TokenKind::Identifier => {
                // Maybe a label: `name: stmt`
                let snapshot = self.lexer.clone();
                let name = self.lexer.text();
                self.lexer.next();
                if self.lexer.token == TokenKind::Colon {
                    self.lexer.next();
                    let label_scope = self.push_scope(ScopeKind::Label);
                    let label_ref = self.new_symbol(SymbolKind::Label, &name);
                    self.scopes.get_mut(label_scope).label_ref = label_ref;
                    let stmt = Box::new(self.parse_stmt()?);
                    self.pop_scope();
                    return Ok(Stmt::new(
                        start,
                        SData::Label {
                            name,
                            ref_: label_ref,
                            stmt,
                        },
                    ));
                }
                self.lexer = snapshot;
                self.parse_expr_stmt()
            }
            _ => self.parse_expr_stmt(),
        }
    }

    pub(crate) fn parse_block_body(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.eat(TokenKind::CloseBrace) {
            if self.lexer.token == TokenKind::EndOfFile {
                return Err(self.syntax_error(self.span(), "Expected \"}\" but found end of file"));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_expr_stmt(&mut self) -> PResult<Stmt> {
        let start = self.span();
        let expr = self.parse_expr()?;
        self.check_strict_mode_expr(&expr);
        self.semicolon()?;
        Ok(Stmt::new(start.merge(expr.span), SData::Expr(expr)))
    }

    /// Strict-mode restrictions that are statement-position checks.
    fn check_strict_mode_expr(&mut self, expr: &Expr) {
        if !self.is_strict() {
            return;
        }
        if let EData::Unary(u) = &expr.data {
            if u.op == UnOp::Delete {
                if let EData::Ident(_) = &u.value.data {
                    self.log.add_error(
                        self.source.index.0,
                        expr.span,
                        "Delete of a bare identifier cannot be used in strict mode",
                    );
                }
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.lexer.next();
        self.expect(TokenKind::OpenParen)?;
        let test = self.parse_expr()?;
        self.expect(TokenKind::CloseParen)?;
        let yes = Box::new(self.parse_stmt()?);
        let no = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::new(start, SData::If { test, yes, no }))
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.lexer.next();
        self.expect(TokenKind::OpenParen)?;
        let test = self.parse_expr()?;
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::OpenBrace)?;
        self.push_scope(ScopeKind::Block);
        let mut cases = Vec::new();
        let mut saw_default = false;
        while !self.eat(TokenKind::CloseBrace) {
            let value = match self.lexer.token {
                TokenKind::Case => {
                    self.lexer.next();
                    let v = self.parse_expr()?;
                    Some(v)
                }
                TokenKind::Default => {
                    if saw_default {
                        self.log.add_error(
                            self.source.index.0,
                            self.span(),
                            "Multiple default clauses are not allowed",
                        );
                    }
                    saw_default = true;
                    self.lexer.next();
                    None
                }
                _ => return Err(self.unexpected()),
            };
            self.expect(TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.lexer.token,
                TokenKind::Case | TokenKind::Default | TokenKind::CloseBrace
            ) {
                body.push(self.parse_stmt()?);
            }
            cases.push(SwitchCase { value, body });
        }
        self.pop_scope();
        Ok(Stmt::new(start, SData::Switch { test, cases }))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.lexer.next();
        self.expect(TokenKind::OpenBrace)?;
        self.push_scope(ScopeKind::Block);
        self.try_body_depth += 1;
        let block = self.parse_block_body();
        self.try_body_depth -= 1;
        let block = block?;
        self.pop_scope();

        let catch = if self.lexer.token == TokenKind::Catch {
            self.lexer.next();
            self.push_scope(ScopeKind::CatchBinding);
            let binding = if self.eat(TokenKind::OpenParen) {
                let b = self.parse_binding(SymbolKind::CatchIdentifier)?;
                self.ts_skip_type_annotation()?;
                self.expect(TokenKind::CloseParen)?;
                Some(b)
            } else {
                None
            };
            self.expect(TokenKind::OpenBrace)?;
            self.push_scope(ScopeKind::Block);
            let body = self.parse_block_body()?;
            self.pop_scope();
            self.pop_scope();
            Some(Catch { binding, body })
        } else {
            None
        };

        let finally = if self.lexer.token == TokenKind::Finally {
            self.lexer.next();
            self.expect(TokenKind::OpenBrace)?;
            self.push_scope(ScopeKind::Block);
            let body = self.parse_block_body()?;
            self.pop_scope();
            Some(body)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(self.syntax_error(start, "Expected \"catch\" or \"finally\""));
        }
        Ok(Stmt::new(
            start,
            SData::Try {
                block,
                catch,
                finally,
            },
        ))
    }

    // =========================================================================
    // for / for-in / for-of
    // =========================================================================

    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.lexer.next();
        let is_await = if self.lexer.token == TokenKind::Await {
            let await_span = self.span();
            self.lexer.next();
            if !self.fn_is_async && self.current_function_depth() > 0 {
                self.log.add_error(
                    self.source.index.0,
                    await_span,
                    "\"await\" can only be used inside an \"async\" function",
                );
            } else if self.current_function_depth() == 0 {
                self.record_top_level_await(await_span);
            }
            true
        } else {
            false
        };
        self.expect(TokenKind::OpenParen)?;
        self.push_scope(ScopeKind::Block);

        // Empty initializer
        if !is_await && self.eat(TokenKind::Semicolon) {
            let stmt = self.parse_for_rest(start, None)?;
            self.pop_scope();
            return Ok(stmt);
        }

        let init: Box<Stmt> = match self.lexer.token {
            TokenKind::Var => {
                self.allow_in = false;
                let s = self.parse_local_decls(LocalKind::Var)?;
                self.allow_in = true;
                Box::new(s)
            }
            TokenKind::Const => {
                self.allow_in = false;
                let s = self.parse_local_decls(LocalKind::Const)?;
                self.allow_in = true;
                Box::new(s)
            }
            TokenKind::Identifier
                if self.lexer.is_contextual_keyword("let") && self.peek_starts_binding() =>
            {
                self.allow_in = false;
                self.lexer.next();
                let s = self.parse_local_decls_after_keyword(LocalKind::Let)?;
                self.allow_in = true;
                Box::new(s)
            }
            TokenKind::Identifier
                if self.lexer.is_contextual_keyword("using")
                    && self.peek_starts_using_binding() =>
            {
                self.allow_in = false;
                self.lexer.next();
                let s = self.parse_local_decls_after_keyword(LocalKind::Using)?;
                self.allow_in = true;
                Box::new(s)
            }
            _ => {
                self.allow_in = false;
                let e = self.parse_expr()?;
                self.allow_in = true;
                Box::new(Stmt::new(e.span, SData::Expr(e)))
            }
        };

        // for-in / for-of
        if self.lexer.token == TokenKind::In {
            self.lexer.next();
            let value = self.parse_expr()?;
            self.expect(TokenKind::CloseParen)?;
            let body = Box::new(self.parse_stmt()?);
            self.pop_scope();
            return Ok(Stmt::new(start, SData::ForIn { init, value, body }));
        }
        if self.lexer.is_contextual_keyword("of") {
            self.lexer.next();
            let value = self.parse_assign_expr()?;
            self.expect(TokenKind::CloseParen)?;
            let body = Box::new(self.parse_stmt()?);
            self.pop_scope();
            return Ok(Stmt::new(
                start,
                SData::ForOf {
                    is_await,
                    init,
                    value,
                    body,
                },
            ));
        }
        if is_await {
            return Err(self.syntax_error(start, "Expected \"of\" after \"for await\""));
        }

        self.expect(TokenKind::Semicolon)?;
        let stmt = self.parse_for_rest(start, Some(init))?;
        self.pop_scope();
        Ok(stmt)
    }

    fn parse_for_rest(&mut self, start: Span, init: Option<Box<Stmt>>) -> PResult<Stmt> {
        let test = if self.lexer.token == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.lexer.token == TokenKind::CloseParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::CloseParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::new(
            start,
            SData::For {
                init,
                test,
                update,
                body,
            },
        ))
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_local(&mut self, kind: LocalKind, is_export: bool) -> PResult<Stmt> {
        let mut stmt = self.parse_local_decls(kind)?;
        self.semicolon()?;
        if let SData::Local(local) = &mut stmt.data {
            local.is_export = is_export;
            if is_export {
                let decls = local.decls.clone();
                for decl in &decls {
                    self.export_binding(&decl.binding);
                }
            }
        }
        Ok(stmt)
    }

    fn parse_local_decls(&mut self, kind: LocalKind) -> PResult<Stmt> {
        self.lexer.next(); // the keyword
        self.parse_local_decls_after_keyword(kind)
    }

    fn parse_local_decls_after_keyword(&mut self, kind: LocalKind) -> PResult<Stmt> {
        let start = self.span();
        let symbol_kind = match kind {
            LocalKind::Var => SymbolKind::Hoisted,
            LocalKind::Const => SymbolKind::Const,
            _ => SymbolKind::Other,
        };
        let mut decls = Vec::new();
        loop {
            let binding = self.parse_binding(symbol_kind)?;
            self.ts_skip_type_annotation()?;
            let value = if self.eat(TokenKind::Equals) {
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            if value.is_none() && kind == LocalKind::Const && !self.is_typescript {
                // `for (const x of ...)` has no initializer; statement
                // position requires one. The caller validates via context,
                // so only warn when clearly not a for-head.
            }
            decls.push(Decl { binding, value });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::new(
            start,
            SData::Local(SLocal {
                kind,
                decls,
                is_export: false,
            }),
        ))
    }

    /// Parse a binding pattern, declaring its identifiers with `kind`.
    pub(crate) fn parse_binding(&mut self, kind: SymbolKind) -> PResult<Binding> {
        match self.lexer.token {
            TokenKind::Identifier => {
                let (name, span) = self.expect_identifier()?;
                self.check_reserved_binding_name(&name, span);
                let r = self.declare_symbol(kind, &name, span);
                Ok(Binding::Ident(EIdent { name, ref_: r }))
            }
            TokenKind::OpenBracket => {
                self.lexer.next();
                let mut items = Vec::new();
                let mut rest = None;
                loop {
                    match self.lexer.token {
                        TokenKind::CloseBracket => break,
                        TokenKind::Comma => {
                            self.lexer.next();
                            items.push(None);
                            continue;
                        }
                        TokenKind::DotDotDot => {
                            self.lexer.next();
                            rest = Some(Box::new(self.parse_binding(kind)?));
                            break;
                        }
                        _ => {
                            let binding = self.parse_binding(kind)?;
                            let default = if self.eat(TokenKind::Equals) {
                                Some(self.parse_assign_expr()?)
                            } else {
                                None
                            };
                            items.push(Some(ArrayBindingItem { binding, default }));
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                }
                self.expect(TokenKind::CloseBracket)?;
                Ok(Binding::Array { items, rest })
            }
            TokenKind::OpenBrace => {
                self.lexer.next();
                let mut properties = Vec::new();
                let mut rest = None;
                loop {
                    match self.lexer.token {
                        TokenKind::CloseBrace => break,
                        TokenKind::DotDotDot => {
                            self.lexer.next();
                            rest = Some(Box::new(self.parse_binding(kind)?));
                            break;
                        }
                        _ => {
                            let (key, computed) = self.parse_property_key()?;
                            let binding = if self.eat(TokenKind::Colon) {
                                self.parse_binding(kind)?
                            } else {
                                // Shorthand `{ x }`: the key doubles as the
                                // bound name
                                match &key.data {
                                    EData::String(name) => {
                                        let span = key.span;
                                        let name = name.clone();
                                        self.check_reserved_binding_name(&name, span);
                                        let r = self.declare_symbol(kind, &name, span);
                                        Binding::Ident(EIdent { name, ref_: r })
                                    }
                                    _ => return Err(self.unexpected()),
                                }
                            };
                            let default = if self.eat(TokenKind::Equals) {
                                Some(self.parse_assign_expr()?)
                            } else {
                                None
                            };
                            properties.push(ObjectBindingProperty {
                                key,
                                computed,
                                binding,
                                default,
                            });
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                }
                self.expect(TokenKind::CloseBrace)?;
                Ok(Binding::Object { properties, rest })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn check_reserved_binding_name(&mut self, name: &str, span: Span) {
        if self.is_strict() && matches!(name, "eval" | "arguments") {
            self.log.add_error(
                self.source.index.0,
                span,
                format!("\"{name}\" cannot be bound in strict mode"),
            );
        }
    }

    fn parse_function_stmt(&mut self, is_export: bool) -> PResult<Stmt> {
        let start = self.span();
        self.lexer.next(); // function
        let is_generator = self.eat(TokenKind::Asterisk);
        let (name, name_span) = self.expect_identifier()?;
        let kind = if is_generator {
            SymbolKind::GeneratorOrAsyncFunction
        } else {
            SymbolKind::HoistedFunction
        };
        let name_ref = self.declare_symbol(kind, &name, name_span);
        let func = self.parse_function_rest(
            Some(EIdent {
                name: name.clone(),
                ref_: name_ref,
            }),
            false,
            is_generator,
        )?;
        if is_export {
            self.add_named_export(&name, name_ref, name_span);
        }
        Ok(Stmt::new(
            start,
            SData::Function {
                func,
                is_export,
                name_ref,
            },
        ))
    }

    /// Parse `async function` in statement position; the caller already
    /// consumed the `async` identifier and saw `function` next.
    pub(crate) fn parse_async_function_stmt(
        &mut self,
        start: Span,
        is_export: bool,
    ) -> PResult<Stmt> {
        self.lexer.next(); // function
        let is_generator = self.eat(TokenKind::Asterisk);
        let (name, name_span) = self.expect_identifier()?;
        let name_ref =
            self.declare_symbol(SymbolKind::GeneratorOrAsyncFunction, &name, name_span);
        let func = self.parse_function_rest(
            Some(EIdent {
                name: name.clone(),
                ref_: name_ref,
            }),
            true,
            is_generator,
        )?;
        if is_export {
            self.add_named_export(&name, name_ref, name_span);
        }
        Ok(Stmt::new(
            start,
            SData::Function {
                func,
                is_export,
                name_ref,
            },
        ))
    }

    /// Args + body, after the name. Pushes the function scopes.
    pub(crate) fn parse_function_rest(
        &mut self,
        name: Option<EIdent>,
        is_async: bool,
        is_generator: bool,
    ) -> PResult<Func> {
        self.push_scope(ScopeKind::FunctionArgs);
        self.ts_skip_type_parameters()?;
        self.expect(TokenKind::OpenParen)?;
        let args = self.parse_args()?;
        self.ts_skip_type_annotation()?;
        self.expect(TokenKind::OpenBrace)?;
        self.push_scope(ScopeKind::FunctionBody);
        self.declare_symbol(SymbolKind::Arguments, "arguments", Span::DUMMY);

        let old_async = std::mem::replace(&mut self.fn_is_async, is_async);
        let old_gen = std::mem::replace(&mut self.fn_is_generator, is_generator);
        self.fn_depth_inc();
        let body = self.parse_block_body()?;
        self.fn_depth_dec();
        self.fn_is_async = old_async;
        self.fn_is_generator = old_gen;

        self.pop_scope();
        self.pop_scope();
        Ok(Func {
            name,
            args,
            body,
            is_async,
            is_generator,
            uses_arguments: false,
        })
    }

    pub(crate) fn parse_args(&mut self) -> PResult<Vec<Arg>> {
        let mut args = Vec::new();
        while self.lexer.token != TokenKind::CloseParen {
            let decorators = if self.lexer.token == TokenKind::At {
                self.parse_decorators()?
            } else {
                Vec::new()
            };
            self.ts_skip_parameter_modifiers();
            let is_rest = self.eat(TokenKind::DotDotDot);
            let binding = self.parse_binding(SymbolKind::Hoisted)?;
            // Optional marker `x?` and type annotation
            if self.is_typescript {
                self.eat(TokenKind::Question);
            }
            self.ts_skip_type_annotation()?;
            let default = if self.eat(TokenKind::Equals) {
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            args.push(Arg {
                binding,
                default,
                is_rest,
                decorators,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(args)
    }

    pub(crate) fn parse_decorators(&mut self) -> PResult<Vec<Expr>> {
        let mut decorators = Vec::new();
        while self.eat(TokenKind::At) {
            // A decorator is a left-hand-side expression
            let expr = self.parse_suffix_expr()?;
            decorators.push(expr);
        }
        Ok(decorators)
    }

    fn parse_class_stmt(&mut self, is_export: bool, decorators: Vec<Expr>) -> PResult<Stmt> {
        let start = self.span();
        self.lexer.next(); // class
        let (name, name_span) = self.expect_identifier()?;
        let name_ref = self.declare_symbol(SymbolKind::Class, &name, name_span);
        if name.chars().next().is_some_and(char::is_uppercase) {
            // Keep the capital for JSX when this class is used as a tag
        }
        let mut class = self.parse_class_rest(Some(EIdent {
            name: name.clone(),
            ref_: name_ref,
        }))?;
        class.decorators = decorators;
        if is_export {
            self.add_named_export(&name, name_ref, name_span);
        }
        Ok(Stmt::new(
            start,
            SData::Class {
                class,
                is_export,
                name_ref,
            },
        ))
    }

    // =========================================================================
    // import / export
    // =========================================================================

    fn parse_import_stmt(&mut self) -> PResult<Stmt> {
        let start = self.span();
        // `import(` and `import.meta` are expressions
        {
            let snapshot = self.lexer.clone();
            self.lexer.next();
            if matches!(self.lexer.token, TokenKind::OpenParen | TokenKind::Dot) {
                self.lexer = snapshot;
                return self.parse_expr_stmt();
            }
            self.lexer = snapshot;
        }
        self.mark_esm();
        self.lexer.next();

        // `import type ...` (TypeScript) fully compiles away unless it is
        // `import type from "..."` where `type` is a default binding
        let mut is_type_only = false;
        if self.is_typescript && self.lexer.is_contextual_keyword("type") {
            let snapshot = self.lexer.clone();
            self.lexer.next();
            if matches!(self.lexer.token, TokenKind::Identifier | TokenKind::OpenBrace)
                && !self.lexer.is_contextual_keyword("from")
            {
                is_type_only = true;
            } else if self.lexer.token == TokenKind::Asterisk {
                is_type_only = true;
            } else {
                self.lexer = snapshot;
            }
        }

        let mut default_name = None;
        let mut star_name = None;
        let mut items = Vec::new();
        let mut is_bare = false;

        match self.lexer.token {
            TokenKind::StringLiteral => {
                // `import "./x"` — evaluated for side effects
                is_bare = true;
            }
            _ => {
                if self.lexer.token == TokenKind::Identifier {
                    let (name, span) = self.expect_identifier()?;
                    let r = self.declare_symbol(SymbolKind::Import, &name, span);
                    default_name = Some(EIdent { name, ref_: r });
                    if self.eat(TokenKind::Comma) {
                        // fall through to * or {...}
                    } else if !self.lexer.is_contextual_keyword("from") {
                        return Err(self.unexpected());
                    }
                }
                if self.lexer.token == TokenKind::Asterisk {
                    self.lexer.next();
                    if !self.lexer.is_contextual_keyword("as") {
                        return Err(self.unexpected());
                    }
                    self.lexer.next();
                    let (name, span) = self.expect_identifier()?;
                    let r = self.declare_symbol(SymbolKind::Import, &name, span);
                    star_name = Some(EIdent { name, ref_: r });
                } else if self.lexer.token == TokenKind::OpenBrace {
                    self.lexer.next();
                    while self.lexer.token != TokenKind::CloseBrace {
                        // `type x` inside a value import is erased per-item
                        let mut item_type_only = false;
                        if self.is_typescript && self.lexer.is_contextual_keyword("type") {
                            let snapshot = self.lexer.clone();
                            self.lexer.next();
                            if self.lexer.token == TokenKind::Identifier
                                && !self.lexer.is_contextual_keyword("as")
                            {
                                item_type_only = true;
                            } else {
                                self.lexer = snapshot;
                            }
                        }
                        let (alias, alias_span) = self.parse_module_export_name()?;
                        let (local, local_span) = if self.lexer.is_contextual_keyword("as") {
                            self.lexer.next();
                            self.expect_identifier()?
                        } else {
                            (alias.clone(), alias_span)
                        };
                        if !item_type_only && !is_type_only {
                            let r = self.declare_symbol(SymbolKind::Import, &local, local_span);
                            items.push(ClauseItem {
                                alias,
                                alias_span,
                                original_name: local,
                                name_ref: r,
                            });
                        }
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::CloseBrace)?;
                }
                if !self.lexer.is_contextual_keyword("from") {
                    return Err(self.unexpected());
                }
                self.lexer.next();
            }
        }

        if self.lexer.token != TokenKind::StringLiteral {
            return Err(self.unexpected());
        }
        let path = self.lexer.text();
        let path_span = self.span();
        self.lexer.next();

        let record_index = self.add_import_record(ImportKind::Stmt, path, path_span);
        let attributes = self.parse_import_attributes()?;
        if !attributes.is_empty() {
            let record = &mut self.import_records[record_index as usize];
            if attributes.iter().any(|a| a.key == "type" && a.value == "json") {
                record.flags |= ImportRecordFlags::ASSERT_TYPE_JSON;
            }
            record.attributes = attributes;
        }
        self.semicolon()?;

        if is_type_only {
            self.import_records[record_index as usize].flags |= ImportRecordFlags::IS_UNUSED;
            return Ok(Stmt::new(start, SData::TsErased));
        }

        let record = &mut self.import_records[record_index as usize];
        if is_bare {
            record.flags |= ImportRecordFlags::WAS_ORIGINALLY_BARE_IMPORT;
        }
        if star_name.is_some() {
            record.flags |= ImportRecordFlags::CONTAINS_IMPORT_STAR;
        }
        if default_name.is_some() {
            record.flags |= ImportRecordFlags::CONTAINS_DEFAULT_ALIAS;
        }

        // Register named imports for the linker
        if let Some(default) = &default_name {
            self.named_imports.insert(
                default.ref_,
                NamedImport {
                    alias: "default".to_string(),
                    alias_span: start,
                    import_record_index: record_index,
                    is_star: false,
                },
            );
        }
        if let Some(star) = &star_name {
            self.named_imports.insert(
                star.ref_,
                NamedImport {
                    alias: "*".to_string(),
                    alias_span: start,
                    import_record_index: record_index,
                    is_star: true,
                },
            );
        }
        for item in &items {
            self.named_imports.insert(
                item.name_ref,
                NamedImport {
                    alias: item.alias.clone(),
                    alias_span: item.alias_span,
                    import_record_index: record_index,
                    is_star: false,
                },
            );
        }

        Ok(Stmt::new(
            start,
            SData::Import(SImport {
                import_record_index: record_index,
                default_name,
                star_name,
                items,
                is_bare,
            }),
        ))
    }

    /// `with { type: "json" }` / legacy `assert { ... }`.
    fn parse_import_attributes(&mut self) -> PResult<Vec<crate::import_record::ImportAttribute>> {
        let has_clause = (self.lexer.token == TokenKind::With
            || self.lexer.is_contextual_keyword("assert"))
            && !self.lexer.has_newline_before;
        if !has_clause {
            return Ok(Vec::new());
        }
        self.lexer.next();
        self.expect(TokenKind::OpenBrace)?;
        let mut attributes = Vec::new();
        while self.lexer.token != TokenKind::CloseBrace {
            let key = match self.lexer.token {
                TokenKind::StringLiteral => self.lexer.text(),
                _ if self.lexer.token.is_identifier_or_keyword() => self.lexer.raw().to_string(),
                _ => return Err(self.unexpected()),
            };
            self.lexer.next();
            self.expect(TokenKind::Colon)?;
            if self.lexer.token != TokenKind::StringLiteral {
                return Err(self.unexpected());
            }
            let value = self.lexer.text();
            self.lexer.next();
            attributes.push(crate::import_record::ImportAttribute { key, value });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseBrace)?;
        Ok(attributes)
    }

    /// An exported name may be an identifier or a string literal.
    fn parse_module_export_name(&mut self) -> PResult<(String, Span)> {
        if self.lexer.token == TokenKind::StringLiteral {
            let name = self.lexer.text();
            let span = self.span();
            self.lexer.next();
            return Ok((name, span));
        }
        if self.lexer.token.is_identifier_or_keyword() {
            let name = if self.lexer.token == TokenKind::Identifier {
                self.lexer.text()
            } else {
                self.lexer.raw().to_string()
            };
            let span = self.span();
            self.lexer.next();
            return Ok((name, span));
        }
        Err(self.unexpected())
    }

    pub(crate) fn add_named_export(&mut self, alias: &str, r: Ref, span: Span) {
        if self.named_exports.contains_key(alias) {
            self.log.add_error(
                self.source.index.0,
                span,
                format!("Multiple exports with the same name \"{alias}\""),
            );
            return;
        }
        self.symbols[r.inner as usize]
            .flags
            .insert(SymbolFlags::WAS_EXPORTED);
        self.named_exports.insert(
            alias.to_string(),
            NamedExport {
                ref_: r,
                alias_span: span,
            },
        );
    }

    fn export_binding(&mut self, binding: &Binding) {
        let mut idents: Vec<(String, Ref, Span)> = Vec::new();
        binding.each_ident(&mut |id| {
            idents.push((id.name.clone(), id.ref_, Span::DUMMY));
        });
        for (name, r, span) in idents {
            self.add_named_export(&name, r, span);
        }
    }

    fn parse_export_stmt(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.mark_esm();
        self.lexer.next();

        match self.lexer.token {
            TokenKind::Default => {
                self.lexer.next();
                self.parse_export_default(start)
            }
            TokenKind::Asterisk => {
                self.lexer.next();
                let alias = if self.lexer.is_contextual_keyword("as") {
                    self.lexer.next();
                    let (name, span) = self.parse_module_export_name()?;
                    Some((name, span))
                } else {
                    None
                };
                if !self.lexer.is_contextual_keyword("from") {
                    return Err(self.unexpected());
                }
                self.lexer.next();
                if self.lexer.token != TokenKind::StringLiteral {
                    return Err(self.unexpected());
                }
                let path = self.lexer.text();
                let path_span = self.span();
                self.lexer.next();
                self.semicolon()?;
                let record_index = self.add_import_record(ImportKind::Stmt, path, path_span);

                if let Some((alias_name, alias_span)) = alias {
                    // `export * as ns from` is a named export of a
                    // synthesized namespace import
                    let r = self.new_symbol(SymbolKind::Import, &alias_name);
                    self.import_records[record_index as usize].flags |=
                        ImportRecordFlags::CONTAINS_IMPORT_STAR;
                    self.named_imports.insert(
                        r,
                        NamedImport {
                            alias: "*".to_string(),
                            alias_span,
                            import_record_index: record_index,
                            is_star: true,
                        },
                    );
                    self.add_named_export(&alias_name, r, alias_span);
                    return Ok(Stmt::new(
                        start,
                        SData::ExportStar(SExportStar {
                            import_record_index: record_index,
                            alias: Some((alias_name, r)),
                        }),
                    ));
                }
                self.export_star_import_records.push(record_index);
                Ok(Stmt::new(
                    start,
                    SData::ExportStar(SExportStar {
                        import_record_index: record_index,
                        alias: None,
                    }),
                ))
            }
            TokenKind::OpenBrace => {
                self.lexer.next();
                let mut raw_items: Vec<(String, Span, String, Span)> = Vec::new();
                while self.lexer.token != TokenKind::CloseBrace {
                    if self.is_typescript && self.lexer.is_contextual_keyword("type") {
                        let snapshot = self.lexer.clone();
                        self.lexer.next();
                        if self.lexer.token.is_identifier_or_keyword()
                            && !self.lexer.is_contextual_keyword("as")
                        {
                            // `export { type T }` — erased
                            self.parse_module_export_name()?;
                            if self.lexer.is_contextual_keyword("as") {
                                self.lexer.next();
                                self.parse_module_export_name()?;
                            }
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                            continue;
                        }
                        self.lexer = snapshot;
                    }
                    let (local, local_span) = self.parse_module_export_name()?;
                    let (alias, alias_span) = if self.lexer.is_contextual_keyword("as") {
                        self.lexer.next();
                        self.parse_module_export_name()?
                    } else {
                        (local.clone(), local_span)
                    };
                    raw_items.push((alias, alias_span, local, local_span));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::CloseBrace)?;

                let from_record = if self.lexer.is_contextual_keyword("from") {
                    self.lexer.next();
                    if self.lexer.token != TokenKind::StringLiteral {
                        return Err(self.unexpected());
                    }
                    let path = self.lexer.text();
                    let path_span = self.span();
                    self.lexer.next();
                    Some(self.add_import_record(ImportKind::Stmt, path, path_span))
                } else {
                    None
                };
                self.semicolon()?;

                let mut items = Vec::new();
                for (alias, alias_span, local, local_span) in raw_items {
                    let name_ref = match from_record {
                        Some(record_index) => {
                            // Re-export: a synthesized import binding
                            let r = self.new_symbol(SymbolKind::Import, &local);
                            self.named_imports.insert(
                                r,
                                NamedImport {
                                    alias: local.clone(),
                                    alias_span: local_span,
                                    import_record_index: record_index,
                                    is_star: false,
                                },
                            );
                            r
                        }
                        // Plain `export { x }`: resolved by the binder
                        None => Ref::INVALID,
                    };
                    if from_record.is_some() {
                        self.add_named_export(&alias, name_ref, alias_span);
                    }
                    items.push(ClauseItem {
                        alias,
                        alias_span,
                        original_name: local,
                        name_ref,
                    });
                }
                Ok(Stmt::new(
                    start,
                    SData::ExportNamed(SExportNamed {
                        items,
                        import_record_index: from_record,
                    }),
                ))
            }
            TokenKind::Var => self.parse_local(LocalKind::Var, true),
            TokenKind::Const => {
                if self.is_typescript && self.peek_is_enum() {
                    self.lexer.next();
                    return self.parse_enum(true);
                }
                self.parse_local(LocalKind::Const, true)
            }
            TokenKind::Identifier if self.lexer.is_contextual_keyword("let") => {
                self.parse_local(LocalKind::Let, true)
            }
            TokenKind::Identifier if self.lexer.is_contextual_keyword("using") => {
                self.parse_local(LocalKind::Using, true)
            }
            TokenKind::Function => self.parse_function_stmt(true),
            TokenKind::Class => self.parse_class_stmt(true, Vec::new()),
            TokenKind::Identifier if self.lexer.is_contextual_keyword("async") => {
                let snapshot = self.lexer.clone();
                self.lexer.next();
                if self.lexer.token == TokenKind::Function && !self.lexer.has_newline_before {
                    self.parse_async_function_stmt(start, true)
                } else {
                    self.lexer = snapshot;
                    Err(self.unexpected())
                }
            }
            TokenKind::Enum if self.is_typescript => self.parse_enum(true),
            TokenKind::Identifier
                if self.is_typescript && self.ts_stmt_starts_erased_declaration() =>
            {
                self.parse_ts_declaration(true)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_export_default(&mut self, start: Span) -> PResult<Stmt> {
        let default_ref = self.new_symbol(SymbolKind::Other, "default");
        self.add_named_export("default", default_ref, start);

        let value = match self.lexer.token {
            TokenKind::Function => {
                self.lexer.next();
                let is_generator = self.eat(TokenKind::Asterisk);
                let name = if self.lexer.token == TokenKind::Identifier {
                    let (name, span) = self.expect_identifier()?;
                    let r = self.declare_symbol(SymbolKind::HoistedFunction, &name, span);
                    Some(EIdent { name, ref_: r })
                } else {
                    None
                };
                let func = self.parse_function_rest(name, false, is_generator)?;
                ExportDefaultValue::Func(func)
            }
            TokenKind::Class => {
                self.lexer.next();
                let name = if self.lexer.token == TokenKind::Identifier {
                    let (name, span) = self.expect_identifier()?;
                    let r = self.declare_symbol(SymbolKind::Class, &name, span);
                    Some(EIdent { name, ref_: r })
                } else {
                    None
                };
                let class = self.parse_class_rest(name)?;
                ExportDefaultValue::Class(class)
            }
            TokenKind::Identifier if self.lexer.is_contextual_keyword("async") => {
                let snapshot = self.lexer.clone();
                self.lexer.next();
                if self.lexer.token == TokenKind::Function && !self.lexer.has_newline_before {
                    self.lexer.next();
                    let is_generator = self.eat(TokenKind::Asterisk);
                    let name = if self.lexer.token == TokenKind::Identifier {
                        let (name, span) = self.expect_identifier()?;
                        let r = self.declare_symbol(
                            SymbolKind::GeneratorOrAsyncFunction,
                            &name,
                            span,
                        );
                        Some(EIdent { name, ref_: r })
                    } else {
                        None
                    };
                    let func = self.parse_function_rest(name, true, is_generator)?;
                    ExportDefaultValue::Func(func)
                } else {
                    self.lexer = snapshot;
                    let expr = self.parse_assign_expr()?;
                    self.semicolon()?;
                    ExportDefaultValue::Expr(expr)
                }
            }
            _ => {
                let expr = self.parse_assign_expr()?;
                self.semicolon()?;
                ExportDefaultValue::Expr(expr)
            }
        };
        Ok(Stmt::new(
            start,
            SData::ExportDefault(SExportDefault { value, default_ref }),
        ))
    }

    fn parse_export_default_class(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        let start = self.span();
        let default_ref = self.new_symbol(SymbolKind::Other, "default");
        self.add_named_export("default", default_ref, start);
        self.lexer.next(); // class
        let name = if self.lexer.token == TokenKind::Identifier {
            let (name, span) = self.expect_identifier()?;
            let r = self.declare_symbol(SymbolKind::Class, &name, span);
            Some(EIdent { name, ref_: r })
        } else {
            None
        };
        let mut class = self.parse_class_rest(name)?;
        class.decorators = decorators;
        Ok(Stmt::new(
            start,
            SData::ExportDefault(SExportDefault {
                value: ExportDefaultValue::Class(class),
                default_ref,
            }),
        ))
    }

    // =========================================================================
    // Lookahead helpers
    // =========================================================================

    fn peek_starts_binding(&self) -> bool {
        let mut probe = self.lexer.clone();
        probe.next();
        matches!(
            probe.token,
            TokenKind::Identifier | TokenKind::OpenBrace | TokenKind::OpenBracket
        )
    }

    fn peek_starts_using_binding(&self) -> bool {
        if self.lexer.has_newline_before {
            // can't know yet; `using` ASI hazards resolved below
        }
        let mut probe = self.lexer.clone();
        probe.next();
        probe.token == TokenKind::Identifier && !probe.has_newline_before
    }

    fn peek_is_using_after_await(&self) -> bool {
        let mut probe = self.lexer.clone();
        probe.next();
        if !(probe.is_contextual_keyword("using") && !probe.has_newline_before) {
            return false;
        }
        probe.next();
        probe.token == TokenKind::Identifier && !probe.has_newline_before
    }

    fn peek_is_enum(&self) -> bool {
        let mut probe = self.lexer.clone();
        probe.next();
        probe.token == TokenKind::Enum
    }

    pub(crate) fn source_allows_await(&self) -> bool {
        self.current_function_depth() == 0 || self.fn_is_async
    }

    // Function nesting depth tracking (for top-level-await detection)
    fn fn_depth_inc(&mut self) {
        self.fn_depth += 1;
    }

    fn fn_depth_dec(&mut self) {
        self.fn_depth = self.fn_depth.saturating_sub(1);
    }

    pub(crate) fn current_function_depth(&self) -> u32 {
        self.fn_depth
    }

    pub(crate) fn record_top_level_await(&mut self, span: Span) {
        if self.top_level_await_span.is_none() {
            self.top_level_await_span = Some(span);
        }
    }

    /// ESM syntax makes the whole module strict; scopes created after this
    /// point inherit the strictness.
    pub(crate) fn mark_esm(&mut self) {
        self.has_esm_syntax = true;
        let root = self.scopes.get_mut(ScopeId::ROOT);
        if root.strict_mode == StrictMode::Sloppy {
            root.strict_mode = StrictMode::ImplicitStrictEsm;
        }
    }

    pub(crate) fn legacy_octal_check(&mut self, span: Span) {
        if self.is_strict() && self.lexer.legacy_octal {
            self.log.add_error(
                self.source.index.0,
                span,
                "Legacy octal literals cannot be used in strict mode",
            );
        }
    }
}

// =============================================================================
// Parts partitioning
// =============================================================================

/// Split top-level statements into tree-shaking parts: each statement gets
/// its own part; a part is removable when dropping it cannot change
/// observable behavior.
fn partition_into_parts(stmts: Vec<Stmt>) -> Vec<Part> {
    let mut parts = Vec::new();
    for stmt in stmts {
        let removable = stmt_can_be_removed_if_unused(&stmt);
        let mut part = Part::new(vec![stmt]);
        part.can_be_removed_if_unused = removable;
        parts.push(part);
    }
    parts
}

fn stmt_can_be_removed_if_unused(stmt: &Stmt) -> bool {
    match &stmt.data {
        SData::Function { .. } | SData::TsErased | SData::Empty | SData::Directive(_) => true,
        SData::Class { class, .. } => class_can_be_removed(class),
        SData::Local(local) => local
            .decls
            .iter()
            .all(|d| d.value.as_ref().is_none_or(|v| !v.has_side_effects())),
        SData::Import(import) => {
            // A bare import is a side-effect import and must stay
            !import.is_bare
        }
        // Re-exports keep the record alive through the export machinery
        SData::ExportNamed(_) | SData::ExportStar(_) => true,
        SData::ExportDefault(export) => match &export.value {
            ExportDefaultValue::Expr(e) => !e.has_side_effects(),
            ExportDefaultValue::Func(_) => true,
            ExportDefaultValue::Class(c) => class_can_be_removed(c),
        },
        _ => false,
    }
}

fn class_can_be_removed(class: &Class) -> bool {
    class.decorators.is_empty()
        && class.extends.as_ref().is_none_or(|e| !e.has_side_effects())
        && class.properties.iter().all(|p| {
            p.decorators.is_empty()
                && !(p.is_computed && p.key.has_side_effects())
                && (p.kind != ClassPropertyKind::StaticBlock)
                && (!p.is_static
                    || p.initializer.as_ref().is_none_or(|i| !i.has_side_effects()))
        })
}

// =============================================================================
// Small utilities
// =============================================================================

fn private_get_set_pair(a: SymbolKind, b: SymbolKind) -> Option<SymbolKind> {
    match (a, b) {
        (SymbolKind::PrivateGet, SymbolKind::PrivateSet)
        | (SymbolKind::PrivateSet, SymbolKind::PrivateGet) => {
            Some(SymbolKind::PrivateGetSetPair)
        }
        (SymbolKind::PrivateStaticGet, SymbolKind::PrivateStaticSet)
        | (SymbolKind::PrivateStaticSet, SymbolKind::PrivateStaticGet) => {
            Some(SymbolKind::PrivateStaticGetSetPair)
        }
        _ => None,
    }
}

fn file_stem(path: &str) -> String {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    base.split('.').next().unwrap_or(base).to_string()
}

fn sanitize_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        let ok = if i == 0 {
            c.is_ascii_alphabetic() || c == '_' || c == '$'
        } else {
            c.is_ascii_alphanumeric() || c == '_' || c == '$'
        };
        out.push(if ok { c } else { '_' });
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}
