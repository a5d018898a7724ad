//! The CSS AST: a flat rule list that refers back to token ranges.
//!
//! CSS never needs the deep rewriting JavaScript does, so rules keep spans
//! into the original source and the printer re-emits those bytes, patching
//! only the pieces the bundler owns (`@import` inlining, `url(...)`
//! rewrites, local class renaming).

use crate::import_record::ImportRecord;
use crate::symbols::{Ref, Symbol};
use indexmap::IndexMap;
use kestrel_common::Span;

#[derive(Debug, Clone)]
pub enum CssRule {
    /// `@import "path";` — the record points at the target stylesheet.
    AtImport { record_index: u32, span: Span },
    /// A style rule: selector prelude plus declarations.
    Style {
        prelude: Span,
        declarations: Vec<CssDeclaration>,
        span: Span,
    },
    /// Any other at-rule; nested rules appear when it has a block.
    At {
        name: String,
        prelude: Span,
        block: Option<Vec<CssRule>>,
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub struct CssDeclaration {
    pub name: String,
    /// The value tokens, excluding the trailing `;`.
    pub value: Span,
    pub important: bool,
    /// Indices of `url(...)` records inside the value.
    pub url_records: Vec<u32>,
    /// For `composes:` declarations in local-scope files.
    pub composes: Option<Composes>,
}

#[derive(Debug, Clone, Default)]
pub struct Composes {
    /// Class names composed from this file.
    pub local_names: Vec<String>,
    /// `(name, record)` pairs for `composes: a from "./other.css"`.
    pub from_records: Vec<(String, u32)>,
}

/// One exported (local) class name.
#[derive(Debug, Clone)]
pub struct CssExport {
    pub ref_: Ref,
    pub composes_local: Vec<String>,
    pub composes_from: Vec<(String, u32)>,
}

#[derive(Debug, Default)]
pub struct CssAst {
    pub rules: Vec<CssRule>,
    pub symbols: Vec<Symbol>,
    pub import_records: Vec<ImportRecord>,
    /// Local class names, present when the file has local scope
    /// (CSS modules).
    pub exports: IndexMap<String, CssExport>,
    pub has_local_scope: bool,
}
