//! Parsers for the kestrel bundler.
//!
//! This crate owns the data model shared by the whole pipeline:
//! - The JavaScript AST (`ast`), symbol table (`symbols`) and scope tree
//!   (`scope`)
//! - Import records (`import_record`) and tree-shaking parts (`part`)
//! - The JS/TS/JSX parser (`js_parser`) and its symbol-binding pass
//! - The CSS AST and parser (`css_ast`, `css_parser`)
//! - JSON-to-module conversion (`json`)
//!
//! Parsing one file is a pure function of `(source, options, log)`; files
//! parse concurrently and never touch each other's symbol arrays.

pub mod ast;
pub mod binder;
pub mod css_ast;
pub mod css_parser;
pub mod import_record;
pub mod js_parser;
pub mod json;
pub mod part;
pub mod scope;
pub mod symbols;

pub use ast::{Ast, EData, Expr, SData, Stmt};
pub use import_record::{ImportKind, ImportRecord, ImportRecordFlags};
pub use js_parser::{parse, ParserOptions};
pub use part::Part;
pub use symbols::{Ref, Symbol, SymbolFlags, SymbolKind, SymbolMap};
