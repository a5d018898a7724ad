//! The JavaScript printer.
//!
//! Walks lowered ASTs emitting text into a byte buffer, consulting the
//! rename map for identifiers, optionally interleaving source-map mappings.
//! Parenthesization is precedence-driven: the tree carries no parens.

use crate::renamer::NameMap;
use kestrel_common::source_map::SourceMapBuilder;
use kestrel_common::{LineMap, Source, Span};
use kestrel_parser::ast::*;
use kestrel_parser::import_record::ImportRecord;
use kestrel_parser::symbols::{Ref, SymbolMap};

#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    pub minify_whitespace: bool,
    /// Escape non-ASCII characters in strings and templates.
    pub ascii_only: bool,
    pub source_map: bool,
}

#[derive(Debug)]
pub struct PrintResult {
    pub code: String,
    pub map: Option<SourceMapBuilder>,
}

// Operator precedence levels, tightest last.
const P_LOWEST: u8 = 0;
const P_COMMA: u8 = 1;
const P_ASSIGN: u8 = 2;
const P_COND: u8 = 3;
const P_NULLISH: u8 = 4;
const P_OR: u8 = 5;
const P_AND: u8 = 6;
const P_BIT_OR: u8 = 7;
const P_BIT_XOR: u8 = 8;
const P_BIT_AND: u8 = 9;
const P_EQUALS: u8 = 10;
const P_COMPARE: u8 = 11;
const P_SHIFT: u8 = 12;
const P_ADD: u8 = 13;
const P_MULTIPLY: u8 = 14;
const P_EXPONENT: u8 = 15;
const P_PREFIX: u8 = 16;
const P_POSTFIX: u8 = 17;
const P_NEW: u8 = 18;
const P_CALL: u8 = 19;

fn bin_op_prec(op: BinOp) -> (u8, bool) {
    // (level, right associative)
    match op {
        BinOp::Comma => (P_COMMA, false),
        BinOp::Assign
        | BinOp::AddAssign
        | BinOp::SubAssign
        | BinOp::MulAssign
        | BinOp::DivAssign
        | BinOp::RemAssign
        | BinOp::PowAssign
        | BinOp::ShlAssign
        | BinOp::ShrAssign
        | BinOp::UShrAssign
        | BinOp::BitAndAssign
        | BinOp::BitOrAssign
        | BinOp::BitXorAssign
        | BinOp::LogicalAndAssign
        | BinOp::LogicalOrAssign
        | BinOp::NullishAssign => (P_ASSIGN, true),
        BinOp::NullishCoalescing => (P_NULLISH, false),
        BinOp::LogicalOr => (P_OR, false),
        BinOp::LogicalAnd => (P_AND, false),
        BinOp::BitOr => (P_BIT_OR, false),
        BinOp::BitXor => (P_BIT_XOR, false),
        BinOp::BitAnd => (P_BIT_AND, false),
        BinOp::LooseEq | BinOp::LooseNe | BinOp::StrictEq | BinOp::StrictNe => {
            (P_EQUALS, false)
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::In | BinOp::Instanceof => {
            (P_COMPARE, false)
        }
        BinOp::Shl | BinOp::Shr | BinOp::UShr => (P_SHIFT, false),
        BinOp::Add | BinOp::Sub => (P_ADD, false),
        BinOp::Mul | BinOp::Div | BinOp::Rem => (P_MULTIPLY, false),
        BinOp::Pow => (P_EXPONENT, true),
    }
}

pub struct Printer<'a> {
    symbols: &'a SymbolMap,
    names: &'a NameMap,
    options: PrintOptions,
    out: String,
    indent: usize,
    /// Source-map state for the file currently being printed.
    map: Option<SourceMapBuilder>,
    map_source: u32,
    line_map: Option<LineMap>,
    contents: Option<std::sync::Arc<str>>,
    /// Import records of the file being printed, for path emission.
    records: Vec<ImportRecord>,
}

impl<'a> Printer<'a> {
    pub fn new(symbols: &'a SymbolMap, names: &'a NameMap, options: PrintOptions) -> Printer<'a> {
        let map = if options.source_map {
            Some(SourceMapBuilder::new())
        } else {
            None
        };
        Printer {
            symbols,
            names,
            options,
            out: String::new(),
            indent: 0,
            map,
            map_source: 0,
            line_map: None,
            contents: None,
            records: Vec::new(),
        }
    }

    /// Provide the current file's import records so surviving import
    /// syntax prints real paths.
    pub fn set_import_records(&mut self, records: &[ImportRecord]) {
        self.records = records.to_vec();
    }

    fn record_path(&self, index: u32) -> String {
        self.records
            .get(index as usize)
            .map(|r| r.path.clone())
            .unwrap_or_default()
    }

    /// Switch the source-map origin to `source`; statements printed next
    /// map back into it.
    pub fn set_source(&mut self, source: &Source) {
        if let Some(map) = &mut self.map {
            self.map_source = map.add_source(
                source.pretty_path.clone(),
                Some(source.contents.to_string()),
            );
            self.line_map = Some(source.line_map());
            self.contents = Some(source.contents.clone());
        }
    }

    /// Write raw text (chunk headers, cross-chunk import lines) keeping
    /// the source-map position tracking in sync.
    pub fn print_raw(&mut self, text: &str) {
        self.write(text);
    }

    pub fn finish(mut self) -> PrintResult {
        if !self.out.ends_with('\n') && !self.out.is_empty() {
            self.newline_raw();
        }
        PrintResult {
            code: self.out,
            map: self.map,
        }
    }

    // =========================================================================
    // Output helpers
    // =========================================================================

    fn write(&mut self, text: &str) {
        if let Some(map) = &mut self.map {
            map.advance_bytes(text);
        }
        self.out.push_str(text);
    }

    fn space(&mut self) {
        if !self.options.minify_whitespace {
            self.write(" ");
        }
    }

    fn newline(&mut self) {
        if !self.options.minify_whitespace {
            if self.out.is_empty() {
                return;
            }
            self.newline_raw();
            let indent = "  ".repeat(self.indent);
            self.write(&indent);
        }
    }

    fn newline_raw(&mut self) {
        if let Some(map) = &mut self.map {
            map.advance_bytes("\n");
        }
        self.out.push('\n');
    }

    fn add_mapping(&mut self, span: Span) {
        if span.is_dummy() {
            return;
        }
        let Some(map) = &mut self.map else {
            return;
        };
        let (Some(line_map), Some(contents)) = (&self.line_map, &self.contents) else {
            return;
        };
        let (line, column) = line_map.position(span.start, contents);
        map.add_mapping(self.map_source, line, column, None);
    }

    fn name_of(&self, r: Ref, fallback: &str) -> String {
        if !r.is_valid() {
            return fallback.to_string();
        }
        let terminal = self.symbols.follow_read(r);
        let symbol = self.symbols.get(terminal);
        if let Some(alias) = &symbol.namespace_alias {
            // Import bindings folded into a namespace print as `ns.name`
            let ns = self.name_of(alias.namespace_ref, "");
            if is_valid_identifier(&alias.alias) {
                return format!("{ns}.{}", alias.alias);
            }
            return format!("{ns}[{}]", quote_string(&alias.alias, self.options.ascii_only));
        }
        match self.names.get(&terminal) {
            Some(name) => name.clone(),
            None => {
                if symbol.original_name.is_empty() {
                    fallback.to_string()
                } else {
                    symbol.original_name.clone()
                }
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn print_stmt(&mut self, stmt: &Stmt) {
        self.add_mapping(stmt.span);
        match &stmt.data {
            SData::Empty => {}
            SData::Debugger => {
                self.newline();
                self.write("debugger;");
            }
            SData::Directive(text) => {
                self.newline();
                let quoted = quote_string(text, self.options.ascii_only);
                self.write(&quoted);
                self.write(";");
            }
            SData::Expr(e) => {
                self.newline();
                self.print_expr_stmt_value(e);
                self.write(";");
            }
            SData::Block(stmts) => {
                self.newline();
                self.print_block(stmts);
            }
            SData::If { test, yes, no } => {
                self.newline();
                self.print_if(test, yes, no.as_deref());
            }
            SData::While { test, body } => {
                self.newline();
                self.write("while");
                self.space();
                self.write("(");
                self.print_expr(test, P_LOWEST);
                self.write(")");
                self.print_nested_stmt(body);
            }
            SData::DoWhile { test, body } => {
                self.newline();
                self.write("do");
                match &body.data {
                    SData::Block(stmts) => {
                        self.space();
                        self.print_block(stmts);
                        self.space();
                    }
                    _ => {
                        self.write(" ");
                        self.indent += 1;
                        self.print_stmt(body);
                        self.indent -= 1;
                        self.newline();
                    }
                }
                self.write("while");
                self.space();
                self.write("(");
                self.print_expr(test, P_LOWEST);
                self.write(");");
            }
            SData::With { value, body } => {
                self.newline();
                self.write("with");
                self.space();
                self.write("(");
                self.print_expr(value, P_LOWEST);
                self.write(")");
                self.print_nested_stmt(body);
            }
            SData::For {
                init,
                test,
                update,
                body,
            } => {
                self.newline();
                self.write("for");
                self.space();
                self.write("(");
                if let Some(init) = init {
                    self.print_for_head_stmt(init);
                }
                self.write(";");
                if let Some(test) = test {
                    self.space();
                    self.print_expr(test, P_LOWEST);
                }
                self.write(";");
                if let Some(update) = update {
                    self.space();
                    self.print_expr(update, P_LOWEST);
                }
                self.write(")");
                self.print_nested_stmt(body);
            }
            SData::ForIn { init, value, body } => {
                self.newline();
                self.write("for");
                self.space();
                self.write("(");
                self.print_for_head_stmt(init);
                self.write(" in ");
                self.print_expr(value, P_LOWEST);
                self.write(")");
                self.print_nested_stmt(body);
            }
            SData::ForOf {
                is_await,
                init,
                value,
                body,
            } => {
                self.newline();
                self.write("for");
                if *is_await {
                    self.write(" await");
                }
                self.space();
                self.write("(");
                self.print_for_head_stmt(init);
                self.write(" of ");
                self.print_expr(value, P_ASSIGN);
                self.write(")");
                self.print_nested_stmt(body);
            }
            SData::Switch { test, cases } => {
                self.newline();
                self.write("switch");
                self.space();
                self.write("(");
                self.print_expr(test, P_LOWEST);
                self.write(")");
                self.space();
                self.write("{");
                self.indent += 1;
                for case in cases {
                    self.newline();
                    match &case.value {
                        Some(value) => {
                            self.write("case ");
                            self.print_expr(value, P_LOWEST);
                            self.write(":");
                        }
                        None => self.write("default:"),
                    }
                    self.indent += 1;
                    for s in &case.body {
                        self.print_stmt(s);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.newline();
                self.write("}");
            }
            SData::Try {
                block,
                catch,
                finally,
            } => {
                self.newline();
                self.write("try");
                self.space();
                self.print_block(block);
                if let Some(catch) = catch {
                    self.space();
                    self.write("catch");
                    if let Some(binding) = &catch.binding {
                        self.space();
                        self.write("(");
                        self.print_binding(binding);
                        self.write(")");
                    }
                    self.space();
                    self.print_block(&catch.body);
                }
                if let Some(finally) = finally {
                    self.space();
                    self.write("finally");
                    self.space();
                    self.print_block(finally);
                }
            }
            SData::Return(value) => {
                self.newline();
                match value {
                    Some(value) => {
                        self.write("return ");
                        self.print_expr(value, P_LOWEST);
                        self.write(";");
                    }
                    None => self.write("return;"),
                }
            }
            SData::Throw(value) => {
                self.newline();
                self.write("throw ");
                self.print_expr(value, P_LOWEST);
                self.write(";");
            }
            SData::Break(label) => {
                self.newline();
                match label {
                    Some((name, r)) => {
                        self.write("break ");
                        let name = self.name_of(*r, name);
                        self.write(&name);
                        self.write(";");
                    }
                    None => self.write("break;"),
                }
            }
            SData::Continue(label) => {
                self.newline();
                match label {
                    Some((name, r)) => {
                        self.write("continue ");
                        let name = self.name_of(*r, name);
                        self.write(&name);
                        self.write(";");
                    }
                    None => self.write("continue;"),
                }
            }
            SData::Label { name, ref_, stmt } => {
                self.newline();
                let name = self.name_of(*ref_, name);
                self.write(&name);
                self.write(":");
                self.print_nested_stmt(stmt);
            }
            SData::Local(local) => {
                self.newline();
                if local.is_export {
                    self.write("export ");
                }
                self.print_local(local);
                self.write(";");
            }
            SData::Function {
                func,
                is_export,
                name_ref,
            } => {
                self.newline();
                if *is_export {
                    self.write("export ");
                }
                let name = self.name_of(
                    *name_ref,
                    func.name.as_ref().map(|n| n.name.as_str()).unwrap_or(""),
                );
                self.print_function_keyword(func);
                self.write(&name);
                self.print_function_rest(func);
            }
            SData::Class {
                class,
                is_export,
                name_ref,
            } => {
                self.newline();
                if *is_export {
                    self.write("export ");
                }
                self.write("class ");
                let name = self.name_of(
                    *name_ref,
                    class.name.as_ref().map(|n| n.name.as_str()).unwrap_or(""),
                );
                self.write(&name);
                self.print_class_rest(class);
            }
            SData::Import(import) => self.print_import(import),
            SData::ExportNamed(export) => self.print_export_named(export),
            SData::ExportDefault(export) => {
                self.newline();
                self.write("export default ");
                match &export.value {
                    ExportDefaultValue::Expr(e) => {
                        self.print_expr(e, P_ASSIGN);
                        self.write(";");
                    }
                    ExportDefaultValue::Func(func) => {
                        self.print_function_keyword(func);
                        if let Some(name) = &func.name {
                            let name = self.name_of(name.ref_, &name.name);
                            self.write(&name);
                        }
                        self.print_function_rest(func);
                    }
                    ExportDefaultValue::Class(class) => {
                        self.write("class");
                        if let Some(name) = &class.name {
                            self.write(" ");
                            let name = self.name_of(name.ref_, &name.name);
                            self.write(&name);
                        }
                        self.print_class_rest(class);
                    }
                }
            }
            SData::ExportStar(star) => {
                self.newline();
                match &star.alias {
                    Some((alias, _)) => {
                        self.write("export * as ");
                        self.write(alias);
                    }
                    None => self.write("export *"),
                }
                self.write(" from ");
                // The linker replaces records it internalizes; what is
                // left prints its original path
                let path = self.record_path(star.import_record_index);
                let quoted = quote_string(&path, self.options.ascii_only);
                self.write(&quoted);
                self.write(";");
            }
            SData::TsErased | SData::Enum { .. } | SData::Namespace { .. } => {
                // Erased or already lowered before printing
            }
        }
    }

    /// Print a statement as the body of `if`/`for`/`while`.
    fn print_nested_stmt(&mut self, stmt: &Stmt) {
        match &stmt.data {
            SData::Block(stmts) => {
                self.space();
                self.print_block(stmts);
            }
            SData::Empty => self.write(";"),
            _ => {
                self.indent += 1;
                self.print_stmt(stmt);
                self.indent -= 1;
            }
        }
    }

    fn print_if(&mut self, test: &Expr, yes: &Stmt, no: Option<&Stmt>) {
        self.write("if");
        self.space();
        self.write("(");
        self.print_expr(test, P_LOWEST);
        self.write(")");
        let yes_is_block = matches!(yes.data, SData::Block(_));
        self.print_nested_stmt(yes);
        if let Some(no) = no {
            if yes_is_block {
                self.space();
            } else {
                self.newline();
            }
            self.write("else");
            match &no.data {
                SData::If { test, yes, no } => {
                    self.write(" ");
                    self.print_if(test, yes, no.as_deref());
                }
                SData::Block(stmts) => {
                    self.space();
                    self.print_block(stmts);
                }
                _ => {
                    self.indent += 1;
                    self.print_stmt(no);
                    self.indent -= 1;
                }
            }
        }
    }

    pub fn print_block(&mut self, stmts: &[Stmt]) {
        self.write("{");
        self.indent += 1;
        for stmt in stmts {
            self.print_stmt(stmt);
        }
        self.indent -= 1;
        self.newline();
        self.write("}");
    }

    fn print_for_head_stmt(&mut self, stmt: &Stmt) {
        match &stmt.data {
            SData::Local(local) => self.print_local(local),
            SData::Expr(e) => self.print_expr(e, P_LOWEST),
            _ => {}
        }
    }

    fn print_local(&mut self, local: &SLocal) {
        self.write(local.kind.as_str());
        self.write(" ");
        for (i, decl) in local.decls.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            self.print_binding(&decl.binding);
            if let Some(value) = &decl.value {
                self.space();
                self.write("=");
                self.space();
                self.print_expr(value, P_ASSIGN);
            }
        }
    }

    fn print_binding(&mut self, binding: &Binding) {
        match binding {
            Binding::Ident(id) => {
                let name = self.name_of(id.ref_, &id.name);
                self.write(&name);
            }
            Binding::Array { items, rest } => {
                self.write("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        self.space();
                    }
                    match item {
                        None => {}
                        Some(item) => {
                            self.print_binding(&item.binding);
                            if let Some(default) = &item.default {
                                self.space();
                                self.write("=");
                                self.space();
                                self.print_expr(default, P_ASSIGN);
                            }
                        }
                    }
                }
                if let Some(rest) = rest {
                    if !items.is_empty() {
                        self.write(",");
                        self.space();
                    }
                    self.write("...");
                    self.print_binding(rest);
                }
                self.write("]");
            }
            Binding::Object { properties, rest } => {
                self.write("{");
                self.space();
                for (i, prop) in properties.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        self.space();
                    }
                    if prop.computed {
                        self.write("[");
                        self.print_expr(&prop.key, P_ASSIGN);
                        self.write("]:");
                        self.space();
                        self.print_binding(&prop.binding);
                    } else {
                        let shorthand = match (&prop.key.data, &prop.binding) {
                            (EData::String(key), Binding::Ident(id)) => {
                                let name = self.name_of(id.ref_, &id.name);
                                if *key == name && prop.default.is_none() {
                                    self.write(&name);
                                    true
                                } else {
                                    false
                                }
                            }
                            _ => false,
                        };
                        if !shorthand {
                            self.print_property_key(&prop.key);
                            self.write(":");
                            self.space();
                            self.print_binding(&prop.binding);
                        }
                    }
                    if let Some(default) = &prop.default {
                        self.space();
                        self.write("=");
                        self.space();
                        self.print_expr(default, P_ASSIGN);
                    }
                }
                if let Some(rest) = rest {
                    if !properties.is_empty() {
                        self.write(",");
                        self.space();
                    }
                    self.write("...");
                    self.print_binding(rest);
                }
                self.space();
                self.write("}");
            }
        }
    }

    fn print_import(&mut self, import: &SImport) {
        self.newline();
        self.write("import ");
        let mut need_from = false;
        if let Some(default) = &import.default_name {
            let name = self.name_of(default.ref_, &default.name);
            self.write(&name);
            need_from = true;
        }
        if let Some(star) = &import.star_name {
            if import.default_name.is_some() {
                self.write(",");
                self.space();
            }
            self.write("* as ");
            let name = self.name_of(star.ref_, &star.name);
            self.write(&name);
            need_from = true;
        }
        if !import.items.is_empty() {
            if import.default_name.is_some() || import.star_name.is_some() {
                self.write(",");
                self.space();
            }
            self.write("{");
            self.space();
            for (i, item) in import.items.iter().enumerate() {
                if i > 0 {
                    self.write(",");
                    self.space();
                }
                let local = self.name_of(item.name_ref, &item.original_name);
                if item.alias == local {
                    self.write(&local);
                } else {
                    self.write(&item.alias);
                    self.write(" as ");
                    self.write(&local);
                }
            }
            self.space();
            self.write("}");
            need_from = true;
        }
        if need_from {
            self.write(" from ");
        }
        let path = self.record_path(import.import_record_index);
        let quoted = quote_string(&path, self.options.ascii_only);
        self.write(&quoted);
        self.write(";");
    }

    fn print_export_named(&mut self, export: &SExportNamed) {
        self.newline();
        self.write("export");
        self.space();
        self.write("{");
        self.space();
        for (i, item) in export.items.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            let local = self.name_of(item.name_ref, &item.original_name);
            if item.alias == local {
                self.write(&local);
            } else {
                self.write(&local);
                self.write(" as ");
                if is_valid_identifier(&item.alias) {
                    self.write(&item.alias.clone());
                } else {
                    let quoted = quote_string(&item.alias, self.options.ascii_only);
                    self.write(&quoted);
                }
            }
        }
        self.space();
        self.write("}");
        if let Some(record) = export.import_record_index {
            self.write(" from ");
            let path = self.record_path(record);
            let quoted = quote_string(&path, self.options.ascii_only);
            self.write(&quoted);
        }
        self.write(";");
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// An expression in statement position: object literals, functions and
    /// classes need parens to avoid re-parsing as declarations.
    fn print_expr_stmt_value(&mut self, e: &Expr) {
        if starts_with_stmt_ambiguity(e) {
            self.write("(");
            self.print_expr(e, P_LOWEST);
            self.write(")");
        } else {
            self.print_expr(e, P_LOWEST);
        }
    }

    pub fn print_expr(&mut self, e: &Expr, min_prec: u8) {
        self.add_mapping(e.span);
        match &e.data {
            EData::Undefined => {
                // `void 0` is both shorter and safe against shadowing
                if P_PREFIX < min_prec {
                    self.write("(void 0)");
                } else {
                    self.write("void 0");
                }
            }
            EData::Null => self.write("null"),
            EData::This => self.write("this"),
            EData::Super => self.write("super"),
            EData::Boolean(true) => self.write("true"),
            EData::Boolean(false) => self.write("false"),
            EData::Number(n) => self.print_number(*n, min_prec),
            EData::BigInt(raw) => self.write(raw),
            EData::String(s) => {
                let quoted = quote_string(s, self.options.ascii_only);
                self.write(&quoted);
            }
            EData::RegExp(raw) => self.write(raw),
            EData::Ident(id) => {
                let name = self.name_of(id.ref_, &id.name);
                self.write(&name);
            }
            EData::PrivateIdent(p) => {
                self.write("#");
                let name = self.name_of(p.ref_, &p.name);
                self.write(&name);
            }
            EData::ImportMeta => self.write("import.meta"),
            EData::NewTarget => self.write("new.target"),
            EData::Array(items) => {
                self.write("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        self.space();
                    }
                    self.print_expr(item, P_ASSIGN);
                }
                self.write("]");
            }
            EData::Object(properties) => {
                self.write("{");
                self.space();
                for (i, prop) in properties.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        self.space();
                    }
                    self.print_property(prop);
                }
                self.space();
                self.write("}");
            }
            EData::Spread(value) => {
                self.write("...");
                self.print_expr(value, P_ASSIGN);
            }
            EData::Template(t) => self.print_template(t),
            EData::Dot(dot) => {
                let wrap = P_CALL < min_prec;
                if wrap {
                    self.write("(");
                }
                self.print_expr(&dot.target, P_CALL);
                if dot.optional_chain == OptionalChain::Start {
                    self.write("?.");
                } else {
                    self.write(".");
                }
                self.write(&dot.name);
                if wrap {
                    self.write(")");
                }
            }
            EData::Index(index) => {
                let wrap = P_CALL < min_prec;
                if wrap {
                    self.write("(");
                }
                self.print_expr(&index.target, P_CALL);
                if index.optional_chain == OptionalChain::Start {
                    self.write("?.");
                }
                self.write("[");
                self.print_expr(&index.index, P_LOWEST);
                self.write("]");
                if wrap {
                    self.write(")");
                }
            }
            EData::Call(call) => {
                let wrap = P_CALL < min_prec;
                if wrap {
                    self.write("(");
                }
                self.print_expr(&call.target, P_CALL);
                if call.optional_chain == OptionalChain::Start {
                    self.write("?.");
                }
                self.write("(");
                self.print_args(&call.args);
                self.write(")");
                if wrap {
                    self.write(")");
                }
            }
            EData::New(new) => {
                let wrap = P_NEW < min_prec;
                if wrap {
                    self.write("(");
                }
                self.write("new ");
                // A callee containing a call needs parens to bind to `new`
                if expr_contains_call(&new.target) {
                    self.write("(");
                    self.print_expr(&new.target, P_LOWEST);
                    self.write(")");
                } else {
                    self.print_expr(&new.target, P_CALL);
                }
                self.write("(");
                self.print_args(&new.args);
                self.write(")");
                if wrap {
                    self.write(")");
                }
            }
            EData::Unary(unary) => self.print_unary(unary, min_prec),
            EData::Binary(binary) => self.print_binary(binary, min_prec),
            EData::Cond(cond) => {
                let wrap = P_COND < min_prec;
                if wrap {
                    self.write("(");
                }
                self.print_expr(&cond.test, P_COND + 1);
                self.space();
                self.write("?");
                self.space();
                self.print_expr(&cond.yes, P_ASSIGN);
                self.space();
                self.write(":");
                self.space();
                self.print_expr(&cond.no, P_ASSIGN);
                if wrap {
                    self.write(")");
                }
            }
            EData::Arrow(arrow) => {
                let wrap = P_ASSIGN < min_prec;
                if wrap {
                    self.write("(");
                }
                if arrow.is_async {
                    self.write("async ");
                }
                self.write("(");
                self.print_arg_list(&arrow.args);
                self.write(")");
                self.space();
                self.write("=>");
                self.space();
                match &arrow.body {
                    ArrowBody::Expr(e) => {
                        if matches!(e.data, EData::Object(_)) {
                            self.write("(");
                            self.print_expr(e, P_ASSIGN);
                            self.write(")");
                        } else {
                            self.print_expr(e, P_ASSIGN);
                        }
                    }
                    ArrowBody::Stmts(stmts) => self.print_block(stmts),
                }
                if wrap {
                    self.write(")");
                }
            }
            EData::Function(func) => {
                self.print_function_keyword(func);
                if let Some(name) = &func.name {
                    let name = self.name_of(name.ref_, &name.name);
                    self.write(&name);
                }
                self.print_function_rest(func);
            }
            EData::Class(class) => {
                self.write("class");
                if let Some(name) = &class.name {
                    self.write(" ");
                    let name = self.name_of(name.ref_, &name.name);
                    self.write(&name);
                }
                self.print_class_rest(class);
            }
            EData::Await(value) => {
                let wrap = P_PREFIX < min_prec;
                if wrap {
                    self.write("(");
                }
                self.write("await ");
                self.print_expr(value, P_PREFIX);
                if wrap {
                    self.write(")");
                }
            }
            EData::Yield(y) => {
                let wrap = P_ASSIGN < min_prec;
                if wrap {
                    self.write("(");
                }
                self.write("yield");
                if y.is_star {
                    self.write("*");
                }
                if let Some(value) = &y.value {
                    self.write(" ");
                    self.print_expr(value, P_ASSIGN);
                }
                if wrap {
                    self.write(")");
                }
            }
            EData::ImportCall(call) => {
                self.write("import(");
                self.print_expr(&call.expr, P_ASSIGN);
                if let Some(options) = &call.options {
                    self.write(",");
                    self.space();
                    self.print_expr(options, P_ASSIGN);
                }
                self.write(")");
            }
            EData::RequireString {
                import_record_index,
            } => {
                // Still present only for external records after linking
                let path = self.record_path(*import_record_index);
                let quoted = quote_string(&path, self.options.ascii_only);
                self.write("require(");
                self.write(&quoted);
                self.write(")");
            }
            EData::RequireResolveString {
                import_record_index,
            } => {
                let path = self.record_path(*import_record_index);
                let quoted = quote_string(&path, self.options.ascii_only);
                self.write("require.resolve(");
                self.write(&quoted);
                self.write(")");
            }
        }
    }

    fn print_args(&mut self, args: &[Expr]) {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            self.print_expr(arg, P_ASSIGN);
        }
    }

    fn print_unary(&mut self, unary: &EUnary, min_prec: u8) {
        match unary.op {
            UnOp::PostInc | UnOp::PostDec => {
                let wrap = P_POSTFIX < min_prec;
                if wrap {
                    self.write("(");
                }
                self.print_expr(&unary.value, P_POSTFIX);
                self.write(unary.op.as_str());
                if wrap {
                    self.write(")");
                }
            }
            _ => {
                let wrap = P_PREFIX < min_prec;
                if wrap {
                    self.write("(");
                }
                self.write(unary.op.as_str());
                if matches!(unary.op, UnOp::Typeof | UnOp::Void | UnOp::Delete) {
                    self.write(" ");
                } else if needs_space_between_ops(unary.op, &unary.value) {
                    self.write(" ");
                }
                self.print_expr(&unary.value, P_PREFIX);
                if wrap {
                    self.write(")");
                }
            }
        }
    }

    fn print_binary(&mut self, binary: &EBinary, min_prec: u8) {
        let (prec, right_assoc) = bin_op_prec(binary.op);
        let wrap = prec < min_prec;
        if wrap {
            self.write("(");
        }
        let left_prec = if right_assoc { prec + 1 } else { prec };
        let right_prec = if right_assoc { prec } else { prec + 1 };
        // The left of ** may not be an unparenthesized unary
        let left_prec = if binary.op == BinOp::Pow { P_POSTFIX } else { left_prec };
        self.print_expr(&binary.left, left_prec);
        match binary.op {
            BinOp::Comma => self.write(","),
            BinOp::In | BinOp::Instanceof => {
                self.write(" ");
                self.write(binary.op.as_str());
                self.write(" ");
            }
            _ => {
                self.space();
                self.write(binary.op.as_str());
                self.space();
            }
        }
        if binary.op == BinOp::Comma {
            self.space();
        }
        self.print_expr(&binary.right, right_prec);
        if wrap {
            self.write(")");
        }
    }

    fn print_number(&mut self, n: f64, min_prec: u8) {
        if n.is_nan() {
            self.write("NaN");
            return;
        }
        if n.is_infinite() {
            if n < 0.0 {
                let wrap = P_PREFIX < min_prec;
                if wrap {
                    self.write("(");
                }
                self.write("-Infinity");
                if wrap {
                    self.write(")");
                }
            } else {
                self.write("Infinity");
            }
            return;
        }
        let text = if n.fract() == 0.0 && n.abs() < 1e21 {
            format!("{}", n as i64)
        } else {
            format!("{n}")
        };
        if text.starts_with('-') && P_PREFIX < min_prec {
            self.write("(");
            self.write(&text);
            self.write(")");
        } else {
            self.write(&text);
        }
    }

    fn print_property(&mut self, prop: &Property) {
        match prop.kind {
            PropertyKind::Spread => {
                self.write("...");
                if let Some(value) = &prop.value {
                    self.print_expr(value, P_ASSIGN);
                }
                return;
            }
            PropertyKind::Get => self.write("get "),
            PropertyKind::Set => self.write("set "),
            PropertyKind::Normal => {}
        }

        let value = prop.value.as_ref();
        let as_method = prop.method || prop.kind != PropertyKind::Normal;
        if as_method {
            if let Some(Expr {
                data: EData::Function(func),
                ..
            }) = value
            {
                if func.is_async {
                    self.write("async ");
                }
                if func.is_generator {
                    self.write("*");
                }
                self.print_key_inner(prop);
                self.print_function_rest(func);
                return;
            }
        }

        // Shorthand survives when the name still matches after renaming
        if prop.shorthand {
            if let (EData::String(key), Some(value)) = (&prop.key.data, value) {
                if let EData::Ident(id) = &value.data {
                    let name = self.name_of(id.ref_, &id.name);
                    if &name == key {
                        self.write(&name);
                        return;
                    }
                }
            }
        }

        self.print_key_inner(prop);
        self.write(":");
        self.space();
        if let Some(value) = value {
            self.print_expr(value, P_ASSIGN);
        }
    }

    fn print_key_inner(&mut self, prop: &Property) {
        if prop.computed {
            self.write("[");
            self.print_expr(&prop.key, P_ASSIGN);
            self.write("]");
        } else {
            self.print_property_key(&prop.key);
        }
    }

    fn print_property_key(&mut self, key: &Expr) {
        match &key.data {
            EData::String(s) if is_valid_identifier(s) => self.write(s),
            EData::String(s) => {
                let quoted = quote_string(s, self.options.ascii_only);
                self.write(&quoted);
            }
            EData::Number(n) => self.print_number(*n, P_LOWEST),
            EData::PrivateIdent(p) => {
                self.write("#");
                let name = self.name_of(p.ref_, &p.name);
                self.write(&name);
            }
            _ => self.print_expr(key, P_ASSIGN),
        }
    }

    fn print_template(&mut self, t: &ETemplate) {
        if let Some(tag) = &t.tag {
            self.print_expr(tag, P_CALL);
        }
        self.write("`");
        let head = escape_template_text(&t.head_cooked);
        self.write(&head);
        for part in &t.parts {
            self.write("${");
            self.print_expr(&part.value, P_LOWEST);
            self.write("}");
            let cooked = escape_template_text(&part.cooked);
            self.write(&cooked);
        }
        self.write("`");
    }

    fn print_function_keyword(&mut self, func: &Func) {
        if func.is_async {
            self.write("async ");
        }
        self.write("function");
        if func.is_generator {
            self.write("*");
        }
        self.write(" ");
    }

    fn print_function_rest(&mut self, func: &Func) {
        self.write("(");
        self.print_arg_list(&func.args);
        self.write(")");
        self.space();
        self.print_block(&func.body);
    }

    fn print_arg_list(&mut self, args: &[Arg]) {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            if arg.is_rest {
                self.write("...");
            }
            self.print_binding(&arg.binding);
            if let Some(default) = &arg.default {
                self.space();
                self.write("=");
                self.space();
                self.print_expr(default, P_ASSIGN);
            }
        }
    }

    fn print_class_rest(&mut self, class: &Class) {
        if let Some(extends) = &class.extends {
            self.write(" extends ");
            self.print_expr(extends, P_CALL);
        }
        self.space();
        self.write("{");
        self.indent += 1;
        for prop in &class.properties {
            self.newline();
            self.print_class_property(prop);
        }
        self.indent -= 1;
        self.newline();
        self.write("}");
    }

    fn print_class_property(&mut self, prop: &ClassProperty) {
        if prop.kind == ClassPropertyKind::StaticBlock {
            self.write("static ");
            self.print_block(&prop.block);
            return;
        }
        if prop.is_static {
            self.write("static ");
        }
        match prop.kind {
            ClassPropertyKind::Get => self.write("get "),
            ClassPropertyKind::Set => self.write("set "),
            ClassPropertyKind::Accessor => self.write("accessor "),
            _ => {}
        }
        if let Some(func) = &prop.func {
            if func.is_async {
                self.write("async ");
            }
            if func.is_generator {
                self.write("*");
            }
        }
        if prop.is_computed {
            self.write("[");
            self.print_expr(&prop.key, P_ASSIGN);
            self.write("]");
        } else {
            self.print_property_key(&prop.key);
        }
        match (&prop.func, &prop.initializer) {
            (Some(func), _) => self.print_function_rest(func),
            (None, Some(init)) => {
                self.space();
                self.write("=");
                self.space();
                self.print_expr(init, P_ASSIGN);
                self.write(";");
            }
            (None, None) => self.write(";"),
        }
    }
}

// =============================================================================
// Convenience entry point
// =============================================================================

/// Print a statement list as one file (used by tests and simple paths).
pub fn print_js(
    stmts: &[Stmt],
    symbols: &SymbolMap,
    names: &NameMap,
    source: Option<&Source>,
    options: PrintOptions,
) -> PrintResult {
    let mut printer = Printer::new(symbols, names, options);
    if let Some(source) = source {
        printer.set_source(source);
    }
    for stmt in stmts {
        printer.print_stmt(stmt);
    }
    printer.finish()
}

// =============================================================================
// Text helpers
// =============================================================================

fn starts_with_stmt_ambiguity(e: &Expr) -> bool {
    match &e.data {
        EData::Object(_) | EData::Function(_) | EData::Class(_) => true,
        EData::Binary(b) => starts_with_stmt_ambiguity(&b.left),
        EData::Dot(d) => starts_with_stmt_ambiguity(&d.target),
        EData::Index(i) => starts_with_stmt_ambiguity(&i.target),
        EData::Call(c) => starts_with_stmt_ambiguity(&c.target),
        EData::Cond(c) => starts_with_stmt_ambiguity(&c.test),
        EData::Template(t) => t
            .tag
            .as_deref()
            .is_some_and(starts_with_stmt_ambiguity),
        _ => false,
    }
}

fn expr_contains_call(e: &Expr) -> bool {
    match &e.data {
        EData::Call(_) => true,
        EData::Dot(d) => expr_contains_call(&d.target),
        EData::Index(i) => expr_contains_call(&i.target),
        _ => false,
    }
}

fn needs_space_between_ops(op: UnOp, value: &Expr) -> bool {
    // -(-x) and +(+x) must not fuse into -- / ++
    match (&op, &value.data) {
        (UnOp::Neg, EData::Unary(inner)) => {
            matches!(inner.op, UnOp::Neg | UnOp::PreDec)
        }
        (UnOp::Pos, EData::Unary(inner)) => {
            matches!(inner.op, UnOp::Pos | UnOp::PreInc)
        }
        (UnOp::Neg, EData::Number(n)) => *n < 0.0,
        _ => false,
    }
}

/// Whether a name prints as a bare identifier.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    kestrel_lexer::js::is_identifier(name) && !crate::charfreq::is_reserved_name(name)
}

/// Quote and escape a string literal, preferring double quotes.
#[must_use]
pub fn quote_string(text: &str, ascii_only: bool) -> String {
    let double_count = text.matches('"').count();
    let single_count = text.matches('\'').count();
    let quote = if double_count > single_count { '\'' } else { '"' };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{B}' => out.push_str("\\v"),
            '\u{C}' => out.push_str("\\f"),
            '\0' => out.push_str("\\0"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if ascii_only && !c.is_ascii() => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn escape_template_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}
