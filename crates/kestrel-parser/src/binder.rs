//! The symbol-binding pass.
//!
//! Runs after parsing, still inside the per-file scan task. Walks the AST
//! resolving identifier references to symbol refs, rebuilding scope frames
//! from the declaration refs the parser left on binding patterns. Also:
//!
//! - applies define substitution to unbound identifiers and dotted chains
//! - binds free `exports` / `module` to the synthesized module symbols and
//!   flips the file to CommonJS when it is not already ESM
//! - counts symbol uses per tree-shaking part
//! - resolves private names against the enclosing class bodies
//! - accumulates identifier character frequencies for the minifier

use crate::ast::*;
use crate::js_parser::{DefineExpr, DefineValue, ParserOptions};
use crate::symbols::{Ref, Symbol, SymbolFlags, SymbolKind};
use kestrel_common::Log;
use rustc_hash::FxHashMap;

pub fn bind(ast: &mut Ast, options: &ParserOptions, log: &Log, source_index: u32) {
    let mut parts = std::mem::take(&mut ast.parts);
    let mut binder = Binder {
        log,
        source_index,
        symbols: &mut ast.symbols,
        frames: Vec::new(),
        unbound: FxHashMap::default(),
        defines: &options.defines,
        label_stack: Vec::new(),
        private_stack: Vec::new(),
        fn_stack: Vec::new(),
        part_uses: FxHashMap::default(),
        uses_exports_ref: false,
        uses_module_ref: false,
        exports_ref: ast.exports_ref,
        module_ref: ast.module_ref,
        char_freq: [0u32; 64],
        jsx_component_names: &ast.jsx_component_names,
    };

    // The module frame sees every top-level declaration across parts
    let mut module_members = FxHashMap::default();
    for part in &parts {
        collect_hoisted(&part.stmts, &mut module_members);
        collect_lexical(&part.stmts, &mut module_members);
    }
    binder.frames.push(module_members);

    for (part_index, part) in parts.iter_mut().enumerate() {
        binder.part_uses.clear();
        for stmt in &mut part.stmts {
            binder.visit_stmt(stmt);
            collect_declared(stmt, &mut part.declared_symbols);
        }
        part.symbol_uses = std::mem::take(&mut binder.part_uses);
        for &declared in &part.declared_symbols {
            ast.top_level_symbol_to_parts
                .entry(declared)
                .or_default()
                .push(part_index as u32);
        }
    }

    // Plain `export { x }` clauses bind against the module frame
    let mut late_exports: Vec<(String, Ref, kestrel_common::Span)> = Vec::new();
    for part in &mut parts {
        for stmt in &mut part.stmts {
            if let SData::ExportNamed(export) = &mut stmt.data {
                if export.import_record_index.is_none() {
                    for item in &mut export.items {
                        if !item.name_ref.is_valid() {
                            let r = binder.resolve_or_unbound(&item.original_name);
                            item.name_ref = r;
                            late_exports.push((item.alias.clone(), r, item.alias_span));
                        }
                    }
                }
            }
        }
    }
    for (alias, r, span) in late_exports {
        if r.source == source_index {
            binder.symbols[r.inner as usize]
                .flags
                .insert(SymbolFlags::WAS_EXPORTED);
        }
        if ast.named_exports.contains_key(&alias) {
            log.add_error(
                source_index,
                span,
                format!("Multiple exports with the same name \"{alias}\""),
            );
        } else {
            ast.named_exports
                .insert(alias, NamedExport { ref_: r, alias_span: span });
        }
    }

    binder.frames.pop();

    if binder.uses_exports_ref || binder.uses_module_ref {
        ast.uses_exports_ref = binder.uses_exports_ref;
        ast.uses_module_ref = binder.uses_module_ref;
        if ast.exports_kind == ExportsKind::None {
            ast.exports_kind = ExportsKind::CommonJs;
        }
    }

    ast.char_freq = Some(binder.char_freq);
    tracing::debug!(source_index, parts = parts.len(), "bound file");
    ast.parts = parts;
}

struct Binder<'a> {
    log: &'a Log,
    source_index: u32,
    symbols: &'a mut Vec<Symbol>,
    /// Innermost frame last.
    frames: Vec<FxHashMap<String, Ref>>,
    unbound: FxHashMap<String, Ref>,
    defines: &'a FxHashMap<String, DefineValue>,
    label_stack: Vec<(String, Ref)>,
    /// Private-name maps of enclosing class bodies, innermost last.
    private_stack: Vec<FxHashMap<String, Ref>>,
    /// One entry per enclosing non-arrow function.
    fn_stack: Vec<bool>, // uses_arguments
    part_uses: FxHashMap<Ref, u32>,
    uses_exports_ref: bool,
    uses_module_ref: bool,
    exports_ref: Ref,
    module_ref: Ref,
    char_freq: [u32; 64],
    jsx_component_names: &'a [String],
}

impl<'a> Binder<'a> {
    fn resolve(&self, name: &str) -> Option<Ref> {
        for frame in self.frames.iter().rev() {
            if let Some(&r) = frame.get(name) {
                return Some(r);
            }
        }
        None
    }

    fn resolve_or_unbound(&mut self, name: &str) -> Ref {
        if let Some(r) = self.resolve(name) {
            return r;
        }
        if let Some(&r) = self.unbound.get(name) {
            return r;
        }
        self.symbols.push(Symbol::new(name, SymbolKind::Unbound));
        let r = Ref {
            source: self.source_index,
            inner: (self.symbols.len() - 1) as u32,
        };
        self.unbound.insert(name.to_string(), r);
        r
    }

    fn record_use(&mut self, r: Ref) {
        if r.source == self.source_index {
            let symbol = &mut self.symbols[r.inner as usize];
            symbol.use_count_estimate += 1;
            count_chars(&mut self.char_freq, &symbol.original_name);
        }
        *self.part_uses.entry(r).or_insert(0) += 1;
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.data {
            SData::Empty
            | SData::Debugger
            | SData::Directive(_)
            | SData::TsErased
            | SData::ExportStar(_) => {}
            SData::Expr(e) | SData::Throw(e) => self.visit_expr_owned(e),
            SData::Return(value) => {
                if let Some(value) = value {
                    self.visit_expr_owned(value);
                }
            }
            SData::Block(stmts) => self.visit_stmt_list(stmts),
            SData::If { test, yes, no } => {
                self.visit_expr_owned(test);
                self.visit_stmt(yes);
                if let Some(no) = no {
                    self.visit_stmt(no);
                }
            }
            SData::While { test, body } => {
                self.visit_expr_owned(test);
                self.visit_stmt(body);
            }
            SData::DoWhile { test, body } => {
                self.visit_stmt(body);
                self.visit_expr_owned(test);
            }
            SData::With { value, body } => {
                self.visit_expr_owned(value);
                self.visit_stmt(body);
            }
            SData::For {
                init,
                test,
                update,
                body,
            } => {
                let mut frame = FxHashMap::default();
                if let Some(init) = init.as_deref() {
                    collect_lexical(std::slice::from_ref(init), &mut frame);
                }
                self.frames.push(frame);
                if let Some(init) = init {
                    self.visit_stmt(init);
                }
                if let Some(test) = test {
                    self.visit_expr_owned(test);
                }
                if let Some(update) = update {
                    self.visit_expr_owned(update);
                }
                self.visit_stmt(body);
                self.frames.pop();
            }
            SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
                let mut frame = FxHashMap::default();
                collect_lexical(std::slice::from_ref(init.as_ref()), &mut frame);
                self.frames.push(frame);
                self.visit_stmt(init);
                self.visit_expr_owned(value);
                self.visit_stmt(body);
                self.frames.pop();
            }
            SData::Switch { test, cases } => {
                self.visit_expr_owned(test);
                let mut frame = FxHashMap::default();
                for case in cases.iter() {
                    collect_lexical(&case.body, &mut frame);
                }
                self.frames.push(frame);
                for case in cases {
                    if let Some(value) = &mut case.value {
                        self.visit_expr_owned(value);
                    }
                    for s in &mut case.body {
                        self.visit_stmt(s);
                    }
                }
                self.frames.pop();
            }
            SData::Try {
                block,
                catch,
                finally,
            } => {
                self.visit_stmt_list(block);
                if let Some(catch) = catch {
                    let mut frame = FxHashMap::default();
                    if let Some(binding) = &catch.binding {
                        collect_binding(binding, &mut frame);
                    }
                    self.frames.push(frame);
                    if let Some(binding) = &mut catch.binding {
                        self.visit_binding(binding);
                    }
                    self.visit_stmt_list(&mut catch.body);
                    self.frames.pop();
                }
                if let Some(finally) = finally {
                    self.visit_stmt_list(finally);
                }
            }
            SData::Break(label) | SData::Continue(label) => {
                if let Some((name, r)) = label {
                    if let Some((_, found)) = self
                        .label_stack
                        .iter()
                        .rev()
                        .find(|(n, _)| n == name)
                    {
                        *r = *found;
                        let found = *found;
                        self.record_use(found);
                    } else {
                        self.log.add_error(
                            self.source_index,
                            stmt.span,
                            format!("There is no containing label named \"{name}\""),
                        );
                    }
                }
            }
            SData::Label { name, ref_, stmt } => {
                self.label_stack.push((name.clone(), *ref_));
                self.visit_stmt(stmt);
                self.label_stack.pop();
            }
            SData::Local(local) => {
                for decl in &mut local.decls {
                    self.visit_binding(&mut decl.binding);
                    if let Some(value) = &mut decl.value {
                        self.visit_expr_owned(value);
                    }
                }
            }
            SData::Function { func, .. } => self.visit_func(func),
            SData::Class { class, .. } => self.visit_class(class),
            SData::Import(_) => {}
            SData::ExportNamed(_) => {
                // Items resolved in a later pass over the module frame
            }
            SData::ExportDefault(export) => match &mut export.value {
                ExportDefaultValue::Expr(e) => self.visit_expr_owned(e),
                ExportDefaultValue::Func(func) => self.visit_func(func),
                ExportDefaultValue::Class(class) => self.visit_class(class),
            },
            SData::Enum { members, .. } => {
                for member in members {
                    if let Some(value) = &mut member.value {
                        self.visit_expr_owned(value);
                    }
                }
            }
            SData::Namespace { body, .. } => {
                // Namespace bodies scope like function bodies
                let mut frame = FxHashMap::default();
                collect_hoisted(body, &mut frame);
                collect_lexical(body, &mut frame);
                self.frames.push(frame);
                self.visit_stmt_list(body);
                self.frames.pop();
            }
        }
    }

    fn visit_stmt_list(&mut self, stmts: &mut Vec<Stmt>) {
        let mut frame = FxHashMap::default();
        collect_lexical(stmts, &mut frame);
        self.frames.push(frame);
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
        self.frames.pop();
    }

    fn visit_binding(&mut self, binding: &mut Binding) {
        match binding {
            Binding::Ident(id) => {
                // Declarations count as one use for frequency purposes
                count_chars(&mut self.char_freq, &id.name);
            }
            Binding::Array { items, rest } => {
                for item in items.iter_mut().flatten() {
                    self.visit_binding(&mut item.binding);
                    if let Some(default) = &mut item.default {
                        self.visit_expr_owned(default);
                    }
                }
                if let Some(rest) = rest {
                    self.visit_binding(rest);
                }
            }
            Binding::Object { properties, rest } => {
                for prop in properties {
                    if prop.computed {
                        self.visit_expr_owned(&mut prop.key);
                    }
                    self.visit_binding(&mut prop.binding);
                    if let Some(default) = &mut prop.default {
                        self.visit_expr_owned(default);
                    }
                }
                if let Some(rest) = rest {
                    self.visit_binding(rest);
                }
            }
        }
    }

    fn visit_func(&mut self, func: &mut Func) {
        let mut frame = FxHashMap::default();
        for arg in &func.args {
            collect_binding(&arg.binding, &mut frame);
        }
        collect_hoisted(&func.body, &mut frame);
        collect_lexical(&func.body, &mut frame);
        if let Some(name) = &func.name {
            frame.entry(name.name.clone()).or_insert(name.ref_);
        }
        self.frames.push(frame);
        self.fn_stack.push(false);
        for arg in &mut func.args {
            for decorator in &mut arg.decorators {
                self.visit_expr_owned(decorator);
            }
            self.visit_binding(&mut arg.binding);
            if let Some(default) = &mut arg.default {
                self.visit_expr_owned(default);
            }
        }
        for stmt in &mut func.body {
            self.visit_stmt(stmt);
        }
        func.uses_arguments = self.fn_stack.pop().unwrap_or(false);
        self.frames.pop();
    }

    fn visit_arrow(&mut self, arrow: &mut EArrow) {
        let mut frame = FxHashMap::default();
        for arg in &arrow.args {
            collect_binding(&arg.binding, &mut frame);
        }
        if let ArrowBody::Stmts(stmts) = &arrow.body {
            collect_hoisted(stmts, &mut frame);
            collect_lexical(stmts, &mut frame);
        }
        self.frames.push(frame);
        for arg in &mut arrow.args {
            self.visit_binding(&mut arg.binding);
            if let Some(default) = &mut arg.default {
                self.visit_expr_owned(default);
            }
        }
        match &mut arrow.body {
            ArrowBody::Expr(e) => self.visit_expr_owned(e),
            ArrowBody::Stmts(stmts) => {
                for stmt in stmts {
                    self.visit_stmt(stmt);
                }
            }
        }
        self.frames.pop();
    }

    fn visit_class(&mut self, class: &mut Class) {
        for decorator in &mut class.decorators {
            self.visit_expr_owned(decorator);
        }
        if let Some(extends) = &mut class.extends {
            self.visit_expr_owned(extends);
        }
        // The class name is visible inside the class body
        let mut frame = FxHashMap::default();
        if let Some(name) = &class.name {
            frame.insert(name.name.clone(), name.ref_);
        }
        self.frames.push(frame);

        let mut privates = FxHashMap::default();
        for prop in &class.properties {
            if let EData::PrivateIdent(p) = &prop.key.data {
                privates.insert(p.name.clone(), p.ref_);
            }
        }
        self.private_stack.push(privates);

        for prop in &mut class.properties {
            for decorator in &mut prop.decorators {
                self.visit_expr_owned(decorator);
            }
            if prop.is_computed {
                self.visit_expr_owned(&mut prop.key);
            }
            if let Some(func) = &mut prop.func {
                self.visit_func(func);
            }
            if let Some(initializer) = &mut prop.initializer {
                self.visit_expr_owned(initializer);
            }
            if !prop.block.is_empty() {
                let mut block = std::mem::take(&mut prop.block);
                self.visit_stmt_list(&mut block);
                prop.block = block;
            }
        }

        self.private_stack.pop();
        self.frames.pop();
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn visit_expr_owned(&mut self, expr: &mut Expr) {
        // Define substitution looks at the whole node before descending
        if let Some(replacement) = self.try_define_substitution(expr) {
            expr.data = replacement;
            return;
        }

        match &mut expr.data {
            EData::Undefined
            | EData::Null
            | EData::This
            | EData::Super
            | EData::Boolean(_)
            | EData::Number(_)
            | EData::BigInt(_)
            | EData::String(_)
            | EData::RegExp(_)
            | EData::ImportMeta
            | EData::NewTarget
            | EData::RequireString { .. }
            | EData::RequireResolveString { .. } => {}
            EData::Ident(id) => {
                if id.name == "arguments"
                    && !self.fn_stack.is_empty()
                    && self.resolve("arguments").is_none()
                {
                    if let Some(top) = self.fn_stack.last_mut() {
                        *top = true;
                    }
                }
                // Free `exports` / `module` bind to the synthesized module
                // symbols; that is how CommonJS files are detected
                let r = match self.resolve(&id.name) {
                    Some(r) => r,
                    None if id.name == "exports" => self.exports_ref,
                    None if id.name == "module" => self.module_ref,
                    None => self.resolve_or_unbound(&id.name),
                };
                id.ref_ = r;
                if r == self.exports_ref {
                    self.uses_exports_ref = true;
                } else if r == self.module_ref {
                    self.uses_module_ref = true;
                }
                if self.jsx_component_names.iter().any(|n| n == &id.name)
                    && r.source == self.source_index
                {
                    self.symbols[r.inner as usize]
                        .flags
                        .insert(SymbolFlags::MUST_START_WITH_CAPITAL_LETTER_FOR_JSX);
                }
                self.record_use(r);
            }
            EData::PrivateIdent(p) => {
                if let Some(r) = self.resolve_private(&p.name) {
                    p.ref_ = r;
                    self.record_use(r);
                } else {
                    self.log.add_error(
                        self.source_index,
                        expr.span,
                        format!("Private name \"#{}\" must be declared in an enclosing class", p.name),
                    );
                }
            }
            EData::Array(items) => {
                for item in items {
                    self.visit_expr_owned(item);
                }
            }
            EData::Object(properties) => {
                for prop in properties {
                    if prop.computed {
                        self.visit_expr_owned(&mut prop.key);
                    }
                    if let Some(value) = &mut prop.value {
                        self.visit_expr_owned(value);
                    }
                }
            }
            EData::Spread(e) | EData::Await(e) => self.visit_expr_owned(e),
            EData::Template(t) => {
                if let Some(tag) = &mut t.tag {
                    self.visit_expr_owned(tag);
                }
                for part in &mut t.parts {
                    self.visit_expr_owned(&mut part.value);
                }
            }
            EData::Dot(dot) => self.visit_expr_owned(&mut dot.target),
            EData::Index(index) => {
                self.visit_expr_owned(&mut index.target);
                self.visit_expr_owned(&mut index.index);
            }
            EData::Call(call) => {
                self.visit_expr_owned(&mut call.target);
                for arg in &mut call.args {
                    self.visit_expr_owned(arg);
                }
            }
            EData::New(new) => {
                self.visit_expr_owned(&mut new.target);
                for arg in &mut new.args {
                    self.visit_expr_owned(arg);
                }
            }
            EData::Unary(unary) => self.visit_expr_owned(&mut unary.value),
            EData::Binary(binary) => {
                self.visit_expr_owned(&mut binary.left);
                self.visit_expr_owned(&mut binary.right);
            }
            EData::Cond(cond) => {
                self.visit_expr_owned(&mut cond.test);
                self.visit_expr_owned(&mut cond.yes);
                self.visit_expr_owned(&mut cond.no);
            }
            EData::Arrow(arrow) => self.visit_arrow(arrow),
            EData::Function(func) => {
                self.visit_func(func);
            }
            EData::Class(class) => self.visit_class(class),
            EData::Yield(y) => {
                if let Some(value) = &mut y.value {
                    self.visit_expr_owned(value);
                }
            }
            EData::ImportCall(call) => {
                self.visit_expr_owned(&mut call.expr);
                if let Some(options) = &mut call.options {
                    self.visit_expr_owned(options);
                }
            }
        }
    }

    fn resolve_private(&self, name: &str) -> Option<Ref> {
        for map in self.private_stack.iter().rev() {
            if let Some(&r) = map.get(name) {
                return Some(r);
            }
        }
        None
    }

    // =========================================================================
    // Defines
    // =========================================================================

    /// If the expression is a define target (an unbound identifier or a
    /// dotted chain rooted at one, or a call of a dropped method), return
    /// its replacement.
    fn try_define_substitution(&mut self, expr: &Expr) -> Option<EData> {
        if self.defines.is_empty() {
            return None;
        }
        let defines = self.defines;
        match &expr.data {
            EData::Call(call) => {
                let path = self.define_path_of(&call.target)?;
                let define = defines.get(&path)?;
                if define.method_calls_must_be_replaced_with_undefined {
                    // The arguments are dropped without evaluation
                    Some(EData::Undefined)
                } else {
                    None
                }
            }
            EData::Ident(_) | EData::Dot(_) => {
                let path = self.define_path_of(expr)?;
                let define = defines.get(&path)?;
                Some(self.define_replacement(&define.value))
            }
            _ => None,
        }
    }

    /// The dotted path of `a.b.c` when rooted at an unbound identifier.
    fn define_path_of(&self, expr: &Expr) -> Option<String> {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = expr;
        loop {
            match &current.data {
                EData::Dot(dot) => {
                    if dot.optional_chain != OptionalChain::None {
                        return None;
                    }
                    segments.push(&dot.name);
                    current = &dot.target;
                }
                EData::Ident(id) => {
                    // Only free identifiers participate in defines
                    if self.resolve(&id.name).is_some() {
                        return None;
                    }
                    segments.push(&id.name);
                    segments.reverse();
                    return Some(segments.join("."));
                }
                _ => return None,
            }
        }
    }

    fn define_replacement(&mut self, value: &DefineExpr) -> EData {
        match value {
            DefineExpr::Undefined => EData::Undefined,
            DefineExpr::Null => EData::Null,
            DefineExpr::Bool(b) => EData::Boolean(*b),
            DefineExpr::Number(n) => EData::Number(*n),
            DefineExpr::String(s) => EData::String(s.clone()),
            DefineExpr::Chain(segments) => {
                let head = segments.first().cloned().unwrap_or_default();
                let r = self.resolve_or_unbound(&head);
                self.record_use(r);
                let mut data = EData::Ident(EIdent { name: head, ref_: r });
                for segment in &segments[1..] {
                    data = EData::Dot(EDot {
                        target: Box::new(Expr::synth(data)),
                        name: segment.clone(),
                        name_span: kestrel_common::Span::DUMMY,
                        optional_chain: OptionalChain::None,
                    });
                }
                data
            }
        }
    }
}

// =============================================================================
// Declaration collection
// =============================================================================

fn collect_binding(binding: &Binding, members: &mut FxHashMap<String, Ref>) {
    binding.each_ident(&mut |id| {
        members.entry(id.name.clone()).or_insert(id.ref_);
    });
}

/// `var` and function declarations visible from nested blocks, without
/// entering nested function bodies.
fn collect_hoisted(stmts: &[Stmt], members: &mut FxHashMap<String, Ref>) {
    for stmt in stmts {
        match &stmt.data {
            SData::Local(local) if local.kind == LocalKind::Var => {
                for decl in &local.decls {
                    collect_binding(&decl.binding, members);
                }
            }
            SData::Function { func, name_ref, .. } => {
                if let Some(name) = &func.name {
                    members.entry(name.name.clone()).or_insert(*name_ref);
                }
            }
            SData::Block(stmts) => collect_hoisted(stmts, members),
            SData::If { yes, no, .. } => {
                collect_hoisted(std::slice::from_ref(yes), members);
                if let Some(no) = no {
                    collect_hoisted(std::slice::from_ref(no), members);
                }
            }
            SData::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_hoisted(std::slice::from_ref(init), members);
                }
                collect_hoisted(std::slice::from_ref(body), members);
            }
            SData::ForIn { init, body, .. } | SData::ForOf { init, body, .. } => {
                collect_hoisted(std::slice::from_ref(init), members);
                collect_hoisted(std::slice::from_ref(body), members);
            }
            SData::While { body, .. } | SData::DoWhile { body, .. }
            | SData::With { body, .. } => {
                collect_hoisted(std::slice::from_ref(body), members);
            }
            SData::Label { stmt, .. } => collect_hoisted(std::slice::from_ref(stmt), members),
            SData::Try {
                block,
                catch,
                finally,
            } => {
                collect_hoisted(block, members);
                if let Some(catch) = catch {
                    collect_hoisted(&catch.body, members);
                }
                if let Some(finally) = finally {
                    collect_hoisted(finally, members);
                }
            }
            SData::Switch { cases, .. } => {
                for case in cases {
                    collect_hoisted(&case.body, members);
                }
            }
            _ => {}
        }
    }
}

/// Lexical declarations at this exact statement-list level.
fn collect_lexical(stmts: &[Stmt], members: &mut FxHashMap<String, Ref>) {
    for stmt in stmts {
        match &stmt.data {
            SData::Local(local) if local.kind != LocalKind::Var => {
                for decl in &local.decls {
                    collect_binding(&decl.binding, members);
                }
            }
            SData::Class { class, name_ref, .. } => {
                if let Some(name) = &class.name {
                    members.entry(name.name.clone()).or_insert(*name_ref);
                }
            }
            SData::Import(import) => {
                if let Some(default) = &import.default_name {
                    members.entry(default.name.clone()).or_insert(default.ref_);
                }
                if let Some(star) = &import.star_name {
                    members.entry(star.name.clone()).or_insert(star.ref_);
                }
                for item in &import.items {
                    members
                        .entry(item.original_name.clone())
                        .or_insert(item.name_ref);
                }
            }
            SData::Enum { name, name_ref, .. } | SData::Namespace { name, name_ref, .. } => {
                members.entry(name.clone()).or_insert(*name_ref);
            }
            SData::ExportDefault(export) => match &export.value {
                ExportDefaultValue::Func(func) => {
                    if let Some(name) = &func.name {
                        members.entry(name.name.clone()).or_insert(name.ref_);
                    }
                }
                ExportDefaultValue::Class(class) => {
                    if let Some(name) = &class.name {
                        members.entry(name.name.clone()).or_insert(name.ref_);
                    }
                }
                ExportDefaultValue::Expr(_) => {}
            },
            _ => {}
        }
    }
}

/// Top-level symbols a part declares (for `top_level_symbol_to_parts`).
fn collect_declared(stmt: &Stmt, out: &mut Vec<Ref>) {
    match &stmt.data {
        SData::Local(local) => {
            for decl in &local.decls {
                decl.binding.each_ident(&mut |id| out.push(id.ref_));
            }
        }
        SData::Function { name_ref, .. } | SData::Class { name_ref, .. } => {
            out.push(*name_ref);
        }
        SData::Import(import) => {
            if let Some(default) = &import.default_name {
                out.push(default.ref_);
            }
            if let Some(star) = &import.star_name {
                out.push(star.ref_);
            }
            for item in &import.items {
                out.push(item.name_ref);
            }
        }
        SData::ExportDefault(export) => {
            out.push(export.default_ref);
            match &export.value {
                ExportDefaultValue::Func(func) => {
                    if let Some(name) = &func.name {
                        out.push(name.ref_);
                    }
                }
                ExportDefaultValue::Class(class) => {
                    if let Some(name) = &class.name {
                        out.push(name.ref_);
                    }
                }
                ExportDefaultValue::Expr(_) => {}
            }
        }
        SData::ExportNamed(export) => {
            for item in &export.items {
                if item.name_ref.is_valid() {
                    out.push(item.name_ref);
                }
            }
        }
        SData::ExportStar(star) => {
            if let Some((_, r)) = &star.alias {
                out.push(*r);
            }
        }
        SData::Enum { name_ref, .. } | SData::Namespace { name_ref, .. } => {
            out.push(*name_ref);
        }
        _ => {}
    }
}

/// The 64-candidate frequency table: a-z, A-Z, 0-9, `_`, `$`.
pub fn char_freq_index(c: u8) -> Option<usize> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as usize),
        b'A'..=b'Z' => Some((c - b'A') as usize + 26),
        b'0'..=b'9' => Some((c - b'0') as usize + 52),
        b'_' => Some(62),
        b'$' => Some(63),
        _ => None,
    }
}

fn count_chars(freq: &mut [u32; 64], name: &str) {
    for &b in name.as_bytes() {
        if let Some(i) = char_freq_index(b) {
            freq[i] += 1;
        }
    }
}
