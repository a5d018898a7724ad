//! Target-dependent AST lowering.
//!
//! Each rewrite is gated by the unsupported-feature bitset derived from the
//! configured target. Rewrites run post-order: children first, so outer
//! rewrites always see already-lowered inner constructs. Helpers are
//! referenced through per-file injected symbols that the linker later
//! merges with the runtime module's exports.

mod class;
mod using;

use indexmap::IndexMap;
use kestrel_common::{CompatFeatures, Log, Span, Target};
use kestrel_parser::ast::*;
use kestrel_parser::symbols::{Ref, Symbol, SymbolKind};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub target: Target,
    pub keep_names: bool,
    /// Mirrors TypeScript's `useDefineForClassFields`.
    pub use_define_for_class_fields: bool,
    /// Extra unsupported features beyond what the target implies (used to
    /// force specific lowerings).
    pub extra_unsupported: CompatFeatures,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            target: Target::EsNext,
            keep_names: false,
            use_define_for_class_fields: true,
            extra_unsupported: CompatFeatures::empty(),
        }
    }
}

/// Lower one file's AST in place.
pub fn lower(ast: &mut Ast, source_index: u32, options: &TransformOptions, log: &Log) {
    let unsupported = CompatFeatures::unsupported_by(options.target) | options.extra_unsupported;
    let mut parts = std::mem::take(&mut ast.parts);
    let mut ctx = Lower {
        unsupported,
        symbols: &mut ast.symbols,
        source_index,
        log,
        options,
        runtime_imports: std::mem::take(&mut ast.runtime_imports),
        temp_counter: 0,
        temps_stack: vec![Vec::new()],
        private_env: FxHashMap::default(),
        class_static_prelude: Vec::new(),
        part_helper_uses: rustc_hash::FxHashSet::default(),
    };

    // Import attributes cannot be represented in older targets
    if unsupported.has(CompatFeatures::IMPORT_ATTRIBUTES) {
        for record in &ast.import_records {
            if !record.attributes.is_empty() {
                log.add_error(
                    source_index,
                    record.range,
                    format!(
                        "Import attributes are not available in the configured target \
                         (while resolving \"{}\")",
                        record.path
                    ),
                );
            }
        }
    }

    for part in &mut parts {
        ctx.part_helper_uses.clear();
        ctx.visit_stmt_list(&mut part.stmts);
        // Lowered code references runtime helpers; record those uses so
        // tree shaking pulls the helper parts through
        for &helper_ref in &ctx.part_helper_uses {
            *part.symbol_uses.entry(helper_ref).or_insert(0) += 1;
        }
    }

    // Module-level temporaries go into a part of their own, appended so
    // existing part indices stay valid; `var` hoisting makes the position
    // irrelevant
    let module_temps = ctx.temps_stack.pop().unwrap_or_default();
    if !module_temps.is_empty() {
        let temp_refs: Vec<Ref> = module_temps.iter().map(|(r, _)| *r).collect();
        let decl = ctx.temp_decl_stmt(module_temps);
        let mut part = kestrel_parser::Part::new(vec![decl]);
        part.declared_symbols = temp_refs.clone();
        let part_index = parts.len() as u32;
        for r in temp_refs {
            ast.top_level_symbol_to_parts.entry(r).or_default().push(part_index);
        }
        parts.push(part);
    }

    tracing::debug!(
        source_index,
        helpers = ctx.runtime_imports.len(),
        "lowered file"
    );
    ast.runtime_imports = ctx.runtime_imports;
    ast.parts = parts;
}

pub(crate) struct Lower<'a> {
    pub(crate) unsupported: CompatFeatures,
    pub(crate) symbols: &'a mut Vec<Symbol>,
    pub(crate) source_index: u32,
    pub(crate) log: &'a Log,
    pub(crate) options: &'a TransformOptions,
    pub(crate) runtime_imports: IndexMap<String, Ref>,
    temp_counter: u32,
    /// One frame per enclosing function; temps land in the innermost.
    temps_stack: Vec<Vec<(Ref, String)>>,
    /// Lowered private names of enclosing classes: ref -> lowering info.
    pub(crate) private_env: FxHashMap<Ref, class::PrivateLowering>,
    /// Statements a class expression lowering needs hoisted before itself.
    pub(crate) class_static_prelude: Vec<Stmt>,
    /// Helper refs touched while lowering the current part.
    pub(crate) part_helper_uses: rustc_hash::FxHashSet<Ref>,
}

impl<'a> Lower<'a> {
    // =========================================================================
    // Infrastructure
    // =========================================================================

    pub(crate) fn new_symbol(&mut self, kind: SymbolKind, name: impl Into<String>) -> Ref {
        self.symbols.push(Symbol::new(name, kind));
        Ref {
            source: self.source_index,
            inner: (self.symbols.len() - 1) as u32,
        }
    }

    /// A reference to a runtime helper, e.g. `__async`.
    pub(crate) fn helper(&mut self, name: &str) -> Expr {
        if let Some(&r) = self.runtime_imports.get(name) {
            self.part_helper_uses.insert(r);
            return Expr::ident(r, name);
        }
        let r = self.new_symbol(SymbolKind::Injected, name);
        self.runtime_imports.insert(name.to_string(), r);
        self.part_helper_uses.insert(r);
        Expr::ident(r, name)
    }

    /// A fresh temporary hoisted as `var` in the enclosing function.
    pub(crate) fn temp(&mut self) -> (Ref, String) {
        let counter = self.temp_counter;
        self.temp_counter += 1;
        let name = if counter < 26 {
            format!("_{}", (b'a' + counter as u8) as char)
        } else {
            format!("_{}", counter - 26)
        };
        let r = self.new_symbol(SymbolKind::Injected, &name);
        if let Some(frame) = self.temps_stack.last_mut() {
            frame.push((r, name.clone()));
        }
        (r, name)
    }

    fn temp_decl_stmt(&mut self, temps: Vec<(Ref, String)>) -> Stmt {
        Stmt::synth(SData::Local(SLocal {
            kind: LocalKind::Var,
            decls: temps
                .into_iter()
                .map(|(r, name)| Decl {
                    binding: Binding::Ident(EIdent { name, ref_: r }),
                    value: None,
                })
                .collect(),
            is_export: false,
        }))
    }

    /// Register an externally created symbol as a hoisted `var` in the
    /// enclosing function (used for private brand storage).
    pub(crate) fn reserve_named_temp(&mut self, r: Ref, name: &str) {
        if let Some(frame) = self.temps_stack.last_mut() {
            if !frame.iter().any(|(existing, _)| *existing == r) {
                frame.push((r, name.to_string()));
            }
        }
    }

    /// True when lowering statements at the module's top level (no
    /// enclosing function frame).
    pub(crate) fn at_module_top_level(&self) -> bool {
        self.temps_stack.len() == 1
    }

    pub(crate) fn push_fn_frame(&mut self) {
        self.temps_stack.push(Vec::new());
    }

    /// Pop the function frame, prepending a `var` declaration for any
    /// temporaries it accumulated.
    pub(crate) fn pop_fn_frame(&mut self, body: &mut Vec<Stmt>) {
        let temps = self.temps_stack.pop().unwrap_or_default();
        if !temps.is_empty() {
            let decl = self.temp_decl_stmt(temps);
            body.insert(0, decl);
        }
    }

    fn has(&self, feature: CompatFeatures) -> bool {
        self.unsupported.has(feature)
    }

    // =========================================================================
    // Statement visiting
    // =========================================================================

    pub(crate) fn visit_stmt_list(&mut self, stmts: &mut Vec<Stmt>) {
        let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len());
        for mut stmt in stmts.drain(..) {
            self.visit_stmt(&mut stmt, &mut out);
        }
        *stmts = out;

        // `using` declarations in this exact list wrap the tail of the
        // block in try/catch/finally
        if self.has(CompatFeatures::USING) {
            self.lower_using_in_list(stmts);
        }
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt, out: &mut Vec<Stmt>) {
        match &mut stmt.data {
            SData::Block(stmts) => self.visit_stmt_list(stmts),
            SData::Expr(e) | SData::Throw(e) => self.visit_expr(e, false),
            SData::Return(Some(e)) => self.visit_expr(e, false),
            SData::Return(None)
            | SData::Empty
            | SData::Debugger
            | SData::Directive(_)
            | SData::TsErased
            | SData::Break(_)
            | SData::Continue(_)
            | SData::Import(_)
            | SData::ExportNamed(_)
            | SData::ExportStar(_) => {}
            SData::If { test, yes, no } => {
                self.visit_expr(test, false);
                self.visit_stmt_boxed(yes, out);
                if let Some(no) = no {
                    self.visit_stmt_boxed(no, out);
                }
            }
            SData::While { test, body } => {
                self.visit_expr(test, false);
                self.visit_stmt_boxed(body, out);
            }
            SData::DoWhile { test, body } => {
                self.visit_stmt_boxed(body, out);
                self.visit_expr(test, false);
            }
            SData::With { value, body } => {
                self.visit_expr(value, false);
                self.visit_stmt_boxed(body, out);
            }
            SData::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.visit_stmt_boxed(init, out);
                }
                if let Some(test) = test {
                    self.visit_expr(test, false);
                }
                if let Some(update) = update {
                    self.visit_expr(update, false);
                }
                self.visit_stmt_boxed(body, out);
            }
            SData::ForIn { init, value, body } => {
                self.visit_stmt_boxed(init, out);
                self.visit_expr(value, false);
                self.visit_stmt_boxed(body, out);
            }
            SData::ForOf {
                init, value, body, ..
            } => {
                self.visit_stmt_boxed(init, out);
                self.visit_expr(value, false);
                self.visit_stmt_boxed(body, out);
                // Post-processed below: `for (using x of y)` rewrites the
                // body and `for await` may expand the whole loop
            }
            SData::Switch { test, cases } => {
                self.visit_expr(test, false);
                for case in cases.iter_mut() {
                    if let Some(value) = &mut case.value {
                        self.visit_expr(value, false);
                    }
                    self.visit_stmt_list(&mut case.body);
                }
            }
            SData::Try {
                block,
                catch,
                finally,
            } => {
                self.visit_stmt_list(block);
                if let Some(catch) = catch {
                    if catch.binding.is_none()
                        && self.has(CompatFeatures::OPTIONAL_CATCH_BINDING)
                    {
                        // `catch {}` needs a binding in older targets
                        let (r, name) = self.temp_in_place();
                        catch.binding = Some(Binding::Ident(EIdent { name, ref_: r }));
                    }
                    self.visit_stmt_list(&mut catch.body);
                }
                if let Some(finally) = finally {
                    self.visit_stmt_list(finally);
                }
            }
            SData::Label { stmt, .. } => self.visit_stmt_boxed(stmt, out),
            SData::Local(local) => {
                for decl in &mut local.decls {
                    self.visit_binding(&mut decl.binding);
                    if let Some(value) = &mut decl.value {
                        self.visit_expr(value, false);
                    }
                }
                if self.has(CompatFeatures::OBJECT_REST_SPREAD) {
                    if let Some(mut expansion) = self.lower_object_rest_decls(local) {
                        out.append(&mut expansion);
                        return;
                    }
                }
            }
            SData::Function { func, .. } => self.visit_func(func),
            SData::Class { .. } => {
                let lowered = self.lower_class_stmt(stmt);
                out.extend(lowered);
                return;
            }
            SData::ExportDefault(export) => match &mut export.value {
                ExportDefaultValue::Expr(e) => self.visit_expr(e, false),
                ExportDefaultValue::Func(func) => self.visit_func(func),
                ExportDefaultValue::Class(_) => {
                    let lowered = self.lower_class_stmt(stmt);
                    out.extend(lowered);
                    return;
                }
            },
            SData::Enum { .. } => {
                let lowered = self.lower_enum(stmt);
                out.push(lowered);
                return;
            }
            SData::Namespace { .. } => {
                let mut lowered = self.lower_namespace(stmt);
                out.append(&mut lowered);
                return;
            }
        }

        // Whole-statement rewrites that need the finished children
        if matches!(stmt.data, SData::ForOf { .. }) && self.has(CompatFeatures::USING) {
            self.lower_for_of_using(stmt);
        }
        if matches!(stmt.data, SData::ForOf { is_await: true, .. })
            && self.has(CompatFeatures::FOR_AWAIT)
        {
            if let Some(lowered) = self.lower_for_await(stmt) {
                *stmt = lowered;
            }
        }
        if matches!(stmt.data, SData::Switch { .. }) && self.has(CompatFeatures::USING) {
            self.lower_using_in_switch(stmt);
        }

        out.push(std::mem::replace(stmt, Stmt::synth(SData::Empty)));
    }

    fn visit_stmt_boxed(&mut self, stmt: &mut Box<Stmt>, _out: &mut Vec<Stmt>) {
        // A nested single statement that expands becomes a block
        let mut expanded = Vec::new();
        self.visit_stmt(stmt, &mut expanded);
        match expanded.len() {
            0 => {}
            1 => **stmt = expanded.into_iter().next().unwrap(),
            _ => **stmt = Stmt::synth(SData::Block(expanded)),
        }
    }

    /// A temp that is NOT hoisted (used for catch bindings, loop locals).
    pub(crate) fn temp_in_place(&mut self) -> (Ref, String) {
        let counter = self.temp_counter;
        self.temp_counter += 1;
        let name = if counter < 26 {
            format!("_{}", (b'a' + counter as u8) as char)
        } else {
            format!("_{}", counter - 26)
        };
        let r = self.new_symbol(SymbolKind::Injected, &name);
        (r, name)
    }

    fn visit_binding(&mut self, binding: &mut Binding) {
        match binding {
            Binding::Ident(_) => {}
            Binding::Array { items, rest } => {
                for item in items.iter_mut().flatten() {
                    self.visit_binding(&mut item.binding);
                    if let Some(default) = &mut item.default {
                        self.visit_expr(default, false);
                    }
                }
                if let Some(rest) = rest {
                    self.visit_binding(rest);
                }
            }
            Binding::Object { properties, rest } => {
                for prop in properties {
                    if prop.computed {
                        self.visit_expr(&mut prop.key, false);
                    }
                    self.visit_binding(&mut prop.binding);
                    if let Some(default) = &mut prop.default {
                        self.visit_expr(default, false);
                    }
                }
                if let Some(rest) = rest {
                    self.visit_binding(rest);
                }
            }
        }
    }

    pub(crate) fn visit_func(&mut self, func: &mut Func) {
        self.push_fn_frame();
        for arg in &mut func.args {
            self.visit_binding(&mut arg.binding);
            if let Some(default) = &mut arg.default {
                self.visit_expr(default, false);
            }
        }
        self.visit_stmt_list(&mut func.body);
        self.pop_fn_frame(&mut func.body);

        if func.is_async {
            if func.is_generator && self.has(CompatFeatures::ASYNC_GENERATOR) {
                self.lower_async_generator(func);
            } else if !func.is_generator && self.has(CompatFeatures::ASYNC_AWAIT) {
                self.lower_async_function(func);
            }
        }
    }

    // =========================================================================
    // Expression visiting
    // =========================================================================

    /// `is_chain_link` is true when the parent is an optional-chain node
    /// that will lower this link together with the whole chain.
    pub(crate) fn visit_expr(&mut self, expr: &mut Expr, is_chain_link: bool) {
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
            | EData::Ident(_)
            | EData::PrivateIdent(_)
            | EData::ImportMeta
            | EData::NewTarget
            | EData::RequireString { .. }
            | EData::RequireResolveString { .. } => {}
            EData::Array(items) => {
                for item in items {
                    self.visit_expr(item, false);
                }
            }
            EData::Object(_) => {
                if let EData::Object(properties) = &mut expr.data {
                    for prop in properties.iter_mut() {
                        if prop.computed {
                            self.visit_expr(&mut prop.key, false);
                        }
                        if let Some(value) = &mut prop.value {
                            self.visit_expr(value, false);
                        }
                    }
                }
                if self.has(CompatFeatures::OBJECT_REST_SPREAD) {
                    self.lower_object_spread(expr);
                }
            }
            EData::Spread(e) => self.visit_expr(e, false),
            EData::Template(_) => {
                if let EData::Template(t) = &mut expr.data {
                    if let Some(tag) = &mut t.tag {
                        self.visit_expr(tag, false);
                    }
                    for part in &mut t.parts {
                        self.visit_expr(&mut part.value, false);
                    }
                }
                self.maybe_lower_tagged_template(expr);
            }
            EData::Dot(_) | EData::Index(_) | EData::Call(_) => {
                self.visit_chain_node(expr, is_chain_link);
            }
            EData::New(new) => {
                self.visit_expr(&mut new.target, false);
                for arg in &mut new.args {
                    self.visit_expr(arg, false);
                }
            }
            EData::Unary(_) => {
                if self.maybe_lower_private_update(expr) {
                    return;
                }
                if let EData::Unary(unary) = &mut expr.data {
                    self.visit_expr(&mut unary.value, false);
                }
            }
            EData::Binary(_) => {
                if self.maybe_lower_private_assign(expr) {
                    return;
                }
                if let EData::Binary(binary) = &mut expr.data {
                    self.visit_expr(&mut binary.left, false);
                    self.visit_expr(&mut binary.right, false);
                }
                self.lower_binary(expr);
            }
            EData::Cond(cond) => {
                self.visit_expr(&mut cond.test, false);
                self.visit_expr(&mut cond.yes, false);
                self.visit_expr(&mut cond.no, false);
            }
            EData::Arrow(_) => {
                if let EData::Arrow(arrow) = &mut expr.data {
                    self.push_fn_frame();
                    for arg in &mut arrow.args {
                        self.visit_binding(&mut arg.binding);
                        if let Some(default) = &mut arg.default {
                            self.visit_expr(default, false);
                        }
                    }
                    match &mut arrow.body {
                        ArrowBody::Expr(e) => {
                            self.visit_expr(e, false);
                            let temps = self.temps_stack.pop().unwrap_or_default();
                            if !temps.is_empty() {
                                // An expression body with temps becomes a
                                // block body
                                let value = (**e).clone();
                                let mut body =
                                    vec![Stmt::synth(SData::Return(Some(value)))];
                                let decl = self.temp_decl_stmt(temps);
                                body.insert(0, decl);
                                arrow.body = ArrowBody::Stmts(body);
                            }
                        }
                        ArrowBody::Stmts(stmts) => {
                            self.visit_stmt_list(stmts);
                            let mut body = std::mem::take(stmts);
                            self.pop_fn_frame(&mut body);
                            *stmts = body;
                        }
                    }
                }
                self.maybe_lower_async_arrow(expr);
            }
            EData::Function(func) => self.visit_func(func),
            EData::Class(_) => self.lower_class_expr(expr),
            EData::Await(e) => self.visit_expr(e, false),
            EData::Yield(y) => {
                if let Some(value) = &mut y.value {
                    self.visit_expr(value, false);
                }
            }
            EData::ImportCall(call) => {
                self.visit_expr(&mut call.expr, false);
                if let Some(options) = &mut call.options {
                    self.visit_expr(options, false);
                }
            }
        }
    }

    fn visit_chain_node(&mut self, expr: &mut Expr, is_chain_link: bool) {
        // Visit children; the target of a Continue node belongs to this
        // chain and must not lower itself independently
        match &mut expr.data {
            EData::Dot(dot) => {
                let target_is_link = dot.optional_chain == OptionalChain::Continue;
                self.visit_expr(&mut dot.target, target_is_link);
            }
            EData::Index(index) => {
                let target_is_link = index.optional_chain == OptionalChain::Continue;
                self.visit_expr(&mut index.target, target_is_link);
                self.visit_expr(&mut index.index, false);
            }
            EData::Call(call) => {
                let target_is_link = call.optional_chain == OptionalChain::Continue;
                self.visit_expr(&mut call.target, target_is_link);
                for arg in &mut call.args {
                    self.visit_expr(arg, false);
                }
            }
            _ => unreachable!(),
        }

        // Private member access lowering happens per node
        self.maybe_lower_private_access(expr);

        let chain = match &expr.data {
            EData::Dot(d) => d.optional_chain,
            EData::Index(i) => i.optional_chain,
            EData::Call(c) => c.optional_chain,
            _ => OptionalChain::None,
        };
        if chain != OptionalChain::None
            && !is_chain_link
            && self.has(CompatFeatures::OPTIONAL_CHAIN)
        {
            self.lower_optional_chain(expr);
        }
    }

    // =========================================================================
    // Private member writes, updates and brand checks
    // =========================================================================

    fn expr_is_lowered_private_index(&self, expr: &Expr) -> Option<Ref> {
        if let EData::Index(index) = &expr.data {
            if let EData::PrivateIdent(p) = &index.index.data {
                if self.private_env.contains_key(&p.ref_) {
                    return Some(p.ref_);
                }
            }
        }
        None
    }

    /// `obj.#x = v` and compound forms become `__privateSet`. Returns true
    /// when the expression was replaced.
    fn maybe_lower_private_assign(&mut self, expr: &mut Expr) -> bool {
        let EData::Binary(binary) = &expr.data else {
            return false;
        };
        if !binary.op.is_assign() {
            return false;
        }
        let Some(private_ref) = self.expr_is_lowered_private_index(&binary.left) else {
            return false;
        };
        let lowering = self.private_env[&private_ref].clone();
        let EData::Binary(mut binary) = std::mem::replace(&mut expr.data, EData::Undefined)
        else {
            return false;
        };
        let EData::Index(index) = binary.left.data else {
            return false;
        };
        let mut obj = *index.target;
        self.visit_expr(&mut obj, false);
        self.visit_expr(&mut binary.right, false);
        let brand = Expr::ident(lowering.brand_ref, lowering.brand_name.clone());

        let value = match binary.op.assign_base() {
            None => *binary.right,
            Some(base) => {
                // obj.#x op= v  ->  __privateSet(o, b, __privateGet(o, b) op v)
                let (obj_first, obj_reuse) = self.capture_value(obj.clone());
                obj = obj_first;
                let get = self.helper("__privateGet");
                let mut get_args = vec![obj_reuse, brand.clone()];
                if let Some((r, n)) = &lowering.getter_fn {
                    get_args.push(Expr::ident(*r, n.clone()));
                }
                let read = Expr::call(get, get_args);
                Expr::synth(EData::Binary(EBinary {
                    op: base,
                    left: Box::new(read),
                    right: binary.right,
                }))
            }
        };
        let set = self.helper("__privateSet");
        let mut args = vec![obj, brand, value];
        if let Some((r, n)) = &lowering.setter_fn {
            args.push(Expr::ident(*r, n.clone()));
        }
        expr.data = Expr::call(set, args).data;
        true
    }

    /// `obj.#x++` and friends go through `__privateWrapper`.
    fn maybe_lower_private_update(&mut self, expr: &mut Expr) -> bool {
        let EData::Unary(unary) = &expr.data else {
            return false;
        };
        if !unary.op.is_update() {
            return false;
        }
        let Some(private_ref) = self.expr_is_lowered_private_index(&unary.value) else {
            return false;
        };
        let lowering = self.private_env[&private_ref].clone();
        let EData::Unary(unary) = std::mem::replace(&mut expr.data, EData::Undefined) else {
            return false;
        };
        let EData::Index(index) = unary.value.data else {
            return false;
        };
        let mut obj = *index.target;
        self.visit_expr(&mut obj, false);
        let wrapper = self.helper("__privateWrapper");
        let mut args = vec![
            obj,
            Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
        ];
        args.push(match &lowering.setter_fn {
            Some((r, n)) => Expr::ident(*r, n.clone()),
            None => Expr::synth(EData::Null),
        });
        if let Some((r, n)) = &lowering.getter_fn {
            args.push(Expr::ident(*r, n.clone()));
        }
        let target = Expr::dot(Expr::call(wrapper, args), "_");
        expr.data = EData::Unary(EUnary {
            op: unary.op,
            value: Box::new(target),
        });
        true
    }

    // =========================================================================
    // Binary operators
    // =========================================================================

    fn lower_binary(&mut self, expr: &mut Expr) {
        let EData::Binary(binary) = &expr.data else {
            return;
        };
        // `#x in obj` brand check
        if binary.op == BinOp::In {
            if let EData::PrivateIdent(p) = &binary.left.data {
                if let Some(lowering) = self.private_env.get(&p.ref_).cloned() {
                    let EData::Binary(binary) =
                        std::mem::replace(&mut expr.data, EData::Undefined)
                    else {
                        return;
                    };
                    let helper = self.helper("__privateIn");
                    expr.data = Expr::call(
                        helper,
                        vec![
                            Expr::ident(lowering.brand_ref, lowering.brand_name),
                            *binary.right,
                        ],
                    )
                    .data;
                    return;
                }
            }
        }
        match binary.op {
            BinOp::Pow if self.has(CompatFeatures::EXPONENT_OPERATOR) => {
                let EData::Binary(binary) = std::mem::replace(&mut expr.data, EData::Undefined)
                else {
                    return;
                };
                let pow = self.helper("__pow");
                expr.data = Expr::call(pow, vec![*binary.left, *binary.right]).data;
            }
            BinOp::PowAssign if self.has(CompatFeatures::EXPONENT_OPERATOR) => {
                let EData::Binary(binary) = std::mem::replace(&mut expr.data, EData::Undefined)
                else {
                    return;
                };
                // target **= v  ->  target = __pow(target, v), with the
                // object captured once for member targets
                let (read, write) = self.capture_target(*binary.left);
                let pow = self.helper("__pow");
                let call = Expr::call(pow, vec![read, *binary.right]);
                expr.data = Expr::assign(write, call).data;
            }
            BinOp::NullishCoalescing if self.has(CompatFeatures::NULLISH_COALESCING) => {
                let EData::Binary(binary) = std::mem::replace(&mut expr.data, EData::Undefined)
                else {
                    return;
                };
                expr.data = self.nullish_cond(*binary.left, *binary.right).data;
            }
            BinOp::LogicalAndAssign | BinOp::LogicalOrAssign | BinOp::NullishAssign
                if self.has(CompatFeatures::LOGICAL_ASSIGNMENT) =>
            {
                let EData::Binary(binary) = std::mem::replace(&mut expr.data, EData::Undefined)
                else {
                    return;
                };
                let op = binary.op;
                let (read, write) = self.capture_target(*binary.left);
                let assign = Expr::assign(write, *binary.right);
                expr.data = match op {
                    BinOp::LogicalAndAssign => EData::Binary(EBinary {
                        op: BinOp::LogicalAnd,
                        left: Box::new(read),
                        right: Box::new(assign),
                    }),
                    BinOp::LogicalOrAssign => EData::Binary(EBinary {
                        op: BinOp::LogicalOr,
                        left: Box::new(read),
                        right: Box::new(assign),
                    }),
                    _ => {
                        if self.has(CompatFeatures::NULLISH_COALESCING) {
                            self.nullish_cond(read, assign).data
                        } else {
                            EData::Binary(EBinary {
                                op: BinOp::NullishCoalescing,
                                left: Box::new(read),
                                right: Box::new(assign),
                            })
                        }
                    }
                };
            }
            _ => {}
        }
    }

    /// `left ?? right` as a conditional with single evaluation of `left`.
    fn nullish_cond(&mut self, left: Expr, right: Expr) -> Expr {
        let (test_value, reuse) = self.capture_value(left);
        Expr::synth(EData::Cond(ECond {
            test: Box::new(Expr::synth(EData::Binary(EBinary {
                op: BinOp::LooseNe,
                left: Box::new(test_value),
                right: Box::new(Expr::synth(EData::Null)),
            }))),
            yes: Box::new(reuse),
            no: Box::new(right),
        }))
    }

    /// Evaluate `value` once: returns `(first_use, later_use)`. Idempotent
    /// expressions are reused; anything else goes through a temporary.
    pub(crate) fn capture_value(&mut self, value: Expr) -> (Expr, Expr) {
        match &value.data {
            EData::Ident(_) | EData::This | EData::Undefined | EData::Null
            | EData::Number(_) | EData::String(_) | EData::Boolean(_) => {
                (value.clone(), value)
            }
            _ => {
                let (r, name) = self.temp();
                let first = Expr::assign(Expr::ident(r, name.clone()), value);
                (first, Expr::ident(r, name))
            }
        }
    }

    /// Split an assignment target into a read expression and a write
    /// expression evaluating the object part only once.
    fn capture_target(&mut self, target: Expr) -> (Expr, Expr) {
        match target.data {
            EData::Ident(_) => (target.clone(), target),
            EData::Dot(dot) => {
                let (first, reuse) = self.capture_value(*dot.target);
                let read = Expr::synth(EData::Dot(EDot {
                    target: Box::new(first),
                    name: dot.name.clone(),
                    name_span: dot.name_span,
                    optional_chain: OptionalChain::None,
                }));
                let write = Expr::synth(EData::Dot(EDot {
                    target: Box::new(reuse),
                    name: dot.name,
                    name_span: dot.name_span,
                    optional_chain: OptionalChain::None,
                }));
                (read, write)
            }
            EData::Index(index) => {
                let (obj_first, obj_reuse) = self.capture_value(*index.target);
                let (key_first, key_reuse) = self.capture_value(*index.index);
                let read = Expr::synth(EData::Index(EIndex {
                    target: Box::new(obj_first),
                    index: Box::new(key_first),
                    optional_chain: OptionalChain::None,
                }));
                let write = Expr::synth(EData::Index(EIndex {
                    target: Box::new(obj_reuse),
                    index: Box::new(key_reuse),
                    optional_chain: OptionalChain::None,
                }));
                (read, write)
            }
            _ => (
                Expr {
                    span: target.span,
                    data: target.data.clone(),
                },
                target,
            ),
        }
    }

    // =========================================================================
    // Optional chains
    // =========================================================================

    /// Flatten a whole optional chain ending at `expr` into a conditional.
    fn lower_optional_chain(&mut self, expr: &mut Expr) {
        let chain = std::mem::replace(&mut expr.data, EData::Undefined);
        let whole = Expr {
            span: expr.span,
            data: chain,
        };

        // Collect links outermost-first down to the Start node
        let mut links: Vec<ChainLink> = Vec::new();
        let mut current = whole;
        let root = loop {
            match current.data {
                EData::Dot(dot) => {
                    let is_start = dot.optional_chain == OptionalChain::Start;
                    links.push(ChainLink::Dot(dot.name, dot.name_span));
                    current = *dot.target;
                    if is_start {
                        break current;
                    }
                }
                EData::Index(index) => {
                    let is_start = index.optional_chain == OptionalChain::Start;
                    links.push(ChainLink::Index(*index.index));
                    current = *index.target;
                    if is_start {
                        break current;
                    }
                }
                EData::Call(call) => {
                    let is_start = call.optional_chain == OptionalChain::Start;
                    links.push(ChainLink::Call(call.args));
                    current = *call.target;
                    if is_start {
                        break current;
                    }
                }
                _ => {
                    // Chain bookkeeping was inconsistent; leave as-is
                    expr.data = current.data;
                    return;
                }
            }
        };
        links.reverse();

        // `a.b?.()` must forward `this`: capture the object of a member
        // root when the first link is a call
        let (test_value, mut rebuilt, this_for_call) = match (&links[0], root.data) {
            (ChainLink::Call(_), EData::Dot(dot)) => {
                let (obj_first, obj_reuse) = self.capture_value(*dot.target);
                let member = Expr::synth(EData::Dot(EDot {
                    target: Box::new(obj_first),
                    name: dot.name,
                    name_span: dot.name_span,
                    optional_chain: OptionalChain::None,
                }));
                let (fn_first, fn_reuse) = self.capture_value(member);
                (fn_first, fn_reuse, Some(obj_reuse))
            }
            (ChainLink::Call(_), EData::Index(index)) => {
                let (obj_first, obj_reuse) = self.capture_value(*index.target);
                let member = Expr::synth(EData::Index(EIndex {
                    target: Box::new(obj_first),
                    index: index.index,
                    optional_chain: OptionalChain::None,
                }));
                let (fn_first, fn_reuse) = self.capture_value(member);
                (fn_first, fn_reuse, Some(obj_reuse))
            }
            (_, data) => {
                let root = Expr::synth(data);
                let (first, reuse) = self.capture_value(root);
                (first, reuse, None)
            }
        };

        for (i, link) in links.into_iter().enumerate() {
            rebuilt = match link {
                ChainLink::Dot(name, name_span) => Expr::synth(EData::Dot(EDot {
                    target: Box::new(rebuilt),
                    name,
                    name_span,
                    optional_chain: OptionalChain::None,
                })),
                ChainLink::Index(index) => Expr::synth(EData::Index(EIndex {
                    target: Box::new(rebuilt),
                    index: Box::new(index),
                    optional_chain: OptionalChain::None,
                })),
                ChainLink::Call(mut args) => {
                    if i == 0 {
                        if let Some(this_value) = this_for_call.clone() {
                            // fn.call(this, args)
                            let call_target = Expr::dot(rebuilt, "call");
                            let mut call_args = vec![this_value];
                            call_args.append(&mut args);
                            Expr::call(call_target, call_args)
                        } else {
                            Expr::call(rebuilt, args)
                        }
                    } else {
                        Expr::call(rebuilt, args)
                    }
                }
            };
        }

        expr.data = EData::Cond(ECond {
            test: Box::new(Expr::synth(EData::Binary(EBinary {
                op: BinOp::LooseEq,
                left: Box::new(test_value),
                right: Box::new(Expr::synth(EData::Null)),
            }))),
            yes: Box::new(Expr::synth(EData::Undefined)),
            no: Box::new(rebuilt),
        });
    }

    // =========================================================================
    // Object spread / rest
    // =========================================================================

    fn lower_object_spread(&mut self, expr: &mut Expr) {
        let EData::Object(properties) = &expr.data else {
            return;
        };
        if !properties.iter().any(|p| p.kind == PropertyKind::Spread) {
            return;
        }
        let EData::Object(properties) = std::mem::replace(&mut expr.data, EData::Undefined)
        else {
            return;
        };

        // Alternate __spreadValues / __spreadProps to preserve evaluation
        // order between spreads and literal properties
        let mut result: Option<Expr> = None;
        let mut pending: Vec<Property> = Vec::new();
        for prop in properties {
            if prop.kind == PropertyKind::Spread {
                let value = prop.value.expect("spread property has a value");
                let base = match result.take() {
                    None => {
                        let obj = Expr::synth(EData::Object(std::mem::take(&mut pending)));
                        obj
                    }
                    Some(acc) => {
                        if pending.is_empty() {
                            acc
                        } else {
                            let props =
                                Expr::synth(EData::Object(std::mem::take(&mut pending)));
                            let helper = self.helper("__spreadProps");
                            Expr::call(helper, vec![acc, props])
                        }
                    }
                };
                let helper = self.helper("__spreadValues");
                result = Some(Expr::call(helper, vec![base, value]));
            } else {
                pending.push(prop);
            }
        }
        let final_expr = match result {
            None => Expr::synth(EData::Object(pending)),
            Some(acc) => {
                if pending.is_empty() {
                    acc
                } else {
                    let props = Expr::synth(EData::Object(pending));
                    let helper = self.helper("__spreadProps");
                    Expr::call(helper, vec![acc, props])
                }
            }
        };
        expr.data = final_expr.data;
    }

    /// `const { a, ...rest } = v` expands into a capture plus `__objRest`.
    /// Returns `None` when no declaration in the statement uses rest.
    fn lower_object_rest_decls(&mut self, local: &mut SLocal) -> Option<Vec<Stmt>> {
        let uses_rest = local.decls.iter().any(|d| binding_has_object_rest(&d.binding));
        if !uses_rest {
            return None;
        }
        let mut out_decls: Vec<Decl> = Vec::new();
        for decl in local.decls.drain(..) {
            match decl.binding {
                Binding::Object { properties, rest: Some(rest) } => {
                    let value = decl.value.unwrap_or_else(Expr::undefined);
                    let (r, name) = self.temp_in_place();
                    out_decls.push(Decl {
                        binding: Binding::Ident(EIdent { name: name.clone(), ref_: r }),
                        value: Some(value),
                    });
                    // Excluded keys, captured per key type
                    let mut keys: Vec<Expr> = Vec::new();
                    for prop in &properties {
                        match &prop.key.data {
                            EData::String(s) => keys.push(Expr::string(s.clone())),
                            EData::Number(n) => {
                                keys.push(Expr::string(format_number_key(*n)));
                            }
                            _ => {
                                // Arbitrary computed key: capture into a
                                // temp and exclude `temp + ""`
                                let (kr, kname) = self.temp();
                                let capture = Expr::assign(
                                    Expr::ident(kr, kname.clone()),
                                    prop.key.clone(),
                                );
                                keys.push(Expr::synth(EData::Binary(EBinary {
                                    op: BinOp::Add,
                                    left: Box::new(capture),
                                    right: Box::new(Expr::string("")),
                                })));
                            }
                        }
                    }
                    if !properties.is_empty() {
                        out_decls.push(Decl {
                            binding: Binding::Object {
                                properties,
                                rest: None,
                            },
                            value: Some(Expr::ident(r, name.clone())),
                        });
                    }
                    let helper = self.helper("__objRest");
                    let rest_value = Expr::call(
                        helper,
                        vec![
                            Expr::ident(r, name),
                            Expr::synth(EData::Array(keys)),
                        ],
                    );
                    out_decls.push(Decl {
                        binding: *rest,
                        value: Some(rest_value),
                    });
                }
                other => out_decls.push(Decl {
                    binding: other,
                    value: decl.value,
                }),
            }
        }
        Some(vec![Stmt::synth(SData::Local(SLocal {
            kind: local.kind,
            decls: out_decls,
            is_export: local.is_export,
        }))])
    }

    // =========================================================================
    // Async functions and generators
    // =========================================================================

    /// `async function f(a) { body }` becomes
    /// `function f(a) { return __async(this, null, function* () { body' }) }`
    /// with `await x` converted to `yield x`. Keeping the outer parameter
    /// list preserves `.length`; `arguments` is forwarded when used.
    fn lower_async_function(&mut self, func: &mut Func) {
        let mut body = std::mem::take(&mut func.body);
        convert_await_to_yield(&mut body, false);
        let args_expr = if func.uses_arguments {
            Expr::synth(EData::Ident(EIdent {
                name: "arguments".to_string(),
                ref_: Ref::INVALID,
            }))
        } else {
            Expr::synth(EData::Null)
        };
        let generator = Expr::synth(EData::Function(Box::new(Func {
            name: None,
            args: Vec::new(),
            body,
            is_async: false,
            is_generator: true,
            uses_arguments: false,
        })));
        let helper = self.helper("__async");
        let call = Expr::call(
            helper,
            vec![Expr::synth(EData::This), args_expr, generator],
        );
        func.body = vec![Stmt::synth(SData::Return(Some(call)))];
        func.is_async = false;
        func.is_generator = false;
    }

    /// `async function* f() { body }` becomes a `__asyncGenerator` wrapper
    /// with `await x` converted to `yield __await(x)`.
    fn lower_async_generator(&mut self, func: &mut Func) {
        let mut body = std::mem::take(&mut func.body);
        let await_helper = self.helper("__await");
        convert_await_to_yield_with_helper(&mut body, &await_helper);
        let generator = Expr::synth(EData::Function(Box::new(Func {
            name: None,
            args: Vec::new(),
            body,
            is_async: false,
            is_generator: true,
            uses_arguments: false,
        })));
        let helper = self.helper("__asyncGenerator");
        let args_expr = if func.uses_arguments {
            Expr::synth(EData::Ident(EIdent {
                name: "arguments".to_string(),
                ref_: Ref::INVALID,
            }))
        } else {
            Expr::synth(EData::Null)
        };
        let call = Expr::call(
            helper,
            vec![Expr::synth(EData::This), args_expr, generator],
        );
        func.body = vec![Stmt::synth(SData::Return(Some(call)))];
        func.is_async = false;
        func.is_generator = false;
    }

    /// `async (x) => body` becomes `(x) => __async(this, null, function* () ...)`.
    fn maybe_lower_async_arrow(&mut self, expr: &mut Expr) {
        if !self.has(CompatFeatures::ASYNC_AWAIT) {
            return;
        }
        let EData::Arrow(arrow) = &mut expr.data else {
            return;
        };
        if !arrow.is_async {
            return;
        }
        let mut body = match std::mem::replace(&mut arrow.body, ArrowBody::Stmts(Vec::new())) {
            ArrowBody::Expr(e) => vec![Stmt::synth(SData::Return(Some(*e)))],
            ArrowBody::Stmts(stmts) => stmts,
        };
        convert_await_to_yield(&mut body, false);
        let generator = Expr::synth(EData::Function(Box::new(Func {
            name: None,
            args: Vec::new(),
            body,
            is_async: false,
            is_generator: true,
            uses_arguments: false,
        })));
        let helper = self.helper("__async");
        let call = Expr::call(
            helper,
            vec![
                Expr::synth(EData::This),
                Expr::synth(EData::Null),
                generator,
            ],
        );
        arrow.body = ArrowBody::Expr(Box::new(call));
        arrow.is_async = false;
    }

    /// `for await (const x of y) body` expands into an iterator protocol
    /// loop whose disposal runs in a finally block.
    fn lower_for_await(&mut self, stmt: &mut Stmt) -> Option<Stmt> {
        let SData::ForOf {
            is_await: true,
            init,
            value,
            body,
        } = std::mem::replace(&mut stmt.data, SData::Empty)
        else {
            return None;
        };

        let (iter_ref, iter_name) = self.temp();
        let (step_ref, step_name) = self.temp();
        let (error_ref, error_name) = self.temp();
        let (has_error_ref, has_error_name) = self.temp();

        let for_await = self.helper("__forAwait");
        let iter_init = Expr::assign(
            Expr::ident(iter_ref, iter_name.clone()),
            Expr::call(for_await, vec![value]),
        );

        // while (!(_step = await _iter.next()).done) { <init> = _step.value; body }
        let next_call = Expr::synth(EData::Await(Box::new(Expr::call(
            Expr::dot(Expr::ident(iter_ref, iter_name.clone()), "next"),
            vec![],
        ))));
        let step_assign = Expr::assign(Expr::ident(step_ref, step_name.clone()), next_call);
        let test = Expr::synth(EData::Unary(EUnary {
            op: UnOp::Not,
            value: Box::new(Expr::dot(step_assign, "done")),
        }));

        let mut loop_body = Vec::new();
        // Rebind the loop variable from _step.value
        let mut init_stmt = *init;
        if let SData::Local(local) = &mut init_stmt.data {
            if let Some(decl) = local.decls.first_mut() {
                decl.value = Some(Expr::dot(
                    Expr::ident(step_ref, step_name.clone()),
                    "value",
                ));
            }
            loop_body.push(init_stmt);
        } else if let SData::Expr(target) = init_stmt.data {
            loop_body.push(Stmt::expr(Expr::assign(
                target,
                Expr::dot(Expr::ident(step_ref, step_name.clone()), "value"),
            )));
        }
        match body.data {
            SData::Block(stmts) => loop_body.extend(stmts),
            _ => loop_body.push(*body),
        }

        let while_loop = Stmt::synth(SData::While {
            test,
            body: Box::new(Stmt::synth(SData::Block(loop_body))),
        });

        // try { _iter = __forAwait(y); while (...) {...} }
        // catch (e) { _hasError = true; _error = e; }
        // finally { try { _step && !_step.done && _iter.return && (await _iter.return()) }
        //           finally { if (_hasError) throw _error } }
        let (catch_ref, catch_name) = self.temp_in_place();
        let catch = Catch {
            binding: Some(Binding::Ident(EIdent {
                name: catch_name.clone(),
                ref_: catch_ref,
            })),
            body: vec![
                Stmt::expr(Expr::assign(
                    Expr::ident(has_error_ref, has_error_name.clone()),
                    Expr::synth(EData::Boolean(true)),
                )),
                Stmt::expr(Expr::assign(
                    Expr::ident(error_ref, error_name.clone()),
                    Expr::ident(catch_ref, catch_name),
                )),
            ],
        };

        let return_guard = Expr::synth(EData::Binary(EBinary {
            op: BinOp::LogicalAnd,
            left: Box::new(Expr::synth(EData::Binary(EBinary {
                op: BinOp::LogicalAnd,
                left: Box::new(Expr::ident(step_ref, step_name.clone())),
                right: Box::new(Expr::synth(EData::Unary(EUnary {
                    op: UnOp::Not,
                    value: Box::new(Expr::dot(
                        Expr::ident(step_ref, step_name.clone()),
                        "done",
                    )),
                }))),
            }))),
            right: Box::new(Expr::synth(EData::Binary(EBinary {
                op: BinOp::LogicalAnd,
                left: Box::new(Expr::dot(
                    Expr::ident(iter_ref, iter_name.clone()),
                    "return",
                )),
                right: Box::new(Expr::synth(EData::Await(Box::new(Expr::call(
                    Expr::dot(Expr::ident(iter_ref, iter_name), "return"),
                    vec![],
                ))))),
            }))),
        }));
        let rethrow = Stmt::synth(SData::If {
            test: Expr::ident(has_error_ref, has_error_name),
            yes: Box::new(Stmt::synth(SData::Throw(Expr::ident(
                error_ref, error_name,
            )))),
            no: None,
        });
        let finally = vec![Stmt::synth(SData::Try {
            block: vec![Stmt::expr(return_guard)],
            catch: None,
            finally: Some(vec![rethrow]),
        })];

        Some(Stmt::synth(SData::Try {
            block: vec![Stmt::expr(iter_init), while_loop],
            catch: Some(catch),
            finally: Some(finally),
        }))
    }

    // =========================================================================
    // Tagged templates
    // =========================================================================

    /// `tag\`a${x}b\`` becomes `tag(_t || (_t = __template(["a","b"], ["a","b"])), x)`
    /// when template literals are being lowered for the target.
    fn maybe_lower_tagged_template(&mut self, expr: &mut Expr) {
        if !self.unsupported.has(CompatFeatures::TEMPLATE_LITERAL) {
            return;
        }
        let EData::Template(t) = &expr.data else {
            return;
        };
        if t.tag.is_none() {
            return;
        }
        let EData::Template(t) = std::mem::replace(&mut expr.data, EData::Undefined) else {
            return;
        };

        let mut cooked = vec![Expr::string(t.head_cooked.clone())];
        let mut raw = vec![Expr::string(t.head_raw.clone())];
        let mut values = Vec::new();
        for part in t.parts {
            cooked.push(Expr::string(part.cooked));
            raw.push(Expr::string(part.raw));
            values.push(part.value);
        }
        let helper = self.helper("__template");
        let template_call = Expr::call(
            helper,
            vec![
                Expr::synth(EData::Array(cooked)),
                Expr::synth(EData::Array(raw)),
            ],
        );
        // Cache the frozen strings array across invocations
        let (cache_ref, cache_name) = self.temp();
        let cached = Expr::synth(EData::Binary(EBinary {
            op: BinOp::LogicalOr,
            left: Box::new(Expr::ident(cache_ref, cache_name.clone())),
            right: Box::new(Expr::assign(
                Expr::ident(cache_ref, cache_name),
                template_call,
            )),
        }));
        let tag = *t.tag.expect("checked above");
        let call = if t.tag_was_optional_chain {
            // Inside an optional chain the tag call forwards `this`
            let target = Expr::dot(tag, "call");
            let mut args = vec![Expr::synth(EData::This), cached];
            args.append(&mut values);
            Expr::call(target, args)
        } else {
            let mut args = vec![cached];
            args.append(&mut values);
            Expr::call(tag, args)
        };
        expr.data = call.data;
    }

    // =========================================================================
    // TypeScript enums and namespaces
    // =========================================================================

    /// `enum E { A, B = 5 }` lowers to an IIFE building the two-way map.
    fn lower_enum(&mut self, stmt: &mut Stmt) -> Stmt {
        let SData::Enum {
            name,
            name_ref,
            members,
            is_export,
        } = std::mem::replace(&mut stmt.data, SData::Empty)
        else {
            unreachable!()
        };

        let param_ref = self.new_symbol(SymbolKind::Injected, format!("{name}2"));
        let param_name = format!("{name}2");
        let mut body = Vec::new();
        let mut next_value = 0f64;
        let mut next_is_known = true;
        for member in members {
            let mut value = member.value;
            if let Some(v) = &mut value {
                self.visit_expr(v, false);
            }
            let member_key = Expr::string(member.name.clone());
            let param = || Expr::ident(param_ref, param_name.clone());
            match value {
                Some(Expr {
                    data: EData::String(s),
                    ..
                }) => {
                    // String members get no reverse mapping
                    next_is_known = false;
                    body.push(Stmt::expr(Expr::assign(
                        Expr::synth(EData::Index(EIndex {
                            target: Box::new(param()),
                            index: Box::new(member_key),
                            optional_chain: OptionalChain::None,
                        })),
                        Expr::string(s),
                    )));
                }
                other => {
                    let value_expr = match other {
                        Some(Expr {
                            data: EData::Number(n),
                            ..
                        }) => {
                            next_value = n + 1.0;
                            next_is_known = true;
                            Expr::number(n)
                        }
                        Some(expr) => {
                            next_is_known = false;
                            expr
                        }
                        None => {
                            if !next_is_known {
                                self.log.add_error(
                                    self.source_index,
                                    stmt.span,
                                    format!(
                                        "Enum member \"{}\" needs an initializer",
                                        member.name
                                    ),
                                );
                            }
                            let v = next_value;
                            next_value += 1.0;
                            Expr::number(v)
                        }
                    };
                    // E2[E2["A"] = v] = "A"
                    let inner_assign = Expr::assign(
                        Expr::synth(EData::Index(EIndex {
                            target: Box::new(param()),
                            index: Box::new(member_key),
                            optional_chain: OptionalChain::None,
                        })),
                        value_expr,
                    );
                    body.push(Stmt::expr(Expr::assign(
                        Expr::synth(EData::Index(EIndex {
                            target: Box::new(param()),
                            index: Box::new(inner_assign),
                            optional_chain: OptionalChain::None,
                        })),
                        Expr::string(member.name),
                    )));
                }
            }
        }
        body.push(Stmt::synth(SData::Return(Some(Expr::ident(
            param_ref,
            param_name.clone(),
        )))));

        // var E = ((E2) => { ... })(E || {});
        let arrow = Expr::synth(EData::Arrow(Box::new(EArrow {
            args: vec![Arg {
                binding: Binding::Ident(EIdent {
                    name: param_name,
                    ref_: param_ref,
                }),
                default: None,
                is_rest: false,
                decorators: Vec::new(),
            }],
            body: ArrowBody::Stmts(body),
            is_async: false,
        })));
        let init = Expr::call(
            arrow,
            vec![Expr::synth(EData::Binary(EBinary {
                op: BinOp::LogicalOr,
                left: Box::new(Expr::ident(name_ref, name.clone())),
                right: Box::new(Expr::synth(EData::Object(Vec::new()))),
            }))],
        );
        Stmt::new(
            stmt.span,
            SData::Local(SLocal {
                kind: LocalKind::Var,
                decls: vec![Decl {
                    binding: Binding::Ident(EIdent {
                        name,
                        ref_: name_ref,
                    }),
                    value: Some(init),
                }],
                is_export,
            }),
        )
    }

    /// `namespace N { export function f() {} }` lowers to a wrapper IIFE
    /// assigning exported members onto the namespace object.
    fn lower_namespace(&mut self, stmt: &mut Stmt) -> Vec<Stmt> {
        let SData::Namespace {
            name,
            name_ref,
            mut body,
            is_export,
        } = std::mem::replace(&mut stmt.data, SData::Empty)
        else {
            unreachable!()
        };

        let param_name = format!("{name}2");
        let param_ref = self.new_symbol(SymbolKind::Injected, &param_name);

        // Assign exported members onto the namespace object after their
        // declarations
        let mut new_body = Vec::new();
        for mut inner in body.drain(..) {
            let export_assign = namespace_export_of(&inner).map(|(member, member_ref)| {
                Stmt::expr(Expr::assign(
                    Expr::dot(Expr::ident(param_ref, param_name.clone()), member.clone()),
                    Expr::ident(member_ref, member),
                ))
            });
            clear_export_flag(&mut inner);
            new_body.push(inner);
            if let Some(assign) = export_assign {
                new_body.push(assign);
            }
        }
        self.visit_stmt_list(&mut new_body);

        let arrow = Expr::synth(EData::Arrow(Box::new(EArrow {
            args: vec![Arg {
                binding: Binding::Ident(EIdent {
                    name: param_name,
                    ref_: param_ref,
                }),
                default: None,
                is_rest: false,
                decorators: Vec::new(),
            }],
            body: ArrowBody::Stmts(new_body),
            is_async: false,
        })));
        // (N2 => { ... })(N || (N = {}))
        let arg = Expr::synth(EData::Binary(EBinary {
            op: BinOp::LogicalOr,
            left: Box::new(Expr::ident(name_ref, name.clone())),
            right: Box::new(Expr::assign(
                Expr::ident(name_ref, name.clone()),
                Expr::synth(EData::Object(Vec::new())),
            )),
        }));
        vec![
            Stmt::new(
                stmt.span,
                SData::Local(SLocal {
                    kind: LocalKind::Var,
                    decls: vec![Decl {
                        binding: Binding::Ident(EIdent {
                            name,
                            ref_: name_ref,
                        }),
                        value: None,
                    }],
                    is_export,
                }),
            ),
            Stmt::expr(Expr::call(arrow, vec![arg])),
        ]
    }
}

enum ChainLink {
    Dot(String, Span),
    Index(Expr),
    Call(Vec<Expr>),
}

fn binding_has_object_rest(binding: &Binding) -> bool {
    match binding {
        Binding::Ident(_) => false,
        Binding::Object { rest, .. } => rest.is_some(),
        Binding::Array { items, rest } => {
            items
                .iter()
                .flatten()
                .any(|i| binding_has_object_rest(&i.binding))
                || rest.as_deref().is_some_and(binding_has_object_rest)
        }
    }
}

fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn namespace_export_of(stmt: &Stmt) -> Option<(String, Ref)> {
    match &stmt.data {
        SData::Function {
            func,
            is_export: true,
            name_ref,
        } => func.name.as_ref().map(|n| (n.name.clone(), *name_ref)),
        SData::Class {
            class,
            is_export: true,
            name_ref,
        } => class.name.as_ref().map(|n| (n.name.clone(), *name_ref)),
        SData::Local(local) if local.is_export => {
            // Only the first simple binding is exposed; namespaces with
            // complex exported patterns are uncommon
            local.decls.first().and_then(|d| match &d.binding {
                Binding::Ident(id) => Some((id.name.clone(), id.ref_)),
                _ => None,
            })
        }
        SData::Enum {
            name,
            name_ref,
            is_export: true,
            ..
        }
        | SData::Namespace {
            name,
            name_ref,
            is_export: true,
            ..
        } => Some((name.clone(), *name_ref)),
        _ => None,
    }
}

fn clear_export_flag(stmt: &mut Stmt) {
    match &mut stmt.data {
        SData::Function { is_export, .. }
        | SData::Class { is_export, .. }
        | SData::Enum { is_export, .. }
        | SData::Namespace { is_export, .. } => *is_export = false,
        SData::Local(local) => local.is_export = false,
        _ => {}
    }
}

/// Convert `await x` to `yield x` without entering nested functions.
fn convert_await_to_yield(stmts: &mut [Stmt], _nested: bool) {
    struct AwaitToYield;
    impl AwaitRewriter for AwaitToYield {
        fn rewrite(&self, value: Expr) -> EData {
            EData::Yield(EYield {
                value: Some(Box::new(value)),
                is_star: false,
            })
        }
    }
    for stmt in stmts {
        rewrite_awaits_stmt(stmt, &AwaitToYield);
    }
}

/// Convert `await x` to `yield __await(x)` for async generator bodies.
fn convert_await_to_yield_with_helper(stmts: &mut [Stmt], helper: &Expr) {
    struct AwaitToHelper(Expr);
    impl AwaitRewriter for AwaitToHelper {
        fn rewrite(&self, value: Expr) -> EData {
            EData::Yield(EYield {
                value: Some(Box::new(Expr::call(self.0.clone(), vec![value]))),
                is_star: false,
            })
        }
    }
    let rewriter = AwaitToHelper(helper.clone());
    for stmt in stmts {
        rewrite_awaits_stmt(stmt, &rewriter);
    }
}

trait AwaitRewriter {
    fn rewrite(&self, value: Expr) -> EData;
}

fn rewrite_awaits_stmt(stmt: &mut Stmt, r: &dyn AwaitRewriter) {
    match &mut stmt.data {
        SData::Expr(e) | SData::Throw(e) => rewrite_awaits_expr(e, r),
        SData::Return(Some(e)) => rewrite_awaits_expr(e, r),
        SData::Block(stmts) => {
            for s in stmts {
                rewrite_awaits_stmt(s, r);
            }
        }
        SData::If { test, yes, no } => {
            rewrite_awaits_expr(test, r);
            rewrite_awaits_stmt(yes, r);
            if let Some(no) = no {
                rewrite_awaits_stmt(no, r);
            }
        }
        SData::While { test, body } | SData::DoWhile { test, body } => {
            rewrite_awaits_expr(test, r);
            rewrite_awaits_stmt(body, r);
        }
        SData::With { value, body } => {
            rewrite_awaits_expr(value, r);
            rewrite_awaits_stmt(body, r);
        }
        SData::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                rewrite_awaits_stmt(init, r);
            }
            if let Some(test) = test {
                rewrite_awaits_expr(test, r);
            }
            if let Some(update) = update {
                rewrite_awaits_expr(update, r);
            }
            rewrite_awaits_stmt(body, r);
        }
        SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
            rewrite_awaits_stmt(init, r);
            rewrite_awaits_expr(value, r);
            rewrite_awaits_stmt(body, r);
        }
        SData::Switch { test, cases } => {
            rewrite_awaits_expr(test, r);
            for case in cases {
                if let Some(value) = &mut case.value {
                    rewrite_awaits_expr(value, r);
                }
                for s in &mut case.body {
                    rewrite_awaits_stmt(s, r);
                }
            }
        }
        SData::Try {
            block,
            catch,
            finally,
        } => {
            for s in block {
                rewrite_awaits_stmt(s, r);
            }
            if let Some(catch) = catch {
                for s in &mut catch.body {
                    rewrite_awaits_stmt(s, r);
                }
            }
            if let Some(finally) = finally {
                for s in finally {
                    rewrite_awaits_stmt(s, r);
                }
            }
        }
        SData::Label { stmt, .. } => rewrite_awaits_stmt(stmt, r),
        SData::Local(local) => {
            for decl in &mut local.decls {
                if let Some(value) = &mut decl.value {
                    rewrite_awaits_expr(value, r);
                }
            }
        }
        _ => {}
    }
}

fn rewrite_awaits_expr(expr: &mut Expr, r: &dyn AwaitRewriter) {
    if let EData::Await(_) = &expr.data {
        let EData::Await(mut value) = std::mem::replace(&mut expr.data, EData::Undefined)
        else {
            return;
        };
        rewrite_awaits_expr(&mut value, r);
        expr.data = r.rewrite(*value);
        return;
    }
    match &mut expr.data {
        EData::Array(items) => {
            for item in items {
                rewrite_awaits_expr(item, r);
            }
        }
        EData::Object(properties) => {
            for prop in properties {
                if prop.computed {
                    rewrite_awaits_expr(&mut prop.key, r);
                }
                if let Some(value) = &mut prop.value {
                    // Method bodies are their own async context
                    if !matches!(value.data, EData::Function(_) | EData::Arrow(_)) {
                        rewrite_awaits_expr(value, r);
                    }
                }
            }
        }
        EData::Spread(e) => rewrite_awaits_expr(e, r),
        EData::Template(t) => {
            if let Some(tag) = &mut t.tag {
                rewrite_awaits_expr(tag, r);
            }
            for part in &mut t.parts {
                rewrite_awaits_expr(&mut part.value, r);
            }
        }
        EData::Dot(dot) => rewrite_awaits_expr(&mut dot.target, r),
        EData::Index(index) => {
            rewrite_awaits_expr(&mut index.target, r);
            rewrite_awaits_expr(&mut index.index, r);
        }
        EData::Call(call) => {
            rewrite_awaits_expr(&mut call.target, r);
            for arg in &mut call.args {
                rewrite_awaits_expr(arg, r);
            }
        }
        EData::New(new) => {
            rewrite_awaits_expr(&mut new.target, r);
            for arg in &mut new.args {
                rewrite_awaits_expr(arg, r);
            }
        }
        EData::Unary(unary) => rewrite_awaits_expr(&mut unary.value, r),
        EData::Binary(binary) => {
            rewrite_awaits_expr(&mut binary.left, r);
            rewrite_awaits_expr(&mut binary.right, r);
        }
        EData::Cond(cond) => {
            rewrite_awaits_expr(&mut cond.test, r);
            rewrite_awaits_expr(&mut cond.yes, r);
            rewrite_awaits_expr(&mut cond.no, r);
        }
        EData::Yield(y) => {
            if let Some(value) = &mut y.value {
                rewrite_awaits_expr(value, r);
            }
        }
        EData::ImportCall(call) => {
            rewrite_awaits_expr(&mut call.expr, r);
            if let Some(options) = &mut call.options {
                rewrite_awaits_expr(options, r);
            }
        }
        // Nested functions/arrows keep their own awaits
        _ => {}
    }
}

#[cfg(test)]
#[path = "../../tests/transform_unit_tests.rs"]
mod tests;
