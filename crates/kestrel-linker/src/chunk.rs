//! Chunk computation and emit preparation.
//!
//! Files sharing an identical entry bitset share a chunk. Each chunk's
//! statements are prepared here: live parts are cloned and rewritten
//! (import statements become wrapper calls or disappear, export syntax is
//! stripped, wrapped files fold into `__commonJS`/`__esm` closures), so
//! the printers downstream never consult the linker again.

use crate::graph::{FileKind, WrapKind};
use crate::link::{file_stem, sanitize, Linker};
use kestrel_common::{EntryPointKind, OutputFormat, PathTemplate, SourceIndex};
use kestrel_parser::ast::*;
use kestrel_parser::symbols::Ref;
use rustc_hash::{FxHashMap, FxHashSet};

/// The placeholder substituted with a chunk's final path after hashing.
#[must_use]
pub fn chunk_unique_key(chunk_index: usize) -> String {
    format!("__KESTRELCHUNK{chunk_index}__")
}

#[derive(Debug)]
pub struct FilePlan {
    pub source: SourceIndex,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub enum ChunkRepr {
    Js {
        plans: Vec<FilePlan>,
        /// Appended after every file, e.g. the entry `export {}` clause.
        suffix_stmts: Vec<Stmt>,
    },
    Css {
        files: Vec<SourceIndex>,
    },
}

#[derive(Debug)]
pub struct CrossChunkImport {
    pub chunk_index: u32,
    pub refs: Vec<Ref>,
}

#[derive(Debug)]
pub struct Chunk {
    pub is_css: bool,
    pub entry_source: Option<SourceIndex>,
    pub entry_kind: Option<EntryPointKind>,
    /// Chunk member files in dependency order.
    pub files: Vec<SourceIndex>,
    /// The `[name]` placeholder value.
    pub name: String,
    pub repr: ChunkRepr,
    pub cross_chunk_imports: Vec<CrossChunkImport>,
    /// Symbols other chunks import from this one.
    pub cross_chunk_exports: Vec<Ref>,
    /// `(alias, ref)` pairs exported by an entry chunk.
    pub entry_exports: Vec<(String, Ref)>,
    /// Path template with `[hash]` still unsubstituted.
    pub path_template: PathTemplate,
}

pub(crate) fn compute_chunks(linker: &mut Linker<'_>) -> Vec<Chunk> {
    let order = dependency_order(linker);

    // Group by (css-ness, entry bitset); entries first, in declaration
    // order, so chunk numbering is deterministic
    let mut chunks: Vec<ChunkBuilder> = Vec::new();
    let mut key_to_chunk: FxHashMap<(bool, Vec<usize>), usize> = FxHashMap::default();

    for (entry_index, entry) in linker.entry_points.clone().iter().enumerate() {
        let is_css = linker.files[entry.source.index()].is_css();
        let key = (is_css, vec![entry_index]);
        key_to_chunk.insert(key, chunks.len());
        chunks.push(ChunkBuilder {
            is_css,
            entry_source: Some(entry.source),
            entry_kind: Some(entry.kind),
            files: Vec::new(),
            name: file_stem(&linker.sources[entry.source.index()].pretty_path),
        });
    }

    for &source in &order {
        if source == SourceIndex::RUNTIME {
            continue; // duplicated into each chunk that needs it
        }
        let lf = &linker.linker_files[source.index()];
        if !lf.is_reachable {
            continue;
        }
        let is_css = linker.files[source.index()].is_css();
        let ones: Vec<usize> = lf.entry_bits.ones().collect();
        if ones.is_empty() {
            continue;
        }
        let key = (is_css, ones.clone());
        let chunk_index = match key_to_chunk.get(&key) {
            Some(&i) => i,
            None => {
                let i = chunks.len();
                // A shared chunk takes a deterministic name from its bits
                let name = format!(
                    "chunk-{}",
                    ones.iter()
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>()
                        .join("-")
                );
                key_to_chunk.insert(key, i);
                chunks.push(ChunkBuilder {
                    is_css,
                    entry_source: None,
                    entry_kind: None,
                    files: Vec::new(),
                    name,
                });
                i
            }
        };
        chunks[chunk_index].files.push(source);
        linker.linker_files[source.index()].chunk_index = Some(chunk_index as u32);
    }

    // Record chunk assignment on the symbols for cross-chunk accounting
    for (chunk_index, chunk) in chunks.iter().enumerate() {
        for &source in &chunk.files {
            for inner in 0..linker.symbols.outer[source.index()].len() {
                let r = Ref {
                    source: source.0,
                    inner: inner as u32,
                };
                linker.symbols.get_mut(r).chunk_index = Some(chunk_index as u32);
            }
        }
    }

    // Build emit plans
    let mut built: Vec<Chunk> = Vec::new();
    for (chunk_index, builder) in chunks.into_iter().enumerate() {
        let repr = if builder.is_css {
            ChunkRepr::Css {
                files: builder.files.clone(),
            }
        } else {
            let mut plans = Vec::new();
            // Runtime first so helpers exist before use
            if let Some(runtime_plan) = build_file_plan(linker, SourceIndex::RUNTIME) {
                if !runtime_plan.stmts.is_empty() {
                    plans.push(runtime_plan);
                }
            }
            for &source in &builder.files {
                if let Some(plan) = build_file_plan(linker, source) {
                    plans.push(plan);
                }
            }
            let suffix_stmts = entry_suffix_stmts(linker, builder.entry_source);
            ChunkRepr::Js {
                plans,
                suffix_stmts,
            }
        };

        let ext = if builder.is_css { "css" } else { "js" };
        let path_template = PathTemplate::parse("[dir][name]-[hash].[ext]").substitute(
            Some(""),
            Some(&builder.name),
            None,
            Some(ext),
        );
        let entry_exports = match builder.entry_source {
            Some(entry) if !builder.is_css => linker.linker_files[entry.index()]
                .sorted_and_filtered_export_aliases
                .iter()
                .filter_map(|alias| {
                    linker.linker_files[entry.index()]
                        .resolved_exports
                        .get(alias)
                        .map(|d| (alias.clone(), linker.symbols.follow_read(d.ref_)))
                })
                .collect(),
            _ => Vec::new(),
        };

        built.push(Chunk {
            is_css: builder.is_css,
            entry_source: builder.entry_source,
            entry_kind: builder.entry_kind,
            files: builder.files,
            name: builder.name,
            repr,
            cross_chunk_imports: Vec::new(),
            cross_chunk_exports: Vec::new(),
            entry_exports,
            path_template,
        });
        debug_assert_eq!(built.len(), chunk_index + 1);
    }

    compute_cross_chunk_links(linker, &mut built);
    built
}

struct ChunkBuilder {
    is_css: bool,
    entry_source: Option<SourceIndex>,
    entry_kind: Option<EntryPointKind>,
    files: Vec<SourceIndex>,
    name: String,
}

/// Global dependency-first ordering: post-order DFS from each entry (in
/// declaration order), runtime first. Deterministic by construction.
fn dependency_order(linker: &Linker<'_>) -> Vec<SourceIndex> {
    let mut order = vec![SourceIndex::RUNTIME];
    let mut visited: FxHashSet<SourceIndex> = FxHashSet::default();
    visited.insert(SourceIndex::RUNTIME);

    fn visit(
        linker: &Linker<'_>,
        source: SourceIndex,
        visited: &mut FxHashSet<SourceIndex>,
        order: &mut Vec<SourceIndex>,
    ) {
        if !visited.insert(source) {
            return;
        }
        if source.index() >= linker.files.len() {
            return;
        }
        for record in linker.files[source.index()].import_records() {
            if let Some(target) = record.source_index {
                visit(linker, target, visited, order);
            }
        }
        order.push(source);
    }

    for entry in &linker.entry_points {
        visit(linker, entry.source, &mut visited, &mut order);
    }
    order
}

// =============================================================================
// Per-file emit preparation
// =============================================================================

fn build_file_plan(linker: &mut Linker<'_>, source: SourceIndex) -> Option<FilePlan> {
    let wrap = linker.linker_files[source.index()].wrap;
    let is_entry = linker.linker_files[source.index()].entry_kind.is_some();

    let live_stmts: Vec<Stmt> = {
        let ast = linker.js(source)?;
        ast.parts
            .iter()
            .filter(|p| p.is_live)
            .flat_map(|p| p.stmts.iter().cloned())
            .collect()
    };
    if live_stmts.is_empty() {
        return None;
    }

    let mut rewriter = Rewriter {
        linker: &mut *linker,
        source,
    };
    let mut stmts = Vec::with_capacity(live_stmts.len());
    for mut stmt in live_stmts {
        if let Some(rewritten) = rewriter.rewrite_stmt(&mut stmt) {
            stmts.extend(rewritten);
        }
    }

    let stmts = match wrap {
        WrapKind::None => stmts,
        WrapKind::Cjs => wrap_cjs(linker, source, stmts, is_entry),
        WrapKind::Esm => wrap_esm(linker, source, stmts, is_entry),
    };

    Some(FilePlan { source, stmts })
}

/// `var require_stem = __commonJS(function(exports, module) { ... });`
fn wrap_cjs(
    linker: &mut Linker<'_>,
    source: SourceIndex,
    stmts: Vec<Stmt>,
    is_entry: bool,
) -> Vec<Stmt> {
    let ast = linker.js(source).expect("wrapped file is JS");
    let wrapper_ref = ast.wrapper_ref;
    let exports_ref = ast.exports_ref;
    let module_ref = ast.module_ref;
    let stem = sanitize(&file_stem(&linker.sources[source.index()].pretty_path));
    let wrapper_name = format!("require_{stem}");
    linker.symbols.get_mut(wrapper_ref).original_name = wrapper_name.clone();

    let common_js = linker
        .runtime_export("__commonJS")
        .unwrap_or(Ref::INVALID);
    let closure = Expr::synth(EData::Function(Box::new(Func {
        name: None,
        args: vec![
            Arg {
                binding: Binding::Ident(EIdent {
                    name: "exports".to_string(),
                    ref_: exports_ref,
                }),
                default: None,
                is_rest: false,
                decorators: Vec::new(),
            },
            Arg {
                binding: Binding::Ident(EIdent {
                    name: "module".to_string(),
                    ref_: module_ref,
                }),
                default: None,
                is_rest: false,
                decorators: Vec::new(),
            },
        ],
        body: stmts,
        is_async: false,
        is_generator: false,
        uses_arguments: false,
    })));
    let mut out = vec![Stmt::synth(SData::Local(SLocal {
        kind: LocalKind::Var,
        decls: vec![Decl {
            binding: Binding::Ident(EIdent {
                name: wrapper_name.clone(),
                ref_: wrapper_ref,
            }),
            value: Some(Expr::call(Expr::ident(common_js, "__commonJS"), vec![closure])),
        }],
        is_export: false,
    }))];
    if is_entry {
        // The entry's wrapper runs immediately
        out.push(Stmt::expr(Expr::call(
            Expr::ident(wrapper_ref, wrapper_name),
            Vec::new(),
        )));
    }
    out
}

/// `var init_stem = __esm(function() { ... });` with the file's top-level
/// declarations hoisted out so other files can reference them.
fn wrap_esm(
    linker: &mut Linker<'_>,
    source: SourceIndex,
    stmts: Vec<Stmt>,
    is_entry: bool,
) -> Vec<Stmt> {
    let ast = linker.js(source).expect("wrapped file is JS");
    let wrapper_ref = ast.wrapper_ref;
    let is_async = linker.linker_files[source.index()].is_async_or_has_async_dependency;
    let stem = sanitize(&file_stem(&linker.sources[source.index()].pretty_path));
    let wrapper_name = format!("init_{stem}");
    linker.symbols.get_mut(wrapper_ref).original_name = wrapper_name.clone();

    // Hoist declarations: `var x = 1` becomes `x = 1` inside the closure
    // plus `var x;` outside, so the binding is visible across files
    let mut hoisted: Vec<(Ref, String)> = Vec::new();
    let mut body = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        body.push(hoist_decl_to_assignment(stmt, &mut hoisted));
    }

    let esm_helper = linker.runtime_export("__esm").unwrap_or(Ref::INVALID);
    let closure = Expr::synth(EData::Function(Box::new(Func {
        name: None,
        args: Vec::new(),
        body,
        is_async,
        is_generator: false,
        uses_arguments: false,
    })));
    let mut out = Vec::new();
    if !hoisted.is_empty() {
        out.push(Stmt::synth(SData::Local(SLocal {
            kind: LocalKind::Var,
            decls: hoisted
                .into_iter()
                .map(|(r, name)| Decl {
                    binding: Binding::Ident(EIdent { name, ref_: r }),
                    value: None,
                })
                .collect(),
            is_export: false,
        })));
    }
    out.push(Stmt::synth(SData::Local(SLocal {
        kind: LocalKind::Var,
        decls: vec![Decl {
            binding: Binding::Ident(EIdent {
                name: wrapper_name.clone(),
                ref_: wrapper_ref,
            }),
            value: Some(Expr::call(Expr::ident(esm_helper, "__esm"), vec![closure])),
        }],
        is_export: false,
    })));
    if is_entry {
        out.push(Stmt::expr(Expr::call(
            Expr::ident(wrapper_ref, wrapper_name),
            Vec::new(),
        )));
    }
    out
}

/// Convert one top-level declaration into assignments, collecting hoisted
/// names. Non-declarations pass through.
fn hoist_decl_to_assignment(stmt: Stmt, hoisted: &mut Vec<(Ref, String)>) -> Stmt {
    match stmt.data {
        SData::Local(local) => {
            let mut exprs: Vec<Expr> = Vec::new();
            for decl in local.decls {
                decl.binding.each_ident(&mut |id| {
                    hoisted.push((id.ref_, id.name.clone()));
                });
                if let Some(value) = decl.value {
                    match decl.binding {
                        Binding::Ident(id) => {
                            exprs.push(Expr::assign(
                                Expr::synth(EData::Ident(id)),
                                value,
                            ));
                        }
                        pattern => {
                            // Destructuring assignment form
                            exprs.push(Expr::assign(binding_to_expr(pattern), value));
                        }
                    }
                }
            }
            match exprs.len() {
                0 => Stmt::synth(SData::Empty),
                _ => {
                    let mut iter = exprs.into_iter();
                    let mut joined = iter.next().expect("non-empty");
                    for next in iter {
                        joined = Expr::synth(EData::Binary(EBinary {
                            op: BinOp::Comma,
                            left: Box::new(joined),
                            right: Box::new(next),
                        }));
                    }
                    Stmt::expr(joined)
                }
            }
        }
        SData::Function {
            func,
            name_ref,
            ..
        } => {
            let name = func
                .name
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_default();
            hoisted.push((name_ref, name.clone()));
            Stmt::expr(Expr::assign(
                Expr::ident(name_ref, name),
                Expr::synth(EData::Function(Box::new(func))),
            ))
        }
        SData::Class {
            class,
            name_ref,
            ..
        } => {
            let name = class
                .name
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_default();
            hoisted.push((name_ref, name.clone()));
            Stmt::expr(Expr::assign(
                Expr::ident(name_ref, name),
                Expr::synth(EData::Class(Box::new(class))),
            ))
        }
        other => Stmt {
            span: stmt.span,
            data: other,
        },
    }
}

/// A binding pattern reinterpreted as an assignment target expression.
fn binding_to_expr(binding: Binding) -> Expr {
    match binding {
        Binding::Ident(id) => Expr::synth(EData::Ident(id)),
        Binding::Array { items, rest } => {
            let mut out: Vec<Expr> = items
                .into_iter()
                .map(|item| match item {
                    None => Expr::undefined(),
                    Some(item) => {
                        let target = binding_to_expr(item.binding);
                        match item.default {
                            None => target,
                            Some(default) => Expr::synth(EData::Binary(EBinary {
                                op: BinOp::Assign,
                                left: Box::new(target),
                                right: Box::new(default),
                            })),
                        }
                    }
                })
                .collect();
            if let Some(rest) = rest {
                out.push(Expr::synth(EData::Spread(Box::new(binding_to_expr(*rest)))));
            }
            Expr::synth(EData::Array(out))
        }
        Binding::Object { properties, rest } => {
            let mut props: Vec<Property> = properties
                .into_iter()
                .map(|p| {
                    let mut value = binding_to_expr(p.binding);
                    if let Some(default) = p.default {
                        value = Expr::synth(EData::Binary(EBinary {
                            op: BinOp::Assign,
                            left: Box::new(value),
                            right: Box::new(default),
                        }));
                    }
                    Property {
                        kind: PropertyKind::Normal,
                        key: p.key,
                        value: Some(value),
                        computed: p.computed,
                        shorthand: false,
                        method: false,
                    }
                })
                .collect();
            if let Some(rest) = rest {
                props.push(Property {
                    kind: PropertyKind::Spread,
                    key: Expr::synth(EData::Undefined),
                    value: Some(binding_to_expr(*rest)),
                    computed: false,
                    shorthand: false,
                    method: false,
                });
            }
            Expr::synth(EData::Object(props))
        }
    }
}

// =============================================================================
// Statement rewriting
// =============================================================================

struct Rewriter<'l, 'a> {
    linker: &'l mut Linker<'a>,
    source: SourceIndex,
}

impl<'l, 'a> Rewriter<'l, 'a> {
    fn record_target(&self, record_index: u32) -> Option<SourceIndex> {
        self.linker
            .js(self.source)
            .and_then(|ast| ast.import_records.get(record_index as usize))
            .and_then(|r| r.source_index)
    }

    fn target_exports_kind(&self, target: SourceIndex) -> Option<ExportsKind> {
        self.linker.js(target).map(|a| a.exports_kind)
    }

    fn wrapper_call(&self, target: SourceIndex) -> Expr {
        let ast = self.linker.js(target).expect("wrapped target is JS");
        let wrapper_ref = ast.wrapper_ref;
        let name = self.linker.symbols.get(wrapper_ref).original_name.clone();
        Expr::call(Expr::ident(wrapper_ref, name), Vec::new())
    }

    /// Returns the statement's replacement, or `None` to keep it as-is
    /// (already rewritten in place).
    fn rewrite_stmt(&mut self, stmt: &mut Stmt) -> Option<Vec<Stmt>> {
        match &mut stmt.data {
            SData::Import(import) => {
                let record_index = import.import_record_index;
                let Some(target) = self.record_target(record_index) else {
                    // External: keep the statement for ESM output
                    if self.linker.options.format.keeps_esm_syntax() {
                        return Some(vec![std::mem::replace(
                            stmt,
                            Stmt::synth(SData::Empty),
                        )]);
                    }
                    return Some(vec![]);
                };
                match self.target_exports_kind(target) {
                    Some(ExportsKind::CommonJs) => {
                        // var import_x = __toESM(require_x());
                        let require = self.wrapper_call(target);
                        let to_esm = self
                            .linker
                            .runtime_export("__toESM")
                            .unwrap_or(Ref::INVALID);
                        let call = Expr::call(Expr::ident(to_esm, "__toESM"), vec![require]);
                        if import.is_bare && import.star_name.is_none() {
                            return Some(vec![Stmt::expr(self.wrapper_call(target))]);
                        }
                        let ns_ref = match &import.star_name {
                            Some(star) => star.ref_,
                            None => self
                                .linker
                                .record_namespace_refs
                                .get(&(self.source.0, record_index))
                                .copied()
                                .unwrap_or(Ref::INVALID),
                        };
                        let name = self
                            .linker
                            .symbols
                            .get(self.linker.symbols.follow_read(ns_ref))
                            .original_name
                            .clone();
                        Some(vec![Stmt::synth(SData::Local(SLocal {
                            kind: LocalKind::Var,
                            decls: vec![Decl {
                                binding: Binding::Ident(EIdent {
                                    name,
                                    ref_: ns_ref,
                                }),
                                value: Some(call),
                            }],
                            is_export: false,
                        }))])
                    }
                    Some(_) => {
                        // Internal ESM: bindings were merged; only wrapped
                        // targets leave an init call behind. Async inits
                        // are awaited so evaluation order survives.
                        if self.linker.linker_files[target.index()].wrap == WrapKind::Esm {
                            let mut call = self.wrapper_call(target);
                            if self.linker.linker_files[target.index()]
                                .is_async_or_has_async_dependency
                                && self.linker.options.format.keeps_esm_syntax()
                            {
                                call = Expr::synth(EData::Await(Box::new(call)));
                            }
                            Some(vec![Stmt::expr(call)])
                        } else {
                            Some(vec![])
                        }
                    }
                    None => Some(vec![]),
                }
            }
            SData::ExportNamed(export) => {
                // Bundled output strips export syntax; re-export records
                // were already turned into synthesized imports
                if export.import_record_index.is_none() {
                    return Some(vec![]);
                }
                let target = export
                    .import_record_index
                    .and_then(|r| self.record_target(r));
                match target {
                    None if self.linker.options.format.keeps_esm_syntax() => {
                        Some(vec![std::mem::replace(stmt, Stmt::synth(SData::Empty))])
                    }
                    Some(t)
                        if self.linker.linker_files[t.index()].wrap == WrapKind::Esm =>
                    {
                        Some(vec![Stmt::expr(self.wrapper_call(t))])
                    }
                    Some(t)
                        if self.linker.linker_files[t.index()].wrap == WrapKind::Cjs =>
                    {
                        Some(vec![Stmt::expr(self.wrapper_call(t))])
                    }
                    _ => Some(vec![]),
                }
            }
            SData::ExportStar(star) => {
                let target = self.record_target(star.import_record_index);
                match target {
                    None if self.linker.options.format.keeps_esm_syntax()
                        && star.alias.is_none() =>
                    {
                        Some(vec![std::mem::replace(stmt, Stmt::synth(SData::Empty))])
                    }
                    _ => Some(vec![]),
                }
            }
            SData::Local(local) => {
                local.is_export = false;
                for decl in &mut local.decls {
                    if let Some(value) = &mut decl.value {
                        self.rewrite_expr(value);
                    }
                }
                None
            }
            SData::Function { is_export, func, .. } => {
                *is_export = false;
                for s in &mut func.body {
                    let _ = self.rewrite_stmt_nested(s);
                }
                None
            }
            SData::Class { is_export, class, .. } => {
                *is_export = false;
                self.rewrite_class(class);
                None
            }
            SData::ExportDefault(_) => {
                let SData::ExportDefault(export) =
                    std::mem::replace(&mut stmt.data, SData::Empty)
                else {
                    unreachable!()
                };
                let default_ref = export.default_ref;
                // Give the symbol a printable name
                {
                    let stem =
                        sanitize(&file_stem(&self.linker.sources[self.source.index()].pretty_path));
                    let symbol = self.linker.symbols.get_mut(default_ref);
                    if symbol.original_name == "default" {
                        symbol.original_name = format!("{stem}_default");
                    }
                }
                let replacement = match export.value {
                    ExportDefaultValue::Expr(mut e) => {
                        self.rewrite_expr(&mut e);
                        let name = self
                            .linker
                            .symbols
                            .get(default_ref)
                            .original_name
                            .clone();
                        Stmt::synth(SData::Local(SLocal {
                            kind: LocalKind::Var,
                            decls: vec![Decl {
                                binding: Binding::Ident(EIdent {
                                    name,
                                    ref_: default_ref,
                                }),
                                value: Some(e),
                            }],
                            is_export: false,
                        }))
                    }
                    ExportDefaultValue::Func(mut func) => {
                        for s in &mut func.body {
                            let _ = self.rewrite_stmt_nested(s);
                        }
                        let name_ref = func.name.as_ref().map(|n| n.ref_).unwrap_or(default_ref);
                        if func.name.is_none() {
                            let name = self
                                .linker
                                .symbols
                                .get(default_ref)
                                .original_name
                                .clone();
                            func.name = Some(EIdent {
                                name,
                                ref_: default_ref,
                            });
                        }
                        Stmt::synth(SData::Function {
                            func,
                            is_export: false,
                            name_ref,
                        })
                    }
                    ExportDefaultValue::Class(mut class) => {
                        self.rewrite_class(&mut class);
                        let name_ref =
                            class.name.as_ref().map(|n| n.ref_).unwrap_or(default_ref);
                        if class.name.is_none() {
                            let name = self
                                .linker
                                .symbols
                                .get(default_ref)
                                .original_name
                                .clone();
                            class.name = Some(EIdent {
                                name,
                                ref_: default_ref,
                            });
                        }
                        Stmt::synth(SData::Class {
                            class,
                            is_export: false,
                            name_ref,
                        })
                    }
                };
                Some(vec![replacement])
            }
            _ => {
                self.rewrite_stmt_children(stmt);
                None
            }
        }
    }

    fn rewrite_stmt_nested(&mut self, stmt: &mut Stmt) -> Option<Vec<Stmt>> {
        self.rewrite_stmt_children(stmt);
        None
    }

    fn rewrite_stmt_children(&mut self, stmt: &mut Stmt) {
        match &mut stmt.data {
            SData::Expr(e) | SData::Throw(e) => self.rewrite_expr(e),
            SData::Return(Some(e)) => self.rewrite_expr(e),
            SData::Block(stmts) => {
                for s in stmts {
                    self.rewrite_stmt_children(s);
                }
            }
            SData::If { test, yes, no } => {
                self.rewrite_expr(test);
                self.rewrite_stmt_children(yes);
                if let Some(no) = no {
                    self.rewrite_stmt_children(no);
                }
            }
            SData::While { test, body } | SData::DoWhile { test, body } => {
                self.rewrite_expr(test);
                self.rewrite_stmt_children(body);
            }
            SData::With { value, body } => {
                self.rewrite_expr(value);
                self.rewrite_stmt_children(body);
            }
            SData::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.rewrite_stmt_children(init);
                }
                if let Some(test) = test {
                    self.rewrite_expr(test);
                }
                if let Some(update) = update {
                    self.rewrite_expr(update);
                }
                self.rewrite_stmt_children(body);
            }
            SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
                self.rewrite_stmt_children(init);
                self.rewrite_expr(value);
                self.rewrite_stmt_children(body);
            }
            SData::Switch { test, cases } => {
                self.rewrite_expr(test);
                for case in cases {
                    if let Some(v) = &mut case.value {
                        self.rewrite_expr(v);
                    }
                    for s in &mut case.body {
                        self.rewrite_stmt_children(s);
                    }
                }
            }
            SData::Try {
                block,
                catch,
                finally,
            } => {
                for s in block {
                    self.rewrite_stmt_children(s);
                }
                if let Some(catch) = catch {
                    for s in &mut catch.body {
                        self.rewrite_stmt_children(s);
                    }
                }
                if let Some(finally) = finally {
                    for s in finally {
                        self.rewrite_stmt_children(s);
                    }
                }
            }
            SData::Label { stmt, .. } => self.rewrite_stmt_children(stmt),
            SData::Local(local) => {
                for decl in &mut local.decls {
                    if let Some(value) = &mut decl.value {
                        self.rewrite_expr(value);
                    }
                }
            }
            SData::Function { func, .. } => {
                for s in &mut func.body {
                    self.rewrite_stmt_children(s);
                }
            }
            SData::Class { class, .. } => self.rewrite_class(class),
            _ => {}
        }
    }

    fn rewrite_class(&mut self, class: &mut Class) {
        if let Some(extends) = &mut class.extends {
            self.rewrite_expr(extends);
        }
        for prop in &mut class.properties {
            if prop.is_computed {
                self.rewrite_expr(&mut prop.key);
            }
            if let Some(func) = &mut prop.func {
                for s in &mut func.body {
                    self.rewrite_stmt_children(s);
                }
            }
            if let Some(init) = &mut prop.initializer {
                self.rewrite_expr(init);
            }
            for s in &mut prop.block {
                self.rewrite_stmt_children(s);
            }
        }
    }

    /// Rewrite `require("...")` and friends for in-bundle targets.
    fn rewrite_expr(&mut self, expr: &mut Expr) {
        match &expr.data {
            EData::RequireString {
                import_record_index,
            } => {
                let record_index = *import_record_index;
                let Some(target) = self.record_target(record_index) else {
                    return; // external require survives as-is
                };
                match self.target_exports_kind(target) {
                    Some(ExportsKind::CommonJs) => {
                        expr.data = self.wrapper_call(target).data;
                    }
                    Some(_) => {
                        // (init_t(), __toCommonJS(t_exports))
                        let ns_ref = self.linker.linker_files[target.index()]
                            .exports_object_ref
                            .unwrap_or(Ref::INVALID);
                        let ns_name = if ns_ref.is_valid() {
                            self.linker.symbols.get(ns_ref).original_name.clone()
                        } else {
                            String::new()
                        };
                        let to_cjs = self
                            .linker
                            .runtime_export("__toCommonJS")
                            .unwrap_or(Ref::INVALID);
                        let mut result = Expr::call(
                            Expr::ident(to_cjs, "__toCommonJS"),
                            vec![Expr::ident(ns_ref, ns_name)],
                        );
                        if self.linker.linker_files[target.index()].wrap == WrapKind::Esm {
                            result = Expr::synth(EData::Binary(EBinary {
                                op: BinOp::Comma,
                                left: Box::new(self.wrapper_call(target)),
                                right: Box::new(result),
                            }));
                        }
                        expr.data = result.data;
                    }
                    None => {}
                }
                return;
            }
            EData::RequireResolveString { .. } => return,
            _ => {}
        }

        match &mut expr.data {
            EData::Array(items) => {
                for item in items {
                    self.rewrite_expr(item);
                }
            }
            EData::Object(props) => {
                for prop in props {
                    if prop.computed {
                        self.rewrite_expr(&mut prop.key);
                    }
                    if let Some(value) = &mut prop.value {
                        self.rewrite_expr(value);
                    }
                }
            }
            EData::Spread(e) | EData::Await(e) => self.rewrite_expr(e),
            EData::Template(t) => {
                if let Some(tag) = &mut t.tag {
                    self.rewrite_expr(tag);
                }
                for part in &mut t.parts {
                    self.rewrite_expr(&mut part.value);
                }
            }
            EData::Dot(d) => self.rewrite_expr(&mut d.target),
            EData::Index(i) => {
                self.rewrite_expr(&mut i.target);
                self.rewrite_expr(&mut i.index);
            }
            EData::Call(c) => {
                self.rewrite_expr(&mut c.target);
                for arg in &mut c.args {
                    self.rewrite_expr(arg);
                }
            }
            EData::New(n) => {
                self.rewrite_expr(&mut n.target);
                for arg in &mut n.args {
                    self.rewrite_expr(arg);
                }
            }
            EData::Unary(u) => self.rewrite_expr(&mut u.value),
            EData::Binary(b) => {
                self.rewrite_expr(&mut b.left);
                self.rewrite_expr(&mut b.right);
            }
            EData::Cond(c) => {
                self.rewrite_expr(&mut c.test);
                self.rewrite_expr(&mut c.yes);
                self.rewrite_expr(&mut c.no);
            }
            EData::Function(func) => {
                for s in &mut func.body {
                    self.rewrite_stmt_children(s);
                }
            }
            EData::Arrow(arrow) => match &mut arrow.body {
                ArrowBody::Expr(e) => self.rewrite_expr(e),
                ArrowBody::Stmts(stmts) => {
                    for s in stmts {
                        self.rewrite_stmt_children(s);
                    }
                }
            },
            EData::Class(class) => self.rewrite_class(class),
            EData::Yield(y) => {
                if let Some(value) = &mut y.value {
                    self.rewrite_expr(value);
                }
            }
            EData::ImportCall(call) => {
                // Dynamic imports of in-bundle files load the target's
                // chunk; the final path replaces the placeholder after
                // hashing
                if let Some(record_index) = call.import_record_index {
                    if let Some(target) = self.record_target(record_index) {
                        if let Some(chunk) =
                            self.linker.linker_files[target.index()].chunk_index
                        {
                            call.expr = Box::new(Expr::string(chunk_unique_key(
                                chunk as usize,
                            )));
                        }
                    }
                }
                self.rewrite_expr(&mut call.expr);
            }
            _ => {}
        }
    }
}

// =============================================================================
// Entry suffixes and cross-chunk links
// =============================================================================

/// The statements appended to an entry chunk: the export clause for ESM or
/// the `module.exports` assignment for CommonJS.
fn entry_suffix_stmts(linker: &Linker<'_>, entry: Option<SourceIndex>) -> Vec<Stmt> {
    let Some(entry) = entry else { return Vec::new() };
    let lf = &linker.linker_files[entry.index()];
    let aliases: Vec<(String, Ref)> = lf
        .sorted_and_filtered_export_aliases
        .iter()
        .filter_map(|alias| {
            lf.resolved_exports
                .get(alias)
                .map(|d| (alias.clone(), linker.symbols.follow_read(d.ref_)))
        })
        .collect();
    if aliases.is_empty() {
        return Vec::new();
    }
    match linker.options.format {
        OutputFormat::Esm | OutputFormat::Preserve => {
            let items = aliases
                .into_iter()
                .map(|(alias, terminal)| {
                    let original = linker.symbols.get(terminal).original_name.clone();
                    ClauseItem {
                        alias,
                        alias_span: kestrel_common::Span::DUMMY,
                        original_name: original,
                        name_ref: terminal,
                    }
                })
                .collect();
            vec![Stmt::synth(SData::ExportNamed(SExportNamed {
                items,
                import_record_index: None,
            }))]
        }
        OutputFormat::Cjs => {
            // module.exports = { alias: local, ... }
            let properties = aliases
                .into_iter()
                .map(|(alias, terminal)| {
                    let original = linker.symbols.get(terminal).original_name.clone();
                    Property {
                        kind: PropertyKind::Normal,
                        key: Expr::string(alias),
                        value: Some(Expr::ident(terminal, original)),
                        computed: false,
                        shorthand: false,
                        method: false,
                    }
                })
                .collect();
            vec![Stmt::expr(Expr::assign(
                Expr::dot(
                    Expr::synth(EData::Ident(EIdent {
                        name: "module".to_string(),
                        ref_: Ref::INVALID,
                    })),
                    "exports",
                ),
                Expr::synth(EData::Object(properties)),
            ))]
        }
        OutputFormat::Iife => Vec::new(),
    }
}

/// Symbols referenced across chunk boundaries become ESM imports between
/// chunks, with names resolved through the shared rename map at print time.
fn compute_cross_chunk_links(linker: &mut Linker<'_>, chunks: &mut [Chunk]) {
    let file_chunk: FxHashMap<u32, u32> = chunks
        .iter()
        .enumerate()
        .flat_map(|(i, c)| c.files.iter().map(move |s| (s.0, i as u32)))
        .collect();

    let mut imports: Vec<Vec<(u32, Ref)>> = vec![Vec::new(); chunks.len()];
    for (chunk_index, chunk) in chunks.iter().enumerate() {
        if chunk.is_css {
            continue;
        }
        let mut seen: FxHashSet<Ref> = FxHashSet::default();
        for &source in &chunk.files {
            let Some(ast) = linker.js(source) else { continue };
            for part in ast.parts.iter().filter(|p| p.is_live) {
                for &r in part.symbol_uses.keys() {
                    let terminal = linker.symbols.follow_read(r);
                    if terminal.source == SourceIndex::RUNTIME.0 {
                        continue;
                    }
                    let Some(&owner) = file_chunk.get(&terminal.source) else {
                        continue;
                    };
                    if owner != chunk_index as u32 && seen.insert(terminal) {
                        imports[chunk_index].push((owner, terminal));
                    }
                }
            }
        }
    }

    for (chunk_index, mut import_list) in imports.into_iter().enumerate() {
        import_list.sort_by_key(|&(owner, r)| (owner, r));
        let mut by_owner: FxHashMap<u32, Vec<Ref>> = FxHashMap::default();
        for (owner, r) in import_list {
            by_owner.entry(owner).or_default().push(r);
            if !chunks[owner as usize].cross_chunk_exports.contains(&r) {
                chunks[owner as usize].cross_chunk_exports.push(r);
            }
        }
        let mut cross: Vec<CrossChunkImport> = by_owner
            .into_iter()
            .map(|(owner, refs)| CrossChunkImport {
                chunk_index: owner,
                refs,
            })
            .collect();
        cross.sort_by_key(|c| c.chunk_index);
        chunks[chunk_index].cross_chunk_imports = cross;
    }
}
