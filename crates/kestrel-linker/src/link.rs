//! Linking: export-star resolution, import binding, CJS/ESM wrapping,
//! top-level-await propagation, tree shaking and emit preparation.
//!
//! Runs single-threaded over the assembled module graph. All symbol merges
//! happen here, followed by one serial `follow_all` pass; afterwards the
//! symbol table is safe for the parallel printers to read.

use crate::chunk::{self, Chunk};
use crate::graph::*;
use indexmap::IndexMap;
use kestrel_common::{Loader, Log, Note, OutputFormat, Source, SourceIndex, Span};
use kestrel_parser::ast::*;
use kestrel_parser::import_record::ImportKind;
use kestrel_parser::part::{Part, PartRef};
use kestrel_parser::symbols::{Ref, Symbol, SymbolKind, SymbolMap};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    pub format: OutputFormat,
    /// Tree shaking can be disabled for debugging.
    pub disable_tree_shaking: bool,
}

pub struct LinkInput {
    pub sources: Vec<Source>,
    pub files: Vec<FileKind>,
    pub entry_points: Vec<EntryPoint>,
    pub symbols: SymbolMap,
    /// `sideEffects: false` package data, surfaced by the resolver.
    pub side_effects_false: Vec<bool>,
    pub options: LinkOptions,
}

pub struct LinkResult {
    pub symbols: SymbolMap,
    pub sources: Vec<Source>,
    pub files: Vec<FileKind>,
    pub linker_files: Vec<LinkerFile>,
    pub reachable_files: Vec<SourceIndex>,
    pub stable_source_indices: Vec<u32>,
    pub chunks: Vec<Chunk>,
    /// CSS modules: source -> (alias -> final space-joined class list).
    pub css_module_exports: FxHashMap<SourceIndex, IndexMap<String, String>>,
}

pub(crate) struct Linker<'a> {
    pub(crate) sources: Vec<Source>,
    pub(crate) files: Vec<FileKind>,
    pub(crate) entry_points: Vec<EntryPoint>,
    pub(crate) symbols: SymbolMap,
    pub(crate) side_effects_false: Vec<bool>,
    pub(crate) options: LinkOptions,
    pub(crate) log: &'a Log,

    pub(crate) linker_files: Vec<LinkerFile>,
    pub(crate) reachable_files: Vec<SourceIndex>,
    pub(crate) stable_source_indices: Vec<u32>,
    /// Per (importer, record) synthesized namespace var for CJS targets.
    pub(crate) record_namespace_refs: FxHashMap<(u32, u32), Ref>,
    /// Runtime helper refs needed by wrappers and namespace objects.
    pub(crate) forced_runtime_refs: Vec<Ref>,
    /// Parts that must survive tree shaking because a post-shake rewrite
    /// references them (namespace objects read by `require` of ESM).
    pub(crate) forced_parts: Vec<PartRef>,
}

pub fn link(input: LinkInput, log: &Log) -> LinkResult {
    let _span = tracing::info_span!("link", files = input.files.len()).entered();
    let mut linker = Linker {
        sources: input.sources,
        files: input.files,
        entry_points: input.entry_points,
        symbols: input.symbols,
        side_effects_false: input.side_effects_false,
        options: input.options,
        log,
        linker_files: Vec::new(),
        reachable_files: Vec::new(),
        stable_source_indices: Vec::new(),
        record_namespace_refs: FxHashMap::default(),
        forced_runtime_refs: Vec::new(),
        forced_parts: Vec::new(),
    };

    linker.compute_graph();
    linker.resolve_export_stars();
    linker.merge_runtime_imports();
    linker.bind_imports();
    linker.classify_wrapping();
    // Materialise every terminal once, serially; parallel readers after
    // this point only path-shortcut
    linker.symbols.follow_all();
    linker.tree_shake();
    let chunks = linker.compute_chunks();
    let css_module_exports = linker.compute_css_module_exports();

    LinkResult {
        symbols: linker.symbols,
        sources: linker.sources,
        files: linker.files,
        linker_files: linker.linker_files,
        reachable_files: linker.reachable_files,
        stable_source_indices: linker.stable_source_indices,
        chunks,
        css_module_exports,
    }
}

impl<'a> Linker<'a> {
    pub(crate) fn js(&self, source: SourceIndex) -> Option<&Ast> {
        self.files.get(source.index()).and_then(FileKind::as_js)
    }

    pub(crate) fn loader_of(&self, source: SourceIndex) -> Loader {
        self.sources[source.index()].loader
    }

    fn error_with_notes(&self, source: SourceIndex, span: Span, text: String, notes: Vec<Note>) {
        self.log.add_error_with_notes(source.0, span, text, notes);
    }

    // =========================================================================
    // Graph
    // =========================================================================

    fn compute_graph(&mut self) {
        let reach = compute_reachability(&self.files, &self.entry_points);
        let entry_bits = compute_entry_bits(&self.files, &self.entry_points);

        self.linker_files = (0..self.files.len()).map(|_| LinkerFile::default()).collect();
        for (i, lf) in self.linker_files.iter_mut().enumerate() {
            lf.is_reachable = reach.stable_source_indices[i] != u32::MAX;
            lf.distance_from_entry = reach.distance_from_entry[i];
            lf.entry_bits = entry_bits[i].clone();
        }
        for entry in &self.entry_points {
            let lf = &mut self.linker_files[entry.source.index()];
            lf.entry_kind = Some(entry.kind);
            lf.force_include_exports_for_entry_point = true;
        }
        self.reachable_files = reach.reachable_files;
        self.stable_source_indices = reach.stable_source_indices;

        // Seed resolved exports from each file's own named exports
        for &source in &self.reachable_files {
            if let Some(ast) = self.js(source) {
                let own: Vec<(String, Ref)> = ast
                    .named_exports
                    .iter()
                    .map(|(alias, export)| (alias.clone(), export.ref_))
                    .collect();
                let lf = &mut self.linker_files[source.index()];
                for (alias, r) in own {
                    lf.resolved_exports.insert(
                        alias,
                        ExportData {
                            ref_: r,
                            source,
                            potentially_ambiguous_export_star_refs: Vec::new(),
                        },
                    );
                }
            }
        }
    }

    // =========================================================================
    // Export star resolution
    // =========================================================================

    fn resolve_export_stars(&mut self) {
        let sources: Vec<SourceIndex> = self.reachable_files.clone();
        for source in sources {
            let mut visited = FxHashSet::default();
            self.resolve_export_stars_for(source, &mut visited);
        }
        // Deterministic alias listing, used by namespace objects and entry
        // export clauses
        for &source in &self.reachable_files.clone() {
            let lf = &mut self.linker_files[source.index()];
            let mut aliases: Vec<String> = lf.resolved_exports.keys().cloned().collect();
            aliases.sort();
            lf.sorted_and_filtered_export_aliases = aliases;
        }
    }

    fn resolve_export_stars_for(
        &mut self,
        source: SourceIndex,
        visited: &mut FxHashSet<SourceIndex>,
    ) {
        if self.linker_files[source.index()].export_star_resolved
            || !visited.insert(source)
        {
            return;
        }
        let Some(ast) = self.js(source) else {
            self.linker_files[source.index()].export_star_resolved = true;
            return;
        };
        let star_records: Vec<u32> = ast.export_star_import_records.clone();
        for record_index in star_records {
            let record = &self.js(source).unwrap().import_records[record_index as usize];
            let Some(target) = record.source_index else {
                continue; // external star re-exports resolve at run time
            };
            let Some(target_ast) = self.js(target) else {
                continue;
            };
            if target_ast.exports_kind == ExportsKind::CommonJs {
                // CommonJS exports are unknowable statically
                continue;
            }
            // Depth first so the target's own stars are flattened already
            self.resolve_export_stars_for(target, visited);

            let target_exports: Vec<(String, ExportData)> = self.linker_files
                [target.index()]
            .resolved_exports
            .iter()
            .map(|(a, d)| (a.clone(), d.clone()))
            .collect();
            let lf = &mut self.linker_files[source.index()];
            for (alias, data) in target_exports {
                if alias == "default" {
                    // `export *` never re-exports default
                    continue;
                }
                match lf.resolved_exports.get_mut(&alias) {
                    None => {
                        lf.resolved_exports.insert(alias, data);
                    }
                    Some(existing) => {
                        if existing.ref_ != data.ref_ {
                            existing
                                .potentially_ambiguous_export_star_refs
                                .push((data.source, data.ref_));
                        }
                    }
                }
            }
        }
        self.linker_files[source.index()].export_star_resolved = true;
    }

    // =========================================================================
    // Runtime helpers
    // =========================================================================

    pub(crate) fn runtime_export(&self, name: &str) -> Option<Ref> {
        self.linker_files[SourceIndex::RUNTIME.index()]
            .resolved_exports
            .get(name)
            .map(|d| d.ref_)
    }

    /// Force a runtime helper to survive tree shaking (wrappers and
    /// namespace objects are synthesized after liveness seeds are chosen).
    fn force_runtime_helper(&mut self, name: &str) -> Ref {
        match self.runtime_export(name) {
            Some(r) => {
                if !self.forced_runtime_refs.contains(&r) {
                    self.forced_runtime_refs.push(r);
                }
                r
            }
            None => {
                self.log.add_error(
                    SourceIndex::RUNTIME.0,
                    Span::DUMMY,
                    format!("The runtime library is missing the \"{name}\" helper"),
                );
                Ref::INVALID
            }
        }
    }

    fn merge_runtime_imports(&mut self) {
        for &source in &self.reachable_files.clone() {
            if source == SourceIndex::RUNTIME {
                continue;
            }
            let Some(ast) = self.js(source) else { continue };
            let imports: Vec<(String, Ref)> = ast
                .runtime_imports
                .iter()
                .map(|(n, r)| (n.clone(), *r))
                .collect();
            for (name, local) in imports {
                match self.runtime_export(&name) {
                    Some(export_ref) => {
                        self.symbols.merge(local, export_ref);
                    }
                    None => {
                        self.log.add_error(
                            source.0,
                            Span::DUMMY,
                            format!("The runtime library is missing the \"{name}\" helper"),
                        );
                    }
                }
            }
        }
    }

    // =========================================================================
    // Import binding
    // =========================================================================

    fn bind_imports(&mut self) {
        for &source in &self.reachable_files.clone() {
            let Some(ast) = self.js(source) else { continue };
            let named_imports: Vec<(Ref, NamedImport)> = ast
                .named_imports
                .iter()
                .map(|(r, n)| (*r, n.clone()))
                .collect();
            for (import_ref, import) in named_imports {
                self.bind_one_import(source, import_ref, &import);
            }
        }
    }

    fn bind_one_import(&mut self, source: SourceIndex, import_ref: Ref, import: &NamedImport) {
        let record = {
            let ast = self.js(source).expect("importer is a JS file");
            ast.import_records[import.import_record_index as usize].clone()
        };
        let Some(target) = record.source_index else {
            self.linker_files[source.index()]
                .imports_to_bind
                .insert(import_ref, ImportData::External);
            return;
        };

        let target_is_cjs = matches!(
            self.js(target).map(|a| a.exports_kind),
            Some(ExportsKind::CommonJs)
        );

        if target_is_cjs {
            // Property access on the require() result
            let ns_ref = self.namespace_ref_for_record(source, import.import_record_index);
            if import.is_star {
                self.symbols.merge(import_ref, ns_ref);
                self.linker_files[source.index()]
                    .imports_to_bind
                    .insert(import_ref, ImportData::Resolved { source, ref_: ns_ref });
            } else {
                self.symbols.get_mut(import_ref).namespace_alias =
                    Some(kestrel_parser::symbols::NamespaceAlias {
                        namespace_ref: ns_ref,
                        alias: import.alias.clone(),
                    });
                self.linker_files[source.index()].imports_to_bind.insert(
                    import_ref,
                    ImportData::NamespaceProperty {
                        namespace_ref: ns_ref,
                        alias: import.alias.clone(),
                    },
                );
            }
            return;
        }

        if self.js(target).is_none() {
            // Empty/CSS modules bind nothing
            return;
        }

        if import.is_star {
            let ns_ref = self.ensure_namespace_object(target);
            self.symbols.merge(import_ref, ns_ref);
            self.linker_files[source.index()]
                .imports_to_bind
                .insert(import_ref, ImportData::Resolved { source: target, ref_: ns_ref });
            return;
        }

        let resolved = self.linker_files[target.index()]
            .resolved_exports
            .get(&import.alias)
            .cloned();
        match resolved {
            Some(data) => {
                // Star re-export ambiguity is decided after Follow: if all
                // candidates funnel to one terminal it is not ambiguous
                if !data.potentially_ambiguous_export_star_refs.is_empty() {
                    let main = self.symbols.follow(data.ref_);
                    let mut distinct: Vec<(SourceIndex, Ref)> = Vec::new();
                    for &(src, r) in &data.potentially_ambiguous_export_star_refs {
                        if self.symbols.follow(r) != main {
                            distinct.push((src, r));
                        }
                    }
                    if !distinct.is_empty() {
                        let mut notes = vec![Note {
                            text: format!(
                                "One matching export is in \"{}\"",
                                self.sources[data.source.index()].pretty_path
                            ),
                            location: None,
                        }];
                        for (src, _) in &distinct {
                            notes.push(Note {
                                text: format!(
                                    "Another matching export is in \"{}\"",
                                    self.sources[src.index()].pretty_path
                                ),
                                location: None,
                            });
                        }
                        self.error_with_notes(
                            source,
                            import.alias_span,
                            format!(
                                "Ambiguous import \"{}\" has multiple matching exports",
                                import.alias
                            ),
                            notes,
                        );
                        return;
                    }
                }
                self.symbols.merge(import_ref, data.ref_);
                self.linker_files[source.index()].imports_to_bind.insert(
                    import_ref,
                    ImportData::Resolved {
                        source: data.source,
                        ref_: data.ref_,
                    },
                );
            }
            None => {
                let importer_is_ts = self.loader_of(source).is_typescript();
                let target_is_ts = self.loader_of(target).is_typescript();
                if importer_is_ts && target_is_ts {
                    // A type that compiled away; silently drop it
                    self.linker_files[source.index()]
                        .is_probably_typescript_type
                        .insert(import_ref);
                    self.linker_files[source.index()]
                        .imports_to_bind
                        .insert(import_ref, ImportData::ProbablyTypeScriptType);
                    return;
                }
                let notes = vec![Note {
                    text: format!(
                        "The file \"{}\" has no export named \"{}\"",
                        self.sources[target.index()].pretty_path,
                        import.alias
                    ),
                    location: None,
                }];
                self.error_with_notes(
                    source,
                    import.alias_span,
                    format!(
                        "No matching export in \"{}\" for import \"{}\"",
                        self.sources[target.index()].pretty_path,
                        import.alias
                    ),
                    notes,
                );
            }
        }
    }

    /// One `import_<stem>` var per (importer, record) captures the
    /// `__toESM(require_target())` result.
    fn namespace_ref_for_record(&mut self, source: SourceIndex, record_index: u32) -> Ref {
        let key = (source.0, record_index);
        if let Some(&r) = self.record_namespace_refs.get(&key) {
            return r;
        }
        let stem = file_stem(&self.sources[source.index()].pretty_path);
        let target_stem = self
            .js(source)
            .and_then(|ast| {
                ast.import_records
                    .get(record_index as usize)
                    .and_then(|r| r.source_index)
            })
            .map(|t| file_stem(&self.sources[t.index()].pretty_path))
            .unwrap_or(stem);
        let r = self.create_symbol(
            source,
            Symbol::new(format!("import_{}", sanitize(&target_stem)), SymbolKind::Hoisted),
        );
        self.record_namespace_refs.insert(key, r);
        r
    }

    pub(crate) fn create_symbol(&mut self, source: SourceIndex, symbol: Symbol) -> Ref {
        let inner = self.symbols.outer[source.index()].len() as u32;
        self.symbols.outer[source.index()].push(symbol);
        Ref {
            source: source.0,
            inner,
        }
    }

    /// Materialise `var t_exports = {}; __export(t_exports, {...})` in the
    /// target file so `import * as ns` and `require()` of ESM files have a
    /// value to hand out. Synthesized before tree shaking so it
    /// participates in liveness like any other part.
    fn ensure_namespace_object(&mut self, target: SourceIndex) -> Ref {
        if let Some(r) = self.linker_files[target.index()].exports_object_ref {
            return r;
        }
        let stem = sanitize(&file_stem(&self.sources[target.index()].pretty_path));
        let ns_ref = self.create_symbol(
            target,
            Symbol::new(format!("{stem}_exports"), SymbolKind::Hoisted),
        );
        let export_helper = self.force_runtime_helper("__export");

        // Getter properties keep live bindings: { alias: () => ref }
        let aliases: Vec<(String, ExportData)> = self.linker_files[target.index()]
            .sorted_and_filtered_export_aliases
            .iter()
            .filter_map(|alias| {
                self.linker_files[target.index()]
                    .resolved_exports
                    .get(alias)
                    .map(|d| (alias.clone(), d.clone()))
            })
            .collect();

        let mut properties = Vec::new();
        let mut part = Part::default();
        part.can_be_removed_if_unused = true;
        part.declared_symbols.push(ns_ref);
        part.add_symbol_use(export_helper);
        for (alias, data) in &aliases {
            let symbol_name = self.symbols.get(data.ref_).original_name.clone();
            properties.push(Property {
                kind: PropertyKind::Normal,
                key: Expr::string(alias.clone()),
                value: Some(Expr::synth(EData::Arrow(Box::new(EArrow {
                    args: Vec::new(),
                    body: ArrowBody::Expr(Box::new(Expr::ident(data.ref_, symbol_name))),
                    is_async: false,
                })))),
                computed: false,
                shorthand: false,
                method: false,
            });
            part.add_symbol_use(data.ref_);
        }

        let ns_name = format!("{stem}_exports");
        let decl = Stmt::synth(SData::Local(SLocal {
            kind: LocalKind::Var,
            decls: vec![Decl {
                binding: Binding::Ident(EIdent {
                    name: ns_name.clone(),
                    ref_: ns_ref,
                }),
                value: Some(Expr::synth(EData::Object(Vec::new()))),
            }],
            is_export: false,
        }));
        let export_call = Stmt::expr(Expr::call(
            Expr::ident(export_helper, "__export"),
            vec![
                Expr::ident(ns_ref, ns_name),
                Expr::synth(EData::Object(properties)),
            ],
        ));
        part.stmts = vec![decl, export_call];

        let ast = self.files[target.index()]
            .as_js_mut()
            .expect("namespace target is a JS file");
        let part_index = ast.parts.len() as u32;
        // Dependencies on the exported symbols' declaring parts flow
        // through symbol_uses during tree shaking
        ast.top_level_symbol_to_parts
            .entry(ns_ref)
            .or_default()
            .push(part_index);
        ast.parts.push(part);

        let lf = &mut self.linker_files[target.index()];
        lf.exports_object_ref = Some(ns_ref);
        lf.namespace_part_index = Some(part_index);
        lf.needs_exports_variable = true;
        ns_ref
    }

    // =========================================================================
    // Wrapping and top-level await
    // =========================================================================

    fn classify_wrapping(&mut self) {
        // Top-level-await propagation to a fixpoint
        let mut async_files: FxHashSet<SourceIndex> = FxHashSet::default();
        for &source in &self.reachable_files {
            if self.js(source).is_some_and(|a| a.top_level_await_span.is_some()) {
                async_files.insert(source);
            }
        }
        let importers = compute_importers(&self.files);
        let mut queue: Vec<SourceIndex> = async_files.iter().copied().collect();
        queue.sort();
        while let Some(source) = queue.pop() {
            if let Some(list) = importers.get(&source) {
                for &importer in list {
                    // Only static imports propagate asyncness
                    if async_files.insert(importer) {
                        queue.push(importer);
                    }
                }
            }
        }
        for &source in &async_files {
            if source.index() < self.linker_files.len() {
                self.linker_files[source.index()].is_async_or_has_async_dependency = true;
            }
        }

        // Top-level await is only representable in ESM-like output
        if !self.options.format.keeps_esm_syntax() {
            for &source in &self.reachable_files {
                if let Some(span) = self.js(source).and_then(|a| a.top_level_await_span) {
                    self.log.add_error(
                        source.0,
                        span,
                        "Top-level await is not available in the configured output format",
                    );
                }
            }
        }

        // CommonJS files wrap; `require` of ESM wraps the target
        let mut to_wrap: Vec<(SourceIndex, WrapKind)> = Vec::new();
        for &source in &self.reachable_files {
            let Some(ast) = self.js(source) else { continue };
            if ast.exports_kind == ExportsKind::CommonJs {
                to_wrap.push((source, WrapKind::Cjs));
            }
            for record in &ast.import_records {
                let Some(target) = record.source_index else { continue };
                if record.kind == ImportKind::Require {
                    match self.js(target).map(|a| a.exports_kind) {
                        Some(ExportsKind::CommonJs) => {}
                        Some(_) => {
                            to_wrap.push((target, WrapKind::Esm));
                        }
                        None => {}
                    }
                    if self.linker_files[target.index()].is_async_or_has_async_dependency
                        || self
                            .js(target)
                            .is_some_and(|a| a.top_level_await_span.is_some())
                    {
                        self.log.add_error(
                            source.0,
                            record.range,
                            format!(
                                "This require call is not allowed because \"{}\" contains a top-level await",
                                self.sources[target.index()].pretty_path
                            ),
                        );
                    }
                }
            }
        }
        for (source, kind) in to_wrap {
            let lf = &mut self.linker_files[source.index()];
            if lf.wrap == WrapKind::None {
                lf.wrap = kind;
            }
        }

        // Async non-entry files defer through an (async) init wrapper
        for &source in &self.reachable_files.clone() {
            let lf = &self.linker_files[source.index()];
            if lf.is_async_or_has_async_dependency
                && lf.entry_kind.is_none()
                && lf.wrap == WrapKind::None
                && self.js(source).is_some()
            {
                self.linker_files[source.index()].wrap = WrapKind::Esm;
            }
        }

        // Wrapped files wrap their ESM dependencies, to a fixpoint
        loop {
            let mut changed = false;
            for &source in &self.reachable_files.clone() {
                let lf = &self.linker_files[source.index()];
                if lf.wrap == WrapKind::None || lf.did_wrap_dependencies {
                    continue;
                }
                self.linker_files[source.index()].did_wrap_dependencies = true;
                let Some(ast) = self.js(source) else { continue };
                let targets: Vec<SourceIndex> = ast
                    .import_records
                    .iter()
                    .filter(|r| r.kind != ImportKind::Dynamic)
                    .filter_map(|r| r.source_index)
                    .collect();
                for target in targets {
                    if target == SourceIndex::RUNTIME {
                        continue;
                    }
                    let tlf = &mut self.linker_files[target.index()];
                    if tlf.wrap == WrapKind::None
                        && self.files[target.index()].as_js().is_some()
                    {
                        self.linker_files[target.index()].wrap = WrapKind::Esm;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // Requiring an ESM file reads its namespace object
        for &source in &self.reachable_files.clone() {
            let Some(ast) = self.js(source) else { continue };
            let targets: Vec<SourceIndex> = ast
                .import_records
                .iter()
                .filter(|r| r.kind == ImportKind::Require)
                .filter_map(|r| r.source_index)
                .filter(|t| {
                    self.js(*t)
                        .is_some_and(|a| a.exports_kind != ExportsKind::CommonJs)
                })
                .collect();
            for target in targets {
                self.ensure_namespace_object(target);
                self.force_runtime_helper("__toCommonJS");
                // The namespace object is read by a post-shake rewrite, so
                // liveness cannot discover it through symbol uses
                if let Some(part) = self.linker_files[target.index()].namespace_part_index {
                    self.forced_parts.push(PartRef {
                        source: target.0,
                        part,
                    });
                }
            }
        }

        // Helper needs driven by the wrap decisions
        let mut wants_to_esm = false;
        let mut wants_commonjs = false;
        let mut wants_esm_wrapper = false;
        for &source in &self.reachable_files {
            match self.linker_files[source.index()].wrap {
                WrapKind::Cjs => wants_commonjs = true,
                WrapKind::Esm => wants_esm_wrapper = true,
                WrapKind::None => {}
            }
        }
        if !self.record_namespace_refs.is_empty() {
            wants_to_esm = true;
        }
        if wants_commonjs {
            self.force_runtime_helper("__commonJS");
        }
        if wants_esm_wrapper {
            self.force_runtime_helper("__esm");
        }
        if wants_to_esm {
            self.force_runtime_helper("__toESM");
        }

        // Import statements of wrapped files carry the wrapper invocation
        // after rewriting; they must survive tree shaking even when their
        // bindings are unused
        let wrapped: FxHashSet<u32> = self
            .reachable_files
            .iter()
            .filter(|s| self.linker_files[s.index()].wrap != WrapKind::None)
            .map(|s| s.0)
            .collect();
        if !wrapped.is_empty() {
            for &source in &self.reachable_files.clone() {
                let record_targets: Vec<Option<u32>> = match self.js(source) {
                    Some(ast) => ast
                        .import_records
                        .iter()
                        .map(|r| r.source_index.map(|s| s.0))
                        .collect(),
                    None => continue,
                };
                let Some(ast) = self.files[source.index()].as_js_mut() else {
                    continue;
                };
                for part in &mut ast.parts {
                    if !part.can_be_removed_if_unused {
                        continue;
                    }
                    let records = collect_part_records(part);
                    let touches_wrapped = records.iter().any(|&i| {
                        record_targets
                            .get(i as usize)
                            .copied()
                            .flatten()
                            .is_some_and(|t| wrapped.contains(&t))
                    });
                    if touches_wrapped {
                        part.can_be_removed_if_unused = false;
                    }
                }
            }
        }
    }

    // =========================================================================
    // Tree shaking
    // =========================================================================

    fn tree_shake(&mut self) {
        if self.options.disable_tree_shaking {
            for &source in &self.reachable_files.clone() {
                if let Some(ast) = self.files[source.index()].as_js_mut() {
                    for part in &mut ast.parts {
                        part.is_live = true;
                    }
                }
            }
            return;
        }

        let mut shaker = Shaker {
            live: FxHashSet::default(),
            included_files: FxHashSet::default(),
            work: Vec::new(),
        };

        // Seeds: entry files, forced runtime helpers and forced parts
        for entry in self.entry_points.clone() {
            shaker.include_file(entry.source, &self.files, &self.symbols, true);
        }
        for r in self.forced_runtime_refs.clone() {
            let terminal = self.symbols.follow(r);
            self.mark_symbol_parts(&mut shaker, terminal);
        }
        for part in self.forced_parts.clone() {
            shaker.mark(part);
        }
        // Exported symbols of entry points stay alive
        for entry in self.entry_points.clone() {
            let aliases: Vec<ExportData> = self.linker_files[entry.source.index()]
                .resolved_exports
                .values()
                .cloned()
                .collect();
            for data in aliases {
                let terminal = self.symbols.follow(data.ref_);
                self.mark_symbol_parts(&mut shaker, terminal);
            }
        }

        // Propagate
        while let Some(part_ref) = shaker.work.pop() {
            let source = SourceIndex(part_ref.source);
            let (symbol_uses, record_indices) = {
                let Some(ast) = self.js(source) else { continue };
                let Some(part) = ast.parts.get(part_ref.part as usize) else {
                    continue;
                };
                let uses: Vec<Ref> = part.symbol_uses.keys().copied().collect();
                let records = collect_part_records(part);
                (uses, records)
            };
            for r in symbol_uses {
                let terminal = self.symbols.follow(r);
                self.mark_symbol_parts(&mut shaker, terminal);
            }
            for record_index in record_indices {
                let target = {
                    let ast = self.js(source).unwrap();
                    ast.import_records
                        .get(record_index as usize)
                        .and_then(|r| r.source_index)
                };
                if let Some(target) = target {
                    let force = !self
                        .side_effects_false
                        .get(target.index())
                        .copied()
                        .unwrap_or(false);
                    shaker.include_file(target, &self.files, &self.symbols, force);
                }
            }
        }

        // Write the live bits back
        for &source in &self.reachable_files.clone() {
            let live: Vec<u32> = shaker
                .live
                .iter()
                .filter(|p| p.source == source.0)
                .map(|p| p.part)
                .collect();
            if let Some(ast) = self.files[source.index()].as_js_mut() {
                for (i, part) in ast.parts.iter_mut().enumerate() {
                    part.is_live = live.contains(&(i as u32));
                }
            }
        }
    }

    fn mark_symbol_parts(&mut self, shaker: &mut Shaker, terminal: Ref) {
        let source = SourceIndex(terminal.source);
        let Some(ast) = self.js(source) else { return };
        if let Some(parts) = ast.top_level_symbol_to_parts.get(&terminal) {
            for &part in parts.clone().iter() {
                shaker.mark(PartRef {
                    source: terminal.source,
                    part,
                });
            }
        }
    }

    fn compute_chunks(&mut self) -> Vec<Chunk> {
        chunk::compute_chunks(self)
    }

    fn compute_css_module_exports(
        &mut self,
    ) -> FxHashMap<SourceIndex, IndexMap<String, String>> {
        let mut out: FxHashMap<SourceIndex, IndexMap<String, String>> = FxHashMap::default();
        for &source in &self.reachable_files {
            let Some(css) = self.files[source.index()].as_css() else {
                continue;
            };
            if !css.has_local_scope {
                continue;
            }
            let mut exports = IndexMap::new();
            for (alias, export) in &css.exports {
                let mut classes = vec![alias.clone()];
                classes.extend(export.composes_local.iter().cloned());
                for (name, record_index) in &export.composes_from {
                    // The composed class keeps the name it has in its own
                    // file (after any renaming, which is name-preserving
                    // for CSS here)
                    let record = &css.import_records[*record_index as usize];
                    if record.source_index.is_some() {
                        classes.push(name.clone());
                    }
                }
                exports.insert(alias.clone(), classes.join(" "));
            }
            out.insert(source, exports);
        }
        out
    }
}

struct Shaker {
    live: FxHashSet<PartRef>,
    included_files: FxHashSet<SourceIndex>,
    work: Vec<PartRef>,
}

impl Shaker {
    fn mark(&mut self, part: PartRef) {
        if self.live.insert(part) {
            self.work.push(part);
        }
    }

    /// A file reached by a live import runs its side-effecting parts,
    /// unless its package opted out with `sideEffects: false`.
    fn include_file(
        &mut self,
        source: SourceIndex,
        files: &[FileKind],
        _symbols: &SymbolMap,
        force_side_effects: bool,
    ) {
        if !self.included_files.insert(source) {
            return;
        }
        let Some(ast) = files.get(source.index()).and_then(FileKind::as_js) else {
            return;
        };
        for (i, part) in ast.parts.iter().enumerate() {
            if force_side_effects && !part.can_be_removed_if_unused {
                self.mark(PartRef {
                    source: source.0,
                    part: i as u32,
                });
            }
        }
    }
}

/// Record indices referenced by a part, including requires and dynamic
/// imports nested in expressions.
fn collect_part_records(part: &Part) -> Vec<u32> {
    let mut out = Vec::new();
    for stmt in &part.stmts {
        collect_stmt_records(stmt, &mut out);
    }
    out
}

fn collect_stmt_records(stmt: &Stmt, out: &mut Vec<u32>) {
    match &stmt.data {
        SData::Import(import) => out.push(import.import_record_index),
        SData::ExportStar(star) => out.push(star.import_record_index),
        SData::ExportNamed(export) => {
            if let Some(record) = export.import_record_index {
                out.push(record);
            }
        }
        SData::Expr(e) | SData::Throw(e) => collect_expr_records(e, out),
        SData::Return(Some(e)) => collect_expr_records(e, out),
        SData::Block(stmts) => {
            for s in stmts {
                collect_stmt_records(s, out);
            }
        }
        SData::If { test, yes, no } => {
            collect_expr_records(test, out);
            collect_stmt_records(yes, out);
            if let Some(no) = no {
                collect_stmt_records(no, out);
            }
        }
        SData::While { test, body } | SData::DoWhile { test, body } => {
            collect_expr_records(test, out);
            collect_stmt_records(body, out);
        }
        SData::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                collect_stmt_records(init, out);
            }
            if let Some(test) = test {
                collect_expr_records(test, out);
            }
            if let Some(update) = update {
                collect_expr_records(update, out);
            }
            collect_stmt_records(body, out);
        }
        SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
            collect_stmt_records(init, out);
            collect_expr_records(value, out);
            collect_stmt_records(body, out);
        }
        SData::Switch { test, cases } => {
            collect_expr_records(test, out);
            for case in cases {
                if let Some(v) = &case.value {
                    collect_expr_records(v, out);
                }
                for s in &case.body {
                    collect_stmt_records(s, out);
                }
            }
        }
        SData::Try {
            block,
            catch,
            finally,
        } => {
            for s in block {
                collect_stmt_records(s, out);
            }
            if let Some(catch) = catch {
                for s in &catch.body {
                    collect_stmt_records(s, out);
                }
            }
            if let Some(finally) = finally {
                for s in finally {
                    collect_stmt_records(s, out);
                }
            }
        }
        SData::Label { stmt, .. } => collect_stmt_records(stmt, out),
        SData::Local(local) => {
            for decl in &local.decls {
                if let Some(value) = &decl.value {
                    collect_expr_records(value, out);
                }
            }
        }
        SData::Function { func, .. } => {
            for s in &func.body {
                collect_stmt_records(s, out);
            }
        }
        SData::Class { class, .. } => collect_class_records(class, out),
        SData::ExportDefault(export) => match &export.value {
            ExportDefaultValue::Expr(e) => collect_expr_records(e, out),
            ExportDefaultValue::Func(func) => {
                for s in &func.body {
                    collect_stmt_records(s, out);
                }
            }
            ExportDefaultValue::Class(class) => collect_class_records(class, out),
        },
        _ => {}
    }
}

fn collect_class_records(class: &Class, out: &mut Vec<u32>) {
    if let Some(extends) = &class.extends {
        collect_expr_records(extends, out);
    }
    for prop in &class.properties {
        if let Some(func) = &prop.func {
            for s in &func.body {
                collect_stmt_records(s, out);
            }
        }
        if let Some(init) = &prop.initializer {
            collect_expr_records(init, out);
        }
        for s in &prop.block {
            collect_stmt_records(s, out);
        }
    }
}

fn collect_expr_records(expr: &Expr, out: &mut Vec<u32>) {
    match &expr.data {
        EData::RequireString {
            import_record_index,
        }
        | EData::RequireResolveString {
            import_record_index,
        } => out.push(*import_record_index),
        EData::ImportCall(call) => {
            if let Some(record) = call.import_record_index {
                out.push(record);
            }
            collect_expr_records(&call.expr, out);
        }
        EData::Array(items) => {
            for item in items {
                collect_expr_records(item, out);
            }
        }
        EData::Object(props) => {
            for prop in props {
                if let Some(value) = &prop.value {
                    collect_expr_records(value, out);
                }
            }
        }
        EData::Spread(e) | EData::Await(e) => collect_expr_records(e, out),
        EData::Dot(d) => collect_expr_records(&d.target, out),
        EData::Index(i) => {
            collect_expr_records(&i.target, out);
            collect_expr_records(&i.index, out);
        }
        EData::Call(c) => {
            collect_expr_records(&c.target, out);
            for arg in &c.args {
                collect_expr_records(arg, out);
            }
        }
        EData::New(n) => {
            collect_expr_records(&n.target, out);
            for arg in &n.args {
                collect_expr_records(arg, out);
            }
        }
        EData::Unary(u) => collect_expr_records(&u.value, out),
        EData::Binary(b) => {
            collect_expr_records(&b.left, out);
            collect_expr_records(&b.right, out);
        }
        EData::Cond(c) => {
            collect_expr_records(&c.test, out);
            collect_expr_records(&c.yes, out);
            collect_expr_records(&c.no, out);
        }
        EData::Function(func) => {
            for s in &func.body {
                collect_stmt_records(s, out);
            }
        }
        EData::Arrow(arrow) => match &arrow.body {
            ArrowBody::Expr(e) => collect_expr_records(e, out),
            ArrowBody::Stmts(stmts) => {
                for s in stmts {
                    collect_stmt_records(s, out);
                }
            }
        },
        EData::Class(class) => collect_class_records(class, out),
        EData::Template(t) => {
            for part in &t.parts {
                collect_expr_records(&part.value, out);
            }
        }
        EData::Yield(y) => {
            if let Some(value) = &y.value {
                collect_expr_records(value, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn file_stem(path: &str) -> String {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    base.split('.').next().unwrap_or(base).to_string()
}

pub(crate) fn sanitize(name: &str) -> String {
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

#[cfg(test)]
#[path = "../tests/link_unit_tests.rs"]
mod tests;
