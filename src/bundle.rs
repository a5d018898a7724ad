//! The build driver: parallel scan, link barrier, parallel print.
//!
//! The scan stage spawns one task per source on a work-stealing pool;
//! tasks recursively spawn tasks for newly discovered imports and publish
//! parsed ASTs into the shared source table. The link stage runs on one
//! thread, then printing fans out again, one task per chunk. Output bytes
//! never depend on scheduling: every sort carries a deterministic
//! tiebreaker and the mangle cache is updated through a serialised funnel.

use crate::metafile::{Metafile, MetafileInputImport, MetafileOutputInput};
use crate::options::BundleOptions;
use crate::plugin::{plugin_applies_to_path, FilterPath, OnLoadArgs, OnResolveArgs, Plugin};
use crate::resolver::{LoadArgs, ResolveArgs, Resolver};
use crate::runtime::{RUNTIME_PATH, RUNTIME_SOURCE};
use kestrel_common::source_map::{GeneratedPos, SourceMapShift};
use kestrel_common::{
    EntryPointKind, Loader, Log, Msg, OutputFormat, Source, SourceIndex, Span,
};
use kestrel_emitter::printer::css::{CssPrintOptions, CssPrinter};
use kestrel_emitter::printer::js::{PrintOptions, Printer};
use kestrel_emitter::renamer::{
    assign_nested_scope_slots, collision_renamer, number_renamer, NameMap, NumberRenamerInput,
};
use kestrel_emitter::transform::{lower, TransformOptions};
use kestrel_emitter::CharFreq;
use kestrel_linker::chunk::{chunk_unique_key, ChunkRepr};
use kestrel_linker::{link, EntryPoint, FileKind, LinkInput, LinkOptions, LinkResult};
use kestrel_parser::binder::bind;
use kestrel_parser::js_parser::{parse, ParserOptions};
use kestrel_parser::symbols::{Ref, SymbolKind, SymbolMap};
use kestrel_parser::{css_parser, json, ImportKind};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: String,
    pub contents: String,
}

#[derive(Debug)]
pub struct BuildResult {
    pub output_files: Vec<OutputFile>,
    pub msgs: Vec<Msg>,
    pub has_errors: bool,
    pub metafile: Option<String>,
    /// CSS modules class-name maps, keyed by input path.
    pub css_module_exports: FxHashMap<String, Vec<(String, String)>>,
}

/// A build-wide cancellation signal. Tasks check it at spawn points and at
/// I/O boundaries; in-flight work completes without partial writes.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The serialised funnel for shared mangle-cache updates: entries take
/// deterministic turns regardless of print scheduling.
#[derive(Default)]
pub struct MangleCache {
    names: dashmap::DashMap<String, String>,
    funnel: Mutex<()>,
}

impl MangleCache {
    /// Run `callback` with exclusive access to the cache.
    pub fn exclusive_mangle_cache_update(
        &self,
        callback: impl FnOnce(&dashmap::DashMap<String, String>),
    ) {
        let _turn = self.funnel.lock().unwrap();
        callback(&self.names);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.names.get(key).map(|v| v.clone())
    }
}

// =============================================================================
// Scan stage
// =============================================================================

#[derive(Default)]
struct ScanState {
    path_to_index: FxHashMap<(String, String), u32>,
    sources: Vec<Option<Source>>,
    files: Vec<Option<FileKind>>,
    side_effects_false: Vec<bool>,
    dynamic_entries: Vec<SourceIndex>,
}

struct ScanCtx<'a> {
    state: Mutex<ScanState>,
    log: &'a Log,
    options: &'a BundleOptions,
    resolver: Arc<dyn Resolver>,
    plugins: &'a [Plugin],
    cancel: CancelToken,
}

pub fn bundle(
    options: &BundleOptions,
    resolver: Arc<dyn Resolver>,
    plugins: &[Plugin],
    cancel: Option<CancelToken>,
) -> BuildResult {
    let log = Log::with_limit(options.log_limit);
    let cancel = cancel.unwrap_or_default();

    for plugin in plugins {
        if let Some(on_start) = &plugin.on_start {
            if let Err(message) = on_start() {
                log.add_error(0, Span::DUMMY, format!("[{}] {message}", plugin.name));
            }
        }
    }

    let scan = ScanCtx {
        state: Mutex::new(ScanState::default()),
        log: &log,
        options,
        resolver,
        plugins,
        cancel: cancel.clone(),
    };

    // The runtime always takes source index 0
    let runtime_index = {
        let mut state = scan.state.lock().unwrap();
        reserve_index(&mut state, "file", RUNTIME_PATH)
    };
    debug_assert_eq!(runtime_index, SourceIndex::RUNTIME);

    let mut entry_sources: Vec<(SourceIndex, EntryPointKind)> = Vec::new();
    {
        let scan_ref = &scan;
        rayon::in_place_scope(|scope| {
            scope.spawn(move |scope| {
                scan_task(
                    scan_ref,
                    scope,
                    runtime_index,
                    RUNTIME_PATH.to_string(),
                    "file".to_string(),
                    Some((RUNTIME_SOURCE.to_string(), Loader::Js)),
                );
            });

            // Resolve and enqueue the user entry points
            for entry in &options.entry_points {
                if scan_ref.cancel.is_cancelled() {
                    break;
                }
                let resolved = run_resolve(
                    scan_ref,
                    &entry.input_path,
                    "",
                    "",
                    "",
                    ImportKind::EntryPoint,
                );
                match resolved {
                    Ok(result) if !result.external => {
                        let namespace = if result.namespace.is_empty() {
                            "file".to_string()
                        } else {
                            result.namespace.clone()
                        };
                        let (index, is_new) = {
                            let mut state = scan_ref.state.lock().unwrap();
                            let before = state.sources.len();
                            let index = reserve_index(&mut state, &namespace, &result.path);
                            if result.side_effects_false {
                                state.side_effects_false[index.index()] = true;
                            }
                            (index, state.sources.len() > before)
                        };
                        if !entry_sources.iter().any(|&(s, _)| s == index) {
                            entry_sources.push((index, EntryPointKind::User));
                        }
                        if is_new {
                            let path = result.path.clone();
                            scope.spawn(move |scope| {
                                scan_task(scan_ref, scope, index, path, namespace, None);
                            });
                        }
                    }
                    Ok(_) => {
                        log.add_error(
                            0,
                            Span::DUMMY,
                            format!("Entry point \"{}\" cannot be external", entry.input_path),
                        );
                    }
                    Err(message) => {
                        log.add_error(0, Span::DUMMY, message);
                    }
                }
            }
        });
    }

    if cancel.is_cancelled() {
        return BuildResult {
            output_files: Vec::new(),
            msgs: log.take_msgs(),
            has_errors: log.has_errors(),
            metafile: None,
            css_module_exports: FxHashMap::default(),
        };
    }

    // ---- barrier: assemble the module graph ----
    let state = scan.state.into_inner().unwrap();
    let mut sources = Vec::with_capacity(state.sources.len());
    let mut files = Vec::with_capacity(state.files.len());
    for (i, slot) in state.sources.into_iter().enumerate() {
        match slot {
            Some(source) => sources.push(source),
            None => sources.push(Source {
                index: SourceIndex(i as u32),
                key_path: format!("<missing:{i}>"),
                pretty_path: format!("<missing:{i}>"),
                namespace: "file".to_string(),
                loader: Loader::None,
                contents: Arc::from(""),
            }),
        }
    }
    for slot in state.files {
        files.push(slot.unwrap_or_default());
    }

    let mut symbols = SymbolMap::new(files.len());
    for (i, file) in files.iter_mut().enumerate() {
        if let FileKind::Js(ast) = file {
            symbols.set_file(SourceIndex(i as u32), std::mem::take(&mut ast.symbols));
        } else if let FileKind::Css(ast) = file {
            symbols.set_file(SourceIndex(i as u32), std::mem::take(&mut ast.symbols));
        }
    }

    let mut entry_points: Vec<EntryPoint> = entry_sources
        .iter()
        .map(|&(source, kind)| EntryPoint { source, kind })
        .collect();
    for dynamic in state.dynamic_entries {
        if !entry_points.iter().any(|e| e.source == dynamic) {
            entry_points.push(EntryPoint {
                source: dynamic,
                kind: EntryPointKind::DynamicImport,
            });
        }
    }

    debug!(
        sources = sources.len(),
        entries = entry_points.len(),
        "scan complete"
    );

    // ---- link (single-threaded) ----
    let link_result = link(
        LinkInput {
            sources,
            files,
            entry_points,
            symbols,
            side_effects_false: state.side_effects_false,
            options: LinkOptions {
                format: options.format,
                disable_tree_shaking: false,
            },
        },
        &log,
    );

    if log.has_errors() {
        return BuildResult {
            output_files: Vec::new(),
            msgs: log.take_msgs(),
            has_errors: true,
            metafile: None,
            css_module_exports: FxHashMap::default(),
        };
    }

    // ---- renaming ----
    let name_map = compute_name_map(options, &link_result);

    // ---- property-mangle funnel (entry-declaration order) ----
    let mangle_cache = MangleCache::default();
    serialize_mangled_props(&link_result, &mangle_cache);

    // ---- print (parallel over chunks) ----
    let outputs = print_chunks(options, &link_result, &name_map, &log, &cancel);

    // ---- metafile ----
    let metafile = if options.write_metafile {
        Some(build_metafile(&link_result, &outputs))
    } else {
        None
    };

    let css_module_exports = link_result
        .css_module_exports
        .iter()
        .map(|(source, map)| {
            (
                link_result.sources[source.index()].pretty_path.clone(),
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )
        })
        .collect();

    let mut output_files = Vec::with_capacity(outputs.len());
    for output in outputs {
        output_files.push(output.file);
        if let Some(map_file) = output.map_file {
            output_files.push(map_file);
        }
    }

    BuildResult {
        output_files,
        msgs: log.take_msgs(),
        has_errors: log.has_errors(),
        metafile,
        css_module_exports,
    }
}

fn reserve_index(state: &mut ScanState, namespace: &str, path: &str) -> SourceIndex {
    let key = (namespace.to_string(), path.to_string());
    if let Some(&index) = state.path_to_index.get(&key) {
        return SourceIndex(index);
    }
    let index = state.sources.len() as u32;
    state.path_to_index.insert(key, index);
    state.sources.push(None);
    state.files.push(None);
    state.side_effects_false.push(false);
    SourceIndex(index)
}

fn run_resolve(
    scan: &ScanCtx<'_>,
    path: &str,
    importer: &str,
    resolve_dir: &str,
    namespace: &str,
    kind: ImportKind,
) -> Result<crate::resolver::ResolveResult, String> {
    // Plugins get the first look, in registration order
    for plugin in scan.plugins {
        for hook in &plugin.on_resolve {
            let applies = plugin_applies_to_path(
                FilterPath {
                    text: path,
                    namespace,
                },
                &hook.filter,
                &hook.namespace,
            );
            if !applies {
                continue;
            }
            let args = OnResolveArgs {
                path: path.to_string(),
                importer: importer.to_string(),
                namespace: namespace.to_string(),
            };
            if let Some(result) = (hook.callback)(&args) {
                return result.map_err(|e| format!("[{}] {e}", plugin.name));
            }
        }
    }
    scan.resolver.resolve(ResolveArgs {
        path,
        importer,
        resolve_dir,
        namespace,
        kind,
    })
}

fn run_load(
    scan: &ScanCtx<'_>,
    path: &str,
    namespace: &str,
) -> Result<crate::resolver::LoadResult, String> {
    for plugin in scan.plugins {
        for hook in &plugin.on_load {
            let applies = plugin_applies_to_path(
                FilterPath {
                    text: path,
                    namespace,
                },
                &hook.filter,
                &hook.namespace,
            );
            if !applies {
                continue;
            }
            let args = OnLoadArgs {
                path: path.to_string(),
                namespace: namespace.to_string(),
            };
            if let Some(result) = (hook.callback)(&args) {
                return result.map_err(|e| format!("[{}] {e}", plugin.name));
            }
        }
    }
    scan.resolver.load(LoadArgs { path, namespace })
}

/// Load, parse, bind and lower one source, then resolve its imports,
/// spawning scan tasks for newly discovered files.
fn scan_task<'a, 's>(
    scan: &'a ScanCtx<'a>,
    scope: &rayon::Scope<'s>,
    index: SourceIndex,
    path: String,
    namespace: String,
    preloaded: Option<(String, Loader)>,
) where
    'a: 's,
{
    if scan.cancel.is_cancelled() {
        return;
    }

    let (contents, loader) = match preloaded {
        Some(preloaded) => preloaded,
        None => match run_load(scan, &path, &namespace) {
            Ok(result) => (result.contents, result.loader),
            Err(message) => {
                scan.log.add_error(index.0, Span::DUMMY, message);
                let mut state = scan.state.lock().unwrap();
                state.sources[index.index()] = Some(Source {
                    index,
                    key_path: path.clone(),
                    pretty_path: path,
                    namespace,
                    loader: Loader::None,
                    contents: Arc::from(""),
                });
                state.files[index.index()] = Some(FileKind::Empty);
                return;
            }
        },
    };
    let loader = if loader == Loader::Default {
        Loader::from_extension(path.rsplit('.').next().unwrap_or(""))
    } else {
        loader
    };

    let source = Source {
        index,
        key_path: path.clone(),
        pretty_path: path.clone(),
        namespace: namespace.clone(),
        loader,
        contents: Arc::from(contents.as_str()),
    };

    let mut file = parse_one(scan, &source);

    // Resolve this file's import records and recurse
    let record_count = file.import_records().len();
    for record_index in 0..record_count {
        if scan.cancel.is_cancelled() {
            return;
        }
        let (record_path, record_kind) = {
            let record = &file.import_records()[record_index];
            (record.path.clone(), record.kind)
        };
        let resolved = run_resolve(scan, &record_path, &path, "", &namespace, record_kind);
        match resolved {
            Ok(result) if !result.external => {
                let target_namespace = if result.namespace.is_empty() {
                    "file".to_string()
                } else {
                    result.namespace.clone()
                };
                let (target, is_new) = {
                    let mut state = scan.state.lock().unwrap();
                    let before = state.sources.len();
                    let target =
                        reserve_index(&mut state, &target_namespace, &result.path);
                    if result.side_effects_false {
                        state.side_effects_false[target.index()] = true;
                    }
                    if record_kind == ImportKind::Dynamic {
                        state.dynamic_entries.push(target);
                    }
                    (target, state.sources.len() > before)
                };
                set_record_target(&mut file, record_index, target);
                if is_new {
                    // The discovered import parses concurrently; this
                    // nested spawn is what makes the scan work-stealing
                    let target_path = result.path.clone();
                    scope.spawn(move |scope| {
                        scan_task(scan, scope, target, target_path, target_namespace, None);
                    });
                }
            }
            Ok(_) => {
                // External imports keep their record untouched
            }
            Err(message) => {
                let (range, handles_errors) = {
                    let record = &file.import_records()[record_index];
                    (
                        record.range,
                        record
                            .flags
                            .contains(kestrel_parser::ImportRecordFlags::HANDLES_IMPORT_ERRORS),
                    )
                };
                if handles_errors {
                    // The import site catches failures; demote to a note
                    scan.log.add_debug(index.0, range, message);
                } else {
                    scan.log.add_error(index.0, range, message);
                }
            }
        }
    }

    let mut state = scan.state.lock().unwrap();
    state.sources[index.index()] = Some(source);
    state.files[index.index()] = Some(file);
}

fn set_record_target(file: &mut FileKind, record_index: usize, target: SourceIndex) {
    match file {
        FileKind::Js(ast) => ast.import_records[record_index].source_index = Some(target),
        FileKind::Css(ast) => ast.import_records[record_index].source_index = Some(target),
        FileKind::Empty => {}
    }
}

fn parse_one(scan: &ScanCtx<'_>, source: &Source) -> FileKind {
    match source.loader {
        Loader::Js
        | Loader::Jsx
        | Loader::Ts
        | Loader::TsNoAmbiguousLessThan
        | Loader::Tsx => {
            let parser_options = ParserOptions {
                loader: source.loader,
                jsx: scan.options.jsx.clone(),
                defines: scan.options.defines.clone(),
                ts_always_strict: false,
                keep_names: scan.options.keep_names,
            };
            let mut ast = parse(source, &parser_options, scan.log);
            bind(&mut ast, &parser_options, scan.log, source.index.0);
            let transform_options = TransformOptions {
                target: scan.options.target,
                keep_names: scan.options.keep_names,
                ..TransformOptions::default()
            };
            lower(&mut ast, source.index.0, &transform_options, scan.log);
            FileKind::Js(Box::new(ast))
        }
        Loader::Json => FileKind::Js(Box::new(json::parse_json_module(source, scan.log))),
        Loader::Css => FileKind::Css(Box::new(css_parser::parse_css(source, scan.log))),
        Loader::Text => FileKind::Js(Box::new(synthetic_default_export(
            source,
            scan,
            source.contents.to_string(),
        ))),
        Loader::Base64 => {
            let encoded = kestrel_common::source_map::base64_encode(source.contents.as_bytes());
            FileKind::Js(Box::new(synthetic_default_export(source, scan, encoded)))
        }
        Loader::DataUrl => {
            let url = format!(
                "data:text/plain;base64,{}",
                kestrel_common::source_map::base64_encode(source.contents.as_bytes())
            );
            FileKind::Js(Box::new(synthetic_default_export(source, scan, url)))
        }
        Loader::File | Loader::Binary | Loader::Copy | Loader::Default | Loader::None => {
            FileKind::Empty
        }
    }
}

/// Wrap a computed string as `export default "<text>"`.
fn synthetic_default_export(
    source: &Source,
    scan: &ScanCtx<'_>,
    text: String,
) -> kestrel_parser::Ast {
    let synthetic = Source {
        index: source.index,
        key_path: source.key_path.clone(),
        pretty_path: source.pretty_path.clone(),
        namespace: source.namespace.clone(),
        loader: Loader::Js,
        contents: Arc::from(
            format!(
                "export default {};",
                kestrel_emitter::printer::js::quote_string(&text, false)
            )
            .as_str(),
        ),
    };
    let parser_options = ParserOptions::default();
    let mut ast = parse(&synthetic, &parser_options, scan.log);
    bind(&mut ast, &parser_options, scan.log, source.index.0);
    ast
}

// =============================================================================
// Renaming
// =============================================================================

fn compute_name_map(options: &BundleOptions, result: &LinkResult) -> (NameMap, SymbolMap) {
    // The printer reads through `follow`, so renaming happens on a local
    // handle of the symbol table
    let mut symbols = SymbolMap {
        outer: result.symbols.outer.clone(),
    };

    // Names the output must never shadow: every unbound reference
    let mut excluded: FxHashSet<String> = FxHashSet::default();
    for &source in &result.reachable_files {
        for symbol in &symbols.outer[source.index()] {
            if symbol.kind == SymbolKind::Unbound {
                excluded.insert(symbol.original_name.clone());
            }
        }
    }

    let reachable_js: Vec<u32> = result
        .reachable_files
        .iter()
        .filter(|s| result.files[s.index()].as_js().is_some())
        .map(|s| s.0)
        .collect();

    let names = if options.minify_identifiers {
        let mut freq = CharFreq::new();
        let mut top_level: Vec<Ref> = Vec::new();
        for &source in &result.reachable_files {
            let Some(ast) = result.files[source.index()].as_js() else {
                continue;
            };
            if let Some(counts) = &ast.char_freq {
                freq.add_counts(counts);
            }
            if let Some(scopes) = &ast.scopes {
                assign_nested_scope_slots(scopes, source.0, &mut symbols.outer[source.index()]);
                for &r in scopes.get(kestrel_parser::scope::ScopeId::ROOT).members.values() {
                    top_level.push(r);
                }
            }
            // Generated and linker-created symbols rename like top-level
            for inner in 0..symbols.outer[source.index()].len() {
                let r = Ref {
                    source: source.0,
                    inner: inner as u32,
                };
                let symbol = &symbols.outer[source.index()][inner as usize];
                if symbol.kind == SymbolKind::Injected || symbol.nested_scope_slot.is_none() {
                    top_level.push(r);
                }
            }
        }
        let minifier = freq.compile();
        number_renamer(NumberRenamerInput {
            symbols: &symbols,
            minifier: &minifier,
            top_level,
            excluded,
        })
    } else {
        collision_renamer(&symbols, &reachable_js, &excluded)
    };
    (names, symbols)
}

// =============================================================================
// Property mangling funnel
// =============================================================================

/// Give each entry point a serialised turn at the shared mangle cache, in
/// entry-declaration order, so mangled names are deterministic regardless
/// of print scheduling.
fn serialize_mangled_props(result: &LinkResult, cache: &MangleCache) {
    for chunk in &result.chunks {
        if chunk.entry_source.is_none() {
            continue;
        }
        cache.exclusive_mangle_cache_update(|names| {
            for &source in &chunk.files {
                for symbol in &result.symbols.outer[source.index()] {
                    if symbol.kind == SymbolKind::MangledProp
                        && !names.contains_key(&symbol.original_name)
                    {
                        let next = format!("m{}", names.len());
                        names.insert(symbol.original_name.clone(), next);
                    }
                }
            }
        });
    }
}

// =============================================================================
// Printing and hashing
// =============================================================================

struct ChunkOutput {
    file: OutputFile,
    map_file: Option<OutputFile>,
}

struct PrintedChunk {
    code: String,
    map: Option<kestrel_common::source_map::SourceMapBuilder>,
}

fn print_chunks(
    options: &BundleOptions,
    result: &LinkResult,
    names: &(NameMap, SymbolMap),
    log: &Log,
    cancel: &CancelToken,
) -> Vec<ChunkOutput> {
    let (name_map, symbols) = names;

    // One task per chunk
    let printed: Vec<PrintedChunk> = result
        .chunks
        .par_iter()
        .map(|chunk| {
            if cancel.is_cancelled() {
                return PrintedChunk {
                    code: String::new(),
                    map: None,
                };
            }
            print_one_chunk(options, result, symbols, name_map, chunk)
        })
        .collect();
    let _ = log;

    // Content hashes: placeholder bodies first, then a placeholder->hash
    // fixpoint so chunks that reference other chunks converge
    let mut hashes: Vec<u64> = printed.iter().map(|p| fx_hash(p.code.as_bytes())).collect();
    for _round in 0..8 {
        let next: Vec<u64> = printed
            .iter()
            .map(|p| {
                let mut hasher = FxHasher::default();
                hasher.write(p.code.as_bytes());
                for (i, &h) in hashes.iter().enumerate() {
                    if p.code.contains(&chunk_unique_key(i)) {
                        hasher.write_u64(h);
                    }
                }
                hasher.finish()
            })
            .collect();
        if next == hashes {
            break;
        }
        hashes = next;
    }

    // Final paths
    let paths: Vec<String> = result
        .chunks
        .iter()
        .zip(hashes.iter())
        .map(|(chunk, &hash)| {
            chunk
                .path_template
                .substitute(None, None, Some(&format!("{:08X}", hash as u32)), None)
                .render()
        })
        .collect();

    // Substitute chunk placeholders, tracking source-map shifts
    printed
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut code = chunk.code;
            let mut shifts: Vec<SourceMapShift> = Vec::new();
            for (j, path) in paths.iter().enumerate() {
                let key = chunk_unique_key(j);
                if !code.contains(&key) {
                    continue;
                }
                let replacement = format!("./{path}");
                let mut search_from = 0usize;
                while let Some(at) = code[search_from..].find(&key) {
                    let at = search_from + at;
                    let before = generated_pos_at(&code, at);
                    let after = GeneratedPos {
                        line: before.line,
                        column: before.column
                            + kestrel_common::source::utf16_len(&replacement),
                    };
                    let key_end = GeneratedPos {
                        line: before.line,
                        column: before.column + kestrel_common::source::utf16_len(&key),
                    };
                    shifts.push(SourceMapShift {
                        before: key_end,
                        after,
                    });
                    code.replace_range(at..at + key.len(), &replacement);
                    search_from = at + replacement.len();
                }
            }

            let path = paths[i].clone();
            let mut map_file = None;
            if let Some(map) = chunk.map {
                let pieces = map.into_pieces(path.clone());
                let finalized = pieces.finalize(&shifts);
                let mode = options.source_map;
                if mode.writes_inline() {
                    code.push_str(&format!(
                        "//# sourceMappingURL={}\n",
                        finalized.to_data_url()
                    ));
                }
                if mode.writes_external_file() {
                    if mode.writes_comment() {
                        code.push_str(&format!("//# sourceMappingURL={path}.map\n"));
                    }
                    map_file = Some(OutputFile {
                        path: format!("{path}.map"),
                        contents: finalized.to_json(),
                    });
                }
            }

            ChunkOutput {
                file: OutputFile {
                    path,
                    contents: code,
                },
                map_file,
            }
        })
        .collect()
}

fn print_one_chunk(
    options: &BundleOptions,
    result: &LinkResult,
    symbols: &SymbolMap,
    name_map: &NameMap,
    chunk: &kestrel_linker::Chunk,
) -> PrintedChunk {
    match &chunk.repr {
        ChunkRepr::Css { files } => {
            let mut out = String::new();
            let empty_classes = FxHashMap::default();
            let empty_urls = FxHashMap::default();
            for &source in files {
                let Some(css) = result.files[source.index()].as_css() else {
                    continue;
                };
                if !options.minify_whitespace {
                    out.push_str(&format!(
                        "/* {} */\n",
                        result.sources[source.index()].pretty_path
                    ));
                }
                let printer = CssPrinter::new(
                    &result.sources[source.index()],
                    css,
                    &empty_classes,
                    &empty_urls,
                    CssPrintOptions {
                        minify_whitespace: options.minify_whitespace,
                    },
                );
                out.push_str(&printer.print());
            }
            PrintedChunk {
                code: out,
                map: None,
            }
        }
        ChunkRepr::Js {
            plans,
            suffix_stmts,
        } => {
            let print_options = PrintOptions {
                minify_whitespace: options.minify_whitespace,
                ascii_only: options.ascii_only,
                source_map: options.source_map.is_enabled(),
            };
            let mut printer = Printer::new(symbols, name_map, print_options);

            // Cross-chunk imports come first so bindings exist
            for import in &chunk.cross_chunk_imports {
                let names: Vec<String> = import
                    .refs
                    .iter()
                    .map(|&r| resolved_name(symbols, name_map, r))
                    .collect();
                printer.print_raw(&format!(
                    "import {{ {} }} from \"{}\";\n",
                    names.join(", "),
                    chunk_unique_key(import.chunk_index as usize)
                ));
            }

            let is_iife = options.format == OutputFormat::Iife;
            if is_iife {
                if options.global_name.is_empty() {
                    printer.print_raw("(() => {\n");
                } else {
                    printer.print_raw(&format!(
                        "var {} = (() => {{\n",
                        options.global_name.join(".")
                    ));
                }
            }

            for plan in plans {
                let source = &result.sources[plan.source.index()];
                if !options.minify_whitespace {
                    printer.print_raw(&format!("\n// {}\n", source.pretty_path));
                }
                printer.set_source(source);
                if let Some(ast) = result.files[plan.source.index()].as_js() {
                    printer.set_import_records(&ast.import_records);
                }
                for stmt in &plan.stmts {
                    printer.print_stmt(stmt);
                }
                printer.print_raw("\n");
            }

            if is_iife {
                if !chunk.entry_exports.is_empty() {
                    let properties: Vec<String> = chunk
                        .entry_exports
                        .iter()
                        .map(|(alias, r)| {
                            format!("{alias}: {}", resolved_name(symbols, name_map, *r))
                        })
                        .collect();
                    printer.print_raw(&format!("return {{ {} }};\n", properties.join(", ")));
                }
                printer.print_raw("})();\n");
            } else {
                for stmt in suffix_stmts {
                    printer.print_stmt(stmt);
                }
                if !chunk.cross_chunk_exports.is_empty() {
                    let names: Vec<String> = chunk
                        .cross_chunk_exports
                        .iter()
                        .map(|&r| resolved_name(symbols, name_map, r))
                        .collect();
                    printer.print_raw(&format!("\nexport {{ {} }};\n", names.join(", ")));
                }
            }

            let printed = printer.finish();
            PrintedChunk {
                code: printed.code,
                map: printed.map,
            }
        }
    }
}

fn resolved_name(symbols: &SymbolMap, names: &NameMap, r: Ref) -> String {
    let terminal = symbols.follow_read(r);
    match names.get(&terminal) {
        Some(name) => name.clone(),
        None => symbols.get(terminal).original_name.clone(),
    }
}

fn fx_hash(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

fn generated_pos_at(text: &str, byte_offset: usize) -> GeneratedPos {
    let prefix = &text[..byte_offset];
    let line = prefix.matches('\n').count() as u32;
    let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
    GeneratedPos {
        line,
        column: kestrel_common::source::utf16_len(&prefix[line_start..]),
    }
}

// =============================================================================
// Metafile
// =============================================================================

fn build_metafile(result: &LinkResult, outputs: &[ChunkOutput]) -> String {
    let mut metafile = Metafile::default();
    for &source in &result.reachable_files {
        let src = &result.sources[source.index()];
        let imports = result.files[source.index()]
            .import_records()
            .iter()
            .map(|record| MetafileInputImport {
                path: record
                    .source_index
                    .map(|t| result.sources[t.index()].pretty_path.clone())
                    .unwrap_or_else(|| record.path.clone()),
                kind: crate::metafile::import_kind_name(record.kind).to_string(),
                external: record.source_index.is_none(),
            })
            .collect();
        metafile.add_input(src.pretty_path.clone(), src.contents.len(), imports);
    }
    for (chunk, output) in result.chunks.iter().zip(outputs.iter()) {
        let mut inputs = std::collections::BTreeMap::new();
        for &source in &chunk.files {
            inputs.insert(
                result.sources[source.index()].pretty_path.clone(),
                MetafileOutputInput {
                    bytes_in_output: result.sources[source.index()].contents.len(),
                },
            );
        }
        metafile.add_output(
            output.file.path.clone(),
            output.file.contents.len(),
            inputs,
            chunk
                .entry_source
                .map(|s| result.sources[s.index()].pretty_path.clone()),
        );
    }
    metafile.to_json()
}
