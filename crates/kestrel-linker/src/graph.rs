//! The module graph: reachability, entry bitsets and deterministic
//! ordering.

use fixedbitset::FixedBitSet;
use indexmap::IndexMap;
use kestrel_common::{EntryPointKind, SourceIndex};
use kestrel_parser::ast::Ast;
use kestrel_parser::css_ast::CssAst;
use kestrel_parser::import_record::ImportRecord;
use kestrel_parser::symbols::Ref;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Clone, Copy, Debug)]
pub struct EntryPoint {
    pub source: SourceIndex,
    pub kind: EntryPointKind,
}

/// The parsed representation of one source.
#[derive(Debug, Default)]
pub enum FileKind {
    Js(Box<Ast>),
    Css(Box<CssAst>),
    /// A file with no module representation (copy loader, empty loader).
    #[default]
    Empty,
}

impl FileKind {
    #[must_use]
    pub fn import_records(&self) -> &[ImportRecord] {
        match self {
            FileKind::Js(ast) => &ast.import_records,
            FileKind::Css(ast) => &ast.import_records,
            FileKind::Empty => &[],
        }
    }

    #[must_use]
    pub fn as_js(&self) -> Option<&Ast> {
        match self {
            FileKind::Js(ast) => Some(ast),
            _ => None,
        }
    }

    pub fn as_js_mut(&mut self) -> Option<&mut Ast> {
        match self {
            FileKind::Js(ast) => Some(ast),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_css(&self) -> Option<&CssAst> {
        match self {
            FileKind::Css(ast) => Some(ast),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_css(&self) -> bool {
        matches!(self, FileKind::Css(_))
    }
}

/// How a module's evaluation is deferred in the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapKind {
    #[default]
    None,
    /// `var require_foo = __commonJS((exports, module) => { ... })`
    Cjs,
    /// `var init_foo = __esm(() => { ... })`
    Esm,
}

/// One resolved export: the alias maps to a symbol in some file.
#[derive(Clone, Debug)]
pub struct ExportData {
    pub ref_: Ref,
    pub source: SourceIndex,
    /// Distinct refs arriving via different `export *` paths; ambiguity is
    /// decided after `follow` at import-binding time.
    pub potentially_ambiguous_export_star_refs: Vec<(SourceIndex, Ref)>,
}

/// Where a named import ended up after binding.
#[derive(Clone, Debug)]
pub enum ImportData {
    /// Bound to an export; symbols were merged.
    Resolved { source: SourceIndex, ref_: Ref },
    /// Property access on a CommonJS module's namespace.
    NamespaceProperty {
        namespace_ref: Ref,
        alias: String,
    },
    /// Compiled-away TypeScript type.
    ProbablyTypeScriptType,
    /// The import target is outside the bundle.
    External,
}

/// Linker-side per-file state, built fresh for every link operation so
/// concurrent links over shared parse results cannot interfere.
#[derive(Debug, Default)]
pub struct LinkerFile {
    pub is_reachable: bool,
    pub distance_from_entry: u32,
    pub entry_bits: FixedBitSet,
    pub entry_kind: Option<EntryPointKind>,
    pub wrap: WrapKind,
    pub is_async_or_has_async_dependency: bool,
    pub did_wrap_dependencies: bool,
    pub chunk_index: Option<u32>,

    // JS linking metadata
    pub resolved_exports: IndexMap<String, ExportData>,
    pub sorted_and_filtered_export_aliases: Vec<String>,
    pub imports_to_bind: FxHashMap<Ref, ImportData>,
    pub is_probably_typescript_type: FxHashSet<Ref>,
    pub export_star_resolved: bool,
    pub needs_exports_variable: bool,
    pub force_include_exports_for_entry_point: bool,
    /// The synthesized `<stem>_exports` namespace object symbol.
    pub exports_object_ref: Option<Ref>,
    /// The part that builds the namespace object, if materialised.
    pub namespace_part_index: Option<u32>,
    /// The part holding the wrapper closure, when wrapped.
    pub wrapper_part_index: Option<u32>,
}

/// Reachability output: BFS order, distances and stable indices.
pub struct Reachability {
    /// Reachable sources in BFS rank order (the deterministic total order
    /// used as the final tiebreaker for every later sort).
    pub reachable_files: Vec<SourceIndex>,
    pub distance_from_entry: Vec<u32>,
    /// `stable_source_indices[source] = bfs_rank`, `u32::MAX` if
    /// unreachable.
    pub stable_source_indices: Vec<u32>,
}

/// Breadth-first reachability from the runtime and the entry points.
#[must_use]
pub fn compute_reachability(files: &[FileKind], entries: &[EntryPoint]) -> Reachability {
    let n = files.len();
    let mut distance = vec![u32::MAX; n];
    let mut stable = vec![u32::MAX; n];
    let mut order = Vec::new();
    let mut queue = std::collections::VecDeque::new();

    // The runtime is always first so helper symbols get rank 0
    if n > 0 {
        queue.push_back((SourceIndex::RUNTIME, 0u32));
    }
    for entry in entries {
        queue.push_back((entry.source, 0));
    }

    while let Some((source, dist)) = queue.pop_front() {
        let i = source.index();
        if i >= n || distance[i] != u32::MAX {
            continue;
        }
        distance[i] = dist;
        stable[i] = order.len() as u32;
        order.push(source);
        for record in files[i].import_records() {
            if let Some(target) = record.source_index {
                queue.push_back((target, dist + 1));
            }
        }
    }

    Reachability {
        reachable_files: order,
        distance_from_entry: distance,
        stable_source_indices: stable,
    }
}

/// Mark, for every file, which entry points reach it. Two files belong to
/// the same chunk iff their bitsets are equal.
#[must_use]
pub fn compute_entry_bits(
    files: &[FileKind],
    entries: &[EntryPoint],
) -> Vec<FixedBitSet> {
    let n = files.len();
    let mut bits: Vec<FixedBitSet> = (0..n).map(|_| FixedBitSet::with_capacity(entries.len())).collect();

    for (entry_index, entry) in entries.iter().enumerate() {
        // DFS per entry; cycles are fine because visited is per entry
        let mut visited = FxHashSet::default();
        let mut stack = vec![entry.source];
        while let Some(source) = stack.pop() {
            let i = source.index();
            if i >= n || !visited.insert(source) {
                continue;
            }
            bits[i].insert(entry_index);
            for record in files[i].import_records() {
                if let Some(target) = record.source_index {
                    // Dynamic imports start their own entry; their targets
                    // do not inherit this entry's bit
                    if record.kind == kestrel_parser::ImportKind::Dynamic {
                        continue;
                    }
                    stack.push(target);
                }
            }
        }
    }
    bits
}

/// Map of source -> files that import it, used by wrap propagation.
#[must_use]
pub fn compute_importers(files: &[FileKind]) -> FxHashMap<SourceIndex, Vec<SourceIndex>> {
    let mut importers: FxHashMap<SourceIndex, Vec<SourceIndex>> = FxHashMap::default();
    for (i, file) in files.iter().enumerate() {
        for record in file.import_records() {
            if let Some(target) = record.source_index {
                importers
                    .entry(target)
                    .or_default()
                    .push(SourceIndex(i as u32));
            }
        }
    }
    importers
}
