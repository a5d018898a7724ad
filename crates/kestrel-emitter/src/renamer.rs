//! Symbol renaming.
//!
//! Two renamers share the `NameMap` output consumed by the printer:
//!
//! - the number renamer assigns minified names from per-scope slots plus a
//!   frequency-biased alphabet; siblings in different scopes share names
//! - the collision renamer (used when not minifying) keeps original names,
//!   renaming only generated temporaries and cross-file duplicates
//!
//! Both are deterministic given the same inputs: every iteration order is
//! either declaration order or sorted with stable tiebreakers.

use crate::charfreq::{is_reserved_name, NameMinifier};
use kestrel_parser::scope::{ScopeId, ScopeTree};
use kestrel_parser::symbols::{Ref, SlotNamespace, Symbol, SymbolKind, SymbolMap};
use rustc_hash::{FxHashMap, FxHashSet};

/// Terminal ref -> output name. Symbols not present keep their original
/// name.
pub type NameMap = FxHashMap<Ref, String>;

/// Walk one file's scope tree assigning per-namespace slot indices to its
/// symbols. Siblings in different scopes receive the same indices, which
/// is what lets them share minified names.
pub fn assign_nested_scope_slots(
    scopes: &ScopeTree,
    source_index: u32,
    symbols: &mut [Symbol],
) {
    fn visit(
        scopes: &ScopeTree,
        scope: ScopeId,
        counts: [u32; SlotNamespace::COUNT],
        source_index: u32,
        symbols: &mut [Symbol],
    ) {
        let mut counts = counts;
        let s = scopes.get(scope);
        // Deterministic order: by inner symbol index
        let mut members: Vec<Ref> = s.members.values().copied().collect();
        members.extend(s.generated.iter().copied());
        members.sort();
        for r in members {
            if r.source != source_index {
                continue;
            }
            let symbol = &mut symbols[r.inner as usize];
            if symbol.must_not_be_renamed() {
                continue;
            }
            if let Some(ns) = symbol.kind.slot_namespace().index() {
                if symbol.nested_scope_slot.is_none() {
                    symbol.nested_scope_slot = Some(counts[ns]);
                    counts[ns] += 1;
                }
            }
        }
        for &child in &s.children {
            visit(scopes, child, counts, source_index, symbols);
        }
    }
    // Module-scope symbols are renamed chunk-wide, not per file, so slot
    // assignment starts at the module scope's children with fresh counts
    visit(scopes, ScopeId::ROOT, [0; SlotNamespace::COUNT], source_index, symbols);
}

/// Inputs to the minified renamer for one chunk.
pub struct NumberRenamerInput<'a> {
    pub symbols: &'a SymbolMap,
    pub minifier: &'a NameMinifier,
    /// Top-level symbols of every file in the chunk, most used first.
    pub top_level: Vec<Ref>,
    /// Names that must never be produced (globals referenced unbound).
    pub excluded: FxHashSet<String>,
}

/// Assign minified names. Top-level symbols take the shortest names in
/// use-count order; nested symbols map their per-scope slot into the name
/// sequence offset by the top-level count.
pub fn number_renamer(input: NumberRenamerInput<'_>) -> NameMap {
    let NumberRenamerInput {
        symbols,
        minifier,
        top_level,
        excluded,
    } = input;
    let mut names = NameMap::default();

    // The name sequence with reserved words and excluded names filtered
    // out, generated lazily
    let mut sequence: Vec<String> = Vec::new();
    let mut next_raw_slot = 0u32;
    let name_at = |i: usize, sequence: &mut Vec<String>, next_raw_slot: &mut u32| {
        while sequence.len() <= i {
            let candidate = minifier.name_for_slot(*next_raw_slot);
            *next_raw_slot += 1;
            if is_reserved_name(&candidate) || excluded.contains(&candidate) {
                continue;
            }
            sequence.push(candidate);
        }
        sequence[i].clone()
    };

    let mut sorted_top_level = top_level;
    sorted_top_level.sort_by_key(|&r| {
        let symbol = symbols.get(r);
        (std::cmp::Reverse(symbol.use_count_estimate), r)
    });
    sorted_top_level.dedup();

    let mut assigned = 0usize;
    let mut seen: FxHashSet<Ref> = FxHashSet::default();
    for r in sorted_top_level {
        let terminal = symbols.follow_read(r);
        if !seen.insert(terminal) {
            continue;
        }
        let symbol = symbols.get(terminal);
        if symbol.must_not_be_renamed() || symbol.namespace_alias.is_some() {
            continue;
        }
        let name = name_at(assigned, &mut sequence, &mut next_raw_slot);
        let name = constrain_for_jsx(symbol, name);
        names.insert(terminal, name);
        assigned += 1;
    }

    // Nested symbols: slot + top-level count picks the name
    let top_count = assigned;
    for (source, inner_symbols) in symbols.outer.iter().enumerate() {
        for inner in 0..inner_symbols.len() {
            let r = Ref {
                source: source as u32,
                inner: inner as u32,
            };
            let terminal = symbols.follow_read(r);
            if terminal != r || names.contains_key(&terminal) {
                continue;
            }
            let symbol = symbols.get(terminal);
            if symbol.must_not_be_renamed() || symbol.namespace_alias.is_some() {
                continue;
            }
            let Some(slot) = symbol.nested_scope_slot else {
                continue;
            };
            let name = name_at(
                top_count + slot as usize,
                &mut sequence,
                &mut next_raw_slot,
            );
            names.insert(terminal, constrain_for_jsx(symbol, name));
        }
    }

    names
}

fn constrain_for_jsx(symbol: &Symbol, name: String) -> String {
    use kestrel_parser::symbols::SymbolFlags;
    if symbol
        .flags
        .contains(SymbolFlags::MUST_START_WITH_CAPITAL_LETTER_FOR_JSX)
        && !name.chars().next().is_some_and(char::is_uppercase)
    {
        // Force the tag-kind invariant: capitalize the first character
        let mut out = String::with_capacity(name.len());
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
        }
        out.extend(chars);
        out
    } else {
        name
    }
}

/// The non-minifying renamer: keep original names, renaming generated
/// symbols and duplicates so the output never shadows accidentally.
pub fn collision_renamer(
    symbols: &SymbolMap,
    reachable_sources: &[u32],
    excluded: &FxHashSet<String>,
) -> NameMap {
    let mut names = NameMap::default();
    let mut taken: FxHashSet<String> = excluded.clone();

    for &source in reachable_sources {
        let inner_symbols = &symbols.outer[source as usize];
        for inner in 0..inner_symbols.len() {
            let r = Ref {
                source,
                inner: inner as u32,
            };
            let terminal = symbols.follow_read(r);
            if terminal != r || names.contains_key(&terminal) {
                continue;
            }
            let symbol = symbols.get(terminal);
            if symbol.must_not_be_renamed() || symbol.namespace_alias.is_some() {
                continue;
            }
            // Only top-level and generated symbols participate: nested
            // user symbols cannot collide across files
            let is_top_level = symbol.chunk_index.is_some()
                || symbol.kind == SymbolKind::Injected
                || symbol.nested_scope_slot.is_none();
            if !is_top_level {
                continue;
            }
            let base = if symbol.original_name.is_empty() {
                "_".to_string()
            } else {
                symbol.original_name.clone()
            };
            let mut candidate = base.clone();
            let mut counter = 1u32;
            while taken.contains(&candidate) || is_reserved_name(&candidate) {
                counter += 1;
                candidate = format!("{base}{counter}");
            }
            taken.insert(candidate.clone());
            if candidate != symbol.original_name {
                names.insert(terminal, candidate);
            }
        }
    }
    names
}

#[cfg(test)]
#[path = "../tests/renamer_unit_tests.rs"]
mod tests;
