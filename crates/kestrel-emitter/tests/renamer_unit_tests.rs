use super::*;
use kestrel_common::SourceIndex;
use kestrel_parser::scope::{ScopeKind, ScopeTree, StrictMode};
use kestrel_parser::symbols::{Symbol, SymbolMap};

fn symbol(name: &str, kind: SymbolKind) -> Symbol {
    Symbol::new(name, kind)
}

#[test]
fn test_sibling_scopes_share_slots() {
    // Two sibling blocks each declare one local; both get slot 0
    let mut scopes = ScopeTree::new(StrictMode::Sloppy);
    let a = scopes.push(ScopeId::ROOT, ScopeKind::Block);
    let b = scopes.push(ScopeId::ROOT, ScopeKind::Block);
    let mut symbols = vec![
        symbol("first", SymbolKind::Other),
        symbol("second", SymbolKind::Other),
    ];
    scopes
        .get_mut(a)
        .members
        .insert("first".into(), Ref { source: 0, inner: 0 });
    scopes
        .get_mut(b)
        .members
        .insert("second".into(), Ref { source: 0, inner: 1 });

    assign_nested_scope_slots(&scopes, 0, &mut symbols);
    assert_eq!(symbols[0].nested_scope_slot, Some(0));
    assert_eq!(symbols[1].nested_scope_slot, Some(0));
}

#[test]
fn test_nested_scope_gets_next_slot() {
    let mut scopes = ScopeTree::new(StrictMode::Sloppy);
    let outer = scopes.push(ScopeId::ROOT, ScopeKind::Block);
    let inner = scopes.push(outer, ScopeKind::Block);
    let mut symbols = vec![
        symbol("o", SymbolKind::Other),
        symbol("i", SymbolKind::Other),
    ];
    scopes
        .get_mut(outer)
        .members
        .insert("o".into(), Ref { source: 0, inner: 0 });
    scopes
        .get_mut(inner)
        .members
        .insert("i".into(), Ref { source: 0, inner: 1 });

    assign_nested_scope_slots(&scopes, 0, &mut symbols);
    assert_eq!(symbols[0].nested_scope_slot, Some(0));
    assert_eq!(symbols[1].nested_scope_slot, Some(1));
}

#[test]
fn test_label_namespace_is_independent() {
    let mut scopes = ScopeTree::new(StrictMode::Sloppy);
    let block = scopes.push(ScopeId::ROOT, ScopeKind::Block);
    let mut symbols = vec![
        symbol("x", SymbolKind::Other),
        symbol("loop", SymbolKind::Label),
    ];
    scopes
        .get_mut(block)
        .members
        .insert("x".into(), Ref { source: 0, inner: 0 });
    scopes.get_mut(block).generated.push(Ref { source: 0, inner: 1 });

    assign_nested_scope_slots(&scopes, 0, &mut symbols);
    // Both are slot 0, in different namespaces
    assert_eq!(symbols[0].nested_scope_slot, Some(0));
    assert_eq!(symbols[1].nested_scope_slot, Some(0));
}

#[test]
fn test_number_renamer_orders_by_use_count() {
    let mut map = SymbolMap::new(1);
    let mut hot = symbol("hotSymbol", SymbolKind::Hoisted);
    hot.use_count_estimate = 100;
    let mut cold = symbol("coldSymbol", SymbolKind::Hoisted);
    cold.use_count_estimate = 1;
    map.set_file(SourceIndex(0), vec![hot, cold]);

    let minifier = crate::charfreq::CharFreq::new().compile();
    let names = number_renamer(NumberRenamerInput {
        symbols: &map,
        minifier: &minifier,
        top_level: vec![Ref { source: 0, inner: 0 }, Ref { source: 0, inner: 1 }],
        excluded: Default::default(),
    });
    // The hotter symbol takes the shorter/earlier name
    assert_eq!(names[&Ref { source: 0, inner: 0 }], "a");
    assert_eq!(names[&Ref { source: 0, inner: 1 }], "b");
}

#[test]
fn test_number_renamer_skips_excluded_and_reserved() {
    let mut map = SymbolMap::new(1);
    map.set_file(SourceIndex(0), vec![symbol("x", SymbolKind::Hoisted)]);
    let mut freq = crate::charfreq::CharFreq::new();
    // Bias so that the first candidate name would be "do" — a keyword is
    // impossible to hit with one char, so exclude "a" and check "b" next
    freq.add_text("a");
    let minifier = freq.compile();
    let mut excluded = rustc_hash::FxHashSet::default();
    excluded.insert("a".to_string());
    let names = number_renamer(NumberRenamerInput {
        symbols: &map,
        minifier: &minifier,
        top_level: vec![Ref { source: 0, inner: 0 }],
        excluded,
    });
    assert_eq!(names[&Ref { source: 0, inner: 0 }], "b");
}

#[test]
fn test_unbound_symbols_keep_names() {
    let mut map = SymbolMap::new(1);
    map.set_file(SourceIndex(0), vec![symbol("window", SymbolKind::Unbound)]);
    let minifier = crate::charfreq::CharFreq::new().compile();
    let names = number_renamer(NumberRenamerInput {
        symbols: &map,
        minifier: &minifier,
        top_level: vec![Ref { source: 0, inner: 0 }],
        excluded: Default::default(),
    });
    assert!(names.is_empty());
}

#[test]
fn test_collision_renamer_dedupes_across_files() {
    let mut map = SymbolMap::new(2);
    map.set_file(SourceIndex(0), vec![symbol("util", SymbolKind::Hoisted)]);
    map.set_file(SourceIndex(1), vec![symbol("util", SymbolKind::Hoisted)]);
    let names = collision_renamer(&map, &[0, 1], &Default::default());
    // The first keeps its name; the second gets a numbered variant
    assert!(!names.contains_key(&Ref { source: 0, inner: 0 }));
    assert_eq!(names[&Ref { source: 1, inner: 0 }], "util2");
}

#[test]
fn test_jsx_capital_constraint() {
    use kestrel_parser::symbols::SymbolFlags;
    let mut map = SymbolMap::new(1);
    let mut component = symbol("Widget", SymbolKind::Import);
    component.flags |= SymbolFlags::MUST_START_WITH_CAPITAL_LETTER_FOR_JSX;
    map.set_file(SourceIndex(0), vec![component]);
    let minifier = crate::charfreq::CharFreq::new().compile();
    let names = number_renamer(NumberRenamerInput {
        symbols: &map,
        minifier: &minifier,
        top_level: vec![Ref { source: 0, inner: 0 }],
        excluded: Default::default(),
    });
    let name = &names[&Ref { source: 0, inner: 0 }];
    assert!(name.chars().next().unwrap().is_uppercase());
}
