//! Integration tests for the cross-file symbol table.

use kestrel_common::SourceIndex;
use kestrel_parser::{Ref, Symbol, SymbolFlags, SymbolKind, SymbolMap};

#[test]
fn test_two_level_table_assembly() {
    // Two "files" produce inner arrays independently; the outer array is
    // assembled afterwards, as the scan barrier does
    let file_a = vec![Symbol::new("x", SymbolKind::Hoisted)];
    let file_b = vec![
        Symbol::new("x", SymbolKind::Import),
        Symbol::new("y", SymbolKind::Const),
    ];
    let mut map = SymbolMap::new(2);
    map.set_file(SourceIndex(0), file_a);
    map.set_file(SourceIndex(1), file_b);

    assert_eq!(map.get(Ref { source: 0, inner: 0 }).original_name, "x");
    assert_eq!(map.get(Ref { source: 1, inner: 1 }).original_name, "y");
}

#[test]
fn test_cross_file_merge() {
    // An import in file 1 merges into the export in file 0
    let mut map = SymbolMap::new(2);
    map.set_file(SourceIndex(0), vec![Symbol::new("value", SymbolKind::Hoisted)]);
    map.set_file(SourceIndex(1), vec![Symbol::new("value", SymbolKind::Import)]);

    let export_ref = Ref { source: 0, inner: 0 };
    let import_ref = Ref { source: 1, inner: 0 };
    map.get_mut(import_ref).use_count_estimate = 5;
    map.get_mut(export_ref).use_count_estimate = 1;

    let merged = map.merge(import_ref, export_ref);
    assert_eq!(merged, export_ref);
    assert_eq!(map.follow(import_ref), export_ref);
    assert_eq!(map.get(export_ref).use_count_estimate, 6);
}

#[test]
fn test_follow_all_flattens_chains_across_files() {
    let mut map = SymbolMap::new(3);
    for i in 0..3 {
        map.set_file(SourceIndex(i), vec![Symbol::new("s", SymbolKind::Hoisted)]);
    }
    let a = Ref { source: 0, inner: 0 };
    let b = Ref { source: 1, inner: 0 };
    let c = Ref { source: 2, inner: 0 };
    map.get_mut(a).link = b;
    map.get_mut(b).link = c;
    map.follow_all();
    // Every chain is one hop after follow_all, so read-only follows are
    // safe in parallel
    assert_eq!(map.get(a).link, c);
    assert_eq!(map.follow_read(a), c);
    assert_eq!(map.follow_read(b), c);
    assert_eq!(map.follow_read(c), c);
}

#[test]
fn test_unbound_symbols_are_never_renamed() {
    let unbound = Symbol::new("window", SymbolKind::Unbound);
    assert!(unbound.must_not_be_renamed());
    let mut hoisted = Symbol::new("x", SymbolKind::Hoisted);
    assert!(!hoisted.must_not_be_renamed());
    hoisted.flags.insert(SymbolFlags::MUST_NOT_BE_RENAMED);
    assert!(hoisted.must_not_be_renamed());
}
