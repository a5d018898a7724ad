use super::*;

fn map_with(symbols: Vec<Symbol>) -> SymbolMap {
    let mut map = SymbolMap::new(1);
    map.outer[0] = symbols;
    map
}

fn r(inner: u32) -> Ref {
    Ref { source: 0, inner }
}

#[test]
fn test_follow_is_identity_without_link() {
    let mut map = map_with(vec![Symbol::new("a", SymbolKind::Hoisted)]);
    assert_eq!(map.follow(r(0)), r(0));
}

#[test]
fn test_follow_is_idempotent() {
    let mut map = map_with(vec![
        Symbol::new("a", SymbolKind::Hoisted),
        Symbol::new("b", SymbolKind::Hoisted),
        Symbol::new("c", SymbolKind::Hoisted),
    ]);
    map.get_mut(r(0)).link = r(1);
    map.get_mut(r(1)).link = r(2);
    let t = map.follow(r(0));
    assert_eq!(t, r(2));
    assert_eq!(map.follow(t), t);
    // Path compression: the chain is now one hop
    assert_eq!(map.get(r(0)).link, r(2));
}

#[test]
fn test_merge_confluence() {
    // follow(merge(a, b)) == follow(a) == follow(b)
    let mut map = map_with(vec![
        Symbol::new("a", SymbolKind::Hoisted),
        Symbol::new("b", SymbolKind::Hoisted),
    ]);
    map.get_mut(r(0)).use_count_estimate = 3;
    map.get_mut(r(1)).use_count_estimate = 4;
    let merged = map.merge(r(0), r(1));
    assert_eq!(map.follow(r(0)), merged);
    assert_eq!(map.follow(r(1)), merged);
    assert_eq!(map.get(merged).use_count_estimate, 7);
}

#[test]
fn test_merge_propagates_rename_constraints() {
    let mut map = map_with(vec![
        Symbol::new("Component", SymbolKind::Import),
        Symbol::new("Component", SymbolKind::Class),
    ]);
    map.get_mut(r(0)).flags |= SymbolFlags::MUST_START_WITH_CAPITAL_LETTER_FOR_JSX;
    let merged = map.merge(r(0), r(1));
    assert!(map
        .get(merged)
        .flags
        .contains(SymbolFlags::MUST_START_WITH_CAPITAL_LETTER_FOR_JSX));
}

#[test]
fn test_merge_same_terminal_is_noop() {
    let mut map = map_with(vec![
        Symbol::new("a", SymbolKind::Hoisted),
        Symbol::new("b", SymbolKind::Hoisted),
    ]);
    map.merge(r(0), r(1));
    let before = map.get(r(1)).use_count_estimate;
    map.merge(r(0), r(1));
    assert_eq!(map.get(r(1)).use_count_estimate, before);
}

#[test]
fn test_follow_all_then_follow_read() {
    let mut map = map_with(vec![
        Symbol::new("a", SymbolKind::Hoisted),
        Symbol::new("b", SymbolKind::Hoisted),
        Symbol::new("c", SymbolKind::Hoisted),
    ]);
    map.get_mut(r(0)).link = r(1);
    map.get_mut(r(1)).link = r(2);
    map.follow_all();
    assert_eq!(map.follow_read(r(0)), r(2));
    assert_eq!(map.get(r(0)).link, r(2));
}

#[test]
fn test_invalid_ref_sentinel() {
    assert!(!Ref::INVALID.is_valid());
    assert!(r(0).is_valid());
}

#[test]
fn test_slot_namespaces() {
    assert_eq!(
        SymbolKind::Label.slot_namespace(),
        SlotNamespace::Label
    );
    assert_eq!(
        SymbolKind::PrivateField.slot_namespace(),
        SlotNamespace::PrivateName
    );
    assert_eq!(
        SymbolKind::Hoisted.slot_namespace(),
        SlotNamespace::Default
    );
    assert_eq!(SymbolKind::Unbound.slot_namespace(), SlotNamespace::None);
}
