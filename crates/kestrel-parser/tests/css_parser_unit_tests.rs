use super::*;
use crate::css_ast::CssRule;
use crate::import_record::ImportKind;
use kestrel_common::{Loader, Log, Source, SourceIndex};
use std::sync::Arc;

fn make_source(path: &str, contents: &str) -> Source {
    Source {
        index: SourceIndex(1),
        key_path: path.to_string(),
        pretty_path: path.to_string(),
        namespace: "file".to_string(),
        loader: Loader::Css,
        contents: Arc::from(contents),
    }
}

#[test]
fn test_at_import_becomes_record() {
    let log = Log::new();
    let source = make_source("a.css", "@import \"b.css\";\n.x { color: red }");
    let ast = parse_css(&source, &log);
    assert!(!log.has_errors());
    assert_eq!(ast.import_records.len(), 1);
    assert_eq!(ast.import_records[0].kind, ImportKind::AtImport);
    assert_eq!(ast.import_records[0].path, "b.css");
    assert!(matches!(ast.rules[0], CssRule::AtImport { .. }));
}

#[test]
fn test_url_token_becomes_record() {
    let log = Log::new();
    let source = make_source("a.css", ".x { background: url(img.png) no-repeat }");
    let ast = parse_css(&source, &log);
    assert_eq!(ast.import_records.len(), 1);
    assert_eq!(ast.import_records[0].kind, ImportKind::UrlToken);
    assert_eq!(ast.import_records[0].path, "img.png");
}

#[test]
fn test_composes_from_record() {
    let log = Log::new();
    let source = make_source(
        "a.module.css",
        ".a { composes: b from \"./b.module.css\"; color: red }",
    );
    let ast = parse_css(&source, &log);
    assert_eq!(ast.import_records.len(), 1);
    assert_eq!(ast.import_records[0].kind, ImportKind::ComposesFrom);
    let export = ast.exports.get("a").expect("local class a");
    assert_eq!(export.composes_from.len(), 1);
    assert_eq!(export.composes_from[0].0, "b");
}

#[test]
fn test_local_vs_global_classes() {
    let log = Log::new();
    let local = parse_css(&make_source("m.module.css", ".a {}"), &log);
    assert!(local.has_local_scope);
    assert_eq!(local.exports.len(), 1);
    assert_eq!(local.symbols[0].kind, crate::symbols::SymbolKind::LocalCss);

    let global = parse_css(&make_source("g.css", ".a {}"), &log);
    assert!(!global.has_local_scope);
    assert!(global.exports.is_empty());
    assert_eq!(global.symbols[0].kind, crate::symbols::SymbolKind::GlobalCss);
}

#[test]
fn test_media_block_nests_rules() {
    let log = Log::new();
    let source = make_source("a.css", "@media (min-width: 600px) { .wide { margin: 0 } }");
    let ast = parse_css(&source, &log);
    match &ast.rules[0] {
        CssRule::At { name, block, .. } => {
            assert_eq!(name, "media");
            assert_eq!(block.as_ref().map(Vec::len), Some(1));
        }
        other => panic!("expected at-rule, got {other:?}"),
    }
}

#[test]
fn test_bad_string_drops_declaration_only() {
    let log = Log::new();
    let source = make_source("a.css", ".x { content: \"oops\n; color: red }");
    let ast = parse_css(&source, &log);
    // The rule survives even though a declaration was dropped
    assert!(matches!(ast.rules[0], CssRule::Style { .. }));
}

#[test]
fn test_keyframes_block_is_opaque() {
    let src = "@keyframes spin { from { transform: none } to { transform: rotate(1turn) } }";
    let log = Log::new();
    let ast = parse_css(&make_source("a.css", src), &log);
    match &ast.rules[0] {
        CssRule::At { name, block, .. } => {
            assert_eq!(name, "keyframes");
            assert!(block.is_some());
        }
        other => panic!("expected at-rule, got {other:?}"),
    }
}
