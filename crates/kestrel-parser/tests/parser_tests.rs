//! End-to-end parser tests: source text in, bound AST out.

use kestrel_common::{Loader, Log, Source, SourceIndex};
use kestrel_parser::ast::{EData, ExportsKind, SData};
use kestrel_parser::binder::bind;
use kestrel_parser::js_parser::{parse, ParserOptions};
use kestrel_parser::{ImportKind, ImportRecordFlags};
use std::sync::Arc;

fn source_with(path: &str, loader: Loader, contents: &str) -> Source {
    Source {
        index: SourceIndex(1),
        key_path: path.to_string(),
        pretty_path: path.to_string(),
        namespace: "file".to_string(),
        loader,
        contents: Arc::from(contents),
    }
}

fn parse_js(contents: &str) -> (kestrel_parser::Ast, Log) {
    parse_with(contents, Loader::Js, ParserOptions::default())
}

fn parse_with(
    contents: &str,
    loader: Loader,
    mut options: ParserOptions,
) -> (kestrel_parser::Ast, Log) {
    options.loader = loader;
    let log = Log::new();
    let source = source_with("input.js", loader, contents);
    let mut ast = parse(&source, &options, &log);
    bind(&mut ast, &options, &log, source.index.0);
    (ast, log)
}

#[test]
fn test_esm_import_export() {
    let (ast, log) = parse_js("import { a, b as c } from './dep';\nexport const x = a + c;");
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert_eq!(ast.exports_kind, ExportsKind::Esm);
    assert_eq!(ast.import_records.len(), 1);
    assert_eq!(ast.import_records[0].kind, ImportKind::Stmt);
    assert_eq!(ast.named_imports.len(), 2);
    assert!(ast.named_exports.contains_key("x"));
}

#[test]
fn test_commonjs_detection() {
    let (ast, log) = parse_js("exports.foo = 1; module.exports.bar = 2;");
    assert!(!log.has_errors());
    assert_eq!(ast.exports_kind, ExportsKind::CommonJs);
    assert!(ast.uses_exports_ref);
    assert!(ast.uses_module_ref);
}

#[test]
fn test_require_becomes_record() {
    let (ast, log) = parse_js("const dep = require('./dep');");
    assert!(!log.has_errors());
    assert_eq!(ast.import_records.len(), 1);
    assert_eq!(ast.import_records[0].kind, ImportKind::Require);
    assert_eq!(ast.import_records[0].path, "./dep");
}

#[test]
fn test_dynamic_import_record() {
    let (ast, log) = parse_js("const p = import('./lazy');");
    assert!(!log.has_errors());
    assert_eq!(ast.import_records.len(), 1);
    assert_eq!(ast.import_records[0].kind, ImportKind::Dynamic);
}

#[test]
fn test_type_only_import_is_unused() {
    let (ast, log) = parse_with(
        "import type { T } from './types';\nexport const x: T = 1;",
        Loader::Ts,
        ParserOptions::default(),
    );
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert_eq!(ast.import_records.len(), 1);
    assert!(ast.import_records[0]
        .flags
        .contains(ImportRecordFlags::IS_UNUSED));
}

#[test]
fn test_typescript_erasure() {
    let (ast, log) = parse_with(
        "interface I { a: number }\ntype A = string | number;\nexport function f(x: A): A { return x as A; }",
        Loader::Ts,
        ParserOptions::default(),
    );
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert!(ast.named_exports.contains_key("f"));
    // The interface and type alias become erased statements
    let erased = ast
        .parts
        .iter()
        .flat_map(|p| p.stmts.iter())
        .filter(|s| matches!(s.data, SData::TsErased))
        .count();
    assert_eq!(erased, 2);
}

#[test]
fn test_generic_call_vs_less_than() {
    // Both must parse without error in TypeScript
    let (_, log) = parse_with("f<number>(1);", Loader::Ts, ParserOptions::default());
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    let (_, log) = parse_with("const r = a < b;", Loader::Ts, ParserOptions::default());
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
}

#[test]
fn test_mts_rejects_angle_cast() {
    let (_, log) = parse_with(
        "const x = <number>y;",
        Loader::TsNoAmbiguousLessThan,
        ParserOptions::default(),
    );
    assert!(log.has_errors());
}

#[test]
fn test_jsx_lowering() {
    let (ast, log) = parse_with(
        "export const el = <div className=\"x\"><Widget value={1} /></div>;",
        Loader::Jsx,
        ParserOptions::default(),
    );
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    // Uppercase tags register the capital-letter constraint
    assert!(ast.jsx_component_names.contains(&"Widget".to_string()));
}

#[test]
fn test_export_star() {
    let (ast, log) = parse_js("export * from './other';");
    assert!(!log.has_errors());
    assert_eq!(ast.export_star_import_records.len(), 1);
}

#[test]
fn test_export_star_as_alias() {
    let (ast, log) = parse_js("export * as ns from './other';");
    assert!(!log.has_errors());
    assert!(ast.named_exports.contains_key("ns"));
    assert!(ast.export_star_import_records.is_empty());
}

#[test]
fn test_top_level_await_recorded() {
    let (ast, log) = parse_js("const data = await fetch('/x');");
    assert!(!log.has_errors());
    assert!(ast.top_level_await_span.is_some());
}

#[test]
fn test_await_in_sync_function_is_error() {
    let (_, log) = parse_js("function f() { return await 1; }");
    assert!(log.has_errors());
}

#[test]
fn test_duplicate_let_is_error() {
    let (_, log) = parse_js("let x = 1; let x = 2;");
    assert!(log.has_errors());
}

#[test]
fn test_var_var_merges() {
    let (_, log) = parse_js("var x = 1; var x = 2;");
    assert!(!log.has_errors());
}

#[test]
fn test_catch_var_special_case() {
    let (_, log) = parse_js("try {} catch (e) { var e; }");
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
}

#[test]
fn test_strict_mode_with_statement() {
    let (_, log) = parse_js("'use strict';\nwith (a) {}");
    assert!(log.has_errors());
    let (_, log) = parse_js("with (a) { b; }");
    assert!(!log.has_errors());
}

#[test]
fn test_esm_is_implicitly_strict() {
    // `delete x` on a bare name is a strict-mode error, and ESM is strict
    let (_, log) = parse_js("import './x';\nfunction f(){ delete f; }");
    assert!(log.has_errors());
}

#[test]
fn test_legacy_octal_in_strict_mode() {
    let (_, log) = parse_js("'use strict';\nvar x = 012;");
    assert!(log.has_errors());
    let (_, log) = parse_js("var x = 012;");
    assert!(!log.has_errors());
}

#[test]
fn test_parse_error_produces_stub() {
    let (ast, log) = parse_js("export const = ;");
    assert!(log.has_errors());
    assert!(ast.named_exports.is_empty());
    assert_eq!(ast.parts.len(), 0);
}

#[test]
fn test_parts_partitioning() {
    let (ast, _) = parse_js(
        "const pure = 1;\nfunction helper() {}\nconsole.log('side effect');\nexport const used = pure;",
    );
    assert_eq!(ast.parts.len(), 4);
    assert!(ast.parts[0].can_be_removed_if_unused);
    assert!(ast.parts[1].can_be_removed_if_unused);
    assert!(!ast.parts[2].can_be_removed_if_unused);
}

#[test]
fn test_part_symbol_uses_and_declarations() {
    let (ast, _) = parse_js("const a = 1;\nconst b = a + 1;");
    // Part 1 declares `b` and uses `a`
    let part = &ast.parts[1];
    assert_eq!(part.declared_symbols.len(), 1);
    let a_ref = ast.parts[0].declared_symbols[0];
    assert!(part.symbol_uses.contains_key(&a_ref));
    assert_eq!(ast.top_level_symbol_to_parts.get(&a_ref), Some(&vec![0]));
}

#[test]
fn test_define_substitution() {
    use kestrel_parser::js_parser::{DefineExpr, DefineValue};
    let mut options = ParserOptions::default();
    options.defines.insert(
        "process.env.NODE_ENV".to_string(),
        DefineValue {
            value: DefineExpr::String("production".to_string()),
            method_calls_must_be_replaced_with_undefined: false,
        },
    );
    let (ast, log) = parse_with(
        "const mode = process.env.NODE_ENV;",
        Loader::Js,
        options,
    );
    assert!(!log.has_errors());
    let stmt = &ast.parts[0].stmts[0];
    if let SData::Local(local) = &stmt.data {
        match &local.decls[0].value.as_ref().unwrap().data {
            EData::String(s) => assert_eq!(s, "production"),
            other => panic!("define was not substituted: {other:?}"),
        }
    } else {
        panic!("expected local declaration");
    }
}

#[test]
fn test_drop_call_define() {
    use kestrel_parser::js_parser::{DefineExpr, DefineValue};
    let mut options = ParserOptions::default();
    options.defines.insert(
        "console.log".to_string(),
        DefineValue {
            value: DefineExpr::Undefined,
            method_calls_must_be_replaced_with_undefined: true,
        },
    );
    let (ast, log) = parse_with("console.log(sideEffect());", Loader::Js, options);
    assert!(!log.has_errors());
    let stmt = &ast.parts[0].stmts[0];
    if let SData::Expr(e) = &stmt.data {
        assert!(matches!(e.data, EData::Undefined));
    } else {
        panic!("expected expression statement");
    }
}

#[test]
fn test_optional_chain_shapes() {
    let (ast, log) = parse_js("const v = a?.b.c?.();");
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert_eq!(ast.parts.len(), 1);
}

#[test]
fn test_class_with_private_members() {
    let (ast, log) = parse_js(
        "class C { #x = 1; static #s = 2; #m() { return this.#x; } has(o) { return #x in o; } }",
    );
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert_eq!(ast.parts.len(), 1);
}

#[test]
fn test_using_declarations() {
    let (ast, log) = parse_js("using r = open();\nawait using s = openAsync();");
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    // `await using` at top level is a top-level await
    assert!(ast.top_level_await_span.is_some());
}

#[test]
fn test_enum_parses_in_ts() {
    let (ast, log) = parse_with(
        "export enum Color { Red, Green = 5, Blue }",
        Loader::Ts,
        ParserOptions::default(),
    );
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert!(ast.named_exports.contains_key("Color"));
}

#[test]
fn test_labels_resolve() {
    let (_, log) = parse_js("outer: for (;;) { for (;;) { continue outer; } break outer; }");
    assert!(!log.has_errors());
    let (_, log) = parse_js("for (;;) { break missing; }");
    assert!(log.has_errors());
}

#[test]
fn test_guarded_require_handles_import_errors() {
    let (ast, log) = parse_js("let dep;\ntry { dep = require('./optional'); } catch (e) {}\nuse(dep);");
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert!(ast.import_records[0]
        .flags
        .contains(ImportRecordFlags::HANDLES_IMPORT_ERRORS));
    let (ast, _) = parse_js("const dep = require('./required');");
    assert!(!ast.import_records[0]
        .flags
        .contains(ImportRecordFlags::HANDLES_IMPORT_ERRORS));
}

#[test]
fn test_import_attributes() {
    let (ast, log) = parse_js("import data from './data.json' with { type: 'json' };");
    assert!(!log.has_errors(), "{:?}", log.take_msgs());
    assert!(ast.import_records[0]
        .flags
        .contains(ImportRecordFlags::ASSERT_TYPE_JSON));
    assert_eq!(ast.import_records[0].attributes.len(), 1);
}
