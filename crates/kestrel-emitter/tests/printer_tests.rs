//! Printer tests: AST shape to exact text.

use kestrel_common::{Loader, Log, Source, SourceIndex};
use kestrel_emitter::printer::js::{print_js, quote_string, PrintOptions};
use kestrel_emitter::renamer::NameMap;
use kestrel_parser::ast::Stmt;
use kestrel_parser::binder::bind;
use kestrel_parser::js_parser::{parse, ParserOptions};
use kestrel_parser::symbols::SymbolMap;
use std::sync::Arc;

fn roundtrip_with(src: &str, options: PrintOptions) -> String {
    let log = Log::new();
    let source = Source {
        index: SourceIndex(0),
        key_path: "input.js".to_string(),
        pretty_path: "input.js".to_string(),
        namespace: "file".to_string(),
        loader: Loader::Js,
        contents: Arc::from(src),
    };
    let parser_options = ParserOptions::default();
    let mut ast = parse(&source, &parser_options, &log);
    bind(&mut ast, &parser_options, &log, 0);
    assert!(!log.has_errors(), "parse errors: {:?}", log.take_msgs());

    let mut symbols = SymbolMap::new(1);
    symbols.set_file(SourceIndex(0), std::mem::take(&mut ast.symbols));
    let stmts: Vec<Stmt> = ast
        .parts
        .iter()
        .flat_map(|p| p.stmts.iter().cloned())
        .collect();
    print_js(&stmts, &symbols, &NameMap::default(), Some(&source), options).code
}

fn roundtrip(src: &str) -> String {
    roundtrip_with(src, PrintOptions::default())
}

fn minified(src: &str) -> String {
    roundtrip_with(
        src,
        PrintOptions {
            minify_whitespace: true,
            ..PrintOptions::default()
        },
    )
}

#[test]
fn test_simple_statements() {
    let out = roundtrip("let x = 1;\nconst y = x + 2;");
    assert_eq!(out, "let x = 1;\nconst y = x + 2;\n");
}

#[test]
fn test_minified_whitespace() {
    let out = minified("let x = 1;\nif (x) { f(x); }");
    assert_eq!(out, "let x=1;if(x){f(x);}\n");
}

#[test]
fn test_precedence_parens() {
    assert!(roundtrip("let v = (a + b) * c;").contains("(a + b) * c"));
    assert!(roundtrip("let v = a + b * c;").contains("a + b * c"));
    assert!(roundtrip("let v = -(a ** b);").contains("-(a ** b)"));
    assert!(roundtrip("let v = (a, b);").contains("a, b"));
}

#[test]
fn test_nested_conditional() {
    let out = roundtrip("let v = a ? b : c ? d : e;");
    assert!(out.contains("a ? b : c ? d : e"), "{out}");
}

#[test]
fn test_object_literal_stmt_parens() {
    // An object at statement start must parenthesize
    let out = roundtrip("({ a: 1 });");
    assert!(out.contains("({"), "{out}");
}

#[test]
fn test_string_quoting() {
    assert_eq!(quote_string("plain", false), "\"plain\"");
    assert_eq!(quote_string("say \"hi\"", false), "'say \"hi\"'");
    assert_eq!(quote_string("a\nb", false), "\"a\\nb\"");
    assert_eq!(quote_string("tab\t", false), "\"tab\\t\"");
}

#[test]
fn test_ascii_only_escaping() {
    assert_eq!(quote_string("é", true), "\"\\u00e9\"");
    // Astral codepoints emit surrogate pairs
    assert_eq!(quote_string("\u{1F600}", true), "\"\\ud83d\\ude00\"");
    assert_eq!(quote_string("é", false), "\"é\"");
}

#[test]
fn test_template_printing() {
    let out = roundtrip("let s = `a${x}b`;");
    assert!(out.contains("`a${x}b`"), "{out}");
    let out = roundtrip("let s = `tick \\` dollar \\${`;");
    assert!(out.contains("\\`"), "{out}");
    assert!(out.contains("\\$"), "{out}");
}

#[test]
fn test_regex_passthrough() {
    let out = roundtrip("let re = /ab[c/]+/gi;");
    assert!(out.contains("/ab[c/]+/gi"), "{out}");
}

#[test]
fn test_arrow_functions() {
    let out = roundtrip("let f = (a, b) => a + b;");
    assert!(out.contains("(a, b) => a + b"), "{out}");
    // Arrow returning an object wraps it in parens
    let out = roundtrip("let f = () => ({ a: 1 });");
    assert!(out.contains("=> ({"), "{out}");
}

#[test]
fn test_class_printing() {
    let out = roundtrip(
        "class Point extends Base { static count = 0; #x = 1; get x() { return this.#x; } }",
    );
    assert!(out.contains("class Point extends Base"), "{out}");
    assert!(out.contains("static count = 0;"), "{out}");
    assert!(out.contains("#x = 1;"), "{out}");
    assert!(out.contains("get x()"), "{out}");
}

#[test]
fn test_for_variants() {
    assert!(roundtrip("for (let i = 0; i < n; i++) f(i);").contains("for (let i = 0; i < n; i++)"));
    assert!(roundtrip("for (const k in o) f(k);").contains("for (const k in o)"));
    assert!(roundtrip("for (const v of xs) f(v);").contains("for (const v of xs)"));
}

#[test]
fn test_switch_printing() {
    let out = roundtrip("switch (x) { case 1: f(); break; default: g(); }");
    assert!(out.contains("switch (x)"), "{out}");
    assert!(out.contains("case 1:"), "{out}");
    assert!(out.contains("default:"), "{out}");
}

#[test]
fn test_try_catch_finally() {
    let out = roundtrip("try { f(); } catch (e) { g(e); } finally { h(); }");
    assert!(out.contains("try {"), "{out}");
    assert!(out.contains("catch (e)"), "{out}");
    assert!(out.contains("finally {"), "{out}");
}

#[test]
fn test_new_expressions() {
    assert!(roundtrip("let a = new Foo(1);").contains("new Foo(1)"));
    // A call in the callee needs parens
    assert!(roundtrip("let a = new (factory())();").contains("new (factory())()"));
}

#[test]
fn test_renaming_applies_everywhere() {
    let log = Log::new();
    let source = Source {
        index: SourceIndex(0),
        key_path: "input.js".to_string(),
        pretty_path: "input.js".to_string(),
        namespace: "file".to_string(),
        loader: Loader::Js,
        contents: Arc::from("const value = 1; use(value, value);"),
    };
    let parser_options = ParserOptions::default();
    let mut ast = parse(&source, &parser_options, &log);
    bind(&mut ast, &parser_options, &log, 0);
    let value_ref = ast.parts[0].declared_symbols[0];
    let mut symbols = SymbolMap::new(1);
    symbols.set_file(SourceIndex(0), std::mem::take(&mut ast.symbols));
    let mut names = NameMap::default();
    names.insert(value_ref, "v".to_string());
    let stmts: Vec<Stmt> = ast
        .parts
        .iter()
        .flat_map(|p| p.stmts.iter().cloned())
        .collect();
    let out = print_js(&stmts, &symbols, &names, None, PrintOptions::default()).code;
    assert!(out.contains("const v = 1"), "{out}");
    assert!(out.contains("use(v, v)"), "{out}");
    assert!(!out.contains("value"), "{out}");
}

#[test]
fn test_source_map_emission() {
    let out = roundtrip_with(
        "let x = 1;\nlet y = 2;",
        PrintOptions {
            source_map: true,
            ..PrintOptions::default()
        },
    );
    // Printing still works with the map enabled
    assert!(out.contains("let x = 1;"), "{out}");
}

#[test]
fn test_source_map_lines_track_output() {
    let log = Log::new();
    let source = Source {
        index: SourceIndex(0),
        key_path: "in.js".to_string(),
        pretty_path: "in.js".to_string(),
        namespace: "file".to_string(),
        loader: Loader::Js,
        contents: Arc::from("let x = 1;\nlet y = 2;"),
    };
    let parser_options = ParserOptions::default();
    let mut ast = parse(&source, &parser_options, &log);
    bind(&mut ast, &parser_options, &log, 0);
    let mut symbols = SymbolMap::new(1);
    symbols.set_file(SourceIndex(0), std::mem::take(&mut ast.symbols));
    let stmts: Vec<Stmt> = ast
        .parts
        .iter()
        .flat_map(|p| p.stmts.iter().cloned())
        .collect();
    let result = print_js(
        &stmts,
        &symbols,
        &NameMap::default(),
        Some(&source),
        PrintOptions {
            source_map: true,
            ..PrintOptions::default()
        },
    );
    let map = result.map.expect("map was requested");
    let pieces = map.into_pieces("out.js");
    // Two output lines produce one ';' separator in the mappings
    assert_eq!(pieces.mappings.matches(';').count(), 2);
    assert_eq!(pieces.sources, vec!["in.js"]);
}

#[test]
fn test_undefined_prints_as_void_zero() {
    let out = roundtrip("let u = undefined;");
    // `undefined` the identifier is unbound; it prints as itself
    assert!(out.contains("undefined"), "{out}");
}

#[test]
fn test_yield_and_await() {
    let out = roundtrip("async function f() { await g(); }");
    assert!(out.contains("await g()"), "{out}");
    let out = roundtrip("function* f() { yield* g(); }");
    assert!(out.contains("yield* g()"), "{out}");
}

#[test]
fn test_labels_and_breaks() {
    let out = roundtrip("outer: for (;;) { break outer; }");
    assert!(out.contains("outer:"), "{out}");
    assert!(out.contains("break outer;"), "{out}");
}
