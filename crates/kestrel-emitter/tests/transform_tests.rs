//! Lowering tests: source in, target-dependent JavaScript out.
//!
//! Each test parses, binds, lowers for a target, then prints and checks
//! the rewritten shape.

use kestrel_common::{Loader, Log, Source, SourceIndex, Target};
use kestrel_emitter::printer::js::{print_js, PrintOptions};
use kestrel_emitter::renamer::NameMap;
use kestrel_emitter::transform::{lower, TransformOptions};
use kestrel_parser::ast::Stmt;
use kestrel_parser::binder::bind;
use kestrel_parser::js_parser::{parse, ParserOptions};
use kestrel_parser::symbols::SymbolMap;
use std::sync::Arc;

fn compile_for(src: &str, loader: Loader, target: Target) -> String {
    let log = Log::new();
    let source = Source {
        index: SourceIndex(0),
        key_path: "input.js".to_string(),
        pretty_path: "input.js".to_string(),
        namespace: "file".to_string(),
        loader,
        contents: Arc::from(src),
    };
    let mut parser_options = ParserOptions::default();
    parser_options.loader = loader;
    let mut ast = parse(&source, &parser_options, &log);
    bind(&mut ast, &parser_options, &log, 0);
    let transform_options = TransformOptions {
        target,
        ..TransformOptions::default()
    };
    lower(&mut ast, 0, &transform_options, &log);
    assert!(!log.has_errors(), "unexpected errors: {:?}", log.take_msgs());

    let mut symbols = SymbolMap::new(1);
    symbols.set_file(SourceIndex(0), std::mem::take(&mut ast.symbols));
    let stmts: Vec<Stmt> = ast
        .parts
        .iter()
        .flat_map(|p| p.stmts.iter().cloned())
        .collect();
    print_js(&stmts, &symbols, &NameMap::default(), None, PrintOptions::default()).code
}

fn compile(src: &str, target: Target) -> String {
    compile_for(src, Loader::Js, target)
}

#[test]
fn test_exponent_lowering() {
    let out = compile("let x = a ** b;", Target::Es2015);
    assert!(out.contains("__pow(a, b)"), "{out}");
    // Supported targets pass through
    let out = compile("let x = a ** b;", Target::Es2016);
    assert!(out.contains("a ** b"), "{out}");
}

#[test]
fn test_async_function_lowering() {
    let out = compile("export async function f() { await 1; }", Target::Es2016);
    assert!(out.contains("__async(this, null, function* ()"), "{out}");
    assert!(out.contains("yield 1"), "{out}");
    assert!(!out.contains("await 1"), "{out}");
    // The outer function keeps its parameter list shape
    assert!(out.contains("function f()"), "{out}");
}

#[test]
fn test_async_function_forwards_arguments() {
    let out = compile(
        "async function f() { await g(arguments); }",
        Target::Es2016,
    );
    assert!(out.contains("__async(this, arguments, function* ()"), "{out}");
}

#[test]
fn test_async_arrow_lowering() {
    let out = compile("const f = async (x) => await x;", Target::Es2016);
    assert!(out.contains("=> __async(this, null, function* ()"), "{out}");
}

#[test]
fn test_optional_chain_lowering() {
    let out = compile("let v = a?.b.c;", Target::Es2019);
    assert!(out.contains("a == null ? void 0 : a.b.c"), "{out}");
    // The whole chain short-circuits: `.c` must be inside the conditional
    let out = compile("let v = a?.b;", Target::Es2020);
    assert!(out.contains("a?.b"), "{out}");
}

#[test]
fn test_optional_chain_side_effect_capture() {
    let out = compile("let v = f()?.x;", Target::Es2019);
    assert!(out.contains("(_a = f()) == null ? void 0 : _a.x"), "{out}");
    assert!(out.contains("var _a"), "{out}");
}

#[test]
fn test_optional_call_forwards_this() {
    let out = compile("let v = a.b?.();", Target::Es2019);
    assert!(out.contains(".call(a)"), "{out}");
}

#[test]
fn test_nullish_lowering() {
    let out = compile("let v = a ?? b;", Target::Es2019);
    assert!(out.contains("a != null ? a : b"), "{out}");
    let out = compile("let v = f() ?? b;", Target::Es2019);
    assert!(out.contains("(_a = f()) != null ? _a : b"), "{out}");
}

#[test]
fn test_logical_assignment_lowering() {
    let out = compile("a &&= b;", Target::Es2020);
    assert!(out.contains("a && (a = b)"), "{out}");
    let out = compile("a ||= b;", Target::Es2020);
    assert!(out.contains("a || (a = b)"), "{out}");
    // At es2020 `??` itself is supported, so `??=` expands to it
    let out = compile("a ??= b;", Target::Es2020);
    assert!(out.contains("a ?? (a = b)"), "{out}");
    // Below es2020 the nullish test expands as well
    let out = compile("a ??= b;", Target::Es2019);
    assert!(out.contains("a != null ? a : a = b"), "{out}");
    // Member targets evaluate the object once
    let out = compile("o.k &&= b;", Target::Es2020);
    assert!(out.contains("o.k && (o.k = b)"), "{out}");
}

#[test]
fn test_object_spread_lowering() {
    let out = compile("let o = { a: 1, ...b, c: 2 };", Target::Es2017);
    assert!(out.contains("__spreadProps"), "{out}");
    assert!(out.contains("__spreadValues"), "{out}");
    // Order: literal group first, then the spread
    let spread_values = out.find("__spreadValues").unwrap();
    let spread_props = out.find("__spreadProps").unwrap();
    assert!(spread_props < spread_values, "{out}");
}

#[test]
fn test_object_rest_lowering() {
    let out = compile("const { a, ...rest } = value;", Target::Es2017);
    assert!(out.contains("__objRest"), "{out}");
    assert!(out.contains("\"a\""), "{out}");
}

#[test]
fn test_for_await_lowering() {
    let out = compile(
        "async function f(y) { for await (const x of y) { use(x); } }",
        Target::Es2017,
    );
    assert!(out.contains("__forAwait"), "{out}");
    assert!(out.contains("finally"), "{out}");
    // `await` in the loop protocol became `yield` via the async lowering
    let out2 = compile(
        "async function f(y) { for await (const x of y) { use(x); } }",
        Target::Es2016,
    );
    assert!(out2.contains("yield"), "{out2}");
}

#[test]
fn test_async_generator_lowering() {
    let out = compile(
        "async function* gen() { await a; yield b; }",
        Target::Es2017,
    );
    assert!(out.contains("__asyncGenerator"), "{out}");
    assert!(out.contains("yield __await(a)"), "{out}");
}

#[test]
fn test_private_field_lowering() {
    let out = compile_for(
        "class C { #x = 1; get y() { return this.#x; } }",
        Loader::Ts,
        Target::Es2020,
    );
    assert!(out.contains("new WeakMap()"), "{out}");
    assert!(out.contains("__privateAdd(this, _x, 1)"), "{out}");
    assert!(out.contains("__privateGet(this, _x)"), "{out}");
    assert!(out.contains("constructor()"), "{out}");
}

#[test]
fn test_private_method_lowering() {
    let out = compile("class C { #m() { return 1; } call() { return this.#m(); } }", Target::Es2020);
    assert!(out.contains("new WeakSet()"), "{out}");
    assert!(out.contains("__privateAdd(this, _m)"), "{out}");
    assert!(out.contains("__privateMethod(this, _m, m_fn).call(this)"), "{out}");
}

#[test]
fn test_private_set_lowering() {
    let out = compile("class C { #x = 0; set(v) { this.#x = v; } }", Target::Es2020);
    assert!(out.contains("__privateSet(this, _x, v)"), "{out}");
}

#[test]
fn test_private_brand_check_lowering() {
    let out = compile("class C { #x = 1; static has(o) { return #x in o; } }", Target::Es2020);
    assert!(out.contains("__privateIn(_x, o)"), "{out}");
}

#[test]
fn test_private_passthrough_on_esnext() {
    let out = compile("class C { #x = 1; get y() { return this.#x; } }", Target::EsNext);
    assert!(out.contains("#x = 1"), "{out}");
    assert!(out.contains("this.#x"), "{out}");
}

#[test]
fn test_class_field_ordering_matrix() {
    // One lowered member drags every instance field into the constructor
    let out = compile("class C { a = first(); #b = second(); }", Target::Es2020);
    let a = out.find("this.a = first()").expect("a moved to constructor");
    let b = out.find("__privateAdd(this, _b, second())").expect("b lowered");
    assert!(a < b, "field order must be preserved: {out}");
}

#[test]
fn test_static_field_and_block_lowering() {
    let out = compile(
        "class C { static x = 1; static { setup(C); } }",
        Target::Es2020,
    );
    assert!(out.contains("C.x = 1"), "{out}");
    assert!(out.contains("setup(C)"), "{out}");
}

#[test]
fn test_super_shim_inline_single_call() {
    let out = compile(
        "class A extends B { x = 1; constructor() { super(); after(); } }",
        Target::Es2020,
    );
    // The single top-level super() gets the inits inlined right after it
    let sup = out.find("super()").unwrap();
    let init = out.find("this.x = 1").unwrap();
    let after = out.find("after()").unwrap();
    assert!(sup < init && init < after, "{out}");
}

#[test]
fn test_super_shim_wrapper_for_conditional_call() {
    let out = compile(
        "class A extends B { x = 1; constructor(c) { if (c) super(1); else super(2); } }",
        Target::Es2020,
    );
    // Multiple super() calls go through the synthesized shim
    assert!(out.contains("(...args) =>"), "{out}");
    assert!(out.contains("super(...args)"), "{out}");
}

#[test]
fn test_using_lowering() {
    let out = compile(
        "function f() { using r = open(); work(r); }",
        Target::Es2022,
    );
    assert!(out.contains("__using(_"), "{out}");
    assert!(out.contains("__callDispose"), "{out}");
    assert!(out.contains("try"), "{out}");
    assert!(out.contains("catch"), "{out}");
    assert!(out.contains("finally"), "{out}");
}

#[test]
fn test_await_using_awaits_dispose() {
    let out = compile(
        "async function f() { await using r = open(); }",
        Target::Es2022,
    );
    assert!(out.contains("__using(_"), "{out}");
    assert!(out.contains(", true)"), "{out}");
    // The dispose promise is conditionally awaited in the finally
    assert!(out.contains("&& await _"), "{out}");
}

#[test]
fn test_for_of_using_rewrites_body() {
    let out = compile(
        "function f(ys) { for (using x of ys) { work(x); } }",
        Target::Es2022,
    );
    assert!(out.contains("for (const _"), "{out}");
    assert!(out.contains("__using"), "{out}");
}

#[test]
fn test_decorator_lowering() {
    let out = compile_for(
        "@sealed class C { @log method() {} }",
        Loader::Ts,
        Target::Es2022,
    );
    assert!(out.contains("__decorateClass"), "{out}");
    // Member decorators run before the class decorator
    let member = out.find("\"method\"").unwrap();
    let class_dec = out.rfind("C = __decorateClass").unwrap();
    assert!(member < class_dec, "{out}");
}

#[test]
fn test_enum_lowering() {
    let out = compile_for(
        "export enum Color { Red, Green = 5, Blue }",
        Loader::Ts,
        Target::EsNext,
    );
    assert!(out.contains("var Color"), "{out}");
    assert!(out.contains("Color2[Color2[\"Red\"] = 0] = \"Red\""), "{out}");
    assert!(out.contains("Color2[Color2[\"Green\"] = 5] = \"Green\""), "{out}");
    assert!(out.contains("Color2[Color2[\"Blue\"] = 6] = \"Blue\""), "{out}");
}

#[test]
fn test_string_enum_has_no_reverse_mapping() {
    let out = compile_for(
        "enum Dir { Up = \"up\" }",
        Loader::Ts,
        Target::EsNext,
    );
    assert!(out.contains("Dir2[\"Up\"] = \"up\""), "{out}");
    assert!(!out.contains("= \"Up\""), "{out}");
}

#[test]
fn test_namespace_lowering() {
    let out = compile_for(
        "namespace N { export function f() { return 1; } }",
        Loader::Ts,
        Target::EsNext,
    );
    assert!(out.contains("var N"), "{out}");
    assert!(out.contains("N2.f = f"), "{out}");
}

#[test]
fn test_optional_catch_binding_lowering() {
    let out = compile("try { f(); } catch {}", Target::Es2018);
    assert!(out.contains("catch (_"), "{out}");
}

#[test]
fn test_tagged_template_passthrough() {
    // Templates are supported by every target this bundler emits for
    let out = compile("let s = tag`a${x}b`;", Target::Es2015);
    assert!(out.contains("tag`a${x}b`"), "{out}");
}
