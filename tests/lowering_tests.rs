//! End-to-end lowering scenarios: bundle tiny programs for older targets
//! and check the emitted shapes, including runtime helper inlining.

use kestrel::common::Target;
use kestrel::{bundle, BuildResult, BundleOptions, EntryPointSpec, MemoryResolver};

fn build_for(files: &[(&str, &str)], entry: &str, target: Target) -> BuildResult {
    let mut resolver = MemoryResolver::new();
    for (path, contents) in files {
        resolver.add(*path, *contents);
    }
    let mut options = BundleOptions::default();
    options.entry_points = vec![EntryPointSpec::new(entry)];
    options.target = target;
    bundle(&options, resolver.shared(), &[], None)
}

fn output(result: &BuildResult) -> &str {
    &result
        .output_files
        .iter()
        .find(|f| f.path.ends_with(".js"))
        .expect("js output")
        .contents
}

#[test]
fn test_only_referenced_helpers_are_included() {
    let result = build_for(
        &[("entry.js", "export const p = 2 ** 10;\nconsole.log(p);")],
        "entry.js",
        Target::Es2015,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("var __pow"), "{out}");
    assert!(out.contains("__pow(2, 10)"), "{out}");
    // Nothing else from the runtime leaks in
    assert!(!out.contains("__async"), "{out}");
    assert!(!out.contains("__objRest"), "{out}");
}

#[test]
fn test_object_spread_scenario() {
    let result = build_for(
        &[(
            "entry.js",
            "const base = { a: 1 };\nexport const merged = { ...base, b: 2 };\nconsole.log(merged);",
        )],
        "entry.js",
        Target::Es2017,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("__spreadProps"), "{out}");
    assert!(out.contains("var __spreadValues"), "{out}");
}

#[test]
fn test_using_disposal_scenario() {
    // Scenario: `await using` wraps the block; dispose runs in finally
    // even on throw
    let result = build_for(
        &[(
            "entry.js",
            "async function main() {\n  await using r = open();\n  throw new Error('boom');\n}\nmain();",
        )],
        "entry.js",
        Target::Es2022,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("var __using"), "{out}");
    assert!(out.contains("var __callDispose"), "{out}");
    let try_at = out.find("try {").expect("try block");
    let dispose_at = out.rfind("__callDispose(").expect("dispose call");
    assert!(try_at < dispose_at, "{out}");
    assert!(out.contains("finally"), "{out}");
}

#[test]
fn test_for_await_scenario() {
    let result = build_for(
        &[(
            "entry.js",
            "async function drain(stream) {\n  for await (const item of stream) {\n    consume(item);\n  }\n}\ndrain(s);",
        )],
        "entry.js",
        Target::Es2017,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("var __forAwait"), "{out}");
    assert!(out.contains("consume(item)"), "{out}");
}

#[test]
fn test_decorators_scenario() {
    let result = build_for(
        &[(
            "entry.ts",
            "function sealed(c: any) { return c; }\n@sealed\nexport class Service {}\nconsole.log(new Service());",
        )],
        "entry.ts",
        Target::Es2022,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("var __decorateClass"), "{out}");
    assert!(out.contains("Service = __decorateClass"), "{out}");
}

#[test]
fn test_optional_chain_scenario() {
    let result = build_for(
        &[(
            "entry.js",
            "export function pick(o) { return o?.inner?.value; }\nconsole.log(pick(x));",
        )],
        "entry.js",
        Target::Es2019,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("== null ? void 0 :"), "{out}");
    assert!(!out.contains("?."), "{out}");
}

#[test]
fn test_ts_enum_scenario() {
    let result = build_for(
        &[(
            "entry.ts",
            "export enum Level { Debug, Info = 10, Warn }\nconsole.log(Level.Warn);",
        )],
        "entry.ts",
        Target::EsNext,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("var Level"), "{out}");
    assert!(out.contains("= 10]"), "{out}");
    assert!(out.contains("= 11]"), "{out}");
}

#[test]
fn test_esnext_passthrough_keeps_syntax() {
    let result = build_for(
        &[(
            "entry.js",
            "export const v = a?.b ?? c;\nexport class K { #p = 1; read() { return this.#p; } }\nconsole.log(v, new K().read());",
        )],
        "entry.js",
        Target::EsNext,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = output(&result);
    assert!(out.contains("a?.b ?? c"), "{out}");
    assert!(out.contains("#p = 1"), "{out}");
    // No helpers were needed
    assert!(!out.contains("__privateGet"), "{out}");
    assert!(!out.contains("__pow"), "{out}");
}
