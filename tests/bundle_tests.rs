//! End-to-end bundling tests over the in-memory resolver.

use kestrel::common::{OutputFormat, SourceMapMode, Target};
use kestrel::{bundle, BuildResult, BundleOptions, EntryPointSpec, MemoryResolver};

fn build_with(
    files: &[(&str, &str)],
    entries: &[&str],
    tweak: impl FnOnce(&mut BundleOptions),
) -> BuildResult {
    let mut resolver = MemoryResolver::new();
    for (path, contents) in files {
        resolver.add(*path, *contents);
    }
    let mut options = BundleOptions::default();
    options.entry_points = entries
        .iter()
        .map(|e| EntryPointSpec::new(e.to_string()))
        .collect();
    tweak(&mut options);
    bundle(&options, resolver.shared(), &[], None)
}

fn build(files: &[(&str, &str)], entries: &[&str]) -> BuildResult {
    build_with(files, entries, |_| {})
}

fn js_output(result: &BuildResult) -> &str {
    let file = result
        .output_files
        .iter()
        .find(|f| f.path.ends_with(".js"))
        .expect("a JS output chunk");
    &file.contents
}

#[test]
fn test_single_chunk_with_consistent_renaming() {
    // Scenario: a.js exports x, b.js imports and logs it
    let result = build(
        &[
            ("a.js", "export const x = 1;"),
            ("b.js", "import { x } from './a';\nconsole.log(x);"),
        ],
        &["b.js"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    assert_eq!(
        result
            .output_files
            .iter()
            .filter(|f| f.path.ends_with(".js"))
            .count(),
        1
    );
    let out = js_output(&result);
    // The import/export syntax is gone; the binding is shared directly
    assert!(!out.contains("import {"), "{out}");
    assert!(out.contains("const x = 1"), "{out}");
    assert!(out.contains("console.log(x)"), "{out}");
}

#[test]
fn test_tree_shaking_drops_unused_exports() {
    let result = build(
        &[
            (
                "a.js",
                "export const used = 1;\nexport const unused = 2;",
            ),
            ("b.js", "import { used } from './a';\nconsole.log(used);"),
        ],
        &["b.js"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("used"), "{out}");
    assert!(!out.contains("unused"), "{out}");
}

#[test]
fn test_async_lowering_inlines_helper() {
    // Scenario: async function at es2016 becomes __async + generator
    let result = build_with(
        &[("a.js", "export async function f() { await 1; }\nf();")],
        &["a.js"],
        |options| options.target = Target::Es2016,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("__async(this, null, function* ()"), "{out}");
    assert!(out.contains("yield 1"), "{out}");
    // The helper is inlined from the runtime
    assert!(out.contains("var __async"), "{out}");
    // Unreferenced helpers are shaken away
    assert!(!out.contains("__spreadValues"), "{out}");
}

#[test]
fn test_private_field_lowering_end_to_end() {
    // Scenario: TS class with a private field at es2020
    let result = build_with(
        &[(
            "a.ts",
            "export class C { #x = 1; get y() { return this.#x; } }\nconsole.log(new C().y);",
        )],
        &["a.ts"],
        |options| options.target = Target::Es2020,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("WeakMap"), "{out}");
    assert!(out.contains("__privateGet"), "{out}");
    assert!(out.contains("__privateAdd"), "{out}");
}

#[test]
fn test_export_star_namespace_access() {
    // Scenario: star re-export chain feeding a namespace import
    let result = build(
        &[
            ("a.js", "export * from './b';"),
            ("b.js", "export { x } from './c';\nexport * from './c';"),
            ("c.js", "export let x = 1, y = 2;"),
            (
                "entry.js",
                "import * as n from './a';\nconsole.log(n.x, n.y);",
            ),
        ],
        &["entry.js"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("__export"), "{out}");
    assert!(out.contains("a_exports"), "{out}");
}

#[test]
fn test_commonjs_interop() {
    let result = build(
        &[
            ("dep.js", "exports.answer = 42;"),
            (
                "entry.js",
                "import dep from './dep';\nconsole.log(dep.answer);",
            ),
        ],
        &["entry.js"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("__commonJS"), "{out}");
    assert!(out.contains("require_dep"), "{out}");
    assert!(out.contains("__toESM"), "{out}");
}

#[test]
fn test_css_import_inlining() {
    // Scenario: @import resolves and inlines the dependency first
    let result = build(
        &[
            ("b.css", ".base { color: blue }"),
            ("style.css", "@import \"./b.css\";\n.a { color: red }"),
        ],
        &["style.css"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let css = result
        .output_files
        .iter()
        .find(|f| f.path.ends_with(".css"))
        .expect("a CSS chunk");
    let base = css.contents.find(".base").expect("imported file inlined");
    let a = css.contents.find(".a").expect("importing file present");
    assert!(base < a, "imported css must come first: {}", css.contents);
    // The @import rule itself is gone
    assert!(!css.contents.contains("@import"), "{}", css.contents);
}

#[test]
fn test_css_modules_composes() {
    let result = build(
        &[
            ("b.module.css", ".b { color: blue }"),
            (
                "style.module.css",
                "@import \"./b.module.css\";\n.a { composes: b from \"./b.module.css\"; color: red }",
            ),
        ],
        &["style.module.css"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let exports = result
        .css_module_exports
        .get("style.module.css")
        .expect("css module exports");
    let a = exports
        .iter()
        .find(|(alias, _)| alias == "a")
        .map(|(_, classes)| classes.clone())
        .expect("class a");
    // The composed class's name is appended
    assert_eq!(a, "a b");
}

#[test]
fn test_dynamic_import_splits_chunks() {
    let result = build(
        &[
            ("lazy.js", "export const heavy = 'payload';"),
            (
                "entry.js",
                "import('./lazy').then((m) => console.log(m.heavy));",
            ),
        ],
        &["entry.js"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let js_chunks: Vec<_> = result
        .output_files
        .iter()
        .filter(|f| f.path.ends_with(".js"))
        .collect();
    assert_eq!(js_chunks.len(), 2, "{:?}", result.output_files);
}

#[test]
fn test_chunk_paths_contain_hashes() {
    let result = build(&[("entry.js", "console.log(1);")], &["entry.js"]);
    assert!(!result.has_errors);
    let path = &result.output_files[0].path;
    // [name]-[hash].[ext]
    assert!(path.starts_with("entry-"), "{path}");
    assert!(path.ends_with(".js"), "{path}");
    let hash = path
        .trim_start_matches("entry-")
        .trim_end_matches(".js");
    assert_eq!(hash.len(), 8, "{path}");
}

#[test]
fn test_rebuild_is_byte_identical() {
    let files: &[(&str, &str)] = &[
        ("a.js", "export const value = 40 + 2;"),
        (
            "entry.js",
            "import { value } from './a';\nexport function main() { return value; }",
        ),
    ];
    let first = build(files, &["entry.js"]);
    let second = build(files, &["entry.js"]);
    assert!(!first.has_errors);
    assert_eq!(first.output_files.len(), second.output_files.len());
    for (a, b) in first.output_files.iter().zip(second.output_files.iter()) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.contents, b.contents);
    }
}

#[test]
fn test_minified_output_is_stable_and_small() {
    let files: &[(&str, &str)] = &[(
        "entry.js",
        "const someLongVariableName = 1;\nexport function main() { return someLongVariableName + someLongVariableName; }",
    )];
    let first = build_with(files, &["entry.js"], |options| {
        options.minify_identifiers = true;
        options.minify_whitespace = true;
    });
    let second = build_with(files, &["entry.js"], |options| {
        options.minify_identifiers = true;
        options.minify_whitespace = true;
    });
    assert!(!first.has_errors, "{:?}", first.msgs);
    let out1 = js_output(&first).to_string();
    let out2 = js_output(&second).to_string();
    assert_eq!(out1, out2);
    assert!(!out1.contains("someLongVariableName"), "{out1}");
}

#[test]
fn test_iife_format_with_global_name() {
    let result = build_with(
        &[("entry.js", "export const api = 1;")],
        &["entry.js"],
        |options| {
            options.format = OutputFormat::Iife;
            options.global_name = vec!["MyLib".to_string()];
        },
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("var MyLib = (() => {"), "{out}");
    assert!(out.contains("return { api: api };"), "{out}");
    assert!(out.contains("})();"), "{out}");
}

#[test]
fn test_cjs_format_exports() {
    let result = build_with(
        &[("entry.js", "export const api = 1;")],
        &["entry.js"],
        |options| options.format = OutputFormat::Cjs,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("module.exports"), "{out}");
}

#[test]
fn test_inline_source_map() {
    let result = build_with(
        &[("entry.js", "console.log('mapped');")],
        &["entry.js"],
        |options| options.source_map = SourceMapMode::Inline,
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(
        out.contains("//# sourceMappingURL=data:application/json;base64,"),
        "{out}"
    );
}

#[test]
fn test_external_source_map_file() {
    let result = build_with(
        &[("entry.js", "console.log('mapped');")],
        &["entry.js"],
        |options| options.source_map = SourceMapMode::LinkedWithComment,
    );
    assert!(!result.has_errors);
    assert!(result.output_files.iter().any(|f| f.path.ends_with(".map")));
    let out = js_output(&result);
    assert!(out.contains("//# sourceMappingURL=entry-"), "{out}");
}

#[test]
fn test_external_imports_survive() {
    let mut resolver = MemoryResolver::new();
    resolver.add("entry.js", "import fs from 'node:fs';\nconsole.log(fs);");
    resolver.mark_external("node:");
    let mut options = BundleOptions::default();
    options.entry_points = vec![EntryPointSpec::new("entry.js")];
    let result = bundle(&options, resolver.shared(), &[], None);
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("from \"node:fs\""), "{out}");
}

#[test]
fn test_resolve_error_reported_with_location() {
    let result = build(
        &[("entry.js", "import { x } from './missing';\nconsole.log(x);")],
        &["entry.js"],
    );
    assert!(result.has_errors);
    assert!(result
        .msgs
        .iter()
        .any(|m| m.text.contains("Could not resolve")));
}

#[test]
fn test_parse_error_produces_diagnostics_not_panic() {
    let result = build(
        &[
            ("bad.js", "export const = broken"),
            ("entry.js", "import './bad';\nconsole.log('after');"),
        ],
        &["entry.js"],
    );
    assert!(result.has_errors);
}

#[test]
fn test_json_import() {
    let result = build(
        &[
            ("data.json", "{\"name\": \"kestrel\", \"major\": 1}"),
            (
                "entry.js",
                "import data from './data.json';\nconsole.log(data.name);",
            ),
        ],
        &["entry.js"],
    );
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("kestrel"), "{out}");
}

#[test]
fn test_metafile_lists_inputs_and_outputs() {
    let result = build_with(
        &[
            ("a.js", "export const x = 1;"),
            ("entry.js", "import { x } from './a';\nconsole.log(x);"),
        ],
        &["entry.js"],
        |options| options.write_metafile = true,
    );
    assert!(!result.has_errors);
    let metafile = result.metafile.expect("metafile requested");
    assert!(metafile.contains("\"inputs\""), "{metafile}");
    assert!(metafile.contains("\"outputs\""), "{metafile}");
    assert!(metafile.contains("entry.js"), "{metafile}");
    assert!(metafile.contains("\"entryPoint\""), "{metafile}");
}

#[test]
fn test_cancellation_stops_the_build() {
    let token = kestrel::CancelToken::new();
    token.cancel();
    let mut resolver = MemoryResolver::new();
    resolver.add("entry.js", "console.log(1);");
    let mut options = BundleOptions::default();
    options.entry_points = vec![EntryPointSpec::new("entry.js")];
    let result = bundle(&options, resolver.shared(), &[], Some(token));
    assert!(result.output_files.is_empty());
}

#[test]
fn test_plugin_virtual_module() {
    use kestrel::plugin::{OnLoadHook, OnResolveHook, Plugin};
    use kestrel::resolver::{LoadResult, ResolveResult};

    let mut plugin = Plugin::new("virtual");
    plugin.on_resolve.push(OnResolveHook {
        filter: "^virtual:".to_string(),
        namespace: String::new(),
        callback: Box::new(|args| {
            Some(Ok(ResolveResult {
                path: args.path.clone(),
                namespace: "virtual".to_string(),
                external: false,
                side_effects_false: false,
            }))
        }),
    });
    plugin.on_load.push(OnLoadHook {
        filter: ".*".to_string(),
        namespace: "virtual".to_string(),
        callback: Box::new(|_args| {
            Some(Ok(LoadResult {
                contents: "export const injected = 'from-plugin';".to_string(),
                loader: kestrel::common::Loader::Js,
                resolve_dir: String::new(),
            }))
        }),
    });

    let mut resolver = MemoryResolver::new();
    resolver.add(
        "entry.js",
        "import { injected } from 'virtual:thing';\nconsole.log(injected);",
    );
    let mut options = BundleOptions::default();
    options.entry_points = vec![EntryPointSpec::new("entry.js")];
    let result = bundle(&options, resolver.shared(), &[plugin], None);
    assert!(!result.has_errors, "{:?}", result.msgs);
    let out = js_output(&result);
    assert!(out.contains("from-plugin"), "{out}");
}
