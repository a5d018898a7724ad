use super::*;
use kestrel_common::Log;
use kestrel_parser::symbols::Symbol;

fn test_ctx<'a>(
    symbols: &'a mut Vec<Symbol>,
    log: &'a Log,
    options: &'a TransformOptions,
) -> Lower<'a> {
    Lower {
        unsupported: CompatFeatures::unsupported_by(options.target),
        symbols,
        source_index: 0,
        log,
        options,
        runtime_imports: IndexMap::new(),
        temp_counter: 0,
        temps_stack: vec![Vec::new()],
        private_env: FxHashMap::default(),
        class_static_prelude: Vec::new(),
        part_helper_uses: rustc_hash::FxHashSet::default(),
    }
}

#[test]
fn test_helper_refs_are_deduplicated() {
    let mut symbols = Vec::new();
    let log = Log::new();
    let options = TransformOptions::default();
    let mut ctx = test_ctx(&mut symbols, &log, &options);
    let a = ctx.helper("__pow");
    let b = ctx.helper("__pow");
    let (EData::Ident(a), EData::Ident(b)) = (a.data, b.data) else {
        panic!("helpers are identifiers");
    };
    assert_eq!(a.ref_, b.ref_);
    assert_eq!(ctx.runtime_imports.len(), 1);
}

#[test]
fn test_temp_naming_sequence() {
    let mut symbols = Vec::new();
    let log = Log::new();
    let options = TransformOptions::default();
    let mut ctx = test_ctx(&mut symbols, &log, &options);
    assert_eq!(ctx.temp().1, "_a");
    assert_eq!(ctx.temp().1, "_b");
    for _ in 0..24 {
        ctx.temp();
    }
    assert_eq!(ctx.temp().1, "_0");
}

#[test]
fn test_fn_frame_prepends_var_decl() {
    let mut symbols = Vec::new();
    let log = Log::new();
    let options = TransformOptions::default();
    let mut ctx = test_ctx(&mut symbols, &log, &options);
    ctx.push_fn_frame();
    let _ = ctx.temp();
    let mut body = vec![Stmt::expr(Expr::number(1.0))];
    ctx.pop_fn_frame(&mut body);
    assert_eq!(body.len(), 2);
    assert!(matches!(&body[0].data, SData::Local(l) if l.kind == LocalKind::Var));
}

#[test]
fn test_number_key_formatting() {
    assert_eq!(format_number_key(0.0), "0");
    assert_eq!(format_number_key(42.0), "42");
    assert_eq!(format_number_key(1.5), "1.5");
}
