use super::*;

#[test]
fn test_file_stem() {
    assert_eq!(file_stem("src/app/main.ts"), "main");
    assert_eq!(file_stem("util.test.js"), "util");
    assert_eq!(file_stem("plain"), "plain");
}

#[test]
fn test_sanitize() {
    assert_eq!(sanitize("my-module"), "my_module");
    assert_eq!(sanitize("123"), "_23");
    assert_eq!(sanitize(""), "_");
    assert_eq!(sanitize("ok_name$"), "ok_name$");
}

#[test]
fn test_collect_part_records_finds_nested_requires() {
    use kestrel_parser::part::Part;
    let require = Expr::synth(EData::RequireString {
        import_record_index: 3,
    });
    let nested = Stmt::expr(Expr::synth(EData::Cond(ECond {
        test: Box::new(Expr::synth(EData::Boolean(true))),
        yes: Box::new(require),
        no: Box::new(Expr::undefined()),
    })));
    let part = Part::new(vec![nested]);
    assert_eq!(collect_part_records(&part), vec![3]);
}

#[test]
fn test_collect_part_records_in_function_bodies() {
    use kestrel_parser::part::Part;
    let inner = Stmt::expr(Expr::synth(EData::RequireString {
        import_record_index: 7,
    }));
    let func = Stmt::synth(SData::Function {
        func: Func {
            name: None,
            args: Vec::new(),
            body: vec![inner],
            is_async: false,
            is_generator: false,
            uses_arguments: false,
        },
        is_export: false,
        name_ref: Ref::INVALID,
    });
    let part = Part::new(vec![func]);
    assert_eq!(collect_part_records(&part), vec![7]);
}
