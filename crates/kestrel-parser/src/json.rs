//! JSON-to-module conversion.
//!
//! A JSON file becomes an ES module with a single default export of the
//! parsed value. The value is converted straight into the JS AST so the
//! rest of the pipeline (tree shaking, printing) needs no special cases.

use crate::ast::*;
use crate::symbols::{Ref, Symbol, SymbolKind};
use kestrel_common::{Log, Source, Span};

pub fn parse_json_module(source: &Source, log: &Log) -> Ast {
    let mut ast = Ast::default();
    let mut symbols = Vec::new();
    let mut new_symbol = |kind: SymbolKind, name: &str| {
        symbols.push(Symbol::new(name, kind));
        Ref {
            source: source.index.0,
            inner: (symbols.len() - 1) as u32,
        }
    };
    ast.exports_ref = new_symbol(SymbolKind::Hoisted, "exports");
    ast.module_ref = new_symbol(SymbolKind::Hoisted, "module");
    ast.wrapper_ref = new_symbol(SymbolKind::Other, "init_json");
    let default_ref = new_symbol(SymbolKind::Other, "default");

    let value = match serde_json::from_str::<serde_json::Value>(&source.contents) {
        Ok(value) => json_to_expr(&value),
        Err(err) => {
            let offset = byte_offset_of(&source.contents, err.line(), err.column());
            log.add_error(
                source.index.0,
                Span::at(offset),
                format!("JSON parse error: {err}"),
            );
            Expr::synth(EData::Null)
        }
    };

    ast.symbols = symbols;
    ast.exports_kind = ExportsKind::Esm;
    ast.named_exports.insert(
        "default".to_string(),
        NamedExport {
            ref_: default_ref,
            alias_span: Span::at(0),
        },
    );
    let mut part = crate::part::Part::new(vec![Stmt::synth(SData::ExportDefault(
        SExportDefault {
            value: ExportDefaultValue::Expr(value),
            default_ref,
        },
    ))]);
    part.can_be_removed_if_unused = true;
    part.declared_symbols.push(default_ref);
    ast.top_level_symbol_to_parts.insert(default_ref, vec![0]);
    ast.parts.push(part);
    ast
}

fn json_to_expr(value: &serde_json::Value) -> Expr {
    let data = match value {
        serde_json::Value::Null => EData::Null,
        serde_json::Value::Bool(b) => EData::Boolean(*b),
        serde_json::Value::Number(n) => EData::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => EData::String(s.clone()),
        serde_json::Value::Array(items) => {
            EData::Array(items.iter().map(json_to_expr).collect())
        }
        serde_json::Value::Object(map) => EData::Object(
            map.iter()
                .map(|(key, value)| Property {
                    kind: PropertyKind::Normal,
                    key: Expr::string(key.clone()),
                    value: Some(json_to_expr(value)),
                    computed: false,
                    shorthand: false,
                    method: false,
                })
                .collect(),
        ),
    };
    Expr::synth(data)
}

fn byte_offset_of(text: &str, line: usize, column: usize) -> u32 {
    let mut offset = 0usize;
    for (i, l) in text.lines().enumerate() {
        if i + 1 == line {
            return (offset + column.saturating_sub(1)).min(text.len()) as u32;
        }
        offset += l.len() + 1;
    }
    text.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::{Loader, SourceIndex};
    use std::sync::Arc;

    fn json_source(contents: &str) -> Source {
        Source {
            index: SourceIndex(3),
            key_path: "data.json".to_string(),
            pretty_path: "data.json".to_string(),
            namespace: "file".to_string(),
            loader: Loader::Json,
            contents: Arc::from(contents),
        }
    }

    #[test]
    fn test_json_module_shape() {
        let log = Log::new();
        let ast = parse_json_module(&json_source("{\"a\": [1, true, null]}"), &log);
        assert!(!log.has_errors());
        assert_eq!(ast.exports_kind, ExportsKind::Esm);
        assert!(ast.named_exports.contains_key("default"));
        assert_eq!(ast.parts.len(), 1);
    }

    #[test]
    fn test_bad_json_reports_error() {
        let log = Log::new();
        let _ = parse_json_module(&json_source("{oops"), &log);
        assert!(log.has_errors());
    }
}
