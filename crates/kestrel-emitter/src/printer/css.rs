//! The CSS printer.
//!
//! Rules re-emit from their recorded token ranges, which keeps printing
//! cheap and byte-faithful. The printer only rewrites the pieces the
//! bundler owns: `@import` rules vanish when their target was inlined,
//! `url(...)` tokens take their resolved paths, and local (CSS modules)
//! class selectors take their renamed names.

use kestrel_common::Source;
use kestrel_lexer::css::{tokenize, CssTokenKind};
use kestrel_parser::css_ast::{CssAst, CssRule};
use kestrel_parser::import_record::ImportRecord;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct CssPrintOptions {
    pub minify_whitespace: bool,
}

pub struct CssPrinter<'a> {
    source: &'a Source,
    ast: &'a CssAst,
    /// Original class name -> output class name, for local-scope files.
    class_names: &'a FxHashMap<String, String>,
    /// Record index -> replacement URL, for rewritten assets.
    url_replacements: &'a FxHashMap<u32, String>,
    options: CssPrintOptions,
    out: String,
}

impl<'a> CssPrinter<'a> {
    pub fn new(
        source: &'a Source,
        ast: &'a CssAst,
        class_names: &'a FxHashMap<String, String>,
        url_replacements: &'a FxHashMap<u32, String>,
        options: CssPrintOptions,
    ) -> CssPrinter<'a> {
        CssPrinter {
            source,
            ast,
            class_names,
            url_replacements,
            options,
            out: String::new(),
        }
    }

    pub fn print(mut self) -> String {
        let rules = &self.ast.rules;
        self.print_rules(rules);
        if !self.out.ends_with('\n') && !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out
    }

    fn print_rules(&mut self, rules: &'a [CssRule]) {
        for rule in rules {
            self.print_rule(rule);
        }
    }

    fn print_rule(&mut self, rule: &'a CssRule) {
        match rule {
            CssRule::AtImport { record_index, span } => {
                let record = &self.ast.import_records[*record_index as usize];
                if record.is_internal() {
                    // Inlined by the linker's file ordering
                    return;
                }
                self.out.push_str(self.source.text_for(*span));
                self.newline();
            }
            CssRule::Style {
                prelude,
                declarations,
                ..
            } => {
                if prelude.is_empty() && declarations.len() == 1 && declarations[0].name.is_empty()
                {
                    // Opaque block content (e.g. inside @keyframes)
                    self.out
                        .push_str(self.source.text_for(declarations[0].value));
                    self.newline();
                    return;
                }
                let prelude_text = self.source.text_for(*prelude);
                self.print_prelude(prelude_text);
                self.open_brace();
                let mut first = true;
                for declaration in declarations {
                    if declaration.name.eq_ignore_ascii_case("composes") {
                        // A CSS modules directive, not a real declaration
                        continue;
                    }
                    if !first {
                        self.out.push(';');
                        self.sep();
                    } else if !self.options.minify_whitespace {
                        self.sep();
                    }
                    first = false;
                    if declaration.name.is_empty() {
                        self.out.push_str(self.source.text_for(declaration.value));
                        continue;
                    }
                    self.out.push_str(&declaration.name);
                    self.out.push(':');
                    if !self.options.minify_whitespace {
                        self.out.push(' ');
                    }
                    self.print_value(declaration.value, &declaration.url_records);
                    if declaration.important {
                        self.out.push_str(if self.options.minify_whitespace {
                            "!important"
                        } else {
                            " !important"
                        });
                    }
                }
                self.close_brace();
            }
            CssRule::At {
                name,
                prelude,
                block,
                ..
            } => {
                self.out.push('@');
                self.out.push_str(name);
                let prelude_text = self.source.text_for(*prelude).trim();
                if !prelude_text.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(prelude_text);
                }
                match block {
                    Some(rules) => {
                        self.open_brace();
                        self.print_rules(rules);
                        self.close_brace();
                    }
                    None => {
                        self.out.push(';');
                        self.newline();
                    }
                }
            }
        }
    }

    /// Re-emit a selector prelude, renaming local classes.
    fn print_prelude(&mut self, prelude: &str) {
        if self.class_names.is_empty() {
            self.out.push_str(prelude.trim());
            return;
        }
        // Token-scan the slice so `.name` is renamed without touching
        // anything else
        let log = kestrel_common::Log::new();
        let tokens = tokenize(prelude, self.source.index.0, &log);
        let mut rewritten = String::with_capacity(prelude.len());
        let mut previous_was_dot = false;
        for token in &tokens {
            if token.kind == CssTokenKind::EndOfFile {
                break;
            }
            let raw = token.raw(prelude);
            if previous_was_dot && token.kind == CssTokenKind::Ident {
                let name = token.text(prelude);
                match self.class_names.get(&name) {
                    Some(renamed) => rewritten.push_str(renamed),
                    None => rewritten.push_str(raw),
                }
            } else {
                rewritten.push_str(raw);
            }
            previous_was_dot = token.kind == CssTokenKind::Delim && token.delim == '.';
        }
        self.out.push_str(rewritten.trim());
    }

    /// Re-emit a declaration value, substituting rewritten urls.
    fn print_value(&mut self, value: kestrel_common::Span, url_records: &[u32]) {
        let text = self.source.text_for(value);
        if url_records.is_empty() {
            self.out.push_str(text.trim());
            return;
        }
        let mut replacements: Vec<(&str, String)> = Vec::new();
        for &index in url_records {
            if let Some(replacement) = self.url_replacements.get(&index) {
                let record: &ImportRecord = &self.ast.import_records[index as usize];
                replacements.push((record.path.as_str(), replacement.clone()));
            }
        }
        let mut out = text.trim().to_string();
        for (from, to) in replacements {
            out = out.replace(from, &to);
        }
        self.out.push_str(&out);
    }

    fn open_brace(&mut self) {
        if self.options.minify_whitespace {
            self.out.push('{');
        } else {
            self.out.push_str(" {");
        }
    }

    fn close_brace(&mut self) {
        if self.options.minify_whitespace {
            self.out.push('}');
        } else {
            self.out.push_str("\n}");
        }
        self.newline();
    }

    fn sep(&mut self) {
        if !self.options.minify_whitespace {
            self.out.push_str("\n  ");
        }
    }

    fn newline(&mut self) {
        if !self.options.minify_whitespace {
            self.out.push('\n');
        }
    }
}
