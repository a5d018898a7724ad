//! Build configuration.

use kestrel_common::{OutputFormat, SourceMapMode, Target};
use kestrel_parser::js_parser::{DefineValue, JsxOptions};
use rustc_hash::FxHashMap;

/// One requested entry point, before resolution.
#[derive(Debug, Clone)]
pub struct EntryPointSpec {
    /// The path as the user wrote it, handed to the resolver.
    pub input_path: String,
    /// Optional explicit output name (the `[name]` placeholder).
    pub output_name: Option<String>,
}

impl EntryPointSpec {
    #[must_use]
    pub fn new(input_path: impl Into<String>) -> EntryPointSpec {
        EntryPointSpec {
            input_path: input_path.into(),
            output_name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub entry_points: Vec<EntryPointSpec>,
    pub target: Target,
    pub format: OutputFormat,
    /// Dotted global name for IIFE output, e.g. `["MyLib", "core"]`.
    pub global_name: Vec<String>,
    pub source_map: SourceMapMode,
    pub minify_identifiers: bool,
    pub minify_whitespace: bool,
    /// Escape non-ASCII characters in the output.
    pub ascii_only: bool,
    pub keep_names: bool,
    /// Identifier/dotted-path replacements applied during parsing.
    pub defines: FxHashMap<String, DefineValue>,
    pub jsx: JsxOptions,
    /// Output path template for entry chunks.
    pub chunk_names: String,
    /// Produce the JSON metafile describing inputs and outputs.
    pub write_metafile: bool,
    /// Upper bound on log messages kept (0 = unlimited).
    pub log_limit: usize,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            entry_points: Vec::new(),
            target: Target::EsNext,
            format: OutputFormat::Esm,
            global_name: Vec::new(),
            source_map: SourceMapMode::None,
            minify_identifiers: false,
            minify_whitespace: false,
            ascii_only: false,
            keep_names: false,
            defines: FxHashMap::default(),
            jsx: JsxOptions::default(),
            chunk_names: "[dir][name]-[hash].[ext]".to_string(),
            write_metafile: false,
            log_limit: 384,
        }
    }
}
