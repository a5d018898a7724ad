//! Common types and utilities for the kestrel bundler.
//!
//! This crate provides the foundational types shared by every pipeline stage:
//! - Source spans (`Span`, `Spanned`)
//! - Source files, indices and line/column math (`Source`, `SourceIndex`, `LineMap`)
//! - Content loaders (`Loader`)
//! - The diagnostics log (`Log`, `Msg`)
//! - Target environments and feature gates (`Target`, `CompatFeatures`)
//! - VLQ encoding and source map generation
//! - Output path templates

// Span - byte-range source locations
pub mod span;
pub use span::{Span, Spanned};

// Source files and line/column conversion
pub mod source;
pub use source::{EntryPointKind, LineMap, Source, SourceIndex};

// Content loaders
pub mod loader;
pub use loader::Loader;

// Diagnostics log
pub mod logger;
pub use logger::{Log, Msg, MsgKind, MsgLocation, Note};

// Target environments and unsupported-feature bitsets
pub mod target;
pub use target::{CompatFeatures, Target};

// VLQ base-64 codec for source maps
pub mod vlq;

// Source map generation
pub mod source_map;
pub use source_map::{SourceMap, SourceMapBuilder, SourceMapShift};

// Output path templates ([dir]/[name]/[hash]/[ext])
pub mod path_template;
pub use path_template::PathTemplate;

// Output formats and source-map modes
pub mod output;
pub use output::{OutputFormat, SourceMapMode};
