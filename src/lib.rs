//! kestrel: a JavaScript/TypeScript/JSX/CSS bundler core.
//!
//! The pipeline takes a set of entry points, parses every reachable file
//! in parallel, links the module graph on one thread (symbol merging,
//! export resolution, tree shaking, chunking), and prints optimised
//! output chunks in parallel with source maps.
//!
//! ```text
//! entries -> [resolve + load]                    (per file, parallel)
//!         -> [lex -> parse -> bind -> lower]
//!         -- barrier: module graph assembled --
//!         -> [link: merge, exports, shake, chunk] (single thread)
//!         -> [print chunks + source maps]         (parallel)
//!         -> output files
//! ```
//!
//! The command-line surface, configuration loading, file watching and the
//! real filesystem resolver are external collaborators: this crate
//! exposes the [`resolver::Resolver`] and [`plugin::Plugin`] contracts
//! they implement.

pub mod bundle;
pub mod metafile;
pub mod options;
pub mod plugin;
pub mod resolver;
pub mod runtime;

pub use bundle::{bundle, BuildResult, CancelToken, MangleCache, OutputFile};
pub use options::{BundleOptions, EntryPointSpec};
pub use plugin::{plugin_applies_to_path, FilterPath, Plugin};
pub use resolver::{MemoryResolver, Resolver};

// Re-export the pipeline crates for embedders that need deeper access.
pub use kestrel_common as common;
pub use kestrel_emitter as emitter;
pub use kestrel_lexer as lexer;
pub use kestrel_linker as linker;
pub use kestrel_parser as parser;
