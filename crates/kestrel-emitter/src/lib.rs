//! Syntax lowering and printing for the kestrel bundler.
//!
//! `transform` rewrites newer language constructs into forms the configured
//! target accepts, inserting calls into the runtime helper library.
//! `printer` walks the AST emitting JavaScript or CSS text with optional
//! identifier minification and a VLQ source map stream. `renamer` assigns
//! minified names from per-scope slots using a frequency-biased alphabet.

pub mod charfreq;
pub mod printer;
pub mod renamer;
pub mod transform;

pub use charfreq::{CharFreq, NameMinifier};
pub use printer::js::{print_js, PrintOptions, PrintResult};
pub use renamer::{assign_nested_scope_slots, number_renamer, NameMap};
pub use transform::{lower, TransformOptions};
