//! The linker: module graph, symbol merging, export resolution, tree
//! shaking and chunk computation.
//!
//! Linking runs single-threaded between the parallel scan and print
//! stages. Its inputs are read-only after the scan barrier except for the
//! documented mutation points: `Symbol.link` (set once, then followed),
//! use-count estimates, per-file liveness and chunk assignment.

pub mod chunk;
pub mod graph;
pub mod link;

pub use chunk::{Chunk, ChunkRepr};
pub use graph::{EntryPoint, FileKind, LinkerFile, WrapKind};
pub use link::{link, LinkInput, LinkOptions, LinkResult};
