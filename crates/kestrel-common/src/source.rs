//! Source files and line/column math.
//!
//! Each input file gets a dense `SourceIndex` from the scan driver. Columns
//! reported to the outside world (diagnostics, source maps) are counted in
//! UTF-16 code units to match the Mozilla `source-map` convention, not in
//! bytes and not in codepoints.

use crate::loader::Loader;
use crate::span::Span;

/// Dense index of a source file, allocated by the scan driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceIndex(pub u32);

impl SourceIndex {
    /// Sentinel for "no source".
    pub const INVALID: SourceIndex = SourceIndex(u32::MAX);

    /// The runtime helper library is always parsed first.
    pub const RUNTIME: SourceIndex = SourceIndex(0);

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for SourceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an entry point was added to the build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPointKind {
    /// Listed by the user as a build input.
    User,
    /// Discovered through a dynamic `import()` that needs its own chunk.
    DynamicImport,
}

/// One input file.
///
/// Contents are UTF-8; invalid input bytes are replaced before a `Source` is
/// constructed. Read-only after the scan barrier.
#[derive(Clone, Debug)]
pub struct Source {
    pub index: SourceIndex,
    /// Absolute logical path, unique within a namespace.
    pub key_path: String,
    /// Shortened path used in diagnostics and the metafile.
    pub pretty_path: String,
    /// Namespace tag: "file" for real files, "dataurl" etc. for synthetic
    /// ones, or a plugin-defined tag.
    pub namespace: String,
    pub loader: Loader,
    pub contents: std::sync::Arc<str>,
}

impl Source {
    /// The text covered by a span of this source.
    #[inline]
    pub fn text_for(&self, span: Span) -> &str {
        span.slice(&self.contents)
    }

    /// Build the line table for this source.
    pub fn line_map(&self) -> LineMap {
        LineMap::build(&self.contents)
    }
}

/// Starting byte offset of every line, for O(log n) offset → (line, column)
/// conversion. Line and column are both 0-based; columns are UTF-16 code
/// units.
#[derive(Debug, Clone)]
pub struct LineMap {
    line_starts: Vec<u32>,
}

impl LineMap {
    #[must_use]
    pub fn build(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        let bytes = source.as_bytes();
        let mut i = 0;
        while let Some(found) = memchr::memchr2(b'\n', b'\r', &bytes[i..]) {
            let at = i + found;
            if bytes[at] == b'\n' {
                line_starts.push((at + 1) as u32);
            } else {
                // \r\n counts once; lone \r is a line ending of its own
                if bytes.get(at + 1) != Some(&b'\n') {
                    line_starts.push((at + 1) as u32);
                }
            }
            i = at + 1;
        }
        LineMap { line_starts }
    }

    /// Number of lines (at least 1).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where `line` starts.
    #[must_use]
    pub fn line_start(&self, line: usize) -> u32 {
        self.line_starts.get(line).copied().unwrap_or(0)
    }

    /// Convert a byte offset into (line, column), column in UTF-16 units.
    #[must_use]
    pub fn position(&self, offset: u32, source: &str) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        let line_start = (self.line_starts[line] as usize).min(source.len());
        let end = (offset as usize).min(source.len());
        let column = utf16_len(source.get(line_start..end).unwrap_or(""));
        (line as u32, column)
    }
}

/// Length of a string in UTF-16 code units. Astral codepoints count as 2.
#[must_use]
pub fn utf16_len(text: &str) -> u32 {
    let mut n = 0u32;
    for ch in text.chars() {
        n += ch.len_utf16() as u32;
    }
    n
}

#[cfg(test)]
#[path = "../tests/source.rs"]
mod tests;
