//! Source map generation.
//!
//! Mappings are the standard base-64 VLQ stream: five-field segments with
//! per-line generated-column reset and carried deltas for source index,
//! original line, original column and name index. Generated and original
//! columns are counted in UTF-16 code units (the Mozilla `source-map`
//! convention).
//!
//! The printer emits one mapping stream per chunk. Because output paths may
//! be substituted into the chunk *after* printing (content hashes are not
//! known until every chunk body exists), the final map is assembled from
//! pieces plus a list of [`SourceMapShift`]s describing how those
//! substitutions moved generated columns.

use crate::vlq;
use serde::Serialize;

/// A rendered source map, ready to serialize as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMap {
    pub version: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    pub sources: Vec<String>,
    #[serde(rename = "sourcesContent")]
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Render as an inline `sourceMappingURL` comment payload.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!(
            "data:application/json;base64,{}",
            base64_encode(self.to_json().as_bytes())
        )
    }
}

/// A generated position: 0-based line, column in UTF-16 code units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct GeneratedPos {
    pub line: u32,
    pub column: u32,
}

/// Records that a post-print string substitution moved the text at
/// `before` to `after` (same line, different column).
#[derive(Clone, Copy, Debug)]
pub struct SourceMapShift {
    pub before: GeneratedPos,
    pub after: GeneratedPos,
}

/// Incrementally builds the `mappings` stream while the printer walks a
/// chunk. The printer interleaves `advance_bytes` (for every piece of text
/// written) with `add_mapping` (at node boundaries).
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    mappings: String,
    generated: GeneratedPos,
    state: Deltas,
    line_has_mapping: bool,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Deltas {
    generated_column: i32,
    source: i32,
    original_line: i32,
    original_column: i32,
    name: i32,
}

impl SourceMapBuilder {
    #[must_use]
    pub fn new() -> Self {
        SourceMapBuilder::default()
    }

    /// Register a source file; returns its index in `sources`.
    pub fn add_source(&mut self, path: impl Into<String>, contents: Option<String>) -> u32 {
        self.sources.push(path.into());
        self.sources_content.push(contents);
        (self.sources.len() - 1) as u32
    }

    pub fn add_name(&mut self, name: impl Into<String>) -> u32 {
        self.names.push(name.into());
        (self.names.len() - 1) as u32
    }

    /// Advance the generated position over `text` just written to the
    /// output. Columns advance by UTF-16 code units; newlines start a fresh
    /// line with a generated-column reset.
    pub fn advance_bytes(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.mappings.push(';');
                self.generated.line += 1;
                self.generated.column = 0;
                self.state.generated_column = 0;
                self.line_has_mapping = false;
            } else {
                self.generated.column += ch.len_utf16() as u32;
            }
        }
    }

    /// Record that the current generated position maps to
    /// `(source, original_line, original_column)`.
    pub fn add_mapping(
        &mut self,
        source: u32,
        original_line: u32,
        original_column: u32,
        name: Option<u32>,
    ) {
        if self.line_has_mapping {
            self.mappings.push(',');
        }
        self.line_has_mapping = true;

        let gen_col_delta = self.generated.column as i32 - self.state.generated_column;
        vlq::encode_into(gen_col_delta, &mut self.mappings);
        self.state.generated_column = self.generated.column as i32;

        vlq::encode_into(source as i32 - self.state.source, &mut self.mappings);
        self.state.source = source as i32;

        vlq::encode_into(original_line as i32 - self.state.original_line, &mut self.mappings);
        self.state.original_line = original_line as i32;

        vlq::encode_into(
            original_column as i32 - self.state.original_column,
            &mut self.mappings,
        );
        self.state.original_column = original_column as i32;

        if let Some(name) = name {
            vlq::encode_into(name as i32 - self.state.name, &mut self.mappings);
            self.state.name = name as i32;
        }
    }

    #[must_use]
    pub fn generated_pos(&self) -> GeneratedPos {
        self.generated
    }

    /// Split off the finished pieces for post-hash finalization.
    #[must_use]
    pub fn into_pieces(self, file: impl Into<String>) -> SourceMapPieces {
        SourceMapPieces {
            file: file.into(),
            sources: self.sources,
            sources_content: self.sources_content,
            names: self.names,
            mappings: self.mappings,
        }
    }
}

/// The finished parts of a chunk's map, waiting for path substitution.
#[derive(Debug, Clone)]
pub struct SourceMapPieces {
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMapPieces {
    /// Apply column shifts caused by post-print substitutions and produce
    /// the final map. Each shift adjusts the first generated-column delta
    /// at or after the shifted position on its line; later mappings on the
    /// same line carry deltas and need no adjustment.
    #[must_use]
    pub fn finalize(mut self, shifts: &[SourceMapShift]) -> SourceMap {
        if !shifts.is_empty() {
            self.mappings = apply_shifts(&self.mappings, shifts);
        }
        SourceMap {
            version: 3,
            file: self.file,
            sources: self.sources,
            sources_content: self.sources_content,
            names: self.names,
            mappings: self.mappings,
        }
    }
}

fn apply_shifts(mappings: &str, shifts: &[SourceMapShift]) -> String {
    let mut sorted: Vec<SourceMapShift> = shifts.to_vec();
    sorted.sort_by_key(|s| s.before);

    let mut out = String::with_capacity(mappings.len() + shifts.len() * 2);
    let bytes = mappings.as_bytes();
    let mut i = 0;
    let mut pos = GeneratedPos::default();
    let mut column = 0i32; // running absolute generated column on this line
    let mut shift_iter = sorted.iter().peekable();
    let mut pending: i32 = 0; // column delta owed to the next segment

    while i < bytes.len() {
        match bytes[i] {
            b';' => {
                out.push(';');
                pos.line += 1;
                column = 0;
                pending = 0;
                // Shifts on lines we've passed can never apply now
                while shift_iter
                    .peek()
                    .is_some_and(|s| s.before.line < pos.line)
                {
                    shift_iter.next();
                }
                i += 1;
            }
            b',' => {
                out.push(',');
                i += 1;
            }
            _ => {
                // One segment: 1, 4, or 5 VLQ fields
                let (col_delta, used) = match vlq::decode(&bytes[i..]) {
                    Some(v) => v,
                    None => {
                        // Malformed tail: emit unchanged
                        out.push_str(&mappings[i..]);
                        break;
                    }
                };
                column += col_delta;
                // Consume any shift positioned at or before this mapping
                while let Some(shift) = shift_iter.peek() {
                    if shift.before.line == pos.line && shift.before.column as i32 <= column {
                        pending += shift.after.column as i32 - shift.before.column as i32;
                        shift_iter.next();
                    } else {
                        break;
                    }
                }
                // `column` stays in pre-substitution coordinates; the shift
                // delta is folded into the encoded delta once and every
                // later segment on the line inherits it through the chain.
                vlq::encode_into(col_delta + pending, &mut out);
                pending = 0;
                i += used;
                // Copy the remaining fields of the segment untouched
                while i < bytes.len() && bytes[i] != b',' && bytes[i] != b';' {
                    if let Some((_, n)) = vlq::decode(&bytes[i..]) {
                        out.push_str(&mappings[i..i + n]);
                        i += n;
                    } else {
                        out.push_str(&mappings[i..]);
                        i = bytes.len();
                    }
                }
            }
        }
    }
    out
}

/// Standard base64 (with padding), used for inline source map URLs.
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
        out.push(TABLE[(n >> 18) as usize & 63] as char);
        out.push(TABLE[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            TABLE[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            TABLE[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}

#[cfg(test)]
#[path = "../tests/source_map.rs"]
mod tests;
