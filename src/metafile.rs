//! The metafile: a JSON description of inputs, outputs, imports and byte
//! sizes, deterministic given the same inputs.

use kestrel_common::SourceIndex;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct MetafileInputImport {
    pub path: String,
    pub kind: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

#[derive(Debug, Serialize)]
pub struct MetafileInput {
    pub bytes: usize,
    pub imports: Vec<MetafileInputImport>,
}

#[derive(Debug, Serialize)]
pub struct MetafileOutputInput {
    #[serde(rename = "bytesInOutput")]
    pub bytes_in_output: usize,
}

#[derive(Debug, Serialize)]
pub struct MetafileOutput {
    pub bytes: usize,
    /// Input path -> contribution, sorted for determinism.
    pub inputs: BTreeMap<String, MetafileOutputInput>,
    #[serde(rename = "entryPoint", skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct Metafile {
    pub inputs: BTreeMap<String, MetafileInput>,
    pub outputs: BTreeMap<String, MetafileOutput>,
}

impl Metafile {
    pub fn add_input(
        &mut self,
        path: impl Into<String>,
        bytes: usize,
        imports: Vec<MetafileInputImport>,
    ) {
        self.inputs.insert(path.into(), MetafileInput { bytes, imports });
    }

    pub fn add_output(
        &mut self,
        path: impl Into<String>,
        bytes: usize,
        inputs: BTreeMap<String, MetafileOutputInput>,
        entry_point: Option<String>,
    ) {
        self.outputs.insert(
            path.into(),
            MetafileOutput {
                bytes,
                inputs,
                entry_point,
            },
        );
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Import kinds rendered the way the metafile names them.
#[must_use]
pub fn import_kind_name(kind: kestrel_parser::ImportKind) -> &'static str {
    use kestrel_parser::ImportKind;
    match kind {
        ImportKind::EntryPoint => "entry-point",
        ImportKind::Stmt => "import-statement",
        ImportKind::Require => "require-call",
        ImportKind::Dynamic => "dynamic-import",
        ImportKind::RequireResolve => "require-resolve",
        ImportKind::AtImport => "import-rule",
        ImportKind::ComposesFrom => "composes-from",
        ImportKind::UrlToken => "url-token",
    }
}

/// Which sources feed an output chunk (used for the per-output input map).
#[must_use]
pub fn chunk_input_paths(files: &[SourceIndex], paths: &[String]) -> Vec<String> {
    files
        .iter()
        .filter_map(|s| paths.get(s.index()).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metafile_is_deterministic_json() {
        let mut meta = Metafile::default();
        meta.add_input(
            "b.js",
            10,
            vec![MetafileInputImport {
                path: "a.js".to_string(),
                kind: "import-statement".to_string(),
                external: false,
            }],
        );
        meta.add_input("a.js", 5, Vec::new());
        let json = meta.to_json();
        // BTreeMap ordering puts a.js first regardless of insertion order
        let a = json.find("\"a.js\"").unwrap();
        let b = json.find("\"b.js\"").unwrap();
        assert!(a < b);
        assert!(json.contains("\"bytes\": 5"));
    }
}
