//! Import records.
//!
//! Every dependency edge a file can have — `import`, `require`, dynamic
//! `import()`, `require.resolve`, CSS `@import`, `composes: ... from`, and
//! `url(...)` — becomes one record in the file's indexed vector. The scan
//! driver resolves records; the linker reads them.

use bitflags::bitflags;
use kestrel_common::{SourceIndex, Span};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// An entry point provided by the user.
    EntryPoint,
    /// `import ... from "path"` / `export ... from "path"`
    Stmt,
    /// `require("path")`
    Require,
    /// `import("path")`
    Dynamic,
    /// `require.resolve("path")`
    RequireResolve,
    /// CSS `@import "path"`
    AtImport,
    /// CSS modules `composes: name from "path"`
    ComposesFrom,
    /// CSS `url(path)`
    UrlToken,
}

impl ImportKind {
    /// Records of these kinds pull the target into the module graph.
    #[must_use]
    pub const fn is_from_css(self) -> bool {
        matches!(
            self,
            ImportKind::AtImport | ImportKind::ComposesFrom | ImportKind::UrlToken
        )
    }

    #[must_use]
    pub const fn must_resolve_to_css(self) -> bool {
        matches!(self, ImportKind::AtImport | ImportKind::ComposesFrom)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ImportRecordFlags: u32 {
        /// A TypeScript type-only import that compiles away.
        const IS_UNUSED                      = 1 << 0;
        const CONTAINS_IMPORT_STAR           = 1 << 1;
        const CONTAINS_DEFAULT_ALIAS         = 1 << 2;
        const CONTAINS_ES_MODULE_ALIAS       = 1 << 3;
        const CALLS_RUN_TIME_RE_EXPORT_FN    = 1 << 4;
        /// Wrap the require result in `__toESM(...)`.
        const WRAP_WITH_TO_ESM               = 1 << 5;
        /// Wrap the namespace in `__toCommonJS(...)`.
        const WRAP_WITH_TO_CJS               = 1 << 6;
        const CALL_RUNTIME_REQUIRE           = 1 << 7;
        /// The import site catches errors (`try { require(...) }`), so a
        /// resolve failure demotes to a debug note.
        const HANDLES_IMPORT_ERRORS          = 1 << 8;
        const WAS_ORIGINALLY_BARE_IMPORT     = 1 << 9;
        const IS_EXTERNAL_WITHOUT_SIDE_EFFECTS = 1 << 10;
        const ASSERT_TYPE_JSON               = 1 << 11;
        const WAS_LOADED_WITH_EMPTY_LOADER   = 1 << 12;
        const CONTAINS_UNIQUE_KEY            = 1 << 13;
    }
}

/// One `with { key: "value" }` attribute on an import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct ImportRecord {
    /// The path as written, before resolution.
    pub path: String,
    /// Namespace of the resolved path ("file" unless a plugin says else).
    pub namespace: String,
    pub range: Span,
    pub kind: ImportKind,
    pub flags: ImportRecordFlags,
    /// `with`/`assert` clause entries, if present.
    pub attributes: Vec<ImportAttribute>,
    /// Original glob pattern for `import(`./pages/${x}`)`-style records.
    pub glob_pattern: Option<String>,
    /// Valid iff the import resolved to something inside the bundle.
    pub source_index: Option<SourceIndex>,
    /// For the copy loader: the index of the copied file.
    pub copy_source_index: Option<SourceIndex>,
}

impl ImportRecord {
    #[must_use]
    pub fn new(path: impl Into<String>, range: Span, kind: ImportKind) -> ImportRecord {
        ImportRecord {
            path: path.into(),
            namespace: String::new(),
            range,
            kind,
            flags: ImportRecordFlags::default(),
            attributes: Vec::new(),
            glob_pattern: None,
            source_index: None,
            copy_source_index: None,
        }
    }

    /// Whether the record points inside the bundle (resolved, not external).
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.source_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let record = ImportRecord::new("./a", Span::new(0, 4), ImportKind::Stmt);
        assert!(!record.is_internal());
        assert!(record.flags.is_empty());
        assert!(record.attributes.is_empty());
    }

    #[test]
    fn test_css_kinds() {
        assert!(ImportKind::AtImport.is_from_css());
        assert!(ImportKind::AtImport.must_resolve_to_css());
        assert!(ImportKind::UrlToken.is_from_css());
        assert!(!ImportKind::UrlToken.must_resolve_to_css());
        assert!(!ImportKind::Stmt.is_from_css());
    }
}
