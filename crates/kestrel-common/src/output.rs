//! Output formats and source-map modes.

/// The module format of emitted chunks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Keep the input's import/export syntax untouched.
    Preserve,
    /// Immediately-invoked function expression, optionally assigned to a
    /// dotted global name.
    Iife,
    /// CommonJS: `module.exports = exports`.
    Cjs,
    /// ES modules: `export { ... }`.
    #[default]
    Esm,
}

impl OutputFormat {
    /// Whether the format keeps ESM import/export syntax, which is what
    /// top-level await requires.
    #[must_use]
    pub const fn keeps_esm_syntax(self) -> bool {
        matches!(self, OutputFormat::Esm | OutputFormat::Preserve)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceMapMode {
    #[default]
    None,
    /// Inline `sourceMappingURL` data URL at the end of the file.
    Inline,
    /// Separate `.map` file plus a linking comment.
    LinkedWithComment,
    /// Separate `.map` file, no comment.
    ExternalWithoutComment,
    /// Both inline and a separate file.
    InlineAndExternal,
}

impl SourceMapMode {
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, SourceMapMode::None)
    }

    #[must_use]
    pub const fn writes_external_file(self) -> bool {
        matches!(
            self,
            SourceMapMode::LinkedWithComment
                | SourceMapMode::ExternalWithoutComment
                | SourceMapMode::InlineAndExternal
        )
    }

    #[must_use]
    pub const fn writes_inline(self) -> bool {
        matches!(self, SourceMapMode::Inline | SourceMapMode::InlineAndExternal)
    }

    #[must_use]
    pub const fn writes_comment(self) -> bool {
        matches!(self, SourceMapMode::LinkedWithComment)
    }
}
