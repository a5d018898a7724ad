//! Content loaders.
//!
//! The loader decides how a file's bytes become a module: parsed as
//! JavaScript/TypeScript/CSS, wrapped as a JSON or text export, turned into
//! a URL, or copied through unchanged.

/// How the contents of a source file are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Loader {
    /// Pick by file extension at resolve time.
    #[default]
    Default,
    Js,
    Jsx,
    Ts,
    /// TypeScript where `<T>x` casts are invalid (`.mts`/`.cts`).
    TsNoAmbiguousLessThan,
    Tsx,
    Json,
    Css,
    /// Exports the file contents as a string.
    Text,
    /// Exports the file contents base64-encoded.
    Base64,
    /// Exports a `data:` URL holding the file contents.
    DataUrl,
    /// Exports the output path of the copied file.
    File,
    Binary,
    /// Copies the file to the output directory without a JS wrapper.
    Copy,
    /// Produces an empty module.
    None,
}

impl Loader {
    #[must_use]
    pub const fn is_typescript(self) -> bool {
        matches!(self, Loader::Ts | Loader::TsNoAmbiguousLessThan | Loader::Tsx)
    }

    #[must_use]
    pub const fn is_jsx(self) -> bool {
        matches!(self, Loader::Jsx | Loader::Tsx)
    }

    #[must_use]
    pub const fn is_css(self) -> bool {
        matches!(self, Loader::Css)
    }

    /// Whether output produced from this loader can carry a source map.
    #[must_use]
    pub const fn can_have_source_map(self) -> bool {
        matches!(
            self,
            Loader::Js
                | Loader::Jsx
                | Loader::Ts
                | Loader::TsNoAmbiguousLessThan
                | Loader::Tsx
                | Loader::Css
        )
    }

    /// Default loader for a file extension, used when the loader is `Default`.
    #[must_use]
    pub fn from_extension(ext: &str) -> Loader {
        match ext {
            // module-ness comes from the graph, not the extension
            "js" | "cjs" | "mjs" => Loader::Js,
            "jsx" => Loader::Jsx,
            "ts" => Loader::Ts,
            "mts" | "cts" => Loader::TsNoAmbiguousLessThan,
            "tsx" => Loader::Tsx,
            "json" => Loader::Json,
            "css" => Loader::Css,
            "txt" => Loader::Text,
            _ => Loader::Js,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typescript_loaders() {
        assert!(Loader::Ts.is_typescript());
        assert!(Loader::TsNoAmbiguousLessThan.is_typescript());
        assert!(Loader::Tsx.is_typescript());
        assert!(!Loader::Js.is_typescript());
        assert!(!Loader::Jsx.is_typescript());
    }

    #[test]
    fn test_source_map_capable() {
        assert!(Loader::Js.can_have_source_map());
        assert!(Loader::Css.can_have_source_map());
        assert!(!Loader::Json.can_have_source_map());
        assert!(!Loader::Copy.can_have_source_map());
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(Loader::from_extension("mts"), Loader::TsNoAmbiguousLessThan);
        assert_eq!(Loader::from_extension("tsx"), Loader::Tsx);
        assert_eq!(Loader::from_extension("css"), Loader::Css);
    }
}
