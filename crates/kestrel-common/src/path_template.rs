//! Output path templates.
//!
//! Chunk and asset paths are configured as templates with `[dir]`, `[name]`,
//! `[hash]` and `[ext]` placeholders. Substitution happens in that order and
//! may be partial: `[hash]` is typically filled in last, after chunk
//! contents exist.

/// One piece of a template: literal text optionally followed by a
/// placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    None,
    Dir,
    Name,
    Hash,
    Ext,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplatePart {
    pub literal: String,
    pub placeholder: Placeholder,
}

/// A parsed output path template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathTemplate {
    pub parts: Vec<TemplatePart>,
}

impl PathTemplate {
    /// Parse a template string. Unknown bracketed names are kept as
    /// literal text.
    #[must_use]
    pub fn parse(text: &str) -> PathTemplate {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        while let Some(open) = rest.find('[') {
            let Some(close) = rest[open..].find(']') else {
                break;
            };
            let placeholder = match &rest[open..open + close + 1] {
                "[dir]" => Placeholder::Dir,
                "[name]" => Placeholder::Name,
                "[hash]" => Placeholder::Hash,
                "[ext]" => Placeholder::Ext,
                _ => {
                    literal.push_str(&rest[..open + close + 1]);
                    rest = &rest[open + close + 1..];
                    continue;
                }
            };
            literal.push_str(&rest[..open]);
            parts.push(TemplatePart {
                literal: std::mem::take(&mut literal),
                placeholder,
            });
            rest = &rest[open + close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() || parts.is_empty() {
            parts.push(TemplatePart {
                literal,
                placeholder: Placeholder::None,
            });
        }
        PathTemplate { parts }
    }

    /// Substitute the given placeholders, producing a new template whose
    /// remaining parts are only the ones not substituted. Adjacent literal
    /// parts merge.
    #[must_use]
    pub fn substitute(
        &self,
        dir: Option<&str>,
        name: Option<&str>,
        hash: Option<&str>,
        ext: Option<&str>,
    ) -> PathTemplate {
        let mut parts: Vec<TemplatePart> = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let replacement = match part.placeholder {
                Placeholder::Dir => dir,
                Placeholder::Name => name,
                Placeholder::Hash => hash,
                Placeholder::Ext => ext,
                Placeholder::None => None,
            };
            match replacement {
                Some(text) => {
                    // Placeholder collapses into literal text
                    let mut merged = part.literal.clone();
                    merged.push_str(text);
                    match parts.last_mut() {
                        Some(last) if last.placeholder == Placeholder::None => {
                            last.literal.push_str(&merged);
                        }
                        _ => parts.push(TemplatePart {
                            literal: merged,
                            placeholder: Placeholder::None,
                        }),
                    }
                }
                None => match parts.last_mut() {
                    Some(last)
                        if last.placeholder == Placeholder::None
                            && part.placeholder == Placeholder::None =>
                    {
                        last.literal.push_str(&part.literal);
                    }
                    _ => parts.push(part.clone()),
                },
            }
        }
        if parts.is_empty() {
            parts.push(TemplatePart {
                literal: String::new(),
                placeholder: Placeholder::None,
            });
        }
        PathTemplate { parts }
    }

    /// Whether any placeholder is still unsubstituted.
    #[must_use]
    pub fn has_placeholder(&self, placeholder: Placeholder) -> bool {
        self.parts.iter().any(|p| p.placeholder == placeholder)
    }

    /// Render assuming every placeholder has been substituted. Remaining
    /// placeholders render as empty.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            out.push_str(&part.literal);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let t = PathTemplate::parse("[dir]/[name]-[hash].[ext]");
        assert_eq!(t.parts.len(), 4);
        let done = t.substitute(Some("out"), Some("app"), Some("ABCD1234"), Some("js"));
        assert_eq!(done.render(), "out/app-ABCD1234.js");
        assert_eq!(done.parts.len(), 1);
    }

    #[test]
    fn test_partial_substitution_keeps_hash() {
        let t = PathTemplate::parse("[dir]/[name]-[hash].js");
        let partial = t.substitute(Some("dist"), Some("entry"), None, None);
        assert!(partial.has_placeholder(Placeholder::Hash));
        assert!(!partial.has_placeholder(Placeholder::Name));
        let done = partial.substitute(None, None, Some("XYZ"), None);
        assert_eq!(done.render(), "dist/entry-XYZ.js");
    }

    #[test]
    fn test_unknown_placeholder_is_literal() {
        let t = PathTemplate::parse("[nope]/[name]");
        let done = t.substitute(None, Some("x"), None, None);
        assert_eq!(done.render(), "[nope]/x");
    }

    #[test]
    fn test_adjacent_literals_merge() {
        let t = PathTemplate::parse("a[name]b");
        let done = t.substitute(None, Some("-"), None, None);
        assert_eq!(done.parts.len(), 1);
        assert_eq!(done.render(), "a-b");
    }
}
