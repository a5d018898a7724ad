//! Lexers for the kestrel bundler.
//!
//! Two tokenizers live here:
//! - `js`: ECMAScript 2022+ with TypeScript and JSX extensions
//! - `css`: CSS Syntax Level 3
//!
//! Both follow the same failure model: a lexical error becomes a log entry
//! with a source range and the lexer substitutes a replacement token, so a
//! single bad byte cannot take down the whole parse.

pub mod js;
pub use js::{Lexer, TokenKind};

pub mod css;
pub use css::{CssToken, CssTokenKind};
