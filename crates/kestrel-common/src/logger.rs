//! The diagnostics log.
//!
//! Build problems are collected as messages, not returned as `Err`: a failed
//! parse still produces a stub module so downstream diagnostics stay useful.
//! The log is append-only and lock-protected so every pipeline stage can
//! write to it concurrently.

use crate::span::Span;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MsgKind {
    Verbose,
    Debug,
    Note,
    Warning,
    Error,
}

impl MsgKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MsgKind::Verbose => "verbose",
            MsgKind::Debug => "debug",
            MsgKind::Note => "note",
            MsgKind::Warning => "warning",
            MsgKind::Error => "error",
        }
    }
}

/// Resolved location of a message: file plus 0-based line and UTF-16 column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MsgLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub length: u32,
    /// The text of the offending line, for caret rendering.
    pub line_text: String,
}

/// Extra context attached to a message, pointing at a second location.
#[derive(Clone, Debug, Default)]
pub struct Note {
    pub text: String,
    pub location: Option<MsgLocation>,
}

/// One diagnostic.
#[derive(Clone, Debug, Default)]
pub struct Msg {
    pub kind: MsgKind,
    pub text: String,
    pub location: Option<MsgLocation>,
    pub notes: Vec<Note>,
    /// Stable sort key: the source index the message originated from, used
    /// to order messages deterministically regardless of scheduling.
    pub sort_key: u32,
    pub span: Span,
}

impl Default for MsgKind {
    fn default() -> Self {
        MsgKind::Error
    }
}

/// Append-only, thread-safe diagnostics collection.
pub struct Log {
    msgs: Mutex<Vec<Msg>>,
    errors: AtomicUsize,
    warnings: AtomicUsize,
    /// Messages beyond this count are dropped (0 = unlimited).
    limit: usize,
}

impl Default for Log {
    fn default() -> Self {
        Log::new()
    }
}

impl Log {
    #[must_use]
    pub fn new() -> Self {
        Log {
            msgs: Mutex::new(Vec::new()),
            errors: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
            limit: 0,
        }
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Log {
            limit,
            ..Log::new()
        }
    }

    pub fn add_msg(&self, msg: Msg) {
        match msg.kind {
            MsgKind::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            MsgKind::Warning => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        let mut msgs = self.msgs.lock().unwrap();
        if self.limit == 0 || msgs.len() < self.limit {
            msgs.push(msg);
        }
    }

    pub fn add_error(&self, source: u32, span: Span, text: impl Into<String>) {
        self.add_msg(Msg {
            kind: MsgKind::Error,
            text: text.into(),
            location: None,
            notes: Vec::new(),
            sort_key: source,
            span,
        });
    }

    pub fn add_error_with_notes(
        &self,
        source: u32,
        span: Span,
        text: impl Into<String>,
        notes: Vec<Note>,
    ) {
        self.add_msg(Msg {
            kind: MsgKind::Error,
            text: text.into(),
            location: None,
            notes,
            sort_key: source,
            span,
        });
    }

    pub fn add_warning(&self, source: u32, span: Span, text: impl Into<String>) {
        self.add_msg(Msg {
            kind: MsgKind::Warning,
            text: text.into(),
            location: None,
            notes: Vec::new(),
            sort_key: source,
            span,
        });
    }

    pub fn add_debug(&self, source: u32, span: Span, text: impl Into<String>) {
        self.add_msg(Msg {
            kind: MsgKind::Debug,
            text: text.into(),
            location: None,
            notes: Vec::new(),
            sort_key: source,
            span,
        });
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.load(Ordering::Relaxed) > 0
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    /// Drain all messages in deterministic order: by originating source,
    /// then span start, then text.
    #[must_use]
    pub fn take_msgs(&self) -> Vec<Msg> {
        let mut msgs = std::mem::take(&mut *self.msgs.lock().unwrap());
        msgs.sort_by(|a, b| {
            (a.sort_key, a.span.start, &a.text).cmp(&(b.sort_key, b.span.start, &b.text))
        });
        msgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_counts() {
        let log = Log::new();
        log.add_error(0, Span::new(0, 1), "boom");
        log.add_warning(0, Span::new(2, 3), "careful");
        assert!(log.has_errors());
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_take_msgs_is_sorted() {
        let log = Log::new();
        log.add_error(2, Span::new(0, 1), "c");
        log.add_error(0, Span::new(5, 6), "b");
        log.add_error(0, Span::new(1, 2), "a");
        let msgs = log.take_msgs();
        let texts: Vec<&str> = msgs.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_limit_drops_overflow() {
        let log = Log::with_limit(1);
        log.add_error(0, Span::new(0, 1), "kept");
        log.add_error(0, Span::new(1, 2), "dropped");
        assert_eq!(log.take_msgs().len(), 1);
        // The error count still reflects every error
        assert_eq!(log.error_count(), 2);
    }
}
