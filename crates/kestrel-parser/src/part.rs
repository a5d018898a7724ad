//! Parts: the unit of tree shaking.
//!
//! A file's top-level statements are split into groups that must live or
//! die together. Liveness propagates along part dependencies; a part that
//! is never reached from an entry part is dropped at emit time.

use crate::ast::Stmt;
use crate::symbols::Ref;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// An edge to another part: `(source_index, part_index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartRef {
    pub source: u32,
    pub part: u32,
}

#[derive(Debug, Default)]
pub struct Part {
    pub stmts: Vec<Stmt>,
    /// Symbols this part reads, with an occurrence count.
    pub symbol_uses: FxHashMap<Ref, u32>,
    /// Top-level symbols this part declares.
    pub declared_symbols: Vec<Ref>,
    /// Import records referenced from this part.
    pub import_record_indices: Vec<u32>,
    /// Cross-part dependencies, filled in by the linker.
    pub dependencies: SmallVec<[PartRef; 4]>,
    /// Side-effecting statements keep their part alive unconditionally.
    pub can_be_removed_if_unused: bool,
    /// Tree-shake result; set by the linker.
    pub is_live: bool,
}

impl Part {
    #[must_use]
    pub fn new(stmts: Vec<Stmt>) -> Part {
        Part {
            stmts,
            ..Part::default()
        }
    }

    pub fn add_symbol_use(&mut self, r: Ref) {
        *self.symbol_uses.entry(r).or_insert(0) += 1;
    }

    pub fn add_dependency(&mut self, dep: PartRef) {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }
}
