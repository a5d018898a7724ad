//! The symbol model.
//!
//! A symbol is addressed by a `(source_index, inner_index)` pair. Each
//! file's parser appends symbols to its own inner array; after the scan
//! barrier the driver assembles the outer array, so no locked central map
//! is ever needed.
//!
//! Cross-file merges use the `link` field as a union-find parent. Once a
//! symbol's `link` is set, every use must funnel through [`SymbolMap::follow`],
//! which path-compresses to the terminal. The linker runs
//! [`SymbolMap::follow_all`] once, serially, before exposing the table to
//! parallel readers.

use bitflags::bitflags;
use kestrel_common::SourceIndex;

/// A stable handle for one symbol: `(source_index, inner_index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    pub source: u32,
    pub inner: u32,
}

impl Ref {
    pub const INVALID: Ref = Ref {
        source: u32::MAX,
        inner: u32::MAX,
    };

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.source != u32::MAX || self.inner != u32::MAX
    }

    #[must_use]
    pub const fn new(source: SourceIndex, inner: u32) -> Ref {
        Ref {
            source: source.0,
            inner,
        }
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.inner)
    }
}

/// What kind of declaration produced a symbol. The kind picks the minifier
/// slot namespace and drives a handful of lowering decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymbolKind {
    /// A reference that never resolved to a declaration.
    #[default]
    Unbound,
    /// `var` or top-level binding, hoisted to the enclosing function scope.
    Hoisted,
    HoistedFunction,
    /// The identifier of a simple `catch (e)` clause.
    CatchIdentifier,
    GeneratorOrAsyncFunction,
    /// The implicit `arguments` object.
    Arguments,
    Class,
    PrivateField,
    PrivateMethod,
    PrivateGet,
    PrivateSet,
    PrivateGetSetPair,
    PrivateStaticField,
    PrivateStaticMethod,
    PrivateStaticGet,
    PrivateStaticSet,
    PrivateStaticGetSetPair,
    Label,
    TsEnum,
    TsNamespace,
    Import,
    Const,
    /// Synthesized by a lowering pass (temporaries, helpers).
    Injected,
    MangledProp,
    GlobalCss,
    LocalCss,
    Other,
}

impl SymbolKind {
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(
            self,
            SymbolKind::PrivateField
                | SymbolKind::PrivateMethod
                | SymbolKind::PrivateGet
                | SymbolKind::PrivateSet
                | SymbolKind::PrivateGetSetPair
                | SymbolKind::PrivateStaticField
                | SymbolKind::PrivateStaticMethod
                | SymbolKind::PrivateStaticGet
                | SymbolKind::PrivateStaticSet
                | SymbolKind::PrivateStaticGetSetPair
        )
    }

    #[must_use]
    pub const fn is_hoisted(self) -> bool {
        matches!(self, SymbolKind::Hoisted | SymbolKind::HoistedFunction)
    }

    /// The minifier slot namespace for this kind.
    #[must_use]
    pub fn slot_namespace(self) -> SlotNamespace {
        match self {
            SymbolKind::Unbound => SlotNamespace::None,
            SymbolKind::Label => SlotNamespace::Label,
            SymbolKind::MangledProp => SlotNamespace::MangledProp,
            _ if self.is_private() => SlotNamespace::PrivateName,
            _ => SlotNamespace::Default,
        }
    }
}

/// Minified names are assigned per scope, per namespace, so a label and a
/// variable in the same scope can share the short name `a`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotNamespace {
    None,
    Default,
    Label,
    PrivateName,
    MangledProp,
}

impl SlotNamespace {
    pub const COUNT: usize = 4;

    /// Index into per-scope slot counters; `None` has no index.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            SlotNamespace::None => None,
            SlotNamespace::Default => Some(0),
            SlotNamespace::Label => Some(1),
            SlotNamespace::PrivateName => Some(2),
            SlotNamespace::MangledProp => Some(3),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SymbolFlags: u16 {
        const MUST_NOT_BE_RENAMED                     = 1 << 0;
        /// JSX tag-kind invariant: a renamed component must stay uppercase.
        const MUST_START_WITH_CAPITAL_LETTER_FOR_JSX  = 1 << 1;
        const DID_KEEP_NAME                           = 1 << 2;
        const PRIVATE_SYMBOL_MUST_BE_LOWERED          = 1 << 3;
        const REMOVE_OVERWRITTEN_FUNCTION_DECLARATION = 1 << 4;
        const WAS_EXPORTED                            = 1 << 5;
        const IS_EMPTY_FUNCTION                       = 1 << 6;
        const IS_IDENTITY_FUNCTION                    = 1 << 7;
        const CALL_CAN_BE_UNWRAPPED_IF_UNUSED         = 1 << 8;
        const COULD_POTENTIALLY_BE_MUTATED            = 1 << 9;
    }
}

/// Import bindings that print as a property access keep the alias here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceAlias {
    pub namespace_ref: Ref,
    pub alias: String,
}

#[derive(Clone, Debug, Default)]
pub struct Symbol {
    pub original_name: String,
    pub kind: SymbolKind,
    pub flags: SymbolFlags,
    /// An estimate: not exact after dead-code elimination, good enough to
    /// bias the minifier.
    pub use_count_estimate: u32,
    /// Union-find parent for merged symbols; `Ref::INVALID` = terminal.
    pub link: Ref,
    /// When set, the printer emits `namespace.alias` instead of the name.
    pub namespace_alias: Option<NamespaceAlias>,
    /// Chunk the symbol was assigned to, for cross-chunk imports.
    pub chunk_index: Option<u32>,
    /// Slot selecting the minified name, assigned per nested scope.
    pub nested_scope_slot: Option<u32>,
}

impl Default for Ref {
    fn default() -> Self {
        Ref::INVALID
    }
}

impl Symbol {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Symbol {
        Symbol {
            original_name: name.into(),
            kind,
            ..Symbol::default()
        }
    }

    #[must_use]
    pub fn must_not_be_renamed(&self) -> bool {
        self.flags.contains(SymbolFlags::MUST_NOT_BE_RENAMED)
            || matches!(self.kind, SymbolKind::Unbound | SymbolKind::GlobalCss)
    }
}

/// The global two-level symbol table: outer index is the source, inner
/// arrays come from the per-file parsers unchanged.
#[derive(Debug, Default)]
pub struct SymbolMap {
    pub outer: Vec<Vec<Symbol>>,
}

impl SymbolMap {
    #[must_use]
    pub fn new(source_count: usize) -> SymbolMap {
        SymbolMap {
            outer: vec![Vec::new(); source_count],
        }
    }

    /// Install one file's symbols. Called once per source at the barrier.
    pub fn set_file(&mut self, source: SourceIndex, symbols: Vec<Symbol>) {
        if source.index() >= self.outer.len() {
            self.outer.resize(source.index() + 1, Vec::new());
        }
        self.outer[source.index()] = symbols;
    }

    #[must_use]
    pub fn get(&self, r: Ref) -> &Symbol {
        &self.outer[r.source as usize][r.inner as usize]
    }

    pub fn get_mut(&mut self, r: Ref) -> &mut Symbol {
        &mut self.outer[r.source as usize][r.inner as usize]
    }

    /// Walk `link` chains with in-place path compression. Only the linker
    /// thread may call this; parallel readers use [`SymbolMap::follow_read`]
    /// after [`SymbolMap::follow_all`] has materialised terminals.
    pub fn follow(&mut self, r: Ref) -> Ref {
        let link = self.get(r).link;
        if !link.is_valid() {
            return r;
        }
        let terminal = self.follow(link);
        if terminal != link {
            self.get_mut(r).link = terminal;
        }
        terminal
    }

    /// Read-only follow for use after `follow_all`. At that point every
    /// chain is at most one hop, so no compression is needed.
    #[must_use]
    pub fn follow_read(&self, r: Ref) -> Ref {
        let mut current = r;
        loop {
            let link = self.get(current).link;
            if !link.is_valid() {
                return current;
            }
            current = link;
        }
    }

    /// Path-compress every chain so parallel readers see one-hop links.
    pub fn follow_all(&mut self) {
        for source in 0..self.outer.len() {
            for inner in 0..self.outer[source].len() {
                let r = Ref {
                    source: source as u32,
                    inner: inner as u32,
                };
                self.follow(r);
            }
        }
    }

    /// Merge `old` into `new`: afterwards both denote the entity of `new`.
    /// Use counts are summed and rename constraints propagate.
    pub fn merge(&mut self, old: Ref, new: Ref) -> Ref {
        let old = self.follow(old);
        let new = self.follow(new);
        if old == new {
            return new;
        }
        let old_symbol = self.get(old).clone();
        {
            let new_symbol = self.get_mut(new);
            new_symbol.use_count_estimate += old_symbol.use_count_estimate;
            let carried = old_symbol.flags
                & (SymbolFlags::MUST_NOT_BE_RENAMED
                    | SymbolFlags::MUST_START_WITH_CAPITAL_LETTER_FOR_JSX);
            new_symbol.flags |= carried;
        }
        self.get_mut(old).link = new;
        new
    }
}

#[cfg(test)]
#[path = "../tests/symbols_unit_tests.rs"]
mod tests;
