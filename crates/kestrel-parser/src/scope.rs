//! The lexical scope tree.
//!
//! Scopes are built during parsing and consulted by the binding pass and
//! the minifier's slot assignment. Each scope remembers *why* it is strict,
//! because several diagnostics only fire for particular strict-mode
//! provenances.

use crate::symbols::Ref;
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Block,
    With,
    Label,
    ClassName,
    ClassBody,
    ClassStaticInit,
    CatchBinding,
    FunctionArgs,
    FunctionBody,
}

impl ScopeKind {
    /// `var` and function declarations hoist up to the nearest scope of
    /// one of these kinds.
    #[must_use]
    pub const fn stops_hoisting(self) -> bool {
        matches!(
            self,
            ScopeKind::Module
                | ScopeKind::FunctionArgs
                | ScopeKind::FunctionBody
                | ScopeKind::ClassStaticInit
        )
    }
}

/// Where a scope's strictness came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrictMode {
    #[default]
    Sloppy,
    ExplicitUseStrict,
    ImplicitStrictClass,
    ImplicitStrictTsAlwaysStrict,
    ImplicitStrictJsxAutoRuntime,
    ImplicitStrictEsm,
}

impl StrictMode {
    #[inline]
    #[must_use]
    pub const fn is_strict(self) -> bool {
        !matches!(self, StrictMode::Sloppy)
    }
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Declared names, in declaration order for determinism.
    pub members: FxHashMap<String, Ref>,
    /// Refs introduced by lowering passes after parse time.
    pub generated: Vec<Ref>,
    pub strict_mode: StrictMode,
    /// For `Label` scopes: the label's symbol.
    pub label_ref: Ref,
}

/// All scopes of one file, index 0 is the module scope.
#[derive(Debug)]
pub struct ScopeTree {
    pub scopes: Vec<Scope>,
}

impl ScopeTree {
    #[must_use]
    pub fn new(module_strict: StrictMode) -> ScopeTree {
        ScopeTree {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                parent: None,
                children: Vec::new(),
                members: FxHashMap::default(),
                generated: Vec::new(),
                strict_mode: module_strict,
                label_ref: Ref::INVALID,
            }],
        }
    }

    pub fn push(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let strict_mode = match kind {
            ScopeKind::ClassName | ScopeKind::ClassBody | ScopeKind::ClassStaticInit => {
                let inherited = self.scopes[parent.index()].strict_mode;
                if inherited.is_strict() {
                    inherited
                } else {
                    StrictMode::ImplicitStrictClass
                }
            }
            _ => self.scopes[parent.index()].strict_mode,
        };
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            members: FxHashMap::default(),
            generated: Vec::new(),
            strict_mode,
            label_ref: Ref::INVALID,
        });
        self.scopes[parent.index()].children.push(id);
        id
    }

    #[must_use]
    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// Resolve a name by walking up the scope chain.
    #[must_use]
    pub fn lookup(&self, mut scope: ScopeId, name: &str) -> Option<Ref> {
        loop {
            let s = self.get(scope);
            if let Some(&r) = s.members.get(name) {
                return Some(r);
            }
            scope = s.parent?;
        }
    }

    /// The nearest enclosing scope that stops `var` hoisting.
    #[must_use]
    pub fn hoist_target(&self, mut scope: ScopeId) -> ScopeId {
        loop {
            if self.get(scope).kind.stops_hoisting() {
                return scope;
            }
            match self.get(scope).parent {
                Some(parent) => scope = parent,
                None => return scope,
            }
        }
    }

    /// Whether any scope on the chain is a `with` scope, which disables
    /// minification-safe renaming of free identifiers.
    #[must_use]
    pub fn inside_with(&self, mut scope: ScopeId) -> bool {
        loop {
            let s = self.get(scope);
            if s.kind == ScopeKind::With {
                return true;
            }
            match s.parent {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Ref;

    #[test]
    fn test_lookup_walks_chain() {
        let mut tree = ScopeTree::new(StrictMode::ImplicitStrictEsm);
        let inner = tree.push(ScopeId::ROOT, ScopeKind::Block);
        let r = Ref { source: 0, inner: 7 };
        tree.get_mut(ScopeId::ROOT).members.insert("x".into(), r);
        assert_eq!(tree.lookup(inner, "x"), Some(r));
        assert_eq!(tree.lookup(inner, "y"), None);
    }

    #[test]
    fn test_shadowing() {
        let mut tree = ScopeTree::new(StrictMode::Sloppy);
        let inner = tree.push(ScopeId::ROOT, ScopeKind::Block);
        let outer_ref = Ref { source: 0, inner: 1 };
        let inner_ref = Ref { source: 0, inner: 2 };
        tree.get_mut(ScopeId::ROOT).members.insert("x".into(), outer_ref);
        tree.get_mut(inner).members.insert("x".into(), inner_ref);
        assert_eq!(tree.lookup(inner, "x"), Some(inner_ref));
        assert_eq!(tree.lookup(ScopeId::ROOT, "x"), Some(outer_ref));
    }

    #[test]
    fn test_hoist_target_skips_blocks() {
        let mut tree = ScopeTree::new(StrictMode::Sloppy);
        let args = tree.push(ScopeId::ROOT, ScopeKind::FunctionArgs);
        let body = tree.push(args, ScopeKind::FunctionBody);
        let block = tree.push(body, ScopeKind::Block);
        let deeper = tree.push(block, ScopeKind::Block);
        assert_eq!(tree.hoist_target(deeper), body);
        assert_eq!(tree.hoist_target(ScopeId::ROOT), ScopeId::ROOT);
    }

    #[test]
    fn test_class_scope_is_implicitly_strict() {
        let mut tree = ScopeTree::new(StrictMode::Sloppy);
        let class_body = tree.push(ScopeId::ROOT, ScopeKind::ClassBody);
        assert_eq!(
            tree.get(class_body).strict_mode,
            StrictMode::ImplicitStrictClass
        );
        assert!(tree.get(class_body).strict_mode.is_strict());
    }

    #[test]
    fn test_with_detection() {
        let mut tree = ScopeTree::new(StrictMode::Sloppy);
        let with = tree.push(ScopeId::ROOT, ScopeKind::With);
        let inner = tree.push(with, ScopeKind::Block);
        assert!(tree.inside_with(inner));
        assert!(!tree.inside_with(ScopeId::ROOT));
    }
}
