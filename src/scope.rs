//! The scope tree (§3 "Scope"): nested `Global`/`Namespace`/`Func`/`Local`
//! scopes, each an ordered name→symbol mapping with a parent pointer.
//!
//! Scopes are allocated in the same arena as symbols and types so that a
//! `Scope`'s parent, and a namespace-typed `Type`'s symbol, can all borrow
//! each other for the lifetime of one compilation.

use std::cell::RefCell;

use crate::arena::Arena;
use crate::intern::{Interner, Symbol};
use crate::symbol::SymbolRec;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScopeKind {
    Global,
    Namespace,
    Func,
    Local,
}

pub type ScopeRef<'a> = &'a Scope<'a>;

pub struct Scope<'a> {
    pub kind: ScopeKind,
    pub parent: Option<ScopeRef<'a>>,
    /// The scope's own name segment for mangling: the namespace or
    /// function name, empty for `Global`/`Local`.
    pub name: Symbol,
    entries: RefCell<Vec<(Symbol, &'a SymbolRec<'a>)>>,
}

impl<'a> Scope<'a> {
    /// Declares `symbol` under `name` in this scope. Returns `Err` with the
    /// prior symbol if `name` is already declared here (§4.4: duplicate
    /// declarations are a semantic error) — the caller decides how to
    /// surface that.
    pub fn declare(&self, name: Symbol, symbol: &'a SymbolRec<'a>) -> Result<(), &'a SymbolRec<'a>> {
        let mut entries = self.entries.borrow_mut();
        if let Some((_, existing)) = entries.iter().find(|(n, _)| *n == name) {
            return Err(existing);
        }
        entries.push((name, symbol));
        Ok(())
    }

    /// Looks up `name` declared directly in this scope (no parent
    /// fall-through), honoring the forward-reference rule: a reference at
    /// `at` may bind to a symbol declared at or before `at`, or to any
    /// symbol of a kind that permits forward reference regardless of
    /// position.
    pub fn lookup_local(&self, name: Symbol, at: i64) -> Option<&'a SymbolRec<'a>> {
        self.entries
            .borrow()
            .iter()
            .find(|(n, sym)| *n == name && (sym.declared_at <= at || sym.is_forward_referenceable()))
            .map(|(_, sym)| *sym)
    }

    /// Looks up `name` ignoring the position rule, used by passes (type
    /// elaboration, namespace-member resolution) that only need "is this
    /// name declared at all" and enforce ordering themselves or not at all.
    pub fn lookup_local_any_position(&self, name: Symbol) -> Option<&'a SymbolRec<'a>> {
        self.entries
            .borrow()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, sym)| *sym)
    }

    /// Full resolution per §3: walks parent scopes, except that a
    /// `Namespace` scope is searched in isolation — it is reached only via
    /// explicit `StaticMember`/`Member` lookup, never via parent
    /// fall-through from inside it outward past its own boundary for
    /// *member* references. Plain identifier lookup inside namespace code
    /// still walks outward (the namespace scope is on the parent chain
    /// like any other), so this method does the walk; namespace-member
    /// lookup is a separate, single-scope call (`lookup_local[_any_position]`).
    pub fn lookup(&'a self, name: Symbol, at: i64) -> Option<&'a SymbolRec<'a>> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(sym) = s.lookup_local(name, at) {
                return Some(sym);
            }
            scope = s.parent;
        }
        None
    }

    pub fn entries(&self) -> Vec<(Symbol, &'a SymbolRec<'a>)> {
        self.entries.borrow().clone()
    }

    /// The scope's mangled name chain, "scopeName$...$global" (§3).
    pub fn mangled_name(&self, interner: &Interner) -> String {
        let mut segments = Vec::new();
        let mut scope = Some(self);
        while let Some(s) = scope {
            match s.kind {
                ScopeKind::Global => segments.push("global".to_string()),
                ScopeKind::Namespace | ScopeKind::Func => {
                    segments.push(interner.resolve(s.name).to_string())
                }
                ScopeKind::Local => {}
            }
            scope = s.parent;
        }
        segments.join("$")
    }
}

pub struct ScopeArena<'a> {
    arena: Arena<Scope<'a>>,
}

impl<'a> ScopeArena<'a> {
    pub fn new() -> Self {
        ScopeArena { arena: Arena::new() }
    }

    pub fn alloc(
        &'a self,
        kind: ScopeKind,
        parent: Option<ScopeRef<'a>>,
        name: Symbol,
    ) -> ScopeRef<'a> {
        self.arena.alloc(Scope {
            kind,
            parent,
            name,
            entries: RefCell::new(Vec::new()),
        })
    }
}

impl<'a> Default for ScopeArena<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mangled name for a symbol: "symbol$scope-chain" (§3).
pub fn mangled_symbol_name(symbol: &SymbolRec<'_>, interner: &Interner) -> String {
    format!(
        "{}${}",
        interner.resolve(symbol.name),
        symbol.owning_scope.mangled_name(interner)
    )
}
