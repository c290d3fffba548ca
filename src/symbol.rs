//! Symbol variants (§3 "Symbol") and the arena they are allocated from.
//!
//! A `SymbolRec` is allocated once, at declaration time (Symbol Register,
//! §4.4), and is shared thereafter by every back-reference to it (an
//! `Identifier` node's `symbol` slot, a `Scope` entry, a namespace `Type`).
//! Its `ty` field starts empty and is filled in by the Symbol Resolver or
//! Type Resolver, so it is a `Cell`, per invariant: "type slot ... may be
//! written by the type-resolution fixpoint".

use std::cell::{Cell, RefCell};

use crate::arena::Arena;
use crate::ast::expr::Expr;
use crate::breadcrumb::Position;
use crate::intern::Symbol;
use crate::scope::ScopeRef;
use crate::types::Type;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    Var,
    Extern,
    Func,
    /// Reserved per Open Question 3: declared but never produced by the
    /// parser or passes. Kept as a variant so `match`es stay exhaustive if
    /// classes are designed in later, but nothing constructs one.
    Class,
    Namespace,
    Label,
    BuiltinType,
}

/// A symbol table entry. `'a` is the arena lifetime shared by the whole
/// compilation (types, scopes, symbols, and the back-references the AST
/// holds into them).
pub struct SymbolRec<'a> {
    pub name: Symbol,
    pub kind: SymbolKind,
    pub owning_scope: ScopeRef<'a>,
    pub declared_at: Position,
    pub ty: Cell<Option<&'a Type<'a>>>,
    /// Set only for `Func`/`Namespace` symbols, which double as scopes
    /// (§3: "Function and namespace symbols additionally behave as
    /// scopes").
    pub own_scope: Cell<Option<ScopeRef<'a>>>,
    /// Positional default-value expressions for `Func` parameters, aligned
    /// to `params`; `None` at an index means "no default for this
    /// parameter" (§4.6 "FuncCall ... Defaults"). Stored by value (cloned
    /// fresh at each call site that needs one) since `Expr` trees are owned,
    /// not arena-allocated.
    pub defaults: RefCell<Vec<Option<Expr<'a>>>>,
    /// `Func` symbols only: each parameter's own `SymbolRec`, in declaration
    /// order — lets the Type Resolver drive call-site argument checking
    /// (and parameter-type inference) without needing the composite curried
    /// type to already exist (§4.6 "Constraint store").
    pub params: RefCell<Vec<&'a SymbolRec<'a>>>,
    /// `Func` symbols only: the declared-or-inferred return type, tracked
    /// separately from `ty` because `ty` holds the *composite* curried
    /// function type, which the Type Resolver can only assemble once every
    /// parameter and this slot are concrete (§4.6).
    pub ret_ty: Cell<Option<&'a Type<'a>>>,
}

impl<'a> SymbolRec<'a> {
    pub fn is_forward_referenceable(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Func | SymbolKind::Class | SymbolKind::Namespace | SymbolKind::Label
        )
    }

    pub fn set_type(&self, ty: &'a Type<'a>) {
        self.ty.set(Some(ty));
    }

    pub fn ty(&self) -> Option<&'a Type<'a>> {
        self.ty.get()
    }
}

pub struct SymbolArena<'a> {
    arena: Arena<SymbolRec<'a>>,
}

impl<'a> SymbolArena<'a> {
    pub fn new() -> Self {
        SymbolArena { arena: Arena::new() }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn declare(
        &'a self,
        name: Symbol,
        kind: SymbolKind,
        owning_scope: ScopeRef<'a>,
        declared_at: Position,
    ) -> &'a SymbolRec<'a> {
        self.arena.alloc(SymbolRec {
            name,
            kind,
            owning_scope,
            declared_at,
            ty: Cell::new(None),
            own_scope: Cell::new(None),
            defaults: RefCell::new(Vec::new()),
            params: RefCell::new(Vec::new()),
            ret_ty: Cell::new(None),
        })
    }
}

impl<'a> Default for SymbolArena<'a> {
    fn default() -> Self {
        Self::new()
    }
}
