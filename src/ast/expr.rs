//! Expression nodes (§3 "Expressions"). Every `Expr` carries the token it
//! was built from (for diagnostics) and a type back-reference that starts
//! `None` and is filled in by the Type Resolver (invariant 1/2).

use std::cell::Cell;

use crate::ast::type_spec::TypeSpec;
use crate::intern::Symbol;
use crate::symbol::SymbolRec;
use crate::token::Token;
use crate::types::Type;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Xor,
    BitOr,
    BitAnd,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
    Not,
    Plus,
    Minus,
}

/// A formal parameter, shared by `FuncDef` statements and `Func` (lambda)
/// expressions: a name, an optional annotation, and an optional default.
#[derive(Clone)]
pub struct Param<'a> {
    pub name: Symbol,
    pub type_spec: Option<TypeSpec<'a>>,
    pub default: Option<Expr<'a>>,
    pub token: Token,
    pub symbol: Cell<Option<&'a SymbolRec<'a>>>,
}

#[derive(Clone)]
pub enum ExprKind<'a> {
    Identifier {
        name: Symbol,
        symbol: Cell<Option<&'a SymbolRec<'a>>>,
    },
    /// A label *reference* (`*name` used as a value, e.g. `goto`/`gosub`
    /// targets); label *declarations* are the `Label` statement.
    Label {
        name: Symbol,
        symbol: Cell<Option<&'a SymbolRec<'a>>>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr<'a>>,
        rhs: Box<Expr<'a>>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr<'a>>,
    },
    StrLit(Symbol),
    IntLit(i64),
    FloatLit(f64),
    CharLit(char),
    BoolLit(bool),
    ArrayLit(Vec<Expr<'a>>),
    FuncCall {
        callee: Box<Expr<'a>>,
        args: Vec<Expr<'a>>,
        partial: bool,
    },
    /// `T(args...)` / `[T](n)` / `[T](n, init)` (§4.6 "Constructor").
    Constructor {
        type_spec: Box<TypeSpec<'a>>,
        args: Vec<Expr<'a>>,
    },
    Subscr {
        receiver: Box<Expr<'a>>,
        index: Box<Expr<'a>>,
    },
    Member {
        receiver: Box<Expr<'a>>,
        member: Symbol,
        member_token: Token,
    },
    /// `Namespace.member` resolved at the Symbol Resolver stage, as opposed
    /// to `Member`, which is resolved against a value's type in the Type
    /// Resolver.
    StaticMember {
        namespace: Box<Expr<'a>>,
        member: Symbol,
        member_token: Token,
        symbol: Cell<Option<&'a SymbolRec<'a>>>,
    },
    /// Synthesized by the Type Resolver: every lvalue load is rewritten as
    /// `Deref(Identifier)`, never produced directly by the parser.
    Ref(Box<Expr<'a>>),
    Deref(Box<Expr<'a>>),
    /// `func (...)::T { ... }` lambda expression.
    Func {
        params: Vec<Param<'a>>,
        ret_type: Option<TypeSpec<'a>>,
        body: Vec<crate::ast::stmt::Stmt<'a>>,
        symbol: Cell<Option<&'a SymbolRec<'a>>>,
    },
    /// A conversion inserted by `insertPromoter` (§4.6): wraps `inner`,
    /// whose static type differs from (but promotes to) this node's type.
    Promote(Box<Expr<'a>>),
}

#[derive(Clone)]
pub struct Expr<'a> {
    pub kind: ExprKind<'a>,
    pub token: Token,
    pub ty: Cell<Option<&'a Type<'a>>>,
}

impl<'a> Expr<'a> {
    pub fn new(kind: ExprKind<'a>, token: Token) -> Self {
        Expr {
            kind,
            token,
            ty: Cell::new(None),
        }
    }

    pub fn ty(&self) -> Option<&'a Type<'a>> {
        self.ty.get()
    }

    pub fn set_ty(&self, ty: &'a Type<'a>) {
        self.ty.set(Some(ty));
    }

    pub fn is_resolved(&self) -> bool {
        self.ty.get().is_some()
    }
}
