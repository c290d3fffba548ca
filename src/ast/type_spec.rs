//! Pre-elaboration type syntax (§3 "TypeSpecs"). A `TypeSpec` is what the
//! parser produces from annotation syntax; the Symbol Resolver (§4.5)
//! elaborates it into a concrete [`crate::types::Type`].

use crate::intern::Symbol;
use crate::token::Token;

#[derive(Clone, Debug)]
pub enum TypeSpecKind<'a> {
    /// A bare name: a builtin (`Int`, `String`, ...) or a user type/namespace
    /// name, resolved during Symbol Resolution.
    Simple { name: Symbol },
    Array { elem: Box<TypeSpec<'a>> },
    /// One arrow `car -> cdr`; a multi-parameter `A -> B -> C` is parsed as
    /// nested `Func` nodes (right-associative), mirroring the curried
    /// `Type::Func` it elaborates to.
    Func {
        car: Box<TypeSpec<'a>>,
        cdr: Box<TypeSpec<'a>>,
    },
    /// `T.Id`: `T` must elaborate to a namespace; `Id` is looked up inside it.
    Member {
        namespace: Box<TypeSpec<'a>>,
        member: Symbol,
    },
}

#[derive(Clone, Debug)]
pub struct TypeSpec<'a> {
    pub kind: TypeSpecKind<'a>,
    pub is_const: bool,
    pub is_ref: bool,
    pub token: Token,
}

impl<'a> TypeSpec<'a> {
    pub fn simple(name: Symbol, is_const: bool, is_ref: bool, token: Token) -> Self {
        TypeSpec {
            kind: TypeSpecKind::Simple { name },
            is_const,
            is_ref,
            token,
        }
    }
}
