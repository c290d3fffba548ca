//! The abstract syntax tree: statements, expressions, and type specifiers
//! (§3 "AST"). The tree owns its children; identifier/label nodes and
//! expression types hold non-owning back-references into the arenas in
//! [`crate::symbol`] and [`crate::types`].

pub mod expr;
pub mod stmt;
pub mod type_spec;

pub use expr::{BinOp, Expr, ExprKind, Param, UnOp};
pub use stmt::{AssignOp, Stmt, StmtKind};
pub use type_spec::{TypeSpec, TypeSpecKind};
