//! Shared tree traversal for the three compiler passes (§4.4-4.6). Each
//! pass implements [`Visitor`], overriding only the node kinds it cares
//! about; `walk_stmt`/`walk_expr` handle the recursive descent into
//! children so passes never have to repeat the tree shape.

use crate::ast::{Expr, ExprKind, Param, Stmt, StmtKind};

#[allow(unused_variables)]
pub trait Visitor<'a> {
    fn visit_stmt(&mut self, stmt: &mut Stmt<'a>) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &mut Expr<'a>) {
        walk_expr(self, expr);
    }

    fn visit_param(&mut self, param: &mut Param<'a>) {
        if let Some(default) = &mut param.default {
            self.visit_expr(default);
        }
    }
}

pub fn walk_stmt<'a, V: Visitor<'a> + ?Sized>(v: &mut V, stmt: &mut Stmt<'a>) {
    match &mut stmt.kind {
        StmtKind::TransUnit { body, .. } | StmtKind::Comp { body, .. } => {
            for s in body {
                v.visit_stmt(s);
            }
        }
        StmtKind::FuncDef { params, body, .. } => {
            for p in params {
                v.visit_param(p);
            }
            for s in body {
                v.visit_stmt(s);
            }
        }
        StmtKind::VarDef { init, .. } => {
            if let Some(init) = init {
                v.visit_expr(init);
            }
        }
        StmtKind::Inst { call } => v.visit_expr(call),
        StmtKind::Assign { target, value, .. } => {
            v.visit_expr(target);
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            v.visit_expr(cond);
            for s in then_branch {
                v.visit_stmt(s);
            }
            if let Some(else_branch) = else_branch {
                for s in else_branch {
                    v.visit_stmt(s);
                }
            }
        }
        StmtKind::Repeat { count, body, .. } => {
            if let Some(count) = count {
                v.visit_expr(count);
            }
            for s in body {
                v.visit_stmt(s);
            }
        }
        StmtKind::Label { .. } => {}
        StmtKind::Goto { target } | StmtKind::Gosub { target } => v.visit_expr(target),
        StmtKind::Continue | StmtKind::Break => {}
        StmtKind::Return { value } => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        StmtKind::Extern { .. } => {}
        StmtKind::Namespace { body, .. } => {
            for s in body {
                v.visit_stmt(s);
            }
        }
    }
}

pub fn walk_expr<'a, V: Visitor<'a> + ?Sized>(v: &mut V, expr: &mut Expr<'a>) {
    match &mut expr.kind {
        ExprKind::Identifier { .. } | ExprKind::Label { .. } => {}
        ExprKind::Binary { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::StrLit(_) | ExprKind::IntLit(_) | ExprKind::FloatLit(_) | ExprKind::CharLit(_) | ExprKind::BoolLit(_) => {}
        ExprKind::ArrayLit(elems) => {
            for e in elems {
                v.visit_expr(e);
            }
        }
        ExprKind::FuncCall { callee, args, .. } => {
            v.visit_expr(callee);
            for a in args {
                v.visit_expr(a);
            }
        }
        ExprKind::Constructor { args, .. } => {
            for a in args {
                v.visit_expr(a);
            }
        }
        ExprKind::Subscr { receiver, index } => {
            v.visit_expr(receiver);
            v.visit_expr(index);
        }
        ExprKind::Member { receiver, .. } => v.visit_expr(receiver),
        ExprKind::StaticMember { namespace, .. } => v.visit_expr(namespace),
        ExprKind::Ref(inner) | ExprKind::Deref(inner) | ExprKind::Promote(inner) => v.visit_expr(inner),
        ExprKind::Func { params, body, .. } => {
            for p in params {
                v.visit_param(p);
            }
            for s in body {
                v.visit_stmt(s);
            }
        }
    }
}
