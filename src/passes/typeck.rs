//! Type Resolver (§4.6, "the hardest subsystem"): the third and final tree
//! pass. Unlike Symbol Register and Symbol Resolver, this pass does not
//! implement the shared [`crate::visitor::Visitor`] trait — bidirectional
//! checking needs a contextually-expected type threaded alongside every
//! recursive call, which that trait's uniform, argument-free signature
//! can't carry, so this pass walks the tree with its own methods instead.
//!
//! The pass iterates: each full walk may assign a concrete type to a
//! previously-null slot, rewrite an expression (inserting `Ref`/`Deref`/
//! `Promote`, or reclassifying an HSP-compat `Array.member(x)` call as a
//! `Subscr`), or record a constraint on a slot whose value depends on
//! something not yet resolved. It stops when nothing is left unresolved,
//! or reports a convergence failure when a whole walk makes no progress.

use std::cell::Cell;
use std::collections::HashMap;

use crate::ast::{AssignOp, BinOp, Expr, ExprKind, Stmt, StmtKind, TypeSpec, TypeSpecKind, UnOp};
use crate::breadcrumb::Position;
use crate::error::{semantics_error, CompileError, WarningSink, CANNOT_RESOLVE_TYPE};
use crate::intern::{Interner, Symbol};
use crate::passes::constraints::{slot_key, ConstraintStore, SlotKey};
use crate::passes::resolve::elaborate_type_spec;
use crate::scope::ScopeRef;
use crate::symbol::{SymbolKind, SymbolRec};
use crate::types::{Builtin, Type, TypeArena};

fn is_numeric(t: &Type) -> bool {
    matches!(t, Type::Builtin(b) if b.is_numeric())
}

fn strip_ref<'a>(types: &'a TypeArena<'a>, t: &'a Type<'a>) -> &'a Type<'a> {
    if t.is_ref() {
        types.modify(t.unmodify(), t.is_const(), false)
    } else {
        t
    }
}

fn callee_symbol<'a>(callee: &Expr<'a>) -> Option<&'a SymbolRec<'a>> {
    match &callee.kind {
        ExprKind::Identifier { symbol, .. } | ExprKind::StaticMember { symbol, .. } => symbol.get(),
        _ => None,
    }
}

/// Replaces `expr` in place with `Kind(old expr)`, typed as `ty` — the
/// shape every `Ref`/`Deref`/`Promote` insertion shares (§4.6).
fn wrap_expr<'a>(expr: &mut Expr<'a>, ty: &'a Type<'a>, build: impl FnOnce(Box<Expr<'a>>) -> ExprKind<'a>) {
    let token = expr.token;
    let old = std::mem::replace(expr, Expr::new(ExprKind::BoolLit(false), token));
    *expr = Expr::new(build(Box::new(old)), token);
    expr.set_ty(ty);
}

fn insert_ref<'a>(expr: &mut Expr<'a>, ty: &'a Type<'a>) {
    wrap_expr(expr, ty, ExprKind::Ref);
}

fn insert_deref<'a>(expr: &mut Expr<'a>, ty: &'a Type<'a>) {
    wrap_expr(expr, ty, ExprKind::Deref);
}

fn insert_promote<'a>(expr: &mut Expr<'a>, ty: &'a Type<'a>) {
    wrap_expr(expr, ty, ExprKind::Promote);
}

pub struct TypeChecker<'s, 'a> {
    interner: &'s Interner,
    types: &'a TypeArena<'a>,
    warnings: &'s WarningSink,
    hsp_compat: bool,
    /// Pre-interned `PRStringConcatenate` (§4.6, §6 runtime ABI), so
    /// `check_assign` can build the lowered call without needing a
    /// mutable `Interner`.
    string_concat: Symbol,
    current: ScopeRef<'a>,
    func_stack: Vec<&'a SymbolRec<'a>>,
    constraints: ConstraintStore<'a>,
    slot_cells: HashMap<SlotKey, &'a Cell<Option<&'a Type<'a>>>>,
    progress: bool,
    unresolved_count: usize,
    first_unresolved: Option<Position>,
    error: Option<CompileError>,
}

impl<'s, 'a> TypeChecker<'s, 'a> {
    pub fn run(
        interner: &'s Interner,
        types: &'a TypeArena<'a>,
        warnings: &'s WarningSink,
        hsp_compat: bool,
        string_concat: Symbol,
        global: ScopeRef<'a>,
        root: &mut Stmt<'a>,
    ) -> Result<(), CompileError> {
        let mut checker = TypeChecker {
            interner,
            types,
            warnings,
            hsp_compat,
            string_concat,
            current: global,
            func_stack: Vec::new(),
            constraints: ConstraintStore::new(),
            slot_cells: HashMap::new(),
            progress: false,
            unresolved_count: 0,
            first_unresolved: None,
            error: None,
        };
        loop {
            checker.constraints = ConstraintStore::new();
            checker.progress = false;
            checker.unresolved_count = 0;
            checker.first_unresolved = None;
            checker.current = global;
            checker.func_stack.clear();
            checker.check_stmt(root);
            if let Some(e) = checker.error.take() {
                return Err(e);
            }
            let collapsed = {
                let TypeChecker { ref mut constraints, ref slot_cells, .. } = checker;
                constraints.collapse(|slot, ty| {
                    if let Some(cell) = slot_cells.get(&slot) {
                        cell.set(Some(ty));
                    }
                })
            };
            if collapsed {
                checker.progress = true;
            }
            if checker.unresolved_count == 0 {
                return Ok(());
            }
            if !checker.progress {
                return Err(semantics_error(
                    checker.first_unresolved.unwrap_or(crate::breadcrumb::NO_POSITION),
                    CANNOT_RESOLVE_TYPE,
                ));
            }
        }
    }

    fn fail(&mut self, e: CompileError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    fn note_unresolved(&mut self, position: Position) {
        self.unresolved_count += 1;
        if self.first_unresolved.is_none() {
            self.first_unresolved = Some(position);
        }
    }

    fn note_constraint(&mut self, cell: &'a Cell<Option<&'a Type<'a>>>, t: &'a Type<'a>, take_lower_bound: bool) {
        let key = slot_key(cell);
        self.slot_cells.entry(key).or_insert(cell);
        self.constraints.add(key, t, take_lower_bound);
    }

    fn elaborate_here(&mut self, spec: &TypeSpec<'a>) -> Option<&'a Type<'a>> {
        match elaborate_type_spec(self.types, self.current, self.interner, spec) {
            Ok(t) => Some(t),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn describe(&self, ty: &'a Type<'a>) -> String {
        crate::types::describe(self.interner, ty)
    }

    fn can_promote(&self, from: &'a Type<'a>, to: &'a Type<'a>, in_param_context: bool) -> bool {
        let from_un = from.unmodify();
        let to_un = to.unmodify();
        let base_ok = from_un == to_un
            || from_un.is_subtype_of(to_un)
            || (self.hsp_compat && is_numeric(from_un) && is_numeric(to_un))
            || (self.hsp_compat
                && matches!(from_un, Type::Builtin(Builtin::Int))
                && matches!(to_un, Type::Builtin(Builtin::String)));
        if !base_ok {
            return false;
        }
        // "const { ref } -> ref" is rejected: stripping constness off a
        // reference is never implicit.
        if from.is_const() && from.is_ref() && to.is_ref() && !to.is_const() {
            return false;
        }
        // "unmodified -> ref" is rejected except in function-parameter
        // context, where passing an lvalue by reference is ordinary.
        if !from.is_ref() && to.is_ref() && !in_param_context {
            return false;
        }
        true
    }

    /// True only for the HSP-compat-only half of `canPromote` (§4.6): a
    /// pair that needed widened numeric or `Int->String` promotion to pass
    /// at all, as opposed to one already legal via identity or the
    /// `Float <: Double` subtype rule.
    fn is_hsp_widening(from: &'a Type<'a>, to: &'a Type<'a>) -> bool {
        let from_un = from.unmodify();
        let to_un = to.unmodify();
        if from_un == to_un || from_un.is_subtype_of(to_un) {
            return false;
        }
        (is_numeric(from_un) && is_numeric(to_un))
            || (matches!(from_un, Type::Builtin(Builtin::Int)) && matches!(to_un, Type::Builtin(Builtin::String)))
    }

    fn promote_to(&mut self, expr: &mut Expr<'a>, from: &'a Type<'a>, to: &'a Type<'a>, in_param_context: bool) -> bool {
        if from == to {
            expr.set_ty(to);
            return true;
        }
        if !self.can_promote(from, to, in_param_context) {
            return false;
        }
        if self.hsp_compat && Self::is_hsp_widening(from, to) {
            self.warnings.push(
                expr.token.position,
                format!(
                    "implicit {} -> {} conversion (HSP-compatibility mode)",
                    self.describe(from.unmodify()),
                    self.describe(to.unmodify())
                ),
            );
        }
        insert_promote(expr, to);
        true
    }

    /// Inserts a `Deref` when the sink is non-ref and the source is ref,
    /// then attempts `canPromote` on what's left (§4.6 "Bidirectional
    /// checking per node").
    fn reconcile(&mut self, value: &mut Expr<'a>, computed: &'a Type<'a>, sink: &'a Type<'a>, in_param_context: bool) -> bool {
        let mut from = computed;
        if !sink.is_ref() && from.is_ref() {
            let stripped = strip_ref(self.types, from);
            insert_deref(value, stripped);
            from = stripped;
        }
        self.promote_to(value, from, sink, in_param_context)
    }

    fn binary_result_type(&self, op: BinOp, l: &'a Type<'a>, r: &'a Type<'a>) -> Option<(&'a Type<'a>, &'a Type<'a>)> {
        let lb = l.as_builtin()?;
        let rb = r.as_builtin()?;
        use BinOp::*;
        match op {
            Xor | BitOr | BitAnd => {
                if lb == rb && matches!(lb, Builtin::Int | Builtin::Bool) {
                    let t = self.types.builtin(lb);
                    Some((t, t))
                } else {
                    None
                }
            }
            Eq | NotEq => {
                if lb == rb || (self.hsp_compat && lb.is_numeric() && rb.is_numeric()) {
                    Some((self.types.builtin(lb), self.types.builtin(Builtin::Bool)))
                } else {
                    None
                }
            }
            Lt | LtEq | Gt | GtEq => {
                if lb.is_numeric() && rb.is_numeric() && (lb == rb || self.hsp_compat) {
                    Some((self.types.builtin(lb), self.types.builtin(Builtin::Bool)))
                } else {
                    None
                }
            }
            Shl | Shr => {
                if lb == Builtin::Int && rb == Builtin::Int {
                    let t = self.types.builtin(Builtin::Int);
                    Some((t, t))
                } else {
                    None
                }
            }
            Add if lb == Builtin::String && rb == Builtin::String => {
                let t = self.types.builtin(Builtin::String);
                Some((t, t))
            }
            Add | Sub | Mul | Div => {
                if lb.is_numeric() && (lb == rb || (self.hsp_compat && rb.is_numeric())) {
                    let t = self.types.builtin(lb);
                    Some((t, t))
                } else {
                    None
                }
            }
            Mod => {
                if lb == Builtin::Int && rb == Builtin::Int {
                    let t = self.types.builtin(Builtin::Int);
                    Some((t, t))
                } else {
                    None
                }
            }
        }
    }

    fn try_finalize_func_type(&mut self, sym: &'a SymbolRec<'a>) {
        if sym.ty().is_some() {
            return;
        }
        let params = sym.params.borrow();
        let mut concrete = Vec::with_capacity(params.len());
        for p in params.iter() {
            match p.ty() {
                Some(t) => concrete.push(t),
                None => return,
            }
        }
        let ret = match sym.ret_ty.get() {
            Some(t) => t,
            None => return,
        };
        drop(params);
        sym.set_type(self.types.func_from_params(&concrete, ret));
    }

    // ---- per-node inference -------------------------------------------------

    fn infer_identifier_like(&mut self, position: Position, sym: Option<&'a SymbolRec<'a>>) -> Option<&'a Type<'a>> {
        let sym = sym?;
        match sym.kind {
            SymbolKind::BuiltinType | SymbolKind::Namespace => {
                self.fail(semantics_error(position, "a type or namespace cannot be used as a value"));
                None
            }
            SymbolKind::Func => {
                self.try_finalize_func_type(sym);
                sym.ty().map(|base| self.types.modify(base, false, true))
            }
            _ => sym.ty().map(|base| self.types.modify(base, false, true)),
        }
    }

    fn infer_binary(&mut self, position: Position, op: BinOp, lhs: &mut Expr<'a>, rhs: &mut Expr<'a>) -> Option<&'a Type<'a>> {
        let l = self.infer_expr(lhs, None)?;
        let r = self.infer_expr(rhs, None)?;
        let (operand, result) = match self.binary_result_type(op, l, r) {
            Some(pair) => pair,
            None => {
                self.fail(semantics_error(
                    position,
                    format!("operator cannot be applied to {} and {}", self.describe(l), self.describe(r)),
                ));
                return None;
            }
        };
        if !self.reconcile(lhs, l, operand, false) || !self.reconcile(rhs, r, operand, false) {
            self.fail(semantics_error(position, "operand does not match the operator's type"));
            return None;
        }
        Some(self.types.modify(result, true, false))
    }

    fn infer_unary(&mut self, position: Position, op: UnOp, operand: &mut Expr<'a>) -> Option<&'a Type<'a>> {
        let t = self.infer_expr(operand, None)?;
        let b = t.as_builtin()?;
        let result_builtin = match op {
            UnOp::Not if b == Builtin::Bool => Builtin::Bool,
            UnOp::Plus | UnOp::Minus if b.is_numeric() => b,
            _ => {
                self.fail(semantics_error(position, "operator cannot be applied to this type"));
                return None;
            }
        };
        let result = self.types.builtin(result_builtin);
        if !self.reconcile(operand, t, result, false) {
            return None;
        }
        Some(self.types.modify(result, true, false))
    }

    fn infer_array_lit(&mut self, position: Position, elems: &mut [Expr<'a>]) -> Option<&'a Type<'a>> {
        if elems.is_empty() {
            self.fail(semantics_error(position, "cannot infer the element type of an empty array literal"));
            return None;
        }
        let (first, rest) = elems.split_first_mut().expect("checked non-empty above");
        let first_ty = self.infer_expr(first, None)?;
        let elem_ty = strip_ref(self.types, first_ty);
        if !self.reconcile(first, first_ty, elem_ty, false) {
            return None;
        }
        for e in rest {
            let t = self.infer_expr(e, Some(elem_ty))?;
            if !self.reconcile(e, t, elem_ty, false) {
                self.fail(semantics_error(position, "array literal elements must share a common type"));
                return None;
            }
        }
        Some(self.types.modify(self.types.array(elem_ty), true, false))
    }

    fn infer_subscr(&mut self, position: Position, receiver: &mut Expr<'a>, index: &mut Expr<'a>) -> Option<&'a Type<'a>> {
        let recv_ty = self.infer_expr(receiver, None)?;
        let elem = match recv_ty.as_array_elem() {
            Some(e) => e,
            None => {
                self.fail(semantics_error(
                    position,
                    format!("cannot subscript a value of type {}", self.describe(recv_ty)),
                ));
                return None;
            }
        };
        let int_ty = self.types.builtin(Builtin::Int);
        let idx_ty = self.infer_expr(index, Some(int_ty))?;
        if !self.reconcile(index, idx_ty, int_ty, false) {
            self.fail(semantics_error(position, "array subscript must be an Int"));
            return None;
        }
        if !recv_ty.is_ref() {
            let ref_recv = self.types.modify(recv_ty, false, true);
            insert_ref(receiver, ref_recv);
        }
        let is_const = recv_ty.is_const() || !recv_ty.is_ref();
        Some(self.types.modify(elem, is_const, true))
    }

    fn infer_member(&mut self, position: Position, receiver: &mut Expr<'a>, member: Symbol, member_position: Position) -> Option<&'a Type<'a>> {
        let recv_ty = self.infer_expr(receiver, None)?;
        let name = self.interner.resolve(member).to_string();
        if let Some(elem) = recv_ty.as_array_elem() {
            return match name.as_str() {
                "length" => Some(self.types.modify(self.types.builtin(Builtin::Int), true, true)),
                "resize" => Some(self.types.func(self.types.builtin(Builtin::Int), self.types.builtin(Builtin::Void))),
                _ => {
                    let _ = elem;
                    self.fail(semantics_error(member_position, format!("array has no member '{name}'")));
                    None
                }
            };
        }
        if matches!(recv_ty.unmodify(), Type::Builtin(Builtin::String)) {
            return match name.as_str() {
                "length" => Some(self.types.modify(self.types.builtin(Builtin::Int), true, false)),
                _ => {
                    self.fail(semantics_error(member_position, format!("String has no member '{name}'")));
                    None
                }
            };
        }
        self.fail(semantics_error(position, format!("cannot access member '{name}' on this type")));
        None
    }

    fn infer_member_expr(&mut self, expr: &mut Expr<'a>) -> Option<&'a Type<'a>> {
        let position = expr.token.position;
        let (receiver, member, member_position) = match &mut expr.kind {
            ExprKind::Member { receiver, member, member_token } => (receiver, *member, member_token.position),
            _ => unreachable!("infer_member_expr only called for Member nodes"),
        };
        self.infer_member(position, receiver, member, member_position)
    }

    /// In HSP-compatibility mode, `Array.anythingElse(x)` — any single-arg
    /// call through a `.member` that isn't `length`/`resize` on an array
    /// receiver — is rewritten as `Subscr(Array, x)` before normal call
    /// checking runs (§4.6 "Specific node rules").
    fn infer_func_call_expr(&mut self, expr: &mut Expr<'a>) -> Option<&'a Type<'a>> {
        let position = expr.token.position;
        if self.hsp_compat {
            let is_candidate = matches!(
                &expr.kind,
                ExprKind::FuncCall { callee, args, partial: false } if args.len() == 1 && matches!(callee.kind, ExprKind::Member { .. })
            );
            if is_candidate {
                let kind = std::mem::replace(&mut expr.kind, ExprKind::BoolLit(false));
                let (callee, mut args, partial) = match kind {
                    ExprKind::FuncCall { callee, args, partial } => (callee, args, partial),
                    _ => unreachable!("matched FuncCall above"),
                };
                let callee = *callee;
                let callee_token = callee.token;
                let (mut receiver, member, member_token) = match callee.kind {
                    ExprKind::Member { receiver, member, member_token } => (*receiver, member, member_token),
                    _ => unreachable!("matched Member above"),
                };
                let recv_ty = self.infer_expr(&mut receiver, None);
                let name = self.interner.resolve(member).to_string();
                let is_array = recv_ty.and_then(|t| t.as_array_elem()).is_some();
                if is_array && name != "length" && name != "resize" {
                    let index = args.pop().expect("candidate check guarantees exactly one argument");
                    expr.kind = ExprKind::Subscr { receiver: Box::new(receiver), index: Box::new(index) };
                    return self.infer_expr(expr, None);
                }
                let member_expr = Expr::new(ExprKind::Member { receiver: Box::new(receiver), member, member_token }, callee_token);
                expr.kind = ExprKind::FuncCall { callee: Box::new(member_expr), args, partial };
            }
        }
        let (callee, args, partial) = match &mut expr.kind {
            ExprKind::FuncCall { callee, args, partial } => (callee, args, *partial),
            _ => unreachable!("infer_func_call_expr only called for FuncCall nodes"),
        };
        self.infer_call(position, callee, args, partial)
    }

    fn infer_call(&mut self, position: Position, callee: &mut Expr<'a>, args: &mut Vec<Expr<'a>>, partial: bool) -> Option<&'a Type<'a>> {
        if let Some(sym) = callee_symbol(callee).filter(|s| s.kind == SymbolKind::Func) {
            return self.infer_call_via_symbol(position, callee, sym, args, partial);
        }
        let callee_ty = self.infer_expr(callee, None)?;
        self.infer_call_via_type(position, callee_ty, args, partial)
    }

    fn infer_call_via_symbol(
        &mut self,
        position: Position,
        callee: &mut Expr<'a>,
        sym: &'a SymbolRec<'a>,
        args: &mut Vec<Expr<'a>>,
        partial: bool,
    ) -> Option<&'a Type<'a>> {
        let _ = self.infer_expr(callee, None);
        let params = sym.params.borrow().clone();
        if !partial {
            if args.len() < params.len() {
                for i in args.len()..params.len() {
                    let default = sym.defaults.borrow().get(i).and_then(|d| d.clone());
                    match default {
                        Some(e) => args.push(e),
                        None => {
                            self.fail(semantics_error(position, "call is missing a required argument"));
                            return None;
                        }
                    }
                }
            }
            if args.len() > params.len() {
                self.fail(semantics_error(position, "too many arguments in call"));
                return None;
            }
            let mut all_known = true;
            for (i, param_sym) in params.iter().enumerate() {
                let expected = param_sym.ty();
                let computed = match self.infer_expr(&mut args[i], expected) {
                    Some(t) => t,
                    None => {
                        all_known = false;
                        continue;
                    }
                };
                match expected {
                    Some(param_ty) => {
                        if !self.reconcile(&mut args[i], computed, param_ty, true) {
                            self.fail(semantics_error(
                                position,
                                format!(
                                    "argument {} has type {} but '{}' expects {}",
                                    i + 1,
                                    self.describe(computed),
                                    self.interner.resolve(sym.name),
                                    self.describe(param_ty)
                                ),
                            ));
                            return None;
                        }
                    }
                    None => {
                        let noted = strip_ref(self.types, computed);
                        self.note_constraint(&param_sym.ty, noted, false);
                        all_known = false;
                    }
                }
            }
            if !all_known {
                return None;
            }
            self.try_finalize_func_type(sym);
            sym.ret_ty.get().map(|ret| self.types.modify(ret, true, false))
        } else {
            let mut checked = 0;
            for (i, param_sym) in params.iter().enumerate() {
                if i >= args.len() {
                    break;
                }
                let expected = param_sym.ty();
                let computed = self.infer_expr(&mut args[i], expected)?;
                if let Some(param_ty) = expected {
                    if !self.reconcile(&mut args[i], computed, param_ty, true) {
                        return None;
                    }
                }
                checked += 1;
            }
            let remaining: Vec<&'a Type<'a>> = params[checked..].iter().filter_map(|s| s.ty()).collect();
            if remaining.len() != params.len() - checked {
                return None;
            }
            let ret = sym.ret_ty.get()?;
            Some(self.types.func_from_params(&remaining, ret))
        }
    }

    fn infer_call_via_type(&mut self, position: Position, callee_ty: &'a Type<'a>, args: &mut Vec<Expr<'a>>, partial: bool) -> Option<&'a Type<'a>> {
        let (params, ret) = callee_ty.unmodify().func_parts()?;
        if !partial && args.len() != params.len() {
            self.fail(semantics_error(position, "call has the wrong number of arguments"));
            return None;
        }
        let mut checked = 0;
        for (i, param_ty) in params.iter().enumerate() {
            if i >= args.len() {
                break;
            }
            let computed = self.infer_expr(&mut args[i], Some(*param_ty))?;
            if !self.reconcile(&mut args[i], computed, *param_ty, true) {
                self.fail(semantics_error(position, "argument does not match the expected parameter type"));
                return None;
            }
            checked += 1;
        }
        if partial {
            Some(self.types.func_from_params(&params[checked..], ret))
        } else {
            Some(self.types.modify(ret, true, false))
        }
    }

    /// A redundant wrap — `T(x)` where `x` already has builtin type `T` — is
    /// peephole-stripped to `x` itself rather than left as a `Constructor`
    /// node around an identity conversion (§4.6 "Cheap rewrites").
    fn infer_constructor_expr(&mut self, expr: &mut Expr<'a>) -> Option<&'a Type<'a>> {
        let position = expr.token.position;
        let type_spec = match &expr.kind {
            ExprKind::Constructor { type_spec, .. } => (**type_spec).clone(),
            _ => unreachable!("infer_constructor_expr only called for Constructor nodes"),
        };
        let target = self.elaborate_here(&type_spec)?;
        let is_array = matches!(type_spec.kind, TypeSpecKind::Array { .. });
        let args = match &mut expr.kind {
            ExprKind::Constructor { args, .. } => args,
            _ => unreachable!(),
        };
        if is_array {
            return self.infer_array_constructor(position, target, args);
        }
        let (ty, strip) = self.infer_value_constructor(position, target, args)?;
        if strip {
            let arg = match &mut expr.kind {
                ExprKind::Constructor { args, .. } => args.remove(0),
                _ => unreachable!(),
            };
            *expr = arg;
        }
        Some(ty)
    }

    fn infer_array_constructor(&mut self, position: Position, target: &'a Type<'a>, args: &mut [Expr<'a>]) -> Option<&'a Type<'a>> {
        let elem = target.as_array_elem()?;
        if args.is_empty() || args.len() > 2 {
            self.fail(semantics_error(position, "array constructor takes a length and an optional initializer"));
            return None;
        }
        let int_ty = self.types.builtin(Builtin::Int);
        let len_ty = self.infer_expr(&mut args[0], Some(int_ty))?;
        if !self.reconcile(&mut args[0], len_ty, int_ty, false) {
            self.fail(semantics_error(position, "array length must be an Int"));
            return None;
        }
        if args.len() == 2 {
            let init_ty = self.infer_expr(&mut args[1], Some(elem))?;
            if !self.reconcile(&mut args[1], init_ty, elem, false) {
                self.fail(semantics_error(position, "array initializer does not match the element type"));
                return None;
            }
        }
        Some(self.types.modify(target, true, false))
    }

    /// Returns the constructor's result type, plus whether the caller should
    /// splice `args[0]` in place of the whole `Constructor` node (the
    /// redundant-wrap peephole strip).
    fn infer_value_constructor(&mut self, position: Position, target: &'a Type<'a>, args: &mut [Expr<'a>]) -> Option<(&'a Type<'a>, bool)> {
        match args.len() {
            0 => Some((self.types.modify(target.unmodify(), true, false), false)),
            1 => {
                let arg_ty = self.infer_expr(&mut args[0], Some(target))?;
                if matches!(target.unmodify(), Type::Builtin(_)) && arg_ty.unmodify() == target.unmodify() {
                    return Some((arg_ty, true));
                }
                if self.reconcile(&mut args[0], arg_ty, target, false) {
                    Some((self.types.modify(target.unmodify(), true, false), false))
                } else {
                    self.fail(semantics_error(
                        position,
                        format!("cannot construct {} from a value of type {}", self.describe(target), self.describe(arg_ty)),
                    ));
                    None
                }
            }
            _ => {
                self.fail(semantics_error(position, "a value constructor takes at most one argument"));
                None
            }
        }
    }

    fn infer_expr(&mut self, expr: &mut Expr<'a>, _expected: Option<&'a Type<'a>>) -> Option<&'a Type<'a>> {
        if self.error.is_some() {
            return None;
        }
        if let Some(ty) = expr.ty() {
            return Some(ty);
        }
        if matches!(expr.kind, ExprKind::FuncCall { .. }) {
            let result = self.infer_func_call_expr(expr);
            return self.finish(expr, result);
        }
        if matches!(expr.kind, ExprKind::Member { .. }) {
            let result = self.infer_member_expr(expr);
            return self.finish(expr, result);
        }
        if matches!(expr.kind, ExprKind::Constructor { .. }) {
            let result = self.infer_constructor_expr(expr);
            return self.finish(expr, result);
        }
        let position = expr.token.position;
        let computed = match &mut expr.kind {
            ExprKind::IntLit(_) => Some(self.types.modify(self.types.builtin(Builtin::Int), true, false)),
            ExprKind::FloatLit(_) => Some(self.types.modify(self.types.builtin(Builtin::Float), true, false)),
            ExprKind::CharLit(_) => Some(self.types.modify(self.types.builtin(Builtin::Char), true, false)),
            ExprKind::StrLit(_) => Some(self.types.modify(self.types.builtin(Builtin::String), true, false)),
            ExprKind::BoolLit(_) => Some(self.types.modify(self.types.builtin(Builtin::Bool), true, false)),
            ExprKind::Identifier { symbol, .. } | ExprKind::Label { symbol, .. } => {
                self.infer_identifier_like(position, symbol.get())
            }
            ExprKind::Binary { op, lhs, rhs } => self.infer_binary(position, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.infer_unary(position, *op, operand),
            ExprKind::ArrayLit(elems) => self.infer_array_lit(position, elems),
            ExprKind::Subscr { receiver, index } => self.infer_subscr(position, receiver, index),
            ExprKind::StaticMember { symbol, .. } => symbol.get().and_then(|s| s.ty()),
            ExprKind::Ref(inner) | ExprKind::Deref(inner) | ExprKind::Promote(inner) => self.infer_expr(inner, None),
            ExprKind::Func { params, ret_type: _, body, symbol } => {
                let func_sym = symbol.get().expect("Symbol Register/Resolver set this");
                for p in params.iter_mut() {
                    if let Some(default) = &mut p.default {
                        let expected_ty = p.symbol.get().and_then(|s| s.ty());
                        self.infer_expr(default, expected_ty);
                    }
                }
                let saved_current = self.current;
                self.current = func_sym.own_scope.get().expect("Register attaches an own_scope");
                self.func_stack.push(func_sym);
                for s in body.iter_mut() {
                    self.check_stmt(s);
                }
                self.func_stack.pop();
                self.current = saved_current;
                self.try_finalize_func_type(func_sym);
                func_sym.ty()
            }
            ExprKind::FuncCall { .. } | ExprKind::Member { .. } | ExprKind::Constructor { .. } => unreachable!("handled above"),
        };
        self.finish(expr, computed)
    }

    fn finish(&mut self, expr: &mut Expr<'a>, computed: Option<&'a Type<'a>>) -> Option<&'a Type<'a>> {
        match computed {
            Some(ty) => {
                expr.set_ty(ty);
                self.progress = true;
                Some(ty)
            }
            None => {
                if self.error.is_none() {
                    self.note_unresolved(expr.token.position);
                }
                None
            }
        }
    }

    // ---- statements ----------------------------------------------------

    fn check_func_params_and_body(&mut self, func_sym: &'a SymbolRec<'a>, params: &mut [crate::ast::Param<'a>], scope: ScopeRef<'a>, body: &mut [Stmt<'a>]) {
        for p in params.iter_mut() {
            if let Some(default) = &mut p.default {
                let expected_ty = p.symbol.get().and_then(|s| s.ty());
                self.infer_expr(default, expected_ty);
            }
        }
        let saved = self.current;
        self.current = scope;
        self.func_stack.push(func_sym);
        for s in body {
            self.check_stmt(s);
        }
        self.func_stack.pop();
        self.current = saved;
        self.try_finalize_func_type(func_sym);
    }

    fn check_stmt(&mut self, stmt: &mut Stmt<'a>) {
        if self.error.is_some() {
            return;
        }
        let position = stmt.token.position;
        match &mut stmt.kind {
            StmtKind::TransUnit { body, .. } | StmtKind::Comp { body, .. } => {
                for s in body {
                    self.check_stmt(s);
                }
            }
            StmtKind::FuncDef { params, body, scope, symbol, .. } => {
                let func_sym = symbol.get().expect("Symbol Register set this");
                let scope = scope.get().expect("Symbol Register attaches a scope to every FuncDef");
                self.check_func_params_and_body(func_sym, params, scope, body);
            }
            StmtKind::VarDef { init, symbol, .. } => {
                let sym = symbol.get().expect("Symbol Register sets this");
                match init {
                    Some(init) => {
                        let expected = sym.ty();
                        if let Some(computed) = self.infer_expr(init, expected) {
                            match sym.ty() {
                                Some(declared) => {
                                    if !self.reconcile(init, computed, declared, false) {
                                        self.fail(semantics_error(
                                            position,
                                            format!(
                                                "cannot initialize a variable of type {} with a value of type {}",
                                                self.describe(declared),
                                                self.describe(computed)
                                            ),
                                        ));
                                    }
                                }
                                None => {
                                    let inferred = strip_ref(self.types, computed);
                                    sym.set_type(inferred);
                                    let _ = self.reconcile(init, computed, inferred, false);
                                }
                            }
                        }
                    }
                    None if sym.ty().is_none() => self.note_unresolved(position),
                    None => {}
                }
            }
            StmtKind::Inst { call } => {
                self.infer_expr(call, None);
            }
            StmtKind::Assign { op, target, value } => self.check_assign(position, op, target, value),
            StmtKind::If { cond, then_branch, else_branch } => {
                let bool_ty = self.types.builtin(Builtin::Bool);
                if let Some(t) = self.infer_expr(cond, Some(bool_ty)) {
                    if !self.reconcile(cond, t, bool_ty, false) {
                        self.fail(semantics_error(position, "'if' condition must be a Bool"));
                    }
                }
                for s in then_branch {
                    self.check_stmt(s);
                }
                if let Some(else_branch) = else_branch {
                    for s in else_branch {
                        self.check_stmt(s);
                    }
                }
            }
            StmtKind::Repeat { count, body, scope, .. } => {
                let saved = self.current;
                self.current = scope.get().expect("Symbol Register attaches a scope to every Repeat");
                if let Some(count) = count {
                    let int_ty = self.types.builtin(Builtin::Int);
                    if let Some(t) = self.infer_expr(count, Some(int_ty)) {
                        if !self.reconcile(count, t, int_ty, false) {
                            self.fail(semantics_error(position, "repeat count must be an Int"));
                        }
                    }
                }
                for s in body {
                    self.check_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::Label { .. } | StmtKind::Continue | StmtKind::Break => {}
            StmtKind::Goto { target } | StmtKind::Gosub { target } => {
                self.infer_expr(target, None);
            }
            StmtKind::Return { value } => self.check_return(position, value),
            StmtKind::Extern { .. } => {}
            StmtKind::Namespace { body, scope, .. } => {
                let saved = self.current;
                self.current = scope.get().expect("Symbol Register attaches a scope to every Namespace");
                for s in body {
                    self.check_stmt(s);
                }
                self.current = saved;
            }
        }
    }

    fn check_return(&mut self, position: Position, value: &mut Option<Expr<'a>>) {
        let func_sym = match self.func_stack.last().copied() {
            Some(s) => s,
            None => {
                self.fail(semantics_error(position, "'return' outside a function"));
                return;
            }
        };
        match (func_sym.ret_ty.get(), value) {
            (Some(ret_ty), Some(v)) => {
                if matches!(ret_ty.unmodify(), Type::Builtin(Builtin::Void)) {
                    self.fail(semantics_error(position, "returning a value from a function declared Void"));
                    return;
                }
                if let Some(computed) = self.infer_expr(v, Some(ret_ty)) {
                    if !self.reconcile(v, computed, ret_ty, false) {
                        self.fail(semantics_error(position, "return value does not match the function's return type"));
                    }
                }
            }
            (Some(ret_ty), None) => {
                if !matches!(ret_ty.unmodify(), Type::Builtin(Builtin::Void)) {
                    self.fail(semantics_error(position, "missing return value in a non-Void function"));
                }
            }
            (None, Some(v)) => {
                if let Some(computed) = self.infer_expr(v, None) {
                    let noted = strip_ref(self.types, computed);
                    self.note_constraint(&func_sym.ret_ty, noted, true);
                }
            }
            (None, None) => {
                let void_ty = self.types.builtin(Builtin::Void);
                self.note_constraint(&func_sym.ret_ty, void_ty, true);
            }
        }
    }

    fn check_assign(&mut self, position: Position, op: &mut AssignOp, target: &mut Expr<'a>, value: &mut Option<Expr<'a>>) {
        let target_ty = match self.infer_expr(target, None) {
            Some(t) => t,
            None => return,
        };
        if !target_ty.is_ref() {
            self.fail(semantics_error(position, "assignment target must be a reference (a variable, array element, or field)"));
            return;
        }
        let sink = strip_ref(self.types, target_ty);
        use AssignOp::*;
        match *op {
            Assign => {
                if let Some(value) = value {
                    if let Some(v_ty) = self.infer_expr(value, Some(sink)) {
                        if !self.reconcile(value, v_ty, sink, false) {
                            self.fail(semantics_error(position, "assigned value does not match the variable's type"));
                        }
                    }
                }
            }
            Increment | Decrement => {
                if !is_numeric(sink.unmodify()) {
                    self.fail(semantics_error(position, "'++'/'--' require a numeric target"));
                }
            }
            AddAssign if matches!(sink.unmodify(), Type::Builtin(Builtin::String)) => {
                let Some(rhs) = value.as_mut() else { return };
                let Some(v_ty) = self.infer_expr(rhs, Some(sink)) else { return };
                if !self.reconcile(rhs, v_ty, sink, false) {
                    self.fail(semantics_error(position, "'+=' over String requires a String right-hand side"));
                    return;
                }
                self.lower_string_append(op, target, value, sink);
            }
            AddAssign | SubAssign | MulAssign | DivAssign | ModAssign => {
                if let Some(value) = value {
                    let bin_op = match *op {
                        AddAssign => BinOp::Add,
                        SubAssign => BinOp::Sub,
                        MulAssign => BinOp::Mul,
                        DivAssign => BinOp::Div,
                        ModAssign => BinOp::Mod,
                        _ => unreachable!(),
                    };
                    if let Some(v_ty) = self.infer_expr(value, Some(sink)) {
                        match self.binary_result_type(bin_op, sink, v_ty) {
                            Some((operand, _)) => {
                                if !self.reconcile(value, v_ty, operand, false) {
                                    self.fail(semantics_error(position, "compound assignment operand does not match"));
                                }
                            }
                            None => self.fail(semantics_error(position, "compound assignment is not defined for these types")),
                        }
                    }
                }
            }
        }
    }

    /// Rewrites `s += t` (String) from a compound assignment into
    /// `s = PRStringConcatenate(s, t)` (§4.6 "Assign", §6 runtime ABI).
    /// `value` has already been checked and reconciled to `sink` by the
    /// caller; this only restructures the statement, it does no further
    /// type inference.
    fn lower_string_append(&mut self, op: &mut AssignOp, target: &Expr<'a>, value: &mut Option<Expr<'a>>, sink: &'a Type<'a>) {
        let rhs = value.take().expect("caller checked value is Some");
        let mut read = target.clone();
        insert_deref(&mut read, sink);
        let token = target.token;
        let callee = Expr::new(ExprKind::Identifier { name: self.string_concat, symbol: Cell::new(None) }, token);
        let call = Expr::new(
            ExprKind::FuncCall { callee: Box::new(callee), args: vec![read, rhs], partial: false },
            token,
        );
        call.set_ty(sink);
        *op = AssignOp::Assign;
        *value = Some(call);
    }
}
