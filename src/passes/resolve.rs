//! Symbol Resolver (§4.5): the second tree pass. Binds every `Identifier`
//! and label reference to the symbol Symbol Register declared, elaborates
//! every `TypeSpec` that annotates a declaration into a concrete
//! [`crate::types::Type`], and reclassifies `namespace.member` postfix
//! chains — indistinguishable from ordinary member access at parse time —
//! into `ExprKind::StaticMember`.
//!
//! Scopes themselves are not created here: Symbol Register already
//! attached one to every scope-introducing node, so this pass only reads
//! it back before descending.

use std::cell::Cell;

use crate::ast::{Expr, ExprKind, Param, Stmt, StmtKind, TypeSpec, TypeSpecKind};
use crate::breadcrumb::{Position, NO_POSITION};
use crate::error::{semantics_error, CompileError, WarningSink};
use crate::intern::Interner;
use crate::passes::label_key_lookup;
use crate::scope::ScopeRef;
use crate::symbol::{SymbolArena, SymbolKind, SymbolRec};
use crate::types::{Type, TypeArena};
use crate::visitor::{walk_expr, Visitor};

/// Elaborates a parsed `TypeSpec` tree into a concrete `Type`, resolving
/// every name it mentions against `scope`. Shared by the Symbol Resolver
/// (declaration annotations) and the Type Resolver, which meets a fresh
/// `TypeSpec` every time it reaches a `Constructor` node — both need
/// exactly this lookup.
pub fn elaborate_type_spec<'a>(
    types: &'a TypeArena<'a>,
    scope: ScopeRef<'a>,
    interner: &Interner,
    spec: &TypeSpec<'a>,
) -> Result<&'a Type<'a>, CompileError> {
    let base = match &spec.kind {
        TypeSpecKind::Simple { name } => {
            let sym = scope.lookup(*name, spec.token.position).ok_or_else(|| {
                semantics_error(spec.token.position, format!("unknown type '{}'", interner.resolve(*name)))
            })?;
            type_from_symbol(types, sym, spec.token.position, interner)?
        }
        TypeSpecKind::Array { elem } => {
            let e = elaborate_type_spec(types, scope, interner, elem)?;
            types.array(e)
        }
        TypeSpecKind::Func { car, cdr } => {
            let c = elaborate_type_spec(types, scope, interner, car)?;
            let d = elaborate_type_spec(types, scope, interner, cdr)?;
            types.func(c, d)
        }
        TypeSpecKind::Member { namespace, member } => {
            let ns_ty = elaborate_type_spec(types, scope, interner, namespace)?;
            let ns_sym = match ns_ty.unmodify() {
                Type::Namespace(sym) => *sym,
                _ => {
                    return Err(semantics_error(
                        spec.token.position,
                        "left side of '.' in a type annotation is not a namespace",
                    ))
                }
            };
            let ns_scope = ns_sym.own_scope.get().expect("namespace symbols carry a scope");
            let member_sym = ns_scope.lookup_local_any_position(*member).ok_or_else(|| {
                semantics_error(
                    spec.token.position,
                    format!(
                        "namespace '{}' has no member '{}'",
                        interner.resolve(ns_sym.name),
                        interner.resolve(*member)
                    ),
                )
            })?;
            type_from_symbol(types, member_sym, spec.token.position, interner)?
        }
    };
    Ok(types.modify(base, spec.is_const, spec.is_ref))
}

fn type_from_symbol<'a>(
    types: &'a TypeArena<'a>,
    sym: &'a SymbolRec<'a>,
    at: Position,
    interner: &Interner,
) -> Result<&'a Type<'a>, CompileError> {
    match sym.kind {
        SymbolKind::BuiltinType => Ok(sym.ty().expect("builtin types are pre-typed by Symbol Register")),
        SymbolKind::Namespace => Ok(types.namespace(sym)),
        _ => Err(semantics_error(at, format!("'{}' is not a type", interner.resolve(sym.name)))),
    }
}

pub struct Resolver<'s, 'a> {
    interner: &'s Interner,
    symbols: &'a SymbolArena<'a>,
    types: &'a TypeArena<'a>,
    warnings: &'s WarningSink,
    hsp_compat: bool,
    global: ScopeRef<'a>,
    current: ScopeRef<'a>,
    error: Option<CompileError>,
    /// Variables conjured by HSP-compatibility "implicit global" references
    /// (§4.5); `compile` later synthesizes a `VarDef` for each so they show
    /// up in the typed tree like any other declaration.
    implicit_globals: Vec<&'a SymbolRec<'a>>,
}

impl<'s, 'a> Resolver<'s, 'a> {
    /// Runs the pass over `root`, returning the implicit globals it
    /// conjured along the way (§4.5 "HSP-compatibility ... implicit global
    /// variable") so `compile` can synthesize a `VarDef` for each once
    /// their types are known.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        interner: &'s Interner,
        symbols: &'a SymbolArena<'a>,
        types: &'a TypeArena<'a>,
        warnings: &'s WarningSink,
        hsp_compat: bool,
        global: ScopeRef<'a>,
        root: &mut Stmt<'a>,
    ) -> Result<Vec<&'a SymbolRec<'a>>, CompileError> {
        let mut resolver = Resolver {
            interner,
            symbols,
            types,
            warnings,
            hsp_compat,
            global,
            current: global,
            error: None,
            implicit_globals: Vec::new(),
        };
        resolver.visit_stmt(root);
        match resolver.error {
            Some(e) => Err(e),
            None => Ok(resolver.implicit_globals),
        }
    }

    fn fail(&mut self, e: CompileError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    fn elaborate(&mut self, spec: &TypeSpec<'a>) -> Option<&'a Type<'a>> {
        match elaborate_type_spec(self.types, self.current, self.interner, spec) {
            Ok(ty) => Some(ty),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn resolve_param(&mut self, param: &mut Param<'a>) {
        if self.error.is_some() {
            return;
        }
        if let Some(type_spec) = &param.type_spec {
            if let Some(ty) = self.elaborate(type_spec) {
                param.symbol.get().expect("param symbol set by Symbol Register").set_type(ty);
            }
        }
        if let Some(default) = &mut param.default {
            self.visit_expr(default);
        }
    }

    /// `Member{receiver, ...}` and `namespace.member` are syntactically
    /// identical at parse time; this reclassifies the node into
    /// `StaticMember` once `receiver` turns out to name a namespace.
    fn resolve_member(&mut self, expr: &mut Expr<'a>) {
        let kind = std::mem::replace(&mut expr.kind, ExprKind::BoolLit(false));
        let (mut receiver, member, member_token) = match kind {
            ExprKind::Member { receiver, member, member_token } => (receiver, member, member_token),
            other => {
                expr.kind = other;
                return;
            }
        };
        self.visit_expr(&mut receiver);
        let namespace_sym = match &receiver.kind {
            ExprKind::Identifier { symbol, .. } => symbol.get().filter(|s| s.kind == SymbolKind::Namespace),
            _ => None,
        };
        match namespace_sym {
            Some(ns_sym) => {
                let ns_scope = ns_sym.own_scope.get().expect("namespace symbols carry a scope");
                match ns_scope.lookup_local_any_position(member) {
                    Some(member_sym) => {
                        expr.kind = ExprKind::StaticMember {
                            namespace: receiver,
                            member,
                            member_token,
                            symbol: Cell::new(Some(member_sym)),
                        };
                    }
                    None => {
                        self.fail(semantics_error(
                            member_token.position,
                            format!(
                                "namespace '{}' has no member '{}'",
                                self.interner.resolve(ns_sym.name),
                                self.interner.resolve(member)
                            ),
                        ));
                        expr.kind = ExprKind::StaticMember {
                            namespace: receiver,
                            member,
                            member_token,
                            symbol: Cell::new(None),
                        };
                    }
                }
            }
            None => {
                expr.kind = ExprKind::Member { receiver, member, member_token };
            }
        }
    }
}

impl<'s, 'a> Visitor<'a> for Resolver<'s, 'a> {
    fn visit_stmt(&mut self, stmt: &mut Stmt<'a>) {
        if self.error.is_some() {
            return;
        }
        let position = stmt.token.position;
        match &mut stmt.kind {
            StmtKind::TransUnit { body, .. } => {
                for s in body {
                    self.visit_stmt(s);
                }
            }
            StmtKind::Comp { body, scope } => {
                let saved = self.current;
                self.current = scope.get().expect("Symbol Register attaches a scope to every Comp");
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::FuncDef { params, ret_type, body, scope, symbol, .. } => {
                let saved = self.current;
                self.current = scope.get().expect("Symbol Register attaches a scope to every FuncDef");
                for p in params {
                    self.resolve_param(p);
                }
                if let Some(ret_type) = ret_type {
                    if let Some(ty) = self.elaborate(ret_type) {
                        symbol.get().expect("FuncDef symbol set by Symbol Register").ret_ty.set(Some(ty));
                    }
                }
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::VarDef { type_spec, init, symbol, .. } => {
                if let Some(type_spec) = type_spec {
                    let is_ref_decl = type_spec.is_ref;
                    if let Some(ty) = self.elaborate(type_spec) {
                        symbol.get().expect("VarDef symbol set by Symbol Register").set_type(ty);
                    }
                    if is_ref_decl && init.is_none() {
                        self.fail(semantics_error(
                            position,
                            "a reference variable must be initialized where it is declared",
                        ));
                        return;
                    }
                }
                if let Some(init) = init {
                    self.visit_expr(init);
                }
            }
            StmtKind::Inst { call } => self.visit_expr(call),
            StmtKind::Assign { target, value, .. } => {
                self.visit_expr(target);
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                self.visit_expr(cond);
                for s in then_branch {
                    self.visit_stmt(s);
                }
                if let Some(else_branch) = else_branch {
                    for s in else_branch {
                        self.visit_stmt(s);
                    }
                }
            }
            StmtKind::Repeat { count, body, scope, .. } => {
                let saved = self.current;
                self.current = scope.get().expect("Symbol Register attaches a scope to every Repeat");
                if let Some(count) = count {
                    self.visit_expr(count);
                }
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::Label { .. } => {}
            StmtKind::Goto { target } | StmtKind::Gosub { target } => self.visit_expr(target),
            StmtKind::Continue | StmtKind::Break => {}
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            StmtKind::Extern { params, ret_type, symbol, .. } => {
                let mut param_types = Vec::with_capacity(params.len());
                for p in params.iter() {
                    if p.is_const || p.is_ref {
                        self.fail(semantics_error(
                            p.token.position,
                            "an extern parameter type may not carry 'const' or 'ref'",
                        ));
                        return;
                    }
                    match self.elaborate(p) {
                        Some(ty) => param_types.push(ty),
                        None => return,
                    }
                }
                if ret_type.is_const || ret_type.is_ref {
                    self.fail(semantics_error(
                        ret_type.token.position,
                        "an extern return type may not carry 'const' or 'ref'",
                    ));
                    return;
                }
                let ret = match self.elaborate(ret_type) {
                    Some(ty) => ty,
                    None => return,
                };
                let func_ty = self.types.func_from_params(&param_types, ret);
                symbol.get().expect("Extern symbol set by Symbol Register").set_type(func_ty);
            }
            StmtKind::Namespace { body, scope, .. } => {
                let saved = self.current;
                self.current = scope.get().expect("Symbol Register attaches a scope to every Namespace");
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr<'a>) {
        if self.error.is_some() {
            return;
        }
        match &mut expr.kind {
            ExprKind::Identifier { name, symbol } => {
                let name = *name;
                if let Some(sym) = self.current.lookup(name, expr.token.position) {
                    symbol.set(Some(sym));
                } else if self.hsp_compat {
                    let sym = self.symbols.declare(name, SymbolKind::Var, self.global, NO_POSITION);
                    self.global.declare(name, sym).expect("a fresh implicit-global name cannot already be declared");
                    self.warnings
                        .push(expr.token.position, format!("implicit global variable '{}'", self.interner.resolve(name)));
                    self.implicit_globals.push(sym);
                    symbol.set(Some(sym));
                } else {
                    self.fail(semantics_error(
                        expr.token.position,
                        format!("unknown identifier '{}'", self.interner.resolve(name)),
                    ));
                }
            }
            ExprKind::Label { name, symbol } => {
                let name = *name;
                let found = label_key_lookup(self.interner, name).and_then(|key| self.current.lookup(key, expr.token.position));
                match found {
                    Some(sym) => symbol.set(Some(sym)),
                    None => self.fail(semantics_error(
                        expr.token.position,
                        format!("unknown label '*{}'", self.interner.resolve(name)),
                    )),
                }
            }
            ExprKind::Member { .. } => self.resolve_member(expr),
            ExprKind::Func { params, ret_type, body, symbol } => {
                let func_sym = symbol.get().expect("Symbol Register attaches a symbol to every Func expr");
                let saved = self.current;
                self.current = func_sym.own_scope.get().expect("Symbol Register attaches an own_scope to every Func expr");
                for p in params {
                    self.resolve_param(p);
                }
                if let Some(ret_type) = ret_type {
                    if let Some(ty) = self.elaborate(ret_type) {
                        func_sym.ret_ty.set(Some(ty));
                    }
                }
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            _ => walk_expr(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;
    use crate::config::CompilerConfig;
    use crate::intern::Interner;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::passes::register::Register;
    use crate::scope::ScopeArena;
    use crate::source::SourceReader;
    use std::cell::Cell as StdCell;
    use std::fs;

    fn resolve_src(src: &str, hsp_compat: bool) -> Result<Vec<String>, CompileError> {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, src).unwrap();
        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let mut interner = Interner::new();
        let lexer = Lexer::new(&reader, &mut interner, &config).unwrap();
        let mut parser = Parser::<'_, 'static>::new(lexer, hsp_compat);
        let body = parser.parse_program().unwrap();
        let mut root = Stmt::new(
            StmtKind::TransUnit { body, scope: StdCell::new(None) },
            crate::token::Token::synthetic(crate::token::TokenKind::End, crate::intern::Symbol::EMPTY),
        );
        let scopes = ScopeArena::new();
        let symbols = SymbolArena::new();
        let types = TypeArena::new();
        let warnings = WarningSink::new();
        Register::run(&mut interner, &scopes, &symbols, &types, &warnings, hsp_compat, &mut root)?;
        let global = match &root.kind {
            StmtKind::TransUnit { scope, .. } => scope.get().unwrap(),
            _ => unreachable!(),
        };
        let implicit = Resolver::run(&interner, &symbols, &types, &warnings, hsp_compat, global, &mut root)?;
        Ok(implicit.iter().map(|s| interner.resolve(s.name).to_string()).collect())
    }

    #[test]
    fn unknown_identifier_is_an_error_without_hsp_compat() {
        let err = resolve_src("mes x\n", false);
        assert!(err.is_err());
    }

    #[test]
    fn hsp_compat_conjures_an_implicit_global() {
        let implicit = resolve_src("mes x\n", true).unwrap();
        assert_eq!(implicit, vec!["x".to_string()]);
    }

    #[test]
    fn known_variable_resolves_without_error() {
        let ok = resolve_src("var x :: Int = 1\nmes x\n", false);
        assert!(ok.is_ok());
    }

    #[test]
    fn ref_var_without_initializer_is_an_error() {
        let err = resolve_src("var r :: ref Int\n", false);
        assert!(err.is_err());
    }

    #[test]
    fn namespace_member_resolves_as_static_member() {
        let ok = resolve_src("namespace Geometry {\nvar pi :: Float = 3\n}\nmes Geometry.pi\n", false);
        assert!(ok.is_ok());
    }

    #[test]
    fn unknown_namespace_member_is_an_error() {
        let err = resolve_src("namespace Geometry {\nvar pi :: Float = 3\n}\nmes Geometry.tau\n", false);
        assert!(err.is_err());
    }
}
