//! Symbol Register (§4.4): the first tree pass. Walks the AST once,
//! creating a `Scope` object at every scope-introducing statement and
//! declaring every nameable entity in the scope current at that point.
//! Types are not computed here — only [`crate::symbol::SymbolKind`] and
//! declaration position.
//!
//! The [`Visitor`] trait's methods are infallible by design (§4 design
//! note: "Visitor over inheritance"), so this pass keeps its first error
//! in `self.error` and every visit method checks it before doing any work
//! — matching §5's "first error in any pass aborts the compilation".

use crate::ast::{Expr, ExprKind, Param, Stmt, StmtKind};
use crate::breadcrumb::{Position, NO_POSITION};
use crate::error::{semantics_error, CompileError, WarningSink};
use crate::intern::{Interner, Symbol};
use crate::passes::label_key_declare;
use crate::scope::{ScopeArena, ScopeKind, ScopeRef};
use crate::symbol::{SymbolArena, SymbolKind, SymbolRec};
use crate::types::{Builtin, TypeArena, RESERVED_NAMES};
use crate::visitor::{walk_expr, Visitor};

pub struct Register<'s, 'a> {
    interner: &'s mut Interner,
    scopes: &'a ScopeArena<'a>,
    symbols: &'a SymbolArena<'a>,
    types: &'a TypeArena<'a>,
    warnings: &'s WarningSink,
    hsp_compat: bool,
    current: ScopeRef<'a>,
    error: Option<CompileError>,
}

impl<'s, 'a> Register<'s, 'a> {
    /// Runs the pass over `root` (expected to be a `TransUnit`), after
    /// declaring the eight builtin type names in a fresh `Global` scope.
    pub fn run(
        interner: &'s mut Interner,
        scopes: &'a ScopeArena<'a>,
        symbols: &'a SymbolArena<'a>,
        types: &'a TypeArena<'a>,
        warnings: &'s WarningSink,
        hsp_compat: bool,
        root: &mut Stmt<'a>,
    ) -> Result<(), CompileError> {
        let global = scopes.alloc(ScopeKind::Global, None, Symbol::EMPTY);
        for builtin in [
            Builtin::Int,
            Builtin::String,
            Builtin::Char,
            Builtin::Float,
            Builtin::Double,
            Builtin::Bool,
            Builtin::Void,
            Builtin::Label,
        ] {
            let name = interner.intern(builtin.name());
            let sym = symbols.declare(name, SymbolKind::BuiltinType, global, NO_POSITION);
            sym.set_type(types.builtin(builtin));
            global
                .declare(name, sym)
                .expect("builtin type names are distinct and declared once");
        }

        let mut register = Register {
            interner,
            scopes,
            symbols,
            types,
            warnings,
            hsp_compat,
            current: global,
            error: None,
        };
        register.visit_stmt(root);
        register.error.map_or(Ok(()), Err)
    }

    fn fail(&mut self, e: CompileError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    fn reject_reserved(&mut self, name: Symbol, at: Position) -> bool {
        let text = self.interner.resolve(name);
        if RESERVED_NAMES.contains(&text) {
            self.fail(semantics_error(at, format!("'{text}' is a reserved identifier")));
            return true;
        }
        false
    }

    /// Declares `name` in the current scope, failing on a reserved name or
    /// a duplicate declaration in that exact scope (§4.4).
    fn declare(&mut self, name: Symbol, kind: SymbolKind, at: Position) -> Option<&'a SymbolRec<'a>> {
        if self.reject_reserved(name, at) {
            return None;
        }
        let sym = self.symbols.declare(name, kind, self.current, at);
        if self.current.declare(name, sym).is_err() {
            self.fail(semantics_error(
                at,
                format!("'{}' is already declared in this scope", self.interner.resolve(name)),
            ));
            return None;
        }
        Some(sym)
    }

    /// `repeat`'s implicit `cnt :: Int` (§4.6) bypasses the reserved-name
    /// check: it is system-introduced, not a user declaration of a
    /// reserved word.
    fn declare_cnt(&mut self, at: Position) -> Option<&'a SymbolRec<'a>> {
        let name = self.interner.intern("cnt");
        let sym = self.symbols.declare(name, SymbolKind::Var, self.current, at);
        sym.set_type(self.types.builtin(Builtin::Int));
        if self.current.declare(name, sym).is_err() {
            self.fail(semantics_error(at, "'cnt' is already declared in this scope"));
            return None;
        }
        Some(sym)
    }

    fn declare_params(&mut self, params: &mut [Param<'a>]) {
        for param in params {
            if self.error.is_some() {
                return;
            }
            if let Some(sym) = self.declare(param.name, SymbolKind::Var, param.token.position) {
                param.symbol.set(Some(sym));
            }
            if let Some(default) = &mut param.default {
                self.visit_expr(default);
            }
        }
    }

    /// Snapshots a `Func` symbol's ordered parameter `SymbolRec`s and their
    /// positional defaults, once `declare_params` has set each `Param`'s
    /// `symbol` cell (§4.6, used by the Type Resolver's call checking).
    fn record_params_and_defaults(&mut self, func_sym: &'a SymbolRec<'a>, params: &[Param<'a>]) {
        let mut syms = func_sym.params.borrow_mut();
        let mut defaults = func_sym.defaults.borrow_mut();
        for param in params {
            if let Some(sym) = param.symbol.get() {
                syms.push(sym);
            }
            defaults.push(param.default.clone());
        }
    }
}

impl<'s, 'a> Visitor<'a> for Register<'s, 'a> {
    fn visit_stmt(&mut self, stmt: &mut Stmt<'a>) {
        if self.error.is_some() {
            return;
        }
        let position = stmt.token.position;
        match &mut stmt.kind {
            StmtKind::TransUnit { body, scope } => {
                scope.set(Some(self.current));
                for s in body {
                    self.visit_stmt(s);
                }
            }
            StmtKind::Comp { body, scope } => {
                let saved = self.current;
                self.current = self.scopes.alloc(ScopeKind::Local, Some(saved), Symbol::EMPTY);
                scope.set(Some(self.current));
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::FuncDef { name, params, body, scope, symbol, .. } => {
                let name = *name;
                let func_sym = match self.declare(name, SymbolKind::Func, position) {
                    Some(s) => s,
                    None => return,
                };
                symbol.set(Some(func_sym));
                let saved = self.current;
                self.current = self.scopes.alloc(ScopeKind::Func, Some(saved), name);
                func_sym.own_scope.set(Some(self.current));
                scope.set(Some(self.current));
                self.declare_params(params);
                self.record_params_and_defaults(func_sym, params);
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::VarDef { name, init, symbol, .. } => {
                if let Some(sym) = self.declare(*name, SymbolKind::Var, position) {
                    symbol.set(Some(sym));
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
            StmtKind::Repeat { count, body, scope, cnt_symbol } => {
                let saved = self.current;
                self.current = self.scopes.alloc(ScopeKind::Local, Some(saved), Symbol::EMPTY);
                scope.set(Some(self.current));
                if let Some(sym) = self.declare_cnt(position) {
                    cnt_symbol.set(Some(sym));
                }
                if let Some(count) = count {
                    self.visit_expr(count);
                }
                for s in body {
                    self.visit_stmt(s);
                }
                self.current = saved;
            }
            StmtKind::Label { name, symbol } => {
                if !self.hsp_compat {
                    self.fail(semantics_error(
                        position,
                        "label declarations require HSP-compatibility mode",
                    ));
                    return;
                }
                self.warnings.push(position, "declaring a label (HSP-compatibility mode)");
                let key = label_key_declare(self.interner, *name);
                if let Some(sym) = self.declare(key, SymbolKind::Label, position) {
                    symbol.set(Some(sym));
                }
            }
            StmtKind::Goto { target } | StmtKind::Gosub { target } => self.visit_expr(target),
            StmtKind::Continue | StmtKind::Break => {}
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            StmtKind::Extern { name, symbol, .. } => {
                if let Some(sym) = self.declare(*name, SymbolKind::Extern, position) {
                    symbol.set(Some(sym));
                }
            }
            StmtKind::Namespace { name, body, scope, symbol } => {
                let name = *name;
                let ns_sym = match self.declare(name, SymbolKind::Namespace, position) {
                    Some(s) => s,
                    None => return,
                };
                symbol.set(Some(ns_sym));
                let saved = self.current;
                self.current = self.scopes.alloc(ScopeKind::Namespace, Some(saved), name);
                ns_sym.own_scope.set(Some(self.current));
                scope.set(Some(self.current));
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
            ExprKind::Func { params, body, symbol, .. } => {
                // Lambdas are anonymous: the scope they introduce is never
                // reachable by name, so it rides along on an unlinked
                // `SymbolRec` rather than a dedicated AST scope slot.
                let anon = self.symbols.declare(Symbol::EMPTY, SymbolKind::Func, self.current, expr.token.position);
                let saved = self.current;
                self.current = self.scopes.alloc(ScopeKind::Func, Some(saved), Symbol::EMPTY);
                anon.own_scope.set(Some(self.current));
                symbol.set(Some(anon));
                self.declare_params(params);
                self.record_params_and_defaults(anon, params);
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
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::SourceReader;
    use std::cell::Cell;
    use std::fs;

    fn register_src(src: &str, hsp_compat: bool) -> Result<(), CompileError> {
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
            StmtKind::TransUnit { body, scope: Cell::new(None) },
            crate::token::Token::synthetic(crate::token::TokenKind::End, Symbol::EMPTY),
        );
        let scopes = ScopeArena::new();
        let symbols = SymbolArena::new();
        let types = TypeArena::new();
        let warnings = WarningSink::new();
        Register::run(&mut interner, &scopes, &symbols, &types, &warnings, hsp_compat, &mut root)
    }

    #[test]
    fn duplicate_declaration_in_same_scope_errors() {
        let err = register_src("var x :: Int = 1\nvar x :: Int = 2\n", false);
        assert!(err.is_err());
    }

    #[test]
    fn shadowing_in_nested_block_is_legal() {
        let ok = register_src("var x :: Int = 1\n{\nvar x :: Int = 2\n}\n", false);
        assert!(ok.is_ok());
    }

    #[test]
    fn reserved_identifier_cannot_be_declared() {
        let err = register_src("var Int :: Int = 1\n", false);
        assert!(err.is_err());
    }

    #[test]
    fn label_outside_hsp_compat_is_an_error() {
        let err = register_src("*loop\ngoto *loop\n", false);
        assert!(err.is_err());
    }

    #[test]
    fn label_inside_hsp_compat_is_allowed() {
        let ok = register_src("*loop\ngoto *loop\n", true);
        assert!(ok.is_ok());
    }
}
