//! The compilation driver (§4, §5 "Pass pipeline"): wires Source Reader ->
//! Lexer -> Parser -> Symbol Register -> Symbol Resolver -> Type Resolver
//! into the single `compile` entry point `main.rs` calls.
//!
//! The arena triple (`ScopeArena`/`SymbolArena`/`TypeArena`) is owned by the
//! caller and borrowed for `'a`, the lifetime of one compilation, so that
//! the returned typed tree can keep borrowing into them after `compile`
//! returns — mirroring how the passes' own tests build this pipeline by
//! hand.

use std::cell::Cell;
use std::path::PathBuf;

use crate::ast::{Stmt, StmtKind};
use crate::breadcrumb::BreadcrumbTrail;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Warning, WarningSink};
use crate::intern::{Interner, Symbol};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::passes::register::Register;
use crate::passes::resolve::Resolver;
use crate::passes::typeck::TypeChecker;
use crate::scope::ScopeArena;
use crate::source::SourceReader;
use crate::symbol::{SymbolArena, SymbolRec};
use crate::token::{Token, TokenKind};
use crate::types::{Builtin, TypeArena};

/// Everything a caller needs after a successful compilation: the
/// type-annotated tree, the interner that its `Symbol`s resolve against,
/// and whatever warnings the run accumulated (§2 "Warning/Diagnostic
/// sink", flushed once at the end per §5).
pub struct CompileOutcome<'a> {
    pub root: Stmt<'a>,
    pub interner: Interner,
    pub warnings: Vec<Warning>,
    pub source: SourceMap,
}

/// The aggregated source buffer and its breadcrumb trail, captured the
/// moment the lexer finishes assembling them so a diagnostic can still be
/// rendered with source/caret lines after the lexer itself is gone —
/// whether compilation went on to succeed or fail partway through a later
/// pass.
pub struct SourceMap {
    pub buffer: String,
    pub breadcrumbs: BreadcrumbTrail,
}

/// What a failed [`compile`] call hands back: the error itself, plus
/// whatever the run had assembled before failing, so a caller like
/// `cli.rs` can still render a proper `<file>:<line>:<col>` diagnostic
/// instead of a bare message. `source` is `None` only when the failure
/// happened before the lexer finished assembling the buffer (e.g. a
/// missing `#import` target) — there's no source text to point at yet.
pub struct CompileFailure {
    pub error: CompileError,
    pub interner: Interner,
    pub source: Option<SourceMap>,
}

/// Runs the full front end over `main_path` and everything it
/// transitively `#import`s/`#include`s, against the three long-lived
/// arenas `scopes`/`symbols`/`types` (owned by the caller so the returned
/// `CompileOutcome` can keep borrowing from them).
pub fn compile<'a>(
    main_path: impl Into<PathBuf>,
    config: &CompilerConfig,
    scopes: &'a ScopeArena<'a>,
    symbols: &'a SymbolArena<'a>,
    types: &'a TypeArena<'a>,
) -> Result<CompileOutcome<'a>, CompileFailure> {
    let reader = SourceReader::new(main_path, config);
    let mut interner = Interner::new();

    let lexer = match Lexer::new(&reader, &mut interner, config) {
        Ok(lexer) => lexer,
        Err(error) => return Err(CompileFailure { error, interner, source: None }),
    };
    let source = SourceMap {
        buffer: lexer.buffer().to_string(),
        breadcrumbs: lexer.breadcrumbs().clone(),
    };

    let mut parser = Parser::new(lexer, config.hsp_compat);
    let body = match parser.parse_program() {
        Ok(body) => body,
        Err(error) => return Err(CompileFailure { error, interner, source: Some(source) }),
    };

    let mut root = Stmt::new(
        StmtKind::TransUnit { body, scope: Cell::new(None) },
        Token::synthetic(TokenKind::End, Symbol::EMPTY),
    );

    let warnings = WarningSink::new();

    if let Err(error) = Register::run(&mut interner, scopes, symbols, types, &warnings, config.hsp_compat, &mut root) {
        return Err(CompileFailure { error, interner, source: Some(source) });
    }

    let global = match &root.kind {
        StmtKind::TransUnit { scope, .. } => scope.get().expect("Symbol Register attaches the global scope"),
        _ => unreachable!("compile always wraps the program in a TransUnit"),
    };

    let implicit_globals = match Resolver::run(&interner, symbols, types, &warnings, config.hsp_compat, global, &mut root) {
        Ok(implicit_globals) => implicit_globals,
        Err(error) => return Err(CompileFailure { error, interner, source: Some(source) }),
    };

    // A name conjured purely from an unqualified read (§4.5) never gets a
    // declared type; default it to Int, the legacy dialect's untyped-value
    // type, before type-checking runs so every use site sees a concrete
    // type from the start instead of an unresolvable slot.
    for sym in &implicit_globals {
        if sym.ty().is_none() {
            sym.set_type(types.builtin(Builtin::Int));
        }
    }

    let string_concat = interner.intern(crate::ir::runtime_abi::STRING_CONCATENATE);
    if let Err(error) = TypeChecker::run(&interner, types, &warnings, config.hsp_compat, string_concat, global, &mut root) {
        return Err(CompileFailure { error, interner, source: Some(source) });
    }

    lift_implicit_globals(&mut root, &implicit_globals);

    Ok(CompileOutcome {
        root,
        interner,
        warnings: warnings.drain(),
        source,
    })
}

/// Prepends a synthetic `VarDef` for each HSP-compat implicit global
/// (§5 "After iteration, HSP-compat 'implicit globals' are lifted to
/// explicit VarDef statements prepended to the top-level statement
/// list"). Purely structural: each symbol is already fully typed by the
/// time this runs, so the synthesized statements carry no initializer.
fn lift_implicit_globals<'a>(root: &mut Stmt<'a>, implicit_globals: &[&'a SymbolRec<'a>]) {
    if implicit_globals.is_empty() {
        return;
    }
    let body = match &mut root.kind {
        StmtKind::TransUnit { body, .. } => body,
        _ => unreachable!("compile always wraps the program in a TransUnit"),
    };
    for sym in implicit_globals.iter().rev() {
        let stmt = Stmt::new(
            StmtKind::VarDef {
                name: sym.name,
                type_spec: None,
                init: None,
                symbol: Cell::new(Some(*sym)),
            },
            Token::synthetic(TokenKind::Var, sym.name),
        );
        body.insert(0, stmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn compile_src(src: &str, hsp_compat: bool) -> Result<(), CompileError> {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, src).unwrap();
        let config = CompilerConfig::new().with_hsp_compat(hsp_compat);
        let scopes = ScopeArena::new();
        let symbols = SymbolArena::new();
        let types = TypeArena::new();
        compile(&main, &config, &scopes, &symbols, &types).map_err(|f| f.error)?;
        Ok(())
    }

    #[test]
    fn compiles_a_simple_program() {
        compile_src("extern mes :: Int -> Void\nvar x :: Int = 1\nmes x\n", false).unwrap();
    }

    #[test]
    fn compiles_a_function_with_inferred_return_type() {
        let src = "extern mes :: Int -> Void\nfunc add(a :: Int, b :: Int) {\n    return a + b\n}\nmes add(1, 2)\n";
        compile_src(src, false).unwrap();
    }

    #[test]
    fn lifts_implicit_globals_into_vardefs() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, "mes x\n").unwrap();
        let config = CompilerConfig::new().with_hsp_compat(true);
        let scopes = ScopeArena::new();
        let symbols = SymbolArena::new();
        let types = TypeArena::new();
        let outcome = compile(&main, &config, &scopes, &symbols, &types)
            .unwrap_or_else(|f| panic!("{}", f.error.message()));
        let body = match &outcome.root.kind {
            StmtKind::TransUnit { body, .. } => body,
            _ => unreachable!(),
        };
        assert!(matches!(body[0].kind, StmtKind::VarDef { .. }));
        assert!(outcome.warnings.iter().any(|w| w.message.contains("implicit global")));
    }

    #[test]
    fn unknown_identifier_without_hsp_compat_is_an_error() {
        let err = compile_src("mes x\n", false);
        assert!(err.is_err());
    }
}
