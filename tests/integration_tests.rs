//! End-to-end scenarios against the public `compile` entry point, plus a
//! handful of whole-pipeline invariants (§8 "Testable properties") that
//! only make sense exercised from outside the crate, the way the
//! teacher's own top-level `tests/integration_tests.rs` drives its
//! `compile`/`parse!` entry points rather than reaching into pass
//! internals.

use std::fs;

use peryan::ast::{BinOp, Expr, ExprKind, Stmt, StmtKind};
use peryan::compile::{compile, CompileOutcome};
use peryan::config::CompilerConfig;
use peryan::error::CompileError;
use peryan::scope::ScopeArena;
use peryan::symbol::SymbolArena;
use peryan::types::{Builtin, Type, TypeArena};

/// Writes `src` to a temp main file and runs the full pipeline. The three
/// arenas are genuinely leaked (not just lifetime-cast) so the returned
/// `CompileOutcome`, which really does borrow scopes/symbols/types
/// allocated in them, can outlive this helper — fine for a test process,
/// never done in `compile.rs` itself.
fn compile_ok(src: &str, hsp_compat: bool) -> CompileOutcome<'static> {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.pr");
    fs::write(&main, src).unwrap();
    let config = CompilerConfig::new().with_hsp_compat(hsp_compat);
    let scopes: &'static ScopeArena<'static> = Box::leak(Box::new(ScopeArena::new()));
    let symbols: &'static SymbolArena<'static> = Box::leak(Box::new(SymbolArena::new()));
    let types: &'static TypeArena<'static> = Box::leak(Box::new(TypeArena::new()));
    compile(&main, &config, scopes, symbols, types).unwrap_or_else(|f| panic!("{}", f.error.message()))
}

fn compile_err(src: &str, hsp_compat: bool) -> CompileError {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.pr");
    fs::write(&main, src).unwrap();
    let config = CompilerConfig::new().with_hsp_compat(hsp_compat);
    let scopes = ScopeArena::new();
    let symbols = SymbolArena::new();
    let types = TypeArena::new();
    match compile(&main, &config, &scopes, &symbols, &types) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(f) => f.error,
    }
}

fn top_level<'a>(outcome: &'a CompileOutcome<'a>) -> &'a [Stmt<'a>] {
    match &outcome.root.kind {
        StmtKind::TransUnit { body, .. } => body,
        _ => unreachable!(),
    }
}

fn is_const_builtin(ty: &Type, builtin: Builtin) -> bool {
    ty.is_const() && !ty.is_ref() && ty.as_builtin() == Some(builtin)
}

// ═══════════════════════════════════════════════════════════════════
// E1 — arithmetic precedence and constant folding of types
// ═══════════════════════════════════════════════════════════════════

#[test]
fn e1_var_with_precedence_respecting_binary_tree() {
    let outcome = compile_ok("var x :: Int = 1 + 2 * 3\n", false);
    let body = top_level(&outcome);
    assert_eq!(body.len(), 1);
    let init = match &body[0].kind {
        StmtKind::VarDef { init: Some(init), .. } => init,
        _ => panic!("expected a VarDef with an initializer"),
    };
    match &init.kind {
        ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
            assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }), "RHS of + should be the * term");
        }
        _ => panic!("expected a top-level Binary(+)"),
    }
    assert!(is_const_builtin(init.ty().unwrap(), Builtin::Int));
}

// ═══════════════════════════════════════════════════════════════════
// E2 — string concatenation through an extern instruction call
// ═══════════════════════════════════════════════════════════════════

#[test]
fn e2_inst_stmt_wraps_string_concatenation() {
    let outcome = compile_ok("extern mes :: String -> Void\nmes \"Hello\" + \" World\"\n", false);
    let body = top_level(&outcome);
    let call = match &body[1].kind {
        StmtKind::Inst { call } => call,
        _ => panic!("expected the second statement to be an Inst"),
    };
    let arg = match &call.kind {
        ExprKind::FuncCall { args, .. } => &args[0],
        _ => panic!("expected Inst's call to be a FuncCall"),
    };
    assert!(matches!(arg.kind, ExprKind::Binary { op: BinOp::Add, .. }));
    assert!(is_const_builtin(arg.ty().unwrap(), Builtin::String));
}

// ═══════════════════════════════════════════════════════════════════
// E3 — inference fixpoint across a function boundary
// ═══════════════════════════════════════════════════════════════════

#[test]
fn e3_function_and_call_site_infer_int() {
    let outcome = compile_ok("func f(x) { return x * x }\nvar y = f(7)\n", false);
    let body = top_level(&outcome);
    let f_sym = match &body[0].kind {
        StmtKind::FuncDef { symbol, .. } => symbol.get().unwrap(),
        _ => panic!("expected a FuncDef"),
    };
    let (params, ret) = f_sym.ty().unwrap().func_parts().unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].unmodify().as_builtin(), Some(Builtin::Int));
    assert_eq!(ret.as_builtin(), Some(Builtin::Int));

    let y_sym = match &body[1].kind {
        StmtKind::VarDef { symbol, .. } => symbol.get().unwrap(),
        _ => panic!("expected a VarDef"),
    };
    assert_eq!(y_sym.ty().unwrap().unmodify().as_builtin(), Some(Builtin::Int));
}

// ═══════════════════════════════════════════════════════════════════
// E4 — arrays and subscripting
// ═══════════════════════════════════════════════════════════════════

#[test]
fn e4_array_literal_and_subscript() {
    let outcome = compile_ok("var a :: [Int] = [3,1,4,1,5]\nvar r = a[2]\n", false);
    let body = top_level(&outcome);
    let a_sym = match &body[0].kind {
        StmtKind::VarDef { symbol, .. } => symbol.get().unwrap(),
        _ => panic!("expected a VarDef"),
    };
    let elem = a_sym.ty().unwrap().unmodify().as_array_elem().unwrap();
    assert_eq!(elem.as_builtin(), Some(Builtin::Int));

    let r_sym = match &body[1].kind {
        StmtKind::VarDef { symbol, .. } => symbol.get().unwrap(),
        _ => panic!("expected a second VarDef"),
    };
    assert_eq!(r_sym.ty().unwrap().unmodify().as_builtin(), Some(Builtin::Int));

    let r_init = match &body[1].kind {
        StmtKind::VarDef { init: Some(init), .. } => init,
        _ => panic!("expected r's VarDef to carry an initializer"),
    };
    // The initializer is the Subscr, wrapped in a Deref on load (see the
    // ref/deref invariant test below) — unwrap it to find the Subscr.
    let is_subscr = |e: &Expr| matches!(e.kind, ExprKind::Subscr { .. });
    let found = match &r_init.kind {
        ExprKind::Deref(inner) => is_subscr(inner),
        ExprKind::Subscr { .. } => true,
        _ => false,
    };
    assert!(found, "expected r's initializer to be a Subscr, optionally wrapped in a Deref");
}

// ═══════════════════════════════════════════════════════════════════
// E5 — labels are an HSP-compat-only feature
// ═══════════════════════════════════════════════════════════════════

#[test]
fn e5_label_and_goto_resolve_to_the_same_symbol_in_hsp_compat() {
    let outcome = compile_ok("*L\ngoto *L\n", true);
    let body = top_level(&outcome);
    let label_sym = match &body[0].kind {
        StmtKind::Label { symbol, .. } => symbol.get().unwrap(),
        _ => panic!("expected a Label statement"),
    };
    let goto_sym = match &body[1].kind {
        StmtKind::Goto { target } => match &target.kind {
            ExprKind::Label { symbol, .. } => symbol.get().unwrap(),
            _ => panic!("expected Goto's target to be a Label expression"),
        },
        _ => panic!("expected a Goto statement"),
    };
    assert!(std::ptr::eq(label_sym, goto_sym));
}

#[test]
fn e5_label_outside_hsp_compat_is_a_semantics_error() {
    let err = compile_err("*L\ngoto *L\n", false);
    assert!(matches!(err, CompileError::Semantics(_)));
}

// ═══════════════════════════════════════════════════════════════════
// E6 — an uninitialized ref variable is rejected
// ═══════════════════════════════════════════════════════════════════

#[test]
fn e6_uninitialized_ref_variable_is_an_error() {
    let err = compile_err("var x :: ref Int\n", false);
    assert!(err.message().contains("must be initialized"), "got: {}", err.message());
}

// ═══════════════════════════════════════════════════════════════════
// Testable property 3 — diamond #import is deduplicated
// ═══════════════════════════════════════════════════════════════════

#[test]
fn diamond_import_is_inlined_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("base.pr"), "var shared :: Int = 1\n").unwrap();
    fs::write(dir.path().join("left.pr"), "#import \"base.pr\"\n").unwrap();
    fs::write(dir.path().join("right.pr"), "#import \"base.pr\"\n").unwrap();
    fs::write(
        dir.path().join("main.pr"),
        "#import \"left.pr\"\n#import \"right.pr\"\nmes shared\n",
    )
    .unwrap();
    fs::write(dir.path().join("peryandefs"), "").unwrap_or(());
    // An extern so `mes` is resolvable, importable from main too.
    let src_main = fs::read_to_string(dir.path().join("main.pr")).unwrap();
    fs::write(
        dir.path().join("main.pr"),
        format!("extern mes :: Int -> Void\n{src_main}"),
    )
    .unwrap();

    let config = CompilerConfig::new();
    let scopes = ScopeArena::new();
    let symbols = SymbolArena::new();
    let types = TypeArena::new();
    let outcome = compile(dir.path().join("main.pr"), &config, &scopes, &symbols, &types)
        .unwrap_or_else(|f| panic!("{}", f.error.message()));
    // `base.pr`'s `var shared` must have been declared exactly once — a
    // second splice would have produced a duplicate-declaration error
    // instead of a clean compile.
    assert!(outcome.warnings.is_empty() || outcome.warnings.iter().all(|w| !w.message.contains("duplicate")));
}

// ═══════════════════════════════════════════════════════════════════
// Testable property 5 — scope shadowing vs. same-scope redeclaration
// ═══════════════════════════════════════════════════════════════════

#[test]
fn shadowing_an_outer_variable_in_a_nested_block_is_legal() {
    compile_ok("var x :: Int = 1\n{\n    var x :: Int = 2\n}\n", false);
}

#[test]
fn redeclaring_in_the_same_scope_is_an_error() {
    let err = compile_err("var x :: Int = 1\nvar x :: Int = 2\n", false);
    assert!(matches!(err, CompileError::Semantics(_)));
}

// ═══════════════════════════════════════════════════════════════════
// Testable property 6 — forward reference policy
// ═══════════════════════════════════════════════════════════════════

#[test]
fn forward_reference_to_a_variable_is_an_error() {
    let err = compile_err("var y :: Int = x\nvar x :: Int = 1\n", false);
    assert!(matches!(err, CompileError::Semantics(_)));
}

#[test]
fn forward_reference_to_a_function_is_legal() {
    compile_ok("func caller() { return callee() }\nfunc callee() :: Int { return 1 }\n", false);
}

// ═══════════════════════════════════════════════════════════════════
// Testable property 9 — every read is a Deref, every assign target a ref
// ═══════════════════════════════════════════════════════════════════

#[test]
fn reading_a_variable_wraps_it_in_exactly_one_deref() {
    let outcome = compile_ok("var x :: Int = 1\nvar y :: Int = x\n", false);
    let body = top_level(&outcome);
    let init = match &body[1].kind {
        StmtKind::VarDef { init: Some(init), .. } => init,
        _ => panic!("expected y's VarDef to carry an initializer"),
    };
    match &init.kind {
        ExprKind::Deref(inner) => assert!(matches!(inner.kind, ExprKind::Identifier { .. })),
        _ => panic!("expected a single Deref around the Identifier read"),
    }
}

#[test]
fn assignment_target_is_ref_typed() {
    let outcome = compile_ok("var x :: Int = 1\nx = 2\n", false);
    let body = top_level(&outcome);
    let target = match &body[1].kind {
        StmtKind::Assign { target, .. } => target,
        _ => panic!("expected an Assign statement"),
    };
    assert!(target.ty().unwrap().is_ref());
}

// ═══════════════════════════════════════════════════════════════════
// String `+=` lowers to a PRStringConcatenate call
// ═══════════════════════════════════════════════════════════════════

#[test]
fn string_add_assign_lowers_to_a_concatenate_call() {
    let outcome = compile_ok("var s :: String = \"a\"\ns += \"b\"\n", false);
    let body = top_level(&outcome);
    let (op, value) = match &body[1].kind {
        StmtKind::Assign { op, value, .. } => (*op, value),
        _ => panic!("expected an Assign statement"),
    };
    assert_eq!(op, peryan::ast::AssignOp::Assign, "AddAssign should have been rewritten to plain Assign");
    let call = value.as_ref().expect("the rewrite installs a call as the assigned value");
    let (callee, args) = match &call.kind {
        ExprKind::FuncCall { callee, args, .. } => (callee, args),
        _ => panic!("expected the assigned value to be a FuncCall"),
    };
    match &callee.kind {
        ExprKind::Identifier { name, .. } => assert_eq!(outcome.interner.resolve(*name), "PRStringConcatenate"),
        _ => panic!("expected the call's callee to be an Identifier"),
    }
    assert_eq!(args.len(), 2);
    assert!(matches!(args[0].kind, ExprKind::Deref(_)), "the first argument should be a read of the target");
    assert!(is_const_builtin(call.ty().unwrap(), Builtin::String));
}

#[test]
fn numeric_add_assign_is_left_as_a_compound_assignment() {
    let outcome = compile_ok("var n :: Int = 1\nn += 2\n", false);
    let body = top_level(&outcome);
    match &body[1].kind {
        StmtKind::Assign { op, .. } => assert_eq!(*op, peryan::ast::AssignOp::AddAssign),
        _ => panic!("expected an Assign statement"),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Testable property 10 — redundant constructor peephole rewrite
// ═══════════════════════════════════════════════════════════════════

#[test]
fn redundant_string_constructor_is_stripped_to_the_literal() {
    let outcome = compile_ok("var s :: String = String(\"hi\")\n", false);
    let body = top_level(&outcome);
    let init = match &body[0].kind {
        StmtKind::VarDef { init: Some(init), .. } => init,
        _ => panic!("expected a VarDef with an initializer"),
    };
    fn unwraps_to_str_lit(e: &Expr) -> bool {
        match &e.kind {
            ExprKind::StrLit(_) => true,
            ExprKind::Promote(inner) | ExprKind::Ref(inner) | ExprKind::Deref(inner) => unwraps_to_str_lit(inner),
            _ => false,
        }
    }
    assert!(unwraps_to_str_lit(init), "expected the redundant String(...) wrap to be peephole-stripped");
}

// ═══════════════════════════════════════════════════════════════════
// HSP-compat promotion widening vs. strict mode
// ═══════════════════════════════════════════════════════════════════

#[test]
fn hsp_compat_widens_int_to_string_with_a_warning() {
    let outcome = compile_ok("extern mes :: String -> Void\nvar s :: String = 1\nmes s\n", true);
    assert!(outcome.warnings.iter().any(|w| w.message.to_lowercase().contains("promot") || w.message.to_lowercase().contains("convert")));
}

#[test]
fn strict_mode_rejects_int_to_string() {
    let err = compile_err("var s :: String = 1\n", false);
    assert!(matches!(err, CompileError::Semantics(_)));
}

// ═══════════════════════════════════════════════════════════════════
// Reserved identifiers (§6)
// ═══════════════════════════════════════════════════════════════════

#[test]
fn declaring_a_reserved_name_is_an_error() {
    let err = compile_err("var Int :: Int = 1\n", false);
    assert!(matches!(err, CompileError::Semantics(_)));
}
