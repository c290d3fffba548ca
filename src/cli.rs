//! The `peryanc` command-line driver (§6 "Command-line"): parses
//! `<input> <output>` plus `-I`/`--dump-ast`/`--verbose`/`--strict`,
//! wires them into a [`CompilerConfig`], runs [`compile`], and renders
//! whatever comes back through [`diagnostic`]. Mirrors the teacher's
//! `main.rs` shape of "run, print the error, exit non-zero" rather than
//! its subcommand dispatch — this driver only ever does one thing.

use std::path::PathBuf;

use clap::Parser;

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::compile::compile;
use crate::config::CompilerConfig;
use crate::diagnostic::render_error;
use crate::intern::Interner;
use crate::ir::collect_function_signatures;
use crate::scope::ScopeArena;
use crate::symbol::SymbolArena;
use crate::types::{describe, TypeArena};

/// CLI surface as specified in §6: two positionals and four flags, no
/// subcommands.
#[derive(Parser, Debug)]
#[command(name = "peryanc", about = "Peryan batch compiler front-end")]
pub struct Cli {
    /// Main source file to compile.
    pub input: PathBuf,

    /// Where to write compiler output (consumed here only to reserve the
    /// argument position; lowering and code generation are out of scope).
    pub output: PathBuf,

    /// Adds a directory to the `#import`/`#include` search path. Repeatable.
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Prints the resolved AST to the diagnostic stream after a successful
    /// compile.
    #[arg(long)]
    pub dump_ast: bool,

    /// Emits progress lines between passes on stderr.
    #[arg(long)]
    pub verbose: bool,

    /// Reserved for a stricter diagnostic mode; threaded through to
    /// `CompilerConfig` but not yet consulted by any pass.
    #[arg(long)]
    pub strict: bool,
}

/// Parses `std::env::args`, runs the compiler, and returns a process exit
/// code — 0 on success, 1 on any [`CompileError`](crate::error::CompileError).
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    let config = CompilerConfig::from_env_and_args(cli.include.clone(), cli.dump_ast, cli.verbose, cli.strict);

    let scopes = ScopeArena::new();
    let symbols = SymbolArena::new();
    let types = TypeArena::new();

    if cli.verbose {
        eprintln!("peryanc: compiling {}", cli.input.display());
    }

    match compile(&cli.input, &config, &scopes, &symbols, &types) {
        Ok(mut outcome) => {
            for warning in &outcome.warnings {
                eprint!(
                    "{}",
                    crate::diagnostic::render_warning(&outcome.source.buffer, &outcome.source.breadcrumbs, &outcome.interner, warning)
                );
            }

            if cli.verbose {
                let sigs = collect_function_signatures(&mut outcome.root);
                eprintln!("peryanc: {} function signature(s) ready for lowering", sigs.len());
            }

            if cli.dump_ast {
                let mut out = String::new();
                dump_stmt(&outcome.root, &outcome.interner, 0, &mut out);
                eprint!("{out}");
            }

            0
        }
        Err(failure) => {
            match &failure.source {
                Some(source) => {
                    eprint!("{}", render_error(&source.buffer, &source.breadcrumbs, &failure.interner, &failure.error));
                }
                None => {
                    eprintln!("peryanc: error: {}", failure.error.message());
                }
            }
            1
        }
    }
}

/// A minimal recursive AST dumper for `--dump-ast`: one indented line per
/// node, named after its `StmtKind`/`ExprKind` variant, with enough of the
/// resolved symbol/type information to be useful for inspecting a
/// compiled program. Not a stable format — nothing downstream parses it.
fn dump_stmt(stmt: &Stmt, interner: &Interner, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match &stmt.kind {
        StmtKind::TransUnit { body, .. } => {
            out.push_str(&format!("{pad}TransUnit\n"));
            for s in body {
                dump_stmt(s, interner, depth + 1, out);
            }
        }
        StmtKind::Comp { body, .. } => {
            out.push_str(&format!("{pad}Comp\n"));
            for s in body {
                dump_stmt(s, interner, depth + 1, out);
            }
        }
        StmtKind::FuncDef { name, body, symbol, .. } => {
            let ret = symbol.get().and_then(|s| s.ret_ty.get()).map(|t| describe(interner, t));
            out.push_str(&format!("{pad}FuncDef {} -> {}\n", interner.resolve(*name), ret.as_deref().unwrap_or("?")));
            for s in body {
                dump_stmt(s, interner, depth + 1, out);
            }
        }
        StmtKind::VarDef { name, init, symbol, .. } => {
            let ty = symbol.get().and_then(|s| s.ty()).map(|t| describe(interner, t));
            out.push_str(&format!("{pad}VarDef {} :: {}\n", interner.resolve(*name), ty.as_deref().unwrap_or("?")));
            if let Some(init) = init {
                dump_expr(init, interner, depth + 1, out);
            }
        }
        StmtKind::Inst { call } => {
            out.push_str(&format!("{pad}Inst\n"));
            dump_expr(call, interner, depth + 1, out);
        }
        StmtKind::Assign { op, target, value } => {
            out.push_str(&format!("{pad}Assign {op:?}\n"));
            dump_expr(target, interner, depth + 1, out);
            if let Some(value) = value {
                dump_expr(value, interner, depth + 1, out);
            }
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            out.push_str(&format!("{pad}If\n"));
            dump_expr(cond, interner, depth + 1, out);
            for s in then_branch {
                dump_stmt(s, interner, depth + 1, out);
            }
            if let Some(else_branch) = else_branch {
                out.push_str(&format!("{pad}Else\n"));
                for s in else_branch {
                    dump_stmt(s, interner, depth + 1, out);
                }
            }
        }
        StmtKind::Repeat { count, body, .. } => {
            out.push_str(&format!("{pad}Repeat\n"));
            if let Some(count) = count {
                dump_expr(count, interner, depth + 1, out);
            }
            for s in body {
                dump_stmt(s, interner, depth + 1, out);
            }
        }
        StmtKind::Label { name, .. } => {
            out.push_str(&format!("{pad}Label {}\n", interner.resolve(*name)));
        }
        StmtKind::Goto { target } => {
            out.push_str(&format!("{pad}Goto\n"));
            dump_expr(target, interner, depth + 1, out);
        }
        StmtKind::Gosub { target } => {
            out.push_str(&format!("{pad}Gosub\n"));
            dump_expr(target, interner, depth + 1, out);
        }
        StmtKind::Continue => out.push_str(&format!("{pad}Continue\n")),
        StmtKind::Break => out.push_str(&format!("{pad}Break\n")),
        StmtKind::Return { value } => {
            out.push_str(&format!("{pad}Return\n"));
            if let Some(value) = value {
                dump_expr(value, interner, depth + 1, out);
            }
        }
        StmtKind::Extern { name, symbol, .. } => {
            let ty = symbol.get().and_then(|s| s.ty()).map(|t| describe(interner, t));
            out.push_str(&format!("{pad}Extern {} :: {}\n", interner.resolve(*name), ty.as_deref().unwrap_or("?")));
        }
        StmtKind::Namespace { name, body, .. } => {
            out.push_str(&format!("{pad}Namespace {}\n", interner.resolve(*name)));
            for s in body {
                dump_stmt(s, interner, depth + 1, out);
            }
        }
    }
}

fn dump_expr(expr: &Expr, interner: &Interner, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    let ty = expr.ty().map(|t| describe(interner, t));
    let ty = ty.as_deref().unwrap_or("?");
    match &expr.kind {
        ExprKind::Identifier { name, .. } => out.push_str(&format!("{pad}Identifier {} :: {ty}\n", interner.resolve(*name))),
        ExprKind::Label { name, .. } => out.push_str(&format!("{pad}Label {} :: {ty}\n", interner.resolve(*name))),
        ExprKind::Binary { op, lhs, rhs } => {
            out.push_str(&format!("{pad}Binary {op:?} :: {ty}\n"));
            dump_expr(lhs, interner, depth + 1, out);
            dump_expr(rhs, interner, depth + 1, out);
        }
        ExprKind::Unary { op, operand } => {
            out.push_str(&format!("{pad}Unary {op:?} :: {ty}\n"));
            dump_expr(operand, interner, depth + 1, out);
        }
        ExprKind::StrLit(s) => out.push_str(&format!("{pad}StrLit {:?} :: {ty}\n", interner.resolve(*s))),
        ExprKind::IntLit(n) => out.push_str(&format!("{pad}IntLit {n} :: {ty}\n")),
        ExprKind::FloatLit(n) => out.push_str(&format!("{pad}FloatLit {n} :: {ty}\n")),
        ExprKind::CharLit(c) => out.push_str(&format!("{pad}CharLit {c:?} :: {ty}\n")),
        ExprKind::BoolLit(b) => out.push_str(&format!("{pad}BoolLit {b} :: {ty}\n")),
        ExprKind::ArrayLit(items) => {
            out.push_str(&format!("{pad}ArrayLit :: {ty}\n"));
            for item in items {
                dump_expr(item, interner, depth + 1, out);
            }
        }
        ExprKind::FuncCall { callee, args, partial } => {
            out.push_str(&format!("{pad}FuncCall partial={partial} :: {ty}\n"));
            dump_expr(callee, interner, depth + 1, out);
            for arg in args {
                dump_expr(arg, interner, depth + 1, out);
            }
        }
        ExprKind::Constructor { args, .. } => {
            out.push_str(&format!("{pad}Constructor :: {ty}\n"));
            for arg in args {
                dump_expr(arg, interner, depth + 1, out);
            }
        }
        ExprKind::Subscr { receiver, index } => {
            out.push_str(&format!("{pad}Subscr :: {ty}\n"));
            dump_expr(receiver, interner, depth + 1, out);
            dump_expr(index, interner, depth + 1, out);
        }
        ExprKind::Member { receiver, member, .. } => {
            out.push_str(&format!("{pad}Member .{} :: {ty}\n", interner.resolve(*member)));
            dump_expr(receiver, interner, depth + 1, out);
        }
        ExprKind::StaticMember { namespace, member, .. } => {
            out.push_str(&format!("{pad}StaticMember .{} :: {ty}\n", interner.resolve(*member)));
            dump_expr(namespace, interner, depth + 1, out);
        }
        ExprKind::Ref(inner) => {
            out.push_str(&format!("{pad}Ref :: {ty}\n"));
            dump_expr(inner, interner, depth + 1, out);
        }
        ExprKind::Deref(inner) => {
            out.push_str(&format!("{pad}Deref :: {ty}\n"));
            dump_expr(inner, interner, depth + 1, out);
        }
        ExprKind::Func { body, .. } => {
            out.push_str(&format!("{pad}Func :: {ty}\n"));
            for s in body {
                dump_stmt(s, interner, depth + 1, out);
            }
        }
        ExprKind::Promote(inner) => {
            out.push_str(&format!("{pad}Promote :: {ty}\n"));
            dump_expr(inner, interner, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positionals_and_repeated_include_flag() {
        let cli = Cli::parse_from(["peryanc", "main.pr", "out.ir", "-I", "lib", "-I", "vendor", "--verbose"]);
        assert_eq!(cli.input, PathBuf::from("main.pr"));
        assert_eq!(cli.output, PathBuf::from("out.ir"));
        assert_eq!(cli.include, vec![PathBuf::from("lib"), PathBuf::from("vendor")]);
        assert!(cli.verbose);
        assert!(!cli.dump_ast);
        assert!(!cli.strict);
    }

    #[test]
    fn dump_stmt_renders_a_vardef() {
        let mut interner = Interner::new();
        let name = interner.intern("x");
        let stmt = Stmt::new(
            StmtKind::VarDef {
                name,
                type_spec: None,
                init: None,
                symbol: std::cell::Cell::new(None),
            },
            crate::token::Token::synthetic(crate::token::TokenKind::Var, name),
        );
        let mut out = String::new();
        dump_stmt(&stmt, &interner, 0, &mut out);
        assert!(out.contains("VarDef x"));
    }
}
