//! Recursive-descent parser (§4.3) with an infinite-lookahead speculation
//! mechanism: `mark()`/`release()` around a buffered token deque let the
//! parser try a grammar alternative and back out without mutating the AST,
//! used to disambiguate `TypeId(args)` constructor calls from ordinary
//! postfix calls.

pub mod expr;
pub mod type_spec;

use std::cell::Cell;
use std::collections::VecDeque;

use crate::ast::{AssignOp, Expr, ExprKind, Param, Stmt, StmtKind};
use crate::error::{parser_error, CompileError};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

pub struct Parser<'src, 'a> {
    lexer: Lexer<'src>,
    buffered: VecDeque<Token>,
    /// Speculation marks: indices into `buffered` recorded by `mark()`.
    /// `consume()` advances the top mark instead of the real cursor while
    /// any mark is live.
    marks: Vec<usize>,
    cursor: usize,
    pub hsp_compat: bool,
    _marker: std::marker::PhantomData<&'a ()>,
}

pub type ParseResult<T> = Result<T, CompileError>;

impl<'src, 'a> Parser<'src, 'a> {
    pub fn new(lexer: Lexer<'src>, hsp_compat: bool) -> Self {
        Parser {
            lexer,
            buffered: VecDeque::new(),
            marks: Vec::new(),
            cursor: 0,
            hsp_compat,
            _marker: std::marker::PhantomData,
        }
    }

    fn fill_to(&mut self, index: usize) -> ParseResult<()> {
        while self.buffered.len() <= index {
            let tok = self.lexer.next_token()?;
            self.buffered.push_back(tok);
        }
        Ok(())
    }

    pub fn peek(&mut self) -> ParseResult<Token> {
        self.fill_to(self.cursor)?;
        Ok(self.buffered[self.cursor])
    }

    pub fn peek_at(&mut self, offset: usize) -> ParseResult<Token> {
        self.fill_to(self.cursor + offset)?;
        Ok(self.buffered[self.cursor + offset])
    }

    pub fn is_speculating(&self) -> bool {
        !self.marks.is_empty()
    }

    /// The aggregated source buffer the underlying lexer assembled, kept
    /// around after parsing so a diagnostic formatter can still render
    /// positions once the parse is done (§4.2, §6 "Diagnostic format").
    pub fn buffer(&self) -> &str {
        self.lexer.buffer()
    }

    pub fn breadcrumbs(&self) -> &crate::breadcrumb::BreadcrumbTrail {
        self.lexer.breadcrumbs()
    }

    /// Pushes a speculation checkpoint. Token consumption after this call
    /// only advances the logical cursor; nothing is dropped from the
    /// buffer until the outermost mark is released.
    pub fn mark(&mut self) -> usize {
        self.marks.push(self.cursor);
        self.cursor
    }

    /// Restores the cursor to the most recent `mark()`, undoing any
    /// consumption performed while speculating.
    pub fn reset(&mut self) {
        if let Some(saved) = self.marks.pop() {
            self.cursor = saved;
        }
    }

    /// Commits the most recent speculation: pops the mark without
    /// rewinding the cursor, and — if no marks remain live — drops
    /// buffered tokens the real parse has now passed.
    pub fn release(&mut self) {
        self.marks.pop();
        if self.marks.is_empty() {
            self.buffered.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    pub fn consume(&mut self) -> ParseResult<Token> {
        let tok = self.peek()?;
        self.cursor += 1;
        if self.marks.is_empty() {
            self.buffered.pop_front();
            self.cursor -= 1;
        }
        Ok(tok)
    }

    pub fn check(&mut self, kind: TokenKind) -> ParseResult<bool> {
        Ok(self.peek()?.is(kind))
    }

    pub fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        let tok = self.peek()?;
        if tok.is(kind) {
            self.consume()
        } else {
            Err(parser_error(
                tok.position,
                format!("expected {what}, found {:?}", tok.kind),
            ))
        }
    }

    fn accept(&mut self, kind: TokenKind) -> ParseResult<Option<Token>> {
        if self.check(kind)? {
            Ok(Some(self.consume()?))
        } else {
            Ok(None)
        }
    }

    /// A statement terminator is `TERM`, `:`, or (implicitly) a closing
    /// `}`/EOF that ends the enclosing block.
    fn skip_terminators(&mut self) -> ParseResult<()> {
        while self.check(TokenKind::Term)? || self.check(TokenKind::Colon)? {
            self.consume()?;
        }
        Ok(())
    }

    fn at_block_end(&mut self) -> ParseResult<bool> {
        Ok(self.check(TokenKind::RBrace)? || self.check(TokenKind::End)?)
    }

    pub fn parse_program(&mut self) -> ParseResult<Vec<Stmt<'a>>> {
        let mut stmts = Vec::new();
        self.skip_terminators()?;
        while !self.at_block_end()? {
            stmts.push(self.parse_statement()?);
            self.skip_terminators()?;
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt<'a>>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        self.skip_terminators()?;
        while !self.check(TokenKind::RBrace)? {
            stmts.push(self.parse_statement()?);
            self.skip_terminators()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    /// `if cond : stmt : else : stmt` (one-line form) or `if cond { ... }
    /// else { ... }` (block form); both are accepted uniformly by treating
    /// a single following statement as an implicit one-statement block.
    fn parse_stmt_or_block(&mut self) -> ParseResult<Vec<Stmt<'a>>> {
        if self.check(TokenKind::LBrace)? {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    pub fn parse_statement(&mut self) -> ParseResult<Stmt<'a>> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::Var => self.parse_var_def(),
            TokenKind::Func => self.parse_func_def(),
            TokenKind::Extern => self.parse_extern(),
            TokenKind::Namespace => self.parse_namespace(),
            TokenKind::If => self.parse_if(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::LBrace => {
                let scope = Cell::new(None);
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Comp { body, scope }, tok))
            }
            TokenKind::Goto => {
                self.consume()?;
                let target = self.parse_label_ref()?;
                Ok(Stmt::new(StmtKind::Goto { target }, tok))
            }
            TokenKind::Gosub => {
                self.consume()?;
                let target = self.parse_label_ref()?;
                Ok(Stmt::new(StmtKind::Gosub { target }, tok))
            }
            TokenKind::Continue => {
                self.consume()?;
                Ok(Stmt::new(StmtKind::Continue, tok))
            }
            TokenKind::Break => {
                self.consume()?;
                Ok(Stmt::new(StmtKind::Break, tok))
            }
            TokenKind::Return => {
                self.consume()?;
                let value = if self.at_statement_end()? {
                    None
                } else {
                    Some(self.parse_expr(true)?)
                };
                Ok(Stmt::new(StmtKind::Return { value }, tok))
            }
            TokenKind::Star if tok.has_trailing_alphabet => self.parse_label_decl(),
            _ => self.parse_expr_statement(),
        }
    }

    fn at_statement_end(&mut self) -> ParseResult<bool> {
        Ok(self.check(TokenKind::Term)?
            || self.check(TokenKind::Colon)?
            || self.check(TokenKind::RBrace)?
            || self.check(TokenKind::End)?)
    }

    fn parse_label_ref(&mut self) -> ParseResult<Expr<'a>> {
        let star = self.expect(TokenKind::Star, "label reference")?;
        let name_tok = self.expect(TokenKind::Id, "label name")?;
        Ok(Expr::new(
            ExprKind::Label {
                name: name_tok.text,
                symbol: Cell::new(None),
            },
            star,
        ))
    }

    fn parse_label_decl(&mut self) -> ParseResult<Stmt<'a>> {
        let star = self.consume()?;
        let name_tok = self.expect(TokenKind::Id, "label name")?;
        Ok(Stmt::new(
            StmtKind::Label {
                name: name_tok.text,
                symbol: Cell::new(None),
            },
            star,
        ))
    }

    fn parse_var_def(&mut self) -> ParseResult<Stmt<'a>> {
        let var_tok = self.consume()?;
        let name_tok = self.expect(TokenKind::Id, "variable name")?;
        let type_spec = if self.accept(TokenKind::ColonColon)?.is_some() {
            Some(self.parse_type_spec()?)
        } else {
            None
        };
        let init = if self.accept(TokenKind::Eq)?.is_some() {
            Some(self.parse_expr(true)?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::VarDef {
                name: name_tok.text,
                type_spec,
                init,
                symbol: Cell::new(None),
            },
            var_tok,
        ))
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param<'a>>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen)? {
            let name_tok = self.expect(TokenKind::Id, "parameter name")?;
            let type_spec = if self.accept(TokenKind::ColonColon)?.is_some() {
                Some(self.parse_type_spec()?)
            } else {
                None
            };
            let default = if self.accept(TokenKind::Eq)?.is_some() {
                Some(self.parse_expr(true)?)
            } else {
                None
            };
            params.push(Param {
                name: name_tok.text,
                type_spec,
                default,
                token: name_tok,
                symbol: Cell::new(None),
            });
            if self.accept(TokenKind::Comma)?.is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_func_def(&mut self) -> ParseResult<Stmt<'a>> {
        let func_tok = self.consume()?;
        let name_tok = self.expect(TokenKind::Id, "function name")?;
        let params = self.parse_params()?;
        let ret_type = if self.accept(TokenKind::ColonColon)?.is_some() {
            Some(self.parse_type_spec()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::FuncDef {
                name: name_tok.text,
                params,
                ret_type,
                body,
                scope: Cell::new(None),
                symbol: Cell::new(None),
            },
            func_tok,
        ))
    }

    fn parse_extern(&mut self) -> ParseResult<Stmt<'a>> {
        let extern_tok = self.consume()?;
        let name_tok = self.expect(TokenKind::Id, "extern name")?;
        self.expect(TokenKind::ColonColon, "'::'")?;
        let first = self.parse_type_spec_no_modifier()?;
        let mut params = Vec::new();
        let mut cur = first;
        while self.accept(TokenKind::Arrow)?.is_some() {
            params.push(cur);
            cur = self.parse_type_spec_no_modifier()?;
        }
        Ok(Stmt::new(
            StmtKind::Extern {
                name: name_tok.text,
                params,
                ret_type: cur,
                symbol: Cell::new(None),
            },
            extern_tok,
        ))
    }

    fn parse_namespace(&mut self) -> ParseResult<Stmt<'a>> {
        let ns_tok = self.consume()?;
        let name_tok = self.expect(TokenKind::TypeId, "namespace name")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::Namespace {
                name: name_tok.text,
                body,
                scope: Cell::new(None),
                symbol: Cell::new(None),
            },
            ns_tok,
        ))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt<'a>> {
        let if_tok = self.consume()?;
        let cond = self.parse_expr(true)?;
        self.skip_terminators()?;
        let then_branch = self.parse_stmt_or_block()?;
        self.skip_terminators_before_else()?;
        let else_branch = if self.check(TokenKind::Else)? {
            self.consume()?;
            self.skip_terminators()?;
            Some(self.parse_stmt_or_block()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            if_tok,
        ))
    }

    /// Looks past statement terminators for a following `else`, so both
    /// `if c { } else { }` and `if c : s : else : s` parse uniformly.
    fn skip_terminators_before_else(&mut self) -> ParseResult<()> {
        let mut lookahead = 0;
        loop {
            let tok = self.peek_at(lookahead)?;
            if tok.is(TokenKind::Term) || tok.is(TokenKind::Colon) {
                lookahead += 1;
                continue;
            }
            break;
        }
        if self.peek_at(lookahead)?.is(TokenKind::Else) {
            for _ in 0..lookahead {
                self.consume()?;
            }
        }
        Ok(())
    }

    fn parse_repeat(&mut self) -> ParseResult<Stmt<'a>> {
        let repeat_tok = self.consume()?;
        let count = if self.at_statement_end()? || self.check(TokenKind::LBrace)? {
            None
        } else {
            Some(self.parse_expr(true)?)
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::Repeat {
                count,
                body,
                scope: Cell::new(None),
                cnt_symbol: Cell::new(None),
            },
            repeat_tok,
        ))
    }

    /// Disambiguates an assignment statement from an instruction call or
    /// bare expression statement. `allowTopEql = false` here (§4.3): a
    /// top-level `=` at statement position is always the assignment
    /// operator, never equality.
    fn parse_expr_statement(&mut self) -> ParseResult<Stmt<'a>> {
        let start_tok = self.peek()?;
        let target = self.parse_expr(false)?;

        let assign_op = match self.peek()?.kind {
            TokenKind::Eq => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::AddAssign),
            TokenKind::MinusEq => Some(AssignOp::SubAssign),
            TokenKind::StarEq => Some(AssignOp::MulAssign),
            TokenKind::SlashEq => Some(AssignOp::DivAssign),
            TokenKind::PercentEq => Some(AssignOp::ModAssign),
            TokenKind::PlusPlus => Some(AssignOp::Increment),
            TokenKind::MinusMinus => Some(AssignOp::Decrement),
            _ => None,
        };

        if let Some(op) = assign_op {
            self.consume()?;
            let value = if matches!(op, AssignOp::Increment | AssignOp::Decrement) {
                None
            } else {
                Some(self.parse_expr(true)?)
            };
            return Ok(Stmt::new(StmtKind::Assign { op, target, value }, start_tok));
        }

        // A bare instruction call (`mes "hi", 1`): a plain identifier not
        // itself followed by `(...)` takes the rest of the line as
        // comma-separated arguments, with no parentheses required.
        if matches!(target.kind, ExprKind::Identifier { .. }) && !self.at_statement_end()? {
            let mut args = vec![self.parse_expr(true)?];
            while self.accept(TokenKind::Comma)?.is_some() {
                args.push(self.parse_expr(true)?);
            }
            let call = Expr::new(
                ExprKind::FuncCall {
                    callee: Box::new(target),
                    args,
                    partial: false,
                },
                start_tok,
            );
            return Ok(Stmt::new(StmtKind::Inst { call }, start_tok));
        }

        Ok(Stmt::new(StmtKind::Inst { call: target }, start_tok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, ExprKind};
    use crate::config::CompilerConfig;
    use crate::intern::Interner;
    use crate::lexer::Lexer;
    use crate::source::SourceReader;
    use std::fs;

    /// `Stmt<'a>`'s only use of `'a` is a `Cell<Option<&'a SymbolRec<'a>>>`
    /// that the parser always leaves `None` — the Symbol Register pass fills
    /// it in later — so it's sound to fix `'a` to `'static` here and drop
    /// the interner once parsing is done; nothing actually borrows it.
    fn parse_src(src: &str) -> Vec<Stmt<'static>> {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, src).unwrap();
        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let mut interner = Interner::new();
        let lexer = Lexer::new(&reader, &mut interner, &config).unwrap();
        let mut parser = Parser::<'_, 'static>::new(lexer, false);
        parser.parse_program().unwrap()
    }

    #[test]
    fn parses_var_def_with_type_and_init() {
        let stmts = parse_src("var x :: Int = 1\n");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::VarDef { type_spec, init, .. } => {
                assert!(type_spec.is_some());
                assert!(init.is_some());
            }
            _ => panic!("expected VarDef"),
        }
    }

    #[test]
    fn parses_func_def_with_params_and_body() {
        let stmts = parse_src("func add(a :: Int, b :: Int)::Int {\nreturn a + b\n}\n");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::FuncDef { params, body, ret_type, .. } => {
                assert_eq!(params.len(), 2);
                assert!(ret_type.is_some());
                assert_eq!(body.len(), 1);
            }
            _ => panic!("expected FuncDef"),
        }
    }

    #[test]
    fn one_line_if_else_and_block_if_else_both_parse() {
        let stmts = parse_src("if 1 : mes 1 : else : mes 2\n");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::If { else_branch, .. } => assert!(else_branch.is_some()),
            _ => panic!("expected If"),
        }

        let stmts = parse_src("if 1 { mes 1 } else { mes 2 }\n");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::If { else_branch, .. } => assert!(else_branch.is_some()),
            _ => panic!("expected If"),
        }
    }

    #[test]
    fn assignment_is_distinguished_from_instruction_call() {
        let stmts = parse_src("x = 1\nmes \"hi\"\n");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0].kind, StmtKind::Assign { .. }));
        assert!(matches!(stmts[1].kind, StmtKind::Inst { .. }));
    }

    #[test]
    fn increment_and_compound_assign_parse_without_rhs_ambiguity() {
        let stmts = parse_src("x++\ny += 2\n");
        assert_eq!(stmts.len(), 2);
        match &stmts[0].kind {
            StmtKind::Assign { op, value, .. } => {
                assert_eq!(*op, AssignOp::Increment);
                assert!(value.is_none());
            }
            _ => panic!("expected Assign"),
        }
    }

    #[test]
    fn binary_precedence_groups_mul_tighter_than_add() {
        let stmts = parse_src("x = 1 + 2 * 3\n");
        match &stmts[0].kind {
            StmtKind::Assign { value: Some(expr), .. } => match &expr.kind {
                ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
                }
                _ => panic!("expected top-level Add"),
            },
            _ => panic!("expected Assign with value"),
        }
    }

    #[test]
    fn array_literal_is_distinguished_from_array_constructor() {
        let stmts = parse_src("var a = [1, 2, 3]\nvar b = [Int](3)\n");
        match &stmts[0].kind {
            StmtKind::VarDef { init: Some(expr), .. } => {
                assert!(matches!(expr.kind, ExprKind::ArrayLit(_)));
            }
            _ => panic!("expected VarDef with ArrayLit init"),
        }
        match &stmts[1].kind {
            StmtKind::VarDef { init: Some(expr), .. } => {
                assert!(matches!(expr.kind, ExprKind::Constructor { .. }));
            }
            _ => panic!("expected VarDef with Constructor init"),
        }
    }

    #[test]
    fn constructor_call_on_type_id_is_distinguished_from_identifier_call() {
        let stmts = parse_src("var a = Point(1, 2)\n");
        match &stmts[0].kind {
            StmtKind::VarDef { init: Some(expr), .. } => {
                assert!(matches!(expr.kind, ExprKind::Constructor { .. }));
            }
            _ => panic!("expected Constructor"),
        }
    }

    #[test]
    fn subscript_requires_no_whitespace_before_lbrack() {
        let stmts = parse_src("var a = x[0]\n");
        match &stmts[0].kind {
            StmtKind::VarDef { init: Some(expr), .. } => {
                assert!(matches!(expr.kind, ExprKind::Subscr { .. }));
            }
            _ => panic!("expected Subscr"),
        }
    }

    #[test]
    fn goto_parses_label_reference() {
        let stmts = parse_src("goto *loop\n");
        assert!(matches!(stmts[0].kind, StmtKind::Goto { .. }));
    }

    #[test]
    fn partial_call_marks_func_call_partial() {
        let stmts = parse_src("var f = partial add(1)\n");
        match &stmts[0].kind {
            StmtKind::VarDef { init: Some(expr), .. } => match &expr.kind {
                ExprKind::FuncCall { partial, .. } => assert!(*partial),
                _ => panic!("expected FuncCall"),
            },
            _ => panic!("expected VarDef"),
        }
    }

    #[test]
    fn namespace_and_extern_declarations_parse() {
        let stmts = parse_src("namespace Geometry {\nvar pi :: Float = 3\n}\nextern sin :: Float -> Float\n");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0].kind, StmtKind::Namespace { .. }));
        match &stmts[1].kind {
            StmtKind::Extern { params, .. } => assert_eq!(params.len(), 1),
            _ => panic!("expected Extern"),
        }
    }

    #[test]
    fn repeat_without_count_parses_bare_block() {
        let stmts = parse_src("repeat {\nmes cnt\n}\n");
        match &stmts[0].kind {
            StmtKind::Repeat { count, body, .. } => {
                assert!(count.is_none());
                assert_eq!(body.len(), 1);
            }
            _ => panic!("expected Repeat"),
        }
    }
}
