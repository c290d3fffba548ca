//! Expression grammar (§3/§4.3): precedence-climbing binary operators,
//! prefix unary, and a postfix chain of calls/subscripts/member access.
//! `allowTopEql` threads through every level: at statement position a bare
//! `=` must be left for the statement parser to read as assignment, but
//! once inside any bracketed sub-expression (parens, call args, array
//! literals) it unambiguously means equality.

use std::cell::Cell;

use crate::ast::{BinOp, Expr, ExprKind, TypeSpec, TypeSpecKind, UnOp};
use crate::error::parser_error;
use crate::parser::{ParseResult, Parser};
use crate::token::{Token, TokenKind, TokenLiteral};

fn binop_info(kind: TokenKind, allow_top_eql: bool) -> Option<(BinOp, u8)> {
    Some(match kind {
        TokenKind::Caret => (BinOp::Xor, 1),
        TokenKind::Pipe => (BinOp::BitOr, 2),
        TokenKind::Amp => (BinOp::BitAnd, 3),
        TokenKind::EqEq => (BinOp::Eq, 4),
        TokenKind::NotEq => (BinOp::NotEq, 4),
        TokenKind::Eq if allow_top_eql => (BinOp::Eq, 4),
        TokenKind::Lt => (BinOp::Lt, 5),
        TokenKind::LtEq => (BinOp::LtEq, 5),
        TokenKind::Gt => (BinOp::Gt, 5),
        TokenKind::GtEq => (BinOp::GtEq, 5),
        TokenKind::Shl => (BinOp::Shl, 6),
        TokenKind::Shr => (BinOp::Shr, 6),
        TokenKind::Plus => (BinOp::Add, 7),
        TokenKind::Minus => (BinOp::Sub, 7),
        TokenKind::Star => (BinOp::Mul, 8),
        TokenKind::Slash => (BinOp::Div, 8),
        TokenKind::Percent => (BinOp::Mod, 8),
        _ => return None,
    })
}

impl<'src, 'a> Parser<'src, 'a> {
    pub fn parse_expr(&mut self, allow_top_eql: bool) -> ParseResult<Expr<'a>> {
        self.parse_binary(0, allow_top_eql)
    }

    fn parse_binary(&mut self, min_prec: u8, allow_top_eql: bool) -> ParseResult<Expr<'a>> {
        let mut lhs = self.parse_unary(allow_top_eql)?;
        loop {
            let tok = self.peek()?;
            match binop_info(tok.kind, allow_top_eql) {
                Some((op, prec)) if prec >= min_prec => {
                    self.consume()?;
                    let rhs = self.parse_binary(prec + 1, true)?;
                    lhs = Expr::new(
                        ExprKind::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        tok,
                    );
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, allow_top_eql: bool) -> ParseResult<Expr<'a>> {
        let tok = self.peek()?;
        let op = match tok.kind {
            TokenKind::Not => UnOp::Not,
            TokenKind::Plus => UnOp::Plus,
            TokenKind::Minus => UnOp::Minus,
            _ => return self.parse_postfix(allow_top_eql),
        };
        self.consume()?;
        let operand = self.parse_unary(allow_top_eql)?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            tok,
        ))
    }

    fn parse_postfix(&mut self, allow_top_eql: bool) -> ParseResult<Expr<'a>> {
        if self.check(TokenKind::Partial)? {
            let partial_tok = self.consume()?;
            let callee = self.parse_primary(allow_top_eql)?;
            let args = self.parse_call_args()?;
            let call = Expr::new(
                ExprKind::FuncCall {
                    callee: Box::new(callee),
                    args,
                    partial: true,
                },
                partial_tok,
            );
            return self.parse_postfix_from(call);
        }
        let expr = self.parse_primary(allow_top_eql)?;
        self.parse_postfix_from(expr)
    }

    /// Continues a postfix chain (`(...)`, `[...]`, `.member`) starting
    /// from an already-parsed base expression.
    fn parse_postfix_from(&mut self, mut expr: Expr<'a>) -> ParseResult<Expr<'a>> {
        loop {
            let tok = self.peek()?;
            match tok.kind {
                TokenKind::LParen => {
                    let args = self.parse_call_args()?;
                    expr = Expr::new(
                        ExprKind::FuncCall {
                            callee: Box::new(expr),
                            args,
                            partial: false,
                        },
                        tok,
                    );
                }
                TokenKind::LBrack if !tok.has_whitespace_before => {
                    self.consume()?;
                    let index = self.parse_expr(true)?;
                    self.expect(TokenKind::RBrack, "']'")?;
                    expr = Expr::new(
                        ExprKind::Subscr {
                            receiver: Box::new(expr),
                            index: Box::new(index),
                        },
                        tok,
                    );
                }
                TokenKind::Dot => {
                    self.consume()?;
                    let member_tok = if self.check(TokenKind::TypeId)? {
                        self.consume()?
                    } else {
                        self.expect(TokenKind::Id, "member name")?
                    };
                    expr = Expr::new(
                        ExprKind::Member {
                            receiver: Box::new(expr),
                            member: member_tok.text,
                            member_token: member_tok,
                        },
                        tok,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr<'a>>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen)? {
            args.push(self.parse_expr(true)?);
            if self.accept_comma()?.is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn accept_comma(&mut self) -> ParseResult<Option<Token>> {
        if self.check(TokenKind::Comma)? {
            Ok(Some(self.consume()?))
        } else {
            Ok(None)
        }
    }

    fn parse_primary(&mut self, allow_top_eql: bool) -> ParseResult<Expr<'a>> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::Integer => {
                self.consume()?;
                let value = match tok.literal {
                    TokenLiteral::Int(v) => v,
                    _ => 0,
                };
                Ok(Expr::new(ExprKind::IntLit(value), tok))
            }
            TokenKind::Float => {
                self.consume()?;
                let value = match tok.literal {
                    TokenLiteral::Float(v) => v,
                    _ => 0.0,
                };
                Ok(Expr::new(ExprKind::FloatLit(value), tok))
            }
            TokenKind::Char => {
                self.consume()?;
                let value = match tok.literal {
                    TokenLiteral::Char(c) => c,
                    _ => '\0',
                };
                Ok(Expr::new(ExprKind::CharLit(value), tok))
            }
            TokenKind::String => {
                self.consume()?;
                Ok(Expr::new(ExprKind::StrLit(tok.text), tok))
            }
            TokenKind::True => {
                self.consume()?;
                Ok(Expr::new(ExprKind::BoolLit(true), tok))
            }
            TokenKind::False => {
                self.consume()?;
                Ok(Expr::new(ExprKind::BoolLit(false), tok))
            }
            TokenKind::Id => {
                self.consume()?;
                Ok(Expr::new(
                    ExprKind::Identifier {
                        name: tok.text,
                        symbol: Cell::new(None),
                    },
                    tok,
                ))
            }
            TokenKind::TypeId => {
                self.consume()?;
                if self.check(TokenKind::LParen)? {
                    let type_spec = TypeSpec::simple(tok.text, false, false, tok);
                    let args = self.parse_call_args()?;
                    return Ok(Expr::new(
                        ExprKind::Constructor {
                            type_spec: Box::new(type_spec),
                            args,
                        },
                        tok,
                    ));
                }
                Ok(Expr::new(
                    ExprKind::Identifier {
                        name: tok.text,
                        symbol: Cell::new(None),
                    },
                    tok,
                ))
            }
            TokenKind::Star if tok.has_trailing_alphabet => self.parse_label_ref(),
            TokenKind::LParen => {
                self.consume()?;
                let inner = self.parse_expr(true)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBrack => self.parse_bracket_primary(),
            TokenKind::Func => self.parse_func_expr(),
            _ => Err(parser_error(
                tok.position,
                format!("expected an expression, found {:?}", tok.kind),
            )),
        }
    }

    /// Disambiguates `[T](n)` / `[T](n, init)` array construction from an
    /// array literal `[a, b, c]`: speculatively parses the former, and
    /// falls back to the latter if it doesn't hold together.
    fn parse_bracket_primary(&mut self) -> ParseResult<Expr<'a>> {
        let tok = self.peek()?;
        self.mark();
        if let Ok(expr) = self.try_parse_array_constructor(tok) {
            self.release();
            return Ok(expr);
        }
        self.reset();

        self.expect(TokenKind::LBrack, "'['")?;
        let mut elems = Vec::new();
        while !self.check(TokenKind::RBrack)? {
            elems.push(self.parse_expr(true)?);
            if self.accept_comma()?.is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBrack, "']'")?;
        Ok(Expr::new(ExprKind::ArrayLit(elems), tok))
    }

    fn try_parse_array_constructor(&mut self, tok: Token) -> ParseResult<Expr<'a>> {
        self.expect(TokenKind::LBrack, "'['")?;
        let elem = self.parse_type_spec()?;
        self.expect(TokenKind::RBrack, "']'")?;
        let type_spec = TypeSpec {
            kind: TypeSpecKind::Array { elem: Box::new(elem) },
            is_const: false,
            is_ref: false,
            token: tok,
        };
        let args = self.parse_call_args()?;
        Ok(Expr::new(
            ExprKind::Constructor {
                type_spec: Box::new(type_spec),
                args,
            },
            tok,
        ))
    }

    fn parse_func_expr(&mut self) -> ParseResult<Expr<'a>> {
        let func_tok = self.consume()?;
        let params = self.parse_params()?;
        let ret_type = if self.check(TokenKind::ColonColon)? {
            self.consume()?;
            Some(self.parse_type_spec()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Expr::new(
            ExprKind::Func {
                params,
                ret_type,
                body,
                symbol: Cell::new(None),
            },
            func_tok,
        ))
    }
}
