//! Type annotation grammar (§3 "TypeSpecs"): `const`/`ref` modifiers, array
//! brackets, dotted member access, and right-associative `->` chains.

use crate::ast::{TypeSpec, TypeSpecKind};
use crate::parser::{ParseResult, Parser};
use crate::token::TokenKind;

impl<'src, 'a> Parser<'src, 'a> {
    pub fn parse_type_spec(&mut self) -> ParseResult<TypeSpec<'a>> {
        self.parse_type_spec_with_modifiers(true)
    }

    /// Used for `extern` parameter/return annotations, which carry no
    /// `const`/`ref` qualifiers of their own.
    pub fn parse_type_spec_no_modifier(&mut self) -> ParseResult<TypeSpec<'a>> {
        self.parse_type_spec_with_modifiers(false)
    }

    fn parse_type_spec_with_modifiers(&mut self, allow_modifiers: bool) -> ParseResult<TypeSpec<'a>> {
        let start = self.peek()?;
        let mut is_const = false;
        let mut is_ref = false;
        if allow_modifiers {
            loop {
                if self.check(TokenKind::Const)? {
                    self.consume()?;
                    is_const = true;
                } else if self.check(TokenKind::Ref)? {
                    self.consume()?;
                    is_ref = true;
                } else {
                    break;
                }
            }
        }
        let atom = self.parse_type_spec_atom()?;
        if self.check(TokenKind::Arrow)? {
            self.consume()?;
            let cdr = self.parse_type_spec_with_modifiers(allow_modifiers)?;
            return Ok(TypeSpec {
                kind: TypeSpecKind::Func {
                    car: Box::new(atom),
                    cdr: Box::new(cdr),
                },
                is_const,
                is_ref,
                token: start,
            });
        }
        Ok(TypeSpec {
            kind: atom.kind,
            is_const,
            is_ref,
            token: start,
        })
    }

    fn parse_type_spec_atom(&mut self) -> ParseResult<TypeSpec<'a>> {
        let tok = self.peek()?;
        if self.check(TokenKind::LBrack)? {
            self.consume()?;
            let elem = self.parse_type_spec()?;
            self.expect(TokenKind::RBrack, "']'")?;
            let array = TypeSpec {
                kind: TypeSpecKind::Array { elem: Box::new(elem) },
                is_const: false,
                is_ref: false,
                token: tok,
            };
            return self.parse_member_chain(array);
        }
        let name_tok = if self.check(TokenKind::TypeId)? {
            self.consume()?
        } else {
            self.expect(TokenKind::Id, "type name")?
        };
        let base = TypeSpec::simple(name_tok.text, false, false, name_tok);
        self.parse_member_chain(base)
    }

    fn parse_member_chain(&mut self, mut base: TypeSpec<'a>) -> ParseResult<TypeSpec<'a>> {
        while self.check(TokenKind::Dot)? {
            let dot_tok = self.consume()?;
            let member_tok = if self.check(TokenKind::TypeId)? {
                self.consume()?
            } else {
                self.expect(TokenKind::Id, "member name")?
            };
            base = TypeSpec {
                kind: TypeSpecKind::Member {
                    namespace: Box::new(base),
                    member: member_tok.text,
                },
                is_const: false,
                is_ref: false,
                token: dot_tok,
            };
        }
        Ok(base)
    }
}
