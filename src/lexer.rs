//! The lexer (§4.2). Before any token is returned, every source file
//! reachable from the main file (plus an optional `peryandefs` prelude)
//! is spliced into a single aggregated buffer, with a [`Breadcrumb`]
//! recorded at every splice transition so diagnostics can still point at
//! the original file and line. Scanning then proceeds over that buffer
//! one token at a time.

use std::collections::HashSet;

use crate::breadcrumb::{Breadcrumb, BreadcrumbTrail, Position};
use crate::config::CompilerConfig;
use crate::error::{lexer_error, CompileError};
use crate::intern::Interner;
use crate::source::SourceReader;
use crate::token::{Token, TokenKind, TokenLiteral, KEYWORDS};

const PRELUDE_NAME: &str = "peryandefs";

/// Splices `reader`'s main file (preceded by the prelude, if configured)
/// into one buffer, honoring `#import`/`#include` directives.
struct Assembler<'a> {
    reader: &'a SourceReader,
    interner: &'a mut Interner,
    buffer: String,
    breadcrumbs: Vec<Breadcrumb>,
    imported: HashSet<String>,
}

impl<'a> Assembler<'a> {
    fn new(reader: &'a SourceReader, interner: &'a mut Interner) -> Self {
        Assembler {
            reader,
            interner,
            buffer: String::new(),
            breadcrumbs: Vec::new(),
            imported: HashSet::new(),
        }
    }

    fn run(&mut self, config: &CompilerConfig) -> Result<(), CompileError> {
        if let Some(prelude_dir) = &config.prelude_dir {
            let prelude_path = prelude_dir.join(PRELUDE_NAME);
            if prelude_path.is_file() {
                let contents = std::fs::read_to_string(&prelude_path).map_err(|e| {
                    lexer_error(
                        crate::breadcrumb::NO_POSITION,
                        format!("cannot read prelude \"{PRELUDE_NAME}\": {e}"),
                    )
                })?;
                self.imported.insert(PRELUDE_NAME.to_string());
                self.splice(PRELUDE_NAME, &contents)?;
            }
        }
        let main_name = self.reader.main_name();
        let main_contents = self.reader.open_main()?;
        self.imported.insert(main_name.clone());
        self.splice(&main_name, &main_contents)
    }

    fn splice(&mut self, name: &str, contents: &str) -> Result<(), CompileError> {
        let sym = self.interner.intern(name);
        self.breadcrumbs.push(Breadcrumb {
            total_offset: self.buffer.len() as i64,
            original_offset: 0,
            line_in_original: 0,
            source_name: sym,
        });

        let mut line_no: i64 = 0;
        let mut rest = contents;
        loop {
            let (line, consumed_len, had_newline) = match rest.find('\n') {
                Some(nl) => (&rest[..nl], nl + 1, true),
                None => (rest, rest.len(), false),
            };
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix("#import") {
                self.handle_directive(directive, true)?;
            } else if let Some(directive) = trimmed.strip_prefix("#include") {
                self.handle_directive(directive, false)?;
            } else {
                self.buffer.push_str(line);
                self.buffer.push('\n');
            }
            rest = &rest[consumed_len..];
            line_no += 1;
            if !had_newline || rest.is_empty() {
                break;
            }
            // Record where this file resumes after a splice (directive line
            // or not — harmless to record unconditionally, and simpler).
            self.breadcrumbs.push(Breadcrumb {
                total_offset: self.buffer.len() as i64,
                original_offset: (contents.len() - rest.len()) as i64,
                line_in_original: line_no,
                source_name: sym,
            });
        }
        Ok(())
    }

    fn handle_directive(&mut self, directive: &str, is_import: bool) -> Result<(), CompileError> {
        let directive = directive.trim_start();
        let name = parse_quoted_name(directive)
            .ok_or_else(|| lexer_error(crate::breadcrumb::NO_POSITION, "malformed #import/#include directive (expected a quoted file name)"))?;
        if is_import && self.imported.contains(&name) {
            return Ok(());
        }
        let contents = self.reader.open(&name)?;
        if is_import {
            self.imported.insert(name.clone());
        }
        self.splice(&name, &contents)
    }
}

fn parse_quoted_name(s: &str) -> Option<String> {
    let s = s.strip_prefix('"')?;
    let end = s.find('"')?;
    Some(s[..end].to_string())
}

pub struct Lexer<'a> {
    buffer: String,
    chars: Vec<char>,
    byte_offsets: Vec<usize>,
    idx: usize,
    breadcrumbs: BreadcrumbTrail,
    interner: &'a mut Interner,
}

impl<'a> Lexer<'a> {
    pub fn new(
        reader: &SourceReader,
        interner: &'a mut Interner,
        config: &CompilerConfig,
    ) -> Result<Self, CompileError> {
        let mut assembler = Assembler::new(reader, interner);
        assembler.run(config)?;
        let Assembler {
            buffer, breadcrumbs, ..
        } = assembler;
        let mut byte_offsets = Vec::with_capacity(buffer.len() + 1);
        let mut chars = Vec::with_capacity(buffer.len());
        for (i, c) in buffer.char_indices() {
            byte_offsets.push(i);
            chars.push(c);
        }
        byte_offsets.push(buffer.len());

        Ok(Lexer {
            buffer,
            chars,
            byte_offsets,
            idx: 0,
            breadcrumbs: BreadcrumbTrail::new(breadcrumbs),
            interner,
        })
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn breadcrumbs(&self) -> &BreadcrumbTrail {
        &self.breadcrumbs
    }

    /// The sole diagnostic formatter (§4.2): locates the enclosing
    /// breadcrumb and renders the three-line `<file>:<line>:<col>`
    /// message, source line, and caret line (§6 "Diagnostic format").
    pub fn pretty_print(&self, position: Position, severity: &str, message: &str) -> String {
        crate::diagnostic::pretty_print(&self.buffer, &self.breadcrumbs, self.interner, position, severity, message)
    }

    fn pos(&self) -> Position {
        self.byte_offsets.get(self.idx).copied().unwrap_or(self.buffer.len()) as Position
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.idx += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.idx >= self.chars.len()
    }

    /// Skips spaces/tabs, block comments, `//`/`;` line comments, and
    /// backslash-newline continuations. Returns whether any ` `/`\t` was
    /// skipped directly before the next token (feeds `has_whitespace_before`).
    fn skip_trivia(&mut self) -> Result<bool, CompileError> {
        let mut saw_space = false;
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => {
                    saw_space = true;
                    self.idx += 1;
                }
                Some('\\') if matches!(self.peek_at(1), Some('\n')) => {
                    self.idx += 2;
                }
                Some('\\') if matches!(self.peek_at(1), Some('\r')) && matches!(self.peek_at(2), Some('\n')) => {
                    self.idx += 3;
                }
                Some('/') if matches!(self.peek_at(1), Some('*')) => {
                    let start = self.pos();
                    self.idx += 2;
                    loop {
                        match self.peek() {
                            None => {
                                return Err(lexer_error(start, "unterminated block comment"));
                            }
                            Some('*') if matches!(self.peek_at(1), Some('/')) => {
                                self.idx += 2;
                                break;
                            }
                            _ => {
                                self.idx += 1;
                            }
                        }
                    }
                }
                Some('/') if matches!(self.peek_at(1), Some('/')) => {
                    while !matches!(self.peek(), None | Some('\n') | Some('\r')) {
                        self.idx += 1;
                    }
                }
                Some(';') => {
                    while !matches!(self.peek(), None | Some('\n') | Some('\r')) {
                        self.idx += 1;
                    }
                }
                _ => break,
            }
        }
        Ok(saw_space)
    }

    pub fn next_token(&mut self) -> Result<Token, CompileError> {
        let had_space = self.skip_trivia()?;

        if self.at_end() {
            return Ok(Token {
                kind: TokenKind::End,
                text: self.interner.intern(""),
                literal: TokenLiteral::None,
                position: self.pos(),
                has_whitespace_before: had_space,
                has_trailing_alphabet: false,
            });
        }

        let position = self.pos();
        let c = self.peek().unwrap();

        if c == '\r' || c == '\n' {
            while matches!(self.peek(), Some('\r') | Some('\n')) {
                self.idx += 1;
            }
            return Ok(Token {
                kind: TokenKind::Term,
                text: self.interner.intern(""),
                literal: TokenLiteral::None,
                position,
                has_whitespace_before: had_space,
                has_trailing_alphabet: false,
            });
        }

        if c == '"' {
            return self.scan_string(position, had_space);
        }
        if c == '{' && matches!(self.peek_at(1), Some('"')) {
            return self.scan_heredoc(position, had_space);
        }
        if c == '\'' {
            return self.scan_char(position, had_space);
        }
        if c.is_ascii_digit() || (c == '$' && matches!(self.peek_at(1), Some(d) if d.is_ascii_hexdigit())) {
            return self.scan_number(position, had_space);
        }
        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier(position, had_space);
        }

        self.scan_punct(position, had_space)
    }

    fn scan_identifier(&mut self, position: Position, had_space: bool) -> Result<Token, CompileError> {
        let start = self.idx;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.idx += 1;
        }
        let text: String = self.chars[start..self.idx].iter().collect();

        if let Some((_, kind)) = KEYWORDS.iter().find(|(kw, _)| *kw == text) {
            let sym = self.interner.intern(&text);
            return Ok(Token {
                kind: *kind,
                text: sym,
                literal: TokenLiteral::None,
                position,
                has_whitespace_before: had_space,
                has_trailing_alphabet: false,
            });
        }

        let kind = if text.chars().next().unwrap().is_uppercase() {
            TokenKind::TypeId
        } else {
            TokenKind::Id
        };
        let sym = self.interner.intern(&text);
        Ok(Token {
            kind,
            text: sym,
            literal: TokenLiteral::None,
            position,
            has_whitespace_before: had_space,
            has_trailing_alphabet: false,
        })
    }

    fn scan_number(&mut self, position: Position, had_space: bool) -> Result<Token, CompileError> {
        let start = self.idx;

        if self.peek() == Some('$') {
            self.idx += 1;
            let digits_start = self.idx;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.idx += 1;
            }
            let text: String = self.chars[digits_start..self.idx].iter().collect();
            let value = i64::from_str_radix(&text, 16)
                .map_err(|_| lexer_error(position, "invalid hex literal"))?;
            return Ok(self.int_token(position, had_space, value));
        }
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.idx += 2;
            let digits_start = self.idx;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.idx += 1;
            }
            let text: String = self.chars[digits_start..self.idx].iter().collect();
            let value = i64::from_str_radix(&text, 16)
                .map_err(|_| lexer_error(position, "invalid hex literal"))?;
            return Ok(self.int_token(position, had_space, value));
        }
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('b') | Some('B')) {
            self.idx += 2;
            let digits_start = self.idx;
            while matches!(self.peek(), Some('0') | Some('1')) {
                self.idx += 1;
            }
            let text: String = self.chars[digits_start..self.idx].iter().collect();
            let value = i64::from_str_radix(&text, 2)
                .map_err(|_| lexer_error(position, "invalid binary literal"))?;
            return Ok(self.int_token(position, had_space, value));
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.idx += 1;
        }
        let is_float = self.peek() == Some('.') && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit());
        if is_float {
            self.idx += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.idx += 1;
            }
            let text: String = self.chars[start..self.idx].iter().collect();
            let value: f64 = text
                .parse()
                .map_err(|_| lexer_error(position, "invalid float literal"))?;
            let sym = self.interner.intern(&text);
            return Ok(Token {
                kind: TokenKind::Float,
                text: sym,
                literal: TokenLiteral::Float(value),
                position,
                has_whitespace_before: had_space,
                has_trailing_alphabet: false,
            });
        }

        let text: String = self.chars[start..self.idx].iter().collect();
        let value: i64 = text
            .parse()
            .map_err(|_| lexer_error(position, "invalid integer literal"))?;
        Ok(self.int_token(position, had_space, value))
    }

    fn int_token(&mut self, position: Position, had_space: bool, value: i64) -> Token {
        let sym = self.interner.intern(&value.to_string());
        Token {
            kind: TokenKind::Integer,
            text: sym,
            literal: TokenLiteral::Int(value),
            position,
            has_whitespace_before: had_space,
            has_trailing_alphabet: false,
        }
    }

    fn scan_escape(&mut self, opening: Position) -> Result<char, CompileError> {
        self.idx += 1; // consume '\'
        let c = self.advance().ok_or_else(|| lexer_error(opening, "unterminated string literal"))?;
        Ok(match c {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'e' => '\x1b',
            '\\' => '\\',
            '"' => '"',
            other => other,
        })
    }

    fn scan_string(&mut self, position: Position, had_space: bool) -> Result<Token, CompileError> {
        self.idx += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(lexer_error(position, "unterminated string literal")),
                Some('"') => {
                    self.idx += 1;
                    break;
                }
                Some('\\') => {
                    value.push(self.scan_escape(position)?);
                }
                Some(c) => {
                    value.push(c);
                    self.idx += 1;
                }
            }
        }
        let sym = self.interner.intern(&value);
        Ok(Token {
            kind: TokenKind::String,
            text: sym,
            literal: TokenLiteral::None,
            position,
            has_whitespace_before: had_space,
            has_trailing_alphabet: false,
        })
    }

    /// `{"..."}`: same escapes as a regular string; terminated by `"}`.
    fn scan_heredoc(&mut self, position: Position, had_space: bool) -> Result<Token, CompileError> {
        self.idx += 2; // consume '{"'
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(lexer_error(position, "unterminated here-document")),
                Some('"') if matches!(self.peek_at(1), Some('}')) => {
                    self.idx += 2;
                    break;
                }
                Some('\\') => {
                    value.push(self.scan_escape(position)?);
                }
                Some(c) => {
                    value.push(c);
                    self.idx += 1;
                }
            }
        }
        let sym = self.interner.intern(&value);
        Ok(Token {
            kind: TokenKind::String,
            text: sym,
            literal: TokenLiteral::None,
            position,
            has_whitespace_before: had_space,
            has_trailing_alphabet: false,
        })
    }

    fn scan_char(&mut self, position: Position, had_space: bool) -> Result<Token, CompileError> {
        self.idx += 1; // opening quote
        let mut value: Option<char> = None;
        let mut saw_more_than_one = false;
        loop {
            match self.peek() {
                None => return Err(lexer_error(position, "unterminated character literal")),
                Some('\'') => {
                    self.idx += 1;
                    break;
                }
                Some('\\') => {
                    let c = self.scan_escape(position)?;
                    if value.is_some() {
                        saw_more_than_one = true;
                    }
                    value = Some(c);
                }
                Some(c) => {
                    if value.is_some() {
                        saw_more_than_one = true;
                    }
                    value = Some(c);
                    self.idx += 1;
                }
            }
        }
        if saw_more_than_one {
            return Err(lexer_error(position, "character literal must contain exactly one character"));
        }
        let c = value.ok_or_else(|| lexer_error(position, "empty character literal"))?;
        let sym = self.interner.intern(&c.to_string());
        Ok(Token {
            kind: TokenKind::Char,
            text: sym,
            literal: TokenLiteral::Char(c),
            position,
            has_whitespace_before: had_space,
            has_trailing_alphabet: false,
        })
    }

    fn scan_punct(&mut self, position: Position, had_space: bool) -> Result<Token, CompileError> {
        // Longest-first so e.g. `::` is tried before `:`, `->` before `-`.
        const PUNCT3: &[(&str, TokenKind)] = &[];
        const PUNCT2: &[(&str, TokenKind)] = &[
            ("::", TokenKind::ColonColon),
            ("->", TokenKind::Arrow),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::LtEq),
            (">=", TokenKind::GtEq),
            ("<<", TokenKind::Shl),
            (">>", TokenKind::Shr),
            ("+=", TokenKind::PlusEq),
            ("-=", TokenKind::MinusEq),
            ("*=", TokenKind::StarEq),
            ("/=", TokenKind::SlashEq),
            ("%=", TokenKind::PercentEq),
            ("++", TokenKind::PlusPlus),
            ("--", TokenKind::MinusMinus),
        ];
        const PUNCT1: &[(char, TokenKind)] = &[
            ('(', TokenKind::LParen),
            (')', TokenKind::RParen),
            ('[', TokenKind::LBrack),
            (']', TokenKind::RBrack),
            ('{', TokenKind::LBrace),
            ('}', TokenKind::RBrace),
            (',', TokenKind::Comma),
            ('.', TokenKind::Dot),
            (':', TokenKind::Colon),
            ('^', TokenKind::Caret),
            ('|', TokenKind::Pipe),
            ('&', TokenKind::Amp),
            ('=', TokenKind::Eq),
            ('!', TokenKind::Not),
            ('<', TokenKind::Lt),
            ('>', TokenKind::Gt),
            ('+', TokenKind::Plus),
            ('-', TokenKind::Minus),
            ('*', TokenKind::Star),
            ('/', TokenKind::Slash),
            ('%', TokenKind::Percent),
        ];

        let two: Option<String> = if self.idx + 1 < self.chars.len() {
            Some(format!("{}{}", self.chars[self.idx], self.chars[self.idx + 1]))
        } else {
            None
        };
        if let Some(two) = &two {
            if let Some((_, kind)) = PUNCT2.iter().find(|(s, _)| s == two) {
                self.idx += 2;
                let sym = self.interner.intern(two);
                return Ok(Token {
                    kind: *kind,
                    text: sym,
                    literal: TokenLiteral::None,
                    position,
                    has_whitespace_before: had_space,
                    has_trailing_alphabet: false,
                });
            }
        }
        let _ = PUNCT3;

        let c = self.advance().unwrap();
        if let Some((_, kind)) = PUNCT1.iter().find(|(ch, _)| *ch == c) {
            let has_trailing_alphabet = *kind == TokenKind::Star
                && matches!(self.peek(), Some(c) if c.is_alphabetic() || c == '_');
            let has_whitespace_before = had_space
                && matches!(kind, TokenKind::LBrack | TokenKind::LParen);
            let sym = self.interner.intern(&c.to_string());
            return Ok(Token {
                kind: *kind,
                text: sym,
                literal: TokenLiteral::None,
                position,
                has_whitespace_before,
                has_trailing_alphabet,
            });
        }

        Err(lexer_error(position, format!("unexpected character '{c}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn lex_all(src: &str) -> Vec<Token> {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, src).unwrap();
        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(&reader, &mut interner, &config).unwrap();
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let is_end = tok.is(TokenKind::End);
            tokens.push(tok);
            if is_end {
                break;
            }
        }
        tokens
    }

    #[test]
    fn lbrack_whitespace_flag_distinguishes_index_from_literal() {
        let tokens = lex_all("a [1]\n");
        let lbrack = tokens.iter().find(|t| t.is(TokenKind::LBrack)).unwrap();
        assert!(lbrack.has_whitespace_before);

        let tokens = lex_all("a[1]\n");
        let lbrack = tokens.iter().find(|t| t.is(TokenKind::LBrack)).unwrap();
        assert!(!lbrack.has_whitespace_before);
    }

    #[test]
    fn star_trailing_alphabet_flags_label_reference() {
        let tokens = lex_all("*foo\n");
        let star = tokens.iter().find(|t| t.is(TokenKind::Star)).unwrap();
        assert!(star.has_trailing_alphabet);

        let tokens = lex_all("a * 2\n");
        let star = tokens.iter().find(|t| t.is(TokenKind::Star)).unwrap();
        assert!(!star.has_trailing_alphabet);
    }

    #[test]
    fn consecutive_newlines_collapse_to_one_term() {
        let tokens = lex_all("var x :: Int\n\n\nvar y :: Int\n");
        let term_count = tokens.iter().filter(|t| t.is(TokenKind::Term)).count();
        assert_eq!(term_count, 2);
    }

    #[test]
    fn keyword_is_not_matched_as_prefix_of_longer_identifier() {
        let tokens = lex_all("var iffy :: Int\n");
        let id_tok = tokens.iter().find(|t| t.is(TokenKind::Id)).unwrap();
        assert!(!id_tok.is(TokenKind::If));
    }

    #[test]
    fn hex_and_binary_literals_parse() {
        let tokens = lex_all("var x :: Int = $FF\nvar y :: Int = 0b101\n");
        let ints: Vec<i64> = tokens
            .iter()
            .filter_map(|t| match t.literal {
                TokenLiteral::Int(v) => Some(v),
                _ => None,
            })
            .collect();
        assert!(ints.contains(&255));
        assert!(ints.contains(&5));
    }

    #[test]
    fn string_escapes_are_unescaped() {
        let tokens = lex_all("\"a\\tb\\n\"\n");
        let str_tok = tokens.iter().find(|t| t.is(TokenKind::String)).unwrap();
        assert!(str_tok.text.index() > 0);
    }

    #[test]
    fn import_is_deduplicated_in_diamond_graph() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        let a = dir.path().join("a.pr");
        let b = dir.path().join("b.pr");
        fs::write(&a, "var shared :: Int = 1\n").unwrap();
        fs::write(
            &b,
            "#import \"a.pr\"\n#import \"a.pr\"\nvar other :: Int = 2\n",
        )
        .unwrap();
        fs::write(&main, "#import \"a.pr\"\n#import \"b.pr\"\n").unwrap();

        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(&reader, &mut interner, &config).unwrap();
        let occurrences = lexer.buffer().matches("shared").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn include_is_not_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        let a = dir.path().join("a.pr");
        fs::write(&a, "var x :: Int = 1\n").unwrap();
        fs::write(&main, "#include \"a.pr\"\n#include \"a.pr\"\n").unwrap();

        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(&reader, &mut interner, &config).unwrap();
        let occurrences = lexer.buffer().matches("var x").count();
        assert_eq!(occurrences, 2);
    }

    #[test]
    fn missing_import_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(&main, "#import \"nope.pr\"\n").unwrap();
        let config = CompilerConfig::new();
        let reader = SourceReader::new(&main, &config);
        let mut interner = Interner::new();
        assert!(Lexer::new(&reader, &mut interner, &config).is_err());
    }
}
