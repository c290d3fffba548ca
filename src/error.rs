//! The three user-facing error kinds (§7) plus the buffered warning
//! channel. Each error carries a `Position`; the one diagnostic formatter
//! that knows how to render a `Position` against source text lives in
//! `diagnostic.rs`.

use crate::breadcrumb::Position;

#[derive(Clone, Debug)]
pub struct LexerError {
    pub position: Position,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ParserError {
    pub position: Position,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct SemanticsError {
    pub position: Position,
    pub message: String,
}

#[derive(Clone, Debug)]
pub enum CompileError {
    Lexer(LexerError),
    Parser(ParserError),
    Semantics(SemanticsError),
}

impl CompileError {
    pub fn position(&self) -> Position {
        match self {
            CompileError::Lexer(e) => e.position,
            CompileError::Parser(e) => e.position,
            CompileError::Semantics(e) => e.position,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Lexer(e) => &e.message,
            CompileError::Parser(e) => &e.message,
            CompileError::Semantics(e) => &e.message,
        }
    }

    pub fn severity(&self) -> &'static str {
        "error"
    }
}

impl From<LexerError> for CompileError {
    fn from(e: LexerError) -> Self {
        CompileError::Lexer(e)
    }
}

impl From<ParserError> for CompileError {
    fn from(e: ParserError) -> Self {
        CompileError::Parser(e)
    }
}

impl From<SemanticsError> for CompileError {
    fn from(e: SemanticsError) -> Self {
        CompileError::Semantics(e)
    }
}

pub fn lexer_error(position: Position, message: impl Into<String>) -> CompileError {
    LexerError {
        position,
        message: message.into(),
    }
    .into()
}

pub fn parser_error(position: Position, message: impl Into<String>) -> CompileError {
    ParserError {
        position,
        message: message.into(),
    }
    .into()
}

pub fn semantics_error(position: Position, message: impl Into<String>) -> CompileError {
    SemanticsError {
        position,
        message: message.into(),
    }
    .into()
}

/// Convergence failure message (§7): the Type Resolver's specific error
/// when an iteration makes no progress and a slot is still unresolved.
pub const CANNOT_RESOLVE_TYPE: &str =
    "cannot resolve the type of the expression, variable or function";

/// A single non-fatal diagnostic (§2 "Warning/Diagnostic sink"). Warnings
/// never abort compilation; they are buffered and flushed once at the end.
#[derive(Clone, Debug)]
pub struct Warning {
    pub position: Position,
    pub message: String,
}

#[derive(Default)]
pub struct WarningSink {
    warnings: std::cell::RefCell<Vec<Warning>>,
}

impl WarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, position: Position, message: impl Into<String>) {
        self.warnings.borrow_mut().push(Warning {
            position,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.borrow().is_empty()
    }

    /// Drains the buffered warnings in emission order (append-only until
    /// this is called, matching §5's "flushed once at the end").
    pub fn drain(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_sink_is_append_only_until_drained() {
        let sink = WarningSink::new();
        sink.push(3, "first");
        sink.push(5, "second");
        assert!(!sink.is_empty());
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn compile_error_from_variants_preserve_position() {
        let e: CompileError = lexer_error(7, "bad escape");
        assert_eq!(e.position(), 7);
        assert_eq!(e.message(), "bad escape");
    }
}
