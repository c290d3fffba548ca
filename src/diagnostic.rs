//! The one diagnostic formatter (§4.2, §6 "Diagnostic format"): every
//! pass's errors and the buffered warning channel all render through
//! [`pretty_print`], so `<file>:<line>:<column>: <severity>: <message>`
//! plus the source/caret lines look identical no matter which phase
//! raised them.
//!
//! [`crate::lexer::Lexer::pretty_print`] is a thin wrapper around this
//! same function for callers that still hold the `Lexer` alive; once
//! parsing has consumed it, a caller instead keeps the `(buffer,
//! breadcrumbs)` pair straight from [`crate::parser::Parser`] and renders
//! through here directly, which is what `cli.rs` does for parser/semantics
//! errors raised after the lexer is gone.

use crate::breadcrumb::{BreadcrumbTrail, Position};
use crate::error::{CompileError, Warning, WarningSink};
use crate::intern::Interner;
use crate::style::Style;

/// Renders the three-line diagnostic for `position` (§6): the located
/// `<file>:<line>:<col>: <severity>: <message>` header, the offending
/// source line, and a caret line pointing at the column (tabs counted as
/// 8 columns, per `BreadcrumbTrail::resolve`). `position == NO_POSITION`
/// (or one outside any known breadcrumb) falls back to an `<unknown>`
/// header with no source/caret lines.
pub fn pretty_print(
    buffer: &str,
    breadcrumbs: &BreadcrumbTrail,
    interner: &Interner,
    position: Position,
    severity: &str,
    message: &str,
) -> String {
    match breadcrumbs.resolve(buffer, interner, position) {
        Some(resolved) => {
            let source_line = breadcrumbs.source_line(buffer, position);
            let caret = " ".repeat(resolved.column.max(0) as usize) + "^";
            format!(
                "{}:{}:{}: {}: {}\n\t{}\n\t{}\n",
                resolved.source_name,
                resolved.line + 1,
                resolved.column + 1,
                severity,
                message,
                source_line,
                caret
            )
        }
        None => format!("<unknown>: {severity}: {message}\n"),
    }
}

/// Same rendering, with the severity word bold-red for errors — matching
/// the teacher's `Style::bold_red` usage for fatal diagnostics elsewhere.
pub fn render_error(buffer: &str, breadcrumbs: &BreadcrumbTrail, interner: &Interner, err: &CompileError) -> String {
    let severity = Style::bold_red(err.severity());
    pretty_print(buffer, breadcrumbs, interner, err.position(), &severity, err.message())
}

/// Renders a single buffered warning (yellow `warning:` prefix).
pub fn render_warning(buffer: &str, breadcrumbs: &BreadcrumbTrail, interner: &Interner, warning: &Warning) -> String {
    let severity = Style::yellow("warning");
    pretty_print(buffer, breadcrumbs, interner, warning.position, &severity, &warning.message)
}

/// Drains `sink` and renders every buffered warning in emission order
/// (§2 "Warning/Diagnostic sink", flushed once at the end per §5).
pub fn render_warnings(
    buffer: &str,
    breadcrumbs: &BreadcrumbTrail,
    interner: &Interner,
    sink: &WarningSink,
) -> Vec<String> {
    sink.drain()
        .iter()
        .map(|w| render_warning(buffer, breadcrumbs, interner, w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breadcrumb::Breadcrumb;
    use crate::error::semantics_error;

    fn single_file_trail(interner: &mut Interner, name: &str) -> BreadcrumbTrail {
        let source_name = interner.intern(name);
        BreadcrumbTrail::new(vec![Breadcrumb {
            total_offset: 0,
            original_offset: 0,
            line_in_original: 0,
            source_name,
        }])
    }

    #[test]
    fn renders_three_line_diagnostic() {
        let mut interner = Interner::new();
        let trail = single_file_trail(&mut interner, "main.pr");
        let buffer = "var x :: Int\n";
        let err = semantics_error(4, "bad name");
        let rendered = pretty_print(buffer, &trail, &interner, err.position(), err.severity(), err.message());
        assert!(rendered.starts_with("main.pr:1:5: error: bad name\n"));
        assert!(rendered.contains("var x :: Int"));
        assert!(rendered.ends_with("^\n"));
    }

    #[test]
    fn unknown_position_falls_back() {
        let interner = Interner::new();
        let trail = BreadcrumbTrail::new(vec![]);
        let rendered = pretty_print("", &trail, &interner, crate::breadcrumb::NO_POSITION, "error", "oops");
        assert_eq!(rendered, "<unknown>: error: oops\n");
    }

    #[test]
    fn render_warnings_drains_the_sink_in_order() {
        let mut interner = Interner::new();
        let trail = single_file_trail(&mut interner, "main.pr");
        let sink = WarningSink::new();
        sink.push(0, "first");
        sink.push(1, "second");
        let rendered = render_warnings("ab\n", &trail, &interner, &sink);
        assert_eq!(rendered.len(), 2);
        assert!(rendered[0].contains("first"));
        assert!(sink.is_empty());
    }
}
