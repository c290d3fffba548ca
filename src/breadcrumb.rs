//! Maps byte ranges of the lexer's aggregated source buffer back to the
//! original file and line they came from, so diagnostics can point at
//! real source text even after `#import`/`#include` splicing.

use crate::intern::{Interner, Symbol};

pub type Position = i64;

pub const NO_POSITION: Position = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Breadcrumb {
    /// Offset into the aggregated buffer where this breadcrumb begins.
    pub total_offset: i64,
    /// Offset into the *original* file's contents at this point.
    pub original_offset: i64,
    /// Zero-based line number within the original file.
    pub line_in_original: i64,
    pub source_name: Symbol,
}

/// Sorted by `total_offset`; looked up by upper-bound search so that a
/// position resolves to the breadcrumb whose range contains it.
#[derive(Clone)]
pub struct BreadcrumbTrail {
    entries: Vec<Breadcrumb>,
}

pub struct ResolvedPosition<'a> {
    pub source_name: &'a str,
    pub line: i64,
    pub column: i64,
}

impl BreadcrumbTrail {
    pub fn new(mut entries: Vec<Breadcrumb>) -> Self {
        entries.sort_by_key(|b| b.total_offset);
        BreadcrumbTrail { entries }
    }

    pub fn push(&mut self, b: Breadcrumb) {
        self.entries.push(b);
    }

    /// Locates the breadcrumb governing `position` and derives
    /// `(fileName, lineNumber, columnInLine)`, counting tabs as 8 columns.
    pub fn resolve<'a>(
        &self,
        buffer: &str,
        interner: &'a Interner,
        position: Position,
    ) -> Option<ResolvedPosition<'a>> {
        if position < 0 {
            return None;
        }
        let idx = self
            .entries
            .partition_point(|b| b.total_offset <= position)
            .checked_sub(1)?;
        let crumb = &self.entries[idx];

        let line_start_in_buffer = line_start(buffer, position as usize);
        let consumed_lines_in_crumb =
            count_newlines(buffer, crumb.total_offset as usize, position as usize);
        let line = crumb.line_in_original + consumed_lines_in_crumb;

        let column = buffer[line_start_in_buffer..position as usize]
            .chars()
            .map(|c| if c == '\t' { 8 } else { 1 })
            .sum::<i64>();

        Some(ResolvedPosition {
            source_name: interner.resolve(crumb.source_name),
            line,
            column,
        })
    }

    /// Returns the full original-file line of text containing `position`,
    /// for use as the source line in a diagnostic render.
    pub fn source_line(&self, buffer: &str, position: Position) -> &str {
        if position < 0 || position as usize > buffer.len() {
            return "";
        }
        let start = line_start(buffer, position as usize);
        let end = buffer[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(buffer.len());
        &buffer[start..end]
    }
}

fn line_start(buffer: &str, pos: usize) -> usize {
    buffer[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn count_newlines(buffer: &str, from: usize, to: usize) -> i64 {
    buffer[from..to].bytes().filter(|&b| b == b'\n').count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_single_file_position() {
        let mut interner = Interner::new();
        let name = interner.intern("main.pr");
        let buffer = "var x :: Int\nvar y :: Int\n";
        let trail = BreadcrumbTrail::new(vec![Breadcrumb {
            total_offset: 0,
            original_offset: 0,
            line_in_original: 0,
            source_name: name,
        }]);
        let resolved = trail.resolve(buffer, &interner, 17).unwrap();
        assert_eq!(resolved.source_name, "main.pr");
        assert_eq!(resolved.line, 1);
    }

    #[test]
    fn no_position_resolves_to_none() {
        let interner = Interner::new();
        let trail = BreadcrumbTrail::new(vec![]);
        assert!(trail.resolve("", &interner, NO_POSITION).is_none());
    }

    #[test]
    fn tabs_count_as_eight_columns() {
        let mut interner = Interner::new();
        let name = interner.intern("a");
        let buffer = "\tx";
        let trail = BreadcrumbTrail::new(vec![Breadcrumb {
            total_offset: 0,
            original_offset: 0,
            line_in_original: 0,
            source_name: name,
        }]);
        let resolved = trail.resolve(buffer, &interner, 1).unwrap();
        assert_eq!(resolved.column, 8);
    }
}
