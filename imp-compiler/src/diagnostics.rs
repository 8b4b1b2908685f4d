//! Diagnostic accumulation and rendering.
//!
//! Every phase records errors and warnings into a [`Diagnostics`] sink and
//! the driver validates the sink at phase boundaries (after parsing, after
//! lowering).  Rendering follows the conventional `file:line:column:` shape
//! with ANSI colors.

use std::fmt;

const BOLD_RED: &str = "\x1b[1;31m";
const BOLD_MAGENTA: &str = "\x1b[1;35m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Classification of a diagnostic, matched on by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Syntax,
    Undeclared,
    Redeclared,
    BadArrayBounds,
    IteratorAssignment,
    LiteralRange,
    NotAnArray,
    NotAVariable,
    Uninitialized,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl Diagnostic {
    /// Render as `file:line:column: error: message` with ANSI colors.
    pub fn render(&self, file: &str) -> String {
        let (color, label) = match self.severity {
            Severity::Error => (BOLD_RED, "error"),
            Severity::Warning => (BOLD_MAGENTA, "warning"),
        };
        format!(
            "{}:{}:{}: {color}{label}:{RESET} {}",
            file, self.line, self.col, self.message
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}:{}: {}: {}", self.line, self.col, label, self.message)
    }
}

/// Accumulator threaded through all compilation phases.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, kind: DiagnosticKind, line: usize, col: usize, message: impl Into<String>) {
        self.errors += 1;
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            kind,
            line,
            col,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, kind: DiagnosticKind, line: usize, col: usize, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            line,
            col,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// Warnings recorded so far, in emission order.
    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .cloned()
            .collect()
    }
}
