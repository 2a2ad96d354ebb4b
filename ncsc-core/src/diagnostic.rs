//! Diagnostics reported while parsing and lowering a unit.
//!
//! Every error-severity diagnostic increments the error counter of the
//! compiler instance that received it; warnings are recorded but never
//! block serialization.

use std::fmt;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Name of the unit (main script or include) the span points into.
    pub unit: Option<String>,
    /// Resolved 1-based line, filled in once the unit source is known.
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span,
            unit: None,
            line: None,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span,
            unit: None,
            line: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Attaches the unit name and resolves the line number against `source`.
    pub fn located(mut self, unit: &str, source: &str) -> Self {
        if self.unit.is_none() {
            self.unit = Some(unit.to_string());
            self.line = Some(self.span.line_col(source).0);
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match (&self.unit, self.line) {
            (Some(unit), Some(line)) => write!(f, "{unit}.nss({line}): {kind}: {}", self.message),
            (Some(unit), None) => write!(f, "{unit}.nss: {kind}: {}", self.message),
            _ => write!(f, "{kind}: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_diagnostic_renders_unit_and_line() {
        let diag = Diagnostic::error("undeclared identifier \"x\"", Span::new(8, 9))
            .located("main", "void a;\nx");
        assert_eq!(diag.to_string(), "main.nss(2): error: undeclared identifier \"x\"");
    }

    #[test]
    fn location_is_attached_once() {
        let diag = Diagnostic::warning("w", Span::new(0, 1))
            .located("inner", "w")
            .located("outer", "w");
        assert_eq!(diag.unit.as_deref(), Some("inner"));
        assert!(!diag.is_error());
    }
}
