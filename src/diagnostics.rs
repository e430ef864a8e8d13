//! Diagnostic types for editor integration
//!
//! One diagnostic shape shared by everything this crate reports, designed to
//! map directly onto LSP diagnostics: severity, a stable code, a message,
//! and an optional source location.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Hint,
    Info,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// A name matched no candidate in its scope
    UnresolvedReference,
    /// A name resolved, but not to the kind of declaration the position needs
    UnknownType,
}

/// Source location span, 1-based lines and columns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span from byte offsets (requires source text for line/col
    /// calculation)
    pub fn from_byte_offset(source: &str, start: usize, end: usize) -> Self {
        let (start_line, start_col) = byte_to_line_col(source, start);
        let (end_line, end_col) = byte_to_line_col(source, end);
        Self::new(start_line, start_col, end_line, end_col)
    }
}

/// Convert byte offset to line and column
fn byte_to_line_col(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;

    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// A diagnostic message with location and severity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span: None,
        }
    }

    /// Add source span
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

// =============================================================================
// Tests
// =============================================================================
