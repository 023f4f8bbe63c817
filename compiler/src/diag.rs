// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all compiler phases:
// elaboration, constant propagation and verification all report through
// `Diagnostic`, and every stable code lives in `codes`.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Stable codes ─────────────────────────────────────────────────────────

pub mod codes {
    use super::DiagCode;

    // E01xx: constant propagation and unrolling
    pub const E0100: DiagCode = DiagCode("E0100"); // argument count mismatch
    pub const E0101: DiagCode = DiagCode("E0101"); // cyclic instantiation

    // E02xx: elaboration
    pub const E0200: DiagCode = DiagCode("E0200"); // unknown stream
    pub const E0201: DiagCode = DiagCode("E0201"); // unknown variable
    pub const E0202: DiagCode = DiagCode("E0202"); // duplicate declaration
    pub const E0203: DiagCode = DiagCode("E0203"); // recursive declaration
    pub const E0204: DiagCode = DiagCode("E0204"); // misplaced instantiation role
    pub const E0205: DiagCode = DiagCode("E0205"); // duplicate section
    pub const E0206: DiagCode = DiagCode("E0206"); // duplicate splitter used as joiner
    pub const E0207: DiagCode = DiagCode("E0207"); // feedback loop missing body or loop
    pub const E0208: DiagCode = DiagCode("E0208"); // assignment to a parameter
    pub const E0209: DiagCode = DiagCode("E0209"); // no top-level stream

    // E03xx / W03xx: verification
    pub const E0300: DiagCode = DiagCode("E0300"); // child list out of sync
    pub const E0301: DiagCode = DiagCode("E0301"); // container or parent mismatch
    pub const E0302: DiagCode = DiagCode("E0302"); // feedback loop part missing
    pub const W0300: DiagCode = DiagCode("W0300"); // structural field still symbolic
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a propagated constraint failure.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub span: Option<Span>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related spans, or causes.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            span,
        });
        self
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// 1-based line and column of a byte offset in `source`.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let col = before.len() - before.rfind('\n').map_or(0, |i| i + 1) + 1;
    (line, col)
}

impl Diagnostic {
    /// Render with source positions: the `Display` form prefixed by
    /// `path:line:col`, then one line per related span and per cause.
    pub fn render(&self, source: &str, path: &str) -> String {
        let at = |span: Span| {
            let (line, col) = line_col(source, span.start);
            format!("{}:{}:{}", path, line, col)
        };
        let mut out = format!("{}: {}", at(self.span), self);
        for related in &self.related_spans {
            out.push_str(&format!("\n  {}: note: {}", at(related.span), related.label));
        }
        for cause in &self.cause_chain {
            match cause.span {
                Some(span) => out.push_str(&format!("\n  = {} ({})", cause.message, at(span))),
                None => out.push_str(&format!("\n  = {}", cause.message)),
            }
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
