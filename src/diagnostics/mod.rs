use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::span::Span;

/// Fatal conditions that abort analysis of the unit. Qualifier violations
/// are never fatal; they go through [`Diagnostic`] instead.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Malformed AST: {msg}")]
    MalformedAst { msg: String, span: Span },

    #[error("unit has {count} qualifier diagnostics; first: {first}")]
    QualifierErrors { count: usize, first: String },
}

impl CompileError {
    pub fn malformed(msg: impl Into<String>, span: Span) -> Self {
        Self::MalformedAst { msg: msg.into(), span }
    }
}

/// Which analysis pass produced a diagnostic. Used only to reconcile the
/// two sinks deterministically; Readonly entries sort before Final entries
/// at the same source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalysisPass {
    Readonly,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Redeclaration,
    ReadonlyMutation,
    UnsupportedCallConvention,
    FinalReassignment,
    FinalOverride,
    InvalidFinalUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    pub pass: AnalysisPass,
}

/// Append-only diagnostic sink for one analysis pass. Entries keep emission
/// order; nothing is deduplicated (a single statement may legitimately
/// produce several diagnostics).
#[derive(Debug)]
pub struct DiagnosticSink {
    pass: AnalysisPass,
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new(pass: AnalysisPass) -> Self {
        Self { pass, entries: Vec::new() }
    }

    pub fn emit(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        self.entries.push(Diagnostic {
            kind,
            message: message.into(),
            span,
            pass: self.pass,
        });
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

/// The reconciled, queryable diagnostic list for one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Merge the per-pass sinks: stable sort by source position, with
    /// Readonly-pass entries before Final-pass entries at equal position.
    /// Emission order within a pass is preserved.
    pub fn reconcile(readonly: DiagnosticSink, finals: DiagnosticSink) -> Self {
        let mut entries = readonly.into_entries();
        entries.extend(finals.into_entries());
        entries.sort_by_key(|d| (d.span.start, d.pass));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// All diagnostics whose message contains `pattern`. Conformance tests
    /// drive this.
    pub fn matching(&self, pattern: &str) -> Vec<&Diagnostic> {
        self.entries.iter().filter(|d| d.message.contains(pattern)).collect()
    }

    pub fn has(&self, pattern: &str) -> bool {
        !self.matching(pattern).is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.message.as_str()).collect()
    }
}

/// Render a diagnostic with ariadne for nice terminal output.
pub fn render_diagnostic(source: &str, diag: &Diagnostic) {
    use ariadne::{Label, Report, ReportKind, Source};

    Report::build(ReportKind::Error, (), diag.span.start)
        .with_message("qualifier error")
        .with_label(
            Label::new(diag.span.start..diag.span.end)
                .with_message(&diag.message),
        )
        .finish()
        .eprint(Source::from(source))
        .unwrap();
}
