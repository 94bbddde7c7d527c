pub mod ansi;
pub mod json;
pub mod registry;

use crate::model::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- From impls for each stage's error type ----

impl From<&crate::parser::FormatError> for Diagnostic {
    fn from(e: &crate::parser::FormatError) -> Self {
        Diagnostic::error(&e.message)
            .with_code(e.code)
            .with_span(e.span, "here")
            .with_note("the descriptor was left unchanged")
    }
}

impl From<&crate::edit::EditError> for Diagnostic {
    fn from(e: &crate::edit::EditError) -> Self {
        use crate::edit::EditError;
        let d = Diagnostic::error(e.to_string()).with_code(e.code());
        match e {
            EditError::BucketMismatch { .. } => {
                d.with_suggestion("pick the phase of the same kind, or pass --bucket")
            }
            EditError::MissingPhase { .. } | EditError::UnknownTarget(_) => {
                d.with_suggestion("pass --target with the name of a target that has this phase")
            }
            EditError::IdSpaceExhausted => d.with_note("no record was created"),
            EditError::PathConflict { existing, .. } => {
                d.with_suggestion(format!("move or remove {existing} first"))
            }
            _ => d,
        }
    }
}

impl From<&crate::edit::Warning> for Diagnostic {
    fn from(w: &crate::edit::Warning) -> Self {
        Diagnostic::warning(&w.message)
            .with_code(w.code)
            .with_note(format!("record '{}'", w.id))
    }
}

impl From<&crate::verify::VerifyError> for Diagnostic {
    fn from(e: &crate::verify::VerifyError) -> Self {
        let mut d = Diagnostic::error(&e.message)
            .with_code(e.code)
            .with_note(format!("in record '{}'", e.record));
        if let Some(hint) = &e.hint {
            d = d.with_suggestion(hint.clone());
        }
        d
    }
}

impl From<&crate::plan::PlanError> for Diagnostic {
    fn from(e: &crate::plan::PlanError) -> Self {
        Diagnostic::error(e.to_string()).with_code("PBX-P001")
    }
}

impl From<&crate::scan::ScanError> for Diagnostic {
    fn from(e: &crate::scan::ScanError) -> Self {
        Diagnostic::error(e.to_string()).with_code("PBX-S001")
    }
}
