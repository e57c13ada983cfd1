pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;

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
    pub message: String,
    /// Stable registry code, e.g. `B-R001`; see `registry::lookup`.
    pub code: Option<&'static str>,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            code: None,
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
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

// ---- From impls for the pipeline's error types ----

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        let message = if e.code == "B-L002" {
            "malformed string literal".to_string()
        } else {
            format!("unexpected character '{}'", e.snippet)
        };
        let mut d = Diagnostic::error(message).with_code(e.code).with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::resolver::ResolveError> for Diagnostic {
    fn from(e: &crate::resolver::ResolveError) -> Self {
        use crate::resolver::ResolveError;
        let d = Diagnostic::error(e.to_string()).with_code(e.code());
        match e {
            ResolveError::Undeclared { name, span } => d
                .with_span(*span, "not declared in any enclosing scope")
                .with_suggestion(format!("declare it first: var {name} = ...")),
            ResolveError::Redeclared { span, .. } => d
                .with_span(*span, "declared again here")
                .with_note("an inner block may shadow an outer name, but one scope cannot declare it twice"),
        }
    }
}

impl From<&crate::compiler::CompileError> for Diagnostic {
    fn from(e: &crate::compiler::CompileError) -> Self {
        if let crate::compiler::CompileError::Resolve(inner) = e {
            return Diagnostic::from(inner);
        }
        let mut d = Diagnostic::error(e.to_string())
            .with_code(e.code())
            .with_note("this is a compiler bug, not an error in the program");
        if let Some(span) = e.span() {
            d = d.with_span(span, "while compiling this");
        }
        d
    }
}

impl From<&crate::vm::VmError> for Diagnostic {
    fn from(e: &crate::vm::VmError) -> Self {
        let mut d = Diagnostic::error(e.to_string()).with_code(e.code());
        if let Some(span) = e.span {
            d = d.with_span(span, "at runtime");
        }
        d
    }
}
