use std::fmt::Write as _;

use super::{Diagnostic, Label, Severity};
use crate::ast::SourceMap;

/// Human-readable diagnostics for a terminal, in the usual
/// `error[CODE]: message` / `--> line:col` / caret layout.
pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, style: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{style}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn bold_yellow(&self, s: &str) -> String {
        self.paint("1;33", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let heading = match d.code {
            Some(code) => format!("{severity}[{code}]"),
            None => severity.to_string(),
        };
        let heading = match d.severity {
            Severity::Error => self.bold_red(&heading),
            Severity::Warning => self.bold_yellow(&heading),
        };
        let _ = writeln!(out, "{heading}: {}", self.bold(&d.message));

        let primary = d.labels.iter().find(|l| l.is_primary);
        if let (Some(label), Some(source)) = (primary, d.source.as_deref()) {
            self.snippet(&mut out, label, source);
        }

        for label in d.labels.iter().filter(|l| !l.is_primary && !l.message.is_empty()) {
            let _ = writeln!(out, "  {} {}", self.dim("="), label.message);
        }
        for note in &d.notes {
            let _ = writeln!(out, "  {} note: {note}", self.dim("="));
        }
        if let Some(suggestion) = &d.suggestion {
            let _ = writeln!(out, "  {} suggestion: {suggestion}", self.dim("="));
        }
        out
    }

    /// Location line, the offending source line, and carets under the span.
    fn snippet(&self, out: &mut String, label: &Label, source: &str) {
        let map = SourceMap::new(source);
        let (line, col) = map.lookup(label.span.start);
        let text = map.line_text(source, line);

        let width = line.to_string().len();
        let blank = " ".repeat(width);
        let pipe = self.cyan("|");

        let _ = writeln!(out, "  {} {line}:{col}", self.cyan("-->"));
        let _ = writeln!(out, "{blank} {pipe}");
        let _ = writeln!(out, "{} {pipe} {text}", self.cyan(&format!("{line:>width$}")));

        let indent = " ".repeat(col - 1);
        let carets = self.bold_red(&"^".repeat(label.span.end.saturating_sub(label.span.start).max(1)));
        if label.message.is_empty() {
            let _ = writeln!(out, "{blank} {pipe} {indent}{carets}");
        } else {
            let _ = writeln!(out, "{blank} {pipe} {indent}{carets} {}", self.bold_red(&label.message));
        }
        let _ = writeln!(out, "{blank} {pipe}");
    }
}
