//! Diagnostic rendering.
//!
//! Renders [`Diagnostic`]s against their source text with `ariadne`,
//! producing the underlined, annotated output the CLI prints.

use ariadne::{Color, Label as AriadneLabel, Report, ReportKind, Source};

use crate::{Diagnostic, Severity};

/// Render a diagnostic against its source text into a string.
///
/// `file_name` is used for the location header; `source` must be the full
/// text the diagnostic's spans index into.
pub fn render(diag: &Diagnostic, file_name: &str, source: &str) -> String {
    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Note => ReportKind::Advice,
    };

    let offset = diag
        .primary_span()
        .map(|s| s.start as usize)
        .unwrap_or_default();

    let mut report = Report::build(kind, file_name, offset)
        .with_code(diag.code)
        .with_message(&diag.message);

    for label in &diag.labels {
        let color = if label.is_primary {
            Color::Red
        } else {
            Color::Blue
        };
        report = report.with_label(
            AriadneLabel::new((file_name, label.span.to_range()))
                .with_message(&label.message)
                .with_color(color),
        );
    }

    for note in &diag.notes {
        report = report.with_note(note);
    }

    let mut buf = Vec::new();
    // Write failures can only come from the Vec sink, which cannot fail.
    let _ = report
        .finish()
        .write((file_name, Source::from(source)), &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Render a diagnostic and print it to stderr.
pub fn eprint(diag: &Diagnostic, file_name: &str, source: &str) {
    eprintln!("{}", render(diag, file_name, source));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use rill_ir::Span;

    #[test]
    fn test_render_contains_message_and_code() {
        let diag = Diagnostic::error(ErrorCode::E2001)
            .with_message("undeclared name `foo`")
            .with_label(Span::new(0, 3), "not found in this scope");

        let out = render(&diag, "test.rill", "foo + 1");
        assert!(out.contains("undeclared name `foo`"));
        assert!(out.contains("E2001"));
    }

    #[test]
    fn test_render_includes_notes() {
        let diag = Diagnostic::error(ErrorCode::E3001)
            .with_message("boom")
            .with_label(Span::new(0, 1), "here")
            .with_note("some guidance");

        let out = render(&diag, "test.rill", "x");
        assert!(out.contains("some guidance"));
    }
}
