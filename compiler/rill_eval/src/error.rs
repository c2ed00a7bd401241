//! Runtime error type and factory functions.
//!
//! Every failure path in the evaluator goes through a constructor here, so
//! the closed taxonomy in `rill_diagnostic::ErrorCode` stays closed.

use rill_diagnostic::{Diagnostic, ErrorCode};
use rill_ir::Span;

use crate::value::Value;

/// Result of evaluation.
///
/// Note that `Ok` covers effects too: an outward-propagating effect is an
/// ordinary `Value::Effect`. `Err` is reserved for aborting errors.
pub type EvalResult = Result<Value, RuntimeError>;

/// An aborting evaluation error.
#[derive(Clone, Debug)]
pub struct RuntimeError {
    pub code: ErrorCode,
    pub message: String,
    /// Primary source location, when known.
    pub span: Option<Span>,
    /// Secondary labels.
    pub labels: Vec<(Span, String)>,
    /// Human guidance.
    pub notes: Vec<String>,
}

impl RuntimeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        RuntimeError {
            code,
            message: message.into(),
            span: None,
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Attach a primary span if none is set yet.
    ///
    /// The innermost location wins, so re-attaching while unwinding is a
    /// no-op.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push((span, message.into()));
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a renderable diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.code).with_message(&self.message);
        if let Some(span) = self.span {
            diag = diag.with_label(span, self.code.description());
        }
        for (span, message) in &self.labels {
            diag = diag.with_secondary_label(*span, message.clone());
        }
        for note in &self.notes {
            diag = diag.with_note(note.clone());
        }
        diag
    }
}

// Structural errors

#[cold]
pub fn invalid_pattern(what: &str) -> RuntimeError {
    RuntimeError::new(ErrorCode::E1001, format!("invalid pattern: {what}"))
}

#[cold]
pub fn invalid_tuple_pattern(found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1002,
        format!("tuple pattern cannot match a {}", found.type_name()),
    )
}

#[cold]
pub fn invalid_record_pattern(found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1003,
        format!("record pattern cannot match a {}", found.type_name()),
    )
}

#[cold]
pub fn invalid_placeholder() -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1004,
        "placeholder `_` cannot be evaluated as a value",
    )
}

#[cold]
pub fn invalid_spread(context: &str) -> RuntimeError {
    RuntimeError::new(ErrorCode::E1005, format!("invalid use of spread: {context}"))
}

#[cold]
pub fn invalid_index(target: &Value, index: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1006,
        format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ),
    )
}

#[cold]
pub fn index_out_of_bounds(index: f64, len: usize) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1006,
        format!("index {} out of bounds for length {len}", index),
    )
}

#[cold]
pub fn invalid_index_target(target: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1007,
        format!("{} cannot be indexed", target.type_name()),
    )
}

#[cold]
pub fn invalid_send_channel(found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1008,
        format!("send target must be a channel, found {}", found.type_name()),
    )
}

#[cold]
pub fn invalid_receive_channel(found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E1009,
        format!(
            "receive source must be a channel, found {}",
            found.type_name()
        ),
    )
}

#[cold]
pub fn channel_closed(name: &str) -> RuntimeError {
    RuntimeError::new(ErrorCode::E1010, format!("channel \"{name}\" is closed"))
}

// Semantic errors

#[cold]
pub fn undeclared_name(name: &str) -> RuntimeError {
    RuntimeError::new(ErrorCode::E2001, format!("undeclared name `{name}`"))
}

#[cold]
pub fn undeclared_assignment(name: &str, closest: Option<&str>) -> RuntimeError {
    let mut err = RuntimeError::new(
        ErrorCode::E2002,
        format!("cannot assign to undeclared name `{name}`"),
    );
    if let Some(closest) = closest {
        err = err.with_note(format!("did you mean `{closest}`?"));
    }
    err
}

#[cold]
pub fn immutable_assignment(name: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E2003,
        format!("cannot assign to immutable binding `{name}`"),
    )
    .with_note("declare with `mut` to allow reassignment")
}

#[cold]
pub fn invalid_increment(name: &str, found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E2004,
        format!(
            "`{name}` holds a {} and cannot be incremented",
            found.type_name()
        ),
    )
}

#[cold]
pub fn invalid_increment_value(found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E2005,
        format!(
            "increment value must be a number or string, found {}",
            found.type_name()
        ),
    )
}

#[cold]
pub fn duplicate_default_export() -> RuntimeError {
    RuntimeError::new(ErrorCode::E2006, "module already has a default export")
}

#[cold]
pub fn import_failed(name: &str, reason: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E2007,
        format!("cannot import \"{name}\": {reason}"),
    )
}

#[cold]
pub fn not_callable(found: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E2008,
        format!("{} is not callable", found.type_name()),
    )
}

// Runtime errors

#[cold]
pub fn evaluation(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorCode::E3001, message)
}

#[cold]
pub fn unhandled_effect(tag: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E3002,
        format!("unhandled effect `{tag}` reached the top of the task"),
    )
    .with_note("install a handler with `inject` around the raising expression")
}

#[cold]
pub fn effect_escaped(tag: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::E3003,
        format!("effect `{tag}` escaped a `without` guard"),
    )
}

#[cold]
pub fn deadlock(detail: &str) -> RuntimeError {
    RuntimeError::new(ErrorCode::E3004, format!("deadlock: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_span_keeps_innermost() {
        let err = evaluation("boom")
            .with_span(Span::new(5, 6))
            .with_span(Span::new(0, 10));
        assert_eq!(err.span, Some(Span::new(5, 6)));
    }

    #[test]
    fn test_to_diagnostic_carries_labels_and_notes() {
        let err = undeclared_assignment("lenght", Some("length")).with_span(Span::new(0, 6));
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, ErrorCode::E2002);
        assert_eq!(diag.primary_span(), Some(Span::new(0, 6)));
        assert!(diag.notes.iter().any(|n| n.contains("length")));
    }
}
