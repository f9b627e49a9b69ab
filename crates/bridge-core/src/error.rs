//! Error taxonomy (§7): Transient, Conflict, Data, Fatal.
//!
//! Collaborator calls still return plain `anyhow::Result` with
//! `.context(...)` attached at each boundary, matching the teacher's style;
//! `BridgeError` exists purely so the scheduler and bots can classify a
//! failure into a retry/fail/skip/decline decision without string-matching
//! the anyhow chain.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network timeout, 5xx, push race — retried next cycle.
    Transient,
    /// Stale durable state, lost optimistic push after exhausting attempts —
    /// the work item fails, no durable mutation occurs.
    Conflict,
    /// Unparseable version string, missing primary issue — logged as a
    /// warning, only the specific item is skipped.
    Data,
    /// Missing required collaborator — the bot declines to produce items.
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Data => "data",
            ErrorClass::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// A classified error carrying an `anyhow::Error` cause chain.
#[derive(Debug)]
pub struct BridgeError {
    pub class: ErrorClass,
    pub cause: anyhow::Error,
}

impl BridgeError {
    pub fn transient(cause: anyhow::Error) -> Self {
        Self { class: ErrorClass::Transient, cause }
    }

    pub fn conflict(cause: anyhow::Error) -> Self {
        Self { class: ErrorClass::Conflict, cause }
    }

    pub fn data(cause: anyhow::Error) -> Self {
        Self { class: ErrorClass::Data, cause }
    }

    pub fn fatal(cause: anyhow::Error) -> Self {
        Self { class: ErrorClass::Fatal, cause }
    }

    /// Transient and Data-class errors are eligible for the scheduler to
    /// retry the work item next cycle; Conflict and Fatal are not.
    pub fn retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Transient)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.class, self.cause)
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable_others_are_not() {
        let e = anyhow::anyhow!("boom");
        assert!(BridgeError::transient(anyhow::anyhow!("boom")).retryable());
        assert!(!BridgeError::conflict(e).retryable());
        assert!(!BridgeError::data(anyhow::anyhow!("boom")).retryable());
        assert!(!BridgeError::fatal(anyhow::anyhow!("boom")).retryable());
    }

    #[test]
    fn display_includes_class_and_cause() {
        let e = BridgeError::data(anyhow::anyhow!("bad version string"));
        let rendered = e.to_string();
        assert!(rendered.contains("data"));
        assert!(rendered.contains("bad version string"));
    }
}
