use serde::Serialize;
use std::fmt;

/// Error surfaced to callers of the discovery pipeline.
///
/// Only fatal conditions become an `AppError`; per-row and per-process failures
/// are folded into the report instead.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    /// A required external tool (`adb`, `netstat`) is missing or unusable.
    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEPENDENCY", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    pub fn is_dependency(&self) -> bool {
        self.code == "ERR_DEPENDENCY"
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trace_id.is_empty() {
            write!(f, "{} ({})", self.error, self.code)
        } else {
            write!(f, "{} ({}, trace {})", self.error, self.code, self.trace_id)
        }
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_trace() {
        let err = AppError::dependency("netstat not found", "trace-1");
        assert_eq!(err.to_string(), "netstat not found (ERR_DEPENDENCY, trace trace-1)");
        assert!(err.is_dependency());
    }

    #[test]
    fn display_omits_empty_trace() {
        let err = AppError::system("boom", "");
        assert_eq!(err.to_string(), "boom (ERR_SYSTEM)");
    }
}
