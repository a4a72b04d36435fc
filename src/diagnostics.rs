//! Non-fatal warnings collected while running an operation.

use std::fmt;

use serde::Serialize;

/// A warning with a short summary and a longer explanation.
///
/// Hard failures are returned as errors instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning: {}", self.summary)?;
        if !self.detail.is_empty() {
            write!(f, "\n\n  {}", self.detail)?;
        }
        Ok(())
    }
}
