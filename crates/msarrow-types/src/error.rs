//! Error raised by a database driver implementation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DEADLOCK_ERROR_NUMBER;

/// Failure reported by the underlying driver.
///
/// The engine never rewrites these; they pass through to callers unchanged
/// unless they classify as a transient deadlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverError {
    /// Native server error number, when the driver exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Five-character SQLSTATE, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Whether the server picked this statement as a deadlock victim and
    /// asked for it to be rerun.
    #[must_use]
    pub fn is_transient_deadlock(&self) -> bool {
        if self.code == Some(DEADLOCK_ERROR_NUMBER) {
            return true;
        }
        let msg = self.message.to_ascii_lowercase();
        msg.contains("deadlock") || msg.contains("rerun the transaction")
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.sqlstate.as_deref()) {
            (Some(code), Some(state)) => write!(f, "[{state}] ({code}) {}", self.message),
            (Some(code), None) => write!(f, "({code}) {}", self.message),
            (None, Some(state)) => write!(f, "[{state}] {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_detected_by_number() {
        let err = DriverError::new("Transaction was chosen").with_code(1205);
        assert!(err.is_transient_deadlock());
    }

    #[test]
    fn deadlock_detected_by_message() {
        let err = DriverError::new(
            "Transaction (Process ID 57) was deadlocked on lock resources. Rerun the transaction.",
        );
        assert!(err.is_transient_deadlock());
        assert!(DriverError::new("Please RERUN THE TRANSACTION").is_transient_deadlock());
    }

    #[test]
    fn other_errors_are_not_transient() {
        let err = DriverError::new("Invalid object name 'dbo.missing'").with_code(208);
        assert!(!err.is_transient_deadlock());
    }

    #[test]
    fn display_includes_code_and_state() {
        let err = DriverError::new("boom").with_code(50000).with_sqlstate("42000");
        assert_eq!(err.to_string(), "[42000] (50000) boom");
        assert_eq!(DriverError::new("plain").to_string(), "plain");
    }

    #[test]
    fn serde_roundtrip_skips_empty_fields() {
        let err = DriverError::new("x");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"message":"x"}"#);
        let back: DriverError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
