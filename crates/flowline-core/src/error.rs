//! Unified error types for network evaluation.
//!
//! [`FlowError`] covers the fatal conditions that abort an evaluation. Recovered
//! conditions (zero routing into a node, floored pressures) are not errors; they
//! are reported through [`crate::Diagnostics`] instead, and infeasible
//! constraint values are plain data.
//!
//! # Example
//!
//! ```
//! use flowline_core::{FlowError, FlowResult};
//!
//! fn check(len: usize) -> FlowResult<()> {
//!     if len == 0 {
//!         return Err(FlowError::Validation("empty schedule".into()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(0).is_err());
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    /// I/O errors (case files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two connected components disagree on the number of schedule entries
    #[error("Schedule mismatch on '{component}': expected {expected} streams, found {found}")]
    ScheduleMismatch {
        component: String,
        expected: usize,
        found: usize,
    },

    /// Stream slot outside the component's schedule
    #[error("Stream index {index} out of range for '{component}' ({len} streams)")]
    StreamIndex {
        component: String,
        index: usize,
        len: usize,
    },

    /// A branching pipe, separator or booster without its outlet
    #[error("'{0}' has no outlet connection")]
    MissingOutlet(String),

    #[error("Unknown component '{0}'")]
    UnknownComponent(String),

    #[error("Unknown decision variable #{0}")]
    UnknownVariable(usize),

    /// Decoupled formulation could not find the superposed stream of a segment
    #[error("Material balance lookup failed for '{0}'")]
    MaterialBalance(String),

    /// The topology is not a directed acyclic graph
    #[error("Topology contains a cycle through '{0}'")]
    Cycle(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using FlowError.
pub type FlowResult<T> = Result<T, FlowError>;

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        FlowError::Other(s)
    }
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        FlowError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::ScheduleMismatch {
            component: "riser".into(),
            expected: 4,
            found: 3,
        };
        let text = err.to_string();
        assert!(text.contains("riser"));
        assert!(text.contains("expected 4"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlowError = io_err.into();
        assert!(matches!(err, FlowError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<f64>("not a number").unwrap_err();
        let err: FlowError = json_err.into();
        assert!(matches!(err, FlowError::Parse(_)));
        let err: FlowError = String::from("boom").into();
        assert!(matches!(err, FlowError::Other(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> FlowResult<()> {
            Err(FlowError::MissingOutlet("manifold".into()))
        }

        fn outer() -> FlowResult<()> {
            inner()?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.to_string(), "'manifold' has no outlet connection");
    }
}
