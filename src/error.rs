//! Error types for hierarchy construction, stepping and field access.

use thiserror::Error;

use crate::helpers::Int2;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("input {index} size mismatch: expected {expected}, got {got}")]
    ShapeMismatch { index: usize, expected: Int2, got: Int2 },

    #[error("input count mismatch: expected {expected}, got {got}")]
    InputCount { expected: usize, got: usize },

    #[error("coordinate {pos} out of bounds for field of size {size}")]
    OutOfBounds { pos: Int2, size: Int2 },

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("parameter {name} expects {expected}")]
    ParameterType { name: String, expected: &'static str },

    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::OutOfBounds {
            pos: Int2::new(4, 0),
            size: Int2::new(4, 4),
        };
        assert_eq!(e.to_string(), "coordinate (4, 0) out of bounds for field of size (4, 4)");

        let e = Error::ShapeMismatch {
            index: 1,
            expected: Int2::new(4, 4),
            got: Int2::new(3, 4),
        };
        assert_eq!(e.to_string(), "input 1 size mismatch: expected (4, 4), got (3, 4)");

        let e = Error::ParameterType {
            name: "p_radius".into(),
            expected: "an integer",
        };
        assert_eq!(e.to_string(), "parameter p_radius expects an integer");
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<Vec<i32>>("not json").unwrap_err();
        assert!(matches!(Error::from(err), Error::Configuration(_)));
    }
}
