//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Buffer out of space: {0}")]
    OutOfSpace(String),

    #[error("Duplicate environment key: {0}")]
    DuplicateKey(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Pipe error: {0}")]
    Pipe(String),

    #[error("Process spawn error: {0}")]
    Spawn(String),

    #[error("Process wait error: {0}")]
    Wait(String),

    #[error("Process signal error: {0}")]
    Signal(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Other(String),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::OutOfSpace(_) => "CORE001",
            CoreError::DuplicateKey(_) => "CORE002",
            CoreError::ConfigurationError(_) => "CORE003",
            CoreError::ValidationError(_) => "CORE004",
            CoreError::Pipe(_) => "CORE005",
            CoreError::Spawn(_) => "CORE006",
            CoreError::Wait(_) => "CORE007",
            CoreError::Signal(_) => "CORE008",
            CoreError::IoError(_) => "CORE009",
            CoreError::Other(_) => "CORE999",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

// Convenience implementations
impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::OutOfSpace("test".to_string()).code(), "CORE001");
        assert_eq!(CoreError::DuplicateKey("test".to_string()).code(), "CORE002");
        assert_eq!(CoreError::Spawn("test".to_string()).code(), "CORE006");
        assert_eq!(CoreError::Wait("test".to_string()).code(), "CORE007");
        assert_eq!(CoreError::Other("test".to_string()).code(), "CORE999");
    }

    #[test]
    fn test_error_display() {
        let error = CoreError::Spawn("fork failed".to_string());
        assert_eq!(error.to_string(), "Process spawn error: fork failed");

        let error = CoreError::OutOfSpace("argument arena full".to_string());
        assert_eq!(error.to_string(), "Buffer out of space: argument arena full");
    }

    #[test]
    fn test_from_implementations() {
        let error: CoreError = "test error".into();
        assert_eq!(error.to_string(), "Generic error: test error");

        let error: CoreError = "test error".to_string().into();
        assert_eq!(error.to_string(), "Generic error: test error");
    }
}
