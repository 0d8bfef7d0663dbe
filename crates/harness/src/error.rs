//! Error types shared by every part of the harness.
//!
//! Each variant corresponds to one kind of failure so callers can match on
//! the kind instead of inspecting messages. Nothing in the harness retries or
//! recovers locally: errors propagate to the caller, and the only automatic
//! compensation is data-directory removal in [`PostgresHarness`](crate::PostgresHarness).

use std::time::Duration;

use thiserror::Error;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Required identity or configuration is missing, detected before any
    /// subprocess is spawned.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A precondition about the harness or its data directory does not hold.
    #[error("harness state error: {0}")]
    State(String),

    /// An external command exited with a non-zero code.
    #[error(
        "a harness subprocess command failed. {message}\nThe return code was: {return_code}. Command: {command}"
    )]
    Subprocess {
        message: String,
        return_code: i32,
        command: String,
    },

    /// A filesystem precondition is violated, or a filesystem call failed.
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A resource the harness ships with could not be found.
    #[error("environment error: {0}")]
    Environment(String),

    /// An argument passed to a harness API is invalid.
    #[error("invalid value: {0}")]
    Value(String),

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid test discovery pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("error walking test directory: {0}")]
    Glob(#[from] glob::GlobError),

    /// A subprocess exceeded the configured command timeout and was killed.
    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl HarnessError {
    pub fn subprocess(
        message: impl Into<String>,
        return_code: i32,
        command: impl Into<String>,
    ) -> Self {
        Self::Subprocess {
            message: message.into(),
            return_code,
            command: command.into(),
        }
    }

    /// A filesystem precondition failure without an underlying OS error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Exit code of the failed command, if this is a subprocess failure.
    pub fn return_code(&self) -> Option<i32> {
        match self {
            Self::Subprocess { return_code, .. } => Some(*return_code),
            _ => None,
        }
    }

    /// The command (or script path) that failed, if this is a subprocess failure.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Subprocess { command, .. } | Self::Timeout { command, .. } => Some(command),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_error_keeps_code_and_command() {
        let err = HarnessError::subprocess("Error encountered", 1, "testcommand -e");

        assert_eq!(err.return_code(), Some(1));
        assert_eq!(err.command(), Some("testcommand -e"));

        let rendered = err.to_string();
        assert!(rendered.contains("Error encountered"));
        assert!(rendered.contains("The return code was: 1"));
        assert!(rendered.contains("testcommand -e"));
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let err: HarnessError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();

        match err {
            HarnessError::Io { message, source } => {
                assert_eq!(message, "gone");
                assert!(source.is_some());
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_subprocess_errors_have_no_return_code() {
        let err = HarnessError::State("harness dir not empty".into());
        assert_eq!(err.return_code(), None);
        assert_eq!(err.command(), None);
    }
}
