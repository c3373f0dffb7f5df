//! Error types for invoking the `dolt` binary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from a single `dolt` invocation.
#[derive(Debug, Error)]
pub enum DoltError {
    /// The binary could not be started.
    #[error("failed to spawn '{}': {source}", binary.display())]
    Spawn {
        /// Binary that was invoked.
        binary: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Waiting for the process failed.
    #[error("failed to wait for dolt: {0}")]
    Wait(#[from] std::io::Error),

    /// A filesystem operation on the repository directory failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path being created or removed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `dolt sql -r json` printed something that is not a result set.
    #[error("unreadable dolt output: {0}")]
    Output(#[from] serde_json::Error),

    /// The process ran past its timeout and was killed.
    #[error("dolt did not finish within {}s and was killed", .0.as_secs_f64())]
    Timeout(Duration),

    /// The process exited unsuccessfully.
    #[error("dolt exited with {}: {stderr}", exit_label(*code))]
    Failed {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Convenience alias for results with [`DoltError`].
pub type Result<T> = std::result::Result<T, DoltError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message_includes_stderr() {
        let err = DoltError::Failed {
            code: Some(1),
            stderr: "table not found: people".into(),
        };
        assert_eq!(
            err.to_string(),
            "dolt exited with status 1: table not found: people"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = DoltError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "dolt did not finish within 1.5s and was killed");
    }
}
