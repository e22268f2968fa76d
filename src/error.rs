use crate::duration::DurationParseError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Every way a single adapter invocation can fail.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Empty or unparsable request line.
    #[error("{0}")]
    Input(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Script file not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Invalid file type. Expected .js file: {}", .0.display())]
    InvalidFileType(PathBuf),

    #[error("Invalid duration: {0}")]
    Duration(#[from] DurationParseError),

    /// k6 ran but exited unsuccessfully.
    #[error("Error executing k6 test (exit code {}):\n{stderr}", exit_code_label(.code))]
    Execution { code: Option<i32>, stderr: String },

    #[error("k6 run exceeded timeout of {}", crate::duration::format_duration(*.0))]
    Timeout(Duration),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Errors raised inside the executor path. The legacy error channel
    /// reports these through the `result` payload instead of `error`.
    pub fn is_execution_side(&self) -> bool {
        matches!(
            self,
            AdapterError::ScriptNotFound(_)
                | AdapterError::InvalidFileType(_)
                | AdapterError::Duration(_)
                | AdapterError::Execution { .. }
                | AdapterError::Timeout(_)
                | AdapterError::Unexpected(_)
        )
    }

    /// The text older callers expect inside the `result` payload: only
    /// script validation failures carry an `Error: ` prefix.
    pub fn legacy_message(&self) -> String {
        match self {
            AdapterError::ScriptNotFound(_) | AdapterError::InvalidFileType(_) => {
                format!("Error: {}", self)
            }
            AdapterError::Execution { stderr, .. } => format!("Error executing k6 test:\n{}", stderr),
            other => other.to_string(),
        }
    }

    /// Short machine-friendly name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Input(_) => "input",
            AdapterError::UnknownMethod(_) => "unknown_method",
            AdapterError::InvalidParams(_) => "invalid_params",
            AdapterError::ScriptNotFound(_) | AdapterError::InvalidFileType(_) => "validation",
            AdapterError::Duration(_) => "parse",
            AdapterError::Execution { .. } => "execution",
            AdapterError::Timeout(_) => "timeout",
            AdapterError::Unexpected(_) => "unexpected",
            AdapterError::Config(_) => "config",
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        AdapterError::Unexpected(e.to_string())
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
