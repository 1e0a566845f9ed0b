use crate::command::ExitCode;
use std::io;
use thiserror::Error;

/// Status reported for a stage whose command could not be resolved.
pub const STATUS_NOT_FOUND: ExitCode = 127;

/// Status reported for a stage whose process could not be created.
pub const STATUS_SPAWN_FAILED: ExitCode = 126;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Parse(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Shell status code for a failure that ends a pipeline stage.
    pub fn status(&self) -> ExitCode {
        match self {
            ShellError::CommandNotFound(_) => STATUS_NOT_FOUND,
            ShellError::Spawn { .. } => STATUS_SPAWN_FAILED,
            _ => 1,
        }
    }

    /// True for errors raised while turning a line into a pipeline.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ShellError::Parse(_) | ShellError::ResourceExhausted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
