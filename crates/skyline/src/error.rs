use std::{io, path::PathBuf, process::ExitStatus, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkylineError {
    #[error("Invalid date key '{key}'")]
    InvalidDate {
        key: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("No buckets to lay out")]
    EmptyInput,

    #[error("Skyline has no building with a positive count")]
    EmptyModel,

    #[error("Failed to write file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read file {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start external tool '{tool}'")]
    ToolNotFound {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("External tool '{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("External tool '{tool}' timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("External tool '{tool}' reported success but produced no mesh for {path}")]
    ToolNoOutput { tool: String, path: PathBuf },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid aspect ratio '{0}': expected W:H with positive integers")]
    InvalidAspectRatio(String),

    #[error("Invalid interval '{0}': must be day or week")]
    InvalidGranularity(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl SkylineError {
    /// True for failures of the mesh compiler.
    pub fn is_external_tool(&self) -> bool {
        matches!(
            self,
            SkylineError::ToolNotFound { .. }
                | SkylineError::ToolFailed { .. }
                | SkylineError::ToolTimeout { .. }
                | SkylineError::ToolNoOutput { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SkylineError>;
