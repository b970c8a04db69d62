//! Error types surfaced to the user when a run or an import cannot proceed.

use thiserror::Error;

/// Reasons a run ends in the `Failed` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The dependency install command exited unsuccessfully.
    #[error("dependency install failed: `{command}` exited with {}", exit_label(.code))]
    DependencyInstallFailed { command: String, code: Option<i32> },

    /// The program is not installed or not on PATH.
    #[error("command not found: {program}. Please install {program} first")]
    ExecutableNotFound { program: String },

    /// The program exists but could not be started.
    #[error("failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },

    /// Waiting on the child process failed.
    #[error("lost track of the child process: {message}")]
    Io { message: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Errors raised while importing a project from GitHub.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// The URL does not point at a GitHub repository.
    #[error("invalid GitHub repository URL: {url}")]
    InvalidUrl { url: String },

    /// git is not installed.
    #[error("git not found. Please install git first")]
    GitNotFound,

    /// `git clone` ran and failed.
    #[error("failed to clone: {stderr}")]
    CloneFailed { stderr: String },

    /// The clone target is already occupied.
    #[error("destination already exists: {path}")]
    DestinationExists { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
