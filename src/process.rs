//! Data structures for tracking a run.
//!
//! `RunState` is the lifecycle of one install-then-run sequence and `RunSession`
//! describes the child process while it is alive.

use std::fmt;
use std::time::Instant;

use crate::commands::RunCommand;

/// Lifecycle status of a [`Runner`](crate::runner::Runner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Nothing has been started yet.
    Idle,
    /// The dependency install command is running.
    Installing,
    /// The run command is being spawned.
    Starting,
    /// The project process is alive.
    Running,
    /// The project process is gone, either on its own or because a stop was requested.
    Stopped { code: Option<i32>, cancelled: bool },
    /// The run could not be carried out.
    Failed { error: String },
}

impl RunState {
    /// Whether a child process may currently exist.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Installing | Self::Starting | Self::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Installing => f.write_str("installing"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Stopped {
                cancelled: true, ..
            } => f.write_str("stopped"),
            Self::Stopped {
                code: Some(code), ..
            } => write!(f, "exited {}", code),
            Self::Stopped { code: None, .. } => f.write_str("exited"),
            Self::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// The live child process of a run.
#[derive(Debug, Clone)]
pub struct RunSession {
    /// Process ID of the child.
    pub pid: u32,
    /// The command that was spawned, including its working directory.
    pub command: RunCommand,
    /// Time when the child was spawned.
    pub started_at: Instant,
}

impl RunSession {
    pub fn new(pid: u32, command: RunCommand) -> Self {
        Self {
            pid,
            command,
            started_at: Instant::now(),
        }
    }
}
