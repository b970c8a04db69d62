//! Event definitions.
//!
//! `RunEvent` is what a [`Runner`](crate::runner::Runner) hands to its sink;
//! `Event` is what drives the run view's event loop.

use crossterm::event::KeyEvent;

use crate::error::RunError;
use crate::output::{LineKind, Phase};
use crate::process::{RunSession, RunState};

/// Messages delivered to a runner's sink, in the order they happened.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The runner entered a new state.
    State(RunState),
    /// The run command was spawned.
    Started(RunSession),
    /// A line of merged stdout/stderr output.
    Output {
        kind: LineKind,
        line: String,
        phase: Phase,
    },
    /// The run is over. Always the last event of a run.
    Finished(RunOutcome),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The project process exited on its own (None usually implies signal termination).
    Exited { code: Option<i32> },
    /// The run was cancelled through a stop request.
    Stopped { code: Option<i32> },
    /// Install or launch failed before the project could run.
    Failed(RunError),
}

impl RunOutcome {
    pub fn into_state(self) -> RunState {
        match self {
            Self::Exited { code } => RunState::Stopped {
                code,
                cancelled: false,
            },
            Self::Stopped { code } => RunState::Stopped {
                code,
                cancelled: true,
            },
            Self::Failed(error) => RunState::Failed {
                error: error.to_string(),
            },
        }
    }
}

/// Signals used to ask a child to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    SigInt,
    SigTerm,
}

impl ProcessSignal {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SigInt => "SIGINT",
            Self::SigTerm => "SIGTERM",
        }
    }
}

/// Terminal and OS events feeding the run view's event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// The application received a termination signal.
    Shutdown { signal: ProcessSignal },
}
