//! Run view state and key handling.
//!
//! `App` holds everything the run view shows for one project: its header, the
//! buffered output, the runner state and the scroll position. Key presses are
//! translated into [`AppAction`]s that the event loop carries out.

use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::commands::RunCommand;
use crate::detect::ProjectType;
use crate::events::{RunEvent, RunOutcome};
use crate::output::{sanitize_text, strip_carriage, LineKind, LogBuffer, LogLine, Phase};
use crate::process::{RunSession, RunState};

/// Actions resulting from user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Ask the runner to stop the project.
    Stop,
    /// Leave the run view.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    level: StatusLevel,
}

/// State of the run view for a single project.
#[derive(Debug)]
pub struct App {
    pub name: String,
    pub project_type: ProjectType,
    pub path: PathBuf,
    /// The run command, shown in the header.
    pub command: RunCommand,
    pub logs: LogBuffer,
    pub state: RunState,
    /// The live child, from its `Started` event until the run finishes.
    pub session: Option<RunSession>,
    /// Index of the first visible line when not following.
    pub scroll: usize,
    /// Whether the view sticks to the newest output.
    pub follow: bool,
    /// Height of the log view area (for scrolling calculations).
    pub log_view_height: usize,
    /// Whether to use Unicode symbols.
    pub use_symbols: bool,
    /// Set once the run is over and the user asked to leave.
    pub should_quit: bool,
    outcome: Option<RunOutcome>,
    stop_requested: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(
        name: impl Into<String>,
        project_type: ProjectType,
        path: PathBuf,
        command: RunCommand,
        max_lines: usize,
        use_symbols: bool,
    ) -> Self {
        Self {
            name: name.into(),
            project_type,
            path,
            command,
            logs: LogBuffer::new(max_lines),
            state: RunState::Idle,
            session: None,
            scroll: 0,
            follow: true,
            log_view_height: 0,
            use_symbols,
            should_quit: false,
            outcome: None,
            stop_requested: false,
            status_message: None,
        }
    }

    /// Applies an event coming from the runner.
    pub fn on_run_event(&mut self, event: RunEvent) {
        match event {
            RunEvent::State(state) => {
                match &state {
                    RunState::Installing => self.set_status_message("installing dependencies"),
                    RunState::Starting => self.set_status_message("starting"),
                    RunState::Running => self.set_status_message("running, press q to stop"),
                    _ => {}
                }
                self.state = state;
            }
            RunEvent::Started(session) => {
                self.push_tool_line(format!(
                    "started: {} (pid {})",
                    session.command, session.pid
                ));
                self.session = Some(session);
            }
            RunEvent::Output { kind, line, phase } => self.on_output(kind, line, phase),
            RunEvent::Finished(outcome) => {
                self.session = None;
                let (message, level) = match &outcome {
                    RunOutcome::Exited { code: Some(0) } => {
                        ("process exited successfully".to_string(), StatusLevel::Info)
                    }
                    RunOutcome::Exited { code: Some(code) } => {
                        (format!("process exited with code {}", code), StatusLevel::Warning)
                    }
                    RunOutcome::Exited { code: None } => {
                        ("process ended".to_string(), StatusLevel::Info)
                    }
                    RunOutcome::Stopped { .. } => {
                        (format!("{} stopped", self.name), StatusLevel::Info)
                    }
                    RunOutcome::Failed(err) => (err.to_string(), StatusLevel::Warning),
                };
                self.push_tool_line(message.clone());
                self.status_message = Some(StatusMessage {
                    text: format!("{} | press q to close", message),
                    level,
                });
                self.outcome = Some(outcome);
            }
        }
    }

    fn on_output(&mut self, kind: LineKind, line: String, phase: Phase) {
        let text = sanitize_text(&strip_carriage(&line), true);
        self.logs.push(LogLine { text, kind, phase });
        if self.follow {
            self.ensure_follow();
        }
    }

    fn push_tool_line(&mut self, text: String) {
        let kind = match text.as_str() {
            t if t.contains("failed") || t.contains("not found") => LineKind::Error,
            _ => LineKind::Default,
        };
        self.logs.push(LogLine {
            text: format_tool_message(&text, self.use_symbols),
            kind,
            phase: Phase::Run,
        });
        if self.follow {
            self.ensure_follow();
        }
    }

    /// The run has delivered its final event.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        let quit = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL));
        if quit {
            return self.request_quit();
        }
        match key.code {
            KeyCode::Char('f') => {
                self.follow = !self.follow;
                if self.follow {
                    self.ensure_follow();
                }
            }
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(self.log_view_height.max(1)),
            KeyCode::PageDown => self.scroll_down(self.log_view_height.max(1)),
            KeyCode::Home => self.scroll_to_top(),
            KeyCode::End => {
                self.follow = true;
                self.ensure_follow();
            }
            _ => {}
        }
        AppAction::None
    }

    /// Stops a live run; closes the view once the run is over.
    pub fn request_quit(&mut self) -> AppAction {
        if self.is_finished() {
            self.should_quit = true;
            return AppAction::Close;
        }
        if !self.stop_requested {
            self.stop_requested = true;
            self.set_status_warning(format!("stopping {}...", self.name));
        }
        AppAction::Stop
    }

    pub fn scroll_up(&mut self, amount: usize) {
        let max_scroll = self.max_scroll();
        let current = if self.follow { max_scroll } else { self.scroll };
        self.scroll = current.saturating_sub(amount).min(max_scroll);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, amount: usize) {
        let max_scroll = self.max_scroll();
        let current = if self.follow { max_scroll } else { self.scroll };
        let next = (current + amount).min(max_scroll);
        self.scroll = next;
        self.follow = next == max_scroll;
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll = 0;
        self.follow = false;
    }

    pub fn ensure_follow(&mut self) {
        self.scroll = self.max_scroll();
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
        let max_scroll = self.max_scroll();
        if self.follow {
            self.scroll = max_scroll;
        } else {
            self.scroll = self.scroll.min(max_scroll);
        }
    }

    fn max_scroll(&self) -> usize {
        self.logs.len().saturating_sub(self.log_view_height.max(1))
    }

    pub fn status_line(&self) -> String {
        let pid = self
            .session
            .as_ref()
            .map(|s| s.pid.to_string())
            .unwrap_or_else(|| "-".into());
        let elapsed = self
            .session
            .as_ref()
            .map(|s| format_duration(s.started_at.elapsed()))
            .unwrap_or_else(|| "-".into());
        format!(
            "{} | status: {} | pid: {} | lines: {} | elapsed: {} | follow: {}",
            self.name,
            self.state,
            pid,
            self.logs.len(),
            elapsed,
            if self.follow { "on" } else { "off" },
        )
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        self.status_message
            .as_ref()
            .map(|message| (message.text.as_str(), message.level))
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            level: StatusLevel::Info,
        });
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            level: StatusLevel::Warning,
        });
    }
}

pub fn format_tool_message(text: &str, use_symbols: bool) -> String {
    if use_symbols {
        format!("◆ limebox: {}", text)
    } else {
        format!("[limebox] {}", text)
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let minutes = secs / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use std::path::Path;

    fn make_app() -> App {
        let command = RunCommand::new("npm", &["run", "dev"], Path::new("/srv/shop"));
        App::new(
            "shop",
            ProjectType::NextJs,
            PathBuf::from("/srv/shop"),
            command,
            100,
            false,
        )
    }

    fn output(app: &mut App, line: &str) {
        app.on_run_event(RunEvent::Output {
            kind: crate::output::classify(line),
            line: line.to_string(),
            phase: Phase::Run,
        });
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn quit_stops_then_closes() {
        let mut app = make_app();
        app.on_run_event(RunEvent::State(RunState::Running));
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppAction::Stop);
        assert!(!app.should_quit);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), AppAction::Stop);

        app.on_run_event(RunEvent::State(RunState::Stopped {
            code: None,
            cancelled: true,
        }));
        app.on_run_event(RunEvent::Finished(RunOutcome::Stopped { code: None }));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.handle_key(ctrl_c), AppAction::Close);
        assert!(app.should_quit);
    }

    #[test]
    fn output_is_sanitized_and_followed() {
        let mut app = make_app();
        app.set_log_view_height(2);
        output(&mut app, "\u{1b}[32mready\u{1b}[0m on :3000");
        output(&mut app, "building 10%\rbuilding 100%");
        output(&mut app, "compiled");
        let lines: Vec<_> = app.logs.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(lines, ["ready on :3000", "building 100%", "compiled"]);
        assert_eq!(app.logs.iter().next().map(|l| l.kind), Some(LineKind::Ready));
        assert_eq!(app.scroll, 1);
    }

    #[test]
    fn scrolling_disables_follow_until_end() {
        let mut app = make_app();
        app.set_log_view_height(2);
        for i in 0..10 {
            output(&mut app, &format!("line {}", i));
        }
        app.handle_key(key(KeyCode::Up));
        assert!(!app.follow);
        assert_eq!(app.scroll, 7);
        app.handle_key(key(KeyCode::Home));
        assert_eq!(app.scroll, 0);
        output(&mut app, "more");
        assert_eq!(app.scroll, 0);
        app.handle_key(key(KeyCode::End));
        assert!(app.follow);
        assert_eq!(app.scroll, 9);
        app.handle_key(key(KeyCode::Char('f')));
        assert!(!app.follow);
    }

    #[test]
    fn failure_is_reported_in_logs_and_status() {
        let mut app = make_app();
        let error = RunError::ExecutableNotFound {
            program: "npm".into(),
        };
        app.on_run_event(RunEvent::Finished(RunOutcome::Failed(error)));
        assert!(app.is_finished());
        let last = app.logs.iter().last().unwrap();
        assert_eq!(last.kind, LineKind::Error);
        assert!(last.text.contains("command not found: npm"));
        let (message, level) = app.status_message().unwrap();
        assert!(message.starts_with("command not found"));
        assert_eq!(level, StatusLevel::Warning);
    }

    #[test]
    fn status_line_tracks_the_live_session() {
        let mut app = make_app();
        assert!(app.status_line().contains("pid: -"));
        let command = RunCommand::new("npm", &["run", "dev"], Path::new("/srv/shop"));
        app.on_run_event(RunEvent::Started(RunSession::new(42, command)));
        let line = app.status_line();
        assert!(line.contains("pid: 42"), "{line}");
        assert!(line.contains("elapsed: 00:00"), "{line}");
        assert!(app.logs.iter().any(|l| l.text.contains("started: npm run dev (pid 42)")));

        app.on_run_event(RunEvent::Finished(RunOutcome::Exited { code: Some(0) }));
        assert!(app.session.is_none());
        assert!(app.status_line().contains("pid: -"));
    }
}
