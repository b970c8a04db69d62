//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the run view using `ratatui`.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use ratatui::Terminal;

use crate::app::{App, StatusLevel};
use crate::output::{LineKind, Phase};
use crate::process::RunState;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current run view to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    execute!(terminal.backend_mut(), SetTitle(format!("limebox · {}", app.name)))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(1),
                Constraint::Length(4),
            ])
            .split(area);
        let border_style = Style::default().fg(Color::DarkGray);

        let width = vertical[0].width.saturating_sub(4) as usize;
        let header = Paragraph::new(Text::from(vec![
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", status_char(&app.state, app.use_symbols)),
                    status_style(&app.state),
                ),
                Span::styled(
                    app.name.clone(),
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {}", app.project_type),
                    Style::default().fg(Color::Cyan),
                ),
            ]),
            Line::from(Span::styled(
                truncate(
                    &format!("$ {}  ({})", app.command, app.path.display()),
                    width,
                ),
                Style::default().fg(Color::Gray),
            )),
        ]))
        .block(
            Block::default()
                .title("LimeBox")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::Green)),
        );
        frame.render_widget(header, vertical[0]);

        let log_block = Block::default()
            .title(log_title(app))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border_style);
        let log_area = log_block.inner(vertical[1]);
        app.set_log_view_height(log_area.height as usize);
        let log_lines = render_log_lines(app, log_area.height as usize, log_area.width as usize);
        let empty = log_lines.lines.is_empty();
        frame.render_widget(Paragraph::new(log_lines).block(log_block), vertical[1]);
        if empty {
            let placeholder = Paragraph::new("No output yet")
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(placeholder, log_area);
        }

        let default_help = if app.use_symbols {
            "↑/↓ scroll | PgUp/PgDn page | Home/End top/bottom | f follow | q stop"
        } else {
            "Up/Down scroll | PgUp/PgDn page | Home/End top/bottom | f follow | q stop"
        };
        let (help_line, help_style) = match app.status_message() {
            Some((text, StatusLevel::Warning)) => (text.to_string(), Style::default().fg(Color::Yellow)),
            Some((text, StatusLevel::Info)) => (text.to_string(), Style::default().fg(Color::DarkGray)),
            None => (default_help.to_string(), Style::default().fg(Color::DarkGray)),
        };
        let status = Paragraph::new(Text::from(vec![
            Line::from(Span::raw(app.status_line())),
            Line::from(Span::styled(help_line, help_style)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(status, vertical[2]);
    })?;
    Ok(())
}

fn log_title(app: &App) -> String {
    format!("Logs - {} ({})", app.name, app.state)
}

/// Visible slice of the log buffer, colored by line kind.
fn render_log_lines(app: &App, height: usize, width: usize) -> Text<'static> {
    if height == 0 {
        return Text::default();
    }
    let lines = app
        .logs
        .iter()
        .skip(app.scroll)
        .take(height)
        .map(|line| {
            let mut style = line_style(line.kind);
            if line.phase == Phase::Install {
                style = style.add_modifier(Modifier::DIM);
            }
            Line::from(Span::styled(truncate(&line.text, width), style))
        })
        .collect::<Vec<_>>();
    Text::from(lines)
}

fn line_style(kind: LineKind) -> Style {
    match kind {
        LineKind::Error => Style::default().fg(Color::Red),
        LineKind::Ready => Style::default().fg(Color::Green),
        LineKind::Warning => Style::default().fg(Color::Yellow),
        LineKind::Default => Style::default().fg(Color::White),
    }
}

fn status_char(state: &RunState, use_symbols: bool) -> char {
    if use_symbols {
        return match state {
            RunState::Idle => '·',
            RunState::Installing | RunState::Starting => '↻',
            RunState::Running => '▲',
            RunState::Stopped { .. } | RunState::Failed { .. } => '■',
        };
    }
    match state {
        RunState::Idle => '.',
        RunState::Installing => 'I',
        RunState::Starting => 'S',
        RunState::Running => 'R',
        RunState::Stopped { code, cancelled } => {
            if *cancelled || code.unwrap_or(1) == 0 {
                'E'
            } else {
                'X'
            }
        }
        RunState::Failed { .. } => 'F',
    }
}

fn status_style(state: &RunState) -> Style {
    match state {
        RunState::Idle => Style::default().fg(Color::DarkGray),
        RunState::Installing | RunState::Starting => Style::default().fg(Color::Yellow),
        RunState::Running => Style::default().fg(Color::Green),
        RunState::Stopped { code, cancelled } => {
            if *cancelled || code.unwrap_or(1) == 0 {
                Style::default().fg(Color::Gray)
            } else {
                Style::default().fg(Color::Red)
            }
        }
        RunState::Failed { .. } => Style::default().fg(Color::Red),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::RunCommand;
    use crate::detect::ProjectType;
    use crate::events::RunEvent;
    use std::path::{Path, PathBuf};

    fn app_with_lines(lines: &[(&str, Phase)]) -> App {
        let command = RunCommand::new("npm", &["start"], Path::new("/srv/app"));
        let mut app = App::new(
            "app",
            ProjectType::React,
            PathBuf::from("/srv/app"),
            command,
            100,
            true,
        );
        for (line, phase) in lines {
            app.on_run_event(RunEvent::Output {
                kind: crate::output::classify(line),
                line: line.to_string(),
                phase: *phase,
            });
        }
        app
    }

    #[test]
    fn log_lines_follow_scroll_and_color_by_kind() {
        let mut app = app_with_lines(&[
            ("added 120 packages", Phase::Install),
            ("Compiled successfully", Phase::Run),
            ("Error: port in use", Phase::Run),
        ]);
        app.set_log_view_height(2);
        let text = render_log_lines(&app, 2, 80);
        assert_eq!(text.lines.len(), 2);
        assert_eq!(text.lines[0].spans[0].content, "Compiled successfully");
        assert_eq!(text.lines[0].spans[0].style.fg, Some(Color::Green));
        assert_eq!(text.lines[1].spans[0].style.fg, Some(Color::Red));

        app.scroll_to_top();
        let text = render_log_lines(&app, 2, 80);
        let first = &text.lines[0].spans[0];
        assert_eq!(first.content, "added 120 packages");
        assert!(first.style.add_modifier.contains(Modifier::DIM));
    }

    #[test]
    fn long_lines_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc~");
        assert_eq!(truncate("abc", 4), "abc");
        assert_eq!(truncate("ünïcødé", 3), "ün~");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn status_chars_without_symbols() {
        assert_eq!(status_char(&RunState::Running, false), 'R');
        assert_eq!(status_char(&RunState::Installing, false), 'I');
        let failed_exit = RunState::Stopped {
            code: Some(1),
            cancelled: false,
        };
        assert_eq!(status_char(&failed_exit, false), 'X');
        assert_eq!(status_style(&failed_exit).fg, Some(Color::Red));
    }
}
