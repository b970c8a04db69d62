//! LimeBox: detect, install and run local or GitHub-hosted projects from the terminal.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads configuration, and either opens the interactive menu or runs one of the
//! scripted subcommands.

mod app;
mod commands;
mod config;
mod detect;
mod error;
mod events;
mod github;
mod menu;
mod output;
mod process;
mod runner;
mod store;
mod toolchain;
mod tui;

use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::{format_tool_message, App, AppAction};
use crate::config::{Overrides, Settings};
use crate::events::{Event, ProcessSignal, RunEvent, RunOutcome};
use crate::github::GitHubRepo;
use crate::menu::{Launcher, Menu, EXPOSE_NOTICE};
use crate::output::{LineKind, Phase};
use crate::process::RunState;
use crate::runner::{RunTask, Runner, ShutdownConfig};
use crate::store::{JsonProjectStore, ProjectDescriptor, ProjectStore};

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "limebox",
    version,
    about = "Detect, install and run projects from the terminal",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to limebox.toml configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ignore any limebox.toml in the current directory.
    #[arg(long, global = true)]
    no_config: bool,
    /// Project store file (default: config.json).
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Max log lines kept in the run view.
    #[arg(long, global = true)]
    max_lines: Option<usize>,
    /// Time to wait after sending SIGINT before escalating (ms).
    #[arg(long, global = true)]
    shutdown_sigint_ms: Option<u64>,
    /// Time to wait after sending SIGTERM before force-killing (ms).
    #[arg(long, global = true)]
    shutdown_sigterm_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open the interactive menu (default).
    Start,
    /// Run a registered project.
    Run {
        /// Project name.
        name: String,
        /// Print output to stdout instead of opening the run view.
        #[arg(long)]
        no_ui: bool,
        /// Ask for the project to be exposed online.
        #[arg(long)]
        expose: bool,
    },
    /// Register a local directory as a project.
    Add {
        path: PathBuf,
        /// Project name (default: the directory name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Clone a GitHub repository and register it.
    Clone {
        url: String,
        /// Project name (default: the repository name).
        #[arg(long)]
        name: Option<String>,
    },
    /// List registered projects.
    List,
    /// Remove a project from the store. Files on disk are left alone.
    Remove { name: String },
    /// Print the detected type of a directory.
    Detect {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Check which external tools are installed.
    Doctor,
    /// Print version information.
    Version,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("{}", format!("{err:#}").red());
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        store: cli.store,
        max_lines: cli.max_lines,
        shutdown_sigint_ms: cli.shutdown_sigint_ms,
        shutdown_sigterm_ms: cli.shutdown_sigterm_ms,
    };
    let config = cli.config.as_deref();
    let no_config = cli.no_config;
    match cli.command.unwrap_or(Commands::Start) {
        Commands::Version => {
            println!("limebox {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Detect { path } => {
            if !path.is_dir() {
                bail!("path does not exist: {}", path.display());
            }
            println!("{}", detect::detect(&path));
            Ok(())
        }
        Commands::Doctor => {
            let settings = load(config, no_config, overrides)?;
            doctor(&settings).await
        }
        Commands::Start => {
            let settings = load(config, no_config, overrides)?;
            let store = JsonProjectStore::new(&settings.store_path);
            start_menu(&settings, &store).await
        }
        Commands::Run {
            name,
            no_ui,
            expose,
        } => {
            let settings = load(config, no_config, overrides)?;
            let store = JsonProjectStore::new(&settings.store_path);
            let projects = store.load()?;
            let project = store::find(&projects, &name)
                .cloned()
                .ok_or_else(|| anyhow!("no project named '{}'", name))?;
            if expose {
                println!("{}", EXPOSE_NOTICE.yellow());
            }
            if no_ui {
                let outcome = run_plain(&settings, &project).await?;
                finish_outcome(outcome)
            } else {
                ensure_terminal()?;
                let outcome = run_view(&settings, &project).await?;
                finish_outcome(outcome)
            }
        }
        Commands::Add { path, name } => {
            let settings = load(config, no_config, overrides)?;
            let store = JsonProjectStore::new(&settings.store_path);
            let mut projects = store.load()?;
            let project = menu::add_local(&path, name.as_deref())?;
            let message = format!(
                "Added project '{}' ({}) at {}",
                project.name,
                project.project_type,
                project.path.display()
            );
            store::upsert(&mut projects, project);
            store.save(&projects)?;
            println!("{}", message);
            Ok(())
        }
        Commands::Clone { url, name } => {
            let settings = load(config, no_config, overrides)?;
            let store = JsonProjectStore::new(&settings.store_path);
            let mut projects = store.load()?;
            let repo = GitHubRepo::parse(&url)?;
            let name = name.unwrap_or_else(|| repo.name.clone());
            println!("Cloning {}...", repo.url);
            let project = menu::import_github(&repo, &name, &settings.clone_dir).await?;
            let message = format!(
                "Imported project '{}' ({}) at {}",
                project.name,
                project.project_type,
                project.path.display()
            );
            store::upsert(&mut projects, project);
            store.save(&projects)?;
            println!("{}", message);
            Ok(())
        }
        Commands::List => {
            let settings = load(config, no_config, overrides)?;
            let store = JsonProjectStore::new(&settings.store_path);
            let projects = store.load()?;
            if projects.is_empty() {
                println!("No projects added yet.");
            } else {
                for row in menu::project_table(&projects) {
                    println!("{}", row);
                }
            }
            Ok(())
        }
        Commands::Remove { name } => {
            let settings = load(config, no_config, overrides)?;
            let store = JsonProjectStore::new(&settings.store_path);
            let mut projects = store.load()?;
            let removed = store::remove(&mut projects, &name)
                .ok_or_else(|| anyhow!("no project named '{}'", name))?;
            store.save(&projects)?;
            println!("Removed project '{}'", removed.name);
            Ok(())
        }
    }
}

fn load(config: Option<&Path>, no_config: bool, overrides: Overrides) -> Result<Settings> {
    let settings = config::load_settings(config, no_config, overrides)?;
    init_tracing(&settings);
    tracing::debug!(
        config = ?settings.config_path,
        store = %settings.store_path.display(),
        "settings loaded"
    );
    Ok(settings)
}

/// Routes `tracing` output to the log file. Logging is skipped when the file
/// cannot be opened; the terminal belongs to the menu and the run view.
fn init_tracing(settings: &Settings) {
    let Some(path) = settings.log_file.as_ref() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let filter =
        EnvFilter::try_from_env("LIMEBOX_LOG").unwrap_or_else(|_| EnvFilter::new("limebox=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn ensure_terminal() -> Result<()> {
    if !std::io::stdout().is_terminal() {
        bail!("limebox requires a terminal environment");
    }
    Ok(())
}

fn shutdown_config(settings: &Settings) -> ShutdownConfig {
    ShutdownConfig::new(settings.shutdown_sigint_ms, settings.shutdown_sigterm_ms)
}

async fn start_menu(settings: &Settings, store: &JsonProjectStore) -> Result<()> {
    ensure_terminal()?;
    let input = std::io::stdin().lock();
    let launcher = TerminalLauncher { settings };
    let mut menu =
        Menu::new(input, std::io::stdout(), settings, store, launcher).clear_screen(true);
    menu.run().await
}

/// Opens the full-screen run view for menu launches.
struct TerminalLauncher<'a> {
    settings: &'a Settings,
}

impl Launcher for TerminalLauncher<'_> {
    async fn launch(&mut self, project: &ProjectDescriptor) -> Result<()> {
        match run_view(self.settings, project).await? {
            RunOutcome::Failed(err) => Err(err.into()),
            _ => Ok(()),
        }
    }
}

fn finish_outcome(outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Failed(err) => Err(err.into()),
        RunOutcome::Exited { code: Some(code) } if code != 0 => bail!("process exited with code {}", code),
        _ => Ok(()),
    }
}

/// Runs `project` behind the ratatui run view until the user closes it.
async fn run_view(settings: &Settings, project: &ProjectDescriptor) -> Result<RunOutcome> {
    let command = commands::run_command(project.project_type, &project.path);
    let mut app = App::new(
        project.name.clone(),
        project.project_type,
        project.path.clone(),
        command,
        settings.max_lines,
        settings.use_symbols,
    );
    tracing::info!(project = %project.name, kind = %project.project_type, "opening run view");

    // The terminal comes first: a failed setup must not leave a project running.
    let mut terminal = tui::init_terminal()?;
    let (run_tx, mut run_rx) = mpsc::channel(256);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let task = spawn_run(settings, project, run_tx);
    let stop = task.stop_handle().clone();
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx, false);

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    let mut shutdown_in_progress = false;
    let result: Result<()> = loop {
        tokio::select! {
            Some(event) = run_rx.recv() => app.on_run_event(event),
            Some(event) = event_rx.recv() => match event {
                Event::Key(key) => match app.handle_key(key) {
                    AppAction::Stop => stop.request(),
                    AppAction::Close | AppAction::None => {}
                },
                Event::Resize { .. } => {
                    if let Err(err) = terminal.autoresize() {
                        break Err(err.into());
                    }
                }
                Event::Shutdown { signal } => {
                    app.set_status_warning(format!("received {}, stopping", signal.label()));
                    shutdown_in_progress = true;
                    stop.request();
                }
            },
            _ = ticker.tick() => {}
        }
        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            break Err(err.into());
        }
        if app.should_quit || (shutdown_in_progress && app.is_finished()) {
            break Ok(());
        }
    };

    drop(event_rx);
    stop.request();
    // Keep draining so the runner never blocks on a full sink while it shuts down.
    while run_rx.recv().await.is_some() {}
    let outcome = task.join().await;
    tui::restore_terminal(terminal)?;
    result?;
    let outcome = outcome?;
    tracing::info!(project = %project.name, outcome = ?outcome, "run view closed");
    Ok(outcome)
}

/// Runs `project` with plain line output, for pipes and CI.
async fn run_plain(settings: &Settings, project: &ProjectDescriptor) -> Result<RunOutcome> {
    let (run_tx, mut run_rx) = mpsc::channel(256);
    let (signal_tx, mut signal_rx) = mpsc::channel(4);
    let task = spawn_run(settings, project, run_tx);
    let stop = task.stop_handle().clone();
    spawn_signal_listener(signal_tx, true);

    let use_symbols = settings.use_symbols;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = run_rx.recv() => match event {
                Some(event) => print_event(&mut stdout, &event, use_symbols)?,
                None => break,
            },
            Some(Event::Shutdown { signal }) = signal_rx.recv() => {
                let message = format!("received {}, stopping {}", signal.label(), project.name);
                writeln!(stdout, "{}", format_tool_message(&message, use_symbols).yellow())?;
                stop.request();
            }
        }
    }
    task.join().await
}

/// Starts `project` on a runner task streaming into `sink`.
fn spawn_run(
    settings: &Settings,
    project: &ProjectDescriptor,
    sink: mpsc::Sender<RunEvent>,
) -> RunTask {
    let mut runner = Runner::new(shutdown_config(settings));
    let stop = runner.stop_handle();
    let root = project.path.clone();
    let kind = project.project_type;
    RunTask::spawn(stop, async move { runner.run(&root, kind, sink).await })
}

fn print_event(out: &mut impl Write, event: &RunEvent, use_symbols: bool) -> Result<()> {
    match event {
        RunEvent::State(RunState::Installing) => {
            let message = format_tool_message("installing dependencies", use_symbols);
            writeln!(out, "{}", message.dim())?;
        }
        RunEvent::State(_) => {}
        RunEvent::Started(session) => {
            let message = format!("started: {} (pid {})", session.command, session.pid);
            writeln!(out, "{}", format_tool_message(&message, use_symbols).dim())?;
        }
        RunEvent::Output { kind, line, phase } => {
            let line = output::strip_carriage(line);
            let styled = match kind {
                LineKind::Error => line.red(),
                LineKind::Ready => line.green(),
                LineKind::Warning => line.yellow(),
                LineKind::Default => line.stylize(),
            };
            if *phase == Phase::Install {
                writeln!(out, "{}", styled.dim())?;
            } else {
                writeln!(out, "{}", styled)?;
            }
        }
        RunEvent::Finished(outcome) => {
            let message = match outcome {
                RunOutcome::Exited { code: Some(code) } => format!("process exited with code {}", code),
                RunOutcome::Exited { code: None } => "process ended".to_string(),
                RunOutcome::Stopped { .. } => "process stopped".to_string(),
                RunOutcome::Failed(err) => err.to_string(),
            };
            writeln!(out, "{}", format_tool_message(&message, use_symbols).dim())?;
        }
    }
    out.flush()?;
    Ok(())
}

async fn doctor(settings: &Settings) -> Result<()> {
    let (ok, missing) = if settings.use_symbols {
        ("✓", "✗")
    } else {
        ("ok", "--")
    };
    for status in toolchain::probe_all().await {
        let mark = if status.available() {
            ok.green()
        } else {
            missing.red()
        };
        let version = status.version.as_deref().unwrap_or("not found");
        println!("  {} {:<10} {}", mark, status.name, version);
    }
    Ok(())
}

/// Forwards terminal input to the run view. Stops once the view drops its receiver,
/// so keystrokes go back to the menu.
fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || {
        while !tx.is_closed() {
            if !crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => tx.blocking_send(Event::Key(key)),
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    tx.blocking_send(Event::Resize { width, height })
                }
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

/// Raw mode turns Ctrl+C into a key event, so the run view only needs SIGTERM.
/// Plain output mode also listens for Ctrl+C.
fn spawn_signal_listener(tx: mpsc::Sender<Event>, interrupt: bool) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            let ctrl_c = async {
                if interrupt {
                    let _ = tokio::signal::ctrl_c().await;
                } else {
                    std::future::pending::<()>().await;
                }
            };
            tokio::select! {
                _ = ctrl_c => {
                    let _ = tx.send(Event::Shutdown { signal: ProcessSignal::SigInt }).await;
                }
                _ = sigterm.recv() => {
                    let _ = tx.send(Event::Shutdown { signal: ProcessSignal::SigTerm }).await;
                }
                _ = tx.closed() => {}
            }
        }
        #[cfg(not(unix))]
        {
            if !interrupt {
                return;
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = tx
                        .send(Event::Shutdown {
                            signal: ProcessSignal::SigInt,
                        })
                        .await;
                }
                _ = tx.closed() => {}
            }
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}
