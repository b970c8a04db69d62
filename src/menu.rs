//! The numbered main menu.
//!
//! Menu I/O goes through generic reader/writer handles so the whole flow can be
//! driven from tests; running a project is delegated to a [`Launcher`].

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor::MoveTo, queue};

use crate::config::Settings;
use crate::detect;
use crate::github::{self, GitHubRepo};
use crate::store::{self, ProjectDescriptor, ProjectSource, ProjectStore};
use crate::toolchain;

const LIME: Color = Color::Rgb { r: 0, g: 255, b: 0 };

const BANNER: &[&str] = &[
    "██╗     ██╗███╗   ███╗███████╗██████╗  ██████╗ ██╗  ██╗",
    "██║     ██║████╗ ████║██╔════╝██╔══██╗██╔═══██╗╚██╗██╔╝",
    "██║     ██║██╔████╔██║█████╗  ██████╔╝██║   ██║ ╚███╔╝ ",
    "██║     ██║██║╚██╔╝██║██╔══╝  ██╔══██╗██║   ██║ ██╔██╗ ",
    "███████╗██║██║ ╚═╝ ██║███████╗██████╔╝╚██████╔╝██╔╝ ██╗",
    "╚══════╝╚═╝╚═╝     ╚═╝╚══════╝╚═════╝  ╚═════╝ ╚═╝  ╚═╝",
];

const OPTIONS: &[(&str, &str)] = &[
    ("1", "Add Local Project"),
    ("2", "Clone from GitHub"),
    ("3", "Run Project"),
    ("4", "List Projects"),
    ("5", "Remove Project"),
    ("6", "Settings"),
    ("0", "Exit"),
];

pub const EXPOSE_NOTICE: &str =
    "Online exposure is not available; the project will run on localhost only.";

/// Runs a registered project in the foreground.
#[allow(async_fn_in_trait)]
pub trait Launcher {
    async fn launch(&mut self, project: &ProjectDescriptor) -> Result<()>;
}

/// Registers the directory at `path`, detecting its type.
pub fn add_local(path: &Path, name: Option<&str>) -> Result<ProjectDescriptor> {
    let path = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    if !path.is_dir() {
        anyhow::bail!("path does not exist: {}", path.display());
    }
    let name = match name {
        Some(name) => name.to_string(),
        None => default_name(&path),
    };
    let kind = detect::detect(&path);
    Ok(ProjectDescriptor::local(name, path, kind))
}

/// Clones `repo` under `clone_dir` and registers the checkout.
pub async fn import_github(
    repo: &GitHubRepo,
    name: &str,
    clone_dir: &Path,
) -> Result<ProjectDescriptor> {
    let destination = std::path::absolute(clone_dir.join(name))
        .with_context(|| format!("failed to resolve {}", clone_dir.display()))?;
    let path = github::clone_repository(repo, &destination).await?;
    let kind = detect::detect(&path);
    Ok(ProjectDescriptor::github(name, path, kind, repo.url.clone()))
}

/// Column layout used by the menu and `limebox list`.
pub fn project_table(projects: &[ProjectDescriptor]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<20} {:<12} {:<8} {}",
        "Name", "Type", "Source", "Path"
    )];
    rows.extend(projects.iter().map(|project| {
        format!(
            "{:<20} {:<12} {:<8} {}",
            project.name,
            project.project_type.label(),
            project.source.label(),
            project.path.display()
        )
    }));
    rows
}

fn default_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

pub struct Menu<'a, R, W, L> {
    input: R,
    out: W,
    settings: &'a Settings,
    store: &'a dyn ProjectStore,
    launcher: L,
    projects: Vec<ProjectDescriptor>,
    load_warning: Option<String>,
    clear_screen: bool,
}

impl<'a, R: BufRead, W: Write, L: Launcher> Menu<'a, R, W, L> {
    pub fn new(
        input: R,
        out: W,
        settings: &'a Settings,
        store: &'a dyn ProjectStore,
        launcher: L,
    ) -> Self {
        let (projects, load_warning) = match store.load() {
            Ok(projects) => (projects, None),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "could not load projects");
                (Vec::new(), Some(format!("{err:#}")))
            }
        };
        Self {
            input,
            out,
            settings,
            store,
            launcher,
            projects,
            load_warning,
            clear_screen: false,
        }
    }

    /// Clear the terminal before each menu redraw.
    pub fn clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear;
        self
    }

    pub async fn run(&mut self) -> Result<()> {
        if let Some(warning) = self.load_warning.take() {
            writeln!(self.out, "{}", format!("Error loading projects: {warning}").red())?;
        }
        loop {
            self.show_banner()?;
            self.show_menu()?;
            let Some(choice) = self.prompt("Select option", None)? else {
                break;
            };
            let result = match choice.as_str() {
                "0" => break,
                "1" => self.add_local_project(),
                "2" => self.clone_github_project().await,
                "3" => self.run_project().await,
                "4" => self.list_projects(),
                "5" => self.remove_project(),
                "6" => self.show_settings().await,
                _ => {
                    writeln!(self.out, "{}", "Invalid option, choose 0-6.".yellow())?;
                    continue;
                }
            };
            if let Err(err) = result {
                writeln!(self.out, "{}", format!("Error: {err:#}").red())?;
            }
            self.pause()?;
        }
        writeln!(self.out, "{}", "Thanks for using LimeBox!".with(LIME))?;
        Ok(())
    }

    fn show_banner(&mut self) -> Result<()> {
        if self.clear_screen {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        writeln!(self.out)?;
        for line in BANNER {
            writeln!(self.out, "{}", (*line).with(LIME).bold())?;
        }
        writeln!(
            self.out,
            "{}",
            format!("Terminal Project Runner v{}", env!("CARGO_PKG_VERSION")).dim()
        )?;
        Ok(())
    }

    fn show_menu(&mut self) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", "Main Menu".with(LIME).bold())?;
        for (key, label) in OPTIONS {
            writeln!(self.out, "  {}  {}", (*key).with(LIME).bold(), label)?;
        }
        Ok(())
    }

    fn heading(&mut self, title: &str) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", title.with(LIME).bold())?;
        Ok(())
    }

    /// Reads one answer. `None` means the input is exhausted.
    fn prompt(&mut self, label: &str, default: Option<&str>) -> Result<Option<String>> {
        match default {
            Some(default) => write!(self.out, "{} [{}]: ", label.bold(), default)?,
            None => write!(self.out, "{}: ", label.bold())?,
        }
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.out)?;
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(Some(default.unwrap_or_default().to_string()));
        }
        Ok(Some(answer.to_string()))
    }

    fn confirm(&mut self, label: &str) -> Result<bool> {
        let answer = self.prompt(&format!("{label} [y/N]"), None)?;
        Ok(matches!(
            answer.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y" | "yes")
        ))
    }

    fn pause(&mut self) -> Result<()> {
        write!(self.out, "\nPress Enter to continue...")?;
        self.out.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(())
    }

    /// Lists projects with numbers and reads a selection.
    fn choose_project(&mut self, label: &str) -> Result<Option<usize>> {
        for (idx, project) in self.projects.iter().enumerate() {
            writeln!(
                self.out,
                "{}. {} ({})",
                (idx + 1).to_string().with(LIME),
                project.name,
                project.project_type.label().cyan()
            )?;
        }
        let count = self.projects.len();
        let answer = self.prompt(&format!("{label} [1-{count}]"), None)?;
        match answer.and_then(|a| a.parse::<usize>().ok()) {
            Some(choice) if (1..=count).contains(&choice) => Ok(Some(choice - 1)),
            _ => {
                writeln!(self.out, "{}", "Cancelled.".yellow())?;
                Ok(None)
            }
        }
    }

    fn save(&self) -> Result<()> {
        self.store.save(&self.projects)
    }

    fn add_local_project(&mut self) -> Result<()> {
        self.heading("Add Local Project")?;
        let Some(raw) = self.prompt("Enter project path", Some("."))? else {
            return Ok(());
        };
        let path = std::path::absolute(&raw)
            .with_context(|| format!("failed to resolve {raw}"))?;
        if !path.is_dir() {
            writeln!(self.out, "{}", "Path does not exist!".red())?;
            return Ok(());
        }
        let Some(name) = self.prompt("Project name", Some(&default_name(&path)))? else {
            return Ok(());
        };
        let project = add_local(&path, Some(&name))?;
        writeln!(
            self.out,
            "{}",
            format!("✓ Detected: {}", project.project_type).with(LIME)
        )?;
        store::upsert(&mut self.projects, project);
        self.save()?;
        writeln!(
            self.out,
            "{}",
            format!("Added project '{name}' successfully!").with(LIME)
        )?;
        Ok(())
    }

    async fn clone_github_project(&mut self) -> Result<()> {
        self.heading("Clone from GitHub")?;
        let Some(url) = self.prompt("GitHub repository URL", None)? else {
            return Ok(());
        };
        if url.is_empty() {
            return Ok(());
        }
        let repo = GitHubRepo::parse(&url)?;
        let Some(name) = self.prompt("Project name", Some(&repo.name))? else {
            return Ok(());
        };
        writeln!(self.out, "{}", "Cloning repository...".dim())?;
        self.out.flush()?;
        let project = import_github(&repo, &name, &self.settings.clone_dir).await?;
        let kind = project.project_type;
        store::upsert(&mut self.projects, project);
        self.save()?;
        writeln!(
            self.out,
            "{}",
            format!("Cloned and added '{name}' ({kind})").with(LIME)
        )?;
        Ok(())
    }

    fn list_projects(&mut self) -> Result<()> {
        self.heading("Your Projects")?;
        if self.projects.is_empty() {
            writeln!(self.out, "{}", "No projects added yet.".yellow())?;
            return Ok(());
        }
        let rows = project_table(&self.projects);
        for (idx, row) in rows.iter().enumerate() {
            if idx == 0 {
                writeln!(self.out, "{}", row.as_str().with(LIME).bold())?;
            } else if self.projects[idx - 1].source == ProjectSource::GitHub {
                writeln!(self.out, "{}", row.as_str().cyan())?;
            } else {
                writeln!(self.out, "{}", row)?;
            }
        }
        Ok(())
    }

    async fn run_project(&mut self) -> Result<()> {
        if self.projects.is_empty() {
            writeln!(self.out, "{}", "No projects available. Add some first!".yellow())?;
            return Ok(());
        }
        self.heading("Run Project")?;
        let Some(idx) = self.choose_project("Select project")? else {
            return Ok(());
        };
        if self.confirm("Expose online? (No = localhost only)")? {
            writeln!(self.out, "{}", EXPOSE_NOTICE.yellow())?;
        }
        let project = self.projects[idx].clone();
        self.out.flush()?;
        self.launcher.launch(&project).await?;
        writeln!(self.out, "{}", format!("{} stopped.", project.name).with(LIME))?;
        Ok(())
    }

    fn remove_project(&mut self) -> Result<()> {
        if self.projects.is_empty() {
            writeln!(self.out, "{}", "No projects to remove.".yellow())?;
            return Ok(());
        }
        self.heading("Remove Project")?;
        let Some(idx) = self.choose_project("Select project to remove")? else {
            return Ok(());
        };
        let name = self.projects[idx].name.clone();
        if self.confirm(&format!("Remove '{name}'?"))? {
            store::remove(&mut self.projects, &name);
            self.save()?;
            writeln!(self.out, "{}", format!("Removed '{name}'").with(LIME))?;
        }
        Ok(())
    }

    async fn show_settings(&mut self) -> Result<()> {
        self.heading("Current Settings")?;
        let config = self
            .settings
            .config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let rows: [(&str, String); 5] = [
            ("Config File", config),
            ("Project Store", self.settings.store_path.display().to_string()),
            ("Total Projects", self.projects.len().to_string()),
            ("Working Directory", cwd),
            ("Clone Directory", display_dir(&self.settings.clone_dir)),
        ];
        for (label, value) in rows {
            writeln!(self.out, "  {:<20} {}", label.with(LIME), value)?;
        }
        writeln!(self.out, "  {}", "Toolchain".with(LIME))?;
        for status in toolchain::probe_all().await {
            match &status.version {
                Some(version) => {
                    writeln!(self.out, "    {} {:<10} {}", "✓".green(), status.name, version)?
                }
                None => writeln!(
                    self.out,
                    "    {} {:<10} {}",
                    "✗".red(),
                    status.name,
                    "not found".dim()
                )?,
            }
        }
        Ok(())
    }
}

fn display_dir(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .display()
        .to_string()
}
