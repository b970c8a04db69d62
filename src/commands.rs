//! Install and run command lookup per project type.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::detect::ProjectType;

const UNKNOWN_TYPE_MESSAGE: &str = "Unknown project type";

/// A program invocation bound to the directory it must run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// The executable.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    diagnostic: bool,
}

impl RunCommand {
    pub fn new(program: &str, args: &[&str], cwd: &Path) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            cwd: cwd.to_path_buf(),
            diagnostic: false,
        }
    }

    fn diagnostic(message: &str, cwd: &Path) -> Self {
        Self {
            diagnostic: true,
            ..Self::new("echo", &[message], cwd)
        }
    }

    /// Whether this is a placeholder that reports a problem instead of running anything.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic
    }

    /// The message carried by a diagnostic placeholder.
    pub fn diagnostic_message(&self) -> Option<String> {
        self.diagnostic.then(|| self.args.join(" "))
    }

    /// Program followed by its arguments.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(1 + self.args.len());
        tokens.push(self.program.clone());
        tokens.extend(self.args.iter().cloned());
        tokens
    }
}

impl fmt::Display for RunCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(self.tokens()))
    }
}

/// Dependency install step for `kind`, if it has one.
///
/// Python projects prefer `requirements.txt` over `pyproject.toml`; PHP projects
/// only install when `composer.json` is present.
pub fn install_command(kind: ProjectType, root: &Path) -> Option<RunCommand> {
    if kind.is_node_family() {
        return Some(RunCommand::new("npm", &["install"], root));
    }
    if kind.is_python_family() {
        if root.join("requirements.txt").exists() {
            return Some(RunCommand::new(
                "pip",
                &["install", "-r", "requirements.txt"],
                root,
            ));
        }
        if root.join("pyproject.toml").exists() {
            return Some(RunCommand::new("pip", &["install", "-e", "."], root));
        }
        return None;
    }
    match kind {
        ProjectType::Php if root.join("composer.json").exists() => {
            Some(RunCommand::new("composer", &["install"], root))
        }
        _ => None,
    }
}

/// Command that launches the project. `Unknown` maps to a diagnostic placeholder.
pub fn run_command(kind: ProjectType, root: &Path) -> RunCommand {
    let (program, args): (&str, &[&str]) = match kind {
        ProjectType::NextJs | ProjectType::Svelte => ("npm", &["run", "dev"]),
        ProjectType::React | ProjectType::NodeJs => ("npm", &["start"]),
        ProjectType::Vue => ("npm", &["run", "serve"]),
        ProjectType::Angular => ("ng", &["serve"]),
        ProjectType::Flask => ("python", &["app.py"]),
        ProjectType::Django => ("python", &["manage.py", "runserver"]),
        ProjectType::FastAPI => ("uvicorn", &["main:app", "--reload"]),
        ProjectType::Python => ("python", &["main.py"]),
        ProjectType::Php => ("php", &["-S", "localhost:8000"]),
        ProjectType::StaticHtml => ("python", &["-m", "http.server", "8000"]),
        ProjectType::Unknown => return RunCommand::diagnostic(UNKNOWN_TYPE_MESSAGE, root),
    };
    RunCommand::new(program, args, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tokens(command: &RunCommand) -> Vec<&str> {
        std::iter::once(command.program.as_str())
            .chain(command.args.iter().map(String::as_str))
            .collect()
    }

    #[test]
    fn node_family_uses_npm() {
        let dir = TempDir::new().unwrap();
        for kind in [
            ProjectType::NextJs,
            ProjectType::React,
            ProjectType::Vue,
            ProjectType::Angular,
            ProjectType::Svelte,
            ProjectType::NodeJs,
        ] {
            let install = install_command(kind, dir.path()).unwrap();
            assert_eq!(tokens(&install), ["npm", "install"]);
        }
        assert_eq!(
            tokens(&run_command(ProjectType::NextJs, dir.path())),
            ["npm", "run", "dev"]
        );
        assert_eq!(
            tokens(&run_command(ProjectType::React, dir.path())),
            ["npm", "start"]
        );
        assert_eq!(
            tokens(&run_command(ProjectType::Vue, dir.path())),
            ["npm", "run", "serve"]
        );
        assert_eq!(
            tokens(&run_command(ProjectType::Angular, dir.path())),
            ["ng", "serve"]
        );
    }

    #[test]
    fn python_install_prefers_requirements() {
        let dir = TempDir::new().unwrap();
        assert!(install_command(ProjectType::Flask, dir.path()).is_none());

        fs::write(dir.path().join("pyproject.toml"), "").unwrap();
        let install = install_command(ProjectType::Python, dir.path()).unwrap();
        assert_eq!(tokens(&install), ["pip", "install", "-e", "."]);

        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        let install = install_command(ProjectType::Python, dir.path()).unwrap();
        assert_eq!(tokens(&install), ["pip", "install", "-r", "requirements.txt"]);
        assert_eq!(install.cwd, dir.path());
    }

    #[test]
    fn python_run_commands() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            tokens(&run_command(ProjectType::Django, dir.path())),
            ["python", "manage.py", "runserver"]
        );
        assert_eq!(
            tokens(&run_command(ProjectType::FastAPI, dir.path())),
            ["uvicorn", "main:app", "--reload"]
        );
        assert_eq!(
            tokens(&run_command(ProjectType::StaticHtml, dir.path())),
            ["python", "-m", "http.server", "8000"]
        );
    }

    #[test]
    fn php_installs_only_with_composer_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(install_command(ProjectType::Php, dir.path()).is_none());
        fs::write(dir.path().join("composer.json"), "{}").unwrap();
        let install = install_command(ProjectType::Php, dir.path()).unwrap();
        assert_eq!(tokens(&install), ["composer", "install"]);
        assert_eq!(
            tokens(&run_command(ProjectType::Php, dir.path())),
            ["php", "-S", "localhost:8000"]
        );
    }

    #[test]
    fn unknown_type_is_a_placeholder() {
        let dir = TempDir::new().unwrap();
        assert!(install_command(ProjectType::Unknown, dir.path()).is_none());
        assert!(install_command(ProjectType::StaticHtml, dir.path()).is_none());
        let run = run_command(ProjectType::Unknown, dir.path());
        assert!(run.is_diagnostic());
        assert_eq!(run.diagnostic_message().as_deref(), Some("Unknown project type"));
        assert!(!run_command(ProjectType::Python, dir.path()).is_diagnostic());
    }

    #[test]
    fn display_quotes_arguments() {
        let command = RunCommand::new("echo", &["Unknown project type"], Path::new("/tmp"));
        assert_eq!(command.to_string(), "echo 'Unknown project type'");
    }
}
