//! Importing projects from GitHub.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::GitHubError;

static REPO_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://(?:www\.)?github\.com/|git@github\.com:|ssh://git@github\.com/)([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$",
    )
    .ok()
});

/// A repository reference parsed from a clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub owner: String,
    pub name: String,
    /// The URL exactly as given, handed to `git clone`.
    pub url: String,
}

impl GitHubRepo {
    /// Accepts `https://github.com/owner/repo[.git]` and `git@github.com:owner/repo[.git]`.
    pub fn parse(url: &str) -> Result<Self, GitHubError> {
        let url = url.trim();
        let caps = REPO_URL
            .as_ref()
            .and_then(|re| re.captures(url))
            .ok_or_else(|| GitHubError::InvalidUrl {
                url: url.to_string(),
            })?;
        Ok(Self {
            owner: caps[1].to_string(),
            name: caps[2].to_string(),
            url: url.to_string(),
        })
    }
}

/// Clones `repo` into `destination` with `git clone`.
pub async fn clone_repository(repo: &GitHubRepo, destination: &Path) -> Result<PathBuf, GitHubError> {
    info!(url = %repo.url, destination = %destination.display(), "cloning repository");

    if destination.exists() {
        return Err(GitHubError::DestinationExists {
            path: destination.display().to_string(),
        });
    }
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut cmd = Command::new("git");
    cmd.arg("clone").arg(&repo.url).arg(destination);

    debug!("running git clone");
    let output = match cmd.output().await {
        Ok(output) => output,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(GitHubError::GitNotFound),
        Err(err) => return Err(err.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(GitHubError::CloneFailed { stderr });
    }

    info!(destination = %destination.display(), "repository cloned");
    Ok(destination.to_path_buf())
}
