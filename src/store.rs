//! Persistence for registered projects.
//!
//! The registry is a JSON document keyed by project name:
//!
//! ```json
//! {
//!   "projects": {
//!     "shop": { "path": "/src/shop", "type": "Next.js", "source": "local", "added": "..." }
//!   },
//!   "last_updated": "2026-01-01T12:00:00+00:00"
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::detect::ProjectType;

/// Where a project came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSource {
    Local,
    GitHub,
}

impl ProjectSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::GitHub => "github",
        }
    }
}

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    /// Unique key in the registry.
    pub name: String,
    pub path: PathBuf,
    pub project_type: ProjectType,
    pub source: ProjectSource,
    pub repo_url: Option<String>,
    /// RFC 3339 timestamp of registration.
    pub added: String,
}

impl ProjectDescriptor {
    pub fn local(name: impl Into<String>, path: PathBuf, project_type: ProjectType) -> Self {
        Self {
            name: name.into(),
            path,
            project_type,
            source: ProjectSource::Local,
            repo_url: None,
            added: now_rfc3339(),
        }
    }

    pub fn github(
        name: impl Into<String>,
        path: PathBuf,
        project_type: ProjectType,
        repo_url: impl Into<String>,
    ) -> Self {
        Self {
            source: ProjectSource::GitHub,
            repo_url: Some(repo_url.into()),
            ..Self::local(name, path, project_type)
        }
    }
}

/// Storage backend for the project registry.
pub trait ProjectStore {
    /// All registered projects, sorted by name.
    fn load(&self) -> Result<Vec<ProjectDescriptor>>;

    /// Replaces the registry with `projects`.
    fn save(&self, projects: &[ProjectDescriptor]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    projects: BTreeMap<String, StoredProject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProject {
    path: PathBuf,
    #[serde(rename = "type")]
    project_type: String,
    source: ProjectSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repo_url: Option<String>,
    #[serde(default)]
    added: String,
}

/// Registry backed by a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonProjectStore {
    path: PathBuf,
}

impl JsonProjectStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ProjectStore for JsonProjectStore {
    fn load(&self) -> Result<Vec<ProjectDescriptor>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "project store missing, starting empty");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read project store {}", self.path.display()))?;
        let file: RegistryFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse project store {}", self.path.display()))?;
        let projects = file
            .projects
            .into_iter()
            .map(|(name, stored)| ProjectDescriptor {
                name,
                path: stored.path,
                project_type: ProjectType::from_label(&stored.project_type),
                source: stored.source,
                repo_url: stored.repo_url,
                added: stored.added,
            })
            .collect::<Vec<_>>();
        tracing::debug!(path = %self.path.display(), count = projects.len(), "loaded projects");
        Ok(projects)
    }

    fn save(&self, projects: &[ProjectDescriptor]) -> Result<()> {
        let file = RegistryFile {
            projects: projects
                .iter()
                .map(|project| {
                    (
                        project.name.clone(),
                        StoredProject {
                            path: project.path.clone(),
                            project_type: project.project_type.label().to_string(),
                            source: project.source,
                            repo_url: project.repo_url.clone(),
                            added: project.added.clone(),
                        },
                    )
                })
                .collect(),
            last_updated: Some(now_rfc3339()),
        };
        let json = serde_json::to_string_pretty(&file).context("encode project store json")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create store dir: {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("write temp store: {}", tmp.display()))?;
            f.write_all(json.as_bytes())
                .with_context(|| format!("write temp store body: {}", tmp.display()))?;
            f.write_all(b"\n")
                .with_context(|| format!("write temp store newline: {}", tmp.display()))?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace project store {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), count = projects.len(), "saved projects");
        Ok(())
    }
}

/// Inserts `project`, replacing any entry with the same name. Keeps name order.
pub fn upsert(projects: &mut Vec<ProjectDescriptor>, project: ProjectDescriptor) {
    match projects.binary_search_by(|p| p.name.cmp(&project.name)) {
        Ok(idx) => projects[idx] = project,
        Err(idx) => projects.insert(idx, project),
    }
}

/// Removes the project called `name`. Returns it if it was registered.
pub fn remove(projects: &mut Vec<ProjectDescriptor>, name: &str) -> Option<ProjectDescriptor> {
    let idx = projects.iter().position(|p| p.name == name)?;
    Some(projects.remove(idx))
}

pub fn find<'a>(projects: &'a [ProjectDescriptor], name: &str) -> Option<&'a ProjectDescriptor> {
    projects.iter().find(|p| p.name == name)
}

fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}
