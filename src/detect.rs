//! Project type detection.
//!
//! A project directory is classified by walking an ordered table of rules and
//! returning the label of the first rule whose predicate holds. Several rules can
//! match the same directory (a React app is also a Node.js app), so the table order
//! decides the result. Every predicate treats I/O and parse errors as "no match".

use std::cell::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Technology stack of a project directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectType {
    #[serde(rename = "Next.js")]
    NextJs,
    React,
    #[serde(rename = "Vue.js")]
    Vue,
    Angular,
    Svelte,
    #[serde(rename = "Node.js")]
    NodeJs,
    Flask,
    Django,
    FastAPI,
    Python,
    #[serde(rename = "PHP")]
    Php,
    #[serde(rename = "Static HTML")]
    StaticHtml,
    #[serde(other)]
    Unknown,
}

impl ProjectType {
    /// Human readable label, also used as the stored representation.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NextJs => "Next.js",
            Self::React => "React",
            Self::Vue => "Vue.js",
            Self::Angular => "Angular",
            Self::Svelte => "Svelte",
            Self::NodeJs => "Node.js",
            Self::Flask => "Flask",
            Self::Django => "Django",
            Self::FastAPI => "FastAPI",
            Self::Python => "Python",
            Self::Php => "PHP",
            Self::StaticHtml => "Static HTML",
            Self::Unknown => "Unknown",
        }
    }

    /// Parses a stored label. Unrecognised labels map to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        RULES
            .iter()
            .map(|(kind, _)| *kind)
            .find(|kind| kind.label().eq_ignore_ascii_case(label.trim()))
            .unwrap_or(Self::Unknown)
    }

    /// Whether dependencies are managed with npm.
    pub fn is_node_family(&self) -> bool {
        matches!(
            self,
            Self::NextJs | Self::React | Self::Vue | Self::Angular | Self::Svelte | Self::NodeJs
        )
    }

    /// Whether dependencies are managed with pip.
    pub fn is_python_family(&self) -> bool {
        matches!(self, Self::Flask | Self::Django | Self::FastAPI | Self::Python)
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type Rule = fn(&ProjectDir) -> bool;

/// Detection rules in priority order. The first matching rule wins.
const RULES: &[(ProjectType, Rule)] = &[
    (ProjectType::NextJs, is_nextjs),
    (ProjectType::React, is_react),
    (ProjectType::Vue, is_vue),
    (ProjectType::Angular, is_angular),
    (ProjectType::Svelte, is_svelte),
    (ProjectType::NodeJs, is_nodejs),
    (ProjectType::Flask, is_flask),
    (ProjectType::Django, is_django),
    (ProjectType::FastAPI, is_fastapi),
    (ProjectType::Python, is_python),
    (ProjectType::Php, is_php),
    (ProjectType::StaticHtml, is_static_html),
];

/// Classifies the project rooted at `path`.
///
/// Never fails: a missing or unreadable directory fails every rule and yields
/// [`ProjectType::Unknown`].
pub fn detect(path: &Path) -> ProjectType {
    let dir = ProjectDir::new(path);
    let kind = RULES
        .iter()
        .find(|(_, rule)| rule(&dir))
        .map(|(kind, _)| *kind)
        .unwrap_or(ProjectType::Unknown);
    tracing::debug!(path = %path.display(), project_type = %kind, "detected project type");
    kind
}

/// View of a project root shared by the rules of one detection pass.
struct ProjectDir {
    root: PathBuf,
    manifest: OnceCell<Option<HashSet<String>>>,
}

impl ProjectDir {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            manifest: OnceCell::new(),
        }
    }

    fn has(&self, name: &str) -> bool {
        self.root.join(name).exists()
    }

    fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.has(name))
    }

    fn read(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.root.join(name)).ok()
    }

    /// Dependency names declared in `package.json`, or `None` without a manifest.
    ///
    /// An unparsable manifest yields an empty set.
    fn dependencies(&self) -> Option<&HashSet<String>> {
        self.manifest
            .get_or_init(|| {
                let path = self.root.join("package.json");
                if !path.exists() {
                    return None;
                }
                let raw = fs::read_to_string(&path).unwrap_or_default();
                Some(manifest_dependencies(&raw))
            })
            .as_ref()
    }

    fn depends_on(&self, package: &str) -> bool {
        self.dependencies()
            .map(|deps| deps.contains(package))
            .unwrap_or(false)
    }

    /// Case-insensitive substring search in `requirements.txt`.
    fn requirement_mentions(&self, needle: &str) -> bool {
        self.read("requirements.txt")
            .map(|content| content.to_lowercase().contains(needle))
            .unwrap_or(false)
    }

    /// Case-sensitive search for any of `needles` in the Python entry points.
    fn entry_point_imports(&self, needles: &[&str]) -> bool {
        ["app.py", "main.py"].iter().any(|file| {
            self.read(file)
                .map(|content| needles.iter().any(|needle| content.contains(needle)))
                .unwrap_or(false)
        })
    }
}

fn manifest_dependencies(raw: &str) -> HashSet<String> {
    let Ok(Value::Object(manifest)) = serde_json::from_str::<Value>(raw) else {
        return HashSet::new();
    };
    ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|key| manifest.get(*key).and_then(Value::as_object))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

fn is_nextjs(dir: &ProjectDir) -> bool {
    dir.depends_on("next")
}

fn is_react(dir: &ProjectDir) -> bool {
    dir.depends_on("react") && !dir.depends_on("next")
}

fn is_vue(dir: &ProjectDir) -> bool {
    dir.depends_on("vue")
}

fn is_angular(dir: &ProjectDir) -> bool {
    dir.has("angular.json") || dir.depends_on("@angular/core")
}

fn is_svelte(dir: &ProjectDir) -> bool {
    dir.depends_on("svelte")
}

fn is_nodejs(dir: &ProjectDir) -> bool {
    dir.has_any(&["package.json", "server.js", "app.js", "index.js"])
}

fn is_flask(dir: &ProjectDir) -> bool {
    dir.requirement_mentions("flask")
        || dir.entry_point_imports(&["from flask import", "import flask"])
}

fn is_django(dir: &ProjectDir) -> bool {
    dir.requirement_mentions("django") || dir.has_any(&["manage.py", "django_project"])
}

fn is_fastapi(dir: &ProjectDir) -> bool {
    dir.requirement_mentions("fastapi")
        || dir.entry_point_imports(&["from fastapi import", "import fastapi"])
}

fn is_python(dir: &ProjectDir) -> bool {
    dir.has_any(&[
        "main.py",
        "app.py",
        "requirements.txt",
        "setup.py",
        "pyproject.toml",
    ])
}

fn is_php(dir: &ProjectDir) -> bool {
    dir.has_any(&["index.php", "composer.json"])
}

fn is_static_html(dir: &ProjectDir) -> bool {
    dir.has_any(&["index.html", "index.htm"])
}
