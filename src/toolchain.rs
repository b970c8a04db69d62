//! Availability checks for the external tools projects are run with.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// How long a `--version` call may take before the tool counts as unavailable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tools LimeBox may invoke, in display order.
pub const TOOLS: &[&str] = &[
    "git", "node", "npm", "python", "pip", "php", "composer", "ng", "uvicorn",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    /// First line of `<tool> --version`, when the tool ran successfully.
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn available(&self) -> bool {
        self.version.is_some()
    }
}

/// Runs `<name> --version` and reports the outcome.
pub async fn probe_tool(name: &str) -> ToolStatus {
    let version = first_output_line(name, &["--version"], PROBE_TIMEOUT).await;
    tracing::debug!(tool = name, version = ?version, "probed tool");
    ToolStatus {
        name: name.to_string(),
        version,
    }
}

/// First line of output of a successful run, or `None` on failure or timeout.
async fn first_output_line(program: &str, args: &[&str], limit: Duration) -> Option<String> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).kill_on_drop(true);
    let output = match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(_) => return None,
        Err(_) => {
            tracing::warn!(program, "version check timed out");
            return None;
        }
    };
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let first = String::from_utf8_lossy(&text)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    Some(first)
}

/// Probes every entry of [`TOOLS`] concurrently.
pub async fn probe_all() -> Vec<ToolStatus> {
    let mut set = tokio::task::JoinSet::new();
    for (idx, name) in TOOLS.iter().enumerate() {
        set.spawn(async move { (idx, probe_tool(name).await) });
    }
    let mut results = Vec::with_capacity(TOOLS.len());
    while let Some(joined) = set.join_next().await {
        if let Ok(result) = joined {
            results.push(result);
        }
    }
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, status)| status).collect()
}
