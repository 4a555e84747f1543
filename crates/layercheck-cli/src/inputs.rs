//! Locates what a check reads: one policy file and the feed files.
//!
//! The policy is the first candidate that exists:
//!
//! 1. the `--config` path (taken as given; loading reports a missing file)
//! 2. `layercheck.toml`, then `.layercheck.toml`, in the project directory
//! 3. `config.toml` in `$LAYERCHECK_CONFIG_DIR`, else in `~/.layercheck/`
//!
//! Feed paths name files or directories. A directory contributes every
//! `*.json` file below it that `.gitignore` rules do not exclude, sorted so
//! that merged graphs do not depend on walk order.

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Policy file names looked up in the project directory, in order.
pub const PROJECT_POLICY_NAMES: &[&str] = &["layercheck.toml", ".layercheck.toml"];

const GLOBAL_POLICY_NAME: &str = "config.toml";

/// How a policy file was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOrigin {
    /// Named with `--config`.
    Explicit,
    /// Found in the project directory.
    Project,
    /// Found in the global policy directory.
    Global,
}

impl fmt::Display for PolicyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Explicit => "explicit",
            Self::Project => "project",
            Self::Global => "global",
        })
    }
}

/// The policy a check runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFile {
    /// Path of the TOML file.
    pub path: PathBuf,
    /// How it was chosen.
    pub origin: PolicyOrigin,
}

/// Everything a check reads.
#[derive(Debug)]
pub struct Inputs {
    /// The policy file.
    pub policy: PolicyFile,
    /// Feed files, directories already expanded.
    pub feeds: Vec<PathBuf>,
}

impl Inputs {
    /// Locates the policy and expands the feed paths.
    ///
    /// # Errors
    ///
    /// Fails when no policy file exists (the message lists every path
    /// tried), when a feed path does not exist, or when walking a feed
    /// directory fails.
    pub fn locate(project_dir: &Path, explicit: Option<&Path>, graphs: &[PathBuf]) -> Result<Self> {
        Self::locate_with(project_dir, explicit, graphs, global_policy_dir())
    }

    fn locate_with(
        project_dir: &Path,
        explicit: Option<&Path>,
        graphs: &[PathBuf],
        global_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let policy = find_policy(project_dir, explicit, global_dir.as_deref())?;
        tracing::debug!("Using {} policy {}", policy.origin, policy.path.display());
        let feeds = expand_feeds(graphs)?;
        Ok(Self { policy, feeds })
    }
}

fn policy_candidates(project_dir: &Path, global_dir: Option<&Path>) -> Vec<PolicyFile> {
    let project = PROJECT_POLICY_NAMES.iter().map(|name| PolicyFile {
        path: project_dir.join(name),
        origin: PolicyOrigin::Project,
    });
    let global = global_dir.map(|dir| PolicyFile {
        path: dir.join(GLOBAL_POLICY_NAME),
        origin: PolicyOrigin::Global,
    });
    project.chain(global).collect()
}

fn find_policy(
    project_dir: &Path,
    explicit: Option<&Path>,
    global_dir: Option<&Path>,
) -> Result<PolicyFile> {
    if let Some(path) = explicit {
        return Ok(PolicyFile {
            path: path.to_path_buf(),
            origin: PolicyOrigin::Explicit,
        });
    }

    let candidates = policy_candidates(project_dir, global_dir);
    if let Some(found) = candidates.iter().find(|c| c.path.is_file()) {
        return Ok(found.clone());
    }

    let tried: Vec<String> = candidates
        .iter()
        .map(|c| c.path.display().to_string())
        .collect();
    bail!(
        "No policy file found (tried {}). Run `layercheck init` to create one.",
        tried.join(", ")
    )
}

/// `$LAYERCHECK_CONFIG_DIR`, else `~/.layercheck/`.
fn global_policy_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("LAYERCHECK_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    home::home_dir().map(|h| h.join(".layercheck"))
}

fn expand_feeds(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("Feed path {} does not exist", path.display());
        }

        let mut builder = ignore::WalkBuilder::new(path);
        builder.hidden(false).git_ignore(true);

        let mut found = Vec::new();
        for entry in builder.build() {
            let entry = entry?;
            let p = entry.path();
            if p.is_file() && p.extension().is_some_and(|e| e == "json") {
                found.push(p.to_path_buf());
            }
        }
        found.sort();
        if found.is_empty() {
            tracing::warn!("No feed files below {}", path.display());
        }
        files.extend(found);
    }
    Ok(files)
}
