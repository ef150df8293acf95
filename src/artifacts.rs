//! Repository references (branches, stashes, tags) as flat display lists.
//!
//! This is a straight translation of repository queries; nothing is merged.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactGroup {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub name: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stash {
    pub index: usize,
    pub description: String,
    pub branch_name: Option<String>,
}

/// Read access to a repository's references.
pub trait RefSource {
    /// References under `pattern`, e.g. `refs/heads`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be queried.
    fn refs(&self, pattern: &str) -> Result<Vec<GitRef>>;

    /// # Errors
    ///
    /// Returns an error if the repository cannot be queried.
    fn stashes(&self) -> Result<Vec<Stash>>;
}

pub const GROUPS: [ArtifactGroup; 3] = [
    ArtifactGroup { id: "branches", name: "Branches", icon: "git-branch" },
    ArtifactGroup { id: "stashes", name: "Stashes", icon: "git-stash" },
    ArtifactGroup { id: "tags", name: "Tags", icon: "tag" },
];

#[derive(Debug)]
pub struct GitArtifactProvider<S> {
    source: S,
}

impl<S: RefSource> GitArtifactProvider<S> {
    pub fn new(source: S) -> Self {
        info!("Artifact provider initialized");
        Self { source }
    }

    #[must_use]
    pub const fn groups(&self) -> &'static [ArtifactGroup] {
        &GROUPS
    }

    /// Artifacts of one group; an unknown group yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying repository query fails.
    pub fn provide_artifacts(&self, group: &str) -> Result<Vec<Artifact>> {
        match group {
            "branches" => self.refs_as_artifacts("refs/heads"),
            "stashes" => Ok(self
                .source
                .stashes()?
                .into_iter()
                .map(|s| Artifact {
                    id: format!("stash@{{{}}}", s.index),
                    name: format!("#{}: {}", s.index, s.description),
                    description: s.branch_name,
                })
                .collect()),
            "tags" => self.refs_as_artifacts("refs/tags"),
            other => {
                debug!("Unknown artifact group '{}'", other);
                Ok(Vec::new())
            },
        }
    }

    fn refs_as_artifacts(&self, pattern: &str) -> Result<Vec<Artifact>> {
        Ok(self
            .source
            .refs(pattern)?
            .into_iter()
            .map(|r| {
                // Unnamed refs are addressed by commit so ids stay distinct.
                let name = r.name.or(r.commit).unwrap_or_default();
                Artifact { id: format!("{pattern}/{name}"), name, description: None }
            })
            .collect())
    }
}

/// [`RefSource`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running git {:?} in {}", args, self.root.display());
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .context("Failed to execute git")?;

        if !output.status.success() {
            bail!("git {} failed: {}", args.join(" "), String::from_utf8_lossy(&output.stderr).trim());
        }

        String::from_utf8(output.stdout).context("git produced non UTF-8 output")
    }
}

impl RefSource for GitCli {
    fn refs(&self, pattern: &str) -> Result<Vec<GitRef>> {
        let prefix = format!("{}/", pattern.trim_end_matches('/'));
        let stdout =
            self.run(&["for-each-ref", "--format=%(refname)%09%(objectname)", pattern])?;
        Ok(parse_refs(&stdout, &prefix))
    }

    fn stashes(&self) -> Result<Vec<Stash>> {
        let stdout = self.run(&["stash", "list", "--format=%gd%09%gs"])?;
        Ok(parse_stashes(&stdout))
    }
}

fn parse_refs(stdout: &str, prefix: &str) -> Vec<GitRef> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (refname, commit) = line.split_once('\t').unwrap_or((line, ""));
            GitRef {
                name: refname.strip_prefix(prefix).filter(|n| !n.is_empty()).map(str::to_string),
                commit: Some(commit.to_string()).filter(|c| !c.is_empty()),
            }
        })
        .collect()
}

/// Parses `stash@{N}<TAB>WIP on branch: message` lines.
fn parse_stashes(stdout: &str) -> Vec<Stash> {
    stdout
        .lines()
        .filter_map(|line| {
            let (selector, subject) = line.split_once('\t')?;
            let index = selector.strip_prefix("stash@{")?.strip_suffix('}')?.parse().ok()?;

            let (branch_name, description) = subject
                .strip_prefix("WIP on ")
                .or_else(|| subject.strip_prefix("On "))
                .and_then(|rest| rest.split_once(": "))
                .map_or((None, subject), |(branch, message)| (Some(branch.to_string()), message));

            Some(Stash { index, description: description.to_string(), branch_name })
        })
        .collect()
}
