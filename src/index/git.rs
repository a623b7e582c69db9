//! Git provenance for the index manifest
//!
//! Shells out to the `git` CLI; a root that is not a repository (or a
//! machine without git) simply yields no provenance, which is not an
//! error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Where the indexed tree came from, as far as git knows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitProvenance {
    pub commit: String,
    pub branch: String,
    pub dirty: bool,
    pub remote: Option<String>,
}

/// Collect provenance for `root`, if it is inside a git work tree.
pub fn git_provenance(root: &Path) -> Option<GitProvenance> {
    let commit = git_output(root, &["rev-parse", "HEAD"])?;
    let branch =
        git_output(root, &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "HEAD".into());
    let dirty = git_output(root, &["status", "--porcelain"])
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    let remote = git_output(root, &["remote", "get-url", "origin"]);

    Some(GitProvenance {
        commit,
        branch,
        dirty,
        remote,
    })
}

fn git_output(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Some(text)
}
