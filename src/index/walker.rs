//! Document tree walker
//!
//! Walks the corpus root with skip-directory pruning applied before
//! descent, so nothing beneath a pruned directory is ever opened. Files
//! are filtered by extension allow-list and size; skips are counted, not
//! silently dropped. Output order is sorted for deterministic runs.

use crate::config::IndexingConfig;
use crate::error::{MindsongError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file eligible for indexing
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub path: PathBuf,
    /// Path relative to the walk root, with forward slashes
    pub rel_path: String,
    pub size: u64,
}

/// What the walk saw, before eligibility filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilesystemSurvey {
    pub total_files: u64,
    pub total_bytes: u64,
    pub ext_counts: BTreeMap<String, u64>,
}

/// Walk result: eligible files plus skip accounting
#[derive(Debug)]
pub struct WalkOutcome {
    pub files: Vec<WalkedFile>,
    /// Files seen but skipped for extension or size
    pub skipped_files: usize,
    pub survey: FilesystemSurvey,
}

/// Walk the tree under `root`, applying the configured filters.
///
/// A missing or unreadable root is fatal; per-entry traversal errors
/// below the root are tolerated and logged.
pub fn walk_tree(root: &Path, config: &IndexingConfig) -> Result<WalkOutcome> {
    let meta = std::fs::metadata(root).map_err(|e| {
        MindsongError::FatalIndex(format!("Cannot read index root {:?}: {}", root, e))
    })?;
    if !meta.is_dir() {
        return Err(MindsongError::FatalIndex(format!(
            "Index root {:?} is not a directory",
            root
        )));
    }

    let mut files = Vec::new();
    let mut skipped_files = 0usize;
    let mut survey = FilesystemSurvey::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        // Prune skip_dirs before descending; their contents are never
        // opened or surveyed.
        if entry.file_type().is_dir() && entry.depth() > 0 {
            let name = entry.file_name().to_string_lossy();
            return !config.skip_dirs.contains(name.as_ref());
        }
        true
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry during walk: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        survey.total_files += 1;
        survey.total_bytes += size;
        *survey
            .ext_counts
            .entry(if ext.is_empty() {
                "(none)".to_string()
            } else {
                ext.clone()
            })
            .or_insert(0) += 1;

        if !config.allow_exts.contains(&ext) {
            skipped_files += 1;
            continue;
        }
        if size > config.max_file_size {
            tracing::debug!(
                "Skipping {:?}: {} bytes exceeds max_file_size {}",
                path,
                size,
                config.max_file_size
            );
            skipped_files += 1;
            continue;
        }

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        files.push(WalkedFile {
            path: path.to_path_buf(),
            rel_path,
            size,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    Ok(WalkOutcome {
        files,
        skipped_files,
        survey,
    })
}
