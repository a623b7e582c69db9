//! Index manifest: a reproducibility record for one index run
//!
//! Describes exactly what was indexed and with what configuration, plus a
//! sha256 over its own canonical JSON so two "reproducible" rebuilds can
//! be compared for drift. Field order is the struct declaration order,
//! which serde_json preserves, so the canonical form is stable.

use super::git::GitProvenance;
use super::walker::FilesystemSurvey;
use crate::error::{MindsongError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub total_chunks: u64,
    pub unique_files: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub repo_path: String,
    pub generated_at: String,
    pub git: Option<GitProvenance>,
    pub index_stats: IndexStats,
    pub skip_dirs: Vec<String>,
    pub allow_exts: Vec<String>,
    pub max_file_size: u64,
    pub filesystem: FilesystemSurvey,
    /// sha256 of the canonical JSON of all other fields; empty until sealed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manifest_sha256: String,
}

impl IndexManifest {
    /// Fill in `manifest_sha256` over the canonical form.
    pub fn seal(mut self) -> Result<Self> {
        self.manifest_sha256 = self.compute_hash()?;
        Ok(self)
    }

    /// Recompute the hash and compare with the stored one.
    pub fn verify(&self) -> Result<bool> {
        Ok(self.compute_hash()? == self.manifest_sha256)
    }

    fn compute_hash(&self) -> Result<String> {
        let mut unsealed = self.clone();
        unsealed.manifest_sha256 = String::new();

        let canonical = serde_json::to_string(&unsealed).map_err(|e| MindsongError::Json {
            source: e,
            context: "Failed to canonicalize manifest".to_string(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Stable-field-order JSON for external consumers.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MindsongError::Json {
            source: e,
            context: "Failed to serialize manifest".to_string(),
        })
    }

    /// Write the manifest; an unwritable target aborts the index run.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| {
            MindsongError::FatalIndex(format!("Cannot write manifest to {:?}: {}", path, e))
        })
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MindsongError::Io {
            source: e,
            context: format!("Failed to read manifest: {:?}", path),
        })?;
        serde_json::from_str(&content).map_err(|e| MindsongError::Json {
            source: e,
            context: format!("Failed to parse manifest: {:?}", path),
        })
    }
}
