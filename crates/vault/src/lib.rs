//! # The Vault: single-generation artifact backup
//!
//! Snapshots the tracked artifacts before the patch engine touches them.
//!
//! ## Layout
//! ```text
//! {backup_root}/
//!   manifest.json            artifact path -> snapshot entry
//!   files/{relative path}    byte-identical copy
//! ```
//!
//! ## Protocol
//! 1. Read every present artifact into memory. A missing artifact is skipped
//!    with a warning; any other read failure aborts before anything on disk
//!    changes, so the previous generation survives a failed snapshot.
//! 2. Remove the previous backup root wholesale.
//! 3. Write the copies and the manifest.
//!
//! Only one generation ever exists. [`Vault::restore`] is the in-process
//! equivalent of the emitted rollback script; the engines never call it.

use chrono::{DateTime, Utc};
use common::{ArtifactError, Workspace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";
const FILES_DIR: &str = "files";

/// Errors from backup operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// A tracked artifact exists but could not be read. Aborts the whole run.
    #[error("cannot snapshot artifact: {0}")]
    Unreadable(#[source] ArtifactError),
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("no backup manifest under {0}")]
    NoManifest(PathBuf),
    #[error("snapshot of {0} does not match its recorded digest")]
    Corrupt(String),
}

/// One snapshotted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Path of the copy, relative to the backup root.
    pub snapshot: PathBuf,
    /// BLAKE3 hex digest of the copied bytes.
    pub digest: String,
    pub bytes: u64,
}

/// A completed snapshot of the artifact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub root: PathBuf,
    /// `artifact path → snapshot entry`
    pub manifest: BTreeMap<String, SnapshotEntry>,
    /// Artifacts absent at snapshot time.
    pub skipped: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Backup {
    /// Absolute path of an artifact's copy, if it was snapshotted.
    pub fn snapshot_path(&self, artifact: &str) -> Option<PathBuf> {
        self.manifest.get(artifact).map(|e| self.root.join(&e.snapshot))
    }

    /// Re-hashes every copy on disk against the manifest.
    pub fn check_integrity(&self) -> Result<(), VaultError> {
        for (artifact, entry) in &self.manifest {
            let bytes = fs::read(self.root.join(&entry.snapshot))?;
            if digest(&bytes) != entry.digest {
                return Err(VaultError::Corrupt(artifact.clone()));
            }
        }
        Ok(())
    }

    /// Lists artifacts whose live content no longer matches the snapshot.
    ///
    /// An artifact deleted since the snapshot counts as drifted.
    pub fn drifted(&self, workspace: &Workspace) -> Result<Vec<String>, VaultError> {
        let mut changed = Vec::new();
        for (artifact, entry) in &self.manifest {
            match workspace.read_bytes(artifact) {
                Ok(bytes) if digest(&bytes) == entry.digest => {}
                Ok(_) | Err(ArtifactError::Missing(_)) => changed.push(artifact.clone()),
                Err(e) => return Err(VaultError::Unreadable(e)),
            }
        }
        Ok(changed)
    }
}

/// Owner of the single backup generation.
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshots `artifacts` (workspace-relative) into the backup root,
    /// replacing any previous generation.
    ///
    /// # Errors
    /// `VaultError::Unreadable` if a present artifact cannot be read; nothing
    /// on disk has changed in that case.
    pub fn snapshot(&self, workspace: &Workspace, artifacts: &[&str]) -> Result<Backup, VaultError> {
        info!(root = %self.root.display(), "creating backup");

        // Phase 1: capture everything before destroying the previous generation.
        let mut captured: Vec<(&str, Vec<u8>)> = Vec::with_capacity(artifacts.len());
        let mut skipped = Vec::new();
        for &artifact in artifacts {
            match workspace.read_bytes(artifact) {
                Ok(bytes) => captured.push((artifact, bytes)),
                Err(ArtifactError::Missing(_)) => {
                    warn!(artifact, "artifact not found, not backed up");
                    skipped.push(artifact.to_string());
                }
                Err(e) => return Err(VaultError::Unreadable(e)),
            }
        }

        // Phase 2: single generation, so wipe then write.
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(self.root.join(FILES_DIR))?;

        let mut manifest = BTreeMap::new();
        for (artifact, bytes) in captured {
            let snapshot = Path::new(FILES_DIR).join(artifact);
            let dst = self.root.join(&snapshot);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dst, &bytes)?;
            debug!(artifact, bytes = bytes.len(), "snapshot written");
            manifest.insert(
                artifact.to_string(),
                SnapshotEntry {
                    snapshot,
                    digest: digest(&bytes),
                    bytes: bytes.len() as u64,
                },
            );
        }

        let backup = Backup {
            root: self.root.clone(),
            manifest,
            skipped,
            created_at: Utc::now(),
        };
        fs::write(
            self.root.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&backup)?,
        )?;
        info!(
            saved = backup.manifest.len(),
            skipped = backup.skipped.len(),
            "backup created"
        );
        Ok(backup)
    }

    /// Loads the current generation from its manifest.
    pub fn load(&self) -> Result<Backup, VaultError> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(VaultError::NoManifest(self.root.clone()));
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Copies every snapshot back over its artifact. Returns the count restored.
    pub fn restore(&self, backup: &Backup, workspace: &Workspace) -> Result<usize, VaultError> {
        let mut restored = 0usize;
        for (artifact, entry) in &backup.manifest {
            let dst = workspace.resolve(artifact);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(backup.root.join(&entry.snapshot), &dst)?;
            restored += 1;
        }
        info!(restored, "artifacts restored from backup");
        Ok(restored)
    }
}

fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
