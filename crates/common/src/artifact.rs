//! Artifact store: text artifacts addressed by workspace-relative path.
//!
//! The engines never touch `std::fs` for artifacts directly; they go through
//! [`Workspace`] so that not-found, non-UTF-8 and I/O failures arrive already
//! classified into the soft/hard taxonomy of [`ArtifactError`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Failure while reading or writing a tracked artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The artifact does not exist. Always soft.
    #[error("artifact not found: {0}")]
    Missing(String),
    /// The artifact exists but its content cannot be interpreted as text.
    #[error("artifact is malformed: {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    /// `true` for failures a diagnostic scan records and moves past.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Missing(_) | Self::Malformed { .. })
    }
}

/// Root directory holding the artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Opens `root`, canonicalizing it (no `\\?\` prefix on Windows).
    pub fn open(root: &Path) -> Result<Self, ArtifactError> {
        let root = dunce::canonicalize(root).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ArtifactError::Missing(root.display().to_string()),
            _ => ArtifactError::Read {
                path: root.display().to_string(),
                source: e,
            },
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a workspace-relative artifact.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_file()
    }

    /// Reads raw bytes. Not-found maps to [`ArtifactError::Missing`].
    pub fn read_bytes(&self, relative: &str) -> Result<Vec<u8>, ArtifactError> {
        std::fs::read(self.resolve(relative)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ArtifactError::Missing(relative.to_string()),
            _ => ArtifactError::Read {
                path: relative.to_string(),
                source: e,
            },
        })
    }

    /// Reads UTF-8 text. Invalid UTF-8 maps to [`ArtifactError::Malformed`].
    pub fn read(&self, relative: &str) -> Result<String, ArtifactError> {
        let bytes = self.read_bytes(relative)?;
        String::from_utf8(bytes).map_err(|e| ArtifactError::Malformed {
            path: relative.to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrites the artifact in place. No temp-file-plus-rename.
    pub fn write(&self, relative: &str, content: &str) -> Result<(), ArtifactError> {
        std::fs::write(self.resolve(relative), content).map_err(|e| ArtifactError::Write {
            path: relative.to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_artifact_is_soft() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        let err = ws.read("nope.yml").unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(ref p) if p == "nope.yml"));
        assert!(err.is_soft());
    }

    #[test]
    fn test_non_utf8_is_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bad.yml"), [0xff, 0xfe, 0x00]).unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        let err = ws.read("bad.yml").unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed { .. }));
        assert!(err.is_soft());
        // Raw bytes remain readable for the backup path.
        assert_eq!(ws.read_bytes("bad.yml").unwrap(), vec![0xff, 0xfe, 0x00]);
    }

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        ws.write("app.yml", "default-mode: sandbox\n").unwrap();
        assert!(ws.exists("app.yml"));
        assert_eq!(ws.read("app.yml").unwrap(), "default-mode: sandbox\n");
    }

    #[test]
    fn test_write_into_missing_dir_is_hard() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        let err = ws.write("no/such/dir/app.yml", "x").unwrap_err();
        assert!(matches!(err, ArtifactError::Write { .. }));
        assert!(!err.is_soft());
    }

    #[test]
    fn test_open_missing_root() {
        let err = Workspace::open(Path::new("/this/does/not/exist/anywhere")).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(_)));
    }
}
